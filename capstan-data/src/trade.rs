use capstan_instrument::{price::Price, quantity::Quantity, symbol::InstrumentId};
use chrono::{DateTime, Utc};
use derive_more::Constructor;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::fmt::{Display, Formatter};

/// Side of the aggressing order that caused a trade.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AggressorSide {
    Buyer,
    Seller,
}

impl Display for AggressorSide {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                AggressorSide::Buyer => "buyer",
                AggressorSide::Seller => "seller",
            }
        )
    }
}

/// A single market trade on an instrument.
#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize, Constructor)]
pub struct TradeTick {
    pub instrument_id: InstrumentId,
    pub price: Price,
    pub size: Quantity,
    pub aggressor_side: AggressorSide,
    pub trade_id: SmolStr,
    pub ts_event: DateTime<Utc>,
}
