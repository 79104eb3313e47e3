#![forbid(unsafe_code)]
#![warn(
    unused,
    clippy::cognitive_complexity,
    unused_crate_dependencies,
    unused_extern_crates,
    clippy::unused_self,
    clippy::useless_let_if_seq,
    missing_debug_implementations,
    rust_2018_idioms
)]
#![allow(clippy::type_complexity, clippy::too_many_arguments)]

//! # Capstan-Instrument
//! Capstan-Instrument contains the core Venue, Instrument, Currency and Money data structures
//! used throughout the Capstan trading core, as well as the fixed-precision Price and Quantity
//! value types.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// [`Currency`](asset::Currency) and currency classification data structures.
pub mod asset;

/// [`Money`](money::Money) - a Decimal amount paired with a [`Currency`](asset::Currency).
pub mod money;

/// Fixed-precision [`Price`](price::Price) value type.
pub mod price;

/// Fixed-precision [`Quantity`](quantity::Quantity) value type.
pub mod quantity;

/// [`Venue`](venue::Venue) - a trading destination identified by a string tag.
pub mod venue;

/// [`Symbol`](symbol::Symbol) and [`InstrumentId`](symbol::InstrumentId) identifiers.
pub mod symbol;

/// Comprehensive [`Instrument`](instrument::Instrument) model, including notional, market value,
/// margin and commission calculators.
pub mod instrument;

/// Errors generated when constructing instrument domain value types.
pub mod error;

/// [`Side`] of a trade or order - Buy or Sell.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Deserialize, Serialize)]
pub enum Side {
    #[serde(alias = "buy", alias = "BUY", alias = "b")]
    Buy,
    #[serde(alias = "sell", alias = "SELL", alias = "s")]
    Sell,
}

impl Side {
    /// Returns the opposing [`Side`].
    pub fn inverse(&self) -> Self {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }
}

impl Display for Side {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Side::Buy => "buy",
                Side::Sell => "sell",
            }
        )
    }
}

/// Directional state of a net exposure on an instrument.
#[derive(
    Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Default, Deserialize, Serialize,
)]
#[serde(rename_all = "snake_case")]
pub enum PositionSide {
    #[default]
    Flat,
    Long,
    Short,
}

impl Display for PositionSide {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                PositionSide::Flat => "flat",
                PositionSide::Long => "long",
                PositionSide::Short => "short",
            }
        )
    }
}

/// Which price of a quote is being requested.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceType {
    Bid,
    Ask,
    Mid,
    Last,
}

/// Liquidity role of a fill - determines the fee rate applied.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LiquiditySide {
    Maker,
    Taker,
    NoLiquiditySide,
}

pub mod test_utils {
    use crate::{
        asset::Currency,
        instrument::{AssetType, Instrument},
        symbol::InstrumentId,
    };
    use rust_decimal::Decimal;

    /// Construct a standard FX spot [`Instrument`], eg/ "EUR/USD" quoted and settled in USD.
    pub fn fx_instrument(symbol: &str, venue_tag: &str, quote: Currency) -> Instrument {
        Instrument {
            id: InstrumentId::new(symbol, venue_tag),
            asset_type: AssetType::Fx,
            quote_currency: quote.clone(),
            settlement_currency: quote,
            is_inverse: false,
            price_precision: 5,
            size_precision: 0,
            multiplier: Decimal::ONE,
            leverage: Decimal::from(50),
            min_quantity: None,
            max_quantity: None,
            margin_init: Decimal::new(3, 2),
            margin_maint: Decimal::new(3, 2),
            maker_fee: Decimal::new(2, 5),
            taker_fee: Decimal::new(2, 5),
        }
    }

    /// Construct a linear crypto [`Instrument`], eg/ "BTC/USD" settled in the quote currency.
    pub fn crypto_instrument(symbol: &str, venue_tag: &str, quote: Currency) -> Instrument {
        Instrument {
            id: InstrumentId::new(symbol, venue_tag),
            asset_type: AssetType::Crypto,
            quote_currency: quote.clone(),
            settlement_currency: quote,
            is_inverse: false,
            price_precision: 2,
            size_precision: 6,
            multiplier: Decimal::ONE,
            leverage: Decimal::ONE,
            min_quantity: None,
            max_quantity: None,
            margin_init: Decimal::new(1, 1),
            margin_maint: Decimal::new(5, 2),
            maker_fee: Decimal::new(1, 4),
            taker_fee: Decimal::new(2, 4),
        }
    }
}
