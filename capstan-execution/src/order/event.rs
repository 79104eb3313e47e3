use crate::order::id::{ClientOrderId, StrategyId, VenueOrderId};
use capstan_instrument::{
    money::Money, price::Price, quantity::Quantity, symbol::InstrumentId, LiquiditySide,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Event envelope describing a state change of a single order.
///
/// Published on `events.order.<strategy_id>`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct OrderEvent {
    pub strategy_id: StrategyId,
    pub instrument_id: InstrumentId,
    pub client_order_id: ClientOrderId,
    pub kind: OrderEventKind,
    pub event_id: Uuid,
    pub ts_event: DateTime<Utc>,
}

impl OrderEvent {
    pub fn new(
        strategy_id: StrategyId,
        instrument_id: InstrumentId,
        client_order_id: ClientOrderId,
        kind: OrderEventKind,
        ts_event: DateTime<Utc>,
    ) -> Self {
        Self {
            strategy_id,
            instrument_id,
            client_order_id,
            kind,
            event_id: Uuid::new_v4(),
            ts_event,
        }
    }

    /// Topic order events for the given strategy are published under,
    /// eg/ "events.order.EmaCross-002".
    pub fn topic(strategy_id: &StrategyId) -> String {
        format!("events.order.{strategy_id}")
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderEventKind {
    Initialized,
    Denied {
        reason: SmolStr,
    },
    Submitted,
    Accepted {
        venue_order_id: VenueOrderId,
    },
    Rejected {
        reason: SmolStr,
    },
    Canceled,
    Expired,
    Triggered,
    Updated {
        quantity: Option<Quantity>,
        price: Option<Price>,
        trigger: Option<Price>,
    },
    PartiallyFilled(Fill),
    Filled(Fill),
    Invalid {
        reason: SmolStr,
    },
}

impl Display for OrderEventKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            OrderEventKind::Initialized => "Initialized",
            OrderEventKind::Denied { .. } => "Denied",
            OrderEventKind::Submitted => "Submitted",
            OrderEventKind::Accepted { .. } => "Accepted",
            OrderEventKind::Rejected { .. } => "Rejected",
            OrderEventKind::Canceled => "Canceled",
            OrderEventKind::Expired => "Expired",
            OrderEventKind::Triggered => "Triggered",
            OrderEventKind::Updated { .. } => "Updated",
            OrderEventKind::PartiallyFilled(_) => "PartiallyFilled",
            OrderEventKind::Filled(_) => "Filled",
            OrderEventKind::Invalid { .. } => "Invalid",
        };
        write!(f, "{name}")
    }
}

/// Execution details of a (partial) fill.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Fill {
    pub venue_order_id: VenueOrderId,
    pub last_px: Price,
    pub last_qty: Quantity,
    pub liquidity_side: LiquiditySide,
    pub commission: Option<Money>,
}
