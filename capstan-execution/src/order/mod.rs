use crate::{
    error::OrderError,
    order::{
        event::{OrderEvent, OrderEventKind},
        id::{ClientOrderId, StrategyId, TraderId, VenueOrderId},
    },
};
use capstan_instrument::{price::Price, quantity::Quantity, symbol::InstrumentId, Side};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// `Order` related identifiers.
pub mod id;

/// `Order` lifecycle events.
///
/// eg/ `Initialized`, `Denied`, `Accepted`, `Filled`, etc.
pub mod event;

/// Execution type of an order.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderType {
    Market,
    Limit,
    StopMarket,
    StopLimit,
}

impl Display for OrderType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            OrderType::Market => "MARKET",
            OrderType::Limit => "LIMIT",
            OrderType::StopMarket => "STOP_MARKET",
            OrderType::StopLimit => "STOP_LIMIT",
        };
        write!(f, "{name}")
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeInForce {
    GoodUntilCancelled,
    GoodUntilDate,
    ImmediateOrCancel,
    FillOrKill,
    Day,
}

/// Status of an [`Order`] within its lifecycle state machine.
///
/// `Filled`, `Canceled`, `Expired`, `Rejected`, `Denied` and `Invalid` are terminal and
/// absorbing.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Initialized,
    Denied,
    Invalid,
    Submitted,
    Accepted,
    Rejected,
    Triggered,
    PartiallyFilled,
    Filled,
    Canceled,
    Expired,
}

impl OrderStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Denied
                | OrderStatus::Invalid
                | OrderStatus::Rejected
                | OrderStatus::Filled
                | OrderStatus::Canceled
                | OrderStatus::Expired
        )
    }
}

impl Display for OrderStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            OrderStatus::Initialized => "INITIALIZED",
            OrderStatus::Denied => "DENIED",
            OrderStatus::Invalid => "INVALID",
            OrderStatus::Submitted => "SUBMITTED",
            OrderStatus::Accepted => "ACCEPTED",
            OrderStatus::Rejected => "REJECTED",
            OrderStatus::Triggered => "TRIGGERED",
            OrderStatus::PartiallyFilled => "PARTIALLY_FILLED",
            OrderStatus::Filled => "FILLED",
            OrderStatus::Canceled => "CANCELED",
            OrderStatus::Expired => "EXPIRED",
        };
        write!(f, "{name}")
    }
}

/// A single order, tracked from initialization through its terminal state.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Order {
    pub trader_id: TraderId,
    pub strategy_id: StrategyId,
    pub client_order_id: ClientOrderId,
    pub venue_order_id: Option<VenueOrderId>,
    pub instrument_id: InstrumentId,
    pub side: Side,
    pub order_type: OrderType,
    pub quantity: Quantity,
    pub price: Option<Price>,
    pub trigger: Option<Price>,
    pub time_in_force: TimeInForce,
    pub status: OrderStatus,
    pub ts_init: DateTime<Utc>,
}

impl Order {
    /// True if the order rests on the book rather than crossing immediately.
    pub fn is_passive(&self) -> bool {
        self.order_type != OrderType::Market
    }

    pub fn is_aggressive(&self) -> bool {
        self.order_type == OrderType::Market
    }

    /// True if the order is live at the venue: accepted, triggered or partially filled.
    pub fn is_working(&self) -> bool {
        matches!(
            self.status,
            OrderStatus::Accepted | OrderStatus::Triggered | OrderStatus::PartiallyFilled
        )
    }

    /// True if the order has reached a terminal (absorbing) state.
    pub fn is_completed(&self) -> bool {
        self.status.is_terminal()
    }

    /// Apply an [`OrderEvent`] to this order, transitioning its status.
    ///
    /// Terminal states are absorbing: any further event is an invalid transition.
    pub fn apply(&mut self, event: &OrderEvent) -> Result<(), OrderError> {
        if event.client_order_id != self.client_order_id {
            return Err(OrderError::ClientOrderIdMismatch {
                event: event.kind.to_string(),
                event_cid: event.client_order_id.to_string(),
                order_cid: self.client_order_id.to_string(),
            });
        }

        let next = match (self.status, &event.kind) {
            // Initialized is re-statable (the event that created the order)
            (OrderStatus::Initialized, OrderEventKind::Initialized) => OrderStatus::Initialized,
            (OrderStatus::Initialized, OrderEventKind::Denied { .. }) => OrderStatus::Denied,
            (OrderStatus::Initialized, OrderEventKind::Invalid { .. }) => OrderStatus::Invalid,
            (OrderStatus::Initialized, OrderEventKind::Submitted) => OrderStatus::Submitted,

            (OrderStatus::Submitted, OrderEventKind::Accepted { venue_order_id }) => {
                self.venue_order_id = Some(venue_order_id.clone());
                OrderStatus::Accepted
            }
            (OrderStatus::Submitted, OrderEventKind::Rejected { .. }) => OrderStatus::Rejected,
            (OrderStatus::Submitted, OrderEventKind::Filled(_)) => OrderStatus::Filled,
            (OrderStatus::Submitted, OrderEventKind::PartiallyFilled(_)) => {
                OrderStatus::PartiallyFilled
            }

            (OrderStatus::Accepted, OrderEventKind::Triggered) => OrderStatus::Triggered,
            (
                OrderStatus::Accepted | OrderStatus::Triggered,
                OrderEventKind::Updated {
                    quantity,
                    price,
                    trigger,
                },
            ) => {
                if let Some(quantity) = quantity {
                    self.quantity = *quantity;
                }
                if price.is_some() {
                    self.price = *price;
                }
                if trigger.is_some() {
                    self.trigger = *trigger;
                }
                self.status
            }
            (
                OrderStatus::Accepted | OrderStatus::Triggered | OrderStatus::PartiallyFilled,
                OrderEventKind::PartiallyFilled(_),
            ) => OrderStatus::PartiallyFilled,
            (
                OrderStatus::Accepted | OrderStatus::Triggered | OrderStatus::PartiallyFilled,
                OrderEventKind::Filled(_),
            ) => OrderStatus::Filled,
            (
                OrderStatus::Accepted | OrderStatus::Triggered | OrderStatus::PartiallyFilled,
                OrderEventKind::Canceled,
            ) => OrderStatus::Canceled,
            (
                OrderStatus::Accepted | OrderStatus::Triggered | OrderStatus::PartiallyFilled,
                OrderEventKind::Expired,
            ) => OrderStatus::Expired,

            (status, kind) => {
                return Err(OrderError::InvalidStateTransition {
                    status: status.to_string(),
                    event: kind.to_string(),
                })
            }
        };

        self.status = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::order::event::Fill;
    use capstan_instrument::LiquiditySide;
    use rust_decimal_macros::dec;

    fn order(order_type: OrderType) -> Order {
        Order {
            trader_id: TraderId::new("TRADER-001"),
            strategy_id: StrategyId::new("EmaCross-001"),
            client_order_id: ClientOrderId::new("O-1"),
            venue_order_id: None,
            instrument_id: InstrumentId::new("EUR/USD", "SIM"),
            side: Side::Buy,
            order_type,
            quantity: Quantity::new(dec!(100_000), 0).unwrap(),
            price: Some(Price::new(dec!(1.10), 5).unwrap()),
            trigger: None,
            time_in_force: TimeInForce::GoodUntilCancelled,
            status: OrderStatus::Initialized,
            ts_init: DateTime::<Utc>::MIN_UTC,
        }
    }

    fn event(kind: OrderEventKind) -> OrderEvent {
        OrderEvent::new(
            StrategyId::new("EmaCross-001"),
            InstrumentId::new("EUR/USD", "SIM"),
            ClientOrderId::new("O-1"),
            kind,
            DateTime::<Utc>::MIN_UTC,
        )
    }

    fn fill() -> Fill {
        Fill {
            venue_order_id: VenueOrderId::new("V-1"),
            last_px: Price::new(dec!(1.10), 5).unwrap(),
            last_qty: Quantity::new(dec!(100_000), 0).unwrap(),
            liquidity_side: LiquiditySide::Taker,
            commission: None,
        }
    }

    #[test]
    fn test_happy_path_to_filled() {
        let mut order = order(OrderType::Limit);

        order.apply(&event(OrderEventKind::Submitted)).unwrap();
        order
            .apply(&event(OrderEventKind::Accepted {
                venue_order_id: VenueOrderId::new("V-1"),
            }))
            .unwrap();
        assert!(order.is_working());
        assert_eq!(order.venue_order_id, Some(VenueOrderId::new("V-1")));

        order
            .apply(&event(OrderEventKind::PartiallyFilled(fill())))
            .unwrap();
        order.apply(&event(OrderEventKind::Filled(fill()))).unwrap();

        assert_eq!(order.status, OrderStatus::Filled);
        assert!(order.is_completed());
    }

    #[test]
    fn test_denied_from_initialized() {
        let mut order = order(OrderType::Limit);
        order
            .apply(&event(OrderEventKind::Denied {
                reason: "Duplicate O-1".into(),
            }))
            .unwrap();

        assert_eq!(order.status, OrderStatus::Denied);
        assert!(order.is_completed());
        assert!(!order.is_working());
    }

    #[test]
    fn test_terminal_states_are_absorbing() {
        let mut order = order(OrderType::Limit);
        order
            .apply(&event(OrderEventKind::Denied {
                reason: "Duplicate O-1".into(),
            }))
            .unwrap();

        let err = order.apply(&event(OrderEventKind::Submitted)).unwrap_err();
        assert!(matches!(err, OrderError::InvalidStateTransition { .. }));
        assert_eq!(order.status, OrderStatus::Denied);
    }

    #[test]
    fn test_updated_amends_in_place() {
        let mut order = order(OrderType::Limit);
        order.apply(&event(OrderEventKind::Submitted)).unwrap();
        order
            .apply(&event(OrderEventKind::Accepted {
                venue_order_id: VenueOrderId::new("V-1"),
            }))
            .unwrap();

        order
            .apply(&event(OrderEventKind::Updated {
                quantity: Some(Quantity::new(dec!(50_000), 0).unwrap()),
                price: Some(Price::new(dec!(1.09), 5).unwrap()),
                trigger: None,
            }))
            .unwrap();

        assert_eq!(order.status, OrderStatus::Accepted);
        assert_eq!(order.quantity, Quantity::new(dec!(50_000), 0).unwrap());
        assert_eq!(order.price, Some(Price::new(dec!(1.09), 5).unwrap()));
    }

    #[test]
    fn test_event_for_other_order_is_rejected() {
        let mut order = order(OrderType::Limit);
        let foreign = OrderEvent::new(
            StrategyId::new("EmaCross-001"),
            InstrumentId::new("EUR/USD", "SIM"),
            ClientOrderId::new("O-2"),
            OrderEventKind::Submitted,
            DateTime::<Utc>::MIN_UTC,
        );

        let err = order.apply(&foreign).unwrap_err();
        assert!(matches!(err, OrderError::ClientOrderIdMismatch { .. }));
    }

    #[test]
    fn test_market_order_is_aggressive() {
        assert!(order(OrderType::Market).is_aggressive());
        assert!(!order(OrderType::Market).is_passive());
        assert!(order(OrderType::Limit).is_passive());
        assert!(order(OrderType::StopLimit).is_passive());
    }
}
