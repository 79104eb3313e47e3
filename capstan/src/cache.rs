use capstan_execution::{
    order::{
        id::{ClientOrderId, PositionId, StrategyId},
        Order,
    },
    position::Position,
};
use capstan_instrument::{instrument::Instrument, symbol::InstrumentId};
use fnv::FnvHashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize, Error)]
pub enum CacheError {
    #[error("order already exists in the cache: {0}")]
    DuplicateClientOrderId(String),

    #[error("position already exists in the cache: {0}")]
    DuplicatePositionId(String),

    #[error("expected data not present in the cache: {0}")]
    ExpectedDataNotPresent(String),
}

/// Capability interface over the shared order/position/instrument store.
///
/// Orders and positions are owned here; the portfolio and risk engine hold relationship-only
/// views. Persistence semantics beyond this key-value interface are an external concern.
pub trait Cache {
    fn add_instrument(&mut self, instrument: Instrument);

    fn instrument(&self, instrument_id: &InstrumentId) -> Option<&Instrument>;

    /// Index a new order, optionally related to an existing position.
    fn add_order(&mut self, order: Order, position_id: Option<PositionId>)
        -> Result<(), CacheError>;

    /// Overwrite the stored order with an updated snapshot.
    fn update_order(&mut self, order: &Order) -> Result<(), CacheError>;

    fn order(&self, client_order_id: &ClientOrderId) -> Option<&Order>;

    fn order_exists(&self, client_order_id: &ClientOrderId) -> bool;

    fn order_count(&self) -> usize;

    fn orders(&self) -> Vec<&Order>;

    fn orders_for_strategy(&self, strategy_id: &StrategyId) -> Vec<&Order>;

    fn add_position(&mut self, position: Position) -> Result<(), CacheError>;

    /// Overwrite the stored position with an updated snapshot.
    fn update_position(&mut self, position: &Position) -> Result<(), CacheError>;

    fn position(&self, position_id: &PositionId) -> Option<&Position>;

    fn position_exists(&self, position_id: &PositionId) -> bool;

    fn open_positions(&self) -> Vec<&Position>;

    fn open_positions_for_strategy(&self, strategy_id: &StrategyId) -> Vec<&Position>;

    fn reset(&mut self);
}

/// In-memory [`Cache`] implementation.
///
/// **Careful in production - no fault tolerant guarantees!**
#[derive(Debug, Default)]
pub struct InMemoryCache {
    instruments: FnvHashMap<InstrumentId, Instrument>,
    orders: FnvHashMap<ClientOrderId, Order>,
    order_position_index: FnvHashMap<ClientOrderId, PositionId>,
    positions: FnvHashMap<PositionId, Position>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The position an order was submitted against, if any.
    pub fn position_id_for_order(&self, client_order_id: &ClientOrderId) -> Option<&PositionId> {
        self.order_position_index.get(client_order_id)
    }
}

impl Cache for InMemoryCache {
    fn add_instrument(&mut self, instrument: Instrument) {
        self.instruments.insert(instrument.id.clone(), instrument);
    }

    fn instrument(&self, instrument_id: &InstrumentId) -> Option<&Instrument> {
        self.instruments.get(instrument_id)
    }

    fn add_order(
        &mut self,
        order: Order,
        position_id: Option<PositionId>,
    ) -> Result<(), CacheError> {
        if self.orders.contains_key(&order.client_order_id) {
            return Err(CacheError::DuplicateClientOrderId(
                order.client_order_id.to_string(),
            ));
        }

        if let Some(position_id) = position_id {
            self.order_position_index
                .insert(order.client_order_id.clone(), position_id);
        }
        self.orders.insert(order.client_order_id.clone(), order);
        Ok(())
    }

    fn update_order(&mut self, order: &Order) -> Result<(), CacheError> {
        match self.orders.get_mut(&order.client_order_id) {
            Some(stored) => {
                *stored = order.clone();
                Ok(())
            }
            None => Err(CacheError::ExpectedDataNotPresent(
                order.client_order_id.to_string(),
            )),
        }
    }

    fn order(&self, client_order_id: &ClientOrderId) -> Option<&Order> {
        self.orders.get(client_order_id)
    }

    fn order_exists(&self, client_order_id: &ClientOrderId) -> bool {
        self.orders.contains_key(client_order_id)
    }

    fn order_count(&self) -> usize {
        self.orders.len()
    }

    fn orders(&self) -> Vec<&Order> {
        self.orders.values().collect()
    }

    fn orders_for_strategy(&self, strategy_id: &StrategyId) -> Vec<&Order> {
        self.orders
            .values()
            .filter(|order| &order.strategy_id == strategy_id)
            .collect()
    }

    fn add_position(&mut self, position: Position) -> Result<(), CacheError> {
        if self.positions.contains_key(&position.id) {
            return Err(CacheError::DuplicatePositionId(position.id.to_string()));
        }

        self.positions.insert(position.id.clone(), position);
        Ok(())
    }

    fn update_position(&mut self, position: &Position) -> Result<(), CacheError> {
        match self.positions.get_mut(&position.id) {
            Some(stored) => {
                *stored = position.clone();
                Ok(())
            }
            None => Err(CacheError::ExpectedDataNotPresent(position.id.to_string())),
        }
    }

    fn position(&self, position_id: &PositionId) -> Option<&Position> {
        self.positions.get(position_id)
    }

    fn position_exists(&self, position_id: &PositionId) -> bool {
        self.positions.contains_key(position_id)
    }

    fn open_positions(&self) -> Vec<&Position> {
        self.positions
            .values()
            .filter(|position| position.is_open())
            .collect()
    }

    fn open_positions_for_strategy(&self, strategy_id: &StrategyId) -> Vec<&Position> {
        self.positions
            .values()
            .filter(|position| position.is_open() && &position.strategy_id == strategy_id)
            .collect()
    }

    fn reset(&mut self) {
        self.orders.clear();
        self.order_position_index.clear();
        self.positions.clear();
        // Instruments survive a reset - they are reference data, not trading state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use capstan_execution::order::{
        id::{StrategyId, TraderId},
        OrderStatus, OrderType, TimeInForce,
    };
    use capstan_instrument::{price::Price, quantity::Quantity, Side};
    use chrono::{DateTime, Utc};
    use rust_decimal_macros::dec;

    fn order(cid: &str) -> Order {
        Order {
            trader_id: TraderId::new("TRADER-001"),
            strategy_id: StrategyId::new("EmaCross-001"),
            client_order_id: ClientOrderId::new(cid),
            venue_order_id: None,
            instrument_id: InstrumentId::new("EUR/USD", "SIM"),
            side: Side::Buy,
            order_type: OrderType::Limit,
            quantity: Quantity::new(dec!(100_000), 0).unwrap(),
            price: Some(Price::new(dec!(1.10), 5).unwrap()),
            trigger: None,
            time_in_force: TimeInForce::GoodUntilCancelled,
            status: OrderStatus::Initialized,
            ts_init: DateTime::<Utc>::MIN_UTC,
        }
    }

    #[test]
    fn test_add_order_rejects_duplicates() {
        let mut cache = InMemoryCache::new();

        cache.add_order(order("O-1"), None).unwrap();
        assert!(cache.order_exists(&ClientOrderId::new("O-1")));
        assert_eq!(cache.order_count(), 1);

        let err = cache.add_order(order("O-1"), None).unwrap_err();
        assert!(matches!(err, CacheError::DuplicateClientOrderId(_)));
    }

    #[test]
    fn test_order_position_index() {
        let mut cache = InMemoryCache::new();
        cache
            .add_order(order("O-1"), Some(PositionId::new("P-1")))
            .unwrap();

        assert_eq!(
            cache.position_id_for_order(&ClientOrderId::new("O-1")),
            Some(&PositionId::new("P-1"))
        );
        assert_eq!(cache.position_id_for_order(&ClientOrderId::new("O-2")), None);
    }

    #[test]
    fn test_update_order_requires_existing() {
        let mut cache = InMemoryCache::new();
        let mut stored = order("O-1");
        cache.add_order(stored.clone(), None).unwrap();

        stored.status = OrderStatus::Denied;
        cache.update_order(&stored).unwrap();
        assert_eq!(
            cache.order(&ClientOrderId::new("O-1")).unwrap().status,
            OrderStatus::Denied
        );

        let err = cache.update_order(&order("O-2")).unwrap_err();
        assert!(matches!(err, CacheError::ExpectedDataNotPresent(_)));
    }

    #[test]
    fn test_reset_clears_trading_state_keeps_instruments() {
        let mut cache = InMemoryCache::new();
        cache.add_instrument(capstan_instrument::test_utils::fx_instrument(
            "EUR/USD",
            "SIM",
            capstan_instrument::asset::Currency::usd(),
        ));
        cache.add_order(order("O-1"), None).unwrap();

        cache.reset();

        assert_eq!(cache.order_count(), 0);
        assert!(cache
            .instrument(&InstrumentId::new("EUR/USD", "SIM"))
            .is_some());
    }
}
