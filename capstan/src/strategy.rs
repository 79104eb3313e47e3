use crate::{
    bus::{BusMessage, MessageBus},
    cache::Cache,
    clock::Clock,
    component::{Component, ComponentId, ComponentState},
};
use capstan_execution::{
    bracket::BracketOrder,
    command::{
        CancelOrder, ModifyOrder, SubmitBracketOrder, SubmitOrder, TradingCommand,
        RISK_ENGINE_EXECUTE,
    },
    order::{
        event::{OrderEvent, OrderEventKind},
        id::{ClientOrderId, PositionId, StrategyId, TraderId},
        Order, OrderStatus, OrderType, TimeInForce,
    },
};
use capstan_instrument::{price::Price, quantity::Quantity, symbol::InstrumentId, Side};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize, Error)]
pub enum StrategyError {
    #[error("strategy is not registered with a trader")]
    NotRegistered,

    #[error("position not found: {0}")]
    PositionNotFound(String),
}

/// Order management policy for a strategy.
///
/// `Hedging` permits multiple positions per instrument; `Netting` forces the single position
/// id `"<instrument_id>-<strategy_id>"`.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OmsType {
    Hedging,
    Netting,
}

/// Strategy configuration.
///
/// The strategy identifier becomes `"<name>-<order_id_tag>"`; an absent tag is auto-assigned
/// by the trader at registration.
#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize)]
pub struct StrategyConfig {
    pub name: SmolStr,
    pub order_id_tag: Option<SmolStr>,
    pub oms_type: OmsType,
}

/// Generates orders with monotonic [`ClientOrderId`]s.
///
/// The counter is seeded from the cache order count at strategy registration, so restarts
/// continue the sequence rather than reusing identifiers.
#[derive(Debug, Clone)]
pub struct OrderFactory {
    trader_id: TraderId,
    strategy_id: StrategyId,
    count: usize,
}

impl OrderFactory {
    pub fn new(trader_id: TraderId, strategy_id: StrategyId, count_seed: usize) -> Self {
        Self {
            trader_id,
            strategy_id,
            count: count_seed,
        }
    }

    pub fn count(&self) -> usize {
        self.count
    }

    fn next_client_order_id(&mut self, now: DateTime<Utc>) -> ClientOrderId {
        self.count += 1;
        ClientOrderId::new(format!(
            "O-{}-{}-{}-{}",
            now.timestamp_millis(),
            self.trader_id.tag(),
            self.strategy_id.order_id_tag(),
            self.count
        ))
    }

    fn order(
        &mut self,
        instrument_id: InstrumentId,
        side: Side,
        order_type: OrderType,
        quantity: Quantity,
        price: Option<Price>,
        trigger: Option<Price>,
        now: DateTime<Utc>,
    ) -> Order {
        Order {
            trader_id: self.trader_id.clone(),
            strategy_id: self.strategy_id.clone(),
            client_order_id: self.next_client_order_id(now),
            venue_order_id: None,
            instrument_id,
            side,
            order_type,
            quantity,
            price,
            trigger,
            time_in_force: TimeInForce::GoodUntilCancelled,
            status: OrderStatus::Initialized,
            ts_init: now,
        }
    }

    pub fn market(
        &mut self,
        instrument_id: InstrumentId,
        side: Side,
        quantity: Quantity,
        now: DateTime<Utc>,
    ) -> Order {
        self.order(instrument_id, side, OrderType::Market, quantity, None, None, now)
    }

    pub fn limit(
        &mut self,
        instrument_id: InstrumentId,
        side: Side,
        quantity: Quantity,
        price: Price,
        now: DateTime<Utc>,
    ) -> Order {
        self.order(
            instrument_id,
            side,
            OrderType::Limit,
            quantity,
            Some(price),
            None,
            now,
        )
    }

    pub fn stop_market(
        &mut self,
        instrument_id: InstrumentId,
        side: Side,
        quantity: Quantity,
        trigger: Price,
        now: DateTime<Utc>,
    ) -> Order {
        self.order(
            instrument_id,
            side,
            OrderType::StopMarket,
            quantity,
            None,
            Some(trigger),
            now,
        )
    }

    pub fn stop_limit(
        &mut self,
        instrument_id: InstrumentId,
        side: Side,
        quantity: Quantity,
        price: Price,
        trigger: Price,
        now: DateTime<Utc>,
    ) -> Order {
        self.order(
            instrument_id,
            side,
            OrderType::StopLimit,
            quantity,
            Some(price),
            Some(trigger),
            now,
        )
    }

    /// Build a bracket around an entry order: a stop-loss on the opposing side, and optionally
    /// a take-profit limit.
    pub fn bracket(
        &mut self,
        entry: Order,
        stop_loss_trigger: Price,
        take_profit_price: Option<Price>,
        now: DateTime<Utc>,
    ) -> BracketOrder {
        let exit_side = entry.side.inverse();

        let stop_loss = self.stop_market(
            entry.instrument_id.clone(),
            exit_side,
            entry.quantity,
            stop_loss_trigger,
            now,
        );
        let take_profit = take_profit_price.map(|price| {
            self.limit(
                entry.instrument_id.clone(),
                exit_side,
                entry.quantity,
                price,
                now,
            )
        });

        BracketOrder::new(entry, stop_loss, take_profit)
    }
}

/// Trading command egress for a single strategy.
///
/// Each egress call constructs a typed command, publishes the order's initialization event on
/// the order-events topic, then sends the command to the `"RiskEngine.execute"` endpoint.
/// Every call fails with [`StrategyError::NotRegistered`] until a trader has registered the
/// strategy.
pub struct Strategy<C, K> {
    config: StrategyConfig,
    id: StrategyId,
    trader_id: Option<TraderId>,
    clock: Option<K>,
    bus: Arc<MessageBus>,
    cache: Arc<Mutex<C>>,
    order_factory: Option<OrderFactory>,
    state: ComponentState,
}

impl<C, K> std::fmt::Debug for Strategy<C, K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Strategy")
            .field("id", &self.id)
            .field("trader_id", &self.trader_id)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl<C, K> Strategy<C, K>
where
    C: Cache,
    K: Clock,
{
    pub fn new(config: StrategyConfig, bus: Arc<MessageBus>, cache: Arc<Mutex<C>>) -> Self {
        let id = match &config.order_id_tag {
            Some(tag) => StrategyId::new(format!("{}-{tag}", config.name)),
            None => StrategyId::new(config.name.as_str()),
        };

        Self {
            config,
            id,
            trader_id: None,
            clock: None,
            bus,
            cache,
            order_factory: None,
            state: ComponentState::Ready,
        }
    }

    pub fn id(&self) -> &StrategyId {
        &self.id
    }

    pub fn config(&self) -> &StrategyConfig {
        &self.config
    }

    pub fn order_id_tag(&self) -> Option<&SmolStr> {
        self.config.order_id_tag.as_ref()
    }

    pub fn is_registered(&self) -> bool {
        self.trader_id.is_some()
    }

    /// Wire the strategy into a trader: identity, fresh clock, and an order factory seeded
    /// from the current cache order count.
    pub(crate) fn register(&mut self, trader_id: TraderId, clock: K, order_id_tag: SmolStr) {
        self.config.order_id_tag = Some(order_id_tag.clone());
        self.id = StrategyId::new(format!("{}-{order_id_tag}", self.config.name));

        let count_seed = self.cache.lock().order_count();
        self.order_factory = Some(OrderFactory::new(
            trader_id.clone(),
            self.id.clone(),
            count_seed,
        ));
        self.trader_id = Some(trader_id);
        self.clock = Some(clock);

        info!(strategy_id = %self.id, "Strategy registered");
    }

    fn ensure_registered(&self) -> Result<&TraderId, StrategyError> {
        self.trader_id.as_ref().ok_or(StrategyError::NotRegistered)
    }

    fn now(&self) -> Result<DateTime<Utc>, StrategyError> {
        self.clock
            .as_ref()
            .map(Clock::time)
            .ok_or(StrategyError::NotRegistered)
    }

    /// Access the order factory to build orders for this strategy.
    pub fn order_factory(&mut self) -> Result<&mut OrderFactory, StrategyError> {
        self.order_factory
            .as_mut()
            .ok_or(StrategyError::NotRegistered)
    }

    /// Current time from the strategy's registered clock.
    pub fn time(&self) -> Result<DateTime<Utc>, StrategyError> {
        self.now()
    }

    /// The position id this strategy's fills net into under its OMS policy: `Netting` forces
    /// one id per instrument, `Hedging` has a new id assigned per opened position externally.
    pub fn position_id_for(&self, instrument_id: &InstrumentId) -> Option<PositionId> {
        match self.config.oms_type {
            OmsType::Netting => Some(PositionId::new(format!("{instrument_id}-{}", self.id))),
            OmsType::Hedging => None,
        }
    }

    /// Publish the order's initialization event, then send a `SubmitOrder` command to the
    /// risk endpoint.
    ///
    /// `position_id` attaches the order to an existing position (eg/ when flattening); leave
    /// `None` for entries.
    pub fn submit_order(
        &mut self,
        order: Order,
        position_id: Option<PositionId>,
    ) -> Result<(), StrategyError> {
        let trader_id = self.ensure_registered()?.clone();
        let now = self.now()?;

        self.publish_initialized(&order, now);

        let command = TradingCommand::SubmitOrder(SubmitOrder {
            trader_id,
            strategy_id: self.id.clone(),
            position_id,
            order,
            command_id: Uuid::new_v4(),
            ts_init: now,
        });
        self.bus.send(RISK_ENGINE_EXECUTE, &BusMessage::Command(command));
        Ok(())
    }

    /// Publish initialization events for every order in the bracket, then send a
    /// `SubmitBracketOrder` command to the risk endpoint.
    pub fn submit_bracket_order(&mut self, bracket: BracketOrder) -> Result<(), StrategyError> {
        let trader_id = self.ensure_registered()?.clone();
        let now = self.now()?;

        for order in bracket.orders() {
            self.publish_initialized(order, now);
        }

        let command = TradingCommand::SubmitBracketOrder(SubmitBracketOrder {
            trader_id,
            strategy_id: self.id.clone(),
            bracket,
            command_id: Uuid::new_v4(),
            ts_init: now,
        });
        self.bus.send(RISK_ENGINE_EXECUTE, &BusMessage::Command(command));
        Ok(())
    }

    /// Send a `ModifyOrder` command amending the order's quantity, price and/or trigger.
    pub fn modify_order(
        &mut self,
        order: &Order,
        quantity: Option<Quantity>,
        price: Option<Price>,
        trigger: Option<Price>,
    ) -> Result<(), StrategyError> {
        let trader_id = self.ensure_registered()?.clone();
        let now = self.now()?;

        let command = TradingCommand::ModifyOrder(ModifyOrder {
            trader_id,
            strategy_id: self.id.clone(),
            instrument_id: order.instrument_id.clone(),
            client_order_id: order.client_order_id.clone(),
            quantity,
            price,
            trigger,
            command_id: Uuid::new_v4(),
            ts_init: now,
        });
        self.bus.send(RISK_ENGINE_EXECUTE, &BusMessage::Command(command));
        Ok(())
    }

    /// Send a `CancelOrder` command for the order.
    pub fn cancel_order(&mut self, order: &Order) -> Result<(), StrategyError> {
        let trader_id = self.ensure_registered()?.clone();
        let now = self.now()?;

        let command = TradingCommand::CancelOrder(CancelOrder {
            trader_id,
            strategy_id: self.id.clone(),
            instrument_id: order.instrument_id.clone(),
            client_order_id: order.client_order_id.clone(),
            venue_order_id: order.venue_order_id.clone(),
            command_id: Uuid::new_v4(),
            ts_init: now,
        });
        self.bus.send(RISK_ENGINE_EXECUTE, &BusMessage::Command(command));
        Ok(())
    }

    /// Cancel every not-yet-completed order of this strategy, optionally filtered by
    /// instrument.
    pub fn cancel_all_orders(
        &mut self,
        instrument_id: Option<&InstrumentId>,
    ) -> Result<(), StrategyError> {
        self.ensure_registered()?;

        let orders: Vec<Order> = {
            let cache = self.cache.lock();
            cache
                .orders_for_strategy(&self.id)
                .into_iter()
                .filter(|order| !order.is_completed())
                .filter(|order| {
                    instrument_id
                        .map(|id| &order.instrument_id == id)
                        .unwrap_or(true)
                })
                .cloned()
                .collect()
        };

        for order in orders {
            self.cancel_order(&order)?;
        }
        Ok(())
    }

    /// Submit a market order closing the full open quantity of the position.
    pub fn flatten_position(&mut self, position_id: &PositionId) -> Result<(), StrategyError> {
        self.ensure_registered()?;
        let now = self.now()?;

        let position = {
            let cache = self.cache.lock();
            cache
                .position(position_id)
                .cloned()
                .ok_or_else(|| StrategyError::PositionNotFound(position_id.to_string()))?
        };

        if position.is_closed() {
            warn!(%position_id, "cannot flatten a position that is already closed");
            return Ok(());
        }

        let exit_side = if position.is_long() {
            Side::Sell
        } else {
            Side::Buy
        };
        let order = self.order_factory()?.market(
            position.instrument_id.clone(),
            exit_side,
            position.quantity,
            now,
        );

        self.submit_order(order, Some(position_id.clone()))
    }

    /// Flatten every open position of this strategy, optionally filtered by instrument.
    pub fn flatten_all_positions(
        &mut self,
        instrument_id: Option<&InstrumentId>,
    ) -> Result<(), StrategyError> {
        self.ensure_registered()?;

        let position_ids: Vec<PositionId> = {
            let cache = self.cache.lock();
            cache
                .open_positions_for_strategy(&self.id)
                .into_iter()
                .filter(|position| {
                    instrument_id
                        .map(|id| &position.instrument_id == id)
                        .unwrap_or(true)
                })
                .map(|position| position.id.clone())
                .collect()
        };

        for position_id in position_ids {
            self.flatten_position(&position_id)?;
        }
        Ok(())
    }

    fn publish_initialized(&self, order: &Order, now: DateTime<Utc>) {
        let event = OrderEvent::new(
            self.id.clone(),
            order.instrument_id.clone(),
            order.client_order_id.clone(),
            OrderEventKind::Initialized,
            now,
        );
        self.bus
            .publish(&OrderEvent::topic(&self.id), &BusMessage::Order(event));
    }
}

impl<C, K> Component for Strategy<C, K>
where
    C: Cache,
    K: Clock,
{
    fn component_id(&self) -> ComponentId {
        ComponentId::new(self.id.0.as_str())
    }

    fn state(&self) -> ComponentState {
        self.state
    }

    fn start(&mut self) {
        match self.state {
            ComponentState::Ready | ComponentState::Stopped => {
                info!(strategy_id = %self.id, "Strategy starting");
                self.state = ComponentState::Running;
            }
            state => warn!(strategy_id = %self.id, ?state, "Strategy cannot start"),
        }
    }

    fn stop(&mut self) {
        match self.state {
            ComponentState::Running => {
                info!(strategy_id = %self.id, "Strategy stopping");
                self.state = ComponentState::Stopped;
            }
            state => warn!(strategy_id = %self.id, ?state, "Strategy already stopped"),
        }
    }

    fn reset(&mut self) {
        if self.state.is_running() {
            warn!(strategy_id = %self.id, "cannot reset a running Strategy");
            return;
        }

        if let (Some(trader_id), Some(_)) = (&self.trader_id, &self.order_factory) {
            let count_seed = self.cache.lock().order_count();
            self.order_factory = Some(OrderFactory::new(
                trader_id.clone(),
                self.id.clone(),
                count_seed,
            ));
        }
        self.state = ComponentState::Ready;
        info!(strategy_id = %self.id, "Strategy reset");
    }

    fn dispose(&mut self) {
        self.state = ComponentState::Disposed;
        info!(strategy_id = %self.id, "Strategy disposed");
    }
}
