use crate::{
    bus::{BusMessage, MessageBus},
    cache::Cache,
    clock::Clock,
    portfolio::PortfolioFacade,
    risk::throttler::Throttler,
};
use capstan_execution::{
    command::{
        CancelOrder, ModifyOrder, SubmitBracketOrder, SubmitOrder, TradingCommand,
        EXEC_ENGINE_EXECUTE, EXEC_ENGINE_PROCESS, RISK_ENGINE_EXECUTE,
    },
    order::{
        event::{OrderEvent, OrderEventKind},
        id::{ClientOrderId, StrategyId},
        Order, OrderType,
    },
};
use capstan_instrument::{
    instrument::{AssetType, Instrument},
    price::Price,
    quantity::Quantity,
    symbol::InstrumentId,
    Side,
};
use chrono::TimeDelta;
use fnv::FnvHashMap;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Non-blocking order-rate [`Throttler`](throttler::Throttler).
pub mod throttler;

/// Coarse risk posture restricting which commands the risk engine forwards.
///
/// * `Active` - all commands flow.
/// * `Reducing` - commands that would increase exposure on a net-long/short instrument are
///   denied.
/// * `Halted` - all trading commands except `CancelOrder` are denied.
#[derive(
    Debug, Copy, Clone, Default, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize,
)]
#[serde(rename_all = "snake_case")]
pub enum TradingState {
    #[default]
    Active,
    Reducing,
    Halted,
}

/// Audit record of a [`TradingState`] update, containing the previous and current state.
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub struct TradingStateAudit {
    pub prev: TradingState,
    pub current: TradingState,
}

/// Maximum command rate: `limit` commands per `interval`, the interval expressed in
/// nanoseconds.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Deserialize, Serialize)]
pub struct RateLimit {
    pub limit: usize,
    pub interval_ns: u64,
}

impl RateLimit {
    pub fn new(limit: usize, interval: TimeDelta) -> Self {
        Self {
            limit,
            interval_ns: interval.num_nanoseconds().unwrap_or(i64::MAX).unsigned_abs(),
        }
    }

    pub fn interval(&self) -> TimeDelta {
        TimeDelta::nanoseconds(self.interval_ns.min(i64::MAX as u64) as i64)
    }
}

impl Default for RateLimit {
    /// 100 order commands per second.
    fn default() -> Self {
        Self::new(100, TimeDelta::seconds(1))
    }
}

/// Risk engine configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RiskEngineConfig {
    /// Skip all pre-trade checks (the duplicate-id check still runs).
    pub bypass: bool,
    /// Order-rate limit applied to submit commands.
    #[serde(default)]
    pub max_order_rate: RateLimit,
    /// Per-instrument cap on the notional value of a single order; absent means disabled for
    /// that instrument.
    #[serde(default)]
    pub max_notional_per_order: FnvHashMap<InstrumentId, Decimal>,
}

/// Pre-trade command gateway.
///
/// Every trading command passes through here before reaching execution. Commands are either
/// forwarded in submission order, or denied with exactly one observable `Denied` event sent
/// through the execution engine's event endpoint - user-submitted orders never raise.
pub struct RiskEngine<C, P, K> {
    config: RiskEngineConfig,
    trading_state: TradingState,
    cache: Arc<Mutex<C>>,
    portfolio: Arc<Mutex<P>>,
    bus: Arc<MessageBus>,
    throttler: Throttler,
    clock: K,
}

impl<C, P, K> std::fmt::Debug for RiskEngine<C, P, K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RiskEngine")
            .field("config", &self.config)
            .field("trading_state", &self.trading_state)
            .finish_non_exhaustive()
    }
}

impl<C, P, K> RiskEngine<C, P, K>
where
    C: Cache,
    P: PortfolioFacade,
    K: Clock,
{
    pub fn new(
        config: RiskEngineConfig,
        cache: Arc<Mutex<C>>,
        portfolio: Arc<Mutex<P>>,
        bus: Arc<MessageBus>,
        clock: K,
    ) -> Self {
        let throttler = Throttler::new(
            config.max_order_rate.limit,
            config.max_order_rate.interval(),
        );

        Self {
            config,
            trading_state: TradingState::Active,
            cache,
            portfolio,
            bus,
            throttler,
            clock,
        }
    }

    pub fn trading_state(&self) -> TradingState {
        self.trading_state
    }

    /// Transition the trading state, returning the audit of the change.
    pub fn set_trading_state(&mut self, state: TradingState) -> TradingStateAudit {
        let prev = self.trading_state;
        if prev == state {
            info!(?state, "RiskEngine trading state unchanged");
        } else {
            info!(?prev, next = ?state, "RiskEngine trading state updated");
        }
        self.trading_state = state;

        TradingStateAudit {
            prev,
            current: state,
        }
    }

    /// Execute a trading command: validate, gate, rate-limit, then forward or deny.
    pub fn execute(&mut self, command: TradingCommand) {
        debug!(%command, "RiskEngine received command");
        match command {
            TradingCommand::SubmitOrder(command) => self.handle_submit_order(command),
            TradingCommand::SubmitBracketOrder(command) => self.handle_submit_bracket(command),
            TradingCommand::ModifyOrder(command) => self.handle_modify_order(command),
            TradingCommand::CancelOrder(command) => self.handle_cancel_order(command),
        }
    }

    fn handle_submit_order(&mut self, command: SubmitOrder) {
        let order = &command.order;

        if self.cache.lock().order_exists(&order.client_order_id) {
            self.deny_order(order, format!("Duplicate {}", order.client_order_id), false);
            return;
        }

        if let Err(err) = self
            .cache
            .lock()
            .add_order(order.clone(), command.position_id.clone())
        {
            error!(%err, "RiskEngine could not cache order");
            return;
        }

        if let Some(position_id) = &command.position_id {
            if !self.cache.lock().position_exists(position_id) {
                self.deny_order(order, format!("Position {position_id} not found"), true);
                return;
            }
        }

        if self.config.bypass {
            self.send_to_execution(TradingCommand::SubmitOrder(command));
            return;
        }

        let instrument = self.cache.lock().instrument(&order.instrument_id).cloned();
        let Some(instrument) = instrument else {
            self.deny_order(
                order,
                format!("Instrument {} not found", order.instrument_id),
                true,
            );
            return;
        };

        if let Some(reason) = self.pre_trade_checks(order, &instrument) {
            self.deny_order(order, reason, true);
            return;
        }

        self.execution_gateway(TradingCommand::SubmitOrder(command));
    }

    fn handle_submit_bracket(&mut self, command: SubmitBracketOrder) {
        let bracket = &command.bracket;

        let duplicate: Option<ClientOrderId> = {
            let cache = self.cache.lock();
            bracket
                .orders()
                .find(|order| cache.order_exists(&order.client_order_id))
                .map(|order| order.client_order_id.clone())
        };
        if let Some(duplicate) = duplicate {
            for order in bracket.orders() {
                self.deny_order(order, format!("Duplicate {duplicate} in bracket"), false);
            }
            return;
        }

        for order in bracket.orders() {
            if let Err(err) = self.cache.lock().add_order(order.clone(), None) {
                error!(%err, "RiskEngine could not cache bracket order");
                return;
            }
        }

        if self.config.bypass {
            self.send_to_execution(TradingCommand::SubmitBracketOrder(command));
            return;
        }

        let instrument_id = &bracket.entry.instrument_id;
        let instrument = self.cache.lock().instrument(instrument_id).cloned();
        let Some(instrument) = instrument else {
            let reason = format!("Instrument {instrument_id} not found");
            for order in bracket.orders() {
                self.deny_order(order, reason.clone(), true);
            }
            return;
        };

        for order in bracket.orders() {
            if let Some(reason) = self.pre_trade_checks(order, &instrument) {
                for order in bracket.orders() {
                    self.deny_order(order, reason.clone(), true);
                }
                return;
            }
        }

        self.execution_gateway(TradingCommand::SubmitBracketOrder(command));
    }

    fn handle_modify_order(&mut self, command: ModifyOrder) {
        let Some(order) = self.cache.lock().order(&command.client_order_id).cloned() else {
            self.deny_command(
                &command.strategy_id,
                &command.instrument_id,
                &command.client_order_id,
                format!("Order {} not found", command.client_order_id),
            );
            return;
        };

        if order.is_completed() {
            self.deny_command(
                &command.strategy_id,
                &command.instrument_id,
                &command.client_order_id,
                format!("Order {} already completed", command.client_order_id),
            );
            return;
        }

        if self.config.bypass {
            self.send_to_execution(TradingCommand::ModifyOrder(command));
            return;
        }

        let Some(instrument) = self.cache.lock().instrument(&command.instrument_id).cloned()
        else {
            self.deny_command(
                &command.strategy_id,
                &command.instrument_id,
                &command.client_order_id,
                format!("Instrument {} not found", command.instrument_id),
            );
            return;
        };

        if let Some(reason) = Self::modify_checks(&command, &instrument) {
            self.deny_command(
                &command.strategy_id,
                &command.instrument_id,
                &command.client_order_id,
                reason,
            );
            return;
        }

        match self.trading_state {
            TradingState::Halted => {
                self.deny_command(
                    &command.strategy_id,
                    &command.instrument_id,
                    &command.client_order_id,
                    "TradingState is HALTED".to_owned(),
                );
                return;
            }
            TradingState::Reducing => {
                let increases = command
                    .quantity
                    .map(|quantity| quantity.value() > order.quantity.value())
                    .unwrap_or(false);

                if increases {
                    if let Some(reason) = self.reducing_violation(order.side, &order.instrument_id)
                    {
                        self.deny_command(
                            &command.strategy_id,
                            &command.instrument_id,
                            &command.client_order_id,
                            reason,
                        );
                        return;
                    }
                }
            }
            TradingState::Active => {}
        }

        self.send_to_execution(TradingCommand::ModifyOrder(command));
    }

    /// Cancels always forward when the order is still alive - even while HALTED.
    fn handle_cancel_order(&mut self, command: CancelOrder) {
        let Some(order) = self.cache.lock().order(&command.client_order_id).cloned() else {
            self.deny_command(
                &command.strategy_id,
                &command.instrument_id,
                &command.client_order_id,
                format!("Order {} not found", command.client_order_id),
            );
            return;
        };

        if order.is_completed() {
            self.deny_command(
                &command.strategy_id,
                &command.instrument_id,
                &command.client_order_id,
                format!("Order {} already completed", command.client_order_id),
            );
            return;
        }

        self.send_to_execution(TradingCommand::CancelOrder(command));
    }

    /// The ordered pre-trade checks: price precision, trigger precision, quantity precision,
    /// quantity bounds, then notional cap. Returns the denial reason of the first failure.
    fn pre_trade_checks(&self, order: &Order, instrument: &Instrument) -> Option<String> {
        if let Some(price) = order.price {
            if let Some(reason) = Self::check_price(price, instrument) {
                return Some(reason);
            }
        }

        if let Some(trigger) = order.trigger {
            if let Some(reason) = Self::check_price(trigger, instrument) {
                return Some(reason.replace("price", "trigger"));
            }
        }

        if let Some(reason) = Self::check_quantity(order.quantity, instrument) {
            return Some(reason);
        }

        self.check_notional(order, instrument)
    }

    fn check_price(price: Price, instrument: &Instrument) -> Option<String> {
        if price.precision() > instrument.price_precision {
            return Some(format!(
                "price {price} invalid: precision {} exceeds instrument precision {}",
                price.precision(),
                instrument.price_precision
            ));
        }

        if !price.is_positive() && instrument.asset_type != AssetType::Option {
            return Some(format!("price {price} invalid: not positive"));
        }

        None
    }

    fn check_quantity(quantity: Quantity, instrument: &Instrument) -> Option<String> {
        if quantity.precision() > instrument.size_precision {
            return Some(format!(
                "quantity {quantity} invalid: precision {} exceeds instrument precision {}",
                quantity.precision(),
                instrument.size_precision
            ));
        }

        if let Some(min) = instrument.min_quantity {
            if quantity.value() < min.value() {
                return Some(format!("quantity {quantity} invalid: under minimum {min}"));
            }
        }

        if let Some(max) = instrument.max_quantity {
            if quantity.value() > max.value() {
                return Some(format!("quantity {quantity} invalid: exceeds maximum {max}"));
            }
        }

        None
    }

    fn check_notional(&self, order: &Order, instrument: &Instrument) -> Option<String> {
        let limit = *self.config.max_notional_per_order.get(&order.instrument_id)?;

        let effective_price = match order.order_type {
            OrderType::Market => {
                let Some(quote) = self.portfolio.lock().quote(&order.instrument_id) else {
                    return Some(format!(
                        "no quote available for {} to check MAX_NOTIONAL_PER_ORDER",
                        order.instrument_id
                    ));
                };
                quote.price_for_entry(order.side)
            }
            _ => match order.price.or(order.trigger) {
                Some(price) => price,
                None => {
                    return Some(format!(
                        "no price on {} order to check MAX_NOTIONAL_PER_ORDER",
                        order.order_type
                    ))
                }
            },
        };

        let notional = instrument.notional_value(order.quantity, effective_price);
        if notional.amount() > limit {
            return Some(format!(
                "Exceeds MAX_NOTIONAL_PER_ORDER {limit} @ notional {}",
                notional.amount()
            ));
        }

        None
    }

    fn modify_checks(command: &ModifyOrder, instrument: &Instrument) -> Option<String> {
        if let Some(price) = command.price {
            if let Some(reason) = Self::check_price(price, instrument) {
                return Some(reason);
            }
        }

        if let Some(trigger) = command.trigger {
            if let Some(reason) = Self::check_price(trigger, instrument) {
                return Some(reason.replace("price", "trigger"));
            }
        }

        if let Some(quantity) = command.quantity {
            if let Some(reason) = Self::check_quantity(quantity, instrument) {
                return Some(reason);
            }
        }

        None
    }

    /// The trading-state gate for submit commands, followed by the order-rate throttler.
    fn execution_gateway(&mut self, command: TradingCommand) {
        let (side, instrument_id) = match &command {
            TradingCommand::SubmitOrder(submit) => {
                (submit.order.side, submit.order.instrument_id.clone())
            }
            TradingCommand::SubmitBracketOrder(submit) => (
                submit.bracket.entry.side,
                submit.bracket.entry.instrument_id.clone(),
            ),
            _ => return self.send_with_throttle(command),
        };

        match self.trading_state {
            TradingState::Halted => {
                self.deny_submit(&command, "TradingState is HALTED".to_owned());
            }
            TradingState::Reducing => match self.reducing_violation(side, &instrument_id) {
                Some(reason) => self.deny_submit(&command, reason),
                None => self.send_with_throttle(command),
            },
            TradingState::Active => self.send_with_throttle(command),
        }
    }

    fn reducing_violation(&self, side: Side, instrument_id: &InstrumentId) -> Option<String> {
        let portfolio = self.portfolio.lock();
        match side {
            Side::Buy if portfolio.is_net_long(instrument_id) => Some(format!(
                "TradingState is REDUCING and LONG {instrument_id}"
            )),
            Side::Sell if portfolio.is_net_short(instrument_id) => Some(format!(
                "TradingState is REDUCING and SHORT {instrument_id}"
            )),
            _ => None,
        }
    }

    fn send_with_throttle(&mut self, command: TradingCommand) {
        let now = self.clock.time();
        if self.throttler.try_send(now) {
            self.send_to_execution(command);
        } else {
            self.deny_submit(&command, "Exceeded MAX_ORDER_RATE".to_owned());
        }
    }

    fn deny_submit(&self, command: &TradingCommand, reason: String) {
        match command {
            TradingCommand::SubmitOrder(submit) => {
                self.deny_order(&submit.order, reason, true);
            }
            TradingCommand::SubmitBracketOrder(submit) => {
                for order in submit.bracket.orders() {
                    self.deny_order(order, reason.clone(), true);
                }
            }
            TradingCommand::ModifyOrder(modify) => self.deny_command(
                &modify.strategy_id,
                &modify.instrument_id,
                &modify.client_order_id,
                reason,
            ),
            TradingCommand::CancelOrder(cancel) => self.deny_command(
                &cancel.strategy_id,
                &cancel.instrument_id,
                &cancel.client_order_id,
                reason,
            ),
        }
    }

    /// Emit exactly one `Denied` event for the order through the execution event endpoint.
    ///
    /// When `apply_to_cache` the cached order transitions INITIALIZED -> DENIED first, making
    /// the denial observable in the cache. Duplicate-id denials must not touch the cache -
    /// the cached order under that id is an earlier, innocent order.
    fn deny_order(&self, order: &Order, reason: String, apply_to_cache: bool) {
        warn!(
            client_order_id = %order.client_order_id,
            %reason,
            "RiskEngine denied order"
        );

        let event = OrderEvent::new(
            order.strategy_id.clone(),
            order.instrument_id.clone(),
            order.client_order_id.clone(),
            OrderEventKind::Denied {
                reason: SmolStr::new(&reason),
            },
            self.clock.time(),
        );

        if apply_to_cache {
            let mut cache = self.cache.lock();
            if let Some(mut cached) = cache.order(&order.client_order_id).cloned() {
                match cached.apply(&event) {
                    Ok(()) => {
                        if let Err(err) = cache.update_order(&cached) {
                            error!(%err, "RiskEngine could not persist denied order");
                        }
                    }
                    Err(err) => debug!(%err, "denied order not transitioned in cache"),
                }
            }
        }

        self.bus.send(EXEC_ENGINE_PROCESS, &BusMessage::Order(event));
    }

    /// Deny a modify/cancel command that never reached execution. The referenced order's state
    /// is untouched.
    fn deny_command(
        &self,
        strategy_id: &StrategyId,
        instrument_id: &InstrumentId,
        client_order_id: &ClientOrderId,
        reason: String,
    ) {
        warn!(%client_order_id, %reason, "RiskEngine denied command");

        let event = OrderEvent::new(
            strategy_id.clone(),
            instrument_id.clone(),
            client_order_id.clone(),
            OrderEventKind::Denied {
                reason: SmolStr::new(&reason),
            },
            self.clock.time(),
        );

        self.bus.send(EXEC_ENGINE_PROCESS, &BusMessage::Order(event));
    }

    fn send_to_execution(&self, command: TradingCommand) {
        debug!(%command, "RiskEngine forwarding command to execution");
        self.bus
            .send(EXEC_ENGINE_EXECUTE, &BusMessage::Command(command));
    }
}

/// Register the engine as the `"RiskEngine.execute"` endpoint on its bus.
pub fn register_risk_engine<C, P, K>(engine: Arc<Mutex<RiskEngine<C, P, K>>>)
where
    C: Cache + Send + 'static,
    P: PortfolioFacade + Send + 'static,
    K: Clock + Send + 'static,
{
    let bus = Arc::clone(&engine.lock().bus);
    let endpoint_engine = Arc::clone(&engine);

    bus.register_endpoint(
        RISK_ENGINE_EXECUTE,
        crate::bus::handler(move |message| match message {
            BusMessage::Command(command) => endpoint_engine.lock().execute(command.clone()),
            other => warn!(?other, "RiskEngine endpoint received a non-command message"),
        }),
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limit_default_is_100_per_second() {
        let rate = RateLimit::default();
        assert_eq!(rate.limit, 100);
        assert_eq!(rate.interval(), TimeDelta::seconds(1));
        assert_eq!(rate.interval_ns, 1_000_000_000);
    }

    #[test]
    fn test_trading_state_default_is_active() {
        assert_eq!(TradingState::default(), TradingState::Active);
    }

    #[test]
    fn test_config_serde_round_trip() {
        let mut config = RiskEngineConfig {
            bypass: false,
            max_order_rate: RateLimit::new(2, TimeDelta::seconds(1)),
            max_notional_per_order: FnvHashMap::default(),
        };
        config.max_notional_per_order.insert(
            InstrumentId::new("EUR/USD", "SIM"),
            Decimal::from(100_000),
        );

        let json = serde_json::to_string(&config).unwrap();
        let parsed: RiskEngineConfig = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed.bypass, config.bypass);
        assert_eq!(parsed.max_order_rate, config.max_order_rate);
        assert_eq!(
            parsed.max_notional_per_order[&InstrumentId::new("EUR/USD", "SIM")],
            Decimal::from(100_000)
        );
    }
}
