use capstan::{
    account::Account,
    bus::{handler, BusMessage, MessageBus},
    cache::{Cache, InMemoryCache},
    clock::TestClock,
    execution_link::UnboundedRx,
    portfolio::Portfolio,
    risk::{RiskEngine, RiskEngineConfig},
    system::{System, SystemBuilder},
};
use capstan_data::quote::QuoteTick;
use capstan_execution::{
    balance::{AccountBalance, AccountState},
    command::{SubmitOrder, TradingCommand, EXEC_ENGINE_PROCESS},
    order::{
        event::{OrderEvent, OrderEventKind},
        id::{AccountId, ClientOrderId, PositionId, StrategyId, TraderId},
        Order, OrderStatus, OrderType, TimeInForce,
    },
    position::Position,
};
use capstan_instrument::{
    asset::Currency, price::Price, quantity::Quantity, symbol::InstrumentId, test_utils, Side,
};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::sync::Arc;
use uuid::Uuid;

pub type TestPortfolio = Portfolio<InMemoryCache>;
pub type TestRiskEngine = RiskEngine<InMemoryCache, TestPortfolio, TestClock>;

/// Fully wired core: bus, cache, portfolio, risk engine, execution link and a denial
/// collector on the execution event endpoint.
pub struct TestStack {
    pub bus: Arc<MessageBus>,
    pub cache: Arc<Mutex<InMemoryCache>>,
    pub portfolio: Arc<Mutex<TestPortfolio>>,
    pub engine: Arc<Mutex<TestRiskEngine>>,
    pub clock: TestClock,
    pub exec_rx: UnboundedRx<TradingCommand>,
    pub events: Arc<Mutex<Vec<OrderEvent>>>,
}

impl TestStack {
    pub fn new(config: RiskEngineConfig) -> Self {
        let clock = TestClock::default();
        let System {
            bus,
            cache,
            portfolio,
            risk_engine,
            trader: _,
            execution_rx,
        } = SystemBuilder::new()
            .trader_id(TraderId::new("TRADER-001"))
            .risk_config(config)
            .clock(clock.clone())
            .build()
            .expect("complete system builder");

        let events = Arc::new(Mutex::new(Vec::new()));
        {
            let events = Arc::clone(&events);
            bus.register_endpoint(
                EXEC_ENGINE_PROCESS,
                handler(move |message| {
                    if let BusMessage::Order(event) = message {
                        events.lock().push(event.clone());
                    }
                }),
            );
        }

        Self {
            bus,
            cache,
            portfolio,
            engine: risk_engine,
            clock,
            exec_rx: execution_rx,
            events,
        }
    }

    pub fn add_fx_instrument(&self, symbol: &str) {
        self.cache
            .lock()
            .add_instrument(test_utils::fx_instrument(symbol, "SIM", Currency::usd()));
    }

    pub fn register_sim_account(&self) {
        let state = AccountState::new(
            AccountId::new("SIM", "001"),
            vec![
                AccountBalance::new(
                    Currency::usd(),
                    Decimal::from(1_000_000),
                    Decimal::from(1_000_000),
                    Decimal::ZERO,
                )
                .unwrap(),
            ],
            ts(),
        );
        self.portfolio
            .lock()
            .register_account(Account::new(state, Some(Currency::usd())))
            .unwrap();
    }

    pub fn set_quote(&self, symbol: &str, bid: Decimal, ask: Decimal) {
        self.portfolio.lock().update_quote_tick(quote(symbol, bid, ask));
    }

    pub fn open_position(&self, id: &str, symbol: &str, relative_qty: Decimal, avg: Decimal) {
        let position = position(id, symbol, relative_qty, avg);
        self.cache.lock().add_position(position.clone()).unwrap();
        self.portfolio
            .lock()
            .update_position(&capstan_execution::position::PositionEvent::Opened(position));
    }

    pub fn denials(&self) -> Vec<OrderEvent> {
        self.events
            .lock()
            .iter()
            .filter(|event| matches!(event.kind, OrderEventKind::Denied { .. }))
            .cloned()
            .collect()
    }

    pub fn denial_reasons(&self) -> Vec<String> {
        self.denials()
            .iter()
            .map(|event| match &event.kind {
                OrderEventKind::Denied { reason } => reason.to_string(),
                _ => unreachable!(),
            })
            .collect()
    }

    pub fn forwarded(&mut self) -> Vec<TradingCommand> {
        self.exec_rx.by_ref().collect()
    }

    pub fn cached_order_status(&self, cid: &str) -> Option<OrderStatus> {
        self.cache
            .lock()
            .order(&ClientOrderId::new(cid))
            .map(|order| order.status)
    }
}

pub fn ts() -> DateTime<Utc> {
    DateTime::<Utc>::UNIX_EPOCH
}

pub fn quote(symbol: &str, bid: Decimal, ask: Decimal) -> QuoteTick {
    QuoteTick {
        instrument_id: InstrumentId::new(symbol, "SIM"),
        bid: Price::new(bid, 5).unwrap(),
        ask: Price::new(ask, 5).unwrap(),
        bid_size: Quantity::new(Decimal::from(1_000_000), 0).unwrap(),
        ask_size: Quantity::new(Decimal::from(1_000_000), 0).unwrap(),
        ts_event: ts(),
    }
}

pub fn position(id: &str, symbol: &str, relative_qty: Decimal, avg: Decimal) -> Position {
    let entry_side = if relative_qty >= Decimal::ZERO {
        Side::Buy
    } else {
        Side::Sell
    };
    Position {
        id: PositionId::new(id),
        strategy_id: StrategyId::new("EmaCross-001"),
        instrument_id: InstrumentId::new(symbol, "SIM"),
        entry_side,
        quantity: Quantity::new(relative_qty.abs(), 8).unwrap(),
        relative_qty,
        avg_open: avg,
        multiplier: Decimal::ONE,
        is_inverse: false,
        settlement_currency: Currency::usd(),
        ts_opened: ts(),
        ts_closed: None,
    }
}

pub fn order(cid: &str, symbol: &str, side: Side, order_type: OrderType, qty: Decimal) -> Order {
    Order {
        trader_id: TraderId::new("TRADER-001"),
        strategy_id: StrategyId::new("EmaCross-001"),
        client_order_id: ClientOrderId::new(cid),
        venue_order_id: None,
        instrument_id: InstrumentId::new(symbol, "SIM"),
        side,
        order_type,
        quantity: Quantity::new(qty, 0).unwrap(),
        price: None,
        trigger: None,
        time_in_force: TimeInForce::GoodUntilCancelled,
        status: OrderStatus::Initialized,
        ts_init: ts(),
    }
}

pub fn limit_order(cid: &str, symbol: &str, side: Side, qty: Decimal, price: Decimal) -> Order {
    Order {
        price: Some(Price::new(price, 5).unwrap()),
        ..order(cid, symbol, side, OrderType::Limit, qty)
    }
}

pub fn stop_market_order(
    cid: &str,
    symbol: &str,
    side: Side,
    qty: Decimal,
    trigger: Decimal,
) -> Order {
    Order {
        trigger: Some(Price::new(trigger, 5).unwrap()),
        ..order(cid, symbol, side, OrderType::StopMarket, qty)
    }
}

pub fn submit(order: Order) -> TradingCommand {
    TradingCommand::SubmitOrder(SubmitOrder {
        trader_id: order.trader_id.clone(),
        strategy_id: order.strategy_id.clone(),
        position_id: None,
        order,
        command_id: Uuid::new_v4(),
        ts_init: ts(),
    })
}
