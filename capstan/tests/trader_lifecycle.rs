mod util;

use capstan::{
    cache::InMemoryCache,
    clock::TestClock,
    component::{Component, ComponentId, ComponentState},
    risk::RiskEngineConfig,
    strategy::{OmsType, Strategy, StrategyConfig},
    trader::{Trader, TraderConfig, TraderError},
};
use capstan_execution::order::id::TraderId;
use capstan_instrument::venue::Venue;
use std::sync::Arc;
use util::TestStack;

type TestTrader = Trader<InMemoryCache, TestClock>;
type TestStrategy = Strategy<InMemoryCache, TestClock>;

fn trader(stack: &TestStack) -> TestTrader {
    Trader::new(
        TraderConfig::new(TraderId::new("TRADER-001")),
        Arc::clone(&stack.bus),
        Arc::clone(&stack.cache),
        Arc::clone(&stack.portfolio),
    )
}

fn strategy(stack: &TestStack, name: &str, tag: Option<&str>) -> TestStrategy {
    Strategy::new(
        StrategyConfig {
            name: name.into(),
            order_id_tag: tag.map(Into::into),
            oms_type: OmsType::Netting,
        },
        Arc::clone(&stack.bus),
        Arc::clone(&stack.cache),
    )
}

#[derive(Debug)]
struct TestActor {
    id: ComponentId,
    state: ComponentState,
}

impl TestActor {
    fn new(id: &str) -> Box<Self> {
        Box::new(Self {
            id: ComponentId::new(id),
            state: ComponentState::Ready,
        })
    }
}

impl Component for TestActor {
    fn component_id(&self) -> ComponentId {
        self.id.clone()
    }

    fn state(&self) -> ComponentState {
        self.state
    }

    fn start(&mut self) {
        self.state = ComponentState::Running;
    }

    fn stop(&mut self) {
        self.state = ComponentState::Stopped;
    }

    fn reset(&mut self) {
        self.state = ComponentState::Ready;
    }

    fn dispose(&mut self) {
        self.state = ComponentState::Disposed;
    }
}

#[test]
fn test_order_id_tags_auto_assigned_zero_padded_and_unique() {
    let stack = TestStack::new(RiskEngineConfig::default());
    let mut trader = trader(&stack);

    let first = trader
        .register_strategy(strategy(&stack, "EmaCross", None))
        .unwrap();
    let second = trader
        .register_strategy(strategy(&stack, "Momentum", None))
        .unwrap();

    assert_eq!(first.to_string(), "EmaCross-001");
    assert_eq!(second.to_string(), "Momentum-002");

    // An explicit tag colliding with an assigned one is rejected
    let err = trader
        .register_strategy(strategy(&stack, "Scalper", Some("002")))
        .unwrap_err();
    assert_eq!(err, TraderError::DuplicateOrderIdTag("002".to_owned()));

    // Auto-assignment skips used tags
    let third = trader
        .register_strategy(strategy(&stack, "Scalper", None))
        .unwrap();
    assert_eq!(third.to_string(), "Scalper-003");
}

#[test]
fn test_duplicate_component_ids_rejected() {
    let stack = TestStack::new(RiskEngineConfig::default());
    let mut trader = trader(&stack);

    trader
        .register_strategy(strategy(&stack, "EmaCross", Some("001")))
        .unwrap();
    let err = trader
        .register_strategy(strategy(&stack, "EmaCross", Some("001")))
        .unwrap_err();
    assert!(matches!(err, TraderError::DuplicateComponentId(_)));

    trader.register_actor(TestActor::new("NewsMonitor")).unwrap();
    let err = trader
        .register_actor(TestActor::new("NewsMonitor"))
        .unwrap_err();
    assert!(matches!(err, TraderError::DuplicateComponentId(_)));
}

#[test]
fn test_registration_while_running_requires_controller_flag() {
    let stack = TestStack::new(RiskEngineConfig::default());
    let mut trader = trader(&stack);
    trader.start();

    let err = trader
        .register_strategy(strategy(&stack, "EmaCross", None))
        .unwrap_err();
    assert_eq!(err, TraderError::RegistrationWhileRunning);

    let mut config = TraderConfig::new(TraderId::new("TRADER-002"));
    config.allow_registration_while_running = true;
    let mut controller_trader = Trader::new(
        config,
        Arc::clone(&stack.bus),
        Arc::clone(&stack.cache),
        Arc::clone(&stack.portfolio),
    );
    controller_trader.start();

    assert!(controller_trader
        .register_strategy(strategy(&stack, "EmaCross", None))
        .is_ok());
}

#[test]
fn test_lifecycle_fans_out_in_addition_order() {
    let stack = TestStack::new(RiskEngineConfig::default());
    let mut trader = trader(&stack);

    let strategy_id = trader
        .register_strategy(strategy(&stack, "EmaCross", None))
        .unwrap();
    trader.register_actor(TestActor::new("NewsMonitor")).unwrap();
    trader
        .register_exec_algorithm(TestActor::new("Twap"))
        .unwrap();
    assert_eq!(trader.component_count(), 3);

    trader.start();
    assert_eq!(trader.state(), ComponentState::Running);
    assert_eq!(
        trader.strategy(&strategy_id).unwrap().state(),
        ComponentState::Running
    );

    trader.stop();
    assert_eq!(trader.state(), ComponentState::Stopped);
    assert_eq!(
        trader.strategy(&strategy_id).unwrap().state(),
        ComponentState::Stopped
    );

    // Stopping again tolerates the already-stopped components
    trader.stop();
    assert_eq!(trader.state(), ComponentState::Stopped);

    trader.dispose();
    assert_eq!(trader.state(), ComponentState::Disposed);
    assert_eq!(
        trader.strategy(&strategy_id).unwrap().state(),
        ComponentState::Disposed
    );
}

#[test]
fn test_reset_also_resets_the_portfolio() {
    let stack = TestStack::new(RiskEngineConfig::default());
    stack.add_fx_instrument("EUR/USD");
    stack.register_sim_account();

    let mut trader = trader(&stack);
    trader
        .register_strategy(strategy(&stack, "EmaCross", None))
        .unwrap();

    trader.start();
    let err = trader.reset().unwrap_err();
    assert!(matches!(err, TraderError::InvalidState { .. }));

    trader.stop();
    trader.reset().unwrap();

    assert_eq!(trader.state(), ComponentState::Ready);
    assert!(stack
        .portfolio
        .lock()
        .account(&Venue::new("SIM"))
        .is_none());
}

#[test]
fn test_unregistered_strategy_egress_fails() {
    use capstan::strategy::StrategyError;
    use capstan_instrument::{quantity::Quantity, Side};
    use rust_decimal_macros::dec;

    let stack = TestStack::new(RiskEngineConfig::default());
    let mut unregistered = strategy(&stack, "EmaCross", Some("001"));

    assert!(!unregistered.is_registered());
    assert_eq!(
        unregistered.order_factory().unwrap_err(),
        StrategyError::NotRegistered
    );

    let order = util::limit_order("O-1", "EUR/USD", Side::Buy, dec!(100_000), dec!(1.10));
    assert_eq!(
        unregistered.submit_order(order.clone(), None).unwrap_err(),
        StrategyError::NotRegistered
    );
    assert_eq!(
        unregistered.cancel_order(&order).unwrap_err(),
        StrategyError::NotRegistered
    );
    assert_eq!(
        unregistered
            .modify_order(&order, Some(Quantity::new(dec!(1), 0).unwrap()), None, None)
            .unwrap_err(),
        StrategyError::NotRegistered
    );
}
