//! Builds a complete trading core with the [`SystemBuilder`], then submits orders through the
//! risk gateway and drains what reaches execution.

use capstan::{
    account::Account,
    bus::{handler, BusMessage},
    clock::LiveClock,
    logging::init_logging,
    strategy::{OmsType, Strategy, StrategyConfig},
    system::SystemBuilder,
};
use capstan_data::{
    event::{quote_topic, DataEvent},
    quote::QuoteTick,
};
use capstan_execution::{
    balance::{AccountBalance, AccountState},
    command::EXEC_ENGINE_PROCESS,
    order::id::{AccountId, TraderId},
};
use capstan_instrument::{
    asset::Currency, price::Price, quantity::Quantity, symbol::InstrumentId, test_utils, Side,
};
use chrono::Utc;
use rust_decimal_macros::dec;
use std::sync::Arc;

fn main() {
    init_logging();

    let mut risk_config = capstan::risk::RiskEngineConfig::default();
    risk_config
        .max_notional_per_order
        .insert(InstrumentId::new("EUR/USD", "SIM"), dec!(1_000_000));

    let mut system = SystemBuilder::new()
        .trader_id(TraderId::new("TRADER-001"))
        .risk_config(risk_config)
        .clock(LiveClock)
        .instrument(test_utils::fx_instrument("EUR/USD", "SIM", Currency::usd()))
        .build()
        .expect("complete system builder");

    system
        .portfolio
        .lock()
        .register_account(Account::new(
            AccountState::new(
                AccountId::new("SIM", "001"),
                vec![AccountBalance::new(
                    Currency::usd(),
                    dec!(1_000_000),
                    dec!(1_000_000),
                    dec!(0),
                )
                .expect("valid balance")],
                Utc::now(),
            ),
            Some(Currency::usd()),
        ))
        .expect("venue free");

    system.bus.register_endpoint(
        EXEC_ENGINE_PROCESS,
        handler(|message| {
            if let BusMessage::Order(event) = message {
                println!("execution event: {} {}", event.client_order_id, event.kind);
            }
        }),
    );

    let strategy_id = system
        .trader
        .register_strategy(Strategy::new(
            StrategyConfig {
                name: "EmaCross".into(),
                order_id_tag: None,
                oms_type: OmsType::Netting,
            },
            Arc::clone(&system.bus),
            Arc::clone(&system.cache),
        ))
        .expect("unique strategy");
    system.trader.start();

    // Feed the latest quote so market orders can be notional-checked
    let tick = QuoteTick {
        instrument_id: InstrumentId::new("EUR/USD", "SIM"),
        bid: Price::new(dec!(1.10000), 5).expect("valid price"),
        ask: Price::new(dec!(1.10010), 5).expect("valid price"),
        bid_size: Quantity::new(dec!(5_000_000), 0).expect("valid quantity"),
        ask_size: Quantity::new(dec!(5_000_000), 0).expect("valid quantity"),
        ts_event: Utc::now(),
    };
    system.bus.publish(
        &quote_topic(&tick.instrument_id),
        &BusMessage::Data(DataEvent::Quote(tick)),
    );

    // A limit buy within the notional cap, and a market buy that exceeds it
    {
        let strategy = system.trader.strategy_mut(&strategy_id).expect("registered");
        let now = strategy.time().expect("clock");

        let within = strategy.order_factory().expect("factory").limit(
            InstrumentId::new("EUR/USD", "SIM"),
            Side::Buy,
            Quantity::new(dec!(100_000), 0).expect("valid quantity"),
            Price::new(dec!(1.09), 5).expect("valid price"),
            now,
        );
        strategy.submit_order(within, None).expect("registered");

        let too_large = strategy.order_factory().expect("factory").market(
            InstrumentId::new("EUR/USD", "SIM"),
            Side::Buy,
            Quantity::new(dec!(2_000_000), 0).expect("valid quantity"),
            now,
        );
        strategy.submit_order(too_large, None).expect("registered");
    }

    for command in system.execution_rx.by_ref() {
        println!("forwarded to execution: {command}");
    }

    system.trader.stop();
}
