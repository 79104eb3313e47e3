use crate::{
    bus::MessageBus,
    cache::{Cache, InMemoryCache},
    clock::Clock,
    execution_link::{register_execution_link, UnboundedRx},
    portfolio::{register_portfolio, Portfolio},
    risk::{register_risk_engine, RiskEngine, RiskEngineConfig},
    trader::{Trader, TraderConfig},
};
use capstan_execution::{command::TradingCommand, order::id::TraderId};
use capstan_instrument::instrument::Instrument;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize, Error)]
pub enum SystemError {
    #[error("SystemBuilder incomplete: missing {0}")]
    BuilderIncomplete(&'static str),
}

/// A fully wired trading core: bus, cache, portfolio, risk engine, trader and the execution
/// command link, sharing one clock type.
///
/// The `execution_rx` receiver yields risk-approved [`TradingCommand`]s in forwarding order
/// for a host execution engine to drain.
pub struct System<K> {
    pub bus: Arc<MessageBus>,
    pub cache: Arc<Mutex<InMemoryCache>>,
    pub portfolio: Arc<Mutex<Portfolio<InMemoryCache>>>,
    pub risk_engine: Arc<Mutex<RiskEngine<InMemoryCache, Portfolio<InMemoryCache>, K>>>,
    pub trader: Trader<InMemoryCache, K>,
    pub execution_rx: UnboundedRx<TradingCommand>,
}

impl<K> std::fmt::Debug for System<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("System")
            .field("trader", &self.trader)
            .finish_non_exhaustive()
    }
}

/// Builder to construct wired [`System`] instances.
#[derive(Debug)]
pub struct SystemBuilder<K> {
    trader_id: Option<TraderId>,
    risk_config: Option<RiskEngineConfig>,
    clock: Option<K>,
    instruments: Vec<Instrument>,
    allow_registration_while_running: bool,
}

impl<K> Default for SystemBuilder<K> {
    fn default() -> Self {
        Self {
            trader_id: None,
            risk_config: None,
            clock: None,
            instruments: Vec::new(),
            allow_registration_while_running: false,
        }
    }
}

impl<K> SystemBuilder<K>
where
    K: Clock + Default + Send + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trader_id(self, value: TraderId) -> Self {
        Self {
            trader_id: Some(value),
            ..self
        }
    }

    pub fn risk_config(self, value: RiskEngineConfig) -> Self {
        Self {
            risk_config: Some(value),
            ..self
        }
    }

    /// Clock instance for the risk engine; trader-managed components still receive fresh
    /// instances at registration.
    pub fn clock(self, value: K) -> Self {
        Self {
            clock: Some(value),
            ..self
        }
    }

    pub fn instrument(mut self, value: Instrument) -> Self {
        self.instruments.push(value);
        self
    }

    pub fn allow_registration_while_running(self, value: bool) -> Self {
        Self {
            allow_registration_while_running: value,
            ..self
        }
    }

    /// Wire all components into a [`System`]: cache seeded with the instruments, portfolio
    /// subscribed to its topics, risk engine registered at `"RiskEngine.execute"`, execution
    /// link draining `"ExecEngine.execute"`.
    pub fn build(self) -> Result<System<K>, SystemError> {
        let trader_id = self
            .trader_id
            .ok_or(SystemError::BuilderIncomplete("trader_id"))?;
        let risk_config = self.risk_config.unwrap_or_default();
        let clock = self.clock.unwrap_or_default();

        let bus = Arc::new(MessageBus::new());

        let cache = Arc::new(Mutex::new(InMemoryCache::new()));
        {
            let mut cache = cache.lock();
            for instrument in self.instruments {
                cache.add_instrument(instrument);
            }
        }

        let portfolio = Arc::new(Mutex::new(Portfolio::new(Arc::clone(&cache))));
        register_portfolio(Arc::clone(&portfolio), &bus);

        let risk_engine = Arc::new(Mutex::new(RiskEngine::new(
            risk_config,
            Arc::clone(&cache),
            Arc::clone(&portfolio),
            Arc::clone(&bus),
            clock,
        )));
        register_risk_engine(Arc::clone(&risk_engine));

        let execution_rx = register_execution_link(&bus);

        let mut trader_config = TraderConfig::new(trader_id);
        trader_config.allow_registration_while_running = self.allow_registration_while_running;
        let trader = Trader::new(
            trader_config,
            Arc::clone(&bus),
            Arc::clone(&cache),
            Arc::clone(&portfolio),
        );

        info!(trader_id = %trader.trader_id(), "System built");

        Ok(System {
            bus,
            cache,
            portfolio,
            risk_engine,
            trader,
            execution_rx,
        })
    }
}
