use crate::{
    bus::MessageBus,
    cache::Cache,
    clock::Clock,
    component::{Component, ComponentId, ComponentState},
    portfolio::Portfolio,
    strategy::Strategy,
};
use capstan_execution::order::id::{StrategyId, TraderId};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::{collections::HashSet, sync::Arc};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize, Error)]
pub enum TraderError {
    #[error("component id already registered: {0}")]
    DuplicateComponentId(String),

    #[error("order_id_tag already in use: {0}")]
    DuplicateOrderIdTag(String),

    #[error("cannot register components while the trader is RUNNING")]
    RegistrationWhileRunning,

    #[error("operation {operation} invalid in state {state:?}")]
    InvalidState {
        operation: String,
        state: ComponentState,
    },
}

/// Trader configuration.
#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize)]
pub struct TraderConfig {
    pub trader_id: TraderId,
    /// Controller flag permitting component registration while the trader is RUNNING.
    pub allow_registration_while_running: bool,
}

impl TraderConfig {
    pub fn new(trader_id: TraderId) -> Self {
        Self {
            trader_id,
            allow_registration_while_running: false,
        }
    }
}

/// Component lifecycle supervisor.
///
/// Registers strategies, actors and execution algorithms - each with a fresh clock instance
/// and a unique component identifier - and fans lifecycle transitions out to them in addition
/// order. Strategy `order_id_tag`s are enforced unique, auto-assigning a zero-padded sequence
/// when absent.
pub struct Trader<C, K> {
    config: TraderConfig,
    state: ComponentState,
    bus: Arc<MessageBus>,
    cache: Arc<Mutex<C>>,
    portfolio: Arc<Mutex<Portfolio<C>>>,
    strategies: Vec<Strategy<C, K>>,
    actors: Vec<Box<dyn Component>>,
    exec_algorithms: Vec<Box<dyn Component>>,
}

impl<C, K> std::fmt::Debug for Trader<C, K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Trader")
            .field("trader_id", &self.config.trader_id)
            .field("state", &self.state)
            .field("strategies", &self.strategies.len())
            .field("actors", &self.actors.len())
            .field("exec_algorithms", &self.exec_algorithms.len())
            .finish()
    }
}

impl<C, K> Trader<C, K>
where
    C: Cache,
    K: Clock + Default,
{
    pub fn new(
        config: TraderConfig,
        bus: Arc<MessageBus>,
        cache: Arc<Mutex<C>>,
        portfolio: Arc<Mutex<Portfolio<C>>>,
    ) -> Self {
        info!(trader_id = %config.trader_id, "constructed new Trader instance");

        Self {
            config,
            state: ComponentState::Ready,
            bus,
            cache,
            portfolio,
            strategies: Vec::new(),
            actors: Vec::new(),
            exec_algorithms: Vec::new(),
        }
    }

    pub fn trader_id(&self) -> &TraderId {
        &self.config.trader_id
    }

    pub fn state(&self) -> ComponentState {
        self.state
    }

    pub fn bus(&self) -> &Arc<MessageBus> {
        &self.bus
    }

    pub fn strategy_count(&self) -> usize {
        self.strategies.len()
    }

    pub fn component_count(&self) -> usize {
        self.strategies.len() + self.actors.len() + self.exec_algorithms.len()
    }

    pub fn strategy(&self, strategy_id: &StrategyId) -> Option<&Strategy<C, K>> {
        self.strategies
            .iter()
            .find(|strategy| strategy.id() == strategy_id)
    }

    pub fn strategy_mut(&mut self, strategy_id: &StrategyId) -> Option<&mut Strategy<C, K>> {
        self.strategies
            .iter_mut()
            .find(|strategy| strategy.id() == strategy_id)
    }

    fn guard_registration(&self) -> Result<(), TraderError> {
        if self.state.is_running() && !self.config.allow_registration_while_running {
            return Err(TraderError::RegistrationWhileRunning);
        }
        Ok(())
    }

    fn component_ids(&self) -> HashSet<ComponentId> {
        self.strategies
            .iter()
            .map(Component::component_id)
            .chain(self.actors.iter().map(|actor| actor.component_id()))
            .chain(
                self.exec_algorithms
                    .iter()
                    .map(|algorithm| algorithm.component_id()),
            )
            .collect()
    }

    fn used_order_id_tags(&self) -> HashSet<SmolStr> {
        self.strategies
            .iter()
            .filter_map(|strategy| strategy.order_id_tag().cloned())
            .collect()
    }

    /// Next free zero-padded tag in the auto-assignment sequence.
    fn next_order_id_tag(&self) -> SmolStr {
        let used = self.used_order_id_tags();
        let mut candidate = self.strategies.len() + 1;
        loop {
            let tag = SmolStr::new(format!("{candidate:03}"));
            if !used.contains(&tag) {
                return tag;
            }
            candidate += 1;
        }
    }

    /// Register a strategy, wiring its identity, fresh clock and order factory.
    ///
    /// An absent `order_id_tag` is auto-assigned; a duplicate one is rejected.
    pub fn register_strategy(
        &mut self,
        mut strategy: Strategy<C, K>,
    ) -> Result<StrategyId, TraderError> {
        self.guard_registration()?;

        let tag = match strategy.order_id_tag() {
            Some(tag) => {
                if self.used_order_id_tags().contains(tag) {
                    return Err(TraderError::DuplicateOrderIdTag(tag.to_string()));
                }
                tag.clone()
            }
            None => self.next_order_id_tag(),
        };

        let component_id = ComponentId::new(format!("{}-{tag}", strategy.config().name));
        if self.component_ids().contains(&component_id) {
            return Err(TraderError::DuplicateComponentId(component_id.to_string()));
        }

        strategy.register(self.config.trader_id.clone(), K::default(), tag);

        let strategy_id = strategy.id().clone();
        info!(trader_id = %self.config.trader_id, %strategy_id, "Trader registered strategy");
        self.strategies.push(strategy);
        Ok(strategy_id)
    }

    /// Register a user actor component.
    pub fn register_actor(&mut self, actor: Box<dyn Component>) -> Result<(), TraderError> {
        self.guard_registration()?;

        let component_id = actor.component_id();
        if self.component_ids().contains(&component_id) {
            return Err(TraderError::DuplicateComponentId(component_id.to_string()));
        }

        info!(trader_id = %self.config.trader_id, %component_id, "Trader registered actor");
        self.actors.push(actor);
        Ok(())
    }

    /// Register an execution algorithm component.
    pub fn register_exec_algorithm(
        &mut self,
        algorithm: Box<dyn Component>,
    ) -> Result<(), TraderError> {
        self.guard_registration()?;

        let component_id = algorithm.component_id();
        if self.component_ids().contains(&component_id) {
            return Err(TraderError::DuplicateComponentId(component_id.to_string()));
        }

        info!(
            trader_id = %self.config.trader_id,
            %component_id,
            "Trader registered execution algorithm"
        );
        self.exec_algorithms.push(algorithm);
        Ok(())
    }

    fn for_each_component<F>(&mut self, mut f: F)
    where
        F: FnMut(&mut dyn Component),
    {
        for strategy in &mut self.strategies {
            f(strategy);
        }
        for actor in &mut self.actors {
            f(actor.as_mut());
        }
        for algorithm in &mut self.exec_algorithms {
            f(algorithm.as_mut());
        }
    }

    /// Start every sub-component in addition order.
    pub fn start(&mut self) {
        info!(trader_id = %self.config.trader_id, "Trader starting");
        self.for_each_component(|component| component.start());
        self.state = ComponentState::Running;
    }

    /// Stop every sub-component in addition order, tolerating already-stopped components.
    pub fn stop(&mut self) {
        info!(trader_id = %self.config.trader_id, "Trader stopping");
        self.for_each_component(|component| {
            if component.state().is_running() {
                component.stop();
            } else {
                warn!(
                    component_id = %component.component_id(),
                    "component already stopped"
                );
            }
        });
        self.state = ComponentState::Stopped;
    }

    /// Reset every sub-component and the portfolio. Invalid while RUNNING.
    pub fn reset(&mut self) -> Result<(), TraderError> {
        if self.state.is_running() {
            return Err(TraderError::InvalidState {
                operation: "reset".to_owned(),
                state: self.state,
            });
        }

        info!(trader_id = %self.config.trader_id, "Trader resetting");
        self.for_each_component(|component| component.reset());
        self.portfolio.lock().reset();
        self.cache.lock().reset();
        self.state = ComponentState::Ready;
        Ok(())
    }

    /// Dispose every sub-component. The trader cannot be used afterwards.
    pub fn dispose(&mut self) {
        if self.state.is_running() {
            self.stop();
        }

        info!(trader_id = %self.config.trader_id, "Trader disposing");
        self.for_each_component(|component| component.dispose());
        self.state = ComponentState::Disposed;
    }
}
