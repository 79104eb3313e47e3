#![forbid(unsafe_code)]
#![warn(
    unused,
    clippy::cognitive_complexity,
    unused_crate_dependencies,
    unused_extern_crates,
    clippy::unused_self,
    clippy::useless_let_if_seq,
    missing_debug_implementations,
    rust_2018_idioms
)]
#![allow(clippy::type_complexity, clippy::too_many_arguments)]

//! # Capstan
//! Capstan is the core orchestration layer of an event-driven trading platform. It routes
//! trading intent from strategies through pre-trade risk controls, maintains consistent
//! portfolio, position and margin views, and supervises a fleet of trading components over a
//! shared message bus.
//!
//! ## Architecture
//! * **MessageBus** - synchronous pub/sub of data and events, endpoint send of commands.
//! * **Portfolio** - aggregates accounts, working orders and positions; derives net positions,
//!   unrealized P&L and margin as cached views.
//! * **RiskEngine** - command gateway enforcing duplicate-id, precision, notional,
//!   trading-state and rate-limit checks before commands reach execution.
//! * **Trader** - component supervisor wiring strategies, actors and execution algorithms into
//!   the bus with per-component clocks.

use indexmap::IndexMap;

/// Synchronous [`MessageBus`](bus::MessageBus): topic pub/sub and endpoint dispatch.
pub mod bus;

/// [`Cache`](cache::Cache) facade over orders, positions and instruments, plus the
/// [`InMemoryCache`](cache::InMemoryCache) implementation.
pub mod cache;

/// [`ExchangeRateCalculator`](xrate::ExchangeRateCalculator) - transitive FX rates through a
/// graph of quoted currency pairs.
pub mod xrate;

/// [`Account`](account::Account) - per-currency balances, margins and an append-only event log.
pub mod account;

/// [`Portfolio`](portfolio::Portfolio) - aggregate views over accounts, orders and positions.
pub mod portfolio;

/// [`RiskEngine`](risk::RiskEngine) - the pre-trade command gateway, its
/// [`TradingState`](risk::TradingState) machine and order-rate
/// [`Throttler`](risk::throttler::Throttler).
pub mod risk;

/// [`Trader`](trader::Trader) - component lifecycle supervisor.
pub mod trader;

/// [`Strategy`](strategy::Strategy) registration and trading command egress.
pub mod strategy;

/// Component lifecycle states shared by trader-managed components.
pub mod component;

/// [`SystemBuilder`](system::SystemBuilder) - wires a complete core into a [`System`](system::System).
pub mod system;

/// [`Clock`](clock::Clock) trait with live and test implementations.
pub mod clock;

/// Bridge from the `"ExecEngine.execute"` endpoint into a command channel a host execution
/// engine can drain.
pub mod execution_link;

/// Capstan logging initialisation.
pub mod logging;

/// Top-level error type.
pub mod error;

/// `FnvHashMap` with deterministic iteration order.
pub type FnvIndexMap<K, V> = IndexMap<K, V, fnv::FnvBuildHasher>;
