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

//! # Capstan-Execution
//! Order, position, account-state and trading command types for the Capstan trading core.
//!
//! The [`Order`](order::Order) status state machine, [`Position`](position::Position) snapshots
//! and the [`TradingCommand`](command::TradingCommand) set defined here form the message
//! vocabulary between strategies, the risk engine and an external execution engine.

/// [`Order`](order::Order) model: identifiers, status state machine and order events.
pub mod order;

/// [`BracketOrder`](bracket::BracketOrder) - entry, stop-loss and optional take-profit
/// submitted and risk-checked atomically.
pub mod bracket;

/// [`Position`](position::Position) snapshots and position lifecycle events.
pub mod position;

/// [`AccountBalance`](balance::AccountBalance) and the [`AccountState`](balance::AccountState)
/// event.
pub mod balance;

/// [`TradingCommand`](command::TradingCommand) - the commands gated by the risk engine.
pub mod command;

/// Errors generated by the order state machine and balance invariants.
pub mod error;
