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

//! # Capstan-Data
//! Market data tick events consumed by the Capstan trading core, plus the dot-separated topic
//! naming scheme they are published under.

/// [`QuoteTick`](quote::QuoteTick) - top of book bid/ask snapshot.
pub mod quote;

/// [`TradeTick`](trade::TradeTick) - a single market trade.
pub mod trade;

/// [`DataEvent`](event::DataEvent) sum type and topic naming utilities.
pub mod event;
