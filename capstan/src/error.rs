use crate::{
    cache::CacheError, portfolio::PortfolioError, strategy::StrategyError, trader::TraderError,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize, Error)]
pub enum CapstanError {
    #[error("cache: {0}")]
    Cache(#[from] CacheError),

    #[error("portfolio: {0}")]
    Portfolio(#[from] PortfolioError),

    #[error("trader: {0}")]
    Trader(#[from] TraderError),

    #[error("strategy: {0}")]
    Strategy(#[from] StrategyError),
}
