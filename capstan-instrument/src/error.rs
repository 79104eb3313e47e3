use crate::LiquiditySide;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize, Error)]
pub enum InstrumentError {
    #[error("precision exceeded: value {value} has more decimal places than declared {precision}")]
    PrecisionExceeded { value: String, precision: u8 },

    #[error("quantity cannot be negative: {0}")]
    NegativeQuantity(String),

    #[error("cannot calculate commission for LiquiditySide: {0:?}")]
    InvalidLiquiditySide(LiquiditySide),
}
