use crate::error::InstrumentError;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Fixed-precision, non-negative quantity.
///
/// Signedness lives in position `relative_qty`, not here. The declared precision is an invariant
/// on construction.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize)]
pub struct Quantity {
    value: Decimal,
    precision: u8,
}

impl Quantity {
    pub fn new(value: Decimal, precision: u8) -> Result<Self, InstrumentError> {
        if value.is_sign_negative() && !value.is_zero() {
            return Err(InstrumentError::NegativeQuantity(value.to_string()));
        }

        if value.normalize().scale() > u32::from(precision) {
            return Err(InstrumentError::PrecisionExceeded {
                value: value.to_string(),
                precision,
            });
        }

        let mut value = value;
        value.rescale(u32::from(precision));

        Ok(Self { value, precision })
    }

    pub fn value(&self) -> Decimal {
        self.value
    }

    pub fn precision(&self) -> u8 {
        self.precision
    }

    pub fn is_zero(&self) -> bool {
        self.value.is_zero()
    }
}

impl Display for Quantity {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.value)
    }
}
