use crate::error::InstrumentError;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Fixed-precision price.
///
/// The declared precision is an invariant on construction: a value carrying more decimal places
/// than `precision` is rejected rather than silently rounded.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize)]
pub struct Price {
    value: Decimal,
    precision: u8,
}

impl Price {
    pub fn new(value: Decimal, precision: u8) -> Result<Self, InstrumentError> {
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

    pub fn is_positive(&self) -> bool {
        self.value > Decimal::ZERO
    }
}

impl Display for Price {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_price_construction_enforces_precision() {
        assert!(Price::new(dec!(1.12345), 5).is_ok());
        assert!(Price::new(dec!(1.1), 5).is_ok());

        let err = Price::new(dec!(1.123456), 5).unwrap_err();
        assert!(matches!(err, InstrumentError::PrecisionExceeded { .. }));
    }

    #[test]
    fn test_price_trailing_zeros_do_not_exceed_precision() {
        // 1.10000000 normalises to scale 1, within a 2dp precision
        assert!(Price::new(dec!(1.10000000), 2).is_ok());
    }

    #[test]
    fn test_price_display_renders_declared_precision() {
        assert_eq!(Price::new(dec!(1.1), 5).unwrap().to_string(), "1.10000");
        assert_eq!(Price::new(dec!(42), 0).unwrap().to_string(), "42");
    }

    #[test]
    fn test_price_ordering() {
        let low = Price::new(dec!(1.0999), 4).unwrap();
        let high = Price::new(dec!(1.1), 4).unwrap();
        assert!(low < high);
        assert_eq!(high, Price::new(dec!(1.1000), 4).unwrap());
    }
}
