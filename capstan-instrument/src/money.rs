use crate::asset::Currency;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::{
    cmp::Ordering,
    fmt::{Display, Formatter},
    iter::Sum,
    ops::{Add, AddAssign, Neg, Sub, SubAssign},
};

/// Monetary amount in a single [`Currency`].
///
/// The amount is rounded to the currency precision on construction. Arithmetic requires matching
/// currencies - mixing currencies is a caller bug and fails loudly. Cross-currency operations go
/// through the `ExchangeRateCalculator`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Money {
    amount: Decimal,
    currency: Currency,
}

impl Money {
    pub fn new(amount: Decimal, currency: Currency) -> Self {
        Self {
            amount: amount.round_dp(u32::from(currency.precision)),
            currency,
        }
    }

    pub fn zero(currency: Currency) -> Self {
        Self::new(Decimal::ZERO, currency)
    }

    pub fn amount(&self) -> Decimal {
        self.amount
    }

    pub fn currency(&self) -> &Currency {
        &self.currency
    }

    pub fn is_zero(&self) -> bool {
        self.amount.is_zero()
    }

    /// Multiply the amount by a scalar, keeping the [`Currency`].
    pub fn scaled(&self, factor: Decimal) -> Self {
        Self::new(self.amount * factor, self.currency.clone())
    }
}

impl PartialEq for Money {
    fn eq(&self, other: &Self) -> bool {
        self.currency == other.currency && self.amount == other.amount
    }
}

impl Eq for Money {}

impl PartialOrd for Money {
    /// Ordering is only defined between amounts of the same [`Currency`].
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        (self.currency == other.currency).then(|| self.amount.cmp(&other.amount))
    }
}

impl Add for Money {
    type Output = Money;

    fn add(self, rhs: Self) -> Self::Output {
        assert_eq!(
            self.currency, rhs.currency,
            "Money addition requires matching currencies"
        );
        Money::new(self.amount + rhs.amount, self.currency)
    }
}

impl Sub for Money {
    type Output = Money;

    fn sub(self, rhs: Self) -> Self::Output {
        assert_eq!(
            self.currency, rhs.currency,
            "Money subtraction requires matching currencies"
        );
        Money::new(self.amount - rhs.amount, self.currency)
    }
}

impl AddAssign for Money {
    fn add_assign(&mut self, rhs: Self) {
        assert_eq!(
            self.currency, rhs.currency,
            "Money addition requires matching currencies"
        );
        self.amount += rhs.amount;
    }
}

impl SubAssign for Money {
    fn sub_assign(&mut self, rhs: Self) {
        assert_eq!(
            self.currency, rhs.currency,
            "Money subtraction requires matching currencies"
        );
        self.amount -= rhs.amount;
    }
}

impl Neg for Money {
    type Output = Money;

    fn neg(self) -> Self::Output {
        Money::new(-self.amount, self.currency)
    }
}

impl Sum for Money {
    /// Sum an iterator of same-currency [`Money`].
    ///
    /// An empty iterator is a caller bug since the result [`Currency`] would be unknown.
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.reduce(Add::add)
            .expect("cannot sum an empty Money iterator - currency unknown")
    }
}

impl Display for Money {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:.prec$} {}",
            self.amount,
            self.currency,
            prec = usize::from(self.currency.precision)
        )
    }
}
