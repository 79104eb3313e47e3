use crate::order::id::{PositionId, StrategyId};
use capstan_instrument::{
    asset::Currency, money::Money, price::Price, quantity::Quantity, symbol::InstrumentId,
    PositionSide, Side,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Snapshot of an open or closed exposure on an instrument, signed by entry side.
///
/// Positions are owned externally (by the cache); the portfolio holds relationship-only
/// references. The instrument properties required for valuation are carried on the snapshot so
/// it can value itself against a last price.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Position {
    pub id: PositionId,
    pub strategy_id: StrategyId,
    pub instrument_id: InstrumentId,
    pub entry_side: Side,
    /// Absolute open quantity.
    pub quantity: Quantity,
    /// Signed open quantity: positive long, negative short, zero flat.
    pub relative_qty: Decimal,
    /// Average open price.
    pub avg_open: Decimal,
    pub multiplier: Decimal,
    pub is_inverse: bool,
    /// Currency the position settles in.
    pub settlement_currency: Currency,
    pub ts_opened: DateTime<Utc>,
    pub ts_closed: Option<DateTime<Utc>>,
}

impl Position {
    pub fn side(&self) -> PositionSide {
        if self.relative_qty.is_zero() {
            PositionSide::Flat
        } else if self.relative_qty > Decimal::ZERO {
            PositionSide::Long
        } else {
            PositionSide::Short
        }
    }

    pub fn is_open(&self) -> bool {
        !self.relative_qty.is_zero()
    }

    pub fn is_closed(&self) -> bool {
        self.relative_qty.is_zero()
    }

    pub fn is_long(&self) -> bool {
        self.side() == PositionSide::Long
    }

    pub fn is_short(&self) -> bool {
        self.side() == PositionSide::Short
    }

    /// Unrealized P&L of the open quantity against the given last price, in the settlement
    /// currency.
    ///
    /// For inverse contracts the return is in the base currency:
    /// `(1/avg_open - 1/last) * relative_qty * multiplier`.
    pub fn unrealized_pnl(&self, last: Price) -> Money {
        if self.relative_qty.is_zero() {
            return Money::zero(self.settlement_currency.clone());
        }

        let pnl = if self.is_inverse {
            (Decimal::ONE / self.avg_open - Decimal::ONE / last.value())
                * self.relative_qty
                * self.multiplier
        } else {
            (last.value() - self.avg_open) * self.relative_qty * self.multiplier
        };

        Money::new(pnl, self.settlement_currency.clone())
    }
}

/// Position lifecycle event published on `events.position.<strategy_id>`, carrying the position
/// snapshot after the change.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub enum PositionEvent {
    Opened(Position),
    Changed(Position),
    Closed(Position),
}

impl PositionEvent {
    pub fn position(&self) -> &Position {
        match self {
            PositionEvent::Opened(position)
            | PositionEvent::Changed(position)
            | PositionEvent::Closed(position) => position,
        }
    }

    /// Topic position events for the given strategy are published under,
    /// eg/ "events.position.EmaCross-002".
    pub fn topic(strategy_id: &StrategyId) -> String {
        format!("events.position.{strategy_id}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    pub fn long_position(instrument_id: InstrumentId, qty: Decimal, avg_open: Decimal) -> Position {
        Position {
            id: PositionId::new("P-1"),
            strategy_id: StrategyId::new("EmaCross-001"),
            instrument_id,
            entry_side: Side::Buy,
            quantity: Quantity::new(qty, 8).unwrap(),
            relative_qty: qty,
            avg_open,
            multiplier: Decimal::ONE,
            is_inverse: false,
            settlement_currency: Currency::usd(),
            ts_opened: DateTime::<Utc>::MIN_UTC,
            ts_closed: None,
        }
    }

    #[test]
    fn test_side_derives_from_relative_qty_sign() {
        let mut position = long_position(InstrumentId::new("EUR/USD", "SIM"), dec!(1), dec!(1.10));
        assert_eq!(position.side(), PositionSide::Long);
        assert!(position.is_open());

        position.relative_qty = dec!(-1);
        assert_eq!(position.side(), PositionSide::Short);

        position.relative_qty = Decimal::ZERO;
        assert_eq!(position.side(), PositionSide::Flat);
        assert!(position.is_closed());
    }

    #[test]
    fn test_unrealized_pnl_long() {
        let position =
            long_position(InstrumentId::new("EUR/USD", "SIM"), dec!(100_000), dec!(1.10));

        let pnl = position.unrealized_pnl(Price::new(dec!(1.12), 5).unwrap());
        assert_eq!(pnl, Money::new(dec!(2_000), Currency::usd()));
    }

    #[test]
    fn test_unrealized_pnl_short() {
        let mut position =
            long_position(InstrumentId::new("EUR/USD", "SIM"), dec!(100_000), dec!(1.10));
        position.entry_side = Side::Sell;
        position.relative_qty = dec!(-100_000);

        let pnl = position.unrealized_pnl(Price::new(dec!(1.12), 5).unwrap());
        assert_eq!(pnl, Money::new(dec!(-2_000), Currency::usd()));
    }

    #[test]
    fn test_unrealized_pnl_inverse() {
        let mut position =
            long_position(InstrumentId::new("BTC/USD", "BITMEX"), dec!(100_000), dec!(50_000));
        position.is_inverse = true;
        position.settlement_currency = Currency::btc();

        // (1/50_000 - 1/62_500) * 100_000 = 0.4 BTC
        let pnl = position.unrealized_pnl(Price::new(dec!(62_500), 1).unwrap());
        assert_eq!(pnl, Money::new(dec!(0.4), Currency::btc()));
    }

    #[test]
    fn test_flat_position_has_zero_pnl() {
        let mut position =
            long_position(InstrumentId::new("EUR/USD", "SIM"), dec!(100_000), dec!(1.10));
        position.relative_qty = Decimal::ZERO;

        assert!(position
            .unrealized_pnl(Price::new(dec!(1.50), 5).unwrap())
            .is_zero());
    }
}
