use crate::{
    asset::Currency, error::InstrumentError, money::Money, price::Price, quantity::Quantity,
    symbol::InstrumentId, LiquiditySide, PositionSide,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Asset class of an [`Instrument`].
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetType {
    Fx,
    Crypto,
    Equity,
    Future,
    Option,
}

/// Comprehensive instrument model, containing all the data required to validate orders and to
/// value positions and margin against it.
///
/// An inverse instrument has its notional denominated in the base currency:
/// `market_value = qty * multiplier / price`.
#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize)]
pub struct Instrument {
    pub id: InstrumentId,
    pub asset_type: AssetType,
    pub quote_currency: Currency,
    /// Currency positions settle in (the cost currency).
    pub settlement_currency: Currency,
    pub is_inverse: bool,
    pub price_precision: u8,
    pub size_precision: u8,
    pub multiplier: Decimal,
    pub leverage: Decimal,
    pub min_quantity: Option<Quantity>,
    pub max_quantity: Option<Quantity>,
    pub margin_init: Decimal,
    pub margin_maint: Decimal,
    pub maker_fee: Decimal,
    pub taker_fee: Decimal,
}

impl Instrument {
    /// Notional value of the given quantity at the given price.
    ///
    /// For inverse contracts the notional is `qty * multiplier` in the settlement currency.
    pub fn notional_value(&self, quantity: Quantity, price: Price) -> Money {
        if self.is_inverse {
            Money::new(
                quantity.value() * self.multiplier,
                self.settlement_currency.clone(),
            )
        } else {
            Money::new(
                quantity.value() * self.multiplier * price.value(),
                self.quote_currency.clone(),
            )
        }
    }

    /// Market value of the given quantity at the given price.
    pub fn market_value(&self, quantity: Quantity, price: Price) -> Money {
        if self.is_inverse {
            Money::new(
                quantity.value() * self.multiplier / price.value(),
                self.settlement_currency.clone(),
            )
        } else {
            Money::new(
                quantity.value() * self.multiplier * price.value(),
                self.quote_currency.clone(),
            )
        }
    }

    /// Initial margin requirement for a working order of the given quantity at the given price.
    pub fn calculate_initial_margin(&self, quantity: Quantity, price: Price) -> Money {
        self.margin(quantity, price, self.margin_init)
    }

    /// Maintenance margin requirement for an open position of the given quantity at the last
    /// price.
    pub fn calculate_maint_margin(
        &self,
        _side: PositionSide,
        quantity: Quantity,
        last: Price,
    ) -> Money {
        self.margin(quantity, last, self.margin_maint)
    }

    fn margin(&self, quantity: Quantity, price: Price, rate: Decimal) -> Money {
        let market_value = self.market_value(quantity, price);
        let leverage = if self.leverage.is_zero() {
            Decimal::ONE
        } else {
            self.leverage
        };

        market_value.scaled(rate / leverage)
    }

    /// Commission for a fill, using the maker or taker fee rate by [`LiquiditySide`].
    ///
    /// For inverse contracts the commission is additionally divided by the fill price.
    pub fn calculate_commission(
        &self,
        quantity: Quantity,
        fill_price: Price,
        liquidity_side: LiquiditySide,
    ) -> Result<Money, InstrumentError> {
        let rate = match liquidity_side {
            LiquiditySide::Maker => self.maker_fee,
            LiquiditySide::Taker => self.taker_fee,
            LiquiditySide::NoLiquiditySide => {
                return Err(InstrumentError::InvalidLiquiditySide(liquidity_side))
            }
        };

        let commission = if self.is_inverse {
            Money::new(
                quantity.value() * self.multiplier * rate / fill_price.value(),
                self.settlement_currency.clone(),
            )
        } else {
            Money::new(
                quantity.value() * self.multiplier * fill_price.value() * rate,
                self.quote_currency.clone(),
            )
        };

        Ok(commission)
    }
}
