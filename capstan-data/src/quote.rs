use capstan_instrument::{price::Price, quantity::Quantity, symbol::InstrumentId, PriceType, Side};
use chrono::{DateTime, Utc};
use derive_more::Constructor;
use serde::{Deserialize, Serialize};

/// Top of book bid/ask snapshot for an instrument.
#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize, Constructor)]
pub struct QuoteTick {
    pub instrument_id: InstrumentId,
    pub bid: Price,
    pub ask: Price,
    pub bid_size: Quantity,
    pub ask_size: Quantity,
    pub ts_event: DateTime<Utc>,
}

impl QuoteTick {
    /// Extract the requested price from the quote.
    ///
    /// `Last` is not derivable from a quote and is a caller bug upstream; here it falls back to
    /// the mid price.
    pub fn extract_price(&self, price_type: PriceType) -> Price {
        match price_type {
            PriceType::Bid => self.bid,
            PriceType::Ask => self.ask,
            PriceType::Mid | PriceType::Last => self.mid(),
        }
    }

    /// Mid price at the quote precision.
    pub fn mid(&self) -> Price {
        let two = rust_decimal::Decimal::TWO;
        let mid = (self.bid.value() + self.ask.value()) / two;

        // Halving can introduce one extra decimal place beyond the quote precision
        let precision = self.bid.precision().max(self.ask.precision()) + 1;
        let mut value = mid;
        value.rescale(u32::from(precision));

        Price::new(value, precision).expect("mid price respects widened precision")
    }

    /// Price a marketable order of the given [`Side`] would cross at: ask for a buy, bid for a
    /// sell.
    pub fn price_for_entry(&self, side: Side) -> Price {
        match side {
            Side::Buy => self.ask,
            Side::Sell => self.bid,
        }
    }

    /// Price a liquidation of the given exposure direction references: bid when exiting a long
    /// (sell to close), ask when exiting a short.
    pub fn price_for_exit(&self, entry_side: Side) -> Price {
        match entry_side {
            Side::Buy => self.bid,
            Side::Sell => self.ask,
        }
    }
}
