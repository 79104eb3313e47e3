use crate::{quote::QuoteTick, trade::TradeTick};
use capstan_instrument::symbol::InstrumentId;
use derive_more::From;
use serde::{Deserialize, Serialize};

/// Market data event published on the bus and consumed by the core.
#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize, From)]
pub enum DataEvent {
    Quote(QuoteTick),
    Trade(TradeTick),
}

impl DataEvent {
    pub fn instrument_id(&self) -> &InstrumentId {
        match self {
            DataEvent::Quote(quote) => &quote.instrument_id,
            DataEvent::Trade(trade) => &trade.instrument_id,
        }
    }

    /// Topic this event is published under.
    pub fn topic(&self) -> String {
        match self {
            DataEvent::Quote(quote) => quote_topic(&quote.instrument_id),
            DataEvent::Trade(trade) => trade_topic(&trade.instrument_id),
        }
    }
}

/// Topic quote ticks for the given instrument are published under,
/// eg/ "data.quotes.SIM.EUR/USD".
pub fn quote_topic(instrument_id: &InstrumentId) -> String {
    format!(
        "data.quotes.{}.{}",
        instrument_id.venue, instrument_id.symbol
    )
}

/// Topic trade ticks for the given instrument are published under,
/// eg/ "data.trades.SIM.EUR/USD".
pub fn trade_topic(instrument_id: &InstrumentId) -> String {
    format!(
        "data.trades.{}.{}",
        instrument_id.venue, instrument_id.symbol
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use capstan_instrument::{price::Price, quantity::Quantity};
    use chrono::{DateTime, Utc};
    use rust_decimal_macros::dec;

    #[test]
    fn test_quote_topic_naming() {
        let quote = QuoteTick {
            instrument_id: InstrumentId::new("EUR/USD", "SIM"),
            bid: Price::new(dec!(1.1), 5).unwrap(),
            ask: Price::new(dec!(1.2), 5).unwrap(),
            bid_size: Quantity::new(dec!(1), 0).unwrap(),
            ask_size: Quantity::new(dec!(1), 0).unwrap(),
            ts_event: DateTime::<Utc>::MIN_UTC,
        };

        assert_eq!(
            DataEvent::from(quote).topic(),
            "data.quotes.SIM.EUR/USD"
        );
    }
}
