use crate::venue::Venue;
use derive_more::{Display, From};
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::{
    fmt::{Display, Formatter},
    str::FromStr,
};
use thiserror::Error;

/// Ticker symbol of an instrument, eg/ "EUR/USD".
#[derive(
    Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize, Display, From,
)]
pub struct Symbol(pub SmolStr);

impl Symbol {
    pub fn new<S: AsRef<str>>(symbol: S) -> Self {
        Self(SmolStr::new(symbol))
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    /// Split a "BASE/QUOTE" style symbol into its two currency codes, if it has that shape.
    pub fn as_currency_pair(&self) -> Option<(&str, &str)> {
        self.0.split_once('/')
    }
}

impl From<&str> for Symbol {
    fn from(symbol: &str) -> Self {
        Self::new(symbol)
    }
}

/// Unique identifier for an instrument: a [`Symbol`] traded on a [`Venue`].
///
/// Canonical string form is `"<symbol>.<venue>"`, eg/ "EUR/USD.SIM". Serialized as the
/// canonical string so it can key serialized maps.
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct InstrumentId {
    pub symbol: Symbol,
    pub venue: Venue,
}

impl Serialize for InstrumentId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for InstrumentId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = SmolStr::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

impl InstrumentId {
    pub fn new<S, V>(symbol: S, venue: V) -> Self
    where
        S: Into<Symbol>,
        V: Into<Venue>,
    {
        Self {
            symbol: symbol.into(),
            venue: venue.into(),
        }
    }
}

impl Display for InstrumentId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.symbol, self.venue)
    }
}

#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize, Error)]
#[error("invalid InstrumentId: expected '<symbol>.<venue>', found: {0}")]
pub struct ParseInstrumentIdError(pub String);

impl FromStr for InstrumentId {
    type Err = ParseInstrumentIdError;

    /// Parse the canonical `"<symbol>.<venue>"` form, splitting on the last '.' so symbols may
    /// themselves contain dots.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (symbol, venue) = s
            .rsplit_once('.')
            .filter(|(symbol, venue)| !symbol.is_empty() && !venue.is_empty())
            .ok_or_else(|| ParseInstrumentIdError(s.to_owned()))?;

        Ok(Self::new(symbol, venue))
    }
}
