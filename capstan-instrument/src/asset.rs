use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::{
    cmp::Ordering,
    fmt::{Display, Formatter},
    hash::{Hash, Hasher},
};

/// Classification of a [`Currency`].
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CurrencyKind {
    Fiat,
    Crypto,
}

/// Currency identified by a 3-4 letter code, carrying its rendering precision and
/// [`CurrencyKind`].
///
/// Equality, ordering and hashing are by `code` only.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Currency {
    pub code: SmolStr,
    pub precision: u8,
    pub kind: CurrencyKind,
}

impl Currency {
    pub fn new<Code>(code: Code, precision: u8, kind: CurrencyKind) -> Self
    where
        Code: Into<SmolStr>,
    {
        Self {
            code: code.into(),
            precision,
            kind,
        }
    }

    pub fn fiat<Code>(code: Code, precision: u8) -> Self
    where
        Code: Into<SmolStr>,
    {
        Self::new(code, precision, CurrencyKind::Fiat)
    }

    pub fn crypto<Code>(code: Code, precision: u8) -> Self
    where
        Code: Into<SmolStr>,
    {
        Self::new(code, precision, CurrencyKind::Crypto)
    }

    pub fn usd() -> Self {
        Self::fiat("USD", 2)
    }

    pub fn eur() -> Self {
        Self::fiat("EUR", 2)
    }

    pub fn gbp() -> Self {
        Self::fiat("GBP", 2)
    }

    pub fn aud() -> Self {
        Self::fiat("AUD", 2)
    }

    pub fn jpy() -> Self {
        Self::fiat("JPY", 0)
    }

    pub fn btc() -> Self {
        Self::crypto("BTC", 8)
    }

    pub fn eth() -> Self {
        Self::crypto("ETH", 8)
    }

    pub fn usdt() -> Self {
        Self::crypto("USDT", 8)
    }
}

impl PartialEq for Currency {
    fn eq(&self, other: &Self) -> bool {
        self.code == other.code
    }
}

impl Eq for Currency {}

impl PartialOrd for Currency {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Currency {
    fn cmp(&self, other: &Self) -> Ordering {
        self.code.cmp(&other.code)
    }
}

impl Hash for Currency {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.code.hash(state);
    }
}

impl Display for Currency {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code)
    }
}
