use capstan_instrument::venue::Venue;
use derive_more::{Display, From};
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::fmt::{Display, Formatter};

#[derive(
    Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize, Display, From,
)]
pub struct TraderId(pub SmolStr);

impl TraderId {
    pub fn new<S: AsRef<str>>(id: S) -> Self {
        Self(SmolStr::new(id))
    }

    /// The tag component after the last '-', eg/ "TRADER-001" -> "001".
    pub fn tag(&self) -> &str {
        self.0
            .rsplit_once('-')
            .map(|(_, tag)| tag)
            .unwrap_or(self.0.as_str())
    }
}

#[derive(
    Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize, Display, From,
)]
pub struct StrategyId(pub SmolStr);

impl StrategyId {
    pub fn new<S: AsRef<str>>(id: S) -> Self {
        Self(SmolStr::new(id))
    }

    /// The order id tag component after the last '-', eg/ "EmaCross-002" -> "002".
    pub fn order_id_tag(&self) -> &str {
        self.0
            .rsplit_once('-')
            .map(|(_, tag)| tag)
            .unwrap_or(self.0.as_str())
    }
}

#[derive(
    Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize, Display, From,
)]
pub struct ClientOrderId(pub SmolStr);

impl ClientOrderId {
    pub fn new<S: AsRef<str>>(id: S) -> Self {
        Self(SmolStr::new(id))
    }
}

#[derive(
    Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize, Display, From,
)]
pub struct VenueOrderId(pub SmolStr);

impl VenueOrderId {
    pub fn new<S: AsRef<str>>(id: S) -> Self {
        Self(SmolStr::new(id))
    }
}

#[derive(
    Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize, Display, From,
)]
pub struct PositionId(pub SmolStr);

impl PositionId {
    pub fn new<S: AsRef<str>>(id: S) -> Self {
        Self(SmolStr::new(id))
    }
}

/// Account identifier whose issuer denotes the [`Venue`] the account is held at.
///
/// Canonical string form is `"<issuer>-<number>"`, eg/ "SIM-001".
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize)]
pub struct AccountId {
    pub issuer: SmolStr,
    pub number: SmolStr,
}

impl AccountId {
    pub fn new<I, N>(issuer: I, number: N) -> Self
    where
        I: AsRef<str>,
        N: AsRef<str>,
    {
        Self {
            issuer: SmolStr::new(issuer),
            number: SmolStr::new(number),
        }
    }

    pub fn issuer_as_venue(&self) -> Venue {
        Venue::new(&self.issuer)
    }
}

impl Display for AccountId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.issuer, self.number)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trader_id_tag() {
        assert_eq!(TraderId::new("TRADER-001").tag(), "001");
        assert_eq!(TraderId::new("TRADER").tag(), "TRADER");
    }

    #[test]
    fn test_strategy_id_order_id_tag() {
        assert_eq!(StrategyId::new("EmaCross-002").order_id_tag(), "002");
    }

    #[test]
    fn test_account_id_issuer_as_venue() {
        let account_id = AccountId::new("SIM", "001");
        assert_eq!(account_id.to_string(), "SIM-001");
        assert_eq!(account_id.issuer_as_venue(), Venue::new("SIM"));
    }
}
