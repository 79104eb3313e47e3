use derive_more::{Display, From};
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

/// A trading destination (exchange or broker) identified by a string tag.
///
/// An `AccountId` issuer denotes its [`Venue`].
#[derive(
    Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize, Display, From,
)]
pub struct Venue(pub SmolStr);

impl Venue {
    pub fn new<S: AsRef<str>>(tag: S) -> Self {
        Self(SmolStr::new(tag))
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl From<&str> for Venue {
    fn from(tag: &str) -> Self {
        Self::new(tag)
    }
}
