use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Defines how a component determines the current time.
///
/// Every trader-managed component receives a fresh clock instance at registration so that
/// per-component time sources never share mutable state.
pub trait Clock {
    fn time(&self) -> DateTime<Utc>;
}

/// Live `Clock` using `Utc::now()`.
#[derive(
    Debug, Copy, Clone, Default, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize,
)]
pub struct LiveClock;

impl Clock for LiveClock {
    fn time(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually-advanced `Clock` for deterministic tests.
///
/// Cloning shares the underlying time source, so a test can hold one handle while a component
/// holds another.
#[derive(Debug, Clone)]
pub struct TestClock {
    inner: Arc<RwLock<DateTime<Utc>>>,
}

impl TestClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(start)),
        }
    }

    pub fn set_time(&self, time: DateTime<Utc>) {
        *self.inner.write() = time;
    }

    pub fn advance(&self, delta: TimeDelta) {
        let mut lock = self.inner.write();
        *lock += delta;
    }
}

impl Default for TestClock {
    fn default() -> Self {
        Self::new(DateTime::<Utc>::UNIX_EPOCH)
    }
}

impl Clock for TestClock {
    fn time(&self) -> DateTime<Utc> {
        *self.inner.read()
    }
}
