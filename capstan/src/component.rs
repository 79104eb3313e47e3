use derive_more::{Display, From};
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

/// Unique identifier for a trader-managed component.
#[derive(
    Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize, Display, From,
)]
pub struct ComponentId(pub SmolStr);

impl ComponentId {
    pub fn new<S: AsRef<str>>(id: S) -> Self {
        Self(SmolStr::new(id))
    }
}

/// Lifecycle state of a trader-managed component.
#[derive(
    Debug, Copy, Clone, Default, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ComponentState {
    #[default]
    Ready,
    Running,
    Stopped,
    Disposed,
}

impl ComponentState {
    pub fn is_running(&self) -> bool {
        *self == ComponentState::Running
    }

    pub fn is_disposed(&self) -> bool {
        *self == ComponentState::Disposed
    }
}

/// A component whose lifecycle is driven by the [`Trader`](crate::trader::Trader): strategies,
/// actors and execution algorithms.
///
/// Lifecycle methods are idempotent at the supervisor level - the trader logs and continues
/// when asked to stop an already-stopped component.
pub trait Component {
    fn component_id(&self) -> ComponentId;

    fn state(&self) -> ComponentState;

    fn start(&mut self);

    fn stop(&mut self);

    fn reset(&mut self);

    fn dispose(&mut self);
}
