use crate::bus::{handler, BusMessage, MessageBus};
use capstan_execution::command::{TradingCommand, EXEC_ENGINE_EXECUTE};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

/// The receiver half of a command channel was dropped.
#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize, Error)]
#[error("RxDropped")]
pub struct RxDropped;

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for RxDropped {
    fn from(_: tokio::sync::mpsc::error::SendError<T>) -> Self {
        Self
    }
}

/// Transmitter of items to another component.
pub trait Tx
where
    Self: Clone + Send,
{
    type Item;
    type Error;

    fn send(&self, item: Self::Item) -> Result<(), Self::Error>;
}

/// [`Tx`] over an unbounded channel - sends never block the caller.
#[derive(Debug)]
pub struct UnboundedTx<T> {
    pub tx: tokio::sync::mpsc::UnboundedSender<T>,
}

impl<T> Clone for UnboundedTx<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<T> Tx for UnboundedTx<T>
where
    T: Send,
{
    type Item = T;
    type Error = RxDropped;

    fn send(&self, item: Self::Item) -> Result<(), Self::Error> {
        self.tx.send(item).map_err(RxDropped::from)
    }
}

/// Draining receiver over an unbounded channel.
#[derive(Debug)]
pub struct UnboundedRx<T> {
    pub rx: tokio::sync::mpsc::UnboundedReceiver<T>,
}

impl<T> Iterator for UnboundedRx<T> {
    type Item = T;

    /// Drain the next buffered item without waiting - `None` when the channel is currently
    /// empty or disconnected.
    fn next(&mut self) -> Option<Self::Item> {
        self.rx.try_recv().ok()
    }
}

pub fn mpsc_unbounded<T>() -> (UnboundedTx<T>, UnboundedRx<T>) {
    let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
    (UnboundedTx { tx }, UnboundedRx { rx })
}

/// Bridge the `"ExecEngine.execute"` endpoint into a [`TradingCommand`] channel.
///
/// Risk-approved commands sent to the endpoint land in the returned receiver in forwarding
/// order, for a host execution engine to drain.
pub fn register_execution_link(bus: &MessageBus) -> UnboundedRx<TradingCommand> {
    let (tx, rx) = mpsc_unbounded::<TradingCommand>();

    bus.register_endpoint(
        EXEC_ENGINE_EXECUTE,
        handler(move |message| match message {
            BusMessage::Command(command) => {
                if tx.send(command.clone()).is_err() {
                    warn!("execution link receiver dropped - commands no longer delivered");
                }
            }
            other => warn!(?other, "execution link received a non-command message"),
        }),
    );

    rx
}
