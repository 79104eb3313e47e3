use capstan_data::event::DataEvent;
use capstan_execution::{
    balance::AccountState, command::TradingCommand, order::event::OrderEvent,
    position::PositionEvent,
};
use derive_more::From;
use fnv::FnvHashMap;
use parking_lot::{Mutex, RwLock};
use smol_str::SmolStr;
use std::{
    fmt::{Debug, Formatter},
    sync::Arc,
};
use tracing::warn;

/// Message transported over the [`MessageBus`].
#[derive(Debug, Clone, PartialEq, From)]
pub enum BusMessage {
    Data(DataEvent),
    Order(OrderEvent),
    Position(PositionEvent),
    Account(AccountState),
    Command(TradingCommand),
}

/// Shared handler invoked for matching topics or addressed endpoints.
pub type BusHandler = Arc<Mutex<dyn FnMut(&BusMessage) + Send>>;

/// Wrap a closure into a [`BusHandler`].
pub fn handler<F>(f: F) -> BusHandler
where
    F: FnMut(&BusMessage) + Send + 'static,
{
    Arc::new(Mutex::new(f))
}

struct Subscription {
    pattern: SmolStr,
    handler_id: SmolStr,
    handler: BusHandler,
}

impl Debug for Subscription {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("pattern", &self.pattern)
            .field("handler_id", &self.handler_id)
            .finish_non_exhaustive()
    }
}

/// Synchronous message bus: topic pub/sub of data and events, endpoint send of commands.
///
/// Topics are dot-separated, with glob patterns on subscription: `*` matches any sequence of
/// characters (including separators), `?` matches exactly one. `publish` is synchronous and
/// in-order per topic per publisher. There is no persistence and no replay.
///
/// The handler registry is snapshotted before invocation, so a handler may itself publish or
/// (de)register subscriptions.
pub struct MessageBus {
    subscriptions: RwLock<Vec<Subscription>>,
    endpoints: RwLock<FnvHashMap<SmolStr, BusHandler>>,
}

impl Debug for MessageBus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageBus")
            .field("subscriptions", &*self.subscriptions.read())
            .field("endpoints", &self.endpoints.read().keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Default for MessageBus {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageBus {
    pub fn new() -> Self {
        Self {
            subscriptions: RwLock::new(Vec::new()),
            endpoints: RwLock::new(FnvHashMap::default()),
        }
    }

    /// Subscribe the handler to every topic matching `pattern`.
    ///
    /// Subscriptions are keyed by (pattern, handler_id); re-subscribing the same key replaces
    /// the previous handler.
    pub fn subscribe<P, H>(&self, pattern: P, handler_id: H, handler: BusHandler)
    where
        P: Into<SmolStr>,
        H: Into<SmolStr>,
    {
        let pattern = pattern.into();
        let handler_id = handler_id.into();

        let mut subscriptions = self.subscriptions.write();
        subscriptions.retain(|subscription| {
            subscription.pattern != pattern || subscription.handler_id != handler_id
        });
        subscriptions.push(Subscription {
            pattern,
            handler_id,
            handler,
        });
    }

    /// Remove the subscription keyed by (pattern, handler_id). Returns false if absent.
    pub fn unsubscribe(&self, pattern: &str, handler_id: &str) -> bool {
        let mut subscriptions = self.subscriptions.write();
        let before = subscriptions.len();
        subscriptions.retain(|subscription| {
            subscription.pattern != pattern || subscription.handler_id != handler_id
        });
        subscriptions.len() != before
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions.read().len()
    }

    /// Publish a message to every subscriber whose pattern matches `topic`, in subscription
    /// order.
    pub fn publish(&self, topic: &str, message: &BusMessage) {
        let matching: Vec<BusHandler> = self
            .subscriptions
            .read()
            .iter()
            .filter(|subscription| is_matching(topic, &subscription.pattern))
            .map(|subscription| Arc::clone(&subscription.handler))
            .collect();

        for handler in matching {
            (handler.lock())(message);
        }
    }

    /// Register a point-to-point endpoint, replacing any previous handler at that address.
    pub fn register_endpoint<E>(&self, endpoint: E, handler: BusHandler)
    where
        E: Into<SmolStr>,
    {
        self.endpoints.write().insert(endpoint.into(), handler);
    }

    pub fn deregister_endpoint(&self, endpoint: &str) -> bool {
        self.endpoints.write().remove(endpoint).is_some()
    }

    pub fn has_endpoint(&self, endpoint: &str) -> bool {
        self.endpoints.read().contains_key(endpoint)
    }

    /// Send a message point-to-point to the registered endpoint.
    ///
    /// A send to an unregistered endpoint is dropped with a warning - commands are not queued
    /// for endpoints that do not exist yet.
    pub fn send(&self, endpoint: &str, message: &BusMessage) {
        let handler = self.endpoints.read().get(endpoint).map(Arc::clone);

        match handler {
            Some(handler) => (handler.lock())(message),
            None => warn!(endpoint, "MessageBus send to unregistered endpoint dropped"),
        }
    }
}

/// Glob match of `topic` against `pattern`.
///
/// `*` matches any sequence of characters (including the '.' separator), `?` matches exactly
/// one character.
pub fn is_matching(topic: &str, pattern: &str) -> bool {
    let topic: Vec<char> = topic.chars().collect();
    let pattern: Vec<char> = pattern.chars().collect();

    let (mut t, mut p) = (0usize, 0usize);
    let mut star: Option<(usize, usize)> = None;

    while t < topic.len() {
        if p < pattern.len() && (pattern[p] == '?' || pattern[p] == topic[t]) {
            t += 1;
            p += 1;
        } else if p < pattern.len() && pattern[p] == '*' {
            star = Some((p, t));
            p += 1;
        } else if let Some((star_p, star_t)) = star {
            // Backtrack: let the last '*' absorb one more character
            p = star_p + 1;
            t = star_t + 1;
            star = Some((star_p, star_t + 1));
        } else {
            return false;
        }
    }

    while p < pattern.len() && pattern[p] == '*' {
        p += 1;
    }

    p == pattern.len()
}
