use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize, Error)]
pub enum OrderError {
    #[error("invalid order state transition: {status} -> {event}")]
    InvalidStateTransition { status: String, event: String },

    #[error("order event {event} is for client_order_id {event_cid}, not {order_cid}")]
    ClientOrderIdMismatch {
        event: String,
        event_cid: String,
        order_cid: String,
    },
}

#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize, Error)]
pub enum BalanceError {
    #[error("AccountBalance invariant violated: total {total} != free {free} + locked {locked}")]
    TotalMismatch {
        total: String,
        free: String,
        locked: String,
    },

    #[error("AccountBalance cannot be negative: total {0}")]
    NegativeTotal(String),
}
