use crate::order::Order;
use serde::{Deserialize, Serialize};

/// A group of three linked orders submitted and risk-checked atomically: entry, stop-loss and
/// optional take-profit.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct BracketOrder {
    pub entry: Order,
    pub stop_loss: Order,
    pub take_profit: Option<Order>,
}

impl BracketOrder {
    pub fn new(entry: Order, stop_loss: Order, take_profit: Option<Order>) -> Self {
        Self {
            entry,
            stop_loss,
            take_profit,
        }
    }

    /// All orders in the bracket, entry first.
    pub fn orders(&self) -> impl Iterator<Item = &Order> {
        std::iter::once(&self.entry)
            .chain(std::iter::once(&self.stop_loss))
            .chain(self.take_profit.iter())
    }
}
