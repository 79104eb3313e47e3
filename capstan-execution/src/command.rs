use crate::{
    bracket::BracketOrder,
    order::{
        id::{ClientOrderId, PositionId, StrategyId, TraderId, VenueOrderId},
        Order,
    },
};
use capstan_instrument::{price::Price, quantity::Quantity, symbol::InstrumentId};
use chrono::{DateTime, Utc};
use derive_more::From;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Endpoint trading commands are sent to for pre-trade risk gating.
pub const RISK_ENGINE_EXECUTE: &str = "RiskEngine.execute";

/// Endpoint risk-approved commands are forwarded to.
pub const EXEC_ENGINE_EXECUTE: &str = "ExecEngine.execute";

/// Endpoint execution events (including denials) are sent to for processing.
pub const EXEC_ENGINE_PROCESS: &str = "ExecEngine.process";

/// A trading command gated by the risk engine before reaching execution.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, From)]
pub enum TradingCommand {
    SubmitOrder(SubmitOrder),
    SubmitBracketOrder(SubmitBracketOrder),
    ModifyOrder(ModifyOrder),
    CancelOrder(CancelOrder),
}

impl TradingCommand {
    pub fn strategy_id(&self) -> &StrategyId {
        match self {
            TradingCommand::SubmitOrder(command) => &command.strategy_id,
            TradingCommand::SubmitBracketOrder(command) => &command.strategy_id,
            TradingCommand::ModifyOrder(command) => &command.strategy_id,
            TradingCommand::CancelOrder(command) => &command.strategy_id,
        }
    }

    pub fn instrument_id(&self) -> &InstrumentId {
        match self {
            TradingCommand::SubmitOrder(command) => &command.order.instrument_id,
            TradingCommand::SubmitBracketOrder(command) => {
                &command.bracket.entry.instrument_id
            }
            TradingCommand::ModifyOrder(command) => &command.instrument_id,
            TradingCommand::CancelOrder(command) => &command.instrument_id,
        }
    }
}

impl Display for TradingCommand {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            TradingCommand::SubmitOrder(_) => "SubmitOrder",
            TradingCommand::SubmitBracketOrder(_) => "SubmitBracketOrder",
            TradingCommand::ModifyOrder(_) => "ModifyOrder",
            TradingCommand::CancelOrder(_) => "CancelOrder",
        };
        write!(f, "{name}")
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SubmitOrder {
    pub trader_id: TraderId,
    pub strategy_id: StrategyId,
    /// Position this order is intended for, if any (`HEDGING` OMS flows).
    pub position_id: Option<PositionId>,
    pub order: Order,
    pub command_id: Uuid,
    pub ts_init: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SubmitBracketOrder {
    pub trader_id: TraderId,
    pub strategy_id: StrategyId,
    pub bracket: BracketOrder,
    pub command_id: Uuid,
    pub ts_init: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ModifyOrder {
    pub trader_id: TraderId,
    pub strategy_id: StrategyId,
    pub instrument_id: InstrumentId,
    pub client_order_id: ClientOrderId,
    pub quantity: Option<Quantity>,
    pub price: Option<Price>,
    pub trigger: Option<Price>,
    pub command_id: Uuid,
    pub ts_init: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct CancelOrder {
    pub trader_id: TraderId,
    pub strategy_id: StrategyId,
    pub instrument_id: InstrumentId,
    pub client_order_id: ClientOrderId,
    pub venue_order_id: Option<VenueOrderId>,
    pub command_id: Uuid,
    pub ts_init: DateTime<Utc>,
}
