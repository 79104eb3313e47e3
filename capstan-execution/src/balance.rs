use crate::{error::BalanceError, order::id::AccountId};
use capstan_instrument::{asset::Currency, money::Money};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::collections::HashMap;
use uuid::Uuid;

/// Balance of a single [`Currency`] within an account.
///
/// Invariant: `total = free + locked >= 0`, unless the venue explicitly permits overdraft.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct AccountBalance {
    pub currency: Currency,
    pub total: Decimal,
    pub free: Decimal,
    pub locked: Decimal,
}

impl AccountBalance {
    pub fn new(
        currency: Currency,
        total: Decimal,
        free: Decimal,
        locked: Decimal,
    ) -> Result<Self, BalanceError> {
        Self::with_overdraft(currency, total, free, locked, false)
    }

    /// Construct a balance, optionally permitting a negative total for venues that allow
    /// overdraft.
    pub fn with_overdraft(
        currency: Currency,
        total: Decimal,
        free: Decimal,
        locked: Decimal,
        allow_overdraft: bool,
    ) -> Result<Self, BalanceError> {
        if total != free + locked {
            return Err(BalanceError::TotalMismatch {
                total: total.to_string(),
                free: free.to_string(),
                locked: locked.to_string(),
            });
        }

        if total < Decimal::ZERO && !allow_overdraft {
            return Err(BalanceError::NegativeTotal(total.to_string()));
        }

        Ok(Self {
            currency,
            total,
            free,
            locked,
        })
    }

    pub fn total_money(&self) -> Money {
        Money::new(self.total, self.currency.clone())
    }

    pub fn free_money(&self) -> Money {
        Money::new(self.free, self.currency.clone())
    }

    pub fn locked_money(&self) -> Money {
        Money::new(self.locked, self.currency.clone())
    }
}

/// Account snapshot event published on `events.account.<issuer>`.
///
/// Carries the balances that changed; an account merges these entries by currency, retaining
/// prior values for currencies the event does not mention.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct AccountState {
    pub account_id: AccountId,
    pub balances: Vec<AccountBalance>,
    pub info: HashMap<SmolStr, SmolStr>,
    pub event_id: Uuid,
    pub ts_event: DateTime<Utc>,
}

impl AccountState {
    pub fn new(
        account_id: AccountId,
        balances: Vec<AccountBalance>,
        ts_event: DateTime<Utc>,
    ) -> Self {
        Self {
            account_id,
            balances,
            info: HashMap::new(),
            event_id: Uuid::new_v4(),
            ts_event,
        }
    }

    /// Topic account events for the given issuer are published under,
    /// eg/ "events.account.SIM".
    pub fn topic(issuer: &str) -> String {
        format!("events.account.{issuer}")
    }
}
