//! Persistence boundary of the reconciliation engine.
//!
//! The engine only stages mutations; durability happens at batch
//! commits. A commit is all-or-nothing: on failure the current batch is
//! lost and the pass aborts, while previously committed batches stay
//! applied.

use crate::account::{Account, AccountStatus};
use crate::error::EngineResult;
use crate::types::{AccountId, UnixTime};

/// One-time notification channels tracked by the reminder store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReminderKind {
    UsageThreshold,
    ExpiryThreshold,
}

impl ReminderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UsageThreshold => "usage_threshold",
            Self::ExpiryThreshold => "expiry_threshold",
        }
    }
}

pub trait Ledger {
    /// Accounts in the given status, ascending id.
    fn accounts_by_status(&mut self, status: AccountStatus) -> EngineResult<Vec<Account>>;

    fn begin_batch(&mut self) -> EngineResult<()>;

    /// All-or-nothing for everything staged since `begin_batch`.
    fn commit_batch(&mut self) -> EngineResult<()>;

    fn stage_status(&mut self, id: AccountId, status: AccountStatus) -> EngineResult<()>;

    /// Activate an on-hold account and start its expiry timer.
    fn stage_activation(&mut self, account: &Account, now: UnixTime) -> EngineResult<()>;

    /// Roll the account over to its successor plan: reset usage, refresh
    /// expiry, clear the plan, and invalidate recorded reminders.
    /// Returns the account as staged.
    fn apply_next_plan(&mut self, account: &Account, now: UnixTime) -> EngineResult<Account>;

    fn reminder_exists(
        &mut self,
        id: AccountId,
        kind: ReminderKind,
        threshold: u32,
    ) -> EngineResult<bool>;

    fn record_reminder(
        &mut self,
        id: AccountId,
        kind: ReminderKind,
        threshold: u32,
        now: UnixTime,
    ) -> EngineResult<()>;
}
