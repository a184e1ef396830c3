//! Account model — status state machine and next-plan rollover rules.
//!
//! Status transitions this engine may apply:
//!   active → limited   (usage)        active → expired  (time)
//!   on_hold → active   (one-way)
//! A rollover resets an account that would go limited/expired back to an
//! active-eligible state with the successor plan's limits.
//! `disabled` is terminal and never written here.

use crate::types::{AccountId, Bytes, UnixTime};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountStatus {
    Active,
    Limited,
    Expired,
    OnHold,
    Disabled,
}

impl AccountStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Limited => "limited",
            Self::Expired => "expired",
            Self::OnHold => "on_hold",
            Self::Disabled => "disabled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(Self::Active),
            "limited" => Some(Self::Limited),
            "expired" => Some(Self::Expired),
            "on_hold" => Some(Self::OnHold),
            "disabled" => Some(Self::Disabled),
            _ => None,
        }
    }
}

impl fmt::Display for AccountStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ToSql for AccountStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for AccountStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let s = value.as_str()?;
        Self::parse(s).ok_or(FromSqlError::InvalidType)
    }
}

/// Successor plan applied in place of a plain limited/expired transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NextPlan {
    /// Byte allowance of the successor plan. `None` = unlimited.
    pub data_limit: Option<Bytes>,
    /// Seconds of validity granted from the moment of rollover.
    pub expire_duration: Option<i64>,
    /// Credit the unspent allowance of the old plan onto the new one.
    #[serde(default)]
    pub add_remaining_traffic: bool,
    /// Fire on `limited OR expired`; otherwise both must hold.
    #[serde(default)]
    pub fire_on_either: bool,
}

impl NextPlan {
    /// Whether the rollover fires for this evaluation.
    pub fn fires(&self, limited: bool, expired: bool) -> bool {
        if self.fire_on_either {
            limited || expired
        } else {
            limited && expired
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub username: String,
    pub status: AccountStatus,
    pub used_traffic: Bytes,
    pub data_limit: Option<Bytes>,
    pub expire: Option<UnixTime>,
    pub next_plan: Option<NextPlan>,
    /// Forced-activation deadline for on-hold accounts.
    pub on_hold_timeout: Option<UnixTime>,
    /// Validity granted once the account leaves on-hold.
    pub on_hold_expire_duration: Option<i64>,
    pub created_at: UnixTime,
    pub edit_at: Option<UnixTime>,
    pub online_at: Option<UnixTime>,
}
