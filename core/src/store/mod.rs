//! SQLite persistence layer.
//!
//! RULE: Only the store talks to the database. The engine stages
//! mutations through the `Ledger` trait and never executes SQL directly.
//! Collaborator-owned operations (account creation, traffic accounting,
//! usage reset) live here too so the runner and tests can drive them.

mod reminder;

use crate::account::{Account, AccountStatus, NextPlan};
use crate::error::EngineResult;
use crate::ledger::{Ledger, ReminderKind};
use crate::types::{AccountId, Bytes, UnixTime};
use rusqlite::{params, Connection, Row};

pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    pub fn open(path: &str) -> EngineResult<Self> {
        let conn = Connection::open_with_flags(
            path,
            rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE
                | rusqlite::OpenFlags::SQLITE_OPEN_CREATE
                | rusqlite::OpenFlags::SQLITE_OPEN_URI,
        )?;
        // WAL mode only for real files (:memory: ignores it).
        let _ = conn.execute_batch("PRAGMA journal_mode=WAL;");
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn })
    }

    /// Open an in-memory database (used in tests and demo runs).
    pub fn in_memory() -> EngineResult<Self> {
        let conn = Connection::open(":memory:")?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn })
    }

    /// Apply all schema migrations in order.
    pub fn migrate(&self) -> EngineResult<()> {
        self.conn
            .execute_batch(include_str!("../../../migrations/001_accounts.sql"))?;
        self.conn
            .execute_batch(include_str!("../../../migrations/002_reminders.sql"))?;
        Ok(())
    }

    /// Abandon the currently staged batch.
    pub fn rollback_batch(&self) -> EngineResult<()> {
        self.conn.execute_batch("ROLLBACK;")?;
        Ok(())
    }

    // ── Collaborator operations ────────────────────────────────

    pub fn insert_account(&self, account: &NewAccount) -> EngineResult<AccountId> {
        let next_plan = account
            .next_plan
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        self.conn.execute(
            "INSERT INTO account (
                username, status, used_traffic, data_limit, expire, next_plan,
                on_hold_timeout, on_hold_expire_duration, created_at, edit_at, online_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                account.username,
                account.status,
                account.used_traffic,
                account.data_limit,
                account.expire,
                next_plan,
                account.on_hold_timeout,
                account.on_hold_expire_duration,
                account.created_at,
                account.edit_at,
                account.online_at,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn account_by_id(&self, id: AccountId) -> EngineResult<Account> {
        self.conn
            .query_row(
                "SELECT id, username, status, used_traffic, data_limit, expire, next_plan,
                        on_hold_timeout, on_hold_expire_duration, created_at, edit_at, online_at
                 FROM account WHERE id = ?1",
                params![id],
                account_row_mapper,
            )
            .map_err(Into::into)
    }

    pub fn count_by_status(&self, status: AccountStatus) -> EngineResult<i64> {
        self.conn
            .query_row(
                "SELECT COUNT(*) FROM account WHERE status = ?1",
                params![status],
                |row| row.get(0),
            )
            .map_err(Into::into)
    }

    /// Traffic accounting — owned by the data plane, not the engine.
    pub fn record_traffic(&self, id: AccountId, delta: Bytes) -> EngineResult<()> {
        self.conn.execute(
            "UPDATE account SET used_traffic = used_traffic + ?1 WHERE id = ?2",
            params![delta, id],
        )?;
        Ok(())
    }

    pub fn set_used_traffic(&self, id: AccountId, used: Bytes) -> EngineResult<()> {
        self.conn.execute(
            "UPDATE account SET used_traffic = ?1 WHERE id = ?2",
            params![used, id],
        )?;
        Ok(())
    }

    pub fn mark_online(&self, id: AccountId, at: UnixTime) -> EngineResult<()> {
        self.conn.execute(
            "UPDATE account SET online_at = ?1 WHERE id = ?2",
            params![at, id],
        )?;
        Ok(())
    }

    /// Usage reset. Clearing the usage reminders belongs to this
    /// operation: the counter backing them starts over.
    pub fn reset_usage(&self, id: AccountId) -> EngineResult<()> {
        self.conn.execute(
            "UPDATE account SET used_traffic = 0 WHERE id = ?1",
            params![id],
        )?;
        self.clear_reminders(id, Some(ReminderKind::UsageThreshold))?;
        Ok(())
    }
}

impl Ledger for SqliteStore {
    fn accounts_by_status(&mut self, status: AccountStatus) -> EngineResult<Vec<Account>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, username, status, used_traffic, data_limit, expire, next_plan,
                    on_hold_timeout, on_hold_expire_duration, created_at, edit_at, online_at
             FROM account WHERE status = ?1
             ORDER BY id ASC",
        )?;
        let rows = stmt.query_map(params![status], account_row_mapper)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    fn begin_batch(&mut self) -> EngineResult<()> {
        self.conn.execute_batch("BEGIN IMMEDIATE;")?;
        Ok(())
    }

    fn commit_batch(&mut self) -> EngineResult<()> {
        self.conn.execute_batch("COMMIT;")?;
        Ok(())
    }

    fn stage_status(&mut self, id: AccountId, status: AccountStatus) -> EngineResult<()> {
        self.conn.execute(
            "UPDATE account SET status = ?1 WHERE id = ?2",
            params![status, id],
        )?;
        Ok(())
    }

    fn stage_activation(&mut self, account: &Account, now: UnixTime) -> EngineResult<()> {
        let expire = match account.on_hold_expire_duration {
            Some(duration) => Some(now + duration),
            None => account.expire,
        };
        self.conn.execute(
            "UPDATE account SET status = 'active', expire = ?1,
                    on_hold_timeout = NULL, on_hold_expire_duration = NULL
             WHERE id = ?2",
            params![expire, account.id],
        )?;
        Ok(())
    }

    fn apply_next_plan(&mut self, account: &Account, now: UnixTime) -> EngineResult<Account> {
        let plan = match &account.next_plan {
            Some(plan) => plan.clone(),
            None => {
                return Err(anyhow::anyhow!(
                    "account \"{}\" has no next plan to apply",
                    account.username
                )
                .into())
            }
        };

        let carried = if plan.add_remaining_traffic {
            (account.data_limit.unwrap_or(0) - account.used_traffic).max(0)
        } else {
            0
        };
        let data_limit = plan.data_limit.map(|base| base + carried);
        let expire = plan.expire_duration.map(|duration| now + duration);

        self.conn.execute(
            "UPDATE account SET status = 'active', used_traffic = 0,
                    data_limit = ?1, expire = ?2, next_plan = NULL
             WHERE id = ?3",
            params![data_limit, expire, account.id],
        )?;
        // Both counters restart, so both reminder channels reset.
        self.clear_reminders(account.id, None)?;

        let mut rolled = account.clone();
        rolled.status = AccountStatus::Active;
        rolled.used_traffic = 0;
        rolled.data_limit = data_limit;
        rolled.expire = expire;
        rolled.next_plan = None;
        Ok(rolled)
    }

    fn reminder_exists(
        &mut self,
        id: AccountId,
        kind: ReminderKind,
        threshold: u32,
    ) -> EngineResult<bool> {
        self.reminder_recorded(id, kind, threshold)
    }

    fn record_reminder(
        &mut self,
        id: AccountId,
        kind: ReminderKind,
        threshold: u32,
        now: UnixTime,
    ) -> EngineResult<()> {
        self.insert_reminder(id, kind, threshold, now)
    }
}

/// Insert payload for collaborator-created accounts.
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub username: String,
    pub status: AccountStatus,
    pub used_traffic: Bytes,
    pub data_limit: Option<Bytes>,
    pub expire: Option<UnixTime>,
    pub next_plan: Option<NextPlan>,
    pub on_hold_timeout: Option<UnixTime>,
    pub on_hold_expire_duration: Option<i64>,
    pub created_at: UnixTime,
    pub edit_at: Option<UnixTime>,
    pub online_at: Option<UnixTime>,
}

impl NewAccount {
    /// A plain active account; callers fill in what they need.
    pub fn new(username: impl Into<String>, created_at: UnixTime) -> Self {
        Self {
            username: username.into(),
            status: AccountStatus::Active,
            used_traffic: 0,
            data_limit: None,
            expire: None,
            next_plan: None,
            on_hold_timeout: None,
            on_hold_expire_duration: None,
            created_at,
            edit_at: None,
            online_at: None,
        }
    }
}

fn account_row_mapper(row: &Row<'_>) -> rusqlite::Result<Account> {
    let next_plan: Option<String> = row.get(6)?;
    let next_plan = match next_plan {
        Some(raw) => Some(serde_json::from_str::<NextPlan>(&raw).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(6, rusqlite::types::Type::Text, Box::new(e))
        })?),
        None => None,
    };
    Ok(Account {
        id: row.get(0)?,
        username: row.get(1)?,
        status: row.get(2)?,
        used_traffic: row.get(3)?,
        data_limit: row.get(4)?,
        expire: row.get(5)?,
        next_plan,
        on_hold_timeout: row.get(7)?,
        on_hold_expire_duration: row.get(8)?,
        created_at: row.get(9)?,
        edit_at: row.get(10)?,
        online_at: row.get(11)?,
    })
}
