//! Reminder store — dedup keys for threshold notifications.

use super::SqliteStore;
use crate::error::EngineResult;
use crate::ledger::ReminderKind;
use crate::types::{AccountId, UnixTime};
use rusqlite::params;

impl SqliteStore {
    pub(crate) fn reminder_recorded(
        &self,
        id: AccountId,
        kind: ReminderKind,
        threshold: u32,
    ) -> EngineResult<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM notification_reminder
             WHERE account_id = ?1 AND kind = ?2 AND threshold = ?3",
            params![id, kind.as_str(), threshold],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    pub(crate) fn insert_reminder(
        &self,
        id: AccountId,
        kind: ReminderKind,
        threshold: u32,
        now: UnixTime,
    ) -> EngineResult<()> {
        self.conn.execute(
            "INSERT OR IGNORE INTO notification_reminder (account_id, kind, threshold, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![id, kind.as_str(), threshold, now],
        )?;
        Ok(())
    }

    /// Drop recorded reminders for an account. `kind = None` clears both
    /// channels (a rollover refreshes both counters).
    pub fn clear_reminders(&self, id: AccountId, kind: Option<ReminderKind>) -> EngineResult<()> {
        match kind {
            Some(kind) => {
                self.conn.execute(
                    "DELETE FROM notification_reminder WHERE account_id = ?1 AND kind = ?2",
                    params![id, kind.as_str()],
                )?;
            }
            None => {
                self.conn.execute(
                    "DELETE FROM notification_reminder WHERE account_id = ?1",
                    params![id],
                )?;
            }
        }
        Ok(())
    }

    pub fn reminder_count(&self, id: AccountId) -> EngineResult<i64> {
        self.conn
            .query_row(
                "SELECT COUNT(*) FROM notification_reminder WHERE account_id = ?1",
                params![id],
                |row| row.get(0),
            )
            .map_err(Into::into)
    }
}
