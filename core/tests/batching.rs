//! Batch commit controller tests: bounded transactions, commit counts,
//! and fatal commit failures that keep earlier batches.

mod common;

use common::{active_account, store, RecordingGateway, GB, NOW};
use warden_core::account::{Account, AccountStatus};
use warden_core::config::ReviewConfig;
use warden_core::engine::ReviewEngine;
use warden_core::error::EngineResult;
use warden_core::ledger::{Ledger, ReminderKind};
use warden_core::report::ChannelSink;
use warden_core::store::SqliteStore;
use warden_core::types::{AccountId, UnixTime};

fn over_limit_population(store: &SqliteStore, count: usize) {
    for i in 0..count {
        let mut account = active_account(&format!("acct-{i:05}"));
        account.data_limit = Some(GB);
        account.used_traffic = GB;
        store.insert_account(&account).unwrap();
    }
}

/// 1200 qualifying transitions at batch size 500 commit as 500/500/200.
#[test]
fn twelve_hundred_transitions_make_three_commits() {
    let mut store = store();
    over_limit_population(&store, 1200);

    let gateway = RecordingGateway::new();
    let (sink, _rx) = ChannelSink::new();
    let config = ReviewConfig {
        active_batch_size: 500,
        ..ReviewConfig::default()
    };
    let summary = {
        let mut engine = ReviewEngine::new(&mut store, &gateway, &sink, config);
        engine.review(NOW).unwrap()
    };

    assert_eq!(summary.limited, 1200);
    assert_eq!(summary.active_commits, 3, "500 + 500 + 200");
    assert_eq!(store.count_by_status(AccountStatus::Limited).unwrap(), 1200);
}

/// An exact multiple of the batch size needs no remainder commit.
#[test]
fn exact_multiple_has_no_remainder_commit() {
    let mut store = store();
    over_limit_population(&store, 10);

    let gateway = RecordingGateway::new();
    let (sink, _rx) = ChannelSink::new();
    let config = ReviewConfig {
        active_batch_size: 5,
        ..ReviewConfig::default()
    };
    let summary = {
        let mut engine = ReviewEngine::new(&mut store, &gateway, &sink, config);
        engine.review(NOW).unwrap()
    };

    assert_eq!(summary.active_commits, 2);
    assert_eq!(store.count_by_status(AccountStatus::Limited).unwrap(), 10);
}

/// Wraps the real store and fails the nth commit the way a dropped
/// database connection would: the staged batch is gone.
struct FailingLedger {
    inner: SqliteStore,
    fail_on: usize,
    commits: usize,
}

impl Ledger for FailingLedger {
    fn accounts_by_status(&mut self, status: AccountStatus) -> EngineResult<Vec<Account>> {
        self.inner.accounts_by_status(status)
    }

    fn begin_batch(&mut self) -> EngineResult<()> {
        self.inner.begin_batch()
    }

    fn commit_batch(&mut self) -> EngineResult<()> {
        self.commits += 1;
        if self.commits == self.fail_on {
            self.inner.rollback_batch()?;
            return Err(anyhow::anyhow!("forced commit failure").into());
        }
        self.inner.commit_batch()
    }

    fn stage_status(&mut self, id: AccountId, status: AccountStatus) -> EngineResult<()> {
        self.inner.stage_status(id, status)
    }

    fn stage_activation(&mut self, account: &Account, now: UnixTime) -> EngineResult<()> {
        self.inner.stage_activation(account, now)
    }

    fn apply_next_plan(&mut self, account: &Account, now: UnixTime) -> EngineResult<Account> {
        self.inner.apply_next_plan(account, now)
    }

    fn reminder_exists(
        &mut self,
        id: AccountId,
        kind: ReminderKind,
        threshold: u32,
    ) -> EngineResult<bool> {
        self.inner.reminder_exists(id, kind, threshold)
    }

    fn record_reminder(
        &mut self,
        id: AccountId,
        kind: ReminderKind,
        threshold: u32,
        now: UnixTime,
    ) -> EngineResult<()> {
        self.inner.record_reminder(id, kind, threshold, now)
    }
}

/// A failed commit aborts the rest of the run, but the batches
/// committed before it are not rolled back.
#[test]
fn commit_failure_aborts_but_keeps_prior_batches() {
    let store = store();
    over_limit_population(&store, 1200);
    let mut ledger = FailingLedger {
        inner: store,
        fail_on: 2,
        commits: 0,
    };

    let gateway = RecordingGateway::new();
    let (sink, _rx) = ChannelSink::new();
    let config = ReviewConfig {
        active_batch_size: 500,
        ..ReviewConfig::default()
    };
    let result = {
        let mut engine = ReviewEngine::new(&mut ledger, &gateway, &sink, config);
        engine.review(NOW)
    };

    assert!(result.is_err(), "commit failure is fatal to the run");
    assert_eq!(ledger.commits, 2, "no retry, no further batches");
    assert_eq!(
        ledger.inner.count_by_status(AccountStatus::Limited).unwrap(),
        500,
        "first batch survives"
    );
    assert_eq!(
        ledger.inner.count_by_status(AccountStatus::Active).unwrap(),
        700,
        "uncommitted work is lost, not half-applied"
    );
}

/// The on-hold pass runs its own batch cycle, independent of the
/// active pass.
#[test]
fn on_hold_pass_batches_independently() {
    let mut store = store();
    for i in 0..7 {
        let mut account = common::on_hold_account(&format!("hold-{i}"));
        account.on_hold_timeout = Some(NOW - 1);
        store.insert_account(&account).unwrap();
    }

    let gateway = RecordingGateway::new();
    let (sink, _rx) = ChannelSink::new();
    let config = ReviewConfig {
        on_hold_batch_size: 3,
        ..ReviewConfig::default()
    };
    let summary = {
        let mut engine = ReviewEngine::new(&mut store, &gateway, &sink, config);
        engine.review(NOW).unwrap()
    };

    assert_eq!(summary.on_hold_activated, 7);
    assert_eq!(summary.on_hold_commits, 3, "3 + 3 + 1");
    assert_eq!(summary.active_commits, 0);
    assert_eq!(store.count_by_status(AccountStatus::Active).unwrap(), 7);
}
