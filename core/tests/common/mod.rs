//! Shared fixtures for the integration tests.
#![allow(dead_code)]

use std::sync::Mutex;
use warden_core::account::{Account, AccountStatus, NextPlan};
use warden_core::gateway::{EnforcementGateway, GatewayError};
use warden_core::store::{NewAccount, SqliteStore};

pub const GB: i64 = 1 << 30;
pub const DAY: i64 = 86_400;

/// Fixed run cutoff; accounts are built relative to it.
pub const NOW: i64 = 1_700_000_000;

pub fn store() -> SqliteStore {
    let store = SqliteStore::in_memory().unwrap();
    store.migrate().unwrap();
    store
}

/// An active account created a month before `NOW`.
pub fn active_account(username: &str) -> NewAccount {
    NewAccount::new(username, NOW - 30 * DAY)
}

pub fn on_hold_account(username: &str) -> NewAccount {
    let mut account = NewAccount::new(username, NOW - 7 * DAY);
    account.status = AccountStatus::OnHold;
    account
}

pub fn next_plan(fire_on_either: bool) -> NextPlan {
    NextPlan {
        data_limit: Some(20 * GB),
        expire_duration: Some(30 * DAY),
        add_remaining_traffic: false,
        fire_on_either,
    }
}

/// Records every gateway call; operations listed in `fail_ops` fail.
pub struct RecordingGateway {
    pub calls: Mutex<Vec<(&'static str, String)>>,
    pub fail_ops: Vec<&'static str>,
}

impl RecordingGateway {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            fail_ops: Vec::new(),
        }
    }

    pub fn failing(ops: &[&'static str]) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            fail_ops: ops.to_vec(),
        }
    }

    pub fn calls_for(&self, op: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(o, _)| *o == op)
            .count()
    }

    fn record(&self, op: &'static str, account: &Account) -> Result<(), GatewayError> {
        self.calls
            .lock()
            .unwrap()
            .push((op, account.username.clone()));
        if self.fail_ops.contains(&op) {
            return Err(GatewayError::Rejected {
                op,
                username: account.username.clone(),
                reason: "node unreachable".into(),
            });
        }
        Ok(())
    }
}

impl EnforcementGateway for RecordingGateway {
    fn add(&self, account: &Account) -> Result<(), GatewayError> {
        self.record("add", account)
    }

    fn remove(&self, account: &Account) -> Result<(), GatewayError> {
        self.record("remove", account)
    }

    fn update(&self, account: &Account) -> Result<(), GatewayError> {
        self.record("update", account)
    }
}
