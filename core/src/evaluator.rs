//! Pure usage/expiry predicates.
//!
//! `now` is captured once per run and threaded through, so every account
//! in a batch is evaluated against the same cutoff.

use crate::account::Account;
use crate::types::{Bytes, UnixTime};

/// A zero or missing data limit means unlimited.
pub fn usage_exhausted(account: &Account) -> bool {
    match account.data_limit {
        Some(limit) if limit > 0 => account.used_traffic >= limit,
        _ => false,
    }
}

pub fn term_elapsed(account: &Account, now: UnixTime) -> bool {
    match account.expire {
        Some(expire) => expire <= now,
        None => false,
    }
}

pub fn usage_percent(used: Bytes, limit: Bytes) -> f64 {
    if limit <= 0 {
        return 0.0;
    }
    used as f64 / limit as f64 * 100.0
}

/// Whole days until expiry, rounded up: one second into the next day
/// counts as a full day left.
pub fn days_remaining(expire: UnixTime, now: UnixTime) -> i64 {
    let secs = expire - now;
    if secs <= 0 {
        return 0;
    }
    (secs + 86_400 - 1) / 86_400
}
