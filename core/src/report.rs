//! Report sink — status-change, rollover, and threshold events.
//!
//! RULE: emission must never block or fail the run. The trait is
//! infallible by signature; implementations swallow their own errors.

use crate::account::AccountStatus;
use crate::types::{AccountId, Bytes, UnixTime};
use serde::{Deserialize, Serialize};
use std::sync::mpsc;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReportEvent {
    StatusChanged {
        account_id: AccountId,
        username: String,
        status: AccountStatus,
    },
    RolloverApplied {
        account_id: AccountId,
        username: String,
        data_limit: Option<Bytes>,
        expire: Option<UnixTime>,
    },
    UsageThresholdReached {
        account_id: AccountId,
        username: String,
        usage_percent: f64,
        threshold: u32,
    },
    ExpiryThresholdReached {
        account_id: AccountId,
        username: String,
        days_remaining: i64,
        threshold: u32,
    },
}

pub trait ReportSink {
    fn emit(&self, event: ReportEvent);
}

/// Writes each event as a structured log line.
pub struct LogSink;

impl ReportSink for LogSink {
    fn emit(&self, event: ReportEvent) {
        match serde_json::to_string(&event) {
            Ok(json) => log::info!("[report] {json}"),
            Err(e) => log::debug!("[report] unserializable event: {e}"),
        }
    }
}

/// Forwards events over an mpsc channel. A closed receiver drops the
/// event silently; the reconciliation path never learns about it.
pub struct ChannelSink {
    tx: mpsc::Sender<ReportEvent>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::Receiver<ReportEvent>) {
        let (tx, rx) = mpsc::channel();
        (Self { tx }, rx)
    }
}

impl ReportSink for ChannelSink {
    fn emit(&self, event: ReportEvent) {
        if self.tx.send(event).is_err() {
            log::debug!("[report] receiver gone; event dropped");
        }
    }
}
