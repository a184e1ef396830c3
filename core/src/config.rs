//! Engine configuration, loadable from a JSON file.

use crate::error::{EngineError, EngineResult};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReviewConfig {
    /// Seconds between scheduled review runs.
    pub run_interval_secs: u64,
    /// Master switch for threshold notifications.
    pub notify_enabled: bool,
    /// Usage percent thresholds, e.g. [50, 80, 95].
    pub usage_thresholds: Vec<u32>,
    /// Days-left thresholds, e.g. [1, 3, 7].
    pub days_left_thresholds: Vec<u32>,
    /// Staged lifecycle changes per commit in the active pass.
    pub active_batch_size: usize,
    /// Staged activations per commit in the on-hold pass.
    pub on_hold_batch_size: usize,
}

impl Default for ReviewConfig {
    fn default() -> Self {
        Self {
            run_interval_secs: 30,
            notify_enabled: true,
            usage_thresholds: vec![80, 95],
            days_left_thresholds: vec![3],
            active_batch_size: 500,
            on_hold_batch_size: 500,
        }
    }
}

impl ReviewConfig {
    pub fn from_file(path: &Path) -> EngineResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        let mut config: Self = serde_json::from_str(&raw)?;
        config.normalize();
        config.validate()?;
        Ok(config)
    }

    /// Thresholds are kept sorted ascending and deduped; scan direction
    /// is decided at the use site.
    pub fn normalize(&mut self) {
        self.usage_thresholds.sort_unstable();
        self.usage_thresholds.dedup();
        self.days_left_thresholds.sort_unstable();
        self.days_left_thresholds.dedup();
    }

    fn validate(&self) -> EngineResult<()> {
        if self.active_batch_size == 0 || self.on_hold_batch_size == 0 {
            return Err(EngineError::Config("batch sizes must be non-zero".into()));
        }
        Ok(())
    }
}
