//! Interval scheduling with overlap coalescing.
//!
//! RULE: at most one review run executes at any time. A trigger that
//! arrives mid-run is absorbed — not queued, not run concurrently.

use crate::error::EngineResult;
use crate::progress::SyncProgress;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone, Default)]
pub struct RunGuard {
    running: Arc<AtomicBool>,
}

impl RunGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the run slot. Returns `None` while another holder is
    /// alive; the caller treats that as an absorbed trigger.
    pub fn try_acquire(&self) -> Option<RunToken> {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            Some(RunToken {
                running: Arc::clone(&self.running),
            })
        } else {
            None
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

/// Releases the slot on drop, so early returns and panics both release.
pub struct RunToken {
    running: Arc<AtomicBool>,
}

impl Drop for RunToken {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Release);
    }
}

pub struct Scheduler {
    guard: RunGuard,
    interval: Duration,
}

impl Scheduler {
    pub fn new(interval: Duration) -> Self {
        Self {
            guard: RunGuard::new(),
            interval,
        }
    }

    /// Handle for external triggers sharing this scheduler's run slot.
    pub fn guard(&self) -> RunGuard {
        self.guard.clone()
    }

    /// Fire one trigger: run if the slot is free, absorb otherwise.
    /// A failed run is logged here and waits for the next interval.
    /// Returns whether the trigger executed.
    pub fn trigger<F>(&self, progress: &SyncProgress, run: F) -> bool
    where
        F: FnOnce() -> EngineResult<()>,
    {
        let Some(_token) = self.guard.try_acquire() else {
            log::debug!("[scheduler] trigger absorbed; a run is still executing");
            return false;
        };
        let op = progress.begin("review");
        if let Err(e) = run() {
            log::error!("[scheduler] review run failed: {e}");
        }
        progress.finish(op);
        true
    }

    /// Blocking fixed-interval loop.
    pub fn run_loop<F>(&self, progress: &SyncProgress, mut run: F) -> !
    where
        F: FnMut() -> EngineResult<()>,
    {
        loop {
            std::thread::sleep(self.interval);
            self.trigger(progress, &mut run);
        }
    }
}
