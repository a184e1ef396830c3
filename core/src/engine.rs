//! The reconciliation engine — the heart of the review job.
//!
//! One `review` run walks every active account in ascending-id order,
//! applies rollovers and limited/expired transitions with bounded
//! commits, then activates due on-hold accounts in an independent
//! second pass, and logs a summary.
//!
//! RULES:
//!   - `now` is captured once per run; every account sees the same cutoff.
//!   - A rollover short-circuits the plain transition for that account.
//!   - The local ledger is authoritative; enforcement-plane failures are
//!     logged and discarded, never propagated.
//!   - Commit failures are fatal to the pass. Committed batches stay.

use crate::{
    account::{Account, AccountStatus},
    config::ReviewConfig,
    error::EngineResult,
    evaluator::{days_remaining, term_elapsed, usage_exhausted, usage_percent},
    gateway::EnforcementGateway,
    ledger::{Ledger, ReminderKind},
    progress::SyncProgress,
    report::{ReportEvent, ReportSink},
    types::UnixTime,
};
use std::time::{Duration, Instant};

/// Observability thresholds for slow-step logging. Purely diagnostic;
/// nothing is cancelled.
const SLOW_ACCOUNT_TOTAL: Duration = Duration::from_secs(1);
const SLOW_STEP: Duration = Duration::from_millis(300);

/// Counters and per-phase timings for one review run.
#[derive(Debug, Default, Clone)]
pub struct RunSummary {
    pub checked_active: usize,
    pub applied_next: usize,
    pub limited: usize,
    pub expired: usize,
    pub on_hold_activated: usize,
    /// Commits that flushed staged lifecycle changes, per pass.
    pub active_commits: usize,
    pub on_hold_commits: usize,
    pub timings: PhaseTimings,
}

#[derive(Debug, Default, Clone)]
pub struct PhaseTimings {
    pub fetch: Duration,
    pub evaluate: Duration,
    /// Enforcement-plane calls.
    pub sync: Duration,
    pub commit: Duration,
}

/// Outcome of a best-effort enforcement resync.
#[derive(Debug, Default, Clone, Copy)]
pub struct ResyncOutcome {
    pub pushed: usize,
    pub failed: usize,
}

pub struct ReviewEngine<'a> {
    ledger: &'a mut dyn Ledger,
    gateway: &'a dyn EnforcementGateway,
    reports: &'a dyn ReportSink,
    config: ReviewConfig,
}

impl<'a> ReviewEngine<'a> {
    pub fn new(
        ledger: &'a mut dyn Ledger,
        gateway: &'a dyn EnforcementGateway,
        reports: &'a dyn ReportSink,
        config: ReviewConfig,
    ) -> Self {
        Self {
            ledger,
            gateway,
            reports,
            config,
        }
    }

    /// One full reconciliation run against a single time cutoff.
    pub fn review(&mut self, now: UnixTime) -> EngineResult<RunSummary> {
        let run_start = Instant::now();
        let mut summary = RunSummary::default();

        self.review_active(now, &mut summary)?;
        self.review_on_hold(now, &mut summary)?;

        log::info!(
            "review finished in {:.2}s; active_checked={}, applied_next={}, \
             limited={}, expired={}, on_hold_activated={}",
            run_start.elapsed().as_secs_f64(),
            summary.checked_active,
            summary.applied_next,
            summary.limited,
            summary.expired,
            summary.on_hold_activated,
        );
        log::debug!(
            "[review][phases] fetch={:.3}s evaluate={:.3}s sync={:.3}s commit={:.3}s",
            summary.timings.fetch.as_secs_f64(),
            summary.timings.evaluate.as_secs_f64(),
            summary.timings.sync.as_secs_f64(),
            summary.timings.commit.as_secs_f64(),
        );
        Ok(summary)
    }

    // ── Active pass ────────────────────────────────────────────

    fn review_active(&mut self, now: UnixTime, summary: &mut RunSummary) -> EngineResult<()> {
        let fetch_start = Instant::now();
        let accounts = self.ledger.accounts_by_status(AccountStatus::Active)?;
        summary.timings.fetch += fetch_start.elapsed();
        log::info!(
            "[review] fetched {} active accounts in {:.3}s",
            accounts.len(),
            fetch_start.elapsed().as_secs_f64()
        );

        self.ledger.begin_batch()?;
        let mut changed_in_batch = 0usize;

        for account in &accounts {
            summary.checked_active += 1;
            let account_start = Instant::now();
            let mut remove_time = Duration::ZERO;
            let mut notify_time = Duration::ZERO;

            let eval_start = Instant::now();
            let limited = usage_exhausted(account);
            let expired = term_elapsed(account, now);
            summary.timings.evaluate += eval_start.elapsed();

            if limited || expired {
                if let Some(plan) = &account.next_plan {
                    if plan.fires(limited, expired) {
                        self.apply_rollover(account, now, summary)?;
                        changed_in_batch += 1;
                        if changed_in_batch >= self.config.active_batch_size {
                            self.flush_batch("active", changed_in_batch, &mut summary.timings)?;
                            summary.active_commits += 1;
                            self.ledger.begin_batch()?;
                            changed_in_batch = 0;
                        }
                        continue;
                    }
                }
            }

            let status = if limited {
                summary.limited += 1;
                AccountStatus::Limited
            } else if expired {
                summary.expired += 1;
                AccountStatus::Expired
            } else {
                if self.config.notify_enabled {
                    let notify_start = Instant::now();
                    self.review_reminders(account, now)?;
                    notify_time = notify_start.elapsed();
                    summary.timings.evaluate += notify_time;
                }
                continue;
            };

            // A node that cannot be reached right now converges on a
            // later run; the local status change goes ahead regardless.
            let remove_start = Instant::now();
            if let Err(e) = self.gateway.remove(account) {
                log::warn!(
                    "Failed to remove account \"{}\" from enforcement plane: {e}",
                    account.username
                );
            }
            remove_time = remove_start.elapsed();
            summary.timings.sync += remove_time;

            self.ledger.stage_status(account.id, status)?;
            self.reports.emit(ReportEvent::StatusChanged {
                account_id: account.id,
                username: account.username.clone(),
                status,
            });
            log::info!(
                "Account \"{}\" status changed to {status}",
                account.username
            );

            changed_in_batch += 1;
            if changed_in_batch >= self.config.active_batch_size {
                self.flush_batch("active", changed_in_batch, &mut summary.timings)?;
                summary.active_commits += 1;
                self.ledger.begin_batch()?;
                changed_in_batch = 0;
            }

            let total = account_start.elapsed();
            if total >= SLOW_ACCOUNT_TOTAL || remove_time >= SLOW_STEP || notify_time >= SLOW_STEP
            {
                log::info!(
                    "[review][active][slow] account=\"{}\" total={:.3}s remove={:.3}s notify={:.3}s",
                    account.username,
                    total.as_secs_f64(),
                    remove_time.as_secs_f64(),
                    notify_time.as_secs_f64(),
                );
            }
        }

        if changed_in_batch > 0 {
            log::info!("[review] final commit for remaining active size={changed_in_batch}");
            self.flush_batch("active", changed_in_batch, &mut summary.timings)?;
            summary.active_commits += 1;
        } else {
            // Nothing staged beyond reminders; close the transaction.
            let commit_start = Instant::now();
            self.ledger.commit_batch()?;
            summary.timings.commit += commit_start.elapsed();
        }
        Ok(())
    }

    /// Replace the account's limits with its successor plan instead of
    /// applying a plain transition. Counted separately from ordinary
    /// transitions.
    fn apply_rollover(
        &mut self,
        account: &Account,
        now: UnixTime,
        summary: &mut RunSummary,
    ) -> EngineResult<()> {
        let rolled = self.ledger.apply_next_plan(account, now)?;

        // The node keeps serving this account; push the refreshed limits.
        let sync_start = Instant::now();
        if let Err(e) = self.gateway.update(&rolled) {
            log::warn!(
                "Failed to update account \"{}\" on enforcement plane during rollover: {e}",
                rolled.username
            );
        }
        let sync_time = sync_start.elapsed();
        summary.timings.sync += sync_time;
        if sync_time >= SLOW_STEP {
            log::info!(
                "[review][next_plan] account=\"{}\" plane update took {:.3}s",
                rolled.username,
                sync_time.as_secs_f64()
            );
        }

        self.reports.emit(ReportEvent::RolloverApplied {
            account_id: rolled.id,
            username: rolled.username.clone(),
            data_limit: rolled.data_limit,
            expire: rolled.expire,
        });
        summary.applied_next += 1;
        Ok(())
    }

    // ── Reminder tracker ───────────────────────────────────────

    /// At most one reminder per channel per run; a recorded threshold
    /// stays silent until the counter behind it is reset.
    fn review_reminders(&mut self, account: &Account, now: UnixTime) -> EngineResult<()> {
        if let Some(limit) = account.data_limit {
            if limit > 0 {
                let percent = usage_percent(account.used_traffic, limit);
                // Highest crossed threshold wins; emit once, then stop.
                for &threshold in self.config.usage_thresholds.iter().rev() {
                    if percent >= f64::from(threshold) {
                        if !self.ledger.reminder_exists(
                            account.id,
                            ReminderKind::UsageThreshold,
                            threshold,
                        )? {
                            self.ledger.record_reminder(
                                account.id,
                                ReminderKind::UsageThreshold,
                                threshold,
                                now,
                            )?;
                            self.reports.emit(ReportEvent::UsageThresholdReached {
                                account_id: account.id,
                                username: account.username.clone(),
                                usage_percent: percent,
                                threshold,
                            });
                        }
                        break;
                    }
                }
            }
        }

        if let Some(expire) = account.expire {
            let days = days_remaining(expire, now);
            // Lowest threshold still covering the days left; emit once,
            // then stop.
            for &threshold in self.config.days_left_thresholds.iter() {
                if days <= i64::from(threshold) {
                    if !self.ledger.reminder_exists(
                        account.id,
                        ReminderKind::ExpiryThreshold,
                        threshold,
                    )? {
                        self.ledger.record_reminder(
                            account.id,
                            ReminderKind::ExpiryThreshold,
                            threshold,
                            now,
                        )?;
                        self.reports.emit(ReportEvent::ExpiryThresholdReached {
                            account_id: account.id,
                            username: account.username.clone(),
                            days_remaining: days,
                            threshold,
                        });
                    }
                    break;
                }
            }
        }
        Ok(())
    }

    // ── On-hold pass ───────────────────────────────────────────

    /// Activation is one-directional: nothing here ever moves an account
    /// back to on_hold.
    fn review_on_hold(&mut self, now: UnixTime, summary: &mut RunSummary) -> EngineResult<()> {
        let fetch_start = Instant::now();
        let accounts = self.ledger.accounts_by_status(AccountStatus::OnHold)?;
        summary.timings.fetch += fetch_start.elapsed();
        log::info!(
            "[review] fetched {} on_hold accounts in {:.3}s",
            accounts.len(),
            fetch_start.elapsed().as_secs_f64()
        );

        self.ledger.begin_batch()?;
        let mut changed_in_batch = 0usize;

        for account in &accounts {
            // First genuine connection after provisioning/edit, or
            // forced activation once the grace period lapses.
            let reference = account.edit_at.unwrap_or(account.created_at);
            let connected = account.online_at.map_or(false, |at| at >= reference);
            let timed_out = account.on_hold_timeout.map_or(false, |t| t <= now);
            if !connected && !timed_out {
                continue;
            }

            self.ledger.stage_activation(account, now)?;
            summary.on_hold_activated += 1;
            changed_in_batch += 1;

            self.reports.emit(ReportEvent::StatusChanged {
                account_id: account.id,
                username: account.username.clone(),
                status: AccountStatus::Active,
            });
            log::info!("Account \"{}\" status changed to active", account.username);

            if changed_in_batch >= self.config.on_hold_batch_size {
                self.flush_batch("on_hold", changed_in_batch, &mut summary.timings)?;
                summary.on_hold_commits += 1;
                self.ledger.begin_batch()?;
                changed_in_batch = 0;
            }
        }

        if changed_in_batch > 0 {
            log::info!("[review] final commit for remaining on_hold size={changed_in_batch}");
            self.flush_batch("on_hold", changed_in_batch, &mut summary.timings)?;
            summary.on_hold_commits += 1;
        } else {
            let commit_start = Instant::now();
            self.ledger.commit_batch()?;
            summary.timings.commit += commit_start.elapsed();
        }
        Ok(())
    }

    // ── Batch commit ───────────────────────────────────────────

    /// Commit the staged batch. Failure propagates and aborts the pass;
    /// batches committed before it stay applied.
    fn flush_batch(
        &mut self,
        pass: &'static str,
        size: usize,
        timings: &mut PhaseTimings,
    ) -> EngineResult<()> {
        log::info!("[review] starting commit for {pass} batch size={size}");
        let commit_start = Instant::now();
        let result = self.ledger.commit_batch();
        let elapsed = commit_start.elapsed();
        timings.commit += elapsed;
        match result {
            Ok(()) => {
                log::info!(
                    "[review] commit of {pass} batch took {:.3}s",
                    elapsed.as_secs_f64()
                );
                Ok(())
            }
            Err(e) => {
                log::error!("Failed to commit {pass} batch: {e}");
                Err(e)
            }
        }
    }

    // ── Enforcement resync ─────────────────────────────────────

    /// Push every active account back to the enforcement plane. Repairs
    /// drift after a plane restart; per-account failures are logged and
    /// counted, never fatal.
    pub fn resync(&mut self, progress: &SyncProgress) -> EngineResult<ResyncOutcome> {
        let op = progress.begin("resync");
        let accounts = self.ledger.accounts_by_status(AccountStatus::Active)?;
        let mut outcome = ResyncOutcome::default();
        for account in &accounts {
            match self.gateway.add(account) {
                Ok(()) => outcome.pushed += 1,
                Err(e) => {
                    log::warn!(
                        "Failed to push account \"{}\" to enforcement plane: {e}",
                        account.username
                    );
                    outcome.failed += 1;
                }
            }
        }
        progress.finish(op);
        log::info!(
            "[resync] pushed={} failed={}",
            outcome.pushed,
            outcome.failed
        );
        Ok(outcome)
    }
}
