//! Next-plan rollover tests: trigger modes, traffic credit, and
//! reminder invalidation.

mod common;

use common::{active_account, next_plan, store, RecordingGateway, DAY, GB, NOW};
use warden_core::account::AccountStatus;
use warden_core::config::ReviewConfig;
use warden_core::engine::ReviewEngine;
use warden_core::report::{ChannelSink, ReportEvent};

/// `fire_on_either` rolls over on a single trigger, and the plain
/// limited transition must not also apply.
#[test]
fn either_mode_fires_on_limited_alone() {
    let mut store = store();
    let mut account = active_account("roller");
    account.data_limit = Some(10 * GB);
    account.used_traffic = 10 * GB;
    account.next_plan = Some(next_plan(true));
    let id = store.insert_account(&account).unwrap();

    let gateway = RecordingGateway::new();
    let (sink, rx) = ChannelSink::new();
    let summary = {
        let mut engine = ReviewEngine::new(&mut store, &gateway, &sink, ReviewConfig::default());
        engine.review(NOW).unwrap()
    };

    assert_eq!(summary.applied_next, 1);
    assert_eq!(summary.limited, 0, "rollover short-circuits the transition");

    let rolled = store.account_by_id(id).unwrap();
    assert_eq!(rolled.status, AccountStatus::Active);
    assert_eq!(rolled.used_traffic, 0);
    assert_eq!(rolled.data_limit, Some(20 * GB));
    assert_eq!(rolled.expire, Some(NOW + 30 * DAY));
    assert!(rolled.next_plan.is_none(), "plan is consumed");

    // The account stays on the plane: update, not remove.
    assert_eq!(gateway.calls_for("update"), 1);
    assert_eq!(gateway.calls_for("remove"), 0);

    let rollover_reports = rx
        .try_iter()
        .filter(|e| matches!(e, ReportEvent::RolloverApplied { .. }))
        .count();
    assert_eq!(rollover_reports, 1);
}

/// Conjunction mode demands both triggers; limited alone applies the
/// plain transition instead.
#[test]
fn conjunction_mode_needs_both_triggers() {
    let mut store = store();
    let mut account = active_account("strict");
    account.data_limit = Some(10 * GB);
    account.used_traffic = 10 * GB;
    account.expire = Some(NOW + 30 * DAY);
    account.next_plan = Some(next_plan(false));
    let id = store.insert_account(&account).unwrap();

    let gateway = RecordingGateway::new();
    let (sink, _rx) = ChannelSink::new();
    let summary = {
        let mut engine = ReviewEngine::new(&mut store, &gateway, &sink, ReviewConfig::default());
        engine.review(NOW).unwrap()
    };

    assert_eq!(summary.applied_next, 0);
    assert_eq!(summary.limited, 1);
    let account = store.account_by_id(id).unwrap();
    assert_eq!(account.status, AccountStatus::Limited);
    assert!(account.next_plan.is_some(), "unfired plan is kept");
}

#[test]
fn conjunction_mode_fires_when_both_hold() {
    let mut store = store();
    let mut account = active_account("drained");
    account.data_limit = Some(10 * GB);
    account.used_traffic = 11 * GB;
    account.expire = Some(NOW - DAY);
    account.next_plan = Some(next_plan(false));
    let id = store.insert_account(&account).unwrap();

    let gateway = RecordingGateway::new();
    let (sink, _rx) = ChannelSink::new();
    let summary = {
        let mut engine = ReviewEngine::new(&mut store, &gateway, &sink, ReviewConfig::default());
        engine.review(NOW).unwrap()
    };

    assert_eq!(summary.applied_next, 1);
    assert_eq!(summary.limited + summary.expired, 0);
    assert_eq!(
        store.account_by_id(id).unwrap().status,
        AccountStatus::Active
    );
}

/// `add_remaining_traffic` credits the unspent allowance onto the
/// successor plan.
#[test]
fn rollover_credits_remaining_traffic() {
    let mut store = store();
    let mut account = active_account("thrifty");
    account.data_limit = Some(10 * GB);
    account.used_traffic = 4 * GB;
    account.expire = Some(NOW - 1);
    let mut plan = next_plan(true);
    plan.add_remaining_traffic = true;
    account.next_plan = Some(plan);
    let id = store.insert_account(&account).unwrap();

    let gateway = RecordingGateway::new();
    let (sink, _rx) = ChannelSink::new();
    {
        let mut engine = ReviewEngine::new(&mut store, &gateway, &sink, ReviewConfig::default());
        engine.review(NOW).unwrap();
    }

    let rolled = store.account_by_id(id).unwrap();
    assert_eq!(rolled.data_limit, Some(26 * GB), "20 GB plan + 6 GB unspent");
    assert_eq!(rolled.used_traffic, 0);
}

/// A rollover resets both counters, so recorded reminders are
/// invalidated and fire again on the fresh plan.
#[test]
fn rollover_clears_recorded_reminders() {
    let mut store = store();
    let mut account = active_account("cyclic");
    account.data_limit = Some(10 * GB);
    account.used_traffic = 85 * GB / 10; // 85%
    account.next_plan = Some(next_plan(true));
    let id = store.insert_account(&account).unwrap();

    let gateway = RecordingGateway::new();
    let (sink, rx) = ChannelSink::new();
    let config = ReviewConfig::default(); // thresholds [80, 95]

    // First run: under the limit, so only a reminder is recorded.
    {
        let mut engine = ReviewEngine::new(&mut store, &gateway, &sink, config.clone());
        engine.review(NOW).unwrap();
    }
    assert_eq!(store.reminder_count(id).unwrap(), 1);

    // The data plane burns through the rest; the next run rolls over.
    store.set_used_traffic(id, 10 * GB).unwrap();
    let summary = {
        let mut engine = ReviewEngine::new(&mut store, &gateway, &sink, config.clone());
        engine.review(NOW).unwrap()
    };
    assert_eq!(summary.applied_next, 1);
    assert_eq!(store.reminder_count(id).unwrap(), 0, "reminders invalidated");

    // Fresh plan, fresh reminders: 85% of the new 20 GB limit fires 80 again.
    store.set_used_traffic(id, 17 * GB).unwrap();
    {
        let mut engine = ReviewEngine::new(&mut store, &gateway, &sink, config);
        engine.review(NOW).unwrap();
    }
    let usage_reminders = rx
        .try_iter()
        .filter(|e| matches!(e, ReportEvent::UsageThresholdReached { .. }))
        .count();
    assert_eq!(usage_reminders, 2, "one before the rollover, one after");
}
