//! review-runner: headless lifecycle-review runner.
//!
//! Usage:
//!   review-runner --db warden.db --interval 30
//!   review-runner --db warden.db --once
//!   review-runner --db :memory: --seed-accounts 1000 --seed 42 --once

use anyhow::Result;
use chrono::Utc;
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64;
use std::path::Path;
use std::time::Duration;
use warden_core::{
    account::{AccountStatus, NextPlan},
    config::ReviewConfig,
    engine::{ReviewEngine, RunSummary},
    gateway::{EnforcementGateway, NullGateway, TcpGateway},
    progress::SyncProgress,
    report::LogSink,
    scheduler::Scheduler,
    store::{NewAccount, SqliteStore},
};

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = std::env::args().collect();
    let db = arg_value(&args, "--db").unwrap_or(":memory:");
    let once = args.iter().any(|a| a == "--once");
    let resync = args.iter().any(|a| a == "--resync");
    let gateway_addr = arg_value(&args, "--gateway");
    let config_path = arg_value(&args, "--config");
    let seed_accounts: usize = parse_arg(&args, "--seed-accounts", 0);
    let seed: u64 = parse_arg(&args, "--seed", 42);

    let mut config = match config_path {
        Some(path) => ReviewConfig::from_file(Path::new(path))?,
        None => ReviewConfig::default(),
    };
    if let Some(interval) = arg_value(&args, "--interval") {
        config.run_interval_secs = interval.parse()?;
    }

    println!("review-runner");
    println!("  db:       {db}");
    println!("  interval: {}s", config.run_interval_secs);
    println!("  gateway:  {}", gateway_addr.unwrap_or("(none)"));
    println!();

    let mut store = if db == ":memory:" {
        SqliteStore::in_memory()?
    } else {
        SqliteStore::open(db)?
    };
    store.migrate()?;

    if seed_accounts > 0 {
        seed_population(&store, seed_accounts, seed)?;
    }

    let gateway: Box<dyn EnforcementGateway> = match gateway_addr {
        Some(addr) => Box::new(TcpGateway::new(addr)),
        None => Box::new(NullGateway),
    };
    let reports = LogSink;
    let progress = SyncProgress::new();
    let mut engine = ReviewEngine::new(&mut store, gateway.as_ref(), &reports, config.clone());

    if resync {
        let outcome = engine.resync(&progress)?;
        println!("resync: pushed={} failed={}", outcome.pushed, outcome.failed);
    }

    if once {
        let summary = engine.review(Utc::now().timestamp())?;
        print_summary(&summary);
        return Ok(());
    }

    let scheduler = Scheduler::new(Duration::from_secs(config.run_interval_secs));
    scheduler.run_loop(&progress, || {
        engine.review(Utc::now().timestamp()).map(|_| ())
    })
}

/// Deterministic demo population: a spread of healthy, near-limit,
/// over-limit, expiring, and on-hold accounts.
fn seed_population(store: &SqliteStore, count: usize, seed: u64) -> Result<()> {
    const GB: i64 = 1 << 30;
    let mut rng = Pcg64::seed_from_u64(seed);
    let now = Utc::now().timestamp();

    for i in 0..count {
        let on_hold = rng.gen_bool(0.1);
        let limit = rng.gen_range(1..=100) * GB;
        let used = (limit as f64 * rng.gen_range(0.0..1.2)) as i64;
        let expire = now + rng.gen_range(-3..30) * 86_400;
        let next_plan = if rng.gen_bool(0.2) {
            Some(NextPlan {
                data_limit: Some(limit),
                expire_duration: Some(30 * 86_400),
                add_remaining_traffic: rng.gen_bool(0.5),
                fire_on_either: rng.gen_bool(0.5),
            })
        } else {
            None
        };

        let mut account = NewAccount::new(format!("acct-{i:05}"), now - 86_400);
        if on_hold {
            account.status = AccountStatus::OnHold;
            account.on_hold_timeout = Some(now + rng.gen_range(-1..7) * 86_400);
            account.on_hold_expire_duration = Some(30 * 86_400);
        } else {
            account.used_traffic = used;
            account.data_limit = Some(limit);
            account.expire = Some(expire);
            account.next_plan = next_plan;
        }
        store.insert_account(&account)?;
    }
    log::info!("seeded {count} demo accounts (seed={seed})");
    Ok(())
}

fn print_summary(summary: &RunSummary) {
    println!("=== REVIEW SUMMARY ===");
    println!("  active checked:    {}", summary.checked_active);
    println!("  rollovers applied: {}", summary.applied_next);
    println!("  limited:           {}", summary.limited);
    println!("  expired:           {}", summary.expired);
    println!("  on_hold activated: {}", summary.on_hold_activated);
    println!("  commits (active):  {}", summary.active_commits);
    println!("  commits (on_hold): {}", summary.on_hold_commits);
}

fn arg_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.windows(2)
        .find(|w| w[0] == flag)
        .map(|w| w[1].as_str())
}

fn parse_arg<T: std::str::FromStr + Copy>(args: &[String], flag: &str, default: T) -> T {
    args.windows(2)
        .find(|w| w[0] == flag)
        .and_then(|w| w[1].parse().ok())
        .unwrap_or(default)
}
