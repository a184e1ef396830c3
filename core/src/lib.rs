//! Account lifecycle reconciliation engine.
//!
//! Keeps each account's enforcement status (active / limited / expired /
//! on-hold) consistent with its usage and expiry counters, resolves
//! next-plan rollovers, dedups threshold notifications, and pushes status
//! to the enforcement plane best-effort.
//!
//! RULES:
//!   - The local ledger is authoritative; the enforcement plane is
//!     eventually consistent.
//!   - At most one review run executes at any time; processing within a
//!     run is strictly sequential.
//!   - Mutations are staged and committed in bounded batches. A commit
//!     failure aborts the pass; committed batches stay applied.

pub mod account;
pub mod config;
pub mod engine;
pub mod error;
pub mod evaluator;
pub mod gateway;
pub mod ledger;
pub mod progress;
pub mod report;
pub mod scheduler;
pub mod store;
pub mod types;
