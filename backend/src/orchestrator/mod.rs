//! Orchestrator - main simulation loop
//!
//! Steps the agent population through epochs against one ledger.
//!
//! See `engine.rs` for full implementation.

pub mod engine;
pub mod fingerprint;
pub mod planner;
pub mod report;

// Re-export main types for convenience
pub use engine::{
    ActionRecord, ActionStatus, EpochResult, Orchestrator, RunSummary, MAX_CONSECUTIVE_FAILED_EPOCHS,
};
pub use fingerprint::{canonical_json, config_fingerprint, new_run_id};
pub use planner::{plan_action, spender_for, to_remote_call};
pub use report::{EpochLog, EpochRow, MarketSnapshot};
