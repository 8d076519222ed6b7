//! Options Simulator Core
//!
//! Agent-based simulation of an on-ledger options market: a population of
//! independent agents writes, trades and settles options against one remote
//! ledger while keeping a local, eventually-consistent view of it.
//!
//! # Architecture
//!
//! - **core**: Fixed-point amounts and the simulated calendar
//! - **models**: Domain types (Agent, Symbol, Action, Event)
//! - **ledger**: Remote ledger interface and an in-memory implementation
//! - **cache**: Token balance caches following transfer events
//! - **nonce**: Cross-process sequence number coordination
//! - **submit**: Transaction submission with retries
//! - **policy**: Action eligibility and weighted strategy draws
//! - **pricing**: Option curve models
//! - **market**: Price feed walk and instrument working sets
//! - **orchestrator**: Main epoch loop
//! - **rng**: Deterministic random number generation
//!
//! # Critical Invariants
//!
//! 1. All money values are [`Amount`] (i128 raw units + decimals); mixing
//!    decimals is an error, never a silent conversion
//! 2. All randomness is deterministic (seeded RNG)
//! 3. Per account, sequence numbers never repeat, across processes

// Module declarations
pub mod cache;
pub mod config;
pub mod core;
pub mod error;
pub mod ledger;
pub mod market;
pub mod models;
pub mod nonce;
pub mod orchestrator;
pub mod policy;
pub mod pricing;
pub mod rng;
pub mod submit;

// Re-exports for convenience
pub use cache::{TokenCache, UpdateOutcome};
pub use config::{ConfigError, SimulationConfig};
pub use core::{Amount, AmountError, SimClock, TimeAdvance};
pub use error::SimulationError;
pub use ledger::{Deployment, InMemoryLedger, Ledger, LedgerError, RemoteCall};
pub use models::{
    Action, ActionKind, Address, Agent, Event, EventLog, Identity, OptionType, Symbol,
};
pub use nonce::{FileRegion, InMemoryRegion, NonceCoordinator, NonceRegion};
pub use orchestrator::{EpochLog, EpochResult, Orchestrator, RunSummary};
pub use policy::{Observation, StrategyEngine, StrategyProfile};
pub use pricing::{PricingModel, SubprocessPricer};
pub use rng::RngManager;
pub use submit::{RetryPolicy, TransactionSubmitter};
