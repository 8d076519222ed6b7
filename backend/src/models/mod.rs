//! Domain models for the options market simulator

pub mod action;
pub mod agent;
pub mod event;
pub mod identity;
pub mod instrument;

// Re-exports
pub use action::{Action, ActionKind};
pub use agent::{Agent, AgentStats};
pub use event::{Event, EventLog};
pub use identity::{Address, Identity};
pub use instrument::{InstrumentState, OptionType, Symbol, SymbolError};
