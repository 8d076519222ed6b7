//! Event log for auditing a run.
//!
//! Every significant thing the orchestrator does in an epoch is recorded as an
//! [`Event`]: price samples, listings, curve pushes, agent submissions and the
//! receipts that came back. Tests use it to check what happened without
//! scraping logs.
//!
//! # Event Types
//!
//! - **Epoch**: start and summary of each pass over the agents
//! - **Market**: price samples, listings, curve updates, retirements
//! - **Agent**: observation failures, submissions, skips and receipts
//!
//! # Example
//!
//! ```rust
//! use options_sim_core::models::{ActionKind, Event};
//!
//! let event = Event::ActionSubmitted {
//!     epoch: 3,
//!     agent: "0x0000000000000000000000000000000000000001".to_string(),
//!     action: ActionKind::Buy,
//!     sequence: 12,
//!     attempts: 1,
//! };
//!
//! assert_eq!(event.epoch(), 3);
//! assert_eq!(event.event_type(), "ActionSubmitted");
//! ```

use crate::models::action::ActionKind;

/// Simulation event capturing a state change.
///
/// All events carry the epoch they happened in, and are logged in the order
/// they occur within it.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    EpochStarted {
        epoch: u64,
        block: u64,
        timestamp: u64,
    },

    /// Maintenance agent pushed a new feed sample (raw units)
    PriceAppended {
        epoch: u64,
        feed: String,
        price: i128,
    },

    /// A new instrument of the strike/maturity grid was listed
    SymbolListed { epoch: u64, symbol: String },

    CurveUpdated { epoch: u64, symbol: String },

    /// Pricing model gave no usable curve; instrument keeps its old one
    PricingSkipped {
        epoch: u64,
        symbol: String,
        reason: String,
    },

    /// Expired instrument with no supply left dropped from the working set
    InstrumentRetired { epoch: u64, symbol: String },

    ActionSubmitted {
        epoch: u64,
        agent: String,
        action: ActionKind,
        sequence: u64,
        attempts: u32,
    },

    /// Agent drew an action but had nothing to commit to it
    ActionSkipped {
        epoch: u64,
        agent: String,
        action: ActionKind,
        reason: String,
    },

    /// Submission or approval failed before a receipt existed
    ActionFailed {
        epoch: u64,
        agent: String,
        action: ActionKind,
        error: String,
    },

    /// Ledger reads for an agent failed; it drew nothing this epoch
    ObservationFailed {
        epoch: u64,
        agent: String,
        error: String,
    },

    ReceiptObserved {
        epoch: u64,
        agent: String,
        action: ActionKind,
        success: bool,
    },

    EpochCompleted {
        epoch: u64,
        attempted: usize,
        succeeded: usize,
        failed: usize,
    },

    /// Epoch abandoned on a non-fatal error; the run goes on
    EpochFailed { epoch: u64, error: String },
}

impl Event {
    pub fn epoch(&self) -> u64 {
        match self {
            Event::EpochStarted { epoch, .. }
            | Event::PriceAppended { epoch, .. }
            | Event::SymbolListed { epoch, .. }
            | Event::CurveUpdated { epoch, .. }
            | Event::PricingSkipped { epoch, .. }
            | Event::InstrumentRetired { epoch, .. }
            | Event::ActionSubmitted { epoch, .. }
            | Event::ActionSkipped { epoch, .. }
            | Event::ActionFailed { epoch, .. }
            | Event::ObservationFailed { epoch, .. }
            | Event::ReceiptObserved { epoch, .. }
            | Event::EpochCompleted { epoch, .. }
            | Event::EpochFailed { epoch, .. } => *epoch,
        }
    }

    pub fn event_type(&self) -> &'static str {
        match self {
            Event::EpochStarted { .. } => "EpochStarted",
            Event::PriceAppended { .. } => "PriceAppended",
            Event::SymbolListed { .. } => "SymbolListed",
            Event::CurveUpdated { .. } => "CurveUpdated",
            Event::PricingSkipped { .. } => "PricingSkipped",
            Event::InstrumentRetired { .. } => "InstrumentRetired",
            Event::ActionSubmitted { .. } => "ActionSubmitted",
            Event::ActionSkipped { .. } => "ActionSkipped",
            Event::ActionFailed { .. } => "ActionFailed",
            Event::ObservationFailed { .. } => "ObservationFailed",
            Event::ReceiptObserved { .. } => "ReceiptObserved",
            Event::EpochCompleted { .. } => "EpochCompleted",
            Event::EpochFailed { .. } => "EpochFailed",
        }
    }

    /// Agent address if the event is about one agent
    pub fn agent(&self) -> Option<&str> {
        match self {
            Event::ActionSubmitted { agent, .. }
            | Event::ActionSkipped { agent, .. }
            | Event::ActionFailed { agent, .. }
            | Event::ObservationFailed { agent, .. }
            | Event::ReceiptObserved { agent, .. } => Some(agent),
            _ => None,
        }
    }

    /// Instrument key if the event is about one instrument
    pub fn symbol(&self) -> Option<&str> {
        match self {
            Event::SymbolListed { symbol, .. }
            | Event::CurveUpdated { symbol, .. }
            | Event::PricingSkipped { symbol, .. }
            | Event::InstrumentRetired { symbol, .. } => Some(symbol),
            _ => None,
        }
    }
}

/// Event log for storing and querying simulation events.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: Vec<Event>,
}

impl EventLog {
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    pub fn log(&mut self, event: Event) {
        self.events.push(event);
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn events_at_epoch(&self, epoch: u64) -> Vec<&Event> {
        self.events.iter().filter(|e| e.epoch() == epoch).collect()
    }

    pub fn events_of_type(&self, event_type: &str) -> Vec<&Event> {
        self.events
            .iter()
            .filter(|e| e.event_type() == event_type)
            .collect()
    }

    pub fn events_for_agent(&self, agent: &str) -> Vec<&Event> {
        self.events
            .iter()
            .filter(|e| e.agent() == Some(agent))
            .collect()
    }

    pub fn events_for_symbol(&self, symbol: &str) -> Vec<&Event> {
        self.events
            .iter()
            .filter(|e| e.symbol() == Some(symbol))
            .collect()
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}
