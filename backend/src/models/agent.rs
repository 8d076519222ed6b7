//! Agent model
//!
//! An agent is one ledger account plus the strategy it trades with.
//!
//! CRITICAL: balances and holdings are never stored on the agent. They are
//! re-derived every epoch from the token caches or direct ledger queries, so a
//! failed or still-pending transaction can never leave a stale number here.

use crate::models::identity::{Address, Identity};
use crate::policy::StrategyProfile;
use serde::{Deserialize, Serialize};

/// Per-agent submission counters, for epoch summaries
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentStats {
    /// Actions handed to the submitter
    pub attempted: u64,
    /// Receipts that reported success
    pub succeeded: u64,
    /// Reverted receipts plus submissions that never made it to the ledger
    pub failed: u64,
}

/// A simulated market participant
///
/// # Example
/// ```
/// use options_sim_core::{Address, Agent};
/// use options_sim_core::policy::StrategyProfile;
///
/// let mut agent = Agent::new(Address::from_index(7), StrategyProfile::default());
/// assert_eq!(agent.last_submitted_sequence(), None);
///
/// agent.record_submission(4);
/// agent.record_submission(5);
/// assert_eq!(agent.last_submitted_sequence(), Some(5));
/// assert_eq!(agent.stats().attempted, 2);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    address: Address,

    /// Action weights, commitment and sentiment
    profile: StrategyProfile,

    /// Highest sequence number this agent got accepted by the ledger
    last_submitted_sequence: Option<u64>,

    stats: AgentStats,
}

impl Agent {
    pub fn new(address: Address, profile: StrategyProfile) -> Self {
        Self {
            address,
            profile,
            last_submitted_sequence: None,
            stats: AgentStats::default(),
        }
    }

    pub fn profile(&self) -> &StrategyProfile {
        &self.profile
    }

    pub fn last_submitted_sequence(&self) -> Option<u64> {
        self.last_submitted_sequence
    }

    /// Record an accepted submission.
    ///
    /// Sequence numbers handed out by the coordinator only grow, so an older
    /// value never replaces a newer one.
    pub fn record_submission(&mut self, sequence: u64) {
        self.stats.attempted += 1;
        self.last_submitted_sequence = Some(
            self.last_submitted_sequence
                .map_or(sequence, |last| last.max(sequence)),
        );
    }

    /// Record a submission that was given up on before reaching the ledger
    pub fn record_rejection(&mut self) {
        self.stats.attempted += 1;
        self.stats.failed += 1;
    }

    /// Record the receipt outcome of an accepted submission
    pub fn record_outcome(&mut self, success: bool) {
        if success {
            self.stats.succeeded += 1;
        } else {
            self.stats.failed += 1;
        }
    }

    pub fn stats(&self) -> AgentStats {
        self.stats
    }
}

impl Identity for Agent {
    fn address(&self) -> &Address {
        &self.address
    }
}
