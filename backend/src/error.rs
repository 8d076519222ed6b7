//! Top-level error type
//!
//! Component errors convert into [`SimulationError`] with `?`. Only
//! [`SimulationError::is_fatal`] errors stop a run; everything else is
//! confined to the agent or instrument it happened to.

use crate::cache::CacheError;
use crate::config::ConfigError;
use crate::core::AmountError;
use crate::ledger::LedgerError;
use crate::nonce::NonceError;
use crate::pricing::PricingError;
use crate::submit::SubmitError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SimulationError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Amount(#[from] AmountError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Nonce(#[from] NonceError),

    #[error(transparent)]
    Submit(#[from] SubmitError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Pricing(#[from] PricingError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization failed: {0}")]
    Serialization(String),

    #[error("Reverted: {0}")]
    Reverted(String),
}

impl SimulationError {
    /// Errors that invalidate the run rather than one agent's turn
    ///
    /// CRITICAL: a scale mismatch means amounts of different tokens were
    /// mixed; continuing would submit wrong magnitudes.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SimulationError::Config(_)
                | SimulationError::Amount(_)
                | SimulationError::Cache(CacheError::Amount(_))
                | SimulationError::Nonce(NonceError::Corrupt(_))
                | SimulationError::Io(_)
                | SimulationError::Serialization(_)
        )
    }
}
