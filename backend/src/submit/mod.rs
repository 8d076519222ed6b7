//! Transaction submission
//!
//! Every state-mutating call goes through [`TransactionSubmitter::submit`]:
//! a sequence number is allocated under the nonce region lock, the call is
//! sent while the lock is still held, and the lock is released before any
//! retry decision is taken.
//!
//! # Retry rules
//!
//! - Sequence conflicts (`SequenceTooLow`, `ReplacementUnderpriced`) retry at
//!   once; the next allocation is always a higher number
//! - Every other error is treated as transient and retried after the
//!   policy's backoff
//! - When the [`RetryPolicy`] is exhausted the last error is surfaced as
//!   [`SubmitError::RetriesExhausted`]; callers skip the agent for this epoch

mod retry;

pub use retry::{FailureClass, RetryPolicy};

use crate::ledger::{Ledger, LedgerError, Receipt, RemoteCall, TxHandle, TxOptions};
use crate::models::Identity;
use crate::nonce::{NonceCoordinator, NonceError};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum SubmitError {
    #[error(transparent)]
    Nonce(#[from] NonceError),

    #[error("Gave up after {attempts} attempt(s): {last}")]
    RetriesExhausted { attempts: u32, last: LedgerError },

    #[error("No receipt for {handle} after {waited:?}")]
    ReceiptTimeout { handle: TxHandle, waited: Duration },

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

impl FailureClass {
    pub fn of(error: &LedgerError) -> Self {
        if error.is_sequence_conflict() {
            FailureClass::SequenceConflict
        } else {
            FailureClass::Transient
        }
    }
}

/// A call the ledger accepted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Submission {
    pub handle: TxHandle,
    pub sequence: u64,
    /// Attempts it took, including the successful one
    pub attempts: u32,
}

/// Gas and receipt settings for the submitter
#[derive(Debug, Clone, PartialEq)]
pub struct SubmitterSettings {
    pub gas_price: u64,
    pub retry: RetryPolicy,
    pub receipt_poll: Duration,
    pub receipt_timeout: Duration,
}

impl Default for SubmitterSettings {
    fn default() -> Self {
        Self {
            gas_price: 225_000_000_000,
            retry: RetryPolicy::default(),
            receipt_poll: Duration::from_millis(50),
            receipt_timeout: Duration::from_secs(120),
        }
    }
}

/// Signs and sends calls with coordinated sequence numbers
#[derive(Clone)]
pub struct TransactionSubmitter {
    ledger: Arc<dyn Ledger>,
    nonces: NonceCoordinator,
    settings: SubmitterSettings,
}

impl TransactionSubmitter {
    pub fn new(ledger: Arc<dyn Ledger>, nonces: NonceCoordinator, settings: SubmitterSettings) -> Self {
        Self {
            ledger,
            nonces,
            settings,
        }
    }

    pub fn ledger(&self) -> &dyn Ledger {
        self.ledger.as_ref()
    }

    pub fn nonces(&self) -> &NonceCoordinator {
        &self.nonces
    }

    /// Send `call` from `from`, retrying per the policy
    pub fn submit(
        &self,
        from: &dyn Identity,
        call: &RemoteCall,
        gas_budget: u64,
    ) -> Result<Submission, SubmitError> {
        let account = from.address();
        let started = Instant::now();
        let mut attempts = 0u32;

        loop {
            attempts += 1;
            let attempt = self
                .nonces
                .with_sequence(account, self.ledger.as_ref(), |sequence| {
                    let opts = TxOptions {
                        sequence,
                        from: account.clone(),
                        gas_budget,
                        gas_price: self.settings.gas_price,
                    };
                    (sequence, self.ledger.transact(call, &opts))
                });

            let (sequence, error) = match attempt {
                Ok((sequence, Ok(handle))) => {
                    debug!(
                        account = %account,
                        call = call.name(),
                        sequence,
                        attempt = attempts,
                        "submitted"
                    );
                    return Ok(Submission {
                        handle,
                        sequence,
                        attempts,
                    });
                }
                Ok((sequence, Err(error))) => (Some(sequence), error),
                // ledger read failed while allocating; same policy as a failed send
                Err(NonceError::Ledger(error)) => (None, error),
                Err(e) => return Err(e.into()),
            };

            let class = FailureClass::of(&error);
            warn!(
                account = %account,
                call = call.name(),
                sequence = ?sequence,
                attempt = attempts,
                class = ?class,
                error = %error,
                "submission failed"
            );

            if !self.settings.retry.should_retry(attempts, started.elapsed()) {
                return Err(SubmitError::RetriesExhausted {
                    attempts,
                    last: error,
                });
            }
            let delay = self.settings.retry.backoff(attempts, class);
            if !delay.is_zero() {
                std::thread::sleep(delay);
            }
        }
    }

    /// Block until the ledger has a receipt for `handle`
    pub fn wait_receipt(&self, handle: &TxHandle) -> Result<Receipt, SubmitError> {
        let started = Instant::now();
        loop {
            if let Some(receipt) = self.ledger.receipt(handle)? {
                return Ok(receipt);
            }
            let waited = started.elapsed();
            if waited >= self.settings.receipt_timeout {
                return Err(SubmitError::ReceiptTimeout {
                    handle: *handle,
                    waited,
                });
            }
            std::thread::sleep(self.settings.receipt_poll);
        }
    }

    /// Submit and wait for the receipt (approvals, mints, maintenance)
    pub fn submit_and_wait(
        &self,
        from: &dyn Identity,
        call: &RemoteCall,
        gas_budget: u64,
    ) -> Result<Receipt, SubmitError> {
        let submission = self.submit(from, call, gas_budget)?;
        self.wait_receipt(&submission.handle)
    }
}
