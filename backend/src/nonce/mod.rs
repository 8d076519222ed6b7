//! Cross-process sequence number allocation
//!
//! Several simulator processes may sign for the same accounts against one
//! ledger. Each account's next sequence number therefore lives in a shared
//! [`NonceRegion`] guarded by a single lock flag, not in process memory.
//!
//! # Critical Invariants
//!
//! 1. Per account, allocated sequence numbers strictly increase and never
//!    repeat: the stored `next_sequence` is always one past the value handed
//!    out
//! 2. A number the ledger already consumed is never handed out: on a new
//!    block the ledger's transaction count acts as a floor
//! 3. The lock is released on every exit path ([`RegionGuard`] drops it, also
//!    while unwinding)
//!
//! Burning a number (allocating one that is never used) is acceptable; reusing
//! one is not.

pub mod file;
pub mod memory;

use crate::ledger::{Ledger, LedgerError};
use crate::models::Address;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, warn};

pub use file::FileRegion;
pub use memory::InMemoryRegion;

/// Spins before the acquire loop starts sleeping between polls
const SPINS_BEFORE_SLEEP: u32 = 1_000;

/// How long a lock wait runs between "possibly stale" warnings
const LOCK_WAIT_WARNING: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum NonceError {
    #[error("Nonce region I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Nonce region is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),

    #[error("Nonce region not initialised at {0}")]
    NotInitialised(PathBuf),

    #[error("Nonce region lock poisoned")]
    Poisoned,

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

/// Shared per-account record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NonceEntry {
    /// Block number observed at the last allocation
    pub last_seen_block: u64,
    /// Next sequence number to hand out
    pub next_sequence: u64,
}

/// Storage for nonce entries shared between submitters.
///
/// `try_acquire`/`release` implement a plain lock flag; `read`/`write`/
/// `entries` must only be called while holding it.
pub trait NonceRegion: Send + Sync {
    /// Set the lock flag if clear; `Ok(false)` when someone else holds it
    fn try_acquire(&self) -> Result<bool, NonceError>;

    fn release(&self) -> Result<(), NonceError>;

    fn read(&self, account: &Address) -> Result<Option<NonceEntry>, NonceError>;

    fn write(&self, account: &Address, entry: NonceEntry) -> Result<(), NonceError>;

    fn entries(&self) -> Result<BTreeMap<Address, NonceEntry>, NonceError>;

    /// Where the lock flag lives, for operator-facing messages
    fn lock_name(&self) -> String {
        "in-memory nonce region".to_string()
    }
}

/// Holds the region lock; releases it when dropped
pub struct RegionGuard<'a> {
    region: &'a dyn NonceRegion,
}

impl<'a> RegionGuard<'a> {
    /// Busy-poll until the lock flag is ours
    ///
    /// There is no timeout: a lock left by a killed process blocks forever,
    /// so a warning naming the lock is logged every ten seconds of waiting.
    pub fn acquire(region: &'a dyn NonceRegion) -> Result<Self, NonceError> {
        let started = Instant::now();
        let mut next_warning = LOCK_WAIT_WARNING;
        let mut spins = 0u32;
        while !region.try_acquire()? {
            spins = spins.saturating_add(1);
            if spins < SPINS_BEFORE_SLEEP {
                std::thread::yield_now();
            } else {
                std::thread::sleep(Duration::from_millis(1));
            }
            let waited = started.elapsed();
            if waited >= next_warning {
                warn!(
                    lock = %region.lock_name(),
                    waited_secs = waited.as_secs(),
                    "still waiting for nonce region lock; if no other simulator is running \
                     it is stale, reset the region with `options-sim init-nonces`"
                );
                next_warning += LOCK_WAIT_WARNING;
            }
        }
        Ok(Self { region })
    }
}

impl Drop for RegionGuard<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.region.release() {
            warn!(error = %e, "failed to release nonce region lock");
        }
    }
}

/// Hands out sequence numbers from a shared region
///
/// # Example
/// ```
/// use options_sim_core::ledger::{InMemoryLedger, LedgerSetup};
/// use options_sim_core::nonce::{InMemoryRegion, NonceCoordinator};
/// use options_sim_core::Address;
/// use std::sync::Arc;
///
/// let ledger = InMemoryLedger::deploy(LedgerSetup::default());
/// let coordinator = NonceCoordinator::new(Arc::new(InMemoryRegion::new()));
/// let alice = Address::from_index(1);
///
/// let first = coordinator.allocate(&alice, &ledger).unwrap();
/// let second = coordinator.allocate(&alice, &ledger).unwrap();
/// assert!(second > first);
/// ```
#[derive(Clone)]
pub struct NonceCoordinator {
    region: Arc<dyn NonceRegion>,
}

impl NonceCoordinator {
    pub fn new(region: Arc<dyn NonceRegion>) -> Self {
        Self { region }
    }

    pub fn region(&self) -> &dyn NonceRegion {
        self.region.as_ref()
    }

    /// Allocate the next sequence number for `account`
    pub fn allocate(&self, account: &Address, ledger: &dyn Ledger) -> Result<u64, NonceError> {
        self.with_sequence(account, ledger, |sequence| sequence)
    }

    /// Allocate a sequence number and run `f` with it while still holding the
    /// region lock.
    ///
    /// The submitter sends the transaction inside `f`, so no other process
    /// can allocate for any account until the ledger has seen it.
    pub fn with_sequence<T>(
        &self,
        account: &Address,
        ledger: &dyn Ledger,
        f: impl FnOnce(u64) -> T,
    ) -> Result<T, NonceError> {
        let _guard = RegionGuard::acquire(self.region.as_ref())?;
        let sequence = self.next_locked(account, ledger)?;
        Ok(f(sequence))
    }

    /// Snapshot of every entry (takes the lock)
    pub fn entries(&self) -> Result<BTreeMap<Address, NonceEntry>, NonceError> {
        let _guard = RegionGuard::acquire(self.region.as_ref())?;
        self.region.entries()
    }

    fn next_locked(&self, account: &Address, ledger: &dyn Ledger) -> Result<u64, NonceError> {
        let block = ledger.block_number()?;

        let sequence = match self.region.read(account)? {
            // first allocation ever: seed from the ledger and use as-is
            None => ledger.transaction_count(account)?,
            // new block: the ledger may have consumed numbers we never saw
            Some(entry) if entry.last_seen_block != block => {
                let floor = ledger.transaction_count(account)?;
                entry.next_sequence.max(floor)
            }
            Some(entry) => entry.next_sequence,
        };

        self.region.write(
            account,
            NonceEntry {
                last_seen_block: block,
                next_sequence: sequence + 1,
            },
        )?;
        debug!(account = %account, sequence, block, "allocated sequence");
        Ok(sequence)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{InMemoryLedger, LedgerSetup, RemoteCall, TxOptions};

    fn coordinator() -> (NonceCoordinator, Arc<InMemoryRegion>) {
        let region = Arc::new(InMemoryRegion::new());
        (NonceCoordinator::new(region.clone()), region)
    }

    #[test]
    fn test_first_allocation_seeds_from_ledger() {
        let ledger = InMemoryLedger::deploy(LedgerSetup::default());
        let alice = Address::from_index(1);
        let opts = |sequence| TxOptions {
            sequence,
            from: alice.clone(),
            gas_budget: 1,
            gas_price: 1,
        };
        let call = RemoteCall::Withdraw { amount: 0 };
        ledger.transact(&call, &opts(0)).unwrap();
        ledger.transact(&call, &opts(1)).unwrap();

        let (coordinator, _) = coordinator();
        assert_eq!(coordinator.allocate(&alice, &ledger).unwrap(), 2);
        assert_eq!(coordinator.allocate(&alice, &ledger).unwrap(), 3);
    }

    #[test]
    fn test_ledger_count_is_a_floor_on_new_block() {
        let ledger = InMemoryLedger::deploy(LedgerSetup::default());
        let alice = Address::from_index(1);
        let (coordinator, _) = coordinator();
        assert_eq!(coordinator.allocate(&alice, &ledger).unwrap(), 0);

        // another signer used numbers 1..=4 behind our back
        for sequence in 1..5 {
            let opts = TxOptions {
                sequence,
                from: alice.clone(),
                gas_budget: 1,
                gas_price: 1,
            };
            ledger
                .transact(&RemoteCall::Withdraw { amount: 0 }, &opts)
                .unwrap();
        }
        assert_eq!(coordinator.allocate(&alice, &ledger).unwrap(), 5);
    }

    #[test]
    fn test_lock_released_when_closure_panics() {
        let ledger = InMemoryLedger::deploy(LedgerSetup::default());
        let alice = Address::from_index(1);
        let (coordinator, region) = coordinator();

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            coordinator
                .with_sequence(&alice, &ledger, |_| panic!("boom"))
                .ok();
        }));
        assert!(result.is_err());
        assert!(!region.is_locked());
        assert_eq!(coordinator.allocate(&alice, &ledger).unwrap(), 1);
    }

    #[test]
    fn test_acquire_waits_for_holder_to_release() {
        let region = Arc::new(InMemoryRegion::new());
        assert!(region.try_acquire().unwrap());

        let holder = {
            let region = region.clone();
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(20));
                region.release().unwrap();
            })
        };
        let started = Instant::now();
        let guard = RegionGuard::acquire(region.as_ref()).unwrap();
        assert!(started.elapsed() >= Duration::from_millis(15));
        assert!(region.is_locked());
        drop(guard);
        assert!(!region.is_locked());
        holder.join().unwrap();
    }

    #[test]
    fn test_entries_release_the_lock() {
        let ledger = InMemoryLedger::deploy(LedgerSetup::default());
        let (coordinator, region) = coordinator();
        coordinator
            .allocate(&Address::from_index(1), &ledger)
            .unwrap();
        assert_eq!(coordinator.entries().unwrap().len(), 1);
        assert!(!region.is_locked());
    }

    #[test]
    fn test_accounts_are_independent() {
        let ledger = InMemoryLedger::deploy(LedgerSetup::default());
        let (coordinator, _) = coordinator();
        let a = Address::from_index(1);
        let b = Address::from_index(2);
        assert_eq!(coordinator.allocate(&a, &ledger).unwrap(), 0);
        assert_eq!(coordinator.allocate(&b, &ledger).unwrap(), 0);
        assert_eq!(coordinator.allocate(&a, &ledger).unwrap(), 1);
        assert_eq!(coordinator.entries().unwrap().len(), 2);
    }
}
