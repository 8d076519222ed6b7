//! Single-process nonce region
//!
//! Clones share the same flag and map, so threads holding separate handles
//! behave like separate processes sharing one region.

use super::{NonceEntry, NonceError, NonceRegion};
use crate::models::Address;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Debug, Default)]
struct Shared {
    locked: AtomicBool,
    entries: Mutex<BTreeMap<Address, NonceEntry>>,
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryRegion {
    shared: Arc<Shared>,
}

impl InMemoryRegion {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_locked(&self) -> bool {
        self.shared.locked.load(Ordering::Acquire)
    }
}

impl NonceRegion for InMemoryRegion {
    fn try_acquire(&self) -> Result<bool, NonceError> {
        Ok(self
            .shared
            .locked
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok())
    }

    fn release(&self) -> Result<(), NonceError> {
        self.shared.locked.store(false, Ordering::Release);
        Ok(())
    }

    fn read(&self, account: &Address) -> Result<Option<NonceEntry>, NonceError> {
        let entries = self.shared.entries.lock().map_err(|_| NonceError::Poisoned)?;
        Ok(entries.get(account).copied())
    }

    fn write(&self, account: &Address, entry: NonceEntry) -> Result<(), NonceError> {
        let mut entries = self.shared.entries.lock().map_err(|_| NonceError::Poisoned)?;
        entries.insert(account.clone(), entry);
        Ok(())
    }

    fn entries(&self) -> Result<BTreeMap<Address, NonceEntry>, NonceError> {
        let entries = self.shared.entries.lock().map_err(|_| NonceError::Poisoned)?;
        Ok(entries.clone())
    }
}
