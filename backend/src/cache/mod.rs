//! Local view of one token's balances
//!
//! A [`TokenCache`] starts empty and learns balances in two ways: an explicit
//! balance query, or a transfer event touching an address it already knows.
//! Addresses first seen in an event are queried once, after the batch, so the
//! cache never guesses a balance it has not observed.
//!
//! # Critical Invariants
//!
//! 1. A cached entry is only written by [`TokenCache::update`]
//! 2. Absence means "unknown", never zero
//! 3. [`TokenCache::get`] falls back to a direct query on a miss and does not
//!    cache the answer (it may include effects of unconfirmed transactions)
//! 4. If the event source is down the update is skipped and the previous
//!    view is kept intact

pub mod approvals;

pub use approvals::{ApprovalStore, ApprovalStoreError};

use crate::core::{Amount, AmountError};
use crate::ledger::{Ledger, LedgerError, RemoteCall};
use crate::models::{Address, Identity};
use crate::submit::{SubmitError, TransactionSubmitter};
use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum CacheError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Submit(#[from] SubmitError),

    #[error(transparent)]
    Approvals(#[from] ApprovalStoreError),

    #[error(transparent)]
    Amount(#[from] AmountError),

    #[error("Approval of {spender} by {owner} reverted: {reason}")]
    ApprovalReverted {
        owner: Address,
        spender: Address,
        reason: String,
    },
}

/// What one [`TokenCache::update`] did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    Applied {
        /// Transfer events drained
        events: usize,
        /// Addresses seeded by a balance query
        seeded: usize,
    },
    /// Event source unavailable; nothing changed
    Skipped,
}

/// Eventually-consistent balances of one token
pub struct TokenCache {
    ledger: Arc<dyn Ledger>,
    token: Address,
    symbol: String,
    decimals: u32,
    total_supply: Amount,
    cursor: u64,
    balances: HashMap<Address, Amount>,
    approvals: ApprovalStore,
}

impl TokenCache {
    /// Read token metadata and start following transfers from the current head.
    ///
    /// Events from before opening are not replayed; balances are learned by
    /// query instead. With `approvals_dir` the approval record persists as
    /// `<dir>/<token>-approvals.json`.
    pub fn open(
        ledger: Arc<dyn Ledger>,
        token: Address,
        approvals_dir: Option<&Path>,
    ) -> Result<Self, CacheError> {
        let info = ledger.token_info(&token)?;
        let cursor = ledger.transfer_log_head(&token)?;
        let approvals = match approvals_dir {
            Some(dir) => ApprovalStore::load(dir, &token)?,
            None => ApprovalStore::ephemeral(),
        };
        info!(token = %token, symbol = %info.symbol, decimals = info.decimals, "opened token cache");
        Ok(Self {
            total_supply: Amount::new(info.total_supply, info.decimals),
            ledger,
            token,
            symbol: info.symbol,
            decimals: info.decimals,
            cursor,
            balances: HashMap::new(),
            approvals,
        })
    }

    pub fn address(&self) -> &Address {
        &self.token
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn decimals(&self) -> u32 {
        self.decimals
    }

    pub fn total_supply(&self) -> Amount {
        self.total_supply
    }

    /// Number of addresses with a known balance
    pub fn cached_len(&self) -> usize {
        self.balances.len()
    }

    pub fn is_cached(&self, who: &Address) -> bool {
        self.balances.contains_key(who)
    }

    pub fn from_raw(&self, raw: i128) -> Amount {
        Amount::new(raw, self.decimals)
    }

    pub fn from_tokens(&self, tokens: i128) -> Result<Amount, AmountError> {
        Amount::from_tokens(tokens, self.decimals)
    }

    /// Drain transfer events since the last update, then query balances for
    /// newly seen addresses and for every address in `init`.
    pub fn update(&mut self, init: &[Address]) -> Result<UpdateOutcome, CacheError> {
        let batch = match self.ledger.transfer_events(&self.token, self.cursor) {
            Ok(batch) => batch,
            Err(LedgerError::Unavailable(reason)) => {
                warn!(token = %self.symbol, %reason, "transfer events unavailable, keeping cached balances");
                return Ok(UpdateOutcome::Skipped);
            }
            Err(e) => return Err(e.into()),
        };

        let mut unseen: BTreeSet<Address> = BTreeSet::new();
        for event in &batch.events {
            let value = self.from_raw(event.value);

            if event.from.is_zero() {
                self.total_supply = self.total_supply.checked_add(&value)?;
            } else if let Some(balance) = self.balances.get_mut(&event.from) {
                *balance = balance.checked_sub(&value)?;
            } else {
                unseen.insert(event.from.clone());
            }

            if event.to.is_zero() {
                self.total_supply = self.total_supply.checked_sub(&value)?;
            } else if let Some(balance) = self.balances.get_mut(&event.to) {
                *balance = balance.checked_add(&value)?;
            } else {
                unseen.insert(event.to.clone());
            }
        }
        self.cursor = batch.next_cursor;

        unseen.extend(init.iter().cloned());
        let mut seeded = 0;
        for who in &unseen {
            match self.ledger.balance_of(&self.token, who) {
                Ok(raw) => {
                    self.balances.insert(who.clone(), self.from_raw(raw));
                    seeded += 1;
                }
                // stays unknown; `get` will query again
                Err(e) => warn!(token = %self.symbol, address = %who, error = %e, "balance query failed"),
            }
        }

        debug!(token = %self.symbol, events = batch.events.len(), seeded, "cache updated");
        Ok(UpdateOutcome::Applied {
            events: batch.events.len(),
            seeded,
        })
    }

    /// Cached balance of `who`, or a direct (uncached) query on a miss
    pub fn get(&self, who: &dyn Identity) -> Result<Amount, CacheError> {
        let address = who.address();
        if let Some(balance) = self.balances.get(address) {
            return Ok(*balance);
        }
        let raw = self.ledger.balance_of(&self.token, address)?;
        Ok(self.from_raw(raw))
    }

    /// Make sure `owner` has granted `spender` an unlimited allowance.
    ///
    /// Submits at most one approval per (owner, spender) over the lifetime of
    /// the approval record. Returns `true` if an approval was sent now.
    pub fn ensure_approved(
        &mut self,
        owner: &dyn Identity,
        spender: &Address,
        submitter: &TransactionSubmitter,
        gas_budget: u64,
    ) -> Result<bool, CacheError> {
        let owner = owner.address();
        if self.approvals.contains(owner, spender) {
            return Ok(false);
        }

        let call = RemoteCall::Approve {
            token: self.token.clone(),
            spender: spender.clone(),
            amount: i128::MAX,
        };
        let receipt = submitter.submit_and_wait(owner, &call, gas_budget)?;
        if !receipt.success {
            return Err(CacheError::ApprovalReverted {
                owner: owner.clone(),
                spender: spender.clone(),
                reason: receipt.reason.unwrap_or_default(),
            });
        }

        self.approvals.record(owner, spender)?;
        info!(token = %self.symbol, owner = %owner, spender = %spender, "approved");
        Ok(true)
    }
}

impl std::fmt::Debug for TokenCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCache")
            .field("token", &self.token)
            .field("symbol", &self.symbol)
            .field("decimals", &self.decimals)
            .field("total_supply", &self.total_supply)
            .field("cursor", &self.cursor)
            .field("cached", &self.balances.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{InMemoryLedger, LedgerSetup};

    fn open() -> (TokenCache, Arc<InMemoryLedger>) {
        let ledger = Arc::new(InMemoryLedger::deploy(LedgerSetup::default()));
        let usdc = ledger.deployment().stablecoin.clone();
        let cache = TokenCache::open(ledger.clone(), usdc, None).unwrap();
        (cache, ledger)
    }

    #[test]
    fn test_events_before_open_are_not_replayed() {
        let ledger = Arc::new(InMemoryLedger::deploy(LedgerSetup::default()));
        let usdc = ledger.deployment().stablecoin.clone();
        let alice = Address::from_index(1);
        ledger.mint(&usdc, &alice, 700).unwrap();

        let mut cache = TokenCache::open(ledger.clone(), usdc, None).unwrap();
        assert_eq!(cache.total_supply().raw(), 700);
        assert_eq!(
            cache.update(&[]).unwrap(),
            UpdateOutcome::Applied { events: 0, seeded: 0 }
        );
        assert!(!cache.is_cached(&alice));
    }

    #[test]
    fn test_miss_is_not_cached() {
        let (cache, ledger) = open();
        let usdc = ledger.deployment().stablecoin.clone();
        let bob = Address::from_index(2);
        ledger.mint(&usdc, &bob, 5).unwrap();

        assert_eq!(cache.get(&bob).unwrap().raw(), 5);
        assert!(!cache.is_cached(&bob));
    }

    #[test]
    fn test_outage_keeps_previous_view() {
        let (mut cache, ledger) = open();
        let usdc = ledger.deployment().stablecoin.clone();
        let alice = Address::from_index(1);
        ledger.mint(&usdc, &alice, 100).unwrap();
        cache.update(&[]).unwrap();

        ledger.set_events_available(false).unwrap();
        ledger.mint(&usdc, &alice, 50).unwrap();
        assert_eq!(cache.update(&[]).unwrap(), UpdateOutcome::Skipped);
        assert_eq!(cache.get(&alice).unwrap().raw(), 100);

        // events are drained once the source is back
        ledger.set_events_available(true).unwrap();
        cache.update(&[]).unwrap();
        assert_eq!(cache.get(&alice).unwrap().raw(), 150);
        assert_eq!(cache.total_supply().raw(), 150);
    }
}
