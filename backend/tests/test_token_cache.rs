//! Token cache tests against the in-memory ledger
//!
//! Covers the event-following rules: known addresses are updated from
//! transfer events, unseen ones are seeded by exactly one balance query,
//! and an event outage leaves the view untouched.

use std::sync::Arc;

use options_sim_core::cache::UpdateOutcome;
use options_sim_core::ledger::{InMemoryLedger, Ledger, LedgerSetup};
use options_sim_core::nonce::{InMemoryRegion, NonceCoordinator};
use options_sim_core::submit::{SubmitterSettings, TransactionSubmitter};
use options_sim_core::{Address, TokenCache};

fn deploy() -> (Arc<InMemoryLedger>, Address) {
    let ledger = Arc::new(InMemoryLedger::deploy(LedgerSetup::default()));
    let usdc = ledger.deployment().stablecoin.clone();
    (ledger, usdc)
}

fn submitter(ledger: &Arc<InMemoryLedger>) -> TransactionSubmitter {
    TransactionSubmitter::new(
        ledger.clone(),
        NonceCoordinator::new(Arc::new(InMemoryRegion::new())),
        SubmitterSettings::default(),
    )
}

#[test]
fn test_mint_to_known_address() {
    let (ledger, usdc) = deploy();
    let x = Address::from_index(1);
    let mut cache = TokenCache::open(ledger.clone(), usdc.clone(), None).unwrap();
    cache.update(&[x.clone()]).unwrap();
    assert_eq!(cache.get(&x).unwrap().raw(), 0);

    ledger.mint(&usdc, &x, 42_000_000).unwrap();
    cache.update(&[]).unwrap();

    assert_eq!(cache.get(&x).unwrap(), cache.from_tokens(42).unwrap());
    assert_eq!(cache.total_supply().raw(), 42_000_000);
}

#[test]
fn test_unseen_recipient_seeded_by_one_query() {
    let (ledger, usdc) = deploy();
    let x = Address::from_index(1);
    let y = Address::from_index(2);
    ledger.mint(&usdc, &x, 10_000_000).unwrap();

    let mut cache = TokenCache::open(ledger.clone(), usdc.clone(), None).unwrap();
    cache.update(&[x.clone()]).unwrap();

    ledger.transfer(&usdc, &x, &y, 4_000_000).unwrap();
    let before = ledger.balance_queries();
    let outcome = cache.update(&[]).unwrap();
    assert_eq!(ledger.balance_queries() - before, 1);
    assert_eq!(outcome, UpdateOutcome::Applied { events: 1, seeded: 1 });

    assert!(cache.is_cached(&y));
    let queries = ledger.balance_queries();
    assert_eq!(cache.get(&x).unwrap().raw(), 6_000_000);
    assert_eq!(cache.get(&y).unwrap().raw(), 4_000_000);
    // both served from the cache
    assert_eq!(ledger.balance_queries(), queries);
}

#[test]
fn test_several_events_to_unseen_address_query_once() {
    let (ledger, usdc) = deploy();
    let y = Address::from_index(9);
    let mut cache = TokenCache::open(ledger.clone(), usdc.clone(), None).unwrap();

    for _ in 0..5 {
        ledger.mint(&usdc, &y, 1_000_000).unwrap();
    }
    let before = ledger.balance_queries();
    cache.update(&[]).unwrap();
    assert_eq!(ledger.balance_queries() - before, 1);
    // seeded by query after the batch, so events are not double counted
    assert_eq!(cache.get(&y).unwrap().raw(), 5_000_000);
}

#[test]
fn test_outage_then_recovery() {
    let (ledger, usdc) = deploy();
    let x = Address::from_index(1);
    let y = Address::from_index(2);
    ledger.mint(&usdc, &x, 10_000_000).unwrap();

    let mut cache = TokenCache::open(ledger.clone(), usdc.clone(), None).unwrap();
    cache.update(&[x.clone()]).unwrap();

    ledger.set_events_available(false).unwrap();
    ledger.transfer(&usdc, &x, &y, 3_000_000).unwrap();
    assert_eq!(cache.update(&[y.clone()]).unwrap(), UpdateOutcome::Skipped);
    assert_eq!(cache.get(&x).unwrap().raw(), 10_000_000);
    assert!(!cache.is_cached(&y));

    ledger.set_events_available(true).unwrap();
    cache.update(&[]).unwrap();
    assert_eq!(cache.get(&x).unwrap().raw(), 7_000_000);
    assert_eq!(cache.get(&y).unwrap().raw(), 3_000_000);
}

#[test]
fn test_ensure_approved_submits_once() {
    let (ledger, usdc) = deploy();
    let owner = Address::from_index(1);
    let exchange = ledger.deployment().exchange.clone();
    let submitter = submitter(&ledger);
    let mut cache = TokenCache::open(ledger.clone(), usdc, None).unwrap();

    assert!(cache
        .ensure_approved(&owner, &exchange, &submitter, 500_000)
        .unwrap());
    assert!(!cache
        .ensure_approved(&owner, &exchange, &submitter, 500_000)
        .unwrap());
    assert_eq!(ledger.transaction_count(&owner).unwrap(), 1);
}

#[test]
fn test_approvals_persist_across_caches() {
    let dir = tempfile::tempdir().unwrap();
    let (ledger, usdc) = deploy();
    let owner = Address::from_index(1);
    let pool = ledger.deployment().pool.clone();
    let submitter = submitter(&ledger);

    {
        let mut cache = TokenCache::open(ledger.clone(), usdc.clone(), Some(dir.path())).unwrap();
        assert!(cache
            .ensure_approved(&owner, &pool, &submitter, 500_000)
            .unwrap());
    }

    let mut reopened = TokenCache::open(ledger.clone(), usdc, Some(dir.path())).unwrap();
    assert!(!reopened
        .ensure_approved(&owner, &pool, &submitter, 500_000)
        .unwrap());
    assert_eq!(ledger.transaction_count(&owner).unwrap(), 1);
}
