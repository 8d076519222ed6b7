//! Concurrent sequence allocation tests
//!
//! Several threads stand in for separate processes: each gets its own
//! region handle and submits for the same account. No sequence number may
//! be handed out twice and each thread must see its own numbers increase.

use std::collections::HashSet;
use std::sync::Arc;
use std::thread;

use options_sim_core::ledger::{InMemoryLedger, Ledger, LedgerSetup, RemoteCall};
use options_sim_core::nonce::{FileRegion, InMemoryRegion, NonceCoordinator, NonceRegion};
use options_sim_core::submit::{RetryPolicy, SubmitterSettings, TransactionSubmitter};
use options_sim_core::Address;

const THREADS: usize = 4;
const PER_THREAD: usize = 25;

fn run_submitters<F>(make_region: F) -> (Vec<Vec<u64>>, Arc<InMemoryLedger>)
where
    F: Fn() -> Arc<dyn NonceRegion>,
{
    let ledger = Arc::new(InMemoryLedger::deploy(LedgerSetup::default()));
    let account = Address::from_index(1);

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let submitter = TransactionSubmitter::new(
                ledger.clone(),
                NonceCoordinator::new(make_region()),
                SubmitterSettings {
                    retry: RetryPolicy::immediate(1),
                    ..SubmitterSettings::default()
                },
            );
            let account = account.clone();
            thread::spawn(move || {
                (0..PER_THREAD)
                    .map(|_| {
                        // reverts on the ledger but still consumes the sequence
                        submitter
                            .submit(&account, &RemoteCall::Withdraw { amount: 1 }, 100_000)
                            .unwrap()
                            .sequence
                    })
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    let sequences = handles.into_iter().map(|h| h.join().unwrap()).collect();
    (sequences, ledger)
}

fn assert_unique_and_increasing(per_thread: &[Vec<u64>]) {
    let mut seen = HashSet::new();
    for sequences in per_thread {
        assert!(sequences.windows(2).all(|w| w[0] < w[1]), "{:?}", sequences);
        for s in sequences {
            assert!(seen.insert(*s), "sequence {} handed out twice", s);
        }
    }
    assert_eq!(seen.len(), THREADS * PER_THREAD);
}

#[test]
fn test_shared_memory_region() {
    let region: Arc<dyn NonceRegion> = Arc::new(InMemoryRegion::new());
    let (sequences, ledger) = run_submitters(|| region.clone());

    assert_unique_and_increasing(&sequences);
    let account = Address::from_index(1);
    assert_eq!(
        ledger.transaction_count(&account).unwrap(),
        (THREADS * PER_THREAD) as u64
    );
}

#[test]
fn test_file_region_handles() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nonces.json");
    FileRegion::initialize(&path).unwrap();

    let (sequences, ledger) =
        run_submitters(|| -> Arc<dyn NonceRegion> { Arc::new(FileRegion::open(&path).unwrap()) });

    assert_unique_and_increasing(&sequences);
    let account = Address::from_index(1);
    assert_eq!(
        ledger.transaction_count(&account).unwrap(),
        (THREADS * PER_THREAD) as u64
    );

    let entries = FileRegion::open(&path).unwrap().entries().unwrap();
    assert_eq!(
        entries[&account].next_sequence,
        (THREADS * PER_THREAD) as u64
    );
}

#[test]
fn test_region_picks_up_external_transactions() {
    let ledger = InMemoryLedger::deploy(LedgerSetup::default());
    let coordinator = NonceCoordinator::new(Arc::new(InMemoryRegion::new()));
    let alice = Address::from_index(1);
    let usdc = ledger.deployment().stablecoin.clone();

    assert_eq!(coordinator.allocate(&alice, &ledger).unwrap(), 0);

    // another signer used sequences 0..3 directly
    for sequence in 0..3 {
        ledger
            .transact(
                &RemoteCall::Approve {
                    token: usdc.clone(),
                    spender: alice.clone(),
                    amount: 1,
                },
                &options_sim_core::ledger::TxOptions {
                    sequence,
                    from: alice.clone(),
                    gas_budget: 100_000,
                    gas_price: 1,
                },
            )
            .unwrap();
    }

    // a new block was mined, so the ledger count is the floor
    assert_eq!(coordinator.allocate(&alice, &ledger).unwrap(), 3);
    assert_eq!(coordinator.allocate(&alice, &ledger).unwrap(), 4);
}
