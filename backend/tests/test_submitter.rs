//! Transaction submitter retry tests
//!
//! Faults are injected into the in-memory ledger; each one fails the next
//! `transact` call (or the next call of one named read) without consuming a
//! sequence number.

use std::sync::Arc;

use options_sim_core::ledger::{InMemoryLedger, Ledger, LedgerError, LedgerSetup, RemoteCall};
use options_sim_core::nonce::{InMemoryRegion, NonceCoordinator};
use options_sim_core::submit::{RetryPolicy, SubmitError, SubmitterSettings, TransactionSubmitter};
use options_sim_core::Address;

struct Fixture {
    ledger: Arc<InMemoryLedger>,
    region: Arc<InMemoryRegion>,
    submitter: TransactionSubmitter,
}

fn fixture(retry: RetryPolicy) -> Fixture {
    let ledger = Arc::new(InMemoryLedger::deploy(LedgerSetup::default()));
    let region = Arc::new(InMemoryRegion::new());
    let submitter = TransactionSubmitter::new(
        ledger.clone(),
        NonceCoordinator::new(region.clone()),
        SubmitterSettings {
            retry,
            ..SubmitterSettings::default()
        },
    );
    Fixture {
        ledger,
        region,
        submitter,
    }
}

fn mint_call(ledger: &InMemoryLedger, to: &Address) -> RemoteCall {
    RemoteCall::Mint {
        token: ledger.deployment().stablecoin.clone(),
        to: to.clone(),
        amount: 1_000_000,
    }
}

#[test]
fn test_sequence_conflict_retried_with_higher_sequence() {
    let f = fixture(RetryPolicy::immediate(3));
    let alice = Address::from_index(1);
    f.ledger
        .inject_fault(LedgerError::SequenceTooLow {
            account: alice.clone(),
            given: 0,
            expected: 1,
        })
        .unwrap();

    let submission = f
        .submitter
        .submit(&alice, &mint_call(&f.ledger, &alice), 100_000)
        .unwrap();
    assert_eq!(submission.attempts, 2);
    assert_eq!(submission.sequence, 1);

    let receipt = f.submitter.wait_receipt(&submission.handle).unwrap();
    assert!(receipt.success);
}

#[test]
fn test_replacement_underpriced_is_a_conflict() {
    let f = fixture(RetryPolicy::immediate(2));
    let alice = Address::from_index(1);
    f.ledger
        .inject_fault(LedgerError::ReplacementUnderpriced {
            account: alice.clone(),
            sequence: 0,
        })
        .unwrap();

    let submission = f
        .submitter
        .submit(&alice, &mint_call(&f.ledger, &alice), 100_000)
        .unwrap();
    assert_eq!(submission.attempts, 2);
    assert!(submission.sequence > 0);
}

#[test]
fn test_retries_exhausted_surfaces_last_error() {
    let f = fixture(RetryPolicy::immediate(2));
    let alice = Address::from_index(1);
    for _ in 0..2 {
        f.ledger
            .inject_fault(LedgerError::Unavailable("timeout".into()))
            .unwrap();
    }

    let err = f
        .submitter
        .submit(&alice, &mint_call(&f.ledger, &alice), 100_000)
        .unwrap_err();
    match err {
        SubmitError::RetriesExhausted { attempts, last } => {
            assert_eq!(attempts, 2);
            assert_eq!(last, LedgerError::Unavailable("timeout".into()));
        }
        other => panic!("unexpected error {:?}", other),
    }
    assert_eq!(f.ledger.transaction_count(&alice).unwrap(), 0);
}

#[test]
fn test_lock_released_after_failures() {
    let f = fixture(RetryPolicy::immediate(1));
    let alice = Address::from_index(1);
    f.ledger
        .inject_fault(LedgerError::Unavailable("reset".into()))
        .unwrap();

    assert!(f
        .submitter
        .submit(&alice, &mint_call(&f.ledger, &alice), 100_000)
        .is_err());
    assert!(!f.region.is_locked());

    // next submission goes through without waiting on a stale lock
    let receipt = f
        .submitter
        .submit_and_wait(&alice, &mint_call(&f.ledger, &alice), 100_000)
        .unwrap();
    assert!(receipt.success);
    assert!(!f.region.is_locked());
}

#[test]
fn test_rejected_gas_budget_not_retried_forever() {
    let f = fixture(RetryPolicy::immediate(3));
    let alice = Address::from_index(1);

    let err = f
        .submitter
        .submit(&alice, &mint_call(&f.ledger, &alice), 0)
        .unwrap_err();
    assert!(matches!(
        err,
        SubmitError::RetriesExhausted {
            attempts: 3,
            last: LedgerError::Rejected(_)
        }
    ));
}

#[test]
fn test_backoff_applies_to_transient_errors() {
    let f = fixture(RetryPolicy {
        max_attempts: Some(2),
        max_elapsed_ms: None,
        initial_backoff_ms: 20,
        max_backoff_ms: 20,
        multiplier: 1.0,
    });
    let alice = Address::from_index(1);
    f.ledger
        .inject_fault(LedgerError::Unavailable("busy".into()))
        .unwrap();

    let started = std::time::Instant::now();
    let submission = f
        .submitter
        .submit(&alice, &mint_call(&f.ledger, &alice), 100_000)
        .unwrap();
    assert_eq!(submission.attempts, 2);
    assert!(started.elapsed() >= std::time::Duration::from_millis(20));
}

#[test]
fn test_ledger_read_failure_during_allocation_is_retried() {
    let f = fixture(RetryPolicy::immediate(5));
    let alice = Address::from_index(1);
    f.ledger
        .inject_read_fault("block_number", LedgerError::Unavailable("timeout".into()))
        .unwrap();

    let submission = f
        .submitter
        .submit(&alice, &mint_call(&f.ledger, &alice), 100_000)
        .unwrap();
    assert_eq!(submission.attempts, 2);
    assert_eq!(submission.sequence, 0);
    assert!(!f.region.is_locked());
}

#[test]
fn test_ledger_read_failures_exhaust_retries() {
    let f = fixture(RetryPolicy::immediate(2));
    let alice = Address::from_index(1);
    for _ in 0..2 {
        f.ledger
            .inject_read_fault("transaction_count", LedgerError::Unavailable("timeout".into()))
            .unwrap();
    }

    let err = f
        .submitter
        .submit(&alice, &mint_call(&f.ledger, &alice), 100_000)
        .unwrap_err();
    assert!(matches!(
        err,
        SubmitError::RetriesExhausted {
            attempts: 2,
            last: LedgerError::Unavailable(_)
        }
    ));
}
