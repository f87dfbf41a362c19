use anchor_proofs_anchoring::{
    AnchorEvent, AnchorSubmitter, AnchoringError, BatchManager, BatchPolicy, ChainPolicy,
    ConfirmationTracker, UpdateOutcome,
};
use anchor_proofs_chain::{ConfirmationUpdate, MockChainObserver, ObserverPool};
use anchor_proofs_merkle::verify_path;
use anchor_proofs_metrics::MetricsCollector;
use anchor_proofs_retry::RetryPolicy;
use anchor_proofs_store::{InMemoryStore, LedgerStore};
use anchor_proofs_types::hash::sha256;
use anchor_proofs_types::{BatchStatus, BatchType, NewTransaction, TargetChain};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

// ═══════════════════════════════════════════════════════════════════════════
// HELPERS
// ═══════════════════════════════════════════════════════════════════════════

struct Harness {
    store: Arc<InMemoryStore>,
    batches: Arc<BatchManager<InMemoryStore>>,
    submitter: AnchorSubmitter<InMemoryStore>,
    tracker: Arc<ConfirmationTracker<InMemoryStore>>,
    observer: MockChainObserver,
    pool: ObserverPool,
}

async fn harness(observer: MockChainObserver, required_confirmations: u64) -> Harness {
    let metrics = Arc::new(MetricsCollector::new());
    let store = Arc::new(InMemoryStore::new());
    let batches = Arc::new(BatchManager::new(
        store.clone(),
        BatchPolicy::default(),
        "validator-1",
        metrics.clone(),
    ));

    let pool = ObserverPool::new();
    pool.register(TargetChain::ethereum(), Arc::new(observer.clone()))
        .await;

    let mut chains = HashMap::new();
    chains.insert(
        TargetChain::ethereum(),
        ChainPolicy {
            required_confirmations,
            confirmation_timeout: Duration::from_secs(5),
            submission_retries: 2,
        },
    );
    let retry = RetryPolicy::new(2, Duration::from_millis(1), Duration::from_millis(2));
    let submitter = AnchorSubmitter::new(batches.clone(), pool.clone(), chains, retry, metrics.clone());
    let tracker = Arc::new(ConfirmationTracker::new(batches.clone(), metrics));

    Harness {
        store,
        batches,
        submitter,
        tracker,
        observer,
        pool,
    }
}

async fn closed_batch(h: &Harness, size: u8) -> anchor_proofs_types::AnchorBatch {
    let batch = h.batches.open_batch(BatchType::OnCadence).await.unwrap();
    for n in 0..size {
        h.batches
            .add_transaction(
                batch.batch_id,
                NewTransaction::new(sha256(&[n]), format!("acc://user-{n}")),
            )
            .await
            .unwrap();
    }
    h.batches.close(batch.batch_id).await.unwrap()
}

fn confirmation(tx_hash: &str, confirmations: u64) -> ConfirmationUpdate {
    ConfirmationUpdate {
        chain: TargetChain::ethereum(),
        anchor_tx_hash: tx_hash.to_string(),
        block_height: 5_000,
        confirmations,
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// CONFIRMATION ORDERING
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_out_of_order_confirmations_finalize_once() {
    let h = harness(MockChainObserver::new(), 6).await;
    let batch = closed_batch(&h, 4).await;
    let anchor = h
        .submitter
        .submit(batch.batch_id, &TargetChain::ethereum())
        .await
        .unwrap();

    let mut events = h.tracker.subscribe();
    let mut outcomes = Vec::new();
    for count in [2, 5, 4, 6] {
        outcomes.push(
            h.tracker
                .apply_update(confirmation(&anchor.anchor_tx_hash, count))
                .await
                .unwrap(),
        );
    }

    assert_eq!(
        outcomes,
        vec![
            UpdateOutcome::Advanced { finalized: false },
            UpdateOutcome::Advanced { finalized: false },
            UpdateOutcome::Stale,
            UpdateOutcome::Advanced { finalized: true },
        ]
    );

    let stored = h.tracker.get_anchor(anchor.anchor_id).await.unwrap();
    assert_eq!(stored.confirmations, 6);
    assert!(stored.is_final);

    let mut finalized = 0;
    while let Ok(event) = events.try_recv() {
        if matches!(event, AnchorEvent::Finalized { .. }) {
            finalized += 1;
        }
    }
    assert_eq!(finalized, 1);

    // redelivery after finality changes nothing
    assert_eq!(
        h.tracker
            .apply_update(confirmation(&anchor.anchor_tx_hash, 6))
            .await
            .unwrap(),
        UpdateOutcome::Stale
    );
    assert_eq!(
        h.batches.get_batch(batch.batch_id).await.unwrap().status,
        BatchStatus::Confirmed
    );
}

fn finalized_events(events: &mut tokio::sync::broadcast::Receiver<AnchorEvent>) -> usize {
    let mut finalized = 0;
    while let Ok(event) = events.try_recv() {
        if matches!(event, AnchorEvent::Finalized { .. }) {
            finalized += 1;
        }
    }
    finalized
}

#[tokio::test]
async fn test_failed_anchor_write_is_recovered_by_redelivery() {
    let h = harness(MockChainObserver::new(), 3).await;
    let batch = closed_batch(&h, 2).await;
    let anchor = h
        .batches
        .mark_submitted(batch.batch_id, TargetChain::ethereum(), "0xf1a1", 3)
        .await
        .unwrap();
    let mut events = h.tracker.subscribe();

    h.store.fail_next("update_anchor", 1);
    assert!(h
        .tracker
        .apply_update(confirmation("0xf1a1", 3))
        .await
        .is_err());
    let stored = h.tracker.get_anchor(anchor.anchor_id).await.unwrap();
    assert!(!stored.is_final);
    assert_eq!(stored.confirmations, 0);
    assert_eq!(finalized_events(&mut events), 0);

    assert_eq!(
        h.tracker
            .apply_update(confirmation("0xf1a1", 3))
            .await
            .unwrap(),
        UpdateOutcome::Advanced { finalized: true }
    );
    assert!(h.tracker.get_anchor(anchor.anchor_id).await.unwrap().is_final);
    assert_eq!(
        h.batches.get_batch(batch.batch_id).await.unwrap().status,
        BatchStatus::Confirmed
    );
    assert_eq!(finalized_events(&mut events), 1);
}

#[tokio::test]
async fn test_failed_batch_advance_leaves_anchor_retryable() {
    let h = harness(MockChainObserver::new(), 3).await;
    let batch = closed_batch(&h, 2).await;
    let anchor = h
        .batches
        .mark_submitted(batch.batch_id, TargetChain::ethereum(), "0xf1a2", 3)
        .await
        .unwrap();

    // anchoring -> anchored is written, its timeline entry is not
    h.store.fail_next("record_event", 1);
    assert!(h
        .tracker
        .apply_update(confirmation("0xf1a2", 4))
        .await
        .is_err());
    assert!(!h.tracker.get_anchor(anchor.anchor_id).await.unwrap().is_final);
    assert_eq!(
        h.batches.get_batch(batch.batch_id).await.unwrap().status,
        BatchStatus::Anchored
    );

    assert_eq!(
        h.tracker
            .apply_update(confirmation("0xf1a2", 4))
            .await
            .unwrap(),
        UpdateOutcome::Advanced { finalized: true }
    );
    assert_eq!(
        h.batches.get_batch(batch.batch_id).await.unwrap().status,
        BatchStatus::Confirmed
    );
}

#[tokio::test]
async fn test_failed_submission_write_leaves_no_orphan_anchor() {
    let h = harness(MockChainObserver::new(), 3).await;
    let batch = closed_batch(&h, 2).await;

    h.store.fail_next("update_batch", 1);
    let err = h
        .batches
        .mark_submitted(batch.batch_id, TargetChain::ethereum(), "0xf1a3", 3)
        .await
        .unwrap_err();
    assert!(matches!(err, AnchoringError::Store(_)));
    assert_eq!(
        h.batches.get_batch(batch.batch_id).await.unwrap().status,
        BatchStatus::Closed
    );
    assert!(h.store.anchors_for_batch(batch.batch_id).await.unwrap().is_empty());

    h.store.fail_next("create_anchor", 1);
    assert!(h
        .batches
        .mark_submitted(batch.batch_id, TargetChain::ethereum(), "0xf1a3", 3)
        .await
        .is_err());
    assert_eq!(
        h.batches.get_batch(batch.batch_id).await.unwrap().status,
        BatchStatus::Closed
    );

    let anchor = h
        .batches
        .mark_submitted(batch.batch_id, TargetChain::ethereum(), "0xf1a3", 3)
        .await
        .unwrap();
    let found = h
        .store
        .find_anchor(&TargetChain::ethereum(), "0xf1a3")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(found.anchor_id, anchor.anchor_id);
    assert_eq!(
        h.batches.get_batch(batch.batch_id).await.unwrap().status,
        BatchStatus::Anchoring
    );
}

#[tokio::test]
async fn test_pushed_confirmations_through_channel() {
    let (tx, rx) = mpsc::channel(16);
    let h = harness(MockChainObserver::new().with_sink(tx), 3).await;
    let handle = h.tracker.clone().spawn(rx);

    let batch = closed_batch(&h, 2).await;
    let anchor = h
        .submitter
        .submit(batch.batch_id, &TargetChain::ethereum())
        .await
        .unwrap();

    let waiter = {
        let tracker = h.tracker.clone();
        tokio::spawn(async move {
            tracker
                .wait_for_finality(anchor.anchor_id, Duration::from_secs(5))
                .await
        })
    };

    for count in [1, 3] {
        h.observer
            .set_confirmations(&TargetChain::ethereum(), &anchor.anchor_tx_hash, count)
            .await;
    }

    let final_anchor = waiter.await.unwrap().unwrap();
    assert!(final_anchor.is_final);
    assert_eq!(final_anchor.confirmations, 3);

    handle.abort();
}

#[tokio::test]
async fn test_poll_once_detects_disappeared_anchor() {
    let h = harness(MockChainObserver::new(), 6).await;
    let batch = closed_batch(&h, 1).await;
    let anchor = h
        .submitter
        .submit(batch.batch_id, &TargetChain::ethereum())
        .await
        .unwrap();

    h.observer
        .set_confirmations(&TargetChain::ethereum(), &anchor.anchor_tx_hash, 2)
        .await;
    assert_eq!(h.tracker.poll_once(&h.pool).await.unwrap(), 1);

    h.observer
        .reorg(&TargetChain::ethereum(), &anchor.anchor_tx_hash)
        .await;
    h.tracker.poll_once(&h.pool).await.unwrap();

    let stored = h.tracker.get_anchor(anchor.anchor_id).await.unwrap();
    assert!(stored.reorged);
    assert_eq!(
        h.batches.get_batch(batch.batch_id).await.unwrap().status,
        BatchStatus::Failed
    );
}

// ═══════════════════════════════════════════════════════════════════════════
// SUBMISSION
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_submission_retries_transient_failures() {
    let h = harness(MockChainObserver::new(), 6).await;
    h.observer.fail_next_submissions(2).await;
    let batch = closed_batch(&h, 3).await;

    let anchor = h
        .submitter
        .submit(batch.batch_id, &TargetChain::ethereum())
        .await
        .unwrap();
    assert_eq!(anchor.merkle_root, batch.merkle_root.unwrap());
    assert_eq!(h.observer.submissions().await.len(), 1);
}

#[tokio::test]
async fn test_exhausted_submission_fails_batch() {
    let h = harness(MockChainObserver::new(), 6).await;
    h.observer.fail_next_submissions(10).await;
    let batch = closed_batch(&h, 3).await;

    let err = h
        .submitter
        .submit(batch.batch_id, &TargetChain::ethereum())
        .await
        .unwrap_err();
    assert!(matches!(err, AnchoringError::SubmissionFailed { attempts: 3, .. }));

    let failed = h.batches.get_batch(batch.batch_id).await.unwrap();
    assert_eq!(failed.status, BatchStatus::Failed);
    assert!(failed.error_message.unwrap().contains("injected failure"));
    assert_eq!(failed.merkle_root, batch.merkle_root);
}

#[tokio::test]
async fn test_unconfigured_chain_rejected() {
    let h = harness(MockChainObserver::new(), 6).await;
    let batch = closed_batch(&h, 1).await;
    let err = h
        .submitter
        .submit(batch.batch_id, &TargetChain::bitcoin())
        .await
        .unwrap_err();
    assert!(matches!(err, AnchoringError::UnconfiguredChain(_)));
    assert_eq!(
        h.batches.get_batch(batch.batch_id).await.unwrap().status,
        BatchStatus::Closed
    );
}

// ═══════════════════════════════════════════════════════════════════════════
// CONCURRENCY
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_appends_and_close_agree() {
    let h = harness(MockChainObserver::new(), 6).await;
    let batch = h.batches.open_batch(BatchType::OnCadence).await.unwrap();
    let batch_id = batch.batch_id;
    h.batches
        .add_transaction(batch_id, NewTransaction::new(sha256(b"seed"), "acc://x"))
        .await
        .unwrap();

    let mut adds = Vec::new();
    for n in 0..40u8 {
        let batches = h.batches.clone();
        adds.push(tokio::spawn(async move {
            batches
                .add_transaction(batch_id, NewTransaction::new(sha256(&[n]), "acc://x"))
                .await
        }));
    }
    let close = {
        let batches = h.batches.clone();
        tokio::spawn(async move { batches.close(batch_id).await })
    };

    let mut accepted = 1;
    for result in futures::future::join_all(adds).await {
        match result.unwrap() {
            Ok(_) => accepted += 1,
            Err(e) => assert!(e.is_invalid_state(), "unexpected error: {e}"),
        }
    }
    let closed = close.await.unwrap().unwrap();

    // every accepted append is in the tree, every rejected one is absent
    let root = closed.merkle_root.unwrap();
    let members = h.batches.transactions(batch_id).await.unwrap();
    assert_eq!(members.len(), accepted);
    assert_eq!(closed.transactions.len(), accepted);
    for (i, member) in members.iter().enumerate() {
        assert_eq!(member.tree_index as usize, i);
        assert!(verify_path(&member.tx_hash, &member.merkle_path, &root));
    }
    assert_eq!(
        h.batches.get_batch(batch_id).await.unwrap().merkle_root,
        Some(root)
    );
}
