//! Behaviour every ledger store backend must share, run against both.

use anchor_proofs_store::{InMemoryStore, LedgerStore, SqliteStore, StoreError};
use anchor_proofs_types::*;
use uuid::Uuid;

async fn seeded_batch<S: LedgerStore>(store: &S, hashes: &[Hash32]) -> AnchorBatch {
    let batch = AnchorBatch::new(BatchType::OnCadence, "validator-1", 100);
    store.create_batch(&batch).await.unwrap();
    let mut latest = batch;
    for (i, h) in hashes.iter().enumerate() {
        let tx = NewTransaction::new(*h, "acc://alice").into_transaction(
            latest.batch_id,
            i as u32,
            101,
        );
        latest = store.append_transaction(&tx).await.unwrap();
    }
    latest
}

async fn batch_append_and_cas<S: LedgerStore>(store: S) {
    let batch = seeded_batch(&store, &[[1; 32], [2; 32]]).await;
    assert_eq!(batch.transactions, vec![[1; 32], [2; 32]]);

    // Duplicate hash in the same batch
    let dup = NewTransaction::new([1; 32], "acc://alice").into_transaction(batch.batch_id, 2, 102);
    assert!(matches!(
        store.append_transaction(&dup).await,
        Err(StoreError::DuplicateId { .. })
    ));

    // Stale tree index
    let stale = NewTransaction::new([3; 32], "acc://alice").into_transaction(batch.batch_id, 1, 102);
    assert!(store.append_transaction(&stale).await.unwrap_err().is_conflict());

    let txs = store.list_transactions(batch.batch_id).await.unwrap();
    let indices: Vec<u32> = txs.iter().map(|t| t.tree_index).collect();
    assert_eq!(indices, vec![0, 1]);

    let mut closed = batch.clone();
    closed.status = BatchStatus::Closed;
    closed.merkle_root = Some([9; 32]);
    store.update_batch(&closed, BatchStatus::Pending).await.unwrap();
    assert!(store
        .update_batch(&closed, BatchStatus::Pending)
        .await
        .unwrap_err()
        .is_conflict());

    let late = NewTransaction::new([4; 32], "acc://alice").into_transaction(batch.batch_id, 2, 103);
    assert!(store.append_transaction(&late).await.unwrap_err().is_conflict());

    let stored = store.get_batch(batch.batch_id).await.unwrap().unwrap();
    assert_eq!(stored.merkle_root, Some([9; 32]));
    assert_eq!(stored.transactions.len(), 2);
    assert_eq!(
        store.list_batches_by_status(BatchStatus::Closed).await.unwrap().len(),
        1
    );
}

async fn anchors_lookup<S: LedgerStore>(store: S) {
    let batch = seeded_batch(&store, &[[1; 32]]).await;
    let mut anchor = AnchorRecord::new(
        batch.batch_id,
        TargetChain::ethereum(),
        "0xfeed",
        [1; 32],
        6,
        "validator-1",
        200,
    );
    store.create_anchor(&anchor).await.unwrap();

    let found = store
        .find_anchor(&TargetChain::ethereum(), "0xfeed")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(found.anchor_id, anchor.anchor_id);
    assert!(store
        .find_anchor(&TargetChain::bitcoin(), "0xfeed")
        .await
        .unwrap()
        .is_none());
    assert_eq!(store.list_unfinalized_anchors().await.unwrap().len(), 1);

    anchor.confirmations = 6;
    anchor.is_final = true;
    store.update_anchor(&anchor).await.unwrap();
    assert!(store.list_unfinalized_anchors().await.unwrap().is_empty());
    assert_eq!(store.anchors_for_batch(batch.batch_id).await.unwrap().len(), 1);

    let mut clash = anchor.clone();
    clash.anchor_id = Uuid::new_v4();
    assert!(matches!(
        store.create_anchor(&clash).await,
        Err(StoreError::DuplicateId { .. })
    ));

    store.delete_anchor(anchor.anchor_id).await.unwrap();
    assert!(store
        .find_anchor(&TargetChain::ethereum(), "0xfeed")
        .await
        .unwrap()
        .is_none());
    assert!(matches!(
        store.delete_anchor(anchor.anchor_id).await,
        Err(StoreError::NotFound { .. })
    ));
    // the transaction hash is free again
    store.create_anchor(&clash).await.unwrap();
}

fn sample_proof(batch_id: BatchId, anchor_id: AnchorId) -> Proof {
    Proof {
        proof_id: Uuid::new_v4(),
        batch_id,
        transaction_id: Uuid::new_v4(),
        tx_hash: [1; 32],
        account_url: "acc://alice".to_string(),
        inclusion: InclusionProof {
            merkle_root: [1; 32],
            leaf_hash: [1; 32],
            leaf_index: 0,
            path: Vec::new(),
        },
        anchor_reference: AnchorReference {
            anchor_id,
            target_chain: TargetChain::ethereum(),
            anchor_tx_hash: "0xfeed".to_string(),
            block_number: Some(10),
            anchored_root: [1; 32],
            confirmations: 6,
            required_confirmations: 6,
        },
        state_proof: None,
        governance_proof: None,
        verified: false,
        verification_time: None,
        verification_details: None,
        stale: false,
        validator_id: "validator-1".to_string(),
        proof_version: PROOF_VERSION.to_string(),
        created_at: 300,
        updated_at: 300,
    }
}

async fn proof_cache_writes_are_field_scoped<S: LedgerStore>(store: S) {
    let batch = seeded_batch(&store, &[[1; 32]]).await;
    let proof = sample_proof(batch.batch_id, Uuid::new_v4());
    store.create_proof(&proof).await.unwrap();

    let passing = VerificationResult::from_components(vec![ComponentResult::pass(
        ProofComponent::Inclusion,
        "ok",
    )]);
    store
        .record_verification(proof.proof_id, true, 310, &passing)
        .await
        .unwrap();
    let stored = store.get_proof(proof.proof_id).await.unwrap().unwrap();
    assert!(stored.verified);
    assert!(!stored.stale);
    assert_eq!(stored.verification_time, Some(310));
    assert_eq!(stored.verification_details.as_ref(), Some(&passing));
    assert_eq!(stored.inclusion, proof.inclusion);

    store.mark_proof_stale(proof.proof_id, 320).await.unwrap();
    let stored = store.get_proof(proof.proof_id).await.unwrap().unwrap();
    assert!(stored.stale);
    assert!(!stored.verified);
    assert_eq!(stored.verification_time, Some(310));

    // a late verification outcome cannot revive a stale proof
    store
        .record_verification(proof.proof_id, true, 330, &passing)
        .await
        .unwrap();
    let stored = store.get_proof(proof.proof_id).await.unwrap().unwrap();
    assert!(stored.stale);
    assert!(!stored.verified);
    assert_eq!(stored.verification_time, Some(330));
    assert_eq!(stored.updated_at, 330);

    assert!(matches!(
        store.mark_proof_stale(Uuid::new_v4(), 340).await,
        Err(StoreError::NotFound { .. })
    ));
}

fn sample_intent(id: &str) -> (Intent, Vec<IntentLeg>) {
    let intent = Intent {
        intent_id: id.to_string(),
        operation_id: id.to_string(),
        user_id: Some("user-1".into()),
        account_url: None,
        execution_mode: ExecutionMode::Parallel,
        proof_class: BatchType::OnDemand,
        status: IntentStatus::Discovered,
        leg_count: 1,
        legs_completed: 0,
        legs_failed: 0,
        legs_pending: 1,
        current_leg_index: 0,
        intent_data: serde_json::Value::Null,
        error_message: None,
        created_at: 1,
        updated_at: 1,
        completed_at: None,
        expires_at: None,
    };
    let leg = IntentLeg {
        leg_id: Uuid::new_v4(),
        intent_id: id.to_string(),
        key: "a".into(),
        leg_index: 0,
        target_chain: TargetChain::ethereum(),
        role: LegRole::Source,
        sequence_order: 0,
        from_address: None,
        to_address: None,
        amount: None,
        token_symbol: None,
        payload: serde_json::Value::Null,
        status: LegStatus::Pending,
        execution_tx_hash: None,
        execution_block: None,
        execution_error: None,
        batch_id: None,
        anchor_id: None,
        proof_id: None,
        retry_count: 0,
        max_retries: 3,
        last_retry_at: None,
        created_at: 1,
        updated_at: 1,
        started_at: None,
        completed_at: None,
    };
    (intent, vec![leg])
}

async fn intent_graph_is_atomic<S: LedgerStore>(store: S) {
    let (intent, legs) = sample_intent("intent-1");
    store.create_intent_graph(&intent, &legs, &[], &[]).await.unwrap();

    // Same leg id under a new intent: nothing of the second graph lands
    let (mut other, _) = sample_intent("intent-2");
    other.leg_count = 1;
    let err = store
        .create_intent_graph(&other, &legs, &[], &[])
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::DuplicateId { .. }));
    assert!(store.get_intent("intent-2").await.unwrap().is_none());

    assert_eq!(store.list_active_intents().await.unwrap().len(), 1);
    assert_eq!(store.list_intents_by_user("user-1").await.unwrap().len(), 1);

    let mut done = intent.clone();
    done.status = IntentStatus::Completed;
    store.update_intent(&done).await.unwrap();
    assert!(store.list_active_intents().await.unwrap().is_empty());

    let event = TimelineEvent::new(EntityKind::Leg, legs[0].leg_id, Some("pending"), "ready", 5)
        .with_intent("intent-1");
    store.record_event(&event).await.unwrap();
    store
        .record_event(&TimelineEvent::new(
            EntityKind::Intent,
            "intent-1",
            Some("discovered"),
            "completed",
            6,
        ).with_intent("intent-1"))
        .await
        .unwrap();

    let timeline = store.intent_timeline("intent-1").await.unwrap();
    assert_eq!(timeline.len(), 2);
    assert_eq!(timeline[0].to_status, "ready");
    assert_eq!(
        store.timeline(&legs[0].leg_id.to_string()).await.unwrap().len(),
        1
    );
}

#[tokio::test]
async fn test_memory_batch_append_and_cas() {
    batch_append_and_cas(InMemoryStore::new()).await;
}

#[tokio::test]
async fn test_sqlite_batch_append_and_cas() {
    batch_append_and_cas(SqliteStore::in_memory().await.unwrap()).await;
}

#[tokio::test]
async fn test_memory_anchor_lookup() {
    anchors_lookup(InMemoryStore::new()).await;
}

#[tokio::test]
async fn test_sqlite_anchor_lookup() {
    anchors_lookup(SqliteStore::in_memory().await.unwrap()).await;
}

#[tokio::test]
async fn test_memory_intent_graph_is_atomic() {
    intent_graph_is_atomic(InMemoryStore::new()).await;
}

#[tokio::test]
async fn test_sqlite_intent_graph_is_atomic() {
    intent_graph_is_atomic(SqliteStore::in_memory().await.unwrap()).await;
}

#[tokio::test]
async fn test_memory_proof_cache_writes_are_field_scoped() {
    proof_cache_writes_are_field_scoped(InMemoryStore::new()).await;
}

#[tokio::test]
async fn test_sqlite_proof_cache_writes_are_field_scoped() {
    proof_cache_writes_are_field_scoped(SqliteStore::in_memory().await.unwrap()).await;
}

#[tokio::test]
async fn test_sqlite_file_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ledger.db");

    let batch_id = {
        let store = SqliteStore::new(&path).await.unwrap();
        seeded_batch(&store, &[[7; 32]]).await.batch_id
    };

    let reopened = SqliteStore::new(&path).await.unwrap();
    let batch = reopened.get_batch(batch_id).await.unwrap().unwrap();
    assert_eq!(batch.transactions, vec![[7; 32]]);
}
