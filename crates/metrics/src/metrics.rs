use lazy_static::lazy_static;
use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge,
    Histogram, IntCounter, IntCounterVec, IntGauge,
};

lazy_static! {
    // ═══════════════════════════════════════════════════════════════════════════
    // BATCH METRICS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Batches opened, by batch type
    pub static ref BATCHES_OPENED: IntCounterVec = register_int_counter_vec!(
        "anchor_proofs_batches_opened_total",
        "Total number of batches opened",
        &["batch_type"]
    )
    .unwrap();

    /// Batch status transitions, by target status
    pub static ref BATCH_STATUS_COUNT: IntCounterVec = register_int_counter_vec!(
        "anchor_proofs_batch_status_total",
        "Total batch transitions by resulting status",
        &["status"]
    )
    .unwrap();

    /// Transactions appended to batches
    pub static ref TRANSACTIONS_APPENDED: IntCounter = register_int_counter!(
        "anchor_proofs_transactions_appended_total",
        "Total number of transactions appended to batches"
    )
    .unwrap();

    /// Leaf count of closed batches
    pub static ref BATCH_SIZE: Histogram = register_histogram!(
        "anchor_proofs_batch_size",
        "Number of transactions in a closed batch",
        vec![1.0, 2.0, 4.0, 8.0, 16.0, 32.0, 64.0, 128.0, 256.0, 512.0, 1024.0]
    )
    .unwrap();

    // ═══════════════════════════════════════════════════════════════════════════
    // ANCHOR METRICS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Anchor submissions, by chain and outcome
    pub static ref ANCHORS_SUBMITTED: IntCounterVec = register_int_counter_vec!(
        "anchor_proofs_anchors_submitted_total",
        "Total anchor submissions by chain and outcome",
        &["chain", "outcome"]
    )
    .unwrap();

    /// Anchors that reached finality
    pub static ref ANCHORS_FINALIZED: IntCounterVec = register_int_counter_vec!(
        "anchor_proofs_anchors_finalized_total",
        "Total anchors that reached required confirmations",
        &["chain"]
    )
    .unwrap();

    /// Confirmation updates discarded as stale or duplicate
    pub static ref STALE_UPDATES_DISCARDED: IntCounter = register_int_counter!(
        "anchor_proofs_stale_updates_discarded_total",
        "Confirmation updates discarded as stale or duplicate"
    )
    .unwrap();

    /// Chain reorganizations that invalidated an anchor
    pub static ref REORGS_DETECTED: IntCounterVec = register_int_counter_vec!(
        "anchor_proofs_reorgs_detected_total",
        "Total reorgs that invalidated an anchor",
        &["chain"]
    )
    .unwrap();

    /// Anchors awaiting finality
    pub static ref ANCHORS_PENDING: IntGauge = register_int_gauge!(
        "anchor_proofs_anchors_pending",
        "Anchors submitted but not yet final"
    )
    .unwrap();

    // ═══════════════════════════════════════════════════════════════════════════
    // PROOF METRICS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Proofs assembled
    pub static ref PROOFS_ASSEMBLED: IntCounter = register_int_counter!(
        "anchor_proofs_proofs_assembled_total",
        "Total number of proofs assembled"
    )
    .unwrap();

    /// Proof verifications, by outcome
    pub static ref PROOFS_VERIFIED: IntCounterVec = register_int_counter_vec!(
        "anchor_proofs_proofs_verified_total",
        "Total proof verifications by outcome",
        &["outcome"]
    )
    .unwrap();

    /// Failed proof components, by component
    pub static ref PROOF_COMPONENT_FAILURES: IntCounterVec = register_int_counter_vec!(
        "anchor_proofs_proof_component_failures_total",
        "Proof components that failed verification",
        &["component"]
    )
    .unwrap();

    /// Validator attestations recorded
    pub static ref ATTESTATIONS_RECORDED: IntCounter = register_int_counter!(
        "anchor_proofs_attestations_total",
        "Total validator attestations recorded"
    )
    .unwrap();

    // ═══════════════════════════════════════════════════════════════════════════
    // INTENT METRICS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Intents discovered
    pub static ref INTENTS_DISCOVERED: IntCounter = register_int_counter!(
        "anchor_proofs_intents_discovered_total",
        "Total number of intents discovered"
    )
    .unwrap();

    /// Intents reaching a terminal status, by status
    pub static ref INTENT_TERMINAL_STATUS: IntCounterVec = register_int_counter_vec!(
        "anchor_proofs_intent_terminal_status_total",
        "Total intents by terminal status",
        &["status"]
    )
    .unwrap();

    /// Intents not yet terminal
    pub static ref ACTIVE_INTENTS: IntGauge = register_int_gauge!(
        "anchor_proofs_intents_active",
        "Current number of non-terminal intents"
    )
    .unwrap();

    /// Leg execution retries
    pub static ref LEG_RETRIES: IntCounter = register_int_counter!(
        "anchor_proofs_leg_retries_total",
        "Total leg execution retries"
    )
    .unwrap();

    /// Legs compensated during atomic rollback
    pub static ref LEGS_ROLLED_BACK: IntCounter = register_int_counter!(
        "anchor_proofs_legs_rolled_back_total",
        "Total legs compensated during rollback"
    )
    .unwrap();

    // ═══════════════════════════════════════════════════════════════════════════
    // LOGGING
    // ═══════════════════════════════════════════════════════════════════════════

    /// Error-level log events, by emitting crate
    pub static ref ERRORS_LOGGED: IntCounterVec = register_int_counter_vec!(
        "anchor_proofs_errors_logged_total",
        "Error-level events by emitting component",
        &["component"]
    )
    .unwrap();
}
