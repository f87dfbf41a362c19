use anchor_proofs_types::{
    BatchStatus, BatchType, IntentStatus, TargetChain, VerificationResult,
};
use prometheus::{Encoder, TextEncoder};

use crate::metrics::*;

/// Records engine events into the process-wide prometheus registry
#[derive(Debug, Clone, Default)]
pub struct MetricsCollector;

impl MetricsCollector {
    pub fn new() -> Self {
        Self
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // BATCH METRICS
    // ═══════════════════════════════════════════════════════════════════════════

    pub fn record_batch_opened(&self, batch_type: BatchType) {
        BATCHES_OPENED.with_label_values(&[batch_type.as_str()]).inc();
    }

    pub fn record_batch_status(&self, status: BatchStatus) {
        BATCH_STATUS_COUNT.with_label_values(&[status.as_str()]).inc();
    }

    pub fn record_transaction_appended(&self) {
        TRANSACTIONS_APPENDED.inc();
    }

    pub fn record_batch_size(&self, size: usize) {
        BATCH_SIZE.observe(size as f64);
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // ANCHOR METRICS
    // ═══════════════════════════════════════════════════════════════════════════

    pub fn record_anchor_submitted(&self, chain: &TargetChain, success: bool) {
        let outcome = if success { "success" } else { "failure" };
        ANCHORS_SUBMITTED
            .with_label_values(&[chain.as_str(), outcome])
            .inc();
        if success {
            ANCHORS_PENDING.inc();
        }
    }

    pub fn record_anchor_finalized(&self, chain: &TargetChain) {
        ANCHORS_FINALIZED.with_label_values(&[chain.as_str()]).inc();
        ANCHORS_PENDING.dec();
    }

    pub fn record_stale_update(&self) {
        STALE_UPDATES_DISCARDED.inc();
    }

    pub fn record_reorg(&self, chain: &TargetChain, was_final: bool) {
        REORGS_DETECTED.with_label_values(&[chain.as_str()]).inc();
        if !was_final {
            ANCHORS_PENDING.dec();
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // PROOF METRICS
    // ═══════════════════════════════════════════════════════════════════════════

    pub fn record_proof_assembled(&self) {
        PROOFS_ASSEMBLED.inc();
    }

    pub fn record_verification(&self, result: &VerificationResult) {
        let outcome = if result.valid { "valid" } else { "invalid" };
        PROOFS_VERIFIED.with_label_values(&[outcome]).inc();
        for component in result.failed_components() {
            PROOF_COMPONENT_FAILURES
                .with_label_values(&[&component.to_string()])
                .inc();
        }
    }

    pub fn record_attestation(&self) {
        ATTESTATIONS_RECORDED.inc();
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // INTENT METRICS
    // ═══════════════════════════════════════════════════════════════════════════

    pub fn record_intent_discovered(&self) {
        INTENTS_DISCOVERED.inc();
        ACTIVE_INTENTS.inc();
    }

    /// Only terminal statuses are counted
    pub fn record_intent_status(&self, status: IntentStatus) {
        if status.is_terminal() {
            INTENT_TERMINAL_STATUS
                .with_label_values(&[status.as_str()])
                .inc();
            ACTIVE_INTENTS.dec();
        }
    }

    pub fn record_leg_retry(&self) {
        LEG_RETRIES.inc();
    }

    pub fn record_leg_rolled_back(&self) {
        LEGS_ROLLED_BACK.inc();
    }

    pub fn record_error(&self, component: &str) {
        ERRORS_LOGGED.with_label_values(&[component]).inc();
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // EXPORT
    // ═══════════════════════════════════════════════════════════════════════════

    /// Render every registered metric in the prometheus text format
    pub fn gather_text(&self) -> Result<String, MetricsError> {
        let encoder = TextEncoder::new();
        let metric_families = prometheus::gather();
        let mut buffer = Vec::new();
        encoder
            .encode(&metric_families, &mut buffer)
            .map_err(|e| MetricsError::EncodingError(e.to_string()))?;

        String::from_utf8(buffer).map_err(|e| MetricsError::EncodingError(e.to_string()))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    #[error("encoding error: {0}")]
    EncodingError(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use anchor_proofs_types::{ComponentResult, ProofComponent};

    #[test]
    fn test_batch_metrics_exported() {
        let collector = MetricsCollector::new();
        collector.record_batch_opened(BatchType::OnCadence);
        collector.record_transaction_appended();
        collector.record_batch_size(4);

        let text = collector.gather_text().unwrap();
        assert!(text.contains("anchor_proofs_batches_opened_total"));
        assert!(text.contains("anchor_proofs_transactions_appended_total"));
        assert!(text.contains("anchor_proofs_batch_size"));
    }

    #[test]
    fn test_verification_failures_by_component() {
        let collector = MetricsCollector::new();
        let result = VerificationResult::from_components(vec![
            ComponentResult::pass(ProofComponent::Inclusion, "ok"),
            ComponentResult::fail(ProofComponent::Governance, "outcome mismatch"),
        ]);
        collector.record_verification(&result);

        let before = PROOF_COMPONENT_FAILURES
            .with_label_values(&["governance"])
            .get();
        collector.record_verification(&result);
        assert_eq!(
            PROOF_COMPONENT_FAILURES
                .with_label_values(&["governance"])
                .get(),
            before + 1
        );
    }

    #[test]
    fn test_only_terminal_intent_statuses_counted() {
        let collector = MetricsCollector::new();
        let before = INTENT_TERMINAL_STATUS
            .with_label_values(&["processing"])
            .get();
        collector.record_intent_status(IntentStatus::Processing);
        assert_eq!(
            INTENT_TERMINAL_STATUS
                .with_label_values(&["processing"])
                .get(),
            before
        );
    }
}
