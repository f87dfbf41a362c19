use anchor_proofs_store::LedgerStore;
use anchor_proofs_types::{
    current_timestamp, BatchId, BatchType, EntityKind, Hash32, ProofId, ProofRequest, RequestId,
    RequestPriority, RequestStatus, TimelineEvent,
};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::ProofError;

/// Parameters of a proof request submission
#[derive(Debug, Clone, Default)]
pub struct NewProofRequest {
    pub request_type: Option<BatchType>,
    pub priority: RequestPriority,
    pub tx_hash: Option<Hash32>,
    pub account_url: Option<String>,
    pub requester_id: Option<String>,
}

impl NewProofRequest {
    pub fn for_transaction(tx_hash: Hash32) -> Self {
        Self {
            tx_hash: Some(tx_hash),
            ..Self::default()
        }
    }

    pub fn for_account(account_url: impl Into<String>) -> Self {
        Self {
            account_url: Some(account_url.into()),
            ..Self::default()
        }
    }

    pub fn with_priority(mut self, priority: RequestPriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_type(mut self, request_type: BatchType) -> Self {
        self.request_type = Some(request_type);
        self
    }

    pub fn with_requester(mut self, requester_id: impl Into<String>) -> Self {
        self.requester_id = Some(requester_id.into());
        self
    }
}

/// Tracks proof requests `pending → processing → batched → completed | failed`
pub struct ProofRequestService<S: LedgerStore> {
    store: Arc<S>,
}

impl<S: LedgerStore> ProofRequestService<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub async fn submit(&self, new: NewProofRequest) -> Result<ProofRequest, ProofError> {
        if new.tx_hash.is_none() && new.account_url.is_none() {
            return Err(ProofError::EmptyRequest);
        }

        let request = ProofRequest {
            request_id: Uuid::new_v4(),
            request_type: new.request_type.unwrap_or(BatchType::OnDemand),
            priority: new.priority,
            status: RequestStatus::Pending,
            tx_hash: new.tx_hash,
            account_url: new.account_url,
            requester_id: new.requester_id,
            batch_id: None,
            proof_id: None,
            retry_count: 0,
            error_message: None,
            requested_at: current_timestamp(),
            processed_at: None,
            completed_at: None,
        };
        self.store.create_request(&request).await?;
        self.record(&request, None).await?;

        info!(
            request_id = %request.request_id,
            request_type = request.request_type.as_str(),
            priority = ?request.priority,
            "Proof request submitted"
        );
        Ok(request)
    }

    pub async fn get(&self, request_id: RequestId) -> Result<ProofRequest, ProofError> {
        self.store
            .get_request(request_id)
            .await?
            .ok_or(ProofError::RequestNotFound(request_id))
    }

    /// Pending requests, highest priority then oldest first
    pub async fn pending(&self) -> Result<Vec<ProofRequest>, ProofError> {
        Ok(self
            .store
            .list_requests_by_status(RequestStatus::Pending)
            .await?)
    }

    pub async fn start_processing(&self, request_id: RequestId) -> Result<ProofRequest, ProofError> {
        self.advance(request_id, RequestStatus::Processing, |r, now| {
            r.processed_at = Some(now);
        })
        .await
    }

    pub async fn mark_batched(
        &self,
        request_id: RequestId,
        batch_id: BatchId,
    ) -> Result<ProofRequest, ProofError> {
        self.advance(request_id, RequestStatus::Batched, |r, _| {
            r.batch_id = Some(batch_id);
        })
        .await
    }

    pub async fn complete(
        &self,
        request_id: RequestId,
        proof_id: ProofId,
    ) -> Result<ProofRequest, ProofError> {
        self.advance(request_id, RequestStatus::Completed, |r, now| {
            r.proof_id = Some(proof_id);
            r.completed_at = Some(now);
        })
        .await
    }

    pub async fn fail(
        &self,
        request_id: RequestId,
        reason: impl Into<String>,
    ) -> Result<ProofRequest, ProofError> {
        let reason = reason.into();
        self.advance(request_id, RequestStatus::Failed, |r, now| {
            r.error_message = Some(reason);
            r.completed_at = Some(now);
        })
        .await
    }

    /// Count a failed processing attempt; fail the request once `max_retries` is spent
    pub async fn record_attempt_failure(
        &self,
        request_id: RequestId,
        error: impl Into<String>,
        max_retries: u32,
    ) -> Result<ProofRequest, ProofError> {
        let error = error.into();
        let mut request = self.get(request_id).await?;
        if request.status.is_terminal() {
            return Err(ProofError::InvalidRequestTransition {
                request_id,
                from: request.status,
                to: RequestStatus::Failed,
            });
        }
        if request.retry_count >= max_retries {
            warn!(request_id = %request_id, retries = request.retry_count, "Proof request out of retries");
            return self.fail(request_id, error).await;
        }

        request.retry_count += 1;
        request.error_message = Some(error);
        self.store.update_request(&request).await?;
        Ok(request)
    }

    async fn advance(
        &self,
        request_id: RequestId,
        next: RequestStatus,
        apply: impl FnOnce(&mut ProofRequest, u64),
    ) -> Result<ProofRequest, ProofError> {
        let mut request = self.get(request_id).await?;
        let from = request.status;
        if !from.can_transition_to(next) {
            return Err(ProofError::InvalidRequestTransition {
                request_id,
                from,
                to: next,
            });
        }

        request.status = next;
        apply(&mut request, current_timestamp());
        self.store.update_request(&request).await?;
        self.record(&request, Some(from)).await?;
        Ok(request)
    }

    async fn record(
        &self,
        request: &ProofRequest,
        from: Option<RequestStatus>,
    ) -> Result<(), ProofError> {
        let mut event = TimelineEvent::new(
            EntityKind::ProofRequest,
            request.request_id,
            from.map(|s| s.as_str()),
            request.status.as_str(),
            current_timestamp(),
        );
        if let Some(error) = &request.error_message {
            event = event.with_details(error.clone());
        }
        self.store.record_event(&event).await?;
        Ok(())
    }
}
