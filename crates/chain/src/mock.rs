use anchor_proofs_types::hash::sha256_concat;
use anchor_proofs_types::{Hash32, TargetChain};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};

use crate::observer::{
    ChainError, ChainObserver, ConfirmationStatus, ConfirmationUpdate, ObserverMessage,
    ReorgNotice,
};

#[derive(Default)]
struct MockState {
    height: u64,
    submissions: Vec<(TargetChain, Hash32, String)>,
    confirmations: HashMap<(TargetChain, String), ConfirmationStatus>,
    failures_remaining: u32,
    /// Depth given to every fresh submission
    auto_confirmations: Option<u64>,
}

/// Mock chain observer for testing
///
/// Submissions are recorded and get deterministic hashes. Confirmation
/// depth is set by the test, and optionally pushed into a tracker channel.
#[derive(Clone)]
pub struct MockChainObserver {
    state: Arc<RwLock<MockState>>,
    connected: Arc<RwLock<bool>>,
    sink: Option<mpsc::Sender<ObserverMessage>>,
}

impl Default for MockChainObserver {
    fn default() -> Self {
        Self::new()
    }
}

impl MockChainObserver {
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(MockState {
                height: 1_000,
                ..MockState::default()
            })),
            connected: Arc::new(RwLock::new(true)),
            sink: None,
        }
    }

    /// Forward every injected change to a tracker input channel
    pub fn with_sink(mut self, sink: mpsc::Sender<ObserverMessage>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Report `confirmations` for every anchor as soon as it is submitted
    pub async fn auto_confirm(&self, confirmations: u64) {
        self.state.write().await.auto_confirmations = Some(confirmations);
    }

    pub async fn set_connected(&self, connected: bool) {
        *self.connected.write().await = connected;
    }

    /// Make the next `n` submissions fail with a transient error
    pub async fn fail_next_submissions(&self, n: u32) {
        self.state.write().await.failures_remaining = n;
    }

    pub async fn submissions(&self) -> Vec<(TargetChain, Hash32, String)> {
        self.state.read().await.submissions.clone()
    }

    /// Record a new depth for `tx_hash` and push it to the sink, if any
    pub async fn set_confirmations(&self, chain: &TargetChain, tx_hash: &str, confirmations: u64) {
        let status = {
            let mut state = self.state.write().await;
            let block_height = state.height;
            let status = ConfirmationStatus {
                block_height,
                confirmations,
            };
            state
                .confirmations
                .insert((chain.clone(), tx_hash.to_string()), status);
            status
        };

        self.push(ObserverMessage::Confirmation(ConfirmationUpdate {
            chain: chain.clone(),
            anchor_tx_hash: tx_hash.to_string(),
            block_height: status.block_height,
            confirmations,
        }))
        .await;
    }

    /// Drop `tx_hash` from the canonical chain and announce the reorg
    pub async fn reorg(&self, chain: &TargetChain, tx_hash: &str) {
        let height = {
            let mut state = self.state.write().await;
            state
                .confirmations
                .remove(&(chain.clone(), tx_hash.to_string()));
            state.height
        };

        self.push(ObserverMessage::Reorg(ReorgNotice {
            chain: chain.clone(),
            anchor_tx_hash: tx_hash.to_string(),
            detected_at_height: height,
        }))
        .await;
    }

    async fn push(&self, message: ObserverMessage) {
        if let Some(sink) = &self.sink {
            if sink.send(message).await.is_err() {
                tracing::warn!("Mock observer sink closed");
            }
        }
    }
}

#[async_trait]
impl ChainObserver for MockChainObserver {
    async fn is_connected(&self) -> bool {
        *self.connected.read().await
    }

    async fn get_confirmations(
        &self,
        chain: &TargetChain,
        tx_hash: &str,
    ) -> Result<ConfirmationStatus, ChainError> {
        if !self.is_connected().await {
            return Err(ChainError::ConnectionFailed(chain.to_string()));
        }
        self.state
            .read()
            .await
            .confirmations
            .get(&(chain.clone(), tx_hash.to_string()))
            .copied()
            .ok_or_else(|| ChainError::TransactionNotFound {
                chain: chain.clone(),
                tx_hash: tx_hash.to_string(),
            })
    }

    async fn submit_anchor(
        &self,
        chain: &TargetChain,
        merkle_root: &Hash32,
    ) -> Result<String, ChainError> {
        if !self.is_connected().await {
            return Err(ChainError::ConnectionFailed(chain.to_string()));
        }

        let (tx_hash, auto) = {
            let mut state = self.state.write().await;
            if state.failures_remaining > 0 {
                state.failures_remaining -= 1;
                return Err(ChainError::SubmissionFailed {
                    chain: chain.clone(),
                    reason: "injected failure".to_string(),
                });
            }

            state.height += 1;
            let nonce = (state.submissions.len() as u64).to_be_bytes();
            let digest = sha256_concat(&[chain.as_str().as_bytes(), merkle_root, &nonce]);
            let tx_hash = format!("0x{}", hex::encode(digest));
            state
                .submissions
                .push((chain.clone(), *merkle_root, tx_hash.clone()));
            (tx_hash, state.auto_confirmations)
        };

        if let Some(confirmations) = auto {
            self.set_confirmations(chain, &tx_hash, confirmations).await;
        }
        Ok(tx_hash)
    }

    async fn latest_height(&self, _chain: &TargetChain) -> Result<u64, ChainError> {
        Ok(self.state.read().await.height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_submission_hashes_are_distinct() {
        let mock = MockChainObserver::new();
        let chain = TargetChain::ethereum();
        let a = mock.submit_anchor(&chain, &[1; 32]).await.unwrap();
        let b = mock.submit_anchor(&chain, &[1; 32]).await.unwrap();
        assert_ne!(a, b);
        assert_eq!(mock.submissions().await.len(), 2);
    }

    #[tokio::test]
    async fn test_injected_failures_are_transient() {
        let mock = MockChainObserver::new();
        mock.fail_next_submissions(1).await;
        let chain = TargetChain::bitcoin();
        let err = mock.submit_anchor(&chain, &[0; 32]).await.unwrap_err();
        assert!(err.is_transient());
        assert!(mock.submit_anchor(&chain, &[0; 32]).await.is_ok());
    }

    #[tokio::test]
    async fn test_sink_receives_updates() {
        let (tx, mut rx) = mpsc::channel(4);
        let mock = MockChainObserver::new().with_sink(tx);
        let chain = TargetChain::ethereum();

        mock.set_confirmations(&chain, "0xabc", 3).await;
        mock.reorg(&chain, "0xabc").await;

        match rx.recv().await.unwrap() {
            ObserverMessage::Confirmation(u) => assert_eq!(u.confirmations, 3),
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(rx.recv().await.unwrap(), ObserverMessage::Reorg(_)));
        assert!(mock.get_confirmations(&chain, "0xabc").await.is_err());
    }
}
