use anchor_proofs_types::TargetChain;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::observer::{ChainError, ChainObserver};

/// Observers keyed by the chain they serve
#[derive(Clone, Default)]
pub struct ObserverPool {
    observers: Arc<RwLock<HashMap<TargetChain, Arc<dyn ChainObserver>>>>,
}

impl ObserverPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, chain: TargetChain, observer: Arc<dyn ChainObserver>) {
        tracing::info!(chain = %chain, "Registered chain observer");
        self.observers.write().await.insert(chain, observer);
    }

    pub async fn get(&self, chain: &TargetChain) -> Result<Arc<dyn ChainObserver>, ChainError> {
        self.observers
            .read()
            .await
            .get(chain)
            .cloned()
            .ok_or_else(|| ChainError::UnknownChain(chain.clone()))
    }

    pub async fn health_check(&self) -> HashMap<TargetChain, bool> {
        let observers = self.observers.read().await;
        let mut health = HashMap::new();
        for (chain, observer) in observers.iter() {
            health.insert(chain.clone(), observer.is_connected().await);
        }
        health
    }

    pub async fn chains(&self) -> Vec<TargetChain> {
        let mut chains: Vec<_> = self.observers.read().await.keys().cloned().collect();
        chains.sort();
        chains
    }
}
