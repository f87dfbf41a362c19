//! Translation of [`AppConfig`] sections into component policies

use anchor_proofs_anchoring::{BatchPolicy, ChainPolicy};
use anchor_proofs_config::{AppConfig, BatchingConfig, ChainConfig, RetryConfig};
use anchor_proofs_orchestrator::OrchestratorConfig;
use anchor_proofs_retry::RetryPolicy;
use anchor_proofs_types::TargetChain;
use std::collections::HashMap;
use std::time::Duration;

pub fn batch_policy(batching: &BatchingConfig) -> BatchPolicy {
    BatchPolicy {
        max_transactions: batching.max_transactions,
        max_batch_age_secs: batching.max_batch_age_secs,
        on_demand_max_transactions: batching.on_demand_max_transactions,
    }
}

pub fn chain_policy(chain: &ChainConfig) -> ChainPolicy {
    ChainPolicy {
        required_confirmations: chain.required_confirmations,
        confirmation_timeout: Duration::from_secs(chain.confirmation_timeout_secs),
        submission_retries: chain.submission_retries,
    }
}

/// Chain keys become target chain names verbatim
pub fn chain_policies(chains: &HashMap<String, ChainConfig>) -> HashMap<TargetChain, ChainPolicy> {
    chains
        .iter()
        .map(|(name, chain)| (TargetChain::new(name.as_str()), chain_policy(chain)))
        .collect()
}

pub fn retry_policy(retry: &RetryConfig) -> RetryPolicy {
    RetryPolicy::new(
        retry.max_retries,
        Duration::from_millis(retry.initial_backoff_ms),
        Duration::from_millis(retry.max_backoff_ms),
    )
    .with_multiplier(retry.multiplier)
}

pub fn orchestrator_config(config: &AppConfig) -> OrchestratorConfig {
    OrchestratorConfig::default()
        .with_default_max_retries(config.intents.default_max_retries)
        .with_default_deadline(config.intents.default_deadline_secs)
        .with_leg_retry(retry_policy(&config.retry))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chain_keys_map_to_targets() {
        let mut chains = HashMap::new();
        chains.insert(
            "ethereum".to_string(),
            ChainConfig {
                network_name: "mainnet".to_string(),
                required_confirmations: 12,
                confirmation_timeout_secs: 600,
                ..Default::default()
            },
        );

        let policies = chain_policies(&chains);
        let eth = &policies[&TargetChain::ethereum()];
        assert_eq!(eth.required_confirmations, 12);
        assert_eq!(eth.confirmation_timeout, Duration::from_secs(600));
    }

    #[test]
    fn test_intent_defaults_carry_over() {
        let mut config = AppConfig::default();
        config.intents.default_max_retries = 7;
        config.intents.default_deadline_secs = None;
        config.retry.initial_backoff_ms = 5;

        let orchestrator = orchestrator_config(&config);
        assert_eq!(orchestrator.default_max_retries, 7);
        assert_eq!(orchestrator.default_deadline_secs, None);
        assert_eq!(orchestrator.leg_retry.initial_backoff, Duration::from_millis(5));
    }
}
