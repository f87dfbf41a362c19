use anchor_proofs_types::{IntentLeg, Proof};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use thiserror::Error;

/// On-chain result of executing one leg
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionReceipt {
    pub tx_hash: String,
    pub block: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LegExecutionError {
    /// Worth another attempt after backoff
    #[error("transient execution failure: {0}")]
    Transient(String),

    #[error("execution rejected: {0}")]
    Rejected(String),
}

impl LegExecutionError {
    pub fn is_transient(&self) -> bool {
        matches!(self, LegExecutionError::Transient(_))
    }
}

/// Performs the chain-specific action of a leg once its commitment is anchored
#[async_trait]
pub trait LegExecutor: Send + Sync {
    /// Execute the leg; `proof` covers the leg's anchored commitment
    async fn execute(
        &self,
        leg: &IntentLeg,
        proof: &Proof,
    ) -> Result<ExecutionReceipt, LegExecutionError>;

    /// Undo the effects of a completed leg
    async fn compensate(&self, leg: &IntentLeg) -> Result<(), LegExecutionError>;
}

// ═══════════════════════════════════════════════════════════════════════════
// MOCK EXECUTOR
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, Default)]
struct Plan {
    /// Transient failures still to report
    transient_failures: u32,
    always_fail: bool,
    reject: bool,
    fail_compensation: bool,
    delay: Option<Duration>,
}

#[derive(Default)]
struct MockState {
    plans: HashMap<String, Plan>,
    attempts: HashMap<String, u32>,
    executed: Vec<String>,
    compensated: Vec<String>,
}

/// Scriptable executor keyed by leg key, for tests and local runs
#[derive(Default)]
pub struct MockLegExecutor {
    state: Mutex<MockState>,
}

impl MockLegExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `n` attempts of `key` transiently, then succeed
    pub fn fail_times(self, key: &str, n: u32) -> Self {
        self.plan(key, |p| p.transient_failures = n)
    }

    /// Fail every attempt of `key` transiently
    pub fn always_fail(self, key: &str) -> Self {
        self.plan(key, |p| p.always_fail = true)
    }

    /// Reject `key` outright, with no retry
    pub fn reject(self, key: &str) -> Self {
        self.plan(key, |p| p.reject = true)
    }

    pub fn fail_compensation(self, key: &str) -> Self {
        self.plan(key, |p| p.fail_compensation = true)
    }

    /// Hold every attempt of `key` for `delay` before answering
    pub fn with_delay(self, key: &str, delay: Duration) -> Self {
        self.plan(key, |p| p.delay = Some(delay))
    }

    /// Keys of successfully executed legs, in completion order
    pub fn executed(&self) -> Vec<String> {
        self.state.lock().unwrap().executed.clone()
    }

    pub fn compensated(&self) -> Vec<String> {
        self.state.lock().unwrap().compensated.clone()
    }

    pub fn attempts(&self, key: &str) -> u32 {
        self.state
            .lock()
            .unwrap()
            .attempts
            .get(key)
            .copied()
            .unwrap_or(0)
    }

    fn plan(self, key: &str, edit: impl FnOnce(&mut Plan)) -> Self {
        edit(
            self.state
                .lock()
                .unwrap()
                .plans
                .entry(key.to_string())
                .or_default(),
        );
        self
    }
}

#[async_trait]
impl LegExecutor for MockLegExecutor {
    async fn execute(
        &self,
        leg: &IntentLeg,
        proof: &Proof,
    ) -> Result<ExecutionReceipt, LegExecutionError> {
        let delay = self
            .state
            .lock()
            .unwrap()
            .plans
            .get(&leg.key)
            .and_then(|p| p.delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.lock().unwrap();
        *state.attempts.entry(leg.key.clone()).or_default() += 1;

        let plan = state.plans.entry(leg.key.clone()).or_default();
        if plan.reject {
            return Err(LegExecutionError::Rejected(format!("{} refused", leg.key)));
        }
        if plan.always_fail {
            return Err(LegExecutionError::Transient(format!("{} unavailable", leg.target_chain)));
        }
        if plan.transient_failures > 0 {
            plan.transient_failures -= 1;
            return Err(LegExecutionError::Transient(format!("{} busy", leg.target_chain)));
        }

        state.executed.push(leg.key.clone());
        Ok(ExecutionReceipt {
            tx_hash: format!("0x{}", hex::encode(&proof.tx_hash[..8])),
            block: proof.anchor_reference.block_number,
        })
    }

    async fn compensate(&self, leg: &IntentLeg) -> Result<(), LegExecutionError> {
        let mut state = self.state.lock().unwrap();
        if state.plans.get(&leg.key).is_some_and(|p| p.fail_compensation) {
            return Err(LegExecutionError::Rejected(format!(
                "{} cannot be compensated",
                leg.key
            )));
        }
        state.compensated.push(leg.key.clone());
        Ok(())
    }
}
