use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Batch,
    Anchor,
    Proof,
    ProofRequest,
    Intent,
    Leg,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Batch => "batch",
            EntityKind::Anchor => "anchor",
            EntityKind::Proof => "proof",
            EntityKind::ProofRequest => "proof_request",
            EntityKind::Intent => "intent",
            EntityKind::Leg => "leg",
        }
    }
}

/// One recorded status change of an entity, kept for audit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimelineEvent {
    pub event_id: Uuid,
    pub entity_kind: EntityKind,
    pub entity_id: String,
    /// Intent the entity belongs to, when any
    pub intent_id: Option<String>,
    pub from_status: Option<String>,
    pub to_status: String,
    pub timestamp: u64,
    pub details: Option<String>,
    pub tx_hash: Option<String>,
}

impl TimelineEvent {
    pub fn new(
        entity_kind: EntityKind,
        entity_id: impl ToString,
        from_status: Option<&str>,
        to_status: &str,
        timestamp: u64,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            entity_kind,
            entity_id: entity_id.to_string(),
            intent_id: None,
            from_status: from_status.map(str::to_string),
            to_status: to_status.to_string(),
            timestamp,
            details: None,
            tx_hash: None,
        }
    }

    pub fn with_intent(mut self, intent_id: impl Into<String>) -> Self {
        self.intent_id = Some(intent_id.into());
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn with_tx_hash(mut self, tx_hash: impl Into<String>) -> Self {
        self.tx_hash = Some(tx_hash.into());
        self
    }
}
