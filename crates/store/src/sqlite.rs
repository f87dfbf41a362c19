use anchor_proofs_types::{
    AnchorBatch, AnchorId, AnchorRecord, BatchId, BatchStatus, BatchTransaction, ChainGroup,
    Hash32, Intent, IntentLeg, LegDependency, LegId, Proof, ProofId, ProofRequest, RequestId,
    RequestStatus, TargetChain, TimelineEvent, ValidatorAttestation, VerificationResult,
};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Executor, Row, SqlitePool};
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::store::{LedgerStore, StoreError};

const MIGRATIONS: [&str; 5] = [
    include_str!("../migrations/001_create_batches.sql"),
    include_str!("../migrations/002_create_anchors.sql"),
    include_str!("../migrations/003_create_proofs.sql"),
    include_str!("../migrations/004_create_intents.sql"),
    include_str!("../migrations/005_create_timeline.sql"),
];

// ═══════════════════════════════════════════════════════════════════════════
// SQLITE STORE IMPLEMENTATION
// ═══════════════════════════════════════════════════════════════════════════

/// SQLite-backed ledger store.
///
/// Each table keeps the columns it is queried by plus the full entity as a
/// JSON `body`.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (or create) a database file
    pub async fn new<P: AsRef<Path>>(db_path: P) -> Result<Self, StoreError> {
        let url = format!("sqlite:{}", db_path.as_ref().display());
        Self::connect(&url, 5).await
    }

    /// Connect to a `sqlite:` URL with a bounded pool
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(|e| StoreError::ConnectionError(e.to_string()))?
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect_with(options)
            .await
            .map_err(|e| StoreError::ConnectionError(e.to_string()))?;

        let store = Self { pool };
        store.run_migrations().await?;
        info!(url = %url, max_connections = max_connections, "Ledger database ready");
        Ok(store)
    }

    /// Create an in-memory SQLite database (for testing)
    pub async fn in_memory() -> Result<Self, StoreError> {
        // One connection, since every in-memory connection is its own database
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(|e| StoreError::ConnectionError(e.to_string()))?;

        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    async fn run_migrations(&self) -> Result<(), StoreError> {
        for migration in MIGRATIONS {
            self.pool.execute(migration).await.map_err(db_error)?;
        }
        Ok(())
    }

    async fn fetch_one<T: DeserializeOwned>(
        &self,
        sql: &str,
        key: String,
    ) -> Result<Option<T>, StoreError> {
        let row = sqlx::query(sql)
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?;
        row.as_ref().map(decode).transpose()
    }

    async fn fetch_all<T: DeserializeOwned>(
        &self,
        sql: &str,
        key: String,
    ) -> Result<Vec<T>, StoreError> {
        let rows = sqlx::query(sql)
            .bind(key)
            .fetch_all(&self.pool)
            .await
            .map_err(db_error)?;
        rows.iter().map(decode).collect()
    }

    /// Overwrite the JSON body of an existing row
    async fn replace_body(
        &self,
        table: &str,
        key_column: &str,
        entity: &'static str,
        id: String,
        body: String,
    ) -> Result<(), StoreError> {
        let sql = format!("UPDATE {table} SET body = ? WHERE {key_column} = ?");
        let result = sqlx::query(&sql)
            .bind(body)
            .bind(&id)
            .execute(&self.pool)
            .await
            .map_err(db_error)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound { entity, id });
        }
        Ok(())
    }
}

#[async_trait]
impl LedgerStore for SqliteStore {
    async fn create_batch(&self, batch: &AnchorBatch) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO batches (batch_id, batch_type, status, tx_count, created_at, updated_at, body)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(batch.batch_id.to_string())
        .bind(batch.batch_type.as_str())
        .bind(batch.status.as_str())
        .bind(batch.transactions.len() as i64)
        .bind(batch.created_at as i64)
        .bind(batch.updated_at as i64)
        .bind(encode(batch)?)
        .execute(&self.pool)
        .await
        .map_err(|e| insert_error(e, "batch", batch.batch_id))?;
        Ok(())
    }

    async fn get_batch(&self, id: BatchId) -> Result<Option<AnchorBatch>, StoreError> {
        self.fetch_one("SELECT body FROM batches WHERE batch_id = ?", id.to_string())
            .await
    }

    async fn update_batch(
        &self,
        batch: &AnchorBatch,
        expected: BatchStatus,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE batches SET status = ?, tx_count = ?, updated_at = ?, body = ?
            WHERE batch_id = ? AND status = ?
            "#,
        )
        .bind(batch.status.as_str())
        .bind(batch.transactions.len() as i64)
        .bind(batch.updated_at as i64)
        .bind(encode(batch)?)
        .bind(batch.batch_id.to_string())
        .bind(expected.as_str())
        .execute(&self.pool)
        .await
        .map_err(db_error)?;

        if result.rows_affected() == 0 {
            let current = self.get_batch(batch.batch_id).await?;
            debug!(
                batch_id = %batch.batch_id,
                expected = %expected,
                found = ?current.as_ref().map(|b| b.status),
                "Batch compare-and-swap rejected"
            );
            return Err(match current {
                None => StoreError::not_found("batch", batch.batch_id),
                Some(stored) => StoreError::Conflict {
                    entity: "batch",
                    id: batch.batch_id.to_string(),
                    expected: expected.to_string(),
                    actual: stored.status.to_string(),
                },
            });
        }
        Ok(())
    }

    async fn list_batches_by_status(
        &self,
        status: BatchStatus,
    ) -> Result<Vec<AnchorBatch>, StoreError> {
        self.fetch_all(
            "SELECT body FROM batches WHERE status = ? ORDER BY created_at ASC",
            status.as_str().to_string(),
        )
        .await
    }

    async fn append_transaction(&self, tx: &BatchTransaction) -> Result<AnchorBatch, StoreError> {
        let mut db = self.pool.begin().await.map_err(db_error)?;

        let row = sqlx::query("SELECT body FROM batches WHERE batch_id = ?")
            .bind(tx.batch_id.to_string())
            .fetch_optional(&mut *db)
            .await
            .map_err(db_error)?;
        let mut batch: AnchorBatch = match row {
            Some(row) => decode(&row)?,
            None => return Err(StoreError::not_found("batch", tx.batch_id)),
        };

        if batch.transactions.contains(&tx.tx_hash) {
            return Err(StoreError::duplicate("transaction", hex::encode(tx.tx_hash)));
        }
        batch.transactions.push(tx.tx_hash);
        batch.updated_at = batch.updated_at.max(tx.created_at);

        // Guarded on status and member count so a concurrent close or append wins cleanly
        let result = sqlx::query(
            r#"
            UPDATE batches SET tx_count = tx_count + 1, updated_at = ?, body = ?
            WHERE batch_id = ? AND status = ? AND tx_count = ?
            "#,
        )
        .bind(batch.updated_at as i64)
        .bind(encode(&batch)?)
        .bind(tx.batch_id.to_string())
        .bind(BatchStatus::Pending.as_str())
        .bind(i64::from(tx.tree_index))
        .execute(&mut *db)
        .await
        .map_err(db_error)?;

        if result.rows_affected() == 0 {
            let actual = match sqlx::query("SELECT status, tx_count FROM batches WHERE batch_id = ?")
                .bind(tx.batch_id.to_string())
                .fetch_one(&mut *db)
                .await
            {
                Ok(row) => format!(
                    "{} with {} members",
                    row.get::<String, _>("status"),
                    row.get::<i64, _>("tx_count")
                ),
                Err(e) => return Err(db_error(e)),
            };
            return Err(StoreError::Conflict {
                entity: "batch",
                id: tx.batch_id.to_string(),
                expected: format!("pending with {} members", tx.tree_index),
                actual,
            });
        }

        sqlx::query(
            r#"
            INSERT INTO batch_transactions (id, batch_id, tree_index, tx_hash, account_url, body)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(tx.id.to_string())
        .bind(tx.batch_id.to_string())
        .bind(i64::from(tx.tree_index))
        .bind(hex::encode(tx.tx_hash))
        .bind(&tx.account_url)
        .bind(encode(tx)?)
        .execute(&mut *db)
        .await
        .map_err(|e| insert_error(e, "transaction", hex::encode(tx.tx_hash)))?;

        db.commit().await.map_err(db_error)?;
        Ok(batch)
    }

    async fn update_transaction(&self, tx: &BatchTransaction) -> Result<(), StoreError> {
        self.replace_body(
            "batch_transactions",
            "id",
            "transaction",
            tx.id.to_string(),
            encode(tx)?,
        )
        .await
    }

    async fn get_transaction(&self, id: Uuid) -> Result<Option<BatchTransaction>, StoreError> {
        self.fetch_one("SELECT body FROM batch_transactions WHERE id = ?", id.to_string())
            .await
    }

    async fn list_transactions(
        &self,
        batch_id: BatchId,
    ) -> Result<Vec<BatchTransaction>, StoreError> {
        self.fetch_all(
            "SELECT body FROM batch_transactions WHERE batch_id = ? ORDER BY tree_index ASC",
            batch_id.to_string(),
        )
        .await
    }

    async fn create_anchor(&self, anchor: &AnchorRecord) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO anchors (anchor_id, batch_id, target_chain, anchor_tx_hash, is_final, reorged, created_at, body)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(anchor.anchor_id.to_string())
        .bind(anchor.batch_id.to_string())
        .bind(anchor.target_chain.as_str())
        .bind(&anchor.anchor_tx_hash)
        .bind(anchor.is_final)
        .bind(anchor.reorged)
        .bind(anchor.created_at as i64)
        .bind(encode(anchor)?)
        .execute(&self.pool)
        .await
        .map_err(|e| insert_error(e, "anchor", &anchor.anchor_tx_hash))?;
        Ok(())
    }

    async fn update_anchor(&self, anchor: &AnchorRecord) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE anchors SET is_final = ?, reorged = ?, body = ? WHERE anchor_id = ?",
        )
        .bind(anchor.is_final)
        .bind(anchor.reorged)
        .bind(encode(anchor)?)
        .bind(anchor.anchor_id.to_string())
        .execute(&self.pool)
        .await
        .map_err(db_error)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("anchor", anchor.anchor_id));
        }
        Ok(())
    }

    async fn delete_anchor(&self, id: AnchorId) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM anchors WHERE anchor_id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(db_error)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("anchor", id));
        }
        Ok(())
    }

    async fn get_anchor(&self, id: AnchorId) -> Result<Option<AnchorRecord>, StoreError> {
        self.fetch_one("SELECT body FROM anchors WHERE anchor_id = ?", id.to_string())
            .await
    }

    async fn find_anchor(
        &self,
        chain: &TargetChain,
        anchor_tx_hash: &str,
    ) -> Result<Option<AnchorRecord>, StoreError> {
        let row = sqlx::query("SELECT body FROM anchors WHERE target_chain = ? AND anchor_tx_hash = ?")
            .bind(chain.as_str())
            .bind(anchor_tx_hash)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?;
        row.as_ref().map(decode).transpose()
    }

    async fn anchors_for_batch(&self, batch_id: BatchId) -> Result<Vec<AnchorRecord>, StoreError> {
        self.fetch_all(
            "SELECT body FROM anchors WHERE batch_id = ? ORDER BY created_at ASC",
            batch_id.to_string(),
        )
        .await
    }

    async fn list_unfinalized_anchors(&self) -> Result<Vec<AnchorRecord>, StoreError> {
        let rows = sqlx::query(
            "SELECT body FROM anchors WHERE is_final = 0 AND reorged = 0 ORDER BY created_at ASC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;
        rows.iter().map(decode).collect()
    }

    async fn create_proof(&self, proof: &Proof) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO proofs (proof_id, transaction_id, batch_id, anchor_id, tx_hash, account_url, leaf_index, created_at, body)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(proof.proof_id.to_string())
        .bind(proof.transaction_id.to_string())
        .bind(proof.batch_id.to_string())
        .bind(proof.anchor_reference.anchor_id.to_string())
        .bind(hex::encode(proof.tx_hash))
        .bind(&proof.account_url)
        .bind(i64::from(proof.inclusion.leaf_index))
        .bind(proof.created_at as i64)
        .bind(encode(proof)?)
        .execute(&self.pool)
        .await
        .map_err(|e| insert_error(e, "proof", proof.transaction_id))?;
        Ok(())
    }

    async fn mark_proof_stale(&self, id: ProofId, at: u64) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE proofs
            SET body = json_set(body, '$.stale', json('true'), '$.verified', json('false'), '$.updated_at', ?)
            WHERE proof_id = ?
            "#,
        )
        .bind(at as i64)
        .bind(id.to_string())
        .execute(&self.pool)
        .await
        .map_err(db_error)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("proof", id));
        }
        Ok(())
    }

    async fn record_verification(
        &self,
        id: ProofId,
        verified: bool,
        at: u64,
        details: &VerificationResult,
    ) -> Result<(), StoreError> {
        // single statement, so a concurrent mark_proof_stale is never overwritten
        let result = sqlx::query(
            r#"
            UPDATE proofs
            SET body = json_set(
                body,
                '$.verified', json(CASE WHEN ? AND json_extract(body, '$.stale') = 0 THEN 'true' ELSE 'false' END),
                '$.verification_time', ?,
                '$.verification_details', json(?),
                '$.updated_at', ?
            )
            WHERE proof_id = ?
            "#,
        )
        .bind(verified)
        .bind(at as i64)
        .bind(serde_json::to_string(details)?)
        .bind(at as i64)
        .bind(id.to_string())
        .execute(&self.pool)
        .await
        .map_err(db_error)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("proof", id));
        }
        Ok(())
    }

    async fn get_proof(&self, id: ProofId) -> Result<Option<Proof>, StoreError> {
        self.fetch_one("SELECT body FROM proofs WHERE proof_id = ?", id.to_string())
            .await
    }

    async fn proof_for_transaction(
        &self,
        transaction_id: Uuid,
    ) -> Result<Option<Proof>, StoreError> {
        self.fetch_one(
            "SELECT body FROM proofs WHERE transaction_id = ?",
            transaction_id.to_string(),
        )
        .await
    }

    async fn proofs_by_tx_hash(&self, tx_hash: &Hash32) -> Result<Vec<Proof>, StoreError> {
        self.fetch_all(
            "SELECT body FROM proofs WHERE tx_hash = ? ORDER BY created_at ASC",
            hex::encode(tx_hash),
        )
        .await
    }

    async fn proofs_by_account(&self, account_url: &str) -> Result<Vec<Proof>, StoreError> {
        self.fetch_all(
            "SELECT body FROM proofs WHERE account_url = ? ORDER BY created_at ASC",
            account_url.to_string(),
        )
        .await
    }

    async fn proofs_by_batch(&self, batch_id: BatchId) -> Result<Vec<Proof>, StoreError> {
        self.fetch_all(
            "SELECT body FROM proofs WHERE batch_id = ? ORDER BY leaf_index ASC",
            batch_id.to_string(),
        )
        .await
    }

    async fn proofs_by_anchor(&self, anchor_id: AnchorId) -> Result<Vec<Proof>, StoreError> {
        self.fetch_all(
            "SELECT body FROM proofs WHERE anchor_id = ? ORDER BY leaf_index ASC",
            anchor_id.to_string(),
        )
        .await
    }

    async fn create_attestation(
        &self,
        attestation: &ValidatorAttestation,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO attestations (attestation_id, proof_id, attested_at, body) VALUES (?, ?, ?, ?)",
        )
        .bind(attestation.attestation_id.to_string())
        .bind(attestation.proof_id.to_string())
        .bind(attestation.attested_at as i64)
        .bind(encode(attestation)?)
        .execute(&self.pool)
        .await
        .map_err(|e| insert_error(e, "attestation", attestation.attestation_id))?;
        Ok(())
    }

    async fn attestations_for_proof(
        &self,
        proof_id: ProofId,
    ) -> Result<Vec<ValidatorAttestation>, StoreError> {
        self.fetch_all(
            "SELECT body FROM attestations WHERE proof_id = ? ORDER BY attested_at ASC",
            proof_id.to_string(),
        )
        .await
    }

    async fn create_request(&self, request: &ProofRequest) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO proof_requests (request_id, status, priority, requested_at, body) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(request.request_id.to_string())
        .bind(request.status.as_str())
        .bind(request.priority as i64)
        .bind(request.requested_at as i64)
        .bind(encode(request)?)
        .execute(&self.pool)
        .await
        .map_err(|e| insert_error(e, "proof request", request.request_id))?;
        Ok(())
    }

    async fn update_request(&self, request: &ProofRequest) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE proof_requests SET status = ?, body = ? WHERE request_id = ?")
            .bind(request.status.as_str())
            .bind(encode(request)?)
            .bind(request.request_id.to_string())
            .execute(&self.pool)
            .await
            .map_err(db_error)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("proof request", request.request_id));
        }
        Ok(())
    }

    async fn get_request(&self, id: RequestId) -> Result<Option<ProofRequest>, StoreError> {
        self.fetch_one(
            "SELECT body FROM proof_requests WHERE request_id = ?",
            id.to_string(),
        )
        .await
    }

    async fn list_requests_by_status(
        &self,
        status: RequestStatus,
    ) -> Result<Vec<ProofRequest>, StoreError> {
        self.fetch_all(
            "SELECT body FROM proof_requests WHERE status = ? ORDER BY priority DESC, requested_at ASC",
            status.as_str().to_string(),
        )
        .await
    }

    async fn create_intent_graph(
        &self,
        intent: &Intent,
        legs: &[IntentLeg],
        dependencies: &[LegDependency],
        groups: &[ChainGroup],
    ) -> Result<(), StoreError> {
        let mut db = self.pool.begin().await.map_err(db_error)?;

        sqlx::query(
            "INSERT INTO intents (intent_id, user_id, status, is_terminal, created_at, body) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&intent.intent_id)
        .bind(&intent.user_id)
        .bind(intent.status.as_str())
        .bind(intent.status.is_terminal())
        .bind(intent.created_at as i64)
        .bind(encode(intent)?)
        .execute(&mut *db)
        .await
        .map_err(|e| insert_error(e, "intent", &intent.intent_id))?;

        for leg in legs {
            sqlx::query("INSERT INTO intent_legs (leg_id, intent_id, leg_index, body) VALUES (?, ?, ?, ?)")
                .bind(leg.leg_id.to_string())
                .bind(&leg.intent_id)
                .bind(i64::from(leg.leg_index))
                .bind(encode(leg)?)
                .execute(&mut *db)
                .await
                .map_err(|e| insert_error(e, "leg", leg.leg_id))?;
        }

        for dep in dependencies {
            sqlx::query(
                "INSERT INTO leg_dependencies (dependency_id, intent_id, created_at, body) VALUES (?, ?, ?, ?)",
            )
            .bind(dep.dependency_id.to_string())
            .bind(&dep.intent_id)
            .bind(dep.created_at as i64)
            .bind(encode(dep)?)
            .execute(&mut *db)
            .await
            .map_err(|e| insert_error(e, "dependency", dep.dependency_id))?;
        }

        for group in groups {
            sqlx::query(
                "INSERT INTO chain_groups (group_id, intent_id, target_chain, body) VALUES (?, ?, ?, ?)",
            )
            .bind(group.group_id.to_string())
            .bind(&group.intent_id)
            .bind(group.target_chain.as_str())
            .bind(encode(group)?)
            .execute(&mut *db)
            .await
            .map_err(|e| insert_error(e, "chain group", group.group_id))?;
        }

        // Dropping `db` on any early return rolls everything back
        db.commit().await.map_err(db_error)?;
        Ok(())
    }

    async fn get_intent(&self, intent_id: &str) -> Result<Option<Intent>, StoreError> {
        self.fetch_one(
            "SELECT body FROM intents WHERE intent_id = ?",
            intent_id.to_string(),
        )
        .await
    }

    async fn update_intent(&self, intent: &Intent) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE intents SET status = ?, is_terminal = ?, body = ? WHERE intent_id = ?",
        )
        .bind(intent.status.as_str())
        .bind(intent.status.is_terminal())
        .bind(encode(intent)?)
        .bind(&intent.intent_id)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("intent", &intent.intent_id));
        }
        Ok(())
    }

    async fn list_active_intents(&self) -> Result<Vec<Intent>, StoreError> {
        let rows = sqlx::query("SELECT body FROM intents WHERE is_terminal = 0 ORDER BY created_at ASC")
            .fetch_all(&self.pool)
            .await
            .map_err(db_error)?;
        rows.iter().map(decode).collect()
    }

    async fn list_intents_by_user(&self, user_id: &str) -> Result<Vec<Intent>, StoreError> {
        self.fetch_all(
            "SELECT body FROM intents WHERE user_id = ? ORDER BY created_at ASC",
            user_id.to_string(),
        )
        .await
    }

    async fn get_leg(&self, leg_id: LegId) -> Result<Option<IntentLeg>, StoreError> {
        self.fetch_one("SELECT body FROM intent_legs WHERE leg_id = ?", leg_id.to_string())
            .await
    }

    async fn update_leg(&self, leg: &IntentLeg) -> Result<(), StoreError> {
        self.replace_body(
            "intent_legs",
            "leg_id",
            "leg",
            leg.leg_id.to_string(),
            encode(leg)?,
        )
        .await
    }

    async fn legs_for_intent(&self, intent_id: &str) -> Result<Vec<IntentLeg>, StoreError> {
        self.fetch_all(
            "SELECT body FROM intent_legs WHERE intent_id = ? ORDER BY leg_index ASC",
            intent_id.to_string(),
        )
        .await
    }

    async fn dependencies_for_intent(
        &self,
        intent_id: &str,
    ) -> Result<Vec<LegDependency>, StoreError> {
        self.fetch_all(
            "SELECT body FROM leg_dependencies WHERE intent_id = ? ORDER BY created_at ASC, dependency_id ASC",
            intent_id.to_string(),
        )
        .await
    }

    async fn update_dependency(&self, dependency: &LegDependency) -> Result<(), StoreError> {
        self.replace_body(
            "leg_dependencies",
            "dependency_id",
            "dependency",
            dependency.dependency_id.to_string(),
            encode(dependency)?,
        )
        .await
    }

    async fn chain_groups_for_intent(
        &self,
        intent_id: &str,
    ) -> Result<Vec<ChainGroup>, StoreError> {
        self.fetch_all(
            "SELECT body FROM chain_groups WHERE intent_id = ? ORDER BY target_chain ASC",
            intent_id.to_string(),
        )
        .await
    }

    async fn update_chain_group(&self, group: &ChainGroup) -> Result<(), StoreError> {
        self.replace_body(
            "chain_groups",
            "group_id",
            "chain group",
            group.group_id.to_string(),
            encode(group)?,
        )
        .await
    }

    async fn record_event(&self, event: &TimelineEvent) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO timeline_events (event_id, entity_id, intent_id, timestamp, body) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(event.event_id.to_string())
        .bind(&event.entity_id)
        .bind(&event.intent_id)
        .bind(event.timestamp as i64)
        .bind(encode(event)?)
        .execute(&self.pool)
        .await
        .map_err(|e| insert_error(e, "timeline event", event.event_id))?;
        Ok(())
    }

    async fn timeline(&self, entity_id: &str) -> Result<Vec<TimelineEvent>, StoreError> {
        self.fetch_all(
            "SELECT body FROM timeline_events WHERE entity_id = ? ORDER BY seq ASC",
            entity_id.to_string(),
        )
        .await
    }

    async fn intent_timeline(&self, intent_id: &str) -> Result<Vec<TimelineEvent>, StoreError> {
        self.fetch_all(
            "SELECT body FROM timeline_events WHERE intent_id = ? ORDER BY seq ASC",
            intent_id.to_string(),
        )
        .await
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// HELPER FUNCTIONS
// ═══════════════════════════════════════════════════════════════════════════

fn encode<T: Serialize>(value: &T) -> Result<String, StoreError> {
    Ok(serde_json::to_string(value)?)
}

fn decode<T: DeserializeOwned>(row: &SqliteRow) -> Result<T, StoreError> {
    let body: String = row.get("body");
    Ok(serde_json::from_str(&body)?)
}

fn db_error(e: sqlx::Error) -> StoreError {
    error!(error = %e, "Ledger database query failed");
    StoreError::DatabaseError(e.to_string())
}

fn insert_error(e: sqlx::Error, entity: &'static str, id: impl ToString) -> StoreError {
    match e {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
            StoreError::duplicate(entity, id)
        }
        e => db_error(e),
    }
}
