//! Compendium record persistence
//!
//! The [`CompendiumStore`] is the single owner of the compendium lifecycle:
//! records are created exactly once per successful acquisition, and terminal
//! status transitions go through [`CompendiumStore::finish`], which is
//! idempotent (a duplicate terminal update affects zero rows and is reported
//! as a no-op, not an error).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use thiserror::Error;

/// Compendium lifecycle state.
///
/// `Loading` is the only valid initial state; `Success` and `Failed` are
/// terminal and reached at most once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompendiumStatus {
    Loading,
    Success,
    Failed,
}

impl CompendiumStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CompendiumStatus::Loading => "loading",
            CompendiumStatus::Success => "success",
            CompendiumStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, CompendiumStatus::Loading)
    }
}

impl std::fmt::Display for CompendiumStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A durable compendium record.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Compendium {
    pub id: String,
    pub status: String,
    pub source_kind: String,
    pub source_reference: String,
    pub original_filename: Option<String>,
    pub checksum: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Fields for a new record; status is always `loading` on creation.
#[derive(Debug, Clone)]
pub struct NewCompendium {
    pub id: String,
    pub source_kind: String,
    pub source_reference: String,
    pub original_filename: Option<String>,
    pub checksum: String,
}

/// Store failures; unavailability is distinct from not-found.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("compendium {0} not found")]
    NotFound(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Write access to terminal status transitions.
///
/// The extraction orchestrator only needs this narrow surface, which keeps it
/// testable without a database.
#[async_trait]
pub trait StatusStore: Send + Sync + 'static {
    /// Record a terminal outcome. Returns `false` when the record was
    /// already terminal (idempotent no-op).
    async fn mark_finished(
        &self,
        compendium_id: &str,
        status: CompendiumStatus,
    ) -> anyhow::Result<bool>;
}

/// PostgreSQL-backed compendium store.
#[derive(Debug, Clone)]
pub struct CompendiumStore {
    pool: PgPool,
}

impl CompendiumStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Insert a fresh record in the `loading` state.
    #[tracing::instrument(skip(self, new), fields(compendium_id = %new.id))]
    pub async fn create(&self, new: &NewCompendium) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO compendia (id, status, source_kind, source_reference, original_filename, checksum)
            VALUES ($1, 'loading', $2, $3, $4, $5)
            "#,
        )
        .bind(&new.id)
        .bind(&new.source_kind)
        .bind(&new.source_reference)
        .bind(&new.original_filename)
        .bind(&new.checksum)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Fetch a record by id.
    pub async fn get(&self, compendium_id: &str) -> Result<Option<Compendium>, StoreError> {
        let record = sqlx::query_as::<_, Compendium>(
            r#"
            SELECT id, status, source_kind, source_reference, original_filename,
                   checksum, created_at, updated_at
            FROM compendia
            WHERE id = $1
            "#,
        )
        .bind(compendium_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    /// Apply a terminal status transition.
    ///
    /// Returns `Ok(false)` when the record exists but is already terminal;
    /// `StoreError::NotFound` when no such record exists.
    #[tracing::instrument(skip(self))]
    pub async fn finish(
        &self,
        compendium_id: &str,
        status: CompendiumStatus,
    ) -> Result<bool, StoreError> {
        debug_assert!(status.is_terminal());

        let result = sqlx::query(
            r#"
            UPDATE compendia
            SET status = $2, updated_at = NOW()
            WHERE id = $1 AND status = 'loading'
            "#,
        )
        .bind(compendium_id)
        .bind(status.as_str())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() > 0 {
            return Ok(true);
        }

        // Zero rows: either already terminal (fine) or unknown id (error).
        match self.get(compendium_id).await? {
            Some(_) => Ok(false),
            None => Err(StoreError::NotFound(compendium_id.to_string())),
        }
    }
}

#[async_trait]
impl StatusStore for CompendiumStore {
    async fn mark_finished(
        &self,
        compendium_id: &str,
        status: CompendiumStatus,
    ) -> anyhow::Result<bool> {
        Ok(self.finish(compendium_id, status).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_strings() {
        assert_eq!(CompendiumStatus::Loading.as_str(), "loading");
        assert_eq!(CompendiumStatus::Success.as_str(), "success");
        assert_eq!(CompendiumStatus::Failed.as_str(), "failed");
    }

    #[test]
    fn test_terminal_states() {
        assert!(!CompendiumStatus::Loading.is_terminal());
        assert!(CompendiumStatus::Success.is_terminal());
        assert!(CompendiumStatus::Failed.is_terminal());
    }

    #[test]
    fn test_status_serde_lowercase() {
        assert_eq!(
            serde_json::to_string(&CompendiumStatus::Success).unwrap(),
            "\"success\""
        );
        let parsed: CompendiumStatus = serde_json::from_str("\"failed\"").unwrap();
        assert_eq!(parsed, CompendiumStatus::Failed);
    }

    /// Full store roundtrip against a real database.
    ///
    /// Run with `LOADER_TEST_DATABASE_URL` pointing at a migrated database:
    /// `cargo test -- --ignored`
    #[tokio::test]
    #[ignore]
    async fn test_store_roundtrip_and_idempotent_finish() {
        let url = std::env::var("LOADER_TEST_DATABASE_URL").unwrap();
        let pool = PgPool::connect(&url).await.unwrap();
        let store = CompendiumStore::new(pool);

        let id = crate::staging::generate_compendium_id();
        store
            .create(&NewCompendium {
                id: id.clone(),
                source_kind: "zenodo_record_id".to_string(),
                source_reference: "69114".to_string(),
                original_filename: Some("metatainer.zip".to_string()),
                checksum: "00".repeat(32),
            })
            .await
            .unwrap();

        let record = store.get(&id).await.unwrap().unwrap();
        assert_eq!(record.status, "loading");

        assert!(store.finish(&id, CompendiumStatus::Success).await.unwrap());
        // Duplicate terminal update is a no-op, not an error.
        assert!(!store.finish(&id, CompendiumStatus::Success).await.unwrap());
        assert!(!store.finish(&id, CompendiumStatus::Failed).await.unwrap());

        let record = store.get(&id).await.unwrap().unwrap();
        assert_eq!(record.status, "success");
    }
}
