//! Session repository for refresh-session records
//!
//! One row per (account, device). A new login upserts over the previous row,
//! logout flips `revoked`, and expired rows are purged in the background.
//! Refresh tokens are stored as SHA-256 hashes.

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use sha2::{Digest, Sha256};
use sqlx::PgPool;

use crate::core::db::models::SessionRecord;

/// Session repository error types
#[derive(Debug, thiserror::Error)]
pub enum RecordStoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Session records unavailable: {0}")]
    Unavailable(String),
}

/// Hash a refresh token using SHA-256
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

/// Durable storage of refresh-session records
#[async_trait]
pub trait SessionRecords: Send + Sync {
    /// Insert or overwrite the record for its (account, device) key,
    /// clearing any revocation.
    async fn upsert(&self, record: &SessionRecord) -> Result<(), RecordStoreError>;

    async fn find(
        &self,
        account_id: &str,
        device_id: &str,
    ) -> Result<Option<SessionRecord>, RecordStoreError>;

    /// Mark the record revoked and return it, or `None` if there is none.
    async fn revoke(
        &self,
        account_id: &str,
        device_id: &str,
    ) -> Result<Option<SessionRecord>, RecordStoreError>;

    /// Delete records whose expiry has passed, returning how many went.
    async fn purge_expired(&self) -> Result<u64, RecordStoreError>;
}

// ============================================================================
// PostgreSQL
// ============================================================================

/// Session records in the `sessions` table
#[derive(Clone)]
pub struct PgSessionRecords {
    pool: PgPool,
}

impl PgSessionRecords {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SessionRecords for PgSessionRecords {
    async fn upsert(&self, record: &SessionRecord) -> Result<(), RecordStoreError> {
        sqlx::query(
            r#"
            INSERT INTO sessions (account_id, device_id, token_hash, created_at, expires_at, revoked)
            VALUES ($1, $2, $3, $4, $5, FALSE)
            ON CONFLICT (account_id, device_id) DO UPDATE
            SET token_hash = EXCLUDED.token_hash,
                created_at = EXCLUDED.created_at,
                expires_at = EXCLUDED.expires_at,
                revoked = FALSE
            "#,
        )
        .bind(&record.account_id)
        .bind(&record.device_id)
        .bind(&record.token_hash)
        .bind(record.created_at)
        .bind(record.expires_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find(
        &self,
        account_id: &str,
        device_id: &str,
    ) -> Result<Option<SessionRecord>, RecordStoreError> {
        let record = sqlx::query_as::<_, SessionRecord>(
            r#"
            SELECT account_id, device_id, token_hash, created_at, expires_at, revoked
            FROM sessions
            WHERE account_id = $1 AND device_id = $2
            "#,
        )
        .bind(account_id)
        .bind(device_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    async fn revoke(
        &self,
        account_id: &str,
        device_id: &str,
    ) -> Result<Option<SessionRecord>, RecordStoreError> {
        let record = sqlx::query_as::<_, SessionRecord>(
            r#"
            UPDATE sessions
            SET revoked = TRUE
            WHERE account_id = $1 AND device_id = $2
            RETURNING account_id, device_id, token_hash, created_at, expires_at, revoked
            "#,
        )
        .bind(account_id)
        .bind(device_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    async fn purge_expired(&self) -> Result<u64, RecordStoreError> {
        let result = sqlx::query(
            r#"
            DELETE FROM sessions
            WHERE expires_at < NOW()
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}

// ============================================================================
// In-memory
// ============================================================================

/// Session records held in process memory
#[derive(Debug, Default)]
pub struct MemorySessionRecords {
    records: DashMap<(String, String), SessionRecord>,
}

impl MemorySessionRecords {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop a record without going through revocation
    pub fn evict(&self, account_id: &str, device_id: &str) -> bool {
        self.records
            .remove(&(account_id.to_string(), device_id.to_string()))
            .is_some()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl SessionRecords for MemorySessionRecords {
    async fn upsert(&self, record: &SessionRecord) -> Result<(), RecordStoreError> {
        let mut record = record.clone();
        record.revoked = false;
        self.records.insert(
            (record.account_id.clone(), record.device_id.clone()),
            record,
        );
        Ok(())
    }

    async fn find(
        &self,
        account_id: &str,
        device_id: &str,
    ) -> Result<Option<SessionRecord>, RecordStoreError> {
        Ok(self
            .records
            .get(&(account_id.to_string(), device_id.to_string()))
            .map(|record| record.value().clone()))
    }

    async fn revoke(
        &self,
        account_id: &str,
        device_id: &str,
    ) -> Result<Option<SessionRecord>, RecordStoreError> {
        Ok(self
            .records
            .get_mut(&(account_id.to_string(), device_id.to_string()))
            .map(|mut record| {
                record.revoked = true;
                record.value().clone()
            }))
    }

    async fn purge_expired(&self) -> Result<u64, RecordStoreError> {
        let now = Utc::now();
        let before = self.records.len();
        self.records.retain(|_, record| record.expires_at >= now);
        Ok(before.saturating_sub(self.records.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn record(account: &str, device: &str, token: &str, expires_in: Duration) -> SessionRecord {
        let now = Utc::now();
        SessionRecord::new(account, device, hash_token(token), now, now + expires_in)
    }

    // ========================================================================
    // Token Hashing Tests
    // ========================================================================

    #[test]
    fn test_hash_token_is_deterministic() {
        assert_eq!(hash_token("my_refresh_token"), hash_token("my_refresh_token"));
    }

    #[test]
    fn test_hash_token_differs_per_token() {
        assert_ne!(hash_token("token_one"), hash_token("token_two"));
    }

    #[test]
    fn test_hash_token_is_64_char_hex() {
        let hash = hash_token("any_token");

        // SHA-256 produces 32 bytes = 64 hex characters
        assert_eq!(hash.len(), 64);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_hash_token_known_value() {
        assert_eq!(
            hash_token(""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    // ========================================================================
    // In-memory Record Tests
    // ========================================================================

    #[tokio::test]
    async fn test_upsert_then_find() {
        let records = MemorySessionRecords::new();
        let saved = record("a@x.com", "dev-1", "rt1", Duration::hours(1));

        records.upsert(&saved).await.unwrap();

        let found = records.find("a@x.com", "dev-1").await.unwrap();
        assert_eq!(found, Some(saved));
        assert!(records.find("a@x.com", "dev-2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_upsert_overwrites_and_clears_revocation() {
        let records = MemorySessionRecords::new();
        records
            .upsert(&record("a@x.com", "dev-1", "rt1", Duration::hours(1)))
            .await
            .unwrap();
        records.revoke("a@x.com", "dev-1").await.unwrap();

        records
            .upsert(&record("a@x.com", "dev-1", "rt2", Duration::hours(1)))
            .await
            .unwrap();

        let found = records.find("a@x.com", "dev-1").await.unwrap().unwrap();
        assert_eq!(found.token_hash, hash_token("rt2"));
        assert!(!found.revoked);
        assert_eq!(records.len(), 1);
    }

    #[tokio::test]
    async fn test_keys_do_not_collide_across_accounts_and_devices() {
        let records = MemorySessionRecords::new();
        records
            .upsert(&record("a@x.com", "dev-1", "rt-a", Duration::hours(1)))
            .await
            .unwrap();
        records
            .upsert(&record("b@x.com", "dev-1", "rt-b", Duration::hours(1)))
            .await
            .unwrap();
        records
            .upsert(&record("a@x.com", "dev-2", "rt-c", Duration::hours(1)))
            .await
            .unwrap();

        assert_eq!(records.len(), 3);
    }

    #[tokio::test]
    async fn test_revoke_marks_record() {
        let records = MemorySessionRecords::new();
        records
            .upsert(&record("a@x.com", "dev-1", "rt1", Duration::hours(1)))
            .await
            .unwrap();

        let revoked = records.revoke("a@x.com", "dev-1").await.unwrap().unwrap();
        assert!(revoked.revoked);

        let found = records.find("a@x.com", "dev-1").await.unwrap().unwrap();
        assert!(found.revoked);
    }

    #[tokio::test]
    async fn test_revoke_missing_record() {
        let records = MemorySessionRecords::new();
        assert!(records.revoke("a@x.com", "dev-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let records = MemorySessionRecords::new();
        records
            .upsert(&record("a@x.com", "dev-1", "rt1", Duration::hours(1)))
            .await
            .unwrap();
        records
            .upsert(&record("a@x.com", "dev-2", "rt2", Duration::seconds(-10)))
            .await
            .unwrap();

        assert_eq!(records.purge_expired().await.unwrap(), 1);
        assert!(records.find("a@x.com", "dev-1").await.unwrap().is_some());
        assert!(records.find("a@x.com", "dev-2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_evict() {
        let records = MemorySessionRecords::new();
        records
            .upsert(&record("a@x.com", "dev-1", "rt1", Duration::hours(1)))
            .await
            .unwrap();

        assert!(records.evict("a@x.com", "dev-1"));
        assert!(records.is_empty());
    }

    // ========================================================================
    // PostgreSQL Tests (require real database)
    // ========================================================================

    // Run with: DATABASE_URL=postgres://... cargo test -- --ignored

    async fn pg_records() -> PgSessionRecords {
        use crate::core::db::pool::{DbConfig, create_pool_with_migrations};

        let config = DbConfig::from_env().expect("DATABASE_URL must be set");
        let pool = create_pool_with_migrations(&config)
            .await
            .expect("Failed to create pool");
        PgSessionRecords::new(pool)
    }

    fn unique_account() -> String {
        format!("{}@test.sessionward", uuid::Uuid::new_v4())
    }

    #[tokio::test]
    #[ignore = "requires running PostgreSQL database"]
    async fn test_pg_upsert_then_find() {
        let records = pg_records().await;
        let account = unique_account();
        let saved = record(&account, "dev-1", "rt1", Duration::hours(1));

        records.upsert(&saved).await.unwrap();

        let found = records.find(&account, "dev-1").await.unwrap().unwrap();
        assert_eq!(found.account_id, account);
        assert_eq!(found.device_id, "dev-1");
        assert_eq!(found.token_hash, hash_token("rt1"));
        assert_eq!(found.expires_at.timestamp(), saved.expires_at.timestamp());
        assert!(!found.revoked);
        assert!(records.find(&account, "dev-2").await.unwrap().is_none());
    }

    #[tokio::test]
    #[ignore = "requires running PostgreSQL database"]
    async fn test_pg_upsert_overwrites_and_clears_revocation() {
        let records = pg_records().await;
        let account = unique_account();
        records
            .upsert(&record(&account, "dev-1", "rt1", Duration::hours(1)))
            .await
            .unwrap();
        records.revoke(&account, "dev-1").await.unwrap();

        records
            .upsert(&record(&account, "dev-1", "rt2", Duration::hours(2)))
            .await
            .unwrap();

        let found = records.find(&account, "dev-1").await.unwrap().unwrap();
        assert_eq!(found.token_hash, hash_token("rt2"));
        assert!(!found.revoked);
    }

    #[tokio::test]
    #[ignore = "requires running PostgreSQL database"]
    async fn test_pg_revoke_returns_row() {
        let records = pg_records().await;
        let account = unique_account();
        records
            .upsert(&record(&account, "dev-1", "rt1", Duration::hours(1)))
            .await
            .unwrap();

        let revoked = records.revoke(&account, "dev-1").await.unwrap().unwrap();
        assert!(revoked.revoked);
        assert_eq!(revoked.token_hash, hash_token("rt1"));

        let found = records.find(&account, "dev-1").await.unwrap().unwrap();
        assert!(found.revoked);

        assert!(records.revoke(&account, "dev-2").await.unwrap().is_none());
    }

    #[tokio::test]
    #[ignore = "requires running PostgreSQL database"]
    async fn test_pg_purge_expired_counts_rows() {
        let records = pg_records().await;
        let account = unique_account();
        records
            .upsert(&record(&account, "dev-1", "rt1", Duration::hours(1)))
            .await
            .unwrap();
        records
            .upsert(&record(&account, "dev-2", "rt2", Duration::seconds(-10)))
            .await
            .unwrap();
        records
            .upsert(&record(&account, "dev-3", "rt3", Duration::seconds(-10)))
            .await
            .unwrap();

        // Other expired rows in a shared database count too
        assert!(records.purge_expired().await.unwrap() >= 2);
        assert!(records.find(&account, "dev-1").await.unwrap().is_some());
        assert!(records.find(&account, "dev-2").await.unwrap().is_none());
        assert!(records.find(&account, "dev-3").await.unwrap().is_none());
    }
}
