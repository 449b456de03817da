//! Cache-aside session store
//!
//! Keeps the current refresh session for each (account, device) pair in a
//! fast cache backed by a durable record. Reads prefer the cache and repopulate
//! it from the durable record on a miss. Every backend call runs under the
//! store's deadline; a timeout or backend failure surfaces as an error and is
//! never retried here.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use crate::core::cache::{CacheError, SessionCache};
use crate::core::db::models::{SessionEntry, SessionRecord};
use crate::core::db::repositories::{RecordStoreError, SessionRecords, hash_token};

/// Default deadline for a single cache or database call
pub const DEFAULT_OP_TIMEOUT: Duration = Duration::from_secs(2);

const KEY_PREFIX: &str = "refresh_session";

/// Session store error types
#[derive(Debug, thiserror::Error)]
pub enum SessionStoreError {
    #[error("No session found")]
    NoSessionFound,

    #[error("Session store timed out after {0:?}")]
    Timeout(Duration),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Records(#[from] RecordStoreError),

    #[error("Session lifetime must be positive")]
    InvalidTtl,
}

/// Cache key for a session.
///
/// The account identifier is length-prefixed so that no two
/// (account, device) pairs can produce the same key.
pub fn session_key(account_id: &str, device_id: &str) -> String {
    format!(
        "{KEY_PREFIX}:{}:{account_id}:{device_id}",
        account_id.len()
    )
}

/// Session store over an injected cache and durable record backend
#[derive(Clone)]
pub struct SessionStore {
    cache: Arc<dyn SessionCache>,
    records: Arc<dyn SessionRecords>,
    op_timeout: Duration,
}

impl SessionStore {
    pub fn new(cache: Arc<dyn SessionCache>, records: Arc<dyn SessionRecords>) -> Self {
        Self {
            cache,
            records,
            op_timeout: DEFAULT_OP_TIMEOUT,
        }
    }

    /// Set the per-call deadline
    pub fn with_op_timeout(mut self, op_timeout: Duration) -> Self {
        self.op_timeout = op_timeout;
        self
    }

    pub fn op_timeout(&self) -> Duration {
        self.op_timeout
    }

    /// Record `refresh_token` as the live session for the pair, replacing any
    /// previous one. Writes the cache entry first, then the durable record;
    /// both must succeed. If the durable write fails the cache entry is
    /// dropped again.
    pub async fn save(
        &self,
        account_id: &str,
        device_id: &str,
        refresh_token: &str,
        ttl: chrono::Duration,
    ) -> Result<SessionEntry, SessionStoreError> {
        let cache_ttl = ttl
            .to_std()
            .ok()
            .filter(|ttl| !ttl.is_zero())
            .ok_or(SessionStoreError::InvalidTtl)?;

        let now = Utc::now();
        let record = SessionRecord::new(
            account_id,
            device_id,
            hash_token(refresh_token),
            now,
            now + ttl,
        );
        let entry = record.entry();
        let key = session_key(account_id, device_id);

        self.bounded(self.cache.set(&key, encode(&entry)?, cache_ttl))
            .await
            .inspect_err(|e| tracing::error!(%account_id, %device_id, "Session cache write failed: {e}"))?;
        if let Err(e) = self.bounded(self.records.upsert(&record)).await {
            tracing::error!(%account_id, %device_id, "Session record write failed: {e}");
            // Drop the new entry so the device's previous session stays usable
            if let Err(cleanup) = self.bounded(self.cache.delete(&key)).await {
                tracing::warn!(%account_id, %device_id, "Session cache rollback failed: {cleanup}");
            }
            return Err(e);
        }

        tracing::debug!(%account_id, %device_id, expires_at = %entry.expires_at, "Session saved");
        Ok(entry)
    }

    /// Current session for the pair.
    ///
    /// A record whose expiry has already passed is returned as-is (and not
    /// cached) so the caller can reject it as expired.
    pub async fn get(
        &self,
        account_id: &str,
        device_id: &str,
    ) -> Result<SessionEntry, SessionStoreError> {
        let key = session_key(account_id, device_id);

        match self.bounded(self.cache.get(&key)).await? {
            Some(raw) => match serde_json::from_str::<SessionEntry>(&raw) {
                Ok(entry) => {
                    tracing::debug!(%account_id, %device_id, "Session cache hit");
                    return Ok(entry);
                }
                Err(e) => {
                    tracing::warn!(%account_id, %device_id, "Discarding unreadable cache entry: {e}");
                }
            },
            None => tracing::debug!(%account_id, %device_id, "Session cache miss"),
        }

        let record = self
            .bounded(self.records.find(account_id, device_id))
            .await?
            .ok_or(SessionStoreError::NoSessionFound)?;
        let entry = record.entry();

        match record.remaining_ttl(Utc::now()) {
            Some(remaining) => {
                self.bounded(self.cache.set(&key, encode(&entry)?, remaining))
                    .await?;
                tracing::debug!(%account_id, %device_id, ?remaining, "Session cache repopulated");
            }
            None => {
                tracing::debug!(%account_id, %device_id, "Durable session already expired");
            }
        }

        Ok(entry)
    }

    /// Mark the pair's session revoked.
    ///
    /// The durable record is updated first, then the cache entry is replaced
    /// by a revoked tombstone for the rest of the session's lifetime (or
    /// dropped if that lifetime is over). Returns `false` when there was no
    /// session to revoke.
    pub async fn revoke(&self, account_id: &str, device_id: &str) -> Result<bool, SessionStoreError> {
        let key = session_key(account_id, device_id);
        let revoked = self
            .bounded(self.records.revoke(account_id, device_id))
            .await?;

        let Some(record) = revoked else {
            self.bounded(self.cache.delete(&key)).await?;
            return Ok(false);
        };

        match record.remaining_ttl(Utc::now()) {
            Some(remaining) => {
                self.bounded(self.cache.set(&key, encode(&record.entry())?, remaining))
                    .await?
            }
            None => self.bounded(self.cache.delete(&key)).await?,
        }

        Ok(true)
    }

    /// Delete expired durable records
    pub async fn purge_expired(&self) -> Result<u64, SessionStoreError> {
        self.bounded(self.records.purge_expired()).await
    }

    async fn bounded<T, E>(
        &self,
        operation: impl Future<Output = Result<T, E>>,
    ) -> Result<T, SessionStoreError>
    where
        SessionStoreError: From<E>,
    {
        match tokio::time::timeout(self.op_timeout, operation).await {
            Ok(result) => result.map_err(SessionStoreError::from),
            Err(_) => Err(SessionStoreError::Timeout(self.op_timeout)),
        }
    }
}

fn encode(entry: &SessionEntry) -> Result<String, SessionStoreError> {
    serde_json::to_string(entry).map_err(|e| CacheError::Corrupt(e.to_string()).into())
}
