//! Database models for sessionward
//!
//! Rust structs for the durable tables and the cached session entry.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

// ============================================================================
// Account Credential
// ============================================================================

/// Credentials fetched from the account directory. Read-only here.
#[derive(Clone, FromRow)]
pub struct AccountCredential {
    pub email: String,
    pub password_hash: String,
    pub role: String,
}

impl std::fmt::Debug for AccountCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountCredential")
            .field("email", &self.email)
            .field("password_hash", &"<redacted>")
            .field("role", &self.role)
            .finish()
    }
}

// ============================================================================
// Session Record
// ============================================================================

/// Durable refresh-session record, unique per (account, device).
///
/// `token_hash` is the SHA-256 hex digest of the refresh token; the token
/// itself is never persisted.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct SessionRecord {
    pub account_id: String,
    pub device_id: String,
    pub token_hash: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub revoked: bool,
}

impl SessionRecord {
    pub fn new(
        account_id: impl Into<String>,
        device_id: impl Into<String>,
        token_hash: impl Into<String>,
        created_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            account_id: account_id.into(),
            device_id: device_id.into(),
            token_hash: token_hash.into(),
            created_at,
            expires_at,
            revoked: false,
        }
    }

    /// Time left before `expires_at`, or `None` once it has passed.
    pub fn remaining_ttl(&self, now: DateTime<Utc>) -> Option<std::time::Duration> {
        (self.expires_at - now)
            .to_std()
            .ok()
            .filter(|remaining| !remaining.is_zero())
    }

    pub fn entry(&self) -> SessionEntry {
        SessionEntry {
            token_hash: self.token_hash.clone(),
            expires_at: self.expires_at,
            revoked: self.revoked,
        }
    }
}

// ============================================================================
// Session Entry
// ============================================================================

/// What a session lookup yields, and the JSON value held in the fast cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionEntry {
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
    #[serde(default)]
    pub revoked: bool,
}

impl SessionEntry {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

// ============================================================================
// Tests
// ============================================================================
