//! Account directory lookups
//!
//! Login needs an account's email, bcrypt hash and role. Accounts are owned
//! elsewhere; this side only reads them.

use async_trait::async_trait;
use dashmap::DashMap;
use sqlx::PgPool;

use crate::core::db::models::AccountCredential;

/// Credential lookup error types
#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    #[error("Account not found")]
    NotFound,

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Account directory unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait CredentialDirectory: Send + Sync {
    async fn get_credentials(&self, email: &str) -> Result<AccountCredential, CredentialError>;
}

/// Credentials read from the `accounts` table
#[derive(Clone)]
pub struct PgCredentialDirectory {
    pool: PgPool,
}

impl PgCredentialDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CredentialDirectory for PgCredentialDirectory {
    async fn get_credentials(&self, email: &str) -> Result<AccountCredential, CredentialError> {
        sqlx::query_as::<_, AccountCredential>(
            r#"
            SELECT email, password_hash, role
            FROM accounts
            WHERE email = $1
            "#,
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(CredentialError::NotFound)
    }
}

/// Credentials held in process memory, keyed by email
#[derive(Debug, Default)]
pub struct MemoryCredentialDirectory {
    accounts: DashMap<String, AccountCredential>,
}

impl MemoryCredentialDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace an account with an already-hashed password
    pub fn insert(
        &self,
        email: impl Into<String>,
        password_hash: impl Into<String>,
        role: impl Into<String>,
    ) {
        let email = email.into();
        self.accounts.insert(
            email.clone(),
            AccountCredential {
                email,
                password_hash: password_hash.into(),
                role: role.into(),
            },
        );
    }

    pub fn remove(&self, email: &str) -> bool {
        self.accounts.remove(email).is_some()
    }
}

#[async_trait]
impl CredentialDirectory for MemoryCredentialDirectory {
    async fn get_credentials(&self, email: &str) -> Result<AccountCredential, CredentialError> {
        self.accounts
            .get(email)
            .map(|credential| credential.value().clone())
            .ok_or(CredentialError::NotFound)
    }
}
