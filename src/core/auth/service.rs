//! Authentication service
//!
//! The three public session operations: login, refresh-token validation and
//! logout. Coordinates the account directory, password verifier, token issuer
//! and session store.

use std::sync::Arc;

use crate::core::auth::jwt::{IssuedToken, TokenError, TokenIssuer, TokenKind, TokenPair};
use crate::core::auth::password::{PasswordError, PasswordVerifier};
use crate::core::auth::validator::SessionValidator;
use crate::core::db::repositories::{CredentialDirectory, CredentialError};
use crate::core::session_store::{SessionStore, SessionStoreError};

/// Message returned by a successful logout
pub const LOGOUT_MESSAGE: &str = "logout successful";

/// Authentication service error types
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Invalid email or password")]
    AuthenticationFailed,

    #[error("No session found")]
    NoSessionFound,

    #[error("Malformed token")]
    TokenMalformed,

    #[error("Token expired")]
    TokenExpired,

    #[error("Token has been superseded by a newer login")]
    TokenMismatch,

    #[error("Session has been revoked")]
    TokenRevoked,

    #[error("Session store unavailable")]
    StoreUnavailable,

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AuthError {
    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            AuthError::AuthenticationFailed => "AUTHENTICATION_FAILED",
            AuthError::NoSessionFound => "NO_SESSION_FOUND",
            AuthError::TokenMalformed => "TOKEN_MALFORMED",
            AuthError::TokenExpired => "TOKEN_EXPIRED",
            AuthError::TokenMismatch => "TOKEN_MISMATCH",
            AuthError::TokenRevoked => "TOKEN_REVOKED",
            AuthError::StoreUnavailable => "STORE_UNAVAILABLE",
            AuthError::InvalidInput(_) => "INVALID_INPUT",
            AuthError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Only store outages are worth retrying, with backoff
    pub fn is_retryable(&self) -> bool {
        matches!(self, AuthError::StoreUnavailable)
    }
}

impl From<TokenError> for AuthError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Malformed => AuthError::TokenMalformed,
            TokenError::Expired => AuthError::TokenExpired,
            _ => AuthError::Internal(err.to_string()),
        }
    }
}

impl From<SessionStoreError> for AuthError {
    fn from(err: SessionStoreError) -> Self {
        match err {
            SessionStoreError::NoSessionFound => AuthError::NoSessionFound,
            SessionStoreError::InvalidTtl => AuthError::Internal(err.to_string()),
            _ => {
                tracing::error!("Session store failure: {err}");
                AuthError::StoreUnavailable
            }
        }
    }
}

impl From<CredentialError> for AuthError {
    fn from(err: CredentialError) -> Self {
        match err {
            CredentialError::NotFound => AuthError::AuthenticationFailed,
            _ => {
                tracing::error!("Account directory failure: {err}");
                AuthError::StoreUnavailable
            }
        }
    }
}

impl From<PasswordError> for AuthError {
    fn from(err: PasswordError) -> Self {
        match err {
            PasswordError::Mismatch => AuthError::AuthenticationFailed,
            PasswordError::InvalidHash => {
                tracing::error!("Stored password hash could not be parsed");
                AuthError::AuthenticationFailed
            }
            PasswordError::Hashing(_) => AuthError::Internal(err.to_string()),
        }
    }
}

/// Authentication service
#[derive(Clone)]
pub struct AuthService {
    credentials: Arc<dyn CredentialDirectory>,
    verifier: PasswordVerifier,
    issuer: TokenIssuer,
    store: SessionStore,
    validator: SessionValidator,
}

impl AuthService {
    pub fn new(
        credentials: Arc<dyn CredentialDirectory>,
        issuer: TokenIssuer,
        store: SessionStore,
    ) -> Self {
        let validator = SessionValidator::new(issuer.clone(), store.clone());
        Self {
            credentials,
            verifier: PasswordVerifier::default(),
            issuer,
            store,
            validator,
        }
    }

    /// Replace the password verifier
    pub fn with_password_verifier(mut self, verifier: PasswordVerifier) -> Self {
        self.verifier = verifier;
        self
    }

    /// Authenticate and open a session for `device_id`.
    ///
    /// A login for an (email, device) pair that already has a session
    /// replaces it, so the older refresh token stops validating.
    pub async fn login(
        &self,
        email: &str,
        password: &str,
        device_id: &str,
    ) -> Result<TokenPair, AuthError> {
        require("email", email)?;
        require("password", password)?;
        require("device_id", device_id)?;

        let credential = tokio::time::timeout(
            self.store.op_timeout(),
            self.credentials.get_credentials(email),
        )
        .await
        .map_err(|_| {
            tracing::error!("Account directory timed out");
            AuthError::StoreUnavailable
        })?
        .inspect_err(|e| {
            if matches!(e, CredentialError::NotFound) {
                tracing::info!(account_id = %email, "Login rejected: unknown account");
            }
        })?;

        let verifier = self.verifier;
        let password = password.to_owned();
        let hash = credential.password_hash.clone();
        tokio::task::spawn_blocking(move || verifier.verify(&password, &hash))
            .await
            .map_err(|e| AuthError::Internal(e.to_string()))?
            .inspect_err(|_| {
                tracing::info!(account_id = %email, "Login rejected: wrong password");
            })?;

        let tokens = self
            .issuer
            .issue_pair(&credential.email, &credential.role, device_id)?;

        self.store
            .save(
                &credential.email,
                device_id,
                &tokens.refresh_token,
                self.issuer.refresh_ttl(),
            )
            .await?;

        tracing::info!(account_id = %credential.email, %device_id, "User logged in");
        Ok(tokens)
    }

    /// Exchange a live refresh token for a new access token
    pub async fn validate_refresh_token(&self, refresh_token: &str) -> Result<IssuedToken, AuthError> {
        self.validator.validate(refresh_token).await
    }

    /// Revoke the session a refresh token belongs to.
    ///
    /// Logging out of a session that is already revoked, or gone, still
    /// succeeds.
    pub async fn logout(&self, refresh_token: &str) -> Result<String, AuthError> {
        let claims = self.issuer.parse(refresh_token, TokenKind::Refresh)?;

        let revoked = self
            .store
            .revoke(claims.account_id(), &claims.device_id)
            .await?;

        if revoked {
            tracing::info!(account_id = %claims.sub, device_id = %claims.device_id, "User logged out");
        } else {
            tracing::debug!(account_id = %claims.sub, device_id = %claims.device_id, "Logout without a session");
        }

        Ok(LOGOUT_MESSAGE.to_string())
    }
}

fn require(field: &str, value: &str) -> Result<(), AuthError> {
    if value.trim().is_empty() {
        return Err(AuthError::InvalidInput(format!("{field} is required")));
    }
    Ok(())
}
