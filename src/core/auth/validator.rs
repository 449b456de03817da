//! Refresh token validation
//!
//! Checks a presented refresh token against the stored session for its
//! (account, device) pair and, when every check passes, mints a new access
//! token. The refresh token itself is not rotated. The first failing check
//! ends the call.

use chrono::Utc;
use subtle::ConstantTimeEq;

use crate::core::auth::jwt::{IssuedToken, TokenIssuer, TokenKind};
use crate::core::auth::service::AuthError;
use crate::core::db::repositories::hash_token;
use crate::core::session_store::SessionStore;

/// Validates refresh tokens against the session store
#[derive(Clone)]
pub struct SessionValidator {
    issuer: TokenIssuer,
    store: SessionStore,
}

impl SessionValidator {
    pub fn new(issuer: TokenIssuer, store: SessionStore) -> Self {
        Self { issuer, store }
    }

    /// Validate `refresh_token` and issue a fresh access token for its subject
    pub async fn validate(&self, refresh_token: &str) -> Result<IssuedToken, AuthError> {
        let claims = self.issuer.parse(refresh_token, TokenKind::Refresh)?;
        let account_id = claims.account_id();
        let device_id = claims.device_id.as_str();

        let session = self.store.get(account_id, device_id).await?;

        // The stored expiry wins over the token's own `exp`
        if session.is_expired_at(Utc::now()) {
            tracing::debug!(%account_id, %device_id, "Refresh rejected: session expired");
            return Err(AuthError::TokenExpired);
        }

        if session.token_hash.is_empty() {
            return Err(AuthError::NoSessionFound);
        }

        let presented = hash_token(refresh_token);
        if !bool::from(presented.as_bytes().ct_eq(session.token_hash.as_bytes())) {
            tracing::warn!(%account_id, %device_id, "Refresh rejected: superseded token");
            return Err(AuthError::TokenMismatch);
        }

        if session.revoked {
            tracing::warn!(%account_id, %device_id, "Refresh rejected: session revoked");
            return Err(AuthError::TokenRevoked);
        }

        let access = self
            .issuer
            .issue_access(account_id, &claims.role, device_id)?;

        tracing::debug!(%account_id, %device_id, "Access token reissued");
        Ok(access)
    }
}
