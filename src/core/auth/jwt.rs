//! Token issuing and verification
//!
//! Access and refresh tokens share one claim shape but are signed with
//! separate HMAC secrets and carry separate expiries. A token is accepted only
//! by the key of its own kind, and only when its `token_type` claim agrees.
//! Access tokens default to 5 minutes, refresh tokens to 24 hours.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::parse::parse_duration;

/// Default access token lifetime (5 minutes)
pub const DEFAULT_ACCESS_TOKEN_TTL_MINUTES: i64 = 5;

/// Default refresh token lifetime (24 hours)
pub const DEFAULT_REFRESH_TOKEN_TTL_HOURS: i64 = 24;

const DEFAULT_ISSUER: &str = "sessionward";

/// Accepted signature algorithms. Anything outside the HMAC family is rejected.
const ACCEPTED_ALGORITHMS: [Algorithm; 3] = [Algorithm::HS256, Algorithm::HS384, Algorithm::HS512];

/// Token signing configuration
#[derive(Clone)]
pub struct TokenConfig {
    /// Secret for access tokens
    pub access_secret: String,
    /// Secret for refresh tokens
    pub refresh_secret: String,
    /// Access token lifetime. Zero means the default.
    pub access_ttl: Duration,
    /// Refresh token lifetime. Zero means the default.
    pub refresh_ttl: Duration,
    /// `iss` claim written and required on every token
    pub issuer: String,
}

impl fmt::Debug for TokenConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenConfig")
            .field("access_secret", &"<redacted>")
            .field("refresh_secret", &"<redacted>")
            .field("access_ttl", &self.access_ttl)
            .field("refresh_ttl", &self.refresh_ttl)
            .field("issuer", &self.issuer)
            .finish()
    }
}

impl TokenConfig {
    /// Create a configuration with default lifetimes
    pub fn new(access_secret: impl Into<String>, refresh_secret: impl Into<String>) -> Self {
        Self {
            access_secret: access_secret.into(),
            refresh_secret: refresh_secret.into(),
            access_ttl: Duration::minutes(DEFAULT_ACCESS_TOKEN_TTL_MINUTES),
            refresh_ttl: Duration::hours(DEFAULT_REFRESH_TOKEN_TTL_HOURS),
            issuer: DEFAULT_ISSUER.to_string(),
        }
    }

    /// Load from `JWT_ACCESS_TOKEN_SECRET`, `JWT_REFRESH_TOKEN_SECRET`,
    /// `ACCESS_TOKEN_TTL`, `REFRESH_TOKEN_TTL` and `JWT_ISSUER`.
    pub fn from_env() -> Result<Self, TokenError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`TokenConfig::from_env`] with a custom variable source
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, TokenError> {
        let required = |name: &'static str| {
            lookup(name)
                .filter(|value| !value.is_empty())
                .ok_or(TokenError::MissingSecret(name))
        };
        let access_secret = required("JWT_ACCESS_TOKEN_SECRET")?;
        let refresh_secret = required("JWT_REFRESH_TOKEN_SECRET")?;
        if access_secret == refresh_secret {
            return Err(TokenError::SharedSecret);
        }

        let defaults = Self::new(String::new(), String::new());
        let ttl = |name: &'static str, default: Duration| match lookup(name) {
            Some(raw) => parse_duration(&raw)
                .filter(|ttl| !ttl.is_zero())
                .and_then(|ttl| Duration::from_std(ttl).ok())
                .ok_or(TokenError::InvalidTtl { name, value: raw }),
            None => Ok(default),
        };

        Ok(Self {
            access_secret,
            refresh_secret,
            access_ttl: ttl("ACCESS_TOKEN_TTL", defaults.access_ttl)?,
            refresh_ttl: ttl("REFRESH_TOKEN_TTL", defaults.refresh_ttl)?,
            issuer: lookup("JWT_ISSUER").unwrap_or(defaults.issuer),
        })
    }

    /// Set access token lifetime
    pub fn access_ttl(mut self, ttl: Duration) -> Self {
        self.access_ttl = ttl;
        self
    }

    /// Set refresh token lifetime
    pub fn refresh_ttl(mut self, ttl: Duration) -> Self {
        self.refresh_ttl = ttl;
        self
    }

    /// Set issuer
    pub fn issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = issuer.into();
        self
    }
}

/// Token errors
#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("{0} environment variable not set")]
    MissingSecret(&'static str),

    #[error("Access and refresh tokens must be signed with different secrets")]
    SharedSecret,

    #[error("Invalid token lifetime for {name}: {value:?}")]
    InvalidTtl { name: &'static str, value: String },

    #[error("Token encoding failed: {0}")]
    Encoding(String),

    #[error("Malformed token")]
    Malformed,

    #[error("Token expired")]
    Expired,
}

impl From<jsonwebtoken::errors::Error> for TokenError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;

        match err.kind() {
            ErrorKind::ExpiredSignature => TokenError::Expired,
            _ => TokenError::Malformed,
        }
    }
}

/// Token kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Access => write!(f, "access"),
            TokenKind::Refresh => write!(f, "refresh"),
        }
    }
}

/// Claim set carried by both token kinds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Account identifier (email)
    pub sub: String,
    /// Account role
    pub role: String,
    /// Device the session is bound to
    pub device_id: String,
    pub token_type: TokenKind,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    pub iss: String,
    /// Unique per token, so two tokens minted in the same second still differ
    pub jti: String,
}

impl Claims {
    pub fn account_id(&self) -> &str {
        &self.sub
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.exp, 0).unwrap_or(DateTime::<Utc>::MIN_UTC)
    }
}

/// A freshly signed token and when it stops being valid
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuedToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// Token pair (access + refresh)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub access_expires_at: DateTime<Utc>,
    pub refresh_expires_at: DateTime<Utc>,
    /// Always "Bearer"
    pub token_type: String,
}

#[derive(Clone)]
struct SigningKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl SigningKeys {
    fn from_secret(secret: &str) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
        }
    }
}

/// Signs and verifies access and refresh tokens
#[derive(Clone)]
pub struct TokenIssuer {
    access: SigningKeys,
    refresh: SigningKeys,
    access_ttl: Duration,
    refresh_ttl: Duration,
    issuer: String,
}

impl TokenIssuer {
    pub fn new(config: TokenConfig) -> Self {
        let access_ttl = if config.access_ttl.is_zero() {
            Duration::minutes(DEFAULT_ACCESS_TOKEN_TTL_MINUTES)
        } else {
            config.access_ttl
        };
        let refresh_ttl = if config.refresh_ttl.is_zero() {
            Duration::hours(DEFAULT_REFRESH_TOKEN_TTL_HOURS)
        } else {
            config.refresh_ttl
        };

        Self {
            access: SigningKeys::from_secret(&config.access_secret),
            refresh: SigningKeys::from_secret(&config.refresh_secret),
            access_ttl,
            refresh_ttl,
            issuer: config.issuer,
        }
    }

    pub fn from_env() -> Result<Self, TokenError> {
        Ok(Self::new(TokenConfig::from_env()?))
    }

    pub fn access_ttl(&self) -> Duration {
        self.access_ttl
    }

    pub fn refresh_ttl(&self) -> Duration {
        self.refresh_ttl
    }

    /// Sign a short-lived access token
    pub fn issue_access(
        &self,
        account_id: &str,
        role: &str,
        device_id: &str,
    ) -> Result<IssuedToken, TokenError> {
        self.issue(TokenKind::Access, account_id, role, device_id)
    }

    /// Sign a long-lived refresh token
    pub fn issue_refresh(
        &self,
        account_id: &str,
        role: &str,
        device_id: &str,
    ) -> Result<IssuedToken, TokenError> {
        self.issue(TokenKind::Refresh, account_id, role, device_id)
    }

    pub fn issue_pair(
        &self,
        account_id: &str,
        role: &str,
        device_id: &str,
    ) -> Result<TokenPair, TokenError> {
        let access = self.issue_access(account_id, role, device_id)?;
        let refresh = self.issue_refresh(account_id, role, device_id)?;

        Ok(TokenPair {
            access_token: access.token,
            refresh_token: refresh.token,
            access_expires_at: access.expires_at,
            refresh_expires_at: refresh.expires_at,
            token_type: "Bearer".to_string(),
        })
    }

    /// Verify a token of the given kind and return its claims.
    ///
    /// Fails with [`TokenError::Malformed`] on an unexpected algorithm, a bad
    /// signature or a kind mismatch, and [`TokenError::Expired`] once `exp`
    /// has passed.
    pub fn parse(&self, token: &str, kind: TokenKind) -> Result<Claims, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.algorithms = ACCEPTED_ALGORITHMS.to_vec();
        validation.set_issuer(&[&self.issuer]);
        validation.set_required_spec_claims(&["exp", "iss"]);
        validation.leeway = 0;

        let token_data = decode::<Claims>(token, &self.keys(kind).decoding, &validation)?;

        if token_data.claims.token_type != kind {
            return Err(TokenError::Malformed);
        }

        Ok(token_data.claims)
    }

    fn keys(&self, kind: TokenKind) -> &SigningKeys {
        match kind {
            TokenKind::Access => &self.access,
            TokenKind::Refresh => &self.refresh,
        }
    }

    fn issue(
        &self,
        kind: TokenKind,
        account_id: &str,
        role: &str,
        device_id: &str,
    ) -> Result<IssuedToken, TokenError> {
        let ttl = match kind {
            TokenKind::Access => self.access_ttl,
            TokenKind::Refresh => self.refresh_ttl,
        };
        let now = Utc::now();
        let expires_at = now + ttl;

        let claims = Claims {
            sub: account_id.to_string(),
            role: role.to_string(),
            device_id: device_id.to_string(),
            token_type: kind,
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
            iss: self.issuer.clone(),
            jti: Uuid::new_v4().to_string(),
        };

        let token = encode(&Header::default(), &claims, &self.keys(kind).encoding)
            .map_err(|e| TokenError::Encoding(e.to_string()))?;

        Ok(IssuedToken { token, expires_at })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_issuer() -> TokenIssuer {
        TokenIssuer::new(TokenConfig::new(
            "access_secret_for_tests_only_32_bytes",
            "refresh_secret_for_tests_only_32_bytes",
        ))
    }

    // ========================================================================
    // TokenConfig Tests
    // ========================================================================

    #[test]
    fn test_token_config_new() {
        let config = TokenConfig::new("a", "r");

        assert_eq!(config.access_secret, "a");
        assert_eq!(config.refresh_secret, "r");
        assert_eq!(config.access_ttl, Duration::minutes(5));
        assert_eq!(config.refresh_ttl, Duration::hours(24));
        assert_eq!(config.issuer, "sessionward");
    }

    #[test]
    fn test_token_config_builder() {
        let config = TokenConfig::new("a", "r")
            .access_ttl(Duration::minutes(1))
            .refresh_ttl(Duration::hours(2))
            .issuer("gateway");

        assert_eq!(config.access_ttl, Duration::minutes(1));
        assert_eq!(config.refresh_ttl, Duration::hours(2));
        assert_eq!(config.issuer, "gateway");
    }

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: std::collections::HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_token_config_from_lookup() {
        let config = TokenConfig::from_lookup(lookup(&[
            ("JWT_ACCESS_TOKEN_SECRET", "access"),
            ("JWT_REFRESH_TOKEN_SECRET", "refresh"),
            ("ACCESS_TOKEN_TTL", "10m"),
            ("REFRESH_TOKEN_TTL", "48h"),
            ("JWT_ISSUER", "edge"),
        ]))
        .unwrap();

        assert_eq!(config.access_secret, "access");
        assert_eq!(config.refresh_secret, "refresh");
        assert_eq!(config.access_ttl, Duration::minutes(10));
        assert_eq!(config.refresh_ttl, Duration::hours(48));
        assert_eq!(config.issuer, "edge");
    }

    #[test]
    fn test_token_config_from_lookup_defaults() {
        let config = TokenConfig::from_lookup(lookup(&[
            ("JWT_ACCESS_TOKEN_SECRET", "access"),
            ("JWT_REFRESH_TOKEN_SECRET", "refresh"),
        ]))
        .unwrap();

        assert_eq!(config.access_ttl, Duration::minutes(5));
        assert_eq!(config.refresh_ttl, Duration::hours(24));
        assert_eq!(config.issuer, "sessionward");
    }

    #[test]
    fn test_token_config_rejects_bad_ttls() {
        let cases = [
            ("ACCESS_TOKEN_TTL", "soon"),
            ("REFRESH_TOKEN_TTL", "7d"),
            ("REFRESH_TOKEN_TTL", "0s"),
        ];

        for (name, value) in cases {
            let result = TokenConfig::from_lookup(lookup(&[
                ("JWT_ACCESS_TOKEN_SECRET", "access"),
                ("JWT_REFRESH_TOKEN_SECRET", "refresh"),
                (name, value),
            ]));

            match result {
                Err(TokenError::InvalidTtl { name: got, value: raw }) => {
                    assert_eq!(got, name);
                    assert_eq!(raw, value);
                }
                other => panic!("{name}={value:?} accepted: {other:?}"),
            }
        }
    }

    #[test]
    fn test_token_config_requires_both_secrets() {
        let result = TokenConfig::from_lookup(lookup(&[("JWT_ACCESS_TOKEN_SECRET", "access")]));
        assert!(matches!(
            result,
            Err(TokenError::MissingSecret("JWT_REFRESH_TOKEN_SECRET"))
        ));

        let result = TokenConfig::from_lookup(lookup(&[
            ("JWT_ACCESS_TOKEN_SECRET", ""),
            ("JWT_REFRESH_TOKEN_SECRET", "refresh"),
        ]));
        assert!(matches!(
            result,
            Err(TokenError::MissingSecret("JWT_ACCESS_TOKEN_SECRET"))
        ));
    }

    #[test]
    fn test_token_config_rejects_shared_secret() {
        let result = TokenConfig::from_lookup(lookup(&[
            ("JWT_ACCESS_TOKEN_SECRET", "same"),
            ("JWT_REFRESH_TOKEN_SECRET", "same"),
        ]));
        assert!(matches!(result, Err(TokenError::SharedSecret)));
    }

    #[test]
    fn test_token_config_debug_redacts_secrets() {
        let config = TokenConfig::new("super-access", "super-refresh");
        let debug = format!("{:?}", config);

        assert!(!debug.contains("super-access"));
        assert!(!debug.contains("super-refresh"));
        assert!(debug.contains("<redacted>"));
    }

    #[test]
    fn test_zero_ttl_falls_back_to_defaults() {
        let issuer = TokenIssuer::new(
            TokenConfig::new("a", "r")
                .access_ttl(Duration::zero())
                .refresh_ttl(Duration::zero()),
        );

        assert_eq!(issuer.access_ttl(), Duration::minutes(5));
        assert_eq!(issuer.refresh_ttl(), Duration::hours(24));
    }

    // ========================================================================
    // Issue / Parse Tests
    // ========================================================================

    #[test]
    fn test_issue_and_parse_access_token() {
        let issuer = create_test_issuer();

        let issued = issuer.issue_access("a@x.com", "customer", "dev-1").unwrap();
        let claims = issuer.parse(&issued.token, TokenKind::Access).unwrap();

        assert_eq!(claims.account_id(), "a@x.com");
        assert_eq!(claims.role, "customer");
        assert_eq!(claims.device_id, "dev-1");
        assert_eq!(claims.token_type, TokenKind::Access);
        assert_eq!(claims.iss, "sessionward");
        assert_eq!(claims.expires_at().timestamp(), issued.expires_at.timestamp());
        assert!(issued.expires_at > Utc::now());
    }

    #[test]
    fn test_issue_pair() {
        let issuer = create_test_issuer();

        let pair = issuer.issue_pair("a@x.com", "admin", "dev-1").unwrap();

        assert_ne!(pair.access_token, pair.refresh_token);
        assert_eq!(pair.token_type, "Bearer");
        assert!(pair.refresh_expires_at > pair.access_expires_at);

        let refresh = issuer.parse(&pair.refresh_token, TokenKind::Refresh).unwrap();
        assert_eq!(refresh.role, "admin");
        assert_eq!(refresh.token_type, TokenKind::Refresh);
    }

    #[test]
    fn test_tokens_issued_back_to_back_differ() {
        let issuer = create_test_issuer();

        let first = issuer.issue_access("a@x.com", "customer", "dev-1").unwrap();
        let second = issuer.issue_access("a@x.com", "customer", "dev-1").unwrap();

        assert_ne!(first.token, second.token);
    }

    #[test]
    fn test_refresh_token_rejected_as_access() {
        let issuer = create_test_issuer();

        let refresh = issuer.issue_refresh("a@x.com", "customer", "dev-1").unwrap();
        let result = issuer.parse(&refresh.token, TokenKind::Access);

        assert!(matches!(result, Err(TokenError::Malformed)));
    }

    #[test]
    fn test_access_token_rejected_as_refresh() {
        let issuer = create_test_issuer();

        let access = issuer.issue_access("a@x.com", "customer", "dev-1").unwrap();
        let result = issuer.parse(&access.token, TokenKind::Refresh);

        assert!(matches!(result, Err(TokenError::Malformed)));
    }

    #[test]
    fn test_kind_checked_even_with_shared_secret() {
        let issuer = TokenIssuer::new(TokenConfig::new("same", "same"));

        let access = issuer.issue_access("a@x.com", "customer", "dev-1").unwrap();
        let result = issuer.parse(&access.token, TokenKind::Refresh);

        assert!(matches!(result, Err(TokenError::Malformed)));
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let issuer_one = TokenIssuer::new(TokenConfig::new("one-a", "one-r"));
        let issuer_two = TokenIssuer::new(TokenConfig::new("two-a", "two-r"));

        let token = issuer_one.issue_refresh("a@x.com", "customer", "dev-1").unwrap();
        let result = issuer_two.parse(&token.token, TokenKind::Refresh);

        assert!(matches!(result, Err(TokenError::Malformed)));
    }

    #[test]
    fn test_wrong_issuer_rejected() {
        let ours = create_test_issuer();
        let theirs = TokenIssuer::new(
            TokenConfig::new(
                "access_secret_for_tests_only_32_bytes",
                "refresh_secret_for_tests_only_32_bytes",
            )
            .issuer("someone-else"),
        );

        let token = theirs.issue_refresh("a@x.com", "customer", "dev-1").unwrap();
        let result = ours.parse(&token.token, TokenKind::Refresh);

        assert!(matches!(result, Err(TokenError::Malformed)));
    }

    #[test]
    fn test_garbage_rejected_as_malformed() {
        let issuer = create_test_issuer();

        for garbage in ["", "not-a-token", "a.b.c", "invalid.token.here"] {
            let result = issuer.parse(garbage, TokenKind::Refresh);
            assert!(
                matches!(result, Err(TokenError::Malformed)),
                "expected Malformed for {garbage:?}, got {result:?}"
            );
        }
    }

    #[test]
    fn test_non_hmac_algorithm_rejected() {
        let issuer = create_test_issuer();

        // {"alg":"none","typ":"JWT"} header with an empty signature
        let token = "eyJhbGciOiJub25lIiwidHlwIjoiSldUIn0.\
                     eyJzdWIiOiJhQHguY29tIiwiZXhwIjo0MTAyNDQ0ODAwfQ.";
        let result = issuer.parse(token, TokenKind::Refresh);

        assert!(matches!(result, Err(TokenError::Malformed)));
    }

    #[test]
    fn test_expired_token() {
        let issuer = TokenIssuer::new(
            TokenConfig::new("a", "r").refresh_ttl(Duration::minutes(-1)),
        );

        let token = issuer.issue_refresh("a@x.com", "customer", "dev-1").unwrap();
        let result = issuer.parse(&token.token, TokenKind::Refresh);

        assert!(
            matches!(result, Err(TokenError::Expired)),
            "Expected Expired error, got: {:?}",
            result
        );
    }

    #[test]
    fn test_forged_expired_token_is_malformed_not_expired() {
        let issuer = create_test_issuer();
        let forger = TokenIssuer::new(
            TokenConfig::new("x", "y").refresh_ttl(Duration::minutes(-1)),
        );

        let token = forger.issue_refresh("a@x.com", "customer", "dev-1").unwrap();
        let result = issuer.parse(&token.token, TokenKind::Refresh);

        assert!(matches!(result, Err(TokenError::Malformed)));
    }

    // ========================================================================
    // Error / Kind Tests
    // ========================================================================

    #[test]
    fn test_token_kind_display_and_serde() {
        assert_eq!(TokenKind::Access.to_string(), "access");
        assert_eq!(TokenKind::Refresh.to_string(), "refresh");
        assert_eq!(serde_json::to_string(&TokenKind::Refresh).unwrap(), r#""refresh""#);
    }

    #[test]
    fn test_token_error_display() {
        assert_eq!(
            TokenError::MissingSecret("JWT_ACCESS_TOKEN_SECRET").to_string(),
            "JWT_ACCESS_TOKEN_SECRET environment variable not set"
        );
        assert_eq!(TokenError::Expired.to_string(), "Token expired");
        assert_eq!(TokenError::Malformed.to_string(), "Malformed token");
    }
}
