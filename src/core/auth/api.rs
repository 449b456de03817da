//! Auth API endpoints
//!
//! - POST /api/auth/login - Login and get tokens
//! - POST /api/auth/refresh - Exchange a refresh token for a new access token
//! - POST /api/auth/logout - Revoke the refresh token's session
//! - GET /health - Liveness and database reachability
//!
//! Refresh and logout read the refresh token from the `refresh-token` header,
//! then the `refresh-token` cookie, then a JSON body `{"refresh_token": ...}`.

use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{AppendHeaders, IntoResponse, Response},
    routing::{get, post},
};
use axum_extra::extract::CookieJar;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::sync::Arc;

use crate::core::auth::{AuthError, AuthService, IssuedToken, TokenPair};
use crate::core::db::health_check;

/// Header and cookie carrying the refresh token
pub const REFRESH_TOKEN_NAME: &str = "refresh-token";

/// Cookie carrying the access token
pub const ACCESS_TOKEN_NAME: &str = "access-token";

/// Auth API state
#[derive(Clone)]
pub struct AuthApiState {
    pub auth_service: AuthService,
    /// Add `Secure` to issued cookies
    pub cookie_secure: bool,
    /// Pool probed by `/health`; none means there is nothing to probe
    pub db: Option<PgPool>,
}

impl AuthApiState {
    pub fn new(auth_service: AuthService) -> Self {
        Self {
            auth_service,
            cookie_secure: true,
            db: None,
        }
    }

    pub fn cookie_secure(mut self, secure: bool) -> Self {
        self.cookie_secure = secure;
        self
    }

    pub fn with_db(mut self, pool: PgPool) -> Self {
        self.db = Some(pool);
        self
    }
}

/// API error response
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiError {
    pub success: bool,
    pub message: String,
    pub status_code: u16,
    pub code: String,
}

impl AuthError {
    /// HTTP status for this error kind
    pub fn status(&self) -> StatusCode {
        match self {
            AuthError::AuthenticationFailed
            | AuthError::NoSessionFound
            | AuthError::TokenMalformed
            | AuthError::TokenExpired
            | AuthError::TokenMismatch
            | AuthError::TokenRevoked => StatusCode::UNAUTHORIZED,
            AuthError::StoreUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            AuthError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            AuthError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Convert AuthError to API response
impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            AuthError::Internal(detail) => {
                tracing::error!("Internal auth error: {detail}");
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };

        let body = ApiError {
            success: false,
            message,
            status_code: status.as_u16(),
            code: self.code().to_string(),
        };

        let mut response = (status, Json(body)).into_response();
        if self.is_retryable() {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from_static("1"));
        }
        response
    }
}

/// Operation-specific part of a successful response
#[derive(Debug, Serialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum ApiPayload {
    Login(TokenPair),
    Refresh(IssuedToken),
    Logout,
}

/// Successful response envelope
#[derive(Debug, Serialize)]
pub struct ApiResponse {
    pub success: bool,
    pub message: String,
    pub status_code: u16,
    #[serde(flatten)]
    pub payload: ApiPayload,
}

impl ApiResponse {
    pub fn ok(message: impl Into<String>, payload: ApiPayload) -> Self {
        Self {
            success: true,
            message: message.into(),
            status_code: StatusCode::OK.as_u16(),
            payload,
        }
    }
}

/// Login request
#[derive(Debug, Clone, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
    pub device_id: String,
}

/// Refresh token carried in a JSON body
#[derive(Debug, Clone, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// Create the auth API router
pub fn auth_api_router(state: AuthApiState) -> Router {
    let state = Arc::new(state);

    Router::new()
        .route("/api/auth/login", post(login_handler))
        .route("/api/auth/refresh", post(refresh_handler))
        .route("/api/auth/logout", post(logout_handler))
        .route("/health", get(health_handler))
        .with_state(state)
}

/// POST /api/auth/login
async fn login_handler(
    State(state): State<Arc<AuthApiState>>,
    Json(request): Json<LoginRequest>,
) -> Result<Response, AuthError> {
    let tokens = state
        .auth_service
        .login(&request.email, &request.password, &request.device_id)
        .await
        .inspect_err(|e| {
            tracing::warn!(account_id = %request.email, code = e.code(), "Login failed");
        })?;

    let cookies = AppendHeaders([
        (
            header::SET_COOKIE,
            build_cookie(
                ACCESS_TOKEN_NAME,
                &tokens.access_token,
                seconds_until(tokens.access_expires_at),
                state.cookie_secure,
            ),
        ),
        (
            header::SET_COOKIE,
            build_cookie(
                REFRESH_TOKEN_NAME,
                &tokens.refresh_token,
                seconds_until(tokens.refresh_expires_at),
                state.cookie_secure,
            ),
        ),
    ]);
    let body = ApiResponse::ok("login successful", ApiPayload::Login(tokens));

    Ok((cookies, Json(body)).into_response())
}

/// POST /api/auth/refresh
async fn refresh_handler(
    State(state): State<Arc<AuthApiState>>,
    headers: HeaderMap,
    jar: CookieJar,
    body: Bytes,
) -> Result<Response, AuthError> {
    let refresh_token = extract_refresh_token(&headers, &jar, &body)?;

    let access = state
        .auth_service
        .validate_refresh_token(&refresh_token)
        .await
        .inspect_err(|e| tracing::warn!(code = e.code(), "Refresh failed"))?;

    let cookie = AppendHeaders([(
        header::SET_COOKIE,
        build_cookie(
            ACCESS_TOKEN_NAME,
            &access.token,
            seconds_until(access.expires_at),
            state.cookie_secure,
        ),
    )]);
    let body = ApiResponse::ok("token refreshed", ApiPayload::Refresh(access));

    Ok((cookie, Json(body)).into_response())
}

/// POST /api/auth/logout
async fn logout_handler(
    State(state): State<Arc<AuthApiState>>,
    headers: HeaderMap,
    jar: CookieJar,
    body: Bytes,
) -> Result<Response, AuthError> {
    let refresh_token = extract_refresh_token(&headers, &jar, &body)?;

    let message = state
        .auth_service
        .logout(&refresh_token)
        .await
        .inspect_err(|e| tracing::warn!(code = e.code(), "Logout failed"))?;

    let cookies = AppendHeaders([
        (
            header::SET_COOKIE,
            build_cookie(ACCESS_TOKEN_NAME, "", 0, state.cookie_secure),
        ),
        (
            header::SET_COOKIE,
            build_cookie(REFRESH_TOKEN_NAME, "", 0, state.cookie_secure),
        ),
    ]);

    Ok((cookies, Json(ApiResponse::ok(message, ApiPayload::Logout))).into_response())
}

/// GET /health
async fn health_handler(State(state): State<Arc<AuthApiState>>) -> Response {
    if let Some(pool) = &state.db {
        if let Err(e) = health_check(pool).await {
            tracing::error!("Health check failed: {e}");
            return (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(serde_json::json!({ "status": "unavailable" })),
            )
                .into_response();
        }
    }

    Json(serde_json::json!({ "status": "ok" })).into_response()
}

/// Refresh token from header, cookie or JSON body, in that order
fn extract_refresh_token(
    headers: &HeaderMap,
    jar: &CookieJar,
    body: &[u8],
) -> Result<String, AuthError> {
    if let Some(token) = headers
        .get(REFRESH_TOKEN_NAME)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
    {
        return Ok(token.to_string());
    }

    if let Some(cookie) = jar.get(REFRESH_TOKEN_NAME).filter(|c| !c.value().is_empty()) {
        return Ok(cookie.value().to_string());
    }

    if !body.iter().all(u8::is_ascii_whitespace) {
        let request: RefreshRequest = serde_json::from_slice(body)
            .map_err(|_| AuthError::InvalidInput("invalid request body".to_string()))?;
        if !request.refresh_token.is_empty() {
            return Ok(request.refresh_token);
        }
    }

    Err(AuthError::InvalidInput("refresh token is required".to_string()))
}

/// `Set-Cookie` value for an HTTP-only, same-site cookie
fn build_cookie(name: &str, value: &str, max_age_secs: i64, secure: bool) -> String {
    let secure = if secure { "; Secure" } else { "" };
    format!("{name}={value}; Path=/; Max-Age={max_age_secs}; HttpOnly{secure}; SameSite=Strict")
}

fn seconds_until(at: DateTime<Utc>) -> i64 {
    (at - Utc::now()).num_seconds().max(0)
}
