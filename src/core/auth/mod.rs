//! Authentication module for sessionward
//!
//! This module provides:
//! - Password verification against bcrypt hashes
//! - Access/refresh token issuing and verification
//! - Refresh token validation against the session store
//! - Login, refresh and logout operations and their REST endpoints

pub mod api;
pub mod jwt;
pub mod password;
pub mod service;
pub mod validator;

pub use api::{AuthApiState, auth_api_router};
pub use jwt::{Claims, IssuedToken, TokenConfig, TokenError, TokenIssuer, TokenKind, TokenPair};
pub use password::{PasswordError, PasswordVerifier};
pub use service::{AuthError, AuthService, LOGOUT_MESSAGE};
pub use validator::SessionValidator;
