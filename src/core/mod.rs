//! Credential and session lifecycle core
//!
//! Login, refresh-token validation and logout on top of a cache-aside
//! session store.

pub mod auth;
pub mod cache;
pub mod config;
pub mod db;
pub mod parse;
pub mod session_store;

pub use session_store::{SessionStore, SessionStoreError, session_key};
