//! sessionward - credential and session lifecycle service
//!
//! Authenticates passwords, issues short-lived access tokens and long-lived
//! refresh tokens, and tracks one refresh session per (account, device) in a
//! fast cache backed by PostgreSQL.

pub mod core;
