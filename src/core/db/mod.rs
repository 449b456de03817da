//! Database module for sessionward
//!
//! Connectivity, models and repositories for the durable session records
//! (PostgreSQL via SQLx).

pub mod models;
pub mod pool;
pub mod repositories;

// Re-export commonly used items
pub use models::*;
pub use pool::{DbConfig, DbError, create_pool, create_pool_with_migrations, health_check};
pub use repositories::{
    CredentialDirectory, CredentialError, MemoryCredentialDirectory, MemorySessionRecords,
    PgCredentialDirectory, PgSessionRecords, RecordStoreError, SessionRecords, hash_token,
};

pub use sqlx::PgPool;
