//! Database repositories for sessionward
//!
//! Each repository is a trait with a PostgreSQL implementation and an
//! in-memory one, so callers receive their storage by injection.

pub mod credentials;
pub mod session;

pub use credentials::{
    CredentialDirectory, CredentialError, MemoryCredentialDirectory, PgCredentialDirectory,
};
pub use session::{
    MemorySessionRecords, PgSessionRecords, RecordStoreError, SessionRecords, hash_token,
};
