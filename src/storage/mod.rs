// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Persistent Storage
//!
//! Linked institutions are stored in an embedded redb database (pure Rust,
//! ACID) under `DATA_DIR`.
//!
//! ## Storage Layout
//!
//! ```text
//! $DATA_DIR/
//!   linked_accounts.redb
//!     meta                 # schema_version
//!     users                # user reference mirror
//!     linked_accounts      # linked account rows (no credential)
//!     credentials          # linked_account_id -> provider access token
//!     user_account_index   # (user, created_at, id) -> linked_account_id
//! ```
//!
//! ## Important Notes
//!
//! - redb calls are blocking; async code goes through [`run_blocking`]
//! - Credentials live in their own table and never leave through
//!   [`LinkedAccountStore::list_by_user`]
//! - Error messages never include credential values

pub mod accounts;
pub mod migrations;
pub mod paths;

pub use accounts::{LinkedAccount, LinkedAccountStore, LinkedCredential, NewLinkedAccount, UserRecord};
pub use migrations::{ensure_schema, SCHEMA_VERSION};
pub use paths::StoragePaths;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("redb error: {0}")]
    Redb(#[from] redb::Error),

    #[error("redb database error: {0}")]
    RedbDatabase(#[from] redb::DatabaseError),

    #[error("redb transaction error: {0}")]
    RedbTransaction(#[from] redb::TransactionError),

    #[error("redb table error: {0}")]
    RedbTable(#[from] redb::TableError),

    #[error("redb storage error: {0}")]
    RedbStorage(#[from] redb::StorageError),

    #[error("redb commit error: {0}")]
    RedbCommit(#[from] redb::CommitError),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("unknown user: {0}")]
    UnknownUser(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("database schema version {found} is newer than supported version {supported}")]
    SchemaTooNew { found: u32, supported: u32 },

    #[error("corrupt record: {0}")]
    Corrupt(String),

    #[error("storage task failed: {0}")]
    Task(String),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Run a blocking storage call on the blocking thread pool.
///
/// Join failures are mapped to [`StorageError::Task`] without forwarding the
/// panic payload.
pub async fn run_blocking<T, F>(label: &'static str, f: F) -> StorageResult<T>
where
    T: Send + 'static,
    F: FnOnce() -> StorageResult<T> + Send + 'static,
{
    match tokio::task::spawn_blocking(f).await {
        Ok(result) => result,
        Err(err) if err.is_panic() => {
            tracing::error!(label, "blocking storage task panicked");
            Err(StorageError::Task(format!("{label}: task panicked")))
        }
        Err(_) => {
            tracing::warn!(label, "blocking storage task cancelled");
            Err(StorageError::Task(format!("{label}: task cancelled")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn run_blocking_returns_closure_result() {
        let value = run_blocking("test.ok", || Ok(41 + 1)).await.unwrap();
        assert_eq!(value, 42);

        let err = run_blocking::<(), _>("test.err", || {
            Err(StorageError::UnknownUser("u-1".to_string()))
        })
        .await
        .unwrap_err();
        assert!(matches!(err, StorageError::UnknownUser(_)));
    }

    #[tokio::test]
    async fn run_blocking_maps_panics() {
        let err = run_blocking::<(), _>("test.panic", || panic!("boom"))
            .await
            .unwrap_err();
        match err {
            StorageError::Task(message) => {
                assert_eq!(message, "test.panic: task panicked");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
