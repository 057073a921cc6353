// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Persistent Store
//!
//! Key/value persistence for controller state. The controller treats the
//! store as an external collaborator with a small get/set/remove/clear
//! contract; two backends ship with the crate:
//!
//! - [`MemoryStore`] - process-local, used by tests and ephemeral sessions
//! - [`RedbStore`] - embedded ACID database on disk (pure Rust)
//!
//! ## Key Layout
//!
//! Keys are origin-scoped and version-prefixed, see [`keys`]:
//!
//! ```text
//! version                              # schema marker ("2")
//! @v2/controller/{origin}              # serialized controller record
//! @v2/admin/{address}/{origin}         # admin grant
//! ```
//!
//! ## Important Notes
//!
//! - Every value is written as a single entry, so a record is either fully
//!   present or absent
//! - The store performs no locking of its own; writers are serialized by the
//!   controller's signing lock

pub mod keys;
pub mod memory;
pub mod redb_store;

pub use keys::{SchemaVersion, Selectors, VERSION_KEY};
pub use memory::MemoryStore;
pub use redb_store::RedbStore;

/// Error type for store operations.
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

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Result type for store operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Key/value persistence used by the controller.
///
/// Implementations must make `set` atomic per key: readers observe either
/// the previous value or the new one, never a torn write.
pub trait Store: Send + Sync {
    /// Read the value stored under `key`.
    fn get(&self, key: &str) -> StorageResult<Option<String>>;

    /// Store `value` under `key`, replacing any previous value.
    fn set(&self, key: &str, value: &str) -> StorageResult<()>;

    /// Remove `key`. Removing a missing key is not an error.
    fn remove(&self, key: &str) -> StorageResult<()>;

    /// Remove every entry.
    fn clear(&self) -> StorageResult<()>;

    /// List all keys currently stored.
    fn keys(&self) -> StorageResult<Vec<String>>;

    /// Check if a key is present.
    fn contains(&self, key: &str) -> StorageResult<bool> {
        Ok(self.get(key)?.is_some())
    }

    /// Write-read-delete probe used by the readiness check.
    fn health_check(&self) -> StorageResult<()> {
        const PROBE_KEY: &str = "__health_check";
        self.set(PROBE_KEY, "ok")?;
        let read = self.get(PROBE_KEY)?;
        self.remove(PROBE_KEY)?;
        if read.as_deref() == Some("ok") {
            Ok(())
        } else {
            Err(std::io::Error::other("health check data mismatch").into())
        }
    }
}
