// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Embedded key/value store backed by redb (pure Rust, ACID).
//!
//! ## Table Layout
//!
//! - `entries`: key → UTF-8 value (controller records, admin grants, schema marker)
//!
//! Each `set` runs in its own write transaction, so a controller record is
//! replaced atomically.

use std::path::Path;

use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};

use super::{StorageResult, Store};

/// Single table holding every controller entry.
const ENTRIES: TableDefinition<&str, &str> = TableDefinition::new("entries");

/// File name of the database inside the data directory.
pub const DB_FILE_NAME: &str = "controller.redb";

/// Durable store.
pub struct RedbStore {
    db: Database,
}

impl RedbStore {
    /// Open (or create) the database at the given path.
    pub fn open(path: &Path) -> StorageResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = Database::create(path)?;

        // Pre-create the table so later read transactions don't fail
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(ENTRIES)?;
        }
        write_txn.commit()?;

        Ok(Self { db })
    }

    /// Open the database file inside a data directory.
    pub fn open_in_dir(dir: &Path) -> StorageResult<Self> {
        Self::open(&dir.join(DB_FILE_NAME))
    }
}

impl Store for RedbStore {
    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(ENTRIES)?;
        Ok(table.get(key)?.map(|value| value.value().to_string()))
    }

    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(ENTRIES)?;
            table.insert(key, value)?;
        }
        write_txn.commit()?;
        Ok(())
    }

    fn remove(&self, key: &str) -> StorageResult<()> {
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(ENTRIES)?;
            table.remove(key)?;
        }
        write_txn.commit()?;
        Ok(())
    }

    fn clear(&self) -> StorageResult<()> {
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(ENTRIES)?;
            table.retain(|_, _| false)?;
        }
        write_txn.commit()?;
        Ok(())
    }

    fn keys(&self) -> StorageResult<Vec<String>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(ENTRIES)?;
        let mut keys = Vec::new();
        for entry in table.iter()? {
            let (key, _) = entry?;
            keys.push(key.value().to_string());
        }
        Ok(keys)
    }
}
