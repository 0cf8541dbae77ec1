// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Schema bootstrap, run once by `main` before the router starts serving.

use redb::{ReadableTable, TableDefinition};

use super::accounts::{CREDENTIALS, LINKED_ACCOUNTS, USERS, USER_ACCOUNT_INDEX};
use super::{LinkedAccountStore, StorageError, StorageResult};

/// Current schema version written to the `meta` table.
pub const SCHEMA_VERSION: u32 = 1;

const SCHEMA_VERSION_KEY: &str = "schema_version";

/// Store metadata: key → value bytes (e.g. "schema_version" → u32 big-endian).
pub(crate) const META: TableDefinition<&str, &[u8]> = TableDefinition::new("meta");

/// Create every table and record the schema version.
///
/// Idempotent. Refuses to touch a database written by a newer schema.
/// Returns the version found before the call (`None` for a fresh database).
pub fn ensure_schema(store: &LinkedAccountStore) -> StorageResult<Option<u32>> {
    let write_txn = store.database().begin_write()?;
    let previous = {
        let mut meta = write_txn.open_table(META)?;
        let previous = match meta.get(SCHEMA_VERSION_KEY)? {
            Some(value) => Some(decode_version(value.value())?),
            None => None,
        };

        if let Some(found) = previous {
            if found > SCHEMA_VERSION {
                return Err(StorageError::SchemaTooNew {
                    found,
                    supported: SCHEMA_VERSION,
                });
            }
        }

        let _ = write_txn.open_table(USERS)?;
        let _ = write_txn.open_table(LINKED_ACCOUNTS)?;
        let _ = write_txn.open_table(CREDENTIALS)?;
        let _ = write_txn.open_table(USER_ACCOUNT_INDEX)?;

        let version = SCHEMA_VERSION.to_be_bytes();
        meta.insert(SCHEMA_VERSION_KEY, version.as_slice())?;
        previous
    };
    write_txn.commit()?;

    match previous {
        None => tracing::info!(schema_version = SCHEMA_VERSION, "Created storage schema"),
        Some(found) if found < SCHEMA_VERSION => tracing::info!(
            from = found,
            to = SCHEMA_VERSION,
            "Upgraded storage schema"
        ),
        Some(_) => tracing::debug!(schema_version = SCHEMA_VERSION, "Storage schema up to date"),
    }
    Ok(previous)
}

fn decode_version(bytes: &[u8]) -> StorageResult<u32> {
    let array: [u8; 4] = bytes
        .try_into()
        .map_err(|_| StorageError::Corrupt(format!("schema version has {} bytes", bytes.len())))?;
    Ok(u32::from_be_bytes(array))
}
