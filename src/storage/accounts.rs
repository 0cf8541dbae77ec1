// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Linked-account store.
//!
//! ## Table Layout
//!
//! - `users`: user_id → serialized UserRecord
//! - `linked_accounts`: linked_account_id → serialized LinkedAccount
//! - `credentials`: linked_account_id → provider access token
//! - `user_account_index`: composite key (user|created_at|id) → linked_account_id

use std::{path::Path, sync::Arc};

use chrono::{DateTime, Utc};
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use super::{migrations::META, StorageError, StorageResult};
use crate::auth::CallerId;
use crate::providers::AccessToken;

// =============================================================================
// Table Definitions
// =============================================================================

/// User reference mirror: user_id → serialized UserRecord (JSON bytes).
pub(crate) const USERS: TableDefinition<&str, &[u8]> = TableDefinition::new("users");

/// Primary table: linked_account_id → serialized LinkedAccount (JSON bytes).
pub(crate) const LINKED_ACCOUNTS: TableDefinition<&str, &[u8]> =
    TableDefinition::new("linked_accounts");

/// Credentials: linked_account_id → access token. Never serialized.
pub(crate) const CREDENTIALS: TableDefinition<&str, &str> = TableDefinition::new("credentials");

/// Index: composite key → linked_account_id.
/// Key format: `len(user)|user|created_at_be|id` for creation-ordered scans.
pub(crate) const USER_ACCOUNT_INDEX: TableDefinition<&[u8], &str> =
    TableDefinition::new("user_account_index");

// =============================================================================
// Records
// =============================================================================

/// A linked institution as seen outside the store. Carries no credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct LinkedAccount {
    pub id: Uuid,
    pub user_id: String,
    /// Provider item identifier
    pub item_id: String,
    pub institution_id: Option<String>,
    pub institution_name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input to [`LinkedAccountStore::insert`].
#[derive(Debug, Clone)]
pub struct NewLinkedAccount {
    pub id: Uuid,
    pub user_id: CallerId,
    pub item_id: String,
    pub access_token: AccessToken,
    pub institution_id: Option<String>,
    pub institution_name: Option<String>,
}

/// A linked account together with its credential. Internal read path only.
#[derive(Debug, Clone)]
pub struct LinkedCredential {
    pub account: LinkedAccount,
    pub access_token: AccessToken,
}

/// Mirror of an identity-provider user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: String,
    pub name: Option<String>,
    pub email: Option<String>,
    pub registered_at: DateTime<Utc>,
}

// =============================================================================
// Index Key Helpers
// =============================================================================

fn make_prefix(user_id: &str) -> Vec<u8> {
    let mut prefix = Vec::with_capacity(4 + user_id.len());
    prefix.extend_from_slice(&(user_id.len() as u32).to_be_bytes());
    prefix.extend_from_slice(user_id.as_bytes());
    prefix
}

/// Build a composite index key.
///
/// The timestamp has its sign bit flipped so that big-endian byte order
/// matches chronological order.
fn make_index_key(user_id: &str, created_at: DateTime<Utc>, id: &Uuid) -> Vec<u8> {
    let mut key = make_prefix(user_id);
    let micros = created_at.timestamp_micros() as u64 ^ (1 << 63);
    key.extend_from_slice(&micros.to_be_bytes());
    key.extend_from_slice(id.as_bytes());
    key
}

// =============================================================================
// LinkedAccountStore
// =============================================================================

#[derive(Clone)]
pub struct LinkedAccountStore {
    db: Arc<Database>,
}

impl LinkedAccountStore {
    /// Open (or create) the database at the given path.
    ///
    /// Tables are created by [`super::ensure_schema`], which must run before
    /// the store is used.
    pub fn open(path: &Path) -> StorageResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = Database::create(path)?;
        Ok(Self { db: Arc::new(db) })
    }

    pub(crate) fn database(&self) -> &Database {
        &self.db
    }

    // =========================================================================
    // Users
    // =========================================================================

    /// Insert or refresh a user mirror row. `registered_at` of an existing
    /// row is preserved.
    pub fn upsert_user(&self, id: &str, name: Option<&str>, email: Option<&str>) -> StorageResult<UserRecord> {
        let write_txn = self.db.begin_write()?;
        let record = {
            let mut users = write_txn.open_table(USERS)?;
            let registered_at = match users.get(id)? {
                Some(existing) => {
                    let existing: UserRecord = serde_json::from_slice(existing.value())?;
                    existing.registered_at
                }
                None => Utc::now(),
            };
            let record = UserRecord {
                id: id.to_string(),
                name: name.map(str::to_string),
                email: email.map(str::to_string),
                registered_at,
            };
            let json = serde_json::to_vec(&record)?;
            users.insert(id, json.as_slice())?;
            record
        };
        write_txn.commit()?;
        Ok(record)
    }

    /// Mirror a user only if it is not mirrored yet. Returns `true` when a
    /// row was created.
    pub fn ensure_user(&self, id: &str, name: Option<&str>, email: Option<&str>) -> StorageResult<bool> {
        if self.user_exists(id)? {
            return Ok(false);
        }

        let write_txn = self.db.begin_write()?;
        let created = {
            let mut users = write_txn.open_table(USERS)?;
            // Re-check inside the write transaction; writers are serialized.
            if users.get(id)?.is_some() {
                false
            } else {
                let record = UserRecord {
                    id: id.to_string(),
                    name: name.map(str::to_string),
                    email: email.map(str::to_string),
                    registered_at: Utc::now(),
                };
                let json = serde_json::to_vec(&record)?;
                users.insert(id, json.as_slice())?;
                true
            }
        };
        write_txn.commit()?;
        Ok(created)
    }

    pub fn user_exists(&self, id: &str) -> StorageResult<bool> {
        let read_txn = self.db.begin_read()?;
        let users = read_txn.open_table(USERS)?;
        Ok(users.get(id)?.is_some())
    }

    pub fn get_user(&self, id: &str) -> StorageResult<Option<UserRecord>> {
        let read_txn = self.db.begin_read()?;
        let users = read_txn.open_table(USERS)?;
        match users.get(id)? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    // =========================================================================
    // Linked accounts
    // =========================================================================

    /// Persist a new linked account, its credential and its index entry in a
    /// single write transaction.
    pub fn insert(&self, new: NewLinkedAccount) -> StorageResult<LinkedAccount> {
        let now = Utc::now();
        let account = LinkedAccount {
            id: new.id,
            user_id: new.user_id.as_str().to_string(),
            item_id: new.item_id,
            institution_id: new.institution_id,
            institution_name: new.institution_name,
            created_at: now,
            updated_at: now,
        };
        let id = account.id.to_string();
        let json = serde_json::to_vec(&account)?;
        let index_key = make_index_key(&account.user_id, account.created_at, &account.id);

        let write_txn = self.db.begin_write()?;
        {
            let users = write_txn.open_table(USERS)?;
            if users.get(account.user_id.as_str())?.is_none() {
                return Err(StorageError::UnknownUser(account.user_id.clone()));
            }

            let mut accounts = write_txn.open_table(LINKED_ACCOUNTS)?;
            if accounts.get(id.as_str())?.is_some() {
                return Err(StorageError::AlreadyExists(format!("Linked account {id}")));
            }
            accounts.insert(id.as_str(), json.as_slice())?;

            let mut credentials = write_txn.open_table(CREDENTIALS)?;
            credentials.insert(id.as_str(), new.access_token.expose_secret())?;

            let mut index = write_txn.open_table(USER_ACCOUNT_INDEX)?;
            index.insert(index_key.as_slice(), id.as_str())?;
        }
        write_txn.commit()?;
        Ok(account)
    }

    /// Linked accounts of a user in creation order. Credentials are not read.
    pub fn list_by_user(&self, user: &CallerId) -> StorageResult<Vec<LinkedAccount>> {
        let read_txn = self.db.begin_read()?;
        let index = read_txn.open_table(USER_ACCOUNT_INDEX)?;
        let accounts = read_txn.open_table(LINKED_ACCOUNTS)?;

        let prefix = make_prefix(user.as_str());
        let mut results = Vec::new();
        for entry in index.range(prefix.as_slice()..)? {
            let (key, value) = entry?;
            if !key.value().starts_with(&prefix) {
                break;
            }
            let account_id = value.value();
            let row = accounts
                .get(account_id)?
                .ok_or_else(|| StorageError::Corrupt(format!("index points at missing account {account_id}")))?;
            results.push(serde_json::from_slice(row.value())?);
        }
        Ok(results)
    }

    /// Linked accounts of a user with their credentials, in creation order.
    pub fn list_credentials_by_user(&self, user: &CallerId) -> StorageResult<Vec<LinkedCredential>> {
        let read_txn = self.db.begin_read()?;
        let index = read_txn.open_table(USER_ACCOUNT_INDEX)?;
        let accounts = read_txn.open_table(LINKED_ACCOUNTS)?;
        let credentials = read_txn.open_table(CREDENTIALS)?;

        let prefix = make_prefix(user.as_str());
        let mut results = Vec::new();
        for entry in index.range(prefix.as_slice()..)? {
            let (key, value) = entry?;
            if !key.value().starts_with(&prefix) {
                break;
            }
            let account_id = value.value();
            let row = accounts
                .get(account_id)?
                .ok_or_else(|| StorageError::Corrupt(format!("index points at missing account {account_id}")))?;
            let token = credentials
                .get(account_id)?
                .ok_or_else(|| StorageError::Corrupt(format!("missing credential for account {account_id}")))?;
            results.push(LinkedCredential {
                account: serde_json::from_slice(row.value())?,
                access_token: AccessToken::new(token.value()),
            });
        }
        Ok(results)
    }

    /// Number of linked accounts a user owns.
    pub fn count_by_user(&self, user: &CallerId) -> StorageResult<usize> {
        let read_txn = self.db.begin_read()?;
        let index = read_txn.open_table(USER_ACCOUNT_INDEX)?;
        let prefix = make_prefix(user.as_str());
        let mut count = 0;
        for entry in index.range(prefix.as_slice()..)? {
            let (key, _) = entry?;
            if !key.value().starts_with(&prefix) {
                break;
            }
            count += 1;
        }
        Ok(count)
    }

    /// Verify the database can serve reads and the schema is in place.
    pub fn health_check(&self) -> StorageResult<()> {
        let read_txn = self.db.begin_read()?;
        let _ = read_txn.open_table(META)?;
        let _ = read_txn.open_table(LINKED_ACCOUNTS)?;
        Ok(())
    }
}
