// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Public-token exchange.
//!
//! Turns the single-use public token returned by the linking UI into a
//! durable credential and records the linked institution:
//!
//! 1. exchange the public token for an item id and access token
//! 2. read the item to learn its institution id (may be absent)
//! 3. resolve the institution name (best effort)
//! 4. persist the linked account and its credential in one transaction
//!
//! Either every step succeeds and exactly one row is written, or nothing is
//! written. When a later step fails the provider item is removed again.

use std::sync::Arc;

use tracing::{info, warn};
use uuid::Uuid;

use crate::auth::CallerId;
use crate::providers::{AccessToken, LinkProvider, ProviderError};
use crate::storage::{run_blocking, LinkedAccount, LinkedAccountStore, NewLinkedAccount, StorageError};

#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    #[error("public_token is required")]
    MissingPublicToken,

    #[error("public token was rejected: {0}")]
    InvalidPublicToken(ProviderError),

    #[error("linking provider request failed: {0}")]
    Upstream(ProviderError),

    #[error("user {0} is not registered")]
    UnknownUser(String),

    #[error("failed to store linked account: {0}")]
    Storage(StorageError),
}

#[derive(Clone)]
pub struct TokenExchangeCoordinator {
    provider: Arc<dyn LinkProvider>,
    store: LinkedAccountStore,
    country_codes: Arc<[String]>,
}

impl TokenExchangeCoordinator {
    pub fn new(provider: Arc<dyn LinkProvider>, store: LinkedAccountStore, country_codes: Vec<String>) -> Self {
        Self {
            provider,
            store,
            country_codes: country_codes.into(),
        }
    }

    pub async fn complete_link(&self, caller: &CallerId, public_token: &str) -> Result<LinkedAccount, LinkError> {
        let public_token = public_token.trim();
        if public_token.is_empty() {
            return Err(LinkError::MissingPublicToken);
        }

        let exchange = self
            .provider
            .exchange_public_token(public_token)
            .await
            .map_err(|e| {
                warn!(user_id = %caller, error = %e, "Public token exchange failed");
                if e.is_invalid_public_token() {
                    LinkError::InvalidPublicToken(e)
                } else {
                    LinkError::Upstream(e)
                }
            })?;
        let item_id = exchange.item_id;
        let access_token = exchange.access_token;

        let item = match self.provider.get_item(&access_token).await {
            Ok(item) => item,
            Err(e) => {
                warn!(user_id = %caller, item_id = %item_id, error = %e, "Item lookup failed");
                self.discard_item(&item_id, &access_token).await;
                return Err(LinkError::Upstream(e));
            }
        };

        let institution_name = match item.institution_id.as_deref() {
            Some(institution_id) => match self
                .provider
                .get_institution(institution_id, &self.country_codes)
                .await
            {
                Ok(institution) => Some(institution.name),
                Err(e) => {
                    warn!(
                        item_id = %item_id,
                        institution_id,
                        error = %e,
                        "Institution lookup failed, linking without a name"
                    );
                    None
                }
            },
            None => None,
        };

        let new = NewLinkedAccount {
            id: Uuid::new_v4(),
            user_id: caller.clone(),
            item_id: item_id.clone(),
            access_token: access_token.clone(),
            institution_id: item.institution_id,
            institution_name,
        };
        let store = self.store.clone();
        match run_blocking("linked_accounts.insert", move || store.insert(new)).await {
            Ok(account) => {
                info!(
                    user_id = %caller,
                    linked_account_id = %account.id,
                    item_id = %account.item_id,
                    institution_id = account.institution_id.as_deref().unwrap_or(""),
                    "Linked institution"
                );
                Ok(account)
            }
            Err(e) => {
                tracing::error!(user_id = %caller, item_id = %item_id, error = %e, "Failed to persist linked account");
                self.discard_item(&item_id, &access_token).await;
                Err(match e {
                    StorageError::UnknownUser(user) => LinkError::UnknownUser(user),
                    other => LinkError::Storage(other),
                })
            }
        }
    }

    /// Best-effort removal of a provider item that will not be persisted.
    async fn discard_item(&self, item_id: &str, access_token: &AccessToken) {
        match self.provider.remove_item(access_token).await {
            Ok(()) => info!(item_id, "Removed orphaned provider item"),
            Err(e) => warn!(item_id, error = %e, "Failed to remove orphaned provider item"),
        }
    }
}
