// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Balance aggregation across every linked institution of a user.

use std::sync::Arc;

use serde::Serialize;
use tokio::{sync::Semaphore, task::JoinSet};
use tracing::{info, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::CallerId;
use crate::config::{BalanceFailurePolicy, BalanceSettings};
use crate::providers::{LinkProvider, ProviderAccount, ProviderError};
use crate::storage::{run_blocking, LinkedAccount, LinkedAccountStore, StorageError};

/// One provider account, tagged with the linked institution it came from.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct BalanceRecord {
    #[serde(flatten)]
    pub account: ProviderAccount,
    pub linked_account_id: Uuid,
    pub institution_id: Option<String>,
    pub institution_name: Option<String>,
}

/// An institution whose balances could not be fetched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct InstitutionFailure {
    pub linked_account_id: Uuid,
    pub institution_id: Option<String>,
    pub institution_name: Option<String>,
    pub error_code: Option<String>,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct BalanceReport {
    pub accounts: Vec<BalanceRecord>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<InstitutionFailure>,
}

#[derive(Debug, thiserror::Error)]
pub enum BalanceError {
    #[error("No linked accounts found for user")]
    NoLinkedAccounts,

    #[error("balance request for linked account {linked_account_id} failed: {source}")]
    Upstream {
        linked_account_id: Uuid,
        source: ProviderError,
    },

    #[error("balance requests failed for all {} linked institutions", .0.len())]
    AllInstitutionsFailed(Vec<InstitutionFailure>),

    #[error("failed to read linked accounts: {0}")]
    Storage(#[from] StorageError),

    #[error("balance task failed: {0}")]
    Task(String),
}

/// Client-facing text for a failed institution; provider detail stays in the logs.
const UNAVAILABLE_MESSAGE: &str = "Balances for this institution are temporarily unavailable";

type FetchOutcome = (usize, LinkedAccount, Result<Vec<ProviderAccount>, ProviderError>);

#[derive(Clone)]
pub struct BalanceAggregator {
    provider: Arc<dyn LinkProvider>,
    store: LinkedAccountStore,
    settings: BalanceSettings,
}

impl BalanceAggregator {
    pub fn new(provider: Arc<dyn LinkProvider>, store: LinkedAccountStore, settings: BalanceSettings) -> Self {
        Self {
            provider,
            store,
            settings,
        }
    }

    /// Fetch and flatten balances of every institution `caller` has linked.
    ///
    /// Institutions are queried concurrently. The report lists accounts in
    /// linked-account creation order, then provider order.
    pub async fn get_balances(&self, caller: &CallerId) -> Result<BalanceReport, BalanceError> {
        let store = self.store.clone();
        let owner = caller.clone();
        let credentials = run_blocking("linked_accounts.list_credentials", move || {
            store.list_credentials_by_user(&owner)
        })
        .await?;

        if credentials.is_empty() {
            return Err(BalanceError::NoLinkedAccounts);
        }

        let total = credentials.len();
        let permits = Arc::new(Semaphore::new(self.settings.max_concurrency.max(1)));
        let mut tasks: JoinSet<FetchOutcome> = JoinSet::new();
        for (position, credential) in credentials.into_iter().enumerate() {
            let provider = self.provider.clone();
            let permits = permits.clone();
            tasks.spawn(async move {
                let _permit = permits.acquire_owned().await.ok();
                let result = provider.get_balances(&credential.access_token).await;
                (position, credential.account, result)
            });
        }

        let mut slots: Vec<Option<(LinkedAccount, Result<Vec<ProviderAccount>, ProviderError>)>> =
            (0..total).map(|_| None).collect();
        while let Some(joined) = tasks.join_next().await {
            let (position, account, result) = joined.map_err(|e| {
                tracing::error!(user_id = %caller, error = %e, "Balance task failed");
                BalanceError::Task(if e.is_panic() { "task panicked" } else { "task cancelled" }.to_string())
            })?;

            if let Err(e) = &result {
                warn!(
                    user_id = %caller,
                    linked_account_id = %account.id,
                    institution_id = account.institution_id.as_deref().unwrap_or(""),
                    error_code = e.error_code().unwrap_or(""),
                    "Balance request failed"
                );
            }
            if self.settings.failure_policy == BalanceFailurePolicy::FailFast {
                if let Err(source) = result {
                    tasks.abort_all();
                    return Err(BalanceError::Upstream {
                        linked_account_id: account.id,
                        source,
                    });
                }
            }
            slots[position] = Some((account, result));
        }

        let mut accounts = Vec::new();
        let mut failures = Vec::new();
        for (linked, result) in slots.into_iter().flatten() {
            match result {
                Ok(provider_accounts) => {
                    accounts.extend(provider_accounts.into_iter().map(|account| BalanceRecord {
                        account,
                        linked_account_id: linked.id,
                        institution_id: linked.institution_id.clone(),
                        institution_name: linked.institution_name.clone(),
                    }));
                }
                Err(e) => failures.push(InstitutionFailure {
                    linked_account_id: linked.id,
                    institution_id: linked.institution_id,
                    institution_name: linked.institution_name,
                    error_code: e.error_code().map(str::to_string),
                    message: UNAVAILABLE_MESSAGE.to_string(),
                }),
            }
        }

        if failures.len() == total {
            return Err(BalanceError::AllInstitutionsFailed(failures));
        }

        info!(
            user_id = %caller,
            institutions = total,
            accounts = accounts.len(),
            failed_institutions = failures.len(),
            "Aggregated balances"
        );
        Ok(BalanceReport { accounts, failures })
    }
}
