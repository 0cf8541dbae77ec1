// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Linked institutions of the caller.

use axum::{extract::State, Json};
use serde::Serialize;
use tracing::error;
use utoipa::ToSchema;

use crate::auth::Auth;
use crate::error::ApiError;
use crate::state::AppState;
use crate::storage::{run_blocking, LinkedAccount};

#[derive(Debug, Serialize, ToSchema)]
pub struct LinkedAccountsResponse {
    pub linked_accounts: Vec<LinkedAccount>,
    pub total: usize,
}

/// Institutions the caller has linked, oldest first. Credentials are never included.
#[utoipa::path(
    get,
    path = "/linked-accounts",
    tag = "Linking",
    responses(
        (status = 200, description = "Linked institutions", body = LinkedAccountsResponse),
        (status = 302, description = "No session; redirected to sign-in")
    )
)]
pub async fn list_linked_accounts(
    Auth(user): Auth,
    State(state): State<AppState>,
) -> Result<Json<LinkedAccountsResponse>, ApiError> {
    let store = state.store.clone();
    let caller = user.caller_id.clone();
    let linked_accounts = run_blocking("linked_accounts.list", move || store.list_by_user(&caller))
        .await
        .map_err(|e| {
            error!(user_id = %user.caller_id, error = %e, "Failed to list linked accounts");
            ApiError::internal("Failed to list linked accounts")
        })?;

    Ok(Json(LinkedAccountsResponse {
        total: linked_accounts.len(),
        linked_accounts,
    }))
}
