// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Authenticated landing view.

use axum::{extract::State, Json};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::error;
use utoipa::ToSchema;

use crate::auth::Auth;
use crate::error::ApiError;
use crate::state::AppState;
use crate::storage::run_blocking;

/// Data behind the authenticated landing page.
#[derive(Debug, Serialize, ToSchema)]
pub struct LandingResponse {
    pub user_id: String,
    pub name: Option<String>,
    pub email: Option<String>,
    /// When this service first saw the user.
    pub registered_at: Option<DateTime<Utc>>,
    /// Number of linked institutions.
    pub linked_accounts: usize,
}

#[utoipa::path(
    get,
    path = "/",
    tag = "Session",
    responses(
        (status = 200, description = "Authenticated landing view", body = LandingResponse),
        (status = 302, description = "No session; redirected to sign-in")
    )
)]
pub async fn landing(
    Auth(user): Auth,
    State(state): State<AppState>,
) -> Result<Json<LandingResponse>, ApiError> {
    let store = state.store.clone();
    let caller = user.caller_id.clone();
    let (record, linked_accounts) = run_blocking("users.landing", move || {
        let record = store.get_user(caller.as_str())?;
        let count = store.count_by_user(&caller)?;
        Ok((record, count))
    })
    .await
    .map_err(|e| {
        error!(user_id = %user.caller_id, error = %e, "Failed to load landing view");
        ApiError::internal("Failed to load landing view")
    })?;

    Ok(Json(LandingResponse {
        user_id: user.caller_id.to_string(),
        name: user.name,
        email: user.email,
        registered_at: record.map(|r| r.registered_at),
        linked_accounts,
    }))
}
