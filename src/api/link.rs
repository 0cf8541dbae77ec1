// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Link session and public-token exchange endpoints.

use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::error;
use utoipa::ToSchema;

use crate::auth::Auth;
use crate::error::ApiError;
use crate::linking::{LinkError, LinkSession, LinkSessionError};
use crate::state::AppState;
use crate::storage::LinkedAccount;

#[derive(Debug, Deserialize, ToSchema)]
pub struct CompleteLinkRequest {
    /// Public token returned by the linking UI.
    #[serde(default, alias = "publicToken")]
    pub public_token: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CompleteLinkResponse {
    pub success: bool,
    pub linked_account: LinkedAccount,
}

fn map_session_error(error: LinkSessionError) -> ApiError {
    match error {
        LinkSessionError::Upstream(_) => {
            ApiError::bad_gateway("Failed to create link token with the linking provider")
        }
    }
}

fn map_link_error(error: LinkError) -> ApiError {
    match error {
        LinkError::MissingPublicToken => {
            ApiError::bad_request("public_token is required").with_code("public_token_required")
        }
        LinkError::InvalidPublicToken(_) => {
            ApiError::bad_request("public_token is invalid or has expired; restart the link flow")
                .with_code("invalid_public_token")
        }
        LinkError::Upstream(_) => {
            ApiError::bad_gateway("Linking provider request failed; restart the link flow")
        }
        LinkError::UnknownUser(_) | LinkError::Storage(_) => {
            ApiError::internal("Failed to store linked account")
        }
    }
}

/// Issue an ephemeral link token for the caller.
#[utoipa::path(
    get,
    path = "/link-session",
    tag = "Linking",
    responses(
        (status = 200, description = "Link token issued", body = LinkSession),
        (status = 302, description = "No session; redirected to sign-in"),
        (status = 502, description = "Linking provider error")
    )
)]
pub async fn create_link_session(
    Auth(user): Auth,
    State(state): State<AppState>,
) -> Result<Json<LinkSession>, ApiError> {
    let session = state
        .link_sessions
        .create_link_session(&user.caller_id)
        .await
        .map_err(map_session_error)?;
    Ok(Json(session))
}

/// Exchange the public token from the linking UI and record the institution.
#[utoipa::path(
    post,
    path = "/link-session/complete",
    tag = "Linking",
    request_body = CompleteLinkRequest,
    responses(
        (status = 200, description = "Institution linked", body = CompleteLinkResponse),
        (status = 302, description = "No session; redirected to sign-in"),
        (status = 400, description = "Missing or invalid public token"),
        (status = 500, description = "Storage error"),
        (status = 502, description = "Linking provider error")
    )
)]
pub async fn complete_link(
    Auth(user): Auth,
    State(state): State<AppState>,
    body: Result<Json<CompleteLinkRequest>, JsonRejection>,
) -> Result<Json<CompleteLinkResponse>, ApiError> {
    let Json(request) = body.map_err(|e| {
        ApiError::bad_request(format!("Invalid request body: {}", e.body_text())).with_code("invalid_body")
    })?;
    let public_token = request.public_token.unwrap_or_default();

    let linked_account = state
        .exchange
        .complete_link(&user.caller_id, &public_token)
        .await
        .map_err(|e| {
            if matches!(e, LinkError::UnknownUser(_) | LinkError::Storage(_)) {
                error!(user_id = %user.caller_id, error = %e, "Link completion failed");
            }
            map_link_error(e)
        })?;

    Ok(Json(CompleteLinkResponse {
        success: true,
        linked_account,
    }))
}
