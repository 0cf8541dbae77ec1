// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Session gate middleware.
//!
//! Mounted on the protected router subtree with
//! `axum::middleware::from_fn_with_state(state, require_session)`. Requests
//! without a live session are redirected before any handler runs.

use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::{IntoResponse, Response},
};
use chrono::Utc;
use tracing::{debug, error};

use super::{AuthError, SessionUser};
use crate::state::AppState;
use crate::storage::run_blocking;

/// Authentication middleware function.
pub async fn require_session(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    match authenticate(&state, request.headers()).await {
        Ok(user) => {
            request.extensions_mut().insert(user);
            next.run(request).await
        }
        Err(e) => e.into_response(),
    }
}

/// Resolve and admit the caller of a request.
pub(crate) async fn authenticate(state: &AppState, headers: &HeaderMap) -> Result<SessionUser, AuthError> {
    let session = state.identity.get_session(headers).await.map_err(|e| {
        error!(error = %e, "Session lookup failed");
        AuthError::IdentityUnavailable
    })?;

    let Some(user) = session else {
        debug!("Request has no session");
        return Err(AuthError::unauthenticated(state.sign_in_path.as_ref()));
    };

    if user.is_expired(Utc::now()) {
        debug!(user_id = %user.caller_id, "Session expired");
        return Err(AuthError::unauthenticated(state.sign_in_path.as_ref()));
    }

    let store = state.store.clone();
    let (id, name, email) = (
        user.caller_id.as_str().to_string(),
        user.name.clone(),
        user.email.clone(),
    );
    let created = run_blocking("users.ensure", move || {
        store.ensure_user(&id, name.as_deref(), email.as_deref())
    })
    .await
    .map_err(|e| {
        error!(user_id = %user.caller_id, error = %e, "Failed to mirror user");
        AuthError::Storage
    })?;
    if created {
        debug!(user_id = %user.caller_id, "Mirrored user on first authenticated request");
    }

    Ok(user)
}
