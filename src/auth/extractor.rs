// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Axum extractor for authenticated users.
//!
//! ```rust,ignore
//! async fn my_handler(Auth(user): Auth) -> impl IntoResponse {
//!     // user.caller_id is the only identity handlers may use
//! }
//! ```

use axum::{extract::FromRequestParts, http::request::Parts};

use super::{middleware::authenticate, AuthError, SessionUser};
use crate::state::AppState;

/// Extractor for the authenticated caller.
///
/// Reuses the user placed in the request extensions by
/// [`super::middleware::require_session`]; on routes mounted without the
/// middleware it performs the same session lookup itself.
pub struct Auth(pub SessionUser);

impl FromRequestParts<AppState> for Auth {
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        if let Some(user) = parts.extensions.get::<SessionUser>().cloned() {
            return Ok(Auth(user));
        }

        let user = authenticate(state, &parts.headers).await?;
        parts.extensions.insert(user.clone());
        Ok(Auth(user))
    }
}
