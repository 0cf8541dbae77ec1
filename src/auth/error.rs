// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Session gate errors.

use axum::{
    http::{header::LOCATION, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Outcome of a session gate that did not admit the request.
#[derive(Debug)]
pub enum AuthError {
    /// No session, no user, or an expired session. Resolved by redirecting
    /// to the sign-in entry point.
    Unauthenticated { sign_in_path: String },
    /// The identity provider could not answer the session lookup.
    IdentityUnavailable,
    /// The user reference mirror could not be written.
    Storage,
}

#[derive(Serialize)]
struct AuthErrorBody {
    error: String,
    error_code: String,
}

impl AuthError {
    pub fn unauthenticated(sign_in_path: impl Into<String>) -> Self {
        AuthError::Unauthenticated {
            sign_in_path: sign_in_path.into(),
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            AuthError::Unauthenticated { .. } => "unauthenticated",
            AuthError::IdentityUnavailable => "identity_unavailable",
            AuthError::Storage => "storage_error",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthError::Unauthenticated { .. } => StatusCode::FOUND,
            AuthError::IdentityUnavailable | AuthError::Storage => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthError::Unauthenticated { .. } => write!(f, "Authentication required"),
            AuthError::IdentityUnavailable => write!(f, "Session lookup failed"),
            AuthError::Storage => write!(f, "Internal server error"),
        }
    }
}

impl std::error::Error for AuthError {}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        match self {
            AuthError::Unauthenticated { sign_in_path } => {
                (status, [(LOCATION, sign_in_path)]).into_response()
            }
            other => {
                let body = Json(AuthErrorBody {
                    error: other.to_string(),
                    error_code: other.error_code().to_string(),
                });
                (status, body).into_response()
            }
        }
    }
}
