// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Sign-up, log-in and logout.
//!
//! These delegate entirely to the identity provider and relay its
//! `Set-Cookie` headers; this service never sees password hashes or
//! session secrets.

use axum::{
    extract::State,
    http::{
        header::{LOCATION, SET_COOKIE},
        HeaderMap, HeaderValue, StatusCode,
    },
    response::{IntoResponse, Response},
    Form,
};
use serde::Deserialize;
use tracing::{error, info, warn};
use utoipa::ToSchema;

use crate::auth::{IdentityError, IdentityUser, SignInRequest, SignUpRequest};
use crate::error::ApiError;
use crate::state::AppState;
use crate::storage::run_blocking;

const HOME_PATH: &str = "/";

#[derive(Debug, Deserialize, ToSchema)]
pub struct SignUpForm {
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct LogInForm {
    pub email: String,
    pub password: String,
}

fn map_identity_error(error: IdentityError) -> ApiError {
    match error {
        IdentityError::Rejected { message, .. } => {
            ApiError::bad_request(message).with_code("identity_rejected")
        }
        IdentityError::Unavailable(_) | IdentityError::InvalidResponse(_) => {
            error!(error = %error, "Identity provider call failed");
            ApiError::bad_gateway("Identity provider unavailable")
        }
    }
}

/// 302 to `location`, carrying the identity provider's cookies.
fn redirect_with_cookies(location: &str, cookies: Vec<HeaderValue>) -> Response {
    let mut headers = HeaderMap::new();
    if let Ok(value) = HeaderValue::from_str(location) {
        headers.insert(LOCATION, value);
    }
    for cookie in cookies {
        headers.append(SET_COOKIE, cookie);
    }
    (StatusCode::FOUND, headers).into_response()
}

async fn mirror_user(state: &AppState, user: &IdentityUser) -> Result<(), ApiError> {
    let store = state.store.clone();
    let user = user.clone();
    let id = user.id.clone();
    run_blocking("users.upsert", move || {
        store.upsert_user(&user.id, user.name.as_deref(), user.email.as_deref())
    })
    .await
    .map_err(|e| {
        error!(user_id = %id, error = %e, "Failed to mirror user");
        ApiError::internal("Failed to register user")
    })?;
    Ok(())
}

/// Create an account, then sign in with the same credentials.
#[utoipa::path(
    post,
    path = "/sign-up",
    tag = "Session",
    request_body(content = SignUpForm, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 302, description = "Signed up and signed in; redirected home"),
        (status = 400, description = "Rejected by the identity provider"),
        (status = 502, description = "Identity provider unavailable")
    )
)]
pub async fn sign_up(
    State(state): State<AppState>,
    Form(form): Form<SignUpForm>,
) -> Result<Response, ApiError> {
    let signed_up = state
        .identity
        .sign_up(&SignUpRequest {
            name: form.name,
            email: form.email.clone(),
            password: form.password.clone(),
        })
        .await
        .map_err(map_identity_error)?;
    if let Some(user) = &signed_up.user {
        mirror_user(&state, user).await?;
        info!(user_id = %user.id, "User signed up");
    }

    let signed_in = state
        .identity
        .sign_in(&SignInRequest {
            email: form.email,
            password: form.password,
        })
        .await
        .map_err(map_identity_error)?;
    if signed_up.user.is_none() {
        if let Some(user) = &signed_in.user {
            mirror_user(&state, user).await?;
        }
    }

    let cookies = if signed_in.set_cookies.is_empty() {
        signed_up.set_cookies
    } else {
        signed_in.set_cookies
    };
    Ok(redirect_with_cookies(HOME_PATH, cookies))
}

#[utoipa::path(
    post,
    path = "/log-in",
    tag = "Session",
    request_body(content = LogInForm, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 302, description = "Signed in; redirected home"),
        (status = 400, description = "Rejected by the identity provider"),
        (status = 502, description = "Identity provider unavailable")
    )
)]
pub async fn log_in(
    State(state): State<AppState>,
    Form(form): Form<LogInForm>,
) -> Result<Response, ApiError> {
    let signed_in = state
        .identity
        .sign_in(&SignInRequest {
            email: form.email,
            password: form.password,
        })
        .await
        .map_err(map_identity_error)?;
    if let Some(user) = &signed_in.user {
        info!(user_id = %user.id, "User logged in");
    }
    Ok(redirect_with_cookies(HOME_PATH, signed_in.set_cookies))
}

#[utoipa::path(
    post,
    path = "/logout",
    tag = "Session",
    responses(
        (status = 302, description = "Signed out; redirected to sign-in"),
        (status = 502, description = "Identity provider unavailable")
    )
)]
pub async fn logout(State(state): State<AppState>, headers: HeaderMap) -> Result<Response, ApiError> {
    let signed_out = state.identity.sign_out(&headers).await.map_err(|e| {
        warn!(error = %e, "Sign-out failed");
        map_identity_error(e)
    })?;
    Ok(redirect_with_cookies(&state.sign_in_path, signed_out.set_cookies))
}
