// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Identity provider client.
//!
//! Talks to a better-auth compatible service. Passwords and session
//! cryptography stay on that side; this service only forwards credentials,
//! looks sessions up, and relays the provider's `Set-Cookie` headers.

use std::time::Duration;

use async_trait::async_trait;
use axum::http::{
    header::{AUTHORIZATION, COOKIE, SET_COOKIE},
    HeaderMap, HeaderValue, StatusCode,
};
use chrono::{DateTime, Utc};
use reqwest::{Client, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use super::session::{CallerId, SessionUser};

const GET_SESSION_PATH: &str = "/api/auth/get-session";
const SIGN_UP_PATH: &str = "/api/auth/sign-up/email";
const SIGN_IN_PATH: &str = "/api/auth/sign-in/email";
const SIGN_OUT_PATH: &str = "/api/auth/sign-out";

#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    /// The provider refused the request (bad credentials, duplicate email...).
    #[error("identity provider rejected the request ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("identity provider unavailable: {0}")]
    Unavailable(String),

    #[error("identity provider response was invalid: {0}")]
    InvalidResponse(String),
}

#[derive(Debug, Clone, Serialize)]
pub struct SignUpRequest {
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SignInRequest {
    pub email: String,
    pub password: String,
}

/// User as reported by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct IdentityUser {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

/// Outcome of a sign-up, sign-in or sign-out call.
#[derive(Debug, Clone, Default)]
pub struct IdentityResponse {
    pub user: Option<IdentityUser>,
    /// `Set-Cookie` headers to relay to the client unchanged.
    pub set_cookies: Vec<HeaderValue>,
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Resolve the session carried by the request headers.
    ///
    /// `Ok(None)` means "no session". Any failure of the lookup itself is an
    /// error, never a pass-through.
    async fn get_session(&self, headers: &HeaderMap) -> Result<Option<SessionUser>, IdentityError>;

    async fn sign_up(&self, request: &SignUpRequest) -> Result<IdentityResponse, IdentityError>;

    async fn sign_in(&self, request: &SignInRequest) -> Result<IdentityResponse, IdentityError>;

    async fn sign_out(&self, headers: &HeaderMap) -> Result<IdentityResponse, IdentityError>;
}

#[derive(Debug, Deserialize)]
struct SessionEnvelope {
    session: SessionBody,
    user: IdentityUser,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionBody {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct AuthBody {
    #[serde(default)]
    user: Option<IdentityUser>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    code: Option<String>,
}

/// HTTP client for the identity provider.
#[derive(Debug, Clone)]
pub struct HttpIdentityProvider {
    base_url: Url,
    http: Client,
}

impl HttpIdentityProvider {
    pub fn new(base_url: Url, timeout: Duration) -> Result<Self, IdentityError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| IdentityError::Unavailable(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { base_url, http })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url.as_str().trim_end_matches('/'), path)
    }

    async fn send(&self, path: &str, request: RequestBuilder) -> Result<Response, IdentityError> {
        request
            .send()
            .await
            .map_err(|e| IdentityError::Unavailable(format!("{path}: {}", e.without_url())))
    }

    async fn auth_call(&self, path: &str, request: RequestBuilder) -> Result<IdentityResponse, IdentityError> {
        let response = self.send(path, request).await?;
        let status = response.status();
        let set_cookies = collect_set_cookies(response.headers());

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(rejection(status, &body));
        }

        let body = response.text().await.map_err(|e| {
            IdentityError::InvalidResponse(format!("{path}: {}", e.without_url()))
        })?;
        let user = if body.trim().is_empty() {
            None
        } else {
            serde_json::from_str::<AuthBody>(&body)
                .map_err(|e| IdentityError::InvalidResponse(format!("{path}: {e}")))?
                .user
        };

        Ok(IdentityResponse { user, set_cookies })
    }
}

#[async_trait]
impl IdentityProvider for HttpIdentityProvider {
    async fn get_session(&self, headers: &HeaderMap) -> Result<Option<SessionUser>, IdentityError> {
        let request = forward_credentials(self.http.get(self.endpoint(GET_SESSION_PATH)), headers);
        let response = self.send(GET_SESSION_PATH, request).await?;
        let status = response.status();

        if status == StatusCode::UNAUTHORIZED {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(IdentityError::Unavailable(format!(
                "session lookup returned HTTP {}",
                status.as_u16()
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| IdentityError::InvalidResponse(e.without_url().to_string()))?;
        let envelope: Option<SessionEnvelope> = if body.trim().is_empty() {
            None
        } else {
            serde_json::from_str(&body).map_err(|e| IdentityError::InvalidResponse(e.to_string()))?
        };

        let Some(envelope) = envelope else {
            debug!("No session for request");
            return Ok(None);
        };
        if envelope.user.id.trim().is_empty() {
            return Ok(None);
        }

        Ok(Some(SessionUser {
            caller_id: CallerId::new(envelope.user.id),
            name: envelope.user.name,
            email: envelope.user.email,
            session_id: envelope.session.id,
            expires_at: envelope.session.expires_at,
        }))
    }

    async fn sign_up(&self, request: &SignUpRequest) -> Result<IdentityResponse, IdentityError> {
        let builder = self.http.post(self.endpoint(SIGN_UP_PATH)).json(request);
        self.auth_call(SIGN_UP_PATH, builder).await
    }

    async fn sign_in(&self, request: &SignInRequest) -> Result<IdentityResponse, IdentityError> {
        let builder = self.http.post(self.endpoint(SIGN_IN_PATH)).json(request);
        self.auth_call(SIGN_IN_PATH, builder).await
    }

    async fn sign_out(&self, headers: &HeaderMap) -> Result<IdentityResponse, IdentityError> {
        let builder = forward_credentials(self.http.post(self.endpoint(SIGN_OUT_PATH)), headers)
            .json(&serde_json::json!({}));
        self.auth_call(SIGN_OUT_PATH, builder).await
    }
}

/// Copy the caller's session credentials onto an outbound request.
fn forward_credentials(mut request: RequestBuilder, headers: &HeaderMap) -> RequestBuilder {
    for name in [COOKIE, AUTHORIZATION] {
        for value in headers.get_all(&name) {
            request = request.header(&name, value.clone());
        }
    }
    request
}

fn collect_set_cookies(headers: &HeaderMap) -> Vec<HeaderValue> {
    headers.get_all(SET_COOKIE).iter().cloned().collect()
}

fn rejection(status: StatusCode, body: &str) -> IdentityError {
    if status.is_server_error() {
        return IdentityError::Unavailable(format!("HTTP {}", status.as_u16()));
    }
    let message = serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(|b| b.message.or(b.code))
        .unwrap_or_else(|| format!("HTTP {}", status.as_u16()));
    IdentityError::Rejected {
        status: status.as_u16(),
        message,
    }
}
