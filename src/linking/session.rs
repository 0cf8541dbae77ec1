// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Link session issuance.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};
use utoipa::ToSchema;

use crate::auth::CallerId;
use crate::config::LinkSettings;
use crate::providers::{LinkProvider, LinkTokenRequest, ProviderError};

/// Ephemeral token that starts the provider's linking UI. Not persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct LinkSession {
    pub link_token: String,
    pub expiration: Option<DateTime<Utc>>,
}

#[derive(Debug, thiserror::Error)]
pub enum LinkSessionError {
    #[error("link token request failed: {0}")]
    Upstream(#[from] ProviderError),
}

#[derive(Clone)]
pub struct LinkSessionManager {
    provider: Arc<dyn LinkProvider>,
    settings: Arc<LinkSettings>,
}

impl LinkSessionManager {
    pub fn new(provider: Arc<dyn LinkProvider>, settings: LinkSettings) -> Self {
        Self {
            provider,
            settings: Arc::new(settings),
        }
    }

    /// Request a fresh link token scoped to `caller`.
    pub async fn create_link_session(&self, caller: &CallerId) -> Result<LinkSession, LinkSessionError> {
        let request = LinkTokenRequest {
            client_user_id: caller.as_str(),
            client_name: &self.settings.client_name,
            products: &self.settings.products,
            country_codes: &self.settings.country_codes,
            language: &self.settings.language,
        };

        let token = self.provider.create_link_token(request).await.map_err(|e| {
            warn!(user_id = %caller, error = %e, "Link token request failed");
            e
        })?;
        info!(user_id = %caller, "Issued link token");

        Ok(LinkSession {
            link_token: token.link_token,
            expiration: token.expiration,
        })
    }
}
