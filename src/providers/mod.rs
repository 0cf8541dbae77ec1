// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! External institution-linking provider.
//!
//! The rest of the crate talks to the provider only through [`LinkProvider`],
//! so the link and balance flows can be exercised without a network.

pub mod plaid;

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub use plaid::PlaidClient;

/// Durable provider credential for one linked institution.
///
/// Deliberately not `Serialize`; `Debug` and `Display` are redacted.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken(String);

impl AccessToken {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose_secret(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AccessToken(<redacted>)")
    }
}

impl fmt::Display for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("<redacted>")
    }
}

/// Parameters of a link token request.
#[derive(Debug, Clone)]
pub struct LinkTokenRequest<'a> {
    pub client_user_id: &'a str,
    pub client_name: &'a str,
    pub products: &'a [String],
    pub country_codes: &'a [String],
    pub language: &'a str,
}

/// Ephemeral token that starts the provider's linking UI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkToken {
    pub link_token: String,
    pub expiration: Option<DateTime<Utc>>,
}

/// Result of exchanging a public token.
#[derive(Debug, Clone)]
pub struct TokenExchange {
    pub item_id: String,
    pub access_token: AccessToken,
}

/// Item metadata relevant to linking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemMetadata {
    pub item_id: String,
    pub institution_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Institution {
    pub institution_id: String,
    pub name: String,
}

/// Balance figures reported for one account.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, ToSchema)]
pub struct AccountBalances {
    #[serde(default)]
    pub available: Option<f64>,
    #[serde(default)]
    pub current: Option<f64>,
    #[serde(default)]
    pub limit: Option<f64>,
    #[serde(default)]
    pub iso_currency_code: Option<String>,
    #[serde(default)]
    pub unofficial_currency_code: Option<String>,
}

/// One account (sub-account of an item) as returned by the provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ProviderAccount {
    pub account_id: String,
    pub name: String,
    #[serde(default)]
    pub official_name: Option<String>,
    #[serde(default)]
    pub mask: Option<String>,
    #[serde(rename = "type")]
    pub account_type: String,
    #[serde(default)]
    pub subtype: Option<String>,
    pub balances: AccountBalances,
}

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("provider request failed: {0}")]
    Request(String),

    #[error("provider returned {status} ({error_type}/{error_code}): {message}")]
    Api {
        status: u16,
        error_type: String,
        error_code: String,
        message: String,
    },

    #[error("provider response was invalid: {0}")]
    InvalidResponse(String),
}

impl ProviderError {
    /// Provider error code, when the provider supplied one.
    pub fn error_code(&self) -> Option<&str> {
        match self {
            ProviderError::Api { error_code, .. } => Some(error_code),
            _ => None,
        }
    }

    /// Whether the provider rejected a public token as invalid or expired.
    ///
    /// Other `INVALID_INPUT` codes (bad API keys, malformed requests) are
    /// failures of this service, not of the caller's token.
    pub fn is_invalid_public_token(&self) -> bool {
        self.error_code() == Some("INVALID_PUBLIC_TOKEN")
    }
}

pub type ProviderResult<T> = Result<T, ProviderError>;

#[async_trait]
pub trait LinkProvider: Send + Sync {
    async fn create_link_token(&self, request: LinkTokenRequest<'_>) -> ProviderResult<LinkToken>;

    async fn exchange_public_token(&self, public_token: &str) -> ProviderResult<TokenExchange>;

    async fn get_item(&self, access_token: &AccessToken) -> ProviderResult<ItemMetadata>;

    async fn get_institution(
        &self,
        institution_id: &str,
        country_codes: &[String],
    ) -> ProviderResult<Institution>;

    async fn get_balances(&self, access_token: &AccessToken) -> ProviderResult<Vec<ProviderAccount>>;

    async fn remove_item(&self, access_token: &AccessToken) -> ProviderResult<()>;
}
