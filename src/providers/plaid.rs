// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Plaid API client.
//!
//! Request bodies carry access tokens, so they are never logged. Only the
//! endpoint path and Plaid's `request_id` make it into traces.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::{json, Value};
use tracing::debug;
use url::Url;

use super::{
    AccessToken, Institution, ItemMetadata, LinkProvider, LinkToken, LinkTokenRequest,
    ProviderAccount, ProviderError, ProviderResult, TokenExchange,
};
use crate::config::{PlaidConfig, Secret};

const CLIENT_ID_HEADER: &str = "PLAID-CLIENT-ID";
const SECRET_HEADER: &str = "PLAID-SECRET";

#[derive(Debug, Clone)]
pub struct PlaidClient {
    base_url: Url,
    client_id: String,
    secret: Secret,
    http: Client,
}

#[derive(Debug, Deserialize)]
struct PlaidErrorBody {
    #[serde(default)]
    error_type: String,
    #[serde(default)]
    error_code: String,
    #[serde(default)]
    error_message: String,
}

#[derive(Debug, Deserialize)]
struct LinkTokenCreateResponse {
    link_token: String,
    #[serde(default)]
    expiration: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct PublicTokenExchangeResponse {
    access_token: String,
    item_id: String,
}

#[derive(Debug, Deserialize)]
struct ItemGetResponse {
    item: ItemBody,
}

#[derive(Debug, Deserialize)]
struct ItemBody {
    item_id: String,
    #[serde(default)]
    institution_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct InstitutionGetResponse {
    institution: InstitutionBody,
}

#[derive(Debug, Deserialize)]
struct InstitutionBody {
    institution_id: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct AccountsBalanceResponse {
    accounts: Vec<ProviderAccount>,
}

impl PlaidClient {
    pub fn new(config: &PlaidConfig, timeout: Duration) -> ProviderResult<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::Request(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            base_url: config.base_url.clone(),
            client_id: config.client_id.clone(),
            secret: config.secret.clone(),
            http,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url.as_str().trim_end_matches('/'), path)
    }

    async fn post_json<T: DeserializeOwned>(&self, path: &str, payload: &Value) -> ProviderResult<T> {
        let response = self
            .http
            .post(self.endpoint(path))
            .header(CLIENT_ID_HEADER, &self.client_id)
            .header(SECRET_HEADER, self.secret.expose())
            .json(payload)
            .send()
            .await
            .map_err(|e| ProviderError::Request(format!("POST {path} failed: {}", e.without_url())))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(api_error(status.as_u16(), &body));
        }

        let body: Value = response.json().await.map_err(|e| {
            ProviderError::InvalidResponse(format!("POST {path} invalid JSON: {}", e.without_url()))
        })?;
        let plaid_request_id = body.get("request_id").and_then(Value::as_str).unwrap_or("");
        debug!(path, plaid_request_id, "Plaid call succeeded");

        serde_json::from_value(body)
            .map_err(|e| ProviderError::InvalidResponse(format!("POST {path} unexpected shape: {e}")))
    }
}

#[async_trait]
impl LinkProvider for PlaidClient {
    async fn create_link_token(&self, request: LinkTokenRequest<'_>) -> ProviderResult<LinkToken> {
        let payload = json!({
            "client_name": request.client_name,
            "language": request.language,
            "country_codes": request.country_codes,
            "products": request.products,
            "user": { "client_user_id": request.client_user_id }
        });

        let response: LinkTokenCreateResponse =
            self.post_json("/link/token/create", &payload).await?;
        if response.link_token.trim().is_empty() {
            return Err(ProviderError::InvalidResponse(
                "link token response did not include link_token".to_string(),
            ));
        }

        Ok(LinkToken {
            link_token: response.link_token,
            expiration: response.expiration,
        })
    }

    async fn exchange_public_token(&self, public_token: &str) -> ProviderResult<TokenExchange> {
        let payload = json!({ "public_token": public_token });
        let response: PublicTokenExchangeResponse = self
            .post_json("/item/public_token/exchange", &payload)
            .await?;

        if response.access_token.trim().is_empty() || response.item_id.trim().is_empty() {
            return Err(ProviderError::InvalidResponse(
                "exchange response did not include access_token and item_id".to_string(),
            ));
        }

        Ok(TokenExchange {
            item_id: response.item_id,
            access_token: AccessToken::new(response.access_token),
        })
    }

    async fn get_item(&self, access_token: &AccessToken) -> ProviderResult<ItemMetadata> {
        let payload = json!({ "access_token": access_token.expose_secret() });
        let response: ItemGetResponse = self.post_json("/item/get", &payload).await?;

        Ok(ItemMetadata {
            item_id: response.item.item_id,
            institution_id: response
                .item
                .institution_id
                .filter(|id| !id.trim().is_empty()),
        })
    }

    async fn get_institution(
        &self,
        institution_id: &str,
        country_codes: &[String],
    ) -> ProviderResult<Institution> {
        let payload = json!({
            "institution_id": institution_id,
            "country_codes": country_codes,
        });
        let response: InstitutionGetResponse =
            self.post_json("/institutions/get_by_id", &payload).await?;

        Ok(Institution {
            institution_id: response.institution.institution_id,
            name: response.institution.name,
        })
    }

    async fn get_balances(&self, access_token: &AccessToken) -> ProviderResult<Vec<ProviderAccount>> {
        let payload = json!({ "access_token": access_token.expose_secret() });
        let response: AccountsBalanceResponse =
            self.post_json("/accounts/balance/get", &payload).await?;
        Ok(response.accounts)
    }

    async fn remove_item(&self, access_token: &AccessToken) -> ProviderResult<()> {
        let payload = json!({ "access_token": access_token.expose_secret() });
        let _: Value = self.post_json("/item/remove", &payload).await?;
        Ok(())
    }
}

/// Decode a Plaid error body; falls back to a generic error for non-JSON bodies.
fn api_error(status: u16, body: &str) -> ProviderError {
    match serde_json::from_str::<PlaidErrorBody>(body) {
        Ok(parsed) if !parsed.error_code.is_empty() => ProviderError::Api {
            status,
            error_type: parsed.error_type,
            error_code: parsed.error_code,
            message: parsed.error_message,
        },
        _ => ProviderError::Api {
            status,
            error_type: "UNKNOWN".to_string(),
            error_code: "UNKNOWN".to_string(),
            message: format!("HTTP {status}"),
        },
    }
}
