// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! In-crate fakes for the identity and linking providers, plus HTTP helpers
//! for driving the router with `oneshot`.

use std::collections::HashMap;
use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Arc, Mutex,
};
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{
        header::{CONTENT_TYPE, COOKIE},
        HeaderMap, HeaderValue, Request, StatusCode,
    },
    Router,
};
use chrono::{Duration, Utc};
use tempfile::TempDir;
use tower::ServiceExt;

use crate::auth::{
    CallerId, IdentityError, IdentityProvider, IdentityResponse, IdentityUser, SessionUser,
    SignInRequest, SignUpRequest,
};
use crate::config::{BalanceSettings, LinkSettings};
use crate::providers::{
    AccessToken, AccountBalances, Institution, ItemMetadata, LinkProvider, LinkToken,
    LinkTokenRequest, ProviderAccount, ProviderError, ProviderResult, TokenExchange,
};
use crate::state::AppState;
use crate::storage::{ensure_schema, LinkedAccountStore};

pub const SESSION_COOKIE: &str = "better-auth.session_token";

pub fn session_cookie(token: &str) -> String {
    format!("{SESSION_COOKIE}={token}")
}

pub fn temp_store() -> (TempDir, LinkedAccountStore) {
    let dir = TempDir::new().expect("temp dir");
    let store = LinkedAccountStore::open(&dir.path().join("linked_accounts.redb")).expect("open store");
    ensure_schema(&store).expect("schema");
    (dir, store)
}

pub fn provider_account(account_id: &str) -> ProviderAccount {
    ProviderAccount {
        account_id: account_id.to_string(),
        name: format!("Account {account_id}"),
        official_name: None,
        mask: Some("0000".to_string()),
        account_type: "depository".to_string(),
        subtype: Some("checking".to_string()),
        balances: AccountBalances {
            available: Some(100.0),
            current: Some(110.0),
            limit: None,
            iso_currency_code: Some("USD".to_string()),
            unofficial_currency_code: None,
        },
    }
}

fn api_error(status: u16, error_type: &str, error_code: &str) -> ProviderError {
    ProviderError::Api {
        status,
        error_type: error_type.to_string(),
        error_code: error_code.to_string(),
        message: format!("{error_code} (fake)"),
    }
}

// =============================================================================
// FakeLinkProvider
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedLinkTokenRequest {
    pub client_user_id: String,
    pub client_name: String,
    pub products: Vec<String>,
    pub country_codes: Vec<String>,
    pub language: String,
}

#[derive(Debug, Clone)]
struct FakeItem {
    item_id: String,
    access_token: String,
    institution: Option<(String, String)>,
}

#[derive(Default)]
pub struct FakeLinkProvider {
    link_requests: Mutex<Vec<RecordedLinkTokenRequest>>,
    public_tokens: Mutex<HashMap<String, FakeItem>>,
    balances: Mutex<HashMap<String, Vec<ProviderAccount>>>,
    failing_balances: Mutex<Vec<String>>,
    delayed_balances: Mutex<HashMap<String, StdDuration>>,
    removed: Mutex<Vec<String>>,
    fail_link_tokens: AtomicBool,
    exchange_failure: Mutex<Option<(u16, &'static str, &'static str)>>,
    fail_items: AtomicBool,
    fail_institutions: AtomicBool,
    link_tokens_issued: AtomicUsize,
    exchange_calls: AtomicUsize,
    institution_calls: AtomicUsize,
    balance_calls: AtomicUsize,
    completed_balance_fetches: AtomicUsize,
}

impl FakeLinkProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a public token that exchanges into the given item.
    pub fn add_public_token(
        &self,
        public_token: &str,
        item_id: &str,
        access_token: &str,
        institution: Option<(&str, &str)>,
    ) {
        self.public_tokens.lock().unwrap().insert(
            public_token.to_string(),
            FakeItem {
                item_id: item_id.to_string(),
                access_token: access_token.to_string(),
                institution: institution.map(|(id, name)| (id.to_string(), name.to_string())),
            },
        );
    }

    pub fn set_balances(&self, access_token: &str, accounts: Vec<ProviderAccount>) {
        self.balances
            .lock()
            .unwrap()
            .insert(access_token.to_string(), accounts);
    }

    pub fn fail_balances(&self, access_token: &str) {
        self.failing_balances
            .lock()
            .unwrap()
            .push(access_token.to_string());
    }

    /// Hold balance responses for `access_token` back by `delay`.
    pub fn delay_balances(&self, access_token: &str, delay: StdDuration) {
        self.delayed_balances
            .lock()
            .unwrap()
            .insert(access_token.to_string(), delay);
    }

    pub fn fail_link_tokens(&self) {
        self.fail_link_tokens.store(true, Ordering::SeqCst);
    }

    pub fn fail_exchanges(&self) {
        self.fail_exchanges_with(500, "API_ERROR", "INTERNAL_SERVER_ERROR");
    }

    /// Make every exchange fail with the given Plaid error.
    pub fn fail_exchanges_with(&self, status: u16, error_type: &'static str, error_code: &'static str) {
        *self.exchange_failure.lock().unwrap() = Some((status, error_type, error_code));
    }

    pub fn fail_items(&self) {
        self.fail_items.store(true, Ordering::SeqCst);
    }

    pub fn fail_institutions(&self) {
        self.fail_institutions.store(true, Ordering::SeqCst);
    }

    pub fn link_token_requests(&self) -> Vec<RecordedLinkTokenRequest> {
        self.link_requests.lock().unwrap().clone()
    }

    /// Access tokens of items removed through `remove_item`.
    pub fn removed_items(&self) -> Vec<String> {
        self.removed.lock().unwrap().clone()
    }

    pub fn exchange_calls(&self) -> usize {
        self.exchange_calls.load(Ordering::SeqCst)
    }

    pub fn institution_calls(&self) -> usize {
        self.institution_calls.load(Ordering::SeqCst)
    }

    pub fn balance_calls(&self) -> usize {
        self.balance_calls.load(Ordering::SeqCst)
    }

    /// Balance fetches that ran to a successful response.
    pub fn completed_balance_fetches(&self) -> usize {
        self.completed_balance_fetches.load(Ordering::SeqCst)
    }

    fn item_for(&self, access_token: &AccessToken) -> Option<FakeItem> {
        self.public_tokens
            .lock()
            .unwrap()
            .values()
            .find(|item| item.access_token == access_token.expose_secret())
            .cloned()
    }
}

#[async_trait]
impl LinkProvider for FakeLinkProvider {
    async fn create_link_token(&self, request: LinkTokenRequest<'_>) -> ProviderResult<LinkToken> {
        self.link_requests
            .lock()
            .unwrap()
            .push(RecordedLinkTokenRequest {
                client_user_id: request.client_user_id.to_string(),
                client_name: request.client_name.to_string(),
                products: request.products.to_vec(),
                country_codes: request.country_codes.to_vec(),
                language: request.language.to_string(),
            });
        if self.fail_link_tokens.load(Ordering::SeqCst) {
            return Err(api_error(500, "API_ERROR", "INTERNAL_SERVER_ERROR"));
        }
        let n = self.link_tokens_issued.fetch_add(1, Ordering::SeqCst);
        Ok(LinkToken {
            link_token: format!("link-sandbox-{n}"),
            expiration: Some(Utc::now() + Duration::hours(4)),
        })
    }

    async fn exchange_public_token(&self, public_token: &str) -> ProviderResult<TokenExchange> {
        self.exchange_calls.fetch_add(1, Ordering::SeqCst);
        if let Some((status, error_type, error_code)) = *self.exchange_failure.lock().unwrap() {
            return Err(api_error(status, error_type, error_code));
        }
        let item = self
            .public_tokens
            .lock()
            .unwrap()
            .get(public_token)
            .cloned()
            .ok_or_else(|| api_error(400, "INVALID_INPUT", "INVALID_PUBLIC_TOKEN"))?;
        Ok(TokenExchange {
            item_id: item.item_id,
            access_token: AccessToken::new(item.access_token),
        })
    }

    async fn get_item(&self, access_token: &AccessToken) -> ProviderResult<ItemMetadata> {
        if self.fail_items.load(Ordering::SeqCst) {
            return Err(api_error(500, "API_ERROR", "INTERNAL_SERVER_ERROR"));
        }
        let item = self
            .item_for(access_token)
            .ok_or_else(|| api_error(400, "INVALID_INPUT", "INVALID_ACCESS_TOKEN"))?;
        Ok(ItemMetadata {
            item_id: item.item_id,
            institution_id: item.institution.map(|(id, _)| id),
        })
    }

    async fn get_institution(&self, institution_id: &str, _country_codes: &[String]) -> ProviderResult<Institution> {
        self.institution_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_institutions.load(Ordering::SeqCst) {
            return Err(api_error(400, "INVALID_INPUT", "INVALID_INSTITUTION"));
        }
        let name = self
            .public_tokens
            .lock()
            .unwrap()
            .values()
            .filter_map(|item| item.institution.clone())
            .find(|(id, _)| id == institution_id)
            .map(|(_, name)| name)
            .ok_or_else(|| api_error(400, "INVALID_INPUT", "INVALID_INSTITUTION"))?;
        Ok(Institution {
            institution_id: institution_id.to_string(),
            name,
        })
    }

    async fn get_balances(&self, access_token: &AccessToken) -> ProviderResult<Vec<ProviderAccount>> {
        self.balance_calls.fetch_add(1, Ordering::SeqCst);
        let token = access_token.expose_secret();
        if self.failing_balances.lock().unwrap().iter().any(|t| t == token) {
            return Err(api_error(400, "ITEM_ERROR", "ITEM_LOGIN_REQUIRED"));
        }
        let delay = self.delayed_balances.lock().unwrap().get(token).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let accounts = self
            .balances
            .lock()
            .unwrap()
            .get(token)
            .cloned()
            .unwrap_or_default();
        self.completed_balance_fetches.fetch_add(1, Ordering::SeqCst);
        Ok(accounts)
    }

    async fn remove_item(&self, access_token: &AccessToken) -> ProviderResult<()> {
        self.removed
            .lock()
            .unwrap()
            .push(access_token.expose_secret().to_string());
        Ok(())
    }
}

// =============================================================================
// FakeIdentityProvider
// =============================================================================

#[derive(Debug, Clone)]
struct FakeAccount {
    user: IdentityUser,
    password: String,
}

#[derive(Default)]
pub struct FakeIdentityProvider {
    sessions: Mutex<HashMap<String, SessionUser>>,
    accounts: Mutex<HashMap<String, FakeAccount>>,
    fail_lookups: AtomicBool,
    lookups: AtomicUsize,
    issued: AtomicUsize,
}

impl FakeIdentityProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_session(&self, token: &str, user_id: &str) {
        self.insert_session(token, user_id, Some(Utc::now() + Duration::days(7)));
    }

    pub fn add_expired_session(&self, token: &str, user_id: &str) {
        self.insert_session(token, user_id, Some(Utc::now() - Duration::minutes(1)));
    }

    pub fn fail_lookups(&self) {
        self.fail_lookups.store(true, Ordering::SeqCst);
    }

    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }

    pub fn has_session(&self, token: &str) -> bool {
        self.sessions.lock().unwrap().contains_key(token)
    }

    fn insert_session(&self, token: &str, user_id: &str, expires_at: Option<chrono::DateTime<Utc>>) {
        self.sessions.lock().unwrap().insert(
            token.to_string(),
            SessionUser {
                caller_id: CallerId::new(user_id),
                name: Some(format!("Name of {user_id}")),
                email: Some(format!("{user_id}@example.com")),
                session_id: Some(format!("sess-{token}")),
                expires_at,
            },
        );
    }

    fn token_from(headers: &HeaderMap) -> Option<String> {
        let prefix = format!("{SESSION_COOKIE}=");
        headers
            .get_all(COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .flat_map(|value| value.split(';'))
            .map(str::trim)
            .find_map(|pair| pair.strip_prefix(prefix.as_str()).map(str::to_string))
    }
}

#[async_trait]
impl IdentityProvider for FakeIdentityProvider {
    async fn get_session(&self, headers: &HeaderMap) -> Result<Option<SessionUser>, IdentityError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        if self.fail_lookups.load(Ordering::SeqCst) {
            return Err(IdentityError::Unavailable("fake outage".to_string()));
        }
        let Some(token) = Self::token_from(headers) else {
            return Ok(None);
        };
        Ok(self.sessions.lock().unwrap().get(&token).cloned())
    }

    async fn sign_up(&self, request: &SignUpRequest) -> Result<IdentityResponse, IdentityError> {
        let mut accounts = self.accounts.lock().unwrap();
        if accounts.contains_key(&request.email) {
            return Err(IdentityError::Rejected {
                status: 422,
                message: "User already exists".to_string(),
            });
        }
        let n = self.issued.fetch_add(1, Ordering::SeqCst);
        let user = IdentityUser {
            id: format!("user-{n}"),
            name: Some(request.name.clone()),
            email: Some(request.email.clone()),
        };
        accounts.insert(
            request.email.clone(),
            FakeAccount {
                user: user.clone(),
                password: request.password.clone(),
            },
        );
        Ok(IdentityResponse {
            user: Some(user),
            set_cookies: Vec::new(),
        })
    }

    async fn sign_in(&self, request: &SignInRequest) -> Result<IdentityResponse, IdentityError> {
        let account = self
            .accounts
            .lock()
            .unwrap()
            .get(&request.email)
            .filter(|account| account.password == request.password)
            .cloned()
            .ok_or_else(|| IdentityError::Rejected {
                status: 401,
                message: "Invalid email or password".to_string(),
            })?;

        let token = format!("session-{}", self.issued.fetch_add(1, Ordering::SeqCst));
        self.sessions.lock().unwrap().insert(
            token.clone(),
            SessionUser {
                caller_id: CallerId::new(account.user.id.clone()),
                name: account.user.name.clone(),
                email: account.user.email.clone(),
                session_id: Some(format!("sess-{token}")),
                expires_at: Some(Utc::now() + Duration::days(7)),
            },
        );
        let cookie = HeaderValue::from_str(&format!("{}; Path=/; HttpOnly", session_cookie(&token)))
            .map_err(|e| IdentityError::InvalidResponse(e.to_string()))?;
        Ok(IdentityResponse {
            user: Some(account.user),
            set_cookies: vec![cookie],
        })
    }

    async fn sign_out(&self, headers: &HeaderMap) -> Result<IdentityResponse, IdentityError> {
        if let Some(token) = Self::token_from(headers) {
            self.sessions.lock().unwrap().remove(&token);
        }
        Ok(IdentityResponse {
            user: None,
            set_cookies: vec![HeaderValue::from_static(
                "better-auth.session_token=; Max-Age=0; Path=/",
            )],
        })
    }
}

// =============================================================================
// TestContext
// =============================================================================

/// A complete `AppState` wired to fakes and a throwaway database.
pub struct TestContext {
    _dir: TempDir,
    pub state: AppState,
    pub identity: Arc<FakeIdentityProvider>,
    pub provider: Arc<FakeLinkProvider>,
}

impl TestContext {
    pub fn new() -> Self {
        Self::with_balances(BalanceSettings::default())
    }

    pub fn with_balances(balances: BalanceSettings) -> Self {
        let (dir, store) = temp_store();
        let identity = Arc::new(FakeIdentityProvider::new());
        let provider = Arc::new(FakeLinkProvider::new());
        let state = AppState::new(
            store,
            identity.clone(),
            provider.clone(),
            LinkSettings::default(),
            balances,
        );
        Self {
            _dir: dir,
            state,
            identity,
            provider,
        }
    }

    pub fn router(&self) -> Router {
        crate::api::router(self.state.clone())
    }
}

// =============================================================================
// HTTP helpers
// =============================================================================

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: String,
}

impl TestResponse {
    pub fn json(&self) -> serde_json::Value {
        serde_json::from_str(&self.body).expect("JSON body")
    }
}

pub async fn send(app: &Router, request: Request<Body>) -> TestResponse {
    let response = app.clone().oneshot(request).await.expect("router is infallible");
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body");
    TestResponse {
        status,
        headers,
        body: String::from_utf8_lossy(&bytes).into_owned(),
    }
}

fn with_cookie(builder: axum::http::request::Builder, cookie: Option<&str>) -> axum::http::request::Builder {
    match cookie {
        Some(cookie) => builder.header(COOKIE, cookie),
        None => builder,
    }
}

pub fn get(uri: &str, cookie: Option<&str>) -> Request<Body> {
    with_cookie(Request::get(uri), cookie)
        .body(Body::empty())
        .expect("request")
}

pub fn post_json(uri: &str, cookie: Option<&str>, body: serde_json::Value) -> Request<Body> {
    with_cookie(Request::post(uri), cookie)
        .header(CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .expect("request")
}

pub fn post_form(uri: &str, cookie: Option<&str>, body: &str) -> Request<Body> {
    with_cookie(Request::post(uri), cookie)
        .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(body.to_string()))
        .expect("request")
}
