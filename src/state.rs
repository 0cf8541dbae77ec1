// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Shared application state handed to every handler.

use std::sync::Arc;

use crate::auth::IdentityProvider;
use crate::config::{BalanceSettings, LinkSettings, DEFAULT_SIGN_IN_PATH};
use crate::linking::{BalanceAggregator, LinkSessionManager, TokenExchangeCoordinator};
use crate::providers::LinkProvider;
use crate::storage::LinkedAccountStore;

#[derive(Clone)]
pub struct AppState {
    pub store: LinkedAccountStore,
    pub identity: Arc<dyn IdentityProvider>,
    pub link_sessions: LinkSessionManager,
    pub exchange: TokenExchangeCoordinator,
    pub balances: BalanceAggregator,
    /// Where unauthenticated requests are redirected.
    pub sign_in_path: Arc<str>,
}

impl AppState {
    pub fn new(
        store: LinkedAccountStore,
        identity: Arc<dyn IdentityProvider>,
        provider: Arc<dyn LinkProvider>,
        link: LinkSettings,
        balances: BalanceSettings,
    ) -> Self {
        let exchange =
            TokenExchangeCoordinator::new(provider.clone(), store.clone(), link.country_codes.clone());
        Self {
            link_sessions: LinkSessionManager::new(provider.clone(), link),
            exchange,
            balances: BalanceAggregator::new(provider, store.clone(), balances),
            store,
            identity,
            sign_in_path: Arc::from(DEFAULT_SIGN_IN_PATH),
        }
    }

    pub fn with_sign_in_path(mut self, path: impl AsRef<str>) -> Self {
        self.sign_in_path = Arc::from(path.as_ref());
        self
    }
}
