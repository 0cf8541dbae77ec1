// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    middleware::from_fn_with_state,
    routing::{get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::{
    auth::require_session,
    linking::{BalanceRecord, BalanceReport, InstitutionFailure, LinkSession},
    providers::{AccountBalances, ProviderAccount},
    state::AppState,
    storage::LinkedAccount,
};

pub mod accounts;
pub mod balances;
pub mod health;
pub mod landing;
pub mod link;
pub mod session;

pub fn router(state: AppState) -> Router {
    // Everything here runs behind the session gate.
    let protected = Router::new()
        .route("/", get(landing::landing))
        .route("/link-session", get(link::create_link_session))
        .route("/link-session/complete", post(link::complete_link))
        .route("/balances", get(balances::get_balances))
        .route("/linked-accounts", get(accounts::list_linked_accounts))
        // Legacy paths still used by the browser client.
        .route("/api/create_link_token", get(link::create_link_session))
        .route("/api/exchange_public_token", post(link::complete_link))
        .route("/api/balance", get(balances::get_balances))
        .route_layer(from_fn_with_state(state.clone(), require_session));

    let public = Router::new()
        .route("/sign-up", post(session::sign_up))
        .route("/log-in", post(session::log_in))
        .route("/logout", post(session::logout))
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness));

    Router::new()
        .merge(protected)
        .merge(public)
        .with_state(state)
        .merge(SwaggerUi::new("/docs").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                .layer(TraceLayer::new_for_http())
                .layer(PropagateRequestIdLayer::x_request_id()),
        )
}

#[derive(OpenApi)]
#[openapi(
    paths(
        landing::landing,
        link::create_link_session,
        link::complete_link,
        balances::get_balances,
        accounts::list_linked_accounts,
        session::sign_up,
        session::log_in,
        session::logout,
        health::liveness,
        health::readiness
    ),
    components(
        schemas(
            LinkSession,
            LinkedAccount,
            BalanceReport,
            BalanceRecord,
            InstitutionFailure,
            ProviderAccount,
            AccountBalances,
            link::CompleteLinkRequest,
            link::CompleteLinkResponse,
            accounts::LinkedAccountsResponse,
            landing::LandingResponse,
            session::SignUpForm,
            session::LogInForm,
            health::HealthResponse,
            health::ReadyResponse,
            health::HealthChecks
        )
    ),
    tags(
        (name = "Session", description = "Sign-up, log-in, logout and landing view"),
        (name = "Linking", description = "Institution linking"),
        (name = "Balances", description = "Aggregated balances"),
        (name = "Health", description = "Liveness and readiness checks")
    )
)]
pub struct ApiDoc;
