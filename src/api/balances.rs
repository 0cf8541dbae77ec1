// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Aggregated balances endpoint.

use axum::{extract::State, Json};
use tracing::error;

use crate::auth::Auth;
use crate::error::ApiError;
use crate::linking::{BalanceError, BalanceReport};
use crate::state::AppState;

fn map_balance_error(error: BalanceError) -> ApiError {
    match error {
        BalanceError::NoLinkedAccounts => {
            ApiError::not_found("No linked accounts found for user").with_code("no_linked_accounts")
        }
        BalanceError::Upstream { .. } | BalanceError::AllInstitutionsFailed(_) => {
            ApiError::bad_gateway("A linked institution is temporarily unreachable")
        }
        BalanceError::Storage(_) | BalanceError::Task(_) => {
            ApiError::internal("Failed to load balances")
        }
    }
}

/// Aggregated balances across every institution the caller has linked.
///
/// Institutions that could not be reached are listed under `failures` when
/// the server runs with the `partial` failure policy.
#[utoipa::path(
    get,
    path = "/balances",
    tag = "Balances",
    responses(
        (status = 200, description = "Flattened balances", body = BalanceReport),
        (status = 302, description = "No session; redirected to sign-in"),
        (status = 404, description = "No linked accounts"),
        (status = 502, description = "Linked institution unreachable")
    )
)]
pub async fn get_balances(
    Auth(user): Auth,
    State(state): State<AppState>,
) -> Result<Json<BalanceReport>, ApiError> {
    let report = state
        .balances
        .get_balances(&user.caller_id)
        .await
        .map_err(|e| {
            if matches!(e, BalanceError::Storage(_) | BalanceError::Task(_)) {
                error!(user_id = %user.caller_id, error = %e, "Balance aggregation failed");
            }
            map_balance_error(e)
        })?;
    Ok(Json(report))
}

#[cfg(test)]
mod tests {
    use crate::auth::CallerId;
    use crate::config::{BalanceFailurePolicy, BalanceSettings};
    use crate::providers::AccessToken;
    use crate::storage::NewLinkedAccount;
    use crate::test_support::{get, provider_account, send, session_cookie, TestContext};
    use axum::http::StatusCode;
    use uuid::Uuid;

    fn link(ctx: &TestContext, user: &str, token: &str) {
        ctx.state.store.upsert_user(user, None, None).unwrap();
        ctx.state
            .store
            .insert(NewLinkedAccount {
                id: Uuid::new_v4(),
                user_id: CallerId::new(user),
                item_id: format!("item-{token}"),
                access_token: AccessToken::new(token),
                institution_id: None,
                institution_name: None,
            })
            .unwrap();
    }

    #[tokio::test]
    async fn nothing_linked_is_404() {
        let ctx = TestContext::new();
        ctx.identity.add_session("tok", "user-1");

        let response = send(&ctx.router(), get("/balances", Some(&session_cookie("tok")))).await;
        assert_eq!(response.status, StatusCode::NOT_FOUND);
        assert_eq!(response.json()["error"], "No linked accounts found for user");
        assert_eq!(response.json()["error_code"], "no_linked_accounts");
    }

    #[tokio::test]
    async fn balances_are_flattened() {
        let ctx = TestContext::new();
        ctx.identity.add_session("tok", "user-1");
        link(&ctx, "user-1", "access-a");
        link(&ctx, "user-1", "access-b");
        ctx.provider.set_balances("access-a", vec![provider_account("a1"), provider_account("a2")]);
        ctx.provider.set_balances("access-b", vec![provider_account("b1")]);

        let response = send(&ctx.router(), get("/balances", Some(&session_cookie("tok")))).await;
        assert_eq!(response.status, StatusCode::OK);
        let body = response.json();
        assert_eq!(body["accounts"].as_array().unwrap().len(), 3);
        assert!(body.get("failures").is_none());
        assert!(!response.body.contains("access-a"));
    }

    #[tokio::test]
    async fn fail_fast_failure_is_502() {
        let ctx = TestContext::with_balances(BalanceSettings {
            failure_policy: BalanceFailurePolicy::FailFast,
            max_concurrency: 4,
        });
        ctx.identity.add_session("tok", "user-1");
        link(&ctx, "user-1", "access-a");
        link(&ctx, "user-1", "access-b");
        ctx.provider.set_balances("access-a", vec![provider_account("a1")]);
        ctx.provider.fail_balances("access-b");

        let response = send(&ctx.router(), get("/balances", Some(&session_cookie("tok")))).await;
        assert_eq!(response.status, StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn partial_failure_is_reported_inline() {
        let ctx = TestContext::new();
        ctx.identity.add_session("tok", "user-1");
        link(&ctx, "user-1", "access-a");
        link(&ctx, "user-1", "access-b");
        ctx.provider.set_balances("access-a", vec![provider_account("a1")]);
        ctx.provider.fail_balances("access-b");

        let response = send(&ctx.router(), get("/balances", Some(&session_cookie("tok")))).await;
        assert_eq!(response.status, StatusCode::OK);
        let body = response.json();
        assert_eq!(body["accounts"].as_array().unwrap().len(), 1);
        assert_eq!(body["failures"][0]["error_code"], "ITEM_LOGIN_REQUIRED");
        assert!(!response.body.contains("(fake)"));
    }

    #[tokio::test]
    async fn legacy_path_serves_balances() {
        let ctx = TestContext::new();
        ctx.identity.add_session("tok", "user-1");

        let response = send(&ctx.router(), get("/api/balance", Some(&session_cookie("tok")))).await;
        assert_eq!(response.status, StatusCode::NOT_FOUND);
        assert_eq!(response.json()["error"], "No linked accounts found for user");
    }
}
