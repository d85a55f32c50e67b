mod common;

use axum::extract::Path;
use axum::http::{StatusCode, header};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use common::Counter;
use powerbi_admin_mcp::powerbi::auth::POWERBI_SCOPE;
use powerbi_admin_mcp::powerbi::models::Capacity;
use powerbi_admin_mcp::powerbi::{ClientSecretCredential, PowerBiError, TokenProvider, capacities};
use serde_json::json;
use std::collections::HashMap;

fn capacities_router(failures_before_success: usize, status: StatusCode, calls: Counter) -> Router {
    Router::new().route(
        "/admin/capacities",
        get(move || async move {
            if calls.hit() <= failures_before_success {
                return (status, [(header::RETRY_AFTER, "0")], "slow down").into_response();
            }
            Json(json!({"value": [{"id": "cap-1", "displayName": "P1", "sku": "P1", "state": "Active"}]}))
                .into_response()
        }),
    )
}

#[tokio::test]
async fn throttled_requests_are_retried() {
    let calls = Counter::default();
    let base = common::spawn(capacities_router(1, StatusCode::TOO_MANY_REQUESTS, calls.clone())).await;
    let client = common::client(&base);

    let capacities: Vec<Capacity> = capacities::get_capacities(&client).await.unwrap();

    assert_eq!(calls.get(), 2);
    assert_eq!(capacities[0].display_name.as_deref(), Some("P1"));
}

#[tokio::test]
async fn retries_are_bounded() {
    let calls = Counter::default();
    let base = common::spawn(capacities_router(
        usize::MAX,
        StatusCode::SERVICE_UNAVAILABLE,
        calls.clone(),
    ))
    .await;
    let client = common::client(&base);

    let err = capacities::get_capacities(&client).await.unwrap_err();

    // one attempt plus max_retries (2)
    assert_eq!(calls.get(), 3);
    assert!(matches!(err, PowerBiError::ApiError { status: 503, .. }), "got {err:?}");
}

#[tokio::test]
async fn client_errors_are_not_retried() {
    let calls = Counter::default();
    let base = common::spawn(capacities_router(usize::MAX, StatusCode::UNAUTHORIZED, calls.clone())).await;
    let client = common::client(&base);

    let err = capacities::get_capacities(&client).await.unwrap_err();

    assert_eq!(calls.get(), 1);
    assert!(matches!(err, PowerBiError::ApiError { status: 401, .. }));
}

fn token_router(expires_in: i64, calls: Counter) -> Router {
    Router::new().route(
        "/:tenant/oauth2/v2.0/token",
        post(
            move |Path(tenant): Path<String>, Form(form): Form<HashMap<String, String>>| async move {
                assert_eq!(tenant, "tenant-1");
                assert_eq!(form.get("grant_type").map(String::as_str), Some("client_credentials"));
                assert_eq!(form.get("scope").map(String::as_str), Some(POWERBI_SCOPE));
                if form.get("client_secret").map(String::as_str) != Some("secret") {
                    return (StatusCode::UNAUTHORIZED, "invalid_client").into_response();
                }
                let n = calls.hit();
                Json(json!({
                    "token_type": "Bearer",
                    "expires_in": expires_in,
                    "access_token": format!("token-{}", n)
                }))
                .into_response()
            },
        ),
    )
}

#[tokio::test]
async fn token_is_cached_until_refresh_window() {
    let calls = Counter::default();
    let base = common::spawn(token_router(3600, calls.clone())).await;
    let credential = ClientSecretCredential::with_authority(&base, "tenant-1", "client", "secret");

    assert_eq!(credential.token().await.unwrap(), "token-1");
    assert_eq!(credential.token().await.unwrap(), "token-1");
    assert_eq!(calls.get(), 1);
}

#[tokio::test]
async fn concurrent_callers_share_one_token_request() {
    let calls = Counter::default();
    let base = common::spawn(token_router(3600, calls.clone())).await;
    let credential = ClientSecretCredential::with_authority(&base, "tenant-1", "client", "secret");

    let (a, b, c) = tokio::join!(credential.token(), credential.token(), credential.token());

    assert_eq!(calls.get(), 1);
    assert_eq!(a.unwrap(), "token-1");
    assert_eq!(b.unwrap(), "token-1");
    assert_eq!(c.unwrap(), "token-1");
}

#[tokio::test]
async fn token_expiring_within_five_minutes_is_refreshed() {
    let calls = Counter::default();
    let base = common::spawn(token_router(240, calls.clone())).await;
    let credential = ClientSecretCredential::with_authority(&base, "tenant-1", "client", "secret");

    assert_eq!(credential.token().await.unwrap(), "token-1");
    assert_eq!(credential.token().await.unwrap(), "token-2");
    assert_eq!(calls.get(), 2);
}

#[tokio::test]
async fn rejected_credentials_surface_token_error() {
    let base = common::spawn(token_router(3600, Counter::default())).await;
    let credential = ClientSecretCredential::with_authority(&base, "tenant-1", "client", "wrong");

    let err = credential.token().await.unwrap_err();
    match err {
        PowerBiError::TokenError(message) => assert!(message.contains("invalid_client")),
        other => panic!("expected TokenError, got {other:?}"),
    }
}
