//! Credit balance, consumption and reset integration tests.

mod common;

use axum::http::{HeaderValue, StatusCode};
use common::{authorization, bearer, session_token, TestHarness};
use futures::future::join_all;
use serde_json::json;
use wizard_service::ServiceConfig;

// ============================================================================
// Balance
// ============================================================================

#[tokio::test]
async fn get_balance_success() {
    let harness = TestHarness::new();
    harness.sync_user("google-200").await;

    let response = harness
        .server
        .get("/v1/credits")
        .add_header(authorization(), TestHarness::user_auth("google-200"))
        .await;

    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["credits_remaining"], 3);
    assert_eq!(body["max_credits"], 3);
}

#[tokio::test]
async fn get_balance_without_account_fails() {
    let harness = TestHarness::new();

    let response = harness
        .server
        .get("/v1/credits")
        .add_header(authorization(), TestHarness::user_auth("google-ghost"))
        .await;

    response.assert_status_not_found();
}

#[tokio::test]
async fn get_balance_without_auth_fails() {
    let harness = TestHarness::new();

    let response = harness.server.get("/v1/credits").await;

    response.assert_status_unauthorized();
}

#[tokio::test]
async fn forged_session_is_rejected() {
    let harness = TestHarness::new();
    harness.sync_user("google-201").await;

    let forged = session_token("google-201", "not-the-secret", 3600);
    let response = harness
        .server
        .get("/v1/credits")
        .add_header(authorization(), bearer(&forged))
        .await;

    response.assert_status_unauthorized();
}

#[tokio::test]
async fn expired_session_is_rejected() {
    let harness = TestHarness::new();
    harness.sync_user("google-202").await;

    let expired = session_token("google-202", common::SESSION_SECRET, -3600);
    let response = harness
        .server
        .get("/v1/credits")
        .add_header(authorization(), bearer(&expired))
        .await;

    response.assert_status_unauthorized();
}

// ============================================================================
// Consumption
// ============================================================================

#[tokio::test]
async fn use_credit_defaults_to_one() {
    let harness = TestHarness::new();
    harness.sync_user("google-210").await;

    let response = harness
        .server
        .post("/v1/credits/use")
        .add_header(authorization(), TestHarness::user_auth("google-210"))
        .await;

    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["success"], true);
    assert_eq!(body["credits_remaining"], 2);
    assert_eq!(body["max_credits"], 3);
}

#[tokio::test]
async fn use_credit_with_amount() {
    let harness = TestHarness::new();
    harness.sync_user("google-211").await;

    let response = harness
        .server
        .post("/v1/credits/use")
        .add_header(authorization(), TestHarness::user_auth("google-211"))
        .json(&json!({ "amount": 2 }))
        .await;

    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["credits_remaining"], 1);
}

#[tokio::test]
async fn exhausted_balance_is_payment_required() {
    let harness = TestHarness::new();
    harness.sync_user("google-212").await;
    let auth = TestHarness::user_auth("google-212");

    for _ in 0..3 {
        harness
            .server
            .post("/v1/credits/use")
            .add_header(authorization(), auth.clone())
            .await
            .assert_status_ok();
    }

    let response = harness
        .server
        .post("/v1/credits/use")
        .add_header(authorization(), auth.clone())
        .await;

    response.assert_status(StatusCode::PAYMENT_REQUIRED);
    let body: serde_json::Value = response.json();
    assert_eq!(body["error"]["code"], "insufficient_credits");
    assert_eq!(body["error"]["details"]["current"], 0);
    assert_eq!(body["error"]["details"]["required"], 1);

    // The failed attempt changed nothing
    let response = harness
        .server
        .get("/v1/credits")
        .add_header(authorization(), auth)
        .await;
    let body: serde_json::Value = response.json();
    assert_eq!(body["credits_remaining"], 0);
}

#[tokio::test]
async fn oversized_amount_is_rejected_without_change() {
    let harness = TestHarness::new();
    harness.sync_user("google-213").await;
    let auth = TestHarness::user_auth("google-213");

    let response = harness
        .server
        .post("/v1/credits/use")
        .add_header(authorization(), auth.clone())
        .json(&json!({ "amount": 5 }))
        .await;
    response.assert_status(StatusCode::PAYMENT_REQUIRED);

    let body: serde_json::Value = harness
        .server
        .get("/v1/credits")
        .add_header(authorization(), auth)
        .await
        .json();
    assert_eq!(body["credits_remaining"], 3);
}

#[tokio::test]
async fn non_positive_amount_is_bad_request() {
    let harness = TestHarness::new();
    harness.sync_user("google-214").await;

    for amount in [0, -1] {
        let response = harness
            .server
            .post("/v1/credits/use")
            .add_header(authorization(), TestHarness::user_auth("google-214"))
            .json(&json!({ "amount": amount }))
            .await;
        response.assert_status_bad_request();
    }
}

#[tokio::test]
async fn malformed_body_is_bad_request() {
    let harness = TestHarness::new();
    harness.sync_user("google-215").await;

    let response = harness
        .server
        .post("/v1/credits/use")
        .add_header(authorization(), TestHarness::user_auth("google-215"))
        .json(&json!({ "amount": "lots" }))
        .await;

    response.assert_status_bad_request();
}

#[tokio::test]
async fn concurrent_use_never_overspends() {
    let harness = TestHarness::new();
    harness.sync_user("google-216").await;
    let auth = TestHarness::user_auth("google-216");

    let server = &harness.server;
    let requests = (0..6).map(|_| {
        let auth = auth.clone();
        async move {
            server
                .post("/v1/credits/use")
                .add_header(authorization(), auth)
                .await
        }
    });
    let responses = join_all(requests).await;

    let ok = responses
        .iter()
        .filter(|r| r.status_code() == StatusCode::OK)
        .count();
    let refused = responses
        .iter()
        .filter(|r| r.status_code() == StatusCode::PAYMENT_REQUIRED)
        .count();
    assert_eq!(ok, 3);
    assert_eq!(refused, 3);
}

// ============================================================================
// History
// ============================================================================

#[tokio::test]
async fn history_lists_newest_first() {
    let harness = TestHarness::new();
    harness.sync_user("google-220").await;
    let auth = TestHarness::user_auth("google-220");

    for amount in [1, 2] {
        harness
            .server
            .post("/v1/credits/use")
            .add_header(authorization(), auth.clone())
            .json(&json!({ "amount": amount }))
            .await
            .assert_status_ok();
    }

    let response = harness
        .server
        .get("/v1/credits/history")
        .add_header(authorization(), auth.clone())
        .await;

    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    let records = body["records"].as_array().unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0]["amount"], 2);
    assert_eq!(records[0]["balance_after"], 0);
    assert_eq!(records[1]["balance_before"], 3);

    let limited: serde_json::Value = harness
        .server
        .get("/v1/credits/history")
        .add_query_param("limit", 1)
        .add_header(authorization(), auth)
        .await
        .json();
    assert_eq!(limited["records"].as_array().unwrap().len(), 1);
}

// ============================================================================
// Reset
// ============================================================================

#[tokio::test]
async fn reset_restores_every_balance() {
    let harness = TestHarness::new();
    harness.sync_user("google-230").await;
    harness.sync_user("google-231").await;

    harness
        .server
        .post("/v1/credits/use")
        .add_header(authorization(), TestHarness::user_auth("google-230"))
        .json(&json!({ "amount": 3 }))
        .await
        .assert_status_ok();

    let response = harness
        .server
        .post("/v1/credits/reset")
        .add_header(authorization(), TestHarness::cron_auth())
        .await;

    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["success"], true);
    assert_eq!(body["reset"], 2);
    assert!(body["timestamp"].is_string());

    let balance: serde_json::Value = harness
        .server
        .get("/v1/credits")
        .add_header(authorization(), TestHarness::user_auth("google-230"))
        .await
        .json();
    assert_eq!(balance["credits_remaining"], 3);
}

#[tokio::test]
async fn reset_accepts_get_from_scheduler() {
    let harness = TestHarness::new();
    harness.sync_user("google-232").await;

    let response = harness
        .server
        .get("/v1/credits/reset")
        .add_header(authorization(), TestHarness::cron_auth())
        .await;

    response.assert_status_ok();
}

#[tokio::test]
async fn reset_with_wrong_secret_fails() {
    let harness = TestHarness::new();

    let response = harness
        .server
        .post("/v1/credits/reset")
        .add_header(authorization(), HeaderValue::from_static("Bearer wrong"))
        .await;

    response.assert_status_unauthorized();
}

#[tokio::test]
async fn reset_rejects_user_sessions() {
    let harness = TestHarness::new();
    harness.sync_user("google-233").await;

    let response = harness
        .server
        .post("/v1/credits/reset")
        .add_header(authorization(), TestHarness::user_auth("google-233"))
        .await;

    response.assert_status_unauthorized();
}

#[tokio::test]
async fn reset_disabled_without_secret() {
    let harness = TestHarness::with_config(ServiceConfig {
        cron_secret: None,
        ..common::test_config()
    });

    let response = harness
        .server
        .post("/v1/credits/reset")
        .add_header(authorization(), TestHarness::cron_auth())
        .await;

    response.assert_status_unauthorized();
}
