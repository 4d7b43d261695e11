mod common;

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
};
use common::providers::{Behavior, MockProviders};
use common::*;
use fundchamps::config::Config;
use fundchamps::entities::donation;
use sea_orm::EntityTrait;
use serde_json::json;

#[tokio::test]
async fn intent_below_minimum_is_rejected() {
    let state = test_state(Config::default()).await;
    let response = post_json(app(&state), "/api/payments/stripe/intent", json!({ "amount_cents": 50 })).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["error"], "invalid_amount");
    assert!(json["message"].as_str().unwrap().contains("$1.00"));
}

#[tokio::test]
async fn intent_without_stripe_key_is_a_config_error() {
    let state = test_state(Config::default()).await;
    let response = post_json(
        app(&state),
        "/api/payments/stripe/intent",
        json!({ "amount": "25", "donor_name": "Jo", "bucket": "travel" }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body_json(response).await["error"], "stripe_config");
}

#[tokio::test]
async fn bearer_guard_applies_when_required() {
    let mut config = Config::default();
    config.payments.require_bearer = true;
    config.api_tokens = vec!["s3cret".into()];
    let state = test_state(config).await;

    let anonymous = post_json(app(&state), "/api/payments/stripe/intent", json!({ "amount_cents": 500 })).await;
    assert_eq!(anonymous.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(anonymous).await["error"], "unauthorized");

    let authed = send(
        app(&state),
        Request::builder()
            .method("POST")
            .uri("/api/payments/stripe/intent")
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::AUTHORIZATION, "Bearer s3cret")
            .body(Body::from(json!({ "amount_cents": 50 }).to_string()))
            .unwrap(),
    )
    .await;
    // Past the guard, the amount check runs.
    assert_eq!(authed.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn paypal_requires_configuration_and_order_id() {
    let state = test_state(Config::default()).await;
    let order = post_json(app(&state), "/api/payments/paypal/order", json!({ "amount": 20 })).await;
    assert_eq!(order.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body_json(order).await["error"], "paypal_config");

    let capture = post_json(app(&state), "/api/payments/paypal/capture", json!({})).await;
    assert_eq!(capture.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(capture).await["error"], "missing_order_id");
}

#[tokio::test]
async fn config_and_readiness_reflect_keys() {
    let mut config = Config::default();
    config.payments.stripe_publishable_key = Some("pk_test_123".into());
    let state = test_state(config).await;

    let public = body_json(get(app(&state), "/api/payments/config").await).await;
    assert_eq!(public["stripe_publishable_key"], "pk_test_123");
    assert_eq!(public["min_amount_cents"], 100);

    let readiness = get(app(&state), "/api/payments/readiness").await;
    assert_eq!(readiness.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body_json(readiness).await["ready"], false);

    let mut config = Config::default();
    config.payments.stripe_secret_key = Some("sk_test_123".into());
    let state = test_state(config).await;
    let readiness = get(app(&state), "/api/payments/readiness").await;
    assert_eq!(readiness.status(), StatusCode::OK);
    assert_eq!(body_json(readiness).await["stripe"], true);
}

fn with_providers(base: &str) -> Config {
    let mut config = Config::default();
    config.payments.stripe_secret_key = Some("sk_test_mock".into());
    config.payments.stripe_publishable_key = Some("pk_test_mock".into());
    config.payments.stripe_api_base = base.to_string();
    config.payments.paypal_client_id = Some("paypal-client".into());
    config.payments.paypal_secret = Some("paypal-secret".into());
    config.payments.paypal_api_base = base.to_string();
    config
}

#[tokio::test]
async fn stripe_intent_posts_form_and_forwards_idempotency_key() {
    let providers = MockProviders::start(Behavior::default()).await;
    let state = test_state(with_providers(&providers.base)).await;

    let response = send(
        app(&state),
        Request::builder()
            .method("POST")
            .uri("/api/payments/stripe/intent")
            .header(header::CONTENT_TYPE, "application/json")
            .header("Idempotency-Key", "idem-123")
            .body(Body::from(
                json!({
                    "amount": "25",
                    "donor_name": "Jo Park",
                    "donor_email": "Jo@Example.org",
                    "team": "connect-atx-elite",
                    "bucket": "travel"
                })
                .to_string(),
            ))
            .unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["client_secret"], "pi_mock_1_secret_abc");
    assert_eq!(json["publishable_key"], "pk_test_mock");

    let calls = providers.requests("/v1/payment_intents");
    assert_eq!(calls.len(), 1);
    let call = &calls[0];
    assert_eq!(call.header("idempotency-key"), Some("idem-123"));
    assert_eq!(call.header("authorization"), Some("Bearer sk_test_mock"));
    assert!(call.header("content-type").unwrap().starts_with("application/x-www-form-urlencoded"));
    assert_eq!(call.form_value("amount").as_deref(), Some("2500"));
    assert_eq!(call.form_value("currency").as_deref(), Some("usd"));
    assert_eq!(call.form_value("receipt_email").as_deref(), Some("jo@example.org"));
    assert_eq!(call.form_value("metadata[bucket]").as_deref(), Some("travel"));
    assert_eq!(call.form_value("metadata[donor_name]").as_deref(), Some("Jo Park"));
    assert_eq!(call.form_value("metadata[team]").as_deref(), Some("connect-atx-elite"));
}

#[tokio::test]
async fn paypal_token_is_cached_between_orders() {
    let providers = MockProviders::start(Behavior::default()).await;
    let state = test_state(with_providers(&providers.base)).await;

    for _ in 0..3 {
        let order = post_json(app(&state), "/api/payments/paypal/order", json!({ "amount": 20 })).await;
        assert_eq!(order.status(), StatusCode::OK);
        assert_eq!(body_json(order).await["id"], "ORDER-1");
    }

    assert_eq!(providers.count("/v1/oauth2/token"), 1);
    assert_eq!(providers.count("/v2/checkout/orders"), 3);
    let token_call = &providers.requests("/v1/oauth2/token")[0];
    assert!(token_call.header("authorization").unwrap().starts_with("Basic "));
    assert_eq!(token_call.form_value("grant_type").as_deref(), Some("client_credentials"));
    let order_call = &providers.requests("/v2/checkout/orders")[0];
    let body: serde_json::Value = serde_json::from_str(&order_call.body).unwrap();
    assert_eq!(body["purchase_units"][0]["amount"]["value"], "20");
}

#[tokio::test]
async fn paypal_refreshes_a_rejected_token_once() {
    let providers = MockProviders::start(Behavior { paypal_rejected_tokens: 1, ..Behavior::default() }).await;
    let state = test_state(with_providers(&providers.base)).await;

    let order = post_json(app(&state), "/api/payments/paypal/order", json!({ "amount": 20 })).await;
    assert_eq!(order.status(), StatusCode::OK);
    assert_eq!(providers.count("/v1/oauth2/token"), 2);
    let orders = providers.requests("/v2/checkout/orders");
    assert_eq!(orders.len(), 2);
    assert_eq!(orders[0].header("authorization"), Some("Bearer token-1"));
    assert_eq!(orders[1].header("authorization"), Some("Bearer token-2"));

    // The refreshed token is cached for later calls.
    let again = post_json(app(&state), "/api/payments/paypal/order", json!({ "amount": 20 })).await;
    assert_eq!(again.status(), StatusCode::OK);
    assert_eq!(providers.count("/v1/oauth2/token"), 2);
}

#[tokio::test]
async fn paypal_gives_up_after_one_refresh() {
    let providers = MockProviders::start(Behavior { paypal_rejected_tokens: 10, ..Behavior::default() }).await;
    let state = test_state(with_providers(&providers.base)).await;

    let order = post_json(app(&state), "/api/payments/paypal/order", json!({ "amount": 20 })).await;
    assert_eq!(order.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(order).await["error"], "paypal_error");
    assert_eq!(providers.count("/v1/oauth2/token"), 2);
    assert_eq!(providers.count("/v2/checkout/orders"), 2);
}

#[tokio::test]
async fn paypal_capture_records_one_donation() {
    let providers = MockProviders::start(Behavior::default()).await;
    let state = test_state(with_providers(&providers.base)).await;
    insert_team(&state.db, "Connect ATX Elite").await;
    let mut events = state.events.subscribe();

    for _ in 0..2 {
        let capture = post_json(app(&state), "/api/payments/paypal/capture", json!({ "orderID": "ORDER-1" })).await;
        assert_eq!(capture.status(), StatusCode::OK);
        assert_eq!(body_json(capture).await["status"], "COMPLETED");
    }
    assert_eq!(providers.count("/v2/checkout/orders/ORDER-1/capture"), 2);

    let donations = donation::Entity::find().all(&state.db).await.unwrap();
    assert_eq!(donations.len(), 1);
    assert_eq!(donations[0].name, "Pat Lee");
    assert_eq!(donations[0].email.as_deref(), Some("pat@example.org"));
    assert_eq!(donations[0].amount_cents, 2_500);
    assert_eq!(donations[0].payment_intent.as_deref(), Some("paypal:ORDER-1"));
    assert!(donations[0].team_id.is_some());

    assert_eq!(events.recv().await.unwrap().channel, "donation");
    assert!(events.try_recv().is_err());

    let stats = body_json(get(app(&state), "/stats").await).await;
    assert_eq!(stats["raised"], 25.0);
}
