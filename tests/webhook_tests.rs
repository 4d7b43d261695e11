mod common;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use chrono::Utc;
use common::*;
use fundchamps::config::Config;
use fundchamps::entities::{donation, sponsor};
use fundchamps::payments::sign_stripe_payload;
use sea_orm::{ActiveModelTrait, EntityTrait, Set};
use serde_json::{json, Value};

const SECRET: &str = "whsec_test_secret";

fn webhook_config() -> Config {
    let mut config = Config::default();
    config.payments.stripe_webhook_secret = Some(SECRET.into());
    config
}

async fn deliver(app: Router, event: &Value, signature: Option<String>) -> axum::response::Response {
    let payload = event.to_string();
    let mut builder = Request::builder()
        .method("POST")
        .uri("/webhooks/stripe")
        .header("content-type", "application/json");
    if let Some(signature) = signature {
        builder = builder.header("Stripe-Signature", signature);
    }
    send(app, builder.body(Body::from(payload)).unwrap()).await
}

fn signed(event: &Value) -> Option<String> {
    Some(sign_stripe_payload(event.to_string().as_bytes(), SECRET, Utc::now().timestamp()))
}

#[tokio::test]
async fn missing_secret_is_a_server_error() {
    let state = test_state(Config::default()).await;
    let event = json!({ "type": "ping" });
    let response = deliver(app(&state), &event, signed(&event)).await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn bad_signature_is_rejected() {
    let state = test_state(webhook_config()).await;
    let event = json!({ "type": "payment_intent.succeeded", "data": { "object": { "id": "pi_1" } } });

    let unsigned = deliver(app(&state), &event, None).await;
    assert_eq!(unsigned.status(), StatusCode::BAD_REQUEST);

    let forged = sign_stripe_payload(event.to_string().as_bytes(), "wrong", Utc::now().timestamp());
    let response = deliver(app(&state), &event, Some(forged)).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"], "invalid_signature");

    let stale = sign_stripe_payload(event.to_string().as_bytes(), SECRET, Utc::now().timestamp() - 3600);
    let response = deliver(app(&state), &event, Some(stale)).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn malformed_payload_is_rejected() {
    let state = test_state(webhook_config()).await;
    let body = "not json";
    let signature = sign_stripe_payload(body.as_bytes(), SECRET, Utc::now().timestamp());
    let response = send(
        app(&state),
        Request::builder()
            .method("POST")
            .uri("/webhooks/stripe")
            .header("Stripe-Signature", signature)
            .body(Body::from(body))
            .unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"], "invalid_payload");
}

#[tokio::test]
async fn payment_intent_completes_linked_sponsor() {
    let state = test_state(webhook_config()).await;
    let team = insert_team(&state.db, "Connect ATX Elite").await;
    let goal = insert_goal(&state.db, team.id, 1_000_000).await;
    let pending = insert_sponsor(&state.db, "Acme", Some(team.id), 0, "pending").await;
    let mut linked: sponsor::ActiveModel = pending.into();
    linked.payment_intent = Set(Some("pi_123".into()));
    let linked = linked.update(&state.db).await.unwrap();

    let mut events = state.events.subscribe();
    let event = json!({
        "type": "payment_intent.succeeded",
        "data": { "object": { "id": "pi_123", "amount_received": 30_000 } }
    });
    let response = deliver(app(&state), &event, signed(&event)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["received"], true);

    let updated = sponsor::Entity::find_by_id(linked.id).one(&state.db).await.unwrap().unwrap();
    assert_eq!(updated.status, "completed");
    assert_eq!(updated.amount, 30_000);

    let goal = fundchamps::entities::CampaignGoal::find_by_id(goal.id).one(&state.db).await.unwrap().unwrap();
    assert_eq!(goal.total, 30_000);

    // $300 goes out on both channels.
    assert_eq!(events.recv().await.unwrap().channel, "sponsor");
    assert_eq!(events.recv().await.unwrap().channel, "donation");
}

#[tokio::test]
async fn unlinked_payment_intent_records_donation() {
    let state = test_state(webhook_config()).await;
    insert_team(&state.db, "Connect ATX Elite").await;
    let event = json!({
        "type": "payment_intent.succeeded",
        "data": { "object": {
            "id": "pi_unlinked",
            "amount_received": 2_500,
            "metadata": { "donor_name": "Jane Parker", "donor_email": "JANE@example.org", "team": "connect-atx-elite" }
        } }
    });
    let response = deliver(app(&state), &event, signed(&event)).await;
    assert_eq!(response.status(), StatusCode::OK);

    let donations = donation::Entity::find().all(&state.db).await.unwrap();
    assert_eq!(donations.len(), 1);
    assert_eq!(donations[0].name, "Jane Parker");
    assert_eq!(donations[0].email.as_deref(), Some("jane@example.org"));
    assert_eq!(donations[0].amount_cents, 2_500);
    assert!(donations[0].team_id.is_some());

    let stats = body_json(get(app(&state), "/stats").await).await;
    assert_eq!(stats["raised"], 25.0);
}

#[tokio::test]
async fn checkout_session_approves_sponsor_by_email() {
    let state = test_state(webhook_config()).await;
    let existing = insert_sponsor(&state.db, "Acme", None, 0, "pending").await;
    let event = json!({
        "type": "checkout.session.completed",
        "data": { "object": {
            "id": "cs_1",
            "customer_email": existing.email.clone().unwrap(),
            "amount_total": 100_000
        } }
    });
    let response = deliver(app(&state), &event, signed(&event)).await;
    assert_eq!(response.status(), StatusCode::OK);

    let updated = sponsor::Entity::find_by_id(existing.id).one(&state.db).await.unwrap().unwrap();
    assert_eq!(updated.status, "approved");
    assert_eq!(updated.amount, 100_000);

    let unknown = json!({
        "type": "checkout.session.completed",
        "data": { "object": {
            "id": "cs_2",
            "customer_details": { "email": "new@sponsor.test", "name": "New Sponsor LLC" },
            "amount_total": 50_000
        } }
    });
    let response = deliver(app(&state), &unknown, signed(&unknown)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let all = sponsor::Entity::find().all(&state.db).await.unwrap();
    assert!(all.iter().any(|s| s.name == "New Sponsor LLC" && s.status == "approved"));
}

#[tokio::test]
async fn other_events_are_acknowledged() {
    let state = test_state(webhook_config()).await;
    let event = json!({ "type": "charge.refunded", "data": { "object": {} } });
    let response = deliver(app(&state), &event, signed(&event)).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn redelivered_payment_intent_records_once() {
    let state = test_state(webhook_config()).await;
    let event = json!({
        "type": "payment_intent.succeeded",
        "data": { "object": {
            "id": "pi_same",
            "amount_received": 2_500,
            "metadata": { "donor_name": "Jane Parker" }
        } }
    });
    let mut events = state.events.subscribe();

    for _ in 0..2 {
        let response = deliver(app(&state), &event, signed(&event)).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    let donations = donation::Entity::find().all(&state.db).await.unwrap();
    assert_eq!(donations.len(), 1);
    assert_eq!(donations[0].payment_intent.as_deref(), Some("pi_same"));
    let stats = body_json(get(app(&state), "/stats").await).await;
    assert_eq!(stats["raised"], 25.0);

    assert_eq!(events.recv().await.unwrap().channel, "donation");
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn redelivered_payment_for_linked_sponsor_is_quiet() {
    let state = test_state(webhook_config()).await;
    let pending = insert_sponsor(&state.db, "Acme", None, 0, "pending").await;
    let mut linked: sponsor::ActiveModel = pending.into();
    linked.payment_intent = Set(Some("pi_linked".into()));
    linked.update(&state.db).await.unwrap();

    let event = json!({
        "type": "payment_intent.succeeded",
        "data": { "object": { "id": "pi_linked", "amount_received": 5_000 } }
    });
    let mut events = state.events.subscribe();
    for _ in 0..2 {
        assert_eq!(deliver(app(&state), &event, signed(&event)).await.status(), StatusCode::OK);
    }
    assert_eq!(events.recv().await.unwrap().channel, "donation");
    assert!(events.try_recv().is_err());
    assert_eq!(donation::Entity::find().all(&state.db).await.unwrap().len(), 0);
}

#[tokio::test]
async fn checkout_without_amount_keeps_sponsor_amount() {
    let state = test_state(webhook_config()).await;
    let existing = insert_sponsor(&state.db, "Acme", None, 75_000, "pending").await;
    let event = json!({
        "type": "checkout.session.completed",
        "data": { "object": { "id": "cs_3", "customer_email": existing.email.clone().unwrap() } }
    });
    let response = deliver(app(&state), &event, signed(&event)).await;
    assert_eq!(response.status(), StatusCode::OK);

    let updated = sponsor::Entity::find_by_id(existing.id).one(&state.db).await.unwrap().unwrap();
    assert_eq!(updated.status, "approved");
    assert_eq!(updated.amount, 75_000);
}

#[tokio::test]
async fn extreme_signature_timestamp_is_rejected() {
    let state = test_state(webhook_config()).await;
    let event = json!({ "type": "ping" });
    let response = deliver(app(&state), &event, Some("t=-9223372036854775808,v1=00".to_string())).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"], "invalid_signature");
}
