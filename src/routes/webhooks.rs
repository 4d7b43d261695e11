use axum::{body::Bytes, extract::State, http::HeaderMap, Json};
use chrono::Utc;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, Set};
use serde_json::{json, Value};

use crate::entities::{sponsor, SponsorStatus};
use crate::error::AppError;
use crate::payments::verify_stripe_signature;
use crate::routes::payments::record_donation;
use crate::AppState;

pub const STRIPE_SIGNATURE_HEADER: &str = "stripe-signature";

/// Stripe event receiver for checkout and PaymentIntent completions.
#[utoipa::path(
    post,
    path = "/webhooks/stripe",
    request_body(content = String, content_type = "application/json", description = "Raw Stripe event"),
    responses(
        (status = 200, description = "Event acknowledged"),
        (status = 400, description = "Bad signature or malformed payload"),
        (status = 500, description = "Webhook secret not configured")
    )
)]
#[tracing::instrument(skip_all)]
pub async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, AppError> {
    let secret = state
        .config
        .payments
        .stripe_webhook_secret
        .as_deref()
        .ok_or_else(|| {
            tracing::error!("stripe webhook received without STRIPE_WEBHOOK_SECRET");
            AppError::config("webhook_config", "Missing webhook secret")
        })?;

    let signature = headers
        .get(STRIPE_SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if let Err(reason) = verify_stripe_signature(&body, signature, secret, Utc::now().timestamp()) {
        tracing::warn!("stripe webhook signature rejected: {}", reason);
        return Err(AppError::bad_request("invalid_signature", "Signature verification failed"));
    }

    let event: Value = serde_json::from_slice(&body).map_err(|e| {
        tracing::warn!("stripe webhook payload malformed: {}", e);
        AppError::bad_request("invalid_payload", "Malformed payload")
    })?;
    let event_type = event["type"].as_str().unwrap_or_default();
    let object = &event["data"]["object"];

    match event_type {
        "checkout.session.completed" => checkout_completed(&state, object).await?,
        "payment_intent.succeeded" => payment_succeeded(&state, object).await?,
        other => tracing::info!(event_type = other, "stripe event ignored"),
    }

    Ok(Json(json!({ "received": true })))
}

/// Approves the sponsor behind a paid Checkout session, creating one when the
/// email is unknown.
async fn checkout_completed(state: &AppState, session: &Value) -> Result<(), AppError> {
    let email = session["customer_email"]
        .as_str()
        .or_else(|| session["customer_details"]["email"].as_str())
        .map(|e| e.trim().to_lowercase())
        .filter(|e| !e.is_empty());
    let amount_total = session["amount_total"].as_i64().map(|c| c.max(0));
    let cents = amount_total.unwrap_or(0);
    tracing::info!(session = session["id"].as_str().unwrap_or_default(), cents, "checkout completed");

    let Some(email) = email else {
        tracing::warn!("checkout session without customer email");
        return Ok(());
    };

    let existing = sponsor::Entity::find()
        .filter(sponsor::Column::Email.eq(email.as_str()))
        .filter(sponsor::Column::Deleted.eq(false))
        .order_by_desc(sponsor::Column::CreatedAt)
        .one(&state.db)
        .await?;

    let updated = match existing {
        Some(found) => {
            let mut active: sponsor::ActiveModel = found.into();
            active.status = Set(SponsorStatus::Approved.as_str().to_string());
            if let Some(cents) = amount_total {
                active.amount = Set(cents);
            }
            active.update(&state.db).await?
        }
        None => {
            let name = session["customer_details"]["name"]
                .as_str()
                .map(str::trim)
                .filter(|n| !n.is_empty())
                .unwrap_or(email.as_str())
                .to_string();
            sponsor::ActiveModel {
                name: Set(name),
                email: Set(Some(email.clone())),
                amount: Set(cents),
                status: Set(SponsorStatus::Approved.as_str().to_string()),
                payment_intent: Set(session["payment_intent"].as_str().map(str::to_string)),
                ..Default::default()
            }
            .insert(&state.db)
            .await?
        }
    };

    tracing::info!(sponsor_id = updated.id, "sponsor approved from checkout");
    state.events.contribution(&updated.name, updated.amount, None);
    Ok(())
}

/// Completes the linked sponsor, or records a donation from the intent metadata.
async fn payment_succeeded(state: &AppState, intent: &Value) -> Result<(), AppError> {
    let Some(intent_id) = intent["id"].as_str().filter(|id| !id.is_empty()) else {
        tracing::warn!("payment_intent.succeeded without an id");
        return Ok(());
    };
    let cents = intent["amount_received"].as_i64().unwrap_or(0).max(0);
    tracing::info!(intent = intent_id, cents, "payment succeeded");

    let linked = sponsor::Entity::find()
        .filter(sponsor::Column::PaymentIntent.eq(intent_id))
        .one(&state.db)
        .await?;

    if let Some(found) = linked {
        if found.status == SponsorStatus::Completed.as_str() && found.amount == cents {
            tracing::info!(sponsor_id = found.id, "payment already confirmed");
            return Ok(());
        }
        let mut active: sponsor::ActiveModel = found.into();
        active.status = Set(SponsorStatus::Completed.as_str().to_string());
        active.amount = Set(cents);
        let updated = active.update(&state.db).await?;
        tracing::info!(sponsor_id = updated.id, "sponsor payment confirmed");
        state.events.contribution(&updated.name, cents, None);
        return Ok(());
    }

    if cents == 0 {
        return Ok(());
    }
    let metadata = &intent["metadata"];
    let text = |key: &str| {
        metadata[key]
            .as_str()
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    };
    let name = text("donor_name").unwrap_or_else(|| "Anonymous".to_string());
    let email = text("donor_email")
        .or_else(|| intent["receipt_email"].as_str().map(str::to_string))
        .map(|e| e.to_lowercase());
    let team = text("team");

    let recorded = record_donation(&state.db, &name, email, team.as_deref(), cents, Some(intent_id)).await?;
    if let Some(donation) = recorded {
        tracing::info!(donation_id = donation.id, "donation recorded from payment intent");
        state.events.contribution(&donation.name, cents, None);
    }
    Ok(())
}
