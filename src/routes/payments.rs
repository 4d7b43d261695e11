use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use sea_orm::{ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter, Set};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use utoipa::ToSchema;

use crate::entities::donation;
use crate::error::AppError;
use crate::goals::active_goal;
use crate::payments::{parse_money, AmountInput, IntentDetails};
use crate::routes::{bearer_token, resolve_team};
use crate::AppState;

#[derive(Debug, Deserialize, ToSchema)]
pub struct IntentRequest {
    #[serde(flatten)]
    pub amount: AmountInput,
    pub donor_name: Option<String>,
    pub donor_email: Option<String>,
    /// Team slug the money is for.
    pub team: Option<String>,
    /// Impact bucket, e.g. `travel`; defaults to `allocation`.
    pub bucket: Option<String>,
    pub source: Option<String>,
    pub description: Option<String>,
    pub note: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct IntentResponse {
    pub client_secret: String,
    pub publishable_key: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct OrderRequest {
    #[serde(flatten)]
    pub amount: AmountInput,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CaptureRequest {
    #[serde(rename = "orderID", alias = "order_id")]
    pub order_id: Option<String>,
    pub donor_name: Option<String>,
    pub donor_email: Option<String>,
    pub team: Option<String>,
}

fn trimmed(raw: Option<&str>) -> Option<String> {
    raw.map(str::trim).filter(|s| !s.is_empty()).map(str::to_string)
}

fn require_bearer(state: &AppState, headers: &HeaderMap) -> Result<(), AppError> {
    if !state.config.payments.require_bearer {
        return Ok(());
    }
    match bearer_token(headers) {
        Some(token) if !state.config.admin_auth_enabled() || state.config.token_allowed(token) => Ok(()),
        _ => Err(AppError::Unauthorized),
    }
}

/// Creates a Stripe PaymentIntent for the Payment Element.
#[utoipa::path(
    post,
    path = "/api/payments/stripe/intent",
    request_body = IntentRequest,
    responses(
        (status = 200, description = "Intent created", body = IntentResponse),
        (status = 400, description = "Invalid amount or Stripe error"),
        (status = 401, description = "Bearer token required"),
        (status = 500, description = "Stripe is not configured")
    )
)]
#[tracing::instrument(skip_all)]
pub async fn stripe_intent(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<IntentRequest>,
) -> Result<Json<IntentResponse>, AppError> {
    require_bearer(&state, &headers)?;
    let money = parse_money(&request.amount)?;

    let donor_name = trimmed(request.donor_name.as_deref());
    let donor_email = trimmed(request.donor_email.as_deref()).map(|e| e.to_lowercase());
    let mut metadata = vec![
        ("app".to_string(), "fundchamps".to_string()),
        ("bucket".to_string(), trimmed(request.bucket.as_deref()).unwrap_or_else(|| "allocation".into())),
        ("source".to_string(), trimmed(request.source.as_deref()).unwrap_or_else(|| "web".into())),
    ];
    if let Some(name) = &donor_name {
        metadata.push(("donor_name".into(), name.clone()));
    }
    if let Some(email) = &donor_email {
        metadata.push(("donor_email".into(), email.clone()));
    }
    if let Some(team) = trimmed(request.team.as_deref()) {
        metadata.push(("team".into(), team));
    }
    if let Some(note) = trimmed(request.note.as_deref()) {
        metadata.push(("note".into(), note.chars().take(450).collect()));
    }

    let description = trimmed(request.description.as_deref())
        .unwrap_or_else(|| format!("{} donation", state.config.team.team_name));
    let idempotency_key = headers
        .get("Idempotency-Key")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let intent = state
        .payments
        .create_stripe_intent(
            money,
            IntentDetails { description, receipt_email: donor_email, metadata, idempotency_key },
        )
        .await?;
    tracing::info!(intent = %intent.id, cents = money.cents, "stripe intent created");

    Ok(Json(IntentResponse {
        client_secret: intent.client_secret,
        publishable_key: state.config.payments.stripe_publishable_key.clone().unwrap_or_default(),
    }))
}

/// Creates a PayPal order to approve client-side.
#[utoipa::path(
    post,
    path = "/api/payments/paypal/order",
    request_body = OrderRequest,
    responses(
        (status = 200, description = "PayPal order"),
        (status = 400, description = "Invalid amount or PayPal error"),
        (status = 500, description = "PayPal is not configured")
    )
)]
#[tracing::instrument(skip_all)]
pub async fn paypal_order(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<OrderRequest>,
) -> Result<Json<Value>, AppError> {
    require_bearer(&state, &headers)?;
    let money = parse_money(&request.amount)?;
    let description = trimmed(request.description.as_deref())
        .unwrap_or_else(|| format!("Donation to {}", state.config.team.team_name));
    let order = state.payments.create_paypal_order(money, &description).await?;
    tracing::info!(order = order["id"].as_str().unwrap_or_default(), "paypal order created");
    Ok(Json(order))
}

/// Sum of `purchase_units[].payments.captures[].amount.value`, in cents.
fn captured_cents(capture: &Value) -> i64 {
    capture["purchase_units"]
        .as_array()
        .into_iter()
        .flatten()
        .flat_map(|unit| unit["payments"]["captures"].as_array().into_iter().flatten())
        .filter_map(|c| c["amount"]["value"].as_str()?.parse::<f64>().ok())
        .map(crate::entities::cents_from_dollars)
        .sum()
}

/// Inserts a donation linked to the team's active goal. Returns `None` when a
/// donation with the same payment reference already exists.
pub(crate) async fn record_donation(
    db: &DatabaseConnection,
    name: &str,
    email: Option<String>,
    team_slug: Option<&str>,
    cents: i64,
    payment_intent: Option<&str>,
) -> Result<Option<donation::Model>, DbErr> {
    if let Some(reference) = payment_intent {
        let existing = donation::Entity::find()
            .filter(donation::Column::PaymentIntent.eq(reference))
            .one(db)
            .await?;
        if let Some(existing) = existing {
            tracing::info!(donation_id = existing.id, reference, "payment already recorded");
            return Ok(None);
        }
    }

    let team_id = resolve_team(db, team_slug).await?.map(|t| t.id);
    let goal_id = match team_id {
        Some(id) => active_goal(db, Some(id)).await?.map(|g| g.id),
        None => None,
    };
    donation::ActiveModel {
        name: Set(name.to_string()),
        email: Set(email),
        team_id: Set(team_id),
        campaign_goal_id: Set(goal_id),
        amount_cents: Set(cents),
        payment_intent: Set(payment_intent.map(str::to_string)),
        ..Default::default()
    }
    .insert(db)
    .await
    .map(Some)
}

/// Captures an approved PayPal order and records the donation.
#[utoipa::path(
    post,
    path = "/api/payments/paypal/capture",
    request_body = CaptureRequest,
    responses(
        (status = 200, description = "Capture result from PayPal"),
        (status = 400, description = "Missing order id or PayPal error"),
        (status = 500, description = "PayPal is not configured")
    )
)]
#[tracing::instrument(skip_all)]
pub async fn paypal_capture(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<CaptureRequest>,
) -> Result<Json<Value>, AppError> {
    require_bearer(&state, &headers)?;
    let order_id = request.order_id.as_deref().unwrap_or_default();
    let capture = state.payments.capture_paypal_order(order_id).await?;

    if capture["status"].as_str() == Some("COMPLETED") {
        let cents = captured_cents(&capture);
        if cents > 0 {
            let payer = &capture["payer"];
            let name = trimmed(request.donor_name.as_deref())
                .or_else(|| {
                    let given = payer["name"]["given_name"].as_str().unwrap_or_default();
                    let surname = payer["name"]["surname"].as_str().unwrap_or_default();
                    trimmed(Some(&format!("{given} {surname}")))
                })
                .unwrap_or_else(|| "PayPal Donor".to_string());
            let email = trimmed(request.donor_email.as_deref())
                .or_else(|| trimmed(payer["email_address"].as_str()));
            let reference = format!("paypal:{}", order_id.trim());
            let recorded =
                record_donation(&state.db, &name, email, request.team.as_deref(), cents, Some(&reference)).await?;
            if let Some(donation) = recorded {
                tracing::info!(donation_id = donation.id, cents, "paypal donation recorded");
                state.events.contribution(&donation.name, cents, None);
            }
        }
    }
    Ok(Json(capture))
}

/// Public keys the browser needs to render the payment widgets.
#[utoipa::path(get, path = "/api/payments/config", responses((status = 200, description = "Public payment settings")))]
pub async fn payments_config(State(state): State<AppState>) -> impl IntoResponse {
    let payments = &state.config.payments;
    Json(json!({
        "stripe_publishable_key": payments.stripe_publishable_key.clone().unwrap_or_default(),
        "paypal_client_id": payments.paypal_client_id.clone().unwrap_or_default(),
        "currency": payments.currency,
        "min_amount_cents": crate::payments::MIN_CENTS,
    }))
}

/// Which providers are configured; 503 when none is.
#[utoipa::path(
    get,
    path = "/api/payments/readiness",
    responses(
        (status = 200, description = "At least one provider is ready"),
        (status = 503, description = "No provider configured")
    )
)]
pub async fn readiness(State(state): State<AppState>) -> impl IntoResponse {
    let stripe = state.payments.stripe_ready();
    let paypal = state.payments.paypal_ready();
    let webhook = state.config.payments.stripe_webhook_secret.is_some();
    let status = if stripe || paypal { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (
        status,
        Json(json!({
            "ready": stripe || paypal,
            "stripe": stripe,
            "stripe_webhook": webhook,
            "paypal": paypal,
        })),
    )
}
