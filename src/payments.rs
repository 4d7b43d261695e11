//! Thin clients for the two card processors: Stripe PaymentIntents and
//! PayPal Orders, plus the shared money parsing both sides rely on.

use std::time::{Duration, Instant};

use hmac::{Hmac, Mac};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sha2::Sha256;
use tokio::sync::Mutex;
use utoipa::ToSchema;

use crate::config::PaymentsConfig;
use crate::error::AppError;
use crate::impact::parse_amount;

/// Smallest charge we accept, in cents.
pub const MIN_CENTS: i64 = 100;
pub const DEFAULT_AMOUNT_DOLLARS: f64 = 5.0;
/// Stripe signatures older (or newer) than this are rejected.
pub const SIGNATURE_TOLERANCE_SECS: u64 = 300;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub struct Money {
    pub cents: i64,
}

impl Money {
    pub fn dollars(&self) -> f64 {
        crate::entities::dollars(self.cents)
    }

    /// PayPal order value: "12.50", or "12" for whole dollars.
    pub fn paypal_value(&self) -> String {
        let formatted = format!("{}.{:02}", self.cents / 100, self.cents % 100);
        formatted.strip_suffix(".00").map(str::to_string).unwrap_or(formatted)
    }
}

/// Amount fields shared by the Stripe and PayPal payloads.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct AmountInput {
    /// Integer cents; wins over `amount` when present.
    #[schema(value_type = Option<i64>)]
    pub amount_cents: Option<Value>,
    /// Dollars, defaults to 5.00.
    #[schema(value_type = Option<f64>)]
    pub amount: Option<Value>,
    pub currency: Option<String>,
}

fn invalid_amount(message: impl Into<String>) -> AppError {
    AppError::bad_request("invalid_amount", message)
}

/// Validates an amount in USD, rejecting anything under $1.00.
pub fn parse_money(input: &AmountInput) -> Result<Money, AppError> {
    let currency = input
        .currency
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .unwrap_or("usd");
    if !currency.eq_ignore_ascii_case("usd") {
        return Err(invalid_amount("Only USD is supported"));
    }

    let cents = match (&input.amount_cents, &input.amount) {
        (Some(raw), _) if !raw.is_null() => match raw {
            Value::Number(n) => n.as_i64().ok_or_else(|| invalid_amount("amount_cents must be an integer"))?,
            Value::String(s) => s
                .trim()
                .parse::<i64>()
                .map_err(|_| invalid_amount("amount_cents must be an integer"))?,
            _ => return Err(invalid_amount("amount_cents must be an integer")),
        },
        (_, Some(raw)) if !raw.is_null() => {
            let dollars = parse_amount(raw)
                .filter(|d| d.is_finite())
                .ok_or_else(|| invalid_amount("amount must be a number"))?;
            (dollars * 100.0).round() as i64
        }
        _ => (DEFAULT_AMOUNT_DOLLARS * 100.0).round() as i64,
    };

    if cents < MIN_CENTS {
        return Err(invalid_amount("Minimum amount is $1.00"));
    }
    Ok(Money { cents })
}

/// Checks a `Stripe-Signature` header (`t=<unix>,v1=<hex>[,v1=...]`) against
/// the raw request body.
pub fn verify_stripe_signature(
    payload: &[u8],
    header: &str,
    secret: &str,
    now_unix: i64,
) -> Result<(), &'static str> {
    let mut timestamp = None;
    let mut signatures = Vec::new();
    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", v)) => timestamp = v.parse::<i64>().ok(),
            Some(("v1", v)) => signatures.push(v.to_string()),
            _ => {}
        }
    }
    let timestamp = timestamp.ok_or("missing timestamp")?;
    if signatures.is_empty() {
        return Err("missing v1 signature");
    }
    if now_unix.abs_diff(timestamp) > SIGNATURE_TOLERANCE_SECS {
        return Err("timestamp outside tolerance");
    }

    for sig in &signatures {
        let Ok(expected) = hex::decode(sig) else { continue };
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| "invalid secret")?;
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(payload);
        if mac.verify_slice(&expected).is_ok() {
            return Ok(());
        }
    }
    Err("signature mismatch")
}

/// Builds a header value the way Stripe does; used by tests and local tooling.
pub fn sign_stripe_payload(payload: &[u8], secret: &str, timestamp: i64) -> String {
    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return format!("t={timestamp}"),
    };
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    format!("t={timestamp},v1={}", hex::encode(mac.finalize().into_bytes()))
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct StripeIntent {
    pub id: String,
    pub client_secret: String,
}

/// Extra fields stored on the PaymentIntent.
#[derive(Debug, Clone, Default)]
pub struct IntentDetails {
    pub description: String,
    pub receipt_email: Option<String>,
    pub metadata: Vec<(String, String)>,
    pub idempotency_key: Option<String>,
}

#[derive(Debug)]
struct CachedToken {
    token: String,
    expires_at: Instant,
}

#[derive(Debug, Deserialize)]
struct PaypalToken {
    access_token: String,
    #[serde(default)]
    expires_in: u64,
}

#[derive(Debug)]
pub struct PaymentsClient {
    http: Client,
    config: PaymentsConfig,
    paypal_token: Mutex<Option<CachedToken>>,
}

impl PaymentsClient {
    pub fn new(http: Client, config: PaymentsConfig) -> Self {
        Self { http, config, paypal_token: Mutex::new(None) }
    }

    pub fn config(&self) -> &PaymentsConfig {
        &self.config
    }

    pub fn stripe_ready(&self) -> bool {
        self.config.stripe_secret_key.is_some()
    }

    pub fn paypal_ready(&self) -> bool {
        self.config.paypal_client_id.is_some() && self.config.paypal_secret.is_some()
    }

    #[tracing::instrument(skip(self, details), fields(cents = money.cents))]
    pub async fn create_stripe_intent(
        &self,
        money: Money,
        details: IntentDetails,
    ) -> Result<StripeIntent, AppError> {
        let secret = self
            .config
            .stripe_secret_key
            .as_deref()
            .ok_or_else(|| AppError::config("stripe_config", "Stripe is not configured"))?;

        let mut form: Vec<(String, String)> = vec![
            ("amount".into(), money.cents.to_string()),
            ("currency".into(), "usd".into()),
            ("automatic_payment_methods[enabled]".into(), "true".into()),
            ("description".into(), details.description),
        ];
        if let Some(email) = details.receipt_email.filter(|e| !e.is_empty()) {
            form.push(("receipt_email".into(), email));
        }
        for (key, value) in details.metadata {
            form.push((format!("metadata[{key}]"), value));
        }

        let mut request = self
            .http
            .post(format!("{}/v1/payment_intents", self.config.stripe_api_base))
            .bearer_auth(secret)
            .form(&form);
        if let Some(key) = details.idempotency_key.filter(|k| !k.is_empty()) {
            request = request.header("Idempotency-Key", key);
        }

        let response = request.send().await?;
        let status = response.status();
        let body: Value = response.json().await.unwrap_or(Value::Null);
        if !status.is_success() {
            let message = body["error"]["message"]
                .as_str()
                .unwrap_or("Stripe rejected the request")
                .to_string();
            tracing::warn!(%status, "stripe intent failed: {}", message);
            return Err(AppError::bad_request("stripe_error", message));
        }

        Ok(serde_json::from_value(body)?)
    }

    async fn paypal_access_token(&self, force_refresh: bool) -> Result<String, AppError> {
        let (Some(client_id), Some(secret)) =
            (self.config.paypal_client_id.as_deref(), self.config.paypal_secret.as_deref())
        else {
            return Err(AppError::config("paypal_config", "PayPal is not configured"));
        };

        let mut cached = self.paypal_token.lock().await;
        if !force_refresh {
            if let Some(token) = cached.as_ref().filter(|t| t.expires_at > Instant::now()) {
                return Ok(token.token.clone());
            }
        }

        let response = self
            .http
            .post(format!("{}/v1/oauth2/token", self.config.paypal_api_base))
            .basic_auth(client_id, Some(secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await?;
        if !response.status().is_success() {
            tracing::warn!(status = %response.status(), "paypal token request failed");
            return Err(AppError::bad_request("paypal_error", "Could not authenticate with PayPal"));
        }
        let token: PaypalToken = response.json().await?;
        let ttl = token_ttl(token.expires_in);
        *cached = Some(CachedToken { token: token.access_token.clone(), expires_at: Instant::now() + ttl });
        Ok(token.access_token)
    }

    /// Sends an authenticated PayPal call, refreshing the token once on a 401.
    async fn paypal_post(&self, path: &str, body: &Value) -> Result<Value, AppError> {
        let url = format!("{}{}", self.config.paypal_api_base, path);
        let mut token = self.paypal_access_token(false).await?;
        for attempt in 0..2 {
            let response = self.http.post(&url).bearer_auth(&token).json(body).send().await?;
            let status = response.status();
            if status == StatusCode::UNAUTHORIZED && attempt == 0 {
                tracing::info!("paypal token rejected; refreshing");
                token = self.paypal_access_token(true).await?;
                continue;
            }
            let payload: Value = response.json().await.unwrap_or(Value::Null);
            if !status.is_success() {
                let message = payload["message"].as_str().unwrap_or("PayPal rejected the request").to_string();
                tracing::warn!(%status, "paypal call failed: {}", message);
                return Err(AppError::bad_request("paypal_error", message));
            }
            return Ok(payload);
        }
        Err(AppError::bad_request("paypal_error", "PayPal rejected the credentials"))
    }

    #[tracing::instrument(skip(self), fields(cents = money.cents))]
    pub async fn create_paypal_order(&self, money: Money, description: &str) -> Result<Value, AppError> {
        let body = json!({
            "intent": "CAPTURE",
            "purchase_units": [{
                "amount": { "currency_code": "USD", "value": money.paypal_value() },
                "description": description,
            }],
        });
        self.paypal_post("/v2/checkout/orders", &body).await
    }

    #[tracing::instrument(skip(self))]
    pub async fn capture_paypal_order(&self, order_id: &str) -> Result<Value, AppError> {
        let order_id = order_id.trim();
        if order_id.is_empty() {
            return Err(AppError::bad_request("missing_order_id", "orderID is required"));
        }
        let path = format!("/v2/checkout/orders/{}/capture", urlencode_segment(order_id));
        self.paypal_post(&path, &json!({})).await
    }
}

/// Cached PayPal tokens are reused for 90% of `expires_in` (at least a minute).
fn token_ttl(expires_in: u64) -> Duration {
    Duration::from_secs(expires_in.max(60) * 9 / 10)
}

fn urlencode_segment(raw: &str) -> String {
    url::form_urlencoded::byte_serialize(raw.as_bytes()).collect()
}
