//! Local stand-in for the Stripe, PayPal and OpenAI HTTP APIs. Every request
//! is recorded so tests can assert on counts, headers and bodies.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    Json, Router,
};
use serde_json::json;

#[derive(Debug, Clone)]
pub struct Behavior {
    /// `expires_in` returned with each PayPal token.
    pub paypal_expires_in: u64,
    /// The first N PayPal tokens issued are refused by the orders API with a 401.
    pub paypal_rejected_tokens: usize,
    /// The first N chat completion calls fail with a 503.
    pub openai_failures: usize,
    pub openai_reply: String,
}

impl Default for Behavior {
    fn default() -> Self {
        Self {
            paypal_expires_in: 32_400,
            paypal_rejected_tokens: 0,
            openai_failures: 0,
            openai_reply: "Practice is Tuesdays at 6pm.".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Recorded {
    pub method: Method,
    pub path: String,
    pub headers: HeaderMap,
    pub body: String,
}

impl Recorded {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn form(&self) -> Vec<(String, String)> {
        url::form_urlencoded::parse(self.body.as_bytes()).into_owned().collect()
    }

    pub fn form_value(&self, key: &str) -> Option<String> {
        self.form().into_iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }
}

struct MockState {
    behavior: Behavior,
    requests: Mutex<Vec<Recorded>>,
    tokens_issued: AtomicUsize,
    chat_calls: AtomicUsize,
}

pub struct MockProviders {
    pub base: String,
    state: Arc<MockState>,
}

impl MockProviders {
    pub async fn start(behavior: Behavior) -> Self {
        let state = Arc::new(MockState {
            behavior,
            requests: Mutex::new(Vec::new()),
            tokens_issued: AtomicUsize::new(0),
            chat_calls: AtomicUsize::new(0),
        });
        let router = Router::new().fallback(respond).with_state(state.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        Self { base: format!("http://{addr}"), state }
    }

    pub fn requests(&self, path: &str) -> Vec<Recorded> {
        self.state
            .requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.path == path)
            .cloned()
            .collect()
    }

    pub fn count(&self, path: &str) -> usize {
        self.requests(path).len()
    }
}

/// Number of a `Bearer token-N` header, 0 when absent.
fn token_number(headers: &HeaderMap) -> usize {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer token-"))
        .and_then(|n| n.parse().ok())
        .unwrap_or(0)
}

async fn respond(
    State(state): State<Arc<MockState>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let path = uri.path().to_string();
    state.requests.lock().unwrap().push(Recorded {
        method,
        path: path.clone(),
        headers: headers.clone(),
        body: String::from_utf8_lossy(&body).into_owned(),
    });
    let behavior = &state.behavior;

    match path.as_str() {
        "/v1/payment_intents" => Json(json!({
            "id": "pi_mock_1",
            "client_secret": "pi_mock_1_secret_abc",
        }))
        .into_response(),
        "/v1/oauth2/token" => {
            let n = state.tokens_issued.fetch_add(1, Ordering::SeqCst) + 1;
            Json(json!({
                "access_token": format!("token-{n}"),
                "token_type": "Bearer",
                "expires_in": behavior.paypal_expires_in,
            }))
            .into_response()
        }
        p if p.starts_with("/v2/checkout/orders") => {
            if token_number(&headers) <= behavior.paypal_rejected_tokens {
                return (StatusCode::UNAUTHORIZED, Json(json!({ "message": "token expired" }))).into_response();
            }
            if p.ends_with("/capture") {
                Json(json!({
                    "id": "ORDER-1",
                    "status": "COMPLETED",
                    "payer": {
                        "name": { "given_name": "Pat", "surname": "Lee" },
                        "email_address": "pat@example.org",
                    },
                    "purchase_units": [{
                        "payments": { "captures": [{ "amount": { "currency_code": "USD", "value": "25.00" } }] }
                    }],
                }))
                .into_response()
            } else {
                Json(json!({ "id": "ORDER-1", "status": "CREATED" })).into_response()
            }
        }
        "/chat/completions" => {
            let n = state.chat_calls.fetch_add(1, Ordering::SeqCst);
            if n < behavior.openai_failures {
                return (StatusCode::SERVICE_UNAVAILABLE, Json(json!({ "error": "overloaded" }))).into_response();
            }
            Json(json!({
                "choices": [{ "message": { "role": "assistant", "content": behavior.openai_reply } }]
            }))
            .into_response()
        }
        _ => StatusCode::NOT_FOUND.into_response(),
    }
}
