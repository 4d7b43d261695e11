//! Twilio-compatible SMS concierge: keyword shortcuts, an AI fallback and a
//! log row for every exchange.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode, Uri},
    response::{IntoResponse, Response},
    Form, Json,
};
use backoff::{backoff::Backoff, ExponentialBackoff};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use hmac::{Hmac, Mac};
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, Set};
use serde_json::{json, Value};
use sha1::Sha1;

use crate::config::{Config, SmsConfig};
use crate::entities::sms_log;
use crate::error::AppError;
use crate::AppState;

type HmacSha1 = Hmac<Sha1>;

pub const SIGNATURE_HEADER: &str = "x-twilio-signature";

/// Sliding-window limiter keyed by sender number.
#[derive(Debug)]
pub struct SmsRateLimiter {
    max: usize,
    window: Duration,
    hits: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl SmsRateLimiter {
    pub fn new(max: usize, window: Duration) -> Self {
        Self { max, window, hits: Mutex::new(HashMap::new()) }
    }

    /// Records a message from `sender` unless it is over the limit.
    /// An empty sender is never limited.
    pub fn check(&self, sender: &str) -> bool {
        self.check_at(sender, Instant::now())
    }

    fn check_at(&self, sender: &str, now: Instant) -> bool {
        if sender.is_empty() {
            return false;
        }
        let mut hits = self.hits.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        // Drop expired hits for every sender; drained senders leave the map.
        hits.retain(|_, queue| {
            while queue.front().is_some_and(|t| now.duration_since(*t) > self.window) {
                queue.pop_front();
            }
            !queue.is_empty()
        });
        if hits.get(sender).map_or(0, VecDeque::len) >= self.max {
            return true;
        }
        hits.entry(sender.to_string()).or_default().push_back(now);
        false
    }
}

/// Cuts to `limit` characters, the last one an ellipsis.
pub fn trim_message(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(limit.saturating_sub(1)).collect();
    cut.push('…');
    cut
}

pub fn xml_escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            other => out.push(other),
        }
    }
    out
}

fn twiml(message: &str) -> Response {
    let xml = format!(
        r#"<?xml version="1.0" encoding="UTF-8"?><Response><Message>{}</Message></Response>"#,
        xml_escape(message)
    );
    ([(header::CONTENT_TYPE, "application/xml")], xml).into_response()
}

fn signature_mac(auth_token: &str, url: &str, params: &HashMap<String, String>) -> Option<HmacSha1> {
    let sorted: BTreeMap<&String, &String> = params.iter().collect();
    let mut mac = HmacSha1::new_from_slice(auth_token.as_bytes()).ok()?;
    mac.update(url.as_bytes());
    for (key, value) in sorted {
        mac.update(key.as_bytes());
        mac.update(value.as_bytes());
    }
    Some(mac)
}

/// base64(HMAC-SHA1(token, url + each sorted key and value)).
pub fn twilio_signature(auth_token: &str, url: &str, params: &HashMap<String, String>) -> String {
    signature_mac(auth_token, url, params)
        .map(|mac| STANDARD.encode(mac.finalize().into_bytes()))
        .unwrap_or_default()
}

fn verify_twilio_signature(
    sms: &SmsConfig,
    headers: &HeaderMap,
    url: &str,
    params: &HashMap<String, String>,
) -> Result<(), AppError> {
    let Some(token) = sms.twilio_auth_token.as_deref().filter(|_| sms.require_signature) else {
        return Ok(());
    };
    let provided = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| STANDARD.decode(v).ok());
    let verified = match (provided, signature_mac(token, url, params)) {
        (Some(provided), Some(mac)) => mac.verify_slice(&provided).is_ok(),
        _ => false,
    };
    if !verified {
        tracing::warn!("twilio signature verification failed");
        return Err(AppError::Forbidden("Invalid Twilio signature".into()));
    }
    Ok(())
}

/// The URL Twilio signed: the configured public base, else the Host header.
fn signed_url(sms: &SmsConfig, headers: &HeaderMap, uri: &Uri) -> String {
    let path = uri.path_and_query().map(|p| p.as_str()).unwrap_or("/sms/webhook");
    if let Some(base) = &sms.public_base_url {
        return format!("{}{}", base.trim_end_matches('/'), path);
    }
    let host = headers.get(header::HOST).and_then(|v| v.to_str().ok()).unwrap_or("localhost");
    let scheme = headers
        .get("X-Forwarded-Proto")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("https");
    format!("{scheme}://{host}{path}")
}

/// Fixed replies for compliance and common intents.
pub fn keyword_reply(text: &str, config: &Config) -> Option<String> {
    let keyword = text.trim().to_uppercase();
    let reply = match keyword.as_str() {
        "STOP" | "STOPALL" | "UNSUBSCRIBE" | "CANCEL" | "END" | "QUIT" => {
            "You will no longer receive messages from us. Reply START to re-subscribe.".to_string()
        }
        "START" | "YES" | "UNSTOP" => "You have been re-subscribed. Text HELP for help.".to_string(),
        "HELP" => format!(
            "{}: Reply STOP to unsubscribe. Donate: {} Sponsor: {}",
            config.brand_name, config.donate_url, config.sponsor_url
        ),
        "DONATE" | "DONATION" => format!("Thanks for supporting! Donate here: {}", config.donate_url),
        "SPONSOR" | "SPONSORSHIP" => {
            format!("We’d love to partner! Become a sponsor: {}", config.sponsor_url)
        }
        "TRYOUT" | "TRYOUTS" | "SCHEDULE" => format!("Tryouts & events: {}", config.tryouts_url),
        _ => return None,
    };
    Some(reply)
}

/// One chat completion, retried with exponential backoff up to `max_retries` times.
/// Returns the reply and the error to log, if any.
#[tracing::instrument(skip_all)]
async fn ai_reply(state: &AppState, text: &str) -> (String, Option<String>) {
    let sms = &state.config.sms;
    let site = &state.config.site_url;
    let Some(api_key) = sms.openai_api_key.as_deref() else {
        return (
            format!("Sorry, our AI is busy. You can sponsor or donate at {site}."),
            Some("OpenAI client not initialized".to_string()),
        );
    };

    let body = json!({
        "model": sms.model,
        "messages": [
            { "role": "system", "content": sms.system_prompt },
            { "role": "user", "content": text },
        ],
        "max_tokens": sms.max_tokens,
        "temperature": sms.temperature,
    });
    let url = format!("{}/chat/completions", sms.openai_api_base.trim_end_matches('/'));

    let mut delays = ExponentialBackoff {
        current_interval: Duration::from_millis(250),
        initial_interval: Duration::from_millis(250),
        max_elapsed_time: None,
        ..Default::default()
    };
    let attempts = sms.max_retries + 1;
    let mut last_err = String::from("unknown error");

    for attempt in 1..=attempts {
        let result = async {
            let response = state
                .http
                .post(&url)
                .bearer_auth(api_key)
                .timeout(Duration::from_secs(sms.timeout_secs))
                .json(&body)
                .send()
                .await?
                .error_for_status()?;
            response.json::<Value>().await
        }
        .await;

        match result {
            Ok(payload) => {
                let reply = payload["choices"][0]["message"]["content"]
                    .as_str()
                    .unwrap_or_default()
                    .trim()
                    .to_string();
                let err = reply.is_empty().then(|| "Empty OpenAI response".to_string());
                return (trim_message(&reply, sms.max_outbound_len), err);
            }
            Err(e) => {
                last_err = e.to_string();
                tracing::warn!(attempt, "AI reply attempt failed: {}", last_err);
                if attempt < attempts {
                    if let Some(delay) = delays.next_backoff() {
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }
    }

    (format!("Thanks for reaching out! Learn more at {site}."), Some(last_err))
}

fn form_field<'a>(params: &'a HashMap<String, String>, key: &str) -> &'a str {
    params.get(key).map(|v| v.trim()).unwrap_or_default()
}

struct Exchange<'a> {
    message_sid: Option<&'a str>,
    from: &'a str,
    to: &'a str,
    inbound: &'a str,
}

async fn log_exchange(state: &AppState, exchange: &Exchange<'_>, reply: &str, ai_used: bool, error: Option<String>) {
    let entry = sms_log::ActiveModel {
        message_sid: Set(exchange.message_sid.map(str::to_string)),
        from_number: Set(Some(exchange.from.to_string()).filter(|f| !f.is_empty())),
        to_number: Set(exchange.to.to_string()),
        message_body: Set(exchange.inbound.to_string()),
        response_body: Set(reply.to_string()),
        ai_used: Set(ai_used),
        error: Set(error),
        ..Default::default()
    };
    if let Err(e) = entry.insert(&state.db).await {
        tracing::error!("failed to log sms: {}", e);
    }
}

/// Inbound SMS webhook; replies with TwiML.
#[utoipa::path(
    post,
    path = "/sms/webhook",
    request_body(content = String, content_type = "application/x-www-form-urlencoded",
        description = "Twilio fields: Body, From, To, MessageSid"),
    responses(
        (status = 200, description = "TwiML reply", content_type = "application/xml"),
        (status = 403, description = "Signature check failed")
    )
)]
pub async fn sms_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    uri: Uri,
    Form(params): Form<HashMap<String, String>>,
) -> Result<Response, AppError> {
    let sms = &state.config.sms;
    verify_twilio_signature(sms, &headers, &signed_url(sms, &headers, &uri), &params)?;

    let inbound = trim_message(params.get("Body").map(String::as_str).unwrap_or_default(), sms.max_inbound_len);
    let exchange = Exchange {
        message_sid: Some(form_field(&params, "MessageSid")).filter(|s| !s.is_empty()),
        from: form_field(&params, "From"),
        to: form_field(&params, "To"),
        inbound: &inbound,
    };

    if let Some(sid) = exchange.message_sid {
        match sms_log::Entity::find()
            .filter(sms_log::Column::MessageSid.eq(sid))
            .one(&state.db)
            .await
        {
            Ok(Some(previous)) => {
                tracing::debug!(sid, "replaying reply for duplicate message");
                return Ok(twiml(&previous.response_body));
            }
            Ok(None) => {}
            Err(e) => tracing::warn!("sms dedupe lookup failed: {}", e),
        }
    }

    if state.sms_limiter.check(exchange.from) {
        let reply = "You’re sending messages quickly. Please wait a moment and try again.";
        log_exchange(&state, &exchange, reply, false, Some("rate_limited".into())).await;
        return Ok(twiml(reply));
    }

    if inbound.trim().is_empty() {
        let reply = format!("Hi! Say DONATE, SPONSOR, or TRYOUTS. More: {}", state.config.site_url);
        log_exchange(&state, &exchange, &reply, false, None).await;
        return Ok(twiml(&reply));
    }

    if let Some(reply) = keyword_reply(&inbound, &state.config) {
        log_exchange(&state, &exchange, &reply, false, None).await;
        return Ok(twiml(&reply));
    }

    let (reply, error) = ai_reply(&state, &inbound).await;
    let reply = if reply.is_empty() {
        format!("Thanks for your message! Learn more at {}.", state.config.site_url)
    } else {
        reply
    };
    log_exchange(&state, &exchange, &reply, error.is_none(), error).await;
    Ok(twiml(&reply))
}

/// AI and signature configuration for the concierge.
#[utoipa::path(get, path = "/sms/health", responses((status = 200, description = "Concierge status")))]
pub async fn sms_health(State(state): State<AppState>) -> impl IntoResponse {
    let sms = &state.config.sms;
    let openai = sms.openai_api_key.is_some();
    (
        StatusCode::OK,
        Json(json!({
            "status": "ok",
            "openai": openai,
            "model": openai.then(|| sms.model.clone()),
            "twilio_sig_required": sms.require_signature,
        })),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limiter_slides_per_sender() {
        let limiter = SmsRateLimiter::new(2, Duration::from_secs(60));
        let start = Instant::now();
        assert!(!limiter.check_at("+15125550100", start));
        assert!(!limiter.check_at("+15125550100", start));
        assert!(limiter.check_at("+15125550100", start));
        assert!(!limiter.check_at("+15125550199", start));
        assert!(!limiter.check_at("+15125550100", start + Duration::from_secs(61)));
        assert!(!limiter.check_at("", start));
    }

    #[test]
    fn limiter_forgets_quiet_senders() {
        let limiter = SmsRateLimiter::new(2, Duration::from_secs(60));
        let start = Instant::now();
        for n in 0..50 {
            assert!(!limiter.check_at(&format!("+1512555{n:04}"), start));
        }
        assert_eq!(limiter.hits.lock().unwrap().len(), 50);

        assert!(!limiter.check_at("+15125559999", start + Duration::from_secs(61)));
        let hits = limiter.hits.lock().unwrap();
        assert_eq!(hits.len(), 1);
        assert!(hits.contains_key("+15125559999"));
    }

    #[test]
    fn trims_with_ellipsis() {
        assert_eq!(trim_message("hello", 5), "hello");
        assert_eq!(trim_message("hello world", 6), "hello…");
        assert_eq!(trim_message("héllo wörld", 3).chars().count(), 3);
    }

    #[test]
    fn escapes_xml() {
        assert_eq!(xml_escape(r#"<a href="x">Tom & Jerry's</a>"#), "&lt;a href=&quot;x&quot;&gt;Tom &amp; Jerry&apos;s&lt;/a&gt;");
    }

    #[test]
    fn keywords_are_case_insensitive() {
        let config = Config::default();
        assert!(keyword_reply(" stop ", &config).unwrap().starts_with("You will no longer"));
        assert!(keyword_reply("Donate", &config).unwrap().contains(&config.donate_url));
        assert!(keyword_reply("schedule", &config).unwrap().starts_with("Tryouts & events"));
        assert_eq!(keyword_reply("what time is practice?", &config), None);
    }

    #[test]
    fn signature_covers_sorted_params() {
        let mut params = HashMap::new();
        params.insert("To".to_string(), "+15125550000".to_string());
        params.insert("Body".to_string(), "hi".to_string());
        let sig = twilio_signature("token", "https://example.org/sms/webhook", &params);

        let mut sms = SmsConfig::default();
        sms.twilio_auth_token = Some("token".into());
        sms.require_signature = true;
        let mut headers = HeaderMap::new();
        headers.insert(SIGNATURE_HEADER, sig.parse().unwrap());
        assert!(verify_twilio_signature(&sms, &headers, "https://example.org/sms/webhook", &params).is_ok());
        assert!(verify_twilio_signature(&sms, &headers, "https://evil.example/sms/webhook", &params).is_err());
        assert!(verify_twilio_signature(&sms, &HeaderMap::new(), "https://example.org/sms/webhook", &params).is_err());
    }
}
