use std::collections::BTreeMap;
use std::env;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::impact::{amount_or, ImpactCost, Strategy};

/// Runtime settings, read once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub bind_addr: String,
    /// Bearer tokens accepted by `/admin` and, optionally, the payment routes.
    pub api_tokens: Vec<String>,
    /// Per-IP budget for `/api` routes; `None` disables the limiter.
    pub rate_limit_per_minute: Option<u32>,
    pub brand_name: String,
    pub site_url: String,
    pub donate_url: String,
    pub sponsor_url: String,
    pub tryouts_url: String,
    pub payments: PaymentsConfig,
    pub sms: SmsConfig,
    pub notify: NotifyConfig,
    pub team: TeamConfig,
}

#[derive(Debug, Clone)]
pub struct PaymentsConfig {
    pub stripe_secret_key: Option<String>,
    pub stripe_publishable_key: Option<String>,
    pub stripe_webhook_secret: Option<String>,
    pub stripe_api_base: String,
    pub paypal_client_id: Option<String>,
    pub paypal_secret: Option<String>,
    pub paypal_api_base: String,
    pub require_bearer: bool,
    pub currency: String,
}

#[derive(Debug, Clone)]
pub struct SmsConfig {
    pub twilio_auth_token: Option<String>,
    pub require_signature: bool,
    /// Public origin Twilio posts to, used to rebuild the signed URL behind a proxy.
    pub public_base_url: Option<String>,
    pub openai_api_key: Option<String>,
    pub openai_api_base: String,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub rate_max: usize,
    pub rate_window_secs: u64,
    pub max_inbound_len: usize,
    pub max_outbound_len: usize,
    pub system_prompt: String,
}

#[derive(Debug, Clone)]
pub struct NotifyConfig {
    pub slack_webhook_url: Option<String>,
    pub mail_api_url: Option<String>,
    pub mail_api_key: Option<String>,
    pub mail_from: String,
    pub max_concurrency: usize,
}

const DEFAULT_SITE_URL: &str = "https://connectatxelite.com";

const DEFAULT_SYSTEM_PROMPT: &str = "You are the friendly digital assistant for Connect ATX Elite youth basketball fundraising. \
Answer concisely, be kind, and when it helps, point people to sponsor or learn more. \
If someone asks how to help, suggest sponsoring, donating, or sharing the program with a friend.";

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: "sqlite::memory:".to_string(),
            bind_addr: "127.0.0.1:3000".to_string(),
            api_tokens: Vec::new(),
            rate_limit_per_minute: None,
            brand_name: "FundChamps".to_string(),
            site_url: DEFAULT_SITE_URL.to_string(),
            donate_url: format!("{DEFAULT_SITE_URL}/donate"),
            sponsor_url: format!("{DEFAULT_SITE_URL}#sponsorships"),
            tryouts_url: format!("{DEFAULT_SITE_URL}/calendar"),
            payments: PaymentsConfig::default(),
            sms: SmsConfig::default(),
            notify: NotifyConfig::default(),
            team: TeamConfig::default(),
        }
    }
}

impl Default for PaymentsConfig {
    fn default() -> Self {
        Self {
            stripe_secret_key: None,
            stripe_publishable_key: None,
            stripe_webhook_secret: None,
            stripe_api_base: "https://api.stripe.com".to_string(),
            paypal_client_id: None,
            paypal_secret: None,
            paypal_api_base: "https://api-m.sandbox.paypal.com".to_string(),
            require_bearer: false,
            currency: "usd".to_string(),
        }
    }
}

impl Default for SmsConfig {
    fn default() -> Self {
        Self {
            twilio_auth_token: None,
            require_signature: false,
            public_base_url: None,
            openai_api_key: None,
            openai_api_base: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            max_tokens: 120,
            temperature: 0.6,
            timeout_secs: 8,
            max_retries: 2,
            rate_max: 6,
            rate_window_secs: 60,
            max_inbound_len: 800,
            max_outbound_len: 320,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
        }
    }
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            slack_webhook_url: None,
            mail_api_url: None,
            mail_api_key: None,
            mail_from: "no-reply@connectatxelite.com".to_string(),
            max_concurrency: 8,
        }
    }
}

impl Config {
    /// Reads the process environment. Call `dotenvy::dotenv()` first to pick up `.env`.
    pub fn from_env() -> Self {
        let defaults = Config::default();
        let site_url = env_str("SITE_URL", DEFAULT_SITE_URL).trim_end_matches('/').to_string();

        let paypal_live = env_str("PAYPAL_ENV", "sandbox").eq_ignore_ascii_case("live");
        let paypal_default_base = if paypal_live {
            "https://api-m.paypal.com"
        } else {
            "https://api-m.sandbox.paypal.com"
        };

        let payments = PaymentsConfig {
            stripe_secret_key: env_opt("STRIPE_SECRET_KEY").or_else(|| env_opt("STRIPE_API_KEY")),
            stripe_publishable_key: env_opt("STRIPE_PUBLISHABLE_KEY")
                .or_else(|| env_opt("STRIPE_PUBLIC_KEY")),
            stripe_webhook_secret: env_opt("STRIPE_WEBHOOK_SECRET"),
            stripe_api_base: env_str("STRIPE_API_BASE", &defaults.payments.stripe_api_base),
            paypal_client_id: env_opt("PAYPAL_CLIENT_ID"),
            paypal_secret: env_opt("PAYPAL_SECRET"),
            paypal_api_base: env_str("PAYPAL_API_BASE", paypal_default_base),
            require_bearer: env_bool("PAYMENTS_REQUIRE_BEARER", false),
            currency: env_str("CURRENCY", "usd").to_ascii_lowercase(),
        };

        let sms_defaults = SmsConfig::default();
        let sms = SmsConfig {
            twilio_auth_token: env_opt("TWILIO_AUTH_TOKEN"),
            require_signature: env_bool("REQUIRE_TWILIO_SIGNATURE", false),
            public_base_url: env_opt("SMS_PUBLIC_BASE_URL"),
            openai_api_key: env_opt("OPENAI_API_KEY"),
            openai_api_base: env_str("OPENAI_API_BASE", &sms_defaults.openai_api_base),
            model: env_str("OPENAI_MODEL", &sms_defaults.model),
            max_tokens: env_parse("OPENAI_MAX_TOKENS", sms_defaults.max_tokens),
            temperature: env_parse("OPENAI_TEMPERATURE", sms_defaults.temperature),
            timeout_secs: env_parse("OPENAI_TIMEOUT_SECS", sms_defaults.timeout_secs),
            max_retries: env_parse("OPENAI_MAX_RETRIES", sms_defaults.max_retries),
            rate_max: env_parse("SMS_RATE_MAX", sms_defaults.rate_max),
            rate_window_secs: env_parse("SMS_RATE_WINDOW", sms_defaults.rate_window_secs),
            max_inbound_len: env_parse("SMS_MAX_INBOUND_LEN", sms_defaults.max_inbound_len),
            max_outbound_len: env_parse("SMS_MAX_OUTBOUND_LEN", sms_defaults.max_outbound_len),
            system_prompt: env_str("SMS_SYSTEM_PROMPT", &sms_defaults.system_prompt),
        };

        let notify = NotifyConfig {
            slack_webhook_url: env_opt("SLACK_WEBHOOK_URL"),
            mail_api_url: env_opt("MAIL_API_URL"),
            mail_api_key: env_opt("MAIL_API_KEY"),
            mail_from: env_str("MAIL_FROM", &defaults.notify.mail_from),
            max_concurrency: env_parse("BG_MAX_WORKERS", defaults.notify.max_concurrency).max(1),
        };

        Self {
            database_url: env_str("DATABASE_URL", "sqlite://fundchamps.db?mode=rwc"),
            bind_addr: env_opt("BIND_ADDR")
                .unwrap_or_else(|| format!("0.0.0.0:{}", env_str("PORT", "3000"))),
            api_tokens: env_list("API_TOKENS"),
            rate_limit_per_minute: env_opt("RATE_LIMIT_PER_MINUTE")
                .and_then(|v| v.parse().ok())
                .filter(|n: &u32| *n > 0),
            brand_name: env_str("BRAND_NAME", &defaults.brand_name),
            donate_url: env_str("DONATE_URL", &format!("{site_url}/donate")),
            sponsor_url: env_str("SPONSOR_URL", &format!("{site_url}#sponsorships")),
            tryouts_url: env_str("TRYOUTS_URL", &format!("{site_url}/calendar")),
            site_url,
            payments,
            sms,
            notify,
            team: TeamConfig::from_env(),
        }
    }

    pub fn admin_auth_enabled(&self) -> bool {
        !self.api_tokens.is_empty()
    }

    pub fn token_allowed(&self, token: &str) -> bool {
        self.api_tokens.iter().any(|t| t == token)
    }
}

/// Team branding and impact-locker setup, merged from built-in defaults,
/// `TEAM_CONFIG_FILE` and `TEAM_CONFIG_JSON` (later sources win).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamConfig {
    pub team_name: String,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub logo: Option<String>,
    #[serde(default)]
    pub contact_email: Option<String>,
    #[serde(default)]
    pub brand_color: Option<String>,
    /// Dollars; numbers or strings like "10k".
    #[serde(default)]
    pub fundraising_goal: Value,
    #[serde(default)]
    pub about: Vec<String>,
    #[serde(default)]
    pub players: Vec<Value>,
    #[serde(default)]
    pub impact_stats: Vec<Value>,
    #[serde(default)]
    pub impact_costs: BTreeMap<String, ImpactCost>,
    #[serde(default)]
    pub impact_allocations: Option<Map<String, Value>>,
    #[serde(default)]
    pub impact_weights: Option<Vec<Value>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

pub const DEFAULT_GOAL_DOLLARS: f64 = 10_000.0;

impl Default for TeamConfig {
    fn default() -> Self {
        TeamConfig::from_json(default_team_json())
    }
}

impl TeamConfig {
    pub fn from_env() -> Self {
        let mut merged = default_team_json();
        if let Some(name) = env_opt("TEAM_NAME") {
            merged["team_name"] = Value::String(name);
        }
        if let Some(goal) = env_opt("TEAM_GOAL") {
            merged["fundraising_goal"] = Value::String(goal);
        }
        if let Some(path) = env_opt("TEAM_CONFIG_FILE") {
            match load_json_file(Path::new(&path)) {
                Ok(over) => merge_json(&mut merged, over),
                Err(e) => tracing::warn!("TEAM_CONFIG_FILE {} ignored: {}", path, e),
            }
        }
        if let Some(raw) = env_opt("TEAM_CONFIG_JSON") {
            match serde_json::from_str::<Value>(&raw) {
                Ok(over) => merge_json(&mut merged, over),
                Err(e) => tracing::warn!("TEAM_CONFIG_JSON ignored: {}", e),
            }
        }
        TeamConfig::from_json(merged)
    }

    /// Falls back to the defaults when the merged document does not fit the shape.
    pub fn from_json(value: Value) -> Self {
        match serde_json::from_value(value) {
            Ok(cfg) => cfg,
            Err(e) => {
                tracing::warn!("team config invalid, using defaults: {}", e);
                serde_json::from_value(default_team_json()).unwrap_or_else(|_| TeamConfig::empty())
            }
        }
    }

    fn empty() -> Self {
        TeamConfig {
            team_name: "FundChamps".to_string(),
            location: None,
            logo: None,
            contact_email: None,
            brand_color: None,
            fundraising_goal: json!(DEFAULT_GOAL_DOLLARS),
            about: Vec::new(),
            players: Vec::new(),
            impact_stats: Vec::new(),
            impact_costs: BTreeMap::new(),
            impact_allocations: None,
            impact_weights: None,
            extra: Map::new(),
        }
    }

    /// Goal in dollars, never negative.
    pub fn fundraising_goal(&self) -> f64 {
        amount_or(&self.fundraising_goal, DEFAULT_GOAL_DOLLARS).max(0.0)
    }

    pub fn impact_strategy(&self) -> Strategy {
        Strategy::resolve(self.impact_allocations.as_ref(), self.impact_weights.as_deref())
    }
}

fn default_team_json() -> Value {
    json!({
        "team_name": "Connect ATX Elite",
        "location": "Austin, TX",
        "logo": "images/logo.webp",
        "contact_email": "info@connectatxelite.org",
        "brand_color": "amber-400",
        "fundraising_goal": 10000,
        "about": [
            "Connect ATX Elite is a community-powered, non-profit 12U AAU basketball program based in Austin, TX.",
            "We develop skilled athletes, but also confident, disciplined, and academically driven young leaders."
        ],
        "players": [
            {"name": "Andre", "role": "Guard"},
            {"name": "Jordan", "role": "Forward"},
            {"name": "Malik", "role": "Center"},
            {"name": "CJ", "role": "Guard"},
            {"name": "Terrance", "role": "Forward"}
        ],
        "impact_stats": [
            {"label": "Players Enrolled", "value": 16},
            {"label": "Honor Roll Scholars", "value": 11},
            {"label": "Tournaments Played", "value": 12},
            {"label": "Years Running", "value": 3}
        ],
        "impact_costs": {
            "gym_month": {
                "label": "Lock the Next Month of Gym",
                "total_cost": 1800,
                "milestones": [
                    {"label": "1 practice locked", "cost": 150},
                    {"label": "3 practices locked", "cost": 450},
                    {"label": "Full week locked", "cost": 600}
                ],
                "details": "Covers ~12 practices at ~$150/practice."
            },
            "tournament_travel": {
                "label": "Next Travel Tournament",
                "total_cost": 3200,
                "milestones": [
                    {"label": "Tournament fee", "cost": 600},
                    {"label": "2 hotel rooms/night", "cost": 300},
                    {"label": "Fuel & meals", "cost": 250}
                ],
                "details": "Fees, hotel, fuel, and meals for the team."
            },
            "uniforms": {
                "label": "Uniforms & Gear",
                "total_cost": 2400,
                "milestones": [
                    {"label": "Outfit 1 player", "cost": 150},
                    {"label": "Outfit 4 players", "cost": 600}
                ],
                "details": "Jersey set, shorts, shooter shirt."
            },
            "unity_day": {
                "label": "Unity Day (Bonding)",
                "total_cost": 600,
                "milestones": [
                    {"label": "Lane rental", "cost": 200},
                    {"label": "Team pizza", "cost": 150},
                    {"label": "Transport", "cost": 250}
                ],
                "details": "Bowling + pizza + transport for the team."
            }
        }
    })
}

/// Objects merge key by key; anything else in `over` replaces `base`.
pub fn merge_json(base: &mut Value, over: Value) {
    match (base, over) {
        (Value::Object(base_map), Value::Object(over_map)) => {
            for (key, value) in over_map {
                match base_map.get_mut(&key) {
                    Some(existing) if existing.is_object() && value.is_object() => {
                        merge_json(existing, value)
                    }
                    _ => {
                        base_map.insert(key, value);
                    }
                }
            }
        }
        (base, over) => *base = over,
    }
}

fn load_json_file(path: &Path) -> anyhow::Result<Value> {
    let raw = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn env_str(key: &str, default: &str) -> String {
    env_opt(key).unwrap_or_else(|| default.to_string())
}

fn env_bool(key: &str, default: bool) -> bool {
    match env_opt(key) {
        Some(v) => matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"),
        None => default,
    }
}

fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    env_opt(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_list(key: &str) -> Vec<String> {
    env_opt(key)
        .map(|raw| {
            raw.split(',')
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_team_has_four_buckets() {
        let team = TeamConfig::default();
        assert_eq!(team.team_name, "Connect ATX Elite");
        assert_eq!(team.fundraising_goal(), 10_000.0);
        assert_eq!(team.impact_costs.len(), 4);
        assert_eq!(team.impact_strategy(), Strategy::Weights(crate::impact::DEFAULT_WEIGHTS.to_vec()));
    }

    #[test]
    fn merge_is_deep_for_objects() {
        let mut base = default_team_json();
        merge_json(
            &mut base,
            json!({
                "fundraising_goal": "25k",
                "impact_costs": {"unity_day": {"total_cost": 900}},
                "sponsor_deck": "deck.pdf"
            }),
        );
        let team = TeamConfig::from_json(base);
        assert_eq!(team.fundraising_goal(), 25_000.0);
        let unity = &team.impact_costs["unity_day"];
        assert_eq!(unity.total_cost, json!(900));
        assert_eq!(unity.label.as_deref(), Some("Unity Day (Bonding)"));
        assert_eq!(team.extra["sponsor_deck"], json!("deck.pdf"));
    }

    #[test]
    fn malformed_team_config_falls_back() {
        let team = TeamConfig::from_json(json!({"team_name": 7}));
        assert_eq!(team.team_name, "Connect ATX Elite");
    }
}
