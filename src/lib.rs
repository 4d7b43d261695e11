use axum::{
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, post},
    Json, Router,
};
use reqwest::Client;
use sea_orm::DatabaseConnection;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tower_governor::{
    governor::GovernorConfigBuilder,
    key_extractor::SmartIpKeyExtractor,
    GovernorLayer,
};
use tower_http::cors::{Any, CorsLayer};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

pub mod config;
pub mod entities;
pub mod error;
pub mod events;
pub mod goals;
pub mod impact;
pub mod jobs;
pub mod payments;
pub mod routes;
pub mod seed;
pub mod stats;

use config::Config;
use events::EventBus;
use jobs::Notifier;
use payments::PaymentsClient;
use routes::sms::SmsRateLimiter;

/// Shared handles for every request.
#[derive(Clone)]
pub struct AppState {
    pub db: DatabaseConnection,
    pub config: Arc<Config>,
    pub http: Client,
    pub payments: Arc<PaymentsClient>,
    pub notifier: Notifier,
    pub events: EventBus,
    pub sms_limiter: Arc<SmsRateLimiter>,
}

impl AppState {
    pub fn new(db: DatabaseConnection, config: Config) -> Self {
        let http = Client::builder()
            .timeout(Duration::from_secs(20))
            .user_agent(concat!("fundchamps/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!("falling back to default HTTP client: {}", e);
                Client::new()
            });
        let payments = Arc::new(PaymentsClient::new(http.clone(), config.payments.clone()));
        let notifier = Notifier::new(http.clone(), config.notify.clone());
        let sms_limiter = Arc::new(SmsRateLimiter::new(
            config.sms.rate_max,
            Duration::from_secs(config.sms.rate_window_secs),
        ));
        Self {
            db,
            config: Arc::new(config),
            http,
            payments,
            notifier,
            events: EventBus::default(),
            sms_limiter,
        }
    }
}

/// Liveness plus a database round trip.
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is healthy"),
        (status = 503, description = "Database unreachable")
    )
)]
async fn health_check(
    axum::extract::State(state): axum::extract::State<AppState>,
) -> impl IntoResponse {
    match state.db.ping().await {
        Ok(()) => (StatusCode::OK, Json(json!({ "status": "ok", "db": true }))),
        Err(e) => {
            tracing::error!("health check database ping failed: {}", e);
            (StatusCode::SERVICE_UNAVAILABLE, Json(json!({ "status": "degraded", "db": false })))
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "FundChamps API",
        version = "0.1.0",
        description = "Sponsorships, donations, campaign goals and impact lockers for youth teams"
    ),
    paths(
        health_check,
        routes::pages::home,
        routes::pages::donate_info,
        routes::pages::donate_submit,
        routes::pages::sponsor_form,
        routes::pages::become_sponsor,
        routes::pages::sponsor_list,
        routes::pages::stats,
        routes::api::status,
        routes::api::api_stats,
        routes::api::donors,
        routes::api::leaderboard,
        routes::api::impact_buckets,
        routes::api::team_detail,
        routes::api::live_events,
        routes::payments::stripe_intent,
        routes::payments::paypal_order,
        routes::payments::paypal_capture,
        routes::payments::payments_config,
        routes::payments::readiness,
        routes::webhooks::stripe_webhook,
        routes::sms::sms_webhook,
        routes::sms::sms_health,
        routes::admin::dashboard,
        routes::admin::list_sponsors,
        routes::admin::approve_sponsor,
        routes::admin::delete_sponsor,
        routes::admin::restore_sponsor,
        routes::admin::export_payouts,
        routes::admin::get_goal,
        routes::admin::update_goal
    ),
    components(schemas(
        stats::FundraisingStats,
        stats::HydratedStats,
        impact::ImpactBucket,
        impact::Milestone,
        goals::GoalSummary,
        entities::sponsor::SponsorSummary,
        entities::donation::DonorView,
        events::LiveEvent,
        payments::AmountInput,
        routes::SponsorPage,
        routes::pages::SponsorSubmission,
        routes::pages::DonationSubmission,
        routes::payments::IntentRequest,
        routes::payments::IntentResponse,
        routes::payments::OrderRequest,
        routes::payments::CaptureRequest,
        routes::admin::GoalUpdate,
        routes::admin::Dashboard
    ))
)]
pub struct ApiDoc;

/// Create the application with all routes and middleware
pub fn create_app(state: AppState) -> Router {
    let api_doc = ApiDoc::openapi();

    let api_routes = Router::new()
        .route("/api/status", get(routes::api::status))
        .route("/api/stats", get(routes::api::api_stats))
        .route("/api/donors", get(routes::api::donors))
        .route("/api/leaderboard", get(routes::api::leaderboard))
        .route("/api/impact-buckets", get(routes::api::impact_buckets))
        .route("/api/teams/{slug}", get(routes::api::team_detail))
        .route("/api/payments/stripe/intent", post(routes::payments::stripe_intent))
        .route("/api/payments/paypal/order", post(routes::payments::paypal_order))
        .route("/api/payments/paypal/capture", post(routes::payments::paypal_capture))
        .route("/api/payments/config", get(routes::payments::payments_config))
        .route("/api/payments/readiness", get(routes::payments::readiness));

    // Rate limiting is opt-in so local runs and tests are not throttled.
    let api_routes = match state.config.rate_limit_per_minute {
        Some(per_minute) => {
            let governor_conf = GovernorConfigBuilder::default()
                .key_extractor(SmartIpKeyExtractor)
                .period(Duration::from_millis((60_000 / u64::from(per_minute)).max(1)))
                .burst_size(per_minute)
                .finish();
            match governor_conf {
                Some(conf) => api_routes.layer(GovernorLayer { config: Arc::new(conf) }),
                None => {
                    tracing::warn!("invalid RATE_LIMIT_PER_MINUTE; rate limiting disabled");
                    api_routes
                }
            }
        }
        None => api_routes,
    };

    let admin_routes = Router::new()
        .route("/admin/dashboard", get(routes::admin::dashboard))
        .route("/admin/sponsors", get(routes::admin::list_sponsors))
        .route("/admin/sponsors/{id}", delete(routes::admin::delete_sponsor))
        .route("/admin/sponsors/{id}/approve", post(routes::admin::approve_sponsor))
        .route("/admin/sponsors/{id}/restore", post(routes::admin::restore_sponsor))
        .route("/admin/export/payouts", get(routes::admin::export_payouts))
        .route("/admin/goals", get(routes::admin::get_goal).post(routes::admin::update_goal))
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            routes::admin::require_api_token,
        ));

    let page_routes = Router::new()
        .route("/", get(routes::pages::home))
        .route("/donate", get(routes::pages::donate_info).post(routes::pages::donate_submit))
        .route(
            "/become-sponsor",
            get(routes::pages::sponsor_form).post(routes::pages::become_sponsor),
        )
        .route("/sponsors", get(routes::pages::sponsor_list))
        .route("/stats", get(routes::pages::stats))
        .route("/health", get(health_check));

    // Event stream and webhooks stay outside the limiter.
    let hook_routes = Router::new()
        .route("/api/events", get(routes::api::live_events))
        .route("/webhooks/stripe", post(routes::webhooks::stripe_webhook))
        .route("/sms/webhook", post(routes::sms::sms_webhook))
        .route("/sms/health", get(routes::sms::sms_health));

    let docs_router = SwaggerUi::new("/docs").url("/api-doc/openapi.json", api_doc);

    Router::new()
        .merge(page_routes)
        .merge(api_routes)
        .merge(admin_routes)
        .merge(hook_routes)
        .with_state(state)
        .merge(docs_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
}
