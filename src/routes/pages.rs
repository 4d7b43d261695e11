use axum::{
    extract::{Query, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Form, Json,
};
use once_cell::sync::Lazy;
use regex::Regex;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, Set,
};
use serde::Deserialize;
use serde_json::json;
use utoipa::{IntoParams, ToSchema};

use crate::entities::{cents_from_dollars, sponsor, SponsorStatus, Tier, COUNTED_STATUSES};
use crate::error::AppError;
use crate::goals::{counted_sponsor_cents, first_team};
use crate::impact::{build_impact_buckets, parse_amount};
use crate::jobs::Email;
use crate::routes::SponsorPage;
use crate::stats::{fundraising_stats, leaderboard, prepare_stats, FundraisingStats};
use crate::AppState;

pub const SPONSORS_PER_PAGE: u64 = 20;
const MIN_PLEDGE_DOLLARS: f64 = 1.0;

static EMAIL_RE: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").ok());

fn valid_email(email: &str) -> bool {
    EMAIL_RE.as_ref().map_or(true, |re| re.is_match(email))
}

fn public_keys(state: &AppState) -> serde_json::Value {
    json!({
        "stripe_publishable_key": state.config.payments.stripe_publishable_key.clone().unwrap_or_default(),
        "paypal_client_id": state.config.payments.paypal_client_id.clone().unwrap_or_default(),
    })
}

/// Homepage data: team, progress, impact lockers and top sponsors.
#[utoipa::path(
    get,
    path = "/",
    responses(
        (status = 200, description = "Homepage payload"),
        (status = 304, description = "Unchanged since the ETag sent in If-None-Match")
    )
)]
pub async fn home(State(state): State<AppState>, headers: HeaderMap) -> Result<Response, AppError> {
    let team = &state.config.team;
    let stats = fundraising_stats(&state.db, team, None).await?;
    let sponsors_total = crate::entities::dollars(counted_sponsor_cents(&state.db, None).await?);
    let sponsor_count = sponsor::Entity::find()
        .filter(sponsor::Column::Status.is_in(COUNTED_STATUSES))
        .filter(sponsor::Column::Deleted.eq(false))
        .count(&state.db)
        .await?;
    let top = leaderboard(&state.db, None).await?;
    let buckets = build_impact_buckets(stats.raised, &team.impact_costs, &team.impact_strategy());

    let etag = format!(
        "\"{}-{}-{}\"",
        stats.raised.round() as i64,
        stats.goal.round() as i64,
        sponsor_count
    );
    let etag_value = HeaderValue::from_str(&etag).map_err(|e| AppError::Internal(e.to_string()))?;
    let no_cache = HeaderValue::from_static("no-cache, no-store, must-revalidate");

    let unchanged = headers
        .get(header::IF_NONE_MATCH)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.split(',').any(|tag| tag.trim() == etag));
    if unchanged {
        return Ok((
            StatusCode::NOT_MODIFIED,
            [(header::ETAG, etag_value), (header::CACHE_CONTROL, no_cache)],
        )
            .into_response());
    }

    tracing::debug!(raised = stats.raised, goal = stats.goal, sponsors = sponsor_count, "home stats");

    let top_sponsors: Vec<_> = top.iter().map(sponsor::Model::summary).collect();
    let body = json!({
        "team": team,
        "stats": prepare_stats(&stats),
        "raised": stats.raised,
        "goal": stats.goal,
        "percent": stats.percent,
        "impact_buckets": buckets,
        "sponsors": top_sponsors,
        "sponsor": top_sponsors.first(),
        "sponsors_total": sponsors_total,
        "features": { "digital_hub_enabled": true },
        "payments": public_keys(&state),
    });

    Ok((
        [(header::ETAG, etag_value), (header::CACHE_CONTROL, no_cache)],
        Json(body),
    )
        .into_response())
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct DonationSubmission {
    pub name: Option<String>,
    pub email: Option<String>,
    /// Dollars.
    pub amount: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct SponsorSubmission {
    pub name: Option<String>,
    pub email: Option<String>,
    /// Dollars.
    pub amount: Option<String>,
    pub message: Option<String>,
}

/// Pledge amount in dollars from a form field, at least $1.
fn pledge_dollars(raw: Option<&str>) -> Result<f64, AppError> {
    let amount = raw
        .and_then(|a| parse_amount(&json!(a.trim())))
        .filter(|a| a.is_finite())
        .ok_or_else(|| AppError::bad_request("invalid_form", "Please enter a valid amount"))?;
    if amount < MIN_PLEDGE_DOLLARS {
        return Err(AppError::bad_request("invalid_form", "Minimum amount is $1.00"));
    }
    Ok(amount)
}

fn form_email(raw: Option<&str>) -> Result<Option<String>, AppError> {
    match raw.map(|e| e.trim().to_lowercase()).filter(|e| !e.is_empty()) {
        Some(email) if email.len() <= 200 && valid_email(&email) => Ok(Some(email)),
        Some(_) => Err(AppError::bad_request("invalid_form", "Please enter a valid email")),
        None => Ok(None),
    }
}

/// Public payment keys for the donation modal.
#[utoipa::path(get, path = "/donate", responses((status = 200, description = "Donation settings")))]
pub async fn donate_info(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "team_name": state.config.team.team_name,
        "min_amount": MIN_PLEDGE_DOLLARS,
        "suggested_amounts": [25, 50, 100, 250],
        "payments": public_keys(&state),
    }))
}

/// Offline donation pledge. Card and PayPal payments go through `/api/payments`.
#[utoipa::path(
    post,
    path = "/donate",
    request_body(content = DonationSubmission, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 200, description = "Thank-you queued"),
        (status = 400, description = "Invalid form")
    )
)]
pub async fn donate_submit(
    State(state): State<AppState>,
    Form(form): Form<DonationSubmission>,
) -> Result<impl IntoResponse, AppError> {
    let amount = pledge_dollars(form.amount.as_deref())?;
    let email = form_email(form.email.as_deref())?;
    let name = form
        .name
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .unwrap_or("Friend");

    if let Some(email) = email {
        state.notifier.send_email(Email::donation_thank_you(
            name,
            &email,
            amount,
            &state.config.team.team_name,
        ));
    }

    Ok(Json(json!({ "ok": true, "message": "Thank you for your donation!" })))
}

/// Sponsorship form metadata, including tier thresholds in dollars.
#[utoipa::path(get, path = "/become-sponsor", responses((status = 200, description = "Form settings")))]
pub async fn sponsor_form() -> impl IntoResponse {
    let thresholds = [
        (Tier::Platinum, 5000),
        (Tier::Gold, 2500),
        (Tier::Silver, 1000),
        (Tier::Bronze, 500),
        (Tier::Supporter, 1),
    ];
    let tiers: Vec<_> = thresholds
        .into_iter()
        .map(|(tier, min)| json!({ "tier": tier, "min_amount": min }))
        .collect();
    Json(json!({
        "fields": ["name", "email", "amount", "message"],
        "min_amount": MIN_PLEDGE_DOLLARS,
        "tiers": tiers,
    }))
}

/// Records a pending sponsorship and queues a thank-you email.
#[utoipa::path(
    post,
    path = "/become-sponsor",
    request_body(content = SponsorSubmission, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 201, description = "Sponsor recorded", body = crate::entities::sponsor::SponsorSummary),
        (status = 400, description = "Invalid form")
    )
)]
pub async fn become_sponsor(
    State(state): State<AppState>,
    Form(form): Form<SponsorSubmission>,
) -> Result<impl IntoResponse, AppError> {
    let name = form.name.as_deref().map(str::trim).unwrap_or_default();
    if name.is_empty() || name.chars().count() > 100 {
        return Err(AppError::bad_request("invalid_form", "Please enter your name"));
    }
    let amount = pledge_dollars(form.amount.as_deref())?;
    let email = form_email(form.email.as_deref())?;
    let team_id = first_team(&state.db).await?.map(|t| t.id);

    let created = sponsor::ActiveModel {
        name: Set(name.to_string()),
        email: Set(email.clone()),
        team_id: Set(team_id),
        amount: Set(cents_from_dollars(amount)),
        status: Set(SponsorStatus::Pending.as_str().to_string()),
        notes: Set(form.message.map(|m| m.trim().to_string()).filter(|m| !m.is_empty())),
        ..Default::default()
    }
    .insert(&state.db)
    .await?;

    tracing::info!(sponsor_id = created.id, "sponsorship submitted");
    if let Some(email) = email {
        state.notifier.send_email(Email::sponsor_thank_you(
            &created.name,
            &email,
            &state.config.team.team_name,
        ));
    }

    Ok((StatusCode::CREATED, Json(created.summary())))
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct PageQuery {
    /// 1-based page number.
    #[param(required = false)]
    pub page: Option<u64>,
}

/// Counted sponsors, largest first, twenty per page.
#[utoipa::path(
    get,
    path = "/sponsors",
    params(PageQuery),
    responses((status = 200, description = "One page of sponsors", body = SponsorPage))
)]
pub async fn sponsor_list(
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> Result<Json<SponsorPage>, AppError> {
    let page = query.page.unwrap_or(1).max(1);
    let paginator = sponsor::Entity::find()
        .filter(sponsor::Column::Status.is_in(COUNTED_STATUSES))
        .filter(sponsor::Column::Deleted.eq(false))
        .order_by_desc(sponsor::Column::Amount)
        .order_by_asc(sponsor::Column::Id)
        .paginate(&state.db, SPONSORS_PER_PAGE);
    let totals = paginator.num_items_and_pages().await?;
    let sponsors = paginator.fetch_page(page - 1).await?;

    Ok(Json(SponsorPage {
        page,
        per_page: SPONSORS_PER_PAGE,
        total: totals.number_of_items,
        pages: totals.number_of_pages,
        sponsors: sponsors.iter().map(sponsor::Model::summary).collect(),
    }))
}

/// Raised, goal and percent of goal across all teams.
#[utoipa::path(
    get,
    path = "/stats",
    responses((status = 200, description = "Fundraising progress", body = FundraisingStats))
)]
pub async fn stats(State(state): State<AppState>) -> Result<Json<FundraisingStats>, AppError> {
    Ok(Json(fundraising_stats(&state.db, &state.config.team, None).await?))
}
