use std::time::Duration;

use axum::{
    extract::{Path, Query, State},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse,
    },
    Json,
};
use chrono::Utc;
use futures::Stream;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter, QueryOrder};
use serde_json::json;

use crate::entities::{player, sponsor};
use crate::error::AppError;
use crate::events::sse_stream;
use crate::goals::active_goal;
use crate::impact::{build_impact_buckets, ImpactBucket};
use crate::routes::{find_team_by_slug, resolve_team, LimitQuery, TeamQuery};
use crate::stats::{fundraising_stats, leaderboard as top_sponsors, prepare_stats, recent_donors};
use crate::AppState;

/// Service and integration status.
#[utoipa::path(get, path = "/api/status", responses((status = 200, description = "Service status")))]
pub async fn status(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "time": Utc::now(),
        "stripe": state.payments.stripe_ready(),
        "paypal": state.payments.paypal_ready(),
        "sms_ai": state.config.sms.openai_api_key.is_some(),
    }))
}

/// Team id for a `?team=` slug; no slug means every team, an unknown one is a 404.
async fn team_scope(state: &AppState, slug: Option<&str>) -> Result<Option<i32>, AppError> {
    match slug {
        Some(slug) => find_team_by_slug(&state.db, slug)
            .await?
            .map(|t| Some(t.id))
            .ok_or_else(|| AppError::NotFound(format!("Team {slug}"))),
        None => Ok(None),
    }
}

/// Fundraising progress, optionally for one team.
#[utoipa::path(
    get,
    path = "/api/stats",
    params(TeamQuery),
    responses(
        (status = 200, description = "Raw and display-ready stats"),
        (status = 404, description = "Unknown team")
    )
)]
pub async fn api_stats(
    State(state): State<AppState>,
    Query(query): Query<TeamQuery>,
) -> Result<impl IntoResponse, AppError> {
    let team_id = team_scope(&state, query.team.as_deref()).await?;
    let stats = fundraising_stats(&state.db, &state.config.team, team_id).await?;
    Ok(Json(json!({
        "raised": stats.raised,
        "goal": stats.goal,
        "percent": stats.percent,
        "hydrated": prepare_stats(&stats),
    })))
}

/// Most recent donors for the donor wall.
#[utoipa::path(
    get,
    path = "/api/donors",
    params(LimitQuery),
    responses((status = 200, description = "Recent donors, newest first"))
)]
pub async fn donors(
    State(state): State<AppState>,
    Query(query): Query<LimitQuery>,
) -> Result<impl IntoResponse, AppError> {
    let donors = recent_donors(&state.db, query.limit).await?;
    Ok(Json(json!({ "donors": donors })))
}

/// Top counted sponsors by amount.
#[utoipa::path(
    get,
    path = "/api/leaderboard",
    params(LimitQuery),
    responses((status = 200, description = "Sponsors ordered by amount"))
)]
pub async fn leaderboard(
    State(state): State<AppState>,
    Query(query): Query<LimitQuery>,
) -> Result<impl IntoResponse, AppError> {
    let sponsors: Vec<_> = top_sponsors(&state.db, query.limit)
        .await?
        .iter()
        .map(sponsor::Model::summary)
        .collect();
    Ok(Json(json!({ "sponsors": sponsors })))
}

/// Impact lockers filled from money raised so far.
#[utoipa::path(
    get,
    path = "/api/impact-buckets",
    params(TeamQuery),
    responses(
        (status = 200, description = "Buckets in display order", body = [ImpactBucket]),
        (status = 404, description = "Unknown team")
    )
)]
pub async fn impact_buckets(
    State(state): State<AppState>,
    Query(query): Query<TeamQuery>,
) -> Result<Json<Vec<ImpactBucket>>, AppError> {
    let team_id = team_scope(&state, query.team.as_deref()).await?;
    let team = &state.config.team;
    let stats = fundraising_stats(&state.db, team, team_id).await?;
    Ok(Json(build_impact_buckets(stats.raised, &team.impact_costs, &team.impact_strategy())))
}

/// Team profile with roster, active goal and progress.
#[utoipa::path(
    get,
    path = "/api/teams/{slug}",
    params(("slug" = String, Path, description = "Team slug")),
    responses(
        (status = 200, description = "Team detail"),
        (status = 404, description = "Unknown team")
    )
)]
pub async fn team_detail(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let team = resolve_team(&state.db, Some(&slug))
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Team {slug}")))?;

    let players = player::Entity::find()
        .filter(player::Column::TeamId.eq(team.id))
        .filter(player::Column::Deleted.eq(false))
        .order_by_asc(player::Column::Name)
        .all(&state.db)
        .await?;
    let goal = active_goal(&state.db, Some(team.id)).await?;
    let stats = fundraising_stats(&state.db, &state.config.team, Some(team.id)).await?;

    Ok(Json(json!({
        "team": team,
        "players": players,
        "goal": goal.as_ref().map(|g| g.summary()),
        "stats": stats,
    })))
}

/// Live donation and sponsor events as server-sent events.
#[utoipa::path(
    get,
    path = "/api/events",
    responses((status = 200, description = "text/event-stream of `donation` and `sponsor` events"))
)]
pub async fn live_events(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, axum::Error>>> {
    Sse::new(sse_stream(state.events.subscribe()))
        .keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
}
