use axum::{
    extract::{Path, Query, Request, State},
    http::header,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use sea_orm::{
    sea_query::{Condition, Expr, Func},
    ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use utoipa::{IntoParams, ToSchema};

use crate::entities::{cents_from_dollars, donation, sponsor, SponsorStatus, COUNTED_STATUSES};
use crate::error::AppError;
use crate::goals::{active_goal, default_team, set_goal, GoalSummary};
use crate::impact::parse_amount;
use crate::routes::{bearer_token, find_team_by_slug, resolve_team, SponsorPage, TeamQuery};
use crate::stats::fundraising_stats;
use crate::AppState;

pub const ADMIN_PAGE_SIZE: u64 = 50;

/// Rejects requests without an allowed bearer token. Open when no tokens are configured.
pub async fn require_api_token(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    if state.config.admin_auth_enabled() {
        match bearer_token(request.headers()) {
            Some(token) if state.config.token_allowed(token) => {}
            _ => {
                tracing::warn!(path = %request.uri().path(), "admin request rejected");
                return Err(AppError::Unauthorized);
            }
        }
    }
    Ok(next.run(request).await)
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct Dashboard {
    pub sponsors: u64,
    pub pending: u64,
    pub approved: u64,
    pub deleted: u64,
    pub donations: u64,
    pub raised: f64,
    pub goal: f64,
    pub percent: f64,
}

/// Headline counts for the admin overview.
#[utoipa::path(
    get,
    path = "/admin/dashboard",
    responses(
        (status = 200, description = "Counts and progress", body = Dashboard),
        (status = 401, description = "Missing or invalid token")
    )
)]
pub async fn dashboard(State(state): State<AppState>) -> Result<Json<Dashboard>, AppError> {
    let live = || sponsor::Entity::find().filter(sponsor::Column::Deleted.eq(false));
    let sponsors = live().count(&state.db).await?;
    let pending = live()
        .filter(sponsor::Column::Status.eq(SponsorStatus::Pending.as_str()))
        .count(&state.db)
        .await?;
    let approved = live()
        .filter(sponsor::Column::Status.is_in(COUNTED_STATUSES))
        .count(&state.db)
        .await?;
    let deleted = sponsor::Entity::find()
        .filter(sponsor::Column::Deleted.eq(true))
        .count(&state.db)
        .await?;
    let donations = donation::Entity::find()
        .filter(donation::Column::Deleted.eq(false))
        .count(&state.db)
        .await?;
    let stats = fundraising_stats(&state.db, &state.config.team, None).await?;

    Ok(Json(Dashboard {
        sponsors,
        pending,
        approved,
        deleted,
        donations,
        raised: stats.raised,
        goal: stats.goal,
        percent: stats.percent,
    }))
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct SponsorSearch {
    /// Case-insensitive match on name or email.
    #[param(required = false)]
    pub q: Option<String>,
    #[param(required = false)]
    pub status: Option<String>,
    #[serde(default)]
    #[param(required = false)]
    pub include_deleted: bool,
    #[param(required = false)]
    pub page: Option<u64>,
}

/// Sponsor search, newest first.
#[utoipa::path(
    get,
    path = "/admin/sponsors",
    params(SponsorSearch),
    responses(
        (status = 200, description = "Matching sponsors", body = SponsorPage),
        (status = 401, description = "Missing or invalid token")
    )
)]
pub async fn list_sponsors(
    State(state): State<AppState>,
    Query(search): Query<SponsorSearch>,
) -> Result<Json<SponsorPage>, AppError> {
    let mut query = sponsor::Entity::find();
    if !search.include_deleted {
        query = query.filter(sponsor::Column::Deleted.eq(false));
    }
    if let Some(q) = search.q.as_deref().map(str::trim).filter(|q| !q.is_empty()) {
        let pattern = format!("%{}%", q.to_lowercase());
        let lowered = |column: sponsor::Column| Expr::expr(Func::lower(Expr::col((sponsor::Entity, column))));
        query = query.filter(
            Condition::any()
                .add(lowered(sponsor::Column::Name).like(pattern.as_str()))
                .add(lowered(sponsor::Column::Email).like(pattern.as_str())),
        );
    }
    if let Some(status) = search.status.as_deref().filter(|s| !s.trim().is_empty()) {
        query = query.filter(sponsor::Column::Status.eq(SponsorStatus::parse(status).as_str()));
    }

    let page = search.page.unwrap_or(1).max(1);
    let paginator = query
        .order_by_desc(sponsor::Column::CreatedAt)
        .order_by_desc(sponsor::Column::Id)
        .paginate(&state.db, ADMIN_PAGE_SIZE);
    let totals = paginator.num_items_and_pages().await?;
    let sponsors = paginator.fetch_page(page - 1).await?;

    Ok(Json(SponsorPage {
        page,
        per_page: ADMIN_PAGE_SIZE,
        total: totals.number_of_items,
        pages: totals.number_of_pages,
        sponsors: sponsors.iter().map(sponsor::Model::summary).collect(),
    }))
}

async fn find_sponsor(state: &AppState, id: i32) -> Result<sponsor::Model, AppError> {
    sponsor::Entity::find_by_id(id)
        .one(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Sponsor {id}")))
}

/// Marks a sponsor approved so it counts toward the goal.
#[utoipa::path(
    post,
    path = "/admin/sponsors/{id}/approve",
    params(("id" = i32, Path, description = "Sponsor id")),
    responses(
        (status = 200, description = "Approved sponsor", body = crate::entities::sponsor::SponsorSummary),
        (status = 404, description = "Unknown sponsor")
    )
)]
pub async fn approve_sponsor(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<impl IntoResponse, AppError> {
    let existing = find_sponsor(&state, id).await?;
    let was_counted = existing.is_counted();
    let mut active: sponsor::ActiveModel = existing.into();
    active.status = Set(SponsorStatus::Approved.as_str().to_string());
    let updated = active.update(&state.db).await?;

    tracing::info!(sponsor_id = id, "sponsor approved");
    if !was_counted {
        state.notifier.slack(format!(
            "Sponsor approved: {} (${:.2})",
            updated.name,
            updated.amount_dollars()
        ));
        state.events.contribution(&updated.name, updated.amount, None);
    }
    Ok(Json(updated.summary()))
}

/// Soft-deletes a sponsor.
#[utoipa::path(
    delete,
    path = "/admin/sponsors/{id}",
    params(("id" = i32, Path, description = "Sponsor id")),
    responses(
        (status = 200, description = "Sponsor hidden"),
        (status = 404, description = "Unknown sponsor")
    )
)]
pub async fn delete_sponsor(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<impl IntoResponse, AppError> {
    let mut active: sponsor::ActiveModel = find_sponsor(&state, id).await?.into();
    active.deleted = Set(true);
    active.update(&state.db).await?;
    tracing::info!(sponsor_id = id, "sponsor soft-deleted");
    Ok(Json(json!({ "ok": true, "id": id, "deleted": true })))
}

/// Undoes a soft delete.
#[utoipa::path(
    post,
    path = "/admin/sponsors/{id}/restore",
    params(("id" = i32, Path, description = "Sponsor id")),
    responses(
        (status = 200, description = "Restored sponsor", body = crate::entities::sponsor::SponsorSummary),
        (status = 404, description = "Unknown sponsor")
    )
)]
pub async fn restore_sponsor(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<impl IntoResponse, AppError> {
    let mut active: sponsor::ActiveModel = find_sponsor(&state, id).await?.into();
    active.deleted = Set(false);
    let restored = active.update(&state.db).await?;
    tracing::info!(sponsor_id = id, "sponsor restored");
    Ok(Json(restored.summary()))
}

fn payouts_csv(sponsors: &[sponsor::Model]) -> Result<Vec<u8>, csv::Error> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(["Name", "Email", "Amount", "Approved Date"])?;
    for s in sponsors {
        let amount = format!("{:.2}", s.amount_dollars());
        let approved = s.updated_at.format("%Y-%m-%d").to_string();
        writer.write_record([
            s.name.as_str(),
            s.email.as_deref().unwrap_or_default(),
            amount.as_str(),
            approved.as_str(),
        ])?;
    }
    writer.into_inner().map_err(|e| e.into_error().into())
}

/// Counted sponsors as a CSV download.
#[utoipa::path(
    get,
    path = "/admin/export/payouts",
    responses(
        (status = 200, description = "CSV with Name, Email, Amount, Approved Date", content_type = "text/csv"),
        (status = 401, description = "Missing or invalid token")
    )
)]
pub async fn export_payouts(State(state): State<AppState>) -> Result<Response, AppError> {
    let sponsors = sponsor::Entity::find()
        .filter(sponsor::Column::Status.is_in(COUNTED_STATUSES))
        .filter(sponsor::Column::Deleted.eq(false))
        .order_by_desc(sponsor::Column::UpdatedAt)
        .order_by_asc(sponsor::Column::Id)
        .all(&state.db)
        .await?;
    let body = payouts_csv(&sponsors).map_err(|e| AppError::Internal(e.to_string()))?;
    tracing::info!(rows = sponsors.len(), "payout export generated");

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
            (header::CONTENT_DISPOSITION, "attachment; filename=\"payouts.csv\""),
        ],
        body,
    )
        .into_response())
}

/// Active goal for a team, with progress.
#[utoipa::path(
    get,
    path = "/admin/goals",
    params(TeamQuery),
    responses(
        (status = 200, description = "Active goal, or null"),
        (status = 401, description = "Missing or invalid token")
    )
)]
pub async fn get_goal(
    State(state): State<AppState>,
    Query(query): Query<TeamQuery>,
) -> Result<impl IntoResponse, AppError> {
    let team = resolve_team(&state.db, query.team.as_deref()).await?;
    let goal = match &team {
        Some(team) => active_goal(&state.db, Some(team.id)).await?,
        None => None,
    };
    Ok(Json(json!({
        "team": team.map(|t| t.slug),
        "goal": goal.map(|g| g.summary()),
    })))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct GoalUpdate {
    /// Dollars; accepts numbers or strings like "12,500" or "12.5k".
    #[schema(value_type = f64)]
    pub goal_amount: Value,
    /// Team slug; defaults to the first team.
    pub team: Option<String>,
}

/// Sets the active goal amount, creating the goal when the team has none.
#[utoipa::path(
    post,
    path = "/admin/goals",
    request_body = GoalUpdate,
    responses(
        (status = 200, description = "Updated goal", body = GoalSummary),
        (status = 400, description = "Invalid amount"),
        (status = 404, description = "Unknown team")
    )
)]
pub async fn update_goal(
    State(state): State<AppState>,
    Json(update): Json<GoalUpdate>,
) -> Result<Json<GoalSummary>, AppError> {
    let dollars = parse_amount(&update.goal_amount)
        .filter(|d| d.is_finite() && *d >= 0.0)
        .ok_or_else(|| AppError::bad_request("invalid_goal", "goal_amount must be a non-negative number"))?;

    let team = match update.team.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        Some(slug) => find_team_by_slug(&state.db, slug)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Team {slug}")))?,
        None => default_team(&state.db, &state.config.team.team_name).await?,
    };

    let goal = set_goal(&state.db, team.id, cents_from_dollars(dollars)).await?;
    tracing::info!(team_id = team.id, goal_cents = goal.goal_amount, "campaign goal updated");
    Ok(Json(goal.summary()))
}
