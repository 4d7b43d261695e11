// Export all route modules
pub mod admin;
pub mod api;
pub mod pages;
pub mod payments;
pub mod sms;
pub mod webhooks;

use axum::http::{header, HeaderMap};
use sea_orm::{ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::entities::{sponsor::SponsorSummary, team};
use crate::goals::first_team;

/// `Authorization: Bearer <token>`, if present and non-empty.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    Some(token.trim()).filter(|t| !t.is_empty())
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct LimitQuery {
    /// Number of rows to return; clamped to the endpoint's range.
    #[param(required = false)]
    pub limit: Option<u64>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct TeamQuery {
    /// Team slug; omitted means every team.
    #[param(required = false)]
    pub team: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SponsorPage {
    pub page: u64,
    pub per_page: u64,
    pub total: u64,
    pub pages: u64,
    pub sponsors: Vec<SponsorSummary>,
}

pub async fn find_team_by_slug<C: ConnectionTrait>(db: &C, slug: &str) -> Result<Option<team::Model>, DbErr> {
    team::Entity::find()
        .filter(team::Column::Slug.eq(team::slugify(slug)))
        .filter(team::Column::Deleted.eq(false))
        .one(db)
        .await
}

/// Named team when a slug is given, else the first team.
pub async fn resolve_team<C: ConnectionTrait>(
    db: &C,
    slug: Option<&str>,
) -> Result<Option<team::Model>, DbErr> {
    match slug.map(str::trim).filter(|s| !s.is_empty()) {
        Some(slug) => find_team_by_slug(db, slug).await,
        None => first_team(db).await,
    }
}
