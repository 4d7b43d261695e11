use sea_orm::{
    ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter, QueryOrder, QuerySelect,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::config::TeamConfig;
use crate::entities::{dollars, donation, sponsor, COUNTED_STATUSES};
use crate::goals::{active_goal, counted_sponsor_cents};
use crate::impact::round_to;

pub const LEADERBOARD_DEFAULT: u64 = 10;
pub const LEADERBOARD_MAX: u64 = 50;
pub const DONORS_DEFAULT: u64 = 12;
pub const DONORS_MAX: u64 = 100;

/// Money raised against the current goal, in dollars.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct FundraisingStats {
    pub raised: f64,
    pub goal: f64,
    /// Two decimal places; 0 when the goal is 0.
    pub percent: f64,
}

/// Display-ready stats with whole-dollar figures for progress widgets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct HydratedStats {
    pub raised: f64,
    pub goal: f64,
    pub percent: f64,
    pub remaining: f64,
    pub raised_i: i64,
    pub goal_i: i64,
    pub remaining_i: i64,
}

pub fn percent_of(raised: f64, goal: f64) -> f64 {
    if goal > 0.0 {
        round_to(raised / goal * 100.0, 2)
    } else {
        0.0
    }
}

pub fn prepare_stats(stats: &FundraisingStats) -> HydratedStats {
    let raised = stats.raised.max(0.0);
    let goal = stats.goal.max(0.0);
    let remaining = (goal - raised).max(0.0);
    HydratedStats {
        raised,
        goal,
        percent: stats.percent.clamp(0.0, 100.0),
        remaining,
        raised_i: raised.round() as i64,
        goal_i: goal.round() as i64,
        remaining_i: remaining.round() as i64,
    }
}

/// Non-deleted donation cents, optionally for one team.
pub async fn donation_cents<C: ConnectionTrait>(db: &C, team_id: Option<i32>) -> Result<i64, DbErr> {
    let mut query = donation::Entity::find()
        .select_only()
        .column(donation::Column::AmountCents)
        .filter(donation::Column::Deleted.eq(false));
    if let Some(team_id) = team_id {
        query = query.filter(donation::Column::TeamId.eq(team_id));
    }
    let amounts: Vec<i64> = query.into_tuple::<i64>().all(db).await?;
    Ok(amounts.into_iter().map(|a| a.max(0)).sum())
}

/// Raised is counted sponsors plus donations. The goal comes from the newest
/// active campaign goal, else the team config.
pub async fn fundraising_stats<C: ConnectionTrait>(
    db: &C,
    team: &TeamConfig,
    team_id: Option<i32>,
) -> Result<FundraisingStats, DbErr> {
    let raised_cents = counted_sponsor_cents(db, team_id).await? + donation_cents(db, team_id).await?;
    let raised = dollars(raised_cents);

    let goal = match active_goal(db, team_id).await? {
        Some(goal) => goal.goal_dollars(),
        None => {
            tracing::debug!("no active campaign goal; using configured goal");
            team.fundraising_goal()
        }
    };

    Ok(FundraisingStats { raised, goal, percent: percent_of(raised, goal) })
}

pub fn clamp_limit(requested: Option<u64>, default: u64, max: u64) -> u64 {
    requested.unwrap_or(default).clamp(1, max)
}

/// Counted sponsors ordered by amount, largest first.
pub async fn leaderboard<C: ConnectionTrait>(
    db: &C,
    limit: Option<u64>,
) -> Result<Vec<sponsor::Model>, DbErr> {
    sponsor::Entity::find()
        .filter(sponsor::Column::Status.is_in(COUNTED_STATUSES))
        .filter(sponsor::Column::Deleted.eq(false))
        .order_by_desc(sponsor::Column::Amount)
        .order_by_asc(sponsor::Column::Id)
        .limit(clamp_limit(limit, LEADERBOARD_DEFAULT, LEADERBOARD_MAX))
        .all(db)
        .await
}

/// Latest donations; counted sponsors stand in when nobody has donated yet.
pub async fn recent_donors<C: ConnectionTrait>(
    db: &C,
    limit: Option<u64>,
) -> Result<Vec<donation::DonorView>, DbErr> {
    let limit = clamp_limit(limit, DONORS_DEFAULT, DONORS_MAX);
    let donations = donation::Entity::find()
        .filter(donation::Column::Deleted.eq(false))
        .order_by_desc(donation::Column::CreatedAt)
        .order_by_desc(donation::Column::Id)
        .limit(limit)
        .all(db)
        .await?;
    if !donations.is_empty() {
        return Ok(donations.iter().map(donation::Model::donor_view).collect());
    }

    let sponsors = sponsor::Entity::find()
        .filter(sponsor::Column::Status.is_in(COUNTED_STATUSES))
        .filter(sponsor::Column::Deleted.eq(false))
        .order_by_desc(sponsor::Column::CreatedAt)
        .order_by_desc(sponsor::Column::Id)
        .limit(limit)
        .all(db)
        .await?;
    Ok(sponsors
        .into_iter()
        .map(|s| donation::DonorView {
            short_name: donation::short_name(&s.name),
            amount: s.amount_dollars(),
            badge: donation::milestone_badge(s.amount).map(str::to_string),
            tier: s.tier,
            logo: None,
            created_at: s.created_at,
            name: s.name,
        })
        .collect())
}
