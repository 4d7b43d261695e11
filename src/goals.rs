//! Campaign goal progress. `CampaignGoal.total` caches the sum of counted
//! sponsor amounts for the goal's team and is refreshed whenever a sponsor or
//! donation for that team is written. Concurrent writers race on `total`;
//! the last recompute wins.

use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::entities::{campaign_goal, dollars, sponsor, team, COUNTED_STATUSES};
use crate::impact::round_to;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct GoalSummary {
    pub id: i32,
    pub uuid: String,
    pub team_id: i32,
    pub goal_amount: f64,
    pub goal_amount_cents: i64,
    pub raised: f64,
    pub total_cents: i64,
    pub percent_raised: f64,
    pub is_complete: bool,
    pub active: bool,
}

impl campaign_goal::Model {
    pub fn goal_dollars(&self) -> f64 {
        dollars(self.goal_amount)
    }

    pub fn raised_dollars(&self) -> f64 {
        dollars(self.total)
    }

    /// One decimal place; 0 when no goal is set.
    pub fn percent_raised(&self) -> f64 {
        if self.goal_amount <= 0 {
            return 0.0;
        }
        round_to(self.total as f64 / self.goal_amount as f64 * 100.0, 1)
    }

    pub fn is_complete(&self) -> bool {
        self.goal_amount > 0 && self.total >= self.goal_amount
    }

    pub fn summary(&self) -> GoalSummary {
        GoalSummary {
            id: self.id,
            uuid: self.uuid.clone(),
            team_id: self.team_id,
            goal_amount: self.goal_dollars(),
            goal_amount_cents: self.goal_amount,
            raised: self.raised_dollars(),
            total_cents: self.total,
            percent_raised: self.percent_raised(),
            is_complete: self.is_complete(),
            active: self.active,
        }
    }

    /// Recomputes `total` from counted, non-deleted sponsors of the goal's team.
    ///
    /// With `commit` the read and write run in a transaction of their own that
    /// is committed before returning. Without it they run on `db` as given, so
    /// a caller's open transaction decides the outcome.
    pub async fn update_progress_from_donations<C>(&self, db: &C, commit: bool) -> Result<Self, DbErr>
    where
        C: ConnectionTrait + TransactionTrait,
    {
        if commit {
            let txn = db.begin().await?;
            let updated = recompute_total(self, &txn).await?;
            txn.commit().await?;
            Ok(updated)
        } else {
            recompute_total(self, db).await
        }
    }

    /// Adds to the cached total. Non-positive amounts are ignored.
    pub async fn add_amount<C: ConnectionTrait>(&self, db: &C, cents: i64) -> Result<Self, DbErr> {
        if cents <= 0 {
            return Ok(self.clone());
        }
        let mut goal: campaign_goal::ActiveModel = self.clone().into();
        goal.total = Set(self.total.saturating_add(cents));
        goal.update(db).await
    }

    pub async fn reset_progress<C: ConnectionTrait>(&self, db: &C) -> Result<Self, DbErr> {
        let mut goal: campaign_goal::ActiveModel = self.clone().into();
        goal.total = Set(0);
        goal.update(db).await
    }
}

/// Sum of counted, non-deleted sponsor amounts (cents) for a team.
pub async fn counted_sponsor_cents<C: ConnectionTrait>(db: &C, team_id: Option<i32>) -> Result<i64, DbErr> {
    let mut query = sponsor::Entity::find()
        .select_only()
        .column(sponsor::Column::Amount)
        .filter(sponsor::Column::Status.is_in(COUNTED_STATUSES))
        .filter(sponsor::Column::Deleted.eq(false));
    if let Some(team_id) = team_id {
        query = query.filter(sponsor::Column::TeamId.eq(team_id));
    }
    let amounts: Vec<i64> = query.into_tuple::<i64>().all(db).await?;
    Ok(amounts.into_iter().map(|a| a.max(0)).sum())
}

async fn recompute_total<C: ConnectionTrait>(
    goal: &campaign_goal::Model,
    db: &C,
) -> Result<campaign_goal::Model, DbErr> {
    let total = counted_sponsor_cents(db, Some(goal.team_id)).await?;
    if total == goal.total {
        return Ok(goal.clone());
    }
    let mut active: campaign_goal::ActiveModel = goal.clone().into();
    active.total = Set(total);
    let updated = active.update(db).await?;
    tracing::debug!(goal_id = updated.id, total, "campaign goal total recomputed");
    Ok(updated)
}

/// Most recently created active goal, for one team or across all teams.
pub async fn active_goal<C: ConnectionTrait>(
    db: &C,
    team_id: Option<i32>,
) -> Result<Option<campaign_goal::Model>, DbErr> {
    let mut query = campaign_goal::Entity::find()
        .filter(campaign_goal::Column::Active.eq(true))
        .filter(campaign_goal::Column::Deleted.eq(false));
    if let Some(team_id) = team_id {
        query = query.filter(campaign_goal::Column::TeamId.eq(team_id));
    }
    query
        .order_by_desc(campaign_goal::Column::CreatedAt)
        .order_by_desc(campaign_goal::Column::Id)
        .one(db)
        .await
}

/// Save/delete hook entry point for sponsors and donations. Missing team or
/// goal is a no-op, and failures are logged rather than surfaced so the
/// triggering write still succeeds.
pub async fn sync_team_goal<C: ConnectionTrait>(db: &C, team_id: Option<i32>) {
    let Some(team_id) = team_id else { return };
    let result = async {
        match active_goal(db, Some(team_id)).await? {
            Some(goal) => recompute_total(&goal, db).await.map(Some),
            None => Ok(None),
        }
    }
    .await;
    if let Err(e) = result {
        tracing::warn!(team_id, "campaign goal sync failed: {}", e);
    }
}

/// The oldest live team, used when a request does not name one.
pub async fn first_team<C: ConnectionTrait>(db: &C) -> Result<Option<team::Model>, DbErr> {
    team::Entity::find()
        .filter(team::Column::Deleted.eq(false))
        .order_by_asc(team::Column::Id)
        .one(db)
        .await
}

/// First live team, created from the configured name when there is none.
pub async fn default_team<C: ConnectionTrait>(db: &C, team_name: &str) -> Result<team::Model, DbErr> {
    if let Some(existing) = first_team(db).await? {
        return Ok(existing);
    }
    let slug = team::slugify(team_name);
    team::ActiveModel {
        slug: Set(if slug.is_empty() { "team".to_string() } else { slug }),
        team_name: Set(team_name.to_string()),
        ..Default::default()
    }
    .insert(db)
    .await
}

/// Updates the team's active goal, or creates one when none exists, then
/// refreshes its total.
pub async fn set_goal<C>(db: &C, team_id: i32, goal_cents: i64) -> Result<campaign_goal::Model, DbErr>
where
    C: ConnectionTrait + TransactionTrait,
{
    let txn = db.begin().await?;
    let goal = match active_goal(&txn, Some(team_id)).await? {
        Some(goal) => {
            let mut active: campaign_goal::ActiveModel = goal.into();
            active.goal_amount = Set(goal_cents.max(0));
            active.update(&txn).await?
        }
        None => {
            campaign_goal::ActiveModel {
                team_id: Set(team_id),
                goal_amount: Set(goal_cents.max(0)),
                active: Set(true),
                ..Default::default()
            }
            .insert(&txn)
            .await?
        }
    };
    let goal = recompute_total(&goal, &txn).await?;
    txn.commit().await?;
    Ok(goal)
}
