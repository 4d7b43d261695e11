use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::Set;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::{cents_from_dollars, dollars, tier_is_empty, value_of, Tier};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "donations")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub name: String,
    pub email: Option<String>,
    pub team_id: Option<i32>,
    pub campaign_goal_id: Option<i32>,
    pub amount_cents: i64,
    pub tier: Option<String>,
    pub logo_path: Option<String>,
    /// Provider payment reference (Stripe PaymentIntent id or `paypal:<order id>`).
    #[sea_orm(unique)]
    pub payment_intent: Option<String>,
    pub deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::team::Entity",
        from = "Column::TeamId",
        to = "super::team::Column::Id",
        on_delete = "SetNull"
    )]
    Team,
    #[sea_orm(
        belongs_to = "super::campaign_goal::Entity",
        from = "Column::CampaignGoalId",
        to = "super::campaign_goal::Column::Id",
        on_delete = "SetNull"
    )]
    CampaignGoal,
}

impl Related<super::team::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Team.def()
    }
}

impl Related<super::campaign_goal::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::CampaignGoal.def()
    }
}

/// Donor row as shown on the donor wall.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DonorView {
    pub name: String,
    pub short_name: String,
    pub amount: f64,
    pub tier: Option<String>,
    pub badge: Option<String>,
    pub logo: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Model {
    pub fn amount_dollars(&self) -> f64 {
        dollars(self.amount_cents)
    }

    pub fn set_amount_dollars(&mut self, value: f64) {
        self.amount_cents = cents_from_dollars(value);
    }

    pub fn short_name(&self) -> String {
        short_name(&self.name)
    }

    pub fn milestone_badge(&self) -> Option<&'static str> {
        milestone_badge(self.amount_cents)
    }

    pub fn donor_view(&self) -> DonorView {
        DonorView {
            name: self.name.clone(),
            short_name: self.short_name(),
            amount: self.amount_dollars(),
            tier: self.tier.clone(),
            badge: self.milestone_badge().map(str::to_string),
            logo: self.logo_path.clone(),
            created_at: self.created_at,
        }
    }
}

/// "Jane Q. Public" becomes "Jane P.".
pub fn short_name(name: &str) -> String {
    let parts: Vec<&str> = name.split_whitespace().collect();
    match parts.as_slice() {
        [] => String::new(),
        [only] => (*only).to_string(),
        [first, .., last] => match last.chars().next() {
            Some(initial) => format!("{first} {}.", initial.to_uppercase()),
            None => (*first).to_string(),
        },
    }
}

pub fn milestone_badge(cents: i64) -> Option<&'static str> {
    match cents / 100 {
        d if d >= 10_000 => Some("Mega Donor"),
        d if d >= 5_000 => Some("VIP"),
        d if d >= 1_000 => Some("Champion"),
        _ => None,
    }
}

#[async_trait::async_trait]
impl ActiveModelBehavior for ActiveModel {
    async fn before_save<C>(mut self, _db: &C, insert: bool) -> Result<Self, DbErr>
    where
        C: ConnectionTrait,
    {
        let now = Utc::now();

        let amount = match value_of(&self.amount_cents) {
            Some(cents) if cents < 0 => {
                self.amount_cents = Set(0);
                Some(0)
            }
            Some(cents) => Some(cents),
            None if insert => {
                self.amount_cents = Set(0);
                Some(0)
            }
            None => None,
        };

        if let Some(cents) = amount {
            if tier_is_empty(&self.tier) {
                self.tier = Set(Some(Tier::from_cents(cents).as_str().to_string()));
            }
        }

        if insert {
            if self.deleted.is_not_set() {
                self.deleted = Set(false);
            }
            if self.created_at.is_not_set() {
                self.created_at = Set(now);
            }
        }
        self.updated_at = Set(now);
        Ok(self)
    }

    async fn after_save<C>(model: Model, db: &C, _insert: bool) -> Result<Model, DbErr>
    where
        C: ConnectionTrait,
    {
        crate::goals::sync_team_goal(db, model.team_id).await;
        Ok(model)
    }

    async fn after_delete<C>(self, db: &C) -> Result<Self, DbErr>
    where
        C: ConnectionTrait,
    {
        crate::goals::sync_team_goal(db, value_of(&self.team_id).flatten()).await;
        Ok(self)
    }
}
