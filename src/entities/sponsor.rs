use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::Set;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::{dollars, cents_from_dollars, tier_is_empty, value_of, Tier};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "sponsors")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub name: String,
    pub email: Option<String>,
    pub team_id: Option<i32>,
    /// Cents.
    pub amount: i64,
    pub status: String,
    pub tier: Option<String>,
    /// Stripe PaymentIntent id, when paid online.
    pub payment_intent: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub notes: Option<String>,
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
        on_delete = "Cascade"
    )]
    Team,
}

impl Related<super::team::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Team.def()
    }
}

/// Lifecycle of a sponsorship.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum SponsorStatus {
    Pending,
    Approved,
    Paid,
    Completed,
    Success,
    Refunded,
    Failed,
}

/// Statuses whose amounts count toward money raised.
pub const COUNTED_STATUSES: [&str; 4] = ["approved", "paid", "completed", "success"];

impl SponsorStatus {
    /// Unknown or blank values fall back to `Pending`.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "approved" => SponsorStatus::Approved,
            "paid" => SponsorStatus::Paid,
            "completed" => SponsorStatus::Completed,
            "success" => SponsorStatus::Success,
            "refunded" => SponsorStatus::Refunded,
            "failed" => SponsorStatus::Failed,
            _ => SponsorStatus::Pending,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SponsorStatus::Pending => "pending",
            SponsorStatus::Approved => "approved",
            SponsorStatus::Paid => "paid",
            SponsorStatus::Completed => "completed",
            SponsorStatus::Success => "success",
            SponsorStatus::Refunded => "refunded",
            SponsorStatus::Failed => "failed",
        }
    }

    pub fn is_counted(&self) -> bool {
        COUNTED_STATUSES.contains(&self.as_str())
    }
}

/// Public view of a sponsor.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SponsorSummary {
    pub id: i32,
    pub name: String,
    pub email: Option<String>,
    pub amount: f64,
    pub status: String,
    pub tier: Option<String>,
    pub approved: bool,
    pub deleted: bool,
    pub created_at: DateTime<Utc>,
}

impl Model {
    pub fn amount_dollars(&self) -> f64 {
        dollars(self.amount)
    }

    pub fn set_amount_dollars(&mut self, value: f64) {
        self.amount = cents_from_dollars(value);
    }

    pub fn status(&self) -> SponsorStatus {
        SponsorStatus::parse(&self.status)
    }

    pub fn is_counted(&self) -> bool {
        !self.deleted && self.status().is_counted()
    }

    pub fn summary(&self) -> SponsorSummary {
        SponsorSummary {
            id: self.id,
            name: self.name.clone(),
            email: self.email.clone(),
            amount: self.amount_dollars(),
            status: self.status.clone(),
            tier: self.tier.clone(),
            approved: self.status() == SponsorStatus::Approved,
            deleted: self.deleted,
            created_at: self.created_at,
        }
    }
}

#[async_trait::async_trait]
impl ActiveModelBehavior for ActiveModel {
    async fn before_save<C>(mut self, _db: &C, insert: bool) -> Result<Self, DbErr>
    where
        C: ConnectionTrait,
    {
        let now = Utc::now();

        let amount = match value_of(&self.amount) {
            Some(cents) if cents < 0 => {
                self.amount = Set(0);
                Some(0)
            }
            Some(cents) => Some(cents),
            None if insert => {
                self.amount = Set(0);
                Some(0)
            }
            None => None,
        };

        match value_of(&self.status) {
            Some(raw) => {
                let normalized = SponsorStatus::parse(&raw).as_str();
                if normalized != raw {
                    self.status = Set(normalized.to_string());
                }
            }
            None if insert => self.status = Set(SponsorStatus::Pending.as_str().to_string()),
            None => {}
        }

        // Explicit tiers are never overwritten.
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
