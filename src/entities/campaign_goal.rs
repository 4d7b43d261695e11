use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::Set;
use serde::{Deserialize, Serialize};

use super::value_of;

/// Fundraising target for a team. `total` is a cached sum of counted sponsor
/// amounts, refreshed by `goals::update_progress_from_donations`.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "campaign_goals")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    #[sea_orm(unique)]
    pub uuid: String,
    pub team_id: i32,
    pub goal_amount: i64,
    pub total: i64,
    pub active: bool,
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
    #[sea_orm(has_many = "super::donation::Entity")]
    Donation,
}

impl Related<super::team::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Team.def()
    }
}

impl Related<super::donation::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Donation.def()
    }
}

#[async_trait::async_trait]
impl ActiveModelBehavior for ActiveModel {
    async fn before_save<C>(mut self, _db: &C, insert: bool) -> Result<Self, DbErr>
    where
        C: ConnectionTrait,
    {
        let now = Utc::now();
        for field in [&mut self.goal_amount, &mut self.total] {
            match value_of(field) {
                Some(v) if v < 0 => *field = Set(0),
                None if insert => *field = Set(0),
                _ => {}
            }
        }
        if insert {
            if self.uuid.is_not_set() {
                self.uuid = Set(Uuid::new_v4().to_string());
            }
            if self.active.is_not_set() {
                self.active = Set(true);
            }
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
}
