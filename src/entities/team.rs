use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::Set;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "teams")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    #[sea_orm(unique)]
    pub uuid: String,
    #[sea_orm(unique)]
    pub slug: String,
    pub team_name: String,
    pub meta_description: Option<String>,
    pub lang_code: String,
    pub theme: Option<String>,
    pub theme_color: Option<String>,
    pub hero_image: Option<String>,
    pub record: Option<Json>,
    pub impact_stats: Option<Json>,
    pub deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::player::Entity")]
    Player,
    #[sea_orm(has_many = "super::campaign_goal::Entity")]
    CampaignGoal,
    #[sea_orm(has_many = "super::sponsor::Entity")]
    Sponsor,
    #[sea_orm(has_many = "super::donation::Entity")]
    Donation,
}

impl Related<super::player::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Player.def()
    }
}

impl Related<super::campaign_goal::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::CampaignGoal.def()
    }
}

impl Related<super::sponsor::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Sponsor.def()
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
        if insert {
            if self.uuid.is_not_set() {
                self.uuid = Set(Uuid::new_v4().to_string());
            }
            if self.lang_code.is_not_set() {
                self.lang_code = Set("en".to_string());
            }
            if self.deleted.is_not_set() {
                self.deleted = Set(false);
            }
            if self.created_at.is_not_set() {
                self.created_at = Set(now);
            }
        }
        if let Some(slug) = super::value_of(&self.slug) {
            let clean = slugify(&slug);
            if clean != slug {
                self.slug = Set(clean);
            }
        }
        self.updated_at = Set(now);
        Ok(self)
    }
}

/// Lowercase, ASCII alphanumerics separated by single dashes.
pub fn slugify(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.trim().chars() {
        if ch.is_ascii_alphanumeric() {
            out.push(ch.to_ascii_lowercase());
        } else if !out.ends_with('-') && !out.is_empty() {
            out.push('-');
        }
    }
    out.trim_end_matches('-').to_string()
}
