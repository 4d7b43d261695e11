use sea_orm_migration::prelude::*;

use super::m20250901_000001_create_teams_table::Teams;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(CampaignGoals::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(CampaignGoals::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(CampaignGoals::Uuid).string_len(36).not_null().unique_key())
                    .col(ColumnDef::new(CampaignGoals::TeamId).integer().not_null())
                    // Both money columns are cents.
                    .col(
                        ColumnDef::new(CampaignGoals::GoalAmount)
                            .big_integer()
                            .not_null()
                            .default(0)
                            .check(Expr::col(CampaignGoals::GoalAmount).gte(0)),
                    )
                    .col(
                        ColumnDef::new(CampaignGoals::Total)
                            .big_integer()
                            .not_null()
                            .default(0)
                            .check(Expr::col(CampaignGoals::Total).gte(0)),
                    )
                    .col(ColumnDef::new(CampaignGoals::Active).boolean().not_null().default(true))
                    .col(ColumnDef::new(CampaignGoals::Deleted).boolean().not_null().default(false))
                    .col(
                        ColumnDef::new(CampaignGoals::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(CampaignGoals::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_campaign_goals_team")
                            .from(CampaignGoals::Table, CampaignGoals::TeamId)
                            .to(Teams::Table, Teams::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("ix_campaign_goals_team_active")
                    .table(CampaignGoals::Table)
                    .col(CampaignGoals::TeamId)
                    .col(CampaignGoals::Active)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(CampaignGoals::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub(crate) enum CampaignGoals {
    Table,
    Id,
    Uuid,
    TeamId,
    GoalAmount,
    Total,
    Active,
    Deleted,
    CreatedAt,
    UpdatedAt,
}
