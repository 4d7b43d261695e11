use sea_orm_migration::prelude::*;

use super::m20250901_000001_create_teams_table::Teams;
use super::m20250901_000003_create_campaign_goals_table::CampaignGoals;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Donations::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Donations::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Donations::Name).string_len(160).not_null())
                    .col(ColumnDef::new(Donations::Email).string_len(160).null())
                    .col(ColumnDef::new(Donations::TeamId).integer().null())
                    .col(ColumnDef::new(Donations::CampaignGoalId).integer().null())
                    .col(
                        ColumnDef::new(Donations::AmountCents)
                            .big_integer()
                            .not_null()
                            .default(0)
                            .check(Expr::col(Donations::AmountCents).gte(0)),
                    )
                    .col(ColumnDef::new(Donations::Tier).string_len(40).null())
                    .col(ColumnDef::new(Donations::LogoPath).string_len(255).null())
                    .col(ColumnDef::new(Donations::Deleted).boolean().not_null().default(false))
                    .col(
                        ColumnDef::new(Donations::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Donations::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_donations_team")
                            .from(Donations::Table, Donations::TeamId)
                            .to(Teams::Table, Teams::Id)
                            .on_delete(ForeignKeyAction::SetNull),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_donations_campaign_goal")
                            .from(Donations::Table, Donations::CampaignGoalId)
                            .to(CampaignGoals::Table, CampaignGoals::Id)
                            .on_delete(ForeignKeyAction::SetNull),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("ix_donations_team_id")
                    .table(Donations::Table)
                    .col(Donations::TeamId)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Donations::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Donations {
    Table,
    Id,
    Name,
    Email,
    TeamId,
    CampaignGoalId,
    AmountCents,
    Tier,
    LogoPath,
    Deleted,
    CreatedAt,
    UpdatedAt,
}
