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
                    .table(Sponsors::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Sponsors::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Sponsors::Name).string_len(100).not_null())
                    .col(ColumnDef::new(Sponsors::Email).string_len(200).null())
                    .col(ColumnDef::new(Sponsors::TeamId).integer().null())
                    .col(
                        ColumnDef::new(Sponsors::Amount)
                            .big_integer()
                            .not_null()
                            .default(0)
                            .check(Expr::col(Sponsors::Amount).gte(0)),
                    )
                    .col(ColumnDef::new(Sponsors::Status).string_len(32).not_null().default("pending"))
                    .col(ColumnDef::new(Sponsors::Tier).string_len(50).null())
                    .col(ColumnDef::new(Sponsors::PaymentIntent).string_len(255).null())
                    .col(ColumnDef::new(Sponsors::Notes).text().null())
                    .col(ColumnDef::new(Sponsors::Deleted).boolean().not_null().default(false))
                    .col(
                        ColumnDef::new(Sponsors::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Sponsors::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_sponsors_team")
                            .from(Sponsors::Table, Sponsors::TeamId)
                            .to(Teams::Table, Teams::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // Homepage and leaderboard queries filter on status and sort by amount.
        manager
            .create_index(
                Index::create()
                    .name("ix_sponsors_status_amount")
                    .table(Sponsors::Table)
                    .col(Sponsors::Status)
                    .col(Sponsors::Amount)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("ix_sponsors_team_id")
                    .table(Sponsors::Table)
                    .col(Sponsors::TeamId)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Sponsors::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Sponsors {
    Table,
    Id,
    Name,
    Email,
    TeamId,
    Amount,
    Status,
    Tier,
    PaymentIntent,
    Notes,
    Deleted,
    CreatedAt,
    UpdatedAt,
}
