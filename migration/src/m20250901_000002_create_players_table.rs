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
                    .table(Players::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Players::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Players::Uuid).string_len(36).not_null().unique_key())
                    .col(ColumnDef::new(Players::TeamId).integer().null())
                    .col(ColumnDef::new(Players::Name).string_len(120).not_null())
                    .col(ColumnDef::new(Players::Role).string_len(64).null())
                    .col(ColumnDef::new(Players::PhotoUrl).string_len(255).null())
                    .col(ColumnDef::new(Players::Deleted).boolean().not_null().default(false))
                    .col(
                        ColumnDef::new(Players::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Players::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_players_team")
                            .from(Players::Table, Players::TeamId)
                            .to(Teams::Table, Teams::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("ix_players_team_id")
                    .table(Players::Table)
                    .col(Players::TeamId)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Players::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Players {
    Table,
    Id,
    Uuid,
    TeamId,
    Name,
    Role,
    PhotoUrl,
    Deleted,
    CreatedAt,
    UpdatedAt,
}
