use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Teams::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Teams::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Teams::Uuid).string_len(36).not_null().unique_key())
                    .col(ColumnDef::new(Teams::Slug).string_len(80).not_null().unique_key())
                    .col(ColumnDef::new(Teams::TeamName).string_len(120).not_null())
                    .col(ColumnDef::new(Teams::MetaDescription).string_len(255).null())
                    .col(ColumnDef::new(Teams::LangCode).string_len(5).not_null().default("en"))
                    .col(ColumnDef::new(Teams::Theme).string_len(30).null())
                    .col(ColumnDef::new(Teams::ThemeColor).string_len(7).null())
                    .col(ColumnDef::new(Teams::HeroImage).string_len(255).null())
                    .col(ColumnDef::new(Teams::Record).json().null()) // wins/losses by season
                    .col(ColumnDef::new(Teams::ImpactStats).json().null())
                    .col(ColumnDef::new(Teams::Deleted).boolean().not_null().default(false))
                    .col(
                        ColumnDef::new(Teams::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Teams::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Teams::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub(crate) enum Teams {
    Table,
    Id,
    Uuid,
    Slug,
    TeamName,
    MetaDescription,
    LangCode,
    Theme,
    ThemeColor,
    HeroImage,
    Record,
    ImpactStats,
    Deleted,
    CreatedAt,
    UpdatedAt,
}
