use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(SmsLogs::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(SmsLogs::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(SmsLogs::MessageSid).string_len(64).null().unique_key())
                    .col(ColumnDef::new(SmsLogs::FromNumber).string_len(20).null())
                    .col(ColumnDef::new(SmsLogs::ToNumber).string_len(20).not_null())
                    .col(ColumnDef::new(SmsLogs::MessageBody).text().not_null())
                    .col(ColumnDef::new(SmsLogs::ResponseBody).text().not_null())
                    .col(ColumnDef::new(SmsLogs::AiUsed).boolean().not_null().default(false))
                    .col(ColumnDef::new(SmsLogs::Error).text().null())
                    .col(
                        ColumnDef::new(SmsLogs::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("ix_sms_logs_from_number")
                    .table(SmsLogs::Table)
                    .col(SmsLogs::FromNumber)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(SmsLogs::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum SmsLogs {
    Table,
    Id,
    MessageSid,
    FromNumber,
    ToNumber,
    MessageBody,
    ResponseBody,
    AiUsed,
    Error,
    CreatedAt,
}
