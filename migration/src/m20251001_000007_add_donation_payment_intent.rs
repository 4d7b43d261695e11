use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .alter_table(
                Table::alter()
                    .table(Donations::Table)
                    .add_column(ColumnDef::new(Donations::PaymentIntent).string_len(255).null())
                    .to_owned(),
            )
            .await?;

        // NULLs stay distinct, so donations without a provider reference are unaffected.
        manager
            .create_index(
                Index::create()
                    .name("ux_donations_payment_intent")
                    .table(Donations::Table)
                    .col(Donations::PaymentIntent)
                    .unique()
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("ux_donations_payment_intent")
                    .table(Donations::Table)
                    .to_owned(),
            )
            .await?;
        manager
            .alter_table(
                Table::alter()
                    .table(Donations::Table)
                    .drop_column(Donations::PaymentIntent)
                    .to_owned(),
            )
            .await
    }
}

#[derive(DeriveIden)]
enum Donations {
    Table,
    PaymentIntent,
}
