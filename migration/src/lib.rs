pub use sea_orm_migration::prelude::*;

mod m20250901_000001_create_teams_table;
mod m20250901_000002_create_players_table;
mod m20250901_000003_create_campaign_goals_table;
mod m20250901_000004_create_sponsors_table;
mod m20250901_000005_create_donations_table;
mod m20250901_000006_create_sms_logs_table;
mod m20251001_000007_add_donation_payment_intent;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        // Order matters: teams first, everything else references it.
        vec![
            Box::new(m20250901_000001_create_teams_table::Migration),
            Box::new(m20250901_000002_create_players_table::Migration),
            Box::new(m20250901_000003_create_campaign_goals_table::Migration),
            Box::new(m20250901_000004_create_sponsors_table::Migration),
            Box::new(m20250901_000005_create_donations_table::Migration),
            Box::new(m20250901_000006_create_sms_logs_table::Migration),
            Box::new(m20251001_000007_add_donation_payment_intent::Migration),
        ]
    }
}
