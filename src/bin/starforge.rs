//! Maintenance CLI: schema migrations and demo data.

use anyhow::Context;
use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use fundchamps::config::Config;
use fundchamps::seed::{seed_demo, SeedOptions};
use migration::{Migrator, MigratorTrait};
use sea_orm::Database;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "starforge", version, about = "FundChamps maintenance commands")]
struct Cli {
    /// Database URL; defaults to DATABASE_URL.
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Apply pending migrations.
    Migrate,
    /// Seed demo teams, players, goals and sponsors.
    SeedDemo {
        #[arg(long, default_value_t = 1)]
        teams: usize,
        #[arg(long, default_value_t = 8)]
        sponsors: usize,
        #[arg(long, default_value_t = 10)]
        players: usize,
        /// Clear existing data before seeding.
        #[arg(long)]
        clear: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let subscriber = FmtSubscriber::builder().with_max_level(Level::INFO).finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
    let _ = dotenv();

    let cli = Cli::parse();
    let url = cli.database_url.unwrap_or_else(|| Config::from_env().database_url);
    let db = Database::connect(&url).await.context("failed to connect to database")?;
    Migrator::up(&db, None).await.context("failed to run migrations")?;

    match cli.command {
        Command::Migrate => info!("migrations applied"),
        Command::SeedDemo { teams, sponsors, players, clear } => {
            let report = seed_demo(&db, SeedOptions { teams, sponsors, players, clear }).await?;
            println!(
                "Seeded {} team(s), {} player(s), {} sponsor(s), {} goal(s); cleared {} row(s)",
                report.teams, report.players, report.sponsors, report.goals, report.cleared
            );
        }
    }
    Ok(())
}
