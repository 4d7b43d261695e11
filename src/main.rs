use std::net::SocketAddr;

use anyhow::Context;
use dotenvy::dotenv;
use fundchamps::{config::Config, create_app, AppState};
use migration::{Migrator, MigratorTrait};
use sea_orm::Database;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let subscriber = FmtSubscriber::builder().with_max_level(Level::INFO).finish();
    let _ = tracing::subscriber::set_global_default(subscriber);

    // Load .env (if present) before reading configuration
    let _ = dotenv();
    let config = Config::from_env();

    let db = Database::connect(&config.database_url)
        .await
        .context("failed to connect to database")?;
    Migrator::up(&db, None).await.context("failed to run migrations")?;

    let bind_addr = config.bind_addr.clone();
    if !config.admin_auth_enabled() {
        tracing::warn!("API_TOKENS not set; /admin routes are unauthenticated");
    }
    let app = create_app(AppState::new(db, config));

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;
    info!("Server running on http://{}", bind_addr);
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;
    Ok(())
}
