use tracing::info;
use vipspin::{utils, get_db_pool};
use vipspin::db::DatabaseConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    utils::init_logging();

    let db_config = DatabaseConfig::from_env()?;
    let pool = get_db_pool(&db_config).await?;

    info!("Running database migrations...");
    vipspin::db::migrations::run_migrations(&pool).await?;
    info!("✅ Migrations completed successfully!");

    Ok(())
}
