use anyhow::Result;
use sqlx::PgPool;

/// Apply the schema for users, proposals, connections, messages and gifts.
pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    let migrator = sqlx::migrate!("./migrations");
    tracing::info!("Applying {} schema migration(s)", migrator.migrations.len());
    migrator.run(pool).await?;
    Ok(())
}
