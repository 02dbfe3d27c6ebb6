use std::sync::Arc;

use clap::{Arg, Command};
use tracing::{info, warn};
use vipspin::{
    create_router, db::{migrations::run_migrations, DatabaseConfig}, get_db_pool, utils, AppState, Config,
    MemoryStore, PgStore, Store,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    utils::init_logging();

    let matches = Command::new("server")
        .about("VIP spin matching and realtime server")
        .arg(
            Arg::new("port")
                .long("port")
                .help("Listen port (overrides PORT)")
                .value_parser(clap::value_parser!(u16)),
        )
        .arg(
            Arg::new("memory")
                .long("memory")
                .help("Use the in-memory store even if DATABASE_URL is set")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("skip-migrations")
                .long("skip-migrations")
                .help("Don't apply SQL migrations on startup")
                .action(clap::ArgAction::SetTrue),
        )
        .get_matches();

    let mut config = Config::from_env()?;
    if let Some(port) = matches.get_one::<u16>("port") {
        config.port = *port;
    }

    let store: Arc<dyn Store> = match config.database_url.clone() {
        Some(url) if !matches.get_flag("memory") => {
            let pool = get_db_pool(&DatabaseConfig::with_url(url)).await?;
            if !matches.get_flag("skip-migrations") {
                run_migrations(&pool).await?;
            }
            info!("🗄️  Using Postgres store");
            Arc::new(PgStore::new(pool))
        }
        _ => {
            warn!("⚠️  Using in-memory store; data is lost on restart");
            Arc::new(MemoryStore::new())
        }
    };

    let port = config.port;
    let app = create_router(AppState::new(store, config));

    let listener = tokio::net::TcpListener::bind(&format!("0.0.0.0:{}", port)).await?;
    info!("🚀 Server running on port {}", port);

    axum::serve(listener, app).await?;

    Ok(())
}
