pub mod models;
pub mod db;
pub mod services;
pub mod handlers;
pub mod utils;
pub mod constants;
pub mod error;
pub mod app;

pub use app::{create_router, AppState};
pub use db::{get_db_pool, MemoryStore, PgStore, Store};
pub use error::{AppError, AppResult};
pub use utils::config::Config;

// Re-export common types
pub use anyhow::Result;
pub use uuid::Uuid;
pub use chrono::{DateTime, Utc};
