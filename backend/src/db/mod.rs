pub mod connection;
pub mod migrations;
pub mod store;
pub mod memory;
pub mod postgres;

pub use connection::{get_db_pool, DatabaseConfig};
pub use store::{Store, SpinCommit, DebitOutcome};
pub use memory::MemoryStore;
pub use postgres::PgStore;
