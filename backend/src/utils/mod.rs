pub mod config;
pub mod logging;

pub use config::{Config, TurnServer};
pub use logging::init_logging;
