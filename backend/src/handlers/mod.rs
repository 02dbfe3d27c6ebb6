pub mod auth;
pub mod matches;
pub mod payments;
pub mod presence;
pub mod realtime;
pub mod webrtc;

pub use auth::AuthUser;
pub use matches::{accept_match, get_stats, list_connections, list_matches, reject_match, spin};
pub use payments::payment_completed;
pub use presence::{online_users, user_status};
pub use realtime::realtime;
pub use webrtc::webrtc_config;
