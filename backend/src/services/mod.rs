pub mod credentials;
pub mod hub;
pub mod ledger;
pub mod matching;
pub mod presence;

pub use credentials::{bearer_token, CredentialService, JwtCredentials};
pub use hub::{generate_room_id, SessionHandle, SessionHub};
pub use ledger::EntitlementLedger;
pub use matching::{MatchService, SpinOutcome};
pub use presence::{PresenceStatus, PresenceTracker};
