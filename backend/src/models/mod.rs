pub mod users;
pub mod matches;
pub mod connections;
pub mod gifts;
pub mod events;
pub mod payments;

pub use users::{User, UserStatus, MatchPreferences, UserStats};
pub use matches::{Pair, ProposalStatus, MatchProposal, Resolution};
pub use connections::{Connection, ConnectionStatus, Interaction};
pub use gifts::{GiftKind, GiftEvent, StoredMessage};
pub use events::{ClientEvent, ServerEvent, SignalKind, DeliveryStatus};
pub use payments::{PaymentCompletion, PaymentType};
