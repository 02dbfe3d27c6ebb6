// =============================================================================
// VIP Spin Backend Constants
// =============================================================================
// Tunables for matching, presence, entitlements and the HTTP server, kept in
// one place so they can be adjusted without hunting through services.

// =============================================================================
// SERVER
// =============================================================================

/// Default HTTP port when PORT is not set
pub const DEFAULT_SERVER_PORT: u16 = 8080;

/// Default Postgres pool size when DB_MAX_CONNECTIONS is not set
pub const DEFAULT_DB_MAX_CONNECTIONS: u32 = 10;

/// Default STUN server handed to clients for ICE negotiation
pub const DEFAULT_STUN_SERVER: &str = "stun:stun.l.google.com:19302";

/// Header carrying the payment feed's shared secret
pub const PAYMENT_SECRET_HEADER: &str = "x-payment-secret";

// =============================================================================
// MATCHING
// =============================================================================

/// How long a proposal stays pending before it reads as expired
pub const PROPOSAL_TTL_HOURS: i64 = 24;

/// Upper bound on candidates drawn per spin before the uniform pick
pub const CANDIDATE_SAMPLE_SIZE: usize = 10;

/// Selection attempts when the chosen pair is claimed by a concurrent spin
pub const MAX_SPIN_ATTEMPTS: usize = 3;

// =============================================================================
// PRESENCE
// =============================================================================

/// A user is online while their last activity is younger than this
pub const ONLINE_WINDOW_MINUTES: i64 = 5;

// =============================================================================
// ENTITLEMENTS
// =============================================================================

/// Free spins granted to a new account
pub const DEFAULT_FREE_SPINS: i32 = 5;

/// Days of VIP granted per subscription payment
pub const VIP_SUBSCRIPTION_DAYS: i64 = 30;

/// Gift credits granted per currency unit of a gift purchase
pub const GIFT_CREDITS_PER_UNIT: i64 = 10;

/// Spin packages: (price in cents, spins granted)
pub const SPIN_PACKAGES: [(i64, i32); 4] = [
    (100, 5),
    (500, 30),
    (1000, 70),
    (2000, 150),
];
