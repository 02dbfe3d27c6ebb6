use std::collections::HashSet;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::{
    Connection, GiftEvent, Interaction, MatchPreferences, MatchProposal, Pair, StoredMessage, User,
};

/// Result of the atomic spin commit (entitlement re-check + proposal insert + debit).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpinCommit {
    Committed,
    /// Requester had no free spins and no active VIP when the commit ran.
    NotEntitled,
    /// A proposal for this unordered pair already exists.
    PairTaken,
    UserMissing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebitOutcome {
    Applied,
    Insufficient,
    UserMissing,
}

/// Persistence consumed by the matching and presence core.
///
/// Every method is atomic on its own. Implementations must be safe to call
/// concurrently from many sessions.
#[async_trait]
pub trait Store: Send + Sync {
    async fn insert_user(&self, user: &User) -> Result<()>;

    async fn get_user(&self, user_id: Uuid) -> Result<Option<User>>;

    async fn set_last_active(&self, user_id: Uuid, at: DateTime<Utc>) -> Result<()>;

    /// Everyone who appears with `user_id` in any proposal, either direction, any status.
    async fn counterparts_of(&self, user_id: Uuid) -> Result<HashSet<Uuid>>;

    /// Up to `limit` active users outside `excluded` passing `preferences`, in random order.
    async fn sample_candidates(
        &self,
        excluded: &HashSet<Uuid>,
        preferences: &MatchPreferences,
        limit: usize,
    ) -> Result<Vec<User>>;

    /// Re-check the initiator's entitlement, insert the proposal keyed by its
    /// unordered pair, debit a free spin unless VIP is active, bump total spins
    /// and last activity. Nothing is written unless the result is `Committed`.
    async fn commit_spin(&self, proposal: &MatchProposal, now: DateTime<Utc>) -> Result<SpinCommit>;

    async fn get_proposal(&self, proposal_id: Uuid) -> Result<Option<MatchProposal>>;

    async fn proposals_of(&self, user_id: Uuid) -> Result<Vec<MatchProposal>>;

    /// Compare-and-set pending → accepted (only while unexpired at `now`) and
    /// create or reuse the pair's connection. `None` if the CAS lost.
    async fn accept_proposal(
        &self,
        proposal_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<(MatchProposal, Connection)>>;

    /// Compare-and-set pending → rejected. `None` if the CAS lost.
    async fn reject_proposal(&self, proposal_id: Uuid, now: DateTime<Utc>) -> Result<Option<MatchProposal>>;

    /// Active connections involving `user_id`.
    async fn connections_of(&self, user_id: Uuid) -> Result<Vec<Connection>>;

    /// Bump the pair's counters. No-op when the pair has no connection.
    async fn record_interaction(&self, pair: Pair, interaction: Interaction, at: DateTime<Utc>) -> Result<()>;

    async fn debit_spin(&self, user_id: Uuid, now: DateTime<Utc>) -> Result<DebitOutcome>;

    /// Returns false when the user does not exist.
    async fn grant_vip(&self, user_id: Uuid, days: i64, now: DateTime<Utc>) -> Result<bool>;

    async fn grant_spins(&self, user_id: Uuid, count: i32) -> Result<bool>;

    async fn grant_gift_credits(&self, user_id: Uuid, count: i32) -> Result<bool>;

    async fn debit_gift_credits(&self, user_id: Uuid, cost: i32) -> Result<DebitOutcome>;

    async fn insert_message(&self, message: &StoredMessage) -> Result<()>;

    /// Persist the gift and bump the sender's and receiver's gift totals.
    async fn insert_gift(&self, gift: &GiftEvent) -> Result<()>;
}

/// New VIP expiry when `days` are granted: extends from the later of the current expiry and now.
pub fn extended_vip_expiry(
    current: Option<DateTime<Utc>>,
    days: i64,
    now: DateTime<Utc>,
) -> DateTime<Utc> {
    let base = current.filter(|expires_at| *expires_at > now).unwrap_or(now);
    base + chrono::Duration::days(days)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_vip_extension_stacks_on_future_expiry() {
        let now = Utc::now();
        let current = Some(now + Duration::days(10));
        assert_eq!(extended_vip_expiry(current, 30, now), now + Duration::days(40));
    }

    #[test]
    fn test_vip_extension_starts_now_when_lapsed() {
        let now = Utc::now();
        let lapsed = Some(now - Duration::days(3));
        assert_eq!(extended_vip_expiry(lapsed, 30, now), now + Duration::days(30));
        assert_eq!(extended_vip_expiry(None, 30, now), now + Duration::days(30));
    }
}
