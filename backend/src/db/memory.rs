//! In-memory `Store` used by tests and by servers started without `DATABASE_URL`.
//!
//! All state sits behind one lock, so every trait method is trivially atomic
//! and all writes to a user's entitlement fields are linearized.

use std::collections::{HashMap, HashSet};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use rand::seq::IteratorRandom;
use uuid::Uuid;

use super::store::{extended_vip_expiry, DebitOutcome, SpinCommit, Store};
use crate::models::{
    Connection, GiftEvent, Interaction, MatchPreferences, MatchProposal, Pair, ProposalStatus,
    StoredMessage, User,
};

#[derive(Debug, Default)]
struct MemoryState {
    users: HashMap<Uuid, User>,
    proposals: HashMap<Uuid, MatchProposal>,
    proposal_pairs: HashMap<Pair, Uuid>,
    connections: HashMap<Pair, Connection>,
    messages: Vec<StoredMessage>,
    gifts: Vec<GiftEvent>,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a proposal as-is, bypassing spin checks. Used to seed fixtures.
    pub fn insert_proposal(&self, proposal: MatchProposal) {
        let mut state = self.state.write();
        state.proposal_pairs.insert(proposal.pair(), proposal.id);
        state.proposals.insert(proposal.id, proposal);
    }

    pub fn all_proposals(&self) -> Vec<MatchProposal> {
        self.state.read().proposals.values().cloned().collect()
    }

    pub fn all_connections(&self) -> Vec<Connection> {
        self.state.read().connections.values().cloned().collect()
    }

    pub fn messages(&self) -> Vec<StoredMessage> {
        self.state.read().messages.clone()
    }

    pub fn gifts(&self) -> Vec<GiftEvent> {
        self.state.read().gifts.clone()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert_user(&self, user: &User) -> Result<()> {
        self.state.write().users.insert(user.id, user.clone());
        Ok(())
    }

    async fn get_user(&self, user_id: Uuid) -> Result<Option<User>> {
        Ok(self.state.read().users.get(&user_id).cloned())
    }

    async fn set_last_active(&self, user_id: Uuid, at: DateTime<Utc>) -> Result<()> {
        if let Some(user) = self.state.write().users.get_mut(&user_id) {
            user.last_active_at = Some(at);
        }
        Ok(())
    }

    async fn counterparts_of(&self, user_id: Uuid) -> Result<HashSet<Uuid>> {
        let state = self.state.read();
        let counterparts = state
            .proposals
            .values()
            .filter(|proposal| proposal.involves(user_id))
            .map(|proposal| proposal.pair().other(user_id))
            .collect();
        Ok(counterparts)
    }

    async fn sample_candidates(
        &self,
        excluded: &HashSet<Uuid>,
        preferences: &MatchPreferences,
        limit: usize,
    ) -> Result<Vec<User>> {
        let state = self.state.read();
        let mut rng = rand::rng();
        let sample = state
            .users
            .values()
            .filter(|user| !excluded.contains(&user.id) && user.matches_preferences(preferences))
            .choose_multiple(&mut rng, limit);
        Ok(sample.into_iter().cloned().collect())
    }

    async fn commit_spin(&self, proposal: &MatchProposal, now: DateTime<Utc>) -> Result<SpinCommit> {
        let mut state = self.state.write();
        let state = &mut *state;

        let Some(user) = state.users.get_mut(&proposal.initiator_id) else {
            return Ok(SpinCommit::UserMissing);
        };
        if !user.can_spin(now) {
            return Ok(SpinCommit::NotEntitled);
        }
        let pair = proposal.pair();
        if state.proposal_pairs.contains_key(&pair) {
            return Ok(SpinCommit::PairTaken);
        }

        if !user.vip_active(now) {
            user.free_spins -= 1;
        }
        user.total_spins += 1;
        user.last_active_at = Some(now);

        state.proposal_pairs.insert(pair, proposal.id);
        state.proposals.insert(proposal.id, proposal.clone());
        Ok(SpinCommit::Committed)
    }

    async fn get_proposal(&self, proposal_id: Uuid) -> Result<Option<MatchProposal>> {
        Ok(self.state.read().proposals.get(&proposal_id).cloned())
    }

    async fn proposals_of(&self, user_id: Uuid) -> Result<Vec<MatchProposal>> {
        let state = self.state.read();
        let mut proposals: Vec<MatchProposal> = state
            .proposals
            .values()
            .filter(|proposal| proposal.involves(user_id))
            .cloned()
            .collect();
        proposals.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(proposals)
    }

    async fn accept_proposal(
        &self,
        proposal_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<(MatchProposal, Connection)>> {
        let mut state = self.state.write();
        let state = &mut *state;

        let Some(proposal) = state.proposals.get_mut(&proposal_id) else {
            return Ok(None);
        };
        if !proposal.is_open(now) {
            return Ok(None);
        }
        proposal.status = ProposalStatus::Accepted;
        proposal.accepted_at = Some(now);
        let proposal = proposal.clone();

        let connection = state
            .connections
            .entry(proposal.pair())
            .or_insert_with(|| Connection::new(proposal.pair(), now))
            .clone();
        Ok(Some((proposal, connection)))
    }

    async fn reject_proposal(&self, proposal_id: Uuid, now: DateTime<Utc>) -> Result<Option<MatchProposal>> {
        let mut state = self.state.write();
        let Some(proposal) = state.proposals.get_mut(&proposal_id) else {
            return Ok(None);
        };
        if !proposal.is_open(now) {
            return Ok(None);
        }
        proposal.status = ProposalStatus::Rejected;
        proposal.rejected_at = Some(now);
        Ok(Some(proposal.clone()))
    }

    async fn connections_of(&self, user_id: Uuid) -> Result<Vec<Connection>> {
        let state = self.state.read();
        let connections = state
            .connections
            .values()
            .filter(|connection| connection.is_active() && connection.pair().contains(user_id))
            .cloned()
            .collect();
        Ok(connections)
    }

    async fn record_interaction(&self, pair: Pair, interaction: Interaction, at: DateTime<Utc>) -> Result<()> {
        if let Some(connection) = self.state.write().connections.get_mut(&pair) {
            connection.record(interaction, at);
        }
        Ok(())
    }

    async fn debit_spin(&self, user_id: Uuid, now: DateTime<Utc>) -> Result<DebitOutcome> {
        let mut state = self.state.write();
        let Some(user) = state.users.get_mut(&user_id) else {
            return Ok(DebitOutcome::UserMissing);
        };
        if user.vip_active(now) {
            return Ok(DebitOutcome::Applied);
        }
        if user.free_spins <= 0 {
            return Ok(DebitOutcome::Insufficient);
        }
        user.free_spins -= 1;
        Ok(DebitOutcome::Applied)
    }

    async fn grant_vip(&self, user_id: Uuid, days: i64, now: DateTime<Utc>) -> Result<bool> {
        let mut state = self.state.write();
        let Some(user) = state.users.get_mut(&user_id) else {
            return Ok(false);
        };
        user.is_vip = true;
        user.vip_level = user.vip_level.max(1);
        user.vip_expires_at = Some(extended_vip_expiry(user.vip_expires_at, days, now));
        Ok(true)
    }

    async fn grant_spins(&self, user_id: Uuid, count: i32) -> Result<bool> {
        let mut state = self.state.write();
        let Some(user) = state.users.get_mut(&user_id) else {
            return Ok(false);
        };
        user.free_spins = user
            .free_spins
            .checked_add(count)
            .ok_or_else(|| anyhow!("spin balance of user {} would overflow", user_id))?;
        Ok(true)
    }

    async fn grant_gift_credits(&self, user_id: Uuid, count: i32) -> Result<bool> {
        let mut state = self.state.write();
        let Some(user) = state.users.get_mut(&user_id) else {
            return Ok(false);
        };
        user.gift_credits = user
            .gift_credits
            .checked_add(count)
            .ok_or_else(|| anyhow!("gift credit balance of user {} would overflow", user_id))?;
        Ok(true)
    }

    async fn debit_gift_credits(&self, user_id: Uuid, cost: i32) -> Result<DebitOutcome> {
        let mut state = self.state.write();
        let Some(user) = state.users.get_mut(&user_id) else {
            return Ok(DebitOutcome::UserMissing);
        };
        if user.gift_credits < cost {
            return Ok(DebitOutcome::Insufficient);
        }
        user.gift_credits -= cost;
        Ok(DebitOutcome::Applied)
    }

    async fn insert_message(&self, message: &StoredMessage) -> Result<()> {
        self.state.write().messages.push(message.clone());
        Ok(())
    }

    async fn insert_gift(&self, gift: &GiftEvent) -> Result<()> {
        let mut state = self.state.write();
        if let Some(sender) = state.users.get_mut(&gift.sender_id) {
            sender.total_gifts_sent += 1;
        }
        if let Some(receiver) = state.users.get_mut(&gift.receiver_id) {
            receiver.total_gifts_received += 1;
        }
        state.gifts.push(gift.clone());
        Ok(())
    }
}
