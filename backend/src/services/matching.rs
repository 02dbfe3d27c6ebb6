use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use rand::seq::IndexedRandom;
use tracing::{debug, info};
use uuid::Uuid;

use super::ledger::EntitlementLedger;
use crate::{
    constants::{CANDIDATE_SAMPLE_SIZE, MAX_SPIN_ATTEMPTS},
    db::Store,
    error::{AppError, AppResult},
    models::{Connection, MatchPreferences, MatchProposal, Resolution, User, UserStats},
};

/// A freshly recorded proposal and the user it points at.
#[derive(Debug, Clone)]
pub struct SpinOutcome {
    pub proposal: MatchProposal,
    pub candidate: User,
}

/// Candidate selection and the proposal lifecycle.
#[derive(Clone)]
pub struct MatchService {
    store: Arc<dyn Store>,
    ledger: EntitlementLedger,
}

impl MatchService {
    pub fn new(store: Arc<dyn Store>, ledger: EntitlementLedger) -> Self {
        Self { store, ledger }
    }

    /// Pick a candidate for `requester_id` and record a pending proposal.
    ///
    /// Everyone the requester has ever been paired with, in either direction,
    /// is excluded. The spin is only charged once the proposal is stored.
    pub async fn spin(&self, requester_id: Uuid, preferences: MatchPreferences) -> AppResult<SpinOutcome> {
        if !self.ledger.can_spin(requester_id).await? {
            return Err(AppError::NotEntitled);
        }

        let mut excluded = self.excluded_for(requester_id).await?;
        for attempt in 1..=MAX_SPIN_ATTEMPTS {
            let sample = self
                .store
                .sample_candidates(&excluded, &preferences, CANDIDATE_SAMPLE_SIZE)
                .await?;
            let Some(candidate) = pick_candidate(sample) else {
                return Err(AppError::NoCandidates);
            };

            let proposal = MatchProposal::new(requester_id, candidate.id, preferences.clone(), Utc::now());
            if self.ledger.settle_spin(&proposal).await? {
                info!(
                    "🎰 Spin by {} matched {} (proposal {})",
                    requester_id, candidate.id, proposal.id
                );
                return Ok(SpinOutcome { proposal, candidate });
            }

            debug!(
                "Pair {}/{} claimed concurrently, retrying spin (attempt {}/{})",
                requester_id, candidate.id, attempt, MAX_SPIN_ATTEMPTS
            );
            excluded.insert(candidate.id);
        }

        Err(AppError::NoCandidates)
    }

    pub async fn accept(&self, actor_id: Uuid, proposal_id: Uuid) -> AppResult<Connection> {
        let (proposal, connection) = match self.resolve(actor_id, proposal_id, Resolution::Accept).await? {
            Resolved::Accepted(proposal, connection) => (proposal, connection),
            Resolved::Rejected(_) => return Err(AppError::NotFound),
        };
        info!(
            "🤝 Proposal {} accepted by {}, connection {}",
            proposal.id, actor_id, connection.id
        );
        Ok(connection)
    }

    pub async fn reject(&self, actor_id: Uuid, proposal_id: Uuid) -> AppResult<MatchProposal> {
        match self.resolve(actor_id, proposal_id, Resolution::Reject).await? {
            Resolved::Rejected(proposal) => {
                info!("Proposal {} rejected by {}", proposal.id, actor_id);
                Ok(proposal)
            }
            Resolved::Accepted(..) => Err(AppError::NotFound),
        }
    }

    async fn resolve(&self, actor_id: Uuid, proposal_id: Uuid, resolution: Resolution) -> AppResult<Resolved> {
        let now = Utc::now();
        let proposal = self
            .store
            .get_proposal(proposal_id)
            .await?
            .ok_or(AppError::NotFound)?;
        if !proposal.involves(actor_id) {
            return Err(AppError::Forbidden);
        }
        if !proposal.is_open(now) {
            return Err(AppError::NotFound);
        }

        // The store re-checks the pending status; a concurrent resolution wins the CAS.
        match resolution {
            Resolution::Accept => self
                .store
                .accept_proposal(proposal_id, now)
                .await?
                .map(|(proposal, connection)| Resolved::Accepted(proposal, connection))
                .ok_or(AppError::NotFound),
            Resolution::Reject => self
                .store
                .reject_proposal(proposal_id, now)
                .await?
                .map(Resolved::Rejected)
                .ok_or(AppError::NotFound),
        }
    }

    /// Proposals involving the user, newest first, with expiry applied.
    pub async fn list_matches(&self, user_id: Uuid) -> AppResult<Vec<MatchProposal>> {
        let now = Utc::now();
        let proposals = self.store.proposals_of(user_id).await?;
        Ok(proposals.iter().map(|proposal| proposal.as_seen_at(now)).collect())
    }

    /// Active connections, most recent interaction first.
    pub async fn list_connections(&self, user_id: Uuid) -> AppResult<Vec<Connection>> {
        let mut connections = self.store.connections_of(user_id).await?;
        connections.sort_by(|a, b| b.recency().cmp(&a.recency()));
        Ok(connections)
    }

    pub async fn stats(&self, user_id: Uuid) -> AppResult<UserStats> {
        let user = self.store.get_user(user_id).await?.ok_or(AppError::UserNotFound)?;
        let total_matches = self.store.proposals_of(user_id).await?.len() as i64;
        let total_connections = self.store.connections_of(user_id).await?.len() as i64;

        Ok(UserStats {
            total_spins: user.total_spins,
            free_spins: user.free_spins,
            is_vip: user.vip_active(Utc::now()),
            vip_level: user.vip_level,
            total_matches,
            total_connections,
            vip_expires_at: user.vip_expires_at,
            gift_credits: user.gift_credits,
        })
    }

    /// Users the requester can no longer be matched with.
    pub async fn excluded_for(&self, requester_id: Uuid) -> AppResult<HashSet<Uuid>> {
        let mut excluded = self.store.counterparts_of(requester_id).await?;
        excluded.insert(requester_id);
        Ok(excluded)
    }
}

enum Resolved {
    Accepted(MatchProposal, Connection),
    Rejected(MatchProposal),
}

/// Uniform pick from the sample.
fn pick_candidate(sample: Vec<User>) -> Option<User> {
    let mut rng = rand::rng();
    sample.choose(&mut rng).cloned()
}
