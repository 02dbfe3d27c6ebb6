use serde::{Deserialize, Serialize};
use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;
use crate::constants::PROPOSAL_TTL_HOURS;
use super::users::MatchPreferences;

/// Canonical key for an unordered pair of users: the lower id always comes first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Pair {
    pub low: Uuid,
    pub high: Uuid,
}

impl Pair {
    pub fn new(a: Uuid, b: Uuid) -> Self {
        let (low, high) = if a < b { (a, b) } else { (b, a) };
        Self { low, high }
    }

    pub fn contains(&self, user_id: Uuid) -> bool {
        self.low == user_id || self.high == user_id
    }

    /// The member of the pair that is not `user_id`.
    pub fn other(&self, user_id: Uuid) -> Uuid {
        if self.low == user_id { self.high } else { self.low }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProposalStatus {
    Pending,
    Accepted,
    Rejected,
    Expired,
}

impl ProposalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProposalStatus::Pending => "pending",
            ProposalStatus::Accepted => "accepted",
            ProposalStatus::Rejected => "rejected",
            ProposalStatus::Expired => "expired",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(ProposalStatus::Pending),
            "accepted" => Some(ProposalStatus::Accepted),
            "rejected" => Some(ProposalStatus::Rejected),
            "expired" => Some(ProposalStatus::Expired),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchProposal {
    pub id: Uuid,
    pub initiator_id: Uuid,
    pub candidate_id: Uuid,
    /// Stored status. Use [`MatchProposal::effective_status`] to account for expiry.
    pub status: ProposalStatus,
    pub preferences: MatchPreferences,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub accepted_at: Option<DateTime<Utc>>,
    pub rejected_at: Option<DateTime<Utc>>,
}

impl MatchProposal {
    pub fn new(initiator_id: Uuid, candidate_id: Uuid, preferences: MatchPreferences, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            initiator_id,
            candidate_id,
            status: ProposalStatus::Pending,
            preferences,
            created_at: now,
            expires_at: now + Duration::hours(PROPOSAL_TTL_HOURS),
            accepted_at: None,
            rejected_at: None,
        }
    }

    pub fn pair(&self) -> Pair {
        Pair::new(self.initiator_id, self.candidate_id)
    }

    pub fn involves(&self, user_id: Uuid) -> bool {
        self.initiator_id == user_id || self.candidate_id == user_id
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    /// Pending proposals past their expiry read as expired; resolved ones keep their status.
    pub fn effective_status(&self, now: DateTime<Utc>) -> ProposalStatus {
        match self.status {
            ProposalStatus::Pending if self.is_expired(now) => ProposalStatus::Expired,
            status => status,
        }
    }

    pub fn is_open(&self, now: DateTime<Utc>) -> bool {
        self.effective_status(now) == ProposalStatus::Pending
    }

    /// Copy with the expiry-aware status written into `status`, for responses.
    pub fn as_seen_at(&self, now: DateTime<Utc>) -> Self {
        Self {
            status: self.effective_status(now),
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Accept,
    Reject,
}
