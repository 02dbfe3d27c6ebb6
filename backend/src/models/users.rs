use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};
use uuid::Uuid;
use crate::constants::DEFAULT_FREE_SPINS;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserStatus {
    Active,
    Inactive,
    Suspended,
}

impl UserStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserStatus::Active => "active",
            UserStatus::Inactive => "inactive",
            UserStatus::Suspended => "suspended",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "active" => Some(UserStatus::Active),
            "inactive" => Some(UserStatus::Inactive),
            "suspended" => Some(UserStatus::Suspended),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub display_name: String,
    pub age: Option<i32>,
    pub interests: Vec<String>,
    pub status: UserStatus,
    pub is_vip: bool,
    pub vip_level: i32,
    pub vip_expires_at: Option<DateTime<Utc>>,
    pub free_spins: i32,
    pub total_spins: i32,
    pub gift_credits: i32,
    pub total_gifts_sent: i32,
    pub total_gifts_received: i32,
    pub last_active_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl User {
    /// A fresh active account with the signup allowance of free spins.
    pub fn new(display_name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            display_name: display_name.into(),
            age: None,
            interests: Vec::new(),
            status: UserStatus::Active,
            is_vip: false,
            vip_level: 0,
            vip_expires_at: None,
            free_spins: DEFAULT_FREE_SPINS,
            total_spins: 0,
            gift_credits: 0,
            total_gifts_sent: 0,
            total_gifts_received: 0,
            last_active_at: None,
            created_at: Utc::now(),
        }
    }

    pub fn vip_active(&self, now: DateTime<Utc>) -> bool {
        self.is_vip && self.vip_expires_at.is_none_or(|expires_at| expires_at > now)
    }

    pub fn can_spin(&self, now: DateTime<Utc>) -> bool {
        self.free_spins > 0 || self.vip_active(now)
    }

    /// Whether this user passes the candidate filters of a spin.
    pub fn matches_preferences(&self, preferences: &MatchPreferences) -> bool {
        if self.status != UserStatus::Active {
            return false;
        }
        if let Some(age_min) = preferences.age_min {
            if self.age.is_none_or(|age| age < age_min) {
                return false;
            }
        }
        if let Some(age_max) = preferences.age_max {
            if self.age.is_none_or(|age| age > age_max) {
                return false;
            }
        }
        match preferences.interests.as_deref() {
            Some(wanted) if !wanted.is_empty() => {
                self.interests.iter().any(|interest| wanted.contains(interest))
            }
            _ => true,
        }
    }
}

/// Filters a user may attach to a spin. `location` and `gender` are kept in the
/// proposal snapshot but are not used for filtering.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchPreferences {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub age_min: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub age_max: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interests: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gender: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserStats {
    pub total_spins: i32,
    pub free_spins: i32,
    pub is_vip: bool,
    pub vip_level: i32,
    pub total_matches: i64,
    pub total_connections: i64,
    pub vip_expires_at: Option<DateTime<Utc>>,
    pub gift_credits: i32,
}
