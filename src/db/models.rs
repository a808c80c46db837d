// src/db/models.rs - Persisted profile data models
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{BiometricProfile, PatternContext, ProfileStatus, Timestamp};

impl fmt::Display for ProfileStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProfileStatus::Learning => write!(f, "learning"),
            ProfileStatus::Active => write!(f, "active"),
            ProfileStatus::Locked => write!(f, "locked"),
        }
    }
}

impl FromStr for ProfileStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "learning" => Ok(ProfileStatus::Learning),
            "active" => Ok(ProfileStatus::Active),
            "locked" => Ok(ProfileStatus::Locked),
            _ => Err(format!("Invalid profile status: {}", s)),
        }
    }
}

/// Profile row without plaintext timings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileRecord {
    pub user_id: Uuid,
    /// Retained patterns, oldest first
    pub pattern_ids: Vec<Uuid>,
    pub confidence_score: f64,
    pub status: ProfileStatus,
    pub last_updated: Timestamp,
}

impl From<&BiometricProfile> for ProfileRecord {
    fn from(profile: &BiometricProfile) -> Self {
        ProfileRecord {
            user_id: profile.user_id,
            pattern_ids: profile.keystroke_patterns.iter().map(|p| p.pattern_id).collect(),
            confidence_score: profile.confidence_score,
            status: profile.status,
            last_updated: profile.last_updated,
        }
    }
}

/// A keystroke pattern with its timings sealed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncryptedPattern {
    pub pattern_id: Uuid,
    pub user_id: Uuid,
    pub context: PatternContext,
    pub timestamp: Timestamp,
    pub device_id: Option<String>,
    pub nonce: Vec<u8>,
    pub ciphertext: Vec<u8>,
}

/// What the store hands back on load
#[derive(Debug, Clone, PartialEq)]
pub struct StoredProfile {
    pub record: ProfileRecord,
    pub patterns: Vec<EncryptedPattern>,
}
