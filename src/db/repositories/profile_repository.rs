// src/db/repositories/profile_repository.rs
use std::collections::HashMap;

use async_trait::async_trait;
use log::{debug, warn};
use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::db::models::{EncryptedPattern, ProfileRecord, StoredProfile};

/// Error types for profile persistence
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("Profile not found: {0}")]
    NotFound(Uuid),

    #[error("Storage failure: {0}")]
    Storage(String),

    #[error("Storage operation timed out")]
    Timeout,
}

/// Durable home of biometric profiles and their encrypted patterns
#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn load_profile(&self, user_id: Uuid) -> Result<StoredProfile, StoreError>;
    async fn save_profile(&self, record: &ProfileRecord) -> Result<(), StoreError>;
    async fn append_encrypted_pattern(&self, pattern: &EncryptedPattern, profile_id: Uuid) -> Result<(), StoreError>;
}

/// Process-local store, used by the server by default and by tests
pub struct InMemoryProfileStore {
    records: RwLock<HashMap<Uuid, ProfileRecord>>,
    patterns: RwLock<HashMap<Uuid, Vec<EncryptedPattern>>>,
}

impl InMemoryProfileStore {
    pub fn new() -> Self {
        InMemoryProfileStore {
            records: RwLock::new(HashMap::new()),
            patterns: RwLock::new(HashMap::new()),
        }
    }

    #[cfg(test)]
    pub async fn pattern_count(&self, user_id: Uuid) -> usize {
        self.patterns
            .read()
            .await
            .get(&user_id)
            .map(|patterns| patterns.len())
            .unwrap_or(0)
    }
}

impl Default for InMemoryProfileStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProfileStore for InMemoryProfileStore {
    async fn load_profile(&self, user_id: Uuid) -> Result<StoredProfile, StoreError> {
        let record = self
            .records
            .read()
            .await
            .get(&user_id)
            .cloned()
            .ok_or(StoreError::NotFound(user_id))?;

        let stored = self.patterns.read().await;
        let by_id: HashMap<Uuid, &EncryptedPattern> = stored
            .get(&user_id)
            .map(|patterns| patterns.iter().map(|p| (p.pattern_id, p)).collect())
            .unwrap_or_default();

        // the record may list a pattern whose append never landed
        let mut patterns = Vec::with_capacity(record.pattern_ids.len());
        for pattern_id in &record.pattern_ids {
            match by_id.get(pattern_id) {
                Some(pattern) => patterns.push((*pattern).clone()),
                None => warn!("Pattern {} missing for profile {}", pattern_id, user_id),
            }
        }

        Ok(StoredProfile { record, patterns })
    }

    async fn save_profile(&self, record: &ProfileRecord) -> Result<(), StoreError> {
        self.records.write().await.insert(record.user_id, record.clone());

        // drop sealed patterns the profile no longer references
        let mut patterns = self.patterns.write().await;
        if let Some(stored) = patterns.get_mut(&record.user_id) {
            let before = stored.len();
            stored.retain(|p| record.pattern_ids.contains(&p.pattern_id));
            if stored.len() != before {
                debug!("Dropped {} pruned patterns for profile {}", before - stored.len(), record.user_id);
            }
        }

        Ok(())
    }

    async fn append_encrypted_pattern(&self, pattern: &EncryptedPattern, profile_id: Uuid) -> Result<(), StoreError> {
        if pattern.user_id != profile_id {
            return Err(StoreError::Storage(format!(
                "Pattern {} belongs to {}, not {}",
                pattern.pattern_id, pattern.user_id, profile_id
            )));
        }

        let mut patterns = self.patterns.write().await;
        let stored = patterns.entry(profile_id).or_insert_with(Vec::new);
        if !stored.iter().any(|p| p.pattern_id == pattern.pattern_id) {
            stored.push(pattern.clone());
        }

        Ok(())
    }
}
