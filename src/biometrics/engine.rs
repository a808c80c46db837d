// src/biometrics/engine.rs - Per-user orchestration of scoring, learning and persistence
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info, warn};
use parking_lot::Mutex;
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use serde::{Deserialize, Serialize};
use tokio::sync::{oneshot, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::confidence_scorer::score_pattern;
use super::fraud_detector::DeviceRegistry;
use super::learning::{self, LearningOutcome};
use super::validation::validate_pattern;
use super::BiometricError;
use crate::config::Config;
use crate::db::models::{EncryptedPattern, ProfileRecord, StoredProfile};
use crate::db::repositories::{ProfileStore, StoreError};
use crate::models::{
    AnomalyDetails, AuthenticationResult, BiometricProfile, KeystrokePattern, ProfileStatus, Severity, Timestamp,
};
use crate::security::cipher::PatternEncryptor;
use crate::utils::metrics::{
    increment_counter, record_histogram, AUTHENTICATIONS_TOTAL, CONFIDENCE, FRAUD_FLAGS_TOTAL, LEARNING_UPDATES_TOTAL,
    STORAGE_FAILURES_TOTAL,
};
use crate::utils::{now_millis, storage_error_message};

const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    /// Enrollment sample: learned from unless critically fraudulent
    Train,
    /// Authentication attempt: learned from only on success or near success
    Verify,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Train => "train",
            Action::Verify => "verify",
        }
    }
}

#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Upper bound on one store round trip
    pub store_timeout: Duration,
    /// Fixed seed for pruning; entropy when absent
    pub pruning_seed: Option<u64>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        EngineSettings {
            store_timeout: DEFAULT_STORE_TIMEOUT,
            pruning_seed: None,
        }
    }
}

impl From<&Config> for EngineSettings {
    fn from(config: &Config) -> Self {
        EngineSettings {
            store_timeout: Duration::from_millis(config.store_timeout_ms),
            pruning_seed: config.pruning_seed,
        }
    }
}

/// Sealed patterns the store has not confirmed yet, keyed by pattern id
type Backlog = Arc<Mutex<HashMap<Uuid, EncryptedPattern>>>;

/// Working copy of one profile plus the tail of its write chain
struct ProfileSlot {
    profile: BiometricProfile,
    rng: ChaCha20Rng,
    unsealed: Backlog,
    last_write: Option<oneshot::Receiver<()>>,
}

impl ProfileSlot {
    fn new(profile: BiometricProfile, rng: ChaCha20Rng) -> Self {
        ProfileSlot {
            profile,
            rng,
            unsealed: Arc::new(Mutex::new(HashMap::new())),
            last_write: None,
        }
    }
}

type SharedSlot = Arc<AsyncMutex<ProfileSlot>>;

pub struct ContinuousLearningEngine {
    store: Arc<dyn ProfileStore>,
    encryptor: Arc<dyn PatternEncryptor>,
    devices: Option<Arc<dyn DeviceRegistry>>,
    settings: EngineSettings,
    profiles: Mutex<HashMap<Uuid, SharedSlot>>,
    pending_writes: Mutex<Vec<JoinHandle<()>>>,
}

impl ContinuousLearningEngine {
    pub fn new(store: Arc<dyn ProfileStore>, encryptor: Arc<dyn PatternEncryptor>, settings: EngineSettings) -> Self {
        ContinuousLearningEngine {
            store,
            encryptor,
            devices: None,
            settings,
            profiles: Mutex::new(HashMap::new()),
            pending_writes: Mutex::new(Vec::new()),
        }
    }

    pub fn with_device_registry(mut self, devices: Arc<dyn DeviceRegistry>) -> Self {
        self.devices = Some(devices);
        self
    }

    /// Score a sample and fold it into the profile when the action allows.
    ///
    /// The returned result never depends on whether the store write succeeds.
    pub async fn authenticate(
        &self,
        action: Action,
        pattern: KeystrokePattern,
    ) -> Result<AuthenticationResult, BiometricError> {
        validate_pattern(&pattern)?;

        let user_id = pattern.user_id;
        let now = now_millis();
        let shared = match self.find_slot(user_id).await? {
            Some(shared) => shared,
            None if action == Action::Train => self.enroll(user_id, now),
            None => return Err(BiometricError::ProfileNotFound(user_id)),
        };
        let mut slot = shared.lock().await;

        if slot.profile.status == ProfileStatus::Locked {
            warn!("Rejected {} for locked profile {}", action.as_str(), user_id);
            let result = locked_rejection(&slot.profile, &pattern, now);
            record_outcome(action, &result);
            return Ok(result);
        }

        let scored = score_pattern(&slot.profile, &pattern, self.devices.as_deref(), now);
        for flag in scored.fraud.raised() {
            increment_counter(FRAUD_FLAGS_TOTAL, 1, &[("flag", flag)]);
        }

        let ProfileSlot { profile, rng, .. } = &mut *slot;
        let outcome = match action {
            Action::Verify => {
                learning::update_profile_with_learning(profile, pattern.clone(), &scored.result, rng, now)
            }
            Action::Train if scored.fraud.is_critical() => LearningOutcome::Skipped,
            Action::Train => learning::apply_learning(profile, pattern.clone(), rng, now),
        };

        let applied = outcome.is_applied();
        increment_counter(LEARNING_UPDATES_TOTAL, 1, &[("applied", if applied { "true" } else { "false" })]);
        if let LearningOutcome::Applied { previous_status, .. } = outcome {
            if previous_status != slot.profile.status {
                info!(
                    "Profile {} moved from {:?} to {:?}",
                    user_id, previous_status, slot.profile.status
                );
            }
            self.persist(&mut slot, Some(&pattern));
        }

        record_outcome(action, &scored.result);
        Ok(scored.result)
    }

    /// Set by an external security policy; blocks all scoring until unlocked
    pub async fn lock_profile(&self, user_id: Uuid, reason: &str) -> Result<BiometricProfile, BiometricError> {
        let shared = self.existing_slot(user_id).await?;
        let mut slot = shared.lock().await;

        slot.profile.status = ProfileStatus::Locked;
        slot.profile.last_updated = now_millis();
        warn!("Locked biometric profile {}: {}", user_id, reason);

        self.persist(&mut slot, None);
        Ok(slot.profile.clone())
    }

    /// Lift a lock; the status is re-derived from the stored history
    pub async fn unlock_profile(&self, user_id: Uuid) -> Result<BiometricProfile, BiometricError> {
        let shared = self.existing_slot(user_id).await?;
        let mut slot = shared.lock().await;

        if slot.profile.status == ProfileStatus::Locked {
            slot.profile.status = learning::determine_status(&slot.profile.keystroke_patterns, slot.profile.confidence_score);
            slot.profile.last_updated = now_millis();
            info!("Unlocked biometric profile {} as {:?}", user_id, slot.profile.status);
            self.persist(&mut slot, None);
        }

        Ok(slot.profile.clone())
    }

    /// Discard the history and start enrollment over
    pub async fn reset_profile(&self, user_id: Uuid) -> Result<BiometricProfile, BiometricError> {
        let shared = self.existing_slot(user_id).await?;
        let mut slot = shared.lock().await;

        slot.profile = BiometricProfile::new(user_id, now_millis());
        info!("Reset biometric profile {}", user_id);

        self.persist(&mut slot, None);
        Ok(slot.profile.clone())
    }

    pub async fn get_profile(&self, user_id: Uuid) -> Result<BiometricProfile, BiometricError> {
        let shared = self.existing_slot(user_id).await?;
        let slot = shared.lock().await;
        Ok(slot.profile.clone())
    }

    /// Await every store write spawned so far
    pub async fn wait_for_persistence(&self) {
        let handles = std::mem::take(&mut *self.pending_writes.lock());
        for handle in handles {
            if let Err(e) = handle.await {
                error!("Persistence task failed: {}", e);
            }
        }
    }

    async fn existing_slot(&self, user_id: Uuid) -> Result<SharedSlot, BiometricError> {
        self.find_slot(user_id)
            .await?
            .ok_or(BiometricError::ProfileNotFound(user_id))
    }

    /// Registry first, then the store. `None` when neither knows the user.
    async fn find_slot(&self, user_id: Uuid) -> Result<Option<SharedSlot>, BiometricError> {
        let cached = self.profiles.lock().get(&user_id).cloned();
        if cached.is_some() {
            return Ok(cached);
        }

        let loaded = tokio::time::timeout(self.settings.store_timeout, self.store.load_profile(user_id)).await;
        let stored = match loaded {
            Ok(Ok(stored)) => stored,
            // a concurrent enrollment may have registered the user meanwhile
            Ok(Err(StoreError::NotFound(_))) => return Ok(self.profiles.lock().get(&user_id).cloned()),
            Ok(Err(e)) => return Err(e.into()),
            Err(_) => return Err(StoreError::Timeout.into()),
        };

        let profile = self.restore(stored)?;
        debug!("Loaded profile {} with {} patterns", user_id, profile.pattern_count());

        let shared = Arc::clone(
            self.profiles
                .lock()
                .entry(user_id)
                .or_insert_with(|| Arc::new(AsyncMutex::new(ProfileSlot::new(profile, self.slot_rng(user_id))))),
        );
        Ok(Some(shared))
    }

    fn enroll(&self, user_id: Uuid, now: Timestamp) -> SharedSlot {
        let mut profiles = self.profiles.lock();
        let shared = profiles.entry(user_id).or_insert_with(|| {
            info!("Enrolling new biometric profile {}", user_id);
            Arc::new(AsyncMutex::new(ProfileSlot::new(
                BiometricProfile::new(user_id, now),
                self.slot_rng(user_id),
            )))
        });
        Arc::clone(shared)
    }

    /// Pruning RNG owned by one user's slot; a fixed seed stays reproducible per user
    fn slot_rng(&self, user_id: Uuid) -> ChaCha20Rng {
        match self.settings.pruning_seed {
            Some(seed) => {
                let id = user_id.as_u128();
                ChaCha20Rng::seed_from_u64(seed ^ (id as u64) ^ ((id >> 64) as u64))
            }
            None => ChaCha20Rng::from_entropy(),
        }
    }

    /// Rebuild the working copy in record order. Ids the store cannot produce
    /// are dropped with a warning so one lost write never locks the user out.
    fn restore(&self, stored: StoredProfile) -> Result<BiometricProfile, BiometricError> {
        let user_id = stored.record.user_id;
        let mut sealed: HashMap<Uuid, &EncryptedPattern> =
            stored.patterns.iter().map(|p| (p.pattern_id, p)).collect();

        let mut keystroke_patterns = Vec::with_capacity(stored.record.pattern_ids.len());
        for pattern_id in &stored.record.pattern_ids {
            match sealed.remove(pattern_id) {
                Some(pattern) => keystroke_patterns.push(self.encryptor.decrypt(pattern)?),
                None => warn!("Pattern {} missing for profile {}; dropping it", pattern_id, user_id),
            }
        }

        Ok(BiometricProfile {
            user_id: stored.record.user_id,
            keystroke_patterns,
            confidence_score: stored.record.confidence_score,
            status: stored.record.status,
            last_updated: stored.record.last_updated,
        })
    }

    /// Fire-and-forget write of the working copy.
    ///
    /// Writes for one user are chained so they land in update order. Every
    /// write retries the patterns earlier writes failed to append, and the
    /// saved record only lists patterns the store has confirmed.
    fn persist(&self, slot: &mut ProfileSlot, new_pattern: Option<&KeystrokePattern>) {
        let user_id = slot.profile.user_id;

        if let Some(pattern) = new_pattern {
            match self.encryptor.encrypt(pattern) {
                Ok(sealed) => {
                    slot.unsealed.lock().insert(sealed.pattern_id, sealed);
                }
                Err(e) => {
                    error!("{}", storage_error_message(&format!("cannot seal pattern for {}: {}", user_id, e)));
                    increment_counter(STORAGE_FAILURES_TOTAL, 1, &[]);
                    return;
                }
            }
        }

        let record = ProfileRecord::from(&slot.profile);
        {
            // pruned or reset patterns never need to reach the store
            let mut unsealed = slot.unsealed.lock();
            unsealed.retain(|id, _| record.pattern_ids.contains(id));
        }

        let backlog = Arc::clone(&slot.unsealed);
        let store = Arc::clone(&self.store);
        let timeout = self.settings.store_timeout;

        let previous = slot.last_write.take();
        let (done_tx, done_rx) = oneshot::channel();
        slot.last_write = Some(done_rx);

        let handle = tokio::spawn(async move {
            if let Some(previous) = previous {
                // the sender is dropped if the earlier write was aborted
                let _ = previous.await;
            }

            let write = async {
                let pending: Vec<EncryptedPattern> = backlog
                    .lock()
                    .values()
                    .filter(|p| record.pattern_ids.contains(&p.pattern_id))
                    .cloned()
                    .collect();

                let mut failure = None;
                for sealed in &pending {
                    match store.append_encrypted_pattern(sealed, user_id).await {
                        Ok(()) => {
                            backlog.lock().remove(&sealed.pattern_id);
                        }
                        Err(e) => failure = Some(e),
                    }
                }

                let mut saved = record.clone();
                {
                    let unconfirmed = backlog.lock();
                    saved.pattern_ids.retain(|id| !unconfirmed.contains_key(id));
                }
                store.save_profile(&saved).await?;

                match failure {
                    Some(e) => Err(e),
                    None => Ok(()),
                }
            };

            let result = match tokio::time::timeout(timeout, write).await {
                Ok(result) => result,
                Err(_) => Err(StoreError::Timeout),
            };

            match result {
                Ok(()) => debug!("Persisted profile {} ({} patterns)", user_id, record.pattern_ids.len()),
                Err(e) => {
                    error!("{}", storage_error_message(&format!("profile {}: {}", user_id, e)));
                    increment_counter(STORAGE_FAILURES_TOTAL, 1, &[]);
                }
            }

            let _ = done_tx.send(());
        });

        let mut pending = self.pending_writes.lock();
        pending.retain(|h| !h.is_finished());
        pending.push(handle);
    }
}

fn locked_rejection(profile: &BiometricProfile, pattern: &KeystrokePattern, now: Timestamp) -> AuthenticationResult {
    AuthenticationResult {
        success: false,
        confidence_score: 0.0,
        anomaly_details: Some(AnomalyDetails {
            fields: BTreeSet::from(["profile_status".to_string()]),
            severity: Severity::High,
            description: "Biometric profile is locked".to_string(),
        }),
        timestamp: now,
        user_id: profile.user_id,
        pattern_id: pattern.pattern_id,
    }
}

fn record_outcome(action: Action, result: &AuthenticationResult) {
    let outcome = if result.success { "success" } else { "failure" };
    increment_counter(AUTHENTICATIONS_TOTAL, 1, &[("action", action.as_str()), ("outcome", outcome)]);
    record_histogram(CONFIDENCE, result.confidence_score, &[("action", action.as_str())]);
}
