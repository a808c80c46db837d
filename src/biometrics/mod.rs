// src/biometrics/mod.rs - Keystroke pattern analysis and continuous learning
pub mod confidence_scorer;
pub mod engine;
pub mod fraud_detector;
pub mod learning;
pub mod metrics_analyzer;
pub mod pattern_pruner;
pub mod timing_statistics;
pub mod validation;

use thiserror::Error;
use uuid::Uuid;

use crate::db::repositories::StoreError;
use crate::security::cipher::CipherError;

pub use confidence_scorer::{score_batch, score_pattern, ScoredPattern};
pub use engine::{Action, ContinuousLearningEngine, EngineSettings};
pub use fraud_detector::DeviceRegistry;
pub use learning::{update_profile_with_learning, LearningOutcome};
pub use timing_statistics::TimingStatistics;

/// Error type for the biometric engine
#[derive(Error, Debug)]
pub enum BiometricError {
    #[error("Malformed keystroke pattern: {0}")]
    MalformedPattern(String),

    #[error("Biometric profile not found: {0}")]
    ProfileNotFound(Uuid),

    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),

    #[error("Encryption error: {0}")]
    Encryption(#[from] CipherError),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Arithmetic mean, 0.0 for an empty slice
pub(crate) fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Unbiased sample standard deviation, 0.0 below two values
pub(crate) fn std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    let variance = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    variance.sqrt()
}

/// `1 - coefficient of variation`, clamped to [0, 1]
pub(crate) fn stability(values: &[f64]) -> f64 {
    let m = mean(values);
    if values.len() < 2 || m <= 0.0 {
        return 0.0;
    }
    (1.0 - std_dev(values) / m).clamp(0.0, 1.0)
}
