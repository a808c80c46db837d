// src/biometrics/learning.rs - Learning update procedure and profile status state machine
use log::debug;
use rand::Rng;

use super::pattern_pruner;
use super::{mean, stability};
use crate::models::{
    AuthenticationResult, BiometricProfile, KeystrokePattern, LearningMetrics, ProfileStatus, Timestamp, MAX_PATTERNS,
};

/// Patterns needed before overall stability counts
pub const MIN_STABILITY_PATTERNS: usize = 10;
/// Below this many patterns a profile is always learning
pub const MIN_LEARNING_PATTERNS: usize = 3;
/// Confidence a failed sample still needs to be learned from
pub const LEARNING_CONFIDENCE: f64 = 70.0;

const ACTIVE_CONFIDENCE: f64 = 70.0;
const ACTIVE_STABILITY: f64 = 0.85;

const RECENT_WINDOW: usize = 5;
const SEASONED_PATTERNS: usize = 20;

const ADAPTIVE_BASE: f64 = 50.0;
const PER_PATTERN_POINTS: f64 = 2.0;
const PATTERN_POINTS_CAP: f64 = 20.0;
const STABILITY_POINTS: f64 = 30.0;
const RECENT_STABILITY_POINTS: f64 = 10.0;
const SEASONED_BONUS: f64 = 5.0;
const CONFIDENCE_CEILING: f64 = 95.0;

/// What a learning update did to the profile
#[derive(Debug, Clone, PartialEq)]
pub enum LearningOutcome {
    /// Sample rejected for learning; the profile is unchanged
    Skipped,
    Applied {
        previous_status: ProfileStatus,
        metrics: LearningMetrics,
    },
}

impl LearningOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, LearningOutcome::Applied { .. })
    }
}

/// Whether a scored sample may be folded into the profile
pub fn should_learn(result: &AuthenticationResult) -> bool {
    result.success || result.confidence_score >= LEARNING_CONFIDENCE
}

/// Fold a sample into the profile if the result allows it.
///
/// Appends, prunes to `MAX_PATTERNS`, recomputes the adaptive confidence from
/// scratch and re-derives the status.
pub fn update_profile_with_learning<R: Rng + ?Sized>(
    profile: &mut BiometricProfile,
    pattern: KeystrokePattern,
    result: &AuthenticationResult,
    rng: &mut R,
    now: Timestamp,
) -> LearningOutcome {
    if !should_learn(result) {
        debug!(
            "Skipping learning for user {}: confidence {:.2} without success",
            profile.user_id, result.confidence_score
        );
        return LearningOutcome::Skipped;
    }

    apply_learning(profile, pattern, rng, now)
}

/// Unconditional part of the update, shared with enrollment
pub fn apply_learning<R: Rng + ?Sized>(
    profile: &mut BiometricProfile,
    pattern: KeystrokePattern,
    rng: &mut R,
    now: Timestamp,
) -> LearningOutcome {
    let previous_status = profile.status;
    let previous_confidence = profile.confidence_score;

    let mut patterns = std::mem::take(&mut profile.keystroke_patterns);
    patterns.push(pattern);
    profile.keystroke_patterns = pattern_pruner::prune(patterns, MAX_PATTERNS, rng);

    profile.confidence_score = adaptive_confidence(&profile.keystroke_patterns);
    profile.status = next_status(profile.status, &profile.keystroke_patterns, profile.confidence_score);
    profile.last_updated = now;

    let metrics = learning_metrics(&profile.keystroke_patterns, previous_confidence, profile.confidence_score);
    debug!(
        "Learning update for user {}: {} patterns, confidence {:.2} -> {:.2}, status {:?} -> {:?}, {:?}",
        profile.user_id,
        profile.pattern_count(),
        previous_confidence,
        profile.confidence_score,
        previous_status,
        profile.status,
        metrics
    );

    LearningOutcome::Applied { previous_status, metrics }
}

/// Confidence threshold earned by the stored history, in [0, 95]
pub fn adaptive_confidence(patterns: &[KeystrokePattern]) -> f64 {
    let count = patterns.len();
    let speeds = typing_speeds(patterns);

    let mut confidence = ADAPTIVE_BASE + (PER_PATTERN_POINTS * count as f64).min(PATTERN_POINTS_CAP);

    if count >= MIN_STABILITY_PATTERNS {
        confidence += STABILITY_POINTS * stability(last(&speeds, MIN_STABILITY_PATTERNS));
    }
    if count >= RECENT_WINDOW {
        confidence += RECENT_STABILITY_POINTS * stability(last(&speeds, RECENT_WINDOW));
    }
    if count >= SEASONED_PATTERNS {
        confidence += SEASONED_BONUS;
    }

    confidence.clamp(0.0, CONFIDENCE_CEILING)
}

/// Status as a pure function of the history and confidence
pub fn determine_status(patterns: &[KeystrokePattern], confidence: f64) -> ProfileStatus {
    if patterns.len() < MIN_LEARNING_PATTERNS {
        return ProfileStatus::Learning;
    }

    if patterns.len() >= MIN_STABILITY_PATTERNS && confidence >= ACTIVE_CONFIDENCE {
        let speeds = typing_speeds(patterns);
        if stability(last(&speeds, MIN_STABILITY_PATTERNS)) >= ACTIVE_STABILITY {
            return ProfileStatus::Active;
        }
    }

    ProfileStatus::Learning
}

/// Locked is owned by the external lockout policy and survives learning
fn next_status(current: ProfileStatus, patterns: &[KeystrokePattern], confidence: f64) -> ProfileStatus {
    match current {
        ProfileStatus::Locked => ProfileStatus::Locked,
        _ => determine_status(patterns, confidence),
    }
}

pub fn learning_metrics(patterns: &[KeystrokePattern], previous_confidence: f64, confidence: f64) -> LearningMetrics {
    let speeds = typing_speeds(patterns);
    let stability_score = stability(last(&speeds, MIN_STABILITY_PATTERNS));

    let improvement_trend = if speeds.len() >= MIN_STABILITY_PATTERNS {
        let (earlier, recent) = speeds.split_at(speeds.len() - RECENT_WINDOW);
        (stability(recent) - stability(earlier)).clamp(-1.0, 1.0)
    } else {
        0.0
    };

    LearningMetrics {
        adaptation_rate: if patterns.is_empty() { 0.0 } else { 1.0 / patterns.len() as f64 },
        stability_score,
        improvement_trend,
        confidence_growth: ((confidence - previous_confidence) / 100.0).clamp(-1.0, 1.0),
    }
}

/// Mean typing speed of the history, used for reporting
pub fn average_speed(patterns: &[KeystrokePattern]) -> f64 {
    mean(&typing_speeds(patterns))
}

fn typing_speeds(patterns: &[KeystrokePattern]) -> Vec<f64> {
    patterns.iter().map(|p| p.words_per_minute()).collect()
}

fn last(values: &[f64], n: usize) -> &[f64] {
    &values[values.len().saturating_sub(n)..]
}
