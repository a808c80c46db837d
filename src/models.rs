use std::collections::BTreeSet;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// Define core types
pub type UserId = Uuid;
pub type PatternId = Uuid;
pub type Timestamp = u64;

/// Upper bound on stored patterns per profile
pub const MAX_PATTERNS: usize = 50;

/// A single key press/release event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyTiming {
    pub key: String,
    pub press_time: Timestamp,
    pub release_time: Timestamp,
    pub duration: u32,
}

impl KeyTiming {
    pub fn new(key: &str, press_time: Timestamp, release_time: Timestamp) -> Self {
        KeyTiming {
            key: key.to_string(),
            press_time,
            release_time,
            duration: release_time.saturating_sub(press_time) as u32,
        }
    }

    pub fn is_backspace(&self) -> bool {
        self.key.eq_ignore_ascii_case("backspace") || self.key == "\u{8}"
    }
}

/// Where a typing sample was captured
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatternContext {
    Training,
    Login,
    Api,
}

/// One typing sample
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeystrokePattern {
    pub pattern_id: PatternId,
    pub user_id: UserId,
    pub context: PatternContext,
    pub timings: Vec<KeyTiming>,
    pub timestamp: Timestamp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
}

impl KeystrokePattern {
    pub fn new(user_id: UserId, context: PatternContext, timings: Vec<KeyTiming>, timestamp: Timestamp) -> Self {
        KeystrokePattern {
            pattern_id: Uuid::new_v4(),
            user_id,
            context,
            timings,
            timestamp,
            device_id: None,
        }
    }

    /// Milliseconds from the first press to the last release
    pub fn elapsed_ms(&self) -> u64 {
        match (self.timings.first(), self.timings.last()) {
            (Some(first), Some(last)) => last.release_time.saturating_sub(first.press_time),
            _ => 0,
        }
    }

    /// Words per minute, counting five keystrokes per word
    pub fn words_per_minute(&self) -> f64 {
        let elapsed_minutes = self.elapsed_ms() as f64 / 60_000.0;
        if elapsed_minutes <= 0.0 {
            return 0.0;
        }
        (self.timings.len() as f64 / 5.0) / elapsed_minutes
    }

    /// Inter-keydown intervals (the rhythm vector)
    pub fn rhythm_vector(&self) -> Vec<f64> {
        self.timings
            .windows(2)
            .map(|pair| pair[1].press_time as f64 - pair[0].press_time as f64)
            .collect()
    }

    pub fn backspace_count(&self) -> usize {
        self.timings.iter().filter(|t| t.is_backspace()).count()
    }
}

/// Status of a biometric profile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProfileStatus {
    Learning,
    Active,
    Locked,
}

/// Per-user reference profile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BiometricProfile {
    pub user_id: UserId,
    pub keystroke_patterns: Vec<KeystrokePattern>,
    pub confidence_score: f64, // 0.0 to 100.0
    pub status: ProfileStatus,
    pub last_updated: Timestamp,
}

impl BiometricProfile {
    /// Fresh enrollment profile
    pub fn new(user_id: UserId, now: Timestamp) -> Self {
        BiometricProfile {
            user_id,
            keystroke_patterns: Vec::new(),
            confidence_score: 0.0,
            status: ProfileStatus::Learning,
            last_updated: now,
        }
    }

    pub fn pattern_count(&self) -> usize {
        self.keystroke_patterns.len()
    }
}

/// How serious a detected anomaly is
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyDetails {
    pub fields: BTreeSet<String>,
    pub severity: Severity,
    pub description: String,
}

/// Outcome of scoring one sample
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticationResult {
    pub success: bool,
    pub confidence_score: f64,
    pub anomaly_details: Option<AnomalyDetails>,
    pub timestamp: Timestamp,
    pub user_id: UserId,
    pub pattern_id: PatternId,
}

/// Automation and replay indicators
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FraudIndicators {
    pub machine_generated: bool,
    pub copy_paste: bool,
    pub suspicious_timing: bool,
    pub unusual_sequence: bool,
    pub multi_session: bool,
    pub device_mismatch: bool,
}

impl FraudIndicators {
    /// States that force rejection regardless of the numeric score
    pub fn is_critical(&self) -> bool {
        self.machine_generated
            || self.copy_paste
            || (self.suspicious_timing && self.unusual_sequence)
    }

    /// Names of the raised flags, in a fixed order
    pub fn raised(&self) -> Vec<&'static str> {
        let flags = [
            ("machine_generated", self.machine_generated),
            ("copy_paste", self.copy_paste),
            ("suspicious_timing", self.suspicious_timing),
            ("unusual_sequence", self.unusual_sequence),
            ("multi_session", self.multi_session),
            ("device_mismatch", self.device_mismatch),
        ];
        flags.iter().filter(|(_, raised)| *raised).map(|(name, _)| *name).collect()
    }
}

/// Normalized similarity sub-scores, each in [0, 1]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisMetrics {
    pub dwell_time_consistency: f64,
    pub flight_time_consistency: f64,
    pub rhythm_variability: f64,
    pub error_pattern_match: f64,
    pub speed_consistency: f64,
    pub overall_confidence: f64,
}

impl AnalysisMetrics {
    pub const DWELL_WEIGHT: f64 = 25.0;
    pub const FLIGHT_WEIGHT: f64 = 20.0;
    pub const RHYTHM_WEIGHT: f64 = 15.0;
    pub const ERROR_WEIGHT: f64 = 10.0;
    pub const SPEED_WEIGHT: f64 = 10.0;

    pub fn new(dwell: f64, flight: f64, rhythm: f64, error: f64, speed: f64) -> Self {
        let mut metrics = AnalysisMetrics {
            dwell_time_consistency: dwell,
            flight_time_consistency: flight,
            rhythm_variability: rhythm,
            error_pattern_match: error,
            speed_consistency: speed,
            overall_confidence: 0.0,
        };
        metrics.overall_confidence = metrics.weighted_sum() / Self::total_weight();
        metrics
    }

    /// Cold-start scores: neither penalize nor reward
    pub fn neutral() -> Self {
        Self::new(0.5, 0.5, 0.5, 0.5, 0.5)
    }

    pub fn total_weight() -> f64 {
        Self::DWELL_WEIGHT + Self::FLIGHT_WEIGHT + Self::RHYTHM_WEIGHT + Self::ERROR_WEIGHT + Self::SPEED_WEIGHT
    }

    /// Sub-score contribution in confidence points
    pub fn weighted_sum(&self) -> f64 {
        Self::DWELL_WEIGHT * self.dwell_time_consistency
            + Self::FLIGHT_WEIGHT * self.flight_time_consistency
            + Self::RHYTHM_WEIGHT * self.rhythm_variability
            + Self::ERROR_WEIGHT * self.error_pattern_match
            + Self::SPEED_WEIGHT * self.speed_consistency
    }

    /// (name, score) pairs for anomaly reporting
    pub fn named_scores(&self) -> [(&'static str, f64); 5] {
        [
            ("dwell_time", self.dwell_time_consistency),
            ("flight_time", self.flight_time_consistency),
            ("rhythm", self.rhythm_variability),
            ("error_rate", self.error_pattern_match),
            ("typing_speed", self.speed_consistency),
        ]
    }
}

/// Diagnostics from one applied learning update
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LearningMetrics {
    pub adaptation_rate: f64,
    pub stability_score: f64,
    pub improvement_trend: f64,
    pub confidence_growth: f64,
}
