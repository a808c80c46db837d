// src/biometrics/confidence_scorer.rs - Combines sub-scores and fraud flags into a verdict
use std::collections::BTreeSet;

use log::debug;
use rayon::prelude::*;

use super::fraud_detector::{self, DeviceRegistry};
use super::metrics_analyzer;
use super::timing_statistics::TimingStatistics;
use crate::models::{
    AnalysisMetrics, AnomalyDetails, AuthenticationResult, BiometricProfile, FraudIndicators, KeystrokePattern,
    ProfileStatus, Severity, Timestamp,
};

const BASE_CONFIDENCE: f64 = 50.0;

/// Bonus once a profile holds this many patterns
const MATURITY_PATTERNS: usize = 10;
const MATURITY_BONUS: f64 = 5.0;

const MACHINE_GENERATED_PENALTY: f64 = 30.0;
const COPY_PASTE_PENALTY: f64 = 25.0;
const SUSPICIOUS_TIMING_PENALTY: f64 = 20.0;
const UNUSUAL_SEQUENCE_PENALTY: f64 = 15.0;
const DEVICE_MISMATCH_PENALTY: f64 = 10.0;
const MULTI_SESSION_PENALTY: f64 = 5.0;

/// Learning profiles with fewer patterns get a floor relative to their threshold
const LEARNING_FLOOR_PATTERNS: usize = 5;
const LEARNING_FLOOR_RATIO: f64 = 0.7;

/// Below this fraction of the threshold the result carries anomaly details
const ANOMALY_RATIO: f64 = 0.8;
/// Sub-scores below this are reported as anomalous
const WEAK_METRIC: f64 = 0.5;
const MEDIUM_SEVERITY_CONFIDENCE: f64 = 0.4;

/// Full output of one scoring pass
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredPattern {
    pub result: AuthenticationResult,
    pub metrics: AnalysisMetrics,
    pub fraud: FraudIndicators,
}

/// Score a sample against a profile. Pure: same inputs, same output.
pub fn score_pattern(
    profile: &BiometricProfile,
    pattern: &KeystrokePattern,
    devices: Option<&dyn DeviceRegistry>,
    now: Timestamp,
) -> ScoredPattern {
    let stats = TimingStatistics::build(&profile.keystroke_patterns);
    score_with_statistics(profile, &stats, pattern, devices, now)
}

/// Score many samples against one profile in parallel
pub fn score_batch(
    profile: &BiometricProfile,
    patterns: &[KeystrokePattern],
    devices: Option<&dyn DeviceRegistry>,
    now: Timestamp,
) -> Vec<ScoredPattern> {
    let stats = TimingStatistics::build(&profile.keystroke_patterns);
    patterns
        .par_iter()
        .map(|pattern| score_with_statistics(profile, &stats, pattern, devices, now))
        .collect()
}

fn score_with_statistics(
    profile: &BiometricProfile,
    stats: &TimingStatistics,
    pattern: &KeystrokePattern,
    devices: Option<&dyn DeviceRegistry>,
    now: Timestamp,
) -> ScoredPattern {
    let metrics = metrics_analyzer::analyze(profile, stats, pattern);
    let fraud = fraud_detector::detect(pattern, devices);

    let confidence = calculate_confidence(profile, &metrics, &fraud);
    let critical = fraud.is_critical();
    let success = confidence >= profile.confidence_score && !critical;

    let anomaly_details = if confidence < profile.confidence_score * ANOMALY_RATIO || critical {
        Some(describe_anomalies(&metrics, &fraud))
    } else {
        None
    };

    debug!(
        "Scored pattern {} for user {}: confidence {:.2} (threshold {:.2}), success {}",
        pattern.pattern_id, profile.user_id, confidence, profile.confidence_score, success
    );

    ScoredPattern {
        result: AuthenticationResult {
            success,
            confidence_score: confidence,
            anomaly_details,
            timestamp: now,
            user_id: profile.user_id,
            pattern_id: pattern.pattern_id,
        },
        metrics,
        fraud,
    }
}

/// Confidence in [0, 100] before the success decision
pub fn calculate_confidence(profile: &BiometricProfile, metrics: &AnalysisMetrics, fraud: &FraudIndicators) -> f64 {
    let mut confidence = BASE_CONFIDENCE + metrics.weighted_sum();

    if profile.pattern_count() >= MATURITY_PATTERNS {
        confidence += MATURITY_BONUS;
    }

    confidence -= fraud_penalty(fraud);
    confidence = confidence.clamp(0.0, 100.0);

    if profile.status == ProfileStatus::Learning && profile.pattern_count() < LEARNING_FLOOR_PATTERNS {
        confidence = confidence.max(profile.confidence_score * LEARNING_FLOOR_RATIO);
    }

    confidence.clamp(0.0, 100.0)
}

pub fn fraud_penalty(fraud: &FraudIndicators) -> f64 {
    let penalties = [
        (fraud.machine_generated, MACHINE_GENERATED_PENALTY),
        (fraud.copy_paste, COPY_PASTE_PENALTY),
        (fraud.suspicious_timing, SUSPICIOUS_TIMING_PENALTY),
        (fraud.unusual_sequence, UNUSUAL_SEQUENCE_PENALTY),
        (fraud.device_mismatch, DEVICE_MISMATCH_PENALTY),
        (fraud.multi_session, MULTI_SESSION_PENALTY),
    ];

    penalties
        .iter()
        .filter(|(raised, _)| *raised)
        .map(|(_, penalty)| penalty)
        .sum()
}

fn describe_anomalies(metrics: &AnalysisMetrics, fraud: &FraudIndicators) -> AnomalyDetails {
    let scores = metrics.named_scores();
    let mut fields: BTreeSet<String> = scores
        .iter()
        .filter(|(_, score)| *score < WEAK_METRIC)
        .map(|(name, _)| name.to_string())
        .collect();

    let raised = fraud.raised();
    if fields.is_empty() && raised.is_empty() {
        if let Some((name, _)) = scores.iter().min_by(|a, b| a.1.total_cmp(&b.1)) {
            fields.insert(name.to_string());
        }
    }
    fields.extend(raised.iter().map(|flag| flag.to_string()));

    let severity = if fraud.is_critical() {
        Severity::High
    } else if metrics.overall_confidence < MEDIUM_SEVERITY_CONFIDENCE {
        Severity::Medium
    } else {
        Severity::Low
    };

    let description = match severity {
        Severity::High => format!(
            "Typing sample shows signs of automated or replayed input ({})",
            fields.iter().cloned().collect::<Vec<_>>().join(", ")
        ),
        _ => format!(
            "Typing sample deviates from the enrolled profile in: {}",
            fields.iter().cloned().collect::<Vec<_>>().join(", ")
        ),
    };

    AnomalyDetails { fields, severity, description }
}
