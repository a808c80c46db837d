// src/biometrics/metrics_analyzer.rs - Similarity sub-scores for a new sample
//
// Each sub-score lands in [0, 1]. Keys and digrams that the history cannot
// score are skipped; a metric with nothing to compare is neutral (0.5).

use super::mean;
use super::timing_statistics::TimingStatistics;
use crate::models::{AnalysisMetrics, BiometricProfile, KeystrokePattern};

const NEUTRAL: f64 = 0.5;

const MIN_DWELL_STD_DEV_MS: f64 = 10.0;
const DWELL_Z_CUTOFF: f64 = 2.5;

const MIN_FLIGHT_STD_DEV_MS: f64 = 20.0;
const FLIGHT_Z_CUTOFF: f64 = 2.0;

/// Backspace-rate difference that drives the error score to zero
const ERROR_RATE_TOLERANCE: f64 = 0.2;

/// Speed ratio deviation tolerated at full score
const SPEED_BAND: f64 = 0.4;
/// Speed ratio deviation at which the score reaches zero
const SPEED_CUTOFF: f64 = 1.0;

/// Compare a sample against the profile history
pub fn analyze(profile: &BiometricProfile, stats: &TimingStatistics, pattern: &KeystrokePattern) -> AnalysisMetrics {
    let history = &profile.keystroke_patterns;
    if history.is_empty() {
        return AnalysisMetrics::neutral();
    }

    AnalysisMetrics::new(
        dwell_time_consistency(stats, pattern),
        flight_time_consistency(stats, pattern),
        rhythm_variability(history, pattern),
        error_pattern_match(history, pattern),
        speed_consistency(history, pattern),
    )
}

pub fn dwell_time_consistency(stats: &TimingStatistics, pattern: &KeystrokePattern) -> f64 {
    let scores: Vec<f64> = pattern
        .timings
        .iter()
        .filter_map(|timing| {
            stats.scorable_key(&timing.key).map(|stat| {
                let z = (f64::from(timing.duration) - stat.mean).abs() / stat.std_dev.max(MIN_DWELL_STD_DEV_MS);
                (1.0 - z / DWELL_Z_CUTOFF).max(0.0)
            })
        })
        .collect();

    average_or_neutral(&scores)
}

pub fn flight_time_consistency(stats: &TimingStatistics, pattern: &KeystrokePattern) -> f64 {
    let scores: Vec<f64> = pattern
        .timings
        .windows(2)
        .filter_map(|pair| {
            stats.digram(&pair[0].key, &pair[1].key).map(|stat| {
                let flight = pair[1].press_time as f64 - pair[0].release_time as f64;
                let z = (flight - stat.mean).abs() / stat.std_dev.max(MIN_FLIGHT_STD_DEV_MS);
                (1.0 - z / FLIGHT_Z_CUTOFF).max(0.0)
            })
        })
        .collect();

    average_or_neutral(&scores)
}

pub fn rhythm_variability(history: &[KeystrokePattern], pattern: &KeystrokePattern) -> f64 {
    let reference = average_rhythm(history);
    let sample = pattern.rhythm_vector();

    let scores: Vec<f64> = reference
        .iter()
        .zip(sample.iter())
        .map(|(a, b)| interval_similarity(*a, *b))
        .collect();

    average_or_neutral(&scores)
}

pub fn error_pattern_match(history: &[KeystrokePattern], pattern: &KeystrokePattern) -> f64 {
    let total_keys: usize = history.iter().map(|p| p.timings.len()).sum();
    if total_keys == 0 || pattern.timings.is_empty() {
        return NEUTRAL;
    }
    let total_backspaces: usize = history.iter().map(|p| p.backspace_count()).sum();

    let profile_rate = total_backspaces as f64 / total_keys as f64;
    let sample_rate = pattern.backspace_count() as f64 / pattern.timings.len() as f64;

    (1.0 - (profile_rate - sample_rate).abs() / ERROR_RATE_TOLERANCE).max(0.0)
}

pub fn speed_consistency(history: &[KeystrokePattern], pattern: &KeystrokePattern) -> f64 {
    let speeds: Vec<f64> = history.iter().map(|p| p.words_per_minute()).collect();
    let reference = mean(&speeds);
    if reference <= 0.0 {
        return NEUTRAL;
    }

    let deviation = (pattern.words_per_minute() / reference - 1.0).abs();
    if deviation <= SPEED_BAND {
        1.0
    } else {
        (1.0 - (deviation - SPEED_BAND) / (SPEED_CUTOFF - SPEED_BAND)).max(0.0)
    }
}

/// Index-wise mean of the history's rhythm vectors
pub fn average_rhythm(history: &[KeystrokePattern]) -> Vec<f64> {
    let mut sums: Vec<f64> = Vec::new();
    let mut counts: Vec<usize> = Vec::new();

    for pattern in history {
        for (index, interval) in pattern.rhythm_vector().into_iter().enumerate() {
            if index == sums.len() {
                sums.push(0.0);
                counts.push(0);
            }
            sums[index] += interval;
            counts[index] += 1;
        }
    }

    sums.into_iter()
        .zip(counts)
        .map(|(sum, count)| sum / count as f64)
        .collect()
}

/// Relative closeness of two intervals in [0, 1]
pub fn interval_similarity(a: f64, b: f64) -> f64 {
    let larger = a.max(b);
    if larger <= 0.0 {
        return 1.0;
    }
    (1.0 - (a - b).abs() / larger).max(0.0)
}

fn average_or_neutral(scores: &[f64]) -> f64 {
    if scores.is_empty() {
        NEUTRAL
    } else {
        mean(scores).clamp(0.0, 1.0)
    }
}
