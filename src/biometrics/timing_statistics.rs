// src/biometrics/timing_statistics.rs - Per-key and per-digram timing tables
use std::collections::HashMap;

use super::{mean, std_dev};
use crate::models::KeystrokePattern;

/// Observations a key or digram needs before it enters a table
pub const MIN_TABLE_SAMPLES: usize = 2;

/// Observations a key needs before dwell scoring uses it
pub const MIN_SCORING_SAMPLES: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimingStat {
    pub mean: f64,
    pub std_dev: f64,
    pub sample_count: usize,
}

impl TimingStat {
    fn from_samples(samples: &[f64]) -> Self {
        TimingStat {
            mean: mean(samples),
            std_dev: std_dev(samples),
            sample_count: samples.len(),
        }
    }
}

/// Lookup tables built from a profile's pattern history
#[derive(Debug, Clone, Default)]
pub struct TimingStatistics {
    /// key -> dwell statistics
    pub keys: HashMap<String, TimingStat>,

    /// (from, to) -> flight statistics
    pub digrams: HashMap<(String, String), TimingStat>,
}

impl TimingStatistics {
    pub fn build(patterns: &[KeystrokePattern]) -> Self {
        let mut dwell_samples: HashMap<&str, Vec<f64>> = HashMap::new();
        let mut flight_samples: HashMap<(&str, &str), Vec<f64>> = HashMap::new();

        for pattern in patterns {
            for timing in &pattern.timings {
                dwell_samples
                    .entry(timing.key.as_str())
                    .or_default()
                    .push(f64::from(timing.duration));
            }

            for pair in pattern.timings.windows(2) {
                flight_samples
                    .entry((pair[0].key.as_str(), pair[1].key.as_str()))
                    .or_default()
                    .push(flight_time(pair[0].release_time, pair[1].press_time));
            }
        }

        let keys = dwell_samples
            .into_iter()
            .filter(|(_, samples)| samples.len() >= MIN_TABLE_SAMPLES)
            .map(|(key, samples)| (key.to_string(), TimingStat::from_samples(&samples)))
            .collect();

        let digrams = flight_samples
            .into_iter()
            .filter(|(_, samples)| samples.len() >= MIN_TABLE_SAMPLES)
            .map(|((from, to), samples)| ((from.to_string(), to.to_string()), TimingStat::from_samples(&samples)))
            .collect();

        TimingStatistics { keys, digrams }
    }

    /// Dwell statistics for a key that has enough history to be scored
    pub fn scorable_key(&self, key: &str) -> Option<&TimingStat> {
        self.keys
            .get(key)
            .filter(|stat| stat.sample_count >= MIN_SCORING_SAMPLES)
    }

    pub fn digram(&self, from: &str, to: &str) -> Option<&TimingStat> {
        self.digrams.get(&(from.to_string(), to.to_string()))
    }
}

/// Signed release-to-press interval; negative when keystrokes overlap
pub fn flight_time(previous_release: u64, next_press: u64) -> f64 {
    next_press as f64 - previous_release as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::biometrics::fixtures::{typed, with_timings};
    use uuid::Uuid;

    #[test]
    fn test_key_table_requires_two_observations() {
        let user = Uuid::new_v4();
        let stats = TimingStatistics::build(&[typed(user, "abca", 80, 150, 0)]);

        assert!(stats.keys.contains_key("a"));
        assert!(!stats.keys.contains_key("b"));
        assert_eq!(stats.keys["a"].sample_count, 2);
        assert!(stats.scorable_key("a").is_none());
    }

    #[test]
    fn test_key_statistics() {
        let user = Uuid::new_v4();
        let patterns = vec![
            with_timings(user, &[("a", 70, 0)], 0),
            with_timings(user, &[("a", 80, 0)], 1_000),
            with_timings(user, &[("a", 90, 0)], 2_000),
        ];
        let stats = TimingStatistics::build(&patterns);
        let a = stats.scorable_key("a").unwrap();

        assert!((a.mean - 80.0).abs() < 1e-9);
        assert!((a.std_dev - 10.0).abs() < 1e-9);
        assert_eq!(a.sample_count, 3);
    }

    #[test]
    fn test_digram_flight_times() {
        let user = Uuid::new_v4();
        // press-to-press 150 with 80ms dwell leaves a 70ms flight
        let patterns = vec![typed(user, "th", 80, 150, 0), typed(user, "th", 80, 150, 5_000)];
        let stats = TimingStatistics::build(&patterns);
        let th = stats.digram("t", "h").unwrap();

        assert!((th.mean - 70.0).abs() < 1e-9);
        assert_eq!(th.std_dev, 0.0);
        assert!(stats.digram("h", "t").is_none());
    }

    #[test]
    fn test_overlapping_keys_give_negative_flight() {
        assert_eq!(flight_time(200, 150), -50.0);
    }

    #[test]
    fn test_empty_history() {
        let stats = TimingStatistics::build(&[]);
        assert!(stats.scorable_key("a").is_none());
        assert!(stats.digram("a", "b").is_none());
    }
}
