// src/biometrics/fraud_detector.rs - Heuristic automation and replay screening
use lazy_static::lazy_static;
use log::warn;
use regex::Regex;
use uuid::Uuid;

use crate::models::{FraudIndicators, KeystrokePattern};

/// Fraction of machine-like keystroke pairs that raises suspicious timing
const SUSPICIOUS_TIMING_RATIO: f64 = 0.7;
/// Release-to-next-press gap below which a pair looks scripted
const MACHINE_GAP_MS: f64 = 5.0;
/// Dwell granularity typical of synthetic input
const TIMER_GRANULARITY_MS: u32 = 10;

/// Consecutive dwell deltas below this are implausibly uniform
const HUMAN_MIN_VARIATION_MS: i64 = 15;
const MACHINE_GENERATED_RATIO: f64 = 0.8;

const COPY_PASTE_WPM: f64 = 300.0;
const COPY_PASTE_MIN_KEYS: usize = 10;

/// Idle gap between presses that splits a sample into separate sessions
const SESSION_GAP_MS: u64 = 30 * 60 * 1000;

/// Minimum repeats of a block (after its first occurrence) to count as a loop
const BLOCK_REPEATS: usize = 3;
/// Longest block the loop scan considers; keeps the scan linear in the sequence
const MAX_BLOCK_LEN: usize = 16;

lazy_static! {
    static ref KEYBOARD_WALK: Regex =
        Regex::new(r"qwerty|asdfgh|zxcvbn|123456|qwertz|azerty").expect("keyboard walk pattern is valid");
}

/// Known-device lookup backing the device-mismatch flag
pub trait DeviceRegistry: Send + Sync {
    fn is_known_device(&self, user_id: Uuid, device_id: &str) -> bool;
}

/// Screen a sample for automation and replay indicators
pub fn detect(pattern: &KeystrokePattern, devices: Option<&dyn DeviceRegistry>) -> FraudIndicators {
    let indicators = FraudIndicators {
        machine_generated: is_machine_generated(pattern),
        copy_paste: is_copy_paste(pattern),
        suspicious_timing: has_suspicious_timing(pattern),
        unusual_sequence: has_unusual_sequence(pattern),
        multi_session: spans_multiple_sessions(pattern),
        device_mismatch: is_device_mismatch(pattern, devices),
    };

    if indicators.is_critical() {
        warn!(
            "Critical fraud indicators on pattern {} for user {}: {:?}",
            pattern.pattern_id,
            pattern.user_id,
            indicators.raised()
        );
    }

    indicators
}

pub fn has_suspicious_timing(pattern: &KeystrokePattern) -> bool {
    let timings = &pattern.timings;
    if timings.len() <= 5 {
        return false;
    }

    let machine_like = timings
        .windows(2)
        .filter(|pair| {
            let gap = pair[1].press_time as f64 - pair[0].release_time as f64;
            pair[0].duration % TIMER_GRANULARITY_MS == 0 && gap < MACHINE_GAP_MS
        })
        .count();

    machine_like as f64 / (timings.len() - 1) as f64 > SUSPICIOUS_TIMING_RATIO
}

pub fn has_unusual_sequence(pattern: &KeystrokePattern) -> bool {
    let sequence: String = pattern
        .timings
        .iter()
        .map(|t| t.key.to_lowercase())
        .collect();

    KEYBOARD_WALK.is_match(&sequence) || has_repeating_block(&sequence)
}

pub fn is_machine_generated(pattern: &KeystrokePattern) -> bool {
    let deltas: Vec<i64> = pattern
        .timings
        .windows(2)
        .map(|pair| (i64::from(pair[1].duration) - i64::from(pair[0].duration)).abs())
        .collect();
    if deltas.len() < 5 {
        return false;
    }

    let uniform = deltas.iter().filter(|d| **d < HUMAN_MIN_VARIATION_MS).count();
    uniform as f64 / deltas.len() as f64 > MACHINE_GENERATED_RATIO
}

pub fn is_copy_paste(pattern: &KeystrokePattern) -> bool {
    pattern.timings.len() >= COPY_PASTE_MIN_KEYS && pattern.words_per_minute() > COPY_PASTE_WPM
}

pub fn spans_multiple_sessions(pattern: &KeystrokePattern) -> bool {
    pattern
        .timings
        .windows(2)
        .any(|pair| pair[1].press_time.saturating_sub(pair[0].press_time) > SESSION_GAP_MS)
}

pub fn is_device_mismatch(pattern: &KeystrokePattern, devices: Option<&dyn DeviceRegistry>) -> bool {
    match (devices, pattern.device_id.as_deref()) {
        (Some(registry), Some(device_id)) => !registry.is_known_device(pattern.user_id, device_id),
        _ => false,
    }
}

/// True when some block of 2 to `MAX_BLOCK_LEN` characters repeats
/// back-to-back at least `BLOCK_REPEATS + 1` times
fn has_repeating_block(sequence: &str) -> bool {
    let chars: Vec<char> = sequence.chars().collect();
    let n = chars.len();

    for block in 2..=(n / (BLOCK_REPEATS + 1)).min(MAX_BLOCK_LEN) {
        for start in 0..=n - block * (BLOCK_REPEATS + 1) {
            let head = &chars[start..start + block];
            let mut repeats = 0;
            let mut offset = start + block;
            while repeats < BLOCK_REPEATS && &chars[offset..offset + block] == head {
                repeats += 1;
                offset += block;
            }
            if repeats >= BLOCK_REPEATS {
                return true;
            }
        }
    }

    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::biometrics::fixtures::{typed, with_timings};
    use std::collections::HashSet;

    struct KnownDevices(HashSet<String>);

    impl DeviceRegistry for KnownDevices {
        fn is_known_device(&self, _user_id: Uuid, device_id: &str) -> bool {
            self.0.contains(device_id)
        }
    }

    fn human_sample(user: Uuid) -> KeystrokePattern {
        with_timings(
            user,
            &[
                ("t", 92, 0),
                ("h", 71, 143),
                ("e", 105, 118),
                (" ", 64, 201),
                ("c", 88, 167),
                ("a", 123, 139),
                ("t", 77, 188),
            ],
            0,
        )
    }

    #[test]
    fn test_human_sample_raises_nothing() {
        let flags = detect(&human_sample(Uuid::new_v4()), None);
        assert_eq!(flags, FraudIndicators::default());
    }

    #[test]
    fn test_machine_generated_uniform_durations() {
        let pattern = typed(Uuid::new_v4(), "correcthorse", 50, 120, 0);
        assert!(is_machine_generated(&pattern));
    }

    #[test]
    fn test_machine_generated_needs_five_deltas() {
        // five uniform keys give only four deltas
        let pattern = typed(Uuid::new_v4(), "hello", 80, 150, 0);
        assert!(!is_machine_generated(&pattern));
    }

    #[test]
    fn test_suspicious_timing() {
        // 20ms dwell then the next key 2ms after release
        let pattern = typed(Uuid::new_v4(), "abcdefgh", 20, 22, 0);
        assert!(has_suspicious_timing(&pattern));

        let short = typed(Uuid::new_v4(), "abcde", 20, 22, 0);
        assert!(!has_suspicious_timing(&short));
    }

    #[test]
    fn test_unusual_sequences() {
        let user = Uuid::new_v4();
        assert!(has_unusual_sequence(&typed(user, "xxqwertyxx", 80, 150, 0)));
        assert!(has_unusual_sequence(&typed(user, "abababab", 80, 150, 0)));
        assert!(has_unusual_sequence(&typed(user, "zabcabcabcabcz", 80, 150, 0)));
        assert!(!has_unusual_sequence(&typed(user, "ababab", 80, 150, 0)));
        assert!(!has_unusual_sequence(&typed(user, "aaaaaaa", 80, 150, 0)));
    }

    #[test]
    fn test_long_sequences_scan_quickly() {
        // 100k distinct-looking characters with no loop and no keyboard walk
        let sequence: String = (0..100_000u32)
            .map(|i| char::from_u32(0x4E00 + (i * 7919) % 20_000).unwrap_or('x'))
            .collect();

        let started = std::time::Instant::now();
        assert!(!has_repeating_block(&sequence));
        assert!(started.elapsed() < std::time::Duration::from_secs(5));

        let looped = format!("{}{}", sequence, "0123456789abcdef".repeat(4));
        assert!(has_repeating_block(&looped));

        // blocks longer than the scan window are not treated as loops
        assert!(!has_repeating_block(&"0123456789abcdefg".repeat(4)));
    }

    #[test]
    fn test_copy_paste_speed() {
        // 12 keys in ~0.1s is far beyond human typing speed
        let pasted = typed(Uuid::new_v4(), "pastedsecret", 3, 8, 0);
        assert!(is_copy_paste(&pasted));

        let fast_but_short = typed(Uuid::new_v4(), "short", 3, 8, 0);
        assert!(!is_copy_paste(&fast_but_short));
    }

    #[test]
    fn test_multi_session_gap() {
        let user = Uuid::new_v4();
        let stitched = with_timings(user, &[("a", 80, 0), ("b", 80, 150), ("c", 80, 31 * 60 * 1000)], 0);
        assert!(spans_multiple_sessions(&stitched));
        assert!(!spans_multiple_sessions(&human_sample(user)));
    }

    #[test]
    fn test_device_mismatch_requires_registry() {
        let user = Uuid::new_v4();
        let mut pattern = human_sample(user);
        pattern.device_id = Some("laptop-2".to_string());

        assert!(!is_device_mismatch(&pattern, None));

        let registry = KnownDevices(HashSet::from(["laptop-1".to_string()]));
        assert!(is_device_mismatch(&pattern, Some(&registry)));

        pattern.device_id = Some("laptop-1".to_string());
        assert!(!is_device_mismatch(&pattern, Some(&registry)));
    }
}
