// src/biometrics/validation.rs - Ingestion checks run before any scoring
use log::debug;

use super::BiometricError;
use crate::models::KeystrokePattern;

/// Longest key label accepted, in characters ("Backspace", "ArrowLeft", ...)
pub const MAX_KEY_LEN: usize = 32;

/// Reject patterns that cannot be scored
pub fn validate_pattern(pattern: &KeystrokePattern) -> Result<(), BiometricError> {
    if pattern.pattern_id.is_nil() {
        return Err(malformed("missing pattern id"));
    }
    if pattern.user_id.is_nil() {
        return Err(malformed("missing user id"));
    }
    if pattern.timings.is_empty() {
        return Err(malformed("timing sequence is empty"));
    }

    let mut previous_press = None;
    for (index, timing) in pattern.timings.iter().enumerate() {
        if timing.key.is_empty() {
            return Err(malformed(&format!("keystroke {} has no key", index)));
        }
        if timing.key.chars().count() > MAX_KEY_LEN {
            return Err(malformed(&format!("keystroke {} key is longer than {} characters", index, MAX_KEY_LEN)));
        }
        if timing.release_time < timing.press_time {
            return Err(malformed(&format!("keystroke {} released before it was pressed", index)));
        }
        if u64::from(timing.duration) != timing.release_time - timing.press_time {
            return Err(malformed(&format!("keystroke {} duration does not match press/release", index)));
        }
        if let Some(previous) = previous_press {
            if timing.press_time < previous {
                return Err(malformed(&format!("keystroke {} pressed out of order", index)));
            }
        }
        previous_press = Some(timing.press_time);
    }

    Ok(())
}

fn malformed(reason: &str) -> BiometricError {
    debug!("Rejected keystroke pattern: {}", reason);
    BiometricError::MalformedPattern(reason.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::biometrics::fixtures::typed;
    use uuid::Uuid;

    #[test]
    fn test_accepts_well_formed_pattern() {
        let pattern = typed(Uuid::new_v4(), "hello", 80, 150, 1_000);
        assert!(validate_pattern(&pattern).is_ok());
    }

    #[test]
    fn test_rejects_empty_timings() {
        let mut pattern = typed(Uuid::new_v4(), "hello", 80, 150, 1_000);
        pattern.timings.clear();
        assert!(matches!(validate_pattern(&pattern), Err(BiometricError::MalformedPattern(_))));
    }

    #[test]
    fn test_rejects_release_before_press() {
        let mut pattern = typed(Uuid::new_v4(), "hello", 80, 150, 1_000);
        pattern.timings[2].release_time = pattern.timings[2].press_time - 1;
        assert!(validate_pattern(&pattern).is_err());
    }

    #[test]
    fn test_rejects_inconsistent_duration() {
        let mut pattern = typed(Uuid::new_v4(), "hello", 80, 150, 1_000);
        pattern.timings[1].duration = 5;
        assert!(validate_pattern(&pattern).is_err());
    }

    #[test]
    fn test_rejects_out_of_order_presses() {
        let mut pattern = typed(Uuid::new_v4(), "hello", 80, 150, 1_000);
        pattern.timings.swap(1, 3);
        assert!(validate_pattern(&pattern).is_err());
    }

    #[test]
    fn test_rejects_oversized_key() {
        let mut pattern = typed(Uuid::new_v4(), "hello", 80, 150, 1_000);
        pattern.timings[0].key = "a".repeat(MAX_KEY_LEN);
        assert!(validate_pattern(&pattern).is_ok());

        pattern.timings[0].key = "ab".repeat(100_000);
        assert!(matches!(validate_pattern(&pattern), Err(BiometricError::MalformedPattern(_))));
    }

    #[test]
    fn test_rejects_nil_user() {
        let pattern = typed(Uuid::nil(), "hello", 80, 150, 1_000);
        assert!(validate_pattern(&pattern).is_err());
    }
}
