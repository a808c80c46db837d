pub mod logging;
pub mod metrics;

use chrono::{DateTime, Utc};

/// Current wall-clock time in epoch milliseconds
pub fn now_millis() -> u64 {
    datetime_to_timestamp(&Utc::now())
}

/// Converts a DateTime<Utc> to a timestamp in milliseconds
pub fn datetime_to_timestamp(dt: &DateTime<Utc>) -> u64 {
    dt.timestamp_millis().max(0) as u64
}

/// Returns a standard error message for validation errors
pub fn validation_error_message(error: &str) -> String {
    format!("Validation error: {}", error)
}

/// Returns a standard error message for storage errors
pub fn storage_error_message(error: &str) -> String {
    format!("Storage error: {}", error)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_datetime_to_timestamp() {
        let dt = DateTime::parse_from_rfc3339("2021-05-03T00:00:00Z").unwrap().with_timezone(&Utc);
        assert_eq!(datetime_to_timestamp(&dt), 1_620_000_000_000);
    }

    #[test]
    fn test_now_millis_is_current() {
        let before = Utc::now().timestamp_millis() as u64;
        let now = now_millis();
        assert!(now >= before);
        assert!(now - before < 1_000);
    }

    #[test]
    fn test_error_messages() {
        assert_eq!(validation_error_message("empty timings"), "Validation error: empty timings");
        assert_eq!(storage_error_message("timed out"), "Storage error: timed out");
    }
}
