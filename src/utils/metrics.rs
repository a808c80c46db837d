use anyhow::{Context, Result};
use metrics::Label;
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder};
use std::net::SocketAddr;

use crate::config::Config;

pub const AUTHENTICATIONS_TOTAL: &str = "biometrics_authentications_total";
pub const FRAUD_FLAGS_TOTAL: &str = "biometrics_fraud_flags_total";
pub const STORAGE_FAILURES_TOTAL: &str = "biometrics_storage_failures_total";
pub const LEARNING_UPDATES_TOTAL: &str = "biometrics_learning_updates_total";
pub const CONFIDENCE: &str = "biometrics_confidence";

/// Install the Prometheus recorder and its scrape endpoint.
/// Must be called from within a tokio runtime.
pub fn init_metrics(config: &Config) -> Result<()> {
    let addr = format!("0.0.0.0:{}", config.metrics_port)
        .parse::<SocketAddr>()
        .context("Invalid metrics listen address")?;

    // Confidence is a 0-100 score, bucket it by tens
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .set_buckets_for_metric(
            Matcher::Full(CONFIDENCE.to_string()),
            &[10.0, 20.0, 30.0, 40.0, 50.0, 60.0, 70.0, 80.0, 90.0, 100.0],
        )
        .context("Invalid histogram buckets")?
        .install()
        .context("Failed to install Prometheus exporter")?;

    Ok(())
}

// Helper functions for recording metrics

// Record a counter metric
pub fn increment_counter(name: &'static str, value: u64, labels: &[(&'static str, &str)]) {
    metrics::counter!(name, to_labels(labels)).increment(value);
}

// Record a histogram metric
pub fn record_histogram(name: &'static str, value: f64, labels: &[(&'static str, &str)]) {
    metrics::histogram!(name, to_labels(labels)).record(value);
}

fn to_labels(labels: &[(&'static str, &str)]) -> Vec<Label> {
    labels
        .iter()
        .map(|(key, value)| Label::new(*key, value.to_string()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_labels_keep_order() {
        let labels = to_labels(&[("action", "verify"), ("outcome", "success")]);
        assert_eq!(labels.len(), 2);
        assert_eq!(labels[0].key(), "action");
        assert_eq!(labels[1].value(), "success");
    }

    #[test]
    fn test_recording_without_recorder_is_noop() {
        increment_counter(AUTHENTICATIONS_TOTAL, 1, &[("action", "train"), ("outcome", "failure")]);
        record_histogram(CONFIDENCE, 42.0, &[]);
    }
}
