use anyhow::{bail, Context, Result};
use log::warn;
use std::collections::HashMap;
use std::env;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

const DEFAULT_CONFIG_FILE: &str = "biometrics.conf";

/// Service configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub api_host: String,
    pub api_port: u16,
    pub api_workers: usize,
    pub log_level: String,
    pub metrics_port: u16,
    pub store_timeout_ms: u64,
    pub pruning_seed: Option<u64>,
    /// 64 hex characters; a random key is generated when unset
    pub encryption_key: Option<String>,
    pub extra: HashMap<String, String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_host: "127.0.0.1".to_string(),
            api_port: 8080,
            api_workers: 4,
            log_level: "info".to_string(),
            metrics_port: 9090,
            store_timeout_ms: 2_000,
            pruning_seed: None,
            encryption_key: None,
            extra: HashMap::new(),
        }
    }
}

/// Load configuration: defaults, then the config file, then the environment
pub fn load_config() -> Result<Config> {
    // Load .env file if it exists
    dotenv::dotenv().ok();

    let mut config = Config::default();

    let path = env::var("BIOMETRICS_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());
    let path = Path::new(&path);
    if path.exists() {
        load_from_file(&mut config, path)?;
    }

    load_from_env(&mut config)?;
    validate(&config)?;

    if config.encryption_key.is_none() {
        warn!("ENCRYPTION_KEY not set; stored patterns will be unreadable after a restart");
    }

    Ok(config)
}

/// Load configuration from environment variables
fn load_from_env(config: &mut Config) -> Result<()> {
    for key in [
        "API_HOST",
        "API_PORT",
        "API_WORKERS",
        "LOG_LEVEL",
        "METRICS_PORT",
        "STORE_TIMEOUT_MS",
        "PRUNING_SEED",
        "ENCRYPTION_KEY",
    ] {
        if let Ok(value) = env::var(key) {
            set_value(config, key, &value)?;
        }
    }

    for (key, value) in env::vars() {
        if let Some(config_key) = key.strip_prefix("CONFIG_") {
            config.extra.insert(config_key.to_string(), value);
        }
    }

    Ok(())
}

/// Load configuration from a key=value file
fn load_from_file(config: &mut Config, path: &Path) -> Result<()> {
    let file = File::open(path).context("Failed to open configuration file")?;
    let reader = BufReader::new(file);

    for line in reader.lines() {
        let line = line.context("Failed to read line from configuration file")?;
        let line = line.trim();

        // Skip empty lines and comments
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        if let Some((key, value)) = line.split_once('=') {
            set_value(config, key.trim(), value.trim())
                .with_context(|| format!("Invalid entry in {}", path.display()))?;
        }
    }

    Ok(())
}

fn set_value(config: &mut Config, key: &str, value: &str) -> Result<()> {
    match key {
        "API_HOST" => config.api_host = value.to_string(),
        "API_PORT" => config.api_port = value.parse().context("API_PORT must be a port number")?,
        "API_WORKERS" => config.api_workers = value.parse().context("API_WORKERS must be a positive integer")?,
        "LOG_LEVEL" => config.log_level = value.to_string(),
        "METRICS_PORT" => config.metrics_port = value.parse().context("METRICS_PORT must be a port number")?,
        "STORE_TIMEOUT_MS" => {
            config.store_timeout_ms = value.parse().context("STORE_TIMEOUT_MS must be milliseconds")?
        }
        "PRUNING_SEED" => config.pruning_seed = Some(value.parse().context("PRUNING_SEED must be an integer")?),
        "ENCRYPTION_KEY" => config.encryption_key = Some(value.to_string()),
        _ => {
            // Add to extra configurations
            let key = key.strip_prefix("CONFIG_").unwrap_or(key);
            config.extra.insert(key.to_string(), value.to_string());
        }
    }

    Ok(())
}

fn validate(config: &Config) -> Result<()> {
    if config.api_workers == 0 {
        bail!("API_WORKERS must be at least 1");
    }
    if config.store_timeout_ms == 0 {
        bail!("STORE_TIMEOUT_MS must be greater than zero");
    }
    if let Some(key) = &config.encryption_key {
        if key.len() != 64 || !key.chars().all(|c| c.is_ascii_hexdigit()) {
            bail!("ENCRYPTION_KEY must be 64 hex characters");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(validate(&config).is_ok());
        assert_eq!(config.store_timeout_ms, 2_000);
        assert!(config.pruning_seed.is_none());
    }

    #[test]
    fn test_load_from_file() {
        let path = env::temp_dir().join(format!("biometrics-{}.conf", uuid::Uuid::new_v4()));
        let mut file = File::create(&path).unwrap();
        writeln!(file, "# service settings").unwrap();
        writeln!(file, "API_PORT = 9000").unwrap();
        writeln!(file, "PRUNING_SEED=42").unwrap();
        writeln!(file).unwrap();
        writeln!(file, "CONFIG_REGION=eu-west").unwrap();
        writeln!(file, "FEATURE_X=on").unwrap();
        drop(file);

        let mut config = Config::default();
        load_from_file(&mut config, &path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(config.api_port, 9000);
        assert_eq!(config.pruning_seed, Some(42));
        assert_eq!(config.extra.get("REGION").map(String::as_str), Some("eu-west"));
        assert_eq!(config.extra.get("FEATURE_X").map(String::as_str), Some("on"));
    }

    #[test]
    fn test_invalid_values_are_errors() {
        let mut config = Config::default();
        assert!(set_value(&mut config, "API_PORT", "eighty").is_err());
        assert!(set_value(&mut config, "STORE_TIMEOUT_MS", "-1").is_err());
    }

    #[test]
    fn test_encryption_key_validation() {
        let mut config = Config::default();
        config.encryption_key = Some("abc".to_string());
        assert!(validate(&config).is_err());

        config.encryption_key = Some("0f".repeat(32));
        assert!(validate(&config).is_ok());

        config.encryption_key = None;
        config.api_workers = 0;
        assert!(validate(&config).is_err());
    }
}
