use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::{info, warn};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use keystroke_biometrics::biometrics::{score_pattern, validation, ContinuousLearningEngine, EngineSettings};
use keystroke_biometrics::config::{self, Config};
use keystroke_biometrics::db::InMemoryProfileStore;
use keystroke_biometrics::models::{BiometricProfile, KeystrokePattern};
use keystroke_biometrics::security::{ChaChaPatternEncryptor, PatternEncryptor};
use keystroke_biometrics::{api, utils};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP API
    Serve,

    /// Score one typing sample against a profile and print the result
    Evaluate {
        /// Profile JSON file
        #[arg(long)]
        profile: PathBuf,

        /// Keystroke pattern JSON file
        #[arg(long)]
        pattern: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    utils::logging::init_logger();

    // Parse command line arguments
    let cli = Cli::parse();

    match cli.command {
        Command::Serve => serve().await,
        Command::Evaluate { profile, pattern } => evaluate(&profile, &pattern),
    }
}

async fn serve() -> Result<()> {
    let config = config::load_config()?;
    utils::metrics::init_metrics(&config)?;

    let engine = Arc::new(build_engine(&config)?);
    info!("Starting keystroke biometrics API...");
    api::start_api_server(config, engine).await.context("API server failed")?;

    Ok(())
}

fn build_engine(config: &Config) -> Result<ContinuousLearningEngine> {
    let encryptor: Arc<dyn PatternEncryptor> = match &config.encryption_key {
        Some(key) => Arc::new(ChaChaPatternEncryptor::from_hex(key).context("Invalid ENCRYPTION_KEY")?),
        None => {
            warn!("Using an ephemeral pattern encryption key");
            Arc::new(ChaChaPatternEncryptor::generate())
        }
    };

    Ok(ContinuousLearningEngine::new(
        Arc::new(InMemoryProfileStore::new()),
        encryptor,
        EngineSettings::from(config),
    ))
}

fn evaluate(profile_path: &Path, pattern_path: &Path) -> Result<()> {
    let profile: BiometricProfile = read_json(profile_path)?;
    let pattern: KeystrokePattern = read_json(pattern_path)?;
    validation::validate_pattern(&pattern)?;

    let scored = score_pattern(&profile, &pattern, None, utils::now_millis());
    let output = serde_json::json!({
        "result": scored.result,
        "metrics": scored.metrics,
        "fraudIndicators": scored.fraud,
    });
    println!("{}", serde_json::to_string_pretty(&output)?);

    Ok(())
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let contents = fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&contents).with_context(|| format!("Failed to parse {}", path.display()))
}
