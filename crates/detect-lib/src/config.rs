//! Configuration management for the detection service
//!
//! Sources are layered lowest to highest: built-in defaults, the optional
//! `config/<environment>.toml` file, then `INSIDER_DETECT_*` environment
//! variables (`__` separates nested keys, e.g. `INSIDER_DETECT_MODEL__THRESHOLD`).

use crate::error::{DetectError, Result};
use anyhow::Context;
use config::{Config, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Allowed deviation of the ensemble weight sum from 1.0
pub const WEIGHT_SUM_TOLERANCE: f64 = 0.01;

const ENV_PREFIX: &str = "INSIDER_DETECT";

/// Deployment environment, selects the config file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Staging,
    Production,
    Testing,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Staging => "staging",
            Environment::Production => "production",
            Environment::Testing => "testing",
        }
    }

    /// Read `ENVIRONMENT`, defaulting to development
    pub fn from_env() -> Self {
        std::env::var("ENVIRONMENT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or_default()
    }
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Environment::Development),
            "staging" => Ok(Environment::Staging),
            "production" | "prod" => Ok(Environment::Production),
            "testing" | "test" => Ok(Environment::Testing),
            other => Err(format!("unknown environment '{}'", other)),
        }
    }
}

/// Main application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub environment: Environment,
    #[serde(default = "default_app_name")]
    pub app_name: String,
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub monitoring: MonitoringConfig,
}

fn default_app_name() -> String {
    "Insider Threat Detection".to_string()
}

fn default_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

/// HTTP API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Model serving configuration consumed by the engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Directory holding the persisted artifacts
    #[serde(default = "default_model_dir")]
    pub model_dir: PathBuf,
    /// Weight of the tree model in the hybrid score
    #[serde(default = "default_xgb_weight")]
    pub xgb_weight: f64,
    /// Weight of the sequence model in the hybrid score
    #[serde(default = "default_lstm_weight")]
    pub lstm_weight: f64,
    /// Decision threshold, strict greater-than
    #[serde(default = "default_threshold")]
    pub threshold: f64,
    /// Reported through health only; caching lives outside the engine
    #[serde(default = "default_cache_enabled")]
    pub cache_enabled: bool,
    /// Cache TTL in seconds
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl: u64,
    /// Bound on concurrent blocking model calls
    #[serde(default = "default_inference_workers")]
    pub inference_workers: usize,
}

fn default_model_dir() -> PathBuf {
    PathBuf::from("models/artifacts")
}

fn default_xgb_weight() -> f64 {
    0.6
}

fn default_lstm_weight() -> f64 {
    0.4
}

fn default_threshold() -> f64 {
    0.5
}

fn default_cache_enabled() -> bool {
    true
}

fn default_cache_ttl() -> u64 {
    300
}

fn default_inference_workers() -> usize {
    4
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            model_dir: default_model_dir(),
            xgb_weight: default_xgb_weight(),
            lstm_weight: default_lstm_weight(),
            threshold: default_threshold(),
            cache_enabled: default_cache_enabled(),
            cache_ttl: default_cache_ttl(),
            inference_workers: default_inference_workers(),
        }
    }
}

impl ModelConfig {
    /// Validated ensemble weights
    pub fn ensemble_weights(&self) -> Result<EnsembleWeights> {
        EnsembleWeights::new(self.xgb_weight, self.lstm_weight)
    }

    /// Check every value the engine relies on
    pub fn validate(&self) -> Result<()> {
        self.ensemble_weights()?;
        if !(0.0..=1.0).contains(&self.threshold) {
            return Err(DetectError::Configuration(format!(
                "threshold must be within [0, 1], got {}",
                self.threshold
            )));
        }
        if self.cache_ttl < 1 {
            return Err(DetectError::Configuration(
                "cache_ttl must be at least 1 second".to_string(),
            ));
        }
        if self.inference_workers < 1 {
            return Err(DetectError::Configuration(
                "inference_workers must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Logging and metrics configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoringConfig {
    /// Log level directive (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Log format (json, pretty)
    #[serde(default = "default_log_format")]
    pub log_format: String,
    #[serde(default = "default_enable_metrics")]
    pub enable_metrics: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

fn default_enable_metrics() -> bool {
    true
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
            enable_metrics: default_enable_metrics(),
        }
    }
}

/// Tree/sequence weight pair for the hybrid score
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EnsembleWeights {
    tree: f64,
    sequence: f64,
}

impl EnsembleWeights {
    /// Validate and build a weight pair
    ///
    /// Each weight must lie in [0, 1] and the pair must sum to 1.0 within
    /// [`WEIGHT_SUM_TOLERANCE`].
    pub fn new(tree: f64, sequence: f64) -> Result<Self> {
        for (name, w) in [("xgb_weight", tree), ("lstm_weight", sequence)] {
            if !w.is_finite() || !(0.0..=1.0).contains(&w) {
                return Err(DetectError::Configuration(format!(
                    "{} must be within [0, 1], got {}",
                    name, w
                )));
            }
        }
        let total = tree + sequence;
        if (total - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(DetectError::Configuration(format!(
                "Model weights must sum to 1.0, got {}",
                total
            )));
        }
        Ok(Self { tree, sequence })
    }

    pub fn tree(&self) -> f64 {
        self.tree
    }

    pub fn sequence(&self) -> f64 {
        self.sequence
    }
}

impl Default for EnsembleWeights {
    fn default() -> Self {
        Self {
            tree: default_xgb_weight(),
            sequence: default_lstm_weight(),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            environment: Environment::default(),
            app_name: default_app_name(),
            version: default_version(),
            api: ApiConfig::default(),
            model: ModelConfig::default(),
            monitoring: MonitoringConfig::default(),
        }
    }
}

impl Settings {
    /// Load settings for the environment named by `ENVIRONMENT` from `config/`
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from("config", Environment::from_env())
    }

    /// Load settings from `<config_dir>/<environment>.toml` plus env overrides
    pub fn load_from<P: AsRef<Path>>(config_dir: P, environment: Environment) -> anyhow::Result<Self> {
        let file = config_dir
            .as_ref()
            .join(format!("{}.toml", environment.as_str()));

        let defaults = Settings {
            environment,
            ..Settings::default()
        };

        let config = Config::builder()
            .add_source(Config::try_from(&defaults).context("Failed to encode default settings")?)
            .add_source(File::from(file.as_path()).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to build configuration")?;

        let settings: Settings = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        settings.model.validate()?;
        Ok(settings)
    }

    /// Human-readable configuration issues, empty when valid
    pub fn validate(&self) -> Vec<String> {
        let mut issues = Vec::new();
        if let Err(e) = self.model.validate() {
            issues.push(e.to_string());
        }
        if !self.model.model_dir.exists() {
            issues.push(format!(
                "Model directory does not exist: {}",
                self.model.model_dir.display()
            ));
        }
        if !matches!(self.monitoring.log_format.as_str(), "json" | "pretty") {
            issues.push(format!(
                "Unsupported log format '{}', expected json or pretty",
                self.monitoring.log_format
            ));
        }
        issues
    }
}
