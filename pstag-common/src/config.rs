//! Configuration loading and path resolution
//!
//! Settings come from an optional TOML file. Every section has compiled
//! defaults, so a missing file (or a file that only sets a few keys) still
//! yields a complete configuration.
//!
//! Resolution priority for the config file itself:
//! 1. Command-line argument
//! 2. `PSTAG_CONFIG` environment variable
//! 3. `<config_dir>/pstag/config.toml`
//!
//! Resolution priority for the label store:
//! 1. Command-line argument
//! 2. `PSTAG_DATABASE` environment variable
//! 3. TOML `database_path`
//! 4. `<data_local_dir>/pstag/tags.db`

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable naming the config file
pub const CONFIG_ENV: &str = "PSTAG_CONFIG";
/// Environment variable naming the label store
pub const DATABASE_ENV: &str = "PSTAG_DATABASE";
/// Primary environment variable for the external classifier key
pub const API_KEY_ENV: &str = "PSTAG_API_KEY";
/// Fallback environment variable for the external classifier key
pub const OPENROUTER_API_KEY_ENV: &str = "OPENROUTER_API_KEY";

/// Root of the TOML configuration file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TomlConfig {
    /// Label store location (overridden by CLI and environment)
    pub database_path: Option<PathBuf>,
    pub logging: LoggingConfig,
    pub classifier: ClassifierSection,
    pub retry: RetrySection,
    pub pipeline: PipelineSection,
    pub ratings: RatingsSection,
    pub repair: RepairSection,
    /// Frequency tier definitions; empty means the built-in tier table
    pub tiers: Vec<TierSection>,
    /// Extra main-category synonyms, e.g. `"CLOTHES" = "CHARACTER_RELATED"`
    pub aliases: BTreeMap<String, String>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is not set
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "pstag_classify=info,pstag_common=info".to_string(),
        }
    }
}

/// External classifier connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierSection {
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout_secs: u64,
    /// Confidence assigned when a response omits or garbles the value
    pub confidence_floor: f64,
    pub api_key: Option<String>,
    pub referer: Option<String>,
    pub title: Option<String>,
}

impl Default for ClassifierSection {
    fn default() -> Self {
        Self {
            base_url: "https://openrouter.ai/api/v1".to_string(),
            model: "qwen/qwen3-next-80b-a3b-thinking".to_string(),
            temperature: 0.1,
            max_tokens: 4000,
            timeout_secs: 120,
            confidence_floor: 0.5,
            api_key: None,
            referer: None,
            title: Some("pstag classifier".to_string()),
        }
    }
}

/// Retry policy for external calls
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySection {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub multiplier: f64,
    /// Upper bound of the random delay added to each backoff
    pub jitter_ms: u64,
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 1000,
            max_backoff_ms: 30_000,
            multiplier: 2.0,
            jitter_ms: 1000,
        }
    }
}

/// Orchestrator settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSection {
    /// Labels processed between checkpoints
    pub checkpoint_interval: usize,
    /// Coverage percentage the run is working towards
    pub target_coverage: f64,
    /// Per-run cost ceiling; `None` means unlimited
    pub budget_ceiling: Option<f64>,
    pub cost_per_request: f64,
    pub cost_per_label: f64,
    /// Confidence stored for rule-engine assignments
    pub rule_confidence: f64,
    /// Confidence stored for assignments taken from the origin category
    pub origin_confidence: f64,
    pub pause_on_confidence_warning: bool,
    /// Number of recent batches in the rolling success rate
    pub rolling_window: usize,
    /// Page size when scanning unclassified labels for the rule pass
    pub rule_page_size: i64,
}

impl Default for PipelineSection {
    fn default() -> Self {
        Self {
            checkpoint_interval: 300,
            target_coverage: 96.0,
            budget_ceiling: None,
            cost_per_request: 0.0001,
            cost_per_label: 0.0,
            rule_confidence: 0.90,
            origin_confidence: 1.0,
            pause_on_confidence_warning: false,
            rolling_window: 5,
            rule_page_size: 1000,
        }
    }
}

/// Qualitative rating thresholds for checkpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RatingsSection {
    pub success_excellent: f64,
    pub success_good: f64,
    pub confidence_excellent: f64,
    pub confidence_good: f64,
}

impl Default for RatingsSection {
    fn default() -> Self {
        Self {
            success_excellent: 0.95,
            success_good: 0.90,
            confidence_excellent: 0.95,
            confidence_good: 0.90,
        }
    }
}

/// Consistency repair settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RepairSection {
    pub low_confidence_floor: f64,
    /// Curated corrections applied by the low-confidence pass
    pub overrides: Vec<OverrideSection>,
}

impl Default for RepairSection {
    fn default() -> Self {
        Self {
            low_confidence_floor: 0.75,
            overrides: vec![OverrideSection {
                name: "w".to_string(),
                main_category: "ACTION_POSE".to_string(),
                sub_category: Some("EXPRESSION".to_string()),
                confidence: 0.85,
                reasoning: "Internet slang for laughter (warau), describes a laughing expression"
                    .to_string(),
            }],
        }
    }
}

/// A known-correct classification for one label
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverrideSection {
    pub name: String,
    pub main_category: String,
    pub sub_category: Option<String>,
    pub confidence: f64,
    pub reasoning: String,
}

/// One `[[tiers]]` entry
///
/// Only `name` and `min_count` are required; unset fields fall back to the
/// built-in profile with the same name (or the generic profile).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TierSection {
    pub name: String,
    pub min_count: i64,
    pub max_count: Option<i64>,
    pub batch_size: Option<usize>,
    pub min_batch_size: Option<usize>,
    pub max_batch_size: Option<usize>,
    pub small_batch: Option<usize>,
    pub medium_batch: Option<usize>,
    pub large_batch: Option<usize>,
    pub good_threshold: Option<f64>,
    pub excellent_threshold: Option<f64>,
    pub retry_count: Option<u32>,
    pub delay_ms: Option<u64>,
    pub confidence_floor: Option<f64>,
}

/// Parse a TOML file into a [`TomlConfig`]
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)?;
    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Failed to parse {}: {}", path.display(), e)))
}

/// Serialize a [`TomlConfig`] to disk, creating parent directories
pub fn write_toml_config(config: &TomlConfig, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let content = toml::to_string_pretty(config)
        .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?;
    std::fs::write(path, content)?;
    Ok(())
}

/// Platform default config file location
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("pstag").join("config.toml"))
}

/// Platform default label store location
pub fn default_database_path() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("pstag"))
        .unwrap_or_else(|| PathBuf::from("./pstag_data"))
        .join("tags.db")
}

/// Resolves config file, label store and API key from CLI, environment and TOML
#[derive(Debug, Clone, Default)]
pub struct ConfigResolver {
    cli_config: Option<PathBuf>,
    cli_database: Option<PathBuf>,
}

impl ConfigResolver {
    pub fn new(cli_config: Option<PathBuf>, cli_database: Option<PathBuf>) -> Self {
        Self {
            cli_config,
            cli_database,
        }
    }

    /// Config file path by priority; `None` only when no platform default exists
    pub fn config_path(&self) -> Option<PathBuf> {
        if let Some(path) = &self.cli_config {
            return Some(path.clone());
        }
        if let Ok(path) = std::env::var(CONFIG_ENV) {
            if !path.is_empty() {
                return Some(PathBuf::from(path));
            }
        }
        default_config_path()
    }

    /// Load the config file, falling back to compiled defaults when it is missing
    ///
    /// A file that exists but fails to parse is an error.
    pub fn load(&self) -> Result<TomlConfig> {
        let Some(path) = self.config_path() else {
            warn!("No config directory on this platform, using compiled defaults");
            return Ok(TomlConfig::default());
        };

        if !path.exists() {
            warn!(
                path = %path.display(),
                "Config file not found, using compiled defaults"
            );
            return Ok(TomlConfig::default());
        }

        let config = load_toml_config(&path)?;
        info!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    /// Label store path by priority
    pub fn database_path(&self, config: &TomlConfig) -> PathBuf {
        if let Some(path) = &self.cli_database {
            return path.clone();
        }
        if let Ok(path) = std::env::var(DATABASE_ENV) {
            if !path.is_empty() {
                return PathBuf::from(path);
            }
        }
        if let Some(path) = &config.database_path {
            return path.clone();
        }
        default_database_path()
    }

    /// External classifier key by priority: `PSTAG_API_KEY`, `OPENROUTER_API_KEY`, TOML
    pub fn api_key(&self, config: &TomlConfig) -> Option<String> {
        [API_KEY_ENV, OPENROUTER_API_KEY_ENV]
            .iter()
            .filter_map(|name| std::env::var(name).ok())
            .find(|key| !key.trim().is_empty())
            .or_else(|| {
                config
                    .classifier
                    .api_key
                    .clone()
                    .filter(|key| !key.trim().is_empty())
            })
    }
}
