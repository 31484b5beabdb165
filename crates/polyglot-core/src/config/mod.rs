//! TOML configuration.


use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::PolyglotError;

/// Top-level Polyglot configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub polyglot: PolyglotConfig,
    #[serde(default)]
    pub memory: MemoryConfig,
    #[serde(default)]
    pub matcher: MatcherConfig,
    #[serde(default)]
    pub learning: LearningConfig,
    #[serde(default)]
    pub correction: CorrectionConfig,
    #[serde(default)]
    pub translator: TranslatorConfig,
}

/// General settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolyglotConfig {
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for PolyglotConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            data_dir: default_data_dir(),
            log_level: default_log_level(),
        }
    }
}

/// File locations. Relative paths resolve under `data_dir`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    #[serde(default = "default_store_path")]
    pub store_path: String,
    #[serde(default = "default_usage_log_path")]
    pub usage_log_path: String,
    #[serde(default = "default_links_path")]
    pub links_path: String,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            store_path: default_store_path(),
            usage_log_path: default_usage_log_path(),
            links_path: default_links_path(),
        }
    }
}

/// Similarity thresholds. Two independent knobs, not one shared constant.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MatcherConfig {
    /// Phrase lookup cutoff (inclusive).
    #[serde(default = "default_fuzzy_cutoff")]
    pub fuzzy_cutoff: f64,
    /// Whole-message resolution cutoff (exclusive).
    #[serde(default = "default_resolve_cutoff")]
    pub resolve_cutoff: f64,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            fuzzy_cutoff: default_fuzzy_cutoff(),
            resolve_cutoff: default_resolve_cutoff(),
        }
    }
}

/// Online learning loop.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LearningConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_learning_interval")]
    pub interval_secs: u64,
    /// Number of distinct recent timestamps kept for co-occurrence.
    #[serde(default = "default_context_window")]
    pub context_window: usize,
    #[serde(default = "default_initial_confidence")]
    pub initial_confidence: f64,
    #[serde(default = "default_learning_step")]
    pub confidence_step: f64,
    #[serde(default = "default_learning_step")]
    pub distance_step: f64,
}

impl Default for LearningConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: default_learning_interval(),
            context_window: default_context_window(),
            initial_confidence: default_initial_confidence(),
            confidence_step: default_learning_step(),
            distance_step: default_learning_step(),
        }
    }
}

/// Human correction feedback.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CorrectionConfig {
    #[serde(default = "default_correction_step")]
    pub confidence_step: f64,
}

impl Default for CorrectionConfig {
    fn default() -> Self {
        Self {
            confidence_step: default_correction_step(),
        }
    }
}

/// External translator backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranslatorConfig {
    #[serde(default = "default_backend")]
    pub backend: String,
    /// Empty = read `GOOGLE_TRANSLATE_API_KEY` from the environment.
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_translate_url")]
    pub base_url: String,
    /// Per-call timeout in seconds.
    #[serde(default = "default_translate_timeout")]
    pub timeout_secs: u64,
}

impl Default for TranslatorConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            api_key: String::new(),
            base_url: default_translate_url(),
            timeout_secs: default_translate_timeout(),
        }
    }
}

impl TranslatorConfig {
    /// Configured key, or the `GOOGLE_TRANSLATE_API_KEY` environment variable.
    pub fn resolved_api_key(&self) -> Option<String> {
        if !self.api_key.trim().is_empty() {
            return Some(self.api_key.clone());
        }
        std::env::var("GOOGLE_TRANSLATE_API_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty())
    }
}

impl Config {
    /// Absolute path of a configured file, resolved against `data_dir`.
    pub fn resolve_path(&self, path: &str) -> PathBuf {
        let expanded = PathBuf::from(shellexpand(path));
        if expanded.is_absolute() {
            expanded
        } else {
            PathBuf::from(shellexpand(&self.polyglot.data_dir)).join(expanded)
        }
    }

    pub fn store_path(&self) -> PathBuf {
        self.resolve_path(&self.memory.store_path)
    }

    pub fn usage_log_path(&self) -> PathBuf {
        self.resolve_path(&self.memory.usage_log_path)
    }

    pub fn links_path(&self) -> PathBuf {
        self.resolve_path(&self.memory.links_path)
    }

    /// Reject values the engine cannot work with.
    pub fn validate(&self) -> Result<(), PolyglotError> {
        for (name, v) in [
            ("matcher.fuzzy_cutoff", self.matcher.fuzzy_cutoff),
            ("matcher.resolve_cutoff", self.matcher.resolve_cutoff),
            ("learning.initial_confidence", self.learning.initial_confidence),
        ] {
            if !(0.0..=1.0).contains(&v) {
                return Err(PolyglotError::Config(format!(
                    "{name} must be within [0, 1], got {v}"
                )));
            }
        }
        for (name, v) in [
            ("learning.confidence_step", self.learning.confidence_step),
            ("learning.distance_step", self.learning.distance_step),
            ("correction.confidence_step", self.correction.confidence_step),
        ] {
            if !v.is_finite() || v < 0.0 {
                return Err(PolyglotError::Config(format!(
                    "{name} must be a non-negative number, got {v}"
                )));
            }
        }
        if self.learning.interval_secs == 0 {
            return Err(PolyglotError::Config(
                "learning.interval_secs must be greater than 0".into(),
            ));
        }
        if self.learning.context_window == 0 {
            return Err(PolyglotError::Config(
                "learning.context_window must be greater than 0".into(),
            ));
        }
        if self.translator.timeout_secs == 0 {
            return Err(PolyglotError::Config(
                "translator.timeout_secs must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}

// --- Default value functions ---

fn default_name() -> String {
    "Polyglot".to_string()
}
fn default_data_dir() -> String {
    "~/.polyglot".to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_store_path() -> String {
    "translate.json".to_string()
}
fn default_usage_log_path() -> String {
    "usage_log.jsonl".to_string()
}
fn default_links_path() -> String {
    "channel_links.json".to_string()
}
fn default_fuzzy_cutoff() -> f64 {
    0.8
}
fn default_resolve_cutoff() -> f64 {
    0.9
}
fn default_true() -> bool {
    true
}
fn default_learning_interval() -> u64 {
    30
}
fn default_context_window() -> usize {
    20
}
fn default_initial_confidence() -> f64 {
    crate::entry::DEFAULT_CONFIDENCE
}
fn default_learning_step() -> f64 {
    0.05
}
fn default_correction_step() -> f64 {
    0.1
}
fn default_backend() -> String {
    "google".to_string()
}
fn default_translate_url() -> String {
    "https://translation.googleapis.com/language/translate/v2".to_string()
}
fn default_translate_timeout() -> u64 {
    10
}

/// Expand `~` to home directory.
pub fn shellexpand(path: &str) -> String {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = std::env::var_os("HOME") {
            return format!("{}/{rest}", home.to_string_lossy());
        }
    }
    path.to_string()
}

/// Load configuration from a TOML file.
///
/// Falls back to defaults if the file does not exist.
pub fn load(path: &str) -> Result<Config, PolyglotError> {
    let path = Path::new(path);
    if !path.exists() {
        tracing::info!(
            "Config file not found at {}, using defaults",
            path.display()
        );
        return Ok(Config::default());
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| PolyglotError::Config(format!("failed to read {}: {}", path.display(), e)))?;

    let config: Config = toml::from_str(&content)
        .map_err(|e| PolyglotError::Config(format!("failed to parse config: {}", e)))?;

    config.validate()?;
    Ok(config)
}
