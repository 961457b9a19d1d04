//! Configuration loading, validation, and management for Lorekeeper.
//!
//! Loads configuration from `~/.lorekeeper/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.lorekeeper/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Model identifier passed to the token estimator
    #[serde(default = "default_model")]
    pub default_model: String,

    /// Activation engine limits
    #[serde(default)]
    pub activation: ActivationConfig,

    /// Context builder budgets and rendering
    #[serde(default)]
    pub context: ContextConfig,

    /// Storage backend
    #[serde(default)]
    pub store: StoreConfig,

    /// Extra prompt templates, by name
    #[serde(default)]
    pub templates: HashMap<String, String>,
}

fn default_model() -> String {
    "gpt-4o".into()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivationConfig {
    #[serde(default = "default_max_activated_entries")]
    pub max_activated_entries: usize,

    #[serde(default = "default_max_total_tokens")]
    pub max_total_tokens: usize,

    #[serde(default = "default_max_recursion_depth")]
    pub max_recursion_depth: u32,

    #[serde(default = "default_true")]
    pub use_regex: bool,

    /// Minimum similarity for vector-type entries
    #[serde(default = "default_vector_threshold")]
    pub vector_threshold: f32,
}

fn default_max_activated_entries() -> usize {
    25
}
fn default_max_total_tokens() -> usize {
    2048
}
fn default_max_recursion_depth() -> u32 {
    3
}
fn default_vector_threshold() -> f32 {
    0.75
}
fn default_true() -> bool {
    true
}

impl Default for ActivationConfig {
    fn default() -> Self {
        Self {
            max_activated_entries: default_max_activated_entries(),
            max_total_tokens: default_max_total_tokens(),
            max_recursion_depth: default_max_recursion_depth(),
            use_regex: true,
            vector_threshold: default_vector_threshold(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextConfig {
    #[serde(default = "default_max_context_tokens")]
    pub max_context_tokens: usize,

    /// Tokens held back for the model's reply
    #[serde(default = "default_reserve_tokens")]
    pub reserve_tokens: usize,

    #[serde(default = "default_template")]
    pub template: String,

    #[serde(default)]
    pub enable_summary: bool,

    #[serde(default = "default_summary_timeout_secs")]
    pub summary_timeout_secs: u64,

    /// Substituted for `{{user}}`
    #[serde(default = "default_user_name")]
    pub user_name: String,

    #[serde(default = "default_separator")]
    pub separator: String,

    #[serde(default = "default_chat_start")]
    pub chat_start: String,
}

fn default_max_context_tokens() -> usize {
    4096
}
fn default_reserve_tokens() -> usize {
    512
}
fn default_template() -> String {
    "default".into()
}
fn default_summary_timeout_secs() -> u64 {
    10
}
fn default_user_name() -> String {
    "User".into()
}
fn default_separator() -> String {
    "\n\n".into()
}
fn default_chat_start() -> String {
    "[Start a new chat]".into()
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            max_context_tokens: default_max_context_tokens(),
            reserve_tokens: default_reserve_tokens(),
            template: default_template(),
            enable_summary: false,
            summary_timeout_secs: default_summary_timeout_secs(),
            user_name: default_user_name(),
            separator: default_separator(),
            chat_start: default_chat_start(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// "sqlite" or "memory"
    #[serde(default = "default_store_backend")]
    pub backend: String,

    /// SQLite database file; defaults to `~/.lorekeeper/lorekeeper.sqlite`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

fn default_store_backend() -> String {
    "sqlite".into()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: default_store_backend(),
            path: None,
        }
    }
}

impl StoreConfig {
    /// Resolved database path.
    pub fn database_path(&self) -> PathBuf {
        self.path
            .clone()
            .unwrap_or_else(|| AppConfig::config_dir().join("lorekeeper.sqlite"))
    }
}

impl AppConfig {
    /// Load configuration from the default location with env overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply `LOREKEEPER_*` overrides from a variable lookup.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(model) = lookup("LOREKEEPER_MODEL") {
            self.default_model = model;
        }

        if let Some(raw) = lookup("LOREKEEPER_MAX_CONTEXT_TOKENS") {
            match raw.parse() {
                Ok(tokens) => self.context.max_context_tokens = tokens,
                Err(_) => tracing::warn!(
                    "Ignoring LOREKEEPER_MAX_CONTEXT_TOKENS={raw}: not a token count"
                ),
            }
        }

        if let Some(path) = lookup("LOREKEEPER_DB") {
            self.store.path = Some(PathBuf::from(path));
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".lorekeeper")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.context.reserve_tokens >= self.context.max_context_tokens {
            return Err(ConfigError::ValidationError(
                "context.reserve_tokens must be smaller than context.max_context_tokens".into(),
            ));
        }

        if !(0.0..=1.0).contains(&self.activation.vector_threshold) {
            return Err(ConfigError::ValidationError(
                "activation.vector_threshold must be between 0.0 and 1.0".into(),
            ));
        }

        if !matches!(self.store.backend.as_str(), "sqlite" | "memory") {
            return Err(ConfigError::ValidationError(format!(
                "store.backend must be \"sqlite\" or \"memory\", got \"{}\"",
                self.store.backend
            )));
        }

        Ok(())
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            default_model: default_model(),
            activation: ActivationConfig::default(),
            context: ContextConfig::default(),
            store: StoreConfig::default(),
            templates: HashMap::new(),
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
