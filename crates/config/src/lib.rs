//! Configuration loading, validation, and management for naturalmaps.
//!
//! Loads configuration from `~/.naturalmaps/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use naturalmaps_core::ProtocolMarkers;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.naturalmaps/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key (can be overridden per-provider)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Default LLM provider
    #[serde(default = "default_provider")]
    pub default_provider: String,

    /// Default model
    #[serde(default = "default_model")]
    pub default_model: String,

    /// Default sampling temperature
    #[serde(default = "default_temperature")]
    pub default_temperature: f32,

    /// Default max tokens per LLM response
    #[serde(default = "default_max_tokens")]
    pub default_max_tokens: u32,

    /// Agent loop settings
    #[serde(default)]
    pub agent: AgentSettings,

    /// In-band protocol markers
    #[serde(default)]
    pub markers: ProtocolMarkers,

    /// Where run snapshots are written
    #[serde(default)]
    pub run_log: RunLogConfig,

    /// Overpass API settings
    #[serde(default)]
    pub overpass: OverpassConfig,

    /// Nominatim geocoder settings
    #[serde(default)]
    pub nominatim: NominatimConfig,

    /// Provider-specific configurations
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,
}

fn default_provider() -> String {
    "openai".into()
}
fn default_model() -> String {
    "gpt-3.5-turbo-0613".into()
}
fn default_temperature() -> f32 {
    0.1
}
fn default_max_tokens() -> u32 {
    1024
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &redact(&self.api_key))
            .field("default_provider", &self.default_provider)
            .field("default_model", &self.default_model)
            .field("default_temperature", &self.default_temperature)
            .field("default_max_tokens", &self.default_max_tokens)
            .field("agent", &self.agent)
            .field("markers", &self.markers)
            .field("run_log", &self.run_log)
            .field("overpass", &self.overpass)
            .field("nominatim", &self.nominatim)
            .field("providers", &self.providers)
            .finish()
    }
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .field("default_model", &self.default_model)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSettings {
    /// Iteration budget per question
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,

    /// Candidate completions requested per iteration
    #[serde(default = "default_candidates")]
    pub candidates: u32,

    /// Also write a snapshot after every iteration, not only at exit
    #[serde(default)]
    pub checkpoint_every_iteration: bool,
}

fn default_max_iterations() -> u32 {
    4
}
fn default_candidates() -> u32 {
    1
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            candidates: default_candidates(),
            checkpoint_every_iteration: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunLogConfig {
    /// Directory holding the log file. Defaults to `~/naturalmaps_logs`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,

    #[serde(default = "default_run_log_file")]
    pub file_name: String,
}

fn default_run_log_file() -> String {
    "runs.json".into()
}

impl RunLogConfig {
    /// Full path of the run log file.
    pub fn path(&self) -> PathBuf {
        self.dir
            .clone()
            .unwrap_or_else(|| dirs_home().join("naturalmaps_logs"))
            .join(&self.file_name)
    }
}

impl Default for RunLogConfig {
    fn default() -> Self {
        Self {
            dir: None,
            file_name: default_run_log_file(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OverpassConfig {
    #[serde(default = "default_overpass_endpoint")]
    pub endpoint: String,

    #[serde(default = "default_overpass_timeout")]
    pub timeout_secs: u64,

    /// Results serializing to more characters than this are replaced with
    /// a notice before reaching the model
    #[serde(default = "default_max_result_chars")]
    pub max_result_chars: usize,
}

fn default_overpass_endpoint() -> String {
    "https://overpass-api.de/api/interpreter".into()
}
fn default_overpass_timeout() -> u64 {
    60
}
fn default_max_result_chars() -> usize {
    4096
}

impl Default for OverpassConfig {
    fn default() -> Self {
        Self {
            endpoint: default_overpass_endpoint(),
            timeout_secs: default_overpass_timeout(),
            max_result_chars: default_max_result_chars(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NominatimConfig {
    #[serde(default = "default_nominatim_endpoint")]
    pub endpoint: String,

    /// Nominatim's usage policy requires an identifying user agent
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_nominatim_endpoint() -> String {
    "https://nominatim.openstreetmap.org/search".into()
}
fn default_user_agent() -> String {
    concat!("naturalmaps/", env!("CARGO_PKG_VERSION")).into()
}

impl Default for NominatimConfig {
    fn default() -> Self {
        Self {
            endpoint: default_nominatim_endpoint(),
            user_agent: default_user_agent(),
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_model: Option<String>,
}

impl AppConfig {
    /// Load configuration from the default path (~/.naturalmaps/config.toml).
    ///
    /// Also checks environment variables for API keys:
    /// - `NATURALMAPS_API_KEY` (highest priority)
    /// - `OPENAI_API_KEY`
    /// - `OPENROUTER_API_KEY`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;

        // Environment variable overrides (highest priority)
        if config.api_key.is_none() {
            config.api_key = std::env::var("NATURALMAPS_API_KEY")
                .ok()
                .or_else(|| std::env::var("OPENAI_API_KEY").ok())
                .or_else(|| std::env::var("OPENROUTER_API_KEY").ok());
        }

        if let Ok(provider) = std::env::var("NATURALMAPS_PROVIDER") {
            config.default_provider = provider;
        }

        if let Ok(model) = std::env::var("NATURALMAPS_MODEL") {
            config.default_model = model;
        }

        if let Ok(dir) = std::env::var("NATURALMAPS_LOG_DIR") {
            config.run_log.dir = Some(PathBuf::from(dir));
        }

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

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".naturalmaps")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.default_temperature < 0.0 || self.default_temperature > 2.0 {
            return Err(ConfigError::ValidationError(
                "default_temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.agent.candidates == 0 {
            return Err(ConfigError::ValidationError(
                "agent.candidates must be at least 1".into(),
            ));
        }

        if self.overpass.max_result_chars == 0 {
            return Err(ConfigError::ValidationError(
                "overpass.max_result_chars must be > 0".into(),
            ));
        }

        if self.markers.has_empty_marker() {
            return Err(ConfigError::ValidationError(
                "markers must not be empty".into(),
            ));
        }

        Ok(())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// Generate a default config TOML string (for `onboard` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            default_provider: default_provider(),
            default_model: default_model(),
            default_temperature: default_temperature(),
            default_max_tokens: default_max_tokens(),
            agent: AgentSettings::default(),
            markers: ProtocolMarkers::default(),
            run_log: RunLogConfig::default(),
            overpass: OverpassConfig::default(),
            nominatim: NominatimConfig::default(),
            providers: HashMap::new(),
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
