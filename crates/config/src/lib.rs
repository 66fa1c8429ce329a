//! Configuration loading, validation, and management for TripForge.
//!
//! Loads configuration from `~/.tripforge/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.tripforge/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key for the default provider (can be overridden per-provider)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Default LLM provider
    #[serde(default = "default_provider")]
    pub default_provider: String,

    /// Default model
    #[serde(default = "default_model")]
    pub default_model: String,

    /// Default temperature
    #[serde(default = "default_temperature")]
    pub default_temperature: f32,

    /// Max tokens per LLM response (unset = provider default)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_max_tokens: Option<u32>,

    /// Provider-specific configurations
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,

    /// Web search configuration
    #[serde(default)]
    pub search: SearchConfig,

    /// Orchestration ceilings and prompt settings
    #[serde(default)]
    pub planner: PlannerConfig,

    /// Gateway configuration
    #[serde(default)]
    pub gateway: GatewayConfig,
}

fn default_provider() -> String {
    "gemini".into()
}
fn default_model() -> String {
    "gemini-2.5-flash-lite".into()
}
fn default_temperature() -> f32 {
    0.7
}

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
            .field("providers", &self.providers)
            .field("search", &self.search)
            .field("planner", &self.planner)
            .field("gateway", &self.gateway)
            .finish()
    }
}

#[derive(Clone, Default, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_model: Option<String>,
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

/// Google Custom Search settings.
#[derive(Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Programmable Search Engine ID
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cx: Option<String>,

    #[serde(default = "default_search_base_url")]
    pub base_url: String,

    /// Results kept per query (1..=10)
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    #[serde(default = "default_title_max_chars")]
    pub title_max_chars: usize,

    #[serde(default = "default_snippet_max_chars")]
    pub snippet_max_chars: usize,

    #[serde(default = "default_search_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_search_base_url() -> String {
    "https://www.googleapis.com/customsearch/v1".into()
}
fn default_top_k() -> usize {
    5
}
fn default_title_max_chars() -> usize {
    80
}
fn default_snippet_max_chars() -> usize {
    200
}
fn default_search_timeout_secs() -> u64 {
    15
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            cx: None,
            base_url: default_search_base_url(),
            top_k: default_top_k(),
            title_max_chars: default_title_max_chars(),
            snippet_max_chars: default_snippet_max_chars(),
            timeout_secs: default_search_timeout_secs(),
        }
    }
}

impl std::fmt::Debug for SearchConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchConfig")
            .field("api_key", &redact(&self.api_key))
            .field("cx", &self.cx)
            .field("base_url", &self.base_url)
            .field("top_k", &self.top_k)
            .field("title_max_chars", &self.title_max_chars)
            .field("snippet_max_chars", &self.snippet_max_chars)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannerConfig {
    /// Search rounds allowed before falling back
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,

    /// Ceiling on concatenated turn text, in characters
    #[serde(default = "default_max_context_chars")]
    pub max_context_chars: usize,

    /// Pause between a search result and the next model call
    #[serde(default = "default_round_delay_ms")]
    pub round_delay_ms: u64,

    /// Wall-clock budget for a whole planning request
    #[serde(default = "default_deadline_secs")]
    pub deadline_secs: u64,

    /// Fall back instead of failing when the very first model call fails
    #[serde(default)]
    pub fallback_on_first_call_failure: bool,

    /// Replace the built-in system instructions with this file's contents
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt_path: Option<String>,
}

fn default_max_iterations() -> u32 {
    3
}
fn default_max_context_chars() -> usize {
    20_000
}
fn default_round_delay_ms() -> u64 {
    1_000
}
fn default_deadline_secs() -> u64 {
    180
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            max_context_chars: default_max_context_chars(),
            round_delay_ms: default_round_delay_ms(),
            deadline_secs: default_deadline_secs(),
            fallback_on_first_call_failure: false,
            system_prompt_path: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_host")]
    pub host: String,
}

fn default_port() -> u16 {
    9000
}
fn default_host() -> String {
    "127.0.0.1".into()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.tripforge/config.toml).
    ///
    /// Environment overrides, highest priority first:
    /// - `TRIPFORGE_API_KEY`, `GEMINI_API_KEY`, `API_KEY` (only if no key in file)
    /// - `TRIPFORGE_PROVIDER`
    /// - `TRIPFORGE_MODEL`, `MODEL_NAME`
    /// - `GOOGLE_SEARCH_KEY`, `GOOGLE_SEARCH_CX`
    /// - `HTTP_PORT`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env(|key| std::env::var(key).ok())?;
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

    /// Apply environment overrides through a lookup function.
    fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        if self.api_key.is_none() {
            self.api_key = var("TRIPFORGE_API_KEY")
                .or_else(|| var("GEMINI_API_KEY"))
                .or_else(|| var("API_KEY"));
        }

        if let Some(provider) = var("TRIPFORGE_PROVIDER") {
            self.default_provider = provider;
        }

        if let Some(model) = var("TRIPFORGE_MODEL").or_else(|| var("MODEL_NAME")) {
            self.default_model = model;
        }

        if let Some(key) = var("GOOGLE_SEARCH_KEY") {
            self.search.api_key = Some(key);
        }
        if let Some(cx) = var("GOOGLE_SEARCH_CX") {
            self.search.cx = Some(cx);
        }

        if let Some(port) = var("HTTP_PORT") {
            self.gateway.port = port.parse().map_err(|_| {
                ConfigError::ValidationError(format!("HTTP_PORT is not a valid port: {port}"))
            })?;
        }

        Ok(())
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".tripforge")
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.default_temperature) {
            return Err(ConfigError::ValidationError(
                "default_temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if !(1..=10).contains(&self.search.top_k) {
            return Err(ConfigError::ValidationError(
                "search.top_k must be between 1 and 10".into(),
            ));
        }

        if self.planner.max_iterations == 0 {
            return Err(ConfigError::ValidationError(
                "planner.max_iterations must be > 0".into(),
            ));
        }

        if self.planner.max_context_chars == 0 || self.planner.deadline_secs == 0 {
            return Err(ConfigError::ValidationError(
                "planner.max_context_chars and planner.deadline_secs must be > 0".into(),
            ));
        }

        Ok(())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// Whether both Custom Search credentials are present.
    pub fn has_search_credentials(&self) -> bool {
        self.search.api_key.is_some() && self.search.cx.is_some()
    }

    /// Generate a default config TOML string (for `config init`).
    pub fn default_toml() -> String {
        toml::to_string_pretty(&Self::default()).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            default_provider: default_provider(),
            default_model: default_model(),
            default_temperature: default_temperature(),
            default_max_tokens: None,
            providers: HashMap::new(),
            search: SearchConfig::default(),
            planner: PlannerConfig::default(),
            gateway: GatewayConfig::default(),
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

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert_eq!(config.default_provider, "gemini");
        assert_eq!(config.gateway.port, 9000);
        assert_eq!(config.planner.max_iterations, 3);
        assert_eq!(config.planner.max_context_chars, 20_000);
        assert_eq!(config.search.top_k, 5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn config_roundtrip_toml() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.default_provider, config.default_provider);
        assert_eq!(parsed.planner.deadline_secs, config.planner.deadline_secs);
    }

    #[test]
    fn invalid_temperature_rejected() {
        let config = AppConfig {
            default_temperature: 5.0,
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_iterations_rejected() {
        let mut config = AppConfig::default();
        config.planner.max_iterations = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn top_k_out_of_range_rejected() {
        let mut config = AppConfig::default();
        config.search.top_k = 25;
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_config_file_returns_defaults() {
        let config = AppConfig::load_from(Path::new("/nonexistent/config.toml")).unwrap();
        assert_eq!(config.default_provider, "gemini");
    }

    #[test]
    fn planner_section_parsing() {
        let toml_str = r#"
default_model = "gemini-2.5-flash"

[planner]
max_iterations = 5
round_delay_ms = 2000
fallback_on_first_call_failure = true

[search]
cx = "engine-1"
top_k = 3
"#;
        let config: AppConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.default_model, "gemini-2.5-flash");
        assert_eq!(config.planner.max_iterations, 5);
        assert_eq!(config.planner.round_delay_ms, 2000);
        assert_eq!(config.planner.max_context_chars, 20_000);
        assert!(config.planner.fallback_on_first_call_failure);
        assert_eq!(config.search.cx.as_deref(), Some("engine-1"));
        assert_eq!(config.search.top_k, 3);
        assert_eq!(config.search.snippet_max_chars, 200);
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "[gateway]\nport = 8088").unwrap();

        let config = AppConfig::load_from(&path).unwrap();
        assert_eq!(config.gateway.port, 8088);
    }

    #[test]
    fn malformed_file_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "planner = [not toml").unwrap();

        let err = AppConfig::load_from(&path).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
    }

    #[test]
    fn env_overrides_apply() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("GEMINI_API_KEY", "g-key"),
            ("MODEL_NAME", "gemini-2.5-pro"),
            ("GOOGLE_SEARCH_KEY", "s-key"),
            ("GOOGLE_SEARCH_CX", "cx-1"),
            ("HTTP_PORT", "9100"),
        ]);
        let mut config = AppConfig::default();
        config
            .apply_env(|k| env.get(k).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.api_key.as_deref(), Some("g-key"));
        assert_eq!(config.default_model, "gemini-2.5-pro");
        assert!(config.has_search_credentials());
        assert_eq!(config.gateway.port, 9100);
    }

    #[test]
    fn file_api_key_wins_over_env() {
        let mut config = AppConfig {
            api_key: Some("from-file".into()),
            ..AppConfig::default()
        };
        config
            .apply_env(|k| (k == "API_KEY").then(|| "from-env".to_string()))
            .unwrap();
        assert_eq!(config.api_key.as_deref(), Some("from-file"));
    }

    #[test]
    fn bad_http_port_rejected() {
        let mut config = AppConfig::default();
        let result = config.apply_env(|k| (k == "HTTP_PORT").then(|| "ninety".to_string()));
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn debug_output_redacts_secrets() {
        let mut config = AppConfig {
            api_key: Some("super-secret".into()),
            ..AppConfig::default()
        };
        config.search.api_key = Some("search-secret".into());
        let debug = format!("{config:?}");
        assert!(!debug.contains("super-secret"));
        assert!(!debug.contains("search-secret"));
        assert!(debug.contains("[REDACTED]"));
    }
}
