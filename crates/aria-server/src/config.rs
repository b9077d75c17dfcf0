//! Gateway configuration loading from file and environment variables.

use aria_db::DbRuntimeSettings;
use aria_voice::ProviderConfig;
use serde::Deserialize;
use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;
use thiserror::Error;

/// Top-level gateway configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub history: HistoryConfig,

    /// Speech and language provider credentials.
    #[serde(default)]
    pub providers: ProviderConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Network configuration for the HTTP server.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to.
    #[serde(default = "default_host")]
    pub host: IpAddr,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// The single browser origin allowed by CORS.
    #[serde(default = "default_cors_allowed_origin")]
    pub cors_allowed_origin: String,
}

/// Conversation history store settings.
#[derive(Debug, Clone, Deserialize)]
pub struct HistoryConfig {
    /// Path to the SQLite database file, or `:memory:`.
    #[serde(default = "default_history_path")]
    pub path: String,

    /// Sliding expiry of each user's log, in seconds.
    #[serde(default = "default_history_ttl_seconds")]
    pub ttl_seconds: u64,

    /// Entries loaded into a session when its context is set.
    #[serde(default = "default_history_window")]
    pub window: usize,

    /// How often expired logs are purged. Zero disables pruning.
    #[serde(default = "default_prune_interval_seconds")]
    pub prune_interval_seconds: u64,

    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,

    #[serde(default = "default_pool_max_size")]
    pub pool_max_size: u32,

    /// Entries kept per user log; older ones are trimmed on write. Must be
    /// at least `window`.
    #[serde(default = "default_history_max_entries")]
    pub max_entries: usize,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "aria_server=debug,info").
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether to output logs in JSON format.
    #[serde(default)]
    pub json: bool,
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1))
}

fn default_port() -> u16 {
    8000
}

fn default_cors_allowed_origin() -> String {
    "http://localhost:3004".to_string()
}

fn default_history_path() -> String {
    "aria.db".to_string()
}

fn default_history_ttl_seconds() -> u64 {
    aria_db::DEFAULT_HISTORY_TTL.as_secs()
}

fn default_history_window() -> usize {
    aria_db::DEFAULT_HISTORY_WINDOW
}

fn default_history_max_entries() -> usize {
    aria_db::DEFAULT_HISTORY_MAX_ENTRIES
}

fn default_prune_interval_seconds() -> u64 {
    300
}

fn default_busy_timeout_ms() -> u64 {
    DbRuntimeSettings::default().busy_timeout_ms
}

fn default_pool_max_size() -> u32 {
    DbRuntimeSettings::default().pool_max_size
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_allowed_origin: default_cors_allowed_origin(),
        }
    }
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            path: default_history_path(),
            ttl_seconds: default_history_ttl_seconds(),
            window: default_history_window(),
            prune_interval_seconds: default_prune_interval_seconds(),
            busy_timeout_ms: default_busy_timeout_ms(),
            pool_max_size: default_pool_max_size(),
            max_entries: default_history_max_entries(),
        }
    }
}

impl HistoryConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds)
    }

    pub fn db_settings(&self) -> DbRuntimeSettings {
        DbRuntimeSettings {
            busy_timeout_ms: self.busy_timeout_ms,
            pool_max_size: self.pool_max_size,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    /// Failed to parse the configuration file.
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value parsed but is out of range.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

impl Config {
    /// Rejects values that would fail later at startup.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` naming the offending key.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.history.pool_max_size == 0 {
            return Err(ConfigError::Invalid(
                "history.pool_max_size must be at least 1".to_string(),
            ));
        }
        if self.history.max_entries < self.history.window {
            return Err(ConfigError::Invalid(format!(
                "history.max_entries ({}) must be at least history.window ({})",
                self.history.max_entries, self.history.window
            )));
        }
        Ok(())
    }
}

/// Loads configuration from a TOML file, falling back to defaults, then
/// applies overrides from the process environment.
///
/// # Errors
///
/// Returns `ConfigError` if the file exists but cannot be read or parsed,
/// or if a value is out of range.
pub fn load_config(path: Option<&str>) -> Result<Config, ConfigError> {
    let mut config = match path {
        Some(p) => match std::fs::read_to_string(p) {
            Ok(contents) => toml::from_str(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = p, "config file not found, using defaults");
                Config::default()
            }
            Err(e) => return Err(ConfigError::FileRead(e)),
        },
        None => Config::default(),
    };

    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    config.validate()?;
    Ok(config)
}

/// Applies environment overrides using `lookup` to read variables.
///
/// - `ARIA_HOST` overrides `server.host`
/// - `PORT`, then `ARIA_PORT`, override `server.port`
/// - `FRONTEND_URL` overrides `server.cors_allowed_origin`
/// - `ARIA_HISTORY_PATH` / `ARIA_HISTORY_TTL_SECONDS` override the history store
/// - `ARIA_DEFAULT_LLM` overrides `providers.default_llm`
/// - `GROQ_API_KEY`, `CLAUDE_API_KEY`, `GEMINI_API_KEY`, `OPENAI_API_KEY`,
///   `AZURE_SPEECH_KEY` and `AZURE_SPEECH_REGION` set provider credentials
/// - `ARIA_LOG_LEVEL` / `ARIA_LOG_JSON` override logging
///
/// Values that fail to parse are ignored.
pub fn apply_env_overrides(config: &mut Config, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(parsed) = lookup("ARIA_HOST").and_then(|v| v.parse().ok()) {
        config.server.host = parsed;
    }
    for key in ["PORT", "ARIA_PORT"] {
        if let Some(parsed) = lookup(key).and_then(|v| v.parse().ok()) {
            config.server.port = parsed;
        }
    }
    if let Some(origin) = lookup("FRONTEND_URL") {
        config.server.cors_allowed_origin = origin;
    }

    if let Some(path) = lookup("ARIA_HISTORY_PATH") {
        config.history.path = path;
    }
    if let Some(parsed) = lookup("ARIA_HISTORY_TTL_SECONDS").and_then(|v| v.parse().ok()) {
        config.history.ttl_seconds = parsed;
    }

    let providers = &mut config.providers;
    if let Some(name) = lookup("ARIA_DEFAULT_LLM") {
        providers.default_llm = name;
    }
    for (key, slot) in [
        ("GROQ_API_KEY", &mut providers.groq_api_key),
        ("CLAUDE_API_KEY", &mut providers.claude_api_key),
        ("GEMINI_API_KEY", &mut providers.gemini_api_key),
        ("OPENAI_API_KEY", &mut providers.openai_api_key),
        ("AZURE_SPEECH_KEY", &mut providers.azure_speech_key),
    ] {
        if let Some(value) = lookup(key) {
            *slot = Some(value);
        }
    }
    if let Some(region) = lookup("AZURE_SPEECH_REGION") {
        providers.azure_speech_region = region;
    }

    if let Some(level) = lookup("ARIA_LOG_LEVEL") {
        config.logging.level = level;
    }
    if let Some(json) = lookup("ARIA_LOG_JSON") {
        config.logging.json = json == "true" || json == "1";
    }
}
