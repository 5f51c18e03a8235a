//! Configuration loading, validation, and management for tidemark.
//!
//! Loads configuration from `~/.tidemark/config.toml` with environment
//! variable overrides. Validates all settings at startup; a configuration
//! error is the only failure that stops the process.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tidemark_core::ConfidenceTier;

/// The root configuration structure.
///
/// Maps directly to `~/.tidemark/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key (can be overridden per-provider)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Default LLM provider
    #[serde(default = "default_provider")]
    pub default_provider: String,

    /// Default generation model
    #[serde(default = "default_model")]
    pub default_model: String,

    /// Model used to embed queries for evidence retrieval
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,

    /// Default temperature
    #[serde(default = "default_temperature")]
    pub default_temperature: f32,

    /// Default max tokens per LLM response
    #[serde(default = "default_max_tokens")]
    pub default_max_tokens: u32,

    /// Orchestrator settings
    #[serde(default)]
    pub agent: AgentConfig,

    /// Evidence retrieval settings
    #[serde(default)]
    pub retrieval: RetrievalConfig,

    /// Session context store settings
    #[serde(default)]
    pub context: ContextConfig,

    /// Gateway configuration
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Provider-specific configurations
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,
}

fn default_provider() -> String {
    "openai".into()
}
fn default_model() -> String {
    "gpt-4o".into()
}
fn default_embedding_model() -> String {
    "text-embedding-3-small".into()
}
fn default_temperature() -> f32 {
    0.0
}
fn default_max_tokens() -> u32 {
    2048
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
            .field("embedding_model", &self.embedding_model)
            .field("default_temperature", &self.default_temperature)
            .field("default_max_tokens", &self.default_max_tokens)
            .field("agent", &self.agent)
            .field("retrieval", &self.retrieval)
            .field("context", &self.context)
            .field("gateway", &self.gateway)
            .field("providers", &self.providers)
            .finish()
    }
}

/// Per-provider settings under `[providers.<name>]`.
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

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Upper bound on each generation call, in seconds.
    #[serde(default = "default_generation_timeout")]
    pub generation_timeout_secs: u64,

    /// Map actions kept per response after validation.
    #[serde(default = "default_max_actions")]
    pub max_actions: usize,

    /// Prior messages rendered into each prompt.
    #[serde(default = "default_history_window")]
    pub history_window: usize,
}

fn default_generation_timeout() -> u64 {
    60
}
fn default_max_actions() -> usize {
    4
}
fn default_history_window() -> usize {
    20
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            generation_timeout_secs: default_generation_timeout(),
            max_actions: default_max_actions(),
            history_window: default_history_window(),
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// `memory`, `postgres`, or `none`
    #[serde(default = "default_retrieval_backend")]
    pub backend: String,

    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Lowest confidence tier admitted: `HIGH`, `MEDIUM`, or `LOW`.
    #[serde(default = "default_min_confidence")]
    pub min_confidence: String,

    /// PostgreSQL connection string (required for the `postgres` backend)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_url: Option<String>,

    /// JSON corpus loaded by the `memory` backend
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub corpus_path: Option<PathBuf>,
}

fn default_retrieval_backend() -> String {
    "memory".into()
}
fn default_top_k() -> usize {
    10
}
fn default_min_confidence() -> String {
    "MEDIUM".into()
}

impl RetrievalConfig {
    /// The configured minimum tier; falls back to `MEDIUM` when unparsable.
    ///
    /// [`AppConfig::validate`] rejects unknown tiers, so the fallback is
    /// only reachable on an unvalidated config.
    pub fn min_confidence_tier(&self) -> ConfidenceTier {
        self.min_confidence.parse().unwrap_or_default()
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            backend: default_retrieval_backend(),
            top_k: default_top_k(),
            min_confidence: default_min_confidence(),
            database_url: None,
            corpus_path: None,
        }
    }
}

impl std::fmt::Debug for RetrievalConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetrievalConfig")
            .field("backend", &self.backend)
            .field("top_k", &self.top_k)
            .field("min_confidence", &self.min_confidence)
            .field("database_url", &redact(&self.database_url))
            .field("corpus_path", &self.corpus_path)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextConfig {
    /// `memory` or `sqlite`
    #[serde(default = "default_context_backend")]
    pub backend: String,

    /// Database file for the `sqlite` backend; defaults to
    /// `~/.tidemark/sessions.db`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sqlite_path: Option<PathBuf>,
}

fn default_context_backend() -> String {
    "memory".into()
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            backend: default_context_backend(),
            sqlite_path: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_host")]
    pub host: String,

    /// Allowed browser origins; empty means any origin.
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

fn default_port() -> u16 {
    8000
}
fn default_host() -> String {
    "127.0.0.1".into()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
            cors_origins: Vec::new(),
        }
    }
}

const RETRIEVAL_BACKENDS: [&str; 3] = ["memory", "postgres", "none"];
const CONTEXT_BACKENDS: [&str; 2] = ["memory", "sqlite"];

impl AppConfig {
    /// Load configuration from the default path (~/.tidemark/config.toml).
    ///
    /// Environment variables take priority over the file:
    /// - `TIDEMARK_API_KEY`, then `OPENAI_API_KEY`
    /// - `TIDEMARK_PROVIDER`, `TIDEMARK_MODEL`
    /// - `DATABASE_URL`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::read(&config_path)?;
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path, without environment
    /// overrides.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let config = Self::read(path)?;
        config.validate()?;
        Ok(config)
    }

    fn read(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Apply environment overrides through `lookup`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(key) = lookup("TIDEMARK_API_KEY").or_else(|| lookup("OPENAI_API_KEY")) {
            self.api_key = Some(key);
        }

        if let Some(provider) = lookup("TIDEMARK_PROVIDER") {
            self.default_provider = provider;
        }

        if let Some(model) = lookup("TIDEMARK_MODEL") {
            self.default_model = model;
        }

        if let Some(url) = lookup("DATABASE_URL") {
            self.retrieval.database_url = Some(url);
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".tidemark")
    }

    /// Where the SQLite context store lives when none is configured.
    pub fn sqlite_path(&self) -> PathBuf {
        self.context
            .sqlite_path
            .clone()
            .unwrap_or_else(|| Self::config_dir().join("sessions.db"))
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.default_temperature < 0.0 || self.default_temperature > 2.0 {
            return Err(ConfigError::ValidationError(
                "default_temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.agent.max_actions == 0 {
            return Err(ConfigError::ValidationError(
                "agent.max_actions must be at least 1".into(),
            ));
        }

        if self.agent.generation_timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "agent.generation_timeout_secs must be at least 1".into(),
            ));
        }

        if self.retrieval.top_k == 0 {
            return Err(ConfigError::ValidationError(
                "retrieval.top_k must be at least 1".into(),
            ));
        }

        if self.retrieval.min_confidence.parse::<ConfidenceTier>().is_err() {
            return Err(ConfigError::ValidationError(format!(
                "retrieval.min_confidence must be HIGH, MEDIUM or LOW, got '{}'",
                self.retrieval.min_confidence
            )));
        }

        if !RETRIEVAL_BACKENDS.contains(&self.retrieval.backend.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "retrieval.backend must be one of {RETRIEVAL_BACKENDS:?}, got '{}'",
                self.retrieval.backend
            )));
        }

        if self.retrieval.backend == "postgres" && self.retrieval.database_url.is_none() {
            return Err(ConfigError::ValidationError(
                "retrieval.backend = \"postgres\" requires retrieval.database_url or DATABASE_URL"
                    .into(),
            ));
        }

        if !CONTEXT_BACKENDS.contains(&self.context.backend.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "context.backend must be one of {CONTEXT_BACKENDS:?}, got '{}'",
                self.context.backend
            )));
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
            embedding_model: default_embedding_model(),
            default_temperature: default_temperature(),
            default_max_tokens: default_max_tokens(),
            agent: AgentConfig::default(),
            retrieval: RetrievalConfig::default(),
            context: ContextConfig::default(),
            gateway: GatewayConfig::default(),
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

impl From<ConfigError> for tidemark_core::Error {
    fn from(err: ConfigError) -> Self {
        tidemark_core::Error::Config {
            message: err.to_string(),
        }
    }
}
