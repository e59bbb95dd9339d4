//! Configuration loading, validation, and management for ReplyForge.
//!
//! Loads configuration from `~/.replyforge/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.replyforge/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key shared by providers that don't set their own
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Default model
    #[serde(default = "default_model")]
    pub default_model: String,

    /// Default temperature
    #[serde(default = "default_temperature")]
    pub default_temperature: f32,

    /// Default max tokens per generated reply
    #[serde(default = "default_max_tokens")]
    pub default_max_tokens: u32,

    /// Token budget for the compressed conversation history
    #[serde(default = "default_history_token_budget")]
    pub history_token_budget: usize,

    /// Where templates and outcomes are persisted
    #[serde(default = "default_database_url")]
    pub database_url: String,

    /// Generation backends, tried in this order
    #[serde(default = "default_providers")]
    pub providers: Vec<ProviderConfig>,

    /// Canned replies used when generation is blocked or fails
    #[serde(default)]
    pub fallback: FallbackConfig,

    /// Output-side phrasing settings
    #[serde(default)]
    pub phrasing: PhrasingConfig,

    /// Injection screen pattern sets
    #[serde(default)]
    pub screen: ScreenConfig,

    /// Prompt template settings
    #[serde(default)]
    pub templates: TemplatesConfig,
}

fn default_model() -> String {
    "gpt-4o-mini".into()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    512
}
fn default_history_token_budget() -> usize {
    512
}
fn default_database_url() -> String {
    format!(
        "sqlite://{}",
        AppConfig::config_dir().join("replyforge.db").display()
    )
}
fn default_providers() -> Vec<ProviderConfig> {
    vec![ProviderConfig {
        name: "openai".into(),
        kind: ProviderKind::OpenAiCompat,
        api_key: None,
        api_url: None,
        timeout_secs: default_timeout_secs(),
    }]
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
            .field("default_model", &self.default_model)
            .field("default_temperature", &self.default_temperature)
            .field("default_max_tokens", &self.default_max_tokens)
            .field("history_token_budget", &self.history_token_budget)
            .field("database_url", &self.database_url)
            .field("providers", &self.providers)
            .field("fallback", &self.fallback)
            .field("phrasing", &self.phrasing)
            .field("screen", &self.screen)
            .field("templates", &self.templates)
            .finish()
    }
}

/// Which wire protocol a provider speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    #[serde(rename = "openai_compat", alias = "openai")]
    OpenAiCompat,
    Anthropic,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Unique name, recorded in traces and outcomes
    pub name: String,

    #[serde(default = "default_provider_kind")]
    pub kind: ProviderKind,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    /// Deadline for a single call to this provider
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_provider_kind() -> ProviderKind {
    ProviderKind::OpenAiCompat
}
fn default_timeout_secs() -> u64 {
    30
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FallbackConfig {
    /// Reply used when generation fails
    #[serde(default = "default_fallback_text")]
    pub text: String,

    /// Reply used when the injection screen blocks the input
    #[serde(default = "default_refusal")]
    pub refusal: String,

    /// Appended to the fallback when the input had to be sanitized
    #[serde(default = "default_sanitize_notice")]
    pub sanitize_notice: String,
}

fn default_fallback_text() -> String {
    "Sorry, I can't put a proper answer together right now. Please try again in a moment.".into()
}
fn default_refusal() -> String {
    "Sorry, I can't help with that request.".into()
}
fn default_sanitize_notice() -> String {
    "(Parts of your message were removed for safety.)".into()
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            text: default_fallback_text(),
            refusal: default_refusal(),
            sanitize_notice: default_sanitize_notice(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhrasingConfig {
    /// Hard cap on the final reply, in characters
    #[serde(default = "default_max_chars")]
    pub max_chars: usize,

    /// Constraints applied to every turn in addition to the turn's own
    #[serde(default)]
    pub default_constraints: Vec<String>,
}

fn default_max_chars() -> usize {
    4096
}

impl Default for PhrasingConfig {
    fn default() -> Self {
        Self {
            max_chars: default_max_chars(),
            default_constraints: vec![],
        }
    }
}

/// A named, case-insensitive pattern.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternConfig {
    pub name: String,
    pub pattern: String,
}

impl PatternConfig {
    fn new(name: &str, pattern: &str) -> Self {
        Self {
            name: name.into(),
            pattern: pattern.into(),
        }
    }
}

/// Pattern sets for the injection screen. Order matters: the first block
/// pattern that matches names the verdict.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScreenConfig {
    #[serde(default = "default_block_patterns")]
    pub block_patterns: Vec<PatternConfig>,

    #[serde(default = "default_sanitize_patterns")]
    pub sanitize_patterns: Vec<PatternConfig>,
}

fn default_block_patterns() -> Vec<PatternConfig> {
    vec![
        PatternConfig::new(
            "override_instructions",
            r"ignore\s+(all\s+)?(the\s+)?(previous|prior|above|earlier)\s+instructions",
        ),
        PatternConfig::new(
            "disregard_instructions",
            r"disregard\s+(all\s+)?(your\s+|the\s+)?(previous\s+|prior\s+)?(instructions|rules)",
        ),
        PatternConfig::new(
            "reveal_system_prompt",
            r"(reveal|show|print|repeat|leak)\s+(me\s+)?(your\s+|the\s+)?(system|hidden|initial)\s+(prompt|instructions)",
        ),
        PatternConfig::new(
            "exfiltrate_secrets",
            r"(reveal|show|print|leak|dump|give\s+me)\s+(me\s+)?(your\s+|the\s+)?(api[\s_-]?keys?|secrets?|credentials|passwords?|tokens?)",
        ),
        PatternConfig::new(
            "hidden_configuration",
            r"(hidden|internal|secret)\s+(configuration|config|settings)",
        ),
    ]
}

fn default_sanitize_patterns() -> Vec<PatternConfig> {
    vec![
        PatternConfig::new(
            "bypass_safety",
            r"bypass\s+(the\s+|your\s+)?(safety|content)\s+(policy|policies|filters?|rules)",
        ),
        PatternConfig::new(
            "no_restrictions",
            r"pretend\s+(that\s+)?you\s+have\s+no\s+(rules|restrictions|limits|filters)",
        ),
    ]
}

impl Default for ScreenConfig {
    fn default() -> Self {
        Self {
            block_patterns: default_block_patterns(),
            sanitize_patterns: default_sanitize_patterns(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplatesConfig {
    /// Baseline template id, seeded at startup when absent
    #[serde(default = "default_template_id")]
    pub default_id: String,

    /// Body seeded for the baseline template
    #[serde(default = "default_template_body")]
    pub default_body: String,
}

fn default_template_id() -> String {
    "telegram_default".into()
}
fn default_template_body() -> String {
    "You are a friendly, concise assistant replying in a chat conversation.\n\
     Keep the reply short, factual and safe.\n\
     \n\
     Conversation so far:\n\
     {history}\n\
     \n\
     User message:\n\
     {message}\n\
     \n\
     Reply:"
        .into()
}

impl Default for TemplatesConfig {
    fn default() -> Self {
        Self {
            default_id: default_template_id(),
            default_body: default_template_body(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.replyforge/config.toml).
    ///
    /// Environment overrides:
    /// - `REPLYFORGE_API_KEY` (when no key is configured)
    /// - `REPLYFORGE_MODEL`
    /// - `REPLYFORGE_DATABASE_URL`
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with_overrides(&Self::config_path())
    }

    /// Load from `path`, then apply environment overrides.
    pub fn load_with_overrides(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load_from(path)?;
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Apply overrides looked up by variable name, then re-validate.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if self.api_key.is_none() {
            self.api_key = lookup("REPLYFORGE_API_KEY");
        }

        if let Some(model) = lookup("REPLYFORGE_MODEL") {
            self.default_model = model;
        }

        if let Some(url) = lookup("REPLYFORGE_DATABASE_URL") {
            self.database_url = url;
        }

        self.validate()
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
        dirs_home().join(".replyforge")
    }

    /// Get the default configuration file path.
    pub fn config_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.default_temperature < 0.0 || self.default_temperature > 2.0 {
            return Err(ConfigError::ValidationError(
                "default_temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.default_max_tokens == 0 {
            return Err(ConfigError::ValidationError(
                "default_max_tokens must be > 0".into(),
            ));
        }

        if self.phrasing.max_chars == 0 {
            return Err(ConfigError::ValidationError(
                "phrasing.max_chars must be > 0".into(),
            ));
        }

        if self.fallback.text.trim().is_empty() || self.fallback.refusal.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "fallback.text and fallback.refusal must not be empty".into(),
            ));
        }

        let mut names = HashSet::new();
        for provider in &self.providers {
            if provider.name.trim().is_empty() {
                return Err(ConfigError::ValidationError(
                    "provider names must not be empty".into(),
                ));
            }
            if !names.insert(provider.name.as_str()) {
                return Err(ConfigError::ValidationError(format!(
                    "duplicate provider name '{}'",
                    provider.name
                )));
            }
            if provider.timeout_secs == 0 {
                return Err(ConfigError::ValidationError(format!(
                    "provider '{}': timeout_secs must be > 0",
                    provider.name
                )));
            }
        }

        for pattern in self
            .screen
            .block_patterns
            .iter()
            .chain(&self.screen.sanitize_patterns)
        {
            if pattern.name.is_empty() || pattern.pattern.is_empty() {
                return Err(ConfigError::ValidationError(
                    "screen patterns need a name and a non-empty pattern".into(),
                ));
            }
        }

        if self.default_model.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "default_model must not be empty".into(),
            ));
        }

        if self.database_url.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "database_url must not be empty".into(),
            ));
        }

        if self.templates.default_id.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "templates.default_id must not be empty".into(),
            ));
        }

        Ok(())
    }

    /// The API key for `provider`: its own, else the shared one.
    pub fn api_key_for(&self, provider: &ProviderConfig) -> String {
        provider
            .api_key
            .clone()
            .or_else(|| self.api_key.clone())
            .unwrap_or_default()
    }

    /// Generate a default config TOML string (for the `onboard` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            default_model: default_model(),
            default_temperature: default_temperature(),
            default_max_tokens: default_max_tokens(),
            history_token_budget: default_history_token_budget(),
            database_url: default_database_url(),
            providers: default_providers(),
            fallback: FallbackConfig::default(),
            phrasing: PhrasingConfig::default(),
            screen: ScreenConfig::default(),
            templates: TemplatesConfig::default(),
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
