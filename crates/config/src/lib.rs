//! Configuration loading and validation for kitbot.
//!
//! Loads configuration from `~/.kitbot/config.toml` with environment
//! variable overrides (a `.env` file in the working directory is honored).
//! Which platforms connect and which AI providers join the response chain is
//! decided here, once, at startup — credential absence is a topology
//! decision, not a runtime error.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The two AI backends kitbot can bind to.
pub const PROVIDER_NAMES: [&str; 2] = ["gemini", "anthropic"];

/// The root configuration structure.
///
/// Maps directly to `~/.kitbot/config.toml`. Every section is optional; an
/// absent section simply leaves that platform or provider out of the
/// process topology.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Slack connection settings (Socket Mode).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slack: Option<SlackConfig>,

    /// Discord connection settings (gateway).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discord: Option<DiscordConfig>,

    /// AI provider credentials and models.
    #[serde(default)]
    pub providers: ProvidersConfig,

    /// Fallback priority among configured AI providers.
    /// Earlier entries are consulted first.
    #[serde(default = "default_provider_priority")]
    pub provider_priority: Vec<String>,
}

fn default_provider_priority() -> Vec<String> {
    PROVIDER_NAMES.iter().map(|s| s.to_string()).collect()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            slack: None,
            discord: None,
            providers: ProvidersConfig::default(),
            provider_priority: default_provider_priority(),
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct SlackConfig {
    /// Bot token (xoxb-...).
    pub bot_token: String,
    /// App-level token (xapp-...) for Socket Mode.
    pub app_token: String,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct DiscordConfig {
    /// Bot token from the Discord developer portal.
    pub bot_token: String,
}

#[derive(Clone, Default, Serialize, Deserialize)]
pub struct ProvidersConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anthropic: Option<ProviderConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gemini: Option<ProviderConfig>,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub api_key: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

impl ProviderConfig {
    /// Whether this provider can actually be constructed.
    pub fn is_usable(&self) -> bool {
        !self.api_key.trim().is_empty()
    }

    /// The configured model, or the given backend default.
    pub fn model_or<'a>(&'a self, default: &'a str) -> &'a str {
        self.model.as_deref().unwrap_or(default)
    }
}

// Secrets never appear in Debug output.

fn redact(s: &str) -> &'static str {
    if s.is_empty() { "<empty>" } else { "[REDACTED]" }
}

impl std::fmt::Debug for SlackConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlackConfig")
            .field("bot_token", &redact(&self.bot_token))
            .field("app_token", &redact(&self.app_token))
            .finish()
    }
}

impl std::fmt::Debug for DiscordConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscordConfig")
            .field("bot_token", &redact(&self.bot_token))
            .finish()
    }
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &redact(&self.api_key))
            .field("model", &self.model)
            .finish()
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("slack", &self.slack)
            .field("discord", &self.discord)
            .field("providers.anthropic", &self.providers.anthropic)
            .field("providers.gemini", &self.providers.gemini)
            .field("provider_priority", &self.provider_priority)
            .finish()
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.kitbot/config.toml),
    /// apply `.env` and process environment overrides.
    ///
    /// Environment variables (highest priority):
    /// - `SLACK_BOT_TOKEN`, `SLACK_APP_TOKEN`
    /// - `DISCORD_BOT_TOKEN`
    /// - `ANTHROPIC_API_KEY`, `ANTHROPIC_MODEL`
    /// - `GEMINI_API_KEY`, `GEMINI_MODEL`
    pub fn load() -> Result<Self, ConfigError> {
        if dotenvy::dotenv().is_err() {
            tracing::debug!("No .env file found");
        }

        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path. Missing file = defaults.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".kitbot")
    }

    /// Overlay environment variables onto whatever the file provided.
    pub fn apply_env_overrides(&mut self) {
        if let (Ok(bot), Ok(app)) = (
            std::env::var("SLACK_BOT_TOKEN"),
            std::env::var("SLACK_APP_TOKEN"),
        ) {
            self.slack = Some(SlackConfig {
                bot_token: bot,
                app_token: app,
            });
        }

        if let Ok(token) = std::env::var("DISCORD_BOT_TOKEN") {
            self.discord = Some(DiscordConfig { bot_token: token });
        }

        if let Ok(key) = std::env::var("ANTHROPIC_API_KEY") {
            let model = std::env::var("ANTHROPIC_MODEL")
                .ok()
                .or_else(|| self.providers.anthropic.as_ref().and_then(|p| p.model.clone()));
            self.providers.anthropic = Some(ProviderConfig { api_key: key, model });
        }

        if let Ok(key) = std::env::var("GEMINI_API_KEY") {
            let model = std::env::var("GEMINI_MODEL")
                .ok()
                .or_else(|| self.providers.gemini.as_ref().and_then(|p| p.model.clone()));
            self.providers.gemini = Some(ProviderConfig { api_key: key, model });
        }
    }

    /// Validate the configuration.
    ///
    /// A platform section that is present but unusable is a configuration
    /// mistake and fatal at startup; an absent section is fine.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(slack) = &self.slack {
            if slack.bot_token.trim().is_empty() || slack.app_token.trim().is_empty() {
                return Err(ConfigError::Validation(
                    "[slack] requires both bot_token and app_token".into(),
                ));
            }
        }

        if let Some(discord) = &self.discord {
            if discord.bot_token.trim().is_empty() {
                return Err(ConfigError::Validation(
                    "[discord] requires bot_token".into(),
                ));
            }
        }

        for name in &self.provider_priority {
            if !PROVIDER_NAMES.contains(&name.as_str()) {
                return Err(ConfigError::Validation(format!(
                    "Unknown provider '{name}' in provider_priority (expected one of {PROVIDER_NAMES:?})"
                )));
            }
        }

        Ok(())
    }

    /// Whether at least one chat platform is configured.
    pub fn has_platform(&self) -> bool {
        self.slack.is_some() || self.discord.is_some()
    }

    /// Names of AI providers that are configured and usable, in priority order.
    pub fn usable_providers(&self) -> Vec<&str> {
        self.provider_priority
            .iter()
            .map(String::as_str)
            .filter(|name| match *name {
                "anthropic" => self.providers.anthropic.as_ref().is_some_and(ProviderConfig::is_usable),
                "gemini" => self.providers.gemini.as_ref().is_some_and(ProviderConfig::is_usable),
                _ => false,
            })
            .collect()
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

/// Configuration errors. All fatal at startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    Read { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    Parse { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    Validation(String),
}
