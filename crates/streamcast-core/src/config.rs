//! Stream configuration
//!
//! Limits and timings for one platform. Loaded from TOML, every key optional.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Debounce between a mutation and the edit it triggers
pub const DEFAULT_DEBOUNCE_MS: u64 = 500;

/// Typing signals expire after ~8s on most platforms, refresh a bit earlier
pub const DEFAULT_TYPING_INTERVAL_MS: u64 = 7_000;

/// Hard stop for the typing indicator if a session never finalizes
pub const DEFAULT_TYPING_TTL_MS: u64 = 120_000;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path:?}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Limits and timings applied to one streamed response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Delay before a requested flush runs; bursts inside it coalesce
    pub debounce_ms: u64,
    /// Maximum body length of a rich message, in chars
    pub body_limit: usize,
    /// Maximum length of a plain-text message, in chars
    pub plain_limit: usize,
    /// Room kept free below `body_limit` before rolling to a new message
    pub safety_margin: usize,
    pub typing_interval_ms: u64,
    pub typing_ttl_ms: u64,
    /// Consecutive presence failures before the typing indicator gives up
    pub typing_max_failures: u32,
    /// Maximum number of task fields rendered per message
    pub max_fields: usize,
    /// Cap for a task's output inside its field, in chars
    pub field_output_cap: usize,
    /// Body shown on the primary message before any text arrives
    pub placeholder_text: String,
    /// Body shown on a continuation message before it is filled
    pub continuation_text: String,
    /// Reactions added to the final message when feedback is requested
    pub feedback_reactions: Vec<String>,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self::discord()
    }
}

impl StreamConfig {
    /// Discord: 4096-char embed descriptions, 2000-char content, 25 embed fields
    pub fn discord() -> Self {
        Self {
            debounce_ms: DEFAULT_DEBOUNCE_MS,
            body_limit: 4096,
            plain_limit: 2000,
            safety_margin: 200,
            typing_interval_ms: DEFAULT_TYPING_INTERVAL_MS,
            typing_ttl_ms: DEFAULT_TYPING_TTL_MS,
            typing_max_failures: 2,
            max_fields: 25,
            field_output_cap: 200,
            placeholder_text: "Thinking…".to_string(),
            continuation_text: "Continuing…".to_string(),
            feedback_reactions: vec!["👍".to_string(), "👎".to_string()],
        }
    }

    /// Telegram: 4096 chars for both edited and plain messages
    pub fn telegram() -> Self {
        Self {
            plain_limit: 4096,
            // Chat actions last 5s
            typing_interval_ms: 4_000,
            ..Self::discord()
        }
    }

    /// Look up a preset by name
    pub fn preset(name: &str) -> Option<Self> {
        match name {
            "discord" => Some(Self::discord()),
            "telegram" => Some(Self::telegram()),
            _ => None,
        }
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: StreamConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a config file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// `<config dir>/streamcast/config.toml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("streamcast").join("config.toml"))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.body_limit == 0 || self.plain_limit == 0 {
            return Err(ConfigError::Invalid("length limits must be non-zero".into()));
        }
        if self.safety_margin >= self.body_limit {
            return Err(ConfigError::Invalid(format!(
                "safety_margin ({}) must be smaller than body_limit ({})",
                self.safety_margin, self.body_limit
            )));
        }
        if self.debounce_ms == 0 || self.typing_interval_ms == 0 {
            return Err(ConfigError::Invalid("intervals must be non-zero".into()));
        }
        if self.typing_interval_ms >= self.typing_ttl_ms {
            return Err(ConfigError::Invalid(
                "typing_interval_ms must be shorter than typing_ttl_ms".into(),
            ));
        }
        if self.typing_max_failures == 0 {
            return Err(ConfigError::Invalid("typing_max_failures must be at least 1".into()));
        }
        Ok(())
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn typing_interval(&self) -> Duration {
        Duration::from_millis(self.typing_interval_ms)
    }

    pub fn typing_ttl(&self) -> Duration {
        Duration::from_millis(self.typing_ttl_ms)
    }

    /// Chars of uncommitted text a streaming message may hold before rolling over
    pub fn rollover_budget(&self) -> usize {
        self.body_limit.saturating_sub(self.safety_margin)
    }
}
