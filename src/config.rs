//! Configuration for QuillClaw
//!
//! Serde-deserializable configuration with per-field defaults, so a host can
//! supply a partial JSON blob and get sensible values for everything else.
//! `Config::from_env()` picks up the API key from the environment.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{QuillError, Result};

fn default_base_url() -> String {
    "https://api.anthropic.com/v1/messages".to_string()
}

fn default_model() -> String {
    "claude-sonnet-4-5-20250929".to_string()
}

fn default_max_tokens() -> u32 {
    8192
}

fn default_retry_delays_ms() -> Vec<u64> {
    vec![1000, 2000, 4000]
}

fn default_context_window() -> usize {
    200_000
}

fn default_max_messages() -> usize {
    40
}

fn default_auto_summarize_threshold() -> f64 {
    0.7
}

fn default_keep_recent() -> usize {
    10
}

fn default_min_message_chars() -> usize {
    5
}

fn default_max_tool_result_chars() -> usize {
    4000
}

fn default_max_assistant_text_chars() -> usize {
    6000
}

fn default_system_prompt() -> String {
    "You are QuillClaw, an AI assistant embedded in the user's note vault.\n\n\
     You have access to tools for reading and editing notes. Use them when needed.\n\n\
     Be concise but helpful. Focus on completing the user's request efficiently."
        .to_string()
}

fn default_max_tool_iterations() -> usize {
    20
}

fn default_max_conversations() -> usize {
    10
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Model endpoint settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Chat-completion endpoint URL
    pub base_url: String,
    /// API key; `Config::from_env()` fills this from `QUILLCLAW_API_KEY`
    /// or `ANTHROPIC_API_KEY`
    pub api_key: Option<String>,
    /// Model identifier sent on every request
    pub model: String,
    /// Maximum tokens the model may generate per response
    pub max_tokens: u32,
    /// Mark the system prompt cacheable server-side. Billing concern only.
    pub cache_system_prompt: bool,
    /// Backoff delays in milliseconds, consumed left-to-right, one per
    /// retried overloaded response
    pub retry_delays_ms: Vec<u64>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: None,
            model: default_model(),
            max_tokens: default_max_tokens(),
            cache_system_prompt: true,
            retry_delays_ms: default_retry_delays_ms(),
        }
    }
}

/// Context-window budget settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    /// Model context window in tokens, used for the usage ratio
    pub context_window: usize,
    /// Hard cap on message count before trimming/summarizing kicks in
    pub max_messages: usize,
    /// Usage ratio above which the over-cap history is summarized rather
    /// than plainly trimmed
    pub auto_summarize_threshold: f64,
    /// Recent window kept verbatim when older history is summarized away
    pub keep_recent: usize,
    /// Text messages shorter than this are pruning candidates
    pub min_message_chars: usize,
    /// Per-block cap for old tool_result content
    pub max_tool_result_chars: usize,
    /// Cap for old assistant free text
    pub max_assistant_text_chars: usize,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            context_window: default_context_window(),
            max_messages: default_max_messages(),
            auto_summarize_threshold: default_auto_summarize_threshold(),
            keep_recent: default_keep_recent(),
            min_message_chars: default_min_message_chars(),
            max_tool_result_chars: default_max_tool_result_chars(),
            max_assistant_text_chars: default_max_assistant_text_chars(),
        }
    }
}

/// Agent loop settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// System prompt sent with every request
    pub system_prompt: String,
    /// Maximum request/tool round-trips per user turn
    pub max_tool_iterations: usize,
    /// Persist the conversation at the end of every completed turn
    pub auto_save: bool,
    /// Derive a conversation name on first save
    pub auto_name: bool,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            system_prompt: default_system_prompt(),
            max_tool_iterations: default_max_tool_iterations(),
            auto_save: true,
            auto_name: true,
        }
    }
}

/// Conversation store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Bounded retention: oldest-updated conversations are evicted beyond
    /// this count
    pub max_conversations: usize,
    /// Storage directory; defaults to `~/.quillclaw`
    pub path: Option<PathBuf>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            max_conversations: default_max_conversations(),
            path: None,
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter level when `RUST_LOG` is unset
    pub level: String,
    /// Emit JSON lines instead of the compact text format
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

/// Top-level configuration.
///
/// # Example
/// ```
/// use quillclaw::config::Config;
///
/// let config: Config = serde_json::from_str(r#"{"api":{"model":"claude-haiku-4-5"}}"#).unwrap();
/// assert_eq!(config.api.model, "claude-haiku-4-5");
/// assert_eq!(config.store.max_conversations, 10);
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api: ApiConfig,
    pub context: ContextConfig,
    pub agent: AgentConfig,
    pub store: StoreConfig,
    pub logging: LoggingConfig,
}

impl Config {
    /// Default configuration with the API key taken from the environment
    /// (`QUILLCLAW_API_KEY`, falling back to `ANTHROPIC_API_KEY`).
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.api.api_key = std::env::var("QUILLCLAW_API_KEY")
            .or_else(|_| std::env::var("ANTHROPIC_API_KEY"))
            .ok();
        config
    }

    /// Load configuration from a JSON file, filling unspecified fields with
    /// defaults.
    pub fn load(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Validate values that would otherwise fail at request time.
    pub fn validate(&self) -> Result<()> {
        if self.api.api_key.as_deref().unwrap_or("").is_empty() {
            return Err(QuillError::Config(
                "No API key configured; set QUILLCLAW_API_KEY or api.api_key".to_string(),
            ));
        }
        if self.agent.max_tool_iterations == 0 {
            return Err(QuillError::Config(
                "agent.max_tool_iterations must be at least 1".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.context.auto_summarize_threshold) {
            return Err(QuillError::Config(
                "context.auto_summarize_threshold must be between 0 and 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.api.max_tokens, 8192);
        assert_eq!(config.api.retry_delays_ms, vec![1000, 2000, 4000]);
        assert!(config.api.cache_system_prompt);
        assert_eq!(config.context.max_messages, 40);
        assert_eq!(config.agent.max_tool_iterations, 20);
        assert_eq!(config.store.max_conversations, 10);
        assert!(config.agent.auto_save);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: Config =
            serde_json::from_str(r#"{"context":{"max_messages":12}}"#).unwrap();
        assert_eq!(config.context.max_messages, 12);
        // Everything else falls back to defaults
        assert_eq!(config.context.keep_recent, 10);
        assert_eq!(config.api.max_tokens, 8192);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_validate_missing_api_key() {
        let config = Config::default();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("API key"));
    }

    #[test]
    fn test_validate_ok() {
        let mut config = Config::default();
        config.api.api_key = Some("sk-test".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_zero_iterations() {
        let mut config = Config::default();
        config.api.api_key = Some("sk-test".to_string());
        config.agent.max_tool_iterations = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_threshold_range() {
        let mut config = Config::default();
        config.api.api_key = Some("sk-test".to_string());
        config.context.auto_summarize_threshold = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_roundtrip() {
        let mut config = Config::default();
        config.api.model = "claude-opus-4-1".to_string();
        config.store.max_conversations = 3;

        let json = serde_json::to_string(&config).unwrap();
        let back: Config = serde_json::from_str(&json).unwrap();
        assert_eq!(back.api.model, "claude-opus-4-1");
        assert_eq!(back.store.max_conversations, 3);
    }
}
