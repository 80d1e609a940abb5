//! Wire types for the chat-completion endpoint.
//!
//! One request/response pair, JSON over HTTPS. The conversation's `Message`
//! type serializes directly as the wire message format, so only the
//! envelope types live here.

use serde::{Deserialize, Deserializer, Serialize};

use crate::conversation::{ContentBlock, Message};
use crate::tools::ToolSpec;

/// Chat-completion request body.
#[derive(Debug, Clone, Serialize)]
pub struct ApiRequest {
    /// Model identifier
    pub model: String,
    /// Maximum tokens to generate
    pub max_tokens: u32,
    /// Conversation messages
    pub messages: Vec<Message>,
    /// System prompt, serialized as a block array so it can carry a
    /// cache marker
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<Vec<SystemBlock>>,
    /// Available tools
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ToolSpec>>,
}

/// One block of the system prompt.
#[derive(Debug, Clone, Serialize)]
pub struct SystemBlock {
    #[serde(rename = "type")]
    pub block_type: &'static str,
    pub text: String,
    /// Server-side prompt cache marker. Affects billing, not correctness.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_control: Option<CacheControl>,
}

/// Prompt cache marker.
#[derive(Debug, Clone, Serialize)]
pub struct CacheControl {
    #[serde(rename = "type")]
    pub control_type: &'static str,
}

impl SystemBlock {
    /// Build the system prompt block, optionally marked cacheable.
    pub fn new(text: &str, cacheable: bool) -> Self {
        Self {
            block_type: "text",
            text: text.to_string(),
            cache_control: cacheable.then_some(CacheControl {
                control_type: "ephemeral",
            }),
        }
    }
}

/// Terminal classification of a single model response within a turn.
///
/// Closed enum so every consumption site matches exhaustively; values the
/// protocol may add later land in `Other` and are rejected explicitly by
/// the agent loop rather than misinterpreted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    /// The model finished its answer.
    EndTurn,
    /// The model requested tool execution.
    ToolUse,
    /// Generation was cut off by the token limit.
    MaxTokens,
    /// Any stop reason this engine has no contract for.
    Other(String),
}

impl StopReason {
    /// Parse the wire string form.
    pub fn parse(raw: &str) -> Self {
        match raw {
            "end_turn" => StopReason::EndTurn,
            "tool_use" => StopReason::ToolUse,
            "max_tokens" => StopReason::MaxTokens,
            other => StopReason::Other(other.to_string()),
        }
    }
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StopReason::EndTurn => write!(f, "end_turn"),
            StopReason::ToolUse => write!(f, "tool_use"),
            StopReason::MaxTokens => write!(f, "max_tokens"),
            StopReason::Other(raw) => write!(f, "{}", raw),
        }
    }
}

impl<'de> Deserialize<'de> for StopReason {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Ok(StopReason::parse(&raw))
    }
}

/// Token usage reported by the endpoint.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Usage {
    /// Tokens in the input
    pub input_tokens: u32,
    /// Tokens in the output
    pub output_tokens: u32,
}

/// Chat-completion response body, returned to the agent loop as-is.
#[derive(Debug, Clone, Deserialize)]
pub struct ModelResponse {
    /// Why generation stopped
    pub stop_reason: StopReason,
    /// Response content blocks
    pub content: Vec<ContentBlock>,
    /// Token usage
    #[serde(default)]
    pub usage: Option<Usage>,
}

impl ModelResponse {
    /// The text blocks of the response joined with newlines.
    pub fn text(&self) -> String {
        let mut out = String::new();
        for block in &self.content {
            if let ContentBlock::Text { text } = block {
                if !out.is_empty() {
                    out.push('\n');
                }
                out.push_str(text);
            }
        }
        out
    }

    /// Check if the response contains any tool_use blocks.
    pub fn has_tool_use(&self) -> bool {
        self.content
            .iter()
            .any(|b| matches!(b, ContentBlock::ToolUse { .. }))
    }
}

/// Structured error payload returned alongside a non-2xx status.
#[derive(Debug, Deserialize)]
pub struct ApiErrorEnvelope {
    pub error: ApiErrorBody,
}

/// Error details inside the envelope.
#[derive(Debug, Deserialize)]
pub struct ApiErrorBody {
    #[serde(rename = "type")]
    pub error_type: String,
    pub message: String,
}
