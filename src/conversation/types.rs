//! Conversation types for QuillClaw
//!
//! This module defines the core types for conversation state: messages,
//! roles, content blocks, and the conversation record itself. The message
//! types double as the model API wire format, so the same structures are
//! serialized onto requests and deserialized from responses.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// The role of a message sender in a conversation.
///
/// Tool results are carried inside `User` messages per protocol convention;
/// there is no separate tool role on the wire.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Messages from the user (including tool results)
    User,
    /// Messages from the model
    Assistant,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

/// A content block within a message.
///
/// Closed tagged union over the three block shapes the protocol defines.
/// Every consumption site matches exhaustively; an unrecognized block type
/// is a deserialization error, not a silently-ignored variant.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    /// Plain text content
    Text { text: String },
    /// Model-issued function call. Answered by exactly one `ToolResult`
    /// block carrying the same id before the next model request.
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    /// Caller-supplied result for a prior `ToolUse` block.
    ToolResult {
        tool_use_id: String,
        content: String,
    },
}

/// Message content - simple text or an array of content blocks.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum MessageContent {
    /// Simple text content
    Text(String),
    /// Array of content blocks (for tool calls/results)
    Blocks(Vec<ContentBlock>),
}

/// A single message in a conversation.
///
/// # Example
/// ```
/// use quillclaw::conversation::{Message, Role};
///
/// let msg = Message::user("Hello!");
/// assert_eq!(msg.role, Role::User);
/// assert_eq!(msg.text(), "Hello!");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    /// The role of the message sender
    pub role: Role,
    /// The message content
    pub content: MessageContent,
}

impl Message {
    /// Create a new user message with plain text content.
    pub fn user(content: &str) -> Self {
        Self {
            role: Role::User,
            content: MessageContent::Text(content.to_string()),
        }
    }

    /// Create a new assistant message with plain text content.
    pub fn assistant(content: &str) -> Self {
        Self {
            role: Role::Assistant,
            content: MessageContent::Text(content.to_string()),
        }
    }

    /// Create an assistant message from raw response content blocks.
    ///
    /// Used to preserve the model's output verbatim (text and tool_use
    /// blocks alike) when a response requests tool execution.
    pub fn assistant_blocks(blocks: Vec<ContentBlock>) -> Self {
        Self {
            role: Role::Assistant,
            content: MessageContent::Blocks(blocks),
        }
    }

    /// Create a user message carrying tool_result blocks.
    ///
    /// All results for one round of tool execution travel in a single
    /// message, in the order the tool_use blocks appeared.
    pub fn tool_results(results: Vec<ContentBlock>) -> Self {
        Self {
            role: Role::User,
            content: MessageContent::Blocks(results),
        }
    }

    /// Extract the text of this message: plain content as-is, block content
    /// as the text blocks joined with newlines.
    pub fn text(&self) -> String {
        match &self.content {
            MessageContent::Text(text) => text.clone(),
            MessageContent::Blocks(blocks) => {
                let mut out = String::new();
                for block in blocks {
                    if let ContentBlock::Text { text } = block {
                        if !out.is_empty() {
                            out.push('\n');
                        }
                        out.push_str(text);
                    }
                }
                out
            }
        }
    }

    /// Names of the tools invoked by this message's tool_use blocks.
    pub fn tool_names(&self) -> Vec<&str> {
        match &self.content {
            MessageContent::Text(_) => Vec::new(),
            MessageContent::Blocks(blocks) => blocks
                .iter()
                .filter_map(|b| match b {
                    ContentBlock::ToolUse { name, .. } => Some(name.as_str()),
                    _ => None,
                })
                .collect(),
        }
    }

    /// Check if this message contains any tool_use blocks.
    pub fn has_tool_use(&self) -> bool {
        matches!(&self.content, MessageContent::Blocks(blocks)
            if blocks.iter().any(|b| matches!(b, ContentBlock::ToolUse { .. })))
    }

    /// Check if this message contains any tool_result blocks.
    pub fn has_tool_result(&self) -> bool {
        matches!(&self.content, MessageContent::Blocks(blocks)
            if blocks.iter().any(|b| matches!(b, ContentBlock::ToolResult { .. })))
    }

    /// Check if this message is plain text without structured blocks.
    pub fn is_text_only(&self) -> bool {
        matches!(&self.content, MessageContent::Text(_))
    }
}

/// A conversation: an ordered, append-only message sequence plus metadata.
///
/// Owned by the [`ConversationStore`](crate::store::ConversationStore); the
/// agent loop holds a working copy for the duration of a turn and hands the
/// final state back for persistence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    /// Unique identifier (UUID v4)
    pub id: String,
    /// Display name, derived on first save if not set
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// When this conversation was created
    pub created_at: DateTime<Utc>,
    /// When this conversation was last modified (drives store eviction)
    pub updated_at: DateTime<Utc>,
    /// Ordered list of messages
    pub messages: Vec<Message>,
    /// Digest of summarized-away history, injected as a system prompt
    /// prefix on subsequent turns
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

impl Conversation {
    /// Create a new empty conversation with a fresh id.
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            name: None,
            created_at: now,
            updated_at: now,
            messages: Vec::new(),
            summary: None,
        }
    }

    /// Add a message and refresh the `updated_at` timestamp.
    pub fn add_message(&mut self, message: Message) {
        self.messages.push(message);
        self.updated_at = Utc::now();
    }

    /// Append a digest of summarized-away messages to the running summary.
    pub fn push_summary(&mut self, digest: &str) {
        match &mut self.summary {
            Some(existing) => {
                existing.push('\n');
                existing.push_str(digest);
            }
            None => self.summary = Some(digest.to_string()),
        }
        self.updated_at = Utc::now();
    }

    /// The text of the first user message, if any. Used as the fallback
    /// source for conversation naming.
    pub fn first_user_text(&self) -> Option<String> {
        self.messages
            .iter()
            .find(|m| m.role == Role::User && m.is_text_only())
            .map(|m| m.text())
    }

    /// Get the number of messages in this conversation.
    pub fn message_count(&self) -> usize {
        self.messages.len()
    }

    /// Check if this conversation has no messages.
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Get the last message, if any.
    pub fn last_message(&self) -> Option<&Message> {
        self.messages.last()
    }
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new()
    }
}
