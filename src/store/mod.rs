//! Store module - bounded conversation persistence
//!
//! The [`ConversationStore`] keeps a bounded set of conversation snapshots
//! (at most `max_conversations`, default 10), evicting the one with the
//! oldest `updated_at` when the bound is exceeded. The whole set persists
//! as one namespaced JSON blob (`conversations.json`) in the storage
//! directory; it is read once at startup and rewritten after every save or
//! delete.
//!
//! # Thread Safety
//!
//! The store uses `Arc<RwLock>` internally, making it safe to clone and
//! share across async tasks.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::client::RequestClient;
use crate::config::StoreConfig;
use crate::conversation::{Conversation, Message};
use crate::error::Result;
use crate::observer::NullObserver;

/// Blob filename inside the storage directory.
const BLOB_FILE: &str = "conversations.json";

/// Character cap for derived and fallback conversation names.
const NAME_MAX_CHARS: usize = 60;

/// Metadata for a stored conversation, as returned by
/// [`ConversationStore::list`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationMeta {
    /// Conversation id
    pub id: String,
    /// Display name, if one has been assigned
    pub name: Option<String>,
    /// Last-update timestamp (drives eviction order)
    pub updated_at: DateTime<Utc>,
    /// Number of messages in the conversation
    pub message_count: usize,
}

/// Bounded store of named conversation snapshots.
pub struct ConversationStore {
    conversations: Arc<RwLock<HashMap<String, Conversation>>>,
    storage_path: Option<PathBuf>,
    max_conversations: usize,
}

impl ConversationStore {
    /// Create a store persisting under the configured directory (default
    /// `~/.quillclaw`), loading any existing blob.
    ///
    /// # Errors
    /// Returns an error if the directory cannot be created or an existing
    /// blob cannot be parsed.
    pub fn new(config: &StoreConfig) -> Result<Self> {
        let dir = config.path.clone().unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".quillclaw")
        });
        Self::with_path(dir, config.max_conversations)
    }

    /// Create a store persisting under a custom directory. Useful for
    /// tests with temporary directories.
    ///
    /// # Errors
    /// Returns an error if the directory cannot be created or an existing
    /// blob cannot be parsed.
    pub fn with_path(dir: PathBuf, max_conversations: usize) -> Result<Self> {
        std::fs::create_dir_all(&dir)?;

        let blob_path = dir.join(BLOB_FILE);
        let mut conversations = HashMap::new();
        if blob_path.exists() {
            let content = std::fs::read_to_string(&blob_path)?;
            let records: Vec<Conversation> = serde_json::from_str(&content)?;
            debug!(count = records.len(), "Loaded conversation blob");
            for conversation in records {
                conversations.insert(conversation.id.clone(), conversation);
            }
        }

        Ok(Self {
            conversations: Arc::new(RwLock::new(conversations)),
            storage_path: Some(dir),
            max_conversations,
        })
    }

    /// Create an in-memory store without persistence.
    pub fn new_memory(max_conversations: usize) -> Self {
        Self {
            conversations: Arc::new(RwLock::new(HashMap::new())),
            storage_path: None,
            max_conversations,
        }
    }

    /// Save a conversation snapshot, evicting the least-recently-updated
    /// conversation if the bound is exceeded, then rewrite the blob.
    pub async fn save(&self, conversation: &Conversation) -> Result<()> {
        {
            let mut conversations = self.conversations.write().await;
            conversations.insert(conversation.id.clone(), conversation.clone());

            while conversations.len() > self.max_conversations {
                let oldest = conversations
                    .values()
                    .min_by_key(|c| c.updated_at)
                    .map(|c| c.id.clone());
                match oldest {
                    Some(id) => {
                        info!(id = %id, "Evicting least-recently-updated conversation");
                        conversations.remove(&id);
                    }
                    None => break,
                }
            }
        }

        self.persist().await
    }

    /// Load a conversation by id.
    pub async fn load(&self, id: &str) -> Option<Conversation> {
        let conversations = self.conversations.read().await;
        conversations.get(id).cloned()
    }

    /// Delete a conversation by id and rewrite the blob.
    pub async fn delete(&self, id: &str) -> Result<()> {
        {
            let mut conversations = self.conversations.write().await;
            conversations.remove(id);
        }
        self.persist().await
    }

    /// List stored conversations, newest-updated first.
    pub async fn list(&self) -> Vec<ConversationMeta> {
        let conversations = self.conversations.read().await;
        let mut metas: Vec<ConversationMeta> = conversations
            .values()
            .map(|c| ConversationMeta {
                id: c.id.clone(),
                name: c.name.clone(),
                updated_at: c.updated_at,
                message_count: c.message_count(),
            })
            .collect();
        metas.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        metas
    }

    /// Number of stored conversations.
    pub async fn len(&self) -> usize {
        self.conversations.read().await.len()
    }

    /// Check if the store holds no conversations.
    pub async fn is_empty(&self) -> bool {
        self.conversations.read().await.is_empty()
    }

    /// Rewrite the persistence blob, if persistence is enabled.
    async fn persist(&self) -> Result<()> {
        let Some(dir) = &self.storage_path else {
            return Ok(());
        };

        let records: Vec<Conversation> = {
            let conversations = self.conversations.read().await;
            conversations.values().cloned().collect()
        };
        let content = serde_json::to_string_pretty(&records)?;
        tokio::fs::write(dir.join(BLOB_FILE), content).await?;
        Ok(())
    }
}

impl Clone for ConversationStore {
    fn clone(&self) -> Self {
        Self {
            conversations: Arc::clone(&self.conversations),
            storage_path: self.storage_path.clone(),
            max_conversations: self.max_conversations,
        }
    }
}

/// Derive a display name for a conversation via a short summarization
/// request over its first few exchanges.
///
/// Best-effort: any request failure falls back to [`fallback_name`], so
/// naming never blocks persistence.
pub async fn derive_name(conversation: &Conversation, client: &RequestClient) -> String {
    let mut transcript = String::new();
    for msg in conversation.messages.iter().take(4) {
        let text: String = msg.text().chars().take(200).collect();
        if text.is_empty() {
            continue;
        }
        transcript.push_str(&format!("{}: {}\n", msg.role, text));
    }
    if transcript.is_empty() {
        return fallback_name(conversation);
    }

    let prompt = format!(
        "Reply with a short title (at most six words) for this conversation. \
         Reply with the title only, no quotes.\n\n{}",
        transcript
    );

    match client
        .send(&[Message::user(&prompt)], None, &[], &NullObserver)
        .await
    {
        Ok(response) => {
            let name = clean_name(&response.text());
            if name.is_empty() {
                fallback_name(conversation)
            } else {
                name
            }
        }
        Err(e) => {
            warn!(error = %e, "Conversation naming request failed, using fallback");
            fallback_name(conversation)
        }
    }
}

/// Deterministic fallback name: the first user message truncated, or a
/// placeholder for empty conversations.
pub fn fallback_name(conversation: &Conversation) -> String {
    match conversation.first_user_text() {
        Some(text) => {
            let name = clean_name(&text);
            if name.is_empty() {
                "Untitled conversation".to_string()
            } else {
                name
            }
        }
        None => "Untitled conversation".to_string(),
    }
}

/// Normalize a candidate name: first line, quotes stripped, capped length.
fn clean_name(raw: &str) -> String {
    let line = raw.lines().next().unwrap_or("").trim();
    let line = line.trim_matches(|c| c == '"' || c == '\'');
    let mut name: String = line.chars().take(NAME_MAX_CHARS).collect();
    if line.chars().count() > NAME_MAX_CHARS {
        name.push('…');
    }
    name.trim().to_string()
}
