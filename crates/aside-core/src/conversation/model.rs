//! Conversation domain model.
//!
//! This module contains the core Conversation entity and the persistence
//! unit combining it with its turn history.

use super::turn::ConversationTurn;
use serde::{Deserialize, Serialize};

/// Metadata for one conversation, as listed by the registry.
///
/// This is the "pure" domain model that business logic operates on,
/// independent of any specific storage format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    /// Unique conversation identifier (UUID format)
    pub id: String,
    /// Human-readable conversation title
    pub title: String,
    /// Whether any page content has been associated with this conversation
    #[serde(default)]
    pub has_content: bool,
    /// Hidden conversations are excluded from visible listings
    #[serde(default)]
    pub is_hidden: bool,
    /// Timestamp when the conversation was created (ISO 8601 format)
    pub created_at: String,
    /// Timestamp when the conversation was last updated (ISO 8601 format)
    pub updated_at: String,
}

impl Conversation {
    /// Creates a fresh conversation with a generated id and a default title.
    pub fn new() -> Self {
        let id = uuid::Uuid::new_v4().to_string();
        let now = chrono::Utc::now().to_rfc3339();
        let title = format!("Conversation {}", &id[..8]);
        Self {
            id,
            title,
            has_content: false,
            is_hidden: false,
            created_at: now.clone(),
            updated_at: now,
        }
    }

    /// Bumps the updated-at timestamp to now.
    pub fn touch(&mut self) {
        self.updated_at = chrono::Utc::now().to_rfc3339();
    }
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new()
    }
}

/// The unit persisted by the conversation repository: metadata plus turn
/// history.
///
/// Runtime-only session state (error kind, in-flight flag) is deliberately
/// absent; a restored session always starts idle with no pending request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredConversation {
    /// Conversation metadata.
    pub conversation: Conversation,
    /// Ordered turn history (insertion order = chat order).
    #[serde(default)]
    pub turns: Vec<ConversationTurn>,
}

impl StoredConversation {
    /// Wraps fresh metadata with an empty history.
    pub fn new(conversation: Conversation) -> Self {
        Self {
            conversation,
            turns: Vec::new(),
        }
    }
}
