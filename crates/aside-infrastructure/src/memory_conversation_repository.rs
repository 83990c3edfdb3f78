//! In-memory ConversationRepository implementation.
//!
//! Default store for hosts that keep conversations for the lifetime of the
//! process only; also the storage used by the service-layer tests.

use aside_core::conversation::{Conversation, ConversationRepository, StoredConversation};
use aside_core::error::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Process-local conversation store.
#[derive(Default)]
pub struct MemoryConversationRepository {
    conversations: RwLock<HashMap<String, StoredConversation>>,
}

impl MemoryConversationRepository {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConversationRepository for MemoryConversationRepository {
    async fn find_by_id(&self, conversation_id: &str) -> Result<Option<StoredConversation>> {
        let conversations = self.conversations.read().await;
        Ok(conversations.get(conversation_id).cloned())
    }

    async fn save(&self, stored: &StoredConversation) -> Result<()> {
        let mut conversations = self.conversations.write().await;
        conversations.insert(stored.conversation.id.clone(), stored.clone());
        Ok(())
    }

    async fn delete(&self, conversation_id: &str) -> Result<()> {
        let mut conversations = self.conversations.write().await;
        conversations.remove(conversation_id);
        Ok(())
    }

    async fn list_all(&self) -> Result<Vec<Conversation>> {
        let conversations = self.conversations.read().await;
        let mut listed: Vec<Conversation> = conversations
            .values()
            .map(|stored| stored.conversation.clone())
            .collect();
        listed.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(listed)
    }
}
