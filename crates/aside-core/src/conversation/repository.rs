//! Conversation repository trait.
//!
//! Defines the interface for conversation persistence operations.

use super::model::{Conversation, StoredConversation};
use crate::error::Result;
use async_trait::async_trait;

/// An abstract repository for managing conversation persistence.
///
/// This trait defines the contract for persisting and retrieving
/// conversations, decoupling the service's core logic from the specific
/// storage mechanism (e.g., TOML files, database, remote store).
///
/// # Implementation Notes
///
/// Implementations should handle concurrent access if needed. Only durable
/// data crosses this boundary: turn history and metadata, never in-flight
/// request state.
#[async_trait]
pub trait ConversationRepository: Send + Sync {
    /// Finds a stored conversation by its ID.
    ///
    /// # Returns
    ///
    /// - `Ok(Some(stored))`: Conversation found
    /// - `Ok(None)`: Conversation not found
    /// - `Err(_)`: Error occurred during retrieval
    async fn find_by_id(&self, conversation_id: &str) -> Result<Option<StoredConversation>>;

    /// Saves a conversation (metadata + history) to storage.
    async fn save(&self, stored: &StoredConversation) -> Result<()>;

    /// Deletes a conversation from storage.
    ///
    /// Deleting a conversation that does not exist is not an error.
    async fn delete(&self, conversation_id: &str) -> Result<()>;

    /// Lists metadata for all stored conversations.
    async fn list_all(&self) -> Result<Vec<Conversation>>;
}
