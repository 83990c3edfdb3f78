//! TOML-file-backed ConversationRepository implementation.
//!
//! Stores one TOML file per conversation under a `conversations/`
//! directory. Fully async I/O via tokio::fs.

use aside_core::conversation::{Conversation, ConversationRepository, StoredConversation};
use aside_core::error::{AsideError, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;

/// TOML-file-per-conversation repository.
///
/// Directory structure:
/// ```text
/// base_dir/
/// └── conversations/
///     ├── conversation-id-1.toml
///     └── conversation-id-2.toml
/// ```
pub struct TomlConversationRepository {
    conversations_dir: PathBuf,
}

impl TomlConversationRepository {
    /// Creates a repository at the default location (~/.config/aside).
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration directory cannot be determined
    /// or the directory structure cannot be created.
    pub async fn default_location() -> Result<Self> {
        let base_dir = crate::paths::AsidePaths::config_dir()
            .map_err(|e| AsideError::config(format!("Failed to get config directory: {}", e)))?;
        Self::new(base_dir).await
    }

    /// Creates a new repository rooted at `base_dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if directory creation fails.
    pub async fn new(base_dir: impl AsRef<Path>) -> Result<Self> {
        let conversations_dir = base_dir.as_ref().join("conversations");
        fs::create_dir_all(&conversations_dir).await?;
        Ok(Self { conversations_dir })
    }

    /// Returns the directory conversation files are stored in.
    pub fn conversations_dir(&self) -> &Path {
        &self.conversations_dir
    }

    fn file_path(&self, conversation_id: &str) -> PathBuf {
        self.conversations_dir.join(format!("{conversation_id}.toml"))
    }
}

#[async_trait]
impl ConversationRepository for TomlConversationRepository {
    async fn find_by_id(&self, conversation_id: &str) -> Result<Option<StoredConversation>> {
        let path = self.file_path(conversation_id);
        match fs::read_to_string(&path).await {
            Ok(content) => {
                let stored: StoredConversation = toml::from_str(&content)?;
                Ok(Some(stored))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, stored: &StoredConversation) -> Result<()> {
        let path = self.file_path(&stored.conversation.id);
        let content = toml::to_string_pretty(stored)?;

        // Write to a temp file first so a crash never leaves a torn record.
        let tmp_path = path.with_extension("toml.tmp");
        fs::write(&tmp_path, content).await?;
        fs::rename(&tmp_path, &path).await?;

        tracing::debug!(
            "Saved conversation {} to {}",
            stored.conversation.id,
            path.display()
        );
        Ok(())
    }

    async fn delete(&self, conversation_id: &str) -> Result<()> {
        let path = self.file_path(conversation_id);
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn list_all(&self) -> Result<Vec<Conversation>> {
        let mut conversations = Vec::new();
        let mut entries = fs::read_dir(&self.conversations_dir).await?;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("toml") {
                continue;
            }

            let content = fs::read_to_string(&path).await?;
            match toml::from_str::<StoredConversation>(&content) {
                Ok(stored) => conversations.push(stored.conversation),
                Err(e) => {
                    // One unreadable file must not hide every other conversation.
                    tracing::warn!("Skipping unreadable conversation {}: {}", path.display(), e);
                }
            }
        }

        conversations.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(conversations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aside_core::conversation::{ActionType, ConversationTurn};

    async fn repository() -> (TomlConversationRepository, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let repo = TomlConversationRepository::new(dir.path()).await.unwrap();
        (repo, dir)
    }

    #[tokio::test]
    async fn test_save_and_find_round_trip() {
        let (repo, _dir) = repository().await;

        let mut stored = StoredConversation::new(Conversation::new());
        stored.turns.push(ConversationTurn::human("hello", ActionType::Query));
        let mut assistant = ConversationTurn::assistant_placeholder(ActionType::Query);
        assistant.push_event(aside_core::conversation::TurnEvent::Completion {
            text: "hi there".to_string(),
        });
        stored.turns.push(assistant);

        repo.save(&stored).await.unwrap();

        let found = repo
            .find_by_id(&stored.conversation.id)
            .await
            .unwrap()
            .expect("conversation should exist");
        assert_eq!(found, stored);
    }

    #[tokio::test]
    async fn test_find_missing_returns_none() {
        let (repo, _dir) = repository().await;
        assert!(repo.find_by_id("no-such-id").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let (repo, _dir) = repository().await;

        let stored = StoredConversation::new(Conversation::new());
        repo.save(&stored).await.unwrap();

        repo.delete(&stored.conversation.id).await.unwrap();
        assert!(repo.find_by_id(&stored.conversation.id).await.unwrap().is_none());

        // Deleting again is not an error.
        repo.delete(&stored.conversation.id).await.unwrap();
    }

    #[tokio::test]
    async fn test_list_all_sorted_by_updated_at() {
        let (repo, _dir) = repository().await;

        let mut older = StoredConversation::new(Conversation::new());
        older.conversation.updated_at = "2026-01-01T00:00:00Z".to_string();
        let mut newer = StoredConversation::new(Conversation::new());
        newer.conversation.updated_at = "2026-02-01T00:00:00Z".to_string();

        repo.save(&older).await.unwrap();
        repo.save(&newer).await.unwrap();

        let listed = repo.list_all().await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, newer.conversation.id);
        assert_eq!(listed[1].id, older.conversation.id);
    }
}
