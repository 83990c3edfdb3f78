//! Model catalog: immutable-per-update table of available models.
//!
//! The catalog is read by many sessions concurrently and written only by
//! its refresh routine. Updates replace the whole table atomically
//! (copy-on-write), so concurrent readers never observe a half-updated
//! catalog.

use super::model::{AccessTier, HostedModel, Model, ModelCategory};
use crate::premium::PremiumStatus;
use std::sync::{Arc, RwLock};

/// Pure lookup structure over the available models.
pub struct ModelCatalog {
    table: RwLock<Arc<Vec<Model>>>,
}

impl ModelCatalog {
    /// Creates a catalog over the given models.
    pub fn new(models: Vec<Model>) -> Self {
        Self {
            table: RwLock::new(Arc::new(models)),
        }
    }

    /// Creates a catalog seeded with the built-in hosted models.
    pub fn with_defaults() -> Self {
        Self::new(default_models())
    }

    /// Replaces the whole table atomically.
    ///
    /// Readers holding the previous snapshot keep a consistent view; new
    /// reads observe the new table.
    pub fn replace_all(&self, models: Vec<Model>) {
        let mut table = self.table.write().expect("model catalog lock poisoned");
        *table = Arc::new(models);
    }

    /// Returns the current table snapshot.
    pub fn snapshot(&self) -> Arc<Vec<Model>> {
        self.table.read().expect("model catalog lock poisoned").clone()
    }

    /// Looks up a model by its process-wide key.
    pub fn get(&self, key: &str) -> Option<Model> {
        self.snapshot().iter().find(|m| m.key() == key).cloned()
    }

    /// Returns the ordered list of models usable under the given
    /// entitlement status.
    pub fn resolve_accessible(&self, status: PremiumStatus) -> Vec<Model> {
        self.snapshot()
            .iter()
            .filter(|m| m.accessible_with(status))
            .cloned()
            .collect()
    }

    /// The key of the default model: the first basic-tier chat model.
    pub fn default_model_key(&self) -> Option<String> {
        self.snapshot()
            .iter()
            .find(|m| m.access() != AccessTier::Premium)
            .map(|m| m.key().to_string())
    }
}

/// The built-in hosted model table.
fn default_models() -> Vec<Model> {
    vec![
        Model::Hosted(HostedModel {
            key: "chat-basic".to_string(),
            display_name: "Swift".to_string(),
            maker: "Aside".to_string(),
            engine: "completion-v1".to_string(),
            category: ModelCategory::Chat,
            access: AccessTier::Basic,
            max_page_content_length: 9_000,
            long_conversation_warning_character_limit: 20_000,
        }),
        Model::Hosted(HostedModel {
            key: "chat-standard".to_string(),
            display_name: "Steady".to_string(),
            maker: "Aside".to_string(),
            engine: "completion-v1".to_string(),
            category: ModelCategory::Chat,
            access: AccessTier::BasicAndPremium,
            max_page_content_length: 9_000,
            long_conversation_warning_character_limit: 20_000,
        }),
        Model::Hosted(HostedModel {
            key: "chat-expanse".to_string(),
            display_name: "Expanse".to_string(),
            maker: "Aside".to_string(),
            engine: "completion-v1".to_string(),
            category: ModelCategory::Chat,
            access: AccessTier::Premium,
            max_page_content_length: 60_000,
            long_conversation_warning_character_limit: 80_000,
        }),
    ]
}
