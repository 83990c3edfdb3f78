//! Top-level directory of conversations.
//!
//! The registry owns conversation metadata, the premium status cache, and
//! the action-menu definitions, and creates/binds conversation sessions on
//! demand. Binding is idempotent: rebinding the same identifier returns
//! the same live session, never a duplicate. Read-only metadata queries
//! never instantiate a session.

use crate::observer::{ObserverHub, ObserverId, ServiceNotification};
use crate::premium_cache::PremiumCache;
use crate::session::{ConversationSession, SessionServices};
use aside_core::action_menu::{ActionGroup, default_action_menu};
use aside_core::config::AsideConfig;
use aside_core::conversation::{Conversation, ConversationRepository, StoredConversation};
use aside_core::error::{AsideError, Result};
use aside_core::model::ModelCatalog;
use aside_core::premium::PremiumStatus;
use aside_interaction::{CompletionEngine, FeedbackClient, PremiumClient, PremiumSnapshot};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{Mutex, RwLock, mpsc};

/// Manages conversations and their live sessions.
///
/// `ConversationRegistry` is responsible for:
/// - Listing visible conversation metadata
/// - Creating new conversations
/// - Binding (get-or-create) live sessions
/// - Renaming and deleting conversations
/// - Caching the premium entitlement status
/// - Serving the static quick-action menu
pub struct ConversationRegistry {
    /// Live sessions keyed by conversation id
    sessions: RwLock<HashMap<String, Arc<ConversationSession>>>,
    /// Persistent storage backend for conversation data
    repository: Arc<dyn ConversationRepository>,
    engine: Arc<dyn CompletionEngine>,
    feedback: Arc<dyn FeedbackClient>,
    catalog: Arc<ModelCatalog>,
    premium: Arc<PremiumCache>,
    observers: ObserverHub<ServiceNotification>,
    config: AsideConfig,
    agreement_accepted: AtomicBool,
    premium_prompt_dismissed: AtomicBool,
    default_conversation_id: Mutex<Option<String>>,
}

impl ConversationRegistry {
    /// Creates a new registry over the given collaborators.
    pub fn new(
        repository: Arc<dyn ConversationRepository>,
        engine: Arc<dyn CompletionEngine>,
        feedback: Arc<dyn FeedbackClient>,
        premium_client: Arc<dyn PremiumClient>,
        config: AsideConfig,
    ) -> Self {
        let premium = Arc::new(PremiumCache::new(premium_client, config.premium_cache_ttl()));
        Self {
            sessions: RwLock::new(HashMap::new()),
            repository,
            engine,
            feedback,
            catalog: Arc::new(ModelCatalog::with_defaults()),
            premium,
            observers: ObserverHub::new(),
            config,
            agreement_accepted: AtomicBool::new(false),
            premium_prompt_dismissed: AtomicBool::new(false),
            default_conversation_id: Mutex::new(None),
        }
    }

    fn session_services(&self) -> SessionServices {
        SessionServices {
            engine: self.engine.clone(),
            feedback: self.feedback.clone(),
            repository: self.repository.clone(),
            catalog: self.catalog.clone(),
            premium: self.premium.clone(),
            engine_timeout: self.config.engine_timeout(),
        }
    }

    /// Binds a service-level observer (list/agreement/default-conversation
    /// events).
    pub fn subscribe(&self) -> (ObserverId, mpsc::UnboundedReceiver<ServiceNotification>) {
        self.observers.subscribe()
    }

    /// Unbinds a service-level observer.
    pub fn unsubscribe(&self, id: ObserverId) {
        self.observers.unsubscribe(id);
    }

    /// Returns the shared model catalog.
    pub fn catalog(&self) -> &Arc<ModelCatalog> {
        &self.catalog
    }

    // ========================================================================
    // Metadata queries
    // ========================================================================

    /// Lists metadata for all visible conversations, most recently updated
    /// first.
    ///
    /// Never creates a session and never touches the premium cache.
    pub async fn list_visible_conversations(&self) -> Result<Vec<Conversation>> {
        let conversations = self.repository.list_all().await?;
        Ok(conversations.into_iter().filter(|c| !c.is_hidden).collect())
    }

    /// Returns the static grouped quick-action menu.
    pub fn get_action_menu(&self) -> &'static [ActionGroup] {
        default_action_menu()
    }

    // ========================================================================
    // Session lifecycle
    // ========================================================================

    /// Creates a new conversation and returns its live session.
    pub async fn new_conversation(&self) -> Result<Arc<ConversationSession>> {
        let conversation = Conversation::new();
        let stored = StoredConversation::new(conversation);
        self.repository.save(&stored).await?;

        let session = ConversationSession::from_stored(stored, self.session_services());

        let mut sessions = self.sessions.write().await;
        sessions.insert(session.conversation_id().to_string(), session.clone());
        drop(sessions);

        self.observers
            .notify(ServiceNotification::ConversationListChanged);
        Ok(session)
    }

    /// Returns the live session for a conversation, creating it on demand.
    ///
    /// If the conversation exists in storage it is restored; otherwise a
    /// fresh conversation is created under the given identifier. Rebinding
    /// an already-live identifier returns the same session.
    pub async fn bind(&self, conversation_id: &str) -> Result<Arc<ConversationSession>> {
        {
            let sessions = self.sessions.read().await;
            if let Some(session) = sessions.get(conversation_id) {
                return Ok(session.clone());
            }
        }

        let stored = match self.repository.find_by_id(conversation_id).await? {
            Some(stored) => stored,
            None => {
                let mut conversation = Conversation::new();
                conversation.id = conversation_id.to_string();
                let stored = StoredConversation::new(conversation);
                self.repository.save(&stored).await?;
                self.observers
                    .notify(ServiceNotification::ConversationListChanged);
                stored
            }
        };

        let mut sessions = self.sessions.write().await;
        // A concurrent bind may have won the race; keep the first session.
        if let Some(session) = sessions.get(conversation_id) {
            return Ok(session.clone());
        }

        let session = ConversationSession::from_stored(stored, self.session_services());
        sessions.insert(conversation_id.to_string(), session.clone());
        Ok(session)
    }

    /// Deletes a conversation from both memory and storage.
    pub async fn delete_conversation(&self, conversation_id: &str) -> Result<()> {
        {
            let mut sessions = self.sessions.write().await;
            sessions.remove(conversation_id);
        }

        self.repository.delete(conversation_id).await?;

        let mut default_id = self.default_conversation_id.lock().await;
        if default_id.as_deref() == Some(conversation_id) {
            *default_id = None;
        }
        drop(default_id);

        self.observers
            .notify(ServiceNotification::ConversationListChanged);
        Ok(())
    }

    /// Renames a conversation by updating its title.
    ///
    /// # Errors
    ///
    /// Returns an error if the conversation doesn't exist or cannot be
    /// saved.
    pub async fn rename_conversation(&self, conversation_id: &str, new_title: String) -> Result<()> {
        let live = {
            let sessions = self.sessions.read().await;
            sessions.get(conversation_id).cloned()
        };

        if let Some(session) = live {
            session.set_title(new_title).await;
        } else {
            let mut stored = self
                .repository
                .find_by_id(conversation_id)
                .await?
                .ok_or_else(|| AsideError::not_found("Conversation", conversation_id))?;
            stored.conversation.title = new_title;
            stored.conversation.touch();
            self.repository.save(&stored).await?;
        }

        self.observers
            .notify(ServiceNotification::ConversationListChanged);
        Ok(())
    }

    // ========================================================================
    // Premium status
    // ========================================================================

    /// Returns the cached premium status, refreshing it past the TTL.
    pub async fn get_premium_status(&self) -> PremiumSnapshot {
        self.premium.get_or_refresh().await
    }

    /// Whether the premium upsell prompt may currently be shown.
    pub async fn get_can_show_premium_prompt(&self) -> bool {
        if self.premium_prompt_dismissed.load(Ordering::Relaxed) {
            return false;
        }
        self.premium.cached().status != PremiumStatus::Active
    }

    /// Dismisses the premium upsell prompt for this profile.
    pub fn dismiss_premium_prompt(&self) {
        self.premium_prompt_dismissed.store(true, Ordering::Relaxed);
    }

    // ========================================================================
    // Host flags
    // ========================================================================

    /// Marks the usage agreement as accepted.
    pub fn mark_agreement_accepted(&self) {
        self.agreement_accepted.store(true, Ordering::Relaxed);
        self.observers.notify(ServiceNotification::AgreementAccepted);
    }

    /// Whether the usage agreement has been accepted.
    pub fn is_agreement_accepted(&self) -> bool {
        self.agreement_accepted.load(Ordering::Relaxed)
    }

    /// Sets the host-UI default conversation.
    pub async fn set_default_conversation(&self, conversation_id: impl Into<String>) {
        let conversation_id = conversation_id.into();
        {
            let mut default_id = self.default_conversation_id.lock().await;
            *default_id = Some(conversation_id.clone());
        }
        self.observers
            .notify(ServiceNotification::DefaultConversationChanged { conversation_id });
    }

    /// Returns the host-UI default conversation, if set.
    pub async fn default_conversation_id(&self) -> Option<String> {
        self.default_conversation_id.lock().await.clone()
    }
}
