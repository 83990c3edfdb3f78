//! The per-conversation session state machine.
//!
//! A session owns the turn history, the streaming event buffer, the
//! in-flight request lifecycle, and the error state for one conversation.
//! All mutating operations on one session are serialized through its inner
//! write lock; read queries are served concurrently; different sessions are
//! fully independent.
//!
//! Cancellation is implicit: a new submission while a request is in flight
//! cancels the outstanding cycle. Every cycle carries a generation number,
//! and events tagged with a stale generation are dropped, so a
//! late-arriving response from a superseded cycle can never leak into the
//! new turn (cancel wins).

use crate::content::ContentAssociationTracker;
use crate::observer::{ObserverHub, ObserverId, SessionNotification};
use crate::premium_cache::PremiumCache;
use crate::suggestion::SuggestionState;
use aside_core::conversation::{
    ActionType, CharacterRole, Conversation, ConversationRepository, ConversationTurn,
    StoredConversation, TurnVisibility,
};
use aside_core::error::{ApiErrorKind, AsideError, Result};
use aside_core::model::{Model, ModelCatalog};
use aside_core::site_info::SiteInfo;
use aside_core::suggestion::SuggestionStatus;
use aside_interaction::{
    CompletionEngine, CompletionRequest, EngineError, EngineMessage, FeedbackClient,
    FeedbackPayload, RatingPayload,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{RwLock, mpsc};
use tokio_util::sync::CancellationToken;

/// The session's externally visible state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No request in flight, no error recorded.
    Idle,
    /// A completion request is in flight.
    AwaitingResponse,
    /// The last request failed with the recorded kind.
    Error(ApiErrorKind),
}

/// Shared collaborators a session needs to operate.
#[derive(Clone)]
pub struct SessionServices {
    /// The remote completion engine.
    pub engine: Arc<dyn CompletionEngine>,
    /// The feedback side-channel.
    pub feedback: Arc<dyn FeedbackClient>,
    /// Durable conversation storage.
    pub repository: Arc<dyn ConversationRepository>,
    /// The shared model table.
    pub catalog: Arc<ModelCatalog>,
    /// The shared premium status cache.
    pub premium: Arc<PremiumCache>,
    /// Deadline for each awaited engine event.
    pub engine_timeout: Duration,
}

struct SessionInner {
    conversation: Conversation,
    turns: Vec<ConversationTurn>,
    state: SessionState,
    current_model_key: String,
    should_send_page_contents: bool,
    content: ContentAssociationTracker,
    suggestions: SuggestionState,
    /// Submission-cycle counter; events from older generations are stale.
    generation: u64,
    cancel: Option<CancellationToken>,
    /// Index of the assistant turn currently receiving events.
    active_turn: Option<usize>,
}

/// The live, mutable state machine for one conversation.
pub struct ConversationSession {
    conversation_id: String,
    services: SessionServices,
    observers: Arc<ObserverHub<SessionNotification>>,
    inner: Arc<RwLock<SessionInner>>,
}

impl ConversationSession {
    /// Creates a session for a fresh conversation with empty history.
    pub fn new(conversation: Conversation, services: SessionServices) -> Arc<Self> {
        Self::from_stored(StoredConversation::new(conversation), services)
    }

    /// Restores a session from persisted data.
    ///
    /// Error state and the in-flight flag are never persisted: a restored
    /// session always starts `Idle` with no pending request.
    pub fn from_stored(stored: StoredConversation, services: SessionServices) -> Arc<Self> {
        let current_model_key = services.catalog.default_model_key().unwrap_or_default();
        let conversation_id = stored.conversation.id.clone();

        Arc::new(Self {
            conversation_id,
            observers: Arc::new(ObserverHub::new()),
            inner: Arc::new(RwLock::new(SessionInner {
                conversation: stored.conversation,
                turns: stored.turns,
                state: SessionState::Idle,
                current_model_key,
                should_send_page_contents: false,
                content: ContentAssociationTracker::new(),
                suggestions: SuggestionState::new(),
                generation: 0,
                cancel: None,
                active_turn: None,
            })),
            services,
        })
    }

    // ========================================================================
    // Observer binding
    // ========================================================================

    /// Binds an observer to this session's notification stream.
    pub fn subscribe(&self) -> (ObserverId, mpsc::UnboundedReceiver<SessionNotification>) {
        self.observers.subscribe()
    }

    /// Unbinds an observer.
    pub fn unsubscribe(&self, id: ObserverId) {
        self.observers.unsubscribe(id);
    }

    // ========================================================================
    // Read surface
    // ========================================================================

    /// Returns the conversation identifier.
    pub fn conversation_id(&self) -> &str {
        &self.conversation_id
    }

    /// Returns the current state.
    pub async fn state(&self) -> SessionState {
        self.inner.read().await.state
    }

    /// Whether a completion request is in flight.
    pub async fn is_request_in_progress(&self) -> bool {
        self.inner.read().await.state == SessionState::AwaitingResponse
    }

    /// Returns the recorded error kind, if any.
    pub async fn api_response_error(&self) -> Option<ApiErrorKind> {
        match self.inner.read().await.state {
            SessionState::Error(kind) => Some(kind),
            _ => None,
        }
    }

    /// Returns the visible turn history in chat order.
    pub async fn history(&self) -> Vec<ConversationTurn> {
        self.inner
            .read()
            .await
            .turns
            .iter()
            .filter(|t| t.is_visible())
            .cloned()
            .collect()
    }

    /// Returns the full turn history including hidden turns.
    pub async fn full_history(&self) -> Vec<ConversationTurn> {
        self.inner.read().await.turns.clone()
    }

    /// Returns the conversation metadata snapshot.
    pub async fn conversation(&self) -> Conversation {
        self.inner.read().await.conversation.clone()
    }

    /// Returns the models usable under the cached entitlement status.
    pub fn models(&self) -> Vec<Model> {
        let status = self.services.premium.cached().status;
        self.services.catalog.resolve_accessible(status)
    }

    /// Returns the key of the currently selected model.
    pub async fn current_model_key(&self) -> String {
        self.inner.read().await.current_model_key.clone()
    }

    /// Returns the associated page context, if any.
    pub async fn associated_content_info(&self) -> Option<SiteInfo> {
        self.inner.read().await.content.site_info().cloned()
    }

    /// Whether page contents are attached to the next submission.
    pub async fn should_send_page_contents(&self) -> bool {
        self.inner.read().await.should_send_page_contents
    }

    /// Returns the generated follow-up questions and the generation status.
    pub async fn suggested_questions(&self) -> (Vec<String>, SuggestionStatus) {
        let inner = self.inner.read().await;
        (
            inner.suggestions.questions().to_vec(),
            inner.suggestions.status(),
        )
    }

    // ========================================================================
    // Mutations
    // ========================================================================

    /// Submits a human entry, starting a new completion cycle.
    ///
    /// Always succeeds locally once the text passes validation; transport
    /// failures surface asynchronously as the session's error state. A
    /// submission while a request is in flight cancels the outstanding
    /// cycle (cancel wins).
    ///
    /// # Errors
    ///
    /// Returns an error if `text` is empty or whitespace-only.
    pub async fn submit_human_entry(&self, text: impl Into<String>, action: ActionType) -> Result<()> {
        self.submit_entry_internal(text.into(), action, None).await
    }

    /// Submits a human entry carrying the verbatim selection text that
    /// triggered it (context-menu actions).
    pub async fn submit_human_entry_with_selection(
        &self,
        text: impl Into<String>,
        action: ActionType,
        selected_text: impl Into<String>,
    ) -> Result<()> {
        self.submit_entry_internal(text.into(), action, Some(selected_text.into()))
            .await
    }

    /// Submits the fixed page-summarization request.
    pub async fn submit_summarization_request(&self) -> Result<()> {
        self.submit_entry_internal(
            "Summarize this page".to_string(),
            ActionType::SummarizePage,
            None,
        )
        .await
    }

    async fn submit_entry_internal(
        &self,
        text: String,
        action: ActionType,
        selected_text: Option<String>,
    ) -> Result<()> {
        if text.trim().is_empty() {
            return Err(AsideError::invalid_input("entry text must be non-empty"));
        }

        let mut turn = ConversationTurn::human(text, action);
        if let Some(selected) = selected_text {
            turn = turn.with_selected_text(selected);
        }

        self.start_cycle(Some(turn)).await;
        Ok(())
    }

    /// Appends an edit revision to an existing turn.
    ///
    /// The original text is preserved; the new revision becomes current for
    /// display and resubmission. Does not trigger an engine call by itself.
    ///
    /// # Errors
    ///
    /// Returns an error if the index does not reference an existing visible
    /// turn, or if the new text is empty.
    pub async fn modify_conversation(&self, turn_index: usize, new_text: impl Into<String>) -> Result<()> {
        let new_text = new_text.into();
        if new_text.trim().is_empty() {
            return Err(AsideError::invalid_input("edit text must be non-empty"));
        }

        {
            let mut inner = self.inner.write().await;
            let turn = inner
                .turns
                .get_mut(turn_index)
                .ok_or_else(|| AsideError::invalid_input(format!("no turn at index {turn_index}")))?;
            if !turn.is_visible() {
                return Err(AsideError::invalid_input(format!(
                    "turn at index {turn_index} is hidden"
                )));
            }
            turn.push_edit(new_text);
            inner.conversation.touch();
        }

        self.observers.notify(SessionNotification::HistoryUpdated);
        self.persist().await;
        Ok(())
    }

    /// Selects a different model for subsequent submissions.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is unknown, or if the model's access
    /// tier exceeds the caller's cached entitlement status. The rejection
    /// is synchronous; it never enters the error state.
    pub async fn change_model(&self, model_key: &str) -> Result<()> {
        let model = self
            .services
            .catalog
            .get(model_key)
            .ok_or_else(|| AsideError::not_found("Model", model_key))?;

        let status = self.services.premium.cached().status;
        if !model.accessible_with(status) {
            return Err(AsideError::entitlement_denied(model_key));
        }

        {
            let mut inner = self.inner.write().await;
            inner.current_model_key = model_key.to_string();
        }

        self.observers.notify(SessionNotification::ModelDataChanged {
            model_key: model_key.to_string(),
        });
        Ok(())
    }

    /// Flips whether page contents are attached to submissions.
    ///
    /// Takes effect on the next submission, never retroactively.
    pub async fn set_should_send_page_contents(&self, should_send: bool) {
        let mut inner = self.inner.write().await;
        inner.should_send_page_contents = should_send;
    }

    /// Retries the failed submission.
    ///
    /// Reuses the exact current text of the last human turn; no duplicate
    /// human turn is inserted.
    ///
    /// # Errors
    ///
    /// Returns an error unless the session is in an error state, or if
    /// there is no human turn to resubmit.
    pub async fn retry(&self) -> Result<()> {
        {
            let inner = self.inner.read().await;
            if !matches!(inner.state, SessionState::Error(_)) {
                return Err(AsideError::invalid_state("retry is only valid from an error state"));
            }
            if !inner
                .turns
                .iter()
                .any(|t| t.role == CharacterRole::Human && t.is_visible())
            {
                return Err(AsideError::invalid_state("no human turn to retry"));
            }
        }

        self.start_cycle(None).await;
        Ok(())
    }

    /// Clears the error state and detaches the failed human turn so the
    /// caller can offer it back for editing.
    ///
    /// The trailing human turn (and any frozen partial response after it)
    /// is removed from history and returned; no user input is ever
    /// silently lost.
    ///
    /// # Errors
    ///
    /// Returns an error unless the session is in an error state.
    pub async fn clear_error_and_get_failed_message(&self) -> Result<ConversationTurn> {
        let failed = {
            let mut inner = self.inner.write().await;
            if !matches!(inner.state, SessionState::Error(_)) {
                return Err(AsideError::invalid_state(
                    "clear_error_and_get_failed_message is only valid from an error state",
                ));
            }

            let index = inner
                .turns
                .iter()
                .rposition(|t| t.role == CharacterRole::Human && t.is_visible())
                .ok_or_else(|| AsideError::invalid_state("no failed human turn recorded"))?;

            let failed = inner.turns[index].clone();
            inner.turns.truncate(index);
            inner.state = SessionState::Idle;
            inner.conversation.touch();
            failed
        };

        self.observers
            .notify(SessionNotification::ResponseErrorChanged(None));
        self.observers.notify(SessionNotification::HistoryUpdated);
        self.persist().await;
        Ok(failed)
    }

    // ========================================================================
    // Side-channel annotations
    // ========================================================================

    /// Rates an assistant turn.
    ///
    /// Returns an opaque rating identifier for later correlation, or `None`
    /// on failure. Never affects the state machine.
    pub async fn rate_message(&self, turn_id: &str, is_liked: bool) -> Option<String> {
        let turn_text = {
            let inner = self.inner.read().await;
            let turn = inner.turns.iter().find(|t| t.id == turn_id)?;
            Some(turn.current_text().to_string())
        };

        let payload = RatingPayload {
            turn_id: turn_id.to_string(),
            is_liked,
            turn_text,
        };

        match self.services.feedback.rate_message(payload).await {
            Ok(rating_id) => Some(rating_id),
            Err(err) => {
                tracing::warn!("Failed to rate message {}: {}", turn_id, err);
                None
            }
        }
    }

    /// Sends free-form feedback, optionally correlated with a rating.
    ///
    /// Returns whether the feedback was delivered.
    pub async fn send_feedback(
        &self,
        category: impl Into<String>,
        feedback: impl Into<String>,
        rating_id: Option<String>,
    ) -> bool {
        let payload = FeedbackPayload {
            category: category.into(),
            feedback: feedback.into(),
            rating_id,
        };

        match self.services.feedback.send_feedback(payload).await {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!("Failed to send feedback: {}", err);
                false
            }
        }
    }

    // ========================================================================
    // Content association
    // ========================================================================

    /// Replaces the associated page context in whole.
    ///
    /// A meaningful change (new page, or content-used percentage reset)
    /// re-arms follow-up question generation.
    pub async fn set_associated_content(&self, site_info: SiteInfo, page_text: Option<String>) {
        let rearmed = {
            let mut inner = self.inner.write().await;
            let meaningful = inner.content.replace(site_info.clone(), page_text);
            inner.conversation.has_content = site_info.is_content_association_possible;
            if meaningful {
                let has_content = inner.content.can_attach_content();
                inner.suggestions.rearm(has_content);
                Some((
                    inner.suggestions.questions().to_vec(),
                    inner.suggestions.status(),
                ))
            } else {
                None
            }
        };

        self.observers
            .notify(SessionNotification::AssociatedContentChanged(site_info));
        if let Some((questions, status)) = rearmed {
            self.observers
                .notify(SessionNotification::SuggestedQuestionsChanged { questions, status });
        }
    }

    /// Forwards a favicon change from the host to bound observers.
    pub fn notify_favicon_changed(&self, url: impl Into<String>) {
        self.observers
            .notify(SessionNotification::FaviconChanged { url: url.into() });
    }

    // ========================================================================
    // Suggestions
    // ========================================================================

    /// Starts follow-up question generation (fire and forget).
    ///
    /// The result arrives via a `SuggestedQuestionsChanged` notification,
    /// not as a return value.
    ///
    /// # Errors
    ///
    /// Returns an error unless the suggestion status is `CanGenerate`.
    pub async fn generate_questions(&self) -> Result<()> {
        let page_text = {
            let mut inner = self.inner.write().await;
            inner.suggestions.begin_generating()?;
            inner.content.page_text().unwrap_or_default().to_string()
        };

        self.observers
            .notify(SessionNotification::SuggestedQuestionsChanged {
                questions: Vec::new(),
                status: SuggestionStatus::IsGenerating,
            });

        let engine = self.services.engine.clone();
        let inner = self.inner.clone();
        let observers = self.observers.clone();
        tokio::spawn(async move {
            let result = engine.generate_questions(&page_text).await;

            let (questions, status) = {
                let mut inner = inner.write().await;
                match result {
                    Ok(questions) => inner.suggestions.complete_generating(questions),
                    Err(err) => {
                        tracing::warn!("Question generation failed: {}", err);
                        inner.suggestions.fail_generating();
                    }
                }
                (
                    inner.suggestions.questions().to_vec(),
                    inner.suggestions.status(),
                )
            };

            observers.notify(SessionNotification::SuggestedQuestionsChanged { questions, status });
        });

        Ok(())
    }

    // ========================================================================
    // Cycle internals
    // ========================================================================

    /// Starts a new submission cycle.
    ///
    /// With `Some(turn)` this is a fresh submission; with `None` it is a
    /// retry reusing the last visible human turn. Any outstanding cycle is
    /// cancelled first and its partial turn discarded (when empty) or
    /// hidden (when it already streamed events).
    async fn start_cycle(&self, new_human: Option<ConversationTurn>) {
        let (request, generation, token, was_error) = {
            let mut inner = self.inner.write().await;

            // Cancel the outstanding cycle, if any. Cancel wins over any
            // completion racing in for the old generation.
            if let Some(token) = inner.cancel.take() {
                token.cancel();
            }
            if let Some(index) = inner.active_turn.take() {
                if inner.turns[index].events.is_empty() {
                    inner.turns.remove(index);
                } else {
                    inner.turns[index].visibility = TurnVisibility::Hidden;
                }
            }

            let was_error = matches!(inner.state, SessionState::Error(_));

            inner.generation += 1;
            let generation = inner.generation;

            if let Some(turn) = new_human {
                inner.turns.push(turn);
            }

            let request = build_request(&inner);
            let action = inner
                .turns
                .iter()
                .rev()
                .find(|t| t.role == CharacterRole::Human && t.is_visible())
                .map(|t| t.action)
                .unwrap_or(ActionType::Query);

            inner.turns.push(ConversationTurn::assistant_placeholder(action));
            inner.active_turn = Some(inner.turns.len() - 1);
            inner.state = SessionState::AwaitingResponse;

            let token = CancellationToken::new();
            inner.cancel = Some(token.clone());

            (request, generation, token, was_error)
        };

        if was_error {
            self.observers
                .notify(SessionNotification::ResponseErrorChanged(None));
        }
        self.observers.notify(SessionNotification::HistoryUpdated);
        self.observers
            .notify(SessionNotification::RequestInProgressChanged(true));

        tracing::debug!(
            "Dispatching completion cycle {} for conversation {}",
            generation,
            self.conversation_id
        );

        let ctx = CycleContext {
            inner: self.inner.clone(),
            observers: self.observers.clone(),
            repository: self.services.repository.clone(),
            timeout: self.services.engine_timeout,
            generation,
            token,
        };

        match self.services.engine.submit(request).await {
            Ok(events) => {
                tokio::spawn(drive_completion(ctx, events));
            }
            Err(err) => {
                // Dispatch failed before streaming: the submission itself
                // already succeeded locally, so this surfaces as the
                // asynchronous error state, not as a call failure.
                fail_cycle(&ctx, map_engine_error(&err)).await;
            }
        }
    }

    async fn persist(&self) {
        persist_inner(&self.inner, self.services.repository.as_ref()).await;
    }

    /// Updates the conversation title.
    pub(crate) async fn set_title(&self, title: impl Into<String>) {
        {
            let mut inner = self.inner.write().await;
            inner.conversation.title = title.into();
            inner.conversation.touch();
        }
        self.persist().await;
    }
}

/// Everything a completion-driving task needs, detached from the session.
struct CycleContext {
    inner: Arc<RwLock<SessionInner>>,
    observers: Arc<ObserverHub<SessionNotification>>,
    repository: Arc<dyn ConversationRepository>,
    timeout: Duration,
    generation: u64,
    token: CancellationToken,
}

fn build_request(inner: &SessionInner) -> CompletionRequest {
    let messages = inner
        .turns
        .iter()
        .filter(|t| t.is_visible())
        .map(|t| EngineMessage {
            role: t.role,
            content: t.current_text().to_string(),
        })
        .collect();

    let selected_text = inner
        .turns
        .iter()
        .rev()
        .find(|t| t.role == CharacterRole::Human && t.is_visible())
        .and_then(|t| t.selected_text.clone());

    let page_content = if inner.should_send_page_contents && inner.content.can_attach_content() {
        inner.content.page_text().map(str::to_string)
    } else {
        None
    };

    CompletionRequest {
        model_key: inner.current_model_key.clone(),
        messages,
        page_content,
        selected_text,
    }
}

/// Consumes one cycle's event stream, appending events to the active turn.
///
/// Exits silently when the cycle is cancelled or superseded; freezes the
/// turn and transitions the session on completion, failure, or timeout.
async fn drive_completion(ctx: CycleContext, mut events: aside_interaction::EngineEventStream) {
    loop {
        let next = tokio::select! {
            _ = ctx.token.cancelled() => return,
            next = tokio::time::timeout(ctx.timeout, events.recv()) => next,
        };

        match next {
            // Deadline lapsed with no event: never hang.
            Err(_elapsed) => {
                fail_cycle(&ctx, ApiErrorKind::ConnectionIssue).await;
                return;
            }
            // Stream closed cleanly: the cycle is complete.
            Ok(None) => {
                complete_cycle(&ctx).await;
                return;
            }
            Ok(Some(Ok(event))) => {
                {
                    let mut inner = ctx.inner.write().await;
                    if inner.generation != ctx.generation {
                        // Stale generation: a newer submission took over.
                        return;
                    }
                    if let Some(index) = inner.active_turn {
                        inner.turns[index].push_event(event);
                    }
                }
                ctx.observers.notify(SessionNotification::HistoryUpdated);
            }
            Ok(Some(Err(err))) => {
                fail_cycle(&ctx, map_engine_error(&err)).await;
                return;
            }
        }
    }
}

async fn complete_cycle(ctx: &CycleContext) {
    {
        let mut inner = ctx.inner.write().await;
        if inner.generation != ctx.generation {
            return;
        }
        inner.active_turn = None;
        inner.cancel = None;
        inner.state = SessionState::Idle;
        inner.conversation.touch();
    }

    ctx.observers
        .notify(SessionNotification::RequestInProgressChanged(false));
    ctx.observers.notify(SessionNotification::HistoryUpdated);
    persist_inner(&ctx.inner, ctx.repository.as_ref()).await;
}

async fn fail_cycle(ctx: &CycleContext, kind: ApiErrorKind) {
    {
        let mut inner = ctx.inner.write().await;
        if inner.generation != ctx.generation {
            return;
        }
        if let Some(index) = inner.active_turn.take() {
            // A placeholder that never streamed anything is dropped; a
            // partial turn stays frozen and visible.
            if inner.turns[index].events.is_empty() {
                inner.turns.remove(index);
            }
        }
        inner.cancel = None;
        inner.state = SessionState::Error(kind);
        inner.conversation.touch();
    }

    ctx.observers
        .notify(SessionNotification::RequestInProgressChanged(false));
    ctx.observers
        .notify(SessionNotification::ResponseErrorChanged(Some(kind)));
    ctx.observers.notify(SessionNotification::HistoryUpdated);
    persist_inner(&ctx.inner, ctx.repository.as_ref()).await;
}

async fn persist_inner(inner: &Arc<RwLock<SessionInner>>, repository: &dyn ConversationRepository) {
    let stored = {
        let inner = inner.read().await;
        StoredConversation {
            conversation: inner.conversation.clone(),
            turns: inner.turns.clone(),
        }
    };

    if let Err(err) = repository.save(&stored).await {
        tracing::warn!("Failed to persist conversation {}: {}", stored.conversation.id, err);
    }
}

fn map_engine_error(err: &EngineError) -> ApiErrorKind {
    match err {
        EngineError::RateLimited { .. } => ApiErrorKind::RateLimitReached,
        EngineError::ContextLimit => ApiErrorKind::ContextLimitReached,
        EngineError::Connection { .. }
        | EngineError::InvalidRequest(_)
        | EngineError::Other(_) => ApiErrorKind::ConnectionIssue,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aside_core::conversation::TurnEvent;
    use aside_core::premium::PremiumStatus;
    use aside_infrastructure::MemoryConversationRepository;
    use aside_interaction::{EngineEventStream, PremiumClient, PremiumSnapshot};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    fn completion(text: &str) -> Result2 {
        Ok(TurnEvent::Completion {
            text: text.to_string(),
        })
    }

    type Result2 = std::result::Result<TurnEvent, EngineError>;

    /// One scripted engine response per submission, consumed in order.
    enum MockScript {
        /// Send all items, then close the stream (completion).
        Reply(Vec<Result2>),
        /// Send the immediate items, then the delayed items (ms, item),
        /// then hold the stream open without closing it.
        StallAfter(Vec<Result2>, Vec<(u64, Result2)>),
        /// Refuse the submission before streaming starts.
        Refuse(EngineError),
    }

    struct MockEngine {
        scripts: Mutex<VecDeque<MockScript>>,
        requests: Mutex<Vec<CompletionRequest>>,
        questions: Mutex<std::result::Result<Vec<String>, EngineError>>,
    }

    impl MockEngine {
        fn new(scripts: Vec<MockScript>) -> Arc<Self> {
            Arc::new(Self {
                scripts: Mutex::new(scripts.into()),
                requests: Mutex::new(Vec::new()),
                questions: Mutex::new(Ok(vec![
                    "What are the three topics?".to_string(),
                    "Who is the author?".to_string(),
                ])),
            })
        }

        fn requests(&self) -> Vec<CompletionRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl CompletionEngine for MockEngine {
        fn name(&self) -> &str {
            "mock"
        }

        async fn submit(
            &self,
            request: CompletionRequest,
        ) -> std::result::Result<EngineEventStream, EngineError> {
            self.requests.lock().unwrap().push(request);
            let script = self
                .scripts
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(MockScript::Reply(Vec::new()));

            let (tx, rx) = mpsc::channel(64);
            match script {
                MockScript::Reply(items) => {
                    tokio::spawn(async move {
                        for item in items {
                            if tx.send(item).await.is_err() {
                                return;
                            }
                        }
                    });
                }
                MockScript::StallAfter(immediate, delayed) => {
                    tokio::spawn(async move {
                        for item in immediate {
                            if tx.send(item).await.is_err() {
                                return;
                            }
                        }
                        for (delay_ms, item) in delayed {
                            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                            if tx.send(item).await.is_err() {
                                return;
                            }
                        }
                        // Hold the stream open so the cycle never completes
                        // on its own.
                        tokio::time::sleep(Duration::from_secs(60)).await;
                    });
                }
                MockScript::Refuse(err) => return Err(err),
            }
            Ok(rx)
        }

        async fn generate_questions(
            &self,
            _page_content: &str,
        ) -> std::result::Result<Vec<String>, EngineError> {
            self.questions.lock().unwrap().clone()
        }
    }

    struct StaticPremiumClient(PremiumStatus);

    #[async_trait]
    impl PremiumClient for StaticPremiumClient {
        async fn fetch_status(&self) -> std::result::Result<PremiumSnapshot, EngineError> {
            Ok(PremiumSnapshot {
                status: self.0,
                info: None,
            })
        }
    }

    #[derive(Default)]
    struct MockFeedbackClient {
        fail: bool,
    }

    #[async_trait]
    impl FeedbackClient for MockFeedbackClient {
        async fn rate_message(
            &self,
            _payload: RatingPayload,
        ) -> std::result::Result<String, EngineError> {
            if self.fail {
                Err(EngineError::Other("feedback down".to_string()))
            } else {
                Ok("rating-123".to_string())
            }
        }

        async fn send_feedback(
            &self,
            _payload: FeedbackPayload,
        ) -> std::result::Result<(), EngineError> {
            if self.fail {
                Err(EngineError::Other("feedback down".to_string()))
            } else {
                Ok(())
            }
        }
    }

    async fn make_session_with(
        scripts: Vec<MockScript>,
        status: PremiumStatus,
        timeout: Duration,
    ) -> (Arc<ConversationSession>, Arc<MockEngine>, Arc<MemoryConversationRepository>) {
        let engine = MockEngine::new(scripts);
        let repository = Arc::new(MemoryConversationRepository::new());
        let premium = Arc::new(PremiumCache::new(
            Arc::new(StaticPremiumClient(status)),
            Duration::from_secs(300),
        ));
        premium.get_or_refresh().await;

        let services = SessionServices {
            engine: engine.clone(),
            feedback: Arc::new(MockFeedbackClient::default()),
            repository: repository.clone(),
            catalog: Arc::new(ModelCatalog::with_defaults()),
            premium,
            engine_timeout: timeout,
        };

        let session = ConversationSession::new(Conversation::new(), services);
        (session, engine, repository)
    }

    async fn make_session(
        scripts: Vec<MockScript>,
        status: PremiumStatus,
    ) -> (Arc<ConversationSession>, Arc<MockEngine>, Arc<MemoryConversationRepository>) {
        make_session_with(scripts, status, Duration::from_secs(2)).await
    }

    async fn wait_for_state(
        session: &ConversationSession,
        predicate: impl Fn(SessionState) -> bool,
    ) {
        for _ in 0..200 {
            if predicate(session.state().await) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("session never reached the expected state");
    }

    #[tokio::test]
    async fn test_summarization_streams_events_in_order() {
        let (session, _engine, _repo) = make_session(
            vec![MockScript::Reply(vec![
                completion("The page discusses"),
                completion(" three topics:"),
                completion(" A, B, C."),
            ])],
            PremiumStatus::Inactive,
        )
        .await;

        session.submit_summarization_request().await.unwrap();
        assert_eq!(session.state().await, SessionState::AwaitingResponse);

        wait_for_state(&session, |s| s == SessionState::Idle).await;

        let history = session.history().await;
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].role, CharacterRole::Human);
        assert_eq!(history[0].action, ActionType::SummarizePage);
        assert_eq!(history[0].text, "Summarize this page");
        assert_eq!(history[1].role, CharacterRole::Assistant);
        assert_eq!(history[1].text, "The page discusses three topics: A, B, C.");
        assert_eq!(history[1].events.len(), 3);
    }

    #[tokio::test]
    async fn test_empty_entry_is_rejected() {
        let (session, _engine, _repo) = make_session(vec![], PremiumStatus::Inactive).await;

        let err = session
            .submit_human_entry("   ", ActionType::Query)
            .await
            .unwrap_err();
        assert!(err.is_invalid_input());
        assert_eq!(session.state().await, SessionState::Idle);
        assert!(session.history().await.is_empty());
    }

    #[tokio::test]
    async fn test_resubmission_cancels_outstanding_cycle() {
        let (session, _engine, _repo) = make_session(
            vec![
                // First cycle streams one fragment, then a late fragment
                // that must never surface after cancellation.
                MockScript::StallAfter(
                    vec![completion("old answer")],
                    vec![(200, completion(" LATE"))],
                ),
                MockScript::Reply(vec![completion("new answer")]),
            ],
            PremiumStatus::Inactive,
        )
        .await;

        session
            .submit_human_entry("first question", ActionType::Query)
            .await
            .unwrap();

        // Let the first fragment land.
        tokio::time::sleep(Duration::from_millis(50)).await;

        session
            .submit_human_entry("second question", ActionType::Query)
            .await
            .unwrap();
        wait_for_state(&session, |s| s == SessionState::Idle).await;

        // Give the superseded cycle's late event a chance to (wrongly) land.
        tokio::time::sleep(Duration::from_millis(300)).await;

        let visible = session.history().await;
        assert_eq!(visible.len(), 3);
        assert_eq!(visible[0].text, "first question");
        assert_eq!(visible[1].text, "second question");
        assert_eq!(visible[2].text, "new answer");

        // The superseded partial is hidden, frozen, and free of stale events.
        let full = session.full_history().await;
        let hidden: Vec<_> = full.iter().filter(|t| !t.is_visible()).collect();
        assert_eq!(hidden.len(), 1);
        assert_eq!(hidden[0].text, "old answer");
        assert!(full.iter().all(|t| !t.text.contains("LATE")));
    }

    #[tokio::test]
    async fn test_rate_limit_mid_stream_freezes_partial_and_retry_recovers() {
        let (session, engine, _repo) = make_session(
            vec![
                MockScript::Reply(vec![
                    completion("partial answer"),
                    Err(EngineError::RateLimited { retry_after: None }),
                ]),
                MockScript::Reply(vec![completion("recovered answer")]),
            ],
            PremiumStatus::Inactive,
        )
        .await;

        session
            .submit_human_entry("hello engine", ActionType::Query)
            .await
            .unwrap();
        wait_for_state(&session, |s| s == SessionState::Error(ApiErrorKind::RateLimitReached)).await;

        // Partial events already appended remain frozen and visible.
        let history = session.history().await;
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].text, "partial answer");
        assert_eq!(
            session.api_response_error().await,
            Some(ApiErrorKind::RateLimitReached)
        );

        session.retry().await.unwrap();
        wait_for_state(&session, |s| s == SessionState::Idle).await;

        // Retry resubmitted byte-identical text without a duplicate human turn.
        let requests = engine.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(
            requests[0].messages.last().unwrap().content,
            "hello engine"
        );
        assert_eq!(
            requests[1]
                .messages
                .iter()
                .rev()
                .find(|m| m.role == CharacterRole::Human)
                .unwrap()
                .content,
            "hello engine"
        );

        let history = session.history().await;
        let humans = history
            .iter()
            .filter(|t| t.role == CharacterRole::Human)
            .count();
        assert_eq!(humans, 1);
        assert_eq!(session.api_response_error().await, None);
        assert_eq!(history.last().unwrap().text, "recovered answer");
    }

    #[tokio::test]
    async fn test_dispatch_failure_drops_empty_placeholder() {
        let (session, _engine, _repo) = make_session(
            vec![
                MockScript::Refuse(EngineError::Connection {
                    message: "offline".to_string(),
                }),
                MockScript::Reply(vec![completion("back online")]),
            ],
            PremiumStatus::Inactive,
        )
        .await;

        session
            .submit_human_entry("are you there?", ActionType::Query)
            .await
            .unwrap();
        wait_for_state(&session, |s| s == SessionState::Error(ApiErrorKind::ConnectionIssue)).await;

        // The placeholder never streamed; only the human turn remains.
        assert_eq!(session.history().await.len(), 1);

        session.retry().await.unwrap();
        wait_for_state(&session, |s| s == SessionState::Idle).await;

        // Same history length as a straight success: human + assistant.
        let history = session.history().await;
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].text, "back online");
    }

    #[tokio::test]
    async fn test_timeout_transitions_to_connection_issue() {
        let (session, _engine, _repo) = make_session_with(
            vec![MockScript::StallAfter(Vec::new(), Vec::new())],
            PremiumStatus::Inactive,
            Duration::from_millis(100),
        )
        .await;

        session
            .submit_human_entry("anyone home?", ActionType::Query)
            .await
            .unwrap();
        wait_for_state(&session, |s| s == SessionState::Error(ApiErrorKind::ConnectionIssue)).await;
    }

    #[tokio::test]
    async fn test_retry_invalid_outside_error_state() {
        let (session, _engine, _repo) = make_session(vec![], PremiumStatus::Inactive).await;
        assert!(session.retry().await.unwrap_err().is_invalid_state());
    }

    #[tokio::test]
    async fn test_clear_error_returns_failed_message() {
        let (session, _engine, _repo) = make_session(
            vec![MockScript::Refuse(EngineError::Connection {
                message: "offline".to_string(),
            })],
            PremiumStatus::Inactive,
        )
        .await;

        session
            .submit_human_entry("lost words", ActionType::Query)
            .await
            .unwrap();
        wait_for_state(&session, |s| matches!(s, SessionState::Error(_))).await;

        let failed = session.clear_error_and_get_failed_message().await.unwrap();
        assert_eq!(failed.text, "lost words");

        // The error is cleared and the input detached from history.
        assert_eq!(session.state().await, SessionState::Idle);
        assert_eq!(session.api_response_error().await, None);
        assert!(session.history().await.is_empty());

        // A second call is illegal from idle.
        assert!(session
            .clear_error_and_get_failed_message()
            .await
            .unwrap_err()
            .is_invalid_state());
    }

    #[tokio::test]
    async fn test_modify_appends_revision_and_resubmission_uses_it() {
        let (session, engine, _repo) = make_session(
            vec![
                MockScript::Reply(vec![completion("first answer")]),
                MockScript::Reply(vec![completion("second answer")]),
            ],
            PremiumStatus::Inactive,
        )
        .await;

        session
            .submit_human_entry("original question", ActionType::Query)
            .await
            .unwrap();
        wait_for_state(&session, |s| s == SessionState::Idle).await;

        session
            .modify_conversation(0, "revised question")
            .await
            .unwrap();

        let history = session.history().await;
        assert_eq!(history[0].text, "original question");
        assert_eq!(history[0].current_text(), "revised question");

        // The next submission carries the revision, not the original.
        session
            .submit_human_entry("follow-up", ActionType::Query)
            .await
            .unwrap();
        wait_for_state(&session, |s| s == SessionState::Idle).await;

        let requests = engine.requests();
        assert_eq!(requests[1].messages[0].content, "revised question");
    }

    #[tokio::test]
    async fn test_modify_rejects_bad_index() {
        let (session, _engine, _repo) = make_session(vec![], PremiumStatus::Inactive).await;
        let err = session.modify_conversation(5, "text").await.unwrap_err();
        assert!(err.is_invalid_input());
    }

    #[tokio::test]
    async fn test_change_model_gated_by_entitlement() {
        let (session, _engine, _repo) = make_session(vec![], PremiumStatus::Inactive).await;

        let err = session.change_model("chat-expanse").await.unwrap_err();
        assert!(err.is_entitlement_denied());

        // Accessible models exclude the premium tier.
        assert!(session.models().iter().all(|m| m.key() != "chat-expanse"));

        // A basic model is always selectable.
        session.change_model("chat-basic").await.unwrap();
        assert_eq!(session.current_model_key().await, "chat-basic");
    }

    #[tokio::test]
    async fn test_change_model_allowed_with_active_premium() {
        let (session, _engine, _repo) = make_session(vec![], PremiumStatus::Active).await;

        session.change_model("chat-expanse").await.unwrap();
        assert_eq!(session.current_model_key().await, "chat-expanse");
        assert!(session.models().iter().any(|m| m.key() == "chat-expanse"));
    }

    #[tokio::test]
    async fn test_unknown_model_is_not_found() {
        let (session, _engine, _repo) = make_session(vec![], PremiumStatus::Active).await;
        let err = session.change_model("no-such-model").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_page_contents_flag_takes_effect_next_submission() {
        let (session, engine, _repo) = make_session(
            vec![
                MockScript::Reply(vec![completion("one")]),
                MockScript::Reply(vec![completion("two")]),
            ],
            PremiumStatus::Inactive,
        )
        .await;

        session
            .set_associated_content(
                SiteInfo::resolved("Docs", "docs.rs", "https://docs.rs", 100, false),
                Some("page body text".to_string()),
            )
            .await;

        session
            .submit_human_entry("without content", ActionType::Query)
            .await
            .unwrap();
        wait_for_state(&session, |s| s == SessionState::Idle).await;

        session.set_should_send_page_contents(true).await;
        session
            .submit_human_entry("with content", ActionType::Query)
            .await
            .unwrap();
        wait_for_state(&session, |s| s == SessionState::Idle).await;

        let requests = engine.requests();
        assert_eq!(requests[0].page_content, None);
        assert_eq!(requests[1].page_content, Some("page body text".to_string()));
    }

    #[tokio::test]
    async fn test_notifications_cover_request_lifecycle() {
        let (session, _engine, _repo) = make_session(
            vec![MockScript::Reply(vec![completion("done")])],
            PremiumStatus::Inactive,
        )
        .await;

        let (_id, mut rx) = session.subscribe();
        session
            .submit_human_entry("notify me", ActionType::Query)
            .await
            .unwrap();
        wait_for_state(&session, |s| s == SessionState::Idle).await;

        let mut notifications = Vec::new();
        while let Ok(n) = rx.try_recv() {
            notifications.push(n);
        }

        assert!(notifications.contains(&SessionNotification::RequestInProgressChanged(true)));
        assert!(notifications.contains(&SessionNotification::RequestInProgressChanged(false)));
        assert!(notifications
            .iter()
            .any(|n| matches!(n, SessionNotification::HistoryUpdated)));
    }

    #[tokio::test]
    async fn test_suggestion_generation_full_cycle() {
        let (session, _engine, _repo) = make_session(vec![], PremiumStatus::Inactive).await;

        let (_id, mut rx) = session.subscribe();
        session
            .set_associated_content(
                SiteInfo::resolved("Docs", "docs.rs", "https://docs.rs", 100, false),
                Some("page body".to_string()),
            )
            .await;

        let (_, status) = session.suggested_questions().await;
        assert_eq!(status, SuggestionStatus::CanGenerate);

        session.generate_questions().await.unwrap();

        // Result arrives via notification, not a return value.
        let mut generated = None;
        for _ in 0..200 {
            match rx.try_recv() {
                Ok(SessionNotification::SuggestedQuestionsChanged { questions, status })
                    if status == SuggestionStatus::HasGenerated =>
                {
                    generated = Some(questions);
                    break;
                }
                Ok(_) => {}
                Err(_) => tokio::time::sleep(Duration::from_millis(10)).await,
            }
        }
        assert_eq!(generated.unwrap().len(), 2);

        // Generating again without a content change is illegal.
        assert!(session.generate_questions().await.unwrap_err().is_invalid_state());

        // A navigation re-arms generation.
        session
            .set_associated_content(
                SiteInfo::resolved("Other", "other.dev", "https://other.dev", 100, false),
                Some("other body".to_string()),
            )
            .await;
        let (questions, status) = session.suggested_questions().await;
        assert!(questions.is_empty());
        assert_eq!(status, SuggestionStatus::CanGenerate);
    }

    #[tokio::test]
    async fn test_rate_message_returns_opaque_id() {
        let (session, _engine, _repo) = make_session(
            vec![MockScript::Reply(vec![completion("rated answer")])],
            PremiumStatus::Inactive,
        )
        .await;

        session
            .submit_human_entry("rate this", ActionType::Query)
            .await
            .unwrap();
        wait_for_state(&session, |s| s == SessionState::Idle).await;

        let history = session.history().await;
        let assistant_id = history[1].id.clone();

        let rating_id = session.rate_message(&assistant_id, true).await;
        assert_eq!(rating_id, Some("rating-123".to_string()));

        // Rating an unknown turn fails softly.
        assert_eq!(session.rate_message("no-such-turn", false).await, None);

        // The state machine is untouched either way.
        assert_eq!(session.state().await, SessionState::Idle);
        assert!(session.send_feedback("accuracy", "close enough", rating_id).await);
    }

    #[tokio::test]
    async fn test_completed_cycle_is_persisted() {
        let (session, _engine, repo) = make_session(
            vec![MockScript::Reply(vec![completion("stored answer")])],
            PremiumStatus::Inactive,
        )
        .await;

        session
            .submit_human_entry("store me", ActionType::Query)
            .await
            .unwrap();
        wait_for_state(&session, |s| s == SessionState::Idle).await;
        // Persistence runs after the state flip; give it a beat.
        tokio::time::sleep(Duration::from_millis(50)).await;

        let stored = repo
            .find_by_id(session.conversation_id())
            .await
            .unwrap()
            .expect("conversation should be persisted");
        assert_eq!(stored.turns.len(), 2);
        assert_eq!(stored.turns[1].text, "stored answer");
    }

    #[tokio::test]
    async fn test_restored_session_starts_idle() {
        let (session, _engine, repo) = make_session(
            vec![MockScript::Reply(vec![completion("first life")])],
            PremiumStatus::Inactive,
        )
        .await;

        session
            .submit_human_entry("persist me", ActionType::Query)
            .await
            .unwrap();
        wait_for_state(&session, |s| s == SessionState::Idle).await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        let stored = repo
            .find_by_id(session.conversation_id())
            .await
            .unwrap()
            .unwrap();
        let restored = ConversationSession::from_stored(stored, session.services.clone());

        assert_eq!(restored.state().await, SessionState::Idle);
        assert!(!restored.is_request_in_progress().await);
        assert_eq!(restored.history().await.len(), 2);
    }
}
