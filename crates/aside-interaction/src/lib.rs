//! Remote boundaries of the Aside service.
//!
//! This crate defines the traits the service layer talks to — completion
//! engine, premium status, feedback — plus their HTTP implementations.
//! Engines are opaque: the service never sees inference details, only an
//! ordered stream of [`TurnEvent`]s per submission.

pub mod config;
pub mod feedback;
pub mod http_engine;
pub mod premium_client;

use aside_core::conversation::{CharacterRole, TurnEvent};
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;

pub use feedback::{FeedbackClient, FeedbackPayload, HttpFeedbackClient, RatingPayload};
pub use http_engine::HttpCompletionEngine;
pub use premium_client::{HttpPremiumClient, PremiumClient, PremiumSnapshot};

/// Errors surfaced by the remote clients in this crate.
#[derive(Error, Debug, Clone)]
pub enum EngineError {
    /// Transport-level failure (connect, TLS, reset).
    #[error("engine connection failed: {message}")]
    Connection { message: String },

    /// Engine-side throttling.
    #[error("engine rate limit reached")]
    RateLimited {
        /// Server-provided backoff hint, if any.
        retry_after: Option<Duration>,
    },

    /// Conversation or page content too large for the engine.
    #[error("request exceeds the engine's context limit")]
    ContextLimit,

    /// The request was malformed or rejected before processing.
    #[error("invalid engine request: {0}")]
    InvalidRequest(String),

    /// Anything else.
    #[error("engine error: {0}")]
    Other(String),
}

impl EngineError {
    /// Whether retrying the same request may succeed without changing it.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            EngineError::Connection { .. } | EngineError::RateLimited { .. }
        )
    }
}

/// One message of conversation history sent to an engine.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct EngineMessage {
    /// Who authored the message.
    pub role: CharacterRole,
    /// The message text (already resolved to its current edit revision).
    pub content: String,
}

/// A completion request dispatched to an engine.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct CompletionRequest {
    /// Key of the model to run.
    pub model_key: String,
    /// Visible conversation history, oldest first, the new human entry last.
    pub messages: Vec<EngineMessage>,
    /// Associated page content, when the session sends it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_content: Option<String>,
    /// Verbatim selection that triggered the request, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selected_text: Option<String>,
}

/// The ordered event stream for one submission cycle.
///
/// The stream closing without an error is the completion signal; an `Err`
/// item is terminal.
pub type EngineEventStream = mpsc::Receiver<Result<TurnEvent, EngineError>>;

/// An opaque remote completion engine.
///
/// Implementations dispatch the request and feed events into the returned
/// channel from their own task; they must never block the caller on
/// inference.
#[async_trait]
pub trait CompletionEngine: Send + Sync {
    /// Engine binding name, matching [`aside_core::model::HostedModel::engine`].
    fn name(&self) -> &str;

    /// Dispatches a completion request.
    ///
    /// # Errors
    ///
    /// Returns an error only for failures detected before streaming starts
    /// (unreachable endpoint, rejected request). Mid-stream failures arrive
    /// as an `Err` item on the stream.
    async fn submit(&self, request: CompletionRequest) -> Result<EngineEventStream, EngineError>;

    /// Generates follow-up questions for the given page content.
    async fn generate_questions(&self, page_content: &str) -> Result<Vec<String>, EngineError>;
}
