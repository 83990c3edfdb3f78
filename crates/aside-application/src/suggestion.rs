//! Follow-up question suggestion state.
//!
//! Owns the small status state machine decoupled from turn submission:
//! `None → CanGenerate → IsGenerating → HasGenerated`, re-armed to
//! `CanGenerate` whenever the associated content changes meaningfully.

use aside_core::error::{AsideError, Result};
use aside_core::suggestion::SuggestionStatus;

/// Per-session suggestion state.
#[derive(Debug, Default)]
pub struct SuggestionState {
    status: SuggestionStatus,
    questions: Vec<String>,
}

impl SuggestionState {
    /// Creates a state with nothing to generate from.
    pub fn new() -> Self {
        Self::default()
    }

    /// The current status.
    pub fn status(&self) -> SuggestionStatus {
        self.status
    }

    /// The generated questions, empty unless status is `HasGenerated`.
    pub fn questions(&self) -> &[String] {
        &self.questions
    }

    /// Re-arms generation after a meaningful content change.
    ///
    /// With no associable content the status drops back to `None` and any
    /// stale questions are discarded.
    pub fn rearm(&mut self, has_content: bool) {
        self.questions.clear();
        self.status = if has_content {
            SuggestionStatus::CanGenerate
        } else {
            SuggestionStatus::None
        };
    }

    /// Marks generation as in flight.
    ///
    /// # Errors
    ///
    /// Returns an error unless the current status is `CanGenerate`.
    pub fn begin_generating(&mut self) -> Result<()> {
        if !self.status.can_generate() {
            return Err(AsideError::invalid_state(format!(
                "cannot generate questions from status {:?}",
                self.status
            )));
        }
        self.status = SuggestionStatus::IsGenerating;
        Ok(())
    }

    /// Records a completed generation.
    ///
    /// Ignored when the status moved on while the request was in flight
    /// (content changed mid-generation).
    pub fn complete_generating(&mut self, questions: Vec<String>) {
        if self.status != SuggestionStatus::IsGenerating {
            return;
        }
        self.questions = questions;
        self.status = SuggestionStatus::HasGenerated;
    }

    /// Records a failed generation, returning the status to `CanGenerate`.
    pub fn fail_generating(&mut self) {
        if self.status == SuggestionStatus::IsGenerating {
            self.status = SuggestionStatus::CanGenerate;
        }
    }
}
