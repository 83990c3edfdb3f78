//! Suggestion status state machine types.

use serde::{Deserialize, Serialize};

/// Status of follow-up question generation for a conversation.
///
/// `None → CanGenerate → IsGenerating → HasGenerated`, returning to
/// `CanGenerate` whenever the associated content changes meaningfully.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestionStatus {
    /// No content is associated; nothing to generate from.
    None,
    /// Content is associated and questions may be generated.
    CanGenerate,
    /// Generation is in flight.
    IsGenerating,
    /// Questions have been generated for the current content.
    HasGenerated,
}

impl SuggestionStatus {
    /// Whether `generate_questions` is legal from this status.
    pub fn can_generate(&self) -> bool {
        *self == SuggestionStatus::CanGenerate
    }
}

impl Default for SuggestionStatus {
    fn default() -> Self {
        SuggestionStatus::None
    }
}
