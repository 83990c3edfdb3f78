//! Conversation turn types.
//!
//! This module contains types for representing turns in a conversation,
//! including roles, action tags, visibility, and edit revisions.

use super::event::TurnEvent;
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

/// Represents the character that authored a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CharacterRole {
    /// Turn from the human party.
    Human,
    /// Turn from the AI assistant.
    Assistant,
}

/// The action that produced a turn: a free-form query or one of the fixed
/// quick-action commands.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ActionType {
    /// A free-form query typed by the user.
    Query,
    /// Summarize the associated page.
    SummarizePage,
    /// Explain the selected text.
    Explain,
    /// Paraphrase the selected text.
    Paraphrase,
    /// Improve the writing of the selected text.
    ImproveWriting,
    /// Rewrite the selected text in a professional tone.
    Professionalize,
    /// Rewrite the selected text in a casual tone.
    Casualize,
    /// Shorten the selected text.
    Shorten,
    /// Expand the selected text.
    Expand,
}

/// Whether a turn is shown to callers or kept as internal bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnVisibility {
    /// Shown in the visible history.
    Visible,
    /// Hidden internal turn (e.g., superseded by a newer submission).
    Hidden,
}

/// A single edit revision of a turn.
///
/// Revisions are flat records; editing an already-edited turn appends
/// another revision to the same turn rather than nesting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditRevision {
    /// The revised text.
    pub text: String,
    /// Timestamp when the revision was created (ISO 8601 format).
    pub created_at: String,
}

/// One message-equivalent unit in a conversation, from either the human
/// party or the assistant.
///
/// When `edits` is non-empty, `text` holds the *original* text; the last
/// element of `edits` is the text to treat as current for display and for
/// resubmission to the engine. `events` is append-only for the lifetime of
/// a turn and frozen once the turn's request completes or fails.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    /// Unique turn identifier (UUID format).
    pub id: String,
    /// The character that authored this turn.
    pub role: CharacterRole,
    /// The action that produced this turn.
    pub action: ActionType,
    /// Visibility of this turn in the history.
    pub visibility: TurnVisibility,
    /// The display text of this turn. For an assistant turn this is the
    /// concatenation of its completion events.
    pub text: String,
    /// Verbatim selection text that triggered this turn, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_text: Option<String>,
    /// Ordered streaming events. Empty until streaming begins.
    #[serde(default)]
    pub events: Vec<TurnEvent>,
    /// Timestamp when the turn was created (ISO 8601 format).
    pub created_at: String,
    /// Ordered edit revisions, oldest first.
    #[serde(default)]
    pub edits: Vec<EditRevision>,
    /// Marks provenance from an external search result.
    #[serde(default)]
    pub from_search: bool,
}

impl ConversationTurn {
    /// Creates a new visible human turn.
    pub fn human(text: impl Into<String>, action: ActionType) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            role: CharacterRole::Human,
            action,
            visibility: TurnVisibility::Visible,
            text: text.into(),
            selected_text: None,
            events: Vec::new(),
            created_at: chrono::Utc::now().to_rfc3339(),
            edits: Vec::new(),
            from_search: false,
        }
    }

    /// Creates an empty assistant turn that will be populated by streaming
    /// events.
    pub fn assistant_placeholder(action: ActionType) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            role: CharacterRole::Assistant,
            action,
            visibility: TurnVisibility::Visible,
            text: String::new(),
            selected_text: None,
            events: Vec::new(),
            created_at: chrono::Utc::now().to_rfc3339(),
            edits: Vec::new(),
            from_search: false,
        }
    }

    /// Attaches the verbatim selection text that triggered this turn.
    pub fn with_selected_text(mut self, selected_text: impl Into<String>) -> Self {
        self.selected_text = Some(selected_text.into());
        self
    }

    /// Returns the text to treat as current: the last edit revision if any,
    /// otherwise the turn's own text.
    pub fn current_text(&self) -> &str {
        self.edits.last().map(|e| e.text.as_str()).unwrap_or(&self.text)
    }

    /// Appends an edit revision. The original `text` is left untouched.
    pub fn push_edit(&mut self, text: impl Into<String>) {
        self.edits.push(EditRevision {
            text: text.into(),
            created_at: chrono::Utc::now().to_rfc3339(),
        });
    }

    /// Appends a streaming event and, for completion fragments, extends the
    /// display text.
    pub fn push_event(&mut self, event: TurnEvent) {
        if let TurnEvent::Completion { text } = &event {
            self.text.push_str(text);
        }
        self.events.push(event);
    }

    /// Whether this turn is visible to callers.
    pub fn is_visible(&self) -> bool {
        self.visibility == TurnVisibility::Visible
    }
}
