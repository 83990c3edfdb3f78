use serde::{Deserialize, Serialize};

/// An incremental piece of data produced while an assistant turn is being
/// generated.
///
/// Exactly one variant is populated per event instance; consumers must not
/// assume a fixed event count per turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TurnEvent {
    /// An incremental fragment of completion text.
    Completion { text: String },
    /// The page content backing this turn is being refined (condensed)
    /// before submission.
    PageContentRefined { is_refining: bool },
    /// Search queries generated on behalf of this turn.
    SearchQueries { queries: Vec<String> },
    /// Whether an external search is currently in progress.
    SearchInProgress { in_progress: bool },
}

impl TurnEvent {
    /// Returns the completion text fragment, if this is a completion event.
    pub fn completion_text(&self) -> Option<&str> {
        match self {
            TurnEvent::Completion { text } => Some(text),
            _ => None,
        }
    }
}
