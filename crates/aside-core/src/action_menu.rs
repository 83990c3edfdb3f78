//! Quick-action menu definitions.
//!
//! The action menu is static grouped configuration data, not computed
//! state: category labels with entries that are either a section
//! subheading or a labeled action tag.

use crate::conversation::ActionType;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

/// One entry in an action group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActionEntry {
    /// A section subheading inside the group.
    Subheading { label: String },
    /// A labeled quick action.
    Action { label: String, action: ActionType },
}

/// A category of quick actions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionGroup {
    /// Category label.
    pub category: String,
    /// Ordered entries.
    pub entries: Vec<ActionEntry>,
}

static DEFAULT_MENU: Lazy<Vec<ActionGroup>> = Lazy::new(|| {
    vec![
        ActionGroup {
            category: "Quick actions".to_string(),
            entries: vec![
                ActionEntry::Action {
                    label: "Explain".to_string(),
                    action: ActionType::Explain,
                },
                ActionEntry::Action {
                    label: "Paraphrase".to_string(),
                    action: ActionType::Paraphrase,
                },
            ],
        },
        ActionGroup {
            category: "Rewrite".to_string(),
            entries: vec![
                ActionEntry::Action {
                    label: "Improve writing".to_string(),
                    action: ActionType::ImproveWriting,
                },
                ActionEntry::Subheading {
                    label: "Change tone".to_string(),
                },
                ActionEntry::Action {
                    label: "Professional".to_string(),
                    action: ActionType::Professionalize,
                },
                ActionEntry::Action {
                    label: "Casual".to_string(),
                    action: ActionType::Casualize,
                },
                ActionEntry::Subheading {
                    label: "Change length".to_string(),
                },
                ActionEntry::Action {
                    label: "Shorten".to_string(),
                    action: ActionType::Shorten,
                },
                ActionEntry::Action {
                    label: "Expand".to_string(),
                    action: ActionType::Expand,
                },
            ],
        },
    ]
});

/// Returns the static grouped quick-action menu.
pub fn default_action_menu() -> &'static [ActionGroup] {
    &DEFAULT_MENU
}
