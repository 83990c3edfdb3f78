//! Conversation domain module.
//!
//! This module contains all conversation-related domain models, the
//! repository interface, and turn/event types.
//!
//! # Module Structure
//!
//! - `model`: Conversation metadata and the persistence unit
//!   (`Conversation`, `StoredConversation`)
//! - `turn`: Turn types (`ConversationTurn`, `CharacterRole`, `ActionType`,
//!   `TurnVisibility`, `EditRevision`)
//! - `event`: Streaming event sum type (`TurnEvent`)
//! - `repository`: Repository trait for conversation persistence

mod event;
mod model;
mod repository;
mod turn;

// Re-export public API
pub use event::TurnEvent;
pub use model::{Conversation, StoredConversation};
pub use repository::ConversationRepository;
pub use turn::{ActionType, CharacterRole, ConversationTurn, EditRevision, TurnVisibility};
