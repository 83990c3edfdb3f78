//! Service layer for the Aside conversational-assistant service.
//!
//! This crate wires the domain models, remote boundaries, and storage into
//! the running service: the per-conversation session state machine, the
//! conversation registry, the observer fan-out hub, the suggestion engine,
//! the content association tracker, and the premium status cache.
//!
//! # Module Structure
//!
//! - `session`: Per-conversation state machine (`ConversationSession`)
//! - `registry`: Conversation directory (`ConversationRegistry`)
//! - `observer`: Notification fan-out (`ObserverHub`, notification enums)
//! - `content`: Page-context tracking (`ContentAssociationTracker`)
//! - `suggestion`: Follow-up question state (`SuggestionState`)
//! - `premium_cache`: TTL-throttled entitlement cache (`PremiumCache`)

pub mod content;
pub mod observer;
pub mod premium_cache;
pub mod registry;
pub mod session;
pub mod suggestion;

pub use observer::{ObserverHub, ObserverId, ServiceNotification, SessionNotification};
pub use premium_cache::PremiumCache;
pub use registry::ConversationRegistry;
pub use session::{ConversationSession, SessionServices, SessionState};
