//! Domain layer for the Aside conversational-assistant service.
//!
//! This crate holds the pure domain models and contracts: conversations,
//! turns, streaming events, the model catalog, entitlement types, page
//! context, quick-action definitions, and the shared error type. It has no
//! knowledge of engines, storage backends, or the session runtime; those
//! live in `aside-interaction`, `aside-infrastructure`, and
//! `aside-application`.

pub mod action_menu;
pub mod config;
pub mod conversation;
pub mod error;
pub mod model;
pub mod premium;
pub mod site_info;
pub mod suggestion;

// Re-export common error types
pub use error::{ApiErrorKind, AsideError};
