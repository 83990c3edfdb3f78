//! Storage implementations for the Aside service.
//!
//! Provides the conversation repository backends (TOML files, in-memory)
//! and unified path resolution for configuration and data files.

pub mod memory_conversation_repository;
pub mod paths;
pub mod toml_conversation_repository;

pub use memory_conversation_repository::MemoryConversationRepository;
pub use paths::AsidePaths;
pub use toml_conversation_repository::TomlConversationRepository;
