//! Unified path management for aside configuration files.
//!
//! All aside configuration, secrets, and conversation data live under one
//! config directory so every storage implementation resolves paths the
//! same way on every platform.

use std::path::PathBuf;

/// Errors that can occur during path resolution.
#[derive(Debug)]
pub enum PathError {
    /// Home directory could not be determined.
    HomeDirNotFound,
}

impl std::fmt::Display for PathError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PathError::HomeDirNotFound => write!(f, "Cannot find home directory"),
        }
    }
}

impl std::error::Error for PathError {}

/// Unified path management for aside.
///
/// # Directory Structure
///
/// ```text
/// ~/.config/aside/             # Config directory
/// ├── config.toml              # Application configuration
/// ├── secret.json              # API keys and secrets
/// └── conversations/           # Stored conversations, one TOML file each
/// ```
pub struct AsidePaths;

impl AsidePaths {
    /// Returns the aside configuration directory.
    pub fn config_dir() -> Result<PathBuf, PathError> {
        let home = dirs::home_dir().ok_or(PathError::HomeDirNotFound)?;
        Ok(home.join(".config").join("aside"))
    }

    /// Returns the path of the application configuration file.
    pub fn config_file() -> Result<PathBuf, PathError> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Returns the conversations storage directory.
    pub fn conversations_dir() -> Result<PathBuf, PathError> {
        Ok(Self::config_dir()?.join("conversations"))
    }
}
