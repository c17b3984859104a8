//! Configuration file location and path helpers
//!
//! Uses the directories crate for platform-appropriate locations:
//! - Linux: `~/.config/broker-e2e/`
//! - macOS: `~/Library/Application Support/broker-e2e/`
//! - Windows: `%APPDATA%\broker-e2e\`

use std::path::{Path, PathBuf};

/// Name used for the configuration and data directories
const APP_NAME: &str = "broker-e2e";

/// Get the configuration directory path
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", APP_NAME).map(|dirs| dirs.config_dir().to_path_buf())
}

/// Get the path to the configuration file
pub fn config_path() -> Option<PathBuf> {
    config_dir().map(|dir| dir.join("config.toml"))
}

/// Resolve `path` against `base` unless it is already absolute
pub fn resolve_relative(base: &Path, path: &Path) -> PathBuf {
    if path.is_relative() {
        base.join(path)
    } else {
        path.to_path_buf()
    }
}

/// Whether a program name refers to a path rather than a `PATH` lookup
pub fn has_separator(program: &Path) -> bool {
    program.components().count() > 1
}
