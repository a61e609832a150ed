//! Centralized application directory paths for LexiGen.
//!
//! Uses the [`dirs`] crate for platform-appropriate directory resolution.
//!
//! | Purpose | macOS | Linux | Windows |
//! |---------|-------|-------|---------|
//! | Data | `~/Library/Application Support/lexigen/` | `~/.local/share/lexigen/` | `%APPDATA%\lexigen\` |
//! | Config | `~/Library/Application Support/lexigen/` | `~/.config/lexigen/` | `%APPDATA%\lexigen\` |
//! | Cache | `~/Library/Caches/lexigen/` | `~/.cache/lexigen/` | `%LOCALAPPDATA%\lexigen\` |
//!
//! # Environment Overrides
//!
//! - `LEXIGEN_DATA_DIR` overrides [`data_dir`]
//! - `LEXIGEN_CONFIG_DIR` overrides [`config_dir`]
//! - `LEXIGEN_CACHE_DIR` overrides [`cache_dir`]

use std::path::PathBuf;

/// Application data root directory.
///
/// Resolves to `dirs::data_dir()/lexigen/` by default. Override with
/// the `LEXIGEN_DATA_DIR` environment variable.
#[must_use]
pub fn data_dir() -> PathBuf {
    if let Some(override_dir) = std::env::var_os("LEXIGEN_DATA_DIR") {
        return PathBuf::from(override_dir);
    }
    dirs::data_dir()
        .map(|d| d.join("lexigen"))
        .unwrap_or_else(|| std::env::temp_dir().join("lexigen-data"))
}

/// Application config directory.
///
/// Holds `config.toml` and `update-state.json`. Override with the
/// `LEXIGEN_CONFIG_DIR` environment variable.
#[must_use]
pub fn config_dir() -> PathBuf {
    if let Some(override_dir) = std::env::var_os("LEXIGEN_CONFIG_DIR") {
        return PathBuf::from(override_dir);
    }
    dirs::config_dir()
        .map(|d| d.join("lexigen"))
        .unwrap_or_else(|| std::env::temp_dir().join("lexigen-config"))
}

/// Application cache directory. Override with `LEXIGEN_CACHE_DIR`.
#[must_use]
pub fn cache_dir() -> PathBuf {
    if let Some(override_dir) = std::env::var_os("LEXIGEN_CACHE_DIR") {
        return PathBuf::from(override_dir);
    }
    dirs::cache_dir()
        .map(|d| d.join("lexigen"))
        .unwrap_or_else(|| std::env::temp_dir().join("lexigen-cache"))
}

/// Log file directory (`data_dir()/logs/`).
#[must_use]
pub fn logs_dir() -> PathBuf {
    data_dir().join("logs")
}

/// Main config file path (`config_dir()/config.toml`).
#[must_use]
pub fn config_file() -> PathBuf {
    config_dir().join("config.toml")
}

/// Persisted update state (`config_dir()/update-state.json`).
#[must_use]
pub fn update_state_file() -> PathBuf {
    config_dir().join("update-state.json")
}
