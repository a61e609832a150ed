//! Configuration types for the self-update pipeline.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Top-level configuration file (`config.toml`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Self-update settings.
    pub update: UpdateConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
}

/// How release version strings are ordered when deciding whether an update
/// is newer than the running version.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VersionOrdering {
    /// Dotted-integer comparison (`1.10.0 > 1.9.0`).
    #[default]
    Numeric,
    /// Plain string comparison, as older LexiGen releases did.
    Lexicographic,
}

/// Self-update configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UpdateConfig {
    /// Release metadata endpoint (GitHub "latest release" API shape).
    pub releases_url: String,
    /// Human-facing download page, shown when an update fails.
    pub download_page_url: String,
    /// Version comparison mode.
    pub version_ordering: VersionOrdering,
    /// Download read size in bytes.
    pub chunk_size: usize,
    /// Seconds the helper script waits for the app to exit before replacing it.
    pub relaunch_delay_secs: u32,
    /// Milliseconds between spawning the helper script and asking the app to exit.
    pub exit_delay_ms: u64,
    /// HTTP connect timeout in seconds.
    pub connect_timeout_secs: u64,
    /// HTTP read timeout in seconds.
    pub read_timeout_secs: u64,
    /// Directory for downloaded artifacts (None = system temp dir).
    pub download_dir: Option<PathBuf>,
    /// Install target override (None = derived from the running executable).
    pub install_path: Option<PathBuf>,
}

impl Default for UpdateConfig {
    fn default() -> Self {
        Self {
            releases_url: "https://api.github.com/repos/gitmichaelqiu/LexiGen/releases/latest"
                .to_owned(),
            download_page_url: "https://github.com/gitmichaelqiu/LexiGen/releases/latest"
                .to_owned(),
            version_ordering: VersionOrdering::default(),
            chunk_size: 64 * 1024,
            relaunch_delay_secs: 2,
            exit_delay_ms: 500,
            connect_timeout_secs: 15,
            read_timeout_secs: 300,
            download_dir: None,
            install_path: None,
        }
    }
}

impl UpdateConfig {
    /// `User-Agent` header sent with every update request.
    pub fn user_agent(&self) -> String {
        format!("lexigen/{} (self-update)", env!("CARGO_PKG_VERSION"))
    }

    /// Build the blocking HTTP agent used by the checker and downloader.
    pub fn http_agent(&self) -> ureq::Agent {
        ureq::AgentBuilder::new()
            .timeout_connect(Duration::from_secs(self.connect_timeout_secs))
            .timeout_read(Duration::from_secs(self.read_timeout_secs))
            .user_agent(&self.user_agent())
            .build()
    }

    /// Directory that receives downloaded artifacts.
    pub fn download_dir(&self) -> PathBuf {
        self.download_dir.clone().unwrap_or_else(std::env::temp_dir)
    }

    /// Validate values that would otherwise fail deep inside the pipeline.
    ///
    /// # Errors
    ///
    /// Returns [`UpdateError::Config`](crate::UpdateError::Config) when a
    /// value is unusable.
    pub fn validate(&self) -> crate::error::Result<()> {
        if self.releases_url.trim().is_empty() {
            return Err(crate::error::UpdateError::Config(
                "update.releases_url must not be empty".to_owned(),
            ));
        }
        if self.chunk_size == 0 {
            return Err(crate::error::UpdateError::Config(
                "update.chunk_size must be greater than zero".to_owned(),
            ));
        }
        Ok(())
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default `EnvFilter` directive when `RUST_LOG` is unset.
    pub filter: String,
    /// Also write a daily rolling log file under the logs directory.
    pub file: bool,
    /// Log directory override (None = `app_dirs::logs_dir()`).
    pub dir: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "lexigen=info,warn".to_owned(),
            file: false,
            dir: None,
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| crate::error::UpdateError::Config(e.to_string()))
    }

    /// Load from `path` if it exists, otherwise return the defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load_or_default(path: &std::path::Path) -> crate::error::Result<Self> {
        if path.is_file() {
            Self::from_file(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to a TOML file, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or the config cannot be serialized.
    pub fn save_to_file(&self, path: &std::path::Path) -> crate::error::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| crate::error::UpdateError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Returns the default config file path (`config_dir()/config.toml`).
    pub fn default_config_path() -> PathBuf {
        crate::app_dirs::config_file()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.update.validate().is_ok());
        assert_eq!(config.update.version_ordering, VersionOrdering::Numeric);
        assert!(config.update.releases_url.ends_with("/releases/latest"));
    }

    #[test]
    fn save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = AppConfig::default();
        config.update.version_ordering = VersionOrdering::Lexicographic;
        config.update.relaunch_delay_secs = 5;
        config.logging.file = true;

        config.save_to_file(&path).unwrap();
        let loaded = AppConfig::from_file(&path).unwrap();
        assert_eq!(loaded.update.version_ordering, VersionOrdering::Lexicographic);
        assert_eq!(loaded.update.relaunch_delay_secs, 5);
        assert!(loaded.logging.file);
    }

    #[test]
    fn partial_toml_uses_defaults() {
        let config: AppConfig = toml::from_str(
            r#"
            [update]
            releases_url = "http://localhost:9999/latest"
            "#,
        )
        .unwrap();
        assert_eq!(config.update.releases_url, "http://localhost:9999/latest");
        assert_eq!(config.update.chunk_size, 64 * 1024);
        assert_eq!(config.logging.filter, "lexigen=info,warn");
    }

    #[test]
    fn from_file_invalid_toml_returns_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "this is not valid toml {{{").unwrap();
        assert!(matches!(
            AppConfig::from_file(&path),
            Err(crate::error::UpdateError::Config(_))
        ));
    }

    #[test]
    fn load_or_default_without_file() {
        let config = AppConfig::load_or_default(std::path::Path::new("/nonexistent/config.toml"));
        assert!(config.is_ok());
    }

    #[test]
    fn validate_rejects_zero_chunk() {
        let config = UpdateConfig {
            chunk_size: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
