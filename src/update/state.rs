//! Update state persistence.
//!
//! Tracks the update preference, the last check time and the release the
//! user chose to skip. Persisted as JSON at
//! [`app_dirs::update_state_file`](crate::app_dirs::update_state_file).

use crate::error::{Result, UpdateError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// User preference for automatic updates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AutoUpdatePreference {
    /// Ask before every update (default).
    #[default]
    Ask,
    /// Download and install without asking.
    Always,
    /// Report availability only.
    Never,
}

impl std::fmt::Display for AutoUpdatePreference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ask => write!(f, "ask"),
            Self::Always => write!(f, "always"),
            Self::Never => write!(f, "never"),
        }
    }
}

impl std::str::FromStr for AutoUpdatePreference {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ask" => Ok(Self::Ask),
            "always" => Ok(Self::Always),
            "never" => Ok(Self::Never),
            other => Err(format!("unknown preference `{other}` (expected ask, always or never)")),
        }
    }
}

/// Persistent update state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UpdateState {
    /// Running LexiGen version (defaults to `CARGO_PKG_VERSION`).
    pub current_version: String,
    /// User preference for automatic updates.
    pub auto_update: AutoUpdatePreference,
    /// Time of the last completed check.
    pub last_check: Option<DateTime<Utc>>,
    /// Release version the user chose to skip.
    pub dismissed_release: Option<String>,
}

impl Default for UpdateState {
    fn default() -> Self {
        Self {
            current_version: env!("CARGO_PKG_VERSION").to_owned(),
            auto_update: AutoUpdatePreference::default(),
            last_check: None,
            dismissed_release: None,
        }
    }
}

impl UpdateState {
    /// Load from the default state file.
    pub fn load() -> Self {
        Self::load_from(&crate::app_dirs::update_state_file())
    }

    /// Load from `path`. A missing or unparseable file yields the defaults.
    pub fn load_from(path: &Path) -> Self {
        let bytes = match std::fs::read(path) {
            Ok(b) => b,
            Err(_) => return Self::default(),
        };
        match serde_json::from_slice(&bytes) {
            Ok(state) => state,
            Err(e) => {
                tracing::warn!(path = %path.display(), "ignoring unreadable update state: {e}");
                Self::default()
            }
        }
    }

    /// Persist to the default state file.
    ///
    /// # Errors
    ///
    /// See [`save_to`](Self::save_to).
    pub fn save(&self) -> Result<()> {
        self.save_to(&crate::app_dirs::update_state_file())
    }

    /// Persist to `path`, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or the file
    /// cannot be written.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                UpdateError::Config(format!(
                    "cannot create state directory {}: {e}",
                    parent.display()
                ))
            })?;
        }

        let json = serde_json::to_string_pretty(self)
            .map_err(|e| UpdateError::Config(format!("cannot serialize update state: {e}")))?;

        std::fs::write(path, json).map_err(|e| {
            UpdateError::Config(format!(
                "cannot write update state to {}: {e}",
                path.display()
            ))
        })?;

        Ok(())
    }

    /// Record that a check completed now.
    pub fn mark_checked(&mut self) {
        self.last_check = Some(Utc::now());
    }

    /// Returns `true` if the last check was at least `hours` hours ago, or if
    /// no check has been recorded.
    pub fn check_is_stale(&self, hours: u64) -> bool {
        let Some(last) = self.last_check else {
            return true;
        };
        let elapsed = Utc::now().signed_duration_since(last);
        elapsed.num_seconds().max(0) as u64 / 3600 >= hours
    }

    /// Skip `version` in future automatic checks.
    pub fn dismiss(&mut self, version: &str) {
        self.dismissed_release = Some(version.to_owned());
    }

    /// Returns `true` if `version` was dismissed.
    pub fn is_dismissed(&self, version: &str) -> bool {
        self.dismissed_release.as_deref() == Some(version)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use chrono::Duration;

    #[test]
    fn default_state_has_current_version() {
        let state = UpdateState::default();
        assert_eq!(state.current_version, env!("CARGO_PKG_VERSION"));
        assert_eq!(state.auto_update, AutoUpdatePreference::Ask);
        assert!(state.last_check.is_none());
        assert!(state.dismissed_release.is_none());
    }

    #[test]
    fn preference_display_and_parse() {
        for p in [
            AutoUpdatePreference::Ask,
            AutoUpdatePreference::Always,
            AutoUpdatePreference::Never,
        ] {
            assert_eq!(p.to_string().parse::<AutoUpdatePreference>().unwrap(), p);
        }
        assert!("sometimes".parse::<AutoUpdatePreference>().is_err());
    }

    #[test]
    fn save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("update-state.json");

        let mut state = UpdateState {
            current_version: "1.3.1".to_owned(),
            auto_update: AutoUpdatePreference::Always,
            ..Default::default()
        };
        state.mark_checked();
        state.dismiss("1.4.0");
        state.save_to(&path).unwrap();

        let restored = UpdateState::load_from(&path);
        assert_eq!(restored, state);
    }

    #[test]
    fn last_check_is_rfc3339() {
        let state = UpdateState {
            last_check: Some("2026-01-02T03:04:05Z".parse().unwrap()),
            ..Default::default()
        };
        let json = serde_json::to_string(&state).unwrap();
        assert!(json.contains("\"last_check\":\"2026-01-02T03:04:05Z\""));
    }

    #[test]
    fn missing_fields_use_defaults() {
        let state: UpdateState = serde_json::from_str(r#"{"current_version":"1.0.0"}"#).unwrap();
        assert_eq!(state.current_version, "1.0.0");
        assert_eq!(state.auto_update, AutoUpdatePreference::Ask);
    }

    #[test]
    fn load_falls_back_on_missing_or_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let missing = UpdateState::load_from(&dir.path().join("none.json"));
        assert_eq!(missing, UpdateState::default());

        let corrupt = dir.path().join("bad.json");
        std::fs::write(&corrupt, "{ not json").unwrap();
        assert_eq!(UpdateState::load_from(&corrupt), UpdateState::default());
    }

    #[test]
    fn staleness() {
        let mut state = UpdateState::default();
        assert!(state.check_is_stale(24));

        state.mark_checked();
        assert!(!state.check_is_stale(24));
        assert!(state.check_is_stale(0));

        state.last_check = Some(Utc::now() - Duration::hours(48));
        assert!(state.check_is_stale(24));
    }

    #[test]
    fn dismissal_matches_exact_version() {
        let mut state = UpdateState::default();
        assert!(!state.is_dismissed("1.4.0"));
        state.dismiss("1.4.0");
        assert!(state.is_dismissed("1.4.0"));
        assert!(!state.is_dismissed("1.4.1"));
    }
}
