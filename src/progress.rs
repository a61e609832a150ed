//! Progress events and UI-facing collaborators for the update pipeline.
//!
//! The core never talks to a GUI toolkit. It reports through a
//! [`ProgressSink`], asks questions through [`Confirm`] and formats
//! user-visible text through [`Translate`]. The CLI (indicatif) and any
//! GUI front end implement these to receive updates.

use crossbeam_channel::Sender;
use std::fmt;
use std::path::PathBuf;

/// Observable stage of the update state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateStage {
    /// Nothing has happened yet.
    Idle,
    /// Fetching release metadata.
    Checking,
    /// The running version is the latest one.
    UpToDate {
        /// Version that was compared against.
        version: String,
    },
    /// A newer release exists.
    UpdateAvailable {
        /// Running version.
        current: String,
        /// Newer release version.
        latest: String,
    },
    /// The user declined the update prompt.
    Declined {
        /// Release version that was offered.
        version: String,
    },
    /// The release was dismissed earlier or auto-update is disabled.
    Skipped {
        /// Release version that was not offered.
        version: String,
    },
    /// The artifact is being downloaded.
    Downloading {
        /// Release version being downloaded.
        version: String,
    },
    /// The artifact is on disk.
    Downloaded {
        /// Local artifact path.
        path: PathBuf,
    },
    /// The artifact is being unpacked and the helper script prepared.
    Installing,
    /// The helper script is running; the application must exit.
    Exiting,
    /// A stage failed. The application keeps running its current version.
    Failed {
        /// Stable error label (see `UpdateError::kind`).
        kind: &'static str,
        /// Human-readable error description.
        message: String,
    },
}

impl UpdateStage {
    /// Returns `true` for stages after which the pipeline does nothing more.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::UpToDate { .. }
                | Self::Declined { .. }
                | Self::Skipped { .. }
                | Self::Exiting
                | Self::Failed { .. }
        )
    }
}

impl fmt::Display for UpdateStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Checking => write!(f, "checking"),
            Self::UpToDate { version } => write!(f, "up to date (v{version})"),
            Self::UpdateAvailable { current, latest } => {
                write!(f, "update available (v{current} -> v{latest})")
            }
            Self::Declined { version } => write!(f, "declined v{version}"),
            Self::Skipped { version } => write!(f, "skipped v{version}"),
            Self::Downloading { version } => write!(f, "downloading v{version}"),
            Self::Downloaded { path } => write!(f, "downloaded to {}", path.display()),
            Self::Installing => write!(f, "installing"),
            Self::Exiting => write!(f, "exiting"),
            Self::Failed { kind, message } => write!(f, "failed ({kind}): {message}"),
        }
    }
}

/// Events emitted to a [`ProgressSink`] or over a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateEvent {
    /// The state machine moved to a new stage.
    StateChanged(UpdateStage),
    /// Download progress in percent (`0..=100`).
    Progress(u8),
    /// User-visible error message.
    Error(String),
}

/// Receives pipeline notifications on the orchestrating thread.
pub trait ProgressSink {
    /// Download progress in percent. Never decreases within one download.
    fn on_progress(&mut self, percent: u8);

    /// The state machine moved to `stage`.
    fn on_state_change(&mut self, stage: &UpdateStage);

    /// A stage failed; `message` is already translated.
    fn on_error(&mut self, message: &str);
}

/// Sink that discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl ProgressSink for NullSink {
    fn on_progress(&mut self, _percent: u8) {}
    fn on_state_change(&mut self, _stage: &UpdateStage) {}
    fn on_error(&mut self, _message: &str) {}
}

/// Forwards every notification as an [`UpdateEvent`] over a channel, for
/// front ends whose event loop runs on another thread.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: Sender<UpdateEvent>,
}

impl ChannelSink {
    /// Wrap a sender.
    pub fn new(tx: Sender<UpdateEvent>) -> Self {
        Self { tx }
    }

    fn send(&self, event: UpdateEvent) {
        if self.tx.send(event).is_err() {
            tracing::debug!("progress receiver dropped; event discarded");
        }
    }
}

impl ProgressSink for ChannelSink {
    fn on_progress(&mut self, percent: u8) {
        self.send(UpdateEvent::Progress(percent));
    }

    fn on_state_change(&mut self, stage: &UpdateStage) {
        self.send(UpdateEvent::StateChanged(stage.clone()));
    }

    fn on_error(&mut self, message: &str) {
        self.send(UpdateEvent::Error(message.to_owned()));
    }
}

/// Callback type for receiving update events.
pub type ProgressCallback = Box<dyn Fn(UpdateEvent) + Send + Sync>;

/// Adapts a [`ProgressCallback`] into a [`ProgressSink`].
pub struct CallbackSink(pub ProgressCallback);

impl ProgressSink for CallbackSink {
    fn on_progress(&mut self, percent: u8) {
        (self.0)(UpdateEvent::Progress(percent));
    }

    fn on_state_change(&mut self, stage: &UpdateStage) {
        (self.0)(UpdateEvent::StateChanged(stage.clone()));
    }

    fn on_error(&mut self, message: &str) {
        (self.0)(UpdateEvent::Error(message.to_owned()));
    }
}

/// Named placeholder arguments, e.g. `[("version", "1.4.0".into())]`.
pub type Args<'a> = [(&'a str, String)];

/// Asks the user a yes/no question.
pub trait Confirm {
    /// `prompt_key` is a translation key; `args` fill its placeholders.
    fn confirm(&mut self, prompt_key: &str, args: &Args<'_>) -> bool;
}

/// Answers yes to every prompt (unattended updates).
#[derive(Debug, Default, Clone, Copy)]
pub struct AlwaysConfirm;

impl Confirm for AlwaysConfirm {
    fn confirm(&mut self, _prompt_key: &str, _args: &Args<'_>) -> bool {
        true
    }
}

/// Answers no to every prompt.
#[derive(Debug, Default, Clone, Copy)]
pub struct NeverConfirm;

impl Confirm for NeverConfirm {
    fn confirm(&mut self, _prompt_key: &str, _args: &Args<'_>) -> bool {
        false
    }
}

/// Looks up user-visible text by key.
pub trait Translate {
    /// Translate `key` and substitute `{name}` placeholders from `args`.
    fn translate(&self, key: &str, args: &Args<'_>) -> String;
}

/// Built-in English strings for the update flow. Unknown keys are returned
/// verbatim so a missing translation never hides an error.
#[derive(Debug, Default, Clone, Copy)]
pub struct EnglishTranslations;

impl EnglishTranslations {
    fn template(key: &str) -> Option<&'static str> {
        let text = match key {
            "update_available_title" => "Update Available",
            "update_available_msg" => {
                "New version available (v{version})!\n\nCurrent version: v{current_version}\n\nWould you like to download and install it now?"
            }
            "no_updates_title" => "No Updates",
            "no_updates_msg" => "You are using the latest version (v{version})",
            "update_check_error" => "Failed to check for updates. Please try again later.",
            "update_error_msg" => {
                "Update failed:\n{error}\n\nYou can download the latest version manually from {url}"
            }
            "update_no_asset" => "No download is available for your platform in v{version}.",
            "update_install_error" => "The update could not be installed:\n{error}",
            "update_now_title" => "Update Now",
            _ => return None,
        };
        Some(text)
    }
}

impl Translate for EnglishTranslations {
    fn translate(&self, key: &str, args: &Args<'_>) -> String {
        match Self::template(key) {
            Some(template) => format_template(template, args),
            None => key.to_owned(),
        }
    }
}

/// Replace every `{name}` in `template` with the matching argument.
pub fn format_template(template: &str, args: &Args<'_>) -> String {
    args.iter().fold(template.to_owned(), |text, (name, value)| {
        text.replace(&format!("{{{name}}}"), value)
    })
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn callback_receives_events() {
        let events: Arc<Mutex<Vec<UpdateEvent>>> = Arc::new(Mutex::new(Vec::new()));
        let events_clone = Arc::clone(&events);

        let mut sink = CallbackSink(Box::new(move |event| {
            let Ok(mut guard) = events_clone.lock() else {
                return;
            };
            guard.push(event);
        }));

        sink.on_state_change(&UpdateStage::Checking);
        sink.on_progress(40);
        sink.on_error("boom");

        let guard = events.lock().unwrap_or_else(|e| e.into_inner());
        assert_eq!(
            *guard,
            vec![
                UpdateEvent::StateChanged(UpdateStage::Checking),
                UpdateEvent::Progress(40),
                UpdateEvent::Error("boom".to_owned()),
            ]
        );
    }

    #[test]
    fn channel_sink_forwards_and_survives_dropped_receiver() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let mut sink = ChannelSink::new(tx);
        sink.on_progress(7);
        assert_eq!(rx.recv().unwrap(), UpdateEvent::Progress(7));

        drop(rx);
        sink.on_progress(8);
    }

    #[test]
    fn english_translation_substitutes_placeholders() {
        let text = EnglishTranslations.translate(
            "update_available_msg",
            &[
                ("version", "1.4.0".to_owned()),
                ("current_version", "1.3.1".to_owned()),
            ],
        );
        assert!(text.contains("v1.4.0"));
        assert!(text.contains("Current version: v1.3.1"));
        assert!(!text.contains('{'));
    }

    #[test]
    fn unknown_key_is_returned_verbatim() {
        assert_eq!(EnglishTranslations.translate("nope", &[]), "nope");
    }

    #[test]
    fn terminal_stages() {
        assert!(UpdateStage::Exiting.is_terminal());
        assert!(
            UpdateStage::Failed {
                kind: "network",
                message: "x".to_owned()
            }
            .is_terminal()
        );
        assert!(!UpdateStage::Installing.is_terminal());
        assert!(!UpdateStage::Checking.is_terminal());
    }

    #[test]
    fn confirm_defaults() {
        assert!(AlwaysConfirm.confirm("k", &[]));
        assert!(!NeverConfirm.confirm("k", &[]));
    }
}
