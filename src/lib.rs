//! LexiGen self-update subsystem.
//!
//! Keeps an installed LexiGen current by checking GitHub releases,
//! downloading the platform's artifact and swapping the installation in
//! place through a detached helper script.
//!
//! # Architecture
//!
//! The pipeline is a chain of small stages, each returning
//! [`Result`]:
//! - **Check**: [`update::UpdateChecker`] fetches release metadata via `ureq`
//! - **Select**: [`update::select_asset`] picks the artifact for the [`Platform`]
//! - **Download**: [`update::Downloader`] streams it on a worker thread
//! - **Prepare**: [`update::ArchiveInstaller`] mounts or extracts the payload
//! - **Install**: [`update::InstallStrategy`] writes and spawns the helper script
//!
//! [`update::UpdateOrchestrator`] drives the stages and reports through a
//! [`progress::ProgressSink`].

pub mod app_dirs;
pub mod config;
pub mod error;
pub mod logging;
pub mod platform;
pub mod progress;
pub mod update;

pub use config::{AppConfig, LoggingConfig, UpdateConfig, VersionOrdering};
pub use error::{Result, UpdateError};
pub use platform::Platform;
pub use progress::{ProgressCallback, ProgressSink, UpdateEvent, UpdateStage};
pub use update::UpdateOrchestrator;
