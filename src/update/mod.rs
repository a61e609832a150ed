//! Self-update system for LexiGen.
//!
//! Checks GitHub releases for a newer version, picks the asset for this
//! platform, streams it to disk on a worker thread, unpacks it and hands
//! the final file swap to a detached helper script so the running app can
//! exit and be replaced.

pub mod checker;
pub mod downloader;
pub mod installer;
pub mod orchestrator;
pub mod script;
pub mod selector;
pub mod state;
pub mod strategy;

pub use checker::{AssetInfo, ReleaseInfo, UpdateChecker, is_newer};
pub use downloader::{CancelToken, DownloadStatus, DownloadTask, Downloader, WorkerMessage};
pub use installer::{ArchiveInstaller, InstallPlan, PayloadKind};
pub use orchestrator::{ExitHook, UpdateOrchestrator};
pub use script::{ScriptOptions, render_script};
pub use selector::select_asset;
pub use state::{AutoUpdatePreference, UpdateState};
pub use strategy::{DetachedSpawner, InstallOutcome, InstallState, InstallStrategy, ScriptSpawner};
