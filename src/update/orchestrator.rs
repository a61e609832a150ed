//! End-to-end update flow.
//!
//! ```text
//! Idle -> Checking -> UpToDate
//!                  -> UpdateAvailable -> Declined | Skipped
//!                                     -> Downloading -> Downloaded -> Installing -> Exiting
//! any stage -> Failed
//! ```
//!
//! The orchestrator runs on the caller's thread. Only the download moves to a
//! worker thread; its progress comes back over a channel and is forwarded to
//! the [`ProgressSink`] here, so sinks never need to be `Send`.
//!
//! The release check and the install steps block. GUI callers should drive
//! the orchestrator from their own worker thread and hand it a
//! [`ChannelSink`](crate::progress::ChannelSink) so events reach the UI
//! thread without blocking it.
//!
//! Once a run reaches `Exiting` the orchestrator is spent: later calls to
//! [`check`](UpdateOrchestrator::check) or [`run`](UpdateOrchestrator::run)
//! touch neither the network nor the disk.

use crate::config::UpdateConfig;
use crate::error::{Result, UpdateError};
use crate::platform::Platform;
use crate::progress::{Confirm, EnglishTranslations, ProgressSink, Translate, UpdateStage};
use crate::update::checker::{ReleaseInfo, UpdateChecker, is_newer};
use crate::update::downloader::{CancelToken, DownloadStatus, Downloader, WorkerMessage};
use crate::update::installer::default_install_path;
use crate::update::script::ScriptOptions;
use crate::update::selector::select_asset;
use crate::update::state::{AutoUpdatePreference, UpdateState};
use crate::update::strategy::{DetachedSpawner, InstallStrategy, ScriptSpawner};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Called once the helper is running; expected to terminate the app.
pub type ExitHook = Box<dyn FnOnce() + Send>;

/// Drives check, confirm, download, install and exit.
pub struct UpdateOrchestrator {
    config: UpdateConfig,
    state: UpdateState,
    state_path: Option<PathBuf>,
    platform: Platform,
    stage: UpdateStage,
    manual: bool,
    latest: Option<ReleaseInfo>,
    checker: UpdateChecker,
    downloader: Downloader,
    cancel: CancelToken,
    spawner: Box<dyn ScriptSpawner>,
    translator: Box<dyn Translate + Send>,
    exit_hook: Option<ExitHook>,
    install_path: Option<PathBuf>,
    script_options: ScriptOptions,
}

impl UpdateOrchestrator {
    /// Create an orchestrator. Nothing touches the network until
    /// [`check`](Self::check) or [`run`](Self::run).
    pub fn new(config: UpdateConfig, state: UpdateState, platform: Platform) -> Self {
        let script_options = ScriptOptions {
            delay_secs: config.relaunch_delay_secs,
            ..ScriptOptions::default()
        };
        Self {
            checker: UpdateChecker::new(&config),
            downloader: Downloader::new(&config),
            install_path: config.install_path.clone(),
            config,
            state,
            state_path: None,
            platform,
            stage: UpdateStage::Idle,
            manual: false,
            latest: None,
            cancel: CancelToken::new(),
            spawner: Box::new(DetachedSpawner),
            translator: Box::new(EnglishTranslations),
            exit_hook: None,
            script_options,
        }
    }

    /// Replace how helper processes are launched.
    pub fn with_spawner(mut self, spawner: impl ScriptSpawner + 'static) -> Self {
        self.spawner = Box::new(spawner);
        self
    }

    /// Replace the user-visible strings.
    pub fn with_translator(mut self, translator: impl Translate + Send + 'static) -> Self {
        self.translator = Box::new(translator);
        self
    }

    /// Set what happens once the helper is running (usually `process::exit`).
    pub fn with_exit_hook(mut self, hook: impl FnOnce() + Send + 'static) -> Self {
        self.exit_hook = Some(Box::new(hook));
        self
    }

    /// Override the path that gets replaced.
    pub fn with_install_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.install_path = Some(path.into());
        self
    }

    /// Persist state changes (last check time) to `path`.
    pub fn with_state_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.state_path = Some(path.into());
        self
    }

    /// Directory the helper script is written to.
    pub fn with_script_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.script_options.script_dir = dir.into();
        self
    }

    /// A user-initiated check: always asks, even for dismissed releases or
    /// when the preference is `Never`.
    pub fn manual(mut self, manual: bool) -> Self {
        self.manual = manual;
        self
    }

    /// Current stage.
    pub fn stage(&self) -> &UpdateStage {
        &self.stage
    }

    /// Current persisted state.
    pub fn state(&self) -> &UpdateState {
        &self.state
    }

    /// Release found by the last successful check.
    pub fn latest(&self) -> Option<&ReleaseInfo> {
        self.latest.as_ref()
    }

    /// Token that cancels an in-flight download from any thread.
    ///
    /// A cancellation aborts at most one download; the token is reset when
    /// that download ends.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Fetch the latest release and compare it with the running version.
    ///
    /// Returns the release when it is newer.
    ///
    /// # Errors
    ///
    /// Returns [`UpdateError::Network`] or [`UpdateError::Parse`]; the stage
    /// becomes `Failed` and the sink receives the error.
    ///
    /// Blocks on the metadata request; see the module docs for GUI callers.
    /// After `Exiting` this returns the release being installed and does
    /// nothing else.
    pub fn check(&mut self, sink: &mut dyn ProgressSink) -> Result<Option<ReleaseInfo>> {
        if self.stage == UpdateStage::Exiting {
            tracing::warn!("check requested after the update helper took over; ignoring");
            return Ok(self.latest.clone());
        }
        self.transition(sink, UpdateStage::Checking);

        let release = match self.checker.check_latest() {
            Ok(release) => release,
            Err(e) => {
                let message = self.translator.translate("update_check_error", &[]);
                return Err(self.fail(sink, e, &message));
            }
        };

        self.state.mark_checked();
        self.persist_state();

        let current = self.state.current_version.clone();
        if !is_newer(release.version(), &current, self.config.version_ordering) {
            self.transition(sink, UpdateStage::UpToDate { version: current });
            self.latest = Some(release);
            return Ok(None);
        }

        self.transition(
            sink,
            UpdateStage::UpdateAvailable {
                current,
                latest: release.version().to_owned(),
            },
        );
        self.latest = Some(release.clone());
        Ok(Some(release))
    }

    /// Run the whole pipeline and return the terminal stage.
    ///
    /// On `Ok(UpdateStage::Exiting)` the exit hook has already been called.
    ///
    /// # Errors
    ///
    /// Any stage error. The stage is `Failed`, temp files are gone and the
    /// application can keep running.
    pub fn run(
        &mut self,
        sink: &mut dyn ProgressSink,
        confirm: &mut dyn Confirm,
    ) -> Result<UpdateStage> {
        if self.stage == UpdateStage::Exiting {
            tracing::warn!("update already handed to the helper; not running again");
            return Ok(UpdateStage::Exiting);
        }
        let Some(release) = self.check(sink)? else {
            return Ok(self.stage.clone());
        };
        let version = release.version().to_owned();

        if !self.manual {
            if self.state.is_dismissed(&version) {
                tracing::info!(version = %version, "release was dismissed; skipping");
                return Ok(self.transition(sink, UpdateStage::Skipped { version }));
            }
            if self.state.auto_update == AutoUpdatePreference::Never {
                tracing::info!(version = %version, "auto-update disabled; skipping");
                return Ok(self.transition(sink, UpdateStage::Skipped { version }));
            }
        }

        let ask = self.manual || self.state.auto_update == AutoUpdatePreference::Ask;
        if ask {
            let args = [
                ("version", version.clone()),
                ("current_version", self.state.current_version.clone()),
            ];
            if !confirm.confirm("update_available_msg", &args) {
                tracing::info!(version = %version, "update declined");
                return Ok(self.transition(sink, UpdateStage::Declined { version }));
            }
        }

        let Some(asset) = select_asset(&release, self.platform) else {
            let message = self
                .translator
                .translate("update_no_asset", &[("version", version.clone())]);
            let err = UpdateError::NoAsset(format!("release {version} has no assets"));
            return Err(self.fail(sink, err, &message));
        };

        self.transition(sink, UpdateStage::Downloading { version });
        let path = match self.download(&asset.download_url, sink) {
            Ok(path) => path,
            Err(e) => return Err(self.fail_with_hint(sink, e, &release)),
        };
        self.transition(sink, UpdateStage::Downloaded { path: path.clone() });

        self.transition(sink, UpdateStage::Installing);
        if let Err(e) = self.install(&path) {
            let message = self
                .translator
                .translate("update_install_error", &[("error", e.to_string())]);
            return Err(self.fail(sink, e, &message));
        }

        self.transition(sink, UpdateStage::Exiting);
        std::thread::sleep(Duration::from_millis(self.config.exit_delay_ms));
        match self.exit_hook.take() {
            Some(hook) => hook(),
            None => tracing::debug!("no exit hook installed; caller must exit"),
        }
        Ok(UpdateStage::Exiting)
    }

    fn download(&mut self, url: &str, sink: &mut dyn ProgressSink) -> Result<PathBuf> {
        let (tx, rx) = crossbeam_channel::unbounded();
        let handle = self.downloader.spawn(url.to_owned(), tx, self.cancel.clone())?;

        let mut last_percent: Option<u8> = None;
        let mut outcome = None;
        for msg in rx.iter() {
            match msg {
                WorkerMessage::Progress(task) => {
                    if task.status == DownloadStatus::Failed {
                        continue;
                    }
                    if let Some(percent) = task.percent()
                        && last_percent.is_none_or(|last| percent > last)
                    {
                        last_percent = Some(percent);
                        sink.on_progress(percent);
                    }
                }
                WorkerMessage::Finished(result) => {
                    outcome = Some(result);
                    break;
                }
            }
        }

        if handle.join().is_err() {
            tracing::error!("download thread panicked");
        }
        self.cancel.reset();
        outcome.unwrap_or_else(|| {
            Err(UpdateError::Download(
                "download worker exited unexpectedly".to_owned(),
            ))
        })
    }

    fn install(&mut self, download: &Path) -> Result<()> {
        let target = match &self.install_path {
            Some(path) => path.clone(),
            None => default_install_path(self.platform)?,
        };
        let strategy = InstallStrategy::for_platform(self.platform);

        let plan = match strategy.prepare(download, &target) {
            Ok(plan) => plan,
            Err(e) => {
                if let Err(rm) = std::fs::remove_file(download) {
                    tracing::warn!(path = %download.display(), "cannot remove download: {rm}");
                }
                return Err(e);
            }
        };

        let outcome = strategy.install(plan, &self.script_options, self.spawner.as_ref())?;
        tracing::info!(launched = %outcome.launched.display(), "install handed off");
        Ok(())
    }

    fn transition(&mut self, sink: &mut dyn ProgressSink, stage: UpdateStage) -> UpdateStage {
        tracing::info!(from = %self.stage, to = %stage, "update stage");
        self.stage = stage.clone();
        sink.on_state_change(&stage);
        stage
    }

    fn fail_with_hint(
        &mut self,
        sink: &mut dyn ProgressSink,
        err: UpdateError,
        release: &ReleaseInfo,
    ) -> UpdateError {
        let url = release
            .html_url()
            .unwrap_or(self.config.download_page_url.as_str())
            .to_owned();
        let message = self
            .translator
            .translate("update_error_msg", &[("error", err.to_string()), ("url", url)]);
        self.fail(sink, err, &message)
    }

    fn fail(&mut self, sink: &mut dyn ProgressSink, err: UpdateError, message: &str) -> UpdateError {
        tracing::error!(kind = err.kind(), "update failed: {err}");
        self.transition(
            sink,
            UpdateStage::Failed {
                kind: err.kind(),
                message: err.to_string(),
            },
        );
        sink.on_error(message);
        err
    }

    fn persist_state(&self) {
        if let Some(path) = &self.state_path
            && let Err(e) = self.state.save_to(path)
        {
            tracing::warn!("cannot persist update state: {e}");
        }
    }
}
