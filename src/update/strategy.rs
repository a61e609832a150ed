//! Platform install strategies.
//!
//! A strategy turns an [`InstallPlan`] into a running helper process. Once
//! [`InstallStrategy::install`] returns `Ok`, the helper is waiting for this
//! process to exit and the caller must quit.

use crate::error::{Result, UpdateError};
use crate::platform::Platform;
use crate::update::installer::{ArchiveInstaller, InstallPlan};
use crate::update::script::{ScriptOptions, render_script};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

/// Observable progress of one install attempt.
///
/// After `AppExiting` the helper takes over (`ScriptRunning`, then
/// `Relaunched`); those states are outside this process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallState {
    /// Nothing written yet.
    Idle,
    /// The helper script is on disk.
    ScriptWritten,
    /// The helper is running; the app must exit.
    AppExiting,
}

/// Result of a successful [`InstallStrategy::install`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallOutcome {
    /// Always [`InstallState::AppExiting`].
    pub state: InstallState,
    /// The helper script that was spawned, if any.
    pub script: Option<PathBuf>,
    /// What was launched: the script, or the installer for direct installs.
    pub launched: PathBuf,
}

/// Launches helper processes that outlive the application.
pub trait ScriptSpawner: Send + Sync {
    /// Start `script` detached from this process.
    fn spawn_script(&self, platform: Platform, script: &Path) -> std::io::Result<()>;

    /// Start a vendor installer detached from this process.
    fn spawn_installer(&self, installer: &Path) -> std::io::Result<()>;
}

/// Spawns through the system shell in a new process group so the helper
/// survives the application's exit.
#[derive(Debug, Default, Clone, Copy)]
pub struct DetachedSpawner;

#[cfg(windows)]
const DETACHED_FLAGS: u32 = 0x0000_0200 /* CREATE_NEW_PROCESS_GROUP */ | 0x0000_0008 /* DETACHED_PROCESS */;

impl DetachedSpawner {
    fn detach(cmd: &mut Command) -> &mut Command {
        cmd.stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            cmd.process_group(0);
        }
        #[cfg(windows)]
        {
            use std::os::windows::process::CommandExt;
            cmd.creation_flags(DETACHED_FLAGS);
        }
        cmd
    }
}

impl ScriptSpawner for DetachedSpawner {
    fn spawn_script(&self, platform: Platform, script: &Path) -> std::io::Result<()> {
        let mut cmd = match platform {
            Platform::Windows => {
                let mut cmd = Command::new("cmd");
                cmd.arg("/C").arg(script);
                cmd
            }
            Platform::Mac | Platform::Generic => {
                let mut cmd = Command::new("sh");
                cmd.arg(script);
                cmd
            }
        };
        let child = Self::detach(&mut cmd).spawn()?;
        tracing::debug!(pid = child.id(), script = %script.display(), "helper spawned");
        Ok(())
    }

    fn spawn_installer(&self, installer: &Path) -> std::io::Result<()> {
        let child = Self::detach(&mut Command::new(installer)).spawn()?;
        tracing::debug!(pid = child.id(), installer = %installer.display(), "installer spawned");
        Ok(())
    }
}

/// One strategy per platform family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallStrategy {
    /// `.app` bundle replacement or `.pkg` installer.
    Mac,
    /// Setup executable, portable tree or single-exe swap via a `.bat` helper.
    Windows,
    /// File tree or single executable via an `sh` helper.
    Generic,
}

impl InstallStrategy {
    /// Strategy for `platform`.
    pub fn for_platform(platform: Platform) -> Self {
        match platform {
            Platform::Mac => Self::Mac,
            Platform::Windows => Self::Windows,
            Platform::Generic => Self::Generic,
        }
    }

    /// Platform this strategy installs for.
    pub fn platform(self) -> Platform {
        match self {
            Self::Mac => Platform::Mac,
            Self::Windows => Platform::Windows,
            Self::Generic => Platform::Generic,
        }
    }

    /// Unpack `local_path` into a plan that replaces `current_install_path`.
    ///
    /// # Errors
    ///
    /// See [`ArchiveInstaller::prepare`].
    pub fn prepare(self, local_path: &Path, current_install_path: &Path) -> Result<InstallPlan> {
        ArchiveInstaller::new(self.platform(), current_install_path).prepare(local_path)
    }

    /// Write and launch the helper for `plan`.
    ///
    /// The plan is consumed. On error its temp files are removed and the
    /// caller keeps running; on success the caller must exit.
    ///
    /// # Errors
    ///
    /// - [`UpdateError::Permission`] if the install target or script
    ///   location is not writable
    /// - [`UpdateError::InstallSpawn`] if the helper cannot be started
    pub fn install(
        self,
        plan: InstallPlan,
        options: &ScriptOptions,
        spawner: &dyn ScriptSpawner,
    ) -> Result<InstallOutcome> {
        if plan.platform != self.platform() {
            let err = UpdateError::InstallSpawn(format!(
                "{} plan cannot be installed by the {} strategy",
                plan.platform,
                self.platform()
            ));
            plan.discard();
            return Err(err);
        }

        let mut state = InstallState::Idle;
        tracing::debug!(?state, kind = ?plan.payload_kind, "install starting");

        if let Err(e) = check_writable(&plan) {
            plan.discard();
            return Err(e);
        }

        let Some(script) = render_script(&plan, options) else {
            return match spawner.spawn_installer(&plan.artifact_path) {
                Ok(()) => {
                    tracing::info!(installer = %plan.artifact_path.display(), "installer launched");
                    Ok(InstallOutcome {
                        state: InstallState::AppExiting,
                        script: None,
                        launched: plan.artifact_path,
                    })
                }
                Err(e) => {
                    let err = UpdateError::InstallSpawn(format!(
                        "cannot launch installer {}: {e}",
                        plan.artifact_path.display()
                    ));
                    plan.discard();
                    Err(err)
                }
            };
        };

        let script_path = options.script_path(self.platform());
        if let Err(e) = write_script(&script_path, &script) {
            plan.discard();
            return Err(e);
        }
        state = InstallState::ScriptWritten;
        tracing::debug!(?state, script = %script_path.display(), "helper script written");

        if let Err(e) = spawner.spawn_script(self.platform(), &script_path) {
            if let Err(rm) = std::fs::remove_file(&script_path) {
                tracing::warn!(script = %script_path.display(), "cannot remove helper script: {rm}");
            }
            plan.discard();
            return Err(UpdateError::InstallSpawn(format!(
                "cannot launch {}: {e}",
                script_path.display()
            )));
        }

        state = InstallState::AppExiting;
        tracing::info!(?state, script = %script_path.display(), "update helper running");
        Ok(InstallOutcome {
            state,
            script: Some(script_path.clone()),
            launched: script_path,
        })
    }
}

/// Fail early if the directory the helper will write into is not writable.
fn check_writable(plan: &InstallPlan) -> Result<()> {
    let Some(dir) = plan.target_dir() else {
        return Ok(());
    };
    tempfile::tempfile_in(&dir).map(drop).map_err(|e| {
        UpdateError::Permission(format!("cannot write to {}: {e}", dir.display()))
    })
}

fn write_script(path: &Path, contents: &str) -> Result<()> {
    let classify = |e: std::io::Error| {
        if e.kind() == std::io::ErrorKind::PermissionDenied {
            UpdateError::Permission(format!("cannot write {}: {e}", path.display()))
        } else {
            UpdateError::InstallSpawn(format!("cannot write {}: {e}", path.display()))
        }
    };

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(classify)?;
    }
    std::fs::write(path, contents).map_err(classify)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).map_err(classify)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::update::installer::PayloadKind;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingSpawner {
        scripts: Mutex<Vec<(PathBuf, String)>>,
        installers: Mutex<Vec<PathBuf>>,
    }

    impl ScriptSpawner for RecordingSpawner {
        fn spawn_script(&self, _platform: Platform, script: &Path) -> std::io::Result<()> {
            let body = std::fs::read_to_string(script)?;
            self.scripts.lock().unwrap().push((script.to_path_buf(), body));
            Ok(())
        }

        fn spawn_installer(&self, installer: &Path) -> std::io::Result<()> {
            self.installers.lock().unwrap().push(installer.to_path_buf());
            Ok(())
        }
    }

    struct FailingSpawner;

    impl ScriptSpawner for FailingSpawner {
        fn spawn_script(&self, _platform: Platform, _script: &Path) -> std::io::Result<()> {
            Err(std::io::Error::new(std::io::ErrorKind::NotFound, "no shell"))
        }

        fn spawn_installer(&self, _installer: &Path) -> std::io::Result<()> {
            Err(std::io::Error::new(std::io::ErrorKind::NotFound, "no installer"))
        }
    }

    struct Fixture {
        _root: tempfile::TempDir,
        options: ScriptOptions,
        install_dir: PathBuf,
        download: PathBuf,
    }

    fn fixture() -> Fixture {
        let root = tempfile::tempdir().unwrap();
        let install_dir = root.path().join("install");
        std::fs::create_dir_all(&install_dir).unwrap();
        let download = root.path().join("lexigen-update-x.AppImage");
        std::fs::write(&download, b"new").unwrap();
        Fixture {
            options: ScriptOptions {
                delay_secs: 0,
                script_dir: root.path().join("scripts"),
            },
            install_dir,
            download,
            _root: root,
        }
    }

    fn executable_plan(f: &Fixture, platform: Platform) -> InstallPlan {
        InstallPlan {
            platform,
            artifact_path: f.download.clone(),
            current_install_path: f.install_dir.join("LexiGen.AppImage"),
            payload_kind: PayloadKind::Executable,
            mount_point: None,
            work_dir: None,
            download_path: f.download.clone(),
        }
    }

    #[test]
    fn install_writes_and_spawns_script() {
        let f = fixture();
        let spawner = RecordingSpawner::default();
        let outcome = InstallStrategy::Generic
            .install(executable_plan(&f, Platform::Generic), &f.options, &spawner)
            .unwrap();

        assert_eq!(outcome.state, InstallState::AppExiting);
        let script = f.options.script_path(Platform::Generic);
        assert_eq!(outcome.script.as_deref(), Some(script.as_path()));

        let spawned = spawner.scripts.lock().unwrap();
        assert_eq!(spawned.len(), 1);
        assert!(spawned[0].1.contains("chmod +x"));

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&script).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o755);
        }
        // The helper, not the strategy, consumes the download.
        assert!(f.download.exists());
    }

    #[test]
    fn spawn_failure_is_install_spawn_and_cleans_up() {
        let f = fixture();
        let err = InstallStrategy::Generic
            .install(executable_plan(&f, Platform::Generic), &f.options, &FailingSpawner)
            .unwrap_err();

        assert!(matches!(err, UpdateError::InstallSpawn(_)));
        assert!(!f.options.script_path(Platform::Generic).exists());
        assert!(!f.download.exists());
    }

    #[test]
    fn missing_install_dir_is_permission_error() {
        let f = fixture();
        let mut plan = executable_plan(&f, Platform::Generic);
        plan.current_install_path = f.install_dir.join("gone").join("LexiGen.AppImage");
        let spawner = RecordingSpawner::default();

        let err = InstallStrategy::Generic.install(plan, &f.options, &spawner).unwrap_err();
        assert!(matches!(err, UpdateError::Permission(_)));
        assert!(spawner.scripts.lock().unwrap().is_empty());
    }

    #[test]
    fn windows_installer_is_launched_directly() {
        let f = fixture();
        let mut plan = executable_plan(&f, Platform::Windows);
        plan.payload_kind = PayloadKind::Installer;
        let spawner = RecordingSpawner::default();

        let outcome = InstallStrategy::Windows.install(plan, &f.options, &spawner).unwrap();
        assert_eq!(outcome.script, None);
        assert_eq!(outcome.launched, f.download);
        assert_eq!(*spawner.installers.lock().unwrap(), vec![f.download.clone()]);
        assert!(!f.options.script_path(Platform::Windows).exists());
    }

    #[test]
    fn installer_spawn_failure_is_reported() {
        let f = fixture();
        let mut plan = executable_plan(&f, Platform::Windows);
        plan.payload_kind = PayloadKind::Installer;
        let err = InstallStrategy::Windows
            .install(plan, &f.options, &FailingSpawner)
            .unwrap_err();
        assert!(matches!(err, UpdateError::InstallSpawn(_)));
    }

    #[test]
    fn mismatched_plan_is_rejected() {
        let f = fixture();
        let err = InstallStrategy::Mac
            .install(
                executable_plan(&f, Platform::Generic),
                &f.options,
                &RecordingSpawner::default(),
            )
            .unwrap_err();
        assert!(matches!(err, UpdateError::InstallSpawn(_)));
    }

    #[test]
    fn strategy_selection_round_trips() {
        for p in [Platform::Mac, Platform::Windows, Platform::Generic] {
            assert_eq!(InstallStrategy::for_platform(p).platform(), p);
        }
    }

    #[cfg(unix)]
    #[test]
    fn detached_spawner_runs_script() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("ran");
        let script = dir.path().join("helper.sh");
        std::fs::write(&script, format!("#!/bin/sh\ntouch '{}'\n", marker.display())).unwrap();

        DetachedSpawner.spawn_script(Platform::Generic, &script).unwrap();

        let deadline = std::time::Instant::now() + std::time::Duration::from_secs(10);
        while !marker.exists() && std::time::Instant::now() < deadline {
            std::thread::sleep(std::time::Duration::from_millis(50));
        }
        assert!(marker.exists());
    }
}
