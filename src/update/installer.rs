//! Turns a downloaded artifact into an [`InstallPlan`].
//!
//! Disk images are mounted read-only, zips are extracted into a fresh temp
//! directory, and single files are used in place. Nothing here touches the
//! current installation; that is the job of the helper script rendered from
//! the plan.

use crate::error::{Result, UpdateError};
use crate::platform::Platform;
use crate::update::downloader::extension_of;
use std::collections::VecDeque;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

/// What the payload inside the artifact is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadKind {
    /// A macOS `.app` bundle that replaces the installed bundle.
    AppBundle,
    /// A vendor installer (`.pkg`, `*setup*.exe`) that is launched as-is.
    Installer,
    /// A directory tree copied over the install directory.
    RawFiles,
    /// A single executable that replaces the running one.
    Executable,
}

/// Everything the install strategy needs to replace the running app.
///
/// Deliberately not `Clone`: a plan is consumed exactly once, either by
/// [`InstallStrategy::install`](crate::update::InstallStrategy::install) or
/// by [`InstallPlan::discard`].
#[derive(Debug)]
pub struct InstallPlan {
    /// Platform the plan was prepared for.
    pub platform: Platform,
    /// The payload: `.app` bundle, installer, extracted root or executable.
    pub artifact_path: PathBuf,
    /// What gets replaced: the `.app` bundle on macOS, the running
    /// executable elsewhere.
    pub current_install_path: PathBuf,
    /// Payload type.
    pub payload_kind: PayloadKind,
    /// Disk image mount point to detach after the copy.
    pub mount_point: Option<PathBuf>,
    /// Temp extraction directory to remove after the copy.
    pub work_dir: Option<PathBuf>,
    /// The downloaded artifact itself.
    pub download_path: PathBuf,
}

impl InstallPlan {
    /// Directory the helper script writes into, or `None` for installers
    /// that manage their own target.
    pub fn target_dir(&self) -> Option<PathBuf> {
        match self.payload_kind {
            PayloadKind::Installer => None,
            PayloadKind::AppBundle | PayloadKind::RawFiles | PayloadKind::Executable => self
                .current_install_path
                .parent()
                .map(Path::to_path_buf),
        }
    }

    /// Abandon the plan: detach the image and delete every temp artifact.
    ///
    /// Best effort; failures are logged.
    pub fn discard(self) {
        if let Some(mount) = &self.mount_point {
            detach_image(mount);
            remove_path(mount);
        }
        if let Some(work) = &self.work_dir {
            remove_path(work);
        }
        remove_path(&self.download_path);
        tracing::debug!(download = %self.download_path.display(), "install plan discarded");
    }
}

/// Prepares downloaded artifacts for installation.
#[derive(Debug, Clone)]
pub struct ArchiveInstaller {
    platform: Platform,
    current_install_path: PathBuf,
}

impl ArchiveInstaller {
    /// Installer for `platform` replacing `current_install_path`.
    pub fn new(platform: Platform, current_install_path: impl Into<PathBuf>) -> Self {
        Self {
            platform,
            current_install_path: current_install_path.into(),
        }
    }

    /// Inspect `download_path` and produce an install plan.
    ///
    /// # Errors
    ///
    /// Returns [`UpdateError::Extraction`] for a corrupt archive, a disk
    /// image that cannot be mounted, an archive without a usable payload or
    /// an artifact type that does not belong to this platform. Temp
    /// directories are removed and images detached before returning.
    pub fn prepare(&self, download_path: &Path) -> Result<InstallPlan> {
        let ext = extension_of(download_path);
        tracing::debug!(
            path = %download_path.display(),
            platform = %self.platform,
            ext = %ext,
            "preparing artifact"
        );

        match (self.platform, ext.as_str()) {
            (Platform::Mac, "dmg") => self.prepare_dmg(download_path),
            (Platform::Mac, "pkg") => {
                Ok(self.plan(PayloadKind::Installer, download_path, download_path))
            }
            (Platform::Windows, "exe") => {
                let kind = if is_setup_name(download_path) {
                    PayloadKind::Installer
                } else {
                    PayloadKind::Executable
                };
                Ok(self.plan(kind, download_path, download_path))
            }
            (Platform::Generic, "appimage" | "") => {
                Ok(self.plan(PayloadKind::Executable, download_path, download_path))
            }
            (_, "zip") => self.prepare_zip(download_path),
            (platform, ext) => Err(UpdateError::Extraction(format!(
                "cannot install a .{ext} artifact on {platform}: {}",
                download_path.display()
            ))),
        }
    }

    fn plan(&self, kind: PayloadKind, artifact: &Path, download: &Path) -> InstallPlan {
        InstallPlan {
            platform: self.platform,
            artifact_path: artifact.to_path_buf(),
            current_install_path: self.current_install_path.clone(),
            payload_kind: kind,
            mount_point: None,
            work_dir: None,
            download_path: download.to_path_buf(),
        }
    }

    fn prepare_zip(&self, download_path: &Path) -> Result<InstallPlan> {
        let work = tempfile::Builder::new()
            .prefix("lexigen-extract-")
            .tempdir()
            .map_err(|e| UpdateError::Extraction(format!("cannot create extraction dir: {e}")))?;

        extract_zip(download_path, work.path())?;

        let (kind, artifact) = match self.platform {
            Platform::Mac => {
                let bundle = find_shallowest(work.path(), is_app_bundle).ok_or_else(|| {
                    UpdateError::Extraction("archive does not contain a .app bundle".to_owned())
                })?;
                (PayloadKind::AppBundle, bundle)
            }
            Platform::Windows => match find_shallowest(work.path(), is_setup_exe) {
                Some(setup) => (PayloadKind::Installer, setup),
                None => (PayloadKind::RawFiles, payload_root(work.path())?),
            },
            Platform::Generic => (PayloadKind::RawFiles, payload_root(work.path())?),
        };

        let work_dir = work.keep();
        tracing::info!(
            artifact = %artifact.display(),
            kind = ?kind,
            "archive extracted"
        );
        Ok(InstallPlan {
            work_dir: Some(work_dir),
            ..self.plan(kind, &artifact, download_path)
        })
    }

    fn prepare_dmg(&self, download_path: &Path) -> Result<InstallPlan> {
        which::which("hdiutil").map_err(|_| {
            UpdateError::Extraction("hdiutil not found; cannot mount disk image".to_owned())
        })?;

        let mount = tempfile::Builder::new()
            .prefix("lexigen-mount-")
            .tempdir()
            .map_err(|e| UpdateError::Extraction(format!("cannot create mount point: {e}")))?;

        let output = Command::new("hdiutil")
            .args(["attach", "-nobrowse", "-readonly", "-mountpoint"])
            .arg(mount.path())
            .arg(download_path)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| UpdateError::Extraction(format!("cannot run hdiutil: {e}")))?;

        if !output.status.success() {
            return Err(UpdateError::Extraction(format!(
                "failed to mount {}: {}",
                download_path.display(),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let guard = MountGuard(Some(mount.keep()));
        let mount_point = guard.path();
        tracing::info!(mount = %mount_point.display(), "disk image mounted");

        let (kind, artifact) = if let Some(bundle) = find_shallowest(&mount_point, is_app_bundle) {
            (PayloadKind::AppBundle, bundle)
        } else if let Some(pkg) = find_shallowest(&mount_point, is_pkg) {
            (PayloadKind::Installer, pkg)
        } else {
            return Err(UpdateError::Extraction(
                "disk image contains neither a .app bundle nor a .pkg".to_owned(),
            ));
        };

        Ok(InstallPlan {
            mount_point: guard.disarm(),
            ..self.plan(kind, &artifact, download_path)
        })
    }
}

/// Detaches and removes a mount point unless disarmed.
struct MountGuard(Option<PathBuf>);

impl MountGuard {
    fn path(&self) -> PathBuf {
        self.0.clone().unwrap_or_default()
    }

    fn disarm(mut self) -> Option<PathBuf> {
        self.0.take()
    }
}

impl Drop for MountGuard {
    fn drop(&mut self) {
        if let Some(mount) = self.0.take() {
            detach_image(&mount);
            remove_path(&mount);
        }
    }
}

fn detach_image(mount: &Path) {
    match Command::new("hdiutil")
        .args(["detach", "-force"])
        .arg(mount)
        .stdin(Stdio::null())
        .output()
    {
        Ok(output) if output.status.success() => {
            tracing::debug!(mount = %mount.display(), "disk image detached");
        }
        Ok(output) => tracing::warn!(
            mount = %mount.display(),
            "failed to detach disk image: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        ),
        Err(e) => tracing::warn!(mount = %mount.display(), "cannot run hdiutil detach: {e}"),
    }
}

fn remove_path(path: &Path) {
    let result = if path.is_dir() {
        std::fs::remove_dir_all(path)
    } else {
        std::fs::remove_file(path)
    };
    match result {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(path = %path.display(), "cleanup failed: {e}"),
    }
}

/// Extract every entry of `archive_path` below `dest`.
///
/// Entries whose names would escape `dest` are skipped, as are symlinks
/// pointing outside it. Symlinks are recreated as links so framework
/// `Versions/Current` aliases inside bundles survive.
fn extract_zip(archive_path: &Path, dest: &Path) -> Result<()> {
    let corrupt = |e: zip::result::ZipError| {
        UpdateError::Extraction(format!("corrupt archive {}: {e}", archive_path.display()))
    };
    let io = |e: std::io::Error| UpdateError::Extraction(format!("extraction failed: {e}"));

    let file = File::open(archive_path).map_err(io)?;
    let mut archive = zip::ZipArchive::new(file).map_err(corrupt)?;

    for index in 0..archive.len() {
        let mut entry = archive.by_index(index).map_err(corrupt)?;
        let Some(relative) = entry.enclosed_name() else {
            tracing::warn!(name = entry.name(), "skipping unsafe archive entry");
            continue;
        };
        let out_path = dest.join(&relative);

        if entry.is_dir() {
            std::fs::create_dir_all(&out_path).map_err(io)?;
            continue;
        }
        if let Some(parent) = out_path.parent() {
            std::fs::create_dir_all(parent).map_err(io)?;
        }

        if entry.is_symlink() {
            let mut target = String::new();
            std::io::Read::read_to_string(&mut entry, &mut target).map_err(io)?;
            if !link_stays_inside(&relative, Path::new(&target)) {
                tracing::warn!(name = entry.name(), %target, "skipping escaping symlink");
                continue;
            }
            create_symlink(Path::new(&target), &out_path).map_err(io)?;
            continue;
        }

        let mut out = File::create(&out_path).map_err(io)?;
        std::io::copy(&mut entry, &mut out).map_err(io)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Some(mode) = entry.unix_mode() {
                std::fs::set_permissions(&out_path, std::fs::Permissions::from_mode(mode & 0o7777))
                    .map_err(io)?;
            }
        }
    }
    Ok(())
}

/// Whether a link at archive path `link` resolving to `target` stays below
/// the extraction root.
fn link_stays_inside(link: &Path, target: &Path) -> bool {
    use std::path::Component;

    let mut depth = link.components().count().saturating_sub(1);
    for component in target.components() {
        match component {
            Component::Normal(_) => depth += 1,
            Component::CurDir => {}
            Component::ParentDir => match depth.checked_sub(1) {
                Some(d) => depth = d,
                None => return false,
            },
            Component::RootDir | Component::Prefix(_) => return false,
        }
    }
    true
}

#[cfg(unix)]
fn create_symlink(target: &Path, link: &Path) -> std::io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(not(unix))]
fn create_symlink(target: &Path, link: &Path) -> std::io::Result<()> {
    // Only bundle payloads carry links and those are unpacked on macOS.
    tracing::warn!(link = %link.display(), target = %target.display(), "symlink not recreated");
    Ok(())
}

/// Breadth-first search for the shallowest entry matching `pred`.
///
/// Never descends into `.app` bundles or symlinked directories. Entries are
/// visited in name order so the result is deterministic.
fn find_shallowest(root: &Path, pred: fn(&Path, bool) -> bool) -> Option<PathBuf> {
    let mut queue = VecDeque::from([root.to_path_buf()]);
    while let Some(dir) = queue.pop_front() {
        let mut entries: Vec<(PathBuf, bool)> = match std::fs::read_dir(&dir) {
            Ok(rd) => rd
                .filter_map(|e| e.ok())
                .map(|e| {
                    let is_dir = e.file_type().is_ok_and(|t| t.is_dir());
                    (e.path(), is_dir)
                })
                .collect(),
            Err(e) => {
                tracing::debug!(dir = %dir.display(), "cannot read directory: {e}");
                continue;
            }
        };
        entries.sort();

        if let Some((found, _)) = entries.iter().find(|(p, is_dir)| pred(p, *is_dir)) {
            return Some(found.clone());
        }
        queue.extend(
            entries
                .into_iter()
                .filter(|(p, is_dir)| *is_dir && !is_app_bundle(p, true))
                .map(|(p, _)| p),
        );
    }
    None
}

fn is_app_bundle(path: &Path, is_dir: bool) -> bool {
    is_dir && extension_of(path) == "app"
}

fn is_pkg(path: &Path, _is_dir: bool) -> bool {
    extension_of(path) == "pkg"
}

fn is_setup_exe(path: &Path, is_dir: bool) -> bool {
    !is_dir && extension_of(path) == "exe" && is_setup_name(path)
}

fn is_setup_name(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.to_ascii_lowercase().contains("setup"))
}

/// The directory whose contents get copied over the install dir. A single
/// top-level directory is unwrapped.
fn payload_root(extracted: &Path) -> Result<PathBuf> {
    let entries: Vec<_> = std::fs::read_dir(extracted)
        .map_err(|e| UpdateError::Extraction(format!("cannot read extracted files: {e}")))?
        .filter_map(|e| e.ok())
        .collect();

    match entries.as_slice() {
        [] => Err(UpdateError::Extraction("archive is empty".to_owned())),
        [only] if only.file_type().is_ok_and(|t| t.is_dir()) => Ok(only.path()),
        _ => Ok(extracted.to_path_buf()),
    }
}

/// What the running process would replace when updating on `platform`.
///
/// macOS returns the enclosing `.app` bundle when there is one; every other
/// case returns the running executable.
///
/// # Errors
///
/// Returns [`UpdateError::Io`] if the executable path cannot be determined.
pub fn default_install_path(platform: Platform) -> Result<PathBuf> {
    let exe = std::env::current_exe()?;
    if platform == Platform::Mac
        && let Some(bundle) = exe.ancestors().find(|p| extension_of(p) == "app")
    {
        return Ok(bundle.to_path_buf());
    }
    Ok(exe)
}
