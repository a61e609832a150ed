//! Streaming artifact download.
//!
//! Streams a release asset into a uniquely named temp file, reporting
//! progress after every chunk. The temp file carries the extension of the
//! URL because the installer dispatches on it. On any failure, including
//! cancellation, the partial file is removed before the error is returned.

use crate::config::UpdateConfig;
use crate::error::{Result, UpdateError};
use crossbeam_channel::Sender;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;

/// Extensions the installer knows how to handle, in canonical spelling.
const KNOWN_EXTENSIONS: &[&str] = &[".dmg", ".exe", ".zip", ".AppImage", ".pkg"];

/// Minimum byte delta between progress messages when the size is unknown.
const UNKNOWN_SIZE_REPORT_BYTES: u64 = 1024 * 1024;

/// Lifecycle of a single download.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadStatus {
    /// Temp file created, request not yet answered.
    Pending,
    /// Body is being streamed.
    InProgress,
    /// Every byte is on disk.
    Complete,
    /// The download failed or was cancelled; the temp file is gone.
    Failed,
}

/// Snapshot of a download. Mutated only on the download thread; receivers
/// get clones.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadTask {
    /// Source URL.
    pub url: String,
    /// Temp file receiving the body.
    pub destination_path: PathBuf,
    /// `Content-Length`, if the server sent one.
    pub bytes_total: Option<u64>,
    /// Bytes written so far.
    pub bytes_done: u64,
    /// Current status.
    pub status: DownloadStatus,
}

impl DownloadTask {
    fn new(url: &str, destination_path: PathBuf) -> Self {
        Self {
            url: url.to_owned(),
            destination_path,
            bytes_total: None,
            bytes_done: 0,
            status: DownloadStatus::Pending,
        }
    }

    /// Completion percentage, or `None` when the total size is unknown.
    pub fn percent(&self) -> Option<u8> {
        let total = self.bytes_total?;
        if total == 0 {
            return Some(100);
        }
        Some(((self.bytes_done.saturating_mul(100)) / total).min(100) as u8)
    }
}

/// Cooperative cancellation flag, checked between chunks.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// New, not-cancelled token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Returns `true` once [`cancel`](Self::cancel) has been called.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
    /// Clear a previous cancellation. Clones observe the reset too.
    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Messages sent from the download thread to the orchestrating thread.
#[derive(Debug)]
pub enum WorkerMessage {
    /// Progress snapshot.
    Progress(DownloadTask),
    /// Final outcome: the artifact path or the error.
    Finished(Result<PathBuf>),
}

/// Downloads release artifacts. Clones share the single-download guard.
#[derive(Clone)]
pub struct Downloader {
    agent: ureq::Agent,
    chunk_size: usize,
    download_dir: PathBuf,
    active: Arc<AtomicBool>,
}

/// Releases the single-download guard on every exit path.
struct ActiveGuard<'a>(&'a AtomicBool);

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl Downloader {
    /// Create a downloader using the HTTP, chunk and directory settings of `config`.
    pub fn new(config: &UpdateConfig) -> Self {
        Self {
            agent: config.http_agent(),
            chunk_size: config.chunk_size.max(1),
            download_dir: config.download_dir(),
            active: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Returns `true` while a download is running on this downloader.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Download `url` on the current thread.
    ///
    /// `on_update` receives a snapshot after every state change and chunk.
    ///
    /// # Errors
    ///
    /// - [`UpdateError::Network`] for transport failures and non-2xx responses
    /// - [`UpdateError::Download`] for read/write failures or a truncated body
    /// - [`UpdateError::Cancelled`] if `cancel` fired
    /// - [`UpdateError::Permission`] if the download dir is not writable
    ///
    /// No file is left behind on error.
    pub fn download(
        &self,
        url: &str,
        on_update: &mut dyn FnMut(&DownloadTask),
        cancel: &CancelToken,
    ) -> Result<PathBuf> {
        if self
            .active
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(UpdateError::Download(
                "another download is already in progress".to_owned(),
            ));
        }
        let _guard = ActiveGuard(&self.active);

        let mut temp = self.create_temp_file(url)?;
        let mut task = DownloadTask::new(url, temp.path().to_path_buf());
        on_update(&task);

        tracing::info!(url, dest = %task.destination_path.display(), "download started");

        match self.stream(url, temp.as_file_mut(), &mut task, on_update, cancel) {
            Ok(()) => {
                let (_, path) = temp.keep().map_err(|e| {
                    UpdateError::Download(format!("cannot keep downloaded file: {e}"))
                })?;
                task.status = DownloadStatus::Complete;
                on_update(&task);
                tracing::info!(bytes = task.bytes_done, path = %path.display(), "download complete");
                Ok(path)
            }
            Err(e) => {
                let path = temp.path().to_path_buf();
                if let Err(cleanup) = temp.close() {
                    tracing::warn!(path = %path.display(), "cannot remove partial download: {cleanup}");
                }
                task.status = DownloadStatus::Failed;
                on_update(&task);
                tracing::error!(url, "download failed: {e}");
                Err(e)
            }
        }
    }

    /// Run [`download`](Self::download) on a dedicated worker thread.
    ///
    /// Progress snapshots are sent as [`WorkerMessage::Progress`] whenever the
    /// percentage or status changes; the outcome always arrives as
    /// [`WorkerMessage::Finished`].
    ///
    /// # Errors
    ///
    /// Returns [`UpdateError::Download`] if the thread cannot be started.
    pub fn spawn(
        &self,
        url: String,
        tx: Sender<WorkerMessage>,
        cancel: CancelToken,
    ) -> Result<JoinHandle<()>> {
        let downloader = self.clone();
        std::thread::Builder::new()
            .name("lexigen-download".to_owned())
            .spawn(move || {
                let mut last: Option<(DownloadStatus, Option<u8>, u64)> = None;
                let mut forward = |task: &DownloadTask| {
                    let percent = task.percent();
                    let due = match last {
                        None => true,
                        Some((status, last_percent, last_bytes)) => {
                            status != task.status
                                || (percent.is_some() && percent != last_percent)
                                || (percent.is_none()
                                    && task.bytes_done - last_bytes >= UNKNOWN_SIZE_REPORT_BYTES)
                        }
                    };
                    if due {
                        last = Some((task.status, percent, task.bytes_done));
                        let _ = tx.send(WorkerMessage::Progress(task.clone()));
                    }
                };
                let result = downloader.download(&url, &mut forward, &cancel);
                if tx.send(WorkerMessage::Finished(result)).is_err() {
                    tracing::warn!("download finished but nobody is listening");
                }
            })
            .map_err(|e| UpdateError::Download(format!("cannot start download thread: {e}")))
    }

    fn create_temp_file(&self, url: &str) -> Result<tempfile::NamedTempFile> {
        std::fs::create_dir_all(&self.download_dir).map_err(|e| {
            io_to_update_error(
                e,
                &format!("cannot create download dir {}", self.download_dir.display()),
            )
        })?;
        tempfile::Builder::new()
            .prefix("lexigen-update-")
            .suffix(sniff_extension(url))
            .tempfile_in(&self.download_dir)
            .map_err(|e| {
                io_to_update_error(
                    e,
                    &format!("cannot create temp file in {}", self.download_dir.display()),
                )
            })
    }

    fn stream(
        &self,
        url: &str,
        file: &mut std::fs::File,
        task: &mut DownloadTask,
        on_update: &mut dyn FnMut(&DownloadTask),
        cancel: &CancelToken,
    ) -> Result<()> {
        if cancel.is_cancelled() {
            return Err(UpdateError::Cancelled);
        }

        let resp = self.agent.get(url).call().map_err(|e| match e {
            ureq::Error::Status(code, _) => {
                UpdateError::Network(format!("download returned HTTP {code}"))
            }
            ureq::Error::Transport(t) => UpdateError::Network(format!("download failed: {t}")),
        })?;

        task.bytes_total = resp
            .header("Content-Length")
            .and_then(|v| v.trim().parse::<u64>().ok());
        task.status = DownloadStatus::InProgress;
        on_update(task);

        let mut reader = resp.into_reader();
        let mut buf = vec![0u8; self.chunk_size];
        loop {
            if cancel.is_cancelled() {
                tracing::info!(bytes = task.bytes_done, "download cancelled");
                return Err(UpdateError::Cancelled);
            }
            let n = reader.read(&mut buf).map_err(|e| {
                UpdateError::Download(format!(
                    "read error after {} bytes: {e}",
                    task.bytes_done
                ))
            })?;
            if n == 0 {
                break;
            }
            file.write_all(&buf[..n])
                .map_err(|e| UpdateError::Download(format!("write error: {e}")))?;
            task.bytes_done += n as u64;
            on_update(task);
        }

        file.flush()
            .map_err(|e| UpdateError::Download(format!("cannot flush download: {e}")))?;
        file.sync_all()
            .map_err(|e| UpdateError::Download(format!("cannot sync download: {e}")))?;

        if let Some(total) = task.bytes_total
            && task.bytes_done != total
        {
            return Err(UpdateError::Download(format!(
                "connection closed after {} of {total} bytes",
                task.bytes_done
            )));
        }
        Ok(())
    }
}

/// Map an I/O error to `Permission` when access was denied, `Download` otherwise.
fn io_to_update_error(e: std::io::Error, context: &str) -> UpdateError {
    if e.kind() == std::io::ErrorKind::PermissionDenied {
        UpdateError::Permission(format!("{context}: {e}"))
    } else {
        UpdateError::Download(format!("{context}: {e}"))
    }
}

/// Extension (with dot) for the temp file, taken from the URL's last path
/// segment. Unknown extensions yield `""`.
pub fn sniff_extension(url: &str) -> &'static str {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let name = path.rsplit('/').next().unwrap_or(path).to_ascii_lowercase();
    KNOWN_EXTENSIONS
        .iter()
        .find(|ext| name.ends_with(&ext.to_ascii_lowercase()))
        .copied()
        .unwrap_or("")
}

/// Lowercase extension (without dot) of `path`, for installer dispatch.
pub(crate) fn extension_of(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default()
}
