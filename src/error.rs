//! Error types for the self-update pipeline.

/// Top-level error type for the update check, download and install stages.
///
/// Every variant is recoverable: the application keeps running on its
/// current version. The only point of no return is a successfully spawned
/// helper script, which is not an error.
#[derive(Debug, thiserror::Error)]
pub enum UpdateError {
    /// Release endpoint unreachable or answered with a non-2xx status.
    #[error("network error: {0}")]
    Network(String),

    /// Release metadata could not be parsed.
    #[error("parse error: {0}")]
    Parse(String),

    /// The release has no asset usable on this platform.
    #[error("no suitable asset: {0}")]
    NoAsset(String),

    /// I/O failure while streaming the artifact to disk.
    #[error("download error: {0}")]
    Download(String),

    /// Corrupt archive, unmountable disk image or missing payload.
    #[error("extraction error: {0}")]
    Extraction(String),

    /// The helper script could not be launched.
    #[error("install spawn error: {0}")]
    InstallSpawn(String),

    /// The install target or script location is not writable.
    #[error("permission error: {0}")]
    Permission(String),

    /// The download was cancelled before completion.
    #[error("download cancelled")]
    Cancelled,

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl UpdateError {
    /// Stable snake_case label for logs and CLI exit reporting.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Network(_) => "network",
            Self::Parse(_) => "parse",
            Self::NoAsset(_) => "no_asset",
            Self::Download(_) => "download",
            Self::Extraction(_) => "extraction",
            Self::InstallSpawn(_) => "install_spawn",
            Self::Permission(_) => "permission",
            Self::Cancelled => "cancelled",
            Self::Config(_) => "config",
            Self::Io(_) => "io",
        }
    }
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, UpdateError>;

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    #[test]
    fn display_includes_stage_prefix() {
        let err = UpdateError::NoAsset("release 1.4.0 has no assets".to_owned());
        assert_eq!(err.to_string(), "no suitable asset: release 1.4.0 has no assets");
        assert_eq!(UpdateError::Cancelled.to_string(), "download cancelled");
    }

    #[test]
    fn io_errors_convert() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: UpdateError = io.into();
        assert_eq!(err.kind(), "io");
    }
}
