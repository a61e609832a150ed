//! Target platform selection.
//!
//! The update pipeline only distinguishes three families. The value is
//! chosen once at startup with [`Platform::current`] and passed down
//! explicitly, so tests can exercise any branch on any host.

use std::fmt;
use std::str::FromStr;

/// Platform family the update pipeline installs for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Platform {
    /// macOS: `.app` bundles shipped in `.dmg` or `.zip`.
    Mac,
    /// Windows: setup executables, portable zips or a bare `.exe`.
    Windows,
    /// Everything else: flat file trees or a single executable.
    Generic,
}

impl Platform {
    /// The platform this binary was compiled for.
    pub fn current() -> Self {
        match std::env::consts::OS {
            "macos" => Self::Mac,
            "windows" => Self::Windows,
            _ => Self::Generic,
        }
    }

    /// Native package extension (with leading dot) used for exact asset matches.
    pub fn native_extension(self) -> &'static str {
        match self {
            Self::Mac => ".dmg",
            Self::Windows => ".exe",
            Self::Generic => ".AppImage",
        }
    }

    /// Lowercase tokens that identify this platform in an asset file name.
    pub fn os_tokens(self) -> &'static [&'static str] {
        match self {
            Self::Mac => &["macos", "mac", "osx", "darwin"],
            Self::Windows => &["windows", "win"],
            Self::Generic => &["linux"],
        }
    }

    /// Extension of the helper script written by the install strategy.
    pub fn script_extension(self) -> &'static str {
        match self {
            Self::Windows => "bat",
            Self::Mac | Self::Generic => "sh",
        }
    }

    /// Returns `true` if `file_name` mentions this platform.
    pub fn matches_name(self, file_name: &str) -> bool {
        let mut lower = file_name.to_ascii_lowercase();
        if self == Self::Windows {
            // "darwin" contains "win".
            lower = lower.replace("darwin", "");
        }
        self.os_tokens().iter().any(|t| lower.contains(t))
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Mac => write!(f, "mac"),
            Self::Windows => write!(f, "windows"),
            Self::Generic => write!(f, "generic"),
        }
    }
}

impl FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mac" | "macos" | "darwin" => Ok(Self::Mac),
            "windows" | "win" => Ok(Self::Windows),
            "generic" | "linux" => Ok(Self::Generic),
            other => Err(format!("unknown platform `{other}` (expected mac, windows or generic)")),
        }
    }
}
