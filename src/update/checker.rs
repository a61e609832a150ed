//! GitHub release checker.
//!
//! Queries the releases API for the latest release, strips the tag's
//! version prefix and compares it with the running version.

use crate::config::{UpdateConfig, VersionOrdering};
use crate::error::{Result, UpdateError};
use semver::{BuildMetadata, Prerelease, Version};
use serde::Deserialize;
use std::cmp::Ordering;

/// A release fetched from the metadata endpoint.
///
/// Fields are private so the version string cannot change after the fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseInfo {
    version: String,
    assets: Vec<AssetInfo>,
    html_url: Option<String>,
    notes: Option<String>,
}

impl ReleaseInfo {
    /// Build a release from already-parsed parts. `version` must not carry a
    /// `v` prefix.
    pub fn new(version: impl Into<String>, assets: Vec<AssetInfo>) -> Self {
        Self {
            version: version.into(),
            assets,
            html_url: None,
            notes: None,
        }
    }

    /// Version with any leading `v` removed (e.g. `"1.4.0"`).
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Downloadable assets attached to the release.
    pub fn assets(&self) -> &[AssetInfo] {
        &self.assets
    }

    /// Release web page, when the endpoint provided one.
    pub fn html_url(&self) -> Option<&str> {
        self.html_url.as_deref()
    }

    /// Release notes (markdown), when present.
    pub fn notes(&self) -> Option<&str> {
        self.notes.as_deref()
    }
}

/// A single downloadable file attached to a release.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetInfo {
    /// Asset filename (e.g. `"LexiGen-macOS.dmg"`).
    pub name: String,
    /// Direct download URL.
    pub download_url: String,
    /// Size in bytes, if advertised.
    pub size: Option<u64>,
}

impl AssetInfo {
    /// Convenience constructor without a size.
    pub fn new(name: impl Into<String>, download_url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            download_url: download_url.into(),
            size: None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ReleaseWire {
    tag_name: String,
    assets: Vec<AssetWire>,
    #[serde(default)]
    html_url: Option<String>,
    #[serde(default)]
    body: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AssetWire {
    name: String,
    browser_download_url: String,
    #[serde(default)]
    size: Option<u64>,
}

/// Fetches the latest release from the configured endpoint.
pub struct UpdateChecker {
    agent: ureq::Agent,
    releases_url: String,
}

impl UpdateChecker {
    /// Create a checker for the endpoint in `config`.
    pub fn new(config: &UpdateConfig) -> Self {
        Self {
            agent: config.http_agent(),
            releases_url: config.releases_url.clone(),
        }
    }

    /// Endpoint this checker queries.
    pub fn releases_url(&self) -> &str {
        &self.releases_url
    }

    /// Perform one GET against the releases endpoint and parse the result.
    ///
    /// # Errors
    ///
    /// Returns [`UpdateError::Network`] if the endpoint is unreachable or
    /// answers with a non-2xx status, and [`UpdateError::Parse`] if the body
    /// is not a release document.
    pub fn check_latest(&self) -> Result<ReleaseInfo> {
        tracing::debug!(url = %self.releases_url, "fetching latest release");

        let resp = self
            .agent
            .get(&self.releases_url)
            .set("Accept", "application/vnd.github+json")
            .call()
            .map_err(|e| match e {
                ureq::Error::Status(code, _) => {
                    UpdateError::Network(format!("release endpoint returned HTTP {code}"))
                }
                ureq::Error::Transport(t) => {
                    UpdateError::Network(format!("release endpoint unreachable: {t}"))
                }
            })?;

        let body = resp
            .into_string()
            .map_err(|e| UpdateError::Network(format!("cannot read release response: {e}")))?;

        let release = parse_release(&body)?;
        tracing::info!(
            version = release.version(),
            assets = release.assets().len(),
            "latest release fetched"
        );
        Ok(release)
    }
}

/// Parse a release document.
///
/// # Errors
///
/// Returns [`UpdateError::Parse`] for malformed JSON, a missing field, or an
/// empty tag.
pub fn parse_release(body: &str) -> Result<ReleaseInfo> {
    let wire: ReleaseWire = serde_json::from_str(body)
        .map_err(|e| UpdateError::Parse(format!("malformed release metadata: {e}")))?;

    let version = strip_version_prefix(wire.tag_name.trim());
    if version.is_empty() {
        return Err(UpdateError::Parse("release tag is empty".to_owned()));
    }

    Ok(ReleaseInfo {
        version: version.to_owned(),
        assets: wire
            .assets
            .into_iter()
            .map(|a| AssetInfo {
                name: a.name,
                download_url: a.browser_download_url,
                size: a.size,
            })
            .collect(),
        html_url: wire.html_url,
        notes: wire.body,
    })
}

/// Strip one leading `v`/`V` from a tag (`"v1.4.0"` -> `"1.4.0"`).
pub fn strip_version_prefix(tag: &str) -> &str {
    tag.strip_prefix(['v', 'V']).unwrap_or(tag)
}

/// Returns `true` if `candidate` is newer than `current` under `ordering`.
///
/// Both strings may carry a `v` prefix.
pub fn is_newer(candidate: &str, current: &str, ordering: VersionOrdering) -> bool {
    let candidate = strip_version_prefix(candidate.trim());
    let current = strip_version_prefix(current.trim());
    match ordering {
        VersionOrdering::Lexicographic => candidate > current,
        VersionOrdering::Numeric => compare_versions(candidate, current) == Ordering::Greater,
    }
}

/// Compare two versions by semver precedence.
///
/// Build metadata never affects ordering. Tags that are not full semver
/// (`1.4`, `2.0-rc.1`) are padded with zero components first, so
/// `1.4 == 1.4.0`. Anything still unparseable (four components, letters)
/// falls back to a component-wise comparison, numeric where possible.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    match (parse_lenient(a), parse_lenient(b)) {
        (Some(a), Some(b)) => a.cmp(&b),
        _ => compare_components(a, b),
    }
}

fn parse_lenient(version: &str) -> Option<Version> {
    let mut parsed = version.parse::<Version>().or_else(|_| {
        let without_build = version.split('+').next().unwrap_or(version);
        let (core, pre) = match without_build.split_once('-') {
            Some((core, pre)) => (core, Some(pre)),
            None => (without_build, None),
        };
        let mut parts = core
            .split('.')
            .map(|p| p.parse::<u64>())
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|_| ())?;
        if parts.len() > 3 {
            return Err(());
        }
        parts.resize(3, 0);
        let mut padded = Version::new(parts[0], parts[1], parts[2]);
        if let Some(pre) = pre {
            padded.pre = Prerelease::new(pre).map_err(|_| ())?;
        }
        Ok(padded)
    });
    if let Ok(v) = parsed.as_mut() {
        v.build = BuildMetadata::EMPTY;
    }
    parsed.ok()
}

fn compare_components(a: &str, b: &str) -> Ordering {
    let a_parts: Vec<&str> = a.split('.').collect();
    let b_parts: Vec<&str> = b.split('.').collect();
    let len = a_parts.len().max(b_parts.len());

    for i in 0..len {
        let x = a_parts.get(i).copied().unwrap_or("0");
        let y = b_parts.get(i).copied().unwrap_or("0");
        let ord = match (x.parse::<u64>(), y.parse::<u64>()) {
            (Ok(x), Ok(y)) => x.cmp(&y),
            _ => x.cmp(y),
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;

    #[test]
    fn strips_v_prefix() {
        assert_eq!(strip_version_prefix("v1.4.0"), "1.4.0");
        assert_eq!(strip_version_prefix("V2.0"), "2.0");
        assert_eq!(strip_version_prefix("1.4.0"), "1.4.0");
        assert_eq!(strip_version_prefix("vv1"), "v1");
    }

    #[test]
    fn parse_release_document() {
        let body = r#"{
            "tag_name": "v1.4.0",
            "html_url": "https://github.com/gitmichaelqiu/LexiGen/releases/tag/v1.4.0",
            "body": "Bug fixes",
            "assets": [
                {"name": "LexiGen-macOS.dmg", "browser_download_url": "https://example.com/a.dmg", "size": 1024},
                {"name": "LexiGen.zip", "browser_download_url": "https://example.com/b.zip"}
            ]
        }"#;
        let release = parse_release(body).unwrap();
        assert_eq!(release.version(), "1.4.0");
        assert_eq!(release.assets().len(), 2);
        assert_eq!(release.assets()[0].size, Some(1024));
        assert_eq!(release.assets()[1].download_url, "https://example.com/b.zip");
        assert_eq!(release.notes(), Some("Bug fixes"));
        assert!(release.html_url().is_some());
    }

    #[test]
    fn parse_rejects_wrong_shapes() {
        for body in [
            "not json",
            r#"{"assets": []}"#,
            r#"{"tag_name": "v1.0.0"}"#,
            r#"{"tag_name": 5, "assets": []}"#,
            r#"{"tag_name": "v", "assets": []}"#,
            r#"[]"#,
        ] {
            assert!(
                matches!(parse_release(body), Err(UpdateError::Parse(_))),
                "expected parse error for {body}"
            );
        }
    }

    #[test]
    fn numeric_ordering() {
        assert!(is_newer("1.10.0", "1.9.0", VersionOrdering::Numeric));
        assert!(is_newer("v1.4.0", "1.3.1", VersionOrdering::Numeric));
        assert!(!is_newer("1.3.1", "1.3.1", VersionOrdering::Numeric));
        assert!(!is_newer("1.3.0", "1.3.1", VersionOrdering::Numeric));
        assert!(!is_newer("1.4", "1.4.0", VersionOrdering::Numeric));
        assert!(is_newer("1.4.0", "1.4.0-beta", VersionOrdering::Numeric));
        assert!(!is_newer("1.4.0-beta", "1.4.0", VersionOrdering::Numeric));
        assert!(is_newer("2.0.0", "1.99.99", VersionOrdering::Numeric));
    }

    #[test]
    fn lexicographic_ordering_keeps_legacy_behaviour() {
        assert!(!is_newer("1.10.0", "1.9.0", VersionOrdering::Lexicographic));
        assert!(is_newer("1.4.0", "1.3.1", VersionOrdering::Lexicographic));
    }

    #[test]
    fn compare_ignores_build_metadata() {
        assert_eq!(compare_versions("1.2.3+abc", "1.2.3"), Ordering::Equal);
        assert_eq!(compare_versions("1.2+abc", "1.2.0+def"), Ordering::Equal);
    }

    #[test]
    fn pre_release_identifiers_follow_semver_precedence() {
        assert_eq!(compare_versions("1.4.0-beta.10", "1.4.0-beta.9"), Ordering::Greater);
        assert_eq!(compare_versions("1.4.0-alpha", "1.4.0-alpha.1"), Ordering::Less);
        assert_eq!(compare_versions("1.4.0-rc.1", "1.4.0-beta.11"), Ordering::Greater);
        assert_eq!(compare_versions("1.4-rc.1", "1.4.0"), Ordering::Less);
        assert!(is_newer("v1.4.0-beta.10", "1.4.0-beta.9", VersionOrdering::Numeric));
    }

    #[test]
    fn non_semver_tags_compare_by_component() {
        assert_eq!(compare_versions("2024.5.1.3", "2024.5.1.12"), Ordering::Less);
        assert_eq!(compare_versions("1.4", "1.4.0"), Ordering::Equal);
        assert_eq!(compare_versions("1.4.0.0", "1.4"), Ordering::Equal);
    }
}
