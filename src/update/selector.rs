//! Platform asset selection.

use crate::platform::Platform;
use crate::update::checker::{AssetInfo, ReleaseInfo};

/// Pick the asset to download for `platform`.
///
/// Priority:
/// 1. Name mentions the platform and ends in its native package extension.
/// 2. A `.zip` (one mentioning the platform beats the others).
/// 3. The first asset.
///
/// Returns `None` only when the release has no assets at all.
pub fn select_asset(release: &ReleaseInfo, platform: Platform) -> Option<AssetInfo> {
    let assets = release.assets();

    let native = platform.native_extension().to_ascii_lowercase();
    if let Some(exact) = assets.iter().find(|a| {
        platform.matches_name(&a.name) && a.name.to_ascii_lowercase().ends_with(&native)
    }) {
        tracing::debug!(asset = %exact.name, %platform, "selected platform package");
        return Some(exact.clone());
    }

    let mut zips = assets
        .iter()
        .filter(|a| a.name.to_ascii_lowercase().ends_with(".zip"));
    let zip = zips
        .clone()
        .find(|a| platform.matches_name(&a.name))
        .or_else(|| zips.next());
    if let Some(zip) = zip {
        tracing::debug!(asset = %zip.name, %platform, "selected zip archive");
        return Some(zip.clone());
    }

    let first = assets.first().cloned();
    if let Some(first) = &first {
        tracing::warn!(asset = %first.name, %platform, "no platform match; falling back to first asset");
    }
    first
}
