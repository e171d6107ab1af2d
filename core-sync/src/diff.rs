//! Manifest diff
//!
//! Compares a parsed manifest with the last applied manifest and the cache
//! contents. Pure; the sync manager performs the resulting actions.

use core_content::{CacheEntry, ContentId, MediaItem};
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    /// Not in the cache
    New,
    /// Cached, but the manifest now describes different bytes
    Updated,
    /// Cached with no digest that proves the bytes match; checked locally
    /// and downloaded only if the check fails
    Unverified,
    Unchanged,
}

#[derive(Debug, Clone, Default)]
pub struct ManifestDiff {
    /// Items to fetch, in manifest order
    pub to_download: Vec<(MediaItem, ChangeKind)>,
    pub unchanged: Vec<MediaItem>,
    /// Cached ids no longer referenced by the manifest
    pub removed: Vec<ContentId>,
}

impl ManifestDiff {
    /// Bytes the downloads of this diff need. Unverified copies already
    /// occupy their space.
    pub fn required_bytes(&self) -> u64 {
        self.to_download
            .iter()
            .filter(|(_, kind)| *kind != ChangeKind::Unverified)
            .map(|(item, _)| item.size_bytes)
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.to_download.is_empty() && self.removed.is_empty()
    }
}

/// Classifies every manifest item.
///
/// `referenced` holds every id the manifest names, including items that
/// failed to parse, so a malformed entry never deletes a cached file.
pub fn diff_manifest(
    items: &[MediaItem],
    referenced: &HashSet<ContentId>,
    applied: &HashMap<ContentId, MediaItem>,
    cached: &HashMap<ContentId, CacheEntry>,
) -> ManifestDiff {
    let mut diff = ManifestDiff::default();

    for item in items {
        let kind = match cached.get(&item.id) {
            None => ChangeKind::New,
            Some(entry) => classify_cached(item, entry, applied.get(&item.id)),
        };
        match kind {
            ChangeKind::Unchanged => diff.unchanged.push(item.clone()),
            _ => diff.to_download.push((item.clone(), kind)),
        }
    }

    let mut removed: Vec<ContentId> = cached
        .keys()
        .filter(|id| !referenced.contains(*id))
        .cloned()
        .collect();
    removed.sort();
    diff.removed = removed;
    diff
}

fn classify_cached(item: &MediaItem, entry: &CacheEntry, previous: Option<&MediaItem>) -> ChangeKind {
    if let Some(previous) = previous {
        if item.content_changed(previous) {
            return ChangeKind::Updated;
        }
    }
    match (item.checksum(), entry.checksum.as_deref()) {
        (Some(expected), Some(_)) if !entry.matches_checksum(Some(&expected)) => ChangeKind::Updated,
        (Some(_), None) => ChangeKind::Unverified,
        _ if !entry.verified => ChangeKind::Unverified,
        _ => ChangeKind::Unchanged,
    }
}
