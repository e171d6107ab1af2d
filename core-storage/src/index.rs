//! In-memory cache index and its on-disk snapshot
//!
//! The index is a cache of the directory contents, never the source of
//! truth. On startup it is reconciled against a directory scan: snapshot
//! records survive only when their file is still present with the recorded
//! size.

use chrono::{DateTime, Utc};
use core_content::{CacheEntry, ContentId};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

pub const INDEX_FILE_NAME: &str = ".index.json";
const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Default)]
pub(crate) struct CacheIndex {
    entries: HashMap<ContentId, CacheEntry>,
    total_bytes: u64,
}

impl CacheIndex {
    pub fn get(&self, id: &ContentId) -> Option<&CacheEntry> {
        self.entries.get(id)
    }

    pub fn get_mut(&mut self, id: &ContentId) -> Option<&mut CacheEntry> {
        self.entries.get_mut(id)
    }

    pub fn insert(&mut self, entry: CacheEntry) -> Option<CacheEntry> {
        self.total_bytes += entry.size_bytes;
        let previous = self.entries.insert(entry.content_id.clone(), entry);
        if let Some(old) = &previous {
            self.total_bytes = self.total_bytes.saturating_sub(old.size_bytes);
        }
        previous
    }

    pub fn remove(&mut self, id: &ContentId) -> Option<CacheEntry> {
        let removed = self.entries.remove(id);
        if let Some(entry) = &removed {
            self.total_bytes = self.total_bytes.saturating_sub(entry.size_bytes);
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    pub fn entries(&self) -> impl Iterator<Item = &CacheEntry> {
        self.entries.values()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.total_bytes = 0;
    }

    /// Eviction order: entries outside `protected`, oldest access first.
    pub fn eviction_candidates(&self, protected: &HashSet<ContentId>) -> Vec<CacheEntry> {
        let mut candidates: Vec<CacheEntry> = self
            .entries
            .values()
            .filter(|entry| !protected.contains(&entry.content_id))
            .cloned()
            .collect();
        candidates.sort_by(|a, b| {
            a.last_accessed_at
                .cmp(&b.last_accessed_at)
                .then_with(|| a.content_id.cmp(&b.content_id))
        });
        candidates
    }

    pub fn snapshot(&self, saved_at: DateTime<Utc>) -> IndexSnapshot {
        let mut entries: Vec<CacheEntry> = self.entries.values().cloned().collect();
        entries.sort_by(|a, b| a.content_id.cmp(&b.content_id));
        for entry in &mut entries {
            entry.pinned = false;
        }
        IndexSnapshot {
            version: SNAPSHOT_VERSION,
            saved_at,
            entries,
        }
    }
}

/// Serialized form of the index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexSnapshot {
    pub version: u32,
    pub saved_at: DateTime<Utc>,
    pub entries: Vec<CacheEntry>,
}

impl IndexSnapshot {
    pub fn is_supported(&self) -> bool {
        self.version == SNAPSHOT_VERSION
    }

    /// Entries keyed by file name, for reconciliation with a directory scan.
    pub fn by_file_name(self) -> HashMap<String, CacheEntry> {
        self.entries
            .into_iter()
            .map(|entry| (entry.file_name.clone(), entry))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use std::path::PathBuf;

    fn entry(id: &str, size: u64, accessed: DateTime<Utc>) -> CacheEntry {
        let mut entry = CacheEntry::new(
            ContentId::from(id),
            format!("{id}.jpg"),
            PathBuf::from(format!("/cache/{id}.jpg")),
            size,
            accessed,
        );
        entry.verified = true;
        entry
    }

    #[test]
    fn test_total_bytes_tracks_replacements() {
        let now = Utc::now();
        let mut index = CacheIndex::default();
        index.insert(entry("a", 10, now));
        index.insert(entry("b", 5, now));
        assert_eq!(index.total_bytes(), 15);

        index.insert(entry("a", 20, now));
        assert_eq!(index.total_bytes(), 25);
        assert_eq!(index.len(), 2);

        index.remove(&ContentId::from("b"));
        assert_eq!(index.total_bytes(), 20);
    }

    #[test]
    fn test_eviction_candidates_oldest_first_skipping_protected() {
        let now = Utc::now();
        let mut index = CacheIndex::default();
        index.insert(entry("new", 1, now));
        index.insert(entry("old", 1, now - Duration::hours(2)));
        index.insert(entry("mid", 1, now - Duration::hours(1)));

        let protected: HashSet<ContentId> = [ContentId::from("old")].into_iter().collect();
        let ids: Vec<String> = index
            .eviction_candidates(&protected)
            .into_iter()
            .map(|e| e.content_id.into_inner())
            .collect();
        assert_eq!(ids, vec!["mid", "new"]);
    }

    #[test]
    fn test_snapshot_round_trip_by_file_name() {
        let now = Utc::now();
        let mut index = CacheIndex::default();
        let mut pinned = entry("a", 3, now);
        pinned.pinned = true;
        index.insert(pinned);

        let json = serde_json::to_string(&index.snapshot(now)).unwrap();
        let snapshot: IndexSnapshot = serde_json::from_str(&json).unwrap();
        assert!(snapshot.is_supported());

        let by_name = snapshot.by_file_name();
        let restored = by_name.get("a.jpg").unwrap();
        assert_eq!(restored.size_bytes, 3);
        // Pin state is runtime-only
        assert!(!restored.pinned);
    }
}
