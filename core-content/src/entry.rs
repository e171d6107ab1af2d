//! Cache entry records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::models::ContentId;

/// A file held by the storage manager.
///
/// `verified` is true only when the bytes matched an expected checksum, or
/// when the item carried none and unverified files are allowed. Unverified
/// entries are never served as cache hits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub content_id: ContentId,
    pub file_name: String,
    pub local_path: PathBuf,
    pub size_bytes: u64,
    pub last_accessed_at: DateTime<Utc>,
    pub verified: bool,
    /// Digest of the stored bytes, when it has been computed
    pub checksum: Option<String>,
    /// Snapshot of the pin state when the entry was read
    #[serde(default)]
    pub pinned: bool,
}

impl CacheEntry {
    pub fn new(
        content_id: ContentId,
        file_name: impl Into<String>,
        local_path: PathBuf,
        size_bytes: u64,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            content_id,
            file_name: file_name.into(),
            local_path,
            size_bytes,
            last_accessed_at: now,
            verified: false,
            checksum: None,
            pinned: false,
        }
    }

    pub fn verified_with(mut self, checksum: Option<String>) -> Self {
        self.verified = true;
        self.checksum = checksum;
        self
    }

    /// Whether this entry satisfies an item expecting `expected`.
    pub fn matches_checksum(&self, expected: Option<&str>) -> bool {
        match (expected, self.checksum.as_deref()) {
            (Some(expected), Some(actual)) => expected.eq_ignore_ascii_case(actual),
            (Some(_), None) => false,
            (None, _) => true,
        }
    }

    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.last_accessed_at = now;
    }
}
