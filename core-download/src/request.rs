//! Download requests and per-item state

use core_content::{canonical_file_name, ContentId, MediaItem, Priority};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A request to fetch one content item into the cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadRequest {
    pub content_id: ContentId,
    pub url: String,
    /// Declared size in bytes; 0 when unknown
    pub expected_size: u64,
    pub priority: Priority,
    pub required_codecs: Vec<String>,
    pub expected_checksum: Option<String>,
    /// Final file name inside the cache directory
    pub file_name: String,
}

impl DownloadRequest {
    pub fn new(content_id: impl Into<ContentId>, url: impl Into<String>, file_name: impl Into<String>) -> Self {
        Self {
            content_id: content_id.into(),
            url: url.into(),
            expected_size: 0,
            priority: Priority::Normal,
            required_codecs: Vec::new(),
            expected_checksum: None,
            file_name: file_name.into(),
        }
    }

    /// Request for `item` under its canonical file name.
    pub fn for_item(item: &MediaItem) -> Self {
        Self {
            content_id: item.id.clone(),
            url: item.source_url.clone(),
            expected_size: item.size_bytes,
            priority: Priority::Normal,
            required_codecs: item.required_codecs.clone(),
            expected_checksum: item.checksum(),
            file_name: canonical_file_name(item),
        }
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    pub fn with_expected_size(mut self, bytes: u64) -> Self {
        self.expected_size = bytes;
        self
    }

    pub fn with_checksum(mut self, checksum: impl Into<String>) -> Self {
        self.expected_checksum = Some(checksum.into());
        self
    }

    pub fn with_codecs<I, S>(mut self, codecs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required_codecs = codecs.into_iter().map(Into::into).collect();
        self
    }
}

/// Observable state of one content id.
///
/// `Failed { is_retryable: true }` returns to `Queued` only through an
/// explicit retry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum DownloadState {
    Idle,
    Queued {
        position: usize,
    },
    Downloading {
        /// 0.0..=1.0; 0 while the total is unknown
        progress: f32,
        downloaded_bytes: u64,
        total_bytes: Option<u64>,
        speed_bytes_per_sec: u64,
    },
    Completed {
        local_path: PathBuf,
    },
    Failed {
        error: String,
        is_retryable: bool,
    },
}

impl DownloadState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed { .. } | Self::Failed { .. })
    }

    pub fn is_active(&self) -> bool {
        matches!(self, Self::Queued { .. } | Self::Downloading { .. })
    }
}

impl Default for DownloadState {
    fn default() -> Self {
        Self::Idle
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_content::MediaType;

    #[test]
    fn test_request_for_item_uses_canonical_name() {
        let item = MediaItem::new("promo", MediaType::Video, "https://cdn.example.com/p/clip.mp4")
            .with_size(42)
            .with_checksum("ABC")
            .with_codecs(["h264"]);
        let request = DownloadRequest::for_item(&item).with_priority(Priority::High);

        assert_eq!(request.file_name, "promo.mp4");
        assert_eq!(request.expected_size, 42);
        assert_eq!(request.expected_checksum.as_deref(), Some("abc"));
        assert_eq!(request.required_codecs, vec!["h264"]);
        assert_eq!(request.priority, Priority::High);
    }

    #[test]
    fn test_state_serialization_is_tagged() {
        let json = serde_json::to_string(&DownloadState::Queued { position: 2 }).unwrap();
        assert!(json.contains("\"state\":\"queued\""));
        assert!(DownloadState::Failed { error: "x".into(), is_retryable: true }.is_terminal());
        assert!(!DownloadState::Idle.is_active());
    }
}
