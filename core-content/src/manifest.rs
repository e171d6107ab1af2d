//! Manifest wire format
//!
//! `GET /devices/{id}/content/manifest` returns:
//!
//! ```json
//! {
//!   "items": [
//!     { "id": "promo-1", "url": "https://…", "size": 1024, "checksum": "…",
//!       "type": "video", "lastModified": "2024-05-01T10:00:00Z" }
//!   ],
//!   "version": 12,
//!   "timestamp": 1714557600000
//! }
//! ```
//!
//! `version` and `lastModified` are opaque markers and may arrive as strings
//! or numbers. Optional fields beyond the minimal contract (`duration`,
//! `orderIndex`, `fileName`, `mimeType`, `requiredCodecs`) are honored when
//! present.

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashSet;

use crate::error::{ContentError, Result};
use crate::models::{ContentId, MediaItem, MediaType};

/// Server-side description of the content a device should hold.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    #[serde(default)]
    pub items: Vec<ManifestItem>,
    #[serde(default, deserialize_with = "opaque_marker")]
    pub version: Option<String>,
    #[serde(default)]
    pub timestamp: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestItem {
    pub id: String,
    pub url: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub checksum: Option<String>,
    #[serde(rename = "type")]
    pub media_type: String,
    #[serde(default, deserialize_with = "opaque_marker")]
    pub last_modified: Option<String>,
    #[serde(default, alias = "durationSeconds")]
    pub duration: Option<i64>,
    #[serde(default)]
    pub order_index: Option<u32>,
    #[serde(default)]
    pub file_name: Option<String>,
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub required_codecs: Vec<String>,
}

impl ManifestItem {
    /// Converts the wire item into a [`MediaItem`].
    ///
    /// `position` is the item's index in the manifest and is used as the
    /// order when the server does not send an explicit `orderIndex`.
    pub fn to_media_item(&self, position: usize) -> Result<MediaItem> {
        let media_type = MediaType::parse(&self.media_type).map_err(|_| ContentError::InvalidItem {
            id: self.id.clone(),
            reason: format!("unknown media type '{}'", self.media_type),
        })?;

        let item = MediaItem {
            id: ContentId::new(self.id.clone()),
            media_type,
            source_url: self.url.clone(),
            expected_checksum: self.checksum.clone(),
            size_bytes: self.size,
            duration_seconds: self.duration.unwrap_or(0),
            order_index: self
                .order_index
                .unwrap_or_else(|| u32::try_from(position).unwrap_or(u32::MAX)),
            last_modified: self.last_modified.clone(),
            file_name: self.file_name.clone(),
            mime_type: self.mime_type.clone(),
            required_codecs: self.required_codecs.clone(),
        };
        item.validate()?;
        Ok(item)
    }
}

/// Outcome of converting a whole manifest.
#[derive(Debug, Clone, Default)]
pub struct ParsedManifest {
    /// Valid items, in manifest order
    pub items: Vec<MediaItem>,
    /// Items that could not be used, with the reason
    pub rejected: Vec<ContentError>,
}

impl Manifest {
    pub fn from_json(body: &[u8]) -> Result<Self> {
        serde_json::from_slice(body).map_err(|e| ContentError::InvalidManifest(e.to_string()))
    }

    /// Converts every item, isolating per-item failures.
    ///
    /// Duplicate ids keep their first occurrence.
    pub fn parse_items(&self) -> ParsedManifest {
        let mut parsed = ParsedManifest::default();
        let mut seen = HashSet::new();

        for (position, raw) in self.items.iter().enumerate() {
            if !seen.insert(raw.id.clone()) {
                parsed.rejected.push(ContentError::InvalidItem {
                    id: raw.id.clone(),
                    reason: "duplicate id".to_string(),
                });
                continue;
            }
            match raw.to_media_item(position) {
                Ok(item) => parsed.items.push(item),
                Err(e) => parsed.rejected.push(e),
            }
        }

        parsed
    }

    /// Sum of declared item sizes.
    pub fn total_bytes(&self) -> u64 {
        self.items.iter().map(|item| item.size).sum()
    }

    pub fn content_ids(&self) -> HashSet<ContentId> {
        self.items
            .iter()
            .map(|item| ContentId::new(item.id.clone()))
            .collect()
    }
}

fn opaque_marker<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        None | Some(serde_json::Value::Null) => None,
        Some(serde_json::Value::String(s)) => Some(s),
        Some(other) => Some(other.to_string()),
    })
}
