//! Domain models for player content

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{ContentError, Result};

// =============================================================================
// ID Types
// =============================================================================

/// Stable logical key of a media item, as assigned by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentId(String);

impl ContentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ContentId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for ContentId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl AsRef<str> for ContentId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// =============================================================================
// Media
// =============================================================================

/// Kind of content a screen can show.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Image,
    Video,
    Web,
}

impl MediaType {
    /// Parses the manifest `type` field.
    ///
    /// Accepts the plain names as well as MIME types (`image/png`,
    /// `video/mp4`, `text/html`).
    pub fn parse(value: &str) -> Result<Self> {
        let normalized = value.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "image" | "img" | "picture" => Ok(Self::Image),
            "video" | "movie" => Ok(Self::Video),
            "web" | "webpage" | "html" | "url" => Ok(Self::Web),
            mime if mime.starts_with("image/") => Ok(Self::Image),
            mime if mime.starts_with("video/") => Ok(Self::Video),
            "text/html" | "application/xhtml+xml" => Ok(Self::Web),
            _ => Err(ContentError::UnknownMediaType(value.to_string())),
        }
    }

    /// Extension used when neither the file name nor the URL carries one.
    pub fn default_extension(&self) -> &'static str {
        match self {
            Self::Image => "jpg",
            Self::Video => "mp4",
            Self::Web => "html",
        }
    }

    /// Whether the item ends on its own (video end, page signal) when no
    /// explicit duration is set.
    pub fn has_natural_completion(&self) -> bool {
        matches!(self, Self::Video | Self::Web)
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Image => "image",
            Self::Video => "video",
            Self::Web => "web",
        };
        f.write_str(name)
    }
}

/// Download priority. Orders `Low < Normal < High`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Priority {
    Low,
    Normal,
    High,
}

impl Default for Priority {
    fn default() -> Self {
        Self::Normal
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Low => "LOW",
            Self::Normal => "NORMAL",
            Self::High => "HIGH",
        };
        f.write_str(name)
    }
}

/// A single piece of content the player may show.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaItem {
    pub id: ContentId,
    pub media_type: MediaType,
    pub source_url: String,
    /// Hex digest the downloaded bytes must match, if the backend supplied one
    pub expected_checksum: Option<String>,
    pub size_bytes: u64,
    /// 0 means indefinite / natural completion
    pub duration_seconds: i64,
    pub order_index: u32,
    /// Backend modification marker; a change triggers a re-download
    pub last_modified: Option<String>,
    /// Original file name, used as an extension hint
    pub file_name: Option<String>,
    pub mime_type: Option<String>,
    pub required_codecs: Vec<String>,
}

impl MediaItem {
    pub fn new(id: impl Into<ContentId>, media_type: MediaType, source_url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            media_type,
            source_url: source_url.into(),
            expected_checksum: None,
            size_bytes: 0,
            duration_seconds: 0,
            order_index: 0,
            last_modified: None,
            file_name: None,
            mime_type: None,
            required_codecs: Vec::new(),
        }
    }

    pub fn with_checksum(mut self, checksum: impl Into<String>) -> Self {
        self.expected_checksum = Some(checksum.into());
        self
    }

    pub fn with_size(mut self, bytes: u64) -> Self {
        self.size_bytes = bytes;
        self
    }

    pub fn with_duration(mut self, seconds: i64) -> Self {
        self.duration_seconds = seconds;
        self
    }

    pub fn with_order(mut self, index: u32) -> Self {
        self.order_index = index;
        self
    }

    pub fn with_last_modified(mut self, marker: impl Into<String>) -> Self {
        self.last_modified = Some(marker.into());
        self
    }

    pub fn with_file_name(mut self, name: impl Into<String>) -> Self {
        self.file_name = Some(name.into());
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

    /// Normalized (trimmed, lowercase) checksum; blank values count as absent.
    pub fn checksum(&self) -> Option<String> {
        self.expected_checksum
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_ascii_lowercase)
    }

    /// Whether the stored copy of `previous` must be replaced by this item.
    pub fn content_changed(&self, previous: &MediaItem) -> bool {
        self.source_url != previous.source_url
            || self.checksum() != previous.checksum()
            || self.last_modified != previous.last_modified
    }

    /// Basic sanity checks applied when an item is parsed from a manifest.
    pub fn validate(&self) -> Result<()> {
        if self.id.as_str().trim().is_empty() {
            return Err(ContentError::InvalidItem {
                id: self.id.to_string(),
                reason: "id cannot be empty".to_string(),
            });
        }
        if self.source_url.trim().is_empty() {
            return Err(ContentError::InvalidItem {
                id: self.id.to_string(),
                reason: "source URL cannot be empty".to_string(),
            });
        }
        if let Some(checksum) = self.checksum() {
            if !checksum.chars().all(|c| c.is_ascii_hexdigit()) {
                return Err(ContentError::InvalidItem {
                    id: self.id.to_string(),
                    reason: format!("checksum is not hex: {}", checksum),
                });
            }
        }
        Ok(())
    }
}

// =============================================================================
// Playlist
// =============================================================================

/// A playlist entry with an optional per-item hold time override.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaylistItem {
    pub item: MediaItem,
    pub duration_override: Option<i64>,
}

impl PlaylistItem {
    pub fn new(item: MediaItem) -> Self {
        Self {
            item,
            duration_override: None,
        }
    }

    pub fn with_duration_override(mut self, seconds: i64) -> Self {
        self.duration_override = Some(seconds);
        self
    }

    /// Configured hold time in seconds; may be `<= 0`.
    pub fn duration_seconds(&self) -> i64 {
        self.duration_override.unwrap_or(self.item.duration_seconds)
    }
}

/// Ordered list of items to cycle through.
///
/// Order comes from each item's `order_index`, never from insertion order.
/// Items sharing an index keep their relative input order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Playlist {
    items: Vec<PlaylistItem>,
}

impl Playlist {
    pub fn new(mut items: Vec<PlaylistItem>) -> Self {
        items.sort_by_key(|entry| entry.item.order_index);
        Self { items }
    }

    pub fn from_media(items: Vec<MediaItem>) -> Self {
        Self::new(items.into_iter().map(PlaylistItem::new).collect())
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn items(&self) -> &[PlaylistItem] {
        &self.items
    }

    pub fn get(&self, index: usize) -> Option<&PlaylistItem> {
        self.items.get(index)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn position_of(&self, id: &ContentId) -> Option<usize> {
        self.items.iter().position(|entry| &entry.item.id == id)
    }

    pub fn content_ids(&self) -> Vec<ContentId> {
        self.items.iter().map(|entry| entry.item.id.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(id: &str, order: u32) -> MediaItem {
        MediaItem::new(id, MediaType::Image, format!("https://cdn.example.com/{id}.jpg"))
            .with_order(order)
    }

    #[test]
    fn test_media_type_parse() {
        assert_eq!(MediaType::parse("IMAGE").unwrap(), MediaType::Image);
        assert_eq!(MediaType::parse("video/mp4").unwrap(), MediaType::Video);
        assert_eq!(MediaType::parse("text/html").unwrap(), MediaType::Web);
        assert!(matches!(
            MediaType::parse("hologram"),
            Err(ContentError::UnknownMediaType(_))
        ));
    }

    #[test]
    fn test_priority_ordering() {
        assert!(Priority::High > Priority::Normal);
        assert!(Priority::Normal > Priority::Low);
        assert_eq!(Priority::default(), Priority::Normal);
    }

    #[test]
    fn test_blank_checksum_is_absent() {
        let media = item("a", 0).with_checksum("  ");
        assert_eq!(media.checksum(), None);

        let media = item("a", 0).with_checksum("ABCDEF");
        assert_eq!(media.checksum().as_deref(), Some("abcdef"));
    }

    #[test]
    fn test_content_changed_detects_marker_and_checksum() {
        let base = item("a", 0).with_checksum("aa").with_last_modified("1");
        assert!(!base.clone().content_changed(&base));
        assert!(base.clone().with_last_modified("2").content_changed(&base));
        assert!(base.clone().with_checksum("bb").content_changed(&base));
        // Reordering alone is not a content change
        assert!(!base.clone().with_order(7).content_changed(&base));
    }

    #[test]
    fn test_validate_rejects_bad_items() {
        assert!(item("a", 0).validate().is_ok());
        assert!(MediaItem::new("", MediaType::Image, "https://x").validate().is_err());
        assert!(MediaItem::new("a", MediaType::Image, " ").validate().is_err());
        assert!(item("a", 0).with_checksum("xyz").validate().is_err());
    }

    #[test]
    fn test_playlist_sorted_by_order_index() {
        let playlist = Playlist::from_media(vec![item("c", 2), item("a", 0), item("b", 1)]);
        let ids: Vec<_> = playlist.content_ids().into_iter().map(ContentId::into_inner).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert_eq!(playlist.position_of(&ContentId::from("b")), Some(1));
    }

    #[test]
    fn test_playlist_ties_keep_input_order() {
        let playlist = Playlist::from_media(vec![item("x", 1), item("y", 1), item("z", 0)]);
        let ids: Vec<_> = playlist.content_ids().into_iter().map(ContentId::into_inner).collect();
        assert_eq!(ids, vec!["z", "x", "y"]);
    }

    #[test]
    fn test_duration_override_wins() {
        let entry = PlaylistItem::new(item("a", 0).with_duration(10)).with_duration_override(3);
        assert_eq!(entry.duration_seconds(), 3);
        assert_eq!(PlaylistItem::new(item("a", 0).with_duration(10)).duration_seconds(), 10);
    }

    #[test]
    fn test_empty_playlist() {
        let playlist = Playlist::empty();
        assert!(playlist.is_empty());
        assert_eq!(playlist.len(), 0);
        assert!(playlist.get(0).is_none());
    }
}
