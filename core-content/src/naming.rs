//! Deterministic cache file names
//!
//! Every cached item lives at `<cache dir>/<stem>.<ext>`. The stem is the
//! content id when it is already filesystem-safe; otherwise unsafe characters
//! are replaced and a short digest of the raw id is appended so two distinct
//! ids can never collide on disk.

use sha2::{Digest, Sha256};

use crate::models::{MediaItem, MediaType};

const MAX_STEM_LEN: usize = 96;
const MAX_EXTENSION_LEN: usize = 5;
const DIGEST_SUFFIX_LEN: usize = 8;

/// Canonical file name for `item`.
///
/// Extension lookup order: file name hint, URL path, MIME type, media type.
pub fn canonical_file_name(item: &MediaItem) -> String {
    let extension = item
        .file_name
        .as_deref()
        .and_then(extension_of)
        .or_else(|| url_extension(&item.source_url))
        .or_else(|| item.mime_type.as_deref().and_then(mime_extension))
        .unwrap_or_else(|| item.media_type.default_extension().to_string());

    format!("{}.{}", file_stem(item.id.as_str()), extension)
}

/// Same as [`canonical_file_name`] without an item; falls back to `bin`.
pub fn file_name_for(id: &str, url: Option<&str>, media_type: Option<MediaType>) -> String {
    let extension = url
        .and_then(url_extension)
        .or_else(|| media_type.map(|t| t.default_extension().to_string()))
        .unwrap_or_else(|| "bin".to_string());
    format!("{}.{}", file_stem(id), extension)
}

/// Filesystem-safe stem for a content id.
pub fn file_stem(id: &str) -> String {
    let sanitized: String = id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .take(MAX_STEM_LEN)
        .collect();

    if sanitized == id && !id.is_empty() {
        return sanitized;
    }

    let digest = hex::encode(Sha256::digest(id.as_bytes()));
    let base = if sanitized.is_empty() { "item" } else { sanitized.as_str() };
    format!("{}-{}", base, &digest[..DIGEST_SUFFIX_LEN])
}

/// Content id encoded in a cache file name, if the name is a plain stem.
///
/// Names produced for unsafe ids carry a digest suffix and cannot be
/// reversed, so they yield `None`; those are only recoverable from the
/// persisted index. A safe id that happens to end in `-` and eight hex
/// digits is indistinguishable and is treated the same way.
pub fn content_id_from_file_name(file_name: &str) -> Option<String> {
    let (stem, _) = file_name.rsplit_once('.')?;
    if stem.is_empty() || has_digest_suffix(stem) {
        return None;
    }
    if file_stem(stem) != stem {
        return None;
    }
    Some(stem.to_string())
}

fn has_digest_suffix(stem: &str) -> bool {
    let Some((_, suffix)) = stem.rsplit_once('-') else {
        return false;
    };
    suffix.len() == DIGEST_SUFFIX_LEN && suffix.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

fn extension_of(name: &str) -> Option<String> {
    let (_, ext) = name.rsplit_once('.')?;
    let ext = ext.to_ascii_lowercase();
    let valid = !ext.is_empty()
        && ext.len() <= MAX_EXTENSION_LEN
        && ext.chars().all(|c| c.is_ascii_alphanumeric());
    valid.then_some(ext)
}

fn url_extension(url: &str) -> Option<String> {
    let without_query = url.split(['?', '#']).next().unwrap_or(url);
    let path = without_query
        .split_once("://")
        .map(|(_, rest)| rest.split_once('/').map(|(_, path)| path).unwrap_or(""))
        .unwrap_or(without_query);
    let last_segment = path.rsplit('/').next()?;
    extension_of(last_segment)
}

fn mime_extension(mime: &str) -> Option<String> {
    let ext = match mime.split(';').next()?.trim().to_ascii_lowercase().as_str() {
        "image/jpeg" | "image/jpg" => "jpg",
        "image/png" => "png",
        "image/gif" => "gif",
        "image/webp" => "webp",
        "video/mp4" => "mp4",
        "video/webm" => "webm",
        "video/quicktime" => "mov",
        "text/html" => "html",
        _ => return None,
    };
    Some(ext.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_from_url_path() {
        let item = MediaItem::new("promo-1", MediaType::Video, "https://cdn.example.com/a/b/clip.MP4?sig=abc.def");
        assert_eq!(canonical_file_name(&item), "promo-1.mp4");
    }

    #[test]
    fn test_file_name_hint_wins_over_url() {
        let item = MediaItem::new("menu", MediaType::Image, "https://cdn.example.com/menu.jpg")
            .with_file_name("menu.png");
        assert_eq!(canonical_file_name(&item), "menu.png");
    }

    #[test]
    fn test_mime_then_media_type_fallback() {
        let mut item = MediaItem::new("board", MediaType::Image, "https://cdn.example.com/download");
        item.mime_type = Some("image/webp".to_string());
        assert_eq!(canonical_file_name(&item), "board.webp");

        item.mime_type = None;
        assert_eq!(canonical_file_name(&item), "board.jpg");

        // Host only, no path
        let page = MediaItem::new("page", MediaType::Web, "https://news.example.com");
        assert_eq!(canonical_file_name(&page), "page.html");
    }

    #[test]
    fn test_unsafe_ids_get_digest_suffix() {
        let a = file_stem("../etc/passwd");
        let b = file_stem("__etc_passwd");
        assert!(!a.contains('/'));
        assert!(a.starts_with("___etc_passwd-"));
        assert_ne!(a, b);
        assert_eq!(a, file_stem("../etc/passwd"));
        assert!(file_stem("").starts_with("item-"));
    }

    #[test]
    fn test_unknown_type_falls_back_to_bin() {
        assert_eq!(file_name_for("x", None, None), "x.bin");
        assert_eq!(file_name_for("x", Some("https://h/p/file.gif"), None), "x.gif");
    }

    #[test]
    fn test_content_id_from_file_name() {
        assert_eq!(content_id_from_file_name("promo-1.mp4").as_deref(), Some("promo-1"));
        assert_eq!(content_id_from_file_name("noext"), None);
    }

    #[test]
    fn test_sanitized_names_are_not_reversed() {
        let item = MediaItem::new("promo.v2", MediaType::Video, "https://cdn.example.com/promo.mp4");
        let name = canonical_file_name(&item);
        assert!(name.starts_with("promo_v2-"));
        assert_eq!(content_id_from_file_name(&name), None);

        let long = "x".repeat(MAX_STEM_LEN + 4);
        assert_eq!(content_id_from_file_name(&format!("{}.jpg", file_stem(&long))), None);
        assert_eq!(content_id_from_file_name("a.b.jpg"), None);
    }
}
