//! # Content Model
//!
//! Shared vocabulary for every player component.
//!
//! - [`MediaItem`] - a logical piece of content, keyed by [`ContentId`]
//! - [`Playlist`] - explicitly ordered items with per-item duration overrides
//! - [`Manifest`] - the server's description of what the device should hold
//! - [`CacheEntry`] - the storage manager's record of a file on disk
//!
//! Types here carry no I/O. The storage manager owns cache entries; other
//! components only ever hold a [`ContentId`] as a lookup key.

pub mod entry;
pub mod error;
pub mod manifest;
pub mod models;
pub mod naming;

pub use entry::CacheEntry;
pub use error::{ContentError, Result};
pub use manifest::{Manifest, ManifestItem, ParsedManifest};
pub use models::{ContentId, MediaItem, MediaType, Playlist, PlaylistItem, Priority};
pub use naming::canonical_file_name;
