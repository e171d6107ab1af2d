//! # Content Cache
//!
//! `ensure_cached(item)` turns a manifest item into a verified local file:
//!
//! 1. Look up the canonical cache entry for the item's id.
//! 2. With a checksum: a recorded or freshly streamed digest that matches is a
//!    cache hit; a mismatch deletes the stale copy.
//! 3. Without a checksum: an existing file is accepted and logged as
//!    unverified.
//! 4. Otherwise the item is fetched through the download queue and written
//!    atomically by the storage manager.

pub mod error;
pub mod manager;

pub use error::{CacheError, Result};
pub use manager::{CacheStatus, ContentCacheManager};
