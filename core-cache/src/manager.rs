//! # Content Cache Manager
//!
//! Resolves a [`MediaItem`] to a verified file in the content cache,
//! downloading it only when no usable copy exists.
//!
//! Fills are serialized per content id: concurrent callers for the same id
//! wait on one in-flight marker and then observe the first caller's result
//! as a cache hit.

use crate::error::Result;
use core_async::sync::Mutex as AsyncMutex;
use core_content::{canonical_file_name, CacheEntry, ContentId, MediaItem, Priority};
use core_download::{DownloadManager, DownloadRequest};
use core_storage::StorageManager;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// What the cache holds for an item, without touching the network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheStatus {
    NotCached,
    /// Verified and matching the item's checksum
    Cached,
    /// Present, but the recorded digest differs from the item's checksum
    Stale,
    /// Present with no verified digest
    Unverified,
}

pub struct ContentCacheManager {
    storage: Arc<StorageManager>,
    downloads: Arc<DownloadManager>,
    in_flight: Mutex<HashMap<ContentId, Arc<AsyncMutex<()>>>>,
}

impl ContentCacheManager {
    pub fn new(storage: Arc<StorageManager>, downloads: Arc<DownloadManager>) -> Self {
        Self {
            storage,
            downloads,
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    pub fn storage(&self) -> &Arc<StorageManager> {
        &self.storage
    }

    /// Returns a verified cache entry for `item`, downloading if needed.
    ///
    /// Idempotent: a cached copy matching the item's checksum is returned
    /// without network access; a copy that fails the checksum is deleted and
    /// fetched again. Items without a checksum accept whatever file exists.
    #[instrument(skip(self, item), fields(content_id = %item.id))]
    pub async fn ensure_cached(&self, item: &MediaItem, priority: Priority) -> Result<CacheEntry> {
        item.validate()?;
        let marker = self.marker(&item.id);
        let result = {
            let _fill = marker.lock().await;
            match self.cached_copy(item).await? {
                Some(entry) => Ok(entry),
                None => self.fetch(item, priority).await,
            }
        };
        self.release(&item.id, marker);
        result
    }

    /// Downloads `item` again even if a copy exists.
    ///
    /// The new file replaces the old one in a single rename, so playback of
    /// the previous copy is never interrupted by a partial file.
    #[instrument(skip(self, item), fields(content_id = %item.id))]
    pub async fn refresh(&self, item: &MediaItem, priority: Priority) -> Result<CacheEntry> {
        item.validate()?;
        let marker = self.marker(&item.id);
        let result = {
            let _fill = marker.lock().await;
            self.fetch(item, priority).await
        };
        self.release(&item.id, marker);
        result
    }

    pub fn status(&self, item: &MediaItem) -> CacheStatus {
        let Some(entry) = self.storage.get_metadata(&item.id) else {
            return CacheStatus::NotCached;
        };
        match item.checksum() {
            Some(expected) if entry.checksum.is_some() && !entry.matches_checksum(Some(&expected)) => {
                CacheStatus::Stale
            }
            Some(expected) if entry.verified && entry.matches_checksum(Some(&expected)) => CacheStatus::Cached,
            None if entry.verified => CacheStatus::Cached,
            _ => CacheStatus::Unverified,
        }
    }

    /// Whether a verified copy matching `item` is held. No I/O.
    pub fn is_cached(&self, item: &MediaItem) -> bool {
        self.status(item) == CacheStatus::Cached
    }

    /// Playable local path for `item`, if a verified copy is on disk.
    pub async fn local_path(&self, item: &MediaItem) -> Option<PathBuf> {
        if !self.is_cached(item) {
            return None;
        }
        self.storage
            .resolve_playable(&item.id, item.checksum().as_deref())
            .await
    }

    /// Number of ids with a fill in progress or waiting.
    pub fn in_flight_count(&self) -> usize {
        self.in_flight.lock().len()
    }

    // ========================================================================
    // Internals
    // ========================================================================

    /// Usable existing copy, or `None` when the item must be downloaded.
    async fn cached_copy(&self, item: &MediaItem) -> Result<Option<CacheEntry>> {
        let Some(entry) = self.storage.get_metadata(&item.id) else {
            return Ok(None);
        };

        match item.checksum() {
            Some(expected) => {
                // Digest recorded when the bytes were written or last verified
                if entry.verified && entry.matches_checksum(Some(&expected)) {
                    if self.storage.resolve_playable(&item.id, Some(&expected)).await.is_some() {
                        debug!("Cache hit");
                        return Ok(self.storage.get_metadata(&item.id));
                    }
                    return Ok(None);
                }

                match self.storage.verify(&item.id, &expected).await {
                    Ok(true) => {
                        debug!("Cache hit after local verification");
                        self.storage.update_last_accessed(&item.id);
                        Ok(self.storage.get_metadata(&item.id))
                    }
                    Ok(false) => {
                        warn!(expected = %expected, "Cached copy is stale, downloading again");
                        self.storage.remove(&item.id, true).await?;
                        Ok(None)
                    }
                    Err(e) => {
                        warn!(error = %e, "Cached copy unreadable, downloading again");
                        self.storage.remove(&item.id, true).await?;
                        Ok(None)
                    }
                }
            }
            None => {
                if !entry.verified {
                    match self.storage.accept_unverified(&item.id).await? {
                        Some(accepted) => {
                            info!("Serving cached file without checksum (unverified)");
                            self.storage.update_last_accessed(&item.id);
                            return Ok(Some(accepted));
                        }
                        None => return Ok(None),
                    }
                }
                if self.storage.resolve_playable(&item.id, None).await.is_some() {
                    debug!("Cache hit (no checksum supplied)");
                    return Ok(self.storage.get_metadata(&item.id));
                }
                Ok(None)
            }
        }
    }

    async fn fetch(&self, item: &MediaItem, priority: Priority) -> Result<CacheEntry> {
        let request = DownloadRequest::for_item(item).with_priority(priority);
        debug!(file_name = %canonical_file_name(item), "Cache miss, downloading");
        let entry = self.downloads.download(request).await?;
        info!(bytes = entry.size_bytes, verified = entry.verified, "Cached");
        Ok(entry)
    }

    fn marker(&self, id: &ContentId) -> Arc<AsyncMutex<()>> {
        self.in_flight
            .lock()
            .entry(id.clone())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    /// Drops the marker once no other caller holds it.
    fn release(&self, id: &ContentId, marker: Arc<AsyncMutex<()>>) {
        let mut in_flight = self.in_flight.lock();
        // One reference in the map, one here
        if Arc::strong_count(&marker) <= 2 {
            in_flight.remove(id);
        }
    }
}

impl std::fmt::Debug for ContentCacheManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentCacheManager")
            .field("in_flight", &self.in_flight.lock().len())
            .finish_non_exhaustive()
    }
}
