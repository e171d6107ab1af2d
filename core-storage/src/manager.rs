//! # Storage Manager
//!
//! Sole owner of the cache directory and its index.
//!
//! - Atomic write-then-rename for every cached file
//! - Free-space accounting against both the device and the cache budget
//! - Tiered admission (HEALTHY / WARNING / CRITICAL)
//! - LRU eviction that never removes pinned entries
//! - Index rebuild by directory scan on startup
//!
//! Other components reach cached files only through this type.

use crate::atomic::AtomicWrite;
use crate::checksum::{digest_reader, ChecksumAlgorithm};
use crate::config::StorageConfig;
use crate::error::{Result, StorageError};
use crate::index::{CacheIndex, IndexSnapshot, INDEX_FILE_NAME};
use crate::pins::{PinGroup, PinSet};
use crate::tier::StorageTier;
use bridge_traits::{Clock, DeviceCapabilities, FileSystemAccess};
use bytes::Bytes;
use chrono::{DateTime, TimeZone, Utc};
use core_async::io::{AsyncRead, AsyncReadExt};
use core_content::naming::content_id_from_file_name;
use core_content::{CacheEntry, ContentId};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

pub(crate) const TEMP_SUFFIX: &str = ".part";

/// Point-in-time storage figures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageStatus {
    pub tier: StorageTier,
    /// min(device free bytes, budget - used)
    pub available_bytes: u64,
    pub device_free_bytes: u64,
    pub used_bytes: u64,
    pub budget_bytes: u64,
}

/// Cache statistics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StorageStats {
    pub entry_count: usize,
    pub total_bytes: u64,
    pub pinned_count: usize,
    pub verified_count: usize,
    pub budget_bytes: u64,
}

impl StorageStats {
    /// Cache usage as a percentage of the budget.
    pub fn usage_percentage(&self) -> f64 {
        if self.budget_bytes == 0 {
            return 0.0;
        }
        (self.total_bytes as f64 / self.budget_bytes as f64) * 100.0
    }
}

/// Result of reconciling the directory with the persisted index.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InitializeReport {
    pub entries: usize,
    pub restored_from_index: usize,
    pub rebuilt_from_scan: usize,
    pub orphaned_temp_files: usize,
    /// Files whose name no longer maps back to a content id
    pub unrecoverable_files: usize,
}

pub struct StorageManager {
    config: StorageConfig,
    fs: Arc<dyn FileSystemAccess>,
    device: Arc<dyn DeviceCapabilities>,
    clock: Arc<dyn Clock>,
    cache_dir_override: Option<PathBuf>,
    cache_dir: RwLock<Option<PathBuf>>,
    index: Mutex<CacheIndex>,
    pins: Mutex<PinSet>,
    persist_lock: core_async::sync::Mutex<()>,
}

impl StorageManager {
    pub fn new(
        config: StorageConfig,
        fs: Arc<dyn FileSystemAccess>,
        device: Arc<dyn DeviceCapabilities>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            config,
            fs,
            device,
            clock,
            cache_dir_override: None,
            cache_dir: RwLock::new(None),
            index: Mutex::new(CacheIndex::default()),
            pins: Mutex::new(PinSet::default()),
            persist_lock: core_async::sync::Mutex::new(()),
        }
    }

    /// Uses `dir` as the cache directory instead of
    /// `<host cache dir>/<config.cache_directory>`.
    pub fn with_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir_override = Some(dir.into());
        self
    }

    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    pub(crate) fn fs(&self) -> &Arc<dyn FileSystemAccess> {
        &self.fs
    }

    pub(crate) fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Creates the cache directory, removes interrupted temp files and
    /// rebuilds the index.
    #[instrument(skip(self))]
    pub async fn initialize(&self) -> Result<InitializeReport> {
        self.config.validate().map_err(StorageError::Config)?;

        let dir = match &self.cache_dir_override {
            Some(dir) => dir.clone(),
            None => self
                .fs
                .get_cache_directory()
                .await?
                .join(&self.config.cache_directory),
        };
        self.fs.create_dir_all(&dir).await?;
        *self.cache_dir.write() = Some(dir.clone());

        let snapshot = if self.config.persist_index {
            self.load_snapshot(&dir).await
        } else {
            None
        };
        let mut known = snapshot.map(IndexSnapshot::by_file_name).unwrap_or_default();

        let mut report = InitializeReport::default();
        let mut rebuilt = CacheIndex::default();
        let now = self.clock.now();

        for path in self.fs.list_directory(&dir).await? {
            let Some(file_name) = path.file_name().and_then(|n| n.to_str()).map(str::to_string)
            else {
                continue;
            };

            if file_name.ends_with(TEMP_SUFFIX) {
                match self.fs.delete_file(&path).await {
                    Ok(()) => report.orphaned_temp_files += 1,
                    Err(e) => warn!(file = %file_name, error = %e, "Failed to delete orphaned temp file"),
                }
                continue;
            }
            if file_name == INDEX_FILE_NAME || file_name.starts_with('.') {
                continue;
            }

            let metadata = match self.fs.metadata(&path).await {
                Ok(metadata) if !metadata.is_directory => metadata,
                Ok(_) => continue,
                Err(e) => {
                    warn!(file = %file_name, error = %e, "Skipping unreadable cache file");
                    continue;
                }
            };

            match known.remove(&file_name) {
                Some(mut entry) if entry.size_bytes == metadata.size => {
                    entry.local_path = path.clone();
                    entry.pinned = false;
                    rebuilt.insert(entry);
                    report.restored_from_index += 1;
                }
                _ => {
                    let Some(id) = content_id_from_file_name(&file_name) else {
                        debug!(file = %file_name, "Deleting cache file without a recoverable content id");
                        self.delete_quietly(&path).await;
                        report.unrecoverable_files += 1;
                        continue;
                    };
                    let accessed = metadata
                        .modified_at
                        .and_then(|millis| Utc.timestamp_millis_opt(millis).single())
                        .unwrap_or(now);
                    // Unverified until the cache manager checks the bytes or
                    // accepts them for an item without a checksum
                    let entry =
                        CacheEntry::new(ContentId::new(id), file_name.clone(), path.clone(), metadata.size, accessed);
                    rebuilt.insert(entry);
                    report.rebuilt_from_scan += 1;
                }
            }
        }

        report.entries = rebuilt.len();
        *self.index.lock() = rebuilt;
        self.persist_index().await;

        info!(
            path = ?dir,
            entries = report.entries,
            restored = report.restored_from_index,
            rebuilt = report.rebuilt_from_scan,
            orphaned = report.orphaned_temp_files,
            unrecoverable = report.unrecoverable_files,
            "Storage initialized"
        );
        Ok(report)
    }

    pub fn cache_dir(&self) -> Result<PathBuf> {
        self.cache_dir.read().clone().ok_or(StorageError::NotInitialized)
    }

    /// Absolute path a file with `file_name` would occupy.
    pub fn path_for(&self, file_name: &str) -> Result<PathBuf> {
        Ok(self.cache_dir()?.join(file_name))
    }

    // ========================================================================
    // Space accounting
    // ========================================================================

    /// Bytes a new file may use: `min(device free, budget - used)`.
    pub async fn available_bytes(&self) -> Result<u64> {
        Ok(self.status().await?.available_bytes)
    }

    pub async fn status(&self) -> Result<StorageStatus> {
        let device_free_bytes = self.device.free_storage_bytes().await?;
        let used_bytes = self.index.lock().total_bytes();
        let budget_left = self.config.max_cache_bytes.saturating_sub(used_bytes);
        let available_bytes = device_free_bytes.min(budget_left);

        Ok(StorageStatus {
            tier: StorageTier::classify(available_bytes, &self.config),
            available_bytes,
            device_free_bytes,
            used_bytes,
            budget_bytes: self.config.max_cache_bytes,
        })
    }

    pub async fn tier(&self) -> Result<StorageTier> {
        Ok(self.status().await?.tier)
    }

    /// Admission check for a new download of `required` bytes.
    ///
    /// HEALTHY needs `required × 1.1`, WARNING `required × 1.5` (evicting
    /// unpinned entries to get there), CRITICAL refuses outright.
    #[instrument(skip(self))]
    pub async fn check_admission(&self, required: u64) -> Result<()> {
        let status = self.status().await?;
        let Some(needed) = status.tier.required_with_buffer(required, &self.config) else {
            warn!(
                required,
                available = status.available_bytes,
                "Storage critical, refusing new download"
            );
            return Err(StorageError::InsufficientSpace {
                required,
                available: status.available_bytes,
            });
        };

        if self.ensure_space(needed).await? {
            Ok(())
        } else {
            Err(StorageError::InsufficientSpace {
                required: needed,
                available: self.available_bytes().await?,
            })
        }
    }

    /// Makes at least `required` bytes available, evicting unpinned entries
    /// if needed. Returns false if eviction could not free enough.
    #[instrument(skip(self))]
    pub async fn ensure_space(&self, required: u64) -> Result<bool> {
        if self.available_bytes().await? >= required {
            return Ok(true);
        }
        self.evict(required, &HashSet::new()).await?;
        Ok(self.available_bytes().await? >= required)
    }

    /// Deletes unpinned entries outside `keep`, least recently accessed
    /// first, until `target_free` bytes are available.
    ///
    /// Returns the bytes actually freed, which may fall short of the target.
    #[instrument(skip(self, keep), fields(keep = keep.len()))]
    pub async fn evict(&self, target_free: u64, keep: &HashSet<ContentId>) -> Result<u64> {
        let mut available = self.available_bytes().await?;
        if available >= target_free {
            return Ok(0);
        }

        let candidates = {
            let mut protected = self.pins.lock().all();
            protected.extend(keep.iter().cloned());
            self.index.lock().eviction_candidates(&protected)
        };

        let mut freed = 0u64;
        let mut evicted = 0usize;
        for candidate in candidates {
            if available >= target_free {
                break;
            }
            // Pins may have changed while we were deleting
            if self.is_pinned(&candidate.content_id) {
                continue;
            }
            match self.delete_entry(&candidate).await {
                Ok(true) => {
                    freed += candidate.size_bytes;
                    available = available.saturating_add(candidate.size_bytes);
                    evicted += 1;
                    debug!(content_id = %candidate.content_id, bytes = candidate.size_bytes, "Evicted");
                }
                Ok(false) => {}
                Err(e) => warn!(content_id = %candidate.content_id, error = %e, "Eviction failed"),
            }
        }

        if evicted > 0 {
            self.persist_index().await;
        }
        if available < target_free {
            warn!(target_free, available, freed, "Eviction exhausted candidates");
        } else {
            info!(evicted, freed, "Eviction complete");
        }
        Ok(freed)
    }

    /// Evicts every unpinned entry needed to reach `target_free`; used by
    /// recovery when storage is critical.
    pub async fn force_eviction(&self, target_free: u64) -> Result<u64> {
        self.evict(target_free, &HashSet::new()).await
    }

    // ========================================================================
    // Writes
    // ========================================================================

    /// Opens a temp file for `content_id`; nothing is visible under
    /// `file_name` until [`AtomicWrite::commit`].
    pub async fn begin_write(
        self: &Arc<Self>,
        content_id: ContentId,
        file_name: &str,
        expected_checksum: Option<String>,
    ) -> Result<AtomicWrite> {
        let dir = self.cache_dir()?;
        let final_path = dir.join(file_name);
        let temp_path = dir.join(format!(
            "{}.{}{}",
            file_name,
            uuid::Uuid::new_v4().simple(),
            TEMP_SUFFIX
        ));
        let writer = self.fs.open_write_stream(&temp_path).await?;

        debug!(content_id = %content_id, file = %file_name, "Opened atomic write");
        Ok(AtomicWrite::new(
            Arc::clone(self),
            content_id,
            file_name.to_string(),
            temp_path,
            final_path,
            writer,
            expected_checksum,
        ))
    }

    /// Copies `reader` into the cache atomically.
    #[instrument(skip(self, reader, expected_checksum))]
    pub async fn write_atomic<R>(
        self: &Arc<Self>,
        content_id: ContentId,
        file_name: &str,
        reader: &mut R,
        expected_checksum: Option<String>,
    ) -> Result<CacheEntry>
    where
        R: AsyncRead + Unpin + Send + ?Sized,
    {
        let mut write = self.begin_write(content_id, file_name, expected_checksum).await?;
        let mut buffer = vec![0u8; self.config.chunk_size];

        loop {
            let read = match reader.read(&mut buffer).await {
                Ok(read) => read,
                Err(e) => {
                    write.abort().await;
                    return Err(StorageError::Io(format!("source stream failed: {}", e)));
                }
            };
            if read == 0 {
                break;
            }
            if let Err(e) = write.write_chunk(&buffer[..read]).await {
                write.abort().await;
                return Err(e);
            }
        }

        write.commit().await
    }

    /// Records a committed file, replacing any previous entry for the id.
    pub(crate) async fn record_entry(&self, mut entry: CacheEntry) -> CacheEntry {
        let previous = self.index.lock().insert(entry.clone());
        if let Some(old) = previous {
            if old.file_name != entry.file_name {
                self.delete_quietly(&old.local_path).await;
            }
        }
        self.persist_index().await;
        entry.pinned = self.is_pinned(&entry.content_id);
        entry
    }

    // ========================================================================
    // Lookup
    // ========================================================================

    /// O(1) lookup by id.
    pub fn get_metadata(&self, id: &ContentId) -> Option<CacheEntry> {
        let mut entry = self.index.lock().get(id).cloned()?;
        entry.pinned = self.is_pinned(id);
        Some(entry)
    }

    pub fn contains(&self, id: &ContentId) -> bool {
        self.index.lock().get(id).is_some()
    }

    pub fn entries(&self) -> Vec<CacheEntry> {
        let pins = self.pins.lock().all();
        self.index
            .lock()
            .entries()
            .cloned()
            .map(|mut entry| {
                entry.pinned = pins.contains(&entry.content_id);
                entry
            })
            .collect()
    }

    /// Marks an entry as just used. Persisted with the next index write.
    pub fn update_last_accessed(&self, id: &ContentId) {
        let now = self.clock.now();
        if let Some(entry) = self.index.lock().get_mut(id) {
            entry.touch(now);
        }
    }

    /// Path of a verified entry whose file is still on disk.
    ///
    /// With `expected` set, the entry must also carry that recorded digest;
    /// an entry verified without a checksum does not satisfy an item that
    /// has one. Touches the entry. An entry whose file disappeared is dropped.
    pub async fn resolve_playable(&self, id: &ContentId, expected: Option<&str>) -> Option<PathBuf> {
        let entry = self.index.lock().get(id).cloned()?;
        if !entry.verified || !entry.matches_checksum(expected) {
            return None;
        }

        match self.fs.exists(&entry.local_path).await {
            Ok(true) => {
                self.update_last_accessed(id);
                Some(entry.local_path)
            }
            Ok(false) => {
                warn!(content_id = %id, "Cached file disappeared, dropping entry");
                self.index.lock().remove(id);
                self.persist_index().await;
                None
            }
            Err(e) => {
                warn!(content_id = %id, error = %e, "Failed to check cached file");
                None
            }
        }
    }

    /// Streams the stored file through the digest matching `expected`.
    ///
    /// On a match the entry becomes verified with that checksum; on a
    /// mismatch it is left untouched and `false` is returned.
    #[instrument(skip(self))]
    pub async fn verify(&self, id: &ContentId, expected: &str) -> Result<bool> {
        let entry = self
            .index
            .lock()
            .get(id)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(id.clone()))?;

        let expected = expected.trim().to_ascii_lowercase();
        let algorithm = ChecksumAlgorithm::for_expected(Some(&expected));
        let mut reader = self.fs.open_read_stream(&entry.local_path).await?;
        let (actual, size) = digest_reader(&mut reader, algorithm, self.config.chunk_size).await?;

        if actual != expected {
            warn!(content_id = %id, expected = %expected, actual = %actual, "Local checksum mismatch");
            return Ok(false);
        }

        if let Some(stored) = self.index.lock().get_mut(id) {
            stored.verified = true;
            stored.checksum = Some(expected);
            stored.size_bytes = size;
        }
        self.persist_index().await;
        Ok(true)
    }

    /// Marks an unverified entry as usable without a checksum.
    ///
    /// Only allowed when `allow_unverified` is set and the file is still on
    /// disk; otherwise `None`.
    pub async fn accept_unverified(&self, id: &ContentId) -> Result<Option<CacheEntry>> {
        if !self.config.allow_unverified {
            return Ok(None);
        }
        let Some(entry) = self.index.lock().get(id).cloned() else {
            return Ok(None);
        };
        if !self.fs.exists(&entry.local_path).await? {
            return Ok(None);
        }

        let accepted = {
            let mut index = self.index.lock();
            let Some(stored) = index.get_mut(id) else {
                return Ok(None);
            };
            stored.verified = true;
            stored.clone()
        };
        debug!(content_id = %id, "Accepted cached file without checksum");
        self.persist_index().await;
        Ok(Some(accepted))
    }

    /// Reads a small cached file fully into memory.
    pub async fn read(&self, id: &ContentId) -> Result<Bytes> {
        let entry = self.get_metadata(id).ok_or_else(|| StorageError::NotFound(id.clone()))?;
        let data = self.fs.read_file(&entry.local_path).await?;
        self.update_last_accessed(id);
        Ok(data)
    }

    pub fn stats(&self) -> StorageStats {
        let pins = self.pins.lock().all();
        let index = self.index.lock();
        StorageStats {
            entry_count: index.len(),
            total_bytes: index.total_bytes(),
            pinned_count: index.entries().filter(|e| pins.contains(&e.content_id)).count(),
            verified_count: index.entries().filter(|e| e.verified).count(),
            budget_bytes: self.config.max_cache_bytes,
        }
    }

    // ========================================================================
    // Removal
    // ========================================================================

    /// Removes an entry and its file. Pinned entries need `force`.
    ///
    /// Returns whether an entry existed.
    #[instrument(skip(self))]
    pub async fn remove(&self, id: &ContentId, force: bool) -> Result<bool> {
        if !force && self.is_pinned(id) {
            return Err(StorageError::Pinned(id.clone()));
        }
        let Some(entry) = self.index.lock().get(id).cloned() else {
            return Ok(false);
        };
        let removed = self.delete_entry(&entry).await?;
        self.persist_index().await;
        Ok(removed)
    }

    /// Removes every unpinned entry. Returns how many were removed.
    #[instrument(skip(self))]
    pub async fn clear(&self) -> Result<usize> {
        let pins = self.pins.lock().all();
        let victims: Vec<CacheEntry> = self
            .index
            .lock()
            .entries()
            .filter(|entry| !pins.contains(&entry.content_id))
            .cloned()
            .collect();

        let mut cleared = 0;
        for entry in victims {
            match self.delete_entry(&entry).await {
                Ok(true) => cleared += 1,
                Ok(false) => {}
                Err(e) => warn!(content_id = %entry.content_id, error = %e, "Failed to clear entry"),
            }
        }
        self.persist_index().await;
        info!(cleared, "Cleared unpinned cache entries");
        Ok(cleared)
    }

    /// Deletes the file, then drops the entry if it still refers to that file.
    async fn delete_entry(&self, entry: &CacheEntry) -> Result<bool> {
        if self.fs.exists(&entry.local_path).await? {
            self.fs.delete_file(&entry.local_path).await?;
        }
        let mut index = self.index.lock();
        let same_file = index
            .get(&entry.content_id)
            .map(|current| current.file_name == entry.file_name)
            .unwrap_or(false);
        if same_file {
            index.remove(&entry.content_id);
        }
        Ok(same_file)
    }

    pub(crate) async fn delete_quietly(&self, path: &Path) {
        match self.fs.exists(path).await {
            Ok(true) => {
                if let Err(e) = self.fs.delete_file(path).await {
                    warn!(file = ?path.file_name(), error = %e, "Failed to delete file");
                }
            }
            Ok(false) => {}
            Err(e) => warn!(file = ?path.file_name(), error = %e, "Failed to check file"),
        }
    }

    // ========================================================================
    // Pins
    // ========================================================================

    /// Replaces the ids pinned by `group`.
    pub fn pin_group(&self, group: PinGroup, ids: impl IntoIterator<Item = ContentId>) {
        let ids: HashSet<ContentId> = ids.into_iter().collect();
        debug!(?group, count = ids.len(), "Pinning group");
        self.pins.lock().replace(group, ids);
    }

    pub fn pin(&self, group: PinGroup, id: ContentId) {
        self.pins.lock().add(group, id);
    }

    pub fn unpin_group(&self, group: PinGroup) {
        debug!(?group, "Unpinning group");
        self.pins.lock().clear(group);
    }

    pub fn is_pinned(&self, id: &ContentId) -> bool {
        self.pins.lock().is_pinned(id)
    }

    pub fn pinned_ids(&self) -> HashSet<ContentId> {
        self.pins.lock().all()
    }

    // ========================================================================
    // Index persistence
    // ========================================================================

    async fn load_snapshot(&self, dir: &Path) -> Option<IndexSnapshot> {
        let path = dir.join(INDEX_FILE_NAME);
        if !self.fs.exists(&path).await.unwrap_or(false) {
            return None;
        }
        let data = match self.fs.read_file(&path).await {
            Ok(data) => data,
            Err(e) => {
                warn!(error = %e, "Failed to read cache index, rebuilding by scan");
                return None;
            }
        };
        match serde_json::from_slice::<IndexSnapshot>(&data) {
            Ok(snapshot) if snapshot.is_supported() => Some(snapshot),
            Ok(snapshot) => {
                warn!(version = snapshot.version, "Unsupported cache index version, rebuilding by scan");
                None
            }
            Err(e) => {
                warn!(error = %e, "Corrupt cache index, rebuilding by scan");
                None
            }
        }
    }

    /// Writes the index snapshot. Failures are logged; the directory scan
    /// remains authoritative.
    pub(crate) async fn persist_index(&self) {
        if !self.config.persist_index {
            return;
        }
        let Ok(dir) = self.cache_dir() else {
            return;
        };

        let _guard = self.persist_lock.lock().await;
        let snapshot = self.index.lock().snapshot(self.clock.now());
        let data = match serde_json::to_vec(&snapshot) {
            Ok(data) => data,
            Err(e) => {
                warn!(error = %e, "Failed to serialize cache index");
                return;
            }
        };

        let temp = dir.join(format!("{}{}", INDEX_FILE_NAME, TEMP_SUFFIX));
        let target = dir.join(INDEX_FILE_NAME);
        let result = async {
            self.fs.write_file(&temp, Bytes::from(data)).await?;
            self.fs.rename(&temp, &target).await
        }
        .await;
        if let Err(e) = result {
            warn!(error = %e, "Failed to persist cache index");
        }
    }

    /// Persists pending last-accessed updates.
    pub async fn flush_index(&self) {
        self.persist_index().await;
    }
}

impl std::fmt::Debug for StorageManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageManager")
            .field("cache_dir", &*self.cache_dir.read())
            .field("entries", &self.index.lock().len())
            .finish_non_exhaustive()
    }
}
