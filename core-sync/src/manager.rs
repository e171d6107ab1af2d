//! # Content Sync Manager
//!
//! Reconciles the content cache with the manifest the backend assigns to
//! this device.
//!
//! ## Workflow
//!
//! 1. Refuse when a run is in flight or the sync interval has not elapsed
//!    (both bypassed by `force`)
//! 2. Resolve the registered device id
//! 3. Fetch and parse the manifest
//! 4. Diff it against the last applied manifest and the cache
//! 5. Refuse with `InsufficientStorage` when the downloads cannot fit
//! 6. Pin the manifest set, delete unreferenced unpinned entries
//! 7. Download new and updated items one at a time, in manifest order
//! 8. Publish an immutable [`SyncResult`]
//!
//! ## Usage
//!
//! ```rust,ignore
//! let sync = ContentSyncManager::new(SyncConfig::default(), source, registration, cache, clock);
//! let mut state = sync.subscribe_state();
//! let result = sync.sync_content(false).await?;
//! println!("{} new, {} failed", result.new_items, result.failed_items);
//! ```

use crate::client::ManifestSource;
use crate::config::SyncConfig;
use crate::diff::{diff_manifest, ChangeKind};
use crate::error::{Result, SyncError};
use crate::job::{ContentState, ItemFailure, SyncJobId, SyncProgress, SyncResult, SyncTally};
use bridge_traits::{Clock, RegistrationProvider};
use chrono::{DateTime, Utc};
use core_async::sync::{watch, CancellationToken, Mutex as AsyncMutex};
use core_async::time::Instant;
use core_cache::ContentCacheManager;
use core_content::{CacheEntry, ContentError, ContentId, Manifest, MediaItem, Playlist};
use core_runtime::events::{CoreEvent, EventBus, SyncEvent};
use core_storage::{PinGroup, StorageError, StorageManager};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};

pub struct ContentSyncManager {
    config: SyncConfig,
    source: Arc<dyn ManifestSource>,
    registration: Arc<dyn RegistrationProvider>,
    cache: Arc<ContentCacheManager>,
    storage: Arc<StorageManager>,
    clock: Arc<dyn Clock>,
    event_bus: Option<EventBus>,

    /// Held for the whole run; the single-flight guard
    run_lock: AsyncMutex<()>,
    cancel: Mutex<Option<CancellationToken>>,
    state: watch::Sender<ContentState>,

    /// Items whose bytes match the cache, keyed by id
    applied: Mutex<HashMap<ContentId, MediaItem>>,
    manifest: Mutex<Option<(Manifest, Vec<MediaItem>)>>,
    last_result: Mutex<Option<SyncResult>>,
    last_completed: Mutex<Option<(Instant, DateTime<Utc>)>>,
}

impl ContentSyncManager {
    pub fn new(
        config: SyncConfig,
        source: Arc<dyn ManifestSource>,
        registration: Arc<dyn RegistrationProvider>,
        cache: Arc<ContentCacheManager>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let (state, _) = watch::channel(ContentState::Idle);
        let storage = Arc::clone(cache.storage());
        Self {
            config,
            source,
            registration,
            cache,
            storage,
            clock,
            event_bus: None,
            run_lock: AsyncMutex::new(()),
            cancel: Mutex::new(None),
            state,
            applied: Mutex::new(HashMap::new()),
            manifest: Mutex::new(None),
            last_result: Mutex::new(None),
            last_completed: Mutex::new(None),
        }
    }

    pub fn with_event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    // ========================================================================
    // Sync
    // ========================================================================

    /// Runs one sync.
    ///
    /// Without `force`, returns `InProgress` while another run holds the
    /// guard and `NotDue` inside the sync interval. With `force`, a running
    /// sync is cancelled and awaited first.
    ///
    /// Per-item failures do not fail the run; they are listed in the result.
    #[instrument(skip(self))]
    pub async fn sync_content(&self, force: bool) -> Result<SyncResult> {
        let _run = match self.run_lock.try_lock() {
            Ok(guard) => guard,
            Err(_) if force => {
                info!("Forced sync, cancelling the run in progress");
                self.cancel_sync();
                self.run_lock.lock().await
            }
            Err(_) => return Err(SyncError::InProgress),
        };

        if !force {
            if let Some(remaining) = self.time_until_due() {
                debug!(remaining_secs = remaining.as_secs(), "Sync not due");
                return Err(SyncError::NotDue(remaining));
            }
        }

        let token = CancellationToken::new();
        *self.cancel.lock() = Some(token.clone());
        let job_id = SyncJobId::new();
        let started = Instant::now();
        info!(%job_id, force, "Sync started");
        self.emit(SyncEvent::Started {
            sync_id: job_id.to_string(),
            forced: force,
        });
        self.state.send_replace(ContentState::syncing(&SyncProgress::new(0)));

        let mut tally = SyncTally::default();
        let outcome = self.run(job_id, &token, &mut tally).await;
        *self.cancel.lock() = None;

        let error = outcome.as_ref().err().map(ToString::to_string);
        let result = SyncResult::from_tally(job_id, tally, started.elapsed(), error, self.clock.now());
        *self.last_result.lock() = Some(result.clone());

        match outcome {
            Ok(()) => {
                *self.last_completed.lock() = Some((Instant::now(), result.completed_at));
                info!(
                    %job_id,
                    new = result.new_items,
                    updated = result.updated_items,
                    deleted = result.deleted_items,
                    failed = result.failed_items,
                    bytes = result.total_bytes,
                    "Sync completed"
                );
                self.emit(SyncEvent::Completed {
                    sync_id: job_id.to_string(),
                    new_items: result.new_items,
                    updated_items: result.updated_items,
                    deleted_items: result.deleted_items,
                    failed_items: result.failed_items,
                    total_bytes: result.total_bytes,
                    duration_ms: result.duration.as_millis() as u64,
                });
                self.state.send_replace(ContentState::Complete {
                    result: result.clone(),
                });
                Ok(result)
            }
            Err(SyncError::Cancelled) => {
                info!(%job_id, processed = result.processed_items, "Sync cancelled");
                self.emit(SyncEvent::Cancelled {
                    sync_id: job_id.to_string(),
                    processed_items: result.processed_items,
                });
                self.state.send_replace(ContentState::Idle);
                Err(SyncError::Cancelled)
            }
            Err(SyncError::InsufficientStorage {
                required,
                available,
            }) => {
                warn!(%job_id, required, available, "Sync refused, not enough storage");
                self.emit(SyncEvent::StorageRefused {
                    sync_id: job_id.to_string(),
                    required_bytes: required,
                    available_bytes: available,
                });
                self.state.send_replace(ContentState::StorageError {
                    required,
                    available,
                });
                Err(SyncError::InsufficientStorage {
                    required,
                    available,
                })
            }
            Err(e) => {
                error!(%job_id, error = %e, processed = result.processed_items, "Sync failed");
                self.emit(SyncEvent::Failed {
                    sync_id: job_id.to_string(),
                    message: e.to_string(),
                    processed_items: result.processed_items,
                    recoverable: e.is_retryable(),
                });
                self.state.send_replace(ContentState::Error {
                    message: e.to_string(),
                    is_retryable: e.is_retryable(),
                });
                Err(e)
            }
        }
    }

    /// Stops the running sync at the next item boundary.
    ///
    /// Already downloaded files stay. Returns false when nothing was running.
    pub fn cancel_sync(&self) -> bool {
        match self.cancel.lock().as_ref() {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    async fn run(&self, job_id: SyncJobId, token: &CancellationToken, tally: &mut SyncTally) -> Result<()> {
        let device_id = self.device_id().await?;
        let manifest = self.source.fetch_manifest(&device_id).await?;
        let parsed = manifest.parse_items();
        for rejected in &parsed.rejected {
            warn!(error = %rejected, "Skipping manifest item");
            tally.failures.push(ItemFailure {
                content_id: rejected_id(rejected),
                message: rejected.to_string(),
                is_retryable: false,
            });
        }

        let referenced = manifest.content_ids();
        let cached: HashMap<ContentId, CacheEntry> = self
            .storage
            .entries()
            .into_iter()
            .map(|entry| (entry.content_id.clone(), entry))
            .collect();
        let applied = self.applied.lock().clone();
        let diff = diff_manifest(&parsed.items, &referenced, &applied, &cached);
        debug!(
            download = diff.to_download.len(),
            unchanged = diff.unchanged.len(),
            removed = diff.removed.len(),
            "Manifest diff"
        );

        let required = diff.required_bytes();
        if required > 0 {
            let available = self.storage.available_bytes().await?;
            if required > available {
                return Err(SyncError::InsufficientStorage {
                    required,
                    available,
                });
            }
        }

        self.storage
            .pin_group(PinGroup::Manifest, referenced.iter().cloned());

        for id in &diff.removed {
            match self.storage.remove(id, false).await {
                Ok(true) => {
                    debug!(content_id = %id, "Deleted content no longer in manifest");
                    tally.deleted_items += 1;
                }
                Ok(false) => {}
                Err(StorageError::Pinned(_)) => {
                    debug!(content_id = %id, "Keeping removed content still in use");
                }
                Err(e) => warn!(content_id = %id, error = %e, "Failed to delete removed content"),
            }
        }

        {
            let mut applied = self.applied.lock();
            applied.retain(|id, _| referenced.contains(id));
            for item in &diff.unchanged {
                applied.insert(item.id.clone(), item.clone());
            }
        }

        tally.total_items = diff.to_download.len() as u64;
        let mut progress = SyncProgress::new(tally.total_items);

        for (item, kind) in diff.to_download {
            if token.is_cancelled() {
                return Err(SyncError::Cancelled);
            }

            progress.update(Some(item.id.clone()), tally.processed_items);
            self.publish_progress(job_id, &progress);

            let source = self.resolve_source(&device_id, &item).await;
            let priority = self.config.default_priority;
            let outcome = match kind {
                ChangeKind::Updated => self.cache.refresh(&source, priority).await,
                ChangeKind::New | ChangeKind::Unverified | ChangeKind::Unchanged => {
                    self.cache.ensure_cached(&source, priority).await
                }
            };

            match outcome {
                Ok(entry) => {
                    match kind {
                        ChangeKind::New => tally.new_items += 1,
                        ChangeKind::Updated => tally.updated_items += 1,
                        ChangeKind::Unverified | ChangeKind::Unchanged => {}
                    }
                    if kind != ChangeKind::Unverified {
                        tally.downloaded_bytes += entry.size_bytes;
                    }
                    self.applied.lock().insert(item.id.clone(), item);
                }
                Err(e) => {
                    warn!(content_id = %item.id, error = %e, "Item failed, continuing");
                    tally.failures.push(ItemFailure {
                        content_id: item.id.clone(),
                        message: e.to_string(),
                        is_retryable: e.is_retryable(),
                    });
                }
            }
            tally.processed_items += 1;
        }

        progress.update(None, tally.processed_items);
        self.publish_progress(job_id, &progress);
        *self.manifest.lock() = Some((manifest, parsed.items));
        Ok(())
    }

    async fn device_id(&self) -> Result<String> {
        if !self.registration.is_registered().await {
            return Err(SyncError::Unregistered);
        }
        self.registration
            .device_id()
            .await
            .filter(|id| !id.trim().is_empty())
            .ok_or(SyncError::Unregistered)
    }

    /// The item with a signed download URL when those are enabled.
    async fn resolve_source(&self, device_id: &str, item: &MediaItem) -> MediaItem {
        let mut source = item.clone();
        if !self.config.resolve_signed_urls {
            return source;
        }
        match self.source.resolve_download_url(device_id, &item.id).await {
            Ok(url) => source.source_url = url,
            Err(e) => warn!(content_id = %item.id, error = %e, "Signed URL unavailable, using manifest URL"),
        }
        source
    }

    fn publish_progress(&self, job_id: SyncJobId, progress: &SyncProgress) {
        self.state.send_replace(ContentState::syncing(progress));
        self.emit(SyncEvent::Progress {
            sync_id: job_id.to_string(),
            current_item: progress
                .current_item
                .as_ref()
                .map(ToString::to_string)
                .unwrap_or_default(),
            processed_items: progress.processed_items,
            total_items: progress.total_items,
            percent: progress.percent,
        });
    }

    fn emit(&self, event: SyncEvent) {
        if let Some(bus) = &self.event_bus {
            bus.publish(CoreEvent::Sync(event));
        }
    }

    // ========================================================================
    // Observation
    // ========================================================================

    pub fn subscribe_state(&self) -> watch::Receiver<ContentState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> ContentState {
        self.state.borrow().clone()
    }

    pub fn is_syncing(&self) -> bool {
        self.run_lock.try_lock().is_err()
    }

    pub fn last_result(&self) -> Option<SyncResult> {
        self.last_result.lock().clone()
    }

    /// Wall-clock time of the last run that applied a manifest.
    pub fn last_sync_time(&self) -> Option<DateTime<Utc>> {
        self.last_completed.lock().map(|(_, at)| at)
    }

    /// Time left before a non-forced sync is allowed, if any.
    pub fn time_until_due(&self) -> Option<Duration> {
        let (at, _) = (*self.last_completed.lock())?;
        self.config
            .sync_interval
            .checked_sub(at.elapsed())
            .filter(|remaining| !remaining.is_zero())
    }

    /// The last applied manifest as received.
    pub fn current_manifest(&self) -> Option<Manifest> {
        self.manifest.lock().as_ref().map(|(manifest, _)| manifest.clone())
    }

    /// Valid items of the last applied manifest, as a playlist.
    pub fn current_playlist(&self) -> Option<Playlist> {
        self.manifest
            .lock()
            .as_ref()
            .map(|(_, items)| Playlist::from_media(items.clone()))
    }
}

fn rejected_id(error: &ContentError) -> ContentId {
    match error {
        ContentError::InvalidItem { id, .. } => ContentId::new(id.clone()),
        _ => ContentId::new(String::new()),
    }
}

impl std::fmt::Debug for ContentSyncManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentSyncManager")
            .field("config", &self.config)
            .field("state", &*self.state.borrow())
            .finish_non_exhaustive()
    }
}
