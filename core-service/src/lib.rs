//! Signage player façade and composition root.
//!
//! [`SignagePlayer`] wires the host bridges carried by a [`CoreConfig`] into
//! the storage, download, cache, sync, playback and health services, then
//! drives them with two background loops:
//!
//! - the sync loop runs a non-forced sync whenever the interval elapses and
//!   hands a changed playlist to the scheduler
//! - the health loop checks the device every `check_interval` and runs
//!   recovery when it is unhealthy, respecting the suggested backoff
//!
//! Desktop hosts enable `desktop-shims` so the missing bridges default to
//! the `bridge-desktop` adapters.
//!
//! ```rust,ignore
//! let config = CoreConfig::builder()
//!     .api_base_url("https://api.example.com/v1")
//!     .build()?;
//! let player = SignagePlayer::new(config, PlayerSettings::default())?;
//! player.start().await?;
//! let mut now_playing = player.playback().subscribe_now_playing();
//! ```

pub mod error;

pub use error::{CoreError, Result};

use core_async::sync::{CancellationToken, Notify};
use core_async::task::JoinHandle;
use core_async::time::sleep;
use core_cache::ContentCacheManager;
use core_download::{DownloadConfig, DownloadManager};
use core_health::{HealthConfig, HealthError, HealthMonitor, RecoveryOutcome};
use core_playback::{PlaybackConfig, PlaylistManager};
use core_runtime::events::{CoreEvent, EventBus};
use core_runtime::logging::LoggingConfig;
use core_runtime::CoreConfig;
use core_storage::{StorageConfig, StorageManager};
use core_sync::{ContentSyncManager, HttpManifestClient, SyncConfig, SyncError, SyncResult};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

// ============================================================================
// Settings
// ============================================================================

/// Tunables for every service the player owns.
#[derive(Debug, Clone, Default)]
pub struct PlayerSettings {
    pub storage: StorageConfig,
    pub download: DownloadConfig,
    pub sync: SyncConfig,
    pub playback: PlaybackConfig,
    pub health: HealthConfig,
}

impl PlayerSettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_storage(mut self, storage: StorageConfig) -> Self {
        self.storage = storage;
        self
    }

    pub fn with_download(mut self, download: DownloadConfig) -> Self {
        self.download = download;
        self
    }

    pub fn with_sync(mut self, sync: SyncConfig) -> Self {
        self.sync = sync;
        self
    }

    pub fn with_playback(mut self, playback: PlaybackConfig) -> Self {
        self.playback = playback;
        self
    }

    pub fn with_health(mut self, health: HealthConfig) -> Self {
        self.health = health;
        self
    }

    pub fn validate(&self) -> std::result::Result<(), String> {
        self.storage.validate()?;
        self.download.validate()?;
        self.sync.validate()?;
        self.playback.validate()?;
        self.health.validate()
    }
}

/// Logging settings that forward to the host sink configured in `config`,
/// when there is one. Pass the result to `core_runtime::logging::init_logging`.
pub fn logging_config(config: &CoreConfig) -> LoggingConfig {
    match &config.logger_sink {
        Some(sink) => LoggingConfig::default().with_logger_sink(Arc::clone(sink)),
        None => LoggingConfig::default(),
    }
}

// ============================================================================
// Player
// ============================================================================

struct Loops {
    token: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

/// Primary façade exposed to host applications.
pub struct SignagePlayer {
    event_bus: EventBus,
    storage: Arc<StorageManager>,
    downloads: Arc<DownloadManager>,
    cache: Arc<ContentCacheManager>,
    sync: Arc<ContentSyncManager>,
    playback: Arc<PlaylistManager>,
    health: Arc<HealthMonitor>,
    /// Wakes the sync loop early, e.g. after the network comes back
    sync_wake: Notify,
    loops: Mutex<Option<Loops>>,
}

impl SignagePlayer {
    /// Builds every service from the bridges in `config`. Nothing runs until
    /// [`start`](Self::start).
    pub fn new(config: CoreConfig, settings: PlayerSettings) -> Result<Arc<Self>> {
        config.validate()?;
        settings
            .validate()
            .map_err(CoreError::InitializationFailed)?;

        let event_bus = EventBus::new(config.event_buffer_size);

        let mut storage = StorageManager::new(
            settings.storage,
            Arc::clone(&config.file_system),
            Arc::clone(&config.device),
            Arc::clone(&config.clock),
        );
        if let Some(dir) = &config.cache_dir {
            storage = storage.with_cache_dir(dir.clone());
        }
        let storage = Arc::new(storage);

        let downloads = Arc::new(
            DownloadManager::new(
                settings.download,
                Arc::clone(&storage),
                Arc::clone(&config.http_client),
                Arc::clone(&config.device),
            )
            .with_registration(Arc::clone(&config.registration))
            .with_event_bus(event_bus.clone()),
        );
        let cache = Arc::new(ContentCacheManager::new(
            Arc::clone(&storage),
            Arc::clone(&downloads),
        ));

        let source = Arc::new(HttpManifestClient::new(
            Arc::clone(&config.http_client),
            Arc::clone(&config.registration),
            config.api_base_url.clone(),
        ));
        let sync = Arc::new(
            ContentSyncManager::new(
                settings.sync,
                source,
                Arc::clone(&config.registration),
                Arc::clone(&cache),
                Arc::clone(&config.clock),
            )
            .with_event_bus(event_bus.clone()),
        );

        let playback = Arc::new(
            PlaylistManager::new(
                settings.playback,
                Arc::clone(&storage),
                Arc::clone(&config.clock),
            )?
            .with_event_bus(event_bus.clone()),
        );

        let last_sync = {
            let sync = Arc::clone(&sync);
            Arc::new(move || sync.last_sync_time())
        };
        let health = Arc::new(
            HealthMonitor::new(
                settings.health,
                Arc::clone(&config.network),
                Arc::clone(&config.registration),
                Arc::clone(&storage),
                last_sync,
                Arc::clone(&config.clock),
            )?
            .with_event_bus(event_bus.clone()),
        );

        Ok(Arc::new(Self {
            event_bus,
            storage,
            downloads,
            cache,
            sync,
            playback,
            health,
            sync_wake: Notify::new(),
            loops: Mutex::new(None),
        }))
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Initializes storage and starts the background loops.
    ///
    /// Calling it again while running is a no-op.
    #[instrument(skip(self))]
    pub async fn start(self: &Arc<Self>) -> Result<()> {
        if self.is_running() {
            debug!("Player already running");
            return Ok(());
        }

        let report = self.storage.initialize().await?;
        info!(
            entries = report.entries,
            orphaned_temp_files = report.orphaned_temp_files,
            "Content cache ready"
        );
        self.downloads.start()?;

        let mut loops = self.loops.lock();
        if loops.is_some() {
            return Ok(());
        }
        let token = CancellationToken::new();
        let handles = vec![
            core_async::task::spawn(Arc::clone(self).run_sync_loop(token.clone())),
            core_async::task::spawn(Arc::clone(self).run_health_loop(token.clone())),
        ];
        *loops = Some(Loops { token, handles });
        info!("Signage player started");
        Ok(())
    }

    /// Stops the loops, playback and downloads. A sync in flight is
    /// cancelled at its next item boundary.
    #[instrument(skip(self))]
    pub async fn shutdown(&self) {
        let loops = self.loops.lock().take();
        if let Some(loops) = loops {
            loops.token.cancel();
            self.sync.cancel_sync();
            for handle in loops.handles {
                if let Err(e) = handle.await {
                    warn!(error = %e, "Player loop ended abnormally");
                }
            }
        }
        self.playback.stop().await;
        self.downloads.shutdown().await;
        info!("Signage player shut down");
    }

    pub fn is_running(&self) -> bool {
        self.loops.lock().is_some()
    }

    /// Forces a sync now and applies the resulting playlist.
    #[instrument(skip(self))]
    pub async fn sync_now(&self) -> Result<SyncResult> {
        let result = self.sync.sync_content(true).await?;
        self.apply_playlist().await;
        Ok(result)
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    pub fn subscribe_events(&self) -> core_async::sync::broadcast::Receiver<CoreEvent> {
        self.event_bus.subscribe()
    }

    pub fn storage(&self) -> &Arc<StorageManager> {
        &self.storage
    }

    pub fn downloads(&self) -> &Arc<DownloadManager> {
        &self.downloads
    }

    pub fn cache(&self) -> &Arc<ContentCacheManager> {
        &self.cache
    }

    pub fn sync(&self) -> &Arc<ContentSyncManager> {
        &self.sync
    }

    pub fn playback(&self) -> &Arc<PlaylistManager> {
        &self.playback
    }

    pub fn health(&self) -> &Arc<HealthMonitor> {
        &self.health
    }

    // ========================================================================
    // Loops
    // ========================================================================

    /// Hands the last applied manifest to the scheduler when it differs from
    /// what is loaded.
    async fn apply_playlist(&self) {
        let Some(playlist) = self.sync.current_playlist() else {
            return;
        };
        if self.playback.playlist().as_ref() == Some(&playlist) {
            return;
        }
        info!(items = playlist.len(), "Loading new playlist");
        self.playback.load_playlist(playlist).await;
    }

    async fn run_sync_loop(self: Arc<Self>, token: CancellationToken) {
        debug!("Sync loop started");
        loop {
            match self.sync.sync_content(false).await {
                Ok(result) => {
                    debug!(
                        new_items = result.new_items,
                        failed_items = result.failed_items,
                        "Scheduled sync finished"
                    );
                }
                Err(SyncError::NotDue(_) | SyncError::InProgress) => {}
                Err(SyncError::Cancelled) if token.is_cancelled() => break,
                Err(e) => warn!(error = %e, retryable = e.is_retryable(), "Scheduled sync failed"),
            }
            self.apply_playlist().await;

            let wait = self
                .sync
                .time_until_due()
                .unwrap_or(self.sync.config().sync_interval);
            core_async::select! {
                _ = token.cancelled() => break,
                _ = self.sync_wake.notified() => debug!("Sync loop woken early"),
                _ = sleep(wait) => {}
            }
        }
        debug!("Sync loop stopped");
    }

    async fn run_health_loop(self: Arc<Self>, token: CancellationToken) {
        debug!("Health loop started");
        let interval = self.health.config().check_interval;
        loop {
            let mut wait = interval;
            let status = self.health.check_health().await;
            if !status.is_healthy() {
                match self.health.attempt_recovery().await {
                    Ok(report) => {
                        if report.outcome == RecoveryOutcome::Recovered && !status.is_online {
                            self.sync_wake.notify_one();
                        }
                        if let Some(retry_after) = report.retry_after {
                            wait = wait.max(retry_after);
                        }
                    }
                    Err(HealthError::RecoveryInProgress) => {}
                    Err(e) => warn!(error = %e, "Recovery attempt failed"),
                }
            }
            core_async::select! {
                _ = token.cancelled() => break,
                _ = sleep(wait) => {}
            }
        }
        debug!("Health loop stopped");
    }
}

impl std::fmt::Debug for SignagePlayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignagePlayer")
            .field("running", &self.is_running())
            .field("sync_state", &self.sync.state())
            .field("playback_status", &self.playback.status())
            .finish_non_exhaustive()
    }
}
