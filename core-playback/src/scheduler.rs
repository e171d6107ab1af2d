//! # Playlist Scheduler
//!
//! Cycles through a playlist forever, holding each item on screen for its
//! duration and advancing on timer expiry, manual skip, natural completion
//! or a renderer error.
//!
//! ## Loop
//!
//! ```text
//! load_playlist ──> index 0 ──> resolve source ──┬─ cached file ─┐
//!                     ▲                          ├─ remote URL ──┤
//!                     │                          └─ none: skip   │
//!                     │                                          ▼
//!                     └──── (i + 1) mod len <──── hold (timer | skip | error | completed)
//! ```
//!
//! Exactly one loop task runs per loaded playlist. Loading a new playlist
//! or calling [`PlaylistManager::stop`] cancels it and waits for it to exit,
//! so no advance is ever scheduled after a stop.

use crate::config::PlaybackConfig;
use crate::error::{PlaybackError, Result};
use bridge_traits::Clock;
use chrono::{DateTime, Utc};
use core_async::sync::{broadcast, mpsc, watch, CancellationToken, Mutex as AsyncMutex};
use core_async::task::JoinHandle;
use core_async::time::{sleep, Duration};
use core_content::{ContentId, MediaItem, Playlist, PlaylistItem};
use core_runtime::events::{CoreEvent, EventBus, PlaybackEvent};
use core_storage::{PinGroup, StorageManager};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

// ============================================================================
// Public types
// ============================================================================

/// Where the renderer should read an item from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "location", rename_all = "snake_case")]
pub enum PlaybackSource {
    Cached(PathBuf),
    Remote(String),
}

impl PlaybackSource {
    pub fn is_cached(&self) -> bool {
        matches!(self, PlaybackSource::Cached(_))
    }
}

/// The item currently on screen.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NowPlaying {
    pub item: MediaItem,
    pub index: usize,
    pub source: PlaybackSource,
    /// Effective hold time, after the default-duration fallback
    pub hold: Duration,
    pub started_at: DateTime<Utc>,
}

/// Why the scheduler moved past the previous item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdvanceReason {
    /// First item of a freshly loaded playlist
    Loaded,
    TimerExpired,
    Skipped,
    Completed,
    ItemError,
}

/// One entry of the playback-advance stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaybackAdvance {
    pub previous: Option<ContentId>,
    pub reason: AdvanceReason,
    pub now_playing: NowPlaying,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PlaybackStatus {
    /// No playlist has been assigned yet
    NoPlaylist,
    /// A playlist with zero items is assigned; idle by design
    Empty,
    Playing { index: usize },
    Stopped,
}

// ============================================================================
// Scheduler
// ============================================================================

/// Handle into the running cycle.
struct Cycle {
    token: CancellationToken,
    advance_tx: mpsc::UnboundedSender<(u64, AdvanceReason)>,
    task: JoinHandle<()>,
}

struct SchedulerState {
    status: PlaybackStatus,
    playlist: Option<Playlist>,
    current: Option<ContentId>,
    /// Bumped on every item start; advance requests carry it so a late
    /// request never cuts the next item short.
    play_seq: u64,
    cycle: Option<Cycle>,
}

pub struct PlaylistManager {
    config: PlaybackConfig,
    storage: Arc<StorageManager>,
    clock: Arc<dyn Clock>,
    event_bus: Option<EventBus>,
    /// Held across load and stop so a halt and the next install never
    /// interleave with another caller's
    control: AsyncMutex<()>,
    state: Mutex<SchedulerState>,
    now_playing: watch::Sender<Option<NowPlaying>>,
    advances: broadcast::Sender<PlaybackAdvance>,
}

impl PlaylistManager {
    pub fn new(config: PlaybackConfig, storage: Arc<StorageManager>, clock: Arc<dyn Clock>) -> Result<Self> {
        config.validate().map_err(PlaybackError::InvalidConfig)?;
        let (now_playing, _) = watch::channel(None);
        let (advances, _) = broadcast::channel(config.advance_buffer);
        Ok(Self {
            config,
            storage,
            clock,
            event_bus: None,
            control: AsyncMutex::new(()),
            state: Mutex::new(SchedulerState {
                status: PlaybackStatus::NoPlaylist,
                playlist: None,
                current: None,
                play_seq: 0,
                cycle: None,
            }),
            now_playing,
            advances,
        })
    }

    pub fn with_event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    pub fn config(&self) -> &PlaybackConfig {
        &self.config
    }

    // ========================================================================
    // Control
    // ========================================================================

    /// Replaces the playlist and restarts the cycle from the first item.
    ///
    /// The items are pinned in the cache for as long as this playlist is
    /// loaded. An empty playlist leaves the scheduler idle in
    /// [`PlaybackStatus::Empty`].
    #[instrument(skip(self, playlist), fields(items = playlist.len()))]
    pub async fn load_playlist(self: &Arc<Self>, playlist: Playlist) {
        let _control = self.control.lock().await;
        self.halt().await;

        self.storage
            .pin_group(PinGroup::Playlist, playlist.content_ids());
        self.emit(PlaybackEvent::PlaylistLoaded {
            item_count: playlist.len() as u64,
        });

        let mut state = self.state.lock();
        state.playlist = Some(playlist.clone());
        if playlist.is_empty() {
            info!("Empty playlist loaded, idling");
            state.status = PlaybackStatus::Empty;
            return;
        }

        info!(items = playlist.len(), "Playlist loaded");
        state.status = PlaybackStatus::Playing { index: 0 };
        let token = CancellationToken::new();
        let (advance_tx, advance_rx) = mpsc::unbounded_channel();
        let task = core_async::spawn(Arc::clone(self).run_cycle(playlist, token.clone(), advance_rx));
        state.cycle = Some(Cycle {
            token,
            advance_tx,
            task,
        });
    }

    /// Stops playback, releases the playlist pins and clears all state.
    pub async fn stop(&self) {
        let _control = self.control.lock().await;
        let was_running = self.halt().await;
        self.storage.unpin_group(PinGroup::Playlist);
        {
            let mut state = self.state.lock();
            state.playlist = None;
            state.status = PlaybackStatus::Stopped;
        }
        if was_running {
            info!("Playback stopped");
        }
        self.emit(PlaybackEvent::Stopped);
    }

    /// Advances immediately, as if the current item's timer expired.
    pub fn skip_to_next(&self) -> Result<()> {
        if self.request_advance(None, AdvanceReason::Skipped) {
            Ok(())
        } else {
            Err(PlaybackError::NothingPlaying)
        }
    }

    /// Renderer could not show `id`. Advances if it is the current item.
    ///
    /// Returns whether the scheduler advanced.
    pub fn report_item_error(&self, id: &ContentId, message: &str) -> bool {
        let advanced = self.request_advance(Some(id), AdvanceReason::ItemError);
        if advanced {
            warn!(content_id = %id, message, "Item failed on screen, advancing");
            self.emit(PlaybackEvent::ItemFailed {
                content_id: id.to_string(),
                message: message.to_string(),
            });
        } else {
            debug!(content_id = %id, "Ignoring error report for an item not on screen");
        }
        advanced
    }

    /// Video or web content `id` finished on its own. Advances if it is the
    /// current item.
    pub fn report_item_completed(&self, id: &ContentId) -> bool {
        self.request_advance(Some(id), AdvanceReason::Completed)
    }

    // ========================================================================
    // Observation
    // ========================================================================

    pub fn status(&self) -> PlaybackStatus {
        self.state.lock().status
    }

    pub fn playlist(&self) -> Option<Playlist> {
        self.state.lock().playlist.clone()
    }

    pub fn currently_playing(&self) -> Option<MediaItem> {
        self.now_playing.borrow().as_ref().map(|now| now.item.clone())
    }

    pub fn now_playing(&self) -> Option<NowPlaying> {
        self.now_playing.borrow().clone()
    }

    /// Latest-value stream of the item on screen.
    pub fn subscribe_now_playing(&self) -> watch::Receiver<Option<NowPlaying>> {
        self.now_playing.subscribe()
    }

    /// Every advance, in order.
    pub fn subscribe_advances(&self) -> broadcast::Receiver<PlaybackAdvance> {
        self.advances.subscribe()
    }

    /// Effective hold time for an entry.
    pub fn hold_time(&self, entry: &PlaylistItem) -> Duration {
        match u64::try_from(entry.duration_seconds()) {
            Ok(seconds) if seconds > 0 => Duration::from_secs(seconds),
            _ => {
                warn!(
                    content_id = %entry.item.id,
                    duration_seconds = entry.duration_seconds(),
                    default_secs = self.config.default_item_duration.as_secs(),
                    "Item has no usable duration, using default"
                );
                self.config.default_item_duration
            }
        }
    }

    /// Cached file when the cache has a copy verified against the item's
    /// checksum, else the source URL if remote playback is allowed.
    pub async fn resolve_source(&self, item: &MediaItem) -> Option<PlaybackSource> {
        let expected = item.checksum();
        if let Some(path) = self.storage.resolve_playable(&item.id, expected.as_deref()).await {
            return Some(PlaybackSource::Cached(path));
        }
        if self.config.remote_fallback && !item.source_url.trim().is_empty() {
            debug!(content_id = %item.id, "Not cached, streaming from source");
            return Some(PlaybackSource::Remote(item.source_url.clone()));
        }
        None
    }

    // ========================================================================
    // Loop
    // ========================================================================

    async fn run_cycle(
        self: Arc<Self>,
        playlist: Playlist,
        token: CancellationToken,
        mut advance_rx: mpsc::UnboundedReceiver<(u64, AdvanceReason)>,
    ) {
        let mut index = 0;
        let mut reason = AdvanceReason::Loaded;
        let mut previous: Option<ContentId> = None;
        let mut unplayable_run = 0;

        while !token.is_cancelled() {
            let Some(entry) = playlist.get(index) else {
                break;
            };

            match self.resolve_source(&entry.item).await {
                Some(source) => {
                    unplayable_run = 0;
                    let hold = self.hold_time(entry);
                    let seq = self.begin_item(index, entry, source, hold, previous.take(), reason);
                    let mut deadline = Box::pin(sleep(hold));

                    reason = loop {
                        core_async::select! {
                            _ = token.cancelled() => return,
                            _ = &mut deadline => break AdvanceReason::TimerExpired,
                            Some((requested, why)) = advance_rx.recv() => {
                                if requested == seq {
                                    break why;
                                }
                            }
                        }
                    };
                    previous = Some(entry.item.id.clone());
                }
                None => {
                    unplayable_run += 1;
                    debug!(content_id = %entry.item.id, "No playable source, skipping");
                    self.emit(PlaybackEvent::ItemSkipped {
                        content_id: entry.item.id.to_string(),
                        reason: "no playable source".to_string(),
                    });

                    if unplayable_run >= playlist.len() {
                        warn!(
                            items = playlist.len(),
                            "No item in the playlist is playable, waiting"
                        );
                        self.clear_current();
                        core_async::select! {
                            _ = token.cancelled() => return,
                            _ = sleep(self.config.default_item_duration) => {}
                        }
                        unplayable_run = 0;
                    }
                }
            }

            index = (index + 1) % playlist.len();
        }
    }

    fn begin_item(
        &self,
        index: usize,
        entry: &PlaylistItem,
        source: PlaybackSource,
        hold: Duration,
        previous: Option<ContentId>,
        reason: AdvanceReason,
    ) -> u64 {
        let seq = {
            let mut state = self.state.lock();
            state.play_seq += 1;
            state.current = Some(entry.item.id.clone());
            state.status = PlaybackStatus::Playing { index };
            state.play_seq
        };

        debug!(
            content_id = %entry.item.id,
            index,
            hold_ms = hold.as_millis() as u64,
            cached = source.is_cached(),
            "Now playing"
        );
        self.emit(PlaybackEvent::ItemStarted {
            content_id: entry.item.id.to_string(),
            index: index as u64,
            hold_ms: hold.as_millis() as u64,
            from_cache: source.is_cached(),
        });

        let now_playing = NowPlaying {
            item: entry.item.clone(),
            index,
            source,
            hold,
            started_at: self.clock.now(),
        };
        self.now_playing.send_replace(Some(now_playing.clone()));
        // No subscribers is fine.
        let _ = self.advances.send(PlaybackAdvance {
            previous,
            reason,
            now_playing,
        });
        seq
    }

    /// Sends an advance for the item on screen, optionally only if it is `id`.
    fn request_advance(&self, id: Option<&ContentId>, reason: AdvanceReason) -> bool {
        let state = self.state.lock();
        let Some(current) = &state.current else {
            return false;
        };
        if id.is_some_and(|id| id != current) {
            return false;
        }
        match &state.cycle {
            Some(cycle) => cycle.advance_tx.send((state.play_seq, reason)).is_ok(),
            None => false,
        }
    }

    /// Cancels the running cycle and waits for its task to exit.
    async fn halt(&self) -> bool {
        let cycle = self.state.lock().cycle.take();
        let Some(cycle) = cycle else {
            self.clear_current();
            return false;
        };
        cycle.token.cancel();
        if let Err(e) = cycle.task.await {
            warn!(error = %e, "Playback loop ended abnormally");
        }
        self.clear_current();
        true
    }

    fn clear_current(&self) {
        self.state.lock().current = None;
        self.now_playing.send_replace(None);
    }

    fn emit(&self, event: PlaybackEvent) {
        if let Some(bus) = &self.event_bus {
            bus.publish(CoreEvent::Playback(event));
        }
    }
}

impl std::fmt::Debug for PlaylistManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaylistManager")
            .field("config", &self.config)
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}
