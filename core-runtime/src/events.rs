//! # Event Bus System
//!
//! Broadcast channel carrying diagnostics and telemetry events out of the
//! player core. Components publish; the host shell, telemetry uploaders, and
//! tests subscribe.
//!
//! ```text
//! ┌──────────────┐  emit   ┌───────────┐  subscribe  ┌────────────┐
//! │ Sync Manager ├────────>│           ├────────────>│ Telemetry  │
//! ├──────────────┤         │ EventBus  │             └────────────┘
//! │ Downloader   ├────────>│ (broadcast│  subscribe  ┌────────────┐
//! ├──────────────┤         │  channel) ├────────────>│ Host UI    │
//! │ Playlist     ├────────>│           │             └────────────┘
//! ├──────────────┤         │           │
//! │ Health       ├────────>│           │
//! └──────────────┘         └───────────┘
//! ```
//!
//! The bus is lossy by design of `broadcast`: a subscriber that falls more than
//! `capacity` events behind gets `RecvError::Lagged(n)` and continues from the
//! oldest retained event. Authoritative state (download states, sync state,
//! now-playing) lives in per-component `watch` channels instead.
//!
//! ```rust
//! use core_runtime::events::{CoreEvent, EventBus, SyncEvent};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let bus = EventBus::new(100);
//! let mut rx = bus.subscribe();
//!
//! bus.emit(CoreEvent::Sync(SyncEvent::Started {
//!     sync_id: "sync-1".to_string(),
//!     forced: false,
//! }))
//! .ok();
//!
//! let event = rx.recv().await.unwrap();
//! assert_eq!(event.description(), "Sync started");
//! # }
//! ```

use core_async::sync::broadcast;
use serde::{Deserialize, Serialize};
use std::fmt;

pub use core_async::sync::broadcast::error::{RecvError, SendError};
pub use core_async::sync::broadcast::Receiver;

/// Default buffer size for the event bus channel.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 256;

// ============================================================================
// Core Event Types
// ============================================================================

/// Top-level event enum published on the bus.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    Sync(SyncEvent),
    Download(DownloadEvent),
    Playback(PlaybackEvent),
    Health(HealthEvent),
}

impl CoreEvent {
    /// Returns a human-readable description of the event.
    pub fn description(&self) -> &str {
        match self {
            CoreEvent::Sync(e) => e.description(),
            CoreEvent::Download(e) => e.description(),
            CoreEvent::Playback(e) => e.description(),
            CoreEvent::Health(e) => e.description(),
        }
    }

    /// Returns the severity level of the event.
    pub fn severity(&self) -> EventSeverity {
        match self {
            CoreEvent::Sync(SyncEvent::Failed { .. })
            | CoreEvent::Sync(SyncEvent::StorageRefused { .. }) => EventSeverity::Error,
            CoreEvent::Download(DownloadEvent::Failed { retryable: false, .. })
            | CoreEvent::Download(DownloadEvent::Rejected { .. }) => EventSeverity::Error,
            CoreEvent::Health(HealthEvent::RecoveryFinished { recovered: false, .. }) => {
                EventSeverity::Error
            }
            CoreEvent::Download(DownloadEvent::Failed { .. })
            | CoreEvent::Playback(PlaybackEvent::ItemSkipped { .. })
            | CoreEvent::Playback(PlaybackEvent::ItemFailed { .. }) => EventSeverity::Warning,
            CoreEvent::Sync(SyncEvent::Completed { .. })
            | CoreEvent::Playback(PlaybackEvent::PlaylistLoaded { .. })
            | CoreEvent::Health(HealthEvent::RecoveryFinished { .. }) => EventSeverity::Info,
            _ => EventSeverity::Debug,
        }
    }
}

/// Event severity levels for filtering and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    Debug,
    Info,
    Warning,
    Error,
}

// ============================================================================
// Sync Events
// ============================================================================

/// Events emitted by the content sync manager.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum SyncEvent {
    Started {
        sync_id: String,
        forced: bool,
    },
    /// Emitted once per manifest item processed.
    Progress {
        sync_id: String,
        current_item: String,
        processed_items: u64,
        total_items: u64,
        percent: u8,
    },
    Completed {
        sync_id: String,
        new_items: u64,
        updated_items: u64,
        deleted_items: u64,
        failed_items: u64,
        total_bytes: u64,
        duration_ms: u64,
    },
    Failed {
        sync_id: String,
        message: String,
        processed_items: u64,
        recoverable: bool,
    },
    /// Manifest needs more space than the cache can provide.
    StorageRefused {
        sync_id: String,
        required_bytes: u64,
        available_bytes: u64,
    },
    Cancelled {
        sync_id: String,
        processed_items: u64,
    },
}

impl SyncEvent {
    fn description(&self) -> &str {
        match self {
            SyncEvent::Started { .. } => "Sync started",
            SyncEvent::Progress { .. } => "Sync in progress",
            SyncEvent::Completed { .. } => "Sync completed",
            SyncEvent::Failed { .. } => "Sync failed",
            SyncEvent::StorageRefused { .. } => "Sync refused for lack of storage",
            SyncEvent::Cancelled { .. } => "Sync cancelled",
        }
    }
}

// ============================================================================
// Download Events
// ============================================================================

/// Events emitted by the download manager.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum DownloadEvent {
    Queued {
        content_id: String,
        position: u64,
        priority: String,
    },
    /// Admission checks refused the request.
    Rejected {
        content_id: String,
        reason: String,
    },
    Started {
        content_id: String,
        total_bytes: Option<u64>,
    },
    Completed {
        content_id: String,
        bytes: u64,
        duration_ms: u64,
    },
    Failed {
        content_id: String,
        message: String,
        retryable: bool,
    },
    Cancelled {
        content_id: String,
    },
}

impl DownloadEvent {
    fn description(&self) -> &str {
        match self {
            DownloadEvent::Queued { .. } => "Download queued",
            DownloadEvent::Rejected { .. } => "Download rejected",
            DownloadEvent::Started { .. } => "Download started",
            DownloadEvent::Completed { .. } => "Download completed",
            DownloadEvent::Failed { .. } => "Download failed",
            DownloadEvent::Cancelled { .. } => "Download cancelled",
        }
    }
}

// ============================================================================
// Playback Events
// ============================================================================

/// Events emitted by the playlist scheduler.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum PlaybackEvent {
    PlaylistLoaded {
        item_count: u64,
    },
    ItemStarted {
        content_id: String,
        index: u64,
        hold_ms: u64,
        from_cache: bool,
    },
    /// Item had no playable source and was passed over.
    ItemSkipped {
        content_id: String,
        reason: String,
    },
    /// Renderer reported an error for the current item.
    ItemFailed {
        content_id: String,
        message: String,
    },
    Stopped,
}

impl PlaybackEvent {
    fn description(&self) -> &str {
        match self {
            PlaybackEvent::PlaylistLoaded { .. } => "Playlist loaded",
            PlaybackEvent::ItemStarted { .. } => "Item started",
            PlaybackEvent::ItemSkipped { .. } => "Item skipped",
            PlaybackEvent::ItemFailed { .. } => "Item failed",
            PlaybackEvent::Stopped => "Playback stopped",
        }
    }
}

// ============================================================================
// Health Events
// ============================================================================

/// Events emitted by the health monitor.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum HealthEvent {
    Checked {
        is_online: bool,
        storage_tier: String,
        registration_valid: bool,
    },
    RecoveryStarted {
        action: String,
    },
    RecoveryFinished {
        action: String,
        recovered: bool,
        consecutive_failures: u32,
    },
}

impl HealthEvent {
    fn description(&self) -> &str {
        match self {
            HealthEvent::Checked { .. } => "Health checked",
            HealthEvent::RecoveryStarted { .. } => "Recovery started",
            HealthEvent::RecoveryFinished { .. } => "Recovery finished",
        }
    }
}

// ============================================================================
// Event Bus
// ============================================================================

/// Central event bus for publishing and subscribing to events.
///
/// Cloning the bus clones the sender; every clone publishes to the same
/// subscribers.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    /// Creates a new event bus buffering up to `capacity` events per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publishes an event to all subscribers.
    ///
    /// Returns the number of receivers, or an error when nobody is listening.
    pub fn emit(&self, event: CoreEvent) -> Result<usize, SendError<CoreEvent>> {
        self.sender.send(event)
    }

    /// Publishes an event, ignoring the no-subscriber case.
    pub fn publish(&self, event: CoreEvent) {
        let _ = self.sender.send(event);
    }

    /// Creates a new subscriber. Past events are not replayed.
    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

// ============================================================================
// Event Stream Wrapper
// ============================================================================

type EventFilter = Box<dyn Fn(&CoreEvent) -> bool + Send + Sync>;

/// A `broadcast::Receiver` with an optional predicate.
///
/// ```rust
/// use core_runtime::events::{CoreEvent, EventBus, EventStream};
///
/// let bus = EventBus::new(100);
/// let downloads = EventStream::new(bus.subscribe())
///     .filter(|event| matches!(event, CoreEvent::Download(_)));
/// ```
pub struct EventStream {
    receiver: Receiver<CoreEvent>,
    filter: Option<EventFilter>,
}

impl EventStream {
    pub fn new(receiver: Receiver<CoreEvent>) -> Self {
        Self {
            receiver,
            filter: None,
        }
    }

    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&CoreEvent) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(predicate));
        self
    }

    fn accepts(&self, event: &CoreEvent) -> bool {
        self.filter.as_ref().map_or(true, |filter| filter(event))
    }

    /// Receives the next event that passes the filter.
    pub async fn recv(&mut self) -> Result<CoreEvent, RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            if self.accepts(&event) {
                return Ok(event);
            }
        }
    }

    /// Attempts to receive a matching event without waiting.
    pub fn try_recv(&mut self) -> Option<Result<CoreEvent, RecvError>> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) if self.accepts(&event) => return Some(Ok(event)),
                Ok(_) => continue,
                Err(broadcast::error::TryRecvError::Empty) => return None,
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    return Some(Err(RecvError::Lagged(n)))
                }
                Err(broadcast::error::TryRecvError::Closed) => return Some(Err(RecvError::Closed)),
            }
        }
    }
}

impl fmt::Debug for EventStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream")
            .field("has_filter", &self.filter.is_some())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
