//! # Sync Run Records
//!
//! Identity, progress and outcome of one `sync_content` run, and the
//! [`ContentState`] published to observers.
//!
//! ## State Machine
//!
//! ```text
//! Idle → Syncing → Complete(SyncResult)
//!          ↓  ↓
//!          │  └──→ StorageError{required, available}
//!          └─────→ Error{message, is_retryable}
//! ```
//!
//! A cancelled run returns to `Idle`.

use chrono::{DateTime, Utc};
use core_content::ContentId;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

// ============================================================================
// ID Types
// ============================================================================

/// Unique identifier for a sync run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SyncJobId(Uuid);

impl SyncJobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SyncJobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SyncJobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Progress
// ============================================================================

/// Progress through the items a run has to download.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncProgress {
    pub current_item: Option<ContentId>,
    pub processed_items: u64,
    pub total_items: u64,
    /// 0-100
    pub percent: u8,
}

impl SyncProgress {
    pub fn new(total_items: u64) -> Self {
        Self {
            total_items,
            ..Self::default()
        }
    }

    pub fn update(&mut self, current_item: Option<ContentId>, processed_items: u64) {
        self.current_item = current_item;
        self.processed_items = processed_items;
        self.percent = if self.total_items > 0 {
            ((processed_items as f64 / self.total_items as f64) * 100.0).min(100.0) as u8
        } else {
            100
        };
    }

    pub fn fraction(&self) -> f32 {
        f32::from(self.percent) / 100.0
    }
}

// ============================================================================
// Result
// ============================================================================

/// One item that could not be synced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemFailure {
    pub content_id: ContentId,
    pub message: String,
    pub is_retryable: bool,
}

/// Counters accumulated while a run is in progress.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct SyncTally {
    pub new_items: u64,
    pub updated_items: u64,
    pub deleted_items: u64,
    pub processed_items: u64,
    pub total_items: u64,
    pub downloaded_bytes: u64,
    pub failures: Vec<ItemFailure>,
}

/// Summary of a finished sync run. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResult {
    pub job_id: SyncJobId,
    pub new_items: u64,
    pub updated_items: u64,
    pub deleted_items: u64,
    pub failed_items: u64,
    /// Items downloaded or attempted, successful or not
    pub processed_items: u64,
    /// Items the run had to download
    pub total_items: u64,
    /// Bytes written to the cache by this run
    pub total_bytes: u64,
    pub duration: Duration,
    pub success: bool,
    pub error: Option<String>,
    pub failures: Vec<ItemFailure>,
    pub completed_at: DateTime<Utc>,
}

impl SyncResult {
    pub(crate) fn from_tally(
        job_id: SyncJobId,
        tally: SyncTally,
        duration: Duration,
        error: Option<String>,
        completed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            job_id,
            new_items: tally.new_items,
            updated_items: tally.updated_items,
            deleted_items: tally.deleted_items,
            failed_items: tally.failures.len() as u64,
            processed_items: tally.processed_items,
            total_items: tally.total_items,
            total_bytes: tally.downloaded_bytes,
            duration,
            success: error.is_none() && tally.failures.is_empty(),
            error,
            failures: tally.failures,
            completed_at,
        }
    }

    /// Whether the run changed nothing on disk.
    pub fn is_noop(&self) -> bool {
        self.new_items == 0 && self.updated_items == 0 && self.deleted_items == 0 && self.failed_items == 0
    }
}

// ============================================================================
// Observable state
// ============================================================================

/// Sync state published to observers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum ContentState {
    #[default]
    Idle,
    #[serde(rename_all = "camelCase")]
    Syncing {
        current_item: Option<ContentId>,
        progress: f32,
        total_items: u64,
        processed_items: u64,
    },
    Complete {
        result: SyncResult,
    },
    #[serde(rename_all = "camelCase")]
    Error {
        message: String,
        is_retryable: bool,
    },
    StorageError {
        required: u64,
        available: u64,
    },
}

impl ContentState {
    pub fn is_syncing(&self) -> bool {
        matches!(self, ContentState::Syncing { .. })
    }

    pub(crate) fn syncing(progress: &SyncProgress) -> Self {
        ContentState::Syncing {
            current_item: progress.current_item.clone(),
            progress: progress.fraction(),
            total_items: progress.total_items,
            processed_items: progress.processed_items,
        }
    }
}
