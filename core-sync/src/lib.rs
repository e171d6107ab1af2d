//! # Content Sync Module
//!
//! Keeps the local content cache aligned with the manifest the backend
//! assigns to this device.
//!
//! ## Overview
//!
//! A sync run fetches the manifest, compares it with what was applied last
//! time and what the cache holds, then downloads new and changed items and
//! deletes items the manifest no longer references. Runs are single-flight
//! and rate limited by a minimum interval unless forced.
//!
//! ## Components
//!
//! - **Manifest Client** (`client`): `ManifestSource` seam and its HTTP implementation
//! - **Diff** (`diff`): Classifies manifest items as new, updated or unchanged
//! - **Run Records** (`job`): Progress, per-item failures, `SyncResult` and `ContentState`
//! - **Sync Manager** (`manager`): Orchestrates a run end to end

pub mod client;
pub mod config;
pub mod diff;
pub mod error;
pub mod job;
pub mod manager;

pub use client::{HttpManifestClient, ManifestSource};
pub use config::SyncConfig;
pub use diff::{diff_manifest, ChangeKind, ManifestDiff};
pub use error::{Result, SyncError};
pub use job::{ContentState, ItemFailure, SyncJobId, SyncProgress, SyncResult};
pub use manager::ContentSyncManager;
