//! # Content Downloads
//!
//! Priority-ordered, bandwidth-throttled downloads into the content cache.
//!
//! ## Overview
//!
//! ```text
//! enqueue() ──> admission (network, storage tier, codecs)
//!                  │
//!                  v
//!            DownloadQueue (HIGH > NORMAL > LOW, FIFO within)
//!                  │
//!                  v
//!            worker ──> HttpClient::download_stream
//!                  │        │
//!                  │        └─> BandwidthThrottler (per transport)
//!                  v
//!            StorageManager::begin_write ──> commit (checksum, rename)
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use core_download::{DownloadConfig, DownloadManager, DownloadRequest};
//!
//! let downloads = Arc::new(DownloadManager::new(DownloadConfig::default(), storage, http, device));
//! let entry = downloads.download(DownloadRequest::for_item(&item)).await?;
//! ```

pub mod config;
pub mod error;
pub mod manager;
pub mod queue;
pub mod request;
pub mod throttle;

pub use config::DownloadConfig;
pub use error::{DownloadError, Result};
pub use manager::DownloadManager;
pub use queue::DownloadQueue;
pub use request::{DownloadRequest, DownloadState};
pub use throttle::BandwidthThrottler;
