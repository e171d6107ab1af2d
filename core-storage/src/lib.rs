//! # Content Storage
//!
//! The storage manager owns the on-device cache directory.
//!
//! ## Overview
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │            StorageManager                │
//! │  - begin_write() / write_atomic()        │
//! │  - check_admission() / ensure_space()    │
//! │  - evict() / force_eviction()            │
//! │  - get_metadata() / resolve_playable()   │
//! └────────┬─────────────────────────────────┘
//!          │
//!          ├──> FileSystemAccess (bytes on disk)
//!          ├──> DeviceCapabilities (free space)
//!          └──> CacheIndex (+ .index.json snapshot)
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use core_storage::{StorageConfig, StorageManager};
//!
//! let storage = Arc::new(StorageManager::new(StorageConfig::default(), fs, device, clock));
//! storage.initialize().await?;
//!
//! storage.check_admission(item.size_bytes).await?;
//! let entry = storage
//!     .write_atomic(item.id.clone(), "promo-1.mp4", &mut reader, item.checksum())
//!     .await?;
//! ```

pub mod atomic;
pub mod checksum;
pub mod config;
pub mod error;
pub mod index;
pub mod manager;
pub mod pins;
pub mod tier;

pub use atomic::AtomicWrite;
pub use checksum::{digest_bytes, digest_reader, ChecksumAlgorithm, ChecksumHasher};
pub use config::{StorageConfig, GB, MB};
pub use error::{Result, StorageError};
pub use manager::{InitializeReport, StorageManager, StorageStats, StorageStatus};
pub use pins::PinGroup;
pub use tier::StorageTier;
