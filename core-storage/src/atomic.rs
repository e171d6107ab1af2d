//! Atomic write handle
//!
//! Bytes go to `<file>.<uuid>.part` and are renamed onto the final name only
//! after the digest has been checked. A handle dropped without `commit` or
//! `abort` schedules deletion of its temp file on the current runtime.

use crate::checksum::{ChecksumAlgorithm, ChecksumHasher};
use crate::error::{Result, StorageError};
use crate::manager::StorageManager;
use core_async::io::{AsyncWrite, AsyncWriteExt};
use core_content::{CacheEntry, ContentId};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, warn};

pub struct AtomicWrite {
    storage: Arc<StorageManager>,
    content_id: ContentId,
    file_name: String,
    temp_path: PathBuf,
    final_path: PathBuf,
    writer: Option<Box<dyn AsyncWrite + Send + Unpin>>,
    hasher: Option<ChecksumHasher>,
    expected_checksum: Option<String>,
    bytes_written: u64,
    finished: bool,
}

impl AtomicWrite {
    pub(crate) fn new(
        storage: Arc<StorageManager>,
        content_id: ContentId,
        file_name: String,
        temp_path: PathBuf,
        final_path: PathBuf,
        writer: Box<dyn AsyncWrite + Send + Unpin>,
        expected_checksum: Option<String>,
    ) -> Self {
        let expected_checksum = expected_checksum
            .map(|c| c.trim().to_ascii_lowercase())
            .filter(|c| !c.is_empty());
        let algorithm = ChecksumAlgorithm::for_expected(expected_checksum.as_deref());
        Self {
            storage,
            content_id,
            file_name,
            temp_path,
            final_path,
            writer: Some(writer),
            hasher: Some(ChecksumHasher::new(algorithm)),
            expected_checksum,
            bytes_written: 0,
            finished: false,
        }
    }

    pub fn content_id(&self) -> &ContentId {
        &self.content_id
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Path of the temp file; never the final name.
    pub fn temp_path(&self) -> &std::path::Path {
        &self.temp_path
    }

    pub async fn write_chunk(&mut self, chunk: &[u8]) -> Result<()> {
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| StorageError::Io("write handle already closed".to_string()))?;
        writer.write_all(chunk).await?;
        if let Some(hasher) = self.hasher.as_mut() {
            hasher.update(chunk);
        }
        self.bytes_written += chunk.len() as u64;
        Ok(())
    }

    /// Flushes, checks the digest and renames into place.
    ///
    /// On a checksum mismatch the temp file is deleted and nothing changes
    /// under the final name.
    pub async fn commit(mut self) -> Result<CacheEntry> {
        self.finished = true;

        if let Some(mut writer) = self.writer.take() {
            let flushed = async {
                writer.flush().await?;
                writer.shutdown().await
            }
            .await;
            drop(writer);
            if let Err(e) = flushed {
                self.storage.delete_quietly(&self.temp_path).await;
                return Err(e.into());
            }
        }

        let actual = self
            .hasher
            .take()
            .map(ChecksumHasher::finalize)
            .unwrap_or_default();

        if let Some(expected) = &self.expected_checksum {
            if *expected != actual {
                warn!(
                    content_id = %self.content_id,
                    expected = %expected,
                    actual = %actual,
                    "Checksum mismatch, discarding download"
                );
                self.storage.delete_quietly(&self.temp_path).await;
                return Err(StorageError::ChecksumMismatch {
                    content_id: self.content_id.clone(),
                    expected: expected.clone(),
                    actual,
                });
            }
        }

        if let Err(e) = self.storage.fs().rename(&self.temp_path, &self.final_path).await {
            self.storage.delete_quietly(&self.temp_path).await;
            return Err(e.into());
        }

        let verified = self.expected_checksum.is_some() || self.storage.config().allow_unverified;
        let mut entry = CacheEntry::new(
            self.content_id.clone(),
            self.file_name.clone(),
            self.final_path.clone(),
            self.bytes_written,
            self.storage.now(),
        );
        entry.verified = verified;
        entry.checksum = Some(actual);

        debug!(
            content_id = %self.content_id,
            bytes = self.bytes_written,
            verified,
            "Committed atomic write"
        );
        Ok(self.storage.record_entry(entry).await)
    }

    /// Discards the temp file.
    pub async fn abort(mut self) {
        self.finished = true;
        drop(self.writer.take());
        self.storage.delete_quietly(&self.temp_path).await;
        debug!(content_id = %self.content_id, "Aborted atomic write");
    }
}

impl Drop for AtomicWrite {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        drop(self.writer.take());
        if core_async::task::in_runtime() {
            let storage = Arc::clone(&self.storage);
            let temp_path = self.temp_path.clone();
            core_async::task::spawn(async move {
                storage.delete_quietly(&temp_path).await;
            });
        } else {
            warn!(
                content_id = %self.content_id,
                "Atomic write dropped outside a runtime; temp file left for the next startup sweep"
            );
        }
    }
}

impl std::fmt::Debug for AtomicWrite {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AtomicWrite")
            .field("content_id", &self.content_id)
            .field("file_name", &self.file_name)
            .field("bytes_written", &self.bytes_written)
            .finish_non_exhaustive()
    }
}
