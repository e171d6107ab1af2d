//! File System Abstraction
//!
//! The storage manager is the only component that talks to this trait; every
//! other component reaches cached files through it.

use async_trait::async_trait;
use bytes::Bytes;
use std::path::{Path, PathBuf};

use crate::error::Result;

/// File metadata information
#[derive(Debug, Clone)]
pub struct FileMetadata {
    pub size: u64,
    /// Unix timestamp in milliseconds
    pub modified_at: Option<i64>,
    pub is_directory: bool,
}

/// File system access trait
///
/// # Example
///
/// ```ignore
/// use bridge_traits::storage::FileSystemAccess;
///
/// async fn cache_dir(fs: &dyn FileSystemAccess) -> Result<PathBuf> {
///     let dir = fs.get_cache_directory().await?.join("content");
///     fs.create_dir_all(&dir).await?;
///     Ok(dir)
/// }
/// ```
#[async_trait]
pub trait FileSystemAccess: Send + Sync {
    /// Get the application's cache directory
    async fn get_cache_directory(&self) -> Result<PathBuf>;

    /// Check if a file or directory exists
    async fn exists(&self, path: &Path) -> Result<bool>;

    /// Get metadata for a file or directory
    async fn metadata(&self, path: &Path) -> Result<FileMetadata>;

    /// Create a directory and all parent directories if they don't exist
    async fn create_dir_all(&self, path: &Path) -> Result<()>;

    /// Read entire file contents into memory
    ///
    /// Only used for small files such as the cache index; media goes
    /// through `open_read_stream`.
    async fn read_file(&self, path: &Path) -> Result<Bytes>;

    /// Write data to a file, creating or truncating it
    async fn write_file(&self, path: &Path, data: Bytes) -> Result<()>;

    /// Delete a file
    async fn delete_file(&self, path: &Path) -> Result<()>;

    /// Rename a file, replacing the destination if it exists.
    ///
    /// Both paths live in the same directory, so the rename is atomic on
    /// every supported platform.
    async fn rename(&self, from: &Path, to: &Path) -> Result<()>;

    /// List all entries in a directory
    async fn list_directory(&self, path: &Path) -> Result<Vec<PathBuf>>;

    /// Open a file for streaming reads
    async fn open_read_stream(
        &self,
        path: &Path,
    ) -> Result<Box<dyn core_async::io::AsyncRead + Send + Unpin>>;

    /// Create (or truncate) a file for streaming writes
    async fn open_write_stream(
        &self,
        path: &Path,
    ) -> Result<Box<dyn core_async::io::AsyncWrite + Send + Unpin>>;
}
