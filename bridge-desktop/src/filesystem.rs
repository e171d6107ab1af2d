//! File System Access Implementation using Tokio

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    storage::{FileMetadata, FileSystemAccess},
};
use bytes::Bytes;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

/// Tokio-based file system implementation
///
/// The cache directory defaults to the platform cache dir under
/// `signage-player/`.
pub struct TokioFileSystem {
    cache_dir: PathBuf,
}

impl TokioFileSystem {
    pub fn new() -> Self {
        let cache_dir = dirs::cache_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("signage-player");
        Self { cache_dir }
    }

    pub fn with_cache_directory(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
        }
    }

    /// Root the cache under `root/cache` (tests, portable installs).
    pub fn rooted_at(root: impl AsRef<Path>) -> Self {
        Self::with_cache_directory(root.as_ref().join("cache"))
    }
}

impl Default for TokioFileSystem {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FileSystemAccess for TokioFileSystem {
    async fn get_cache_directory(&self) -> Result<PathBuf> {
        if !fs::try_exists(&self.cache_dir).await? {
            fs::create_dir_all(&self.cache_dir).await?;
            debug!(path = ?self.cache_dir, "Created cache directory");
        }
        Ok(self.cache_dir.clone())
    }

    async fn exists(&self, path: &Path) -> Result<bool> {
        Ok(fs::try_exists(path).await?)
    }

    async fn metadata(&self, path: &Path) -> Result<FileMetadata> {
        let metadata = fs::metadata(path).await?;

        Ok(FileMetadata {
            size: metadata.len(),
            modified_at: metadata
                .modified()
                .ok()
                .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
                .map(|d| d.as_millis() as i64),
            is_directory: metadata.is_dir(),
        })
    }

    async fn create_dir_all(&self, path: &Path) -> Result<()> {
        fs::create_dir_all(path).await?;
        Ok(())
    }

    async fn read_file(&self, path: &Path) -> Result<Bytes> {
        let data = fs::read(path).await?;
        debug!(path = ?path, size = data.len(), "Read file");
        Ok(Bytes::from(data))
    }

    async fn write_file(&self, path: &Path, data: Bytes) -> Result<()> {
        if let Some(parent) = path.parent() {
            self.create_dir_all(parent).await?;
        }
        fs::write(path, data.as_ref()).await?;
        debug!(path = ?path, size = data.len(), "Wrote file");
        Ok(())
    }

    async fn delete_file(&self, path: &Path) -> Result<()> {
        fs::remove_file(path).await?;
        debug!(path = ?path, "Deleted file");
        Ok(())
    }

    async fn rename(&self, from: &Path, to: &Path) -> Result<()> {
        fs::rename(from, to).await.map_err(|e| {
            BridgeError::OperationFailed(format!(
                "rename {} -> {} failed: {}",
                from.display(),
                to.display(),
                e
            ))
        })?;
        debug!(from = ?from, to = ?to, "Renamed file");
        Ok(())
    }

    async fn list_directory(&self, path: &Path) -> Result<Vec<PathBuf>> {
        let mut entries = Vec::new();
        let mut read_dir = fs::read_dir(path).await?;

        while let Some(entry) = read_dir.next_entry().await? {
            entries.push(entry.path());
        }

        debug!(path = ?path, count = entries.len(), "Listed directory");
        Ok(entries)
    }

    async fn open_read_stream(
        &self,
        path: &Path,
    ) -> Result<Box<dyn core_async::io::AsyncRead + Send + Unpin>> {
        let file = fs::File::open(path).await?;
        Ok(Box::new(file))
    }

    async fn open_write_stream(
        &self,
        path: &Path,
    ) -> Result<Box<dyn core_async::io::AsyncWrite + Send + Unpin>> {
        if let Some(parent) = path.parent() {
            self.create_dir_all(parent).await?;
        }
        let file = fs::File::create(path).await?;
        Ok(Box::new(file))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn test_rooted_directories_are_created() {
        let root = tempfile::tempdir().unwrap();
        let fs = TokioFileSystem::rooted_at(root.path());

        let cache_dir = fs.get_cache_directory().await.unwrap();
        assert_eq!(cache_dir, root.path().join("cache"));
        assert!(fs.exists(&cache_dir).await.unwrap());
    }

    #[tokio::test]
    async fn test_stream_write_then_rename() {
        let root = tempfile::tempdir().unwrap();
        let fs = TokioFileSystem::rooted_at(root.path());
        let dir = fs.get_cache_directory().await.unwrap();
        let temp = dir.join("clip.mp4.part");
        let target = dir.join("clip.mp4");

        let mut writer = fs.open_write_stream(&temp).await.unwrap();
        writer.write_all(b"frame-data").await.unwrap();
        writer.shutdown().await.unwrap();
        drop(writer);

        fs.rename(&temp, &target).await.unwrap();
        assert!(!fs.exists(&temp).await.unwrap());

        let mut reader = fs.open_read_stream(&target).await.unwrap();
        let mut contents = String::new();
        reader.read_to_string(&mut contents).await.unwrap();
        assert_eq!(contents, "frame-data");

        let metadata = fs.metadata(&target).await.unwrap();
        assert_eq!(metadata.size, 10);
        assert!(!metadata.is_directory);
    }

    #[tokio::test]
    async fn test_list_and_delete() {
        let root = tempfile::tempdir().unwrap();
        let fs = TokioFileSystem::rooted_at(root.path());
        let dir = fs.get_cache_directory().await.unwrap();

        fs.write_file(&dir.join("a.jpg"), Bytes::from_static(b"a"))
            .await
            .unwrap();
        fs.write_file(&dir.join("b.jpg"), Bytes::from_static(b"b"))
            .await
            .unwrap();
        assert_eq!(fs.list_directory(&dir).await.unwrap().len(), 2);

        fs.delete_file(&dir.join("a.jpg")).await.unwrap();
        let remaining = fs.list_directory(&dir).await.unwrap();
        assert_eq!(remaining, vec![dir.join("b.jpg")]);
    }
}
