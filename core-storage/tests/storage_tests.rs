//! Storage manager tests over a real filesystem in a temp directory.

use bridge_desktop::TokioFileSystem;
use bridge_traits::mock::{FakeDevice, ManualClock};
use bridge_traits::FileSystemAccess;
use core_content::ContentId;
use core_storage::{
    digest_bytes, ChecksumAlgorithm, PinGroup, StorageConfig, StorageError, StorageManager,
    StorageTier, MB,
};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

struct Harness {
    _root: TempDir,
    fs: Arc<TokioFileSystem>,
    device: Arc<FakeDevice>,
    clock: Arc<ManualClock>,
    storage: Arc<StorageManager>,
}

async fn harness(config: StorageConfig) -> Harness {
    let root = tempfile::tempdir().unwrap();
    let fs = Arc::new(TokioFileSystem::rooted_at(root.path()));
    let device = Arc::new(FakeDevice::new());
    let clock = Arc::new(ManualClock::default());
    let storage = Arc::new(StorageManager::new(
        config,
        fs.clone(),
        device.clone(),
        clock.clone(),
    ));
    storage.initialize().await.unwrap();
    Harness {
        _root: root,
        fs,
        device,
        clock,
        storage,
    }
}

async fn restart(h: &Harness, config: StorageConfig) -> Arc<StorageManager> {
    let storage = Arc::new(StorageManager::new(
        config,
        h.fs.clone(),
        h.device.clone(),
        h.clock.clone(),
    ));
    storage.initialize().await.unwrap();
    storage
}

async fn put(storage: &Arc<StorageManager>, id: &str, data: &[u8]) {
    let mut reader = data;
    storage
        .write_atomic(ContentId::from(id), &format!("{id}.jpg"), &mut reader, None)
        .await
        .unwrap();
}

fn dir_listing(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .filter(|name| !name.starts_with(".index"))
        .collect();
    names.sort();
    names
}

/// Reader that yields `good` bytes and then fails.
struct FailingReader {
    remaining: Vec<u8>,
}

impl tokio::io::AsyncRead for FailingReader {
    fn poll_read(
        mut self: std::pin::Pin<&mut Self>,
        _cx: &mut std::task::Context<'_>,
        buf: &mut tokio::io::ReadBuf<'_>,
    ) -> std::task::Poll<std::io::Result<()>> {
        if self.remaining.is_empty() {
            return std::task::Poll::Ready(Err(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "connection reset",
            )));
        }
        let n = self.remaining.len().min(buf.remaining());
        let chunk: Vec<u8> = self.remaining.drain(..n).collect();
        buf.put_slice(&chunk);
        std::task::Poll::Ready(Ok(()))
    }
}

// ============================================================================
// Atomic writes
// ============================================================================

#[core_async::test]
async fn test_write_atomic_verifies_checksum() {
    let h = harness(StorageConfig::default()).await;
    let data = b"poster-bytes".to_vec();
    let checksum = digest_bytes(ChecksumAlgorithm::Md5, &data);

    let mut reader = &data[..];
    let entry = h
        .storage
        .write_atomic(ContentId::from("poster"), "poster.png", &mut reader, Some(checksum.to_uppercase()))
        .await
        .unwrap();

    assert!(entry.verified);
    assert_eq!(entry.checksum.as_deref(), Some(checksum.as_str()));
    assert_eq!(entry.size_bytes, data.len() as u64);
    assert_eq!(std::fs::read(&entry.local_path).unwrap(), data);
    assert_eq!(dir_listing(&h.storage.cache_dir().unwrap()), vec!["poster.png"]);
}

#[core_async::test]
async fn test_checksum_mismatch_leaves_nothing_behind() {
    let h = harness(StorageConfig::default()).await;
    let mut reader = &b"tampered"[..];

    let err = h
        .storage
        .write_atomic(
            ContentId::from("clip"),
            "clip.mp4",
            &mut reader,
            Some(digest_bytes(ChecksumAlgorithm::Sha256, b"original")),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, StorageError::ChecksumMismatch { .. }));
    assert!(dir_listing(&h.storage.cache_dir().unwrap()).is_empty());
    assert!(h.storage.get_metadata(&ContentId::from("clip")).is_none());
}

#[core_async::test]
async fn test_stream_failure_midway_leaves_no_file() {
    let h = harness(StorageConfig::default().with_chunk_size(4)).await;
    let mut reader = FailingReader {
        remaining: b"partial-data".to_vec(),
    };

    let err = h
        .storage
        .write_atomic(ContentId::from("clip"), "clip.mp4", &mut reader, None)
        .await
        .unwrap_err();

    assert!(matches!(err, StorageError::Io(_)));
    assert!(dir_listing(&h.storage.cache_dir().unwrap()).is_empty());
}

#[core_async::test]
async fn test_dropped_writer_never_exposes_final_name() {
    let h = harness(StorageConfig::default()).await;
    let dir = h.storage.cache_dir().unwrap();

    let mut write = h
        .storage
        .begin_write(ContentId::from("clip"), "clip.mp4", None)
        .await
        .unwrap();
    write.write_chunk(b"first half").await.unwrap();
    let temp = write.temp_path().to_path_buf();
    assert!(temp.exists());
    assert!(!dir.join("clip.mp4").exists());

    // Writer killed mid-stream
    drop(write);
    core_async::time::sleep(Duration::from_millis(50)).await;

    assert!(!dir.join("clip.mp4").exists());
    assert!(!temp.exists());
}

#[core_async::test]
async fn test_rewrite_replaces_previous_file_in_one_step() {
    let h = harness(StorageConfig::default()).await;
    put(&h.storage, "menu", b"v1").await;
    put(&h.storage, "menu", b"version-2").await;

    let entry = h.storage.get_metadata(&ContentId::from("menu")).unwrap();
    assert_eq!(std::fs::read(&entry.local_path).unwrap(), b"version-2");
    assert_eq!(h.storage.stats().total_bytes, 9);
    assert_eq!(h.storage.stats().entry_count, 1);
}

// ============================================================================
// Startup
// ============================================================================

#[core_async::test]
async fn test_initialize_removes_orphans_and_restores_index() {
    let h = harness(StorageConfig::default()).await;
    let checksum = digest_bytes(ChecksumAlgorithm::Sha256, b"verified-bytes");
    let mut reader = &b"verified-bytes"[..];
    h.storage
        .write_atomic(ContentId::from("a"), "a.jpg", &mut reader, Some(checksum.clone()))
        .await
        .unwrap();

    let dir = h.storage.cache_dir().unwrap();
    std::fs::write(dir.join("b.mp4.1234.part"), b"torn").unwrap();
    std::fs::write(dir.join("stray.png"), b"stray").unwrap();

    let storage = restart(&h, StorageConfig::default()).await;
    let report = storage.stats();

    assert_eq!(report.entry_count, 2);
    assert!(!dir.join("b.mp4.1234.part").exists());

    let restored = storage.get_metadata(&ContentId::from("a")).unwrap();
    assert!(restored.verified);
    assert_eq!(restored.checksum.as_deref(), Some(checksum.as_str()));

    let scanned = storage.get_metadata(&ContentId::from("stray")).unwrap();
    assert_eq!(scanned.size_bytes, 5);
    assert!(scanned.checksum.is_none());
    assert!(!scanned.verified);
}

#[core_async::test]
async fn test_corrupted_file_is_not_playable_after_restart() {
    let h = harness(StorageConfig::default()).await;
    let good = b"full-poster-bytes";
    let checksum = digest_bytes(ChecksumAlgorithm::Sha256, good);
    let mut reader = &good[..];
    let entry = h
        .storage
        .write_atomic(ContentId::from("a"), "a.png", &mut reader, Some(checksum.clone()))
        .await
        .unwrap();

    // Truncated behind our back; size no longer matches the index
    std::fs::write(&entry.local_path, b"trunc").unwrap();
    let storage = restart(&h, StorageConfig::default()).await;
    let id = ContentId::from("a");

    let rebuilt = storage.get_metadata(&id).unwrap();
    assert!(!rebuilt.verified);
    assert!(rebuilt.checksum.is_none());
    assert!(storage.resolve_playable(&id, Some(&checksum)).await.is_none());
    assert!(storage.resolve_playable(&id, None).await.is_none());
    assert!(!storage.verify(&id, &checksum).await.unwrap());
}

#[core_async::test]
async fn test_scan_deletes_names_without_recoverable_id() {
    let h = harness(StorageConfig::default()).await;
    let file_name = format!("{}.mp4", core_content::naming::file_stem("promo.v2"));
    let mut reader = &b"clip"[..];
    h.storage
        .write_atomic(ContentId::from("promo.v2"), &file_name, &mut reader, None)
        .await
        .unwrap();
    put(&h.storage, "plain", b"p").await;

    let dir = h.storage.cache_dir().unwrap();
    std::fs::remove_file(dir.join(".index.json")).unwrap();

    let storage = Arc::new(StorageManager::new(
        StorageConfig::default(),
        h.fs.clone(),
        h.device.clone(),
        h.clock.clone(),
    ));
    let report = storage.initialize().await.unwrap();

    assert_eq!(report.unrecoverable_files, 1);
    assert_eq!(report.rebuilt_from_scan, 1);
    assert!(storage.contains(&ContentId::from("plain")));
    assert!(!storage.contains(&ContentId::from(file_name.trim_end_matches(".mp4"))));
    assert_eq!(dir_listing(&dir), vec!["plain.jpg"]);
}

#[core_async::test]
async fn test_lost_index_is_rebuilt_by_scan() {
    let h = harness(StorageConfig::default()).await;
    put(&h.storage, "a", b"aaaa").await;
    put(&h.storage, "b", b"bb").await;

    let dir = h.storage.cache_dir().unwrap();
    std::fs::remove_file(dir.join(".index.json")).unwrap();

    let strict = StorageConfig::default().with_allow_unverified(false);
    let storage = restart(&h, strict).await;

    assert_eq!(storage.stats().entry_count, 2);
    assert_eq!(storage.stats().total_bytes, 6);
    // Unknown checksum and unverified files disallowed: never a playable hit
    assert!(!storage.get_metadata(&ContentId::from("a")).unwrap().verified);
    assert!(storage.resolve_playable(&ContentId::from("a"), None).await.is_none());
}

#[core_async::test]
async fn test_corrupt_index_falls_back_to_scan() {
    let h = harness(StorageConfig::default()).await;
    put(&h.storage, "a", b"aaaa").await;
    let dir = h.storage.cache_dir().unwrap();
    std::fs::write(dir.join(".index.json"), b"{ not json").unwrap();

    let storage = restart(&h, StorageConfig::default()).await;
    assert!(storage.contains(&ContentId::from("a")));
}

// ============================================================================
// Space accounting and eviction
// ============================================================================

#[core_async::test]
async fn test_available_is_min_of_device_and_budget() {
    let h = harness(StorageConfig::default().with_max_cache_bytes(1000)).await;
    put(&h.storage, "a", &[0u8; 300]).await;

    h.device.set_free_bytes(10_000);
    assert_eq!(h.storage.available_bytes().await.unwrap(), 700);

    h.device.set_free_bytes(200);
    assert_eq!(h.storage.available_bytes().await.unwrap(), 200);
}

#[core_async::test]
async fn test_admission_follows_tiers() {
    let h = harness(StorageConfig::default()).await;

    h.device.set_free_bytes(1000 * MB);
    assert_eq!(h.storage.tier().await.unwrap(), StorageTier::Healthy);
    assert!(h.storage.check_admission(900 * MB).await.is_ok());
    // 1.1 x 950MB > 1000MB
    assert!(matches!(
        h.storage.check_admission(950 * MB).await,
        Err(StorageError::InsufficientSpace { .. })
    ));

    h.device.set_free_bytes(300 * MB);
    assert_eq!(h.storage.tier().await.unwrap(), StorageTier::Warning);
    assert!(h.storage.check_admission(200 * MB).await.is_ok());
    // 1.5 x 250MB > 300MB
    assert!(h.storage.check_admission(250 * MB).await.is_err());

    h.device.set_free_bytes(50 * MB);
    assert_eq!(h.storage.tier().await.unwrap(), StorageTier::Critical);
    let err = h.storage.check_admission(1).await.unwrap_err();
    assert!(matches!(
        err,
        StorageError::InsufficientSpace { required: 1, available } if available == 50 * MB
    ));
}

#[core_async::test]
async fn test_eviction_respects_pinning_and_lru() {
    let h = harness(StorageConfig::default().with_max_cache_bytes(300)).await;

    put(&h.storage, "pinned", &[1u8; 100]).await;
    h.clock.advance(Duration::from_secs(10));
    put(&h.storage, "old", &[2u8; 100]).await;
    h.clock.advance(Duration::from_secs(10));
    put(&h.storage, "recent", &[3u8; 100]).await;

    h.storage.pin(PinGroup::Playlist, ContentId::from("pinned"));
    assert_eq!(h.storage.available_bytes().await.unwrap(), 0);

    // Pinned entry is the oldest, but must survive
    let freed = h.storage.evict(100, &HashSet::new()).await.unwrap();
    assert_eq!(freed, 100);
    assert!(h.storage.contains(&ContentId::from("pinned")));
    assert!(!h.storage.contains(&ContentId::from("old")));
    assert!(h.storage.contains(&ContentId::from("recent")));

    // Asking for more than evictable frees what it can and stops
    let freed = h.storage.evict(300, &HashSet::new()).await.unwrap();
    assert_eq!(freed, 100);
    assert!(h.storage.contains(&ContentId::from("pinned")));
    assert_eq!(h.storage.stats().entry_count, 1);
}

#[core_async::test]
async fn test_eviction_honours_keep_set_and_access_time() {
    let h = harness(StorageConfig::default().with_max_cache_bytes(300)).await;
    put(&h.storage, "a", &[1u8; 100]).await;
    h.clock.advance(Duration::from_secs(1));
    put(&h.storage, "b", &[2u8; 100]).await;
    h.clock.advance(Duration::from_secs(1));
    put(&h.storage, "c", &[3u8; 100]).await;
    h.clock.advance(Duration::from_secs(1));

    // Playback touched "a", so "b" is now the least recently used
    assert!(h.storage.resolve_playable(&ContentId::from("a"), None).await.is_some());

    let keep: HashSet<ContentId> = [ContentId::from("b")].into_iter().collect();
    h.storage.evict(100, &keep).await.unwrap();

    assert!(h.storage.contains(&ContentId::from("a")));
    assert!(h.storage.contains(&ContentId::from("b")));
    assert!(!h.storage.contains(&ContentId::from("c")));
}

#[core_async::test]
async fn test_ensure_space_evicts_until_satisfied() {
    let h = harness(StorageConfig::default().with_max_cache_bytes(200)).await;
    put(&h.storage, "a", &[1u8; 100]).await;
    put(&h.storage, "b", &[2u8; 100]).await;

    assert!(h.storage.ensure_space(100).await.unwrap());
    assert_eq!(h.storage.stats().entry_count, 1);

    h.storage.pin_group(PinGroup::Manifest, h.storage.entries().into_iter().map(|e| e.content_id));
    assert!(!h.storage.ensure_space(200).await.unwrap());
}

// ============================================================================
// Lookup and removal
// ============================================================================

#[core_async::test]
async fn test_remove_refuses_pinned_unless_forced() {
    let h = harness(StorageConfig::default()).await;
    put(&h.storage, "a", b"x").await;
    h.storage.pin(PinGroup::Manifest, ContentId::from("a"));

    assert!(matches!(
        h.storage.remove(&ContentId::from("a"), false).await,
        Err(StorageError::Pinned(_))
    ));
    assert!(h.storage.remove(&ContentId::from("a"), true).await.unwrap());
    assert!(!h.storage.remove(&ContentId::from("a"), true).await.unwrap());
}

#[core_async::test]
async fn test_clear_keeps_pinned_entries() {
    let h = harness(StorageConfig::default()).await;
    put(&h.storage, "a", b"x").await;
    put(&h.storage, "b", b"y").await;
    h.storage.pin_group(PinGroup::Playlist, [ContentId::from("b")]);

    assert_eq!(h.storage.clear().await.unwrap(), 1);
    let stats = h.storage.stats();
    assert_eq!(stats.entry_count, 1);
    assert_eq!(stats.pinned_count, 1);
    assert!(h.storage.get_metadata(&ContentId::from("b")).unwrap().pinned);
}

#[core_async::test]
async fn test_resolve_playable_drops_vanished_files() {
    let h = harness(StorageConfig::default()).await;
    put(&h.storage, "a", b"x").await;
    let path = h.storage.get_metadata(&ContentId::from("a")).unwrap().local_path;
    h.fs.delete_file(&path).await.unwrap();

    assert!(h.storage.resolve_playable(&ContentId::from("a"), None).await.is_none());
    assert!(!h.storage.contains(&ContentId::from("a")));
}

#[core_async::test]
async fn test_verify_upgrades_scanned_entry() {
    let h = harness(StorageConfig::default()).await;
    let dir = h.storage.cache_dir().unwrap();
    std::fs::write(dir.join("logo.png"), b"logo").unwrap();
    let storage = restart(&h, StorageConfig::default().with_allow_unverified(false)).await;
    let id = ContentId::from("logo");

    assert!(!storage.verify(&id, &digest_bytes(ChecksumAlgorithm::Md5, b"other")).await.unwrap());
    assert!(storage.resolve_playable(&id, None).await.is_none());

    let md5 = digest_bytes(ChecksumAlgorithm::Md5, b"logo");
    assert!(storage.verify(&id, &md5).await.unwrap());
    let entry = storage.get_metadata(&id).unwrap();
    assert!(entry.verified);
    assert_eq!(entry.checksum.as_deref(), Some(md5.as_str()));
    assert!(storage.resolve_playable(&id, Some(&md5)).await.is_some());
    assert!(storage.resolve_playable(&id, Some("0000")).await.is_none());
}

#[core_async::test]
async fn test_operations_before_initialize_fail() {
    let root = tempfile::tempdir().unwrap();
    let storage = Arc::new(StorageManager::new(
        StorageConfig::default(),
        Arc::new(TokioFileSystem::rooted_at(root.path())),
        Arc::new(FakeDevice::new()),
        Arc::new(ManualClock::default()),
    ));
    assert!(matches!(storage.cache_dir(), Err(StorageError::NotInitialized)));
    assert!(storage
        .begin_write(ContentId::from("a"), "a.jpg", None)
        .await
        .is_err());
}
