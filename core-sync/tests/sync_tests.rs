//! Integration tests for manifest-driven sync
//!
//! The harness wires the real storage, download and cache layers over a
//! temporary directory; only HTTP and the device are faked.

use async_trait::async_trait;
use bridge_desktop::TokioFileSystem;
use bridge_traits::mock::{FakeDevice, ManualClock, MockHttpClient, MockRoute, StaticRegistration};
use bridge_traits::RegistrationProvider;
use core_cache::ContentCacheManager;
use core_content::{ContentId, Manifest};
use core_download::{DownloadConfig, DownloadManager};
use core_runtime::events::{CoreEvent, EventBus, SyncEvent};
use core_storage::{digest_bytes, ChecksumAlgorithm, PinGroup, StorageConfig, StorageManager, MB};
use core_sync::{
    ContentState, ContentSyncManager, HttpManifestClient, ManifestSource, Result, SyncConfig, SyncError,
};
use mockall::mock;
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

const API: &str = "https://api.example.com/v1";
const MANIFEST_URL: &str = "https://api.example.com/v1/devices/screen-1/content/manifest";

struct Harness {
    _root: TempDir,
    http: Arc<MockHttpClient>,
    storage: Arc<StorageManager>,
    sync: Arc<ContentSyncManager>,
}

async fn harness_with(config: SyncConfig, device: FakeDevice) -> Harness {
    let root = tempfile::tempdir().unwrap();
    let http = Arc::new(MockHttpClient::new());
    let (storage, sync) = wire(root.path(), http.clone(), config, Arc::new(device)).await;

    Harness {
        _root: root,
        http,
        storage,
        sync,
    }
}

/// Real storage, download and cache layers over `root`, as after a boot.
async fn wire(
    root: &Path,
    http: Arc<MockHttpClient>,
    config: SyncConfig,
    device: Arc<FakeDevice>,
) -> (Arc<StorageManager>, Arc<ContentSyncManager>) {
    let clock = Arc::new(ManualClock::default());
    let registration: Arc<dyn RegistrationProvider> =
        Arc::new(StaticRegistration::registered("screen-1", "tok"));

    let storage = Arc::new(StorageManager::new(
        StorageConfig::default(),
        Arc::new(TokioFileSystem::rooted_at(root)),
        device.clone(),
        clock.clone(),
    ));
    storage.initialize().await.unwrap();
    let downloads = Arc::new(DownloadManager::new(
        DownloadConfig::default()
            .with_backoff(Duration::from_millis(5), Duration::from_millis(10))
            .with_progress_interval(Duration::ZERO),
        storage.clone(),
        http.clone(),
        device,
    ));
    let cache = Arc::new(ContentCacheManager::new(storage.clone(), downloads));
    let source = Arc::new(HttpManifestClient::new(http, registration.clone(), API));
    let sync = Arc::new(ContentSyncManager::new(config, source, registration, cache, clock));
    (storage, sync)
}

async fn harness() -> Harness {
    harness_with(SyncConfig::default(), FakeDevice::new()).await
}

fn media_url(id: &str) -> String {
    format!("https://cdn.example.com/media/{id}.png")
}

fn body(id: &str) -> Vec<u8> {
    format!("pixels of {id}").into_bytes()
}

/// Manifest entry whose checksum matches the bytes `serve_items` publishes.
fn entry(id: &str) -> Value {
    let data = body(id);
    json!({
        "id": id,
        "url": media_url(id),
        "size": data.len(),
        "checksum": digest_bytes(ChecksumAlgorithm::Sha256, &data),
        "type": "image",
        "duration": 10
    })
}

fn publish(h: &Harness, items: Vec<Value>) {
    h.http.serve_json(MANIFEST_URL, &json!({ "items": items, "version": 1 }));
}

fn serve_items(h: &Harness, ids: &[&str]) {
    for id in ids {
        h.http.serve(media_url(id), body(id));
    }
}

#[tokio::test]
async fn test_first_sync_downloads_and_second_is_noop() {
    let h = harness().await;
    serve_items(&h, &["a", "b", "c"]);
    publish(&h, vec![entry("a"), entry("b"), entry("c")]);

    let first = h.sync.sync_content(true).await.unwrap();
    assert_eq!(first.new_items, 3);
    assert_eq!(first.failed_items, 0);
    assert!(first.success);
    assert_eq!(first.total_bytes, (body("a").len() * 3) as u64);
    assert!(matches!(h.sync.state(), ContentState::Complete { .. }));
    assert!(h.sync.last_sync_time().is_some());

    let second = h.sync.sync_content(true).await.unwrap();
    assert!(second.is_noop());
    assert_eq!(second.total_items, 0);
    for id in ["a", "b", "c"] {
        assert_eq!(h.http.fetch_count(&media_url(id)), 1, "{id} fetched again");
    }
    assert_eq!(h.http.fetch_count(MANIFEST_URL), 2);
    assert_eq!(h.sync.current_playlist().unwrap().len(), 3);
}

#[tokio::test]
async fn test_corrupted_copy_is_refetched_after_restart() {
    let h = harness().await;
    serve_items(&h, &["a"]);
    publish(&h, vec![entry("a")]);
    h.sync.sync_content(true).await.unwrap();

    let path = h.storage.get_metadata(&ContentId::from("a")).unwrap().local_path;
    std::fs::write(&path, b"trunc").unwrap();

    let (storage, sync) = wire(
        h._root.path(),
        h.http.clone(),
        SyncConfig::default(),
        Arc::new(FakeDevice::new()),
    )
    .await;
    let id = ContentId::from("a");
    assert!(storage.resolve_playable(&id, None).await.is_none());

    let result = sync.sync_content(true).await.unwrap();

    assert_eq!(result.failed_items, 0);
    assert_eq!(h.http.fetch_count(&media_url("a")), 2);
    let checksum = digest_bytes(ChecksumAlgorithm::Sha256, &body("a"));
    let playable = storage.resolve_playable(&id, Some(&checksum)).await.unwrap();
    assert_eq!(std::fs::read(playable).unwrap(), body("a"));
}

#[tokio::test]
async fn test_intact_copy_is_verified_locally_after_restart() {
    let h = harness().await;
    serve_items(&h, &["a"]);
    publish(&h, vec![entry("a")]);
    h.sync.sync_content(true).await.unwrap();

    let dir = h.storage.cache_dir().unwrap();
    std::fs::remove_file(dir.join(".index.json")).unwrap();
    let (storage, sync) = wire(
        h._root.path(),
        h.http.clone(),
        SyncConfig::default(),
        Arc::new(FakeDevice::new()),
    )
    .await;

    let result = sync.sync_content(true).await.unwrap();

    assert_eq!(result.failed_items, 0);
    assert_eq!(h.http.fetch_count(&media_url("a")), 1);
    let entry = storage.get_metadata(&ContentId::from("a")).unwrap();
    assert!(entry.verified);
    assert!(entry.checksum.is_some());
}

#[tokio::test]
async fn test_insufficient_storage_refuses_before_any_download() {
    let h = harness_with(SyncConfig::default(), FakeDevice::new().with_free_bytes(500 * MB)).await;
    publish(
        &h,
        vec![
            json!({"id": "big-1", "url": media_url("big-1"), "size": 300 * MB, "type": "video"}),
            json!({"id": "big-2", "url": media_url("big-2"), "size": 300 * MB, "type": "video"}),
        ],
    );

    let err = h.sync.sync_content(true).await.unwrap_err();

    assert_eq!(
        err,
        SyncError::InsufficientStorage {
            required: 600 * MB,
            available: 500 * MB
        }
    );
    assert_eq!(
        h.sync.state(),
        ContentState::StorageError {
            required: 600 * MB,
            available: 500 * MB
        }
    );
    assert_eq!(h.http.total_fetches(), 1, "only the manifest is fetched");
    assert!(h.storage.entries().is_empty());
}

#[tokio::test]
async fn test_one_corrupt_item_does_not_abort_the_run() {
    let h = harness().await;
    let ids = ["one", "two", "three", "four", "five"];
    serve_items(&h, &ids);
    h.http.serve(media_url("three"), b"truncated".to_vec());
    publish(&h, ids.iter().map(|id| entry(id)).collect());

    let result = h.sync.sync_content(true).await.unwrap();

    assert_eq!(result.new_items, 4);
    assert_eq!(result.failed_items, 1);
    assert_eq!(result.processed_items, 5);
    assert!(!result.success);
    assert_eq!(result.failures[0].content_id, ContentId::from("three"));
    assert_eq!(h.storage.entries().len(), 4);
    assert!(!h.storage.contains(&ContentId::from("three")));

    // The failed item is retried on the next run.
    h.http.serve(media_url("three"), body("three"));
    let retry = h.sync.sync_content(true).await.unwrap();
    assert_eq!(retry.new_items, 1);
    assert!(retry.success);
}

#[tokio::test]
async fn test_rejected_manifest_items_are_reported() {
    let h = harness().await;
    serve_items(&h, &["ok"]);
    publish(
        &h,
        vec![
            entry("ok"),
            json!({"id": "weird", "url": media_url("weird"), "type": "hologram"}),
        ],
    );

    let result = h.sync.sync_content(true).await.unwrap();

    assert_eq!(result.new_items, 1);
    assert_eq!(result.failed_items, 1);
    assert_eq!(result.failures[0].content_id, ContentId::from("weird"));
    assert_eq!(h.http.fetch_count(&media_url("weird")), 0);
}

#[tokio::test]
async fn test_sync_not_due_inside_interval() {
    let h = harness().await;
    publish(&h, vec![]);

    h.sync.sync_content(false).await.unwrap();
    let err = h.sync.sync_content(false).await.unwrap_err();

    assert!(matches!(err, SyncError::NotDue(remaining) if remaining <= Duration::from_secs(900)));
    assert!(h.sync.time_until_due().is_some());
    assert!(h.sync.sync_content(true).await.is_ok(), "force bypasses the interval");
}

#[tokio::test]
async fn test_changed_item_is_redownloaded_and_removed_item_deleted() {
    let h = harness().await;
    serve_items(&h, &["keep", "change", "drop"]);
    publish(&h, vec![entry("keep"), entry("change"), entry("drop")]);
    h.sync.sync_content(true).await.unwrap();

    let new_bytes = b"new pixels of change".to_vec();
    h.http.serve(media_url("change"), new_bytes.clone());
    let mut changed = entry("change");
    changed["checksum"] = json!(digest_bytes(ChecksumAlgorithm::Sha256, &new_bytes));
    changed["size"] = json!(new_bytes.len());
    publish(&h, vec![entry("keep"), changed]);

    let result = h.sync.sync_content(true).await.unwrap();

    assert_eq!(result.updated_items, 1);
    assert_eq!(result.deleted_items, 1);
    assert_eq!(result.new_items, 0);
    assert!(!h.storage.contains(&ContentId::from("drop")));
    assert_eq!(h.storage.read(&ContentId::from("change")).await.unwrap().as_ref(), &new_bytes[..]);
    assert_eq!(h.http.fetch_count(&media_url("keep")), 1);
}

#[tokio::test]
async fn test_item_on_screen_survives_removal_from_manifest() {
    let h = harness().await;
    serve_items(&h, &["a", "showing"]);
    publish(&h, vec![entry("a"), entry("showing")]);
    h.sync.sync_content(true).await.unwrap();
    h.storage.pin(PinGroup::Playlist, ContentId::from("showing"));

    publish(&h, vec![entry("a")]);
    let result = h.sync.sync_content(true).await.unwrap();

    assert_eq!(result.deleted_items, 0);
    assert!(h.storage.contains(&ContentId::from("showing")));

    h.storage.unpin_group(PinGroup::Playlist);
    let later = h.sync.sync_content(true).await.unwrap();
    assert_eq!(later.deleted_items, 1);
}

#[tokio::test]
async fn test_cancel_stops_at_item_boundary() {
    let h = harness().await;
    for id in ["slow-1", "slow-2"] {
        h.http.route(
            media_url(id),
            MockRoute::ok(body(id)).chunked(2, Duration::from_millis(20)),
        );
    }
    publish(&h, vec![entry("slow-1"), entry("slow-2")]);

    let mut states = h.sync.subscribe_state();
    let sync = h.sync.clone();
    let run = tokio::spawn(async move { sync.sync_content(true).await });

    tokio::time::timeout(
        Duration::from_secs(5),
        states.wait_for(|s| matches!(s, ContentState::Syncing { current_item: Some(_), .. })),
    )
    .await
    .unwrap()
    .unwrap();
    assert!(h.sync.is_syncing());
    assert!(matches!(h.sync.sync_content(false).await, Err(SyncError::InProgress)));
    assert!(h.sync.cancel_sync());

    let outcome = run.await.unwrap();
    assert_eq!(outcome.unwrap_err(), SyncError::Cancelled);
    assert_eq!(h.sync.state(), ContentState::Idle);
    assert_eq!(h.sync.last_result().unwrap().processed_items, 1);
    assert!(h.storage.contains(&ContentId::from("slow-1")));
    assert_eq!(h.http.fetch_count(&media_url("slow-2")), 0);
    assert!(!h.sync.cancel_sync());
}

#[tokio::test]
async fn test_signed_urls_are_resolved_per_item() {
    let h = harness_with(SyncConfig::default().with_signed_urls(true), FakeDevice::new()).await;
    let signed = "https://signed.example.com/a.png?sig=abc";
    h.http.serve(signed, body("a"));
    h.http.serve_json(
        "https://api.example.com/v1/devices/screen-1/content/a/download-url",
        &json!({ "url": signed }),
    );
    publish(&h, vec![entry("a")]);

    let result = h.sync.sync_content(true).await.unwrap();

    assert_eq!(result.new_items, 1);
    assert_eq!(h.http.fetch_count(signed), 1);
    assert_eq!(h.http.fetch_count(&media_url("a")), 0);
}

#[tokio::test]
async fn test_manifest_fetch_failure_sets_error_state() {
    let h = harness().await;
    h.http.route(MANIFEST_URL, MockRoute::status(502));

    let err = h.sync.sync_content(true).await.unwrap_err();

    assert!(err.is_retryable());
    assert!(matches!(
        h.sync.state(),
        ContentState::Error {
            is_retryable: true,
            ..
        }
    ));
    assert!(h.sync.last_sync_time().is_none());
}

#[tokio::test]
async fn test_sync_events_are_published() {
    let root = tempfile::tempdir().unwrap();
    let device = Arc::new(FakeDevice::new());
    let http = Arc::new(MockHttpClient::new());
    let clock = Arc::new(ManualClock::default());
    let registration: Arc<dyn RegistrationProvider> =
        Arc::new(StaticRegistration::registered("screen-1", "tok"));
    let storage = Arc::new(StorageManager::new(
        StorageConfig::default(),
        Arc::new(TokioFileSystem::rooted_at(root.path())),
        device.clone(),
        clock.clone(),
    ));
    storage.initialize().await.unwrap();
    let downloads = Arc::new(DownloadManager::new(DownloadConfig::default(), storage.clone(), http.clone(), device));
    let cache = Arc::new(ContentCacheManager::new(storage, downloads));
    let source = Arc::new(HttpManifestClient::new(http.clone(), registration.clone(), API));
    let bus = EventBus::new(64);
    let mut events = bus.subscribe();
    let sync = ContentSyncManager::new(SyncConfig::default(), source, registration, cache, clock).with_event_bus(bus);

    http.serve(media_url("a"), body("a"));
    http.serve_json(MANIFEST_URL, &json!({ "items": [entry("a")] }));
    sync.sync_content(false).await.unwrap();

    let mut seen = Vec::new();
    while let Ok(CoreEvent::Sync(event)) = events.try_recv() {
        seen.push(event);
    }
    assert!(matches!(seen.first(), Some(SyncEvent::Started { forced: false, .. })));
    assert!(seen
        .iter()
        .any(|e| matches!(e, SyncEvent::Progress { current_item, .. } if current_item == "a")));
    assert!(matches!(seen.last(), Some(SyncEvent::Completed { new_items: 1, .. })));
}

mock! {
    Source {}

    #[async_trait]
    impl ManifestSource for Source {
        async fn fetch_manifest(&self, device_id: &str) -> Result<Manifest>;
        async fn resolve_download_url(&self, device_id: &str, content_id: &ContentId) -> Result<String>;
    }
}

#[tokio::test]
async fn test_unregistered_device_never_fetches() {
    let root = tempfile::tempdir().unwrap();
    let device = Arc::new(FakeDevice::new());
    let clock = Arc::new(ManualClock::default());
    let storage = Arc::new(StorageManager::new(
        StorageConfig::default(),
        Arc::new(TokioFileSystem::rooted_at(root.path())),
        device.clone(),
        clock.clone(),
    ));
    let downloads = Arc::new(DownloadManager::new(
        DownloadConfig::default(),
        storage.clone(),
        Arc::new(MockHttpClient::new()),
        device,
    ));
    let cache = Arc::new(ContentCacheManager::new(storage, downloads));

    let mut source = MockSource::new();
    source.expect_fetch_manifest().times(0);

    let sync = ContentSyncManager::new(
        SyncConfig::default(),
        Arc::new(source),
        Arc::new(StaticRegistration::unregistered()),
        cache,
        clock,
    );

    let err = sync.sync_content(true).await.unwrap_err();
    assert_eq!(err, SyncError::Unregistered);
    assert!(!err.is_retryable());
    assert!(matches!(sync.state(), ContentState::Error { is_retryable: false, .. }));
}
