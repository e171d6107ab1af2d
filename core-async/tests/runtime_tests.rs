//! Integration tests for the core-async facade.
//!
//! These cover the primitives the player relies on: cancellation between
//! chunks, wake-ups for the playlist loop, and watch-based state streams.

use core_async::{sync, task, time};
use std::sync::Arc;

#[core_async::test]
async fn test_task_spawn() {
    let handle = task::spawn(async { 42 });
    assert_eq!(handle.await.unwrap(), 42);
}

#[core_async::test]
async fn test_spawn_blocking_for_hashing_work() {
    let handle = task::spawn_blocking(|| (0..1000u64).sum::<u64>());
    assert_eq!(handle.await.unwrap(), 499_500);
}

#[core_async::test]
async fn test_timeout_elapses() {
    let result = time::timeout(time::Duration::from_millis(10), async {
        time::sleep(time::Duration::from_millis(200)).await;
    })
    .await;
    assert!(result.is_err());
}

#[core_async::test]
async fn test_cancellation_token_stops_worker() {
    let token = sync::CancellationToken::new();
    let worker_token = token.child_token();
    let chunks = Arc::new(sync::Mutex::new(0u32));
    let chunks_clone = chunks.clone();

    let handle = task::spawn(async move {
        loop {
            if worker_token.is_cancelled() {
                break;
            }
            *chunks_clone.lock().await += 1;
            time::sleep(time::Duration::from_millis(5)).await;
        }
    });

    time::sleep(time::Duration::from_millis(30)).await;
    token.cancel();
    handle.await.unwrap();

    let written = *chunks.lock().await;
    assert!(written > 0);

    // No further progress after cancellation.
    time::sleep(time::Duration::from_millis(20)).await;
    assert_eq!(*chunks.lock().await, written);
}

#[core_async::test]
async fn test_notify_wakes_sleeping_loop() {
    let notify = Arc::new(sync::Notify::new());
    let notify_clone = notify.clone();

    let handle = task::spawn(async move {
        let start = time::Instant::now();
        wait_for_wake(notify_clone).await;
        start.elapsed()
    });

    time::sleep(time::Duration::from_millis(10)).await;
    notify.notify_one();

    let waited = handle.await.unwrap();
    assert!(waited < time::Duration::from_secs(5));
}

async fn wait_for_wake(notify: Arc<sync::Notify>) {
    let sleep = time::sleep(time::Duration::from_secs(10));
    futures::pin_mut!(sleep);
    let notified = notify.notified();
    futures::pin_mut!(notified);
    futures::future::select(sleep, notified).await;
}

#[core_async::test]
async fn test_watch_channel_delivers_latest_state() {
    let (tx, mut rx) = sync::watch::channel(0);

    task::spawn(async move {
        for i in 1..=5 {
            time::sleep(time::Duration::from_millis(5)).await;
            tx.send(i).unwrap();
        }
    });

    let mut last_value = 0;
    while rx.changed().await.is_ok() {
        last_value = *rx.borrow();
        if last_value >= 5 {
            break;
        }
    }
    assert_eq!(last_value, 5);
}

#[core_async::test]
async fn test_try_lock_detects_busy_mutex() {
    let lock = Arc::new(sync::Mutex::new(()));
    let guard = lock.clone().lock_owned().await;
    assert!(lock.try_lock().is_err());
    drop(guard);
    assert!(lock.try_lock().is_ok());
}
