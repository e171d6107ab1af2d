//! # Download Manager
//!
//! Drains a priority queue of [`DownloadRequest`]s with a bounded pool of
//! workers, throttled by network transport.
//!
//! ## State machine
//!
//! ```text
//! Idle ──enqueue──> Queued ──worker──> Downloading ──> Completed
//!   │                 │                    │
//!   └──rejected──> Failed <───cancel───────┴──────────> Failed
//!                    │
//!                    └──retry() (retryable only)──> Queued
//! ```
//!
//! Queue mutations, worker hand-off and cancellation all happen under one
//! lock so priority order holds across concurrent enqueue and cancel.

use crate::config::DownloadConfig;
use crate::error::{DownloadError, Result};
use crate::queue::DownloadQueue;
use crate::request::{DownloadRequest, DownloadState};
use crate::throttle::BandwidthThrottler;
use bridge_traits::device::missing_codecs;
use bridge_traits::{DeviceCapabilities, HttpClient, HttpRequest, RegistrationProvider};
use core_async::io::AsyncReadExt;
use core_async::sync::{oneshot, watch, CancellationToken, Notify};
use core_async::task::JoinHandle;
use core_async::time::{backoff_delay, sleep, timeout, Instant};
use core_content::{CacheEntry, ContentId};
use core_runtime::events::{CoreEvent, DownloadEvent, EventBus};
use core_storage::StorageManager;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

type Waiter = oneshot::Sender<Result<CacheEntry>>;

/// Everything guarded by the queue lock.
#[derive(Default)]
struct Scheduler {
    queue: DownloadQueue,
    active: HashMap<ContentId, CancellationToken>,
    /// Failed retryable requests, kept for `retry`
    retryable: HashMap<ContentId, DownloadRequest>,
    waiters: HashMap<ContentId, Vec<Waiter>>,
    shut_down: bool,
}

impl Scheduler {
    fn is_pending(&self, id: &ContentId) -> bool {
        self.queue.contains(id) || self.active.contains_key(id)
    }
}

pub struct DownloadManager {
    config: DownloadConfig,
    storage: Arc<StorageManager>,
    http: Arc<dyn HttpClient>,
    device: Arc<dyn DeviceCapabilities>,
    registration: Option<Arc<dyn RegistrationProvider>>,
    event_bus: Option<EventBus>,
    throttler: BandwidthThrottler,
    scheduler: Mutex<Scheduler>,
    states: watch::Sender<HashMap<ContentId, DownloadState>>,
    work_available: Notify,
    shutdown: CancellationToken,
    workers: Mutex<Vec<JoinHandle<()>>>,
    started: AtomicBool,
}

impl DownloadManager {
    pub fn new(
        config: DownloadConfig,
        storage: Arc<StorageManager>,
        http: Arc<dyn HttpClient>,
        device: Arc<dyn DeviceCapabilities>,
    ) -> Self {
        let (states, _) = watch::channel(HashMap::new());
        let throttler = BandwidthThrottler::new(config.ethernet_rate);
        Self {
            config,
            storage,
            http,
            device,
            registration: None,
            event_bus: None,
            throttler,
            scheduler: Mutex::new(Scheduler::default()),
            states,
            work_available: Notify::new(),
            shutdown: CancellationToken::new(),
            workers: Mutex::new(Vec::new()),
            started: AtomicBool::new(false),
        }
    }

    /// Attach a bearer token from `registration` to every byte fetch.
    pub fn with_registration(mut self, registration: Arc<dyn RegistrationProvider>) -> Self {
        self.registration = Some(registration);
        self
    }

    pub fn with_event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    pub fn config(&self) -> &DownloadConfig {
        &self.config
    }

    /// Spawns the worker pool. Called implicitly by the first enqueue.
    pub fn start(self: &Arc<Self>) -> Result<()> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        if let Err(e) = self.config.validate() {
            self.started.store(false, Ordering::SeqCst);
            return Err(DownloadError::Config(e));
        }

        let mut workers = self.workers.lock();
        for worker in 0..self.config.worker_count {
            let manager = Arc::clone(self);
            workers.push(core_async::task::spawn(manager.run_worker(worker)));
        }
        info!(workers = self.config.worker_count, "Download workers started");
        Ok(())
    }

    // ========================================================================
    // Public operations
    // ========================================================================

    /// Admits and queues `request`, returning its state.
    ///
    /// A request already queued or running is not queued twice. Admission
    /// failures leave the id `Failed` and nothing is queued.
    #[instrument(skip(self, request), fields(content_id = %request.content_id, priority = %request.priority))]
    pub async fn enqueue(self: &Arc<Self>, request: DownloadRequest) -> Result<DownloadState> {
        self.start()?;
        let id = request.content_id.clone();

        {
            let scheduler = self.scheduler.lock();
            if scheduler.shut_down {
                return Err(DownloadError::ShutDown);
            }
            if scheduler.is_pending(&id) {
                debug!("Already pending");
                return Ok(self.state(&id));
            }
        }

        if let Err(e) = self.admit(&request).await {
            self.reject(request, &e);
            return Err(e);
        }

        let priority = request.priority;
        let position = {
            let mut scheduler = self.scheduler.lock();
            if scheduler.shut_down {
                return Err(DownloadError::ShutDown);
            }
            if scheduler.is_pending(&id) {
                return Ok(self.state(&id));
            }
            scheduler.retryable.remove(&id);
            let position = scheduler.queue.push(request);
            self.publish_positions(&scheduler);
            debug!(position, %priority, "Queued");
            position
        };

        self.emit(DownloadEvent::Queued {
            content_id: id.to_string(),
            position: position as u64,
            priority: priority.to_string(),
        });
        self.work_available.notify_one();
        Ok(DownloadState::Queued { position })
    }

    /// Enqueues `request` and waits for its terminal result.
    ///
    /// Callers asking for an id that is already pending share its result.
    pub async fn download(self: &Arc<Self>, request: DownloadRequest) -> Result<CacheEntry> {
        let (tx, rx) = oneshot::channel();
        self.scheduler
            .lock()
            .waiters
            .entry(request.content_id.clone())
            .or_default()
            .push(tx);

        // Rejections resolve the waiter, so their error arrives through `rx`
        if let Err(e @ (DownloadError::ShutDown | DownloadError::Config(_))) =
            self.enqueue(request).await
        {
            return Err(e);
        }

        rx.await.unwrap_or(Err(DownloadError::ShutDown))
    }

    /// Removes queued requests for `id` and stops an in-flight transfer
    /// before its next chunk is written.
    ///
    /// Returns false when nothing was pending.
    #[instrument(skip(self))]
    pub fn cancel(&self, id: &ContentId) -> bool {
        let (removed, running, waiters) = {
            let mut scheduler = self.scheduler.lock();
            let removed = scheduler.queue.remove_all(id);
            let running = scheduler.active.get(id).cloned();
            let mut waiters = Vec::new();
            if let Some(request) = removed.first() {
                if running.is_none() {
                    scheduler.retryable.insert(id.clone(), request.clone());
                    waiters = scheduler.waiters.remove(id).unwrap_or_default();
                }
            }
            self.publish_positions(&scheduler);
            (removed, running, waiters)
        };

        if removed.is_empty() && running.is_none() {
            return false;
        }
        if let Some(token) = running {
            token.cancel();
        }

        info!(queued = removed.len(), "Download cancelled");
        self.set_failed(id, &DownloadError::Cancelled);
        self.emit(DownloadEvent::Cancelled {
            content_id: id.to_string(),
        });
        for waiter in waiters {
            let _ = waiter.send(Err(DownloadError::Cancelled));
        }
        true
    }

    /// Re-queues a request whose last attempt failed retryably.
    #[instrument(skip(self))]
    pub async fn retry(self: &Arc<Self>, id: &ContentId) -> Result<DownloadState> {
        let request = {
            let mut scheduler = self.scheduler.lock();
            match self.state(id) {
                DownloadState::Failed {
                    is_retryable: true, ..
                } => scheduler.retryable.remove(id),
                _ => None,
            }
        };
        let request = request.ok_or_else(|| DownloadError::NotRetryable(id.clone()))?;
        info!("Retrying download");
        self.enqueue(request).await
    }

    /// Stops all workers. Queued requests fail with `ShutDown`; running ones
    /// are cancelled.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        let (drained, waiters) = {
            let mut scheduler = self.scheduler.lock();
            scheduler.shut_down = true;
            let drained = scheduler.queue.drain();
            let waiters: Vec<Waiter> = drained
                .iter()
                .filter_map(|request| scheduler.waiters.remove(&request.content_id))
                .flatten()
                .collect();
            (drained, waiters)
        };

        for request in &drained {
            self.set_failed(&request.content_id, &DownloadError::ShutDown);
        }
        for waiter in waiters {
            let _ = waiter.send(Err(DownloadError::ShutDown));
        }

        let handles = std::mem::take(&mut *self.workers.lock());
        for handle in handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "Download worker ended abnormally");
            }
        }
        info!(dropped = drained.len(), "Download manager shut down");
    }

    // ========================================================================
    // Observation
    // ========================================================================

    /// Latest-value stream of every known id's state.
    pub fn subscribe_states(&self) -> watch::Receiver<HashMap<ContentId, DownloadState>> {
        self.states.subscribe()
    }

    pub fn state(&self, id: &ContentId) -> DownloadState {
        self.states.borrow().get(id).cloned().unwrap_or_default()
    }

    pub fn states(&self) -> HashMap<ContentId, DownloadState> {
        self.states.borrow().clone()
    }

    pub fn queued_count(&self) -> usize {
        self.scheduler.lock().queue.len()
    }

    pub fn active_count(&self) -> usize {
        self.scheduler.lock().active.len()
    }

    // ========================================================================
    // Admission
    // ========================================================================

    async fn admit(&self, request: &DownloadRequest) -> Result<()> {
        let network = self.device.current_network_type().await;
        if self.config.rate_for(network) == 0 {
            return Err(DownloadError::NoNetwork);
        }

        self.storage
            .check_admission(request.expected_size)
            .await
            .map_err(DownloadError::from)?;

        if !request.required_codecs.is_empty() {
            let supported = self.device.supported_codecs().await;
            let missing = missing_codecs(&request.required_codecs, &supported);
            if !missing.is_empty() {
                return Err(DownloadError::CodecUnsupported { missing });
            }
        }
        Ok(())
    }

    fn reject(&self, request: DownloadRequest, error: &DownloadError) {
        warn!(content_id = %request.content_id, error = %error, "Download rejected");
        let id = request.content_id.clone();
        let waiters = {
            let mut scheduler = self.scheduler.lock();
            if error.is_retryable() {
                scheduler.retryable.insert(id.clone(), request);
            }
            // A concurrent request for the same id may have been admitted
            if scheduler.is_pending(&id) {
                Vec::new()
            } else {
                scheduler.waiters.remove(&id).unwrap_or_default()
            }
        };

        self.set_failed(&id, error);
        self.emit(DownloadEvent::Rejected {
            content_id: id.to_string(),
            reason: error.to_string(),
        });
        for waiter in waiters {
            let _ = waiter.send(Err(error.clone()));
        }
    }

    // ========================================================================
    // Workers
    // ========================================================================

    async fn run_worker(self: Arc<Self>, worker: usize) {
        debug!(worker, "Download worker running");
        loop {
            if self.shutdown.is_cancelled() {
                break;
            }
            let notified = self.work_available.notified();
            match self.next_job() {
                Some((request, token)) => self.process(request, token).await,
                None => {
                    core_async::select! {
                        _ = notified => {}
                        _ = self.shutdown.cancelled() => break,
                    }
                }
            }
        }
        debug!(worker, "Download worker stopped");
    }

    fn next_job(&self) -> Option<(DownloadRequest, CancellationToken)> {
        let mut scheduler = self.scheduler.lock();
        if scheduler.shut_down {
            return None;
        }
        let request = scheduler.queue.pop()?;
        let token = self.shutdown.child_token();
        scheduler
            .active
            .insert(request.content_id.clone(), token.clone());
        self.publish_positions(&scheduler);
        Some((request, token))
    }

    #[instrument(skip(self, request, token), fields(content_id = %request.content_id))]
    async fn process(&self, request: DownloadRequest, token: CancellationToken) {
        let started = Instant::now();
        let total = (request.expected_size > 0).then_some(request.expected_size);
        self.set_state(
            &request.content_id,
            DownloadState::Downloading {
                progress: 0.0,
                downloaded_bytes: 0,
                total_bytes: total,
                speed_bytes_per_sec: 0,
            },
        );
        self.emit(DownloadEvent::Started {
            content_id: request.content_id.to_string(),
            total_bytes: total,
        });

        let result = self.download_with_retry(&request, &token).await;
        self.finish(request, result, started);
    }

    async fn download_with_retry(
        &self,
        request: &DownloadRequest,
        token: &CancellationToken,
    ) -> Result<CacheEntry> {
        let mut attempt = 0u32;
        let mut checksum_retried = false;

        loop {
            if token.is_cancelled() {
                return Err(DownloadError::Cancelled);
            }

            let network = self.device.current_network_type().await;
            let rate = self.config.rate_for(network);
            let deadline = self.config.transfer_deadline(request.expected_size, rate);
            let error = match timeout(deadline, self.transfer(request, rate, token)).await {
                Ok(Ok(entry)) => return Ok(entry),
                Ok(Err(e)) => e,
                Err(_) => DownloadError::Timeout(format!("download exceeded {:?}", deadline)),
            };

            match error {
                DownloadError::Cancelled => return Err(error),
                DownloadError::ChecksumMismatch { .. } if !checksum_retried => {
                    warn!(error = %error, "Checksum mismatch, downloading once more");
                    checksum_retried = true;
                }
                ref e if e.is_retryable() && attempt + 1 < self.config.max_attempts => {
                    let delay = backoff_delay(self.config.backoff_base, attempt, self.config.backoff_max);
                    attempt += 1;
                    warn!(
                        error = %e,
                        attempt,
                        max_attempts = self.config.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        "Download attempt failed, backing off"
                    );
                    core_async::select! {
                        _ = sleep(delay) => {}
                        _ = token.cancelled() => return Err(DownloadError::Cancelled),
                    }
                }
                other => return Err(other),
            }
        }
    }

    /// One attempt at `rate` bytes/sec: stream, throttle, write through an
    /// atomic handle.
    async fn transfer(&self, request: &DownloadRequest, rate: u64, token: &CancellationToken) -> Result<CacheEntry> {
        if rate == 0 {
            return Err(DownloadError::NoNetwork);
        }
        self.throttler.set_rate(rate);

        let auth_token = match &self.registration {
            Some(registration) => registration.auth_token().await,
            None => None,
        };
        let stream = self
            .http
            .download_stream(HttpRequest::get(&request.url).maybe_bearer_token(auth_token))
            .await?;
        if !stream.is_success() {
            return Err(DownloadError::HttpStatus {
                status: stream.status,
                url: request.url.clone(),
            });
        }

        let total = stream
            .content_length
            .or((request.expected_size > 0).then_some(request.expected_size));
        let mut body = stream.body;
        let mut write = self
            .storage
            .begin_write(
                request.content_id.clone(),
                &request.file_name,
                request.expected_checksum.clone(),
            )
            .await?;

        let started = Instant::now();
        let mut last_report: Option<Instant> = None;
        let mut buffer = vec![0u8; self.config.chunk_size];

        loop {
            let read = match timeout(self.config.stall_timeout, body.read(&mut buffer)).await {
                Err(_) => {
                    write.abort().await;
                    return Err(DownloadError::Stalled(self.config.stall_timeout));
                }
                Ok(Err(e)) => {
                    write.abort().await;
                    return Err(DownloadError::Network(e.to_string()));
                }
                Ok(Ok(0)) => break,
                Ok(Ok(read)) => read,
            };

            self.throttler.acquire(read as u64).await;
            if token.is_cancelled() {
                write.abort().await;
                return Err(DownloadError::Cancelled);
            }
            if let Err(e) = write.write_chunk(&buffer[..read]).await {
                write.abort().await;
                return Err(e.into());
            }

            let due = last_report.map_or(true, |at| at.elapsed() >= self.config.progress_interval);
            if due {
                self.report_progress(&request.content_id, write.bytes_written(), total, started);
                last_report = Some(Instant::now());
            }
        }

        if token.is_cancelled() {
            write.abort().await;
            return Err(DownloadError::Cancelled);
        }
        self.report_progress(&request.content_id, write.bytes_written(), total, started);

        Ok(write.commit().await?)
    }

    fn finish(&self, request: DownloadRequest, result: Result<CacheEntry>, started: Instant) {
        let id = request.content_id.clone();
        let waiters = {
            let mut scheduler = self.scheduler.lock();
            scheduler.active.remove(&id);
            if let Err(e) = &result {
                if e.is_retryable() {
                    scheduler.retryable.insert(id.clone(), request);
                }
            }
            scheduler.waiters.remove(&id).unwrap_or_default()
        };

        match &result {
            Ok(entry) => {
                let duration_ms = started.elapsed().as_millis() as u64;
                info!(content_id = %id, bytes = entry.size_bytes, duration_ms, "Download completed");
                self.set_state(
                    &id,
                    DownloadState::Completed {
                        local_path: entry.local_path.clone(),
                    },
                );
                self.emit(DownloadEvent::Completed {
                    content_id: id.to_string(),
                    bytes: entry.size_bytes,
                    duration_ms,
                });
            }
            Err(DownloadError::Cancelled) => {
                info!(content_id = %id, "Download stopped after cancellation");
                self.set_failed(&id, &DownloadError::Cancelled);
            }
            Err(e) => {
                error!(content_id = %id, error = %e, retryable = e.is_retryable(), "Download failed");
                self.set_failed(&id, e);
                self.emit(DownloadEvent::Failed {
                    content_id: id.to_string(),
                    message: e.to_string(),
                    retryable: e.is_retryable(),
                });
            }
        }

        for waiter in waiters {
            let _ = waiter.send(result.clone());
        }
    }

    // ========================================================================
    // State publication
    // ========================================================================

    fn report_progress(&self, id: &ContentId, downloaded: u64, total: Option<u64>, started: Instant) {
        let progress = match total {
            Some(total) if total > 0 => (downloaded as f64 / total as f64).min(1.0) as f32,
            _ => 0.0,
        };
        let elapsed = started.elapsed().as_secs_f64();
        let speed = if elapsed > 0.0 {
            (downloaded as f64 / elapsed) as u64
        } else {
            0
        };
        self.set_state(
            id,
            DownloadState::Downloading {
                progress,
                downloaded_bytes: downloaded,
                total_bytes: total,
                speed_bytes_per_sec: speed,
            },
        );
    }

    fn set_state(&self, id: &ContentId, state: DownloadState) {
        self.states.send_modify(|states| {
            states.insert(id.clone(), state);
        });
    }

    fn set_failed(&self, id: &ContentId, error: &DownloadError) {
        self.set_state(
            id,
            DownloadState::Failed {
                error: error.to_string(),
                is_retryable: error.is_retryable(),
            },
        );
    }

    /// Re-publishes queue positions; called with the queue lock held.
    fn publish_positions(&self, scheduler: &Scheduler) {
        self.states.send_modify(|states| {
            for (id, position) in scheduler.queue.positions() {
                states.insert(id.clone(), DownloadState::Queued { position });
            }
        });
    }

    fn emit(&self, event: DownloadEvent) {
        if let Some(bus) = &self.event_bus {
            bus.publish(CoreEvent::Download(event));
        }
    }
}

impl std::fmt::Debug for DownloadManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let scheduler = self.scheduler.lock();
        f.debug_struct("DownloadManager")
            .field("queued", &scheduler.queue.len())
            .field("active", &scheduler.active.len())
            .field("workers", &self.config.worker_count)
            .finish_non_exhaustive()
    }
}
