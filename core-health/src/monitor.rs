//! # Health Monitor
//!
//! Fresh health checks plus single-flight recovery.
//!
//! Recovery fixes problems in priority order:
//!
//! 1. Offline: poll connectivity with a bounded number of fixed-delay retries
//! 2. Registration invalid: re-run the registration handshake (needs network)
//! 3. Storage critical: force eviction of unpinned content
//!
//! A second health check decides whether recovery worked. Consecutive
//! failures drive an exponential backoff suggestion for the next attempt.

use crate::config::HealthConfig;
use crate::error::{HealthError, Result};
use bridge_traits::{Clock, NetworkMonitor, RegistrationProvider};
use chrono::{DateTime, Utc};
use core_async::sync::{watch, Mutex as AsyncMutex};
use core_async::time::{backoff_delay, sleep, Duration};
use core_runtime::events::{CoreEvent, EventBus, HealthEvent};
use core_storage::{StorageManager, StorageTier};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Source of the last successful sync time.
///
/// Implemented for closures so the composition root can hand in
/// `move || sync.last_sync_time()`.
pub trait LastSyncProvider: Send + Sync {
    fn last_sync_time(&self) -> Option<DateTime<Utc>>;
}

impl<F> LastSyncProvider for F
where
    F: Fn() -> Option<DateTime<Utc>> + Send + Sync,
{
    fn last_sync_time(&self) -> Option<DateTime<Utc>> {
        self()
    }
}

// ============================================================================
// Status
// ============================================================================

/// Point-in-time device health.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthStatus {
    pub is_online: bool,
    pub storage_tier: StorageTier,
    pub free_bytes: u64,
    pub last_sync_time: Option<DateTime<Utc>>,
    pub registration_valid: bool,
    pub checked_at: DateTime<Utc>,
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        self.is_online && self.registration_valid && self.storage_tier != StorageTier::Critical
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryAction {
    WaitForNetwork,
    ReRegister,
    ForceEviction,
}

impl std::fmt::Display for RecoveryAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            RecoveryAction::WaitForNetwork => "wait_for_network",
            RecoveryAction::ReRegister => "re_register",
            RecoveryAction::ForceEviction => "force_eviction",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionOutcome {
    pub action: RecoveryAction,
    pub succeeded: bool,
    pub detail: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryOutcome {
    /// The device was healthy; nothing ran
    NothingToDo,
    /// The follow-up check passed
    Recovered,
    /// The follow-up check still failed
    StillUnhealthy,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoveryReport {
    pub outcome: RecoveryOutcome,
    pub actions: Vec<ActionOutcome>,
    /// Result of the follow-up check
    pub status: HealthStatus,
    pub consecutive_failures: u32,
    /// Suggested wait before the next attempt, when recovery failed
    pub retry_after: Option<Duration>,
}

// ============================================================================
// Monitor
// ============================================================================

pub struct HealthMonitor {
    config: HealthConfig,
    network: Arc<dyn NetworkMonitor>,
    registration: Arc<dyn RegistrationProvider>,
    storage: Arc<StorageManager>,
    last_sync: Arc<dyn LastSyncProvider>,
    clock: Arc<dyn Clock>,
    event_bus: Option<EventBus>,
    latest: watch::Sender<Option<HealthStatus>>,
    recovery: AsyncMutex<()>,
    consecutive_failures: AtomicU32,
}

impl HealthMonitor {
    pub fn new(
        config: HealthConfig,
        network: Arc<dyn NetworkMonitor>,
        registration: Arc<dyn RegistrationProvider>,
        storage: Arc<StorageManager>,
        last_sync: Arc<dyn LastSyncProvider>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        config.validate().map_err(HealthError::InvalidConfig)?;
        let (latest, _) = watch::channel(None);
        Ok(Self {
            config,
            network,
            registration,
            storage,
            last_sync,
            clock,
            event_bus: None,
            latest,
            recovery: AsyncMutex::new(()),
            consecutive_failures: AtomicU32::new(0),
        })
    }

    pub fn with_event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    pub fn config(&self) -> &HealthConfig {
        &self.config
    }

    /// Computes health from scratch. The result is also published to
    /// [`subscribe`](Self::subscribe) subscribers.
    #[instrument(skip(self))]
    pub async fn check_health(&self) -> HealthStatus {
        let is_online = self.network.is_connected().await;
        let registration_valid = self.registration.is_registered().await;
        let (storage_tier, free_bytes) = match self.storage.status().await {
            Ok(status) => (status.tier, status.available_bytes),
            Err(e) => {
                warn!(error = %e, "Storage status unavailable, treating as critical");
                (StorageTier::Critical, 0)
            }
        };

        let status = HealthStatus {
            is_online,
            storage_tier,
            free_bytes,
            last_sync_time: self.last_sync.last_sync_time(),
            registration_valid,
            checked_at: self.clock.now(),
        };

        debug!(
            is_online,
            registration_valid,
            tier = %storage_tier,
            free_bytes,
            "Health checked"
        );
        self.emit(HealthEvent::Checked {
            is_online,
            storage_tier: storage_tier.to_string(),
            registration_valid,
        });
        self.latest.send_replace(Some(status.clone()));
        status
    }

    /// Latest-value stream of health checks.
    pub fn subscribe(&self) -> watch::Receiver<Option<HealthStatus>> {
        self.latest.subscribe()
    }

    pub fn last_status(&self) -> Option<HealthStatus> {
        self.latest.borrow().clone()
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures.load(Ordering::SeqCst)
    }

    /// Backoff before the next recovery attempt, `None` after a success.
    pub fn retry_after(&self) -> Option<Duration> {
        match self.consecutive_failures() {
            0 => None,
            failures => Some(backoff_delay(
                self.config.recovery_backoff_base,
                failures - 1,
                self.config.recovery_backoff_max,
            )),
        }
    }

    pub fn is_recovering(&self) -> bool {
        self.recovery.try_lock().is_err()
    }

    /// Runs one recovery pass. Refused while another pass is running.
    #[instrument(skip(self))]
    pub async fn attempt_recovery(&self) -> Result<RecoveryReport> {
        let _guard = self
            .recovery
            .try_lock()
            .map_err(|_| HealthError::RecoveryInProgress)?;

        let before = self.check_health().await;
        if before.is_healthy() {
            self.consecutive_failures.store(0, Ordering::SeqCst);
            return Ok(RecoveryReport {
                outcome: RecoveryOutcome::NothingToDo,
                actions: Vec::new(),
                status: before,
                consecutive_failures: 0,
                retry_after: None,
            });
        }

        info!(
            is_online = before.is_online,
            registration_valid = before.registration_valid,
            tier = %before.storage_tier,
            "Device unhealthy, starting recovery"
        );

        let mut actions = Vec::new();
        let mut online = before.is_online;

        if !online {
            let outcome = self.wait_for_network().await;
            online = outcome.succeeded;
            actions.push(outcome);
        }

        if !before.registration_valid {
            if online {
                actions.push(self.re_register().await);
            } else {
                debug!("Skipping re-registration while offline");
            }
        }

        if before.storage_tier == StorageTier::Critical {
            actions.push(self.force_eviction().await);
        }

        let after = self.check_health().await;
        let recovered = after.is_healthy();
        let consecutive_failures = if recovered {
            self.consecutive_failures.store(0, Ordering::SeqCst);
            0
        } else {
            self.consecutive_failures.fetch_add(1, Ordering::SeqCst) + 1
        };
        let retry_after = self.retry_after();

        for action in &actions {
            self.emit(HealthEvent::RecoveryFinished {
                action: action.action.to_string(),
                recovered,
                consecutive_failures,
            });
        }

        if recovered {
            info!(actions = actions.len(), "Recovery succeeded");
        } else {
            warn!(
                consecutive_failures,
                retry_after_secs = retry_after.map(|d| d.as_secs()),
                "Recovery did not restore health"
            );
        }

        Ok(RecoveryReport {
            outcome: if recovered {
                RecoveryOutcome::Recovered
            } else {
                RecoveryOutcome::StillUnhealthy
            },
            actions,
            status: after,
            consecutive_failures,
            retry_after,
        })
    }

    async fn wait_for_network(&self) -> ActionOutcome {
        self.started(RecoveryAction::WaitForNetwork);
        for attempt in 1..=self.config.network_wait_retries {
            sleep(self.config.network_wait_delay).await;
            if self.network.is_connected().await {
                info!(attempt, "Network is back");
                return ActionOutcome {
                    action: RecoveryAction::WaitForNetwork,
                    succeeded: true,
                    detail: None,
                };
            }
            debug!(attempt, "Still offline");
        }
        ActionOutcome {
            action: RecoveryAction::WaitForNetwork,
            succeeded: false,
            detail: Some(format!(
                "offline after {} polls",
                self.config.network_wait_retries
            )),
        }
    }

    async fn re_register(&self) -> ActionOutcome {
        self.started(RecoveryAction::ReRegister);
        let result = self.registration.re_register().await;
        if let Err(e) = &result {
            warn!(error = %e, "Re-registration failed");
        }
        ActionOutcome {
            action: RecoveryAction::ReRegister,
            succeeded: result.is_ok(),
            detail: result.err().map(|e| e.to_string()),
        }
    }

    async fn force_eviction(&self) -> ActionOutcome {
        self.started(RecoveryAction::ForceEviction);
        match self
            .storage
            .force_eviction(self.config.eviction_target_bytes)
            .await
        {
            Ok(freed) => {
                info!(freed_bytes = freed, "Forced eviction finished");
                ActionOutcome {
                    action: RecoveryAction::ForceEviction,
                    succeeded: freed > 0,
                    detail: Some(format!("freed {freed} bytes")),
                }
            }
            Err(e) => {
                warn!(error = %e, "Forced eviction failed");
                ActionOutcome {
                    action: RecoveryAction::ForceEviction,
                    succeeded: false,
                    detail: Some(e.to_string()),
                }
            }
        }
    }

    fn started(&self, action: RecoveryAction) {
        info!(%action, "Recovery action started");
        self.emit(HealthEvent::RecoveryStarted {
            action: action.to_string(),
        });
    }

    fn emit(&self, event: HealthEvent) {
        if let Some(bus) = &self.event_bus {
            bus.publish(CoreEvent::Health(event));
        }
    }
}

impl std::fmt::Debug for HealthMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HealthMonitor")
            .field("config", &self.config)
            .field("consecutive_failures", &self.consecutive_failures())
            .finish_non_exhaustive()
    }
}
