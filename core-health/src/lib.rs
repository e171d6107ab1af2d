//! # Device Health & Recovery
//!
//! [`HealthMonitor`] answers "is this screen able to keep content fresh?"
//! (network, registration, storage tier, last sync) and runs corrective
//! actions when it is not. Scheduling of periodic checks belongs to the
//! composition root.

pub mod config;
pub mod error;
pub mod monitor;

pub use config::HealthConfig;
pub use error::{HealthError, Result};
pub use monitor::{
    ActionOutcome, HealthMonitor, HealthStatus, LastSyncProvider, RecoveryAction, RecoveryOutcome,
    RecoveryReport,
};
