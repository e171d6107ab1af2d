//! # Core Runtime Module
//!
//! Foundational runtime infrastructure for the signage player core:
//! - Logging and tracing (with host sink forwarding and redaction)
//! - Bridge configuration with fail-fast capability checks
//! - Diagnostics event bus
//!
//! Every other `core-*` crate depends on this one for its logging
//! conventions and event types.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use config::{CoreConfig, CoreConfigBuilder};
pub use error::{Error, Result};
pub use events::{CoreEvent, EventBus, EventStream};
