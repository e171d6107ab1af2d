//! Workspace placeholder crate.
//!
//! Host applications can depend on `signage-workspace` and enable the
//! documented features without wiring the individual workspace crates
//! (`core-service`, `core-sync`, `core-playback`, ...) by hand.

#[cfg(feature = "desktop-shims")]
pub use core_service::*;
