//! # Playback Scheduler Module
//!
//! Drives the on-screen loop from the content cache.
//!
//! ## Overview
//!
//! This module handles:
//! - Cycling an ordered playlist forever with per-item hold times
//! - Resolving each item to a cached file, falling back to its source URL
//! - Advancing early on skip, natural completion or a renderer error
//! - Publishing the item on screen and every advance to observers

pub mod config;
pub mod error;
pub mod scheduler;

pub use config::PlaybackConfig;
pub use error::{PlaybackError, Result};
pub use scheduler::{
    AdvanceReason, NowPlaying, PlaybackAdvance, PlaybackSource, PlaybackStatus, PlaylistManager,
};
