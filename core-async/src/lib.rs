//! Async runtime facade for the signage player core.
//!
//! Every `core-*` crate depends on this crate instead of reaching for Tokio
//! directly, so the executor, timers, and synchronization primitives used by
//! the sync engine, the download workers, and the playlist loop all come from
//! one place.
//!
//! # Modules
//!
//! - `task`: Task spawning and execution
//! - `time`: Sleep, timeout, interval, and monotonic instants
//! - `sync`: Async locks, channels, and cooperative cancellation
//! - `io`: Async byte streams
//!
//! # Examples
//!
//! ```rust
//! use core_async::task;
//! use core_async::time::{sleep, Duration};
//!
//! async fn example() {
//!     let handle = task::spawn(async {
//!         sleep(Duration::from_millis(10)).await;
//!         42
//!     });
//!     assert_eq!(handle.await.unwrap(), 42);
//! }
//! ```

// Re-export the async entry-point/test macros so downstream crates never need
// direct Tokio dependencies.
pub use core_async_macros::{main, test};

// `select!` / `join!` expand through `$crate`, so callers need no Tokio
// dependency of their own.
pub use tokio::{join, select};

pub mod io;
pub mod runtime;
pub mod sync;
pub mod task;
pub mod time;

pub use task::spawn;
pub use time::{sleep, Duration, Instant};
