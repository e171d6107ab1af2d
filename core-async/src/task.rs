//! Task spawning and execution.
//!
//! Background loops (download workers, the playlist loop, periodic sync and
//! health checks) are spawned through [`spawn`] and keep their
//! [`JoinHandle`] so they can be awaited or aborted on shutdown.

pub use tokio::task::{spawn_blocking, yield_now, AbortHandle, JoinError, JoinHandle, JoinSet};

/// Spawns a new asynchronous task on the current runtime.
///
/// # Examples
///
/// ```rust
/// use core_async::task::spawn;
///
/// # async fn example() {
/// let handle = spawn(async { 42 });
/// assert_eq!(handle.await.unwrap(), 42);
/// # }
/// ```
pub fn spawn<F>(future: F) -> JoinHandle<F::Output>
where
    F: std::future::Future + Send + 'static,
    F::Output: Send + 'static,
{
    tokio::task::spawn(future)
}

/// Returns `true` when called from inside a runtime context.
///
/// Drop implementations use this to decide whether cleanup can be deferred to
/// a spawned task.
pub fn in_runtime() -> bool {
    tokio::runtime::Handle::try_current().is_ok()
}

/// Result type for task operations.
pub type Result<T> = std::result::Result<T, JoinError>;
