//! Synchronization primitives.
//!
//! Async-aware locks and channels are Tokio's. Cooperative cancellation uses
//! `tokio_util`'s [`CancellationToken`], which the download workers check
//! between chunks and the sync engine checks between manifest items.
//!
//! # Examples
//!
//! ```rust
//! use core_async::sync::{CancellationToken, Mutex};
//!
//! async fn example() {
//!     let mutex = Mutex::new(0u32);
//!     *mutex.lock().await += 1;
//!
//!     let token = CancellationToken::new();
//!     let child = token.child_token();
//!     token.cancel();
//!     assert!(child.is_cancelled());
//! }
//! ```

pub use tokio::sync::{
    broadcast, mpsc, oneshot, watch, Barrier, Mutex, MutexGuard, Notify, OwnedMutexGuard,
    OwnedSemaphorePermit, RwLock, RwLockReadGuard, RwLockWriteGuard, Semaphore, SemaphorePermit,
    TryLockError,
};

pub use tokio_util::sync::{CancellationToken, DropGuard, WaitForCancellationFuture};
