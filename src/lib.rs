//! Cross-process advisory file locking with an explicit, content-addressed
//! expiry instead of kernel-enforced (`flock`/`O_EXCL`) semantics.
//!
//! A lock is a sidecar file next to the resource it protects, holding a
//! single tick count: the instant the lock is considered released. Any
//! process that can read and write that file can participate, there is no
//! mandatory locking underneath, so every operation here tolerates missing
//! files, torn reads, and races rather than treating them as errors.
//!
//! Three layers build on each other:
//!
//! - an internal lock-record layer owns the file itself (read/write/delete
//!   the tick count).
//! - [`BasicLock`] adds handle semantics: immediate acquire, optional
//!   continuous refresh, and disposal.
//! - [`TimedLock`] adds bounded-wait acquisition (racing two polling
//!   strategies under a deadline) and safe disposal (only delete a lock
//!   this handle still recognizes as its own).
//!
//! ```no_run
//! use tickrelease::TimedLock;
//! use std::time::Duration;
//!
//! # async fn run() {
//! let lock = TimedLock::new("/var/data/shared.bin");
//! let acquired = lock
//!     .try_acquire_or_timeout_simple(Duration::from_secs(30), Duration::from_secs(5))
//!     .await
//!     .expect("valid timeout/retry arguments");
//! if acquired {
//!     // ... do work while the lock is held ...
//!     lock.dispose().await;
//! }
//! # }
//! ```

mod basic_lock;
mod cancel;
pub mod err;
mod lock_record;
mod logging;
mod ticks;
mod timed_lock;

pub use basic_lock::{BasicLock, REFRESH_FACTOR};
pub use err::{LockError, LockErrorKind, Result};
pub use lock_record::derive_lock_path;
pub use timed_lock::{TimedLock, MIN_GRANULARITY};
