//! In-process handle semantics and the immediate-acquire protocol.
//!
//! A [`BasicLock`] is bound to exactly one lock-file path for its whole
//! lifetime. Two handles bound to the same path, even within the same
//! process, are independent participants that compete through the lock
//! file exactly as two handles in different processes would; there is no
//! shared mutable state between them.

use crate::cancel::{sleep_or_cancelled, CancelToken};
use crate::lock_record::{derive_lock_path, LockRecord};
use crate::logging::{init_stderr_logger, AsyncLogger};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Continuous-refresh writes extend the release by this fraction of the
/// acquire duration, then sleep the same fraction, leaving slack so a single
/// missed cycle does not let the lock lapse.
pub const REFRESH_FACTOR: f64 = 0.9;

/// Invoked after every release instant this handle successfully writes.
/// [`crate::timed_lock::TimedLock`] hooks this to write-through its cache;
/// a plain [`BasicLock`] installs none.
pub(crate) type WriteHook = Arc<dyn Fn(DateTime<Utc>) + Send + Sync>;

pub struct BasicLock {
    pub(crate) record: Arc<LockRecord>,
    pub(crate) logger: AsyncLogger,
    pub(crate) cancel: CancelToken,
    on_write: Option<WriteHook>,
    refresh_task: std::sync::Mutex<Option<JoinHandle<()>>>,
    _logger_task: JoinHandle<()>,
    /// False when this `BasicLock` is embedded inside a
    /// [`crate::timed_lock::TimedLock`], which applies its own safe-disposal
    /// check on drop instead of this type's unconditional delete.
    drop_deletes: bool,
}

impl BasicLock {
    /// Bind a new handle to the lock file derived from `target`. Must be
    /// called from within a running Tokio runtime (it spawns the handle's
    /// own background log writer).
    pub fn new<P: AsRef<Path>>(target: P) -> Self {
        Self::new_with_hook(target, None, true)
    }

    pub(crate) fn new_with_hook<P: AsRef<Path>>(
        target: P,
        on_write: Option<WriteHook>,
        drop_deletes: bool,
    ) -> Self {
        let (logger, logger_task) = init_stderr_logger();
        let lock_path = derive_lock_path(target.as_ref());
        Self {
            record: Arc::new(LockRecord::new(lock_path, logger.clone())),
            logger,
            cancel: CancelToken::new(),
            on_write,
            refresh_task: std::sync::Mutex::new(None),
            _logger_task: logger_task,
            drop_deletes,
        }
    }

    pub fn lock_path(&self) -> &Path {
        self.record.path()
    }

    /// Immediate, non-blocking acquire attempt against an explicit release
    /// instant. Never fails with an error; contention is reported as `false`.
    pub async fn try_acquire_until(&self, instant: DateTime<Utc>) -> bool {
        if !self.record.exists().await {
            let ok = self.record.try_set_release(instant).await;
            if ok {
                self.logger
                    .info(format!("acquired {} (no prior lock)", self.lock_path().display()));
                self.notify_write(instant);
            }
            return ok;
        }

        let current = self.record.get_release().await;
        if current > Utc::now() {
            self.logger.debug(format!(
                "try_acquire_until: {} held until {}",
                self.lock_path().display(),
                current
            ));
            return false;
        }

        let ok = self.record.try_set_release(instant).await;
        if ok {
            self.logger.info(format!(
                "acquired {} (prior lock expired at {})",
                self.lock_path().display(),
                current
            ));
            self.notify_write(instant);
        }
        ok
    }

    fn notify_write(&self, instant: DateTime<Utc>) {
        if let Some(hook) = &self.on_write {
            hook(instant);
        }
    }

    /// Acquire for `duration` from now, optionally starting a continuous
    /// refresh task that keeps extending the release until [`Self::dispose`].
    pub async fn try_acquire_for(&self, duration: Duration, refresh: bool) -> bool {
        let instant = Utc::now() + ChronoDuration::from_std(duration).unwrap_or(ChronoDuration::zero());
        let acquired = self.try_acquire_until(instant).await;
        if acquired && refresh {
            self.start_refresh(duration);
        }
        acquired
    }

    fn start_refresh(&self, duration: Duration) {
        let interval_secs = duration.as_secs_f64() * REFRESH_FACTOR;
        let interval = Duration::from_secs_f64(interval_secs.max(0.0));
        let record = self.record.clone();
        let mut cancel_rx = self.cancel.subscribe();
        let logger = self.logger.clone();
        let on_write = self.on_write.clone();

        let handle = tokio::spawn(async move {
            while !*cancel_rx.borrow() {
                match extend_release(&record, interval).await {
                    Some(new_release) => {
                        if let Some(hook) = &on_write {
                            hook(new_release);
                        }
                    }
                    None => {
                        logger.debug("refresh: failed to extend release (swallowed)".to_string());
                    }
                }
                if sleep_or_cancelled(interval, &mut cancel_rx).await {
                    break;
                }
            }
        });

        let mut slot = self.refresh_task.lock().unwrap();
        if let Some(prev) = slot.replace(handle) {
            prev.abort();
        }
    }

    /// Extend the current release by `duration`. Never fails with an error.
    pub async fn add_time(&self, duration: Duration) {
        if let Some(new_release) = extend_release(&self.record, duration).await {
            self.notify_write(new_release);
        }
    }

    /// The current release instant, or far-future if no lock is held.
    pub async fn get_release_date(&self) -> DateTime<Utc> {
        self.record.get_release().await
    }

    /// Fire the cancellation signal (stopping the refresh task) then delete
    /// the lock file unconditionally if it still exists. Idempotent.
    pub async fn dispose(&self) {
        self.stop();
        if self.record.exists().await {
            self.record.delete().await;
            self.logger
                .info(format!("disposed {}", self.lock_path().display()));
        }
    }

    /// Fire cancellation and stop the refresh task, without touching the
    /// lock file. Used by [`crate::timed_lock::TimedLock`], which applies
    /// its own safe-disposal check before deleting.
    pub(crate) fn stop(&self) {
        self.cancel.fire();
        if let Some(task) = self.refresh_task.lock().unwrap().take() {
            task.abort();
        }
    }

    pub(crate) fn cancel_receiver(&self) -> watch::Receiver<bool> {
        self.cancel.subscribe()
    }
}

async fn extend_release(record: &LockRecord, duration: Duration) -> Option<DateTime<Utc>> {
    let current = record.get_release().await;
    let extended = current + ChronoDuration::from_std(duration).unwrap_or(ChronoDuration::zero());
    if record.try_set_release(extended).await {
        Some(extended)
    } else {
        None
    }
}

impl Drop for BasicLock {
    fn drop(&mut self) {
        self.stop();
        if !self.drop_deletes {
            return;
        }
        // Best-effort net for callers that drop the handle without calling
        // `dispose` explicitly. Done inline with `std::fs`, not a spawned
        // task, so the delete lands before control returns to the caller
        // rather than racing whatever acquires the path next.
        let _ = std::fs::remove_file(self.record.path());
    }
}
