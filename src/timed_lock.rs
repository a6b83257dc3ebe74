//! Bounded-wait acquisition and careful release.
//!
//! [`TimedLock`] wraps a [`BasicLock`] and adds [`TimedLock::try_acquire_or_timeout`],
//! which races two cooperative polling strategies, wait-till-release and
//! retry-before-release, under a single overall deadline. It also hooks
//! every successful write into a cached release field, which is the basis
//! for [`TimedLock::dispose`]'s safe-disposal check: a handle only deletes
//! the lock file if the on-disk content still matches what it last wrote.

use crate::basic_lock::BasicLock;
use crate::cancel::sleep_or_cancelled;
use crate::err::{LockErrorKind, Result};
use crate::lock_error;
use crate::ticks;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant as TokioInstant;

/// Minimum permitted `retry`/`timeout` value, and the polling interval used
/// once a strategy is reduced to "just keep checking". Reflects the typical
/// minimum OS timer resolution on commodity platforms.
pub const MIN_GRANULARITY: Duration = Duration::from_millis(15);

pub struct TimedLock {
    basic: BasicLock,
    cached_release: Arc<Mutex<DateTime<Utc>>>,
}

impl TimedLock {
    /// Must be called from within a running Tokio runtime (see [`BasicLock::new`]).
    pub fn new<P: AsRef<Path>>(target: P) -> Self {
        let cached_release = Arc::new(Mutex::new(ticks::far_past()));
        let hook_cell = cached_release.clone();
        let hook: crate::basic_lock::WriteHook = Arc::new(move |instant| {
            *hook_cell.lock().unwrap() = instant;
        });
        let basic = BasicLock::new_with_hook(target, Some(hook), false);
        Self {
            basic,
            cached_release,
        }
    }

    pub fn lock_path(&self) -> &Path {
        self.basic.lock_path()
    }

    // --- Inherited BasicLock behavior, delegated wholesale -----------------

    pub async fn try_acquire_until(&self, instant: DateTime<Utc>) -> bool {
        self.basic.try_acquire_until(instant).await
    }

    pub async fn try_acquire_for(&self, duration: Duration, refresh: bool) -> bool {
        self.basic.try_acquire_for(duration, refresh).await
    }

    pub async fn add_time(&self, duration: Duration) {
        self.basic.add_time(duration).await
    }

    pub async fn get_release_date(&self) -> DateTime<Utc> {
        self.basic.get_release_date().await
    }

    fn cached(&self) -> DateTime<Utc> {
        *self.cached_release.lock().unwrap()
    }

    // --- Bounded-wait acquisition -------------------------------------------

    /// `try_acquire_or_timeout(duration, timeout, retry = timeout)`.
    pub async fn try_acquire_or_timeout_simple(
        &self,
        duration: Duration,
        timeout: Duration,
    ) -> Result<bool> {
        self.try_acquire_or_timeout(duration, timeout, timeout).await
    }

    pub async fn try_acquire_or_timeout(
        &self,
        duration: Duration,
        timeout: Duration,
        retry: Duration,
    ) -> Result<bool> {
        validate_timed_params(timeout, retry)?;

        if !self.basic.record.exists().await {
            return Ok(self.basic.try_acquire_for(duration, false).await);
        }

        let observed_release = self.basic.record.get_release().await;
        let now = Utc::now();
        let timeout_chrono = ChronoDuration::from_std(timeout).unwrap_or(ChronoDuration::zero());
        if observed_release > now + timeout_chrono {
            self.basic.logger.debug(format!(
                "try_acquire_or_timeout: {} held until {} outlives deadline, failing fast",
                self.lock_path().display(),
                observed_release
            ));
            return Ok(false);
        }

        let acquire_until = now + ChronoDuration::from_std(duration).unwrap_or(ChronoDuration::zero());
        let deadline = TokioInstant::now() + timeout;

        if retry >= timeout {
            return Ok(self
                .wait_till_release(
                    observed_release,
                    acquire_until,
                    deadline,
                    self.basic.cancel_receiver(),
                )
                .await);
        }

        tokio::select! {
            biased;
            won = self.retry_before_release(observed_release, retry, acquire_until, deadline, self.basic.cancel_receiver()) => Ok(won),
            won = self.wait_till_release(observed_release, acquire_until, deadline, self.basic.cancel_receiver()) => Ok(won),
        }
    }

    /// Sleep until the observed release instant, then poll every
    /// `MIN_GRANULARITY` until the overall deadline. Gives up early if
    /// `cancel_rx` fires (e.g. a concurrent `dispose()` on this same handle).
    async fn wait_till_release(
        &self,
        release: DateTime<Utc>,
        acquire_until: DateTime<Utc>,
        deadline: TokioInstant,
        mut cancel_rx: watch::Receiver<bool>,
    ) -> bool {
        if *cancel_rx.borrow() {
            return false;
        }
        let initial_delay = positive_duration_until(release);
        let capped = initial_delay.min(remaining(deadline));
        if !capped.is_zero() && sleep_or_cancelled(capped, &mut cancel_rx).await {
            return false;
        }
        self.poll_until_deadline(acquire_until, deadline, MIN_GRANULARITY, &mut cancel_rx)
            .await
    }

    /// Poll every `retry` until the observed release instant passes, then
    /// fall back to polling every `MIN_GRANULARITY` until the deadline.
    /// Gives up early if `cancel_rx` fires.
    async fn retry_before_release(
        &self,
        release: DateTime<Utc>,
        retry: Duration,
        acquire_until: DateTime<Utc>,
        deadline: TokioInstant,
        mut cancel_rx: watch::Receiver<bool>,
    ) -> bool {
        loop {
            if *cancel_rx.borrow() || TokioInstant::now() >= deadline {
                return false;
            }
            if self.basic.try_acquire_until(acquire_until).await {
                return true;
            }
            let interval = if Utc::now() < release {
                retry
            } else {
                MIN_GRANULARITY
            };
            let wait = interval.min(remaining(deadline));
            if wait.is_zero() {
                return false;
            }
            if sleep_or_cancelled(wait, &mut cancel_rx).await {
                return false;
            }
        }
    }

    async fn poll_until_deadline(
        &self,
        acquire_until: DateTime<Utc>,
        deadline: TokioInstant,
        interval: Duration,
        cancel_rx: &mut watch::Receiver<bool>,
    ) -> bool {
        loop {
            if *cancel_rx.borrow() || TokioInstant::now() >= deadline {
                return false;
            }
            if self.basic.try_acquire_until(acquire_until).await {
                return true;
            }
            let wait = interval.min(remaining(deadline));
            if wait.is_zero() {
                return false;
            }
            if sleep_or_cancelled(wait, cancel_rx).await {
                return false;
            }
        }
    }

    // --- Safe disposal -------------------------------------------------------

    /// Fire cancellation, then delete the lock file only if the cached
    /// release this handle last wrote still matches the on-disk content ,
    /// preventing a handle from deleting a lock another handle re-acquired.
    pub async fn dispose(&self) {
        self.basic.stop();

        let cached = self.cached();
        if cached == ticks::far_past() {
            return;
        }
        if !self.basic.record.exists().await {
            return;
        }
        let on_disk = self.basic.record.get_release().await;
        if on_disk == cached {
            self.basic.record.delete().await;
            self.basic
                .logger
                .info(format!("safely disposed {}", self.lock_path().display()));
        } else {
            self.basic.logger.debug(format!(
                "dispose: {} was re-acquired by another handle, leaving it in place",
                self.lock_path().display()
            ));
        }
    }
}

impl Drop for TimedLock {
    fn drop(&mut self) {
        self.basic.stop();
        let cached = self.cached();
        if cached == ticks::far_past() {
            return;
        }
        // Best-effort net mirroring `dispose`'s safe-disposal check for
        // callers that drop the handle without awaiting it explicitly. Done
        // inline with `std::fs` so it lands before control returns to the
        // caller, matching BasicLock's own drop handling.
        let path = self.lock_path();
        let on_disk = std::fs::read_to_string(path)
            .ok()
            .and_then(|s| s.trim().parse::<i64>().ok())
            .map(ticks::datetime_from_ticks);
        if on_disk == Some(cached) {
            let _ = std::fs::remove_file(path);
        }
    }
}

fn remaining(deadline: TokioInstant) -> Duration {
    deadline.saturating_duration_since(TokioInstant::now())
}

/// Ceiling-rounded, never-negative duration from now until `instant`.
fn positive_duration_until(instant: DateTime<Utc>) -> Duration {
    let delta = instant - Utc::now();
    if delta <= ChronoDuration::zero() {
        return Duration::ZERO;
    }
    let millis = delta.num_milliseconds();
    let exact = ChronoDuration::milliseconds(millis);
    let ceiled = if delta > exact { millis + 1 } else { millis };
    Duration::from_millis(ceiled.max(0) as u64)
}

fn validate_timed_params(timeout: Duration, retry: Duration) -> Result<()> {
    if timeout < MIN_GRANULARITY {
        return Err(lock_error!(
            LockErrorKind::InvalidArgument,
            "timeout {:?} is below MIN_GRANULARITY {:?}",
            timeout,
            MIN_GRANULARITY
        ));
    }
    if retry < MIN_GRANULARITY {
        return Err(lock_error!(
            LockErrorKind::InvalidArgument,
            "retry {:?} is below MIN_GRANULARITY {:?}",
            retry,
            MIN_GRANULARITY
        ));
    }
    if retry > timeout {
        return Err(lock_error!(
            LockErrorKind::InvalidArgument,
            "retry {:?} exceeds timeout {:?}",
            retry,
            timeout
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn unique_target(name: &str) -> std::path::PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        let mut p = std::env::temp_dir();
        p.push(format!(
            "tickrelease_timed_{}_{}_{}.txt",
            name,
            std::process::id(),
            nanos
        ));
        p
    }

    #[tokio::test]
    async fn rejects_timeout_below_min_granularity() {
        let target = unique_target("invalid_timeout");
        let lock = TimedLock::new(&target);
        let err = lock
            .try_acquire_or_timeout(Duration::from_millis(100), Duration::from_millis(5), Duration::from_millis(5))
            .await
            .unwrap_err();
        assert!(err.is_invalid_argument());
    }

    #[tokio::test]
    async fn rejects_retry_above_timeout() {
        let target = unique_target("invalid_retry");
        let lock = TimedLock::new(&target);
        let err = lock
            .try_acquire_or_timeout(Duration::from_millis(100), Duration::from_millis(50), Duration::from_millis(60))
            .await
            .unwrap_err();
        assert!(err.is_invalid_argument());
    }

    #[tokio::test]
    async fn rejects_retry_below_min_granularity() {
        let target = unique_target("invalid_retry_low");
        let lock = TimedLock::new(&target);
        let err = lock
            .try_acquire_or_timeout(Duration::from_millis(100), Duration::from_millis(100), Duration::from_millis(1))
            .await
            .unwrap_err();
        assert!(err.is_invalid_argument());
    }

    #[tokio::test]
    async fn fast_path_succeeds_quickly_with_no_existing_lock() {
        let target = unique_target("fast_path");
        let lock = TimedLock::new(&target);

        let start = TokioInstant::now();
        let ok = lock
            .try_acquire_or_timeout_simple(Duration::from_secs(60), Duration::from_secs(5))
            .await
            .unwrap();
        assert!(ok);
        assert!(start.elapsed() < Duration::from_millis(500));

        lock.dispose().await;
    }

    #[tokio::test]
    async fn fails_fast_when_conflicting_lock_outlives_timeout() {
        let target = unique_target("deadline_exceeded");
        let holder = TimedLock::new(&target);
        assert!(holder.try_acquire_for(Duration::from_millis(150), false).await);

        let waiter = TimedLock::new(&target);
        let start = TokioInstant::now();
        let ok = waiter
            .try_acquire_or_timeout_simple(Duration::from_millis(150), Duration::from_millis(15))
            .await
            .unwrap();
        assert!(!ok);
        assert!(start.elapsed() < Duration::from_millis(100));

        holder.dispose().await;
    }

    #[tokio::test]
    async fn succeeds_after_holder_releases_just_in_time() {
        let target = unique_target("succeeds_after_release");
        let holder = TimedLock::new(&target);
        assert!(holder.try_acquire_for(Duration::from_millis(70), false).await);

        let holder_path = target.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(70)).await;
            let late_holder = TimedLock::new(&holder_path);
            late_holder.dispose().await;
        });

        let waiter = TimedLock::new(&target);
        let ok = waiter
            .try_acquire_or_timeout_simple(Duration::from_millis(70), Duration::from_millis(700))
            .await
            .unwrap();
        assert!(ok);

        waiter.dispose().await;
    }

    #[tokio::test]
    async fn retry_catches_an_early_release() {
        let target = unique_target("retry_catches_early");
        let holder = TimedLock::new(&target);
        assert!(holder.try_acquire_for(Duration::from_millis(72), false).await);

        // The holder claims 72ms but actually disposes after 24ms, the
        // retry-before-release strategy should notice well before the
        // stated release instant.
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(24)).await;
            holder.dispose().await;
        });

        let waiter = TimedLock::new(&target);
        let start = TokioInstant::now();
        let ok = waiter
            .try_acquire_or_timeout(
                Duration::from_millis(72),
                Duration::from_millis(72),
                Duration::from_millis(15),
            )
            .await
            .unwrap();
        assert!(ok);
        assert!(start.elapsed() < Duration::from_millis(72));

        waiter.dispose().await;
    }

    #[tokio::test]
    async fn safe_dispose_does_not_delete_a_lock_re_acquired_by_another_handle() {
        let target = unique_target("safe_dispose");
        let a = TimedLock::new(&target);
        assert!(a.try_acquire_for(Duration::from_millis(30), false).await);

        tokio::time::sleep(Duration::from_millis(60)).await;

        let b = TimedLock::new(&target);
        assert!(b.try_acquire_for(Duration::from_secs(60), false).await);

        // a's cached release no longer matches what's on disk; disposing a
        // must not delete b's lock.
        a.dispose().await;
        assert!(b.lock_path().exists());

        b.dispose().await;
    }

    #[tokio::test]
    async fn positive_duration_until_never_negative() {
        let past = Utc::now() - ChronoDuration::seconds(5);
        assert_eq!(positive_duration_until(past), Duration::ZERO);
    }
}
