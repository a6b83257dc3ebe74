//! The cancellation signal shared between a lock handle and the background
//! tasks (refresh loop, timed-wait strategies) it spawns.
//!
//! Built on a `tokio::sync::watch<bool>`, the same shape this crate's
//! corpus uses for handle-owned shutdown channels: the handle keeps the
//! sender, every spawned task holds a cloned receiver and `select!`s
//! against it. Monotonic by construction, once the stored value is
//! `true`, [`CancelToken::fire`] only ever re-sends `true`.

use tokio::sync::watch;

#[derive(Debug)]
pub(crate) struct CancelToken {
    tx: watch::Sender<bool>,
}

impl CancelToken {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx }
    }

    /// Trip the signal. Idempotent: firing an already-fired token is a no-op.
    pub fn fire(&self) {
        let _ = self.tx.send(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

/// Wait until either `rx` observes cancellation or `duration` elapses.
/// Returns `true` if cancellation won the race.
pub(crate) async fn sleep_or_cancelled(duration: std::time::Duration, rx: &mut watch::Receiver<bool>) -> bool {
    if *rx.borrow() {
        return true;
    }
    tokio::select! {
        biased;
        _ = rx.changed() => true,
        _ = tokio::time::sleep(duration) => false,
    }
}
