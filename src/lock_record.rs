//! The only component that touches the lock file itself.
//!
//! The file holds exactly one ASCII decimal tick count (see [`crate::ticks`]).
//! Reads tolerate a missing file or any transient I/O failure by returning
//! [`ticks::far_future`], "no lock" and "can't tell, so don't trust it" are
//! deliberately conflated, because the next successful write restores
//! canonical state regardless (see §4.1 of the design).

use crate::logging::AsyncLogger;
use crate::ticks;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use tokio::io::ErrorKind;

/// Derive the sidecar lock-file path for a target resource path by replacing
/// its extension with `lock`. Lives alongside the target.
pub fn derive_lock_path(target: &Path) -> PathBuf {
    target.with_extension("lock")
}

#[derive(Debug)]
pub(crate) struct LockRecord {
    path: PathBuf,
    logger: AsyncLogger,
}

impl LockRecord {
    pub fn new(path: PathBuf, logger: AsyncLogger) -> Self {
        Self { path, logger }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current release instant, or far-future if the file is absent or
    /// unreadable/unparsable. Never fails.
    pub async fn get_release(&self) -> DateTime<Utc> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(c) => c,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return ticks::far_future();
            }
            Err(e) => {
                self.logger.trace(format!(
                    "get_release: transient read error on {}: {e}; treating as no lock",
                    self.path.display()
                ));
                return ticks::far_future();
            }
        };

        match contents.trim().parse::<i64>() {
            Ok(ticks) => ticks::datetime_from_ticks(ticks),
            Err(e) => {
                self.logger.trace(format!(
                    "get_release: malformed content in {} ({e}); treating as no lock",
                    self.path.display()
                ));
                ticks::far_future()
            }
        }
    }

    /// Overwrite the lock file with `instant`'s tick count. Creates the file
    /// if missing. Returns false on any I/O failure, never propagates.
    pub async fn try_set_release(&self, instant: DateTime<Utc>) -> bool {
        let ticks = ticks::ticks_from_datetime(instant);
        match tokio::fs::write(&self.path, ticks.to_string()).await {
            Ok(()) => true,
            Err(e) => {
                self.logger.debug(format!(
                    "try_set_release: failed to write {}: {e}",
                    self.path.display()
                ));
                false
            }
        }
    }

    /// Best-effort delete. Swallows errors; a missing file is not an error.
    pub async fn delete(&self) {
        if let Err(e) = tokio::fs::remove_file(&self.path).await {
            if e.kind() != ErrorKind::NotFound {
                self.logger.debug(format!(
                    "delete: failed to remove {}: {e}",
                    self.path.display()
                ));
            }
        }
    }

    pub async fn exists(&self) -> bool {
        tokio::fs::metadata(&self.path).await.is_ok()
    }
}
