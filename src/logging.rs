//! A minimal async logger, channel-backed the same way as this crate's own
//! background tasks are driven.
//!
//! Unlike a process-wide global logger, every lock handle owns its own
//! [`AsyncLogger`] handle (cheap to clone, it is just an mpsc sender). This
//! keeps two handles bound to different paths from sharing mutable state,
//! matching the "no shared mutable state between handles" design note.
//! Messages are best-effort: a full channel or a closed receiver silently
//! drops the line rather than blocking or panicking a caller.

use chrono::{DateTime, Utc};
use std::fmt;
use tokio::io::{AsyncWriteExt, Stderr};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LogLevel::Trace => "TRACE",
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO ",
            LogLevel::Warn => "WARN ",
            LogLevel::Error => "ERROR",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug)]
struct LogRecord {
    level: LogLevel,
    msg: String,
    ts_millis: i64,
}

impl LogRecord {
    fn format_line(&self) -> String {
        let dt = DateTime::from_timestamp_millis(self.ts_millis).unwrap_or_else(Utc::now);
        let ts = dt.to_rfc3339_opts(chrono::SecondsFormat::Millis, true);
        format!("{} [{}] {}\n", ts, self.level, self.msg)
    }
}

/// A cheap, clone-able handle to a background logging task.
#[derive(Clone, Debug)]
pub struct AsyncLogger {
    tx: mpsc::Sender<LogRecord>,
}

impl AsyncLogger {
    fn log(&self, level: LogLevel, msg: String) {
        let ts_millis = Utc::now().timestamp_millis();
        // try_send: never block a caller's acquire/refresh/dispose path on logging.
        let _ = self.tx.try_send(LogRecord {
            level,
            msg,
            ts_millis,
        });
    }

    pub fn trace(&self, msg: impl Into<String>) {
        self.log(LogLevel::Trace, msg.into());
    }
    pub fn debug(&self, msg: impl Into<String>) {
        self.log(LogLevel::Debug, msg.into());
    }
    pub fn info(&self, msg: impl Into<String>) {
        self.log(LogLevel::Info, msg.into());
    }
    pub fn warn(&self, msg: impl Into<String>) {
        self.log(LogLevel::Warn, msg.into());
    }
    pub fn error(&self, msg: impl Into<String>) {
        self.log(LogLevel::Error, msg.into());
    }
}

/// Spawn a background task that writes formatted log lines to stderr.
/// Must be called from within a running Tokio runtime.
pub fn init_stderr_logger() -> (AsyncLogger, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::channel::<LogRecord>(256);
    let task = tokio::spawn(async move {
        let mut stderr: Stderr = tokio::io::stderr();
        while let Some(rec) = rx.recv().await {
            let line = rec.format_line();
            let _ = stderr.write_all(line.as_bytes()).await;
        }
    });
    (AsyncLogger { tx }, task)
}
