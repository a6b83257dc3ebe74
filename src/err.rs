//! Crate-local error type.
//!
//! Only two conditions are allowed to leave the public API as an `Err`:
//! a malformed timed-acquisition argument, or an internal invariant
//! violation (a racing task reporting a result it should never produce).
//! Everything else, missing lock files, torn reads, failed writes,
//! failed deletes, is tolerated and reported as `false`/a sentinel per
//! the component docs, and logged rather than propagated.

use std::fmt::{Debug, Display, Formatter};

pub type Error = Box<dyn std::error::Error + Send + Sync>;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum LockErrorKind {
    InvalidArgument,
    Internal,
}

impl Display for LockErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            LockErrorKind::InvalidArgument => "invalid argument",
            LockErrorKind::Internal => "internal error",
        };
        write!(f, "{}", s)
    }
}

pub struct LockError {
    kind: LockErrorKind,
    msg: String,
    file: &'static str,
    line: u32,
    source: Option<Error>,
}

impl LockError {
    pub fn new(
        kind: LockErrorKind,
        msg: impl Into<String>,
        file: &'static str,
        line: u32,
        source: Option<Error>,
    ) -> Self {
        Self {
            kind,
            msg: msg.into(),
            file,
            line,
            source,
        }
    }

    pub fn kind(&self) -> LockErrorKind {
        self.kind
    }

    pub fn is_invalid_argument(&self) -> bool {
        self.kind == LockErrorKind::InvalidArgument
    }
}

#[macro_export]
macro_rules! lock_error {
    ($kind:expr, $fmt:expr $(, $($args:tt)*)?) => {
        $crate::err::LockError::new(
            $kind,
            format!($fmt $(,$($args)*)?),
            file!(), line!(), None)
    };
}

#[macro_export]
macro_rules! lock_error_with_source {
    ($kind:expr, $source:expr, $fmt:expr $(, $($args:tt)*)?) => {
        $crate::err::LockError::new(
            $kind,
            format!($fmt $(,$($args)*)?),
            file!(), line!(), Some(Box::new($source) as $crate::err::Error))
    };
}

impl Debug for LockError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}:{}] {}: {}", self.file, self.line, self.kind, self.msg)
    }
}

impl Display for LockError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.msg)
    }
}

impl std::error::Error for LockError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_deref()
            .map(|e| e as &(dyn std::error::Error))
    }
}

/// Result alias for the one public method that can fail: timed acquisition.
pub type Result<T> = std::result::Result<T, LockError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_argument_is_distinguishable() {
        let e = lock_error!(LockErrorKind::InvalidArgument, "retry {} > timeout {}", 5, 3);
        assert!(e.is_invalid_argument());
        assert_eq!(e.to_string(), "retry 5 > timeout 3");
    }

    #[test]
    fn debug_carries_location_and_kind() {
        let e = lock_error!(LockErrorKind::Internal, "unexpected");
        let dbg = format!("{:?}", e);
        assert!(dbg.contains("internal error"));
        assert!(dbg.contains("unexpected"));
    }
}
