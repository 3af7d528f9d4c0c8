//! Crate-level error type.
//!
//! Most internal operations return [`std::io::Error`] directly, the same way
//! `fuser::mnt` does for mount/unmount failures — callers match on
//! `ErrorKind`/`raw_os_error()` to decide whether a failure is fatal or merely
//! a warning (see [`crate::locker`] and [`crate::launcher`]). [`Error`] exists
//! only for the handful of failures that must abort the whole run with a
//! usage-class exit status rather than being folded into the aggregate.

use std::fmt;
use std::io;

/// A fatal, run-aborting failure.
///
/// Everything else (resolver failures, missing helpers, fork failures, lock
/// contention, helpers killed by a signal) is recoverable per spec.md §7 and
/// is folded into the aggregate exit status instead of raising this type.
#[derive(Debug)]
pub enum Error {
    /// The `-t` type-selector string mixed positive and negated type terms.
    ConflictingTypeFilter(String),
    /// The mount table could not be read at all (as opposed to one
    /// malformed line, which is only a warning).
    MountTableUnreadable(io::Error),
    /// Any other I/O failure that occurred outside the per-entry recoverable
    /// paths (e.g. failing to create the runtime directory for lock files).
    Io(io::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::ConflictingTypeFilter(selector) => write!(
                f,
                "cannot mix negated and non-negated filesystem types in '-t {selector}'"
            ),
            Error::MountTableUnreadable(err) => write!(f, "cannot read mount table: {err}"),
            Error::Io(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::ConflictingTypeFilter(_) => None,
            Error::MountTableUnreadable(err) | Error::Io(err) => Some(err),
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::Io(err)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
