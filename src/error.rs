//! Error types for the RiftKV storage core.

use std::fmt;
use std::io;

/// The result type used throughout RiftKV.
pub type Result<T> = std::result::Result<T, Error>;

/// The error type for RiftKV operations.
#[derive(Debug)]
pub enum Error {
    /// An I/O error occurred.
    Io(io::Error),

    /// Data corruption was detected (bad descriptor, bad table footer,
    /// checksum mismatch).
    Corruption(String),

    /// The requested key was not found.
    NotFound(String),

    /// An invalid argument was provided.
    InvalidArgument(String),

    /// An internal ordering invariant was broken. Indicates prior
    /// corruption; the affected level must not be mutated further.
    InvariantViolation(String),

    /// A compaction was aborted before its outputs were installed.
    ///
    /// The pre-compaction version is unchanged. `orphaned_files` lists the
    /// numbers of output tables that were partially or fully written and
    /// are now garbage; deleting them from disk is the cleanup
    /// collaborator's job.
    CompactionAborted {
        /// File numbers of abandoned compaction outputs.
        orphaned_files: Vec<u64>,
        /// The underlying failure.
        cause: Box<Error>,
    },
}

impl Error {
    /// Creates a new corruption error.
    pub fn corruption(msg: impl Into<String>) -> Self {
        Error::Corruption(msg.into())
    }

    /// Creates a new not found error.
    pub fn not_found(msg: impl Into<String>) -> Self {
        Error::NotFound(msg.into())
    }

    /// Creates a new invalid argument error.
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Error::InvalidArgument(msg.into())
    }

    /// Creates a new invariant violation error.
    pub fn invariant(msg: impl Into<String>) -> Self {
        Error::InvariantViolation(msg.into())
    }

    /// Returns `true` if this is a `NotFound` error.
    ///
    /// Point lookups use this to let a miss in one level flow to the next.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "IO error: {}", e),
            Error::Corruption(msg) => write!(f, "Data corruption: {}", msg),
            Error::NotFound(msg) => write!(f, "Not found: {}", msg),
            Error::InvalidArgument(msg) => write!(f, "Invalid argument: {}", msg),
            Error::InvariantViolation(msg) => write!(f, "Invariant violation: {}", msg),
            Error::CompactionAborted { orphaned_files, cause } => {
                write!(f, "Compaction aborted (orphaned files: {:?}): {}", orphaned_files, cause)
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            Error::CompactionAborted { cause, .. } => Some(cause.as_ref()),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::Io(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::corruption("bad descriptor");
        assert_eq!(err.to_string(), "Data corruption: bad descriptor");

        let err = Error::CompactionAborted {
            orphaned_files: vec![12, 13],
            cause: Box::new(Error::invariant("keys out of order")),
        };
        assert!(err.to_string().contains("12"));
        assert!(err.to_string().contains("keys out of order"));
    }

    #[test]
    fn test_error_from_io() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_is_not_found() {
        assert!(Error::not_found("k").is_not_found());
        assert!(!Error::corruption("x").is_not_found());
    }
}
