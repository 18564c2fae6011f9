//! Shared error taxonomy for filesystem operations.
//!
//! Every layer of the runtime (mount routing, plugin bridges, the FUSE
//! client) speaks [`FsError`]. Plugins map their internal failures into
//! these categories so callers can react uniformly: [`FsError::NotSupported`]
//! is advisory (callers fall back to another strategy), while the rest are
//! terminal for the operation that produced them.

use thiserror::Error;

/// Result alias used throughout the workspace.
pub type FsResult<T> = Result<T, FsError>;

/// Error categories for filesystem operations.
///
/// The string payload carries the path or a short description; it is for
/// logs and error messages, never for dispatch. Dispatch on the variant.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FsError {
    /// The path, handle, or mount does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The operation is not permitted on this entry.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// The target already exists (create with `EXCL`, duplicate mount).
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// The backend does not implement this operation.
    ///
    /// Never fatal: callers treat this as "try another way" (e.g. the FUSE
    /// client falls back to path-based I/O when handles are unsupported).
    #[error("not supported: {0}")]
    NotSupported(String),

    /// A bounded wait elapsed (pool acquire, remote call deadline).
    #[error("timed out: {0}")]
    Timeout(String),

    /// Malformed input: bad path, bad flags, invalid configuration.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Transport or storage failure underneath the operation.
    #[error("i/o error: {0}")]
    Io(String),
}

impl FsError {
    /// Convenience constructor for path-shaped `NotFound` errors.
    pub fn not_found(path: impl Into<String>) -> Self {
        Self::NotFound(path.into())
    }

    /// True when a caller may fall back to an alternative strategy.
    pub fn is_not_supported(&self) -> bool {
        matches!(self, Self::NotSupported(_))
    }

    /// True when retrying the same operation may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}

impl From<std::io::Error> for FsError {
    fn from(err: std::io::Error) -> Self {
        use std::io::ErrorKind;
        match err.kind() {
            ErrorKind::NotFound => Self::NotFound(err.to_string()),
            ErrorKind::PermissionDenied => Self::PermissionDenied(err.to_string()),
            ErrorKind::AlreadyExists => Self::AlreadyExists(err.to_string()),
            ErrorKind::TimedOut => Self::Timeout(err.to_string()),
            ErrorKind::InvalidInput | ErrorKind::InvalidData => {
                Self::InvalidArgument(err.to_string())
            }
            _ => Self::Io(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for FsError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidArgument(err.to_string())
    }
}
