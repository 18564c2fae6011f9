//! Errno mapping for FUSE replies.
//!
//! The kernel speaks errno; the server speaks [`FsError`]. Every FUSE
//! operation funnels its failure through [`ToErrno`] before replying.

use std::io;

use agfs_core::FsError;

/// Converts an [`FsError`] to a libc error code.
pub fn fs_error_to_errno(e: &FsError) -> i32 {
    match e {
        FsError::NotFound(_) => libc::ENOENT,
        FsError::PermissionDenied(_) => libc::EACCES,
        FsError::AlreadyExists(_) => libc::EEXIST,
        FsError::NotSupported(_) => libc::ENOTSUP,
        FsError::Timeout(_) => libc::ETIMEDOUT,
        FsError::InvalidArgument(_) => libc::EINVAL,
        FsError::Io(_) => libc::EIO,
    }
}

/// Converts an IO error to a libc error code.
pub fn io_error_to_errno(e: &io::Error) -> i32 {
    e.raw_os_error().unwrap_or(libc::EIO)
}

/// Extension trait to convert errors to errno.
pub trait ToErrno {
    /// Converts this error to a libc error code.
    fn to_errno(&self) -> i32;
}

impl ToErrno for FsError {
    fn to_errno(&self) -> i32 {
        fs_error_to_errno(self)
    }
}

impl ToErrno for io::Error {
    fn to_errno(&self) -> i32 {
        io_error_to_errno(self)
    }
}
