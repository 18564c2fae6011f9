//! Remote server contract for the FUSE frontend.
//!
//! The FUSE layer talks to an AGFS server through [`RemoteClient`]. The
//! concrete transport lives elsewhere; everything here is expressed in the
//! shared [`agfs_core`] vocabulary so the frontend stays transport-agnostic.
//! Tests drive the same trait with an in-memory fake.

use std::io;

use agfs_core::{FileInfo, FsError, FsResult, Whence};

/// Server-declared capabilities the frontend adapts to.
///
/// A subset of [`agfs_core::Capabilities`] covering the traits that change
/// how FUSE requests are serviced: whether stateful handles exist, whether
/// reads consume data, and whether handles can be promoted to a stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServerCaps {
    /// Writes at arbitrary offsets are honored.
    pub supports_random_write: bool,
    /// `open_handle` returns working stateful handles.
    pub supports_file_handle: bool,
    /// Every write lands at the end regardless of offset.
    pub is_append_only: bool,
    /// Reading consumes the data (queues, pipes).
    pub is_read_destructive: bool,
    /// Flat object namespace; directories are synthetic.
    pub is_object_store: bool,
    /// Writes fan out to all readers.
    pub is_broadcast: bool,
    /// Handles can be promoted to a continuous read stream.
    pub supports_stream_read: bool,
}

impl ServerCaps {
    /// Capabilities of a conventional disk-backed server.
    pub fn posix() -> Self {
        Self {
            supports_random_write: true,
            supports_file_handle: true,
            ..Self::default()
        }
    }
}

/// A blocking, continuous read stream over an open server handle.
///
/// Semantics follow [`io::Read`]: `Ok(0)` means end of stream, and a call
/// may block until the server produces data.
pub trait StreamReader: Send {
    /// Reads up to `buf.len()` bytes into `buf`.
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;
}

/// Client side of the AGFS server protocol.
///
/// Path operations mirror [`agfs_core::Filesystem`]; handle operations mirror
/// [`agfs_core::FileHandle`] keyed by the server-issued `i64` handle id. The
/// handle family has `NotSupported` defaults so a path-only transport
/// implements nothing extra and the frontend falls back to stateless I/O.
pub trait RemoteClient: Send + Sync + 'static {
    /// Queries the server's capability declaration.
    fn capabilities(&self) -> FsResult<ServerCaps>;

    /// Reads `size` bytes at `offset`; `size == -1` reads to the end.
    fn read(&self, path: &str, offset: i64, size: i64) -> FsResult<Vec<u8>>;

    /// Writes `data` at `offset` with [`agfs_core::write_flags`] semantics,
    /// returning the number of bytes written.
    fn write(&self, path: &str, data: &[u8], offset: i64, flags: u32) -> FsResult<i64>;

    /// Stats a single path.
    fn stat(&self, path: &str) -> FsResult<FileInfo>;

    /// Lists the direct children of a directory.
    fn read_dir(&self, path: &str) -> FsResult<Vec<FileInfo>>;

    /// Creates an empty file.
    fn create(&self, path: &str) -> FsResult<()>;

    /// Creates a directory with the given permission bits.
    fn mkdir(&self, path: &str, mode: u32) -> FsResult<()>;

    /// Removes a file or empty directory.
    fn remove(&self, path: &str) -> FsResult<()>;

    /// Removes a path and everything beneath it.
    fn remove_all(&self, path: &str) -> FsResult<()>;

    /// Renames `from` to `to`.
    fn rename(&self, from: &str, to: &str) -> FsResult<()>;

    /// Changes permission bits.
    fn chmod(&self, path: &str, mode: u32) -> FsResult<()>;

    /// Opens a stateful server handle with [`agfs_core::open_flags`].
    fn open_handle(&self, path: &str, flags: u32) -> FsResult<i64> {
        let _ = (path, flags);
        Err(FsError::NotSupported("server does not issue file handles".into()))
    }

    /// Reads up to `size` bytes from the handle's current position.
    fn read_handle(&self, handle: i64, size: i64) -> FsResult<Vec<u8>> {
        let _ = (handle, size);
        Err(FsError::NotSupported("server does not issue file handles".into()))
    }

    /// Writes at the handle's current position, returning bytes written.
    fn write_handle(&self, handle: i64, data: &[u8]) -> FsResult<i64> {
        let _ = (handle, data);
        Err(FsError::NotSupported("server does not issue file handles".into()))
    }

    /// Repositions the handle, returning the new absolute offset.
    fn seek_handle(&self, handle: i64, offset: i64, whence: Whence) -> FsResult<i64> {
        let _ = (handle, offset, whence);
        Err(FsError::NotSupported("server does not issue file handles".into()))
    }

    /// Flushes buffered handle writes to the backend.
    fn sync_handle(&self, handle: i64) -> FsResult<()> {
        let _ = handle;
        Err(FsError::NotSupported("server does not issue file handles".into()))
    }

    /// Closes a server handle.
    fn close_handle(&self, handle: i64) -> FsResult<()> {
        let _ = handle;
        Err(FsError::NotSupported("server does not issue file handles".into()))
    }

    /// Promotes an open handle to a continuous read stream.
    fn open_stream(&self, handle: i64) -> FsResult<Box<dyn StreamReader>> {
        let _ = handle;
        Err(FsError::NotSupported("server does not stream reads".into()))
    }
}
