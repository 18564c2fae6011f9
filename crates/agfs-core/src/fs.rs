//! The filesystem capability interface implemented by every plugin.
//!
//! A plugin exposes its storage through [`Filesystem`], a path-based surface
//! of ten operations. Backends that can maintain per-open state additionally
//! return stateful [`FileHandle`]s from [`Filesystem::open_handle`]; backends
//! that cannot simply inherit the default implementation, which reports
//! [`FsError::NotSupported`] so callers fall back to path-based I/O.
//!
//! [`Capabilities`] describes what a backend can actually do (random writes,
//! destructive reads, append-only logs, ...) so upper layers can adapt
//! without probing.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{FsError, FsResult};

/// Open-mode flags for [`Filesystem::open_handle`].
///
/// Values mirror the POSIX `O_*` constants on Linux so they pass through
/// FUSE unchanged.
pub mod open_flags {
    /// Open read-only.
    pub const RDONLY: u32 = 0o0;
    /// Open write-only.
    pub const WRONLY: u32 = 0o1;
    /// Open for reading and writing.
    pub const RDWR: u32 = 0o2;
    /// Create the file if it does not exist.
    pub const CREATE: u32 = 0o100;
    /// With `CREATE`, fail if the file already exists.
    pub const EXCL: u32 = 0o200;
    /// Truncate to zero length on open.
    pub const TRUNC: u32 = 0o1000;
    /// All writes go to the end of the file.
    pub const APPEND: u32 = 0o2000;

    /// Mask selecting the access mode bits.
    pub const ACCMODE: u32 = 0o3;
}

/// Behavior flags for [`Filesystem::write`].
pub mod write_flags {
    /// Append to the existing content; `offset` is ignored.
    pub const APPEND: u32 = 1 << 0;
    /// Create the file if it does not exist.
    pub const CREATE: u32 = 1 << 1;
    /// With `CREATE`, fail with `AlreadyExists` if the file exists.
    pub const EXCLUSIVE: u32 = 1 << 2;
    /// Discard existing content before writing.
    pub const TRUNCATE: u32 = 1 << 3;
    /// Flush to durable storage before returning.
    pub const SYNC: u32 = 1 << 4;
}

/// Origin for [`FileHandle::seek`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Whence {
    /// Offset is absolute.
    Start,
    /// Offset is relative to the current position.
    Current,
    /// Offset is relative to the end of the file.
    End,
}

impl Whence {
    /// Decodes the POSIX whence encoding (0/1/2).
    pub fn from_raw(raw: i32) -> FsResult<Self> {
        match raw {
            0 => Ok(Self::Start),
            1 => Ok(Self::Current),
            2 => Ok(Self::End),
            other => Err(FsError::InvalidArgument(format!("whence {other}"))),
        }
    }
}

/// Extensible metadata attached to a directory entry.
///
/// Plugins use this to surface backend-specific attributes (queue depth,
/// replication state, ...) without widening [`FileInfo`]. The `content` map
/// round-trips through JSON at the plugin boundaries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    /// Attribute-set name, e.g. `"queue"`.
    #[serde(default)]
    pub name: String,
    /// Attribute-set kind, e.g. `"stats"`.
    #[serde(default)]
    pub kind: String,
    /// Flat key/value attributes.
    #[serde(default)]
    pub content: BTreeMap<String, String>,
}

impl Metadata {
    /// True when no attributes are attached.
    pub fn is_empty(&self) -> bool {
        self.name.is_empty() && self.kind.is_empty() && self.content.is_empty()
    }
}

/// A single entry as returned by [`Filesystem::stat`] and
/// [`Filesystem::read_dir`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileInfo {
    /// Base name of the entry (no directory components).
    pub name: String,
    /// Size in bytes; `0` for directories and virtual entries.
    pub size: i64,
    /// Permission bits, POSIX-style.
    pub mode: u32,
    /// Modification time, seconds since the Unix epoch.
    pub mtime: i64,
    /// Whether the entry is a directory.
    pub is_dir: bool,
    /// Optional backend-specific attributes.
    #[serde(default, skip_serializing_if = "Metadata::is_empty")]
    pub meta: Metadata,
}

/// What a backend can do, declared up front.
///
/// Defaults describe the least capable backend (no random writes, no
/// handles); [`Capabilities::full_posix`] describes a conventional
/// disk-backed filesystem.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Capabilities {
    /// Writes at arbitrary offsets are honored.
    pub supports_random_write: bool,
    /// Truncation (via write flags or setattr) is honored.
    pub supports_truncate: bool,
    /// Sync/flush reaches durable storage.
    pub supports_sync: bool,
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
    /// All mutations are rejected.
    pub is_read_only: bool,
    /// Handles can be promoted to a continuous read stream.
    pub supports_stream_read: bool,
}

impl Capabilities {
    /// The conservative default: path-based I/O only.
    pub fn default_caps() -> Self {
        Self::default()
    }

    /// Capabilities of a conventional POSIX-style backend.
    pub fn full_posix() -> Self {
        Self {
            supports_random_write: true,
            supports_truncate: true,
            supports_sync: true,
            supports_file_handle: true,
            ..Self::default()
        }
    }
}

/// Plugin configuration: a JSON object of backend-specific settings.
pub type PluginConfig = serde_json::Map<String, serde_json::Value>;

/// Path-based filesystem surface implemented by every plugin backend.
///
/// Paths are absolute within the backend (`/` is the backend's root); the
/// mount table strips mount prefixes before calls arrive here. All methods
/// take `&self`: implementations are responsible for their own interior
/// synchronization.
pub trait Filesystem: Send + Sync {
    /// Creates an empty file. Fails with `AlreadyExists` if present.
    fn create(&self, path: &str) -> FsResult<()>;

    /// Creates a directory with the given permission bits.
    fn mkdir(&self, path: &str, mode: u32) -> FsResult<()>;

    /// Removes a file or an empty directory.
    fn remove(&self, path: &str) -> FsResult<()>;

    /// Removes a path and everything beneath it.
    fn remove_all(&self, path: &str) -> FsResult<()>;

    /// Reads up to `size` bytes starting at `offset`.
    ///
    /// `size == -1` reads to the end of the file. Reads past the end return
    /// an empty buffer, not an error.
    fn read(&self, path: &str, offset: i64, size: i64) -> FsResult<Vec<u8>>;

    /// Writes `data` at `offset`, honoring [`write_flags`]. Returns the
    /// number of bytes written.
    fn write(&self, path: &str, data: &[u8], offset: i64, flags: u32) -> FsResult<i64>;

    /// Lists the direct children of a directory.
    fn read_dir(&self, path: &str) -> FsResult<Vec<FileInfo>>;

    /// Returns metadata for a single entry.
    fn stat(&self, path: &str) -> FsResult<FileInfo>;

    /// Renames an entry. Both paths are within this backend.
    fn rename(&self, old_path: &str, new_path: &str) -> FsResult<()>;

    /// Changes permission bits.
    fn chmod(&self, path: &str, mode: u32) -> FsResult<()>;

    /// Opens a stateful handle on `path`.
    ///
    /// Backends without per-open state inherit this default, and callers
    /// fall back to the path-based operations.
    fn open_handle(&self, path: &str, flags: u32, mode: u32) -> FsResult<Box<dyn FileHandle>> {
        let _ = (flags, mode);
        Err(FsError::NotSupported(format!("open_handle: {path}")))
    }

    /// Declares what this backend can do.
    fn capabilities(&self) -> Capabilities {
        Capabilities::default_caps()
    }

    /// Per-path capability override; defaults to [`Self::capabilities`].
    ///
    /// Lets a backend expose e.g. a read-only control file inside an
    /// otherwise writable tree.
    fn path_capabilities(&self, path: &str) -> Capabilities {
        let _ = path;
        self.capabilities()
    }
}

/// A stateful open file: the handle owns the cursor position.
pub trait FileHandle: Send {
    /// Reads up to `size` bytes from the current position, advancing it.
    /// An empty result means end of file (or "no data yet" for streams).
    fn read(&mut self, size: usize) -> FsResult<Vec<u8>>;

    /// Writes at the current position, advancing it. Returns bytes written.
    fn write(&mut self, data: &[u8]) -> FsResult<i64>;

    /// Moves the cursor; returns the new absolute position.
    fn seek(&mut self, offset: i64, whence: Whence) -> FsResult<i64>;

    /// Flushes buffered writes to the backend.
    fn sync(&mut self) -> FsResult<()>;
}

/// Lifecycle surface of a mounted plugin.
///
/// The mount table calls `validate` then `initialize` when mounting and
/// `shutdown` when unmounting; between those, `filesystem` hands out the
/// backend all operations route to.
pub trait ServicePlugin: Send + Sync {
    /// Stable plugin name, used in logs and mount listings.
    fn name(&self) -> &str;

    /// Checks a configuration without applying it.
    fn validate(&self, config: &PluginConfig) -> FsResult<()>;

    /// Applies a configuration and makes the backend ready to serve.
    fn initialize(&self, config: &PluginConfig) -> FsResult<()>;

    /// The backend operations are routed to. Only valid after a successful
    /// `initialize`.
    fn filesystem(&self) -> Arc<dyn Filesystem>;

    /// Human-readable usage notes for the mount listing.
    fn readme(&self) -> String {
        String::new()
    }

    /// Releases backend resources. Called once, on unmount.
    fn shutdown(&self) -> FsResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_whence_decoding() {
        assert_eq!(Whence::from_raw(0).unwrap(), Whence::Start);
        assert_eq!(Whence::from_raw(1).unwrap(), Whence::Current);
        assert_eq!(Whence::from_raw(2).unwrap(), Whence::End);
        assert!(Whence::from_raw(3).is_err());
    }

    #[test]
    fn test_file_info_json_round_trip() {
        let info = FileInfo {
            name: "report.txt".into(),
            size: 42,
            mode: 0o644,
            mtime: 1_700_000_000,
            is_dir: false,
            meta: Metadata::default(),
        };
        let json = serde_json::to_string(&info).unwrap();
        // Empty metadata is elided from the wire form.
        assert!(!json.contains("meta"));
        let back: FileInfo = serde_json::from_str(&json).unwrap();
        assert_eq!(back, info);
    }

    #[test]
    fn test_metadata_survives_serialization() {
        let mut content = BTreeMap::new();
        content.insert("depth".to_string(), "3".to_string());
        let info = FileInfo {
            name: "jobs".into(),
            is_dir: true,
            meta: Metadata {
                name: "queue".into(),
                kind: "stats".into(),
                content,
            },
            ..FileInfo::default()
        };
        let json = serde_json::to_string(&info).unwrap();
        let back: FileInfo = serde_json::from_str(&json).unwrap();
        assert_eq!(back.meta.content["depth"], "3");
    }

    #[test]
    fn test_full_posix_capabilities() {
        let caps = Capabilities::full_posix();
        assert!(caps.supports_random_write);
        assert!(caps.supports_file_handle);
        assert!(!caps.is_read_destructive);
        assert!(!caps.is_read_only);
    }

    struct PathOnlyFs;

    impl Filesystem for PathOnlyFs {
        fn create(&self, _: &str) -> FsResult<()> {
            Ok(())
        }
        fn mkdir(&self, _: &str, _: u32) -> FsResult<()> {
            Ok(())
        }
        fn remove(&self, _: &str) -> FsResult<()> {
            Ok(())
        }
        fn remove_all(&self, _: &str) -> FsResult<()> {
            Ok(())
        }
        fn read(&self, _: &str, _: i64, _: i64) -> FsResult<Vec<u8>> {
            Ok(Vec::new())
        }
        fn write(&self, _: &str, data: &[u8], _: i64, _: u32) -> FsResult<i64> {
            Ok(data.len() as i64)
        }
        fn read_dir(&self, _: &str) -> FsResult<Vec<FileInfo>> {
            Ok(Vec::new())
        }
        fn stat(&self, _: &str) -> FsResult<FileInfo> {
            Ok(FileInfo::default())
        }
        fn rename(&self, _: &str, _: &str) -> FsResult<()> {
            Ok(())
        }
        fn chmod(&self, _: &str, _: u32) -> FsResult<()> {
            Ok(())
        }
    }

    #[test]
    fn test_open_handle_defaults_to_not_supported() {
        let fs = PathOnlyFs;
        let err = fs
            .open_handle("/f", open_flags::RDONLY, 0o644)
            .map(|_| ())
            .unwrap_err();
        assert!(err.is_not_supported());
        assert_eq!(fs.capabilities(), Capabilities::default_caps());
        assert_eq!(fs.path_capabilities("/f"), fs.capabilities());
    }
}
