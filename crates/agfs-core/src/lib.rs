//! Core runtime for AGFS, a pluggable virtual filesystem.
//!
//! Storage backends plug in as [`ServicePlugin`]s exposing the
//! [`Filesystem`] capability surface. This crate provides the pieces that
//! compose them into one namespace:
//!
//! - [`MountTable`] - longest-prefix routing of paths to mounted plugins
//! - [`HandleRegistry`] - process-wide stateful file handles with leases
//! - [`MountableFs`] - the facade tying routing and handles together
//! - [`FsError`] - the shared error taxonomy every layer speaks
//!
//! Plugin bridging (native shared libraries, WASM modules) lives in
//! `agfs-plugin-host`; the POSIX client lives in `agfs-fuse`.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use agfs_core::{Filesystem, MountableFs, PluginConfig, write_flags};
//! use agfs_core::testing::MemPlugin;
//!
//! let vfs = MountableFs::new();
//! vfs.mount("/data", Arc::new(MemPlugin::new("mem")), PluginConfig::new())?;
//! vfs.write("/data/hello.txt", b"hi", 0, write_flags::CREATE)?;
//! assert_eq!(vfs.read("/data/hello.txt", 0, -1)?, b"hi");
//! # Ok::<(), agfs_core::FsError>(())
//! ```

#![warn(missing_docs)]

mod error;
mod fs;
mod handles;
mod mount;
mod vfs;

/// In-memory backend for tests.
pub mod testing;

pub use error::{FsError, FsResult};
pub use fs::{
    Capabilities, FileHandle, FileInfo, Filesystem, Metadata, PluginConfig, ServicePlugin, Whence,
    open_flags, write_flags,
};
pub use handles::{DEFAULT_LEASE_TTL, HandleRegistry, RegisteredHandle};
pub use mount::{Mount, MountTable, normalize_prefix};
pub use vfs::MountableFs;
