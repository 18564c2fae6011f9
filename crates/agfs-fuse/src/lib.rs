//! FUSE frontend for AGFS.
//!
//! Mounts a remote AGFS server as a local filesystem. The kernel's
//! offset-based, stateless view is reconciled with whatever the server
//! actually supports: stateful handles where the server issues them,
//! promoted read streams where it can, and a fetch-once local buffer where
//! it offers neither, so even destructive backends (queues) behave sanely
//! under `cat`.
//!
//! ```no_run
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! use agfs_fuse::{AgfsFuse, MountConfig, RemoteClient};
//!
//! fn mount(client: Arc<impl RemoteClient>) -> std::io::Result<()> {
//!     AgfsFuse::new(client, &MountConfig::default()).mount(Path::new("/mnt/agfs"), &[])
//! }
//! ```

#![warn(missing_docs)]

pub mod cache;
pub mod client;
pub mod config;
pub mod error;
mod filesystem;
mod handles;
mod inode;
#[cfg(test)]
mod testclient;

pub use cache::{AttrCache, DirCache, TtlCache};
pub use client::{RemoteClient, ServerCaps, StreamReader};
pub use config::MountConfig;
pub use error::{ToErrno, fs_error_to_errno};
pub use filesystem::AgfsFuse;
pub use handles::{HandleManager, STREAM_REREAD_MARGIN, STREAM_WINDOW_CAP};
pub use inode::{InodeEntry, InodeTable, ROOT_INODE};
