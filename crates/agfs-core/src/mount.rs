//! Mount table: prefix-based routing of paths to plugin backends.
//!
//! Each mount binds a path prefix to a [`ServicePlugin`]. Lookup picks the
//! longest prefix that matches on whole segments: `/data` claims `/data` and
//! `/data/users/bob` but never `/dataset`. A mount at `/` acts as the
//! fallback for everything no longer prefix claims.

use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use crate::error::{FsError, FsResult};
use crate::fs::{PluginConfig, ServicePlugin};

/// A single prefix-to-plugin binding.
pub struct Mount {
    /// Normalized mount prefix (`/` or `/seg/...` without a trailing slash).
    pub prefix: String,
    /// The plugin serving this prefix.
    pub plugin: Arc<dyn ServicePlugin>,
    /// The configuration the plugin was initialized with.
    pub config: PluginConfig,
}

impl std::fmt::Debug for Mount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mount")
            .field("prefix", &self.prefix)
            .field("plugin", &self.plugin.name())
            .finish_non_exhaustive()
    }
}

/// Thread-safe registry of active mounts.
///
/// The mount set is small and read-dominated, so a `RwLock<Vec<_>>` with a
/// linear longest-prefix scan is the right shape; there is no trie to keep
/// consistent.
#[derive(Default)]
pub struct MountTable {
    mounts: RwLock<Vec<Arc<Mount>>>,
}

/// Collapses a user-supplied prefix into canonical form.
///
/// Canonical prefixes start with `/`, contain no empty or `.`/`..`
/// segments, and carry no trailing slash (except the root itself).
pub fn normalize_prefix(prefix: &str) -> FsResult<String> {
    if !prefix.starts_with('/') {
        return Err(FsError::InvalidArgument(format!(
            "mount prefix must be absolute: {prefix}"
        )));
    }
    let mut out = String::from("/");
    for segment in prefix.split('/') {
        if segment.is_empty() || segment == "." {
            continue;
        }
        if segment == ".." {
            return Err(FsError::InvalidArgument(format!(
                "mount prefix must not contain '..': {prefix}"
            )));
        }
        if !out.ends_with('/') {
            out.push('/');
        }
        out.push_str(segment);
    }
    Ok(out)
}

impl MountTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `prefix` to `plugin`.
    ///
    /// Fails with `AlreadyExists` when the exact prefix is already bound.
    /// Overlapping prefixes (e.g. `/` and `/data`) are allowed; lookup
    /// disambiguates by longest match.
    pub fn mount(
        &self,
        prefix: &str,
        plugin: Arc<dyn ServicePlugin>,
        config: PluginConfig,
    ) -> FsResult<()> {
        let prefix = normalize_prefix(prefix)?;
        let mut mounts = self.mounts.write();
        if mounts.iter().any(|m| m.prefix == prefix) {
            return Err(FsError::AlreadyExists(format!("mount {prefix}")));
        }
        debug!(prefix = %prefix, plugin = plugin.name(), "mounting");
        mounts.push(Arc::new(Mount {
            prefix,
            plugin,
            config,
        }));
        Ok(())
    }

    /// Removes the binding for `prefix`, returning it so the caller can shut
    /// the plugin down outside the lock.
    pub fn unmount(&self, prefix: &str) -> FsResult<Arc<Mount>> {
        let prefix = normalize_prefix(prefix)?;
        let mut mounts = self.mounts.write();
        let pos = mounts
            .iter()
            .position(|m| m.prefix == prefix)
            .ok_or_else(|| FsError::NotFound(format!("mount {prefix}")))?;
        debug!(prefix = %prefix, "unmounting");
        Ok(mounts.swap_remove(pos))
    }

    /// Routes `path` to the mount with the longest segment-exact prefix.
    ///
    /// Returns the mount and the path relative to it (always absolute,
    /// minimum `/`). `None` when no mount claims the path.
    pub fn find_mount(&self, path: &str) -> Option<(Arc<Mount>, String)> {
        let mounts = self.mounts.read();
        let mut best: Option<&Arc<Mount>> = None;
        for mount in mounts.iter() {
            if !prefix_claims(&mount.prefix, path) {
                continue;
            }
            match best {
                Some(b) if b.prefix.len() >= mount.prefix.len() => {}
                _ => best = Some(mount),
            }
        }
        let mount = best?;
        let rel = if mount.prefix == "/" {
            path.to_string()
        } else {
            let rest = &path[mount.prefix.len()..];
            if rest.is_empty() {
                "/".to_string()
            } else {
                rest.to_string()
            }
        };
        Some((Arc::clone(mount), rel))
    }

    /// Snapshot of the current mounts, for listings.
    pub fn mounts(&self) -> Vec<Arc<Mount>> {
        self.mounts.read().clone()
    }

    /// Number of active mounts.
    pub fn len(&self) -> usize {
        self.mounts.read().len()
    }

    /// True when nothing is mounted.
    pub fn is_empty(&self) -> bool {
        self.mounts.read().is_empty()
    }
}

/// Segment-exact prefix test: the boundary after the prefix must be the end
/// of the path or a `/`.
fn prefix_claims(prefix: &str, path: &str) -> bool {
    if prefix == "/" {
        return path.starts_with('/');
    }
    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}
