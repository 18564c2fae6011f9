//! The mountable filesystem: one namespace, many plugin backends.
//!
//! [`MountableFs`] glues the mount table and the handle registry together.
//! Every path operation resolves its target mount, strips the prefix, and
//! delegates to that plugin's [`Filesystem`]; handle operations go through
//! the process-wide registry so IDs stay unique across mounts.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::error::{FsError, FsResult};
use crate::fs::{Capabilities, FileHandle, FileInfo, Filesystem, PluginConfig, ServicePlugin};
use crate::handles::{HandleRegistry, RegisteredHandle};
use crate::mount::{Mount, MountTable};

/// Virtual filesystem composed of prefix-mounted plugins.
pub struct MountableFs {
    table: MountTable,
    handles: HandleRegistry,
}

impl Default for MountableFs {
    fn default() -> Self {
        Self::new()
    }
}

impl MountableFs {
    /// Creates an empty namespace with default handle leases.
    pub fn new() -> Self {
        Self {
            table: MountTable::new(),
            handles: HandleRegistry::new(),
        }
    }

    /// Creates a namespace with a custom handle lease duration.
    pub fn with_lease_ttl(lease_ttl: Duration) -> Self {
        Self {
            table: MountTable::new(),
            handles: HandleRegistry::with_lease_ttl(lease_ttl),
        }
    }

    /// Validates, initializes, and mounts a plugin at `prefix`.
    pub fn mount(
        &self,
        prefix: &str,
        plugin: Arc<dyn ServicePlugin>,
        config: PluginConfig,
    ) -> FsResult<()> {
        plugin.validate(&config)?;
        plugin.initialize(&config)?;
        self.table.mount(prefix, Arc::clone(&plugin), config)?;
        info!(prefix, plugin = plugin.name(), "mounted");
        Ok(())
    }

    /// Unmounts `prefix` and shuts the plugin down.
    pub fn unmount(&self, prefix: &str) -> FsResult<()> {
        let mount = self.table.unmount(prefix)?;
        mount.plugin.shutdown()?;
        info!(prefix, plugin = mount.plugin.name(), "unmounted");
        Ok(())
    }

    /// Lists the active mounts.
    pub fn mounts(&self) -> Vec<Arc<Mount>> {
        self.table.mounts()
    }

    /// Resolves `path` to its serving backend and mount-relative path.
    fn resolve(&self, path: &str) -> FsResult<(Arc<Mount>, Arc<dyn Filesystem>, String)> {
        let (mount, rel) = self
            .table
            .find_mount(path)
            .ok_or_else(|| FsError::not_found(path))?;
        let fs = mount.plugin.filesystem();
        Ok((mount, fs, rel))
    }

    /// Capabilities of the backend serving `path`, or `NotFound` when no
    /// mount claims it.
    pub fn path_capabilities(&self, path: &str) -> FsResult<Capabilities> {
        let (_, fs, rel) = self.resolve(path)?;
        Ok(fs.path_capabilities(&rel))
    }

    /// Opens a stateful handle on `path` and registers it, returning the
    /// process-wide handle ID.
    pub fn open_handle(&self, path: &str, flags: u32, mode: u32) -> FsResult<i64> {
        let (mount, fs, rel) = self.resolve(path)?;
        let handle = fs.open_handle(&rel, flags, mode)?;
        let id = self.handles.register(path, mount.prefix.clone(), handle);
        debug!(id, path, "opened handle");
        Ok(id)
    }

    /// Looks up a live handle by ID.
    pub fn get_handle(&self, id: i64) -> FsResult<Arc<RegisteredHandle>> {
        self.handles.get(id)
    }

    /// Reads from a handle's cursor.
    pub fn read_handle(&self, id: i64, size: usize) -> FsResult<Vec<u8>> {
        self.handles.get(id)?.read(size)
    }

    /// Writes at a handle's cursor.
    pub fn write_handle(&self, id: i64, data: &[u8]) -> FsResult<i64> {
        self.handles.get(id)?.write(data)
    }

    /// Moves a handle's cursor.
    pub fn seek_handle(&self, id: i64, offset: i64, whence: crate::fs::Whence) -> FsResult<i64> {
        self.handles.get(id)?.seek(offset, whence)
    }

    /// Flushes a handle's buffered writes.
    pub fn sync_handle(&self, id: i64) -> FsResult<()> {
        self.handles.get(id)?.sync()
    }

    /// Closes a handle; its ID is retired permanently.
    pub fn close_handle(&self, id: i64) -> FsResult<()> {
        self.handles.close(id)
    }

    /// Retires handles whose lease lapsed before `now`.
    pub fn expire_handle_leases(&self, now: Instant) -> Vec<i64> {
        self.handles.expire_leases(now)
    }

    /// Number of live handles across all mounts.
    pub fn open_handle_count(&self) -> usize {
        self.handles.len()
    }
}

impl Filesystem for MountableFs {
    fn create(&self, path: &str) -> FsResult<()> {
        let (_, fs, rel) = self.resolve(path)?;
        fs.create(&rel)
    }

    fn mkdir(&self, path: &str, mode: u32) -> FsResult<()> {
        let (_, fs, rel) = self.resolve(path)?;
        fs.mkdir(&rel, mode)
    }

    fn remove(&self, path: &str) -> FsResult<()> {
        let (_, fs, rel) = self.resolve(path)?;
        fs.remove(&rel)
    }

    fn remove_all(&self, path: &str) -> FsResult<()> {
        let (_, fs, rel) = self.resolve(path)?;
        fs.remove_all(&rel)
    }

    fn read(&self, path: &str, offset: i64, size: i64) -> FsResult<Vec<u8>> {
        let (_, fs, rel) = self.resolve(path)?;
        fs.read(&rel, offset, size)
    }

    fn write(&self, path: &str, data: &[u8], offset: i64, flags: u32) -> FsResult<i64> {
        let (_, fs, rel) = self.resolve(path)?;
        fs.write(&rel, data, offset, flags)
    }

    fn read_dir(&self, path: &str) -> FsResult<Vec<FileInfo>> {
        let (_, fs, rel) = self.resolve(path)?;
        fs.read_dir(&rel)
    }

    fn stat(&self, path: &str) -> FsResult<FileInfo> {
        let (_, fs, rel) = self.resolve(path)?;
        fs.stat(&rel)
    }

    fn rename(&self, old_path: &str, new_path: &str) -> FsResult<()> {
        let (old_mount, fs, old_rel) = self.resolve(old_path)?;
        let (new_mount, _, new_rel) = self.resolve(new_path)?;
        if old_mount.prefix != new_mount.prefix {
            return Err(FsError::NotSupported(format!(
                "rename across mounts: {} -> {}",
                old_mount.prefix, new_mount.prefix
            )));
        }
        fs.rename(&old_rel, &new_rel)
    }

    fn chmod(&self, path: &str, mode: u32) -> FsResult<()> {
        let (_, fs, rel) = self.resolve(path)?;
        fs.chmod(&rel, mode)
    }

    fn open_handle(&self, path: &str, flags: u32, mode: u32) -> FsResult<Box<dyn FileHandle>> {
        let (_, fs, rel) = self.resolve(path)?;
        fs.open_handle(&rel, flags, mode)
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::default_caps()
    }

    fn path_capabilities(&self, path: &str) -> Capabilities {
        MountableFs::path_capabilities(self, path).unwrap_or_else(|_| Capabilities::default_caps())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::{Whence, open_flags, write_flags};
    use crate::testing::MemPlugin;

    fn mounted() -> (MountableFs, Arc<MemPlugin>, Arc<MemPlugin>) {
        let vfs = MountableFs::new();
        let fs1 = Arc::new(MemPlugin::new("fs1"));
        let fs2 = Arc::new(MemPlugin::new("fs2"));
        vfs.mount("/mnt/fs1", fs1.clone(), PluginConfig::new())
            .unwrap();
        vfs.mount("/mnt/fs2", fs2.clone(), PluginConfig::new())
            .unwrap();
        (vfs, fs1, fs2)
    }

    #[test]
    fn test_two_mounts_are_isolated() {
        let (vfs, _, _) = mounted();

        vfs.write(
            "/mnt/fs1/file.txt",
            b"data from fs1",
            0,
            write_flags::CREATE,
        )
        .unwrap();
        vfs.write(
            "/mnt/fs2/file.txt",
            b"data from fs2",
            0,
            write_flags::CREATE,
        )
        .unwrap();

        assert_eq!(vfs.read("/mnt/fs1/file.txt", 0, -1).unwrap(), b"data from fs1");
        assert_eq!(vfs.read("/mnt/fs2/file.txt", 0, -1).unwrap(), b"data from fs2");
    }

    #[test]
    fn test_unrouted_path_is_not_found() {
        let (vfs, _, _) = mounted();
        assert!(matches!(
            vfs.read("/elsewhere/file", 0, -1),
            Err(FsError::NotFound(_))
        ));
    }

    #[test]
    fn test_handle_ids_unique_across_mounts() {
        let (vfs, _, _) = mounted();
        vfs.create("/mnt/fs1/a").unwrap();
        vfs.create("/mnt/fs2/b").unwrap();

        let h1 = vfs.open_handle("/mnt/fs1/a", open_flags::RDWR, 0o644).unwrap();
        let h2 = vfs.open_handle("/mnt/fs2/b", open_flags::RDWR, 0o644).unwrap();
        assert_ne!(h1, h2);
        assert!(h2 > h1);

        vfs.write_handle(h1, b"one").unwrap();
        vfs.seek_handle(h1, 0, Whence::Start).unwrap();
        assert_eq!(vfs.read_handle(h1, 16).unwrap(), b"one");

        vfs.close_handle(h1).unwrap();
        assert!(vfs.read_handle(h1, 16).is_err());

        // The other mount's handle is untouched by the close.
        vfs.write_handle(h2, b"two").unwrap();
        vfs.close_handle(h2).unwrap();
    }

    #[test]
    fn test_rename_within_and_across_mounts() {
        let (vfs, _, _) = mounted();
        vfs.create("/mnt/fs1/old").unwrap();
        vfs.rename("/mnt/fs1/old", "/mnt/fs1/new").unwrap();
        assert!(vfs.stat("/mnt/fs1/new").is_ok());
        assert!(vfs.stat("/mnt/fs1/old").is_err());

        vfs.create("/mnt/fs1/stuck").unwrap();
        let err = vfs.rename("/mnt/fs1/stuck", "/mnt/fs2/moved").unwrap_err();
        assert!(err.is_not_supported());
    }

    #[test]
    fn test_unmount_shuts_plugin_down() {
        let (vfs, fs1, _) = mounted();
        assert!(!fs1.is_shut_down());
        vfs.unmount("/mnt/fs1").unwrap();
        assert!(fs1.is_shut_down());
        assert!(vfs.stat("/mnt/fs1").is_err());
    }

    #[test]
    fn test_directory_listing_routes_to_mount() {
        let (vfs, _, _) = mounted();
        vfs.mkdir("/mnt/fs1/docs", 0o755).unwrap();
        vfs.create("/mnt/fs1/docs/a.txt").unwrap();
        vfs.create("/mnt/fs1/docs/b.txt").unwrap();

        let entries = vfs.read_dir("/mnt/fs1/docs").unwrap();
        let mut names: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
        names.sort_unstable();
        assert_eq!(names, vec!["a.txt", "b.txt"]);
    }
}
