//! fuser bridge: translates kernel requests into [`RemoteClient`] calls.
//!
//! Each inode maps to an absolute server path through the [`InodeTable`].
//! Metadata requests go through the TTL caches; every mutation invalidates
//! the touched path's attributes and the parent's listing before replying,
//! so the kernel never re-reads stale entries from us.

use std::ffi::OsStr;
use std::io;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use fuser::{
    FileAttr, FileType, KernelConfig, MountOption, ReplyAttr, ReplyCreate, ReplyData,
    ReplyDirectory, ReplyEmpty, ReplyEntry, ReplyOpen, ReplyStatfs, ReplyWrite, Request,
    TimeOrNow,
};
use libc::c_int;
use tracing::{debug, info, trace, warn};

use agfs_core::{FileInfo, FsError, FsResult};

use crate::cache::{AttrCache, DirCache};
use crate::client::RemoteClient;
use crate::config::MountConfig;
use crate::error::ToErrno;
use crate::handles::HandleManager;
use crate::inode::{InodeTable, ROOT_INODE};

/// Block size reported in attributes and statfs.
const BLOCK_SIZE: u32 = 4096;

/// Default file permissions when the server reports none.
const DEFAULT_FILE_PERM: u16 = 0o644;

/// Default directory permissions when the server reports none.
const DEFAULT_DIR_PERM: u16 = 0o755;

fn child_path(parent: &str, name: &str) -> String {
    if parent == "/" {
        format!("/{name}")
    } else {
        format!("{parent}/{name}")
    }
}

fn parent_of(path: &str) -> &str {
    match path.rfind('/') {
        Some(0) | None => "/",
        Some(idx) => &path[..idx],
    }
}

/// FUSE filesystem backed by a remote AGFS server.
pub struct AgfsFuse<C: RemoteClient> {
    client: Arc<C>,
    inodes: InodeTable,
    attr_cache: AttrCache,
    dir_cache: DirCache,
    handles: HandleManager<C>,
    attr_ttl: Duration,
    uid: u32,
    gid: u32,
    max_write: u32,
}

impl<C: RemoteClient> AgfsFuse<C> {
    /// Creates a filesystem over `client`, owned by the current user.
    pub fn new(client: Arc<C>, config: &MountConfig) -> Self {
        let uid = unsafe { libc::getuid() };
        let gid = unsafe { libc::getgid() };
        info!(uid, gid, "AGFS FUSE frontend initialized");
        Self {
            handles: HandleManager::new(Arc::clone(&client), config.stream_window),
            client,
            inodes: InodeTable::new(),
            attr_cache: AttrCache::new(config.attr_ttl),
            dir_cache: DirCache::new(config.dir_ttl),
            attr_ttl: config.attr_ttl,
            uid,
            gid,
            max_write: config.max_write,
        }
    }

    /// Mounts the filesystem and blocks until it is unmounted.
    pub fn mount(self, mountpoint: &Path, options: &[MountOption]) -> io::Result<()> {
        fuser::mount2(self, mountpoint, options)
    }

    fn make_attr(&self, ino: u64, info: &FileInfo) -> FileAttr {
        let mtime = UNIX_EPOCH + Duration::from_secs(info.mtime.max(0) as u64);
        let perm = if info.mode & 0o7777 == 0 {
            if info.is_dir { DEFAULT_DIR_PERM } else { DEFAULT_FILE_PERM }
        } else {
            (info.mode & 0o7777) as u16
        };
        let size = info.size.max(0) as u64;
        FileAttr {
            ino,
            size,
            blocks: size.div_ceil(u64::from(BLOCK_SIZE)),
            atime: mtime,
            mtime,
            ctime: mtime,
            crtime: mtime,
            kind: if info.is_dir {
                FileType::Directory
            } else {
                FileType::RegularFile
            },
            perm,
            nlink: if info.is_dir { 2 } else { 1 },
            uid: self.uid,
            gid: self.gid,
            rdev: 0,
            blksize: BLOCK_SIZE,
            flags: 0,
        }
    }

    fn stat_path(&self, path: &str) -> FsResult<FileInfo> {
        if let Some(info) = self.attr_cache.get(path) {
            return Ok(info);
        }
        let info = self.client.stat(path)?;
        self.attr_cache.set(path, info.clone());
        Ok(info)
    }

    fn list_dir(&self, path: &str) -> FsResult<Vec<FileInfo>> {
        if let Some(entries) = self.dir_cache.get(path) {
            return Ok(entries);
        }
        let entries = self.client.read_dir(path)?;
        self.dir_cache.set(path, entries.clone());
        Ok(entries)
    }

    fn path_of(&self, ino: u64) -> FsResult<String> {
        self.inodes
            .path_of(ino)
            .ok_or_else(|| FsError::not_found(format!("inode {ino}")))
    }

    /// Drops cached state for a mutated path: its own attributes and
    /// listing (subtree included) plus the parent's listing.
    fn invalidate_entry(&self, path: &str) {
        self.attr_cache.invalidate_prefix(path);
        self.dir_cache.invalidate_prefix(path);
        self.dir_cache.invalidate(parent_of(path));
    }

    fn do_lookup(&self, parent: u64, name: &str) -> FsResult<(u64, FileAttr)> {
        let parent_path = self.path_of(parent)?;
        let path = child_path(&parent_path, name);
        let info = self.stat_path(&path)?;
        let ino = self.inodes.get_or_insert(&path);
        Ok((ino, self.make_attr(ino, &info)))
    }

    fn do_getattr(&self, ino: u64) -> FsResult<FileAttr> {
        let path = self.path_of(ino)?;
        let info = self.stat_path(&path)?;
        Ok(self.make_attr(ino, &info))
    }

    fn do_readdir(&self, ino: u64) -> FsResult<Vec<(u64, FileType, String)>> {
        let path = self.path_of(ino)?;
        let entries = self.list_dir(&path)?;
        Ok(entries
            .into_iter()
            .map(|info| {
                let child = child_path(&path, &info.name);
                let child_ino = self.inodes.get_or_insert(&child);
                let kind = if info.is_dir {
                    FileType::Directory
                } else {
                    FileType::RegularFile
                };
                (child_ino, kind, info.name)
            })
            .collect())
    }

    fn do_create(&self, parent: u64, name: &str, flags: i32) -> FsResult<(u64, FileAttr, u64)> {
        let parent_path = self.path_of(parent)?;
        let path = child_path(&parent_path, name);
        self.client.create(&path)?;
        self.invalidate_entry(&path);
        let fh = self.handles.open(&path, flags as u32)?;
        let info = self.stat_path(&path)?;
        let ino = self.inodes.get_or_insert(&path);
        Ok((ino, self.make_attr(ino, &info), fh))
    }

    fn do_mkdir(&self, parent: u64, name: &str, mode: u32) -> FsResult<(u64, FileAttr)> {
        let parent_path = self.path_of(parent)?;
        let path = child_path(&parent_path, name);
        self.client.mkdir(&path, mode)?;
        self.invalidate_entry(&path);
        let info = self.stat_path(&path)?;
        let ino = self.inodes.get_or_insert(&path);
        Ok((ino, self.make_attr(ino, &info)))
    }

    fn do_remove(&self, parent: u64, name: &str) -> FsResult<()> {
        let parent_path = self.path_of(parent)?;
        let path = child_path(&parent_path, name);
        self.client.remove(&path)?;
        self.invalidate_entry(&path);
        self.inodes.invalidate_path(&path);
        Ok(())
    }

    fn do_rename(&self, parent: u64, name: &str, newparent: u64, newname: &str) -> FsResult<()> {
        let old_path = child_path(&self.path_of(parent)?, name);
        let new_path = child_path(&self.path_of(newparent)?, newname);
        self.client.rename(&old_path, &new_path)?;
        self.inodes.rename(&old_path, &new_path);
        self.invalidate_entry(&old_path);
        self.invalidate_entry(&new_path);
        Ok(())
    }

    fn do_open(&self, ino: u64, flags: i32) -> Result<u64, c_int> {
        let path = self.path_of(ino).map_err(|e| e.to_errno())?;
        match self.stat_path(&path) {
            Ok(info) if info.is_dir => return Err(libc::EISDIR),
            Ok(_) => {}
            Err(e) => return Err(e.to_errno()),
        }
        self.handles.open(&path, flags as u32).map_err(|e| e.to_errno())
    }

    fn do_write(&self, fh: u64, offset: i64, data: &[u8]) -> FsResult<i64> {
        let written = self.handles.write(fh, offset, data)?;
        if let Some(path) = self.handles.path_of(fh) {
            self.attr_cache.invalidate(&path);
            self.dir_cache.invalidate(parent_of(&path));
        }
        Ok(written)
    }

    fn do_setattr(&self, ino: u64, mode: Option<u32>) -> FsResult<FileAttr> {
        let path = self.path_of(ino)?;
        if let Some(mode) = mode {
            self.client.chmod(&path, mode & 0o7777)?;
            self.attr_cache.invalidate(&path);
            self.dir_cache.invalidate(parent_of(&path));
        }
        let info = self.stat_path(&path)?;
        Ok(self.make_attr(ino, &info))
    }

    /// Flush/fsync both funnel here; servers without durable sync report
    /// `NotSupported`, which is not an error worth surfacing to the kernel.
    fn sync_handle(&self, fh: u64) -> Result<(), c_int> {
        match self.handles.sync(fh) {
            Ok(()) => Ok(()),
            Err(e) if e.is_not_supported() => Ok(()),
            Err(e) => Err(e.to_errno()),
        }
    }
}

impl<C: RemoteClient> fuser::Filesystem for AgfsFuse<C> {
    fn init(&mut self, _req: &Request<'_>, config: &mut KernelConfig) -> Result<(), c_int> {
        let _ = config.set_max_write(self.max_write);
        info!("FUSE session started");
        Ok(())
    }

    fn destroy(&mut self) {
        self.handles.close_all();
        self.attr_cache.clear();
        self.dir_cache.clear();
        info!("FUSE session ended");
    }

    fn lookup(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEntry) {
        let Some(name) = name.to_str() else {
            reply.error(libc::EINVAL);
            return;
        };
        trace!(parent, name, "lookup");
        match self.do_lookup(parent, name) {
            Ok((_ino, attr)) => reply.entry(&self.attr_ttl, &attr, 0),
            Err(e) => reply.error(e.to_errno()),
        }
    }

    fn forget(&mut self, _req: &Request<'_>, ino: u64, nlookup: u64) {
        trace!(ino, nlookup, "forget");
        self.inodes.forget(ino, nlookup);
    }

    fn getattr(&mut self, _req: &Request<'_>, ino: u64, _fh: Option<u64>, reply: ReplyAttr) {
        trace!(ino, "getattr");
        match self.do_getattr(ino) {
            Ok(attr) => reply.attr(&self.attr_ttl, &attr),
            Err(e) => reply.error(e.to_errno()),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn setattr(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        mode: Option<u32>,
        _uid: Option<u32>,
        _gid: Option<u32>,
        size: Option<u64>,
        _atime: Option<TimeOrNow>,
        _mtime: Option<TimeOrNow>,
        _ctime: Option<SystemTime>,
        _fh: Option<u64>,
        _crtime: Option<SystemTime>,
        _chgtime: Option<SystemTime>,
        _bkuptime: Option<SystemTime>,
        _flags: Option<u32>,
        reply: ReplyAttr,
    ) {
        trace!(ino, ?mode, ?size, "setattr");
        if size.is_some() {
            // Size changes arrive through write(); the servers this frontend
            // targets do not expose a standalone truncate.
            debug!(ino, ?size, "ignoring setattr size change");
        }
        match self.do_setattr(ino, mode) {
            Ok(attr) => reply.attr(&self.attr_ttl, &attr),
            Err(e) => reply.error(e.to_errno()),
        }
    }

    fn mkdir(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        mode: u32,
        _umask: u32,
        reply: ReplyEntry,
    ) {
        let Some(name) = name.to_str() else {
            reply.error(libc::EINVAL);
            return;
        };
        trace!(parent, name, mode, "mkdir");
        match self.do_mkdir(parent, name, mode & 0o7777) {
            Ok((_ino, attr)) => reply.entry(&self.attr_ttl, &attr, 0),
            Err(e) => reply.error(e.to_errno()),
        }
    }

    fn unlink(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        let Some(name) = name.to_str() else {
            reply.error(libc::EINVAL);
            return;
        };
        trace!(parent, name, "unlink");
        match self.do_remove(parent, name) {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(e.to_errno()),
        }
    }

    fn rmdir(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        let Some(name) = name.to_str() else {
            reply.error(libc::EINVAL);
            return;
        };
        trace!(parent, name, "rmdir");
        match self.do_remove(parent, name) {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(e.to_errno()),
        }
    }

    fn rename(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        newparent: u64,
        newname: &OsStr,
        _flags: u32,
        reply: ReplyEmpty,
    ) {
        let (Some(name), Some(newname)) = (name.to_str(), newname.to_str()) else {
            reply.error(libc::EINVAL);
            return;
        };
        trace!(parent, name, newparent, newname, "rename");
        match self.do_rename(parent, name, newparent, newname) {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(e.to_errno()),
        }
    }

    fn open(&mut self, _req: &Request<'_>, ino: u64, flags: i32, reply: ReplyOpen) {
        trace!(ino, flags, "open");
        match self.do_open(ino, flags) {
            Ok(fh) => reply.opened(fh, 0),
            Err(errno) => reply.error(errno),
        }
    }

    fn read(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        trace!(ino, fh, offset, size, "read");
        match self.handles.read(fh, offset, size) {
            Ok(data) => reply.data(&data),
            Err(e) => reply.error(e.to_errno()),
        }
    }

    fn write(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        fh: u64,
        offset: i64,
        data: &[u8],
        _write_flags: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyWrite,
    ) {
        trace!(ino, fh, offset, len = data.len(), "write");
        match self.do_write(fh, offset, data) {
            Ok(written) => reply.written(written.max(0) as u32),
            Err(e) => reply.error(e.to_errno()),
        }
    }

    fn flush(&mut self, _req: &Request<'_>, ino: u64, fh: u64, _lock_owner: u64, reply: ReplyEmpty) {
        trace!(ino, fh, "flush");
        match self.sync_handle(fh) {
            Ok(()) => reply.ok(),
            Err(errno) => reply.error(errno),
        }
    }

    fn release(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        fh: u64,
        _flags: i32,
        _lock_owner: Option<u64>,
        _flush: bool,
        reply: ReplyEmpty,
    ) {
        trace!(ino, fh, "release");
        if let Err(e) = self.handles.close(fh) {
            warn!(fh, error = %e, "close failed");
        }
        reply.ok();
    }

    fn fsync(&mut self, _req: &Request<'_>, ino: u64, fh: u64, datasync: bool, reply: ReplyEmpty) {
        trace!(ino, fh, datasync, "fsync");
        match self.sync_handle(fh) {
            Ok(()) => reply.ok(),
            Err(errno) => reply.error(errno),
        }
    }

    fn readdir(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        mut reply: ReplyDirectory,
    ) {
        trace!(ino, offset, "readdir");
        let entries = match self.do_readdir(ino) {
            Ok(entries) => entries,
            Err(e) => {
                reply.error(e.to_errno());
                return;
            }
        };
        let parent_ino = self
            .inodes
            .path_of(ino)
            .map(|p| self.inodes.inode_of(parent_of(&p)).unwrap_or(ROOT_INODE))
            .unwrap_or(ROOT_INODE);

        let mut all = vec![
            (ino, FileType::Directory, ".".to_string()),
            (parent_ino, FileType::Directory, "..".to_string()),
        ];
        all.extend(entries);
        for (i, (entry_ino, kind, name)) in all.iter().enumerate().skip(offset as usize) {
            if reply.add(*entry_ino, (i + 1) as i64, *kind, name) {
                break;
            }
        }
        reply.ok();
    }

    fn create(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        _mode: u32,
        _umask: u32,
        flags: i32,
        reply: ReplyCreate,
    ) {
        let Some(name) = name.to_str() else {
            reply.error(libc::EINVAL);
            return;
        };
        trace!(parent, name, flags, "create");
        match self.do_create(parent, name, flags) {
            Ok((_ino, attr, fh)) => reply.created(&self.attr_ttl, &attr, 0, fh, 0),
            Err(e) => reply.error(e.to_errno()),
        }
    }

    fn statfs(&mut self, _req: &Request<'_>, _ino: u64, reply: ReplyStatfs) {
        // The server exposes no usage accounting; report a roomy synthetic
        // filesystem so tools do not refuse to write.
        reply.statfs(
            1 << 24,
            1 << 23,
            1 << 23,
            1 << 20,
            1 << 19,
            BLOCK_SIZE,
            255,
            BLOCK_SIZE,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testclient::FakeRemote;

    fn fixture() -> AgfsFuse<FakeRemote> {
        let client = FakeRemote::path_only();
        client.put_dir("/docs");
        client.put_file("/docs/readme.md", b"# agfs");
        client.put_file("/hello.txt", b"hello world");
        AgfsFuse::new(Arc::new(client), &MountConfig::default())
    }

    #[test]
    fn test_path_helpers() {
        assert_eq!(child_path("/", "a"), "/a");
        assert_eq!(child_path("/docs", "readme.md"), "/docs/readme.md");
        assert_eq!(parent_of("/docs/readme.md"), "/docs");
        assert_eq!(parent_of("/docs"), "/");
        assert_eq!(parent_of("/"), "/");
    }

    #[test]
    fn test_lookup_allocates_stable_inode() {
        let fs = fixture();
        let (ino, attr) = fs.do_lookup(ROOT_INODE, "hello.txt").unwrap();
        assert!(ino > ROOT_INODE);
        assert_eq!(attr.size, 11);
        assert_eq!(attr.kind, FileType::RegularFile);
        assert_eq!(attr.perm, 0o644);
        let (again, _) = fs.do_lookup(ROOT_INODE, "hello.txt").unwrap();
        assert_eq!(again, ino);
    }

    #[test]
    fn test_lookup_missing_maps_to_enoent() {
        let fs = fixture();
        let err = fs.do_lookup(ROOT_INODE, "nope").unwrap_err();
        assert_eq!(err.to_errno(), libc::ENOENT);
    }

    #[test]
    fn test_getattr_root() {
        let fs = fixture();
        let attr = fs.do_getattr(ROOT_INODE).unwrap();
        assert_eq!(attr.ino, ROOT_INODE);
        assert_eq!(attr.kind, FileType::Directory);
        assert_eq!(attr.perm, 0o755);
        assert_eq!(attr.nlink, 2);
    }

    #[test]
    fn test_readdir_lists_entries() {
        let fs = fixture();
        let entries = fs.do_readdir(ROOT_INODE).unwrap();
        let names: Vec<&str> = entries.iter().map(|(_, _, n)| n.as_str()).collect();
        assert_eq!(names, ["docs", "hello.txt"]);
        assert_eq!(entries[0].1, FileType::Directory);
        assert_eq!(entries[1].1, FileType::RegularFile);
    }

    #[test]
    fn test_create_write_read_round_trip() {
        let fs = fixture();
        let (ino, attr, fh) = fs
            .do_create(ROOT_INODE, "new.txt", libc::O_WRONLY | libc::O_CREAT)
            .unwrap();
        assert!(ino > ROOT_INODE);
        assert_eq!(attr.size, 0);
        assert_eq!(fs.do_write(fh, 0, b"fresh content").unwrap(), 13);
        fs.handles.close(fh).unwrap();

        let (_, attr) = fs.do_lookup(ROOT_INODE, "new.txt").unwrap();
        assert_eq!(attr.size, 13);

        let (ino2, _) = fs.do_lookup(ROOT_INODE, "new.txt").unwrap();
        let fh = fs.do_open(ino2, libc::O_RDONLY).unwrap();
        assert_eq!(fs.handles.read(fh, 0, 64).unwrap(), b"fresh content");
        fs.handles.close(fh).unwrap();
    }

    #[test]
    fn test_open_directory_is_eisdir() {
        let fs = fixture();
        let (ino, _) = fs.do_lookup(ROOT_INODE, "docs").unwrap();
        assert_eq!(fs.do_open(ino, libc::O_RDONLY).unwrap_err(), libc::EISDIR);
    }

    #[test]
    fn test_unlink_invalidates_caches() {
        let fs = fixture();
        // Warm both caches.
        fs.do_lookup(ROOT_INODE, "hello.txt").unwrap();
        fs.do_readdir(ROOT_INODE).unwrap();

        fs.do_remove(ROOT_INODE, "hello.txt").unwrap();

        let err = fs.do_lookup(ROOT_INODE, "hello.txt").unwrap_err();
        assert_eq!(err.to_errno(), libc::ENOENT);
        let names: Vec<String> = fs
            .do_readdir(ROOT_INODE)
            .unwrap()
            .into_iter()
            .map(|(_, _, n)| n)
            .collect();
        assert_eq!(names, ["docs"]);
    }

    #[test]
    fn test_mkdir_appears_in_listing() {
        let fs = fixture();
        fs.do_readdir(ROOT_INODE).unwrap();
        let (ino, attr) = fs.do_mkdir(ROOT_INODE, "archive", 0o700).unwrap();
        assert!(ino > ROOT_INODE);
        assert_eq!(attr.kind, FileType::Directory);
        assert_eq!(attr.perm, 0o700);
        let names: Vec<String> = fs
            .do_readdir(ROOT_INODE)
            .unwrap()
            .into_iter()
            .map(|(_, _, n)| n)
            .collect();
        assert_eq!(names, ["archive", "docs", "hello.txt"]);
    }

    #[test]
    fn test_rename_moves_entry_and_inode() {
        let fs = fixture();
        let (docs_ino, _) = fs.do_lookup(ROOT_INODE, "docs").unwrap();
        let (file_ino, _) = fs.do_lookup(docs_ino, "readme.md").unwrap();
        fs.do_readdir(docs_ino).unwrap();

        fs.do_rename(docs_ino, "readme.md", ROOT_INODE, "README.md").unwrap();

        assert_eq!(
            fs.do_lookup(docs_ino, "readme.md").unwrap_err().to_errno(),
            libc::ENOENT
        );
        let (new_ino, attr) = fs.do_lookup(ROOT_INODE, "README.md").unwrap();
        assert_eq!(new_ino, file_ino);
        assert_eq!(attr.size, 6);
        assert!(fs.do_readdir(docs_ino).unwrap().is_empty());
    }

    #[test]
    fn test_setattr_chmod() {
        let fs = fixture();
        let (ino, _) = fs.do_lookup(ROOT_INODE, "hello.txt").unwrap();
        let attr = fs.do_setattr(ino, Some(0o600)).unwrap();
        assert_eq!(attr.perm, 0o600);
    }

    #[test]
    fn test_setattr_without_mode_returns_current() {
        let fs = fixture();
        let (ino, before) = fs.do_lookup(ROOT_INODE, "hello.txt").unwrap();
        let attr = fs.do_setattr(ino, None).unwrap();
        assert_eq!(attr.perm, before.perm);
        assert_eq!(attr.size, before.size);
    }

    #[test]
    fn test_attr_mtime_from_server() {
        let fs = fixture();
        let (_, attr) = fs.do_lookup(ROOT_INODE, "hello.txt").unwrap();
        assert_eq!(
            attr.mtime.duration_since(UNIX_EPOCH).unwrap().as_secs(),
            1_700_000_000
        );
    }
}
