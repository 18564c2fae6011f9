//! In-memory fake server for exercising the FUSE frontend without a
//! transport. Capability flags select which backing the handle manager
//! picks; counters expose what the "server" actually saw.

use std::collections::HashMap;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};

use parking_lot::Mutex;

use agfs_core::{FileInfo, FsError, FsResult, Whence, write_flags};

use crate::client::{RemoteClient, ServerCaps, StreamReader};

#[derive(Clone)]
enum Node {
    File(Vec<u8>),
    Dir,
}

struct ServerHandle {
    path: String,
    pos: i64,
}

pub(crate) struct FakeRemote {
    nodes: Arc<Mutex<HashMap<String, Node>>>,
    modes: Mutex<HashMap<String, u32>>,
    caps: ServerCaps,
    handles: Mutex<HashMap<i64, ServerHandle>>,
    next_handle: AtomicI64,
    full_reads: AtomicUsize,
    streams_opened: AtomicUsize,
}

fn basename(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

fn parent(path: &str) -> &str {
    match path.rfind('/') {
        Some(0) => "/",
        Some(idx) => &path[..idx],
        None => "/",
    }
}

impl FakeRemote {
    fn with_caps(caps: ServerCaps) -> Self {
        let mut nodes = HashMap::new();
        nodes.insert("/".to_string(), Node::Dir);
        Self {
            nodes: Arc::new(Mutex::new(nodes)),
            modes: Mutex::new(HashMap::new()),
            caps,
            handles: Mutex::new(HashMap::new()),
            next_handle: AtomicI64::new(1),
            full_reads: AtomicUsize::new(0),
            streams_opened: AtomicUsize::new(0),
        }
    }

    /// A server with no handle support at all.
    pub(crate) fn path_only() -> Self {
        Self::with_caps(ServerCaps::default())
    }

    /// A path-only server whose reads drain the file, queue-style.
    pub(crate) fn destructive() -> Self {
        Self::with_caps(ServerCaps {
            is_read_destructive: true,
            ..ServerCaps::default()
        })
    }

    /// A server issuing stateful handles.
    pub(crate) fn with_handles() -> Self {
        Self::with_caps(ServerCaps::posix())
    }

    /// A server issuing handles that can be promoted to read streams.
    pub(crate) fn streaming() -> Self {
        Self::with_caps(ServerCaps {
            supports_stream_read: true,
            ..ServerCaps::posix()
        })
    }

    /// Seeds a file, creating missing parent directories.
    pub(crate) fn put_file(&self, path: &str, content: &[u8]) {
        let mut nodes = self.nodes.lock();
        let mut dir = parent(path);
        while dir != "/" {
            nodes.entry(dir.to_string()).or_insert(Node::Dir);
            dir = parent(dir);
        }
        nodes.insert(path.to_string(), Node::File(content.to_vec()));
    }

    /// Seeds a directory.
    pub(crate) fn put_dir(&self, path: &str) {
        self.nodes.lock().insert(path.to_string(), Node::Dir);
    }

    /// Current content of a file, if it exists.
    pub(crate) fn file_content(&self, path: &str) -> Option<Vec<u8>> {
        match self.nodes.lock().get(path) {
            Some(Node::File(data)) => Some(data.clone()),
            _ => None,
        }
    }

    /// How many whole-file path reads the server has served.
    pub(crate) fn full_reads(&self) -> usize {
        self.full_reads.load(Ordering::SeqCst)
    }

    /// Server handles currently open.
    pub(crate) fn open_server_handles(&self) -> usize {
        self.handles.lock().len()
    }

    /// Streams opened over the server's lifetime.
    pub(crate) fn open_streams(&self) -> usize {
        self.streams_opened.load(Ordering::SeqCst)
    }

    fn mode_of(&self, path: &str, is_dir: bool) -> u32 {
        self.modes
            .lock()
            .get(path)
            .copied()
            .unwrap_or(if is_dir { 0o755 } else { 0o644 })
    }

    fn require_handle_support(&self) -> FsResult<()> {
        if self.caps.supports_file_handle {
            Ok(())
        } else {
            Err(FsError::NotSupported("fake server has no handles".into()))
        }
    }
}

impl RemoteClient for FakeRemote {
    fn capabilities(&self) -> FsResult<ServerCaps> {
        Ok(self.caps)
    }

    fn read(&self, path: &str, offset: i64, size: i64) -> FsResult<Vec<u8>> {
        if offset == 0 && size == -1 {
            self.full_reads.fetch_add(1, Ordering::SeqCst);
        }
        let mut nodes = self.nodes.lock();
        let data = match nodes.get_mut(path) {
            Some(Node::File(data)) => data,
            Some(Node::Dir) => {
                return Err(FsError::InvalidArgument(format!("{path} is a directory")));
            }
            None => return Err(FsError::not_found(path)),
        };
        let lo = usize::try_from(offset).unwrap_or(usize::MAX).min(data.len());
        let hi = if size < 0 {
            data.len()
        } else {
            lo.saturating_add(size as usize).min(data.len())
        };
        let out = data[lo..hi].to_vec();
        if self.caps.is_read_destructive {
            data.clear();
        }
        Ok(out)
    }

    fn write(&self, path: &str, data: &[u8], offset: i64, flags: u32) -> FsResult<i64> {
        let mut nodes = self.nodes.lock();
        if !nodes.contains_key(path) {
            if flags & write_flags::CREATE == 0 {
                return Err(FsError::not_found(path));
            }
            if !matches!(nodes.get(parent(path)), Some(Node::Dir)) {
                return Err(FsError::not_found(parent(path)));
            }
            nodes.insert(path.to_string(), Node::File(Vec::new()));
        } else if flags & write_flags::EXCLUSIVE != 0 {
            return Err(FsError::AlreadyExists(path.to_string()));
        }
        let Some(Node::File(content)) = nodes.get_mut(path) else {
            return Err(FsError::InvalidArgument(format!("{path} is a directory")));
        };
        if flags & write_flags::TRUNCATE != 0 {
            content.clear();
        }
        if flags & write_flags::APPEND != 0 {
            content.extend_from_slice(data);
        } else {
            let start = offset.max(0) as usize;
            if content.len() < start {
                content.resize(start, 0);
            }
            let end = start + data.len();
            if content.len() < end {
                content.resize(end, 0);
            }
            content[start..end].copy_from_slice(data);
        }
        Ok(data.len() as i64)
    }

    fn stat(&self, path: &str) -> FsResult<FileInfo> {
        let nodes = self.nodes.lock();
        let node = nodes.get(path).ok_or_else(|| FsError::not_found(path))?;
        let (size, is_dir) = match node {
            Node::File(data) => (data.len() as i64, false),
            Node::Dir => (0, true),
        };
        Ok(FileInfo {
            name: basename(path).to_string(),
            size,
            mode: self.mode_of(path, is_dir),
            mtime: 1_700_000_000,
            is_dir,
            meta: agfs_core::Metadata::default(),
        })
    }

    fn read_dir(&self, path: &str) -> FsResult<Vec<FileInfo>> {
        let nodes = self.nodes.lock();
        if !matches!(nodes.get(path), Some(Node::Dir)) {
            return Err(FsError::not_found(path));
        }
        let mut entries: Vec<FileInfo> = nodes
            .iter()
            .filter(|(k, _)| k.as_str() != "/" && parent(k) == path)
            .map(|(k, node)| {
                let (size, is_dir) = match node {
                    Node::File(data) => (data.len() as i64, false),
                    Node::Dir => (0, true),
                };
                FileInfo {
                    name: basename(k).to_string(),
                    size,
                    mode: self.mode_of(k, is_dir),
                    mtime: 1_700_000_000,
                    is_dir,
                    meta: agfs_core::Metadata::default(),
                }
            })
            .collect();
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    fn create(&self, path: &str) -> FsResult<()> {
        let mut nodes = self.nodes.lock();
        if nodes.contains_key(path) {
            return Err(FsError::AlreadyExists(path.to_string()));
        }
        if !matches!(nodes.get(parent(path)), Some(Node::Dir)) {
            return Err(FsError::not_found(parent(path)));
        }
        nodes.insert(path.to_string(), Node::File(Vec::new()));
        Ok(())
    }

    fn mkdir(&self, path: &str, mode: u32) -> FsResult<()> {
        let mut nodes = self.nodes.lock();
        if nodes.contains_key(path) {
            return Err(FsError::AlreadyExists(path.to_string()));
        }
        if !matches!(nodes.get(parent(path)), Some(Node::Dir)) {
            return Err(FsError::not_found(parent(path)));
        }
        nodes.insert(path.to_string(), Node::Dir);
        self.modes.lock().insert(path.to_string(), mode);
        Ok(())
    }

    fn remove(&self, path: &str) -> FsResult<()> {
        let mut nodes = self.nodes.lock();
        match nodes.get(path) {
            Some(Node::Dir) => {
                let subtree = format!("{path}/");
                if nodes.keys().any(|k| k.starts_with(&subtree)) {
                    return Err(FsError::InvalidArgument(format!("{path} is not empty")));
                }
            }
            Some(Node::File(_)) => {}
            None => return Err(FsError::not_found(path)),
        }
        nodes.remove(path);
        Ok(())
    }

    fn remove_all(&self, path: &str) -> FsResult<()> {
        let mut nodes = self.nodes.lock();
        if !nodes.contains_key(path) {
            return Err(FsError::not_found(path));
        }
        let subtree = format!("{path}/");
        nodes.retain(|k, _| k != path && !k.starts_with(&subtree));
        Ok(())
    }

    fn rename(&self, from: &str, to: &str) -> FsResult<()> {
        let mut nodes = self.nodes.lock();
        if !nodes.contains_key(from) {
            return Err(FsError::not_found(from));
        }
        let subtree = format!("{from}/");
        let moved: Vec<String> = nodes
            .keys()
            .filter(|k| k.as_str() == from || k.starts_with(&subtree))
            .cloned()
            .collect();
        for key in moved {
            let node = nodes.remove(&key).unwrap();
            let new_key = if key == from {
                to.to_string()
            } else {
                format!("{to}{}", &key[from.len()..])
            };
            nodes.insert(new_key, node);
        }
        Ok(())
    }

    fn chmod(&self, path: &str, mode: u32) -> FsResult<()> {
        if !self.nodes.lock().contains_key(path) {
            return Err(FsError::not_found(path));
        }
        self.modes.lock().insert(path.to_string(), mode);
        Ok(())
    }

    fn open_handle(&self, path: &str, _flags: u32) -> FsResult<i64> {
        self.require_handle_support()?;
        if !self.nodes.lock().contains_key(path) {
            self.put_file(path, b"");
        }
        let id = self.next_handle.fetch_add(1, Ordering::SeqCst);
        self.handles.lock().insert(
            id,
            ServerHandle {
                path: path.to_string(),
                pos: 0,
            },
        );
        Ok(id)
    }

    fn read_handle(&self, handle: i64, size: i64) -> FsResult<Vec<u8>> {
        self.require_handle_support()?;
        let mut handles = self.handles.lock();
        let state = handles
            .get_mut(&handle)
            .ok_or_else(|| FsError::not_found(format!("handle {handle}")))?;
        let nodes = self.nodes.lock();
        let Some(Node::File(data)) = nodes.get(&state.path) else {
            return Err(FsError::not_found(&state.path));
        };
        let lo = usize::try_from(state.pos).unwrap_or(usize::MAX).min(data.len());
        let hi = if size < 0 {
            data.len()
        } else {
            lo.saturating_add(size as usize).min(data.len())
        };
        state.pos += (hi - lo) as i64;
        Ok(data[lo..hi].to_vec())
    }

    fn write_handle(&self, handle: i64, data: &[u8]) -> FsResult<i64> {
        self.require_handle_support()?;
        let mut handles = self.handles.lock();
        let state = handles
            .get_mut(&handle)
            .ok_or_else(|| FsError::not_found(format!("handle {handle}")))?;
        let mut nodes = self.nodes.lock();
        let Some(Node::File(content)) = nodes.get_mut(&state.path) else {
            return Err(FsError::not_found(&state.path));
        };
        let start = state.pos.max(0) as usize;
        if content.len() < start {
            content.resize(start, 0);
        }
        let end = start + data.len();
        if content.len() < end {
            content.resize(end, 0);
        }
        content[start..end].copy_from_slice(data);
        state.pos = end as i64;
        Ok(data.len() as i64)
    }

    fn seek_handle(&self, handle: i64, offset: i64, whence: Whence) -> FsResult<i64> {
        self.require_handle_support()?;
        let mut handles = self.handles.lock();
        let state = handles
            .get_mut(&handle)
            .ok_or_else(|| FsError::not_found(format!("handle {handle}")))?;
        let size = match self.nodes.lock().get(&state.path) {
            Some(Node::File(data)) => data.len() as i64,
            _ => 0,
        };
        let pos = match whence {
            Whence::Start => offset,
            Whence::Current => state.pos + offset,
            Whence::End => size + offset,
        };
        if pos < 0 {
            return Err(FsError::InvalidArgument(format!("seek to {pos}")));
        }
        state.pos = pos;
        Ok(pos)
    }

    fn sync_handle(&self, handle: i64) -> FsResult<()> {
        self.require_handle_support()?;
        if self.handles.lock().contains_key(&handle) {
            Ok(())
        } else {
            Err(FsError::not_found(format!("handle {handle}")))
        }
    }

    fn close_handle(&self, handle: i64) -> FsResult<()> {
        self.require_handle_support()?;
        self.handles
            .lock()
            .remove(&handle)
            .map(|_| ())
            .ok_or_else(|| FsError::not_found(format!("handle {handle}")))
    }

    fn open_stream(&self, handle: i64) -> FsResult<Box<dyn StreamReader>> {
        if !self.caps.supports_stream_read {
            return Err(FsError::NotSupported("fake server does not stream".into()));
        }
        let handles = self.handles.lock();
        let state = handles
            .get(&handle)
            .ok_or_else(|| FsError::not_found(format!("handle {handle}")))?;
        let data = self.file_content(&state.path).unwrap_or_default();
        self.streams_opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(SnapshotStream { data, pos: 0 }))
    }
}

/// Streams a point-in-time copy of a file, a few bytes at a time to make
/// the chunking visible to window tests.
struct SnapshotStream {
    data: Vec<u8>,
    pos: usize,
}

impl StreamReader for SnapshotStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.pos >= self.data.len() {
            return Ok(0);
        }
        let n = buf.len().min(self.data.len() - self.pos).min(7);
        buf[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}
