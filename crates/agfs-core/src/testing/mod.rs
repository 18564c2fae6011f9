//! In-memory backend for unit and integration tests.
//!
//! [`MemFs`] implements the full [`Filesystem`] surface, including stateful
//! handles, on a flat path map. [`MemPlugin`] wraps it in the plugin
//! lifecycle so mount and pool tests can exercise validate/initialize/
//! shutdown without touching real storage.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::RwLock;

use crate::error::{FsError, FsResult};
use crate::fs::{
    Capabilities, FileHandle, FileInfo, Filesystem, Metadata, PluginConfig, ServicePlugin, Whence,
    open_flags, write_flags,
};

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

#[derive(Clone)]
struct MemNode {
    data: Vec<u8>,
    mode: u32,
    mtime: i64,
    is_dir: bool,
}

impl MemNode {
    fn file(mode: u32) -> Self {
        Self {
            data: Vec::new(),
            mode,
            mtime: unix_now(),
            is_dir: false,
        }
    }

    fn dir(mode: u32) -> Self {
        Self {
            data: Vec::new(),
            mode,
            mtime: unix_now(),
            is_dir: true,
        }
    }
}

type NodeMap = Arc<RwLock<HashMap<String, MemNode>>>;

/// Collapses repeated slashes and trailing slashes; requires absolute paths.
fn normalize(path: &str) -> FsResult<String> {
    if !path.starts_with('/') {
        return Err(FsError::InvalidArgument(format!("relative path: {path}")));
    }
    let mut out = String::from("/");
    for segment in path.split('/') {
        if segment.is_empty() || segment == "." {
            continue;
        }
        if segment == ".." {
            return Err(FsError::InvalidArgument(format!("path escapes root: {path}")));
        }
        if !out.ends_with('/') {
            out.push('/');
        }
        out.push_str(segment);
    }
    Ok(out)
}

fn parent_of(path: &str) -> String {
    match path.rfind('/') {
        Some(0) | None => "/".to_string(),
        Some(idx) => path[..idx].to_string(),
    }
}

fn base_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// In-memory filesystem with POSIX-like semantics.
pub struct MemFs {
    nodes: NodeMap,
}

impl Default for MemFs {
    fn default() -> Self {
        Self::new()
    }
}

impl MemFs {
    /// Creates an empty filesystem containing only the root directory.
    pub fn new() -> Self {
        let mut nodes = HashMap::new();
        nodes.insert("/".to_string(), MemNode::dir(0o755));
        Self {
            nodes: Arc::new(RwLock::new(nodes)),
        }
    }

    fn require_parent_dir(nodes: &HashMap<String, MemNode>, path: &str) -> FsResult<()> {
        let parent = parent_of(path);
        match nodes.get(&parent) {
            Some(node) if node.is_dir => Ok(()),
            Some(_) => Err(FsError::InvalidArgument(format!("not a directory: {parent}"))),
            None => Err(FsError::not_found(parent)),
        }
    }
}

impl Filesystem for MemFs {
    fn create(&self, path: &str) -> FsResult<()> {
        let path = normalize(path)?;
        let mut nodes = self.nodes.write();
        if nodes.contains_key(&path) {
            return Err(FsError::AlreadyExists(path));
        }
        Self::require_parent_dir(&nodes, &path)?;
        nodes.insert(path, MemNode::file(0o644));
        Ok(())
    }

    fn mkdir(&self, path: &str, mode: u32) -> FsResult<()> {
        let path = normalize(path)?;
        let mut nodes = self.nodes.write();
        if nodes.contains_key(&path) {
            return Err(FsError::AlreadyExists(path));
        }
        Self::require_parent_dir(&nodes, &path)?;
        nodes.insert(path, MemNode::dir(mode));
        Ok(())
    }

    fn remove(&self, path: &str) -> FsResult<()> {
        let path = normalize(path)?;
        if path == "/" {
            return Err(FsError::InvalidArgument("cannot remove root".into()));
        }
        let mut nodes = self.nodes.write();
        let node = nodes.get(&path).ok_or_else(|| FsError::not_found(&path))?;
        if node.is_dir {
            let child_prefix = format!("{path}/");
            if nodes.keys().any(|k| k.starts_with(&child_prefix)) {
                return Err(FsError::InvalidArgument(format!("directory not empty: {path}")));
            }
        }
        nodes.remove(&path);
        Ok(())
    }

    fn remove_all(&self, path: &str) -> FsResult<()> {
        let path = normalize(path)?;
        if path == "/" {
            return Err(FsError::InvalidArgument("cannot remove root".into()));
        }
        let mut nodes = self.nodes.write();
        if !nodes.contains_key(&path) {
            return Err(FsError::not_found(&path));
        }
        let child_prefix = format!("{path}/");
        nodes.retain(|k, _| k != &path && !k.starts_with(&child_prefix));
        Ok(())
    }

    fn read(&self, path: &str, offset: i64, size: i64) -> FsResult<Vec<u8>> {
        let path = normalize(path)?;
        let nodes = self.nodes.read();
        let node = nodes.get(&path).ok_or_else(|| FsError::not_found(&path))?;
        if node.is_dir {
            return Err(FsError::InvalidArgument(format!("is a directory: {path}")));
        }
        if offset < 0 {
            return Err(FsError::InvalidArgument(format!("negative offset {offset}")));
        }
        let start = (offset as usize).min(node.data.len());
        let end = if size < 0 {
            node.data.len()
        } else {
            start.saturating_add(size as usize).min(node.data.len())
        };
        Ok(node.data[start..end].to_vec())
    }

    fn write(&self, path: &str, data: &[u8], offset: i64, flags: u32) -> FsResult<i64> {
        let path = normalize(path)?;
        let mut nodes = self.nodes.write();
        if let Some(node) = nodes.get(&path) {
            if node.is_dir {
                return Err(FsError::InvalidArgument(format!("is a directory: {path}")));
            }
            if flags & (write_flags::CREATE | write_flags::EXCLUSIVE)
                == write_flags::CREATE | write_flags::EXCLUSIVE
            {
                return Err(FsError::AlreadyExists(path));
            }
        } else {
            if flags & write_flags::CREATE == 0 {
                return Err(FsError::not_found(&path));
            }
            Self::require_parent_dir(&nodes, &path)?;
            nodes.insert(path.clone(), MemNode::file(0o644));
        }
        let node = nodes
            .get_mut(&path)
            .ok_or_else(|| FsError::not_found(&path))?;
        if flags & write_flags::TRUNCATE != 0 {
            node.data.clear();
        }
        let at = if flags & write_flags::APPEND != 0 {
            node.data.len()
        } else {
            if offset < 0 {
                return Err(FsError::InvalidArgument(format!("negative offset {offset}")));
            }
            offset as usize
        };
        if node.data.len() < at {
            node.data.resize(at, 0);
        }
        let end = at + data.len();
        if node.data.len() < end {
            node.data.resize(end, 0);
        }
        node.data[at..end].copy_from_slice(data);
        node.mtime = unix_now();
        Ok(data.len() as i64)
    }

    fn read_dir(&self, path: &str) -> FsResult<Vec<FileInfo>> {
        let path = normalize(path)?;
        let nodes = self.nodes.read();
        let node = nodes.get(&path).ok_or_else(|| FsError::not_found(&path))?;
        if !node.is_dir {
            return Err(FsError::InvalidArgument(format!("not a directory: {path}")));
        }
        let prefix = if path == "/" { "/".to_string() } else { format!("{path}/") };
        let mut entries = Vec::new();
        for (key, child) in nodes.iter() {
            let Some(rest) = key.strip_prefix(&prefix) else {
                continue;
            };
            if rest.is_empty() || rest.contains('/') {
                continue;
            }
            entries.push(FileInfo {
                name: rest.to_string(),
                size: child.data.len() as i64,
                mode: child.mode,
                mtime: child.mtime,
                is_dir: child.is_dir,
                meta: Metadata::default(),
            });
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    fn stat(&self, path: &str) -> FsResult<FileInfo> {
        let path = normalize(path)?;
        let nodes = self.nodes.read();
        let node = nodes.get(&path).ok_or_else(|| FsError::not_found(&path))?;
        Ok(FileInfo {
            name: base_name(&path).to_string(),
            size: node.data.len() as i64,
            mode: node.mode,
            mtime: node.mtime,
            is_dir: node.is_dir,
            meta: Metadata::default(),
        })
    }

    fn rename(&self, old_path: &str, new_path: &str) -> FsResult<()> {
        let old_path = normalize(old_path)?;
        let new_path = normalize(new_path)?;
        let mut nodes = self.nodes.write();
        if !nodes.contains_key(&old_path) {
            return Err(FsError::not_found(&old_path));
        }
        if let Some(target) = nodes.get(&new_path) {
            if target.is_dir {
                return Err(FsError::AlreadyExists(new_path));
            }
        }
        Self::require_parent_dir(&nodes, &new_path)?;
        let old_prefix = format!("{old_path}/");
        let moved: Vec<(String, String)> = nodes
            .keys()
            .filter(|k| *k == &old_path || k.starts_with(&old_prefix))
            .map(|k| {
                let suffix = &k[old_path.len()..];
                (k.clone(), format!("{new_path}{suffix}"))
            })
            .collect();
        for (from, to) in moved {
            if let Some(node) = nodes.remove(&from) {
                nodes.insert(to, node);
            }
        }
        Ok(())
    }

    fn chmod(&self, path: &str, mode: u32) -> FsResult<()> {
        let path = normalize(path)?;
        let mut nodes = self.nodes.write();
        let node = nodes
            .get_mut(&path)
            .ok_or_else(|| FsError::not_found(&path))?;
        node.mode = mode;
        Ok(())
    }

    fn open_handle(&self, path: &str, flags: u32, mode: u32) -> FsResult<Box<dyn FileHandle>> {
        let path = normalize(path)?;
        {
            let mut nodes = self.nodes.write();
            match nodes.get(&path) {
                Some(node) if node.is_dir => {
                    return Err(FsError::InvalidArgument(format!("is a directory: {path}")));
                }
                Some(_) if flags & (open_flags::CREATE | open_flags::EXCL)
                    == open_flags::CREATE | open_flags::EXCL =>
                {
                    return Err(FsError::AlreadyExists(path));
                }
                Some(_) => {}
                None if flags & open_flags::CREATE != 0 => {
                    Self::require_parent_dir(&nodes, &path)?;
                    nodes.insert(path.clone(), MemNode::file(mode));
                }
                None => return Err(FsError::not_found(&path)),
            }
            if flags & open_flags::TRUNC != 0
                && let Some(node) = nodes.get_mut(&path)
            {
                node.data.clear();
            }
        }
        Ok(Box::new(MemHandle {
            nodes: Arc::clone(&self.nodes),
            path,
            pos: 0,
            append: flags & open_flags::APPEND != 0,
        }))
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::full_posix()
    }
}

struct MemHandle {
    nodes: NodeMap,
    path: String,
    pos: usize,
    append: bool,
}

impl FileHandle for MemHandle {
    fn read(&mut self, size: usize) -> FsResult<Vec<u8>> {
        let nodes = self.nodes.read();
        let node = nodes
            .get(&self.path)
            .ok_or_else(|| FsError::not_found(&self.path))?;
        let start = self.pos.min(node.data.len());
        let end = start.saturating_add(size).min(node.data.len());
        let out = node.data[start..end].to_vec();
        self.pos = end;
        Ok(out)
    }

    fn write(&mut self, data: &[u8]) -> FsResult<i64> {
        let mut nodes = self.nodes.write();
        let node = nodes
            .get_mut(&self.path)
            .ok_or_else(|| FsError::not_found(&self.path))?;
        if self.append {
            self.pos = node.data.len();
        }
        let end = self.pos + data.len();
        if node.data.len() < end {
            node.data.resize(end, 0);
        }
        node.data[self.pos..end].copy_from_slice(data);
        node.mtime = unix_now();
        self.pos = end;
        Ok(data.len() as i64)
    }

    fn seek(&mut self, offset: i64, whence: Whence) -> FsResult<i64> {
        let len = {
            let nodes = self.nodes.read();
            nodes
                .get(&self.path)
                .ok_or_else(|| FsError::not_found(&self.path))?
                .data
                .len() as i64
        };
        let base = match whence {
            Whence::Start => 0,
            Whence::Current => self.pos as i64,
            Whence::End => len,
        };
        let target = base + offset;
        if target < 0 {
            return Err(FsError::InvalidArgument(format!("seek before start: {target}")));
        }
        self.pos = target as usize;
        Ok(target)
    }

    fn sync(&mut self) -> FsResult<()> {
        Ok(())
    }
}

/// Plugin lifecycle wrapper around [`MemFs`].
pub struct MemPlugin {
    name: String,
    fs: Arc<MemFs>,
    initialized: AtomicBool,
    shut_down: AtomicBool,
}

impl MemPlugin {
    /// Creates a named plugin with a fresh empty filesystem.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fs: Arc::new(MemFs::new()),
            initialized: AtomicBool::new(false),
            shut_down: AtomicBool::new(false),
        }
    }

    /// True once `shutdown` has been called.
    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }

    /// True once `initialize` has been called.
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }
}

impl ServicePlugin for MemPlugin {
    fn name(&self) -> &str {
        &self.name
    }

    fn validate(&self, config: &PluginConfig) -> FsResult<()> {
        // Only "readme" is recognized, and it must be a string.
        for (key, value) in config {
            match key.as_str() {
                "readme" if value.is_string() => {}
                "readme" => {
                    return Err(FsError::InvalidArgument("readme must be a string".into()));
                }
                other => {
                    return Err(FsError::InvalidArgument(format!("unknown config key: {other}")));
                }
            }
        }
        Ok(())
    }

    fn initialize(&self, config: &PluginConfig) -> FsResult<()> {
        self.validate(config)?;
        self.initialized.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn filesystem(&self) -> Arc<dyn Filesystem> {
        Arc::clone(&self.fs) as Arc<dyn Filesystem>
    }

    fn readme(&self) -> String {
        format!("{}: in-memory filesystem for tests", self.name)
    }

    fn shutdown(&self) -> FsResult<()> {
        self.shut_down.store(true, Ordering::SeqCst);
        Ok(())
    }
}
