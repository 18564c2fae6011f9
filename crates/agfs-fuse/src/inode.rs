//! Inode table: bidirectional mapping between FUSE inodes and server paths.
//!
//! Inode numbers are allocated once per path and kept until the kernel
//! forgets them. Paths are absolute, `/`-separated, matching the server's
//! namespace; the root path `/` is pre-bound to inode 1.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;

/// The root inode number (FUSE convention).
pub const ROOT_INODE: u64 = 1;

/// An entry in the inode table.
#[derive(Debug)]
pub struct InodeEntry {
    /// Absolute server path for this inode.
    pub path: String,
    /// Kernel reference count, maintained through `lookup`/`forget`.
    nlookup: AtomicU64,
}

impl InodeEntry {
    fn new(path: String) -> Self {
        Self {
            path,
            nlookup: AtomicU64::new(1),
        }
    }

    /// Increments the kernel reference count.
    pub fn inc_nlookup(&self) -> u64 {
        self.nlookup.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Decrements the count by `count`, saturating at zero.
    fn dec_nlookup(&self, count: u64) -> u64 {
        let old = self.nlookup.fetch_sub(count, Ordering::SeqCst);
        if old < count {
            self.nlookup.fetch_add(count - old, Ordering::SeqCst);
            0
        } else {
            old - count
        }
    }

    /// Current kernel reference count.
    pub fn nlookup(&self) -> u64 {
        self.nlookup.load(Ordering::SeqCst)
    }
}

/// Thread-safe inode table.
pub struct InodeTable {
    path_to_inode: DashMap<String, u64>,
    inode_to_entry: DashMap<u64, InodeEntry>,
    next_inode: AtomicU64,
}

impl InodeTable {
    /// Creates a table with the root path pre-bound to inode 1.
    pub fn new() -> Self {
        let table = Self {
            path_to_inode: DashMap::new(),
            inode_to_entry: DashMap::new(),
            // Inode 1 is reserved for root.
            next_inode: AtomicU64::new(2),
        };
        table.path_to_inode.insert("/".to_string(), ROOT_INODE);
        table
            .inode_to_entry
            .insert(ROOT_INODE, InodeEntry::new("/".to_string()));
        table
    }

    /// Returns the inode for `path`, allocating one if none exists. An
    /// existing inode gets its kernel reference count bumped.
    pub fn get_or_insert(&self, path: &str) -> u64 {
        if let Some(inode) = self.path_to_inode.get(path) {
            let ino = *inode;
            drop(inode);
            if let Some(entry) = self.inode_to_entry.get(&ino) {
                entry.inc_nlookup();
            }
            return ino;
        }
        // Entry API avoids a TOCTOU race between the lookup and the insert.
        *self.path_to_inode.entry(path.to_string()).or_insert_with(|| {
            let ino = self.next_inode.fetch_add(1, Ordering::SeqCst);
            self.inode_to_entry
                .insert(ino, InodeEntry::new(path.to_string()));
            ino
        })
    }

    /// Looks up an entry by inode number.
    pub fn get(&self, inode: u64) -> Option<dashmap::mapref::one::Ref<'_, u64, InodeEntry>> {
        self.inode_to_entry.get(&inode)
    }

    /// Returns the path bound to `inode`, if any.
    pub fn path_of(&self, inode: u64) -> Option<String> {
        self.inode_to_entry.get(&inode).map(|e| e.path.clone())
    }

    /// Returns the inode bound to `path`, if any.
    pub fn inode_of(&self, path: &str) -> Option<u64> {
        self.path_to_inode.get(path).map(|r| *r)
    }

    /// Drops `count` kernel references; evicts the inode when the count
    /// reaches zero. Root is never evicted. Returns `true` on eviction.
    pub fn forget(&self, inode: u64, count: u64) -> bool {
        if inode == ROOT_INODE {
            return false;
        }
        if let Some(entry) = self.inode_to_entry.get(&inode)
            && entry.dec_nlookup(count) == 0
        {
            drop(entry);
            if let Some((_, entry)) = self.inode_to_entry.remove(&inode) {
                self.path_to_inode
                    .remove_if(&entry.path, |_, ino| *ino == inode);
                return true;
            }
        }
        false
    }

    /// Unbinds a deleted path. The inode entry survives until the kernel
    /// forgets it.
    pub fn invalidate_path(&self, path: &str) {
        self.path_to_inode.remove(path);
    }

    /// Rebinds an inode after a rename. Descendant paths are rebound too,
    /// since renaming a directory moves its whole subtree.
    pub fn rename(&self, old_path: &str, new_path: &str) {
        let subtree = format!("{old_path}/");
        let moved: Vec<(String, u64)> = self
            .path_to_inode
            .iter()
            .filter(|r| r.key() == old_path || r.key().starts_with(&subtree))
            .map(|r| (r.key().clone(), *r.value()))
            .collect();
        for (path, ino) in moved {
            let rebound = if path == old_path {
                new_path.to_string()
            } else {
                format!("{new_path}{}", &path[old_path.len()..])
            };
            self.path_to_inode.remove(&path);
            self.path_to_inode.insert(rebound.clone(), ino);
            if let Some(mut entry) = self.inode_to_entry.get_mut(&ino) {
                entry.path = rebound;
            }
        }
    }

    /// Number of live inodes, root included.
    pub fn len(&self) -> usize {
        self.inode_to_entry.len()
    }

    /// Whether only the root inode remains.
    pub fn is_empty(&self) -> bool {
        self.inode_to_entry.len() <= 1
    }
}

impl Default for InodeTable {
    fn default() -> Self {
        Self::new()
    }
}
