//! TTL caches for attributes and directory listings.
//!
//! Metadata round trips dominate FUSE traffic, so stat results and listings
//! are cached for a short TTL. Expiry is strict: an entry is served only
//! while the deadline is in the future. A background sweeper drops expired
//! entries so the maps do not grow with cold paths; correctness never
//! depends on the sweeper, [`TtlCache::get`] checks the deadline itself.

use std::collections::HashMap;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{Sender, bounded};
use parking_lot::RwLock;
use tracing::trace;

use agfs_core::FileInfo;

struct Entry<V> {
    value: V,
    expires_at: Instant,
}

type EntryMap<V> = Arc<RwLock<HashMap<String, Entry<V>>>>;

/// A path-keyed cache with a fixed TTL and a background sweeper.
pub struct TtlCache<V> {
    entries: EntryMap<V>,
    ttl: Duration,
    shutdown: Sender<()>,
    sweeper: Option<thread::JoinHandle<()>>,
}

impl<V: Clone + Send + Sync + 'static> TtlCache<V> {
    /// Creates a cache whose entries live for `ttl`.
    pub fn new(ttl: Duration) -> Self {
        let entries: EntryMap<V> = Arc::new(RwLock::new(HashMap::new()));
        let (shutdown, rx) = bounded::<()>(1);
        let sweep_map = Arc::clone(&entries);
        let sweeper = thread::spawn(move || {
            loop {
                match rx.recv_timeout(ttl) {
                    Err(crossbeam_channel::RecvTimeoutError::Timeout) => {
                        let now = Instant::now();
                        let mut map = sweep_map.write();
                        let before = map.len();
                        map.retain(|_, e| e.expires_at > now);
                        let swept = before - map.len();
                        if swept > 0 {
                            trace!(swept, remaining = map.len(), "cache sweep");
                        }
                    }
                    Ok(()) | Err(crossbeam_channel::RecvTimeoutError::Disconnected) => break,
                }
            }
        });
        Self {
            entries,
            ttl,
            shutdown,
            sweeper: Some(sweeper),
        }
    }

    /// Stores `value` under `path`, resetting its deadline.
    pub fn set(&self, path: &str, value: V) {
        self.entries.write().insert(
            path.to_string(),
            Entry {
                value,
                expires_at: Instant::now() + self.ttl,
            },
        );
    }

    /// Returns the cached value if its deadline has not passed.
    pub fn get(&self, path: &str) -> Option<V> {
        let map = self.entries.read();
        let entry = map.get(path)?;
        if entry.expires_at > Instant::now() {
            Some(entry.value.clone())
        } else {
            None
        }
    }

    /// Drops the entry for `path`, if any.
    pub fn delete(&self, path: &str) {
        self.entries.write().remove(path);
    }

    /// Drops `prefix` itself and every path beneath it. `/data` covers
    /// `/data/users` but not `/dataset`.
    pub fn delete_prefix(&self, prefix: &str) {
        if prefix == "/" {
            self.clear();
            return;
        }
        let subtree = format!("{prefix}/");
        self.entries
            .write()
            .retain(|k, _| k != prefix && !k.starts_with(&subtree));
    }

    /// Drops every entry.
    pub fn clear(&self) {
        self.entries.write().clear();
    }

    /// Number of entries currently stored, expired or not.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether the cache holds no entries at all.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl<V> Drop for TtlCache<V> {
    fn drop(&mut self) {
        let _ = self.shutdown.try_send(());
        if let Some(handle) = self.sweeper.take() {
            let _ = handle.join();
        }
    }
}

/// Cache of per-path stat results.
pub struct AttrCache {
    inner: TtlCache<FileInfo>,
}

impl AttrCache {
    /// Creates an attribute cache with the given TTL.
    pub fn new(ttl: Duration) -> Self {
        Self {
            inner: TtlCache::new(ttl),
        }
    }

    /// Returns the cached stat result for `path`.
    pub fn get(&self, path: &str) -> Option<FileInfo> {
        self.inner.get(path)
    }

    /// Caches a stat result.
    pub fn set(&self, path: &str, info: FileInfo) {
        self.inner.set(path, info);
    }

    /// Drops the entry for `path`.
    pub fn invalidate(&self, path: &str) {
        self.inner.delete(path);
    }

    /// Drops `path` and everything beneath it.
    pub fn invalidate_prefix(&self, path: &str) {
        self.inner.delete_prefix(path);
    }

    /// Drops every entry.
    pub fn clear(&self) {
        self.inner.clear();
    }
}

/// Cache of per-directory listings.
pub struct DirCache {
    inner: TtlCache<Vec<FileInfo>>,
}

impl DirCache {
    /// Creates a directory cache with the given TTL.
    pub fn new(ttl: Duration) -> Self {
        Self {
            inner: TtlCache::new(ttl),
        }
    }

    /// Returns the cached listing for `path`.
    pub fn get(&self, path: &str) -> Option<Vec<FileInfo>> {
        self.inner.get(path)
    }

    /// Caches a listing.
    pub fn set(&self, path: &str, entries: Vec<FileInfo>) {
        self.inner.set(path, entries);
    }

    /// Drops the listing for `path`.
    pub fn invalidate(&self, path: &str) {
        self.inner.delete(path);
    }

    /// Drops `path` and every listing beneath it.
    pub fn invalidate_prefix(&self, path: &str) {
        self.inner.delete_prefix(path);
    }

    /// Drops every listing.
    pub fn clear(&self) {
        self.inner.clear();
    }
}
