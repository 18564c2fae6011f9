//! Process-wide registry of open file handles.
//!
//! Handle IDs are `i64`, allocated from a single atomic counter starting at
//! 1. An ID is unique across every mount for the life of the process and is
//! never reissued after close: looking up a closed ID yields `NotFound`,
//! exactly like an ID that never existed.
//!
//! Each registered handle carries a lease. Reads, writes, and seeks renew
//! it; [`HandleRegistry::expire_leases`] retires handles whose lease has
//! lapsed, so abandoned clients cannot pin backend resources forever. The
//! sweep is explicit - the registry runs no background tasks.

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::error::{FsError, FsResult};
use crate::fs::{FileHandle, Whence};

/// Default lease duration granted at open and on each renewal.
pub const DEFAULT_LEASE_TTL: Duration = Duration::from_secs(300);

struct LeaseState {
    expires_at: Instant,
    last_access: Instant,
}

/// An open handle as tracked by the registry.
///
/// The inner [`FileHandle`] is behind a mutex: handle operations are
/// stateful (they move the cursor) and must serialize.
pub struct RegisteredHandle {
    id: i64,
    path: String,
    mount_prefix: String,
    inner: Mutex<Box<dyn FileHandle>>,
    lease: Mutex<LeaseState>,
    lease_ttl: Duration,
}

impl RegisteredHandle {
    /// Global handle ID.
    pub fn id(&self) -> i64 {
        self.id
    }

    /// Full (mount-qualified) path the handle was opened on.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Prefix of the mount serving this handle.
    pub fn mount_prefix(&self) -> &str {
        &self.mount_prefix
    }

    fn renew(&self) {
        let now = Instant::now();
        let mut lease = self.lease.lock();
        lease.last_access = now;
        lease.expires_at = now + self.lease_ttl;
    }

    /// True when the lease lapsed before `now`.
    pub fn lease_expired(&self, now: Instant) -> bool {
        self.lease.lock().expires_at <= now
    }

    /// Reads from the handle's cursor, renewing the lease.
    pub fn read(&self, size: usize) -> FsResult<Vec<u8>> {
        self.renew();
        self.inner.lock().read(size)
    }

    /// Writes at the handle's cursor, renewing the lease.
    pub fn write(&self, data: &[u8]) -> FsResult<i64> {
        self.renew();
        self.inner.lock().write(data)
    }

    /// Moves the cursor, renewing the lease.
    pub fn seek(&self, offset: i64, whence: Whence) -> FsResult<i64> {
        self.renew();
        self.inner.lock().seek(offset, whence)
    }

    /// Flushes buffered writes.
    pub fn sync(&self) -> FsResult<()> {
        self.inner.lock().sync()
    }
}

/// Concurrent handle table with monotonically increasing IDs.
pub struct HandleRegistry {
    next_id: AtomicI64,
    handles: DashMap<i64, Arc<RegisteredHandle>>,
    lease_ttl: Duration,
}

impl Default for HandleRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl HandleRegistry {
    /// Creates a registry with [`DEFAULT_LEASE_TTL`].
    pub fn new() -> Self {
        Self::with_lease_ttl(DEFAULT_LEASE_TTL)
    }

    /// Creates a registry with a custom lease duration.
    pub fn with_lease_ttl(lease_ttl: Duration) -> Self {
        Self {
            next_id: AtomicI64::new(1),
            handles: DashMap::new(),
            lease_ttl,
        }
    }

    /// Registers an open handle and returns its freshly allocated ID.
    pub fn register(
        &self,
        path: impl Into<String>,
        mount_prefix: impl Into<String>,
        handle: Box<dyn FileHandle>,
    ) -> i64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let now = Instant::now();
        let registered = Arc::new(RegisteredHandle {
            id,
            path: path.into(),
            mount_prefix: mount_prefix.into(),
            inner: Mutex::new(handle),
            lease: Mutex::new(LeaseState {
                expires_at: now + self.lease_ttl,
                last_access: now,
            }),
            lease_ttl: self.lease_ttl,
        });
        debug!(id, path = registered.path.as_str(), "handle registered");
        self.handles.insert(id, registered);
        id
    }

    /// Looks up a live handle. Closed or never-issued IDs are `NotFound`.
    pub fn get(&self, id: i64) -> FsResult<Arc<RegisteredHandle>> {
        self.handles
            .get(&id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| FsError::NotFound(format!("handle {id}")))
    }

    /// Closes a handle. The ID is retired and will never be reissued.
    pub fn close(&self, id: i64) -> FsResult<()> {
        let (_, handle) = self
            .handles
            .remove(&id)
            .ok_or_else(|| FsError::NotFound(format!("handle {id}")))?;
        if let Err(err) = handle.sync() {
            // Close always succeeds locally; a failed flush is only logged.
            warn!(id, error = %err, "sync on close failed");
        }
        debug!(id, "handle closed");
        Ok(())
    }

    /// Retires every handle whose lease lapsed before `now`; returns the
    /// retired IDs.
    pub fn expire_leases(&self, now: Instant) -> Vec<i64> {
        let expired: Vec<i64> = self
            .handles
            .iter()
            .filter(|entry| entry.value().lease_expired(now))
            .map(|entry| *entry.key())
            .collect();
        for id in &expired {
            if self.handles.remove(id).is_some() {
                debug!(id, "handle lease expired");
            }
        }
        expired
    }

    /// Number of live handles.
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    /// True when no handles are open.
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::{Filesystem, open_flags};
    use crate::testing::MemFs;
    use std::collections::HashSet;
    use std::thread;

    fn open_mem_handle(fs: &MemFs, path: &str) -> Box<dyn FileHandle> {
        fs.create(path).unwrap();
        fs.open_handle(path, open_flags::RDWR, 0o644).unwrap()
    }

    #[test]
    fn test_ids_start_at_one_and_increase() {
        let fs = MemFs::new();
        let registry = HandleRegistry::new();
        let a = registry.register("/a", "/", open_mem_handle(&fs, "/a"));
        let b = registry.register("/b", "/", open_mem_handle(&fs, "/b"));
        assert_eq!(a, 1);
        assert_eq!(b, 2);
    }

    #[test]
    fn test_closed_id_is_never_reissued() {
        let fs = MemFs::new();
        let registry = HandleRegistry::new();
        let first = registry.register("/a", "/", open_mem_handle(&fs, "/a"));
        registry.close(first).unwrap();

        let second = registry.register("/b", "/", open_mem_handle(&fs, "/b"));
        assert!(second > first);
        assert!(matches!(registry.get(first), Err(FsError::NotFound(_))));
    }

    #[test]
    fn test_double_close_is_not_found() {
        let fs = MemFs::new();
        let registry = HandleRegistry::new();
        let id = registry.register("/a", "/", open_mem_handle(&fs, "/a"));
        registry.close(id).unwrap();
        assert!(matches!(registry.close(id), Err(FsError::NotFound(_))));
    }

    #[test]
    fn test_handle_io_via_registry() {
        let fs = MemFs::new();
        let registry = HandleRegistry::new();
        let id = registry.register("/f", "/data", open_mem_handle(&fs, "/f"));

        let handle = registry.get(id).unwrap();
        assert_eq!(handle.mount_prefix(), "/data");
        assert_eq!(handle.write(b"hello").unwrap(), 5);
        assert_eq!(handle.seek(0, Whence::Start).unwrap(), 0);
        assert_eq!(handle.read(5).unwrap(), b"hello");
    }

    #[test]
    fn test_concurrent_registration_yields_unique_ids() {
        let registry = Arc::new(HandleRegistry::new());
        let fs = Arc::new(MemFs::new());
        let mut threads = Vec::new();
        for t in 0..8 {
            let registry = Arc::clone(&registry);
            let fs = Arc::clone(&fs);
            threads.push(thread::spawn(move || {
                let mut ids = Vec::new();
                for i in 0..50 {
                    let path = format!("/t{t}-{i}");
                    ids.push(registry.register(&path, "/", open_mem_handle(&fs, &path)));
                }
                ids
            }));
        }
        let mut seen = HashSet::new();
        for t in threads {
            for id in t.join().unwrap() {
                assert!(seen.insert(id), "duplicate handle id {id}");
            }
        }
        assert_eq!(seen.len(), 400);
        assert_eq!(registry.len(), 400);
    }

    #[test]
    fn test_lease_expiry_sweep() {
        let fs = MemFs::new();
        let registry = HandleRegistry::with_lease_ttl(Duration::from_millis(10));
        let stale = registry.register("/a", "/", open_mem_handle(&fs, "/a"));
        let fresh = registry.register("/b", "/", open_mem_handle(&fs, "/b"));

        thread::sleep(Duration::from_millis(30));
        // Renew the second lease just before the sweep.
        registry.get(fresh).unwrap().read(0).unwrap();

        let expired = registry.expire_leases(Instant::now());
        assert_eq!(expired, vec![stale]);
        assert!(registry.get(stale).is_err());
        assert!(registry.get(fresh).is_ok());
    }
}
