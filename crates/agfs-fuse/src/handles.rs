//! Open-file state: server handles, stream windows, local fallback.
//!
//! Every FUSE open maps to one of three backings, picked by what the server
//! supports:
//!
//! - **remote**: the server issued a stateful handle; reads and writes are
//!   forwarded as seek-then-IO on that handle.
//! - **stream**: a remote handle promoted to a continuous read stream. A
//!   background thread pulls chunks into a sliding window so the kernel's
//!   offset-based reads can be answered from memory.
//! - **local**: the server issues no handles. Reads fetch the whole file
//!   once and serve every later read from that buffer, so destructive
//!   backends (queues) are consumed exactly once per open. Writes are
//!   forwarded immediately, never buffered.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, SendTimeoutError, Sender, bounded};
use parking_lot::Mutex;
use tracing::{debug, warn};

use agfs_core::{FsError, FsResult, Whence, open_flags, write_flags};

use crate::client::{RemoteClient, StreamReader};

/// Bytes kept in a stream window before the oldest data is trimmed.
pub const STREAM_WINDOW_CAP: usize = 1024 * 1024;

/// Bytes retained behind the read position so short backward seeks do not
/// fall out of the window.
pub const STREAM_REREAD_MARGIN: usize = 64 * 1024;

/// Chunk size the background stream reader requests.
const STREAM_CHUNK: usize = 64 * 1024;

/// How long a read waits for the stream to produce data before returning
/// an empty "no data yet" result.
const STREAM_RECV_TIMEOUT: Duration = Duration::from_secs(5);

/// Chunks buffered between the reader thread and the window.
const STREAM_CHANNEL_DEPTH: usize = 16;

/// Sliding window over a continuous stream, addressed by absolute offset.
#[derive(Debug)]
pub(crate) struct StreamWindow {
    start: u64,
    buf: Vec<u8>,
    cap: usize,
    margin: usize,
}

impl StreamWindow {
    pub(crate) fn new(cap: usize, margin: usize) -> Self {
        Self {
            start: 0,
            buf: Vec::new(),
            cap,
            margin,
        }
    }

    /// First offset past the buffered data.
    pub(crate) fn end(&self) -> u64 {
        self.start + self.buf.len() as u64
    }

    pub(crate) fn append(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// Serves a read from the window. `Some(empty)` means the offset was
    /// already trimmed away; `None` means the window needs more data.
    pub(crate) fn read(&mut self, offset: u64, size: usize) -> Option<Vec<u8>> {
        if offset < self.start {
            return Some(Vec::new());
        }
        if offset >= self.end() {
            return None;
        }
        let lo = (offset - self.start) as usize;
        let hi = lo.saturating_add(size).min(self.buf.len());
        let out = self.buf[lo..hi].to_vec();
        self.trim(offset + out.len() as u64);
        Some(out)
    }

    /// Trims the front of the window down to the cap, but never closer than
    /// `margin` bytes behind the last read position.
    fn trim(&mut self, read_end: u64) {
        if self.buf.len() <= self.cap {
            return;
        }
        let keep_from = read_end.saturating_sub(self.margin as u64).max(self.start);
        let over_cap = self.buf.len() - self.cap;
        let drop_n = over_cap.min((keep_from - self.start) as usize);
        if drop_n > 0 {
            self.buf.drain(..drop_n);
            self.start += drop_n as u64;
        }
    }
}

/// A promoted read stream: the window plus the channel feeding it.
struct StreamState {
    window: StreamWindow,
    rx: Receiver<Vec<u8>>,
    done: bool,
    recv_timeout: Duration,
    cancel: Arc<AtomicBool>,
    // The reader thread is detached on drop; it may be parked in a blocking
    // stream read that only ends when the transport does.
    reader: Option<thread::JoinHandle<()>>,
}

impl StreamState {
    fn start(reader: Box<dyn StreamReader>, window_cap: usize) -> Self {
        let (tx, rx) = bounded(STREAM_CHANNEL_DEPTH);
        let cancel = Arc::new(AtomicBool::new(false));
        let handle = spawn_stream_reader(reader, tx, Arc::clone(&cancel));
        Self {
            window: StreamWindow::new(window_cap, STREAM_REREAD_MARGIN),
            rx,
            done: false,
            recv_timeout: STREAM_RECV_TIMEOUT,
            cancel,
            reader: Some(handle),
        }
    }

    /// Serves a read, pulling chunks off the channel until the window covers
    /// the requested range or the stream ends. A timeout yields whatever is
    /// buffered, possibly empty, never an error.
    fn read(&mut self, offset: u64, size: usize) -> Vec<u8> {
        if size == 0 {
            return Vec::new();
        }
        let want_end = offset + size as u64;
        loop {
            if self.window.end() >= want_end || self.done {
                if let Some(data) = self.window.read(offset, size) {
                    return data;
                }
                // Offset past the end of a finished stream.
                if self.done {
                    return Vec::new();
                }
            }
            match self.rx.recv_timeout(self.recv_timeout) {
                Ok(chunk) => self.window.append(&chunk),
                Err(RecvTimeoutError::Timeout) => {
                    debug!(offset, "stream produced no data before the deadline");
                    return self.window.read(offset, size).unwrap_or_default();
                }
                Err(RecvTimeoutError::Disconnected) => self.done = true,
            }
        }
    }
}

impl Drop for StreamState {
    fn drop(&mut self) {
        self.cancel.store(true, Ordering::Relaxed);
        self.reader.take();
    }
}

fn spawn_stream_reader(
    mut reader: Box<dyn StreamReader>,
    tx: Sender<Vec<u8>>,
    cancel: Arc<AtomicBool>,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let mut buf = vec![0u8; STREAM_CHUNK];
        loop {
            if cancel.load(Ordering::Relaxed) {
                return;
            }
            match reader.read(&mut buf) {
                Ok(0) => return,
                Ok(n) => {
                    let mut pending = buf[..n].to_vec();
                    loop {
                        if cancel.load(Ordering::Relaxed) {
                            return;
                        }
                        match tx.send_timeout(pending, Duration::from_millis(200)) {
                            Ok(()) => break,
                            Err(SendTimeoutError::Timeout(chunk)) => pending = chunk,
                            Err(SendTimeoutError::Disconnected(_)) => return,
                        }
                    }
                }
                Err(e) => {
                    debug!(error = %e, "stream reader stopped");
                    return;
                }
            }
        }
    })
}

enum Backing {
    Remote { server_handle: i64 },
    Stream { server_handle: i64, stream: StreamState },
    Local { content: Option<Vec<u8>> },
}

struct OpenFile {
    path: String,
    backing: Backing,
}

fn bad_handle(fh: u64) -> FsError {
    FsError::InvalidArgument(format!("unknown file handle {fh}"))
}

/// Tracks every open FUSE handle and routes IO to its backing.
///
/// Each handle carries its own lock; the map lock is only held for
/// insert/lookup/remove, so a blocking server call on one handle never
/// stalls IO on another.
pub struct HandleManager<C: RemoteClient> {
    client: Arc<C>,
    window_cap: usize,
    next_fh: AtomicU64,
    open: Mutex<HashMap<u64, Arc<Mutex<OpenFile>>>>,
}

impl<C: RemoteClient> HandleManager<C> {
    /// Creates a manager issuing handles against `client`.
    pub fn new(client: Arc<C>, window_cap: usize) -> Self {
        Self {
            client,
            window_cap,
            next_fh: AtomicU64::new(1),
            open: Mutex::new(HashMap::new()),
        }
    }

    /// Opens `path`, picking the best backing the server supports.
    pub fn open(&self, path: &str, flags: u32) -> FsResult<u64> {
        let backing = match self.client.open_handle(path, flags) {
            Ok(server_handle) => self.promote(path, server_handle, flags),
            Err(e) if e.is_not_supported() => {
                debug!(path, "server issues no handles, using local backing");
                Backing::Local { content: None }
            }
            Err(e) => return Err(e),
        };
        let fh = self.next_fh.fetch_add(1, Ordering::SeqCst);
        self.open.lock().insert(
            fh,
            Arc::new(Mutex::new(OpenFile {
                path: path.to_string(),
                backing,
            })),
        );
        Ok(fh)
    }

    fn lookup(&self, fh: u64) -> FsResult<Arc<Mutex<OpenFile>>> {
        self.open
            .lock()
            .get(&fh)
            .cloned()
            .ok_or_else(|| bad_handle(fh))
    }

    /// Tries to promote a readable server handle to a stream.
    fn promote(&self, path: &str, server_handle: i64, flags: u32) -> Backing {
        let readable = flags & open_flags::ACCMODE != open_flags::WRONLY;
        let streaming = self
            .client
            .capabilities()
            .map(|caps| caps.supports_stream_read)
            .unwrap_or(false);
        if readable && streaming {
            match self.client.open_stream(server_handle) {
                Ok(reader) => {
                    debug!(path, server_handle, "promoted handle to stream");
                    return Backing::Stream {
                        server_handle,
                        stream: StreamState::start(reader, self.window_cap),
                    };
                }
                Err(e) if e.is_not_supported() => {}
                Err(e) => warn!(path, error = %e, "stream promotion failed, keeping plain handle"),
            }
        }
        Backing::Remote { server_handle }
    }

    /// Reads `size` bytes at `offset` from an open handle.
    pub fn read(&self, fh: u64, offset: i64, size: u32) -> FsResult<Vec<u8>> {
        let entry = self.lookup(fh)?;
        let mut guard = entry.lock();
        let file = &mut *guard;
        match &mut file.backing {
            Backing::Remote { server_handle } => {
                self.client.seek_handle(*server_handle, offset, Whence::Start)?;
                self.client.read_handle(*server_handle, i64::from(size))
            }
            Backing::Stream { stream, .. } => Ok(stream.read(offset as u64, size as usize)),
            Backing::Local { content } => {
                let buf = match content {
                    Some(buf) => buf,
                    // One full fetch per open; destructive backends hand
                    // their data over exactly once.
                    None => content.insert(self.client.read(&file.path, 0, -1)?),
                };
                let len = buf.len();
                let lo = usize::try_from(offset).unwrap_or(usize::MAX).min(len);
                let hi = lo.saturating_add(size as usize).min(len);
                Ok(buf[lo..hi].to_vec())
            }
        }
    }

    /// Writes `data` at `offset` through an open handle, returning bytes
    /// written.
    pub fn write(&self, fh: u64, offset: i64, data: &[u8]) -> FsResult<i64> {
        let entry = self.lookup(fh)?;
        let mut guard = entry.lock();
        let file = &mut *guard;
        match &mut file.backing {
            Backing::Remote { server_handle } | Backing::Stream { server_handle, .. } => {
                self.client.seek_handle(*server_handle, offset, Whence::Start)?;
                self.client.write_handle(*server_handle, data)
            }
            Backing::Local { .. } => {
                self.client
                    .write(&file.path, data, offset, write_flags::CREATE)
            }
        }
    }

    /// Flushes an open handle. Local backings have nothing to flush.
    pub fn sync(&self, fh: u64) -> FsResult<()> {
        let entry = self.lookup(fh)?;
        let file = entry.lock();
        match &file.backing {
            Backing::Remote { server_handle } | Backing::Stream { server_handle, .. } => {
                self.client.sync_handle(*server_handle)
            }
            Backing::Local { .. } => Ok(()),
        }
    }

    /// Closes an open handle, cancelling any stream reader and closing the
    /// server side where one exists.
    pub fn close(&self, fh: u64) -> FsResult<()> {
        let entry = self.open.lock().remove(&fh).ok_or_else(|| bad_handle(fh))?;
        // Locking the entry waits out any in-flight IO on this handle.
        let backing = {
            let mut file = entry.lock();
            std::mem::replace(&mut file.backing, Backing::Local { content: None })
        };
        match backing {
            Backing::Remote { server_handle } => self.client.close_handle(server_handle),
            Backing::Stream {
                server_handle,
                stream,
            } => {
                drop(stream);
                self.client.close_handle(server_handle)
            }
            Backing::Local { .. } => Ok(()),
        }
    }

    /// Closes every open handle; used at unmount.
    pub fn close_all(&self) {
        let drained: Vec<u64> = self.open.lock().keys().copied().collect();
        for fh in drained {
            if let Err(e) = self.close(fh) {
                warn!(fh, error = %e, "close at unmount failed");
            }
        }
    }

    /// Path of an open handle, if it exists.
    pub fn path_of(&self, fh: u64) -> Option<String> {
        let entry = self.open.lock().get(&fh).cloned()?;
        let path = entry.lock().path.clone();
        Some(path)
    }

    /// Number of open handles.
    pub fn len(&self) -> usize {
        self.open.lock().len()
    }

    /// Whether no handles are open.
    pub fn is_empty(&self) -> bool {
        self.open.lock().is_empty()
    }
}
