//! Bounded pool of WASM module instances.
//!
//! WASM instances are single-threaded, so concurrent filesystem requests
//! are served by a pool: idle instances wait in a bounded channel, a live
//! counter caps total instances at `max_instances`, and `acquire` blocks up
//! to `acquire_timeout` before reporting [`FsError::Timeout`].
//!
//! Recycling is lazy. An instance past `max_lifetime` or `max_requests` is
//! destroyed at acquire time, never mid-use; the optional health-check
//! thread only reports utilization, it evicts nothing.

use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError, TrySendError, bounded};
use parking_lot::Mutex;
use tracing::{debug, warn};
use wasmtime::{Engine, Instance, Linker, Memory, Module, Store};

use agfs_core::{Filesystem, FsError, FsResult};

use crate::wasm::host::{self, HostState};

/// Tuning knobs for a [`WasmInstancePool`].
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Hard cap on simultaneously live instances.
    pub max_instances: usize,
    /// Destroy instances older than this at acquire time.
    pub max_lifetime: Option<Duration>,
    /// Destroy instances that served this many requests at acquire time.
    pub max_requests: Option<u64>,
    /// How long `acquire` blocks when the pool is saturated.
    pub acquire_timeout: Duration,
    /// Linear-memory cap per instance.
    pub max_memory_bytes: usize,
    /// Spawn a reporting thread ticking at this interval.
    pub health_check_interval: Option<Duration>,
    /// Maintain request/failure counters.
    pub enable_statistics: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_instances: 10,
            max_lifetime: Some(Duration::from_secs(300)),
            max_requests: Some(1000),
            acquire_timeout: Duration::from_secs(30),
            max_memory_bytes: 64 * 1024 * 1024,
            health_check_interval: None,
            enable_statistics: true,
        }
    }
}

/// Counters maintained by the pool.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Instances ever created.
    pub created: u64,
    /// Instances ever destroyed.
    pub destroyed: u64,
    /// Acquires that had to block on the idle queue.
    pub acquire_waits: u64,
    /// Requests executed through the pool.
    pub requests: u64,
    /// Requests that returned an error.
    pub failed: u64,
}

/// Guest-exported shared buffers, probed once per instance.
///
/// Present only when the guest exports all three of
/// `get_input_buffer_ptr`, `get_output_buffer_ptr`, and
/// `get_shared_buffer_size`.
#[derive(Debug, Clone, Copy)]
pub struct SharedBuffers {
    /// Host-to-guest staging area.
    pub input_ptr: u32,
    /// Guest-to-host staging area.
    pub output_ptr: u32,
    /// Capacity of each buffer in bytes.
    pub size: u32,
}

/// One instantiated WASM module with its store and probed exports.
pub struct WasmInstance {
    pub(crate) store: Store<HostState>,
    pub(crate) instance: Instance,
    pub(crate) memory: Memory,
    pub(crate) shared: Option<SharedBuffers>,
    pub(crate) created_at: Instant,
    pub(crate) request_count: u64,
}

/// A leased instance; returns itself to the pool on drop, including when
/// the caller unwinds.
pub struct PooledInstance<'a> {
    pool: &'a WasmInstancePool,
    inst: Option<WasmInstance>,
}

impl Deref for PooledInstance<'_> {
    type Target = WasmInstance;
    fn deref(&self) -> &WasmInstance {
        self.inst.as_ref().expect("instance present until drop")
    }
}

impl DerefMut for PooledInstance<'_> {
    fn deref_mut(&mut self) -> &mut WasmInstance {
        self.inst.as_mut().expect("instance present until drop")
    }
}

impl Drop for PooledInstance<'_> {
    fn drop(&mut self) {
        if let Some(inst) = self.inst.take() {
            self.pool.release(inst);
        }
    }
}

/// Bounded instance pool for one compiled module.
pub struct WasmInstancePool {
    name: String,
    engine: Engine,
    module: Module,
    linker: Linker<HostState>,
    host_fs: Option<Arc<dyn Filesystem>>,
    config: PoolConfig,
    idle_tx: Sender<WasmInstance>,
    idle_rx: Receiver<WasmInstance>,
    live: Arc<Mutex<usize>>,
    stats: Arc<Mutex<PoolStats>>,
    closed: AtomicBool,
    health: Mutex<Option<(Sender<()>, JoinHandle<()>)>>,
}

impl WasmInstancePool {
    /// Compiles `wasm` and prepares a pool for it; instances are created
    /// lazily on first acquire.
    ///
    /// `host_fs` is the backend exposed to guests through the `agfs_host`
    /// import namespace; `None` makes every host callback fail per call.
    pub fn new(
        name: impl Into<String>,
        wasm: &[u8],
        config: PoolConfig,
        host_fs: Option<Arc<dyn Filesystem>>,
    ) -> FsResult<Self> {
        let name = name.into();
        let engine = Engine::new(&wasmtime::Config::new())
            .map_err(|e| FsError::Io(format!("wasm engine init failed: {e}")))?;
        let module = Module::new(&engine, wasm)
            .map_err(|e| FsError::InvalidArgument(format!("wasm module compile failed: {e}")))?;
        let mut linker = Linker::new(&engine);
        host::register_host_functions(&mut linker)?;

        let (idle_tx, idle_rx) = bounded(config.max_instances.max(1));
        let pool = Self {
            name,
            engine,
            module,
            linker,
            host_fs,
            config,
            idle_tx,
            idle_rx,
            live: Arc::new(Mutex::new(0)),
            stats: Arc::new(Mutex::new(PoolStats::default())),
            closed: AtomicBool::new(false),
            health: Mutex::new(None),
        };
        pool.spawn_health_thread();
        Ok(pool)
    }

    fn spawn_health_thread(&self) {
        let Some(interval) = self.config.health_check_interval else {
            return;
        };
        let (tx, rx) = bounded::<()>(1);
        let stats = Arc::clone(&self.stats);
        let live = Arc::clone(&self.live);
        let idle = self.idle_rx.clone();
        let name = self.name.clone();
        let max = self.config.max_instances;
        let handle = std::thread::spawn(move || {
            loop {
                match rx.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => {
                        let snapshot = *stats.lock();
                        let live_now = *live.lock();
                        debug!(
                            pool = name.as_str(),
                            live = live_now,
                            idle = idle.len(),
                            max,
                            requests = snapshot.requests,
                            failed = snapshot.failed,
                            "pool health"
                        );
                        if live_now == max && idle.is_empty() {
                            warn!(pool = name.as_str(), "pool saturated");
                        }
                    }
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            }
        });
        *self.health.lock() = Some((tx, handle));
    }

    fn create_instance(&self) -> FsResult<WasmInstance> {
        let state = HostState::new(self.host_fs.clone(), self.config.max_memory_bytes);
        let mut store = Store::new(&self.engine, state);
        store.limiter(|s| s.limits_mut());

        let instance = self
            .linker
            .instantiate(&mut store, &self.module)
            .map_err(|e| FsError::Io(format!("wasm instantiation failed: {e}")))?;
        let memory = instance
            .get_memory(&mut store, "memory")
            .ok_or_else(|| FsError::InvalidArgument("wasm module must export memory".into()))?;

        if let Ok(new_fn) = instance.get_typed_func::<(), ()>(&mut store, "plugin_new") {
            new_fn
                .call(&mut store, ())
                .map_err(|e| FsError::Io(format!("plugin_new trapped: {e}")))?;
        }

        let shared = Self::probe_shared_buffers(&instance, &mut store);
        if let Some(buf) = shared {
            debug!(
                pool = self.name.as_str(),
                input = buf.input_ptr,
                output = buf.output_ptr,
                size = buf.size,
                "shared buffers enabled"
            );
        }

        if self.config.enable_statistics {
            self.stats.lock().created += 1;
        }
        Ok(WasmInstance {
            store,
            instance,
            memory,
            shared,
            created_at: Instant::now(),
            request_count: 0,
        })
    }

    /// All three probe exports must resolve, or shared buffers stay off.
    fn probe_shared_buffers(instance: &Instance, store: &mut Store<HostState>) -> Option<SharedBuffers> {
        let input = instance
            .get_typed_func::<(), u32>(&mut *store, "get_input_buffer_ptr")
            .ok()?;
        let output = instance
            .get_typed_func::<(), u32>(&mut *store, "get_output_buffer_ptr")
            .ok()?;
        let size = instance
            .get_typed_func::<(), u32>(&mut *store, "get_shared_buffer_size")
            .ok()?;
        let input_ptr = input.call(&mut *store, ()).ok()?;
        let output_ptr = output.call(&mut *store, ()).ok()?;
        let size = size.call(&mut *store, ()).ok()?;
        if size == 0 {
            return None;
        }
        Some(SharedBuffers {
            input_ptr,
            output_ptr,
            size,
        })
    }

    fn destroy_instance(&self, mut inst: WasmInstance) {
        if let Ok(shutdown) = inst
            .instance
            .get_typed_func::<(), ()>(&mut inst.store, "plugin_shutdown")
            && let Err(e) = shutdown.call(&mut inst.store, ())
        {
            warn!(pool = self.name.as_str(), error = %e, "plugin_shutdown trapped");
        }
        *self.live.lock() -= 1;
        if self.config.enable_statistics {
            self.stats.lock().destroyed += 1;
        }
    }

    fn should_recycle(&self, inst: &WasmInstance) -> bool {
        if let Some(lifetime) = self.config.max_lifetime
            && inst.created_at.elapsed() >= lifetime
        {
            return true;
        }
        if let Some(max) = self.config.max_requests
            && inst.request_count >= max
        {
            return true;
        }
        false
    }

    /// Checks an instance out of the pool.
    ///
    /// Order of attempts: idle queue, create-if-under-cap, blocking wait
    /// until the deadline. Expired instances found on any path are
    /// destroyed and the attempt repeats.
    pub fn acquire(&self) -> FsResult<PooledInstance<'_>> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(FsError::Io(format!("pool {} is closed", self.name)));
        }
        let deadline = Instant::now() + self.config.acquire_timeout;
        let mut waited = false;
        loop {
            match self.idle_rx.try_recv() {
                Ok(inst) => {
                    if self.should_recycle(&inst) {
                        self.destroy_instance(inst);
                        continue;
                    }
                    return Ok(self.lease(inst));
                }
                Err(TryRecvError::Empty | TryRecvError::Disconnected) => {}
            }

            let can_create = {
                let mut live = self.live.lock();
                if *live < self.config.max_instances {
                    *live += 1;
                    true
                } else {
                    false
                }
            };
            if can_create {
                match self.create_instance() {
                    Ok(inst) => return Ok(self.lease(inst)),
                    Err(e) => {
                        *self.live.lock() -= 1;
                        return Err(e);
                    }
                }
            }

            if !waited {
                waited = true;
                if self.config.enable_statistics {
                    self.stats.lock().acquire_waits += 1;
                }
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(FsError::Timeout(format!(
                    "pool {}: no instance within {:?}",
                    self.name, self.config.acquire_timeout
                )));
            }
            match self.idle_rx.recv_timeout(deadline - now) {
                Ok(inst) => {
                    if self.should_recycle(&inst) {
                        self.destroy_instance(inst);
                        continue;
                    }
                    return Ok(self.lease(inst));
                }
                Err(RecvTimeoutError::Timeout) => {
                    return Err(FsError::Timeout(format!(
                        "pool {}: no instance within {:?}",
                        self.name, self.config.acquire_timeout
                    )));
                }
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(FsError::Io(format!("pool {} is closed", self.name)));
                }
            }
        }
    }

    /// Every hand-out counts as a request, so recycling by `max_requests`
    /// applies to direct `acquire` callers as well as `execute`.
    fn lease(&self, mut inst: WasmInstance) -> PooledInstance<'_> {
        inst.request_count += 1;
        PooledInstance {
            pool: self,
            inst: Some(inst),
        }
    }

    fn release(&self, inst: WasmInstance) {
        if self.closed.load(Ordering::SeqCst) {
            self.destroy_instance(inst);
            return;
        }
        match self.idle_tx.try_send(inst) {
            Ok(()) => {
                // close() may have drained between the flag check and the
                // send, parking this instance past the shutdown sweep. If
                // the flag flipped meanwhile, drain the queue ourselves.
                if self.closed.load(Ordering::SeqCst) {
                    while let Ok(inst) = self.idle_rx.try_recv() {
                        self.destroy_instance(inst);
                    }
                }
            }
            Err(TrySendError::Full(inst) | TrySendError::Disconnected(inst)) => {
                self.destroy_instance(inst);
            }
        }
    }

    /// Runs `f` on a pooled instance, releasing it on every exit path.
    pub fn execute<R>(&self, f: impl FnOnce(&mut WasmInstance) -> FsResult<R>) -> FsResult<R> {
        let mut leased = self.acquire()?;
        let result = f(&mut leased);
        if self.config.enable_statistics {
            let mut stats = self.stats.lock();
            stats.requests += 1;
            if result.is_err() {
                stats.failed += 1;
            }
        }
        result
    }

    /// Shuts the pool down: refuses new acquires, destroys idle instances,
    /// and stops the health thread. Instances currently leased are
    /// destroyed on release.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some((tx, handle)) = self.health.lock().take() {
            let _ = tx.send(());
            let _ = handle.join();
        }
        while let Ok(inst) = self.idle_rx.try_recv() {
            self.destroy_instance(inst);
        }
        debug!(pool = self.name.as_str(), "pool closed");
    }

    /// True once [`Self::close`] ran.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Snapshot of the pool counters.
    pub fn stats(&self) -> PoolStats {
        *self.stats.lock()
    }

    /// Instances currently live (leased or idle).
    pub fn live_instances(&self) -> usize {
        *self.live.lock()
    }
}

impl Drop for WasmInstancePool {
    fn drop(&mut self) {
        self.close();
    }
}

impl WasmInstance {
    /// Requests this instance has served.
    pub fn request_count(&self) -> u64 {
        self.request_count
    }

    /// When this instance was created.
    pub fn created_at(&self) -> Instant {
        self.created_at
    }
}
