//! Guest-memory access helpers for pooled WASM instances.
//!
//! Values cross the guest boundary as NUL-terminated strings or raw byte
//! ranges, addressed by 32-bit guest pointers. Results pack a pointer and a
//! length (or an error pointer) into one `u64`: low 32 bits first, high 32
//! bits second. Buffers travel through the guest's `malloc`/`free` exports,
//! with a shared-buffer fast path when the instance exports one.

use wasmtime::TypedFunc;

use agfs_core::{FsError, FsResult};

use crate::errmsg::classify;
use crate::wasm::pool::WasmInstance;

/// Packs `(low, high)` into the u64 return convention.
pub(crate) fn pack(low: u32, high: u32) -> u64 {
    u64::from(low) | (u64::from(high) << 32)
}

/// Splits a packed return into `(low, high)`.
pub(crate) fn unpack(packed: u64) -> (u32, u32) {
    (packed as u32, (packed >> 32) as u32)
}

/// A host-written guest buffer, released with [`WasmInstance::free_guest`].
#[derive(Debug, Clone, Copy)]
pub(crate) struct GuestBuf {
    pub ptr: u32,
    pub len: u32,
    shared: bool,
}

impl GuestBuf {
    /// Wraps a guest-allocated pointer (e.g. a result buffer the guest
    /// returned) so it can be released through [`WasmInstance::free_guest`].
    pub(crate) fn alloc(ptr: u32) -> Self {
        Self {
            ptr,
            len: 0,
            shared: false,
        }
    }
}

impl WasmInstance {
    /// Resolves a typed guest export; absence is `NotSupported`.
    pub(crate) fn typed_func<P, R>(&mut self, name: &str) -> FsResult<TypedFunc<P, R>>
    where
        P: wasmtime::WasmParams,
        R: wasmtime::WasmResults,
    {
        self.instance
            .get_typed_func::<P, R>(&mut self.store, name)
            .map_err(|_| FsError::NotSupported(format!("{name} not exported by plugin")))
    }

    fn guest_malloc(&mut self, len: u32) -> FsResult<u32> {
        let malloc: TypedFunc<u32, u32> = self
            .instance
            .get_typed_func(&mut self.store, "malloc")
            .map_err(|_| FsError::InvalidArgument("plugin does not export malloc".into()))?;
        let ptr = malloc
            .call(&mut self.store, len.max(1))
            .map_err(|e| FsError::Io(format!("guest malloc trapped: {e}")))?;
        if ptr == 0 {
            return Err(FsError::Io("guest malloc returned null".into()));
        }
        Ok(ptr)
    }

    /// Releases a guest buffer previously written by the host. Shared-buffer
    /// writes need no release; a missing `free` export is tolerated.
    pub(crate) fn free_guest(&mut self, buf: GuestBuf) {
        if buf.shared || buf.ptr == 0 {
            return;
        }
        if let Ok(free) = self
            .instance
            .get_typed_func::<u32, ()>(&mut self.store, "free")
        {
            let _ = free.call(&mut self.store, buf.ptr);
        }
    }

    fn write_at(&mut self, ptr: u32, bytes: &[u8]) -> FsResult<()> {
        self.memory
            .write(&mut self.store, ptr as usize, bytes)
            .map_err(|e| FsError::Io(format!("guest memory write failed: {e}")))
    }

    /// Writes a NUL-terminated string, preferring the shared input buffer.
    pub(crate) fn write_guest_string(&mut self, s: &str) -> FsResult<GuestBuf> {
        let mut bytes = s.as_bytes().to_vec();
        bytes.push(0);
        self.write_guest_raw(&bytes, true)
    }

    /// Writes a NUL-terminated string through `malloc`, bypassing the shared
    /// buffer. Used when two buffers must coexist (rename, write payloads).
    pub(crate) fn write_guest_string_alloc(&mut self, s: &str) -> FsResult<GuestBuf> {
        let mut bytes = s.as_bytes().to_vec();
        bytes.push(0);
        self.write_guest_raw(&bytes, false)
    }

    /// Writes a raw byte buffer, preferring the shared input buffer.
    pub(crate) fn write_guest_bytes(&mut self, data: &[u8]) -> FsResult<GuestBuf> {
        self.write_guest_raw(data, true)
    }

    fn write_guest_raw(&mut self, bytes: &[u8], allow_shared: bool) -> FsResult<GuestBuf> {
        let len = bytes.len() as u32;
        if allow_shared
            && let Some(shared) = self.shared
            && len <= shared.size
        {
            self.write_at(shared.input_ptr, bytes)?;
            return Ok(GuestBuf {
                ptr: shared.input_ptr,
                len,
                shared: true,
            });
        }
        let ptr = self.guest_malloc(len)?;
        self.write_at(ptr, bytes)?;
        Ok(GuestBuf {
            ptr,
            len,
            shared: false,
        })
    }

    /// Copies `len` bytes out of guest memory.
    pub(crate) fn read_guest_bytes(&self, ptr: u32, len: u32) -> FsResult<Vec<u8>> {
        let data = self.memory.data(&self.store);
        let start = ptr as usize;
        let end = start
            .checked_add(len as usize)
            .filter(|end| *end <= data.len())
            .ok_or_else(|| {
                FsError::Io(format!(
                    "guest range [{start}, +{len}) exceeds memory size {}",
                    data.len()
                ))
            })?;
        Ok(data[start..end].to_vec())
    }

    /// Copies a NUL-terminated guest string.
    pub(crate) fn read_guest_cstring(&self, ptr: u32) -> FsResult<String> {
        let data = self.memory.data(&self.store);
        let start = ptr as usize;
        if start >= data.len() {
            return Err(FsError::Io(format!(
                "guest string pointer {ptr} exceeds memory size {}",
                data.len()
            )));
        }
        let nul = data[start..]
            .iter()
            .position(|b| *b == 0)
            .ok_or_else(|| FsError::Io("guest string is not NUL-terminated".into()))?;
        Ok(String::from_utf8_lossy(&data[start..start + nul]).into_owned())
    }

    /// Consumes a guest error pointer: reads the message, frees it, and
    /// classifies it back into the shared taxonomy.
    pub(crate) fn take_guest_error(&mut self, err_ptr: u32) -> FsError {
        match self.read_guest_cstring(err_ptr) {
            Ok(msg) => {
                self.free_guest(GuestBuf {
                    ptr: err_ptr,
                    len: 0,
                    shared: false,
                });
                classify(&msg)
            }
            Err(e) => e,
        }
    }
}
