//! Host functions exported to WASM plugins.
//!
//! Guests import these under the `agfs_host` namespace to reach the host
//! filesystem the pool was configured with (typically another mounted
//! backend). Conventions, shared with the guest-export side:
//!
//! - paths arrive as NUL-terminated strings in guest memory;
//! - `fs_read` returns `pack(data_ptr, data_len)`, `0` on error;
//! - `fs_write` returns bytes written, `0` on error;
//! - `fs_stat`/`fs_readdir` return `pack(json_ptr, 0)` on success and
//!   `pack(0, error_ptr)` on failure;
//! - the remaining mutations return `0` on success, an error-string
//!   pointer otherwise.
//!
//! A pool without a host filesystem fails each call individually; host
//! functions never trap on their own.

use std::sync::Arc;

use tracing::{debug, error};
use wasmtime::{Caller, Extern, Linker, Memory, StoreLimits, StoreLimitsBuilder};

use agfs_core::{Filesystem, FsError, FsResult, write_flags};

use crate::wasm::memory::pack;

/// Per-store host data: the filesystem guests may call back into, plus the
/// store's resource limits.
pub struct HostState {
    host_fs: Option<Arc<dyn Filesystem>>,
    limits: StoreLimits,
}

impl HostState {
    /// Creates host state with the given linear-memory cap.
    pub fn new(host_fs: Option<Arc<dyn Filesystem>>, max_memory_bytes: usize) -> Self {
        Self {
            host_fs,
            limits: StoreLimitsBuilder::new().memory_size(max_memory_bytes).build(),
        }
    }

    pub(crate) fn limits_mut(&mut self) -> &mut StoreLimits {
        &mut self.limits
    }

    fn fs(&self) -> FsResult<Arc<dyn Filesystem>> {
        self.host_fs
            .clone()
            .ok_or_else(|| FsError::NotSupported("no host filesystem attached".into()))
    }
}

fn caller_memory(caller: &mut Caller<'_, HostState>) -> Option<Memory> {
    caller.get_export("memory").and_then(Extern::into_memory)
}

fn read_cstring(caller: &Caller<'_, HostState>, memory: &Memory, ptr: u32) -> Option<String> {
    let data = memory.data(caller);
    let start = ptr as usize;
    if start >= data.len() {
        return None;
    }
    let nul = data[start..].iter().position(|b| *b == 0)?;
    Some(String::from_utf8_lossy(&data[start..start + nul]).into_owned())
}

/// Writes `bytes` into guest memory through the guest's `malloc` export.
fn write_guest(caller: &mut Caller<'_, HostState>, memory: &Memory, bytes: &[u8]) -> Option<u32> {
    let malloc = caller.get_export("malloc")?.into_func()?;
    let malloc = malloc.typed::<u32, u32>(&mut *caller).ok()?;
    let ptr = malloc
        .call(&mut *caller, (bytes.len() as u32).max(1))
        .ok()?;
    if ptr == 0 {
        return None;
    }
    memory.write(&mut *caller, ptr as usize, bytes).ok()?;
    Some(ptr)
}

fn write_guest_cstring(
    caller: &mut Caller<'_, HostState>,
    memory: &Memory,
    s: &str,
) -> Option<u32> {
    let mut bytes = s.as_bytes().to_vec();
    bytes.push(0);
    write_guest(caller, memory, &bytes)
}

/// Renders a mutation result: `0` for success, an error-string pointer
/// otherwise (`1` when even the error cannot be written back).
fn mutation_return(
    caller: &mut Caller<'_, HostState>,
    memory: &Memory,
    op: &str,
    result: FsResult<()>,
) -> u64 {
    match result {
        Ok(()) => 0,
        Err(e) => {
            error!(op, error = %e, "host fs call failed");
            u64::from(write_guest_cstring(caller, memory, &e.to_string()).unwrap_or(1))
        }
    }
}

/// Renders a stat/readdir result: `pack(json_ptr, 0)` on success,
/// `pack(0, error_ptr)` on failure.
fn json_return(
    caller: &mut Caller<'_, HostState>,
    memory: &Memory,
    op: &str,
    result: FsResult<String>,
) -> u64 {
    match result {
        Ok(json) => match write_guest_cstring(caller, memory, &json) {
            Some(ptr) => pack(ptr, 0),
            None => 0,
        },
        Err(e) => {
            error!(op, error = %e, "host fs call failed");
            match write_guest_cstring(caller, memory, &e.to_string()) {
                Some(ptr) => pack(0, ptr),
                None => 0,
            }
        }
    }
}

/// Registers the `agfs_host` import namespace on a linker.
pub(crate) fn register_host_functions(linker: &mut Linker<HostState>) -> FsResult<()> {
    let bind = |e: wasmtime::Error| FsError::Io(format!("host function registration failed: {e}"));

    linker
        .func_wrap(
            "agfs_host",
            "fs_read",
            |mut caller: Caller<'_, HostState>, path_ptr: u32, offset: i64, size: i64| -> u64 {
                let Some(memory) = caller_memory(&mut caller) else {
                    return 0;
                };
                let Some(path) = read_cstring(&caller, &memory, path_ptr) else {
                    return 0;
                };
                debug!(path = path.as_str(), offset, size, "host fs_read");
                let data = match caller.data().fs().and_then(|fs| fs.read(&path, offset, size)) {
                    Ok(data) => data,
                    Err(e) => {
                        error!(path = path.as_str(), error = %e, "host fs_read failed");
                        return 0;
                    }
                };
                let len = data.len() as u32;
                match write_guest(&mut caller, &memory, &data) {
                    Some(ptr) => pack(ptr, len),
                    None => 0,
                }
            },
        )
        .map_err(bind)?;

    linker
        .func_wrap(
            "agfs_host",
            "fs_write",
            |mut caller: Caller<'_, HostState>, path_ptr: u32, data_ptr: u32, data_len: u32| -> u64 {
                let Some(memory) = caller_memory(&mut caller) else {
                    return 0;
                };
                let Some(path) = read_cstring(&caller, &memory, path_ptr) else {
                    return 0;
                };
                let start = data_ptr as usize;
                let Some(end) = start.checked_add(data_len as usize) else {
                    return 0;
                };
                let mem = memory.data(&caller);
                if end > mem.len() {
                    return 0;
                }
                let data = mem[start..end].to_vec();
                debug!(path = path.as_str(), len = data.len(), "host fs_write");
                // Guest writes carry no offset or flags; whole-file replace.
                let flags = write_flags::CREATE | write_flags::TRUNCATE;
                match caller.data().fs().and_then(|fs| fs.write(&path, &data, 0, flags)) {
                    Ok(written) => written.max(0) as u64,
                    Err(e) => {
                        error!(path = path.as_str(), error = %e, "host fs_write failed");
                        0
                    }
                }
            },
        )
        .map_err(bind)?;

    linker
        .func_wrap(
            "agfs_host",
            "fs_stat",
            |mut caller: Caller<'_, HostState>, path_ptr: u32| -> u64 {
                let Some(memory) = caller_memory(&mut caller) else {
                    return 0;
                };
                let Some(path) = read_cstring(&caller, &memory, path_ptr) else {
                    return 0;
                };
                let result = caller
                    .data()
                    .fs()
                    .and_then(|fs| fs.stat(&path))
                    .and_then(|info| serde_json::to_string(&info).map_err(Into::into));
                json_return(&mut caller, &memory, "fs_stat", result)
            },
        )
        .map_err(bind)?;

    linker
        .func_wrap(
            "agfs_host",
            "fs_readdir",
            |mut caller: Caller<'_, HostState>, path_ptr: u32| -> u64 {
                let Some(memory) = caller_memory(&mut caller) else {
                    return 0;
                };
                let Some(path) = read_cstring(&caller, &memory, path_ptr) else {
                    return 0;
                };
                let result = caller
                    .data()
                    .fs()
                    .and_then(|fs| fs.read_dir(&path))
                    .and_then(|entries| serde_json::to_string(&entries).map_err(Into::into));
                json_return(&mut caller, &memory, "fs_readdir", result)
            },
        )
        .map_err(bind)?;

    linker
        .func_wrap(
            "agfs_host",
            "fs_create",
            |mut caller: Caller<'_, HostState>, path_ptr: u32| -> u64 {
                let Some(memory) = caller_memory(&mut caller) else {
                    return 1;
                };
                let Some(path) = read_cstring(&caller, &memory, path_ptr) else {
                    return 1;
                };
                let result = caller.data().fs().and_then(|fs| fs.create(&path));
                mutation_return(&mut caller, &memory, "fs_create", result)
            },
        )
        .map_err(bind)?;

    linker
        .func_wrap(
            "agfs_host",
            "fs_mkdir",
            |mut caller: Caller<'_, HostState>, path_ptr: u32, mode: u32| -> u64 {
                let Some(memory) = caller_memory(&mut caller) else {
                    return 1;
                };
                let Some(path) = read_cstring(&caller, &memory, path_ptr) else {
                    return 1;
                };
                let result = caller.data().fs().and_then(|fs| fs.mkdir(&path, mode));
                mutation_return(&mut caller, &memory, "fs_mkdir", result)
            },
        )
        .map_err(bind)?;

    linker
        .func_wrap(
            "agfs_host",
            "fs_remove",
            |mut caller: Caller<'_, HostState>, path_ptr: u32| -> u64 {
                let Some(memory) = caller_memory(&mut caller) else {
                    return 1;
                };
                let Some(path) = read_cstring(&caller, &memory, path_ptr) else {
                    return 1;
                };
                let result = caller.data().fs().and_then(|fs| fs.remove(&path));
                mutation_return(&mut caller, &memory, "fs_remove", result)
            },
        )
        .map_err(bind)?;

    linker
        .func_wrap(
            "agfs_host",
            "fs_remove_all",
            |mut caller: Caller<'_, HostState>, path_ptr: u32| -> u64 {
                let Some(memory) = caller_memory(&mut caller) else {
                    return 1;
                };
                let Some(path) = read_cstring(&caller, &memory, path_ptr) else {
                    return 1;
                };
                let result = caller.data().fs().and_then(|fs| fs.remove_all(&path));
                mutation_return(&mut caller, &memory, "fs_remove_all", result)
            },
        )
        .map_err(bind)?;

    linker
        .func_wrap(
            "agfs_host",
            "fs_rename",
            |mut caller: Caller<'_, HostState>, old_ptr: u32, new_ptr: u32| -> u64 {
                let Some(memory) = caller_memory(&mut caller) else {
                    return 1;
                };
                let (Some(old_path), Some(new_path)) = (
                    read_cstring(&caller, &memory, old_ptr),
                    read_cstring(&caller, &memory, new_ptr),
                ) else {
                    return 1;
                };
                let result = caller
                    .data()
                    .fs()
                    .and_then(|fs| fs.rename(&old_path, &new_path));
                mutation_return(&mut caller, &memory, "fs_rename", result)
            },
        )
        .map_err(bind)?;

    linker
        .func_wrap(
            "agfs_host",
            "fs_chmod",
            |mut caller: Caller<'_, HostState>, path_ptr: u32, mode: u32| -> u64 {
                let Some(memory) = caller_memory(&mut caller) else {
                    return 1;
                };
                let Some(path) = read_cstring(&caller, &memory, path_ptr) else {
                    return 1;
                };
                let result = caller.data().fs().and_then(|fs| fs.chmod(&path, mode));
                mutation_return(&mut caller, &memory, "fs_chmod", result)
            },
        )
        .map_err(bind)?;

    Ok(())
}
