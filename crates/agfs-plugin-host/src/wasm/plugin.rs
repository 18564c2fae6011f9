//! WASM plugins behind the standard plugin lifecycle.
//!
//! [`WasmPlugin`] compiles a module once and serves every call through its
//! instance pool. [`WasmFs`] dispatches the filesystem surface to guest
//! exports (`fs_create`, `fs_read`, ...); a missing export surfaces as
//! `NotSupported` so callers can fall back, and guest traps normalize into
//! [`FsError::Io`].
//!
//! Guest-export conventions (the mirror image of [`crate::wasm::host`]):
//!
//! - lifecycle: `plugin_validate`/`plugin_initialize` take a config-JSON
//!   pointer and return `0` or an error-string pointer;
//!   `plugin_get_readme` returns a string pointer or `0`;
//! - mutations return `0` or an error-string pointer;
//! - `fs_read` returns `pack(data_ptr, data_len)`, `0` on failure;
//! - `fs_write` returns `pack(error_ptr, bytes_written)`;
//! - `fs_stat`/`fs_readdir` return `pack(json_ptr, error_ptr)` where the
//!   JSON matches [`FileInfo`]'s serde form.

use std::sync::Arc;

use tracing::{debug, warn};
use wasmtime::TypedFunc;

use agfs_core::{FileInfo, Filesystem, FsError, FsResult, PluginConfig, ServicePlugin};

use crate::wasm::memory::{GuestBuf, unpack};
use crate::wasm::pool::{PoolConfig, WasmInstancePool};

/// A WASM module exposed as a [`ServicePlugin`].
pub struct WasmPlugin {
    name: String,
    pool: Arc<WasmInstancePool>,
    fs: Arc<WasmFs>,
}

impl WasmPlugin {
    /// Compiles `wasm` (binary or text form) and prepares the pool.
    ///
    /// `host_fs` is exposed to guest code through the `agfs_host` imports.
    pub fn from_binary(
        name: impl Into<String>,
        wasm: &[u8],
        pool_config: PoolConfig,
        host_fs: Option<Arc<dyn Filesystem>>,
    ) -> FsResult<Self> {
        let name = name.into();
        let pool = Arc::new(WasmInstancePool::new(&name, wasm, pool_config, host_fs)?);
        let fs = Arc::new(WasmFs {
            pool: Arc::clone(&pool),
        });
        debug!(plugin = name.as_str(), "wasm plugin compiled");
        Ok(Self { name, pool, fs })
    }

    /// The pool backing this plugin, for stats and tuning.
    pub fn pool(&self) -> &WasmInstancePool {
        &self.pool
    }

    /// Runs a `(config_ptr) -> error_ptr` lifecycle export; a guest that
    /// does not export it accepts every configuration.
    fn call_lifecycle(&self, export: &str, config: &PluginConfig) -> FsResult<()> {
        let json = serde_json::to_string(config)?;
        self.pool.execute(|inst| {
            let func: TypedFunc<u32, u32> = match inst.typed_func(export) {
                Ok(func) => func,
                Err(e) if e.is_not_supported() => return Ok(()),
                Err(e) => return Err(e),
            };
            let buf = inst.write_guest_string(&json)?;
            let ret = func
                .call(&mut inst.store, buf.ptr)
                .map_err(|e| FsError::Io(format!("{export} trapped: {e}")))?;
            inst.free_guest(buf);
            if ret == 0 {
                Ok(())
            } else {
                Err(inst.take_guest_error(ret))
            }
        })
    }
}

impl ServicePlugin for WasmPlugin {
    fn name(&self) -> &str {
        &self.name
    }

    fn validate(&self, config: &PluginConfig) -> FsResult<()> {
        self.call_lifecycle("plugin_validate", config)
    }

    fn initialize(&self, config: &PluginConfig) -> FsResult<()> {
        self.call_lifecycle("plugin_initialize", config)
    }

    fn filesystem(&self) -> Arc<dyn Filesystem> {
        Arc::clone(&self.fs) as Arc<dyn Filesystem>
    }

    fn readme(&self) -> String {
        let result = self.pool.execute(|inst| {
            let func: TypedFunc<(), u32> = match inst.typed_func("plugin_get_readme") {
                Ok(func) => func,
                Err(_) => return Ok(String::new()),
            };
            let ptr = func
                .call(&mut inst.store, ())
                .map_err(|e| FsError::Io(format!("plugin_get_readme trapped: {e}")))?;
            if ptr == 0 {
                return Ok(String::new());
            }
            let readme = inst.read_guest_cstring(ptr)?;
            inst.free_guest(GuestBuf::alloc(ptr));
            Ok(readme)
        });
        match result {
            Ok(readme) => readme,
            Err(e) => {
                warn!(plugin = self.name.as_str(), error = %e, "readme unavailable");
                String::new()
            }
        }
    }

    fn shutdown(&self) -> FsResult<()> {
        self.pool.close();
        Ok(())
    }
}

/// Filesystem surface dispatching to pooled guest instances.
pub struct WasmFs {
    pool: Arc<WasmInstancePool>,
}

impl WasmFs {
    /// `(path_ptr) -> error_ptr` guest call.
    fn path_mutation(&self, export: &'static str, path: &str) -> FsResult<()> {
        self.pool.execute(|inst| {
            let func: TypedFunc<u32, u32> = inst.typed_func(export)?;
            let buf = inst.write_guest_string(path)?;
            let ret = func
                .call(&mut inst.store, buf.ptr)
                .map_err(|e| FsError::Io(format!("{export} trapped: {e}")))?;
            inst.free_guest(buf);
            if ret == 0 {
                Ok(())
            } else {
                Err(inst.take_guest_error(ret))
            }
        })
    }

    /// `(path_ptr, arg) -> error_ptr` guest call.
    fn path_mode_mutation(&self, export: &'static str, path: &str, mode: u32) -> FsResult<()> {
        self.pool.execute(|inst| {
            let func: TypedFunc<(u32, u32), u32> = inst.typed_func(export)?;
            let buf = inst.write_guest_string(path)?;
            let ret = func
                .call(&mut inst.store, (buf.ptr, mode))
                .map_err(|e| FsError::Io(format!("{export} trapped: {e}")))?;
            inst.free_guest(buf);
            if ret == 0 {
                Ok(())
            } else {
                Err(inst.take_guest_error(ret))
            }
        })
    }

    /// `(path_ptr) -> pack(json_ptr, error_ptr)` guest call.
    fn json_query(&self, export: &'static str, path: &str) -> FsResult<String> {
        self.pool.execute(|inst| {
            let func: TypedFunc<u32, u64> = inst.typed_func(export)?;
            let buf = inst.write_guest_string(path)?;
            let packed = func
                .call(&mut inst.store, buf.ptr)
                .map_err(|e| FsError::Io(format!("{export} trapped: {e}")))?;
            inst.free_guest(buf);
            let (json_ptr, err_ptr) = unpack(packed);
            if err_ptr != 0 {
                return Err(inst.take_guest_error(err_ptr));
            }
            if json_ptr == 0 {
                return Err(FsError::Io(format!("{export} returned no data")));
            }
            let json = inst.read_guest_cstring(json_ptr)?;
            inst.free_guest(GuestBuf::alloc(json_ptr));
            Ok(json)
        })
    }
}

impl Filesystem for WasmFs {
    fn create(&self, path: &str) -> FsResult<()> {
        self.path_mutation("fs_create", path)
    }

    fn mkdir(&self, path: &str, mode: u32) -> FsResult<()> {
        self.path_mode_mutation("fs_mkdir", path, mode)
    }

    fn remove(&self, path: &str) -> FsResult<()> {
        self.path_mutation("fs_remove", path)
    }

    fn remove_all(&self, path: &str) -> FsResult<()> {
        self.path_mutation("fs_remove_all", path)
    }

    fn read(&self, path: &str, offset: i64, size: i64) -> FsResult<Vec<u8>> {
        self.pool.execute(|inst| {
            let func: TypedFunc<(u32, i64, i64), u64> = inst.typed_func("fs_read")?;
            let buf = inst.write_guest_string(path)?;
            let packed = func
                .call(&mut inst.store, (buf.ptr, offset, size))
                .map_err(|e| FsError::Io(format!("fs_read trapped: {e}")))?;
            inst.free_guest(buf);
            let (data_ptr, data_len) = unpack(packed);
            if data_ptr == 0 {
                return Err(FsError::Io(format!("read failed: {path}")));
            }
            let data = inst.read_guest_bytes(data_ptr, data_len)?;
            inst.free_guest(GuestBuf::alloc(data_ptr));
            Ok(data)
        })
    }

    fn write(&self, path: &str, data: &[u8], offset: i64, flags: u32) -> FsResult<i64> {
        self.pool.execute(|inst| {
            let func: TypedFunc<(u32, u32, u32, i64, u32), u64> = inst.typed_func("fs_write")?;
            // Two buffers coexist, so the path bypasses the shared buffer.
            let path_buf = inst.write_guest_string_alloc(path)?;
            let data_buf = inst.write_guest_bytes(data)?;
            let packed = func
                .call(
                    &mut inst.store,
                    (path_buf.ptr, data_buf.ptr, data_buf.len, offset, flags),
                )
                .map_err(|e| FsError::Io(format!("fs_write trapped: {e}")))?;
            inst.free_guest(path_buf);
            inst.free_guest(data_buf);
            let (err_ptr, written) = unpack(packed);
            if err_ptr != 0 {
                return Err(inst.take_guest_error(err_ptr));
            }
            Ok(i64::from(written))
        })
    }

    fn read_dir(&self, path: &str) -> FsResult<Vec<FileInfo>> {
        let json = self.json_query("fs_readdir", path)?;
        serde_json::from_str(&json)
            .map_err(|e| FsError::Io(format!("fs_readdir returned invalid JSON: {e}")))
    }

    fn stat(&self, path: &str) -> FsResult<FileInfo> {
        let json = self.json_query("fs_stat", path)?;
        serde_json::from_str(&json)
            .map_err(|e| FsError::Io(format!("fs_stat returned invalid JSON: {e}")))
    }

    fn rename(&self, old_path: &str, new_path: &str) -> FsResult<()> {
        self.pool.execute(|inst| {
            let func: TypedFunc<(u32, u32), u32> = inst.typed_func("fs_rename")?;
            let old_buf = inst.write_guest_string_alloc(old_path)?;
            let new_buf = inst.write_guest_string_alloc(new_path)?;
            let ret = func
                .call(&mut inst.store, (old_buf.ptr, new_buf.ptr))
                .map_err(|e| FsError::Io(format!("fs_rename trapped: {e}")))?;
            inst.free_guest(old_buf);
            inst.free_guest(new_buf);
            if ret == 0 {
                Ok(())
            } else {
                Err(inst.take_guest_error(ret))
            }
        })
    }

    fn chmod(&self, path: &str, mode: u32) -> FsResult<()> {
        self.path_mode_mutation("fs_chmod", path, mode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agfs_core::testing::MemFs;
    use agfs_core::write_flags;

    // A guest speaking the full export ABI. fs_read forwards to the
    // agfs_host import so the host-function path is covered end to end;
    // the rest answer from static data.
    const FIXTURE: &str = r#"
        (module
          (import "agfs_host" "fs_read"
            (func $host_read (param i32 i64 i64) (result i64)))
          (memory (export "memory") 1)
          (global $heap (mut i32) (i32.const 4096))
          (func (export "malloc") (param i32) (result i32)
            (local $p i32)
            global.get $heap
            local.set $p
            global.get $heap
            local.get 0
            i32.add
            global.set $heap
            local.get $p)
          (func (export "free") (param i32))
          (func (export "get_input_buffer_ptr") (result i32) i32.const 2048)
          (func (export "get_output_buffer_ptr") (result i32) i32.const 3072)
          (func (export "get_shared_buffer_size") (result i32) i32.const 1024)
          (func (export "plugin_validate") (param i32) (result i32)
            local.get 0
            i32.const 1
            i32.add
            i32.load8_u
            i32.const 125
            i32.eq
            if (result i32)
              i32.const 0
            else
              i32.const 640
            end)
          (func (export "plugin_initialize") (param i32) (result i32)
            i32.const 0)
          (func (export "plugin_get_readme") (result i32)
            i32.const 600)
          (func (export "fs_create") (param i32) (result i32)
            local.get 0
            i32.const 1
            i32.add
            i32.load8_u
            i32.const 101
            i32.eq
            if (result i32)
              i32.const 560
            else
              i32.const 0
            end)
          (func (export "fs_mkdir") (param i32 i32) (result i32)
            i32.const 0)
          (func (export "fs_remove") (param i32) (result i32)
            i32.const 700)
          (func (export "fs_remove_all") (param i32) (result i32)
            i32.const 0)
          (func (export "fs_read") (param i32 i64 i64) (result i64)
            local.get 0
            local.get 1
            local.get 2
            call $host_read)
          (func (export "fs_write") (param i32 i32 i32 i64 i32) (result i64)
            local.get 2
            i64.extend_i32_u
            i64.const 32
            i64.shl)
          (func (export "fs_readdir") (param i32) (result i64)
            i64.const 896)
          (func (export "fs_stat") (param i32) (result i64)
            i64.const 768)
          (func (export "fs_rename") (param i32 i32) (result i32)
            i32.const 0)
          (data (i32.const 560) "already exists: /exists\00")
          (data (i32.const 600) "wasm readme\00")
          (data (i32.const 640) "invalid argument: bad config\00")
          (data (i32.const 700) "not found: target\00")
          (data (i32.const 768) "{\"name\":\"wasm.txt\",\"size\":4,\"mode\":420,\"mtime\":1700000000,\"is_dir\":false}\00")
          (data (i32.const 896) "[{\"name\":\"a\",\"size\":0,\"mode\":420,\"mtime\":0,\"is_dir\":false},{\"name\":\"b\",\"size\":0,\"mode\":493,\"mtime\":0,\"is_dir\":true}]\00"))
    "#;

    fn plugin_with_host(host_fs: Option<Arc<dyn Filesystem>>) -> WasmPlugin {
        WasmPlugin::from_binary("wasmtest", FIXTURE.as_bytes(), PoolConfig::default(), host_fs)
            .unwrap()
    }

    #[test]
    fn test_lifecycle_validate_and_readme() {
        let plugin = plugin_with_host(None);
        assert_eq!(plugin.name(), "wasmtest");
        plugin.validate(&PluginConfig::new()).unwrap();

        let mut bad = PluginConfig::new();
        bad.insert("bad".into(), serde_json::Value::Bool(true));
        assert!(matches!(
            plugin.validate(&bad),
            Err(FsError::InvalidArgument(_))
        ));

        plugin.initialize(&PluginConfig::new()).unwrap();
        assert_eq!(plugin.readme(), "wasm readme");
    }

    #[test]
    fn test_guest_error_strings_are_classified() {
        let plugin = plugin_with_host(None);
        let fs = plugin.filesystem();

        fs.create("/new").unwrap();
        assert!(matches!(
            fs.create("/exists"),
            Err(FsError::AlreadyExists(_))
        ));
        assert!(matches!(fs.remove("/anything"), Err(FsError::NotFound(_))));
        fs.remove_all("/tree").unwrap();
        fs.rename("/a", "/b").unwrap();
        fs.mkdir("/dir", 0o755).unwrap();
    }

    #[test]
    fn test_missing_export_is_not_supported() {
        let plugin = plugin_with_host(None);
        let fs = plugin.filesystem();
        // The fixture exports no fs_chmod.
        assert!(fs.chmod("/f", 0o600).unwrap_err().is_not_supported());
    }

    #[test]
    fn test_stat_and_readdir_json_decoding() {
        let plugin = plugin_with_host(None);
        let fs = plugin.filesystem();

        let info = fs.stat("/wasm.txt").unwrap();
        assert_eq!(info.name, "wasm.txt");
        assert_eq!(info.size, 4);
        assert_eq!(info.mode, 0o644);
        assert!(!info.is_dir);

        let entries = fs.read_dir("/").unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].name, "a");
        assert!(entries[1].is_dir);
    }

    #[test]
    fn test_write_reports_bytes_written() {
        let plugin = plugin_with_host(None);
        let fs = plugin.filesystem();
        let written = fs.write("/f", b"payload", 0, 0).unwrap();
        assert_eq!(written, 7);
    }

    #[test]
    fn test_read_round_trips_through_host_filesystem() {
        let mem = Arc::new(MemFs::new());
        mem.write("/shared.txt", b"host data", 0, write_flags::CREATE)
            .unwrap();
        let plugin = plugin_with_host(Some(mem));
        let fs = plugin.filesystem();

        assert_eq!(fs.read("/shared.txt", 0, -1).unwrap(), b"host data");
        assert_eq!(fs.read("/shared.txt", 5, 4).unwrap(), b"data");
    }

    #[test]
    fn test_read_without_host_filesystem_fails() {
        let plugin = plugin_with_host(None);
        let fs = plugin.filesystem();
        assert!(matches!(fs.read("/x", 0, -1), Err(FsError::Io(_))));
    }

    #[test]
    fn test_shutdown_closes_pool() {
        let plugin = plugin_with_host(None);
        plugin.filesystem().create("/new").unwrap();
        plugin.shutdown().unwrap();
        assert!(plugin.pool().is_closed());
        assert!(plugin.filesystem().create("/new").is_err());
    }
}
