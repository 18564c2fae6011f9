//! Mounts a WASM plugin into a [`MountableFs`] namespace next to the
//! in-memory backend it calls back into, covering the full path from a
//! routed VFS operation down to guest code and the `agfs_host` imports.

use std::sync::Arc;

use agfs_core::testing::MemPlugin;
use agfs_core::{Filesystem, FsError, MountableFs, PluginConfig, ServicePlugin};
use agfs_plugin_host::wasm::{PoolConfig, WasmPlugin};

/// A guest that forwards reads to the host filesystem and serves canned
/// metadata. Mutations other than `fs_create` are deliberately missing.
const HOST_BACKED_PLUGIN: &str = r#"
(module
  (import "agfs_host" "fs_read" (func $host_read (param i32 i64 i64) (result i64)))
  (memory (export "memory") 1)
  (global $heap (mut i32) (i32.const 4096))
  (func (export "malloc") (param $n i32) (result i32)
    (local $p i32)
    global.get $heap
    local.set $p
    global.get $heap
    local.get $n
    i32.add
    global.set $heap
    local.get $p)
  (func (export "free") (param i32))
  (func (export "fs_read") (param i32 i64 i64) (result i64)
    local.get 0
    local.get 1
    local.get 2
    call $host_read)
  (func (export "fs_create") (param i32) (result i32)
    i32.const 0)
  (func (export "fs_stat") (param i32) (result i64)
    i64.const 768)
  (func (export "plugin_get_readme") (result i32)
    i32.const 600)
  (data (i32.const 600) "host-backed wasm fixture\00")
  (data (i32.const 768) "{\22name\22:\22data.bin\22,\22size\22:4,\22mode\22:420,\22mtime\22:1700000000,\22is_dir\22:false}\00")
)
"#;

fn mounted() -> (MountableFs, Arc<MemPlugin>, Arc<WasmPlugin>) {
    let vfs = MountableFs::new();
    let mem = Arc::new(MemPlugin::new("mem"));
    vfs.mount("/mem", mem.clone(), PluginConfig::new()).unwrap();

    let wasm = Arc::new(
        WasmPlugin::from_binary(
            "host-backed",
            HOST_BACKED_PLUGIN.as_bytes(),
            PoolConfig::default(),
            Some(mem.filesystem()),
        )
        .unwrap(),
    );
    vfs.mount("/wasm", wasm.clone(), PluginConfig::new()).unwrap();
    (vfs, mem, wasm)
}

#[test]
fn test_read_flows_through_guest_to_host_backend() {
    let (vfs, _mem, _wasm) = mounted();
    vfs.write("/mem/data.bin", b"ping", 0, agfs_core::write_flags::CREATE)
        .unwrap();

    // /wasm/data.bin routes into guest code, which calls back into the
    // same bytes the /mem mount serves.
    assert_eq!(vfs.read("/wasm/data.bin", 0, -1).unwrap(), b"ping");
    assert_eq!(vfs.read("/wasm/data.bin", 1, 2).unwrap(), b"in");
}

#[test]
fn test_read_error_crosses_the_boundary() {
    let (vfs, _mem, _wasm) = mounted();
    assert!(matches!(
        vfs.read("/wasm/missing", 0, -1),
        Err(FsError::Io(_))
    ));
}

#[test]
fn test_stat_decodes_guest_json() {
    let (vfs, _mem, _wasm) = mounted();
    let info = vfs.stat("/wasm/data.bin").unwrap();
    assert_eq!(info.name, "data.bin");
    assert_eq!(info.size, 4);
    assert_eq!(info.mode, 0o644);
    assert!(!info.is_dir);
}

#[test]
fn test_missing_guest_export_is_not_supported() {
    let (vfs, _mem, _wasm) = mounted();
    vfs.create("/wasm/ok").unwrap();
    let err = vfs.mkdir("/wasm/dir", 0o755).unwrap_err();
    assert!(err.is_not_supported());
}

#[test]
fn test_readme_and_shutdown() {
    let (vfs, _mem, wasm) = mounted();
    assert_eq!(wasm.readme(), "host-backed wasm fixture");

    vfs.unmount("/wasm").unwrap();
    let stats = wasm.pool().stats();
    assert_eq!(stats.created, stats.destroyed);
}
