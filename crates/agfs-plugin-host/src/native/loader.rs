//! Shared-library loading and symbol resolution for native plugins.
//!
//! A plugin library exports one symbol per vtable slot, prefixed
//! `agfs_plugin_` for lifecycle entries and `agfs_fs_` for filesystem
//! operations, plus the mandatory `agfs_plugin_abi_version`. Lifecycle
//! symbols are required; filesystem symbols are optional and resolve to
//! `None` when absent.

use std::path::Path;

use libloading::Library;
use tracing::{debug, info};

use agfs_core::{FsError, FsResult};

use crate::native::abi::{PLUGIN_ABI_VERSION, PluginVtable};
use crate::native::bridge::NativePlugin;

unsafe fn required<T: Copy + 'static>(lib: &Library, name: &'static [u8]) -> FsResult<T> {
    let symbol = unsafe { lib.get::<T>(name) }.map_err(|e| {
        FsError::InvalidArgument(format!(
            "missing required plugin symbol {}: {e}",
            String::from_utf8_lossy(name)
        ))
    })?;
    Ok(*symbol)
}

unsafe fn optional<T: Copy + 'static>(lib: &Library, name: &'static [u8]) -> Option<T> {
    let found = unsafe { lib.get::<T>(name) }.ok().map(|s| *s);
    if found.is_none() {
        debug!(symbol = %String::from_utf8_lossy(name), "optional plugin symbol absent");
    }
    found
}

/// Loads a native plugin from a shared library on disk.
pub fn load_plugin(path: &Path) -> FsResult<NativePlugin> {
    let lib = unsafe { Library::new(path) }
        .map_err(|e| FsError::Io(format!("failed to load {}: {e}", path.display())))?;

    let abi_version: unsafe extern "C" fn() -> u32 =
        unsafe { required(&lib, b"agfs_plugin_abi_version\0") }?;
    let version = unsafe { abi_version() };
    if version != PLUGIN_ABI_VERSION {
        return Err(FsError::InvalidArgument(format!(
            "plugin {} speaks ABI v{version}, host expects v{PLUGIN_ABI_VERSION}",
            path.display()
        )));
    }

    let vtable = unsafe {
        PluginVtable {
            plugin_new: required(&lib, b"agfs_plugin_new\0")?,
            plugin_free: required(&lib, b"agfs_plugin_free\0")?,
            plugin_name: required(&lib, b"agfs_plugin_name\0")?,
            plugin_validate: required(&lib, b"agfs_plugin_validate\0")?,
            plugin_initialize: required(&lib, b"agfs_plugin_initialize\0")?,
            plugin_shutdown: required(&lib, b"agfs_plugin_shutdown\0")?,
            plugin_readme: optional(&lib, b"agfs_plugin_readme\0"),
            mem_free: required(&lib, b"agfs_plugin_mem_free\0")?,
            fs_create: optional(&lib, b"agfs_fs_create\0"),
            fs_mkdir: optional(&lib, b"agfs_fs_mkdir\0"),
            fs_remove: optional(&lib, b"agfs_fs_remove\0"),
            fs_remove_all: optional(&lib, b"agfs_fs_remove_all\0"),
            fs_read: optional(&lib, b"agfs_fs_read\0"),
            fs_write: optional(&lib, b"agfs_fs_write\0"),
            fs_readdir: optional(&lib, b"agfs_fs_readdir\0"),
            fs_stat: optional(&lib, b"agfs_fs_stat\0"),
            fs_rename: optional(&lib, b"agfs_fs_rename\0"),
            fs_chmod: optional(&lib, b"agfs_fs_chmod\0"),
        }
    };

    let plugin = NativePlugin::from_vtable(vtable, Some(lib))?;
    info!(path = %path.display(), plugin = plugin_name(&plugin), "native plugin loaded");
    Ok(plugin)
}

fn plugin_name(plugin: &NativePlugin) -> &str {
    use agfs_core::ServicePlugin as _;
    plugin.name()
}
