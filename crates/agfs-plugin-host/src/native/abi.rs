//! C ABI shared with native plugins.
//!
//! A native plugin is a shared library exporting one symbol per vtable
//! slot (see [`crate::native::loader`] for the symbol names). Every slot is
//! optional except the lifecycle core; a missing filesystem slot surfaces
//! as `NotSupported` to callers.
//!
//! Ownership across the boundary is copy-once: the host copies every
//! plugin-returned string or buffer immediately, then releases the plugin's
//! allocation through the `mem_free` slot. Host-owned arguments (paths,
//! config JSON, write payloads) are valid only for the duration of the
//! call.

use std::os::raw::{c_char, c_uchar, c_void};

/// ABI revision expected from `agfs_plugin_abi_version`.
pub const PLUGIN_ABI_VERSION: u32 = 1;

/// Directory entry as it crosses the C boundary.
///
/// String fields are plugin-allocated, NUL-terminated, and may be null.
/// `meta_content` is a JSON object of string-to-string attributes.
#[repr(C)]
pub struct FileInfoRaw {
    /// Entry base name.
    pub name: *const c_char,
    /// Size in bytes.
    pub size: i64,
    /// Permission bits.
    pub mode: u32,
    /// Modification time, Unix seconds.
    pub mtime: i64,
    /// Nonzero when the entry is a directory.
    pub is_dir: i32,
    /// Metadata set name, or null.
    pub meta_name: *const c_char,
    /// Metadata set kind, or null.
    pub meta_kind: *const c_char,
    /// Metadata attributes as a JSON object, or null.
    pub meta_content: *const c_char,
}

/// Plugin-allocated array of directory entries.
#[repr(C)]
pub struct FileInfoArrayRaw {
    /// Array of `count` entries; the host frees it (and every string inside)
    /// through `mem_free`.
    pub items: *mut FileInfoRaw,
    /// Number of entries.
    pub count: usize,
}

/// Opaque plugin state pointer, created by `plugin_new`.
pub type PluginState = *mut c_void;

/// Plugin error return: null on success, else a plugin-allocated
/// NUL-terminated message the host classifies and frees.
pub type ErrorString = *const c_char;

/// Resolved entry points of a loaded native plugin.
///
/// Lifecycle slots are mandatory (the loader fails without them);
/// filesystem slots are optional.
pub struct PluginVtable {
    /// Allocates plugin state.
    pub plugin_new: unsafe extern "C" fn() -> PluginState,
    /// Releases plugin state.
    pub plugin_free: unsafe extern "C" fn(PluginState),
    /// Stable plugin name.
    pub plugin_name: unsafe extern "C" fn(PluginState) -> *const c_char,
    /// Checks a JSON configuration.
    pub plugin_validate: unsafe extern "C" fn(PluginState, *const c_char) -> ErrorString,
    /// Applies a JSON configuration.
    pub plugin_initialize: unsafe extern "C" fn(PluginState, *const c_char) -> ErrorString,
    /// Releases backend resources.
    pub plugin_shutdown: unsafe extern "C" fn(PluginState) -> ErrorString,
    /// Usage notes, or null.
    pub plugin_readme: Option<unsafe extern "C" fn(PluginState) -> *const c_char>,
    /// Frees any allocation the plugin handed to the host.
    pub mem_free: unsafe extern "C" fn(PluginState, *mut c_void),

    /// Creates an empty file.
    pub fs_create: Option<unsafe extern "C" fn(PluginState, *const c_char) -> ErrorString>,
    /// Creates a directory.
    pub fs_mkdir: Option<unsafe extern "C" fn(PluginState, *const c_char, u32) -> ErrorString>,
    /// Removes a file or empty directory.
    pub fs_remove: Option<unsafe extern "C" fn(PluginState, *const c_char) -> ErrorString>,
    /// Removes a subtree.
    pub fs_remove_all: Option<unsafe extern "C" fn(PluginState, *const c_char) -> ErrorString>,
    /// Reads `size` bytes (-1 for all) at `offset` into a plugin-allocated
    /// buffer returned through the out-parameters.
    pub fs_read: Option<
        unsafe extern "C" fn(
            PluginState,
            *const c_char,
            i64,
            i64,
            *mut *mut c_uchar,
            *mut usize,
        ) -> ErrorString,
    >,
    /// Writes a host-owned buffer; bytes written returned via out-parameter.
    pub fs_write: Option<
        unsafe extern "C" fn(
            PluginState,
            *const c_char,
            *const c_uchar,
            usize,
            i64,
            u32,
            *mut i64,
        ) -> ErrorString,
    >,
    /// Lists a directory into a plugin-allocated entry array.
    pub fs_readdir:
        Option<unsafe extern "C" fn(PluginState, *const c_char, *mut FileInfoArrayRaw) -> ErrorString>,
    /// Stats a single entry.
    pub fs_stat:
        Option<unsafe extern "C" fn(PluginState, *const c_char, *mut FileInfoRaw) -> ErrorString>,
    /// Renames an entry.
    pub fs_rename:
        Option<unsafe extern "C" fn(PluginState, *const c_char, *const c_char) -> ErrorString>,
    /// Changes permission bits.
    pub fs_chmod: Option<unsafe extern "C" fn(PluginState, *const c_char, u32) -> ErrorString>,
}
