//! Rust-side wrappers over the native plugin vtable.
//!
//! [`NativePlugin`] and [`NativeFs`] present a loaded shared library as a
//! regular [`ServicePlugin`]/[`Filesystem`] pair. All FFI hygiene lives
//! here: arguments are host-owned C strings valid only for the call,
//! results are copied immediately and the plugin's allocation released
//! through `mem_free`, and raw error strings are classified back into
//! [`FsError`]. No raw pointer escapes this module.

use std::collections::BTreeMap;
use std::ffi::{CStr, CString};
use std::os::raw::{c_char, c_uchar, c_void};
use std::ptr;
use std::slice;
use std::sync::Arc;

use tracing::warn;

use agfs_core::{FileInfo, Filesystem, FsError, FsResult, Metadata, PluginConfig, ServicePlugin};

use crate::errmsg::classify;
use crate::native::abi::{ErrorString, FileInfoArrayRaw, FileInfoRaw, PluginState, PluginVtable};

/// Library handle kept alive for as long as any vtable pointer may run.
/// `None` in unit tests that build a vtable from in-process functions.
type LibraryGuard = Option<libloading::Library>;

/// Plugin state plus the code that owns it.
///
/// Shared between the plugin wrapper and its filesystem so the state cannot
/// be freed while either is alive. The plugin contract requires the state to
/// be safe for concurrent calls.
struct SharedState {
    vtable: PluginVtable,
    state: PluginState,
    _lib: LibraryGuard,
}

unsafe impl Send for SharedState {}
unsafe impl Sync for SharedState {}

impl Drop for SharedState {
    fn drop(&mut self) {
        unsafe { (self.vtable.plugin_free)(self.state) };
    }
}

impl SharedState {
    /// Copies and frees a plugin-returned string.
    unsafe fn copy_and_free(&self, ptr: *const c_char) -> Option<String> {
        if ptr.is_null() {
            return None;
        }
        let out = unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned();
        unsafe { (self.vtable.mem_free)(self.state, ptr as *mut c_void) };
        Some(out)
    }

    /// Converts a plugin error return: null is success, anything else is
    /// copied, freed, and classified.
    unsafe fn take_error(&self, err: ErrorString) -> FsResult<()> {
        match unsafe { self.copy_and_free(err) } {
            None => Ok(()),
            Some(msg) => Err(classify(&msg)),
        }
    }

    /// Copies a [`FileInfoRaw`] into owned form, freeing its strings.
    unsafe fn copy_file_info(&self, raw: &FileInfoRaw) -> FileInfo {
        let name = unsafe { self.copy_and_free(raw.name) }.unwrap_or_default();
        let meta_name = unsafe { self.copy_and_free(raw.meta_name) }.unwrap_or_default();
        let meta_kind = unsafe { self.copy_and_free(raw.meta_kind) }.unwrap_or_default();
        let content = unsafe { self.copy_and_free(raw.meta_content) }
            .and_then(|json| serde_json::from_str::<BTreeMap<String, String>>(&json).ok())
            .unwrap_or_default();
        FileInfo {
            name,
            size: raw.size,
            mode: raw.mode,
            mtime: raw.mtime,
            is_dir: raw.is_dir != 0,
            meta: Metadata {
                name: meta_name,
                kind: meta_kind,
                content,
            },
        }
    }
}

fn c_path(path: &str) -> FsResult<CString> {
    CString::new(path)
        .map_err(|_| FsError::InvalidArgument(format!("path contains NUL: {path:?}")))
}

fn empty_info_raw() -> FileInfoRaw {
    FileInfoRaw {
        name: ptr::null(),
        size: 0,
        mode: 0,
        mtime: 0,
        is_dir: 0,
        meta_name: ptr::null(),
        meta_kind: ptr::null(),
        meta_content: ptr::null(),
    }
}

/// A native plugin exposed through the standard plugin lifecycle.
pub struct NativePlugin {
    name: String,
    shared: Arc<SharedState>,
    fs: Arc<NativeFs>,
}

impl NativePlugin {
    /// Wraps a resolved vtable, allocating the plugin state.
    ///
    /// `lib` keeps the shared library mapped; the loader always passes it,
    /// tests that link the vtable into the test binary pass `None`.
    pub(crate) fn from_vtable(vtable: PluginVtable, lib: LibraryGuard) -> FsResult<Self> {
        let state = unsafe { (vtable.plugin_new)() };
        if state.is_null() {
            return Err(FsError::Io("plugin_new returned null state".into()));
        }
        let shared = Arc::new(SharedState {
            vtable,
            state,
            _lib: lib,
        });
        let name_ptr = unsafe { (shared.vtable.plugin_name)(shared.state) };
        let name = unsafe { shared.copy_and_free(name_ptr) }
            .ok_or_else(|| FsError::Io("plugin_name returned null".into()))?;
        let fs = Arc::new(NativeFs {
            shared: Arc::clone(&shared),
        });
        Ok(Self { name, shared, fs })
    }

    fn config_json(config: &PluginConfig) -> FsResult<CString> {
        let json = serde_json::to_string(config)?;
        CString::new(json)
            .map_err(|_| FsError::InvalidArgument("config contains NUL".into()))
    }
}

impl ServicePlugin for NativePlugin {
    fn name(&self) -> &str {
        &self.name
    }

    fn validate(&self, config: &PluginConfig) -> FsResult<()> {
        let json = Self::config_json(config)?;
        unsafe {
            let err = (self.shared.vtable.plugin_validate)(self.shared.state, json.as_ptr());
            self.shared.take_error(err)
        }
    }

    fn initialize(&self, config: &PluginConfig) -> FsResult<()> {
        let json = Self::config_json(config)?;
        unsafe {
            let err = (self.shared.vtable.plugin_initialize)(self.shared.state, json.as_ptr());
            self.shared.take_error(err)
        }
    }

    fn filesystem(&self) -> Arc<dyn Filesystem> {
        Arc::clone(&self.fs) as Arc<dyn Filesystem>
    }

    fn readme(&self) -> String {
        let Some(readme_fn) = self.shared.vtable.plugin_readme else {
            return String::new();
        };
        unsafe {
            let ptr = readme_fn(self.shared.state);
            self.shared.copy_and_free(ptr).unwrap_or_default()
        }
    }

    fn shutdown(&self) -> FsResult<()> {
        unsafe {
            let err = (self.shared.vtable.plugin_shutdown)(self.shared.state);
            self.shared.take_error(err)
        }
    }
}

/// Filesystem surface of a native plugin.
pub struct NativeFs {
    shared: Arc<SharedState>,
}

impl NativeFs {
    fn slot<T: Copy>(slot: Option<T>, op: &str) -> FsResult<T> {
        slot.ok_or_else(|| FsError::NotSupported(format!("{op} not implemented by plugin")))
    }
}

impl Filesystem for NativeFs {
    fn create(&self, path: &str) -> FsResult<()> {
        let f = Self::slot(self.shared.vtable.fs_create, "create")?;
        let path = c_path(path)?;
        unsafe { self.shared.take_error(f(self.shared.state, path.as_ptr())) }
    }

    fn mkdir(&self, path: &str, mode: u32) -> FsResult<()> {
        let f = Self::slot(self.shared.vtable.fs_mkdir, "mkdir")?;
        let path = c_path(path)?;
        unsafe { self.shared.take_error(f(self.shared.state, path.as_ptr(), mode)) }
    }

    fn remove(&self, path: &str) -> FsResult<()> {
        let f = Self::slot(self.shared.vtable.fs_remove, "remove")?;
        let path = c_path(path)?;
        unsafe { self.shared.take_error(f(self.shared.state, path.as_ptr())) }
    }

    fn remove_all(&self, path: &str) -> FsResult<()> {
        let f = Self::slot(self.shared.vtable.fs_remove_all, "remove_all")?;
        let path = c_path(path)?;
        unsafe { self.shared.take_error(f(self.shared.state, path.as_ptr())) }
    }

    fn read(&self, path: &str, offset: i64, size: i64) -> FsResult<Vec<u8>> {
        let f = Self::slot(self.shared.vtable.fs_read, "read")?;
        let path = c_path(path)?;
        let mut buf: *mut c_uchar = ptr::null_mut();
        let mut len: usize = 0;
        unsafe {
            self.shared.take_error(f(
                self.shared.state,
                path.as_ptr(),
                offset,
                size,
                &mut buf,
                &mut len,
            ))?;
            if buf.is_null() {
                return Ok(Vec::new());
            }
            let data = slice::from_raw_parts(buf, len).to_vec();
            (self.shared.vtable.mem_free)(self.shared.state, buf.cast());
            Ok(data)
        }
    }

    fn write(&self, path: &str, data: &[u8], offset: i64, flags: u32) -> FsResult<i64> {
        let f = Self::slot(self.shared.vtable.fs_write, "write")?;
        let path = c_path(path)?;
        let mut written: i64 = 0;
        unsafe {
            self.shared.take_error(f(
                self.shared.state,
                path.as_ptr(),
                data.as_ptr(),
                data.len(),
                offset,
                flags,
                &mut written,
            ))?;
        }
        Ok(written)
    }

    fn read_dir(&self, path: &str) -> FsResult<Vec<FileInfo>> {
        let f = Self::slot(self.shared.vtable.fs_readdir, "read_dir")?;
        let path = c_path(path)?;
        let mut out = FileInfoArrayRaw {
            items: ptr::null_mut(),
            count: 0,
        };
        unsafe {
            self.shared
                .take_error(f(self.shared.state, path.as_ptr(), &mut out))?;
            if out.items.is_null() {
                return Ok(Vec::new());
            }
            let raw_entries = slice::from_raw_parts(out.items, out.count);
            let entries = raw_entries
                .iter()
                .map(|raw| self.shared.copy_file_info(raw))
                .collect();
            (self.shared.vtable.mem_free)(self.shared.state, out.items.cast());
            Ok(entries)
        }
    }

    fn stat(&self, path: &str) -> FsResult<FileInfo> {
        let f = Self::slot(self.shared.vtable.fs_stat, "stat")?;
        let path = c_path(path)?;
        let mut out = empty_info_raw();
        unsafe {
            self.shared
                .take_error(f(self.shared.state, path.as_ptr(), &mut out))?;
            Ok(self.shared.copy_file_info(&out))
        }
    }

    fn rename(&self, old_path: &str, new_path: &str) -> FsResult<()> {
        let f = Self::slot(self.shared.vtable.fs_rename, "rename")?;
        let old_path = c_path(old_path)?;
        let new_path = c_path(new_path)?;
        unsafe {
            self.shared
                .take_error(f(self.shared.state, old_path.as_ptr(), new_path.as_ptr()))
        }
    }

    fn chmod(&self, path: &str, mode: u32) -> FsResult<()> {
        let f = Self::slot(self.shared.vtable.fs_chmod, "chmod")?;
        let path = c_path(path)?;
        unsafe { self.shared.take_error(f(self.shared.state, path.as_ptr(), mode)) }
    }
}

impl Drop for NativePlugin {
    fn drop(&mut self) {
        // State teardown happens in SharedState::drop once the filesystem
        // wrapper is gone too.
        if Arc::strong_count(&self.fs) > 1 {
            warn!(plugin = self.name.as_str(), "plugin dropped with live filesystem references");
        }
    }
}
