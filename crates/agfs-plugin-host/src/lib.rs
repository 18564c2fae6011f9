//! Plugin hosting for AGFS backends.
//!
//! Two bridge families load out-of-tree filesystem plugins and expose them
//! through the [`agfs_core::ServicePlugin`] and [`agfs_core::Filesystem`]
//! traits:
//!
//! - [`native`]: shared libraries speaking a C vtable ABI, loaded with
//!   `libloading`. Strings and buffers are copied once across the boundary
//!   and released through the plugin's `mem_free`.
//! - [`wasm`]: WebAssembly modules run under wasmtime, with a pooled
//!   instance lifecycle, a guest-export call ABI, and an `agfs_host` import
//!   namespace that lets guests call back into a host filesystem.
//!
//! Plugin error strings are classified back into [`agfs_core::FsError`] by
//! message prefix, so `NotSupported` fallbacks and retry decisions survive
//! the trip through a foreign runtime.

mod errmsg;
pub mod native;
pub mod wasm;

pub use native::{NativeFs, NativePlugin, PLUGIN_ABI_VERSION, load_plugin};
pub use wasm::{PoolConfig, PoolStats, WasmFs, WasmInstancePool, WasmPlugin};
