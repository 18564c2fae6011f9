//! Native (shared-library) plugin bridging.

pub mod abi;
pub mod bridge;
pub mod loader;

pub use abi::{FileInfoArrayRaw, FileInfoRaw, PLUGIN_ABI_VERSION, PluginVtable};
pub use bridge::{NativeFs, NativePlugin};
pub use loader::load_plugin;
