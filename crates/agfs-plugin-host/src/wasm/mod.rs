//! WASM plugin bridging: host functions, guest memory, instance pooling.

pub mod host;
mod memory;
pub mod plugin;
pub mod pool;

pub use host::HostState;
pub use plugin::{WasmFs, WasmPlugin};
pub use pool::{PoolConfig, PoolStats, PooledInstance, SharedBuffers, WasmInstance, WasmInstancePool};
