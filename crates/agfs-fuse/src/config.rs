//! Mount configuration for the FUSE frontend.
//!
//! Defaults assume a server on the same host; raise the TTLs for remote
//! servers where metadata round trips are expensive.

use std::time::Duration;

/// Default time-to-live for cached file attributes.
pub const DEFAULT_ATTR_TTL: Duration = Duration::from_secs(5);

/// Default time-to-live for cached directory listings.
pub const DEFAULT_DIR_TTL: Duration = Duration::from_secs(5);

/// Default cap on the streaming read window.
pub const DEFAULT_STREAM_WINDOW: usize = 1024 * 1024;

/// Default maximum write size advertised to the kernel.
pub const DEFAULT_MAX_WRITE: u32 = 1024 * 1024;

/// Tuning knobs for a FUSE mount.
#[derive(Debug, Clone)]
pub struct MountConfig {
    /// Time-to-live for cached file attributes.
    pub attr_ttl: Duration,

    /// Time-to-live for cached directory listings.
    pub dir_ttl: Duration,

    /// Cap on the in-memory window kept for streaming reads.
    pub stream_window: usize,

    /// Maximum write size advertised to the kernel.
    pub max_write: u32,
}

impl Default for MountConfig {
    fn default() -> Self {
        Self {
            attr_ttl: DEFAULT_ATTR_TTL,
            dir_ttl: DEFAULT_DIR_TTL,
            stream_window: DEFAULT_STREAM_WINDOW,
            max_write: DEFAULT_MAX_WRITE,
        }
    }
}

impl MountConfig {
    /// Sets the attribute cache TTL.
    #[must_use]
    pub fn attr_ttl(mut self, ttl: Duration) -> Self {
        self.attr_ttl = ttl;
        self
    }

    /// Sets the directory listing cache TTL.
    #[must_use]
    pub fn dir_ttl(mut self, ttl: Duration) -> Self {
        self.dir_ttl = ttl;
        self
    }

    /// Sets the streaming read window cap.
    #[must_use]
    pub fn stream_window(mut self, bytes: usize) -> Self {
        self.stream_window = bytes;
        self
    }

    /// Sets the maximum write size advertised to the kernel.
    #[must_use]
    pub fn max_write(mut self, bytes: u32) -> Self {
        self.max_write = bytes;
        self
    }
}
