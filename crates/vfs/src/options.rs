//! Configuration options for the VFS.
//!
//! This module provides configuration for VFS behavior: cache sizing
//! and block-wait tuning.

use crate::block_cache::CacheConfig;

/// Configuration options for the VFS.
///
/// # Example
///
/// ```ignore
/// let options = VfsOptions::default()
///     .with_cache(CacheConfig::with_capacity(128 * 1024 * 1024))
///     .with_wait(WaitOptions::default());
///
/// let vfs = NfsVfs::new(transport, options);
/// ```
#[derive(Debug, Clone, Default)]
pub struct VfsOptions {
    /// Block cache configuration.
    pub cache: CacheConfig,
    /// Block-wait tuning.
    pub wait: WaitOptions,
}

impl VfsOptions {
    /// Set the block cache configuration.
    ///
    /// # Arguments
    /// * `cache` - Cache configuration
    pub fn with_cache(mut self, cache: CacheConfig) -> Self {
        self.cache = cache;
        self
    }

    /// Set the block-wait tuning.
    ///
    /// # Arguments
    /// * `wait` - Wait tuning values
    pub fn with_wait(mut self, wait: WaitOptions) -> Self {
        self.wait = wait;
        self
    }
}

/// Tuning for the adaptive block-wait budget.
///
/// The read path waits this long for an in-flight block before falling
/// through to a synchronous network read. The budget self-tunes between
/// `min_ms` and `max_ms`: fast successes shrink it, timeouts grow it,
/// converging on the filler's current delivery latency without
/// configuration.
#[derive(Debug, Clone)]
pub struct WaitOptions {
    /// Starting budget in milliseconds.
    pub initial_ms: u32,
    /// Lower clamp.
    pub min_ms: u32,
    /// Upper clamp.
    pub max_ms: u32,
    /// Added to the budget after a timed-out wait.
    pub growth_ms: u32,
}

impl Default for WaitOptions {
    fn default() -> Self {
        Self {
            initial_ms: retrofs_common::WAIT_INITIAL_MS,
            min_ms: retrofs_common::WAIT_MIN_MS,
            max_ms: retrofs_common::WAIT_MAX_MS,
            growth_ms: retrofs_common::WAIT_GROWTH_MS,
        }
    }
}

impl WaitOptions {
    /// Fix the budget to a constant number of milliseconds.
    ///
    /// Useful in tests and for hosts that want a hard bound.
    pub fn fixed(ms: u32) -> Self {
        Self {
            initial_ms: ms,
            min_ms: ms,
            max_ms: ms,
            growth_ms: 0,
        }
    }
}
