//! Shared constants used across retrofs crates.

use std::time::Duration;

/// Size of one cache block (128KB).
/// Block ids are file-relative indexes: `byte_offset / BLOCK_SIZE`.
pub const BLOCK_SIZE: usize = 128 * 1024;

/// Default block cache capacity (64MB, 512 slots).
pub const DEFAULT_CACHE_CAPACITY: usize = 64 * 1024 * 1024;

/// How long a stat cache entry is served before a fresh network stat.
pub const STAT_CACHE_TTL: Duration = Duration::from_secs(1);

/// Stat cache entry count past which the whole map is cleared.
pub const STAT_CACHE_CLEAR_THRESHOLD: usize = 1000;

/// Initial block-wait budget in milliseconds.
pub const WAIT_INITIAL_MS: u32 = 4;

/// Lower clamp for the adaptive block-wait budget.
pub const WAIT_MIN_MS: u32 = 2;

/// Upper clamp for the adaptive block-wait budget.
pub const WAIT_MAX_MS: u32 = 20;

/// Added to the block-wait budget after a timed-out wait.
pub const WAIT_GROWTH_MS: u32 = 2;

/// Number of blocks hinted to the filler per read, current block included.
pub const PREFETCH_LOOKAHEAD: u64 = 3;
