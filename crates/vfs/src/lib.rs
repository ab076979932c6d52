//! Block-cached NFS virtual filesystem for emulator hosts.
//!
//! This crate lets a libretro-style core read ROMs and save data from a
//! remote NFS export through a local-feeling synchronous file surface.
//! A per-read network round trip is fatal to interactive emulation, so
//! reads go through a block cache that an external prefetcher (the
//! "filler") populates ahead of the emulator.
//!
//! # Architecture
//!
//! ```text
//! Layer 3: Host surface (NfsVfs open/stat, NfsFile read/write/seek)
//! Layer 2: Hybrid read path (cache -> bounded wait -> sync fallback -> backfill)
//! Layer 1: Primitives (BlockCache, ConnectionPool, StatCache, PathHints)
//! ```
//!
//! The network backend sits behind the `retrofs_transport` traits; the
//! filler talks to [`BlockCache`] directly and receives block-id hints
//! through the [`PrefetchHook`] registered on the VFS.

pub mod block_cache;
pub mod error;
pub mod file;
pub mod hints;
pub mod options;
pub mod pool;
pub mod stat_cache;
pub mod vfs;

pub use block_cache::{BlockCache, BlockId, BlockRef, CacheConfig, CacheStats};
pub use error::VfsError;
pub use file::NfsFile;
pub use hints::PathHints;
pub use options::{VfsOptions, WaitOptions};
pub use pool::{Connection, ConnectionPool};
pub use stat_cache::StatCache;
pub use vfs::{NfsVfs, PrefetchHook};
