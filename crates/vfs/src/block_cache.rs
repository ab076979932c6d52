//! Block cache: fixed-size slots with LRU eviction and waiter signaling.
//!
//! The cache sits between the synchronous read path and the filler. The
//! filler `put`s blocks as they arrive from the network; readers either
//! find their blocks here, wait briefly for an in-flight block, or fall
//! through to a synchronous fetch and backfill what they learned.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │                     BlockCache                       │
//! │  ┌────────────────────────────────────────────────┐  │
//! │  │  slots: Vec<Slot>      (fixed at construction) │  │
//! │  │  index: HashMap<BlockId, usize>                │  │
//! │  │  access_counter: u64   (monotonic LRU stamps)  │  │
//! │  └────────────────────────────────────────────────┘  │
//! │  Condvar broadcast on every block becoming valid     │
//! └──────────────────────────────────────────────────────┘
//! ```
//!
//! # Thread Safety
//!
//! One mutex guards the slot array, the index, and the stamp counter; it
//! is held only for memory work, never across network calls or host
//! callbacks. Waiters block on the condvar with a bounded timeout and
//! re-check the index on every wakeup.

use std::collections::HashMap;
use std::ops::Deref;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use retrofs_common::{BLOCK_SIZE, DEFAULT_CACHE_CAPACITY};

/// File-relative block index: `byte_offset / BLOCK_SIZE`.
pub type BlockId = u64;

/// Configuration for the block cache.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Total cache capacity in bytes. Zero selects the 64MB default.
    pub capacity_bytes: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity_bytes: DEFAULT_CACHE_CAPACITY,
        }
    }
}

impl CacheConfig {
    /// Create a configuration with the given capacity in bytes.
    pub fn with_capacity(capacity_bytes: usize) -> Self {
        Self { capacity_bytes }
    }

    fn slot_count(&self) -> usize {
        let capacity = if self.capacity_bytes == 0 {
            DEFAULT_CACHE_CAPACITY
        } else {
            self.capacity_bytes
        };
        capacity / BLOCK_SIZE
    }
}

/// One fixed storage cell.
///
/// The payload is boxed so its address never moves for the cache's
/// lifetime. Bytes of an invalid slot are undefined and never read.
struct Slot {
    data: Box<[u8]>,
    block_id: BlockId,
    valid: bool,
    last_access: u64,
}

impl Slot {
    fn new() -> Self {
        Self {
            data: vec![0u8; BLOCK_SIZE].into_boxed_slice(),
            block_id: 0,
            valid: false,
            last_access: 0,
        }
    }
}

struct CacheInner {
    slots: Vec<Slot>,
    /// Maps exactly the ids of valid slots to their slot index.
    index: HashMap<BlockId, usize>,
    /// Monotonic stamp source; bumped under the mutex, so ties are
    /// impossible.
    access_counter: u64,
}

impl CacheInner {
    fn next_stamp(&mut self) -> u64 {
        self.access_counter += 1;
        self.access_counter
    }

    /// Pick a victim slot: any invalid slot first, else the valid slot
    /// with the smallest stamp. Evicted ids are unindexed before reuse.
    fn select_victim(&mut self) -> Option<usize> {
        if let Some(idx) = self.slots.iter().position(|s| !s.valid) {
            return Some(idx);
        }

        let idx = self
            .slots
            .iter()
            .enumerate()
            .min_by_key(|(_, s)| s.last_access)
            .map(|(i, _)| i)?;

        self.index.remove(&self.slots[idx].block_id);
        self.slots[idx].valid = false;
        Some(idx)
    }
}

/// Counters describing cache behavior since construction.
#[derive(Debug, Clone, Copy)]
pub struct CacheStats {
    /// Valid blocks currently held.
    pub blocks_cached: usize,
    /// Total slot capacity.
    pub capacity_slots: usize,
    /// Multi-block reads that copied at least one byte.
    pub hits: u64,
    /// Multi-block reads that missed their first block.
    pub misses: u64,
    /// Blocks inserted by `put`.
    pub insertions: u64,
}

/// Thread-safe block cache with LRU eviction.
///
/// All slots are allocated up front; capacity never changes afterwards.
pub struct BlockCache {
    inner: Mutex<CacheInner>,
    available: Condvar,
    hits: AtomicU64,
    misses: AtomicU64,
    insertions: AtomicU64,
}

impl BlockCache {
    /// Create a cache with the given configuration.
    pub fn new(config: CacheConfig) -> Self {
        let slot_count = config.slot_count();
        let mut slots = Vec::with_capacity(slot_count);
        for _ in 0..slot_count {
            slots.push(Slot::new());
        }
        log::info!(
            "block cache initialized: {} slots ({} KB each)",
            slot_count,
            BLOCK_SIZE / 1024
        );

        Self {
            inner: Mutex::new(CacheInner {
                slots,
                index: HashMap::new(),
                access_counter: 0,
            }),
            available: Condvar::new(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            insertions: AtomicU64::new(0),
        }
    }

    /// Create a cache with the default 64MB capacity.
    pub fn with_defaults() -> Self {
        Self::new(CacheConfig::default())
    }

    /// Size of one block in bytes.
    pub fn block_size(&self) -> usize {
        BLOCK_SIZE
    }

    /// Total slot capacity.
    pub fn capacity_slots(&self) -> usize {
        self.inner.lock().unwrap().slots.len()
    }

    /// Number of valid blocks currently held.
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().index.len()
    }

    /// Check if no blocks are held.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Insert a block.
    ///
    /// If the block is already present the call is a no-op: for ROM
    /// streaming the copy already in cache is the warmer one, and
    /// skipping the write avoids tearing a block a reader may be using.
    /// Short payloads are zero-filled to exactly one block.
    ///
    /// # Arguments
    /// * `block_id` - File-relative block index
    /// * `src` - Payload; at most `BLOCK_SIZE` bytes are used
    pub fn put(&self, block_id: BlockId, src: &[u8]) {
        let mut inner = self.inner.lock().unwrap();

        if inner.index.contains_key(&block_id) {
            return;
        }

        let Some(slot_idx) = inner.select_victim() else {
            // Zero-slot cache; nothing to store into.
            return;
        };

        let stamp = inner.next_stamp();
        let slot = &mut inner.slots[slot_idx];
        let copy_len = src.len().min(BLOCK_SIZE);
        slot.data[..copy_len].copy_from_slice(&src[..copy_len]);
        slot.data[copy_len..].fill(0);
        slot.block_id = block_id;
        slot.valid = true;
        slot.last_access = stamp;

        inner.index.insert(block_id, slot_idx);
        drop(inner);

        self.insertions.fetch_add(1, Ordering::Relaxed);
        self.available.notify_all();
    }

    /// Drop a block if present. Waiters are not signaled - nothing new
    /// became available.
    pub fn invalidate(&self, block_id: BlockId) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(slot_idx) = inner.index.remove(&block_id) {
            inner.slots[slot_idx].valid = false;
            log::debug!("invalidated block {}", block_id);
        }
    }

    /// Check whether a block is present.
    pub fn has(&self, block_id: BlockId) -> bool {
        self.inner.lock().unwrap().index.contains_key(&block_id)
    }

    /// Wait until a block is present or the timeout elapses.
    ///
    /// Returns `true` as soon as the block is present, re-checking the
    /// index on spurious wakeups. Returns `false` on timeout.
    pub fn wait_for(&self, block_id: BlockId, timeout: Duration) -> bool {
        let mut inner = self.inner.lock().unwrap();
        if inner.index.contains_key(&block_id) {
            return true;
        }

        let deadline = Instant::now() + timeout;
        loop {
            let now = Instant::now();
            let Some(remaining) = deadline.checked_duration_since(now).filter(|d| !d.is_zero())
            else {
                return false;
            };

            let (guard, result) = self.available.wait_timeout(inner, remaining).unwrap();
            inner = guard;
            if inner.index.contains_key(&block_id) {
                return true;
            }
            if result.timed_out() {
                return false;
            }
        }
    }

    /// Borrow a block's bytes without copying.
    ///
    /// The returned guard holds the cache mutex: keep the borrow short
    /// and do not call back into the cache while holding it. Bumps the
    /// block's access stamp.
    pub fn block(&self, block_id: BlockId) -> Option<BlockRef<'_>> {
        let mut inner = self.inner.lock().unwrap();
        let slot_idx = *inner.index.get(&block_id)?;
        let stamp = inner.next_stamp();
        inner.slots[slot_idx].last_access = stamp;
        Some(BlockRef {
            guard: inner,
            slot_idx,
        })
    }

    /// Copy cached bytes for `[offset, offset + out.len())` into `out`.
    ///
    /// Blocks are walked in order. A missing first block returns `None`
    /// (the caller decides whether to wait); a missing later block stops
    /// the walk and the prefix copied so far is returned as a partial
    /// hit. Every block touched gets a fresh access stamp.
    ///
    /// Zero-length reads return `Some(0)` without touching any slot.
    pub fn read(&self, offset: u64, out: &mut [u8]) -> Option<usize> {
        if out.is_empty() {
            return Some(0);
        }

        let mut inner = self.inner.lock().unwrap();
        let block_size = BLOCK_SIZE as u64;
        let len = out.len() as u64;
        let start_block = offset / block_size;
        let end_block = (offset + len - 1) / block_size;
        let mut copied = 0usize;

        for b in start_block..=end_block {
            let Some(&slot_idx) = inner.index.get(&b) else {
                if copied == 0 {
                    self.misses.fetch_add(1, Ordering::Relaxed);
                    return None;
                }
                break;
            };

            let stamp = inner.next_stamp();
            let slot = &mut inner.slots[slot_idx];
            slot.last_access = stamp;

            let block_offset = if b == start_block {
                (offset % block_size) as usize
            } else {
                0
            };
            let to_copy = (BLOCK_SIZE - block_offset).min(out.len() - copied);
            out[copied..copied + to_copy]
                .copy_from_slice(&slot.data[block_offset..block_offset + to_copy]);
            copied += to_copy;
        }

        self.hits.fetch_add(1, Ordering::Relaxed);
        Some(copied)
    }

    /// Current cache counters.
    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock().unwrap();
        CacheStats {
            blocks_cached: inner.index.len(),
            capacity_slots: inner.slots.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            insertions: self.insertions.load(Ordering::Relaxed),
        }
    }
}

/// Scoped borrow of one cached block's bytes.
///
/// Holds the cache mutex for its lifetime.
pub struct BlockRef<'a> {
    guard: MutexGuard<'a, CacheInner>,
    slot_idx: usize,
}

impl Deref for BlockRef<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.guard.slots[self.slot_idx].data
    }
}

impl AsRef<[u8]> for BlockRef<'_> {
    fn as_ref(&self) -> &[u8] {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn two_slot_cache() -> BlockCache {
        BlockCache::new(CacheConfig::with_capacity(2 * BLOCK_SIZE))
    }

    fn block_of(byte: u8) -> Vec<u8> {
        vec![byte; BLOCK_SIZE]
    }

    #[test]
    fn zero_capacity_selects_default() {
        let cache = BlockCache::new(CacheConfig::with_capacity(0));
        assert_eq!(cache.capacity_slots(), DEFAULT_CACHE_CAPACITY / BLOCK_SIZE);
    }

    #[test]
    fn cold_then_warm_read() {
        let cache = two_slot_cache();
        let mut out = vec![0u8; 16 * 1024];
        assert_eq!(cache.read(0, &mut out), None);

        cache.put(0, &block_of(b'A'));
        assert_eq!(cache.read(0, &mut out), Some(16 * 1024));
        assert!(out.iter().all(|&b| b == b'A'));
    }

    #[test]
    fn short_put_zero_fills_the_tail() {
        let cache = two_slot_cache();
        cache.put(0, b"xyz");

        let block = cache.block(0).unwrap();
        assert_eq!(&block[..3], b"xyz");
        assert!(block[3..].iter().all(|&b| b == 0));
        assert_eq!(block.len(), BLOCK_SIZE);
    }

    #[test]
    fn put_keeps_the_first_copy() {
        let cache = two_slot_cache();
        cache.put(7, &block_of(b'1'));
        cache.put(7, &block_of(b'2'));

        let block = cache.block(7).unwrap();
        assert!(block.iter().all(|&b| b == b'1'));
    }

    #[test]
    fn read_spanning_a_block_boundary() {
        let cache = two_slot_cache();
        cache.put(0, &block_of(b'A'));
        cache.put(1, &block_of(b'B'));

        let mut out = vec![0u8; 8];
        let offset = BLOCK_SIZE as u64 - 4;
        assert_eq!(cache.read(offset, &mut out), Some(8));
        assert_eq!(&out, b"AAAABBBB");
    }

    #[test]
    fn partial_hit_stops_at_the_missing_block() {
        let cache = BlockCache::new(CacheConfig::with_capacity(8 * BLOCK_SIZE));
        cache.put(5, &block_of(b'E'));

        let mut out = vec![0u8; 2 * BLOCK_SIZE];
        let copied = cache.read(5 * BLOCK_SIZE as u64, &mut out).unwrap();
        assert_eq!(copied, BLOCK_SIZE);
        assert!(out[..BLOCK_SIZE].iter().all(|&b| b == b'E'));
    }

    #[test]
    fn zero_length_read_is_a_hitless_zero() {
        let cache = two_slot_cache();
        let mut out = [0u8; 0];
        assert_eq!(cache.read(123, &mut out), Some(0));
        assert_eq!(cache.stats().misses, 0);
    }

    #[test]
    fn lru_eviction_prefers_the_coldest_block() {
        let cache = two_slot_cache();
        cache.put(1, &block_of(b'1'));
        cache.put(2, &block_of(b'2'));

        // Touch block 1 so block 2 becomes the LRU victim.
        let mut out = vec![0u8; 64];
        cache.read(BLOCK_SIZE as u64, &mut out).unwrap();

        cache.put(3, &block_of(b'3'));
        assert!(cache.has(1));
        assert!(!cache.has(2));
        assert!(cache.has(3));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn invalidate_removes_the_block() {
        let cache = two_slot_cache();
        cache.put(4, &block_of(b'X'));
        assert!(cache.has(4));

        cache.invalidate(4);
        assert!(!cache.has(4));
        let mut out = vec![0u8; 64];
        assert_eq!(cache.read(4 * BLOCK_SIZE as u64, &mut out), None);

        // Invalidating an absent block is fine.
        cache.invalidate(4);
    }

    #[test]
    fn capacity_never_exceeded() {
        let cache = two_slot_cache();
        for id in 0..10 {
            cache.put(id, &block_of(id as u8));
            assert!(cache.len() <= 2);
        }
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn wait_for_present_block_returns_immediately() {
        let cache = two_slot_cache();
        cache.put(9, &block_of(b'9'));
        assert!(cache.wait_for(9, Duration::from_millis(0)));
    }

    #[test]
    fn wait_for_timeout_on_empty_cache() {
        let cache = two_slot_cache();
        let started = Instant::now();
        assert!(!cache.wait_for(42, Duration::from_millis(10)));
        assert!(started.elapsed() >= Duration::from_millis(10));
    }

    #[test]
    fn waiter_wakes_on_put() {
        let cache = Arc::new(two_slot_cache());

        let waiter = {
            let cache = Arc::clone(&cache);
            thread::spawn(move || {
                let started = Instant::now();
                let woke = cache.wait_for(9, Duration::from_millis(500));
                (woke, started.elapsed())
            })
        };

        thread::sleep(Duration::from_millis(5));
        cache.put(9, &block_of(b'9'));

        let (woke, waited) = waiter.join().unwrap();
        assert!(woke);
        assert!(waited < Duration::from_millis(200));
    }

    #[test]
    fn block_ref_bumps_the_access_stamp() {
        let cache = two_slot_cache();
        cache.put(1, &block_of(b'1'));
        cache.put(2, &block_of(b'2'));

        // Touching block 1 through the scoped accessor protects it from
        // the next eviction.
        drop(cache.block(1));
        cache.put(3, &block_of(b'3'));
        assert!(cache.has(1));
        assert!(!cache.has(2));
    }

    #[test]
    fn stats_track_hits_misses_and_insertions() {
        let cache = two_slot_cache();
        let mut out = vec![0u8; 16];
        cache.read(0, &mut out);
        cache.put(0, &block_of(b'A'));
        cache.read(0, &mut out);

        let stats = cache.stats();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.insertions, 1);
        assert_eq!(stats.blocks_cached, 1);
        assert_eq!(stats.capacity_slots, 2);
    }
}
