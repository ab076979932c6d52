//! Open file handles and the hybrid read path.
//!
//! A read drains the block cache first, waits a few milliseconds for
//! blocks the filler already has in flight, and only then falls through
//! to a synchronous network read. Whatever the sync read learns is
//! backfilled into the cache so the next reader finds it warm.

use std::io::SeekFrom;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use retrofs_common::{BLOCK_SIZE, PREFETCH_LOOKAHEAD};
use retrofs_transport::RemoteFd;

use crate::block_cache::BlockId;
use crate::error::VfsError;
use crate::options::WaitOptions;
use crate::pool::Connection;
use crate::vfs::VfsShared;

/// Self-tuning budget for block waits.
///
/// Shared by every file on the VFS. Reads and writes are relaxed: the
/// budget is a heuristic, and a torn update costs at most one mistimed
/// wait.
pub(crate) struct AdaptiveWait {
    budget_ms: AtomicU32,
    options: WaitOptions,
}

impl AdaptiveWait {
    pub(crate) fn new(options: WaitOptions) -> Self {
        let initial = options.initial_ms.clamp(options.min_ms, options.max_ms);
        Self {
            budget_ms: AtomicU32::new(initial),
            options,
        }
    }

    /// Current budget as a duration.
    pub(crate) fn current(&self) -> Duration {
        Duration::from_millis(self.current_ms() as u64)
    }

    /// Current budget in milliseconds.
    pub(crate) fn current_ms(&self) -> u32 {
        self.budget_ms.load(Ordering::Relaxed)
    }

    /// A wait succeeded after `waited`. A success in under half the
    /// budget means the filler is ahead of us; shave a millisecond.
    pub(crate) fn record_success(&self, waited: Duration) {
        let budget = self.budget_ms.load(Ordering::Relaxed);
        if budget > self.options.min_ms && waited.as_millis() < (budget / 2) as u128 {
            self.budget_ms.store(budget - 1, Ordering::Relaxed);
        }
    }

    /// A wait timed out; the filler needs more room.
    pub(crate) fn record_timeout(&self) {
        let budget = self.budget_ms.load(Ordering::Relaxed);
        let grown = (budget + self.options.growth_ms).min(self.options.max_ms);
        self.budget_ms.store(grown, Ordering::Relaxed);
    }
}

/// One open file on a pooled NFS connection.
///
/// Dropping the handle closes the remote file and returns the
/// connection to the pool; [`NfsFile::close`] does the same but
/// surfaces the transport's close result.
pub struct NfsFile {
    shared: Arc<VfsShared>,
    conn: Arc<Connection>,
    fd: RemoteFd,
    path: String,
    offset: u64,
    size: u64,
    closed: bool,
}

impl std::fmt::Debug for NfsFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NfsFile")
            .field("fd", &self.fd)
            .field("path", &self.path)
            .field("offset", &self.offset)
            .field("size", &self.size)
            .field("closed", &self.closed)
            .finish()
    }
}

impl NfsFile {
    pub(crate) fn new(
        shared: Arc<VfsShared>,
        conn: Arc<Connection>,
        fd: RemoteFd,
        path: &str,
        size: u64,
    ) -> Self {
        Self {
            shared,
            conn,
            fd,
            path: path.to_string(),
            offset: 0,
            size,
            closed: false,
        }
    }

    /// URL this file was opened with.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Known file size in bytes.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Current logical offset.
    pub fn tell(&self) -> u64 {
        self.offset
    }

    /// Move the logical offset, clamped to `[0, size]`.
    ///
    /// Pure arithmetic; nothing goes over the network.
    pub fn seek(&mut self, pos: SeekFrom) -> u64 {
        let target = match pos {
            SeekFrom::Start(offset) => offset as i128,
            SeekFrom::Current(delta) => self.offset as i128 + delta as i128,
            SeekFrom::End(delta) => self.size as i128 + delta as i128,
        };
        self.offset = target.clamp(0, self.size as i128) as u64;
        self.offset
    }

    /// Read at the current offset, advancing it by the bytes returned.
    ///
    /// The hybrid path: emit prefetch hints, drain the cache, wait
    /// briefly for the next in-flight block, and escape with a partial
    /// result rather than stall the caller - the host re-enters at the
    /// advanced offset. Only a read that produced nothing from the cache
    /// falls through to a synchronous network read, which then backfills
    /// the cache with every full block it learned.
    ///
    /// `Ok(0)` means end of file.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize, VfsError> {
        if buf.is_empty() || self.offset >= self.size {
            return Ok(0);
        }
        // Never issue past-EOF reads; the cache pads final blocks with
        // zeros beyond the file's real size.
        let len = (buf.len() as u64).min(self.size - self.offset) as usize;
        let buf = &mut buf[..len];

        let block_size = BLOCK_SIZE as u64;
        let start_block = self.offset / block_size;
        for b in start_block..start_block + PREFETCH_LOOKAHEAD {
            self.shared.emit_hint(b);
        }

        let mut total: usize = 0;
        loop {
            let pos = self.offset + total as u64;
            match self.shared.cache.read(pos, &mut buf[total..]) {
                Some(copied) => {
                    total += copied;
                    if total == len {
                        break;
                    }
                    // The next block is by definition absent.
                    let missing = (self.offset + total as u64) / block_size;
                    if self.wait_for_block(missing) {
                        continue;
                    }
                    // Partial hit: hand back what we have now instead of
                    // stalling the emulator loop on one slow block.
                    self.offset += total as u64;
                    return Ok(total);
                }
                None => {
                    // First block absent: wait once, then give up on the
                    // cache for this call.
                    let missing = pos / block_size;
                    if self.wait_for_block(missing) {
                        continue;
                    }
                    break;
                }
            }
        }

        // Synchronous fallback for the unsatisfied tail.
        if total < len {
            let pos = self.offset + total as u64;
            let sync_read = {
                let mut ctx = self.conn.context();
                ctx.pread(self.fd, &mut buf[total..], pos)
            };

            match sync_read {
                Ok(n) if n > 0 => {
                    self.backfill(pos, &buf[total..total + n]);
                    total += n;
                }
                Ok(_) => {}
                Err(e) if total == 0 => return Err(e.into()),
                Err(e) => {
                    // Partial delivery still counts as success.
                    log::warn!("sync read failed after partial cache hit: {}", e);
                }
            }
        }

        self.offset += total as u64;
        Ok(total)
    }

    /// Write at the current offset, advancing it by the bytes written.
    ///
    /// Straight through the connection; every block the write spans is
    /// invalidated before the offset advances so the next read re-fetches
    /// authoritative bytes.
    pub fn write(&mut self, data: &[u8]) -> Result<usize, VfsError> {
        if data.is_empty() {
            return Ok(0);
        }

        let written = {
            let mut ctx = self.conn.context();
            ctx.pwrite(self.fd, data, self.offset)?
        };

        if written > 0 {
            let block_size = BLOCK_SIZE as u64;
            let start = self.offset / block_size;
            let end = (self.offset + written as u64 - 1) / block_size;
            for b in start..=end {
                self.shared.cache.invalidate(b);
            }
            self.offset += written as u64;
            self.size = self.size.max(self.offset);
        }
        Ok(written)
    }

    /// Nothing is buffered on this side; writes already went through.
    pub fn flush(&mut self) -> Result<(), VfsError> {
        Ok(())
    }

    /// Truncation has no NFS-side implementation here.
    pub fn truncate(&mut self, _len: u64) -> Result<(), VfsError> {
        Err(VfsError::unsupported("truncate"))
    }

    /// Close the remote file and return the connection to the pool.
    pub fn close(mut self) -> Result<(), VfsError> {
        self.close_impl()
    }

    fn close_impl(&mut self) -> Result<(), VfsError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        let result = {
            let mut ctx = self.conn.context();
            ctx.close(self.fd)
        };
        self.shared.pool.release(&self.conn);
        result.map_err(Into::into)
    }

    fn wait_for_block(&self, block_id: BlockId) -> bool {
        let budget = self.shared.wait.current();
        let started = Instant::now();
        if self.shared.cache.wait_for(block_id, budget) {
            self.shared.wait.record_success(started.elapsed());
            true
        } else {
            self.shared.wait.record_timeout();
            false
        }
    }

    /// Backfill the cache from a sync read that delivered
    /// `[pos, pos + delivered.len())`.
    ///
    /// Only blocks whose whole span lies inside the delivered range are
    /// inserted; a sub-block read instead hints the filler to complete
    /// the containing block for next time.
    fn backfill(&self, pos: u64, delivered: &[u8]) {
        let block_size = BLOCK_SIZE as u64;
        let sync_end = pos + delivered.len() as u64;
        let first = pos / block_size;
        let last = (sync_end - 1) / block_size;

        for b in first..=last {
            let b_start = b * block_size;
            let b_end = b_start + block_size;
            if pos <= b_start && sync_end >= b_end {
                let at = (b_start - pos) as usize;
                self.shared.cache.put(b, &delivered[at..at + BLOCK_SIZE]);
            } else if delivered.len() < BLOCK_SIZE {
                self.shared.emit_hint(b);
            }
        }
    }
}

impl Drop for NfsFile {
    fn drop(&mut self) {
        if !self.closed {
            if let Err(e) = self.close_impl() {
                log::warn!("close on drop failed for {}: {}", self.path, e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wait_with(initial: u32) -> AdaptiveWait {
        AdaptiveWait::new(WaitOptions {
            initial_ms: initial,
            ..WaitOptions::default()
        })
    }

    #[test]
    fn budget_grows_by_two_on_timeout() {
        let wait = wait_with(4);
        wait.record_timeout();
        assert_eq!(wait.current_ms(), 6);
    }

    #[test]
    fn budget_never_exceeds_the_upper_clamp() {
        let wait = wait_with(4);
        for _ in 0..50 {
            wait.record_timeout();
        }
        assert_eq!(wait.current_ms(), 20);
    }

    #[test]
    fn fast_success_shaves_a_millisecond() {
        let wait = wait_with(10);
        wait.record_success(Duration::from_millis(1));
        assert_eq!(wait.current_ms(), 9);
    }

    #[test]
    fn slow_success_leaves_the_budget_alone() {
        let wait = wait_with(10);
        wait.record_success(Duration::from_millis(8));
        assert_eq!(wait.current_ms(), 10);
    }

    #[test]
    fn budget_never_drops_below_the_lower_clamp() {
        let wait = wait_with(3);
        for _ in 0..10 {
            wait.record_success(Duration::from_millis(0));
        }
        assert_eq!(wait.current_ms(), 2);
    }

    #[test]
    fn initial_budget_is_clamped() {
        let wait = wait_with(100);
        assert_eq!(wait.current_ms(), 20);
    }
}
