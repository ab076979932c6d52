//! The host-facing VFS surface.

use std::sync::{Arc, OnceLock};

use retrofs_common::NfsLocation;
use retrofs_transport::{AccessMode, FileStat, NfsTransport, TransportError};

use crate::block_cache::{BlockCache, BlockId};
use crate::error::VfsError;
use crate::file::{AdaptiveWait, NfsFile};
use crate::hints::PathHints;
use crate::options::VfsOptions;
use crate::pool::ConnectionPool;

/// Callback invoked with block ids the read path wants prefetched.
///
/// Called from inside reads; implementations must not block. Typically
/// this forwards the id to an out-of-process filler which answers with
/// [`BlockCache::put`].
pub type PrefetchHook = Arc<dyn Fn(BlockId) + Send + Sync>;

/// State shared by the VFS front and every open file.
pub(crate) struct VfsShared {
    pub(crate) cache: BlockCache,
    pub(crate) pool: ConnectionPool,
    pub(crate) hints: PathHints,
    pub(crate) wait: AdaptiveWait,
    pub(crate) prefetch: OnceLock<PrefetchHook>,
}

impl VfsShared {
    pub(crate) fn emit_hint(&self, block_id: BlockId) {
        if let Some(hook) = self.prefetch.get() {
            hook(block_id);
        }
    }
}

/// Block-cached virtual filesystem over pooled NFS connections.
///
/// One instance per host process is the expected shape, but nothing
/// here is global: tests construct as many as they like.
pub struct NfsVfs {
    shared: Arc<VfsShared>,
}

impl NfsVfs {
    /// Create a VFS over the given transport.
    ///
    /// # Arguments
    /// * `transport` - Network backend used to mount endpoints
    /// * `options` - Cache and wait tuning
    pub fn new(transport: Arc<dyn NfsTransport>, options: VfsOptions) -> Self {
        Self {
            shared: Arc::new(VfsShared {
                cache: BlockCache::new(options.cache.clone()),
                pool: ConnectionPool::new(transport),
                hints: PathHints::new(),
                wait: AdaptiveWait::new(options.wait.clone()),
                prefetch: OnceLock::new(),
            }),
        }
    }

    /// Create a VFS with default options.
    pub fn with_defaults(transport: Arc<dyn NfsTransport>) -> Self {
        Self::new(transport, VfsOptions::default())
    }

    /// The block cache - also the filler's control surface
    /// (`put`/`has`/`read`/`block_size`).
    pub fn cache(&self) -> &BlockCache {
        &self.shared.cache
    }

    /// The connection pool.
    pub fn pool(&self) -> &ConnectionPool {
        &self.shared.pool
    }

    /// Current adaptive block-wait budget in milliseconds.
    pub fn wait_budget_ms(&self) -> u32 {
        self.shared.wait.current_ms()
    }

    /// Install the prefetch callback. One slot, configured once at
    /// boot; later calls are ignored with a warning.
    pub fn set_prefetch_hook(&self, hook: impl Fn(BlockId) + Send + Sync + 'static) {
        if self.shared.prefetch.set(Arc::new(hook)).is_err() {
            log::warn!("prefetch hook already set; ignoring replacement");
        }
    }

    /// Register the server/export/file split for a URL so `open` and
    /// `stat` never have to guess it from parsing.
    pub fn add_path_hint(&self, full_url: &str, server: &str, export: &str, relative: &str) {
        self.shared
            .hints
            .insert(full_url, NfsLocation::new(server, export, relative));
    }

    /// Open a file.
    ///
    /// `Ok(None)` means the path is not an NFS URL this VFS serves and
    /// the host should fall back to its own file layer. Real failures
    /// (mount, remote open) surface as errors.
    pub fn open(&self, path: &str, mode: AccessMode) -> Result<Option<NfsFile>, VfsError> {
        let Some(location) = self.resolve(path) else {
            return Ok(None);
        };

        let conn = self.shared.pool.acquire(&location.server, &location.export)?;

        let opened = {
            let mut ctx = conn.context();
            ctx.open(&location.file, mode)
        };
        let fd = match opened {
            Ok(fd) => fd,
            Err(e) => {
                log::warn!("open failed for {}: {}", path, e);
                self.shared.pool.release(&conn);
                return Err(e.into());
            }
        };

        let size = {
            let mut ctx = conn.context();
            ctx.fstat(fd).map(|st| st.size).unwrap_or(0)
        };
        log::info!("opened {} ({} bytes)", path, size);

        Ok(Some(NfsFile::new(
            Arc::clone(&self.shared),
            conn,
            fd,
            path,
            size,
        )))
    }

    /// Stat a path.
    ///
    /// Answers from the stat cache when fresh. `Ok(None)` covers both
    /// non-NFS paths and files that do not exist; only transport-level
    /// failures become errors.
    pub fn stat(&self, path: &str) -> Result<Option<FileStat>, VfsError> {
        if !path.starts_with("nfs://") {
            return Ok(None);
        }

        if let Some(stat) = self.shared.pool.stat_cache().get(path) {
            return Ok(Some(stat));
        }

        let Some(location) = self.resolve(path) else {
            return Ok(None);
        };

        let conn = self.shared.pool.acquire(&location.server, &location.export)?;
        let result = {
            let mut ctx = conn.context();
            ctx.stat(&location.file)
        };
        self.shared.pool.release(&conn);

        match result {
            Ok(stat) => {
                self.shared.pool.stat_cache().put(path, stat);
                Ok(Some(stat))
            }
            Err(TransportError::NotFound { .. }) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Unmount everything. Open files on this VFS become stale.
    pub fn shutdown(&self) {
        self.shared.pool.shutdown();
    }

    // The mutation surface below has no NFS-side story in this VFS;
    // everything is rejected the same way, never by panicking.

    /// Removal is rejected.
    pub fn remove(&self, _path: &str) -> Result<(), VfsError> {
        Err(VfsError::unsupported("remove"))
    }

    /// Renaming is rejected.
    pub fn rename(&self, _from: &str, _to: &str) -> Result<(), VfsError> {
        Err(VfsError::unsupported("rename"))
    }

    /// Directory creation is rejected.
    pub fn mkdir(&self, _path: &str) -> Result<(), VfsError> {
        Err(VfsError::unsupported("mkdir"))
    }

    /// Directory enumeration is rejected.
    pub fn read_dir(&self, _path: &str) -> Result<Vec<String>, VfsError> {
        Err(VfsError::unsupported("opendir"))
    }

    /// Hint table first, URL parsing as the fallback. Non-NFS paths and
    /// unparseable URLs resolve to `None` - the host falls back to its
    /// own file layer, so neither is an error.
    fn resolve(&self, path: &str) -> Option<NfsLocation> {
        if !path.starts_with("nfs://") {
            return None;
        }

        if let Some(hint) = self.shared.hints.get(path) {
            return Some(hint);
        }

        match NfsLocation::parse(path) {
            Ok(location) => Some(location),
            Err(e) => {
                log::debug!("no hint and URL did not parse: {}", e);
                None
            }
        }
    }
}
