//! Transport traits - the seam between the VFS and the network backend.

use crate::error::TransportError;
use crate::types::{AccessMode, FileStat, RemoteFd};

/// Factory for mounted NFS contexts - implemented by each backend.
pub trait NfsTransport: Send + Sync {
    /// Mount an export and return a context for it.
    ///
    /// May block for multiple seconds; callers must not hold pool-wide
    /// locks across this call.
    fn mount(&self, server: &str, export: &str) -> Result<Box<dyn NfsContext>, TransportError>;
}

/// One mounted (server, export) context.
///
/// Contexts are not reentrant: every call must be serialized by the
/// owning connection's mutex. Methods take `&mut self` to make that
/// explicit at the seam.
pub trait NfsContext: Send + std::fmt::Debug {
    /// Open a file relative to the export root.
    fn open(&mut self, path: &str, mode: AccessMode) -> Result<RemoteFd, TransportError>;

    /// Read up to `buf.len()` bytes at `offset`. Short reads are legal;
    /// 0 means end of file.
    fn pread(
        &mut self,
        fd: RemoteFd,
        buf: &mut [u8],
        offset: u64,
    ) -> Result<usize, TransportError>;

    /// Write `data` at `offset`, extending the file if needed.
    fn pwrite(&mut self, fd: RemoteFd, data: &[u8], offset: u64)
        -> Result<usize, TransportError>;

    /// Stat an open file.
    fn fstat(&mut self, fd: RemoteFd) -> Result<FileStat, TransportError>;

    /// Stat a path relative to the export root.
    fn stat(&mut self, path: &str) -> Result<FileStat, TransportError>;

    /// Close an open file.
    fn close(&mut self, fd: RemoteFd) -> Result<(), TransportError>;

    /// Unmount the export. Open handles become stale.
    fn unmount(&mut self);
}
