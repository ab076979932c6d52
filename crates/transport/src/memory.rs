//! In-memory NFS transport.
//!
//! Serves exports straight from process memory. Used by the test suites
//! and by hosts that want the full VFS stack without a network (demo
//! content, CI). Mounts can be delayed or forced to fail so pool tests
//! can exercise the concurrent-mount paths.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use std::thread;
use std::time::Duration;

use crate::error::TransportError;
use crate::traits::{NfsContext, NfsTransport};
use crate::types::{AccessMode, FileStat, RemoteFd};

/// Contents of one export: file path -> bytes.
type ExportTree = Arc<RwLock<HashMap<String, Vec<u8>>>>;

/// In-memory transport serving exports from process memory.
///
/// All contexts mounted from the same `MemoryNfs` share the same file
/// trees, so writes through one connection are visible to every other.
#[derive(Default)]
pub struct MemoryNfs {
    exports: RwLock<HashMap<String, ExportTree>>,
    mount_delay: Option<Duration>,
    fail_mounts: bool,
    mounts: AtomicUsize,
}

impl MemoryNfs {
    /// Create an empty transport with no exports.
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every mount by `delay`, emulating a slow server.
    pub fn with_mount_delay(mut self, delay: Duration) -> Self {
        self.mount_delay = Some(delay);
        self
    }

    /// Make every mount fail, emulating an unreachable server.
    pub fn with_failing_mounts(mut self) -> Self {
        self.fail_mounts = true;
        self
    }

    /// Register an export so it can be mounted.
    ///
    /// # Arguments
    /// * `server` - Server name the export is reachable under
    /// * `export` - Export path on that server
    pub fn add_export(&self, server: &str, export: &str) {
        self.exports
            .write()
            .unwrap()
            .entry(endpoint_key(server, export))
            .or_default();
    }

    /// Put a file into an export, registering the export if needed.
    ///
    /// # Arguments
    /// * `server` - Server name
    /// * `export` - Export path
    /// * `path` - File path relative to the export root
    /// * `data` - File contents
    pub fn add_file(&self, server: &str, export: &str, path: &str, data: Vec<u8>) {
        let tree = self
            .exports
            .write()
            .unwrap()
            .entry(endpoint_key(server, export))
            .or_default()
            .clone();
        tree.write().unwrap().insert(path.to_string(), data);
    }

    /// Read a file's current contents, if present.
    pub fn file_contents(&self, server: &str, export: &str, path: &str) -> Option<Vec<u8>> {
        let tree = self
            .exports
            .read()
            .unwrap()
            .get(&endpoint_key(server, export))?
            .clone();
        let tree = tree.read().unwrap();
        tree.get(path).cloned()
    }

    /// Number of successful mounts performed so far.
    pub fn mount_count(&self) -> usize {
        self.mounts.load(Ordering::Acquire)
    }
}

impl NfsTransport for MemoryNfs {
    fn mount(&self, server: &str, export: &str) -> Result<Box<dyn NfsContext>, TransportError> {
        if let Some(delay) = self.mount_delay {
            thread::sleep(delay);
        }

        if self.fail_mounts {
            return Err(TransportError::MountFailed {
                server: server.to_string(),
                export: export.to_string(),
                message: "server unreachable".to_string(),
            });
        }

        let key = endpoint_key(server, export);
        let tree = self
            .exports
            .read()
            .unwrap()
            .get(&key)
            .cloned()
            .ok_or_else(|| TransportError::MountFailed {
                server: server.to_string(),
                export: export.to_string(),
                message: "no such export".to_string(),
            })?;

        self.mounts.fetch_add(1, Ordering::AcqRel);
        log::debug!("mounted {}", key);

        Ok(Box::new(MemoryContext {
            tree,
            open_files: HashMap::new(),
            next_fd: 1,
        }))
    }
}

fn endpoint_key(server: &str, export: &str) -> String {
    format!("{}:{}", server, export)
}

/// One mounted in-memory export.
#[derive(Debug)]
struct MemoryContext {
    tree: ExportTree,
    open_files: HashMap<RemoteFd, String>,
    next_fd: u64,
}

impl MemoryContext {
    fn path_for(&self, fd: RemoteFd) -> Result<String, TransportError> {
        self.open_files
            .get(&fd)
            .cloned()
            .ok_or(TransportError::StaleHandle)
    }
}

impl NfsContext for MemoryContext {
    fn open(&mut self, path: &str, mode: AccessMode) -> Result<RemoteFd, TransportError> {
        let mut tree = self.tree.write().unwrap();
        if !tree.contains_key(path) {
            if mode.creates() {
                tree.insert(path.to_string(), Vec::new());
            } else {
                return Err(TransportError::NotFound {
                    path: path.to_string(),
                });
            }
        }
        drop(tree);

        let fd = RemoteFd(self.next_fd);
        self.next_fd += 1;
        self.open_files.insert(fd, path.to_string());
        Ok(fd)
    }

    fn pread(
        &mut self,
        fd: RemoteFd,
        buf: &mut [u8],
        offset: u64,
    ) -> Result<usize, TransportError> {
        let path = self.path_for(fd)?;
        let tree = self.tree.read().unwrap();
        let data = tree.get(&path).ok_or(TransportError::StaleHandle)?;

        let start = (offset as usize).min(data.len());
        let end = (start + buf.len()).min(data.len());
        let n = end - start;
        buf[..n].copy_from_slice(&data[start..end]);
        Ok(n)
    }

    fn pwrite(
        &mut self,
        fd: RemoteFd,
        data: &[u8],
        offset: u64,
    ) -> Result<usize, TransportError> {
        let path = self.path_for(fd)?;
        let mut tree = self.tree.write().unwrap();
        let contents = tree.get_mut(&path).ok_or(TransportError::StaleHandle)?;

        let end = offset as usize + data.len();
        if contents.len() < end {
            contents.resize(end, 0);
        }
        contents[offset as usize..end].copy_from_slice(data);
        Ok(data.len())
    }

    fn fstat(&mut self, fd: RemoteFd) -> Result<FileStat, TransportError> {
        let path = self.path_for(fd)?;
        let tree = self.tree.read().unwrap();
        let data = tree.get(&path).ok_or(TransportError::StaleHandle)?;
        Ok(FileStat::regular(data.len() as u64))
    }

    fn stat(&mut self, path: &str) -> Result<FileStat, TransportError> {
        let tree = self.tree.read().unwrap();
        match tree.get(path) {
            Some(data) => Ok(FileStat::regular(data.len() as u64)),
            None => Err(TransportError::NotFound {
                path: path.to_string(),
            }),
        }
    }

    fn close(&mut self, fd: RemoteFd) -> Result<(), TransportError> {
        match self.open_files.remove(&fd) {
            Some(_) => Ok(()),
            None => Err(TransportError::StaleHandle),
        }
    }

    fn unmount(&mut self) {
        self.open_files.clear();
    }
}
