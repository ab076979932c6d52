//! Keyed, refcounted NFS connection pool.
//!
//! Mounting an export costs multi-second round trips; an idle mounted
//! socket costs almost nothing, and a process talks to O(1) endpoints.
//! Connections are therefore created on first use, shared by every open
//! file on the same endpoint, and kept mounted until pool shutdown even
//! when their refcount drops to zero.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use retrofs_transport::{NfsContext, NfsTransport, TransportError};

use crate::stat_cache::StatCache;

/// One mounted endpoint, shared by every open file on it.
///
/// The context mutex is the serialization lock the transport requires:
/// the underlying network library is not reentrant per context, so every
/// transport call goes through [`Connection::context`].
pub struct Connection {
    server: String,
    export: String,
    refs: AtomicUsize,
    context: Mutex<Box<dyn NfsContext>>,
}

impl Connection {
    /// Server this connection is mounted on.
    pub fn server(&self) -> &str {
        &self.server
    }

    /// Export path this connection is mounted on.
    pub fn export(&self) -> &str {
        &self.export
    }

    /// Current number of holders.
    pub fn ref_count(&self) -> usize {
        self.refs.load(Ordering::Acquire)
    }

    /// Lock the context for one serialized transport call.
    ///
    /// Network I/O happens while this guard is held; never take the
    /// block cache mutex inside it.
    pub fn context(&self) -> MutexGuard<'_, Box<dyn NfsContext>> {
        self.context.lock().unwrap()
    }

    fn key(&self) -> String {
        endpoint_key(&self.server, &self.export)
    }
}

fn endpoint_key(server: &str, export: &str) -> String {
    format!("{}:{}", server, export)
}

/// Pool of mounted connections keyed by `server:export`.
pub struct ConnectionPool {
    transport: Arc<dyn NfsTransport>,
    connections: Mutex<HashMap<String, Arc<Connection>>>,
    stat_cache: StatCache,
}

impl ConnectionPool {
    /// Create a pool that mounts through the given transport.
    pub fn new(transport: Arc<dyn NfsTransport>) -> Self {
        Self {
            transport,
            connections: Mutex::new(HashMap::new()),
            stat_cache: StatCache::new(),
        }
    }

    /// Get a connection for an endpoint, mounting it on first use.
    ///
    /// The mount runs outside the pool mutex - it can block for seconds
    /// and must not stall acquires for other endpoints. Because of that,
    /// two threads can race to mount the same key; the re-check after
    /// the mount keeps the first installed connection and discards the
    /// loser's freshly-mounted context.
    pub fn acquire(
        &self,
        server: &str,
        export: &str,
    ) -> Result<Arc<Connection>, TransportError> {
        let key = endpoint_key(server, export);

        {
            let connections = self.connections.lock().unwrap();
            if let Some(conn) = connections.get(&key) {
                conn.refs.fetch_add(1, Ordering::AcqRel);
                return Ok(Arc::clone(conn));
            }
        }

        log::debug!("mounting {}", key);
        let mounted = self.transport.mount(server, export);

        let mut connections = self.connections.lock().unwrap();
        if let Some(existing) = connections.get(&key) {
            // Lost the mount race; use the winner's connection.
            if let Ok(mut context) = mounted {
                context.unmount();
            }
            existing.refs.fetch_add(1, Ordering::AcqRel);
            return Ok(Arc::clone(existing));
        }

        let context = mounted.map_err(|e| {
            log::warn!("mount failed for {}: {}", key, e);
            e
        })?;

        let conn = Arc::new(Connection {
            server: server.to_string(),
            export: export.to_string(),
            refs: AtomicUsize::new(1),
            context: Mutex::new(context),
        });
        connections.insert(key, Arc::clone(&conn));
        Ok(conn)
    }

    /// Return a connection.
    ///
    /// Only the refcount drops; the connection stays mounted so the next
    /// open on this endpoint is instant.
    pub fn release(&self, conn: &Connection) {
        conn.refs.fetch_sub(1, Ordering::AcqRel);
    }

    /// The pool's stat cache.
    pub fn stat_cache(&self) -> &StatCache {
        &self.stat_cache
    }

    /// Number of mounted endpoints.
    pub fn connection_count(&self) -> usize {
        self.connections.lock().unwrap().len()
    }

    /// Unmount and drop every connection.
    pub fn shutdown(&self) {
        let mut connections = self.connections.lock().unwrap();
        for (_, conn) in connections.drain() {
            log::debug!("unmounting {}", conn.key());
            conn.context().unmount();
        }
    }
}

impl Drop for ConnectionPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use retrofs_transport::MemoryNfs;
    use std::thread;
    use std::time::Duration;

    fn pool_with_export() -> (Arc<MemoryNfs>, ConnectionPool) {
        let nfs = Arc::new(MemoryNfs::new());
        nfs.add_export("server", "/export");
        let pool = ConnectionPool::new(nfs.clone());
        (nfs, pool)
    }

    #[test]
    fn acquire_reuses_the_mounted_connection() {
        let (nfs, pool) = pool_with_export();

        let a = pool.acquire("server", "/export").unwrap();
        let b = pool.acquire("server", "/export").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.ref_count(), 2);
        assert_eq!(nfs.mount_count(), 1);
        assert_eq!(pool.connection_count(), 1);
    }

    #[test]
    fn release_keeps_the_connection_mounted() {
        let (nfs, pool) = pool_with_export();

        let conn = pool.acquire("server", "/export").unwrap();
        pool.release(&conn);
        assert_eq!(conn.ref_count(), 0);
        assert_eq!(pool.connection_count(), 1);

        let again = pool.acquire("server", "/export").unwrap();
        assert!(Arc::ptr_eq(&conn, &again));
        assert_eq!(nfs.mount_count(), 1);
    }

    #[test]
    fn failed_mount_surfaces_and_caches_nothing() {
        let nfs = Arc::new(MemoryNfs::new().with_failing_mounts());
        nfs.add_export("server", "/export");
        let pool = ConnectionPool::new(nfs);

        assert!(matches!(
            pool.acquire("server", "/export"),
            Err(TransportError::MountFailed { .. })
        ));
        assert_eq!(pool.connection_count(), 0);
    }

    #[test]
    fn unknown_endpoints_do_not_share_connections() {
        let nfs = Arc::new(MemoryNfs::new());
        nfs.add_export("server", "/roms");
        nfs.add_export("server", "/saves");
        let pool = ConnectionPool::new(nfs.clone());

        let roms = pool.acquire("server", "/roms").unwrap();
        let saves = pool.acquire("server", "/saves").unwrap();
        assert!(!Arc::ptr_eq(&roms, &saves));
        assert_eq!(nfs.mount_count(), 2);
        assert_eq!(pool.connection_count(), 2);
    }

    #[test]
    fn concurrent_acquires_share_one_connection() {
        let nfs = Arc::new(MemoryNfs::new().with_mount_delay(Duration::from_millis(20)));
        nfs.add_export("server", "/export");
        let pool = Arc::new(ConnectionPool::new(nfs.clone()));

        let threads: Vec<_> = (0..4)
            .map(|_| {
                let pool = Arc::clone(&pool);
                thread::spawn(move || pool.acquire("server", "/export").unwrap())
            })
            .collect();

        let conns: Vec<_> = threads.into_iter().map(|t| t.join().unwrap()).collect();
        // Racing threads may each pay for a mount, but exactly one
        // connection survives and everyone holds it.
        assert_eq!(pool.connection_count(), 1);
        for conn in &conns {
            assert!(Arc::ptr_eq(conn, &conns[0]));
        }
        assert_eq!(conns[0].ref_count(), 4);
    }

    #[test]
    fn shutdown_unmounts_everything() {
        let (_nfs, pool) = pool_with_export();
        let _conn = pool.acquire("server", "/export").unwrap();

        pool.shutdown();
        assert_eq!(pool.connection_count(), 0);
    }
}
