//! Blocking NFS transport seam for retrofs.
//!
//! The VFS core never talks to a network library directly; it goes
//! through the [`NfsTransport`] / [`NfsContext`] traits defined here.
//! Concrete bindings (libnfs, a test double) live behind this seam.
//! [`MemoryNfs`] is the in-tree implementation, serving exports from
//! process memory.

pub mod error;
pub mod memory;
pub mod traits;
pub mod types;

pub use error::TransportError;
pub use memory::MemoryNfs;
pub use traits::{NfsContext, NfsTransport};
pub use types::{AccessMode, FileKind, FileStat, RemoteFd};
