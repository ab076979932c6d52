//! Host-registered path hints.
//!
//! Hosts usually know the server/export split for every URL they are
//! about to open. Registering it here lets `open` and `stat` skip URL
//! parsing, whose export/file split is a guess (see
//! [`retrofs_common::NfsLocation::parse`]).

use std::collections::HashMap;
use std::sync::Mutex;

use retrofs_common::NfsLocation;

/// Parse-free mapping from a full URL to its NFS location.
#[derive(Default)]
pub struct PathHints {
    entries: Mutex<HashMap<String, NfsLocation>>,
}

impl PathHints {
    /// Create an empty hint table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the location for a URL, replacing any earlier hint.
    pub fn insert(&self, full_url: &str, location: NfsLocation) {
        log::debug!(
            "path hint for {} -> server {} export {} file {}",
            full_url,
            location.server,
            location.export,
            location.file
        );
        self.entries
            .lock()
            .unwrap()
            .insert(full_url.to_string(), location);
    }

    /// Look up the hint for a URL.
    pub fn get(&self, full_url: &str) -> Option<NfsLocation> {
        self.entries.lock().unwrap().get(full_url).cloned()
    }

    /// Number of registered hints.
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    /// Check if no hints are registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registered_hint_is_returned() {
        let hints = PathHints::new();
        hints.insert(
            "nfs://nas/roms/game.rom",
            NfsLocation::new("nas", "/roms", "game.rom"),
        );

        let loc = hints.get("nfs://nas/roms/game.rom").unwrap();
        assert_eq!(loc.server, "nas");
        assert_eq!(loc.export, "/roms");
        assert_eq!(loc.file, "game.rom");
        assert!(hints.get("nfs://nas/other.rom").is_none());
    }

    #[test]
    fn later_hint_replaces_earlier() {
        let hints = PathHints::new();
        hints.insert("url", NfsLocation::new("a", "/x", "f"));
        hints.insert("url", NfsLocation::new("b", "/y", "g"));

        assert_eq!(hints.get("url").unwrap().server, "b");
        assert_eq!(hints.len(), 1);
    }
}
