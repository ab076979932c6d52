//! `nfs://` URL handling.
//!
//! Hosts normally register a path hint for every URL they are about to
//! open, which skips parsing entirely. [`NfsLocation::parse`] is the
//! fallback for URLs the host never announced.

use percent_encoding::percent_decode_str;
use url::Url;

use crate::error::UrlError;

/// A resolved NFS location: which server, which export, which file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NfsLocation {
    /// Server host name or address.
    pub server: String,
    /// Export path on the server, always starting with `/`.
    pub export: String,
    /// File path relative to the export root.
    pub file: String,
}

impl NfsLocation {
    /// Create a location from already-split components.
    ///
    /// # Arguments
    /// * `server` - Server host name or address
    /// * `export` - Export path on the server
    /// * `file` - File path relative to the export root
    pub fn new(
        server: impl Into<String>,
        export: impl Into<String>,
        file: impl Into<String>,
    ) -> Self {
        Self {
            server: server.into(),
            export: export.into(),
            file: file.into(),
        }
    }

    /// Parse an `nfs://server/export/path/file` URL.
    ///
    /// The last path component is taken as the file and everything before
    /// it as the export. That split is a guess - NFS URLs do not mark the
    /// export boundary - so hosts that know the real split should register
    /// a path hint instead.
    ///
    /// # Arguments
    /// * `raw` - The URL to parse
    pub fn parse(raw: &str) -> Result<Self, UrlError> {
        let url: Url = Url::parse(raw).map_err(|e| UrlError::Invalid {
            url: raw.to_string(),
            message: e.to_string(),
        })?;

        if url.scheme() != "nfs" {
            return Err(UrlError::NotNfs {
                url: raw.to_string(),
            });
        }

        let server = url
            .host_str()
            .ok_or_else(|| UrlError::Invalid {
                url: raw.to_string(),
                message: "missing server".to_string(),
            })?
            .to_string();

        let segments: Vec<String> = url
            .path_segments()
            .map(|parts| parts.map(decode_segment).collect())
            .unwrap_or_default();

        let (file, dirs) = match segments.split_last() {
            Some((file, dirs)) if !file.is_empty() => (file.clone(), dirs),
            _ => {
                return Err(UrlError::MissingFile {
                    url: raw.to_string(),
                })
            }
        };

        let mut export = String::new();
        for dir in dirs {
            export.push('/');
            export.push_str(dir);
        }
        if export.is_empty() {
            export.push('/');
        }

        Ok(Self {
            server,
            export,
            file,
        })
    }
}

fn decode_segment(segment: &str) -> String {
    percent_decode_str(segment)
        .decode_utf8()
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| segment.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_server_export_and_file() {
        let loc = NfsLocation::parse("nfs://10.0.0.5/roms/snes/game.sfc").unwrap();
        assert_eq!(loc.server, "10.0.0.5");
        assert_eq!(loc.export, "/roms/snes");
        assert_eq!(loc.file, "game.sfc");
    }

    #[test]
    fn file_directly_under_root_export() {
        let loc = NfsLocation::parse("nfs://fileserver/game.gba").unwrap();
        assert_eq!(loc.server, "fileserver");
        assert_eq!(loc.export, "/");
        assert_eq!(loc.file, "game.gba");
    }

    #[test]
    fn decodes_percent_encoded_spaces() {
        let loc = NfsLocation::parse("nfs://nas/roms/Some%20Game.n64").unwrap();
        assert_eq!(loc.file, "Some Game.n64");
    }

    #[test]
    fn rejects_other_schemes() {
        let err = NfsLocation::parse("smb://nas/share/game.rom").unwrap_err();
        assert!(matches!(err, UrlError::NotNfs { .. }));
    }

    #[test]
    fn rejects_url_without_file() {
        let err = NfsLocation::parse("nfs://nas/").unwrap_err();
        assert!(matches!(err, UrlError::MissingFile { .. }));
    }

    #[test]
    fn rejects_garbage() {
        assert!(matches!(
            NfsLocation::parse("not a url"),
            Err(UrlError::Invalid { .. })
        ));
    }
}
