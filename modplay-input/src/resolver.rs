//! File source resolution
//!
//! Turns a host resource identifier into an open [`ModuleWrap`]: a local
//! path is opened directly, anything else is read whole through the host's
//! virtual file.

use std::path::PathBuf;

use tracing::debug;
use url::Url;

use crate::host::VfsFile;
use crate::wrap::ModuleWrap;

/// Local filesystem path for an identifier
///
/// `file://` URIs are decoded, identifiers without a scheme are taken as
/// paths, and other schemes have no local path.
pub fn uri_to_filename(identifier: &str) -> Option<PathBuf> {
    match Url::parse(identifier) {
        Ok(url) if url.scheme() == "file" => url.to_file_path().ok(),
        // Windows drive letters parse as one-letter schemes
        Ok(url) if url.scheme().len() == 1 => Some(PathBuf::from(identifier)),
        Ok(_) => None,
        Err(url::ParseError::RelativeUrlWithoutBase) => Some(PathBuf::from(identifier)),
        Err(_) => None,
    }
}

/// Open the module behind `identifier`
///
/// Tries the local path first and falls back to reading `vfile` into
/// memory. Returns `None` if neither yields a recognized module.
pub fn open_module(
    identifier: &str,
    vfile: &mut dyn VfsFile,
    panning_amplitude: Option<i32>,
) -> Option<ModuleWrap> {
    if let Some(path) = uri_to_filename(identifier).filter(|p| !p.as_os_str().is_empty()) {
        match ModuleWrap::open_from_path(&path, panning_amplitude) {
            Ok(wrap) => return Some(wrap),
            Err(e) => debug!(path = %path.display(), error = %e, "local open failed"),
        }
    }

    let data = match vfile.read_all() {
        Ok(data) if !data.is_empty() => data,
        Ok(_) => {
            debug!(identifier, "virtual file is empty");
            return None;
        }
        Err(e) => {
            debug!(identifier, error = %e, "virtual file read failed");
            return None;
        }
    };
    match ModuleWrap::open_from_memory(&data, panning_amplitude) {
        Ok(wrap) => Some(wrap),
        Err(e) => {
            debug!(identifier, error = %e, "not a module");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use modplay_song::testing::ModBuilder;

    use super::*;
    use crate::error::OpenError;
    use crate::host::MemoryFile;

    fn module() -> Vec<u8> {
        ModBuilder::new(4)
            .sample("s", vec![50; 32], 64, Some((0, 32)))
            .patterns(1)
            .note(0, 0, 0, 60, 1)
            .build()
    }

    /// Virtual file that records whether it was read
    struct TrackedFile {
        inner: MemoryFile,
        reads: usize,
    }

    impl VfsFile for TrackedFile {
        fn read_all(&mut self) -> Result<Vec<u8>, OpenError> {
            self.reads += 1;
            self.inner.read_all()
        }
    }

    #[test]
    fn test_uri_to_filename() {
        assert_eq!(
            uri_to_filename("/music/song.mod").as_deref(),
            Some(Path::new("/music/song.mod"))
        );
        assert_eq!(
            uri_to_filename("songs/a b.xm").as_deref(),
            Some(Path::new("songs/a b.xm"))
        );
        assert_eq!(uri_to_filename("http://example.com/song.it"), None);
        assert_eq!(uri_to_filename("").as_deref(), Some(Path::new("")));
    }

    #[cfg(unix)]
    #[test]
    fn test_file_uri_is_decoded() {
        assert_eq!(
            uri_to_filename("file:///music/My%20Song.s3m").as_deref(),
            Some(Path::new("/music/My Song.s3m"))
        );
    }

    #[test]
    fn test_local_path_skips_vfs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("song.mod");
        std::fs::write(&path, module()).unwrap();

        let mut vfile = TrackedFile {
            inner: MemoryFile::new(Vec::new()),
            reads: 0,
        };
        let wrap = open_module(path.to_str().unwrap(), &mut vfile, None);
        assert!(wrap.is_some());
        assert_eq!(vfile.reads, 0);
    }

    #[test]
    fn test_remote_identifier_reads_vfs() {
        let mut vfile = TrackedFile {
            inner: MemoryFile::new(module()),
            reads: 0,
        };
        let wrap = open_module("https://example.com/song.mod", &mut vfile, None);
        assert_eq!(wrap.map(|w| w.format().to_string()).as_deref(), Some("MOD"));
        assert_eq!(vfile.reads, 1);
    }

    #[test]
    fn test_unreadable_local_path_falls_back() {
        let mut vfile = TrackedFile {
            inner: MemoryFile::new(module()),
            reads: 0,
        };
        let wrap = open_module("/nonexistent/dir/song.mod", &mut vfile, None);
        assert!(wrap.is_some());
        assert_eq!(vfile.reads, 1);
    }

    #[test]
    fn test_failures_return_none() {
        let mut empty = MemoryFile::new(Vec::new());
        assert!(open_module("http://x/y.mod", &mut empty, None).is_none());

        let mut garbage = MemoryFile::new(vec![0x55; 4096]);
        assert!(open_module("http://x/y.mod", &mut garbage, None).is_none());

        let mut too_large = MemoryFile::new(module()).with_limit(16);
        assert!(open_module("http://x/y.mod", &mut too_large, None).is_none());
    }
}
