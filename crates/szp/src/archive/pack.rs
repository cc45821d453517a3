//! File archive creation.
//!
//! Packs every file yielded by a [`DirectoryWalker`] into an in-memory ZIP
//! archive while recording its [`FileRecord`](crate::metadata::FileRecord).
//!
//! For the reverse operation, see the [`extract`](super::extract) module.
//!
//! # Examples
//!
//! ```no_run
//! use szp::archive::{pack_directory, CompressionLevel};
//!
//! let packed = pack_directory("project", CompressionLevel::DEFAULT)?;
//! println!("{} files, {} bytes", packed.metadata.len(), packed.file_archive.len());
//! # Ok::<(), szp::Error>(())
//! ```

use super::walk::DirectoryWalker;
use crate::metadata::{MetadataRecorder, MetadataSet};
use crate::Result;
use std::io::{Cursor, Write};
use std::path::Path;
use tracing::{debug, info};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// ZIP compression level for the file archive.
///
/// # Examples
///
/// ```
/// use szp::archive::CompressionLevel;
///
/// let fast = CompressionLevel::NONE;
/// let balanced = CompressionLevel::DEFAULT;
/// let small = CompressionLevel::MAX;
///
/// // Values above 9 are clamped
/// assert_eq!(CompressionLevel::new(12).level(), 9);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompressionLevel(u32);

impl CompressionLevel {
    /// No compression (level 0), members are stored.
    pub const NONE: CompressionLevel = CompressionLevel(0);

    /// Default compression (level 6).
    pub const DEFAULT: CompressionLevel = CompressionLevel(6);

    /// Maximum compression (level 9).
    pub const MAX: CompressionLevel = CompressionLevel(9);

    /// Creates a compression level from 0-9.
    ///
    /// Values greater than 9 are clamped to 9.
    #[must_use]
    pub fn new(level: u32) -> Self {
        CompressionLevel(level.min(9))
    }

    /// Returns the compression level value (0-9).
    #[must_use]
    pub fn level(&self) -> u32 {
        self.0
    }

    fn file_options(self) -> SimpleFileOptions {
        if self.0 == 0 {
            SimpleFileOptions::default().compression_method(CompressionMethod::Stored)
        } else {
            SimpleFileOptions::default()
                .compression_method(CompressionMethod::Deflated)
                .compression_level(Some(i64::from(self.0)))
        }
    }
}

impl Default for CompressionLevel {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl From<u32> for CompressionLevel {
    fn from(level: u32) -> Self {
        CompressionLevel::new(level)
    }
}

/// Output of [`pack_directory`].
#[derive(Debug)]
pub struct PackedFiles {
    /// Raw bytes of the file archive.
    pub file_archive: Vec<u8>,
    /// One record per packed file, in archive order.
    pub metadata: MetadataSet,
}

/// Packs the tree at `source` into a file archive.
///
/// Each file is read once; the same bytes are digested into its record and
/// written to the archive under its walk name. Unix permission bits are
/// carried into the archive.
///
/// # Errors
///
/// Returns [`Error::IoAt`](crate::Error::IoAt) if any entry cannot be listed
/// or read, and [`Error::Zip`](crate::Error::Zip) if the archive cannot be
/// written. Nothing is returned on failure.
pub fn pack_directory(source: impl AsRef<Path>, level: CompressionLevel) -> Result<PackedFiles> {
    let walker = DirectoryWalker::new(source.as_ref())?;
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let mut recorder = MetadataRecorder::new();
    let base_options = level.file_options();

    for file in walker {
        let file = file?;
        let contents = file.read()?;
        recorder.record(&file.archive_path, &contents, &file.metadata)?;

        #[cfg(unix)]
        let options = {
            use std::os::unix::fs::PermissionsExt;
            base_options.unix_permissions(file.metadata.permissions().mode())
        };
        #[cfg(not(unix))]
        let options = base_options;

        zip.start_file(file.archive_path.as_str(), options)?;
        zip.write_all(&contents)?;
        debug!(path = %file.archive_path, bytes = contents.len(), "packed file");
    }

    let file_archive = zip.finish()?.into_inner();
    let metadata = recorder.finish();
    info!(
        files = metadata.len(),
        bytes = file_archive.len(),
        "packed file archive"
    );

    Ok(PackedFiles {
        file_archive,
        metadata,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::ContentDigest;
    use std::fs;
    use std::io::Read;
    use std::path::PathBuf;
    use tempfile::TempDir;
    use zip::ZipArchive;

    fn create_tree(dir: &Path) -> PathBuf {
        let root = dir.join("tree");
        fs::create_dir_all(root.join("sub")).unwrap();
        fs::write(root.join("a.txt"), b"hi").unwrap();
        fs::write(root.join("sub/b.txt"), b"bye").unwrap();
        root
    }

    fn read_member(archive: &[u8], name: &str) -> Vec<u8> {
        let mut zip = ZipArchive::new(Cursor::new(archive)).unwrap();
        let mut member = zip.by_name(name).unwrap();
        let mut out = Vec::new();
        member.read_to_end(&mut out).unwrap();
        out
    }

    #[test]
    fn test_pack_directory() {
        let temp_dir = TempDir::new().unwrap();
        let root = create_tree(temp_dir.path());

        let packed = pack_directory(&root, CompressionLevel::DEFAULT).unwrap();

        assert_eq!(packed.metadata.len(), 2);
        assert_eq!(read_member(&packed.file_archive, "tree/a.txt"), b"hi");
        assert_eq!(read_member(&packed.file_archive, "tree/sub/b.txt"), b"bye");

        let a = packed.metadata.get("tree/a.txt").unwrap();
        assert_eq!(a.original_size, 2);
        assert_eq!(a.content_digest, ContentDigest::of(b"hi"));
        let b = packed.metadata.get("tree/sub/b.txt").unwrap();
        assert_eq!(b.original_size, 3);
    }

    #[test]
    fn test_metadata_covers_every_member() {
        let temp_dir = TempDir::new().unwrap();
        let root = create_tree(temp_dir.path());
        fs::write(root.join("sub/c.txt"), b"c").unwrap();

        let packed = pack_directory(&root, CompressionLevel::NONE).unwrap();
        let zip = ZipArchive::new(Cursor::new(&packed.file_archive[..])).unwrap();
        let members: Vec<_> = zip.file_names().map(String::from).collect();
        let recorded: Vec<_> = packed
            .metadata
            .iter()
            .map(|r| r.relative_path.clone())
            .collect();

        let mut sorted_members = members.clone();
        sorted_members.sort();
        let mut sorted_recorded = recorded.clone();
        sorted_recorded.sort();
        assert_eq!(sorted_members, sorted_recorded);
    }

    #[test]
    fn test_pack_has_no_directory_members() {
        let temp_dir = TempDir::new().unwrap();
        let root = create_tree(temp_dir.path());

        let packed = pack_directory(&root, CompressionLevel::DEFAULT).unwrap();
        let zip = ZipArchive::new(Cursor::new(&packed.file_archive[..])).unwrap();
        assert!(zip.file_names().all(|n| !n.ends_with('/')));
    }

    #[test]
    fn test_pack_empty_directory() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("empty");
        fs::create_dir(&root).unwrap();

        let packed = pack_directory(&root, CompressionLevel::DEFAULT).unwrap();
        assert!(packed.metadata.is_empty());
        let zip = ZipArchive::new(Cursor::new(&packed.file_archive[..])).unwrap();
        assert_eq!(zip.len(), 0);
    }

    #[test]
    fn test_pack_missing_source() {
        let temp_dir = TempDir::new().unwrap();
        let result = pack_directory(temp_dir.path().join("missing"), CompressionLevel::DEFAULT);
        assert!(result.is_err());
    }

    #[test]
    fn test_compression_level() {
        assert_eq!(CompressionLevel::NONE.level(), 0);
        assert_eq!(CompressionLevel::DEFAULT.level(), 6);
        assert_eq!(CompressionLevel::MAX.level(), 9);
        assert_eq!(CompressionLevel::new(15).level(), 9);
        assert_eq!(CompressionLevel::from(5).level(), 5);
        assert_eq!(CompressionLevel::default(), CompressionLevel::DEFAULT);
    }

    #[test]
    #[cfg(unix)]
    fn test_pack_preserves_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = TempDir::new().unwrap();
        let root = create_tree(temp_dir.path());
        let script = root.join("run.sh");
        fs::write(&script, b"#!/bin/sh\n").unwrap();
        fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();

        let packed = pack_directory(&root, CompressionLevel::DEFAULT).unwrap();
        let mut zip = ZipArchive::new(Cursor::new(&packed.file_archive[..])).unwrap();
        let member = zip.by_name("tree/run.sh").unwrap();
        assert_eq!(member.unix_mode().unwrap() & 0o777, 0o755);
    }
}
