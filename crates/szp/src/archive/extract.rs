//! File archive extraction.
//!
//! Unpacks a verified file archive into a destination directory, checking
//! every file member against its [`FileRecord`] before it is written.
//!
//! By default extraction is not transactional: members are written in
//! archive order and a failure leaves everything written before it in
//! place. [`Extractor::staged`] unpacks into a scratch directory inside the
//! destination first and only moves the result into place once every member
//! has passed.

use crate::metadata::{ContentDigest, FileRecord, MetadataSet};
use crate::{Error, Result};
use std::collections::HashSet;
use std::fs;
use std::io::{Cursor, Read};
use std::path::Path;
use tracing::{debug, info, warn};
use zip::ZipArchive;

/// Prefix of the scratch directory used by staged extraction.
const STAGE_PREFIX: &str = ".szp-stage-";

/// Upper bound on the buffer reserved up front for one member.
const MAX_PREALLOCATION: usize = 1 << 20;

/// How an archive member is paired with a metadata record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RecordMatch {
    /// Every record sharing the member's basename must match it. Members
    /// with no such record are written unchecked.
    #[default]
    Basename,
    /// The record with exactly the member's name must match it. A member
    /// with no record, or a record with no member, fails extraction.
    FullPath,
}

/// Counts reported by a successful extraction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtractSummary {
    /// File members written to disk.
    pub files_written: usize,
    /// Directory members created.
    pub directories_created: usize,
    /// File members checked against at least one record.
    pub files_verified: usize,
}

/// Unpacks a file archive against its metadata.
///
/// # Examples
///
/// ```no_run
/// use szp::archive::{Extractor, RecordMatch};
/// use szp::metadata::MetadataSet;
///
/// # let file_archive: Vec<u8> = Vec::new();
/// # let metadata = MetadataSet::new();
/// let summary = Extractor::new(&metadata)
///     .record_match(RecordMatch::FullPath)
///     .staged(true)
///     .extract(&file_archive, "out")?;
/// println!("{} files written", summary.files_written);
/// # Ok::<(), szp::Error>(())
/// ```
#[derive(Debug, Clone, Copy)]
pub struct Extractor<'m> {
    metadata: &'m MetadataSet,
    record_match: RecordMatch,
    staged: bool,
}

impl<'m> Extractor<'m> {
    #[must_use]
    pub fn new(metadata: &'m MetadataSet) -> Self {
        Self {
            metadata,
            record_match: RecordMatch::default(),
            staged: false,
        }
    }

    /// Sets how members are paired with records.
    #[must_use]
    pub fn record_match(mut self, record_match: RecordMatch) -> Self {
        self.record_match = record_match;
        self
    }

    /// Unpacks into a scratch directory first, so a failed extraction
    /// leaves the destination untouched.
    #[must_use]
    pub fn staged(mut self, staged: bool) -> Self {
        self.staged = staged;
        self
    }

    /// Extracts `file_archive` into `dest`, creating `dest` if needed.
    ///
    /// # Errors
    ///
    /// - [`Error::Format`] if the archive cannot be read or a member name
    ///   escapes the destination
    /// - [`Error::Integrity`] if a member's size or digest disagrees with a
    ///   paired record, or if pairing fails under [`RecordMatch::FullPath`]
    /// - [`Error::Conflict`] if a directory member, or under staging any
    ///   top-level entry, already exists in the destination
    /// - [`Error::IoAt`] if writing fails
    pub fn extract(&self, file_archive: &[u8], dest: impl AsRef<Path>) -> Result<ExtractSummary> {
        let dest = dest.as_ref();
        fs::create_dir_all(dest).map_err(Error::io_at(dest))?;

        let summary = if self.staged {
            self.extract_staged(file_archive, dest)?
        } else {
            let mut summary = ExtractSummary::default();
            if let Err(e) = self.unpack_into(file_archive, dest, &mut summary) {
                if summary.files_written > 0 || summary.directories_created > 0 {
                    warn!(
                        dest = %dest.display(),
                        files = summary.files_written,
                        directories = summary.directories_created,
                        "extraction aborted, earlier entries left in place"
                    );
                }
                return Err(e);
            }
            summary
        };

        info!(
            dest = %dest.display(),
            files = summary.files_written,
            verified = summary.files_verified,
            "extracted file archive"
        );
        Ok(summary)
    }

    fn extract_staged(&self, file_archive: &[u8], dest: &Path) -> Result<ExtractSummary> {
        let stage = tempfile::Builder::new()
            .prefix(STAGE_PREFIX)
            .tempdir_in(dest)
            .map_err(Error::io_at(dest))?;

        let mut summary = ExtractSummary::default();
        self.unpack_into(file_archive, stage.path(), &mut summary)?;

        let entries = fs::read_dir(stage.path())
            .and_then(|dir| dir.collect::<std::io::Result<Vec<_>>>())
            .map_err(Error::io_at(stage.path()))?;

        for entry in &entries {
            let target = dest.join(entry.file_name());
            if fs::symlink_metadata(&target).is_ok() {
                return Err(Error::Conflict(target));
            }
        }
        for entry in entries {
            let target = dest.join(entry.file_name());
            fs::rename(entry.path(), &target).map_err(Error::io_at(&target))?;
        }

        debug!(stage = %stage.path().display(), "moved staged entries into place");
        Ok(summary)
    }

    fn unpack_into(
        &self,
        file_archive: &[u8],
        root: &Path,
        summary: &mut ExtractSummary,
    ) -> Result<()> {
        let mut archive = ZipArchive::new(Cursor::new(file_archive))
            .map_err(|e| Error::Format(format!("File archive is unreadable: {}", e)))?;
        let mut seen: HashSet<String> = HashSet::with_capacity(archive.len());

        for i in 0..archive.len() {
            let mut member = archive.by_index(i)?;
            let name = member.name().to_string();
            let relative = member.enclosed_name().ok_or_else(|| {
                Error::Format(format!("Member '{}' escapes the destination", name))
            })?;
            let outpath = root.join(&relative);

            if member.is_dir() {
                if fs::symlink_metadata(&outpath).is_ok() {
                    return Err(Error::Conflict(outpath));
                }
                fs::create_dir_all(&outpath).map_err(Error::io_at(&outpath))?;
                summary.directories_created += 1;
                continue;
            }

            #[cfg(unix)]
            let unix_mode = member.unix_mode();

            let mut contents = Vec::with_capacity(read_capacity(member.size()));
            member
                .read_to_end(&mut contents)
                .map_err(|e| Error::Format(format!("Member '{}' is unreadable: {}", name, e)))?;

            if self.verify_member(&name, &contents)? {
                summary.files_verified += 1;
            }

            if let Some(parent) = outpath.parent() {
                fs::create_dir_all(parent).map_err(Error::io_at(parent))?;
            }
            fs::write(&outpath, &contents).map_err(Error::io_at(&outpath))?;

            #[cfg(unix)]
            if let Some(mode) = unix_mode {
                use std::os::unix::fs::PermissionsExt;
                fs::set_permissions(&outpath, fs::Permissions::from_mode(mode & 0o7777))
                    .map_err(Error::io_at(&outpath))?;
            }

            summary.files_written += 1;
            debug!(path = %name, bytes = contents.len(), "extracted file");
            seen.insert(name);
        }

        if self.record_match == RecordMatch::FullPath {
            if let Some(missing) = self
                .metadata
                .iter()
                .find(|record| !seen.contains(&record.relative_path))
            {
                return Err(Error::Integrity {
                    path: missing.relative_path.clone(),
                    reason: "recorded file is missing from the archive".into(),
                });
            }
        }

        Ok(())
    }

    /// Checks `contents` against the records paired with `name`.
    ///
    /// Returns whether any record was checked.
    fn verify_member(&self, name: &str, contents: &[u8]) -> Result<bool> {
        match self.record_match {
            RecordMatch::Basename => {
                let mut checked = false;
                for record in self.metadata.by_basename(name) {
                    check_record(record, name, contents)?;
                    checked = true;
                }
                if !checked {
                    debug!(path = %name, "no metadata record, written unchecked");
                }
                Ok(checked)
            }
            RecordMatch::FullPath => {
                let record = self.metadata.get(name).ok_or_else(|| Error::Integrity {
                    path: name.to_string(),
                    reason: "no metadata record for member".into(),
                })?;
                check_record(record, name, contents)?;
                Ok(true)
            }
        }
    }
}

/// Buffer capacity for a member whose central directory claims `declared`
/// bytes. The claim is untrusted until the digest gate passes.
fn read_capacity(declared: u64) -> usize {
    usize::try_from(declared)
        .unwrap_or(MAX_PREALLOCATION)
        .min(MAX_PREALLOCATION)
}

fn check_record(record: &FileRecord, name: &str, contents: &[u8]) -> Result<()> {
    let size = contents.len() as u64;
    if size != record.original_size {
        return Err(Error::Integrity {
            path: name.to_string(),
            reason: format!(
                "size {} does not match {} recorded for '{}'",
                size, record.original_size, record.relative_path
            ),
        });
    }

    let digest = ContentDigest::of(contents);
    if digest != record.content_digest {
        return Err(Error::Integrity {
            path: name.to_string(),
            reason: format!(
                "digest {} does not match {} recorded for '{}'",
                digest, record.content_digest, record.relative_path
            ),
        });
    }
    Ok(())
}
