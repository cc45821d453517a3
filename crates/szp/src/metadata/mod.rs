//! Per-file integrity metadata.
//!
//! Every file packed into a container gets a [`FileRecord`] describing its
//! archive-relative name, size, modification time and [`ContentDigest`].
//! Records are accumulated by a [`MetadataRecorder`] owned by a single build
//! and handed over as an ordered [`MetadataSet`].
//!
//! For the on-wire form of a [`MetadataSet`], see the [`codec`] module.

pub mod codec;

use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt;
use std::fs;

pub use codec::{decode_metadata, encode_metadata, METADATA_FILE_NAME};

/// Length in bytes of a [`ContentDigest`].
pub const DIGEST_LEN: usize = 32;

/// SHA-256 digest of a file's raw bytes.
///
/// Serialized as a lowercase hex string.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContentDigest([u8; DIGEST_LEN]);

impl ContentDigest {
    /// Computes the digest of `data`.
    #[must_use]
    pub fn of(data: &[u8]) -> Self {
        Self(Sha256::digest(data).into())
    }

    /// Wraps raw digest bytes.
    #[must_use]
    pub fn from_bytes(bytes: [u8; DIGEST_LEN]) -> Self {
        Self(bytes)
    }

    /// Parses a lowercase or uppercase hex digest.
    pub fn from_hex(s: &str) -> Result<Self> {
        let raw = hex::decode(s)
            .map_err(|e| Error::Metadata(format!("Invalid digest hex '{}': {}", s, e)))?;
        let bytes: [u8; DIGEST_LEN] = raw.try_into().map_err(|raw: Vec<u8>| {
            Error::Metadata(format!(
                "Digest must be {} bytes, got {}",
                DIGEST_LEN,
                raw.len()
            ))
        })?;
        Ok(Self(bytes))
    }

    /// Returns the raw digest bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; DIGEST_LEN] {
        &self.0
    }

    /// Returns the digest as lowercase hex.
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for ContentDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentDigest({})", self.to_hex())
    }
}

impl fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl Serialize for ContentDigest {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for ContentDigest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        ContentDigest::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// Integrity metadata for one archived file.
///
/// Field names on the wire are `name`, `originalSize`,
/// `lastModificationTime` and `hash`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileRecord {
    /// Archive-internal path, `/`-separated, rooted at the source basename.
    #[serde(rename = "name")]
    pub relative_path: String,

    /// Size of the source file in bytes.
    #[serde(rename = "originalSize")]
    pub original_size: u64,

    /// Source filesystem modification time.
    #[serde(rename = "lastModificationTime")]
    pub last_modified: DateTime<Utc>,

    /// Digest of the file's raw bytes at collection time.
    #[serde(rename = "hash")]
    pub content_digest: ContentDigest,
}

impl FileRecord {
    /// Returns the final `/`-separated component of the record's path.
    #[must_use]
    pub fn basename(&self) -> &str {
        basename(&self.relative_path)
    }
}

/// Returns the final component of a `/`-separated archive path.
pub(crate) fn basename(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    trimmed.rsplit('/').next().unwrap_or(trimmed)
}

/// Ordered sequence of [`FileRecord`]s with unique relative paths.
///
/// Insertion order is traversal order and is preserved through encoding.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetadataSet {
    records: Vec<FileRecord>,
    index: HashMap<String, usize>,
}

impl MetadataSet {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a record.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Metadata`] if a record with the same relative path
    /// is already present.
    pub fn push(&mut self, record: FileRecord) -> Result<()> {
        if self.index.contains_key(&record.relative_path) {
            return Err(Error::Metadata(format!(
                "Duplicate record for {}",
                record.relative_path
            )));
        }
        self.index
            .insert(record.relative_path.clone(), self.records.len());
        self.records.push(record);
        Ok(())
    }

    /// Looks up a record by its exact relative path.
    #[must_use]
    pub fn get(&self, relative_path: &str) -> Option<&FileRecord> {
        self.index.get(relative_path).map(|&i| &self.records[i])
    }

    /// Returns every record whose basename equals `name`'s basename.
    pub fn by_basename<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a FileRecord> + 'a {
        let wanted = basename(name);
        self.records.iter().filter(move |r| r.basename() == wanted)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, FileRecord> {
        self.records.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    #[must_use]
    pub fn into_records(self) -> Vec<FileRecord> {
        self.records
    }
}

impl<'a> IntoIterator for &'a MetadataSet {
    type Item = &'a FileRecord;
    type IntoIter = std::slice::Iter<'a, FileRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

impl TryFrom<Vec<FileRecord>> for MetadataSet {
    type Error = Error;

    fn try_from(records: Vec<FileRecord>) -> Result<Self> {
        let mut set = MetadataSet::new();
        for record in records {
            set.push(record)?;
        }
        Ok(set)
    }
}

impl Serialize for MetadataSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.records.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for MetadataSet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let records = Vec::<FileRecord>::deserialize(deserializer)?;
        MetadataSet::try_from(records).map_err(serde::de::Error::custom)
    }
}

/// Accumulates [`FileRecord`]s for exactly one build.
///
/// The recorder is created by the packing stage, fed every file as it is
/// written to the file archive, and consumed by [`MetadataRecorder::finish`].
#[derive(Debug, Default)]
pub struct MetadataRecorder {
    set: MetadataSet,
}

impl MetadataRecorder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one file from its full contents and filesystem metadata.
    ///
    /// The size recorded is the filesystem size; the modification time falls
    /// back to the Unix epoch on platforms that do not report one.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Metadata`] if `relative_path` was already recorded.
    pub fn record(
        &mut self,
        relative_path: &str,
        contents: &[u8],
        metadata: &fs::Metadata,
    ) -> Result<&FileRecord> {
        let last_modified = metadata
            .modified()
            .map(DateTime::<Utc>::from)
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);

        self.set.push(FileRecord {
            relative_path: relative_path.to_string(),
            original_size: metadata.len(),
            last_modified,
            content_digest: ContentDigest::of(contents),
        })?;

        let last = self.set.len() - 1;
        Ok(&self.set.records[last])
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.set.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.set.is_empty()
    }

    /// Hands over the accumulated records in insertion order.
    #[must_use]
    pub fn finish(self) -> MetadataSet {
        self.set
    }
}
