//! Metadata block encoding.
//!
//! A [`MetadataSet`] travels inside the container as a ZIP archive holding a
//! single member, [`METADATA_FILE_NAME`], whose contents are the set
//! serialized as a JSON array.

use super::MetadataSet;
use crate::{Error, Result};
use std::io::{Cursor, Read, Write};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// Name of the sole member of the metadata archive.
pub const METADATA_FILE_NAME: &str = "metadata.json";

/// Serializes `metadata` and wraps it as a single-member ZIP archive.
///
/// Returns the raw bytes of that archive, ready to be framed.
///
/// # Errors
///
/// Returns [`Error::Json`] if serialization fails and [`Error::Zip`] if the
/// archive cannot be written.
pub fn encode_metadata(metadata: &MetadataSet) -> Result<Vec<u8>> {
    let json = serde_json::to_vec(metadata)?;

    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    zip.start_file(METADATA_FILE_NAME, options)?;
    zip.write_all(&json)?;
    let cursor = zip.finish()?;

    Ok(cursor.into_inner())
}

/// Decodes a metadata archive produced by [`encode_metadata`].
///
/// # Errors
///
/// Returns [`Error::Metadata`] if the bytes are not a ZIP archive, if the
/// archive does not contain exactly one member, or if that member is not
/// named [`METADATA_FILE_NAME`]. Returns [`Error::Json`] if the member is
/// not a valid metadata array.
pub fn decode_metadata(block: &[u8]) -> Result<MetadataSet> {
    let mut archive = ZipArchive::new(Cursor::new(block))
        .map_err(|e| Error::Metadata(format!("Metadata block is not an archive: {}", e)))?;

    if archive.len() != 1 {
        return Err(Error::Metadata(format!(
            "Metadata archive must contain exactly one member, found {}",
            archive.len()
        )));
    }

    let mut member = archive
        .by_index(0)
        .map_err(|e| Error::Metadata(format!("Unreadable metadata member: {}", e)))?;

    if member.name() != METADATA_FILE_NAME {
        return Err(Error::Metadata(format!(
            "Unexpected metadata member '{}'",
            member.name()
        )));
    }

    let mut json = Vec::new();
    member
        .read_to_end(&mut json)
        .map_err(|e| Error::Metadata(format!("Unreadable metadata member: {}", e)))?;

    Ok(serde_json::from_slice(&json)?)
}
