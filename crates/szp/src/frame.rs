//! Unsigned container framing.
//!
//! The frame is the byte layout that becomes the content of the signed
//! envelope:
//!
//! ```text
//! +----------------------+------------------------+----------------------+
//! | metadata length (u32)| metadata block         | file archive         |
//! | 4 bytes, little-end. | `length` bytes         | remaining bytes      |
//! +----------------------+------------------------+----------------------+
//! ```
//!
//! There is no padding and no trailer. The length field is always
//! little-endian; [`encode_length`] and [`decode_length`] are the only two
//! places that know this.

use crate::{Error, Result};

/// Size of the length prefix in bytes.
pub const LENGTH_PREFIX_LEN: usize = 4;

/// A borrowed view of a container frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContainerFrame<'a> {
    /// Metadata archive bytes (see [`crate::metadata::codec`]).
    pub metadata_block: &'a [u8],
    /// ZIP archive holding the packed files.
    pub file_archive: &'a [u8],
}

impl<'a> ContainerFrame<'a> {
    #[must_use]
    pub fn new(metadata_block: &'a [u8], file_archive: &'a [u8]) -> Self {
        Self {
            metadata_block,
            file_archive,
        }
    }

    /// Serializes the frame into one contiguous buffer.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Format`] if the metadata block is larger than the
    /// length field can express.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let prefix = encode_length(self.metadata_block.len())?;

        let mut out = Vec::with_capacity(
            LENGTH_PREFIX_LEN + self.metadata_block.len() + self.file_archive.len(),
        );
        out.extend_from_slice(&prefix);
        out.extend_from_slice(self.metadata_block);
        out.extend_from_slice(self.file_archive);
        Ok(out)
    }

    /// Splits `bytes` into its metadata block and file archive.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Format`] if `bytes` is shorter than the length
    /// prefix or if the declared metadata length exceeds the bytes that
    /// follow it.
    pub fn parse(bytes: &'a [u8]) -> Result<Self> {
        if bytes.len() < LENGTH_PREFIX_LEN {
            return Err(Error::Format(format!(
                "Frame too short: {} bytes, need at least {}",
                bytes.len(),
                LENGTH_PREFIX_LEN
            )));
        }

        let (prefix, rest) = bytes.split_at(LENGTH_PREFIX_LEN);
        let declared = decode_length(prefix)?;

        if declared > rest.len() {
            return Err(Error::Format(format!(
                "Declared metadata length {} exceeds the {} bytes available",
                declared,
                rest.len()
            )));
        }

        let (metadata_block, file_archive) = rest.split_at(declared);
        Ok(Self {
            metadata_block,
            file_archive,
        })
    }
}

/// Encodes a metadata block length as the frame prefix.
pub fn encode_length(len: usize) -> Result<[u8; LENGTH_PREFIX_LEN]> {
    let len = u32::try_from(len).map_err(|_| {
        Error::Format(format!("Metadata block of {} bytes exceeds u32 range", len))
    })?;
    Ok(len.to_le_bytes())
}

/// Decodes the frame prefix produced by [`encode_length`].
pub fn decode_length(prefix: &[u8]) -> Result<usize> {
    let bytes: [u8; LENGTH_PREFIX_LEN] = prefix.try_into().map_err(|_| {
        Error::Format(format!(
            "Length prefix must be {} bytes, got {}",
            LENGTH_PREFIX_LEN,
            prefix.len()
        ))
    })?;
    usize::try_from(u32::from_le_bytes(bytes))
        .map_err(|_| Error::Format("Declared metadata length exceeds address space".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;

    #[test]
    fn test_encode_layout() {
        let frame = ContainerFrame::new(b"META", b"FILES");
        let bytes = frame.encode().unwrap();
        assert_eq!(&bytes[..4], &[4, 0, 0, 0]);
        assert_eq!(&bytes[4..8], b"META");
        assert_eq!(&bytes[8..], b"FILES");
    }

    #[test]
    fn test_length_is_little_endian() {
        assert_eq!(encode_length(0x0102_0304).unwrap(), [0x04, 0x03, 0x02, 0x01]);
        assert_eq!(decode_length(&[0x04, 0x03, 0x02, 0x01]).unwrap(), 0x0102_0304);
    }

    #[test]
    fn test_parse_splits_at_declared_length() {
        let bytes = ContainerFrame::new(b"metadata", b"archive-bytes")
            .encode()
            .unwrap();
        let frame = ContainerFrame::parse(&bytes).unwrap();
        assert_eq!(frame.metadata_block, b"metadata");
        assert_eq!(frame.file_archive, b"archive-bytes");
    }

    #[test]
    fn test_declared_length_matches_block() {
        let meta = vec![7u8; 300];
        let bytes = ContainerFrame::new(&meta, b"").encode().unwrap();
        assert_eq!(decode_length(&bytes[..4]).unwrap(), meta.len());
    }

    #[test]
    fn test_parse_empty_file_archive() {
        let bytes = ContainerFrame::new(b"m", b"").encode().unwrap();
        let frame = ContainerFrame::parse(&bytes).unwrap();
        assert_eq!(frame.metadata_block, b"m");
        assert!(frame.file_archive.is_empty());
    }

    #[test]
    fn test_parse_rejects_inflated_length() {
        let mut bytes = ContainerFrame::new(b"META", b"FILES").encode().unwrap();
        bytes[..4].copy_from_slice(&100u32.to_le_bytes());
        let err = ContainerFrame::parse(&bytes).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Format);
    }

    #[test]
    fn test_parse_rejects_big_endian_reading_of_length() {
        // 4 encoded little-endian reads as 0x04000000 big-endian; a writer
        // using the other byte order must be rejected, not mis-sliced.
        let mut bytes = ContainerFrame::new(b"META", b"FILES").encode().unwrap();
        bytes[..4].copy_from_slice(&4u32.to_be_bytes());
        assert!(matches!(ContainerFrame::parse(&bytes), Err(Error::Format(_))));
    }

    #[test]
    fn test_parse_rejects_short_input() {
        assert!(matches!(ContainerFrame::parse(b"abc"), Err(Error::Format(_))));
        assert!(matches!(ContainerFrame::parse(b""), Err(Error::Format(_))));
    }

    #[test]
    fn test_parse_accepts_exact_length() {
        let bytes = ContainerFrame::new(b"META", b"").encode().unwrap();
        assert_eq!(bytes.len(), 8);
        assert!(ContainerFrame::parse(&bytes).is_ok());
    }
}
