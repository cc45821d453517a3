mod common;

use common::{write_tree, Identity};
use cryptographic_message_syntax::SignedData;
use std::fs;
use szp::frame::{ContainerFrame, LENGTH_PREFIX_LEN};
use szp::ErrorKind;
use tempfile::TempDir;

/// Returns the offset of the attached content inside `envelope` and the content.
fn locate_content(envelope: &[u8]) -> (usize, Vec<u8>) {
    let signed_data = SignedData::parse_ber(envelope).unwrap();
    let content = signed_data.signed_content().unwrap().to_vec();
    let offset = envelope
        .windows(content.len())
        .position(|w| w == content.as_slice())
        .unwrap();
    (offset, content)
}

#[test]
fn test_flipped_file_archive_byte_fails_verification() {
    let temp_dir = TempDir::new().unwrap();
    let id = Identity::generate(temp_dir.path(), "c1");
    let source = temp_dir.path().join("tree");
    write_tree(&source, &[("a.txt", b"hi"), ("sub/b.txt", b"bye")]);
    let report = id.signer().build(&source, temp_dir.path().join("out")).unwrap();

    let envelope = fs::read(&report.path).unwrap();
    let (offset, content) = locate_content(&envelope);
    let frame = ContainerFrame::parse(&content).unwrap();
    let archive_start = offset + LENGTH_PREFIX_LEN + frame.metadata_block.len();
    let archive_end = offset + content.len();
    assert!(archive_end > archive_start);

    let tampered_path = temp_dir.path().join("tampered.szp");
    for position in (archive_start..archive_end).step_by(11) {
        let mut tampered = envelope.clone();
        tampered[position] ^= 0x80;
        fs::write(&tampered_path, &tampered).unwrap();

        let err = id.verifier().inspect(&tampered_path).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Signature, "byte {} accepted", position);
    }
}

#[test]
fn test_flipped_length_prefix_fails_verification() {
    let temp_dir = TempDir::new().unwrap();
    let id = Identity::generate(temp_dir.path(), "c1");
    let source = temp_dir.path().join("tree");
    write_tree(&source, &[("a.txt", b"hi")]);
    let report = id.signer().build(&source, temp_dir.path().join("out")).unwrap();

    let mut envelope = fs::read(&report.path).unwrap();
    let (offset, _) = locate_content(&envelope);
    envelope[offset] ^= 0x01;
    fs::write(&report.path, &envelope).unwrap();

    let dest = temp_dir.path().join("dest");
    let err = id.verifier().extract(&report.path, &dest).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Signature);
    assert!(!dest.exists());
}

#[test]
fn test_truncated_container_is_rejected() {
    let temp_dir = TempDir::new().unwrap();
    let id = Identity::generate(temp_dir.path(), "c1");
    let source = temp_dir.path().join("tree");
    write_tree(&source, &[("a.txt", b"hi")]);
    let report = id.signer().build(&source, temp_dir.path().join("out")).unwrap();

    let envelope = fs::read(&report.path).unwrap();
    fs::write(&report.path, &envelope[..envelope.len() / 2]).unwrap();

    let err = id.verifier().inspect(&report.path).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Format);
}
