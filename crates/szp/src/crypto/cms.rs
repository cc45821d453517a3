//! Envelope signing.
//!
//! Wraps a container frame as the attached content of a CMS SignedData
//! message with a single signer, using the cryptographic-message-syntax
//! crate.

use super::cert::{Fingerprint, SigningCredentials};
use crate::{Error, Result};
use cryptographic_message_syntax::{SignedDataBuilder, SignerBuilder};
use tracing::debug;

/// A finished envelope and the fingerprint of the certificate that signed it.
#[derive(Debug, Clone)]
pub struct SignedEnvelope {
    /// DER-encoded SignedData.
    pub bytes: Vec<u8>,
    pub signer_fingerprint: Fingerprint,
}

/// Signs `frame` with `credentials`.
///
/// The frame is moved into the envelope as its content. The signing
/// certificate is embedded; no other certificates are added.
///
/// # Errors
///
/// Returns [`Error::Signing`] if the CMS structure cannot be produced.
pub fn sign_frame(frame: Vec<u8>, credentials: &SigningCredentials) -> Result<SignedEnvelope> {
    let frame_len = frame.len();
    let signer = SignerBuilder::new(credentials.signing_key(), credentials.certificate().clone());

    let bytes = SignedDataBuilder::default()
        .content_inline(frame)
        .signer(signer)
        .build_der()
        .map_err(|e| Error::Signing(format!("Failed to build CMS signature: {}", e)))?;

    let signer_fingerprint = credentials.fingerprint();
    debug!(
        content = frame_len,
        envelope = bytes.len(),
        signer = %signer_fingerprint,
        "signed container frame"
    );

    Ok(SignedEnvelope {
        bytes,
        signer_fingerprint,
    })
}
