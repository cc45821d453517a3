//! Envelope verification.
//!
//! [`Verifier::verify`] runs the gates below in order and stops at the first
//! failure:
//!
//! 1. the envelope parses and carries attached content ([`Error::Format`])
//! 2. it has at least one signer ([`Error::Trust`])
//! 3. every signer's signature and message digest verify against the
//!    content and the embedded certificate ([`Error::Signature`])
//! 4. there is exactly one signer ([`Error::Trust`])
//! 5. the signer certificate matches the expected fingerprint, if one was
//!    given ([`Error::Trust`])
//! 6. the signer certificate is byte-for-byte the trust certificate
//!    ([`Error::Trust`])
//!
//! Both certificates are compared in their [`envelope_encoding`].

use super::cert::{envelope_encoding, Fingerprint};
use crate::{Error, Result};
use cryptographic_message_syntax::{SignedData, SignerInfo};
use tracing::debug;
use x509_certificate::CapturedX509Certificate;

/// Content and signer of an envelope that passed every gate.
#[derive(Debug, Clone)]
pub struct VerifiedContainer {
    /// The envelope's content, a container frame.
    pub content: Vec<u8>,
    pub signer: CapturedX509Certificate,
    signer_fingerprint: Fingerprint,
}

impl VerifiedContainer {
    #[must_use]
    pub fn signer_fingerprint(&self) -> Fingerprint {
        self.signer_fingerprint
    }
}

/// Authenticates envelopes against one trust certificate.
#[derive(Debug, Clone)]
pub struct Verifier {
    trust_certificate: CapturedX509Certificate,
    expected_fingerprint: Option<String>,
}

impl Verifier {
    #[must_use]
    pub fn new(trust_certificate: CapturedX509Certificate) -> Self {
        Self {
            trust_certificate,
            expected_fingerprint: None,
        }
    }

    /// Requires the signer certificate to have this fingerprint.
    ///
    /// The value is compared with [`Fingerprint::matches`].
    #[must_use]
    pub fn expected_fingerprint(mut self, fingerprint: impl Into<String>) -> Self {
        self.expected_fingerprint = Some(fingerprint.into());
        self
    }

    /// Verifies `envelope` and returns its content.
    ///
    /// # Errors
    ///
    /// See the [module documentation](self) for the error kind of each gate.
    pub fn verify(&self, envelope: &[u8]) -> Result<VerifiedContainer> {
        let signed_data = SignedData::parse_ber(envelope)
            .map_err(|e| Error::Format(format!("Malformed signed envelope: {}", e)))?;

        let content = signed_data
            .signed_content()
            .ok_or_else(|| Error::Format("Signed envelope carries no content".into()))?;

        let signers: Vec<&SignerInfo> = signed_data.signers().collect();
        if signers.is_empty() {
            return Err(Error::Trust("Envelope has no signer".into()));
        }

        for signer in &signers {
            signer
                .verify_signature_with_signed_data(&signed_data)
                .map_err(|e| Error::Signature(format!("Signature is invalid: {}", e)))?;
            signer
                .verify_message_digest_with_signed_data(&signed_data)
                .map_err(|e| Error::Signature(format!("Content digest is invalid: {}", e)))?;
        }

        let signer = match signers.as_slice() {
            [signer] => *signer,
            _ => {
                return Err(Error::Trust(format!(
                    "Expected exactly one signer, found {}",
                    signers.len()
                )))
            }
        };

        let signer_cert = signer_certificate(&signed_data, signer)?;
        let signer_der = envelope_encoding(signer_cert)?;
        let fingerprint = Fingerprint::of_der(&signer_der);

        if let Some(expected) = &self.expected_fingerprint {
            if !fingerprint.matches(expected) {
                return Err(Error::Trust(format!(
                    "Signer fingerprint {} does not match the expected fingerprint",
                    fingerprint
                )));
            }
        }

        if signer_der != envelope_encoding(&self.trust_certificate)? {
            return Err(Error::Trust("certificates do not match".into()));
        }

        debug!(signer = %fingerprint, content = content.len(), "verified envelope");
        Ok(VerifiedContainer {
            content: content.to_vec(),
            signer: signer_cert.clone(),
            signer_fingerprint: fingerprint,
        })
    }
}

/// Finds the embedded certificate identified by `signer`'s issuer and serial.
fn signer_certificate<'a>(
    signed_data: &'a SignedData,
    signer: &SignerInfo,
) -> Result<&'a CapturedX509Certificate> {
    let (issuer, serial) = signer
        .certificate_issuer_and_serial()
        .ok_or_else(|| Error::Signature("Signer is not identified by issuer and serial".into()))?;

    signed_data
        .certificates()
        .find(|cert| cert.issuer_name() == issuer && cert.serial_number_asn1() == serial)
        .ok_or_else(|| Error::Signature("Signer certificate is not embedded".into()))
}
