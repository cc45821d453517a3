//! Trust material: certificates, signing keys and fingerprints.
//!
//! Signing credentials are a certificate plus the PKCS#8 private key that
//! belongs to it, loaded from PEM (or DER) files or from a PKCS#12 bundle.
//! Verification only needs a certificate, which a [`TrustProvider`] loads
//! from wherever the caller keeps it.
//!
//! # Examples
//!
//! ```no_run
//! use szp::crypto::SigningCredentials;
//!
//! // Load from PEM files
//! let cert_pem = std::fs::read("signer.pem")?;
//! let key_pem = std::fs::read("signer.key")?;
//! let credentials = SigningCredentials::from_pem(&cert_pem, &key_pem)?;
//! println!("signing as {}", credentials.fingerprint());
//!
//! // Load from a PKCS#12 bundle
//! let p12_data = std::fs::read("signer.p12")?;
//! let credentials = SigningCredentials::from_p12(&p12_data, "password")?;
//! # Ok::<(), szp::Error>(())
//! ```

use crate::{Error, Result};
use sha2::{Digest, Sha256};
use std::fmt;
use std::fs;
use std::path::Path;
use x509_certificate::{CapturedX509Certificate, InMemorySigningKeyPair, Sign};

/// Length of a certificate fingerprint in bytes.
pub const FINGERPRINT_LEN: usize = 32;

/// SHA-256 digest of a certificate's envelope encoding.
///
/// See [`envelope_encoding`] for why this can differ from a digest of the
/// certificate file.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint([u8; FINGERPRINT_LEN]);

impl Fingerprint {
    /// Computes the fingerprint of `certificate`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Credential`] if the certificate cannot be encoded.
    pub fn of(certificate: &CapturedX509Certificate) -> Result<Self> {
        Ok(Self::of_der(&envelope_encoding(certificate)?))
    }

    /// Computes the fingerprint of raw certificate DER.
    #[must_use]
    pub fn of_der(der: &[u8]) -> Self {
        Self(Sha256::digest(der).into())
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8; FINGERPRINT_LEN] {
        &self.0
    }

    /// Lowercase hex form, without separators.
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Compares against an operator-supplied fingerprint.
    ///
    /// Case, `:` separators and whitespace in `expected` are ignored, so
    /// `AB:CD:...` and `abcd...` compare equal.
    ///
    /// ```
    /// # use szp::crypto::Fingerprint;
    /// let fp = Fingerprint::of_der(b"not really a certificate");
    /// let colons = fp
    ///     .to_hex()
    ///     .to_uppercase()
    ///     .as_bytes()
    ///     .chunks(2)
    ///     .map(|c| std::str::from_utf8(c).unwrap())
    ///     .collect::<Vec<_>>()
    ///     .join(":");
    /// assert!(fp.matches(&colons));
    /// ```
    #[must_use]
    pub fn matches(&self, expected: &str) -> bool {
        normalize_fingerprint(expected) == self.to_hex()
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", self.to_hex())
    }
}

/// Strips separators and whitespace from a hex fingerprint and lowercases it.
#[must_use]
pub fn normalize_fingerprint(fingerprint: &str) -> String {
    fingerprint
        .chars()
        .filter(|c| *c != ':' && !c.is_whitespace())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// Encodes `certificate` the way it appears inside a signed envelope.
///
/// The CMS layer re-encodes certificates when it embeds them and again when
/// it parses an envelope, so the bytes of a certificate file are not what a
/// verifier sees. Fingerprints and trust comparisons use this form on both
/// sides.
///
/// # Errors
///
/// Returns [`Error::Credential`] if the certificate cannot be encoded.
pub fn envelope_encoding(certificate: &CapturedX509Certificate) -> Result<Vec<u8>> {
    certificate
        .encode_ber()
        .map_err(|e| Error::Credential(format!("Failed to encode certificate: {}", e)))
}

/// Parses an X.509 certificate from PEM, falling back to DER.
///
/// # Errors
///
/// Returns [`Error::Credential`] if neither encoding parses.
pub fn parse_certificate(data: &[u8]) -> Result<CapturedX509Certificate> {
    CapturedX509Certificate::from_pem(data)
        .or_else(|_| CapturedX509Certificate::from_der(data.to_vec()))
        .map_err(|e| Error::Credential(format!("Failed to parse certificate: {}", e)))
}

/// Parses a PKCS#8 private key from PEM, falling back to DER.
///
/// RSA, ECDSA (P-256, P-384) and Ed25519 keys are accepted.
///
/// # Errors
///
/// Returns [`Error::Credential`] if neither encoding parses.
pub fn parse_private_key(data: &[u8]) -> Result<InMemorySigningKeyPair> {
    InMemorySigningKeyPair::from_pkcs8_pem(data)
        .or_else(|_| InMemorySigningKeyPair::from_pkcs8_der(data))
        .map_err(|e| Error::Credential(format!("Failed to parse private key: {}", e)))
}

/// Fails unless `key` is the private half of `certificate`'s public key.
pub(crate) fn check_key_pair(
    certificate: &CapturedX509Certificate,
    key: &InMemorySigningKeyPair,
) -> Result<()> {
    if key.public_key_data() != certificate.public_key_data() {
        return Err(Error::Credential(
            "Private key does not match the certificate's public key".into(),
        ));
    }
    Ok(())
}

/// Source of certificates and private keys.
///
/// The pipeline only ever asks for trust material by path; implementations
/// decide where the bytes come from and how they are encoded.
pub trait TrustProvider: Send + Sync {
    /// Loads the certificate stored at `path`.
    fn load_certificate(&self, path: &Path) -> Result<CapturedX509Certificate>;

    /// Loads the private key stored at `path`.
    fn load_private_key(&self, path: &Path) -> Result<InMemorySigningKeyPair>;
}

/// Reads trust material from PEM or DER files on disk.
#[derive(Debug, Default, Clone, Copy)]
pub struct PemFileProvider;

impl TrustProvider for PemFileProvider {
    fn load_certificate(&self, path: &Path) -> Result<CapturedX509Certificate> {
        let data = read_trust_file(path)?;
        parse_certificate(&data)
            .map_err(|e| Error::Credential(format!("{}: {}", path.display(), credential_cause(e))))
    }

    fn load_private_key(&self, path: &Path) -> Result<InMemorySigningKeyPair> {
        let data = read_trust_file(path)?;
        parse_private_key(&data)
            .map_err(|e| Error::Credential(format!("{}: {}", path.display(), credential_cause(e))))
    }
}

/// Reads a certificate, key or bundle file.
///
/// Read failures are reported as [`Error::Credential`] naming the path.
pub(crate) fn read_trust_file(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).map_err(|e| Error::Credential(format!("{}: {}", path.display(), e)))
}

fn credential_cause(e: Error) -> String {
    match e {
        Error::Credential(cause) => cause,
        other => other.to_string(),
    }
}

/// A signing certificate together with its private key.
///
/// The pair is checked on construction: the key must belong to the
/// certificate.
///
/// # Security
///
/// The private key held here should be treated as sensitive data. The
/// [`Debug`] output shows only the certificate fingerprint.
pub struct SigningCredentials {
    certificate: CapturedX509Certificate,
    signing_key: InMemorySigningKeyPair,
    fingerprint: Fingerprint,
}

impl SigningCredentials {
    /// Pairs an already parsed certificate and key.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Credential`] if the key does not belong to the
    /// certificate.
    pub fn new(
        certificate: CapturedX509Certificate,
        signing_key: InMemorySigningKeyPair,
    ) -> Result<Self> {
        check_key_pair(&certificate, &signing_key)?;
        let fingerprint = Fingerprint::of(&certificate)?;
        Ok(Self {
            certificate,
            signing_key,
            fingerprint,
        })
    }

    /// Loads credentials from a PEM certificate and an unencrypted PEM
    /// PKCS#8 private key. DER input is accepted for either.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Credential`] if either input does not parse or if
    /// the key does not belong to the certificate.
    pub fn from_pem(cert_pem: &[u8], key_pem: &[u8]) -> Result<Self> {
        Self::new(parse_certificate(cert_pem)?, parse_private_key(key_pem)?)
    }

    /// Loads credentials from a PKCS#12 bundle.
    ///
    /// The first certificate and first key in the bundle are used. The
    /// password is only used while parsing and is not retained.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Credential`] if the bundle is malformed, the
    /// password is wrong, the bundle lacks a certificate or key, or the two
    /// do not belong together.
    pub fn from_p12(p12_data: &[u8], password: &str) -> Result<Self> {
        let pfx = p12::PFX::parse(p12_data)
            .map_err(|e| Error::Credential(format!("Failed to parse PKCS#12: {:?}", e)))?;

        let keys = pfx.key_bags(password).map_err(|e| {
            Error::Credential(format!("Failed to extract keys from PKCS#12: {:?}", e))
        })?;
        let certs = pfx.cert_x509_bags(password).map_err(|e| {
            Error::Credential(format!("Failed to extract certs from PKCS#12: {:?}", e))
        })?;

        let cert_der = certs
            .into_iter()
            .next()
            .ok_or_else(|| Error::Credential("No certificate in PKCS#12".into()))?;
        let key_der = keys
            .first()
            .ok_or_else(|| Error::Credential("No private key in PKCS#12".into()))?;

        let certificate = CapturedX509Certificate::from_der(cert_der)
            .map_err(|e| Error::Credential(format!("Failed to parse certificate DER: {}", e)))?;
        let signing_key = InMemorySigningKeyPair::from_pkcs8_der(key_der)
            .map_err(|e| Error::Credential(format!("Failed to parse private key DER: {}", e)))?;

        Self::new(certificate, signing_key)
    }

    #[must_use]
    pub fn certificate(&self) -> &CapturedX509Certificate {
        &self.certificate
    }

    #[must_use]
    pub fn signing_key(&self) -> &InMemorySigningKeyPair {
        &self.signing_key
    }

    #[must_use]
    pub fn fingerprint(&self) -> Fingerprint {
        self.fingerprint
    }
}

impl fmt::Debug for SigningCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningCredentials")
            .field("fingerprint", &self.fingerprint())
            .finish_non_exhaustive()
    }
}
