//! Szp builder API
//!
//! Provides a builder pattern interface over the whole pipeline: building a
//! signed container from a directory, inspecting one, and extracting one.

use crate::archive::{pack_directory, CompressionLevel, ExtractSummary, Extractor, RecordMatch};
use crate::crypto::cert::{check_key_pair, read_trust_file};
use crate::crypto::{
    sign_frame, Fingerprint, PemFileProvider, SigningCredentials, TrustProvider,
    VerifiedContainer, Verifier,
};
use crate::frame::ContainerFrame;
use crate::metadata::{decode_metadata, encode_metadata, MetadataSet};
use crate::{Error, Result};
use secrecy::{ExposeSecret, SecretString};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::NamedTempFile;
use tracing::info;

/// File extension of signed containers.
pub const CONTAINER_EXTENSION: &str = "szp";

/// Container name used when none is given.
pub const DEFAULT_CONTAINER_NAME: &str = "archive";

/// Returns `name` with the container extension appended if it lacks it.
///
/// ```
/// use std::path::Path;
/// use szp::container_path;
///
/// assert_eq!(container_path("archive"), Path::new("archive.szp"));
/// assert_eq!(container_path("out/site.szp"), Path::new("out/site.szp"));
/// assert_eq!(container_path("site.tar"), Path::new("site.tar.szp"));
/// ```
#[must_use]
pub fn container_path(name: impl AsRef<Path>) -> PathBuf {
    let name = name.as_ref();
    if name
        .extension()
        .is_some_and(|ext| ext == CONTAINER_EXTENSION)
    {
        return name.to_path_buf();
    }
    let mut path = name.as_os_str().to_owned();
    path.push(".");
    path.push(CONTAINER_EXTENSION);
    PathBuf::from(path)
}

/// Outcome of [`Szp::build`].
#[derive(Debug, Clone)]
pub struct BuildReport {
    /// Where the container was written.
    pub path: PathBuf,
    /// Number of files packed.
    pub files: usize,
    /// Size of the written container in bytes.
    pub bytes: usize,
    pub signer_fingerprint: Fingerprint,
}

/// Outcome of [`Szp::inspect`].
#[derive(Debug, Clone)]
pub struct InspectReport {
    pub path: PathBuf,
    /// Records carried by the container, in build order.
    pub metadata: MetadataSet,
    pub signer_fingerprint: Fingerprint,
    /// Common name of the signer certificate's subject, if it has one.
    pub signer_subject: Option<String>,
    /// Size of the embedded file archive in bytes.
    pub file_archive_len: usize,
}

/// Outcome of [`Szp::extract`].
#[derive(Debug, Clone)]
pub struct ExtractReport {
    pub path: PathBuf,
    pub destination: PathBuf,
    pub summary: ExtractSummary,
    pub signer_fingerprint: Fingerprint,
}

/// Signed archive container tool with builder pattern API.
///
/// # Example
///
/// ```no_run
/// use szp::Szp;
///
/// let report = Szp::new()
///     .certificate("signer.pem")
///     .private_key("signer.key")
///     .compression_level(9)
///     .build("project", "release")?;
/// println!("Certificate's hash: {}", report.signer_fingerprint);
///
/// Szp::new()
///     .certificate("signer.pem")
///     .expected_fingerprint(report.signer_fingerprint.to_hex())
///     .staged_extraction(true)
///     .extract("release.szp", "unpacked")?;
/// # Ok::<(), szp::Error>(())
/// ```
#[derive(Clone)]
pub struct Szp {
    certificate: Option<PathBuf>,
    private_key: Option<PathBuf>,
    pkcs12: Option<PathBuf>,
    password: Option<SecretString>,
    expected_fingerprint: Option<String>,
    compression_level: CompressionLevel,
    record_match: RecordMatch,
    staged_extraction: bool,
    provider: Arc<dyn TrustProvider>,
}

impl Szp {
    /// Create a new Szp builder.
    pub fn new() -> Self {
        Self {
            certificate: None,
            private_key: None,
            pkcs12: None,
            password: None,
            expected_fingerprint: None,
            compression_level: CompressionLevel::DEFAULT,
            record_match: RecordMatch::default(),
            staged_extraction: false,
            provider: Arc::new(PemFileProvider),
        }
    }

    /// Set certificate file path (PEM or DER format).
    ///
    /// Signs with this certificate when building, and trusts only this
    /// certificate when inspecting or extracting.
    pub fn certificate(mut self, path: impl AsRef<Path>) -> Self {
        self.certificate = Some(path.as_ref().to_path_buf());
        self
    }

    /// Set private key file path (PKCS#8, PEM or DER format).
    ///
    /// Required with `certificate()` for building. When given for
    /// inspection or extraction it must belong to the certificate.
    pub fn private_key(mut self, path: impl AsRef<Path>) -> Self {
        self.private_key = Some(path.as_ref().to_path_buf());
        self
    }

    /// Set PKCS#12 file path (.p12 format).
    ///
    /// PKCS#12 files contain both the certificate and private key.
    /// Use `password()` to set the decryption password.
    pub fn pkcs12(mut self, path: impl AsRef<Path>) -> Self {
        self.pkcs12 = Some(path.as_ref().to_path_buf());
        self
    }

    /// Set password for the PKCS#12 file.
    ///
    /// The password is stored securely and will be zeroized when dropped.
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(SecretString::new(password.into()));
        self
    }

    /// Require the signer certificate to have this SHA-256 fingerprint.
    ///
    /// Case, `:` separators and whitespace are ignored.
    pub fn expected_fingerprint(mut self, fingerprint: impl Into<String>) -> Self {
        self.expected_fingerprint = Some(fingerprint.into());
        self
    }

    /// Set ZIP compression level for the file archive (0-9).
    ///
    /// 0 = no compression (fastest), 9 = maximum compression (smallest).
    /// Default is 6 (balanced).
    pub fn compression_level(mut self, level: u32) -> Self {
        self.compression_level = CompressionLevel::new(level);
        self
    }

    /// Set how extracted members are paired with metadata records.
    pub fn record_match(mut self, record_match: RecordMatch) -> Self {
        self.record_match = record_match;
        self
    }

    /// Extract into a scratch directory and move into place only on success.
    pub fn staged_extraction(mut self, staged: bool) -> Self {
        self.staged_extraction = staged;
        self
    }

    /// Replace the source of certificates and keys.
    ///
    /// Defaults to [`PemFileProvider`]. PKCS#12 bundles are always read
    /// from disk directly.
    pub fn trust_provider(mut self, provider: impl TrustProvider + 'static) -> Self {
        self.provider = Arc::new(provider);
        self
    }

    /// Validate the builder configuration.
    ///
    /// Returns an error if:
    /// - Both PKCS#12 and PEM credentials are specified
    /// - Neither PKCS#12 nor a certificate is specified
    /// - A private key is specified without a certificate
    pub fn validate(&self) -> Result<()> {
        let has_p12 = self.pkcs12.is_some();
        let has_pem = self.certificate.is_some() || self.private_key.is_some();

        if has_p12 && has_pem {
            return Err(Error::Config(
                "Cannot specify both PKCS#12 and PEM certificate/key".into(),
            ));
        }

        if !has_p12 && !has_pem {
            return Err(Error::Config(
                "Must specify either PKCS#12 or a certificate".into(),
            ));
        }

        if self.private_key.is_some() && self.certificate.is_none() {
            return Err(Error::Config(
                "A private key requires its certificate".into(),
            ));
        }

        Ok(())
    }

    fn load_p12(&self, path: &Path) -> Result<SigningCredentials> {
        let data = read_trust_file(path)?;
        let password = self
            .password
            .as_ref()
            .map(|p| p.expose_secret().as_str())
            .unwrap_or("");
        SigningCredentials::from_p12(&data, password)
    }

    /// Load signing credentials from configured paths.
    ///
    /// Uses PKCS#12 if configured, otherwise the certificate and private key.
    fn signing_credentials(&self) -> Result<SigningCredentials> {
        self.validate()?;

        if let Some(ref p12) = self.pkcs12 {
            return self.load_p12(p12);
        }

        let (cert, key) = match (&self.certificate, &self.private_key) {
            (Some(cert), Some(key)) => (cert, key),
            _ => {
                return Err(Error::Config(
                    "Both certificate and private key must be specified to build".into(),
                ))
            }
        };
        SigningCredentials::new(
            self.provider.load_certificate(cert)?,
            self.provider.load_private_key(key)?,
        )
    }

    /// Build the verifier for the configured trust material.
    fn verifier(&self) -> Result<Verifier> {
        self.validate()?;

        let trust_certificate = match (&self.pkcs12, &self.certificate) {
            (Some(p12), _) => self.load_p12(p12)?.certificate().clone(),
            (None, Some(cert)) => {
                let certificate = self.provider.load_certificate(cert)?;
                if let Some(ref key) = self.private_key {
                    check_key_pair(&certificate, &self.provider.load_private_key(key)?)?;
                }
                certificate
            }
            (None, None) => {
                return Err(Error::Config("No trust certificate configured".into()))
            }
        };

        let verifier = Verifier::new(trust_certificate);
        Ok(match &self.expected_fingerprint {
            Some(fingerprint) => verifier.expected_fingerprint(fingerprint.clone()),
            None => verifier,
        })
    }

    fn open(&self, container: &Path) -> Result<(PathBuf, VerifiedContainer)> {
        let verifier = self.verifier()?;
        let path = container_path(container);
        let envelope = fs::read(&path).map_err(Error::io_at(&path))?;
        let verified = verifier.verify(&envelope)?;
        Ok((path, verified))
    }

    /// Pack `source` into a signed container named `output`.
    ///
    /// The `.szp` extension is appended to `output` if missing. The
    /// container is written to a temporary file next to the target and
    /// renamed over it once complete, so a failed build leaves nothing
    /// behind.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Credentials are missing, unreadable or do not belong together
    /// - The source tree cannot be read
    /// - Signing fails
    /// - The output file cannot be written
    pub fn build(&self, source: impl AsRef<Path>, output: impl AsRef<Path>) -> Result<BuildReport> {
        let credentials = self.signing_credentials()?;
        let packed = pack_directory(source.as_ref(), self.compression_level)?;

        let metadata_block = encode_metadata(&packed.metadata)?;
        let frame = ContainerFrame::new(&metadata_block, &packed.file_archive).encode()?;
        let envelope = sign_frame(frame, &credentials)?;

        let path = container_path(output);
        write_atomically(&path, &envelope.bytes)?;

        info!(
            path = %path.display(),
            files = packed.metadata.len(),
            bytes = envelope.bytes.len(),
            signer = %envelope.signer_fingerprint,
            "built container"
        );

        Ok(BuildReport {
            path,
            files: packed.metadata.len(),
            bytes: envelope.bytes.len(),
            signer_fingerprint: envelope.signer_fingerprint,
        })
    }

    /// Verify `container` and return its metadata without extracting.
    ///
    /// # Errors
    ///
    /// Returns an error if the trust material cannot be loaded, the
    /// container fails verification, or its frame or metadata is malformed.
    pub fn inspect(&self, container: impl AsRef<Path>) -> Result<InspectReport> {
        let (path, verified) = self.open(container.as_ref())?;
        let frame = ContainerFrame::parse(&verified.content)?;
        let metadata = decode_metadata(frame.metadata_block)?;

        Ok(InspectReport {
            path,
            file_archive_len: frame.file_archive.len(),
            signer_fingerprint: verified.signer_fingerprint(),
            signer_subject: verified.signer.subject_common_name(),
            metadata,
        })
    }

    /// Verify `container` and unpack it into `destination`.
    ///
    /// Every member is checked against the embedded metadata before it is
    /// written; see [`Extractor`] for the pairing and staging rules.
    ///
    /// # Errors
    ///
    /// Returns an error if verification fails, the frame or metadata is
    /// malformed, a member fails its integrity check, or the destination
    /// conflicts with the archive.
    pub fn extract(
        &self,
        container: impl AsRef<Path>,
        destination: impl AsRef<Path>,
    ) -> Result<ExtractReport> {
        let (path, verified) = self.open(container.as_ref())?;
        let frame = ContainerFrame::parse(&verified.content)?;
        let metadata = decode_metadata(frame.metadata_block)?;

        let destination = destination.as_ref();
        let summary = Extractor::new(&metadata)
            .record_match(self.record_match)
            .staged(self.staged_extraction)
            .extract(frame.file_archive, destination)?;

        Ok(ExtractReport {
            path,
            destination: destination.to_path_buf(),
            summary,
            signer_fingerprint: verified.signer_fingerprint(),
        })
    }
}

impl Default for Szp {
    fn default() -> Self {
        Self::new()
    }
}

/// Writes `bytes` to `path` through a temporary file in the same directory.
fn write_atomically(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut file = NamedTempFile::new_in(dir).map_err(Error::io_at(dir))?;
    file.write_all(bytes).map_err(Error::io_at(path))?;
    file.as_file().sync_all().map_err(Error::io_at(path))?;
    file.persist(path).map_err(|e| Error::IoAt {
        path: path.to_path_buf(),
        source: e.error,
    })?;
    Ok(())
}
