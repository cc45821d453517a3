//! Signed, tamper-evident archive containers.
//!
//! A container is a CMS SignedData envelope whose content is a frame of a
//! length-prefixed metadata archive followed by a ZIP archive of files.
//! Every file is recorded with its size, modification time and SHA-256
//! digest, and re-checked against that record when extracted.
//!
//! Most callers only need the [`Szp`] builder.

pub mod archive;
pub mod builder;
pub mod crypto;
pub mod error;
pub mod frame;
pub mod metadata;

pub use archive::{CompressionLevel, ExtractSummary, RecordMatch};
pub use builder::{
    container_path, BuildReport, ExtractReport, InspectReport, Szp, CONTAINER_EXTENSION,
    DEFAULT_CONTAINER_NAME,
};
pub use crypto::{Fingerprint, PemFileProvider, SigningCredentials, TrustProvider};
pub use error::{Error, ErrorKind};
pub use metadata::{ContentDigest, FileRecord, MetadataSet};

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
pub(crate) mod test_support {
    use crate::crypto::SigningCredentials;
    use std::fs;
    use std::path::{Path, PathBuf};
    use x509_certificate::CapturedX509Certificate;

    /// A freshly generated self-signed ECDSA P-256 certificate and its key.
    pub(crate) struct Identity {
        pub name: String,
        pub cert_pem: String,
        pub key_pem: String,
        pub cert_der: Vec<u8>,
        pub key_der: Vec<u8>,
    }

    impl Identity {
        pub(crate) fn generate(common_name: &str) -> Self {
            let key_pair = rcgen::KeyPair::generate().unwrap();
            let mut params =
                rcgen::CertificateParams::new(vec![format!("{}.test", common_name)]).unwrap();
            params
                .distinguished_name
                .push(rcgen::DnType::CommonName, common_name);
            let cert = params.self_signed(&key_pair).unwrap();

            Self {
                name: common_name.to_string(),
                cert_pem: cert.pem(),
                key_pem: key_pair.serialize_pem(),
                cert_der: cert.der().to_vec(),
                key_der: key_pair.serialize_der(),
            }
        }

        pub(crate) fn certificate(&self) -> CapturedX509Certificate {
            CapturedX509Certificate::from_der(self.cert_der.clone()).unwrap()
        }

        pub(crate) fn credentials(&self) -> SigningCredentials {
            SigningCredentials::from_pem(self.cert_pem.as_bytes(), self.key_pem.as_bytes())
                .unwrap()
        }

        /// Writes `<name>.pem` and `<name>.key` into `dir`.
        pub(crate) fn write_to(&self, dir: &Path) -> (PathBuf, PathBuf) {
            let cert = dir.join(format!("{}.pem", self.name));
            let key = dir.join(format!("{}.key", self.name));
            fs::write(&cert, &self.cert_pem).unwrap();
            fs::write(&key, &self.key_pem).unwrap();
            (cert, key)
        }
    }
}
