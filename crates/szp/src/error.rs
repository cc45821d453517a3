//! Error types for szp operations.
//!
//! This module defines the [`enum@Error`] enum covering every failure of the
//! build, verify and extract pipeline. Each variant belongs to one
//! [`ErrorKind`], the coarse taxonomy surfaced to operators.
//!
//! # See Also
//!
//! - [`crate::Result`] - Convenience type alias using this error

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Error type for szp operations.
///
/// All public functions in this crate return [`crate::Result<T>`], which uses this error type.
/// Use [`Error::kind`] to branch on the failure class instead of matching
/// every variant.
///
/// # Examples
///
/// ```no_run
/// use szp::{ErrorKind, Szp};
///
/// let result = Szp::new()
///     .certificate("signer.pem")
///     .inspect("archive.szp");
/// match result {
///     Ok(report) => println!("{} files", report.metadata.len()),
///     Err(e) if e.kind() == ErrorKind::Trust => eprintln!("untrusted signer: {e}"),
///     Err(e) => eprintln!("{} error: {e}", e.kind()),
/// }
/// ```
#[derive(Debug, Error)]
pub enum Error {
    /// I/O operation failed.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// I/O operation on a known path failed.
    #[error("IO error at {}: {source}", path.display())]
    IoAt {
        /// Path being read, written or listed.
        path: PathBuf,
        /// Underlying failure.
        source: io::Error,
    },

    /// Malformed frame, envelope or archive member.
    #[error("Invalid format: {0}")]
    Format(String),

    /// ZIP archive could not be read or written.
    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// The embedded metadata archive is missing, has extra members, or is
    /// otherwise structurally wrong.
    #[error("Invalid metadata: {0}")]
    Metadata(String),

    /// The metadata text could not be parsed or produced.
    #[error("Invalid metadata JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// Unreadable or invalid certificate or private key, or a key that does
    /// not belong to the certificate.
    #[error("Invalid credentials: {0}")]
    Credential(String),

    /// The signing backend failed to produce an envelope.
    #[error("Signing failed: {0}")]
    Signing(String),

    /// Cryptographic verification of the envelope failed.
    #[error("Signature verification failed: {0}")]
    Signature(String),

    /// The envelope is authentic but its signer is not the expected one.
    #[error("Untrusted signer: {0}")]
    Trust(String),

    /// An extracted file does not match its recorded metadata.
    #[error("Integrity check failed for {path}: {reason}")]
    Integrity {
        /// Archive-relative name of the offending member.
        path: String,
        /// What did not match.
        reason: String,
    },

    /// Destination already exists where a fresh entry was expected.
    #[error("Destination already exists: {}", .0.display())]
    Conflict(PathBuf),

    /// Invalid builder configuration.
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Failure class of an [`enum@Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Io,
    Format,
    Metadata,
    Credential,
    Signing,
    Signature,
    Trust,
    Integrity,
    Conflict,
    Config,
}

impl Error {
    /// Returns the taxonomy class of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Io(_) | Error::IoAt { .. } => ErrorKind::Io,
            Error::Format(_) | Error::Zip(_) => ErrorKind::Format,
            Error::Metadata(_) | Error::Json(_) => ErrorKind::Metadata,
            Error::Credential(_) => ErrorKind::Credential,
            Error::Signing(_) => ErrorKind::Signing,
            Error::Signature(_) => ErrorKind::Signature,
            Error::Trust(_) => ErrorKind::Trust,
            Error::Integrity { .. } => ErrorKind::Integrity,
            Error::Conflict(_) => ErrorKind::Conflict,
            Error::Config(_) => ErrorKind::Config,
        }
    }

    /// Returns a closure that attaches `path` to an [`io::Error`].
    ///
    /// Intended for `map_err`: `fs::read(p).map_err(Error::io_at(p))?`.
    pub(crate) fn io_at(path: impl AsRef<Path>) -> impl FnOnce(io::Error) -> Error {
        let path = path.as_ref().to_path_buf();
        move |source| Error::IoAt { path, source }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Io => "io",
            ErrorKind::Format => "format",
            ErrorKind::Metadata => "metadata",
            ErrorKind::Credential => "credential",
            ErrorKind::Signing => "signing",
            ErrorKind::Signature => "signature",
            ErrorKind::Trust => "trust",
            ErrorKind::Integrity => "integrity",
            ErrorKind::Conflict => "conflict",
            ErrorKind::Config => "config",
        };
        f.write_str(name)
    }
}
