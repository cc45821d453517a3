//! Signing and verification of container envelopes.

pub mod cert;
pub mod cms;
pub mod verify;

pub use cert::{
    envelope_encoding, normalize_fingerprint, parse_certificate, parse_private_key, Fingerprint, PemFileProvider,
    SigningCredentials, TrustProvider,
};
pub use cms::{sign_frame, SignedEnvelope};
pub use verify::{VerifiedContainer, Verifier};
