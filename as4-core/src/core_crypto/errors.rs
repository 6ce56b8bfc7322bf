//! Error types for signing, verification and certificate handling

use super::keystore::KeystoreError;
use thiserror::Error;

/// Certificate encoding and validation failures
#[derive(Debug, Error)]
pub enum CertificateError {
    #[error("Certificate encoding error: {0}")]
    Encoding(String),

    #[error("Invalid public key: {0}")]
    InvalidKey(String),

    #[error("Certificate {subject} is not valid before {not_before}")]
    NotYetValid { subject: String, not_before: i64 },

    #[error("Certificate {subject} expired at {not_after}")]
    Expired { subject: String, not_after: i64 },

    #[error("Certificate issuer {actual} does not match {expected}")]
    IssuerMismatch { expected: String, actual: String },

    #[error("Certificate signature is invalid for {0}")]
    InvalidSignature(String),
}

/// Result type for security operations
pub type SecurityResult<T> = Result<T, SecurityError>;

/// Failures raised while signing an outgoing envelope or verifying an incoming one
#[derive(Debug, Error)]
pub enum SecurityError {
    #[error("Message has no WS-Security header")]
    MissingSecurityHeader,

    #[error("WS-Security header carries no signature")]
    MissingSignature,

    #[error("Envelope is already signed")]
    AlreadySigned,

    #[error("No crypto configuration available for {0}")]
    MissingCryptoConfig(&'static str),

    #[error("Keystore error: {0}")]
    Keystore(#[from] KeystoreError),

    #[error("Certificate error: {0}")]
    Certificate(#[from] CertificateError),

    #[error("Signer certificate could not be resolved: {0}")]
    UnresolvedCertificate(String),

    #[error("Signer certificate is not trusted: {0}")]
    UntrustedCertificate(String),

    #[error("Algorithm mismatch: expected {expected}, got {actual}")]
    AlgorithmMismatch { expected: String, actual: String },

    #[error("Digest mismatch for reference {0}")]
    DigestMismatch(String),

    #[error("Signature reference {0} does not resolve to a message part")]
    UnknownReference(String),

    #[error("Message part {0} is not covered by the signature")]
    UnsignedPart(String),

    #[error("Security timestamp expired at {0}")]
    TimestampExpired(String),

    #[error("Signature value is invalid")]
    InvalidSignature,
}
