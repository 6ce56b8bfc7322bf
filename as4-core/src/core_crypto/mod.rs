//! Key material, certificates and WS-Security signatures

pub mod algorithms;
pub mod certificate;
pub mod config;
pub mod errors;
pub mod keypair;
pub mod keystore;
pub mod signature;

pub use algorithms::{DigestAlgorithm, KeyReferenceType, SignatureAlgorithm};
pub use certificate::Certificate;
pub use config::CryptoConfig;
pub use errors::{CertificateError, SecurityError, SecurityResult};
pub use keypair::Keypair;
pub use keystore::{FileKeystore, KeyEntry, Keystore, KeystoreError, MemoryKeystore};
pub use signature::{SecurityAction, SignatureEngine, VerificationResult, DEFAULT_TIMESTAMP_TTL};
