//! Keystore module
//!
//! Read-only access to signing keys and trusted certificates. The same trait
//! backs both the keystore (own key entries) and the truststore (pinned
//! partner or CA certificates) of a crypto configuration.

use super::certificate::Certificate;
use super::keypair::Keypair;
use thiserror::Error;

pub mod file_keystore;
pub mod memory_keystore;

pub use file_keystore::FileKeystore;
pub use memory_keystore::MemoryKeystore;

/// Keystore errors
#[derive(Debug, Error)]
pub enum KeystoreError {
    #[error("Key not found: {0}")]
    NotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Encryption error: {0}")]
    Encryption(String),

    #[error("Decryption error: {0}")]
    Decryption(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Invalid key material: {0}")]
    InvalidKey(String),

    #[error("Invalid password")]
    InvalidPassword,

    #[error("Other error: {0}")]
    Other(String),
}

/// A private key together with the certificate that publishes its public half
#[derive(Debug, Clone)]
pub struct KeyEntry {
    pub alias: String,
    pub keypair: Keypair,
    pub certificate: Certificate,
}

/// Abstract keystore trait
pub trait Keystore: Send + Sync {
    /// Unlock the key entry stored under `alias`
    fn load_key_entry(&self, alias: &str, key_password: &str) -> Result<KeyEntry, KeystoreError>;

    /// Certificates trusted by this store
    fn trusted_certificates(&self) -> Result<Vec<Certificate>, KeystoreError>;

    /// Aliases of all key entries
    fn aliases(&self) -> Result<Vec<String>, KeystoreError>;
}
