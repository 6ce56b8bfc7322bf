//! Crypto configuration: key material and signing policy for one party
//!
//! A `CryptoConfig` is immutable once built and shared through `Arc` by every
//! exchange that uses it.

use super::algorithms::{DigestAlgorithm, KeyReferenceType, SignatureAlgorithm};
use super::keystore::{FileKeystore, KeyEntry, Keystore, KeystoreError};
use crate::config::{ConfigError, CryptoSettings};
use secrecy::{ExposeSecret, SecretString};
use std::fmt;
use std::path::Path;
use std::sync::Arc;

fn open_keystore(path: &Path, password: &str) -> Result<FileKeystore, ConfigError> {
    FileKeystore::open(path, password).map_err(|source| ConfigError::Keystore {
        path: path.to_path_buf(),
        source,
    })
}

#[derive(Clone)]
pub struct CryptoConfig {
    keystore: Arc<dyn Keystore>,
    truststore: Arc<dyn Keystore>,
    key_alias: String,
    key_password: SecretString,
    signature_algorithm: SignatureAlgorithm,
    digest_algorithm: DigestAlgorithm,
    key_reference_type: KeyReferenceType,
}

impl CryptoConfig {
    /// Use `keystore` for both the signing key and the trusted certificates
    pub fn new(keystore: Arc<dyn Keystore>, key_alias: impl Into<String>, key_password: &str) -> Self {
        Self {
            truststore: Arc::clone(&keystore),
            keystore,
            key_alias: key_alias.into(),
            key_password: SecretString::new(key_password.to_string()),
            signature_algorithm: SignatureAlgorithm::default(),
            digest_algorithm: DigestAlgorithm::default(),
            key_reference_type: KeyReferenceType::default(),
        }
    }

    /// Open the keystore files named in the configuration
    pub fn from_settings(settings: &CryptoSettings) -> Result<Self, ConfigError> {
        let keystore: Arc<dyn Keystore> =
            Arc::new(open_keystore(&settings.keystore_path, &settings.keystore_password)?);

        let mut config = Self::new(keystore, settings.key_alias.clone(), &settings.key_password)
            .with_signature_algorithm(settings.signature_algorithm)
            .with_digest_algorithm(settings.digest_algorithm)
            .with_key_reference_type(settings.key_reference_type);

        if let Some(path) = &settings.truststore_path {
            let password = settings
                .truststore_password
                .as_deref()
                .unwrap_or(&settings.keystore_password);
            config = config.with_truststore(Arc::new(open_keystore(path, password)?));
        }
        Ok(config)
    }

    pub fn with_truststore(mut self, truststore: Arc<dyn Keystore>) -> Self {
        self.truststore = truststore;
        self
    }

    pub fn with_signature_algorithm(mut self, algorithm: SignatureAlgorithm) -> Self {
        self.signature_algorithm = algorithm;
        self
    }

    pub fn with_digest_algorithm(mut self, algorithm: DigestAlgorithm) -> Self {
        self.digest_algorithm = algorithm;
        self
    }

    pub fn with_key_reference_type(mut self, reference_type: KeyReferenceType) -> Self {
        self.key_reference_type = reference_type;
        self
    }

    pub fn keystore(&self) -> &dyn Keystore {
        self.keystore.as_ref()
    }

    pub fn truststore(&self) -> &dyn Keystore {
        self.truststore.as_ref()
    }

    pub fn key_alias(&self) -> &str {
        &self.key_alias
    }

    pub fn signature_algorithm(&self) -> SignatureAlgorithm {
        self.signature_algorithm
    }

    pub fn digest_algorithm(&self) -> DigestAlgorithm {
        self.digest_algorithm
    }

    pub fn key_reference_type(&self) -> KeyReferenceType {
        self.key_reference_type
    }

    /// Unlock the configured signing key
    pub fn load_signing_entry(&self) -> Result<KeyEntry, KeystoreError> {
        self.keystore
            .load_key_entry(&self.key_alias, self.key_password.expose_secret())
    }
}

impl fmt::Debug for CryptoConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CryptoConfig")
            .field("key_alias", &self.key_alias)
            .field("signature_algorithm", &self.signature_algorithm)
            .field("digest_algorithm", &self.digest_algorithm)
            .field("key_reference_type", &self.key_reference_type)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_crypto::certificate::Certificate;
    use crate::core_crypto::keypair::Keypair;
    use crate::core_crypto::keystore::MemoryKeystore;
    use std::time::Duration;
    use tempfile::TempDir;

    #[test]
    fn test_builder_defaults() {
        let config = CryptoConfig::new(Arc::new(MemoryKeystore::new()), "sender", "pw");
        assert_eq!(config.key_alias(), "sender");
        assert_eq!(config.signature_algorithm(), SignatureAlgorithm::Ed25519);
        assert_eq!(config.digest_algorithm(), DigestAlgorithm::Sha256);
        assert_eq!(config.key_reference_type(), KeyReferenceType::DirectReference);

        let config = config.with_key_reference_type(KeyReferenceType::KeyIdentifier);
        assert_eq!(config.key_reference_type(), KeyReferenceType::KeyIdentifier);
    }

    #[test]
    fn test_debug_redacts_password() {
        let config = CryptoConfig::new(Arc::new(MemoryKeystore::new()), "sender", "super-secret");
        assert!(!format!("{:?}", config).contains("super-secret"));
    }

    #[test]
    fn test_from_settings_opens_keystore_and_truststore() {
        let dir = TempDir::new().unwrap();
        let ttl = Duration::from_secs(3600);

        let own = Keypair::generate();
        let own_cert = Certificate::self_signed("CN=sender", 1, &own, ttl).unwrap();
        let keystore_path = dir.path().join("keys.as4ks");
        let mut keystore = FileKeystore::create(&keystore_path);
        keystore.add_key_entry("sender", &own, own_cert, "key-pass").unwrap();
        keystore.save("store-pass").unwrap();

        let partner = Keypair::generate();
        let partner_cert = Certificate::self_signed("CN=partner", 2, &partner, ttl).unwrap();
        let truststore_path = dir.path().join("trust.as4ks");
        let mut truststore = FileKeystore::create(&truststore_path);
        truststore.add_trusted_certificate(partner_cert.clone());
        truststore.save("trust-pass").unwrap();

        let settings = CryptoSettings {
            keystore_path,
            keystore_password: "store-pass".to_string(),
            key_alias: "sender".to_string(),
            key_password: "key-pass".to_string(),
            truststore_path: Some(truststore_path),
            truststore_password: Some("trust-pass".to_string()),
            key_reference_type: KeyReferenceType::IssuerSerial,
            ..CryptoSettings::default()
        };

        let config = CryptoConfig::from_settings(&settings).unwrap();
        assert_eq!(config.load_signing_entry().unwrap().keypair.public_key(), own.public_key());
        assert_eq!(config.truststore().trusted_certificates().unwrap(), vec![partner_cert]);
        assert_eq!(config.key_reference_type(), KeyReferenceType::IssuerSerial);
    }

    #[test]
    fn test_from_settings_names_the_store_that_failed() {
        let dir = TempDir::new().unwrap();
        let keystore_path = dir.path().join("keys.as4ks");
        FileKeystore::create(&keystore_path).save("store-pass").unwrap();
        let truststore_path = dir.path().join("trust.as4ks");
        FileKeystore::create(&truststore_path).save("trust-pass").unwrap();

        let settings = CryptoSettings {
            keystore_path,
            keystore_password: "store-pass".to_string(),
            key_alias: "sender".to_string(),
            truststore_path: Some(truststore_path.clone()),
            truststore_password: Some("wrong".to_string()),
            ..CryptoSettings::default()
        };

        match CryptoConfig::from_settings(&settings) {
            Err(ConfigError::Keystore { path, source }) => {
                assert_eq!(path, truststore_path);
                assert!(matches!(source, KeystoreError::InvalidPassword));
            }
            other => panic!("expected keystore error, got {:?}", other.map(|_| ())),
        }
    }
}
