//! File-based keystore with encryption at rest
//!
//! Encrypted File Format:
//! ```text
//! [Magic: 8 bytes "AS4KS001"]
//! [Version: 1 byte]
//! [Salt: 16 bytes]
//! [Nonce: 12 bytes]
//! [Ciphertext + AEAD tag: variable]
//! ```
//!
//! The plaintext is a JSON document listing key entries and trusted
//! certificates. Each private key seed is additionally sealed with its own
//! key password using the same format.

use super::{KeyEntry, Keystore, KeystoreError};
use crate::core_crypto::certificate::Certificate;
use crate::core_crypto::keypair::Keypair;
use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use argon2::{Argon2, Params};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;
use zeroize::Zeroize;

/// Magic header for encrypted keystore files
const MAGIC_HEADER: &[u8; 8] = b"AS4KS001";

/// Current keystore format version
const FORMAT_VERSION: u8 = 1;

/// Salt length for Argon2 KDF (16 bytes = 128 bits)
const SALT_LEN: usize = 16;

/// Nonce length for AES-GCM (12 bytes = 96 bits)
const NONCE_LEN: usize = 12;

/// Header size: magic(8) + version(1) + salt(16) + nonce(12) = 37 bytes
const HEADER_SIZE: usize = 8 + 1 + SALT_LEN + NONCE_LEN;

/// AES-GCM authentication tag length
const TAG_LEN: usize = 16;

#[derive(Debug, Default, Serialize, Deserialize)]
struct KeystoreDocument {
    keys: Vec<StoredKeyEntry>,
    trusted: Vec<Certificate>,
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredKeyEntry {
    alias: String,
    certificate: Certificate,
    sealed_seed: Vec<u8>,
}

/// Encrypted keystore file, loaded fully into memory
#[derive(Debug)]
pub struct FileKeystore {
    path: PathBuf,
    document: KeystoreDocument,
}

impl FileKeystore {
    /// Start an empty keystore that will be written to `path` by [`FileKeystore::save`]
    pub fn create(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            document: KeystoreDocument::default(),
        }
    }

    /// Open and decrypt an existing keystore file
    pub fn open(path: impl AsRef<Path>, store_password: &str) -> Result<Self, KeystoreError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(KeystoreError::NotFound(format!(
                "Keystore file not found: {}",
                path.display()
            )));
        }

        let encrypted = fs::read(path)?;
        let mut plaintext = open_sealed(store_password, &encrypted)?;
        let document = serde_json::from_slice(&plaintext)
            .map_err(|e| KeystoreError::Serialization(e.to_string()));
        plaintext.zeroize();

        let keystore = Self {
            path: path.to_path_buf(),
            document: document?,
        };
        debug!(
            path = %keystore.path.display(),
            keys = keystore.document.keys.len(),
            trusted = keystore.document.trusted.len(),
            "Opened keystore"
        );
        Ok(keystore)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Add a key entry; the seed is sealed with `key_password`
    pub fn add_key_entry(
        &mut self,
        alias: &str,
        keypair: &Keypair,
        certificate: Certificate,
        key_password: &str,
    ) -> Result<(), KeystoreError> {
        if certificate.public_key != keypair.public_key() {
            return Err(KeystoreError::InvalidKey(format!(
                "certificate for {} does not match its keypair",
                alias
            )));
        }
        let sealed_seed = seal(key_password, keypair.seed().as_ref())?;
        self.document.keys.retain(|entry| entry.alias != alias);
        self.document.keys.push(StoredKeyEntry {
            alias: alias.to_string(),
            certificate,
            sealed_seed,
        });
        Ok(())
    }

    pub fn add_trusted_certificate(&mut self, certificate: Certificate) {
        self.document.trusted.push(certificate);
    }

    /// Encrypt the keystore with `store_password` and write it atomically
    pub fn save(&self, store_password: &str) -> Result<(), KeystoreError> {
        let mut plaintext = serde_json::to_vec(&self.document)
            .map_err(|e| KeystoreError::Serialization(e.to_string()))?;
        let encrypted = seal(store_password, &plaintext);
        plaintext.zeroize();
        write_atomic(&self.path, &encrypted?)
    }
}

impl Keystore for FileKeystore {
    fn load_key_entry(&self, alias: &str, key_password: &str) -> Result<KeyEntry, KeystoreError> {
        let stored = self
            .document
            .keys
            .iter()
            .find(|entry| entry.alias == alias)
            .ok_or_else(|| KeystoreError::NotFound(format!("Key entry not found: {}", alias)))?;

        let mut seed = open_sealed(key_password, &stored.sealed_seed)?;
        let keypair = Keypair::from_seed(&seed);
        seed.zeroize();

        Ok(KeyEntry {
            alias: alias.to_string(),
            keypair: keypair?,
            certificate: stored.certificate.clone(),
        })
    }

    fn trusted_certificates(&self) -> Result<Vec<Certificate>, KeystoreError> {
        Ok(self.document.trusted.clone())
    }

    fn aliases(&self) -> Result<Vec<String>, KeystoreError> {
        Ok(self.document.keys.iter().map(|entry| entry.alias.clone()).collect())
    }
}

/// Encrypt data with AEAD (AES-256-GCM)
///
/// Returns: [magic][version][salt][nonce][ciphertext+tag]
fn seal(password: &str, data: &[u8]) -> Result<Vec<u8>, KeystoreError> {
    let mut salt = [0u8; SALT_LEN];
    rand::rng().fill_bytes(&mut salt);

    let mut key = derive_key_from_password(password, &salt)?;

    let mut nonce_bytes = [0u8; NONCE_LEN];
    rand::rng().fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let cipher = Aes256Gcm::new_from_slice(&key)
        .map_err(|e| KeystoreError::Encryption(format!("Invalid key: {}", e)));
    key.zeroize();

    let ciphertext = cipher?
        .encrypt(nonce, data)
        .map_err(|e| KeystoreError::Encryption(format!("Encryption failed: {}", e)))?;

    let mut result = Vec::with_capacity(HEADER_SIZE + ciphertext.len());
    result.extend_from_slice(MAGIC_HEADER);
    result.push(FORMAT_VERSION);
    result.extend_from_slice(&salt);
    result.extend_from_slice(&nonce_bytes);
    result.extend_from_slice(&ciphertext);
    Ok(result)
}

/// Decrypt data with AEAD (AES-256-GCM)
///
/// Expects: [magic][version][salt][nonce][ciphertext+tag]
fn open_sealed(password: &str, data: &[u8]) -> Result<Vec<u8>, KeystoreError> {
    if data.len() < 9 {
        return Err(KeystoreError::Decryption("File too short".to_string()));
    }

    if &data[0..8] != MAGIC_HEADER {
        return Err(KeystoreError::Decryption("Invalid magic header".to_string()));
    }

    let version = data[8];
    if version != FORMAT_VERSION {
        return Err(KeystoreError::Decryption(format!(
            "Unsupported version: {}",
            version
        )));
    }

    if data.len() < HEADER_SIZE + TAG_LEN {
        return Err(KeystoreError::Decryption("Truncated file".to_string()));
    }

    let salt = &data[9..9 + SALT_LEN];
    let nonce = Nonce::from_slice(&data[9 + SALT_LEN..HEADER_SIZE]);
    let ciphertext = &data[HEADER_SIZE..];

    let mut key = derive_key_from_password(password, salt)?;
    let cipher = Aes256Gcm::new_from_slice(&key)
        .map_err(|e| KeystoreError::Decryption(format!("Invalid key: {}", e)));
    key.zeroize();

    // AEAD tag mismatch means wrong password or corrupted data
    cipher?
        .decrypt(nonce, ciphertext)
        .map_err(|_| KeystoreError::InvalidPassword)
}

/// Write file atomically (write to temp, then rename)
fn write_atomic(path: &Path, data: &[u8]) -> Result<(), KeystoreError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let temp_path = path.with_extension("tmp");
    fs::write(&temp_path, data)?;
    fs::rename(temp_path, path)?;
    Ok(())
}

/// Derive 256-bit encryption key from password using Argon2id
fn derive_key_from_password(password: &str, salt: &[u8]) -> Result<Vec<u8>, KeystoreError> {
    let params = Params::new(
        19 * 1024, // 19 MiB memory cost
        2,         // 2 iterations
        1,         // 1 lane
        Some(32),  // 256-bit output for AES-256
    )
    .map_err(|e| KeystoreError::Encryption(format!("Invalid Argon2 params: {}", e)))?;

    let argon2 = Argon2::new(argon2::Algorithm::Argon2id, argon2::Version::V0x13, params);

    let mut key = vec![0u8; 32];
    argon2
        .hash_password_into(password.as_bytes(), salt, &mut key)
        .map_err(|e| KeystoreError::Encryption(format!("Key derivation failed: {}", e)))?;

    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;

    fn provisioned(dir: &TempDir) -> (PathBuf, Keypair, Certificate) {
        let path = dir.path().join("sender.as4ks");
        let kp = Keypair::generate();
        let cert = Certificate::self_signed("CN=sender", 1, &kp, Duration::from_secs(3600)).unwrap();

        let mut keystore = FileKeystore::create(&path);
        keystore.add_key_entry("sender", &kp, cert.clone(), "key-pass").unwrap();
        keystore.add_trusted_certificate(cert.clone());
        keystore.save("store-pass").unwrap();
        (path, kp, cert)
    }

    #[test]
    fn test_save_and_open() {
        let dir = TempDir::new().unwrap();
        let (path, kp, cert) = provisioned(&dir);

        let keystore = FileKeystore::open(&path, "store-pass").unwrap();
        let entry = keystore.load_key_entry("sender", "key-pass").unwrap();
        assert_eq!(entry.keypair.public_key(), kp.public_key());
        assert_eq!(entry.certificate, cert);
        assert_eq!(keystore.trusted_certificates().unwrap(), vec![cert]);
        assert_eq!(keystore.aliases().unwrap(), vec!["sender".to_string()]);
        assert!(!path.with_extension("tmp").exists());
    }

    #[test]
    fn test_wrong_store_password() {
        let dir = TempDir::new().unwrap();
        let (path, _, _) = provisioned(&dir);

        match FileKeystore::open(&path, "wrong") {
            Err(KeystoreError::InvalidPassword) => {}
            other => panic!("Expected InvalidPassword, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_wrong_key_password() {
        let dir = TempDir::new().unwrap();
        let (path, _, _) = provisioned(&dir);

        let keystore = FileKeystore::open(&path, "store-pass").unwrap();
        assert!(matches!(
            keystore.load_key_entry("sender", "wrong"),
            Err(KeystoreError::InvalidPassword)
        ));
        assert!(matches!(
            keystore.load_key_entry("partner", "key-pass"),
            Err(KeystoreError::NotFound(_))
        ));
    }

    #[test]
    fn test_missing_file() {
        let dir = TempDir::new().unwrap();
        let result = FileKeystore::open(dir.path().join("absent.as4ks"), "pw");
        assert!(matches!(result, Err(KeystoreError::NotFound(_))));
    }

    #[test]
    fn test_corrupted_aead_tag() {
        let dir = TempDir::new().unwrap();
        let (path, _, _) = provisioned(&dir);

        let mut encrypted = fs::read(&path).unwrap();
        let len = encrypted.len();
        encrypted[len - 1] ^= 0xFF;
        fs::write(&path, &encrypted).unwrap();

        assert!(matches!(
            FileKeystore::open(&path, "store-pass"),
            Err(KeystoreError::InvalidPassword)
        ));
    }

    #[test]
    fn test_truncated_file() {
        let dir = TempDir::new().unwrap();
        let (path, _, _) = provisioned(&dir);

        let encrypted = fs::read(&path).unwrap();
        fs::write(&path, &encrypted[0..20]).unwrap();

        match FileKeystore::open(&path, "store-pass") {
            Err(KeystoreError::Decryption(msg)) => assert!(msg.contains("Truncated")),
            other => panic!("Expected Decryption error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_invalid_magic_and_version() {
        let sealed = seal("pw", b"payload").unwrap();

        let mut bad_magic = sealed.clone();
        bad_magic[0] = b'X';
        match open_sealed("pw", &bad_magic) {
            Err(KeystoreError::Decryption(msg)) => assert!(msg.contains("magic")),
            other => panic!("Expected magic error, got {:?}", other),
        }

        let mut bad_version = sealed;
        bad_version[8] = 99;
        match open_sealed("pw", &bad_version) {
            Err(KeystoreError::Decryption(msg)) => assert!(msg.contains("version")),
            other => panic!("Expected version error, got {:?}", other),
        }
    }

    #[test]
    fn test_salt_and_nonce_uniqueness() {
        let a = seal("pw", b"same data").unwrap();
        let b = seal("pw", b"same data").unwrap();
        assert_ne!(&a[9..9 + SALT_LEN], &b[9..9 + SALT_LEN]);
        assert_ne!(&a[9 + SALT_LEN..HEADER_SIZE], &b[9 + SALT_LEN..HEADER_SIZE]);
        assert_eq!(open_sealed("pw", &a).unwrap(), b"same data");
    }

    #[test]
    fn test_replacing_alias() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ks");
        let mut keystore = FileKeystore::create(&path);
        let first = Keypair::generate();
        let second = Keypair::generate();
        let ttl = Duration::from_secs(3600);
        keystore
            .add_key_entry("k", &first, Certificate::self_signed("CN=k", 1, &first, ttl).unwrap(), "pw")
            .unwrap();
        keystore
            .add_key_entry("k", &second, Certificate::self_signed("CN=k", 2, &second, ttl).unwrap(), "pw")
            .unwrap();

        assert_eq!(keystore.aliases().unwrap().len(), 1);
        let entry = keystore.load_key_entry("k", "pw").unwrap();
        assert_eq!(entry.keypair.public_key(), second.public_key());
    }
}
