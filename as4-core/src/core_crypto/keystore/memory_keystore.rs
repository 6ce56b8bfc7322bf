//! In-memory keystore for tests and in-process provisioning

use super::{KeyEntry, Keystore, KeystoreError};
use crate::core_crypto::certificate::Certificate;
use crate::core_crypto::keypair::Keypair;
use secrecy::{ExposeSecret, SecretString};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

/// Helper to convert poison errors into KeystoreError
fn handle_poison<T>(_err: PoisonError<T>) -> KeystoreError {
    KeystoreError::Other("Lock poisoned: a thread panicked while holding the lock".to_string())
}

struct StoredKey {
    keypair: Keypair,
    certificate: Certificate,
    password: SecretString,
}

/// In-memory keystore (non-persistent)
#[derive(Clone, Default)]
pub struct MemoryKeystore {
    keys: Arc<RwLock<HashMap<String, StoredKey>>>,
    trusted: Arc<RwLock<Vec<Certificate>>>,
}

impl MemoryKeystore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a key entry protected by `key_password`, replacing any entry with the same alias
    pub fn add_key_entry(
        &self,
        alias: &str,
        keypair: Keypair,
        certificate: Certificate,
        key_password: &str,
    ) -> Result<(), KeystoreError> {
        if certificate.public_key != keypair.public_key() {
            return Err(KeystoreError::InvalidKey(format!(
                "certificate for {} does not match its keypair",
                alias
            )));
        }
        self.keys.write().map_err(handle_poison)?.insert(
            alias.to_string(),
            StoredKey {
                keypair,
                certificate,
                password: SecretString::new(key_password.to_string()),
            },
        );
        Ok(())
    }

    pub fn add_trusted_certificate(&self, certificate: Certificate) -> Result<(), KeystoreError> {
        self.trusted.write().map_err(handle_poison)?.push(certificate);
        Ok(())
    }
}

impl Keystore for MemoryKeystore {
    fn load_key_entry(&self, alias: &str, key_password: &str) -> Result<KeyEntry, KeystoreError> {
        let keys = self.keys.read().map_err(handle_poison)?;
        let stored = keys
            .get(alias)
            .ok_or_else(|| KeystoreError::NotFound(format!("Key entry not found: {}", alias)))?;

        if stored.password.expose_secret() != key_password {
            return Err(KeystoreError::InvalidPassword);
        }

        Ok(KeyEntry {
            alias: alias.to_string(),
            keypair: stored.keypair.clone(),
            certificate: stored.certificate.clone(),
        })
    }

    fn trusted_certificates(&self) -> Result<Vec<Certificate>, KeystoreError> {
        Ok(self.trusted.read().map_err(handle_poison)?.clone())
    }

    fn aliases(&self) -> Result<Vec<String>, KeystoreError> {
        let mut aliases: Vec<String> = self.keys.read().map_err(handle_poison)?.keys().cloned().collect();
        aliases.sort();
        Ok(aliases)
    }
}
