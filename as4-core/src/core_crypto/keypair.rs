//! Ed25519 signing keys
//!
//! The secret half lives inside `ed25519_dalek::SigningKey`, which zeroizes
//! itself on drop. Exported seeds are wrapped in `Zeroizing`.

use super::keystore::KeystoreError;
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::RngCore;
use std::fmt;
use zeroize::{Zeroize, Zeroizing};

/// Length of an Ed25519 seed and public key
pub const KEY_LEN: usize = 32;

/// Length of an Ed25519 signature
pub const SIGNATURE_LEN: usize = 64;

#[derive(Clone)]
pub struct Keypair {
    signing_key: SigningKey,
}

impl Keypair {
    /// Generate a fresh keypair from the thread-local CSPRNG
    pub fn generate() -> Self {
        let mut seed = [0u8; KEY_LEN];
        rand::rng().fill_bytes(&mut seed);
        let signing_key = SigningKey::from_bytes(&seed);
        seed.zeroize();
        Self { signing_key }
    }

    /// Rebuild a keypair from its 32-byte seed
    pub fn from_seed(seed: &[u8]) -> Result<Self, KeystoreError> {
        let seed: [u8; KEY_LEN] = seed.try_into().map_err(|_| {
            KeystoreError::InvalidKey(format!("expected {} byte seed, got {}", KEY_LEN, seed.len()))
        })?;
        Ok(Self {
            signing_key: SigningKey::from_bytes(&seed),
        })
    }

    pub fn seed(&self) -> Zeroizing<[u8; KEY_LEN]> {
        Zeroizing::new(self.signing_key.to_bytes())
    }

    pub fn public_key(&self) -> [u8; KEY_LEN] {
        self.signing_key.verifying_key().to_bytes()
    }

    /// Sign a message, returning the 64-byte signature
    pub fn sign(&self, msg: &[u8]) -> Vec<u8> {
        self.signing_key.sign(msg).to_bytes().to_vec()
    }

    /// Verify a signature against a raw public key
    pub fn verify(public_key: &[u8], msg: &[u8], sig: &[u8]) -> bool {
        let Ok(public_key) = <[u8; KEY_LEN]>::try_from(public_key) else {
            return false;
        };
        let Ok(verifying_key) = VerifyingKey::from_bytes(&public_key) else {
            return false;
        };
        let Ok(signature) = Signature::from_slice(sig) else {
            return false;
        };
        verifying_key.verify(msg, &signature).is_ok()
    }
}

impl fmt::Debug for Keypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Keypair")
            .field("public_key", &hex::encode(self.public_key()))
            .finish_non_exhaustive()
    }
}
