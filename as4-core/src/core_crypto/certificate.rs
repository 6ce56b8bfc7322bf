//! Compact certificates binding a distinguished name to an Ed25519 key
//!
//! A certificate is signed by its issuer over the bincode encoding of its
//! to-be-signed fields. Self-signed certificates carry `issuer == subject`.

use super::errors::CertificateError;
use super::keypair::{Keypair, KEY_LEN};
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::time::Duration;

/// Current certificate format version
pub const CERTIFICATE_VERSION: u8 = 1;

/// Length of the subject key identifier
pub const SKI_LEN: usize = 20;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Certificate {
    pub version: u8,
    pub serial_number: u64,
    pub subject: String,
    pub issuer: String,
    /// Unix seconds
    pub not_before: i64,
    /// Unix seconds
    pub not_after: i64,
    pub public_key: Vec<u8>,
    pub signature: Vec<u8>,
}

#[derive(Serialize)]
struct TbsCertificate<'a> {
    version: u8,
    serial_number: u64,
    subject: &'a str,
    issuer: &'a str,
    not_before: i64,
    not_after: i64,
    public_key: &'a [u8],
}

impl Certificate {
    /// Create a certificate signed by its own key
    pub fn self_signed(
        subject: &str,
        serial_number: u64,
        keypair: &Keypair,
        validity: Duration,
    ) -> Result<Self, CertificateError> {
        let (not_before, not_after) = validity_window(validity);
        let mut cert = Self {
            version: CERTIFICATE_VERSION,
            serial_number,
            subject: subject.to_string(),
            issuer: subject.to_string(),
            not_before,
            not_after,
            public_key: keypair.public_key().to_vec(),
            signature: Vec::new(),
        };
        cert.signature = keypair.sign(&cert.tbs_bytes()?);
        Ok(cert)
    }

    /// Issue a certificate for `public_key`, signed by `issuer_keypair`
    pub fn issue(
        subject: &str,
        serial_number: u64,
        public_key: &[u8],
        issuer: &Certificate,
        issuer_keypair: &Keypair,
        validity: Duration,
    ) -> Result<Self, CertificateError> {
        if public_key.len() != KEY_LEN {
            return Err(CertificateError::InvalidKey(format!(
                "expected {} byte key, got {}",
                KEY_LEN,
                public_key.len()
            )));
        }
        if issuer.public_key != issuer_keypair.public_key() {
            return Err(CertificateError::InvalidKey(
                "issuer keypair does not match issuer certificate".to_string(),
            ));
        }

        let (not_before, not_after) = validity_window(validity);
        let mut cert = Self {
            version: CERTIFICATE_VERSION,
            serial_number,
            subject: subject.to_string(),
            issuer: issuer.subject.clone(),
            not_before,
            not_after,
            public_key: public_key.to_vec(),
            signature: Vec::new(),
        };
        cert.signature = issuer_keypair.sign(&cert.tbs_bytes()?);
        Ok(cert)
    }

    fn tbs_bytes(&self) -> Result<Vec<u8>, CertificateError> {
        let tbs = TbsCertificate {
            version: self.version,
            serial_number: self.serial_number,
            subject: &self.subject,
            issuer: &self.issuer,
            not_before: self.not_before,
            not_after: self.not_after,
            public_key: &self.public_key,
        };
        bincode::serialize(&tbs).map_err(|e| CertificateError::Encoding(e.to_string()))
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, CertificateError> {
        bincode::serialize(self).map_err(|e| CertificateError::Encoding(e.to_string()))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CertificateError> {
        let cert: Self =
            bincode::deserialize(bytes).map_err(|e| CertificateError::Encoding(e.to_string()))?;
        if cert.version != CERTIFICATE_VERSION {
            return Err(CertificateError::Encoding(format!(
                "unsupported certificate version {}",
                cert.version
            )));
        }
        if cert.public_key.len() != KEY_LEN {
            return Err(CertificateError::InvalidKey(format!(
                "expected {} byte key, got {}",
                KEY_LEN,
                cert.public_key.len()
            )));
        }
        Ok(cert)
    }

    /// First 20 bytes of the SHA-256 hash of the public key
    pub fn subject_key_identifier(&self) -> Vec<u8> {
        Sha256::digest(&self.public_key)[..SKI_LEN].to_vec()
    }

    pub fn is_self_signed(&self) -> bool {
        self.subject == self.issuer
    }

    pub fn matches_issuer_serial(&self, issuer: &str, serial_number: u64) -> bool {
        self.issuer == issuer && self.serial_number == serial_number
    }

    /// Same subject, issuer, serial and key
    pub fn same_identity(&self, other: &Certificate) -> bool {
        self.matches_issuer_serial(&other.issuer, other.serial_number)
            && self.subject == other.subject
            && self.public_key == other.public_key
    }

    /// Check that `issuer` signed this certificate
    pub fn verify_issued_by(&self, issuer: &Certificate) -> Result<(), CertificateError> {
        if self.issuer != issuer.subject {
            return Err(CertificateError::IssuerMismatch {
                expected: issuer.subject.clone(),
                actual: self.issuer.clone(),
            });
        }
        if !Keypair::verify(&issuer.public_key, &self.tbs_bytes()?, &self.signature) {
            return Err(CertificateError::InvalidSignature(self.subject.clone()));
        }
        Ok(())
    }

    pub fn check_validity(&self, at: DateTime<Utc>) -> Result<(), CertificateError> {
        let now = at.timestamp();
        if now < self.not_before {
            return Err(CertificateError::NotYetValid {
                subject: self.subject.clone(),
                not_before: self.not_before,
            });
        }
        if now > self.not_after {
            return Err(CertificateError::Expired {
                subject: self.subject.clone(),
                not_after: self.not_after,
            });
        }
        Ok(())
    }

    pub fn not_after_utc(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_opt(self.not_after, 0).single()
    }
}

impl fmt::Display for Certificate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (issuer={}, serial={}, ski={})",
            self.subject,
            self.issuer,
            self.serial_number,
            hex::encode(self.subject_key_identifier())
        )
    }
}

fn validity_window(validity: Duration) -> (i64, i64) {
    let now = Utc::now().timestamp();
    let secs = i64::try_from(validity.as_secs()).unwrap_or(i64::MAX);
    (now, now.saturating_add(secs))
}
