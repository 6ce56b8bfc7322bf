//! WS-Security header model

use crate::core_crypto::algorithms::{DigestAlgorithm, KeyReferenceType, SignatureAlgorithm};
use chrono::{DateTime, Utc};

pub const BASE64_ENCODING_TYPE: &str =
    "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-soap-message-security-1.0#Base64Binary";
pub const X509V3_VALUE_TYPE: &str =
    "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-x509-token-profile-1.0#X509v3";
pub const SKI_VALUE_TYPE: &str =
    "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-x509-token-profile-1.0#X509SubjectKeyIdentifier";

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SecurityHeader {
    pub timestamp: Option<SecurityTimestamp>,
    pub binary_security_token: Option<BinarySecurityToken>,
    pub signature: Option<XmlSignature>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecurityTimestamp {
    pub id: String,
    pub created: DateTime<Utc>,
    pub expires: Option<DateTime<Utc>>,
}

/// Encoded signer certificate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinarySecurityToken {
    pub id: String,
    pub value: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlSignature {
    pub id: String,
    pub signed_info: SignedInfo,
    pub signature_value: Vec<u8>,
    pub key_info: KeyInfo,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedInfo {
    pub signature_method: SignatureAlgorithm,
    pub references: Vec<SignatureReference>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureReference {
    pub uri: String,
    pub digest_method: DigestAlgorithm,
    pub digest_value: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyInfo {
    DirectReference { uri: String },
    IssuerSerial { issuer: String, serial_number: u64 },
    KeyIdentifier { value: Vec<u8> },
}

impl KeyInfo {
    pub fn reference_type(&self) -> KeyReferenceType {
        match self {
            KeyInfo::DirectReference { .. } => KeyReferenceType::DirectReference,
            KeyInfo::IssuerSerial { .. } => KeyReferenceType::IssuerSerial,
            KeyInfo::KeyIdentifier { .. } => KeyReferenceType::KeyIdentifier,
        }
    }
}
