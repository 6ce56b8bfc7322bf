//! Algorithm identifiers used in WS-Security signatures
//!
//! Each algorithm is identified on the wire by its XML-DSig URI.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256, Sha512};
use std::fmt;

/// Exclusive XML canonicalization, the only canonicalization method emitted
pub const EXC_C14N_URI: &str = "http://www.w3.org/2001/10/xml-exc-c14n#";

/// Signature algorithm applied to the canonical `SignedInfo`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SignatureAlgorithm {
    #[default]
    Ed25519,
}

impl SignatureAlgorithm {
    pub const ED25519_URI: &'static str = "http://www.w3.org/2021/04/xmldsig-more#eddsa-ed25519";

    pub fn uri(&self) -> &'static str {
        match self {
            SignatureAlgorithm::Ed25519 => Self::ED25519_URI,
        }
    }

    pub fn from_uri(uri: &str) -> Option<Self> {
        match uri {
            Self::ED25519_URI => Some(SignatureAlgorithm::Ed25519),
            _ => None,
        }
    }
}

impl fmt::Display for SignatureAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.uri())
    }
}

/// Digest algorithm used for signature references
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DigestAlgorithm {
    #[default]
    Sha256,
    Sha512,
}

impl DigestAlgorithm {
    pub const SHA256_URI: &'static str = "http://www.w3.org/2001/04/xmlenc#sha256";
    pub const SHA512_URI: &'static str = "http://www.w3.org/2001/04/xmlenc#sha512";

    pub fn uri(&self) -> &'static str {
        match self {
            DigestAlgorithm::Sha256 => Self::SHA256_URI,
            DigestAlgorithm::Sha512 => Self::SHA512_URI,
        }
    }

    pub fn from_uri(uri: &str) -> Option<Self> {
        match uri {
            Self::SHA256_URI => Some(DigestAlgorithm::Sha256),
            Self::SHA512_URI => Some(DigestAlgorithm::Sha512),
            _ => None,
        }
    }

    /// Hash `data` with this algorithm
    pub fn digest(&self, data: &[u8]) -> Vec<u8> {
        match self {
            DigestAlgorithm::Sha256 => Sha256::digest(data).to_vec(),
            DigestAlgorithm::Sha512 => Sha512::digest(data).to_vec(),
        }
    }
}

impl fmt::Display for DigestAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.uri())
    }
}

/// How the signer's certificate is referenced from `ds:KeyInfo`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum KeyReferenceType {
    /// Certificate embedded as a `wsse:BinarySecurityToken` and referenced by id
    #[default]
    DirectReference,
    /// Issuer distinguished name plus serial number
    IssuerSerial,
    /// Subject key identifier of the certificate
    KeyIdentifier,
}

impl KeyReferenceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyReferenceType::DirectReference => "direct-reference",
            KeyReferenceType::IssuerSerial => "issuer-serial",
            KeyReferenceType::KeyIdentifier => "key-identifier",
        }
    }
}

impl fmt::Display for KeyReferenceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uri_lookup() {
        assert_eq!(
            SignatureAlgorithm::from_uri(SignatureAlgorithm::Ed25519.uri()),
            Some(SignatureAlgorithm::Ed25519)
        );
        assert_eq!(
            DigestAlgorithm::from_uri("http://www.w3.org/2001/04/xmlenc#sha512"),
            Some(DigestAlgorithm::Sha512)
        );
        assert_eq!(
            SignatureAlgorithm::from_uri("http://www.w3.org/2001/04/xmldsig-more#rsa-sha256"),
            None
        );
    }

    #[test]
    fn test_digest_lengths() {
        assert_eq!(DigestAlgorithm::Sha256.digest(b"as4").len(), 32);
        assert_eq!(DigestAlgorithm::Sha512.digest(b"as4").len(), 64);
    }

    #[test]
    fn test_reference_type_serde_names() {
        let parsed: KeyReferenceType = serde_json::from_str("\"issuer-serial\"").unwrap();
        assert_eq!(parsed, KeyReferenceType::IssuerSerial);
        assert_eq!(KeyReferenceType::KeyIdentifier.to_string(), "key-identifier");
    }
}
