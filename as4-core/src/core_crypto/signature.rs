//! WS-Security signing and verification of ebMS envelopes
//!
//! Signing adds a `wsu:Timestamp` and a `ds:Signature` whose references cover
//! the `eb:Messaging` header, the SOAP Body, the timestamp and every
//! attachment. Verification resolves the signer certificate through the
//! truststore according to the key-info type the sender chose, then checks
//! trust, validity, every digest, part coverage and the signature value.

use super::algorithms::{DigestAlgorithm, KeyReferenceType};
use super::certificate::Certificate;
use super::config::CryptoConfig;
use super::errors::{SecurityError, SecurityResult};
use super::keypair::Keypair;
use crate::core_message::codec::{body_bytes, messaging_bytes, signed_info_bytes, timestamp_bytes};
use crate::core_message::envelope::Envelope;
use crate::core_message::security::{
    BinarySecurityToken, KeyInfo, SecurityHeader, SecurityTimestamp, SignatureReference,
    SignedInfo, XmlSignature,
};
use chrono::{DateTime, Utc};
use crate::metrics::{SIGNATURES_CREATED_TOTAL, SIGNATURE_VERIFICATIONS_TOTAL};
use metrics::counter;
use std::collections::BTreeSet;
use std::time::Duration;
use tracing::{debug, warn};

/// Lifetime of the `wsu:Timestamp` added to signed messages
pub const DEFAULT_TIMESTAMP_TTL: Duration = Duration::from_secs(300);

/// Security processing found on an incoming message
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SecurityAction {
    Signature,
    Timestamp,
}

/// Proof of identity recovered from a verified message
#[derive(Debug, Clone)]
pub struct VerificationResult {
    /// Certificate of the signer, as resolved from the truststore or token
    pub certificate: Certificate,
    /// Key reference type the signer actually used
    pub reference_type: KeyReferenceType,
    pub actions: BTreeSet<SecurityAction>,
}

impl VerificationResult {
    pub fn has_action(&self, action: SecurityAction) -> bool {
        self.actions.contains(&action)
    }
}

#[derive(Debug, Clone)]
pub struct SignatureEngine {
    timestamp_ttl: Duration,
}

impl Default for SignatureEngine {
    fn default() -> Self {
        Self::new(DEFAULT_TIMESTAMP_TTL)
    }
}

impl SignatureEngine {
    pub fn new(timestamp_ttl: Duration) -> Self {
        Self { timestamp_ttl }
    }

    pub fn timestamp_ttl(&self) -> Duration {
        self.timestamp_ttl
    }

    /// Sign `envelope` with the key configured in `crypto`
    pub fn sign(&self, envelope: Envelope, crypto: &CryptoConfig) -> SecurityResult<Envelope> {
        self.sign_at(envelope, crypto, Utc::now())
    }

    /// Sign with an explicit creation time for the security timestamp
    pub fn sign_at(
        &self,
        mut envelope: Envelope,
        crypto: &CryptoConfig,
        now: DateTime<Utc>,
    ) -> SecurityResult<Envelope> {
        if envelope.is_signed() {
            return Err(SecurityError::AlreadySigned);
        }

        let entry = crypto.load_signing_entry()?;
        let suffix = envelope.id_suffix().to_string();
        let digest = crypto.digest_algorithm();

        let timestamp = SecurityTimestamp {
            id: format!("TS-{}", suffix),
            created: now,
            expires: chrono::Duration::from_std(self.timestamp_ttl)
                .ok()
                .and_then(|ttl| now.checked_add_signed(ttl)),
        };

        let mut references = vec![
            reference(format!("#{}", envelope.messaging_id), digest, &messaging_bytes(&envelope)),
            reference(format!("#{}", envelope.body_id), digest, &body_bytes(&envelope)),
            reference(format!("#{}", timestamp.id), digest, &timestamp_bytes(&timestamp)),
        ];
        references.extend(
            envelope
                .attachments
                .iter()
                .map(|attachment| reference(attachment.href(), digest, &attachment.data)),
        );

        let signed_info = SignedInfo {
            signature_method: crypto.signature_algorithm(),
            references,
        };
        let signature_value = entry.keypair.sign(&signed_info_bytes(&signed_info));

        let mut binary_security_token = None;
        let key_info = match crypto.key_reference_type() {
            KeyReferenceType::DirectReference => {
                let token_id = format!("X509-{}", suffix);
                binary_security_token = Some(BinarySecurityToken {
                    id: token_id.clone(),
                    value: entry.certificate.to_bytes()?,
                });
                KeyInfo::DirectReference {
                    uri: format!("#{}", token_id),
                }
            }
            KeyReferenceType::IssuerSerial => KeyInfo::IssuerSerial {
                issuer: entry.certificate.issuer.clone(),
                serial_number: entry.certificate.serial_number,
            },
            KeyReferenceType::KeyIdentifier => KeyInfo::KeyIdentifier {
                value: entry.certificate.subject_key_identifier(),
            },
        };

        debug!(
            message_id = %envelope.message_id(),
            key_alias = %crypto.key_alias(),
            reference_type = %crypto.key_reference_type(),
            references = signed_info.references.len(),
            "Signed outgoing message"
        );

        envelope.security = Some(SecurityHeader {
            timestamp: Some(timestamp),
            binary_security_token,
            signature: Some(XmlSignature {
                id: format!("SIG-{}", suffix),
                signed_info,
                signature_value,
                key_info,
            }),
        });

        counter!(SIGNATURES_CREATED_TOTAL).increment(1);
        Ok(envelope)
    }

    /// Verify the signature of an incoming envelope against the truststore of `crypto`
    pub fn verify(&self, envelope: &Envelope, crypto: &CryptoConfig) -> SecurityResult<VerificationResult> {
        self.verify_at(envelope, crypto, Utc::now())
    }

    pub fn verify_at(
        &self,
        envelope: &Envelope,
        crypto: &CryptoConfig,
        now: DateTime<Utc>,
    ) -> SecurityResult<VerificationResult> {
        let result = verify_envelope(envelope, crypto, now);
        match &result {
            Ok(verified) => {
                counter!(SIGNATURE_VERIFICATIONS_TOTAL, "result" => "valid").increment(1);
                debug!(
                    message_id = %envelope.message_id(),
                    signer = %verified.certificate.subject,
                    reference_type = %verified.reference_type,
                    "Verified incoming message"
                );
            }
            Err(e) => {
                counter!(SIGNATURE_VERIFICATIONS_TOTAL, "result" => "invalid").increment(1);
                warn!(message_id = %envelope.message_id(), error = %e, "Signature verification failed");
            }
        }
        result
    }
}

fn reference(uri: String, digest: DigestAlgorithm, data: &[u8]) -> SignatureReference {
    SignatureReference {
        uri,
        digest_method: digest,
        digest_value: digest.digest(data),
    }
}

fn verify_envelope(
    envelope: &Envelope,
    crypto: &CryptoConfig,
    now: DateTime<Utc>,
) -> SecurityResult<VerificationResult> {
    let security = envelope
        .security
        .as_ref()
        .ok_or(SecurityError::MissingSecurityHeader)?;
    let signature = security
        .signature
        .as_ref()
        .ok_or(SecurityError::MissingSignature)?;

    let method = signature.signed_info.signature_method;
    if method != crypto.signature_algorithm() {
        return Err(SecurityError::AlgorithmMismatch {
            expected: crypto.signature_algorithm().uri().to_string(),
            actual: method.uri().to_string(),
        });
    }

    let trusted = crypto.truststore().trusted_certificates()?;
    let certificate = resolve_certificate(security, &signature.key_info, &trusted)?;
    ensure_trusted(&certificate, &trusted)?;
    certificate.check_validity(now)?;

    check_references(envelope, security, &signature.signed_info, crypto.digest_algorithm())?;

    if !Keypair::verify(
        &certificate.public_key,
        &signed_info_bytes(&signature.signed_info),
        &signature.signature_value,
    ) {
        return Err(SecurityError::InvalidSignature);
    }

    let mut actions = BTreeSet::from([SecurityAction::Signature]);
    if let Some(timestamp) = &security.timestamp {
        if let Some(expires) = timestamp.expires {
            if expires < now {
                return Err(SecurityError::TimestampExpired(expires.to_rfc3339()));
            }
        }
        actions.insert(SecurityAction::Timestamp);
    }

    Ok(VerificationResult {
        certificate,
        reference_type: signature.key_info.reference_type(),
        actions,
    })
}

fn resolve_certificate(
    security: &SecurityHeader,
    key_info: &KeyInfo,
    trusted: &[Certificate],
) -> SecurityResult<Certificate> {
    match key_info {
        KeyInfo::DirectReference { uri } => {
            let id = uri.strip_prefix('#').unwrap_or(uri);
            let token = security
                .binary_security_token
                .as_ref()
                .filter(|token| token.id == id)
                .ok_or_else(|| SecurityError::UnresolvedCertificate(uri.clone()))?;
            Ok(Certificate::from_bytes(&token.value)?)
        }
        KeyInfo::IssuerSerial {
            issuer,
            serial_number,
        } => trusted
            .iter()
            .find(|cert| cert.matches_issuer_serial(issuer, *serial_number))
            .cloned()
            .ok_or_else(|| {
                SecurityError::UnresolvedCertificate(format!(
                    "issuer={}, serial={}",
                    issuer, serial_number
                ))
            }),
        KeyInfo::KeyIdentifier { value } => trusted
            .iter()
            .find(|cert| cert.subject_key_identifier() == *value)
            .cloned()
            .ok_or_else(|| {
                SecurityError::UnresolvedCertificate(format!("ski={}", hex::encode(value)))
            }),
    }
}

/// Pinned in the truststore, or issued by a pinned certificate
fn ensure_trusted(certificate: &Certificate, trusted: &[Certificate]) -> SecurityResult<()> {
    let is_trusted = trusted.iter().any(|anchor| {
        anchor.same_identity(certificate)
            || (anchor.subject == certificate.issuer
                && certificate.verify_issued_by(anchor).is_ok())
    });
    if is_trusted {
        Ok(())
    } else {
        Err(SecurityError::UntrustedCertificate(certificate.to_string()))
    }
}

fn check_references(
    envelope: &Envelope,
    security: &SecurityHeader,
    signed_info: &SignedInfo,
    expected_digest: DigestAlgorithm,
) -> SecurityResult<()> {
    let messaging_uri = format!("#{}", envelope.messaging_id);
    let body_uri = format!("#{}", envelope.body_id);
    let timestamp_uri = security.timestamp.as_ref().map(|ts| format!("#{}", ts.id));

    for reference in &signed_info.references {
        if reference.digest_method != expected_digest {
            return Err(SecurityError::AlgorithmMismatch {
                expected: expected_digest.uri().to_string(),
                actual: reference.digest_method.uri().to_string(),
            });
        }

        let data = if reference.uri == messaging_uri {
            messaging_bytes(envelope)
        } else if reference.uri == body_uri {
            body_bytes(envelope)
        } else if Some(&reference.uri) == timestamp_uri.as_ref() {
            match &security.timestamp {
                Some(timestamp) => timestamp_bytes(timestamp),
                None => return Err(SecurityError::UnknownReference(reference.uri.clone())),
            }
        } else if let Some(attachment) = reference
            .uri
            .strip_prefix("cid:")
            .and_then(|cid| envelope.attachment(cid))
        {
            attachment.data.to_vec()
        } else {
            return Err(SecurityError::UnknownReference(reference.uri.clone()));
        };

        if reference.digest_method.digest(&data) != reference.digest_value {
            return Err(SecurityError::DigestMismatch(reference.uri.clone()));
        }
    }

    let covered: BTreeSet<&str> = signed_info.references.iter().map(|r| r.uri.as_str()).collect();
    let mut required = vec![messaging_uri, body_uri];
    required.extend(timestamp_uri);
    required.extend(envelope.attachments.iter().map(|a| a.href()));

    match required.into_iter().find(|uri| !covered.contains(uri.as_str())) {
        Some(uncovered) => Err(SecurityError::UnsignedPart(uncovered)),
        None => Ok(()),
    }
}
