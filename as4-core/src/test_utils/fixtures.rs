//! Fixtures for exchange tests
//!
//! Two parties, "sender" and "partner", each with an Ed25519 key and a
//! self-signed certificate, trusting each other's certificate. Responses
//! from the partner can be produced signed or unsigned.

use crate::core_crypto::algorithms::KeyReferenceType;
use crate::core_crypto::certificate::Certificate;
use crate::core_crypto::config::CryptoConfig;
use crate::core_crypto::keypair::Keypair;
use crate::core_crypto::keystore::MemoryKeystore;
use crate::core_crypto::signature::SignatureEngine;
use crate::core_exchange::transport::IncomingResponse;
use crate::core_message::codec;
use crate::core_message::envelope::{
    Attachment, CollaborationInfo, EbmsError, Envelope, ErrorSignal, MessageInfo, MessageUnit,
    PartInfo, Party, PartyInfo, Property, Receipt, Severity, SoapVersion, UserMessage,
    EMPTY_MPC_ERROR_CODE,
};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;

pub const PARTNER_ENDPOINT: &str = "https://partner.example/as4";
pub const TEST_MPC: &str = "urn:mpc:default";
pub const SENDER_ALIAS: &str = "sender";
pub const PARTNER_ALIAS: &str = "partner";
pub const KEY_PASSWORD: &str = "key-password";

const CERT_VALIDITY: Duration = Duration::from_secs(365 * 24 * 3600);

/// Crypto configurations of two parties that trust each other
#[derive(Debug, Clone)]
pub struct TestParties {
    pub sender: Arc<CryptoConfig>,
    pub partner: Arc<CryptoConfig>,
    pub sender_certificate: Certificate,
    pub partner_certificate: Certificate,
}

impl TestParties {
    pub fn new(reference_type: KeyReferenceType) -> Self {
        let (sender_store, sender_certificate) = party_store(SENDER_ALIAS, 1);
        let (partner_store, partner_certificate) = party_store(PARTNER_ALIAS, 2);

        sender_store
            .add_trusted_certificate(partner_certificate.clone())
            .expect("trust partner certificate");
        partner_store
            .add_trusted_certificate(sender_certificate.clone())
            .expect("trust sender certificate");

        Self {
            sender: Arc::new(
                CryptoConfig::new(Arc::new(sender_store), SENDER_ALIAS, KEY_PASSWORD)
                    .with_key_reference_type(reference_type),
            ),
            partner: Arc::new(
                CryptoConfig::new(Arc::new(partner_store), PARTNER_ALIAS, KEY_PASSWORD)
                    .with_key_reference_type(reference_type),
            ),
            sender_certificate,
            partner_certificate,
        }
    }
}

impl Default for TestParties {
    fn default() -> Self {
        Self::new(KeyReferenceType::default())
    }
}

fn party_store(alias: &str, serial: u64) -> (MemoryKeystore, Certificate) {
    let keypair = Keypair::generate();
    let certificate = Certificate::self_signed(&format!("CN={}", alias), serial, &keypair, CERT_VALIDITY)
        .expect("self-signed certificate");
    let store = MemoryKeystore::new();
    store
        .add_key_entry(alias, keypair, certificate.clone(), KEY_PASSWORD)
        .expect("store key entry");
    (store, certificate)
}

/// A User Message on `mpc` carrying one XML payload
pub fn pulled_user_message(message_id: &str, mpc: &str) -> Envelope {
    let payload = Attachment::new(
        format!("payload-{}", message_id),
        "application/xml",
        format!("<Invoice id=\"{}\"/>", message_id).into_bytes(),
    );

    let message = UserMessage {
        message_info: MessageInfo::new(message_id, Utc::now()),
        mpc: Some(mpc.to_string()),
        party_info: PartyInfo {
            from: Party::new("partner-gw", "http://example.org/roles/sender"),
            to: Party::new("sender-gw", "http://example.org/roles/receiver"),
        },
        collaboration_info: CollaborationInfo {
            agreement_ref: None,
            service: "urn:services:invoicing".to_string(),
            service_type: None,
            action: "Deliver".to_string(),
            conversation_id: "conv-1".to_string(),
        },
        message_properties: vec![Property::new("originalSender", "urn:party:partner")],
        payload_info: vec![PartInfo {
            href: payload.href(),
            properties: vec![Property::new("MimeType", "application/xml")],
        }],
    };

    Envelope::new(SoapVersion::Soap12, MessageUnit::User(message)).with_attachments(vec![payload])
}

pub fn receipt_for(ref_to_message_id: &str) -> Envelope {
    let mut info = MessageInfo::new(format!("receipt-{}", ref_to_message_id), Utc::now());
    info.ref_to_message_id = Some(ref_to_message_id.to_string());
    Envelope::new(SoapVersion::Soap12, MessageUnit::Receipt(Receipt { message_info: info }))
}

pub fn error_signal(code: &str, severity: Severity, ref_to_message_id: Option<&str>) -> Envelope {
    let mut info = MessageInfo::new("error-signal@partner", Utc::now());
    info.ref_to_message_id = ref_to_message_id.map(str::to_string);
    Envelope::new(
        SoapVersion::Soap12,
        MessageUnit::Error(ErrorSignal {
            message_info: info,
            errors: vec![EbmsError {
                error_code: code.to_string(),
                severity,
                category: None,
                ref_to_message_in_error: ref_to_message_id.map(str::to_string),
                short_description: None,
                description: Some(format!("{} raised by partner", code)),
            }],
        }),
    )
}

/// The partner's answer to a pull on an empty partition
pub fn empty_partition_signal() -> Envelope {
    error_signal(EMPTY_MPC_ERROR_CODE, Severity::Warning, None)
}

/// Encode `envelope` as an HTTP response with `status`
pub fn response_with_status(status: u16, envelope: &Envelope) -> IncomingResponse {
    let wire = codec::encode(envelope);
    IncomingResponse::new(status, Some(&wire.content_type), wire.body)
}

pub fn unsigned_response(envelope: &Envelope) -> IncomingResponse {
    response_with_status(200, envelope)
}

/// Sign `envelope` with `crypto` and encode it as an HTTP 200
pub fn signed_response(envelope: Envelope, crypto: &CryptoConfig) -> IncomingResponse {
    let signed = SignatureEngine::default()
        .sign(envelope, crypto)
        .expect("sign fixture response");
    unsigned_response(&signed)
}
