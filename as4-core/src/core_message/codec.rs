//! Envelope codec
//!
//! Serializes the typed envelope to a SOAP document (single part, or
//! `multipart/related` when attachments are present) and parses responses
//! back. The writer is deterministic: the `*_bytes` functions return the exact
//! fragments that signature references digest.

use super::envelope::{
    CollaborationInfo, EbmsError, Envelope, ErrorSignal, MessageInfo, MessageUnit, PartInfo,
    Party, PartyInfo, Property, PullRequest, Receipt, Severity, SoapVersion, UserMessage,
    DEFAULT_MPC, DS_NS, EBMS_NS, WSSE_NS, WSU_NS,
};
use super::errors::CodecError;
use super::mime;
use super::security::{
    BinarySecurityToken, KeyInfo, SecurityHeader, SecurityTimestamp, SignatureReference,
    SignedInfo, XmlSignature, BASE64_ENCODING_TYPE, SKI_VALUE_TYPE, X509V3_VALUE_TYPE,
};
use super::xml::{parse_document, Node, XmlWriter};
use crate::core_crypto::algorithms::{DigestAlgorithm, SignatureAlgorithm, EXC_C14N_URI};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use bytes::Bytes;
use chrono::{DateTime, SecondsFormat, Utc};

/// Serialized message ready for transmission
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireMessage {
    pub content_type: String,
    pub body: Bytes,
}

/// Serialize an envelope and its attachments
pub fn encode(envelope: &Envelope) -> WireMessage {
    let soap = envelope_xml(envelope).into_bytes();
    let soap_type = envelope.soap_version.mime_type();

    if envelope.attachments.is_empty() {
        WireMessage {
            content_type: format!("{}; charset=UTF-8", soap_type),
            body: Bytes::from(soap),
        }
    } else {
        let (content_type, body) = mime::write_related(&soap, soap_type, &envelope.attachments);
        WireMessage {
            content_type,
            body: Bytes::from(body),
        }
    }
}

/// Parse a transport body; an empty body yields `None`
pub fn decode(content_type: Option<&str>, body: &[u8]) -> Result<Option<Envelope>, CodecError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }

    match content_type.filter(|ct| mime::is_multipart(ct)) {
        Some(ct) => {
            let parts = mime::parse_related(ct, body)?;
            let mut envelope = parse_envelope(&parts.root)?;
            envelope.attachments = parts.attachments;
            Ok(Some(envelope))
        }
        None => parse_envelope(body).map(Some),
    }
}

/// Canonical `eb:Messaging` header
pub fn messaging_bytes(envelope: &Envelope) -> Vec<u8> {
    let mut w = XmlWriter::new();
    write_messaging(&mut w, envelope);
    w.finish().into_bytes()
}

/// Canonical SOAP Body
pub fn body_bytes(envelope: &Envelope) -> Vec<u8> {
    let mut w = XmlWriter::new();
    write_body(&mut w, envelope);
    w.finish().into_bytes()
}

/// Canonical `wsu:Timestamp`
pub fn timestamp_bytes(timestamp: &SecurityTimestamp) -> Vec<u8> {
    let mut w = XmlWriter::new();
    write_timestamp(&mut w, timestamp);
    w.finish().into_bytes()
}

/// Canonical `ds:SignedInfo`, the input of the signature value
pub fn signed_info_bytes(signed_info: &SignedInfo) -> Vec<u8> {
    let mut w = XmlWriter::new();
    write_signed_info(&mut w, signed_info);
    w.finish().into_bytes()
}

pub(crate) fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_timestamp(text: &str) -> Result<DateTime<Utc>, CodecError> {
    DateTime::parse_from_rfc3339(text.trim())
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| CodecError::Malformed(format!("invalid timestamp {:?}: {}", text, e)))
}

// ----------------------------------------------------------------------------
// Writer
// ----------------------------------------------------------------------------

fn envelope_xml(envelope: &Envelope) -> String {
    let soap = envelope.soap_version;
    let envelope_tag = format!("{}:Envelope", soap.prefix());
    let header_tag = format!("{}:Header", soap.prefix());
    let soap_ns_attr = format!("xmlns:{}", soap.prefix());

    let mut w = XmlWriter::new();
    w.raw("<?xml version=\"1.0\" encoding=\"UTF-8\"?>");
    w.open(
        &envelope_tag,
        &[
            (soap_ns_attr.as_str(), soap.namespace()),
            ("xmlns:eb", EBMS_NS),
            ("xmlns:wsse", WSSE_NS),
            ("xmlns:wsu", WSU_NS),
            ("xmlns:ds", DS_NS),
        ],
    );
    w.open(&header_tag, &[]);
    write_messaging(&mut w, envelope);
    if let Some(security) = &envelope.security {
        write_security(&mut w, soap, security);
    }
    w.close(&header_tag);
    write_body(&mut w, envelope);
    w.close(&envelope_tag);
    w.finish()
}

fn write_body(w: &mut XmlWriter, envelope: &Envelope) {
    let body_tag = format!("{}:Body", envelope.soap_version.prefix());
    w.empty(&body_tag, &[("wsu:Id", envelope.body_id.as_str())]);
}

fn write_messaging(w: &mut XmlWriter, envelope: &Envelope) {
    let must_understand = format!("{}:mustUnderstand", envelope.soap_version.prefix());
    w.open(
        "eb:Messaging",
        &[
            (must_understand.as_str(), envelope.soap_version.must_understand()),
            ("wsu:Id", envelope.messaging_id.as_str()),
        ],
    );
    match &envelope.message {
        MessageUnit::User(message) => write_user_message(w, message),
        MessageUnit::Pull(pull) => {
            w.open("eb:SignalMessage", &[]);
            write_message_info(w, &pull.message_info);
            w.empty("eb:PullRequest", &[("mpc", pull.mpc.as_str())]);
            w.close("eb:SignalMessage");
        }
        MessageUnit::Receipt(receipt) => {
            w.open("eb:SignalMessage", &[]);
            write_message_info(w, &receipt.message_info);
            w.empty("eb:Receipt", &[]);
            w.close("eb:SignalMessage");
        }
        MessageUnit::Error(signal) => {
            w.open("eb:SignalMessage", &[]);
            write_message_info(w, &signal.message_info);
            for error in &signal.errors {
                write_error(w, error);
            }
            w.close("eb:SignalMessage");
        }
    }
    w.close("eb:Messaging");
}

fn write_message_info(w: &mut XmlWriter, info: &MessageInfo) {
    w.open("eb:MessageInfo", &[]);
    w.leaf("eb:Timestamp", &[], &format_timestamp(&info.timestamp));
    w.leaf("eb:MessageId", &[], &info.message_id);
    if let Some(ref_to) = &info.ref_to_message_id {
        w.leaf("eb:RefToMessageId", &[], ref_to);
    }
    w.close("eb:MessageInfo");
}

fn write_user_message(w: &mut XmlWriter, message: &UserMessage) {
    match &message.mpc {
        Some(mpc) => w.open("eb:UserMessage", &[("mpc", mpc.as_str())]),
        None => w.open("eb:UserMessage", &[]),
    }
    write_message_info(w, &message.message_info);

    w.open("eb:PartyInfo", &[]);
    write_party(w, "eb:From", &message.party_info.from);
    write_party(w, "eb:To", &message.party_info.to);
    w.close("eb:PartyInfo");

    let collab = &message.collaboration_info;
    w.open("eb:CollaborationInfo", &[]);
    if let Some(agreement) = &collab.agreement_ref {
        w.leaf("eb:AgreementRef", &[], agreement);
    }
    match &collab.service_type {
        Some(service_type) => w.leaf("eb:Service", &[("type", service_type.as_str())], &collab.service),
        None => w.leaf("eb:Service", &[], &collab.service),
    }
    w.leaf("eb:Action", &[], &collab.action);
    w.leaf("eb:ConversationId", &[], &collab.conversation_id);
    w.close("eb:CollaborationInfo");

    if !message.message_properties.is_empty() {
        w.open("eb:MessageProperties", &[]);
        write_properties(w, &message.message_properties);
        w.close("eb:MessageProperties");
    }

    if !message.payload_info.is_empty() {
        w.open("eb:PayloadInfo", &[]);
        for part in &message.payload_info {
            w.open("eb:PartInfo", &[("href", part.href.as_str())]);
            if !part.properties.is_empty() {
                w.open("eb:PartProperties", &[]);
                write_properties(w, &part.properties);
                w.close("eb:PartProperties");
            }
            w.close("eb:PartInfo");
        }
        w.close("eb:PayloadInfo");
    }
    w.close("eb:UserMessage");
}

fn write_party(w: &mut XmlWriter, tag: &str, party: &Party) {
    w.open(tag, &[]);
    match &party.id_type {
        Some(id_type) => w.leaf("eb:PartyId", &[("type", id_type.as_str())], &party.id),
        None => w.leaf("eb:PartyId", &[], &party.id),
    }
    w.leaf("eb:Role", &[], &party.role);
    w.close(tag);
}

fn write_properties(w: &mut XmlWriter, properties: &[Property]) {
    for property in properties {
        w.leaf("eb:Property", &[("name", property.name.as_str())], &property.value);
    }
}

fn write_error(w: &mut XmlWriter, error: &EbmsError) {
    let mut attrs = vec![
        ("errorCode", error.error_code.as_str()),
        ("severity", error.severity.as_str()),
    ];
    if let Some(category) = &error.category {
        attrs.push(("category", category.as_str()));
    }
    if let Some(ref_to) = &error.ref_to_message_in_error {
        attrs.push(("refToMessageInError", ref_to.as_str()));
    }
    if let Some(short) = &error.short_description {
        attrs.push(("shortDescription", short.as_str()));
    }
    w.open("eb:Error", &attrs);
    if let Some(description) = &error.description {
        w.leaf("eb:Description", &[("xml:lang", "en")], description);
    }
    w.close("eb:Error");
}

fn write_security(w: &mut XmlWriter, soap: SoapVersion, security: &SecurityHeader) {
    let must_understand = format!("{}:mustUnderstand", soap.prefix());
    w.open("wsse:Security", &[(must_understand.as_str(), soap.must_understand())]);
    if let Some(timestamp) = &security.timestamp {
        write_timestamp(w, timestamp);
    }
    if let Some(token) = &security.binary_security_token {
        w.leaf(
            "wsse:BinarySecurityToken",
            &[
                ("EncodingType", BASE64_ENCODING_TYPE),
                ("ValueType", X509V3_VALUE_TYPE),
                ("wsu:Id", token.id.as_str()),
            ],
            &BASE64.encode(&token.value),
        );
    }
    if let Some(signature) = &security.signature {
        write_signature(w, signature);
    }
    w.close("wsse:Security");
}

fn write_timestamp(w: &mut XmlWriter, timestamp: &SecurityTimestamp) {
    w.open("wsu:Timestamp", &[("wsu:Id", timestamp.id.as_str())]);
    w.leaf("wsu:Created", &[], &format_timestamp(&timestamp.created));
    if let Some(expires) = &timestamp.expires {
        w.leaf("wsu:Expires", &[], &format_timestamp(expires));
    }
    w.close("wsu:Timestamp");
}

fn write_signed_info(w: &mut XmlWriter, signed_info: &SignedInfo) {
    w.open("ds:SignedInfo", &[]);
    w.empty("ds:CanonicalizationMethod", &[("Algorithm", EXC_C14N_URI)]);
    w.empty("ds:SignatureMethod", &[("Algorithm", signed_info.signature_method.uri())]);
    for reference in &signed_info.references {
        w.open("ds:Reference", &[("URI", reference.uri.as_str())]);
        w.empty("ds:DigestMethod", &[("Algorithm", reference.digest_method.uri())]);
        w.leaf("ds:DigestValue", &[], &BASE64.encode(&reference.digest_value));
        w.close("ds:Reference");
    }
    w.close("ds:SignedInfo");
}

fn write_signature(w: &mut XmlWriter, signature: &XmlSignature) {
    w.open("ds:Signature", &[("Id", signature.id.as_str())]);
    write_signed_info(w, &signature.signed_info);
    w.leaf("ds:SignatureValue", &[], &BASE64.encode(&signature.signature_value));
    w.open("ds:KeyInfo", &[]);
    w.open("wsse:SecurityTokenReference", &[]);
    match &signature.key_info {
        KeyInfo::DirectReference { uri } => {
            w.empty(
                "wsse:Reference",
                &[("URI", uri.as_str()), ("ValueType", X509V3_VALUE_TYPE)],
            );
        }
        KeyInfo::IssuerSerial {
            issuer,
            serial_number,
        } => {
            w.open("ds:X509Data", &[]);
            w.open("ds:X509IssuerSerial", &[]);
            w.leaf("ds:X509IssuerName", &[], issuer);
            w.leaf("ds:X509SerialNumber", &[], &serial_number.to_string());
            w.close("ds:X509IssuerSerial");
            w.close("ds:X509Data");
        }
        KeyInfo::KeyIdentifier { value } => {
            w.leaf(
                "wsse:KeyIdentifier",
                &[
                    ("EncodingType", BASE64_ENCODING_TYPE),
                    ("ValueType", SKI_VALUE_TYPE),
                ],
                &BASE64.encode(value),
            );
        }
    }
    w.close("wsse:SecurityTokenReference");
    w.close("ds:KeyInfo");
    w.close("ds:Signature");
}

// ----------------------------------------------------------------------------
// Parser
// ----------------------------------------------------------------------------

fn parse_envelope(bytes: &[u8]) -> Result<Envelope, CodecError> {
    let root = parse_document(bytes)?;
    if root.local_name() != "Envelope" {
        return Err(CodecError::Malformed(format!(
            "root element is {}, expected Envelope",
            root.local_name()
        )));
    }

    let soap_version = root
        .namespace_declaration(root.prefix())
        .and_then(SoapVersion::from_namespace)
        .ok_or_else(|| CodecError::Malformed("unknown SOAP envelope namespace".to_string()))?;

    let body = root.require_child("Body")?;
    if let Some(fault) = body.child("Fault") {
        return Err(CodecError::SoapFault(fault_reason(fault)));
    }
    if !body.children.is_empty() {
        return Err(CodecError::Malformed("SOAP Body must be empty".to_string()));
    }

    let header = root.require_child("Header")?;
    let messaging = header.require_child("Messaging")?;
    let message = parse_message_unit(messaging)?;
    let security = header.child("Security").map(parse_security).transpose()?;

    Ok(Envelope {
        soap_version,
        messaging_id: messaging.require_attr("Id")?.to_string(),
        body_id: body.require_attr("Id")?.to_string(),
        message,
        security,
        attachments: Vec::new(),
    })
}

fn fault_reason(fault: &Node) -> String {
    // SOAP 1.2 nests Reason/Text, SOAP 1.1 uses faultstring
    fault
        .child("Reason")
        .and_then(|reason| reason.child_text("Text"))
        .or_else(|| fault.child_text("faultstring"))
        .unwrap_or("unspecified fault")
        .to_string()
}

fn parse_message_unit(messaging: &Node) -> Result<MessageUnit, CodecError> {
    if let Some(user) = messaging.child("UserMessage") {
        return parse_user_message(user).map(MessageUnit::User);
    }

    let signal = messaging.child("SignalMessage").ok_or_else(|| {
        CodecError::MissingElement("UserMessage or SignalMessage in Messaging".to_string())
    })?;
    let message_info = parse_message_info(signal.require_child("MessageInfo")?)?;

    if let Some(pull) = signal.child("PullRequest") {
        return Ok(MessageUnit::Pull(PullRequest {
            message_info,
            mpc: pull.attr("mpc").unwrap_or(DEFAULT_MPC).to_string(),
        }));
    }
    if signal.child("Receipt").is_some() {
        return Ok(MessageUnit::Receipt(Receipt { message_info }));
    }

    let errors = signal
        .children_named("Error")
        .map(parse_error)
        .collect::<Result<Vec<_>, _>>()?;
    if errors.is_empty() {
        return Err(CodecError::Malformed(
            "SignalMessage carries no PullRequest, Receipt or Error".to_string(),
        ));
    }
    Ok(MessageUnit::Error(ErrorSignal {
        message_info,
        errors,
    }))
}

fn parse_message_info(node: &Node) -> Result<MessageInfo, CodecError> {
    Ok(MessageInfo {
        timestamp: parse_timestamp(node.require_child_text("Timestamp")?)?,
        message_id: node.require_child_text("MessageId")?.to_string(),
        ref_to_message_id: node.child_text("RefToMessageId").map(str::to_string),
    })
}

fn parse_party(node: &Node) -> Result<Party, CodecError> {
    let party_id = node.require_child("PartyId")?;
    Ok(Party {
        id: party_id.text().to_string(),
        id_type: party_id.attr("type").map(str::to_string),
        role: node.require_child_text("Role")?.to_string(),
    })
}

fn parse_properties(node: Option<&Node>) -> Result<Vec<Property>, CodecError> {
    let Some(node) = node else {
        return Ok(Vec::new());
    };
    node.children_named("Property")
        .map(|p| Ok::<_, CodecError>(Property::new(p.require_attr("name")?, p.text())))
        .collect()
}

fn parse_user_message(node: &Node) -> Result<UserMessage, CodecError> {
    let party_info = node.require_child("PartyInfo")?;
    let collab = node.require_child("CollaborationInfo")?;
    let service = collab.require_child("Service")?;

    let payload_info = match node.child("PayloadInfo") {
        Some(payload) => payload
            .children_named("PartInfo")
            .map(|part| {
                Ok::<_, CodecError>(PartInfo {
                    href: part.require_attr("href")?.to_string(),
                    properties: parse_properties(part.child("PartProperties"))?,
                })
            })
            .collect::<Result<Vec<_>, CodecError>>()?,
        None => Vec::new(),
    };

    Ok(UserMessage {
        message_info: parse_message_info(node.require_child("MessageInfo")?)?,
        mpc: node.attr("mpc").map(str::to_string),
        party_info: PartyInfo {
            from: parse_party(party_info.require_child("From")?)?,
            to: parse_party(party_info.require_child("To")?)?,
        },
        collaboration_info: CollaborationInfo {
            agreement_ref: collab.child_text("AgreementRef").map(str::to_string),
            service: service.text().to_string(),
            service_type: service.attr("type").map(str::to_string),
            action: collab.require_child_text("Action")?.to_string(),
            conversation_id: collab.require_child_text("ConversationId")?.to_string(),
        },
        message_properties: parse_properties(node.child("MessageProperties"))?,
        payload_info,
    })
}

fn parse_error(node: &Node) -> Result<EbmsError, CodecError> {
    let severity = match node.require_attr("severity")? {
        s if s.eq_ignore_ascii_case("warning") => Severity::Warning,
        s if s.eq_ignore_ascii_case("failure") => Severity::Failure,
        other => {
            return Err(CodecError::Malformed(format!("unknown error severity {}", other)));
        }
    };
    Ok(EbmsError {
        error_code: node.require_attr("errorCode")?.to_string(),
        severity,
        category: node.attr("category").map(str::to_string),
        ref_to_message_in_error: node.attr("refToMessageInError").map(str::to_string),
        short_description: node.attr("shortDescription").map(str::to_string),
        description: node.child_text("Description").map(str::to_string),
    })
}

fn decode_base64(text: &str, what: &str) -> Result<Vec<u8>, CodecError> {
    BASE64
        .decode(text.trim())
        .map_err(|e| CodecError::Malformed(format!("invalid base64 in {}: {}", what, e)))
}

fn parse_security(node: &Node) -> Result<SecurityHeader, CodecError> {
    let timestamp = node
        .child("Timestamp")
        .map(|ts| {
            Ok::<_, CodecError>(SecurityTimestamp {
                id: ts.require_attr("Id")?.to_string(),
                created: parse_timestamp(ts.require_child_text("Created")?)?,
                expires: ts.child_text("Expires").map(parse_timestamp).transpose()?,
            })
        })
        .transpose()?;

    let binary_security_token = node
        .child("BinarySecurityToken")
        .map(|token| {
            Ok::<_, CodecError>(BinarySecurityToken {
                id: token.require_attr("Id")?.to_string(),
                value: decode_base64(token.text(), "BinarySecurityToken")?,
            })
        })
        .transpose()?;

    let signature = node.child("Signature").map(parse_signature).transpose()?;

    Ok(SecurityHeader {
        timestamp,
        binary_security_token,
        signature,
    })
}

fn parse_signature(node: &Node) -> Result<XmlSignature, CodecError> {
    let signed_info = node.require_child("SignedInfo")?;

    let c14n = signed_info
        .require_child("CanonicalizationMethod")?
        .require_attr("Algorithm")?;
    if c14n != EXC_C14N_URI {
        return Err(CodecError::UnsupportedAlgorithm(c14n.to_string()));
    }

    let method_uri = signed_info
        .require_child("SignatureMethod")?
        .require_attr("Algorithm")?;
    let signature_method = SignatureAlgorithm::from_uri(method_uri)
        .ok_or_else(|| CodecError::UnsupportedAlgorithm(method_uri.to_string()))?;

    let references = signed_info
        .children_named("Reference")
        .map(|reference| {
            let digest_uri = reference
                .require_child("DigestMethod")?
                .require_attr("Algorithm")?;
            Ok::<_, CodecError>(SignatureReference {
                uri: reference.require_attr("URI")?.to_string(),
                digest_method: DigestAlgorithm::from_uri(digest_uri)
                    .ok_or_else(|| CodecError::UnsupportedAlgorithm(digest_uri.to_string()))?,
                digest_value: decode_base64(reference.require_child_text("DigestValue")?, "DigestValue")?,
            })
        })
        .collect::<Result<Vec<_>, CodecError>>()?;

    let token_reference = node
        .require_child("KeyInfo")?
        .require_child("SecurityTokenReference")?;
    let key_info = if let Some(reference) = token_reference.child("Reference") {
        KeyInfo::DirectReference {
            uri: reference.require_attr("URI")?.to_string(),
        }
    } else if let Some(x509) = token_reference.child("X509Data") {
        let issuer_serial = x509.require_child("X509IssuerSerial")?;
        let serial_text = issuer_serial.require_child_text("X509SerialNumber")?;
        KeyInfo::IssuerSerial {
            issuer: issuer_serial.require_child_text("X509IssuerName")?.to_string(),
            serial_number: serial_text.trim().parse().map_err(|_| {
                CodecError::Malformed(format!("invalid serial number {:?}", serial_text))
            })?,
        }
    } else if let Some(identifier) = token_reference.child("KeyIdentifier") {
        KeyInfo::KeyIdentifier {
            value: decode_base64(identifier.text(), "KeyIdentifier")?,
        }
    } else {
        return Err(CodecError::MissingElement(
            "key reference in SecurityTokenReference".to_string(),
        ));
    };

    Ok(XmlSignature {
        id: node.attr("Id").unwrap_or_default().to_string(),
        signed_info: SignedInfo {
            signature_method,
            references,
        },
        signature_value: decode_base64(node.require_child_text("SignatureValue")?, "SignatureValue")?,
        key_info,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_message::envelope::{Attachment, EMPTY_MPC_ERROR_CODE};

    fn user_message_envelope() -> Envelope {
        let message = UserMessage {
            message_info: MessageInfo::new("msg-1@test", Utc::now()),
            mpc: Some("urn:mpc:default".to_string()),
            party_info: PartyInfo {
                from: Party {
                    id: "partner".to_string(),
                    id_type: Some("urn:oasis:names:tc:ebcore:partyid-type:unregistered".to_string()),
                    role: "http://docs.oasis-open.org/ebxml-msg/ebms/v3.0/ns/core/200704/initiator".to_string(),
                },
                to: Party::new("sender", "responder"),
            },
            collaboration_info: CollaborationInfo {
                agreement_ref: Some("urn:agreement:1".to_string()),
                service: "urn:service:orders".to_string(),
                service_type: None,
                action: "Deliver & Confirm".to_string(),
                conversation_id: "conv-1".to_string(),
            },
            message_properties: vec![
                Property::new("originalSender", "urn:party:a"),
                Property::new("finalRecipient", "<b>"),
            ],
            payload_info: vec![PartInfo {
                href: "cid:invoice@test".to_string(),
                properties: vec![Property::new("MimeType", "application/xml")],
            }],
        };
        Envelope::new(SoapVersion::Soap12, MessageUnit::User(message)).with_attachments(vec![
            Attachment::new("invoice@test", "application/xml", &b"<Invoice/>"[..]),
        ])
    }

    fn truncate_millis(env: &mut Envelope) {
        let info = match &mut env.message {
            MessageUnit::User(m) => &mut m.message_info,
            MessageUnit::Pull(m) => &mut m.message_info,
            MessageUnit::Receipt(m) => &mut m.message_info,
            MessageUnit::Error(m) => &mut m.message_info,
        };
        info.timestamp = parse_timestamp(&format_timestamp(&info.timestamp)).unwrap();
    }

    #[test]
    fn test_user_message_with_attachment_roundtrip() {
        let mut original = user_message_envelope();
        truncate_millis(&mut original);

        let wire = encode(&original);
        assert!(wire.content_type.starts_with("multipart/related"));

        let decoded = decode(Some(&wire.content_type), &wire.body).unwrap().unwrap();
        assert_eq!(decoded, original);
        assert_eq!(messaging_bytes(&decoded), messaging_bytes(&original));
    }

    #[test]
    fn test_pull_request_single_part() {
        let mut original = Envelope::new(
            SoapVersion::Soap11,
            MessageUnit::Pull(PullRequest {
                message_info: MessageInfo::new("pull-1@test", Utc::now()),
                mpc: "urn:mpc:default".to_string(),
            }),
        );
        truncate_millis(&mut original);

        let wire = encode(&original);
        assert_eq!(wire.content_type, "text/xml; charset=UTF-8");
        let text = std::str::from_utf8(&wire.body).unwrap();
        assert!(text.contains("<eb:PullRequest mpc=\"urn:mpc:default\"/>"));
        assert!(text.contains("S11:mustUnderstand=\"1\""));

        let decoded = decode(Some(&wire.content_type), &wire.body).unwrap().unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn test_empty_body_decodes_to_none() {
        assert_eq!(decode(Some("application/soap+xml"), b"").unwrap(), None);
        assert_eq!(decode(None, b"  \r\n").unwrap(), None);
    }

    #[test]
    fn test_error_signal_parsing() {
        let mut info = MessageInfo::new("err-1@test", Utc::now());
        info.ref_to_message_id = Some("pull-1@test".to_string());
        let env = Envelope::new(
            SoapVersion::Soap12,
            MessageUnit::Error(ErrorSignal {
                message_info: info,
                errors: vec![EbmsError {
                    error_code: EMPTY_MPC_ERROR_CODE.to_string(),
                    severity: Severity::Warning,
                    category: Some("Communication".to_string()),
                    ref_to_message_in_error: Some("pull-1@test".to_string()),
                    short_description: Some("EmptyMessagePartitionChannel".to_string()),
                    description: Some("No message available".to_string()),
                }],
            }),
        );
        let wire = encode(&env);
        let decoded = decode(Some(&wire.content_type), &wire.body).unwrap().unwrap();
        match decoded.message {
            MessageUnit::Error(signal) => {
                assert!(signal.is_empty_partition());
                assert_eq!(signal.errors[0].description.as_deref(), Some("No message available"));
            }
            other => panic!("Expected error signal, got {}", other.kind()),
        }
    }

    #[test]
    fn test_soap_fault_is_reported() {
        let fault = format!(
            "<S12:Envelope xmlns:S12=\"{}\"><S12:Body><S12:Fault><S12:Reason><S12:Text>Server busy</S12:Text></S12:Reason></S12:Fault></S12:Body></S12:Envelope>",
            crate::core_message::envelope::SOAP12_NS
        );
        match decode(Some("application/soap+xml"), fault.as_bytes()) {
            Err(CodecError::SoapFault(reason)) => assert_eq!(reason, "Server busy"),
            other => panic!("Expected SOAP fault, got {:?}", other),
        }
    }

    #[test]
    fn test_rejects_foreign_documents() {
        assert!(matches!(
            decode(Some("text/xml"), b"<html><body/></html>"),
            Err(CodecError::Malformed(_))
        ));
        assert!(matches!(
            decode(Some("text/xml"), b"not xml at all <"),
            Err(_)
        ));
    }

    #[test]
    fn test_signed_info_bytes_are_stable() {
        let signed_info = SignedInfo {
            signature_method: SignatureAlgorithm::Ed25519,
            references: vec![SignatureReference {
                uri: "#_body-1".to_string(),
                digest_method: DigestAlgorithm::Sha256,
                digest_value: vec![1, 2, 3],
            }],
        };
        let bytes = signed_info_bytes(&signed_info);
        assert_eq!(bytes, signed_info_bytes(&signed_info.clone()));
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.starts_with("<ds:SignedInfo><ds:CanonicalizationMethod"));
        assert!(text.contains("<ds:DigestValue>AQID</ds:DigestValue>"));
    }
}
