//! Typed ebMS3 envelope model
//!
//! The SOAP Body is always empty; payloads travel as MIME attachments and are
//! referenced from `eb:PayloadInfo` by `cid:` URIs.

use super::security::SecurityHeader;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const SOAP11_NS: &str = "http://schemas.xmlsoap.org/soap/envelope/";
pub const SOAP12_NS: &str = "http://www.w3.org/2003/05/soap-envelope";
pub const EBMS_NS: &str = "http://docs.oasis-open.org/ebxml-msg/ebms/v3.0/ns/core/200704/";
pub const WSSE_NS: &str =
    "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-secext-1.0.xsd";
pub const WSU_NS: &str =
    "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-utility-1.0.xsd";
pub const DS_NS: &str = "http://www.w3.org/2000/09/xmldsig#";

/// MPC used when a message names none
pub const DEFAULT_MPC: &str =
    "http://docs.oasis-open.org/ebxml-msg/ebms/v3.0/ns/core/200704/defaultMPC";

/// Error code signalling that the pulled partition holds no message
pub const EMPTY_MPC_ERROR_CODE: &str = "EBMS:0006";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SoapVersion {
    #[serde(rename = "1.1")]
    Soap11,
    #[default]
    #[serde(rename = "1.2")]
    Soap12,
}

impl SoapVersion {
    pub fn namespace(&self) -> &'static str {
        match self {
            SoapVersion::Soap11 => SOAP11_NS,
            SoapVersion::Soap12 => SOAP12_NS,
        }
    }

    pub fn prefix(&self) -> &'static str {
        match self {
            SoapVersion::Soap11 => "S11",
            SoapVersion::Soap12 => "S12",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            SoapVersion::Soap11 => "text/xml",
            SoapVersion::Soap12 => "application/soap+xml",
        }
    }

    pub fn must_understand(&self) -> &'static str {
        match self {
            SoapVersion::Soap11 => "1",
            SoapVersion::Soap12 => "true",
        }
    }

    pub fn from_namespace(ns: &str) -> Option<Self> {
        match ns {
            SOAP11_NS => Some(SoapVersion::Soap11),
            SOAP12_NS => Some(SoapVersion::Soap12),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageInfo {
    pub timestamp: DateTime<Utc>,
    pub message_id: String,
    pub ref_to_message_id: Option<String>,
}

impl MessageInfo {
    pub fn new(message_id: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            message_id: message_id.into(),
            ref_to_message_id: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Party {
    pub id: String,
    #[serde(default)]
    pub id_type: Option<String>,
    pub role: String,
}

impl Party {
    pub fn new(id: impl Into<String>, role: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            id_type: None,
            role: role.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartyInfo {
    pub from: Party,
    pub to: Party,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollaborationInfo {
    pub agreement_ref: Option<String>,
    pub service: String,
    pub service_type: Option<String>,
    pub action: String,
    pub conversation_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Property {
    pub name: String,
    pub value: String,
}

impl Property {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartInfo {
    pub href: String,
    pub properties: Vec<Property>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserMessage {
    pub message_info: MessageInfo,
    pub mpc: Option<String>,
    pub party_info: PartyInfo,
    pub collaboration_info: CollaborationInfo,
    pub message_properties: Vec<Property>,
    pub payload_info: Vec<PartInfo>,
}

impl UserMessage {
    pub fn effective_mpc(&self) -> &str {
        self.mpc.as_deref().unwrap_or(DEFAULT_MPC)
    }

    pub fn property(&self, name: &str) -> Option<&str> {
        self.message_properties
            .iter()
            .find(|p| p.name == name)
            .map(|p| p.value.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullRequest {
    pub message_info: MessageInfo,
    pub mpc: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receipt {
    pub message_info: MessageInfo,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Warning,
    Failure,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Warning => "warning",
            Severity::Failure => "failure",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EbmsError {
    pub error_code: String,
    pub severity: Severity,
    pub category: Option<String>,
    pub ref_to_message_in_error: Option<String>,
    pub short_description: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorSignal {
    pub message_info: MessageInfo,
    pub errors: Vec<EbmsError>,
}

impl ErrorSignal {
    /// Only `EBMS:0006` warnings, i.e. the pulled partition was empty
    pub fn is_empty_partition(&self) -> bool {
        !self.errors.is_empty()
            && self
                .errors
                .iter()
                .all(|e| e.error_code == EMPTY_MPC_ERROR_CODE && e.severity == Severity::Warning)
    }
}

/// The single message unit carried by an `eb:Messaging` header
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageUnit {
    User(UserMessage),
    Pull(PullRequest),
    Receipt(Receipt),
    Error(ErrorSignal),
}

impl MessageUnit {
    pub fn message_info(&self) -> &MessageInfo {
        match self {
            MessageUnit::User(m) => &m.message_info,
            MessageUnit::Pull(m) => &m.message_info,
            MessageUnit::Receipt(m) => &m.message_info,
            MessageUnit::Error(m) => &m.message_info,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            MessageUnit::User(_) => "UserMessage",
            MessageUnit::Pull(_) => "PullRequest",
            MessageUnit::Receipt(_) => "Receipt",
            MessageUnit::Error(_) => "Error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub content_id: String,
    pub mime_type: String,
    pub data: Bytes,
}

impl Attachment {
    pub fn new(content_id: impl Into<String>, mime_type: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            content_id: content_id.into(),
            mime_type: mime_type.into(),
            data: data.into(),
        }
    }

    pub fn href(&self) -> String {
        format!("cid:{}", self.content_id)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub soap_version: SoapVersion,
    /// `wsu:Id` of the `eb:Messaging` header
    pub messaging_id: String,
    /// `wsu:Id` of the SOAP Body
    pub body_id: String,
    pub message: MessageUnit,
    pub security: Option<SecurityHeader>,
    pub attachments: Vec<Attachment>,
}

impl Envelope {
    pub fn new(soap_version: SoapVersion, message: MessageUnit) -> Self {
        let seed = Uuid::new_v4().simple().to_string();
        Self {
            soap_version,
            messaging_id: format!("_eb-{}", seed),
            body_id: format!("_body-{}", seed),
            message,
            security: None,
            attachments: Vec::new(),
        }
    }

    pub fn with_attachments(mut self, attachments: Vec<Attachment>) -> Self {
        self.attachments = attachments;
        self
    }

    pub fn message_id(&self) -> &str {
        &self.message.message_info().message_id
    }

    /// Suffix shared by the `wsu:Id`s of this envelope
    pub fn id_suffix(&self) -> &str {
        self.body_id.strip_prefix("_body-").unwrap_or(&self.body_id)
    }

    pub fn is_signed(&self) -> bool {
        self.security
            .as_ref()
            .is_some_and(|header| header.signature.is_some())
    }

    pub fn user_message(&self) -> Option<&UserMessage> {
        match &self.message {
            MessageUnit::User(m) => Some(m),
            _ => None,
        }
    }

    pub fn attachment(&self, content_id: &str) -> Option<&Attachment> {
        self.attachments.iter().find(|a| a.content_id == content_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info() -> MessageInfo {
        MessageInfo::new("m1@test", Utc::now())
    }

    #[test]
    fn test_envelope_ids_share_suffix() {
        let env = Envelope::new(
            SoapVersion::Soap12,
            MessageUnit::Pull(PullRequest {
                message_info: info(),
                mpc: DEFAULT_MPC.to_string(),
            }),
        );
        assert!(env.messaging_id.ends_with(env.id_suffix()));
        assert_eq!(env.body_id, format!("_body-{}", env.id_suffix()));
        assert_eq!(env.message_id(), "m1@test");
        assert!(!env.is_signed());
    }

    #[test]
    fn test_empty_partition_signal() {
        let warning = EbmsError {
            error_code: EMPTY_MPC_ERROR_CODE.to_string(),
            severity: Severity::Warning,
            category: None,
            ref_to_message_in_error: None,
            short_description: Some("EmptyMessagePartitionChannel".to_string()),
            description: None,
        };
        let signal = ErrorSignal {
            message_info: info(),
            errors: vec![warning.clone()],
        };
        assert!(signal.is_empty_partition());

        let failure = ErrorSignal {
            message_info: info(),
            errors: vec![EbmsError {
                severity: Severity::Failure,
                ..warning
            }],
        };
        assert!(!failure.is_empty_partition());
    }

    #[test]
    fn test_soap_version_properties() {
        assert_eq!(SoapVersion::default(), SoapVersion::Soap12);
        assert_eq!(SoapVersion::from_namespace(SOAP11_NS), Some(SoapVersion::Soap11));
        assert_eq!(SoapVersion::Soap11.must_understand(), "1");
        assert_eq!(SoapVersion::Soap12.mime_type(), "application/soap+xml");
    }
}
