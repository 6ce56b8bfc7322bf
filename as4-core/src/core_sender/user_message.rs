//! User Message push: deliver payloads to a partner and expect a Receipt

use super::builder::MessageKind;
use super::client::As4Client;
use super::params::{HasMessageParams, MessageParams};
use crate::core_exchange::coordinator::ExpectedResponse;
use crate::core_message::envelope::{
    Attachment, CollaborationInfo, MessageInfo, MessageUnit, PartInfo, Party, PartyInfo, Property,
    UserMessage,
};
use crate::core_pmode::pmode::PMode;
use crate::errors::As4Result;
use std::sync::Arc;
use uuid::Uuid;

/// Part property naming the payload's MIME type
pub const MIME_TYPE_PROPERTY: &str = "MimeType";

#[derive(Debug, Clone, Default)]
pub struct UserMessageBuilder {
    params: MessageParams,
    from_party: Option<Party>,
    to_party: Option<Party>,
    service: Option<String>,
    service_type: Option<String>,
    action: Option<String>,
    agreement_ref: Option<String>,
    conversation_id: Option<String>,
    ref_to_message_id: Option<String>,
    mpc: Option<String>,
    properties: Vec<Property>,
    payloads: Vec<Attachment>,
    pmode: Option<Arc<PMode>>,
}

impl UserMessageBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_party(mut self, party: Party) -> Self {
        self.from_party = Some(party);
        self
    }

    pub fn to_party(mut self, party: Party) -> Self {
        self.to_party = Some(party);
        self
    }

    pub fn service(mut self, service: impl Into<String>) -> Self {
        self.service = Some(service.into());
        self
    }

    pub fn service_type(mut self, service_type: impl Into<String>) -> Self {
        self.service_type = Some(service_type.into());
        self
    }

    pub fn action(mut self, action: impl Into<String>) -> Self {
        self.action = Some(action.into());
        self
    }

    pub fn agreement_ref(mut self, agreement_ref: impl Into<String>) -> Self {
        self.agreement_ref = Some(agreement_ref.into());
        self
    }

    pub fn conversation_id(mut self, conversation_id: impl Into<String>) -> Self {
        self.conversation_id = Some(conversation_id.into());
        self
    }

    pub fn ref_to_message_id(mut self, message_id: impl Into<String>) -> Self {
        self.ref_to_message_id = Some(message_id.into());
        self
    }

    pub fn mpc(mut self, mpc: impl Into<String>) -> Self {
        self.mpc = Some(mpc.into());
        self
    }

    pub fn property(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.push(Property::new(name, value));
        self
    }

    /// Add a payload carried as a MIME attachment
    pub fn payload(mut self, attachment: Attachment) -> Self {
        self.payloads.push(attachment);
        self
    }

    pub fn conversation(&self) -> Option<&str> {
        self.conversation_id.as_deref()
    }

    pub fn properties(&self) -> &[Property] {
        &self.properties
    }
}

fn is_blank(value: Option<&str>) -> bool {
    value.map_or(true, |v| v.trim().is_empty())
}

impl HasMessageParams for UserMessageBuilder {
    fn params(&self) -> &MessageParams {
        &self.params
    }

    fn params_mut(&mut self) -> &mut MessageParams {
        &mut self.params
    }
}

impl MessageKind for UserMessageBuilder {
    fn kind_name(&self) -> &'static str {
        "UserMessage"
    }

    fn finish_fields(&mut self, client: &As4Client) -> As4Result<()> {
        let Some(pmode_id) = self.params.pmode_id.as_deref() else {
            return Ok(());
        };
        let pmode = client.pmode_resolver().resolve_pmode(pmode_id)?;

        if self.from_party.is_none() {
            self.from_party = pmode.initiator.clone();
        }
        if self.to_party.is_none() {
            self.to_party = pmode.responder.clone();
        }
        if is_blank(self.service.as_deref()) {
            self.service = pmode.service.clone();
        }
        if self.service_type.is_none() {
            self.service_type = pmode.service_type.clone();
        }
        if is_blank(self.action.as_deref()) {
            self.action = pmode.action.clone();
        }
        if self.agreement_ref.is_none() {
            self.agreement_ref = pmode.agreement.clone();
        }
        if self.mpc.is_none() {
            self.mpc = pmode.mpc.clone();
        }
        if !self.params.has_endpoint() {
            self.params.endpoint_url = pmode.endpoint_url.clone();
        }
        self.pmode = Some(pmode);
        Ok(())
    }

    fn missing_required_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.pmode.is_none() {
            missing.push("pmode");
        }
        if !self.params.has_endpoint() {
            missing.push("endpoint_url");
        }
        if self.from_party.is_none() {
            missing.push("from_party");
        }
        if self.to_party.is_none() {
            missing.push("to_party");
        }
        if is_blank(self.service.as_deref()) {
            missing.push("service");
        }
        if is_blank(self.action.as_deref()) {
            missing.push("action");
        }
        missing
    }

    fn customize_before_sending(&mut self) -> As4Result<()> {
        if is_blank(self.conversation_id.as_deref()) {
            self.conversation_id = Some(Uuid::new_v4().to_string());
        }
        Ok(())
    }

    fn build_message_unit(&self, mut info: MessageInfo) -> MessageUnit {
        info.ref_to_message_id = self.ref_to_message_id.clone();

        let payload_info = self
            .payloads
            .iter()
            .map(|attachment| PartInfo {
                href: attachment.href(),
                properties: vec![Property::new(MIME_TYPE_PROPERTY, attachment.mime_type.clone())],
            })
            .collect();

        MessageUnit::User(UserMessage {
            message_info: info,
            mpc: self.mpc.clone(),
            party_info: PartyInfo {
                from: self.from_party.clone().unwrap_or_default(),
                to: self.to_party.clone().unwrap_or_default(),
            },
            collaboration_info: CollaborationInfo {
                agreement_ref: self.agreement_ref.clone(),
                service: self.service.clone().unwrap_or_default(),
                service_type: self.service_type.clone(),
                action: self.action.clone().unwrap_or_default(),
                conversation_id: self.conversation_id.clone().unwrap_or_default(),
            },
            message_properties: self.properties.clone(),
            payload_info,
        })
    }

    fn expected_response(&self, message_id: &str) -> ExpectedResponse {
        ExpectedResponse::Receipt {
            ref_to_message_id: message_id.to_string(),
        }
    }

    fn pmode(&self) -> Option<&Arc<PMode>> {
        self.pmode.as_ref()
    }

    fn attachments(&self) -> Vec<Attachment> {
        self.payloads.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_pmode::resolver::PModeRegistry;
    use crate::test_utils::ScriptedTransport;
    use chrono::Utc;

    fn exchange_pmode() -> PMode {
        let mut pmode = PMode::new("pm-push");
        pmode.agreement = Some("urn:agreement:invoices".to_string());
        pmode.initiator = Some(Party::new("sender-gw", "http://example.org/roles/sender"));
        pmode.responder = Some(Party::new("partner-gw", "http://example.org/roles/receiver"));
        pmode.endpoint_url = Some("https://partner.example/as4".to_string());
        pmode.service = Some("urn:services:invoicing".to_string());
        pmode.action = Some("Deliver".to_string());
        pmode
    }

    fn client() -> As4Client {
        As4Client::new(Arc::new(ScriptedTransport::new())).with_pmode_resolver(Arc::new(
            PModeRegistry::from_pmodes([exchange_pmode()]).unwrap(),
        ))
    }

    #[test]
    fn test_pmode_is_required() {
        let builder = UserMessageBuilder::new()
            .endpoint_url("https://partner.example/as4")
            .from_party(Party::new("a", "sender"))
            .to_party(Party::new("b", "receiver"))
            .service("svc")
            .action("act");
        assert_eq!(builder.missing_required_fields(), vec!["pmode"]);
    }

    #[test]
    fn test_finish_fields_fills_from_pmode() {
        let mut builder = UserMessageBuilder::new().pmode_id("pm-push").action("Override");
        builder.finish_fields(&client()).unwrap();
        builder.finish_fields(&client()).unwrap();

        assert!(builder.is_every_required_field_set());
        assert_eq!(builder.action.as_deref(), Some("Override"));
        assert_eq!(builder.service.as_deref(), Some("urn:services:invoicing"));
        assert_eq!(builder.from_party.as_ref().unwrap().id, "sender-gw");
        assert_eq!(builder.to_party.as_ref().unwrap().id, "partner-gw");
        assert_eq!(builder.agreement_ref.as_deref(), Some("urn:agreement:invoices"));
        assert!(builder.properties().is_empty());
    }

    #[test]
    fn test_conversation_id_generated_once() {
        let mut builder = UserMessageBuilder::new();
        builder.customize_before_sending().unwrap();
        let generated = builder.conversation().unwrap().to_string();
        assert!(!generated.is_empty());

        builder.customize_before_sending().unwrap();
        assert_eq!(builder.conversation(), Some(generated.as_str()));

        let mut builder = UserMessageBuilder::new().conversation_id("conv-1");
        builder.customize_before_sending().unwrap();
        assert_eq!(builder.conversation(), Some("conv-1"));
    }

    #[test]
    fn test_payloads_become_part_infos() {
        let builder = UserMessageBuilder::new()
            .from_party(Party::new("a", "sender"))
            .to_party(Party::new("b", "receiver"))
            .service("svc")
            .action("act")
            .ref_to_message_id("earlier@test")
            .property("originalSender", "urn:party:a")
            .payload(Attachment::new("invoice@test", "application/xml", "<Invoice/>"));

        let unit = builder.build_message_unit(MessageInfo::new("um@test", Utc::now()));
        let MessageUnit::User(message) = unit else {
            panic!("expected a user message");
        };
        assert_eq!(message.message_info.ref_to_message_id.as_deref(), Some("earlier@test"));
        assert_eq!(message.property("originalSender"), Some("urn:party:a"));
        assert_eq!(message.payload_info.len(), 1);
        assert_eq!(message.payload_info[0].href, "cid:invoice@test");
        assert_eq!(message.payload_info[0].properties[0].value, "application/xml");
        assert_eq!(builder.attachments().len(), 1);
    }

    #[test]
    fn test_expects_receipt_for_sent_id() {
        let builder = UserMessageBuilder::new();
        assert_eq!(
            builder.expected_response("um@test"),
            ExpectedResponse::Receipt {
                ref_to_message_id: "um@test".to_string()
            }
        );
    }
}
