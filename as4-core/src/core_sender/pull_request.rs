//! Pull Request: ask a partner for the next User Message on an MPC

use super::builder::MessageKind;
use super::client::As4Client;
use super::params::{HasMessageParams, MessageParams};
use crate::core_exchange::coordinator::ExpectedResponse;
use crate::core_message::envelope::{MessageInfo, MessageUnit, PullRequest};
use crate::core_pmode::mpc::Mpc;
use crate::core_pmode::pmode::PMode;
use crate::errors::As4Result;
use std::sync::Arc;
use tracing::trace;

#[derive(Debug, Clone, Default)]
pub struct PullRequestBuilder {
    params: MessageParams,
    mpc: Option<String>,
    pmode: Option<Arc<PMode>>,
    resolved_mpc: Option<Arc<Mpc>>,
}

impl PullRequestBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mpc(mut self, mpc: impl Into<String>) -> Self {
        self.mpc = Some(mpc.into());
        self
    }

    pub fn mpc_id(&self) -> Option<&str> {
        self.mpc.as_deref().filter(|mpc| !mpc.trim().is_empty())
    }

    /// MPC found by `finish_fields`
    pub fn resolved_mpc(&self) -> Option<&Arc<Mpc>> {
        self.resolved_mpc.as_ref()
    }
}

impl HasMessageParams for PullRequestBuilder {
    fn params(&self) -> &MessageParams {
        &self.params
    }

    fn params_mut(&mut self) -> &mut MessageParams {
        &mut self.params
    }
}

impl MessageKind for PullRequestBuilder {
    fn kind_name(&self) -> &'static str {
        "PullRequest"
    }

    fn finish_fields(&mut self, client: &As4Client) -> As4Result<()> {
        if let Some(pmode_id) = self.params.pmode_id.as_deref() {
            let pmode = client.pmode_resolver().resolve_pmode(pmode_id)?;
            if self.mpc_id().is_none() {
                self.mpc = pmode.mpc.clone();
            }
            if !self.params.has_endpoint() {
                self.params.endpoint_url = pmode.endpoint_url.clone();
            }
            self.pmode = Some(pmode);
        }

        if let Some(mpc) = self.mpc_id() {
            let resolved = client.mpc_resolver().resolve_mpc(mpc)?;
            trace!(mpc = %resolved, "Resolved MPC");
            self.resolved_mpc = Some(resolved);
        }
        Ok(())
    }

    fn missing_required_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.mpc_id().is_none() {
            missing.push("mpc");
        }
        if !self.params.has_endpoint() {
            missing.push("endpoint_url");
        }
        missing
    }

    fn build_message_unit(&self, info: MessageInfo) -> MessageUnit {
        MessageUnit::Pull(PullRequest {
            message_info: info,
            mpc: self.mpc_id().unwrap_or_default().to_string(),
        })
    }

    fn expected_response(&self, _message_id: &str) -> ExpectedResponse {
        ExpectedResponse::PulledUserMessage {
            mpc: self.mpc_id().unwrap_or_default().to_string(),
        }
    }

    fn pmode(&self) -> Option<&Arc<PMode>> {
        self.pmode.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_pmode::resolver::{MpcRegistry, PModeRegistry};
    use crate::errors::{As4Error, ValidationError};
    use crate::test_utils::ScriptedTransport;

    fn client_with(pmodes: PModeRegistry) -> As4Client {
        As4Client::new(Arc::new(ScriptedTransport::new()))
            .with_pmode_resolver(Arc::new(pmodes))
            .with_mpc_resolver(Arc::new(
                MpcRegistry::from_ids(["urn:mpc:default"]).unwrap(),
            ))
    }

    #[test]
    fn test_required_fields() {
        let builder = PullRequestBuilder::new();
        assert!(!builder.is_every_required_field_set());
        assert_eq!(builder.missing_required_fields(), vec!["mpc", "endpoint_url"]);

        let builder = builder.mpc("urn:mpc:default");
        assert_eq!(builder.missing_required_fields(), vec!["endpoint_url"]);

        let builder = builder.endpoint_url("https://partner.example/as4");
        assert!(builder.is_every_required_field_set());
    }

    #[test]
    fn test_blank_mpc_is_missing() {
        let builder = PullRequestBuilder::new()
            .mpc("  ")
            .endpoint_url("https://partner.example/as4");
        assert_eq!(builder.missing_required_fields(), vec!["mpc"]);
    }

    #[test]
    fn test_finish_fields_derives_from_pmode() {
        let mut pmode = PMode::new("pm-pull");
        pmode.mpc = Some("urn:mpc:default".to_string());
        pmode.endpoint_url = Some("https://partner.example/as4".to_string());
        let client = client_with(PModeRegistry::from_pmodes([pmode]).unwrap());

        let mut builder = PullRequestBuilder::new().pmode_id("pm-pull");
        builder.finish_fields(&client).unwrap();
        builder.finish_fields(&client).unwrap();

        assert_eq!(builder.mpc_id(), Some("urn:mpc:default"));
        assert_eq!(
            builder.params().endpoint_url.as_deref(),
            Some("https://partner.example/as4")
        );
        assert_eq!(builder.resolved_mpc().unwrap().id(), "urn:mpc:default");
        assert!(builder.is_every_required_field_set());
    }

    #[test]
    fn test_explicit_fields_beat_pmode() {
        let mut pmode = PMode::new("pm-pull");
        pmode.mpc = Some("urn:mpc:other".to_string());
        pmode.endpoint_url = Some("https://other.example/as4".to_string());
        let client = client_with(PModeRegistry::from_pmodes([pmode]).unwrap());

        let mut builder = PullRequestBuilder::new()
            .pmode_id("pm-pull")
            .mpc("urn:mpc:default")
            .endpoint_url("https://partner.example/as4");
        builder.finish_fields(&client).unwrap();

        assert_eq!(builder.mpc_id(), Some("urn:mpc:default"));
        assert_eq!(
            builder.params().endpoint_url.as_deref(),
            Some("https://partner.example/as4")
        );
    }

    #[test]
    fn test_unknown_lookups_fail() {
        let client = client_with(PModeRegistry::new());

        let mut builder = PullRequestBuilder::new().pmode_id("missing");
        assert!(matches!(
            builder.finish_fields(&client),
            Err(As4Error::Validation(ValidationError::Lookup(_)))
        ));

        let mut builder = PullRequestBuilder::new().mpc("urn:mpc:unknown");
        assert!(matches!(
            builder.finish_fields(&client),
            Err(As4Error::Validation(ValidationError::Lookup(_)))
        ));
    }

    #[test]
    fn test_builds_pull_request_for_mpc() {
        let builder = PullRequestBuilder::new().mpc("urn:mpc:default");
        let unit = builder.build_message_unit(MessageInfo::new("pr@test", chrono::Utc::now()));
        match unit {
            MessageUnit::Pull(pull) => {
                assert_eq!(pull.mpc, "urn:mpc:default");
                assert_eq!(pull.message_info.message_id, "pr@test");
            }
            other => panic!("unexpected unit {}", other.kind()),
        }
        assert_eq!(
            builder.expected_response("pr@test"),
            ExpectedResponse::PulledUserMessage {
                mpc: "urn:mpc:default".to_string()
            }
        );
    }
}
