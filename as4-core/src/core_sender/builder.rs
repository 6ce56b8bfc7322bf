//! The send pipeline shared by every message kind
//!
//! A builder owns its parameters until `send_message` consumes it. The
//! pipeline runs `finish_fields`, the required-field check and
//! `customize_before_sending` before anything touches the network, then hands
//! the built envelope to an `ExchangeCoordinator` inside a fresh
//! `ResourceScope`.

use super::client::As4Client;
use super::params::HasMessageParams;
use super::result::ExchangeResult;
use crate::core_exchange::coordinator::{
    ExchangeCoordinator, ExchangeRequest, ExchangeResponse, ExpectedResponse,
};
use crate::core_exchange::resource::ResourceScope;
use crate::core_message::envelope::{Attachment, Envelope, MessageInfo, MessageUnit};
use crate::core_message::ids::generate_message_id;
use crate::core_pmode::pmode::PMode;
use crate::errors::{As4Result, ValidationError};
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, error, warn};
use url::Url;

/// One kind of outgoing ebMS message
pub trait MessageKind: HasMessageParams + Send + Sync {
    /// Name used in logs
    fn kind_name(&self) -> &'static str;

    /// Derive unset fields from the PMode and resolve lookups
    ///
    /// Runs before the required-field check and must be idempotent.
    fn finish_fields(&mut self, client: &As4Client) -> As4Result<()>;

    /// Names of required fields that are still unset
    fn missing_required_fields(&self) -> Vec<&'static str>;

    fn is_every_required_field_set(&self) -> bool {
        self.missing_required_fields().is_empty()
    }

    /// Last adjustments, once per send, after validation
    fn customize_before_sending(&mut self) -> As4Result<()> {
        Ok(())
    }

    fn build_message_unit(&self, info: MessageInfo) -> MessageUnit;

    fn expected_response(&self, message_id: &str) -> ExpectedResponse;

    /// PMode resolved by `finish_fields`
    fn pmode(&self) -> Option<&Arc<PMode>>;

    fn attachments(&self) -> Vec<Attachment> {
        Vec::new()
    }
}

/// Validate, build and exchange one message
pub async fn send_message<K: MessageKind>(mut builder: K, client: &As4Client) -> ExchangeResult {
    let kind = builder.kind_name();

    if let Err(e) = builder.finish_fields(client) {
        warn!(kind, error = %e, "Could not finish message fields");
        return ExchangeResult::Failure(e);
    }

    let missing = builder.missing_required_fields();
    if !missing.is_empty() {
        error!(kind, missing = ?missing, "Not every required field is set");
        return ExchangeResult::Failure(ValidationError::MissingFields(missing).into());
    }

    if let Err(e) = builder.customize_before_sending() {
        warn!(kind, error = %e, "Customizing the message failed");
        return ExchangeResult::Failure(e);
    }

    let mut scope = client.open_scope();
    let result = exchange(&builder, client, &mut scope).await;
    drop(scope);
    result.into()
}

async fn exchange<K: MessageKind>(
    builder: &K,
    client: &As4Client,
    scope: &mut ResourceScope,
) -> As4Result<ExchangeResponse> {
    let params = builder.params();
    let pmode = builder.pmode().map(Arc::as_ref);

    let endpoint_url = params.endpoint_url.as_deref().unwrap_or_default().trim();
    let endpoint = Url::parse(endpoint_url).map_err(|e| ValidationError::InvalidField {
        field: "endpoint_url",
        reason: e.to_string(),
    })?;

    let message_id = params
        .explicit_message_id()
        .map(str::to_string)
        .unwrap_or_else(|| generate_message_id(client.message_id_suffix()));
    let timestamp = params.sending_date_time.unwrap_or_else(Utc::now);
    let soap_version = params
        .soap_version
        .or_else(|| pmode.and_then(|p| p.soap_version))
        .unwrap_or_default();
    let retry = params.resolve_retry(pmode, client.retry_defaults());
    let crypto = params.crypto.clone().or_else(|| client.crypto().cloned());

    // Without a PMode, sign whenever key material is available
    let sign_outgoing = pmode.map_or(crypto.is_some(), |p| p.security.sign);
    let require_signed_response = pmode.is_some_and(|p| p.security.require_signed_response);

    let message = builder.build_message_unit(MessageInfo::new(message_id.clone(), timestamp));
    let envelope = Envelope::new(soap_version, message).with_attachments(builder.attachments());

    debug!(
        kind = builder.kind_name(),
        message_id = %message_id,
        endpoint = %endpoint,
        max_retries = retry.max_retries,
        sign = sign_outgoing,
        "Prepared outgoing message"
    );

    let request = ExchangeRequest {
        envelope,
        endpoint,
        expected: builder.expected_response(&message_id),
        crypto,
        sign_outgoing,
        require_signed_response,
        retry,
        hooks: params.hooks.clone(),
    };

    let mut coordinator = ExchangeCoordinator::new(
        client.transport(),
        client.signature_engine(),
        client.attempt_timeout(),
    );
    if let Some(flag) = client.cancellation() {
        coordinator = coordinator.with_cancellation(flag.clone());
    }
    coordinator.execute(request, scope).await
}
