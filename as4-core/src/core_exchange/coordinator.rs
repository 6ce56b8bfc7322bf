//! Request/response orchestration for one ebMS exchange
//!
//! The coordinator signs the built envelope once, serializes it into the
//! exchange's resource scope and transmits the same bytes on every attempt.
//! Retriable transport failures are retried under the exchange's
//! `RetryPolicy`; everything else fails the exchange immediately. A response
//! is decoded, verified and correlated with the request before the caller's
//! consumers see it.

use super::errors::{ProtocolError, TransportError};
use super::hooks::ExchangeHooks;
use super::resource::{ResourceHandle, ResourceScope};
use super::retry::{CancellationFlag, RetryPolicy};
use super::transport::{classify_status, IncomingResponse, OutgoingRequest, Transport};
use crate::core_crypto::config::CryptoConfig;
use crate::core_crypto::errors::SecurityError;
use crate::core_crypto::signature::{SignatureEngine, VerificationResult};
use crate::core_message::codec;
use crate::core_message::envelope::{Attachment, Envelope, MessageUnit, Receipt, UserMessage};
use crate::errors::{As4Error, As4Result};
use crate::metrics::{
    EXCHANGES_TOTAL, EXCHANGE_DURATION_SECONDS, RETRIES_TOTAL, TRANSMIT_ATTEMPTS_TOTAL,
};
use metrics::{counter, histogram};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, trace, warn};
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeState {
    Idle,
    Building,
    Signing,
    Transmitting,
    AwaitingResponse,
    Done,
    Failed,
}

impl fmt::Display for ExchangeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExchangeState::Idle => "idle",
            ExchangeState::Building => "building",
            ExchangeState::Signing => "signing",
            ExchangeState::Transmitting => "transmitting",
            ExchangeState::AwaitingResponse => "awaiting-response",
            ExchangeState::Done => "done",
            ExchangeState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// What a valid response to the outgoing message looks like
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExpectedResponse {
    /// A User Message pulled from `mpc`, or nothing if the partition is empty
    PulledUserMessage { mpc: String },
    /// A Receipt for the sent message, or nothing for asynchronous receipts
    Receipt { ref_to_message_id: String },
}

impl ExpectedResponse {
    fn kind(&self) -> &'static str {
        match self {
            ExpectedResponse::PulledUserMessage { .. } => "UserMessage",
            ExpectedResponse::Receipt { .. } => "Receipt",
        }
    }
}

/// Everything the coordinator needs for one exchange
#[derive(Debug)]
pub struct ExchangeRequest {
    pub envelope: Envelope,
    pub endpoint: Url,
    pub expected: ExpectedResponse,
    pub crypto: Option<Arc<CryptoConfig>>,
    pub sign_outgoing: bool,
    pub require_signed_response: bool,
    pub retry: RetryPolicy,
    pub hooks: ExchangeHooks,
}

/// A completed exchange
#[derive(Debug, Clone)]
pub struct ExchangeResponse {
    pub request_message_id: String,
    /// Transmission attempts made, including the successful one
    pub attempts: u32,
    pub status: u16,
    /// Decoded response; `None` for an empty body
    pub envelope: Option<Envelope>,
    /// Present when the response was signed
    pub verification: Option<VerificationResult>,
}

impl ExchangeResponse {
    pub fn user_message(&self) -> Option<&UserMessage> {
        self.envelope.as_ref().and_then(Envelope::user_message)
    }

    pub fn receipt(&self) -> Option<&Receipt> {
        match self.envelope.as_ref().map(|env| &env.message) {
            Some(MessageUnit::Receipt(receipt)) => Some(receipt),
            _ => None,
        }
    }

    pub fn attachments(&self) -> &[Attachment] {
        self.envelope
            .as_ref()
            .map_or(&[], |env| env.attachments.as_slice())
    }

    /// Nothing was delivered: an empty body or an empty-partition warning
    pub fn is_empty(&self) -> bool {
        match self.envelope.as_ref().map(|env| &env.message) {
            None => true,
            Some(MessageUnit::Error(signal)) => signal.is_empty_partition(),
            Some(_) => false,
        }
    }
}

pub struct ExchangeCoordinator<'a> {
    transport: &'a dyn Transport,
    engine: &'a SignatureEngine,
    attempt_timeout: Duration,
    cancellation: Option<CancellationFlag>,
    state: ExchangeState,
}

impl<'a> ExchangeCoordinator<'a> {
    pub fn new(transport: &'a dyn Transport, engine: &'a SignatureEngine, attempt_timeout: Duration) -> Self {
        Self {
            transport,
            engine,
            attempt_timeout,
            cancellation: None,
            state: ExchangeState::Idle,
        }
    }

    pub fn with_cancellation(mut self, flag: CancellationFlag) -> Self {
        self.cancellation = Some(flag);
        self
    }

    pub fn state(&self) -> ExchangeState {
        self.state
    }

    fn transition(&mut self, next: ExchangeState) {
        trace!(from = %self.state, to = %next, "Exchange state transition");
        self.state = next;
    }

    /// Run the exchange; transient data lives in `scope`
    pub async fn execute(
        &mut self,
        request: ExchangeRequest,
        scope: &mut ResourceScope,
    ) -> As4Result<ExchangeResponse> {
        let started = Instant::now();
        let message_id = request.envelope.message_id().to_string();

        let result = self.run(request, scope).await;

        let outcome = match &result {
            Ok(response) => {
                info!(
                    message_id = %message_id,
                    attempts = response.attempts,
                    status = response.status,
                    "Exchange completed"
                );
                "success"
            }
            Err(e) => {
                self.transition(ExchangeState::Failed);
                error!(message_id = %message_id, error = %e, "Exchange failed");
                e.kind()
            }
        };
        counter!(EXCHANGES_TOTAL, "result" => outcome).increment(1);
        histogram!(EXCHANGE_DURATION_SECONDS).record(started.elapsed().as_secs_f64());
        result
    }

    async fn run(
        &mut self,
        request: ExchangeRequest,
        scope: &mut ResourceScope,
    ) -> As4Result<ExchangeResponse> {
        let ExchangeRequest {
            envelope,
            endpoint,
            expected,
            crypto,
            sign_outgoing,
            require_signed_response,
            retry,
            hooks,
        } = request;
        let message_id = envelope.message_id().to_string();

        self.transition(ExchangeState::Building);
        if let Some(callback) = &hooks.build_callback {
            callback.on_message_built(&envelope)?;
        }

        self.transition(ExchangeState::Signing);
        let envelope = if sign_outgoing {
            let crypto = crypto
                .as_deref()
                .ok_or(SecurityError::MissingCryptoConfig("signing"))?;
            let signed = self.engine.sign(envelope, crypto)?;
            if let Some(callback) = &hooks.build_callback {
                callback.on_message_signed(&signed)?;
            }
            signed
        } else {
            envelope
        };

        let wire = codec::encode(&envelope);
        let content_type = wire.content_type;
        let outgoing = scope.retain(wire.body)?;

        let (attempts, raw) = self
            .transmit(&endpoint, &message_id, &content_type, outgoing, scope, &retry, &hooks)
            .await?;

        self.transition(ExchangeState::AwaitingResponse);
        let status = raw.status;
        let response_content_type = raw.content_type;
        let incoming = scope.retain(raw.body)?;
        let body = scope.read(incoming)?;

        let decoded = codec::decode(response_content_type.as_deref(), &body)
            .map_err(ProtocolError::from_codec)?;

        let verification = match (&decoded, crypto.as_deref()) {
            (Some(env), Some(crypto)) if env.is_signed() => Some(self.engine.verify(env, crypto)?),
            (Some(env), None) if env.is_signed() && require_signed_response => {
                return Err(SecurityError::MissingCryptoConfig("verification").into());
            }
            (Some(env), None) if env.is_signed() => {
                warn!(message_id = %message_id, "No crypto configuration, response signature not verified");
                None
            }
            (Some(_), _) if require_signed_response => {
                return Err(SecurityError::MissingSecurityHeader.into());
            }
            _ => None,
        };

        check_status(status, decoded.as_ref())?;
        correlate(&expected, decoded.as_ref())?;

        self.transition(ExchangeState::Done);
        let response = ExchangeResponse {
            request_message_id: message_id.clone(),
            attempts,
            status,
            envelope: decoded,
            verification,
        };

        if let Some(dumper) = &hooks.outgoing_dumper {
            dumper.dump_outgoing(&message_id, &content_type, &scope.read(outgoing)?)?;
        }
        if let Some(dumper) = &hooks.incoming_dumper {
            dumper.dump_incoming(&message_id, response_content_type.as_deref(), &body)?;
        }
        if let Some(consumer) = &hooks.response_consumer {
            consumer.consume_response(&response)?;
        }
        if let (Some(consumer), Some(user_message)) =
            (&hooks.user_message_consumer, response.user_message())
        {
            consumer.consume_user_message(user_message, response.attachments())?;
        }

        Ok(response)
    }

    #[allow(clippy::too_many_arguments)]
    async fn transmit(
        &mut self,
        endpoint: &Url,
        message_id: &str,
        content_type: &str,
        body: ResourceHandle,
        scope: &ResourceScope,
        retry: &RetryPolicy,
        hooks: &ExchangeHooks,
    ) -> As4Result<(u32, IncomingResponse)> {
        let max_attempts = retry.max_attempts();
        let mut attempt = 0;

        loop {
            attempt += 1;
            self.transition(ExchangeState::Transmitting);
            counter!(TRANSMIT_ATTEMPTS_TOTAL).increment(1);
            debug!(message_id, attempt, max_attempts, endpoint = %endpoint, "Transmitting message");

            let request = OutgoingRequest {
                endpoint: endpoint.clone(),
                content_type: content_type.to_string(),
                body: scope.read(body)?,
                message_id: message_id.to_string(),
            };

            let outcome = match tokio::time::timeout(self.attempt_timeout, self.transport.send(request)).await {
                Ok(Ok(response)) => classify_status(response.status, response.content_type.as_deref())
                    .map(|()| response),
                Ok(Err(e)) => Err(e),
                Err(_) => Err(TransportError::Timeout(self.attempt_timeout)),
            };

            match outcome {
                Ok(response) => return Ok((attempt, response)),
                Err(e) if e.is_retriable() && attempt < max_attempts => {
                    let delay = retry.delay_for_retry(attempt);
                    warn!(
                        message_id,
                        attempt,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Transmission failed, will retry"
                    );
                    counter!(RETRIES_TOTAL).increment(1);
                    if let Some(callback) = &hooks.retry_callback {
                        callback.on_retry(attempt, &e);
                    }

                    tokio::time::sleep(delay).await;

                    if self
                        .cancellation
                        .as_ref()
                        .is_some_and(CancellationFlag::is_cancelled)
                    {
                        info!(message_id, attempts = attempt, "Exchange cancelled between attempts");
                        return Err(As4Error::Cancelled { attempts: attempt });
                    }
                }
                Err(e) => {
                    return Err(As4Error::Transport {
                        attempts: attempt,
                        source: e,
                    });
                }
            }
        }
    }
}

/// A non-2xx status is only acceptable when it carries an ebMS error signal
fn check_status(status: u16, decoded: Option<&Envelope>) -> Result<(), ProtocolError> {
    if (200..300).contains(&status) {
        return Ok(());
    }
    match decoded.map(|env| &env.message) {
        Some(MessageUnit::Error(signal)) => Err(ProtocolError::from_signal(signal)),
        _ => Err(ProtocolError::UnexpectedStatus(status)),
    }
}

fn correlate(expected: &ExpectedResponse, decoded: Option<&Envelope>) -> Result<(), ProtocolError> {
    let Some(envelope) = decoded else {
        return Ok(());
    };

    match (expected, &envelope.message) {
        (ExpectedResponse::PulledUserMessage { .. }, MessageUnit::Error(signal))
            if signal.is_empty_partition() =>
        {
            debug!(message_id = %envelope.message_id(), "Pulled partition is empty");
            Ok(())
        }
        (_, MessageUnit::Error(signal)) => Err(ProtocolError::from_signal(signal)),
        (ExpectedResponse::PulledUserMessage { mpc }, MessageUnit::User(message)) => {
            if message.effective_mpc() == mpc {
                Ok(())
            } else {
                Err(ProtocolError::Correlation {
                    expected: mpc.clone(),
                    actual: message.effective_mpc().to_string(),
                })
            }
        }
        (ExpectedResponse::Receipt { ref_to_message_id }, MessageUnit::Receipt(receipt)) => {
            match receipt.message_info.ref_to_message_id.as_deref() {
                Some(actual) if actual == ref_to_message_id => Ok(()),
                actual => Err(ProtocolError::Correlation {
                    expected: ref_to_message_id.clone(),
                    actual: actual.unwrap_or("<none>").to_string(),
                }),
            }
        }
        (expected, other) => Err(ProtocolError::UnexpectedResponse {
            expected: expected.kind(),
            actual: other.kind(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_message::envelope::{
        EbmsError, ErrorSignal, MessageInfo, PullRequest, Severity, SoapVersion,
        EMPTY_MPC_ERROR_CODE,
    };
    use chrono::Utc;

    fn info(id: &str, ref_to: Option<&str>) -> MessageInfo {
        let mut info = MessageInfo::new(id, Utc::now());
        info.ref_to_message_id = ref_to.map(str::to_string);
        info
    }

    fn error_envelope(code: &str, severity: Severity) -> Envelope {
        Envelope::new(
            SoapVersion::Soap12,
            MessageUnit::Error(ErrorSignal {
                message_info: info("err@test", Some("pull@test")),
                errors: vec![EbmsError {
                    error_code: code.to_string(),
                    severity,
                    category: None,
                    ref_to_message_in_error: Some("pull@test".to_string()),
                    short_description: Some("EmptyMessagePartitionChannel".to_string()),
                    description: None,
                }],
            }),
        )
    }

    fn pull_expectation() -> ExpectedResponse {
        ExpectedResponse::PulledUserMessage {
            mpc: "urn:mpc:default".to_string(),
        }
    }

    #[test]
    fn test_empty_response_correlates() {
        assert!(correlate(&pull_expectation(), None).is_ok());
    }

    #[test]
    fn test_empty_partition_warning_is_not_an_error() {
        let envelope = error_envelope(EMPTY_MPC_ERROR_CODE, Severity::Warning);
        assert!(correlate(&pull_expectation(), Some(&envelope)).is_ok());

        let receipt = ExpectedResponse::Receipt {
            ref_to_message_id: "m@test".to_string(),
        };
        assert!(correlate(&receipt, Some(&envelope)).is_err());
    }

    #[test]
    fn test_error_signal_fails() {
        let envelope = error_envelope("EBMS:0004", Severity::Failure);
        assert!(matches!(
            correlate(&pull_expectation(), Some(&envelope)),
            Err(ProtocolError::ErrorSignal { code, .. }) if code == "EBMS:0004"
        ));
    }

    #[test]
    fn test_receipt_must_reference_request() {
        let expected = ExpectedResponse::Receipt {
            ref_to_message_id: "m1@test".to_string(),
        };
        let receipt = |ref_to: &str| {
            Envelope::new(
                SoapVersion::Soap12,
                MessageUnit::Receipt(Receipt {
                    message_info: info("r@test", Some(ref_to)),
                }),
            )
        };
        assert!(correlate(&expected, Some(&receipt("m1@test"))).is_ok());
        assert!(matches!(
            correlate(&expected, Some(&receipt("other@test"))),
            Err(ProtocolError::Correlation { .. })
        ));
    }

    #[test]
    fn test_unexpected_message_kind() {
        let pull = Envelope::new(
            SoapVersion::Soap12,
            MessageUnit::Pull(PullRequest {
                message_info: info("p@test", None),
                mpc: "urn:mpc:default".to_string(),
            }),
        );
        assert!(matches!(
            correlate(&pull_expectation(), Some(&pull)),
            Err(ProtocolError::UnexpectedResponse {
                expected: "UserMessage",
                actual: "PullRequest"
            })
        ));
    }

    #[test]
    fn test_error_status_requires_error_signal() {
        assert!(check_status(200, None).is_ok());
        assert!(matches!(
            check_status(500, None),
            Err(ProtocolError::UnexpectedStatus(500))
        ));
        let envelope = error_envelope("EBMS:0004", Severity::Failure);
        assert!(matches!(
            check_status(500, Some(&envelope)),
            Err(ProtocolError::ErrorSignal { .. })
        ));
    }

    #[test]
    fn test_response_accessors() {
        let response = ExchangeResponse {
            request_message_id: "p@test".to_string(),
            attempts: 1,
            status: 200,
            envelope: Some(error_envelope(EMPTY_MPC_ERROR_CODE, Severity::Warning)),
            verification: None,
        };
        assert!(response.is_empty());
        assert!(response.user_message().is_none());
        assert!(response.attachments().is_empty());
    }
}
