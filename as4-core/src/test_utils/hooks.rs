//! Hooks that record what they observe

use crate::core_exchange::coordinator::ExchangeResponse;
use crate::core_exchange::errors::TransportError;
use crate::core_exchange::hooks::{
    BuildMessageCallback, ExchangeHooks, IncomingDumper, OutgoingDumper, ResponseConsumer,
    RetryCallback, UserMessageConsumer,
};
use crate::core_message::envelope::{Attachment, Envelope, UserMessage};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default)]
struct Recorded {
    built: Vec<String>,
    signed: Vec<String>,
    retries: Vec<(u32, String)>,
    outgoing: Vec<(String, Vec<u8>)>,
    incoming: Vec<(String, Vec<u8>)>,
    responses: Vec<String>,
    user_messages: Vec<(UserMessage, Vec<Attachment>)>,
}

/// Records every hook invocation; clones share the same record
#[derive(Debug, Clone, Default)]
pub struct HookRecorder {
    inner: Arc<Mutex<Recorded>>,
}

impl HookRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hooks with every slot wired to this recorder
    pub fn hooks(&self) -> ExchangeHooks {
        ExchangeHooks::new()
            .with_build_callback(self.clone())
            .with_retry_callback(self.clone())
            .with_outgoing_dumper(self.clone())
            .with_incoming_dumper(self.clone())
            .with_response_consumer(self.clone())
            .with_user_message_consumer(self.clone())
    }

    fn record(&self) -> MutexGuard<'_, Recorded> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Message ids passed to `on_message_built`
    pub fn built(&self) -> Vec<String> {
        self.record().built.clone()
    }

    pub fn signed(&self) -> Vec<String> {
        self.record().signed.clone()
    }

    /// Attempt numbers reported to the retry callback
    pub fn retry_attempts(&self) -> Vec<u32> {
        self.record().retries.iter().map(|(attempt, _)| *attempt).collect()
    }

    pub fn retry_causes(&self) -> Vec<String> {
        self.record().retries.iter().map(|(_, cause)| cause.clone()).collect()
    }

    pub fn outgoing_dumps(&self) -> Vec<(String, Vec<u8>)> {
        self.record().outgoing.clone()
    }

    pub fn incoming_dumps(&self) -> Vec<(String, Vec<u8>)> {
        self.record().incoming.clone()
    }

    /// Request message ids of consumed responses
    pub fn responses(&self) -> Vec<String> {
        self.record().responses.clone()
    }

    pub fn user_messages(&self) -> Vec<(UserMessage, Vec<Attachment>)> {
        self.record().user_messages.clone()
    }
}

impl BuildMessageCallback for HookRecorder {
    fn on_message_built(&self, envelope: &Envelope) -> anyhow::Result<()> {
        self.record().built.push(envelope.message_id().to_string());
        Ok(())
    }

    fn on_message_signed(&self, envelope: &Envelope) -> anyhow::Result<()> {
        self.record().signed.push(envelope.message_id().to_string());
        Ok(())
    }
}

impl RetryCallback for HookRecorder {
    fn on_retry(&self, attempt: u32, cause: &TransportError) {
        self.record().retries.push((attempt, cause.to_string()));
    }
}

impl OutgoingDumper for HookRecorder {
    fn dump_outgoing(&self, message_id: &str, _content_type: &str, body: &[u8]) -> anyhow::Result<()> {
        self.record().outgoing.push((message_id.to_string(), body.to_vec()));
        Ok(())
    }
}

impl IncomingDumper for HookRecorder {
    fn dump_incoming(
        &self,
        message_id: &str,
        _content_type: Option<&str>,
        body: &[u8],
    ) -> anyhow::Result<()> {
        self.record().incoming.push((message_id.to_string(), body.to_vec()));
        Ok(())
    }
}

impl ResponseConsumer for HookRecorder {
    fn consume_response(&self, response: &ExchangeResponse) -> anyhow::Result<()> {
        self.record().responses.push(response.request_message_id.clone());
        Ok(())
    }
}

impl UserMessageConsumer for HookRecorder {
    fn consume_user_message(
        &self,
        message: &UserMessage,
        attachments: &[Attachment],
    ) -> anyhow::Result<()> {
        self.record()
            .user_messages
            .push((message.clone(), attachments.to_vec()));
        Ok(())
    }
}
