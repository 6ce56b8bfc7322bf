//! Caller-supplied observers of an exchange
//!
//! Dumpers and consumers only fire once an exchange reaches `Done`. The retry
//! callback is informational and cannot alter control flow.

use super::coordinator::ExchangeResponse;
use super::errors::TransportError;
use crate::core_message::envelope::{Attachment, Envelope, UserMessage};
use std::fmt;
use std::sync::Arc;

pub trait BuildMessageCallback: Send + Sync {
    /// The envelope has been built, before signing
    fn on_message_built(&self, envelope: &Envelope) -> anyhow::Result<()>;

    /// The envelope has been signed
    fn on_message_signed(&self, _envelope: &Envelope) -> anyhow::Result<()> {
        Ok(())
    }
}

impl<F> BuildMessageCallback for F
where
    F: Fn(&Envelope) -> anyhow::Result<()> + Send + Sync,
{
    fn on_message_built(&self, envelope: &Envelope) -> anyhow::Result<()> {
        self(envelope)
    }
}

pub trait RetryCallback: Send + Sync {
    /// Attempt `attempt` failed with `cause` and another attempt follows
    fn on_retry(&self, attempt: u32, cause: &TransportError);
}

impl<F> RetryCallback for F
where
    F: Fn(u32, &TransportError) + Send + Sync,
{
    fn on_retry(&self, attempt: u32, cause: &TransportError) {
        self(attempt, cause)
    }
}

pub trait OutgoingDumper: Send + Sync {
    fn dump_outgoing(&self, message_id: &str, content_type: &str, body: &[u8]) -> anyhow::Result<()>;
}

impl<F> OutgoingDumper for F
where
    F: Fn(&str, &str, &[u8]) -> anyhow::Result<()> + Send + Sync,
{
    fn dump_outgoing(&self, message_id: &str, content_type: &str, body: &[u8]) -> anyhow::Result<()> {
        self(message_id, content_type, body)
    }
}

pub trait IncomingDumper: Send + Sync {
    fn dump_incoming(
        &self,
        message_id: &str,
        content_type: Option<&str>,
        body: &[u8],
    ) -> anyhow::Result<()>;
}

impl<F> IncomingDumper for F
where
    F: Fn(&str, Option<&str>, &[u8]) -> anyhow::Result<()> + Send + Sync,
{
    fn dump_incoming(
        &self,
        message_id: &str,
        content_type: Option<&str>,
        body: &[u8],
    ) -> anyhow::Result<()> {
        self(message_id, content_type, body)
    }
}

pub trait ResponseConsumer: Send + Sync {
    fn consume_response(&self, response: &ExchangeResponse) -> anyhow::Result<()>;
}

impl<F> ResponseConsumer for F
where
    F: Fn(&ExchangeResponse) -> anyhow::Result<()> + Send + Sync,
{
    fn consume_response(&self, response: &ExchangeResponse) -> anyhow::Result<()> {
        self(response)
    }
}

/// Receives a User Message delivered in response, e.g. to a Pull Request
pub trait UserMessageConsumer: Send + Sync {
    fn consume_user_message(
        &self,
        message: &UserMessage,
        attachments: &[Attachment],
    ) -> anyhow::Result<()>;
}

impl<F> UserMessageConsumer for F
where
    F: Fn(&UserMessage, &[Attachment]) -> anyhow::Result<()> + Send + Sync,
{
    fn consume_user_message(
        &self,
        message: &UserMessage,
        attachments: &[Attachment],
    ) -> anyhow::Result<()> {
        self(message, attachments)
    }
}

#[derive(Clone, Default)]
pub struct ExchangeHooks {
    pub build_callback: Option<Arc<dyn BuildMessageCallback>>,
    pub retry_callback: Option<Arc<dyn RetryCallback>>,
    pub outgoing_dumper: Option<Arc<dyn OutgoingDumper>>,
    pub incoming_dumper: Option<Arc<dyn IncomingDumper>>,
    pub response_consumer: Option<Arc<dyn ResponseConsumer>>,
    pub user_message_consumer: Option<Arc<dyn UserMessageConsumer>>,
}

impl ExchangeHooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_build_callback(mut self, callback: impl BuildMessageCallback + 'static) -> Self {
        self.build_callback = Some(Arc::new(callback));
        self
    }

    pub fn with_retry_callback(mut self, callback: impl RetryCallback + 'static) -> Self {
        self.retry_callback = Some(Arc::new(callback));
        self
    }

    pub fn with_outgoing_dumper(mut self, dumper: impl OutgoingDumper + 'static) -> Self {
        self.outgoing_dumper = Some(Arc::new(dumper));
        self
    }

    pub fn with_incoming_dumper(mut self, dumper: impl IncomingDumper + 'static) -> Self {
        self.incoming_dumper = Some(Arc::new(dumper));
        self
    }

    pub fn with_response_consumer(mut self, consumer: impl ResponseConsumer + 'static) -> Self {
        self.response_consumer = Some(Arc::new(consumer));
        self
    }

    pub fn with_user_message_consumer(
        mut self,
        consumer: impl UserMessageConsumer + 'static,
    ) -> Self {
        self.user_message_consumer = Some(Arc::new(consumer));
        self
    }
}

impl fmt::Debug for ExchangeHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExchangeHooks")
            .field("build_callback", &self.build_callback.is_some())
            .field("retry_callback", &self.retry_callback.is_some())
            .field("outgoing_dumper", &self.outgoing_dumper.is_some())
            .field("incoming_dumper", &self.incoming_dumper.is_some())
            .field("response_consumer", &self.response_consumer.is_some())
            .field("user_message_consumer", &self.user_message_consumer.is_some())
            .finish()
    }
}
