//! Parameters shared by every outgoing message kind

use crate::core_crypto::config::CryptoConfig;
use crate::core_exchange::hooks::{
    BuildMessageCallback, ExchangeHooks, IncomingDumper, OutgoingDumper, ResponseConsumer,
    RetryCallback, UserMessageConsumer,
};
use crate::core_exchange::retry::RetryPolicy;
use crate::core_message::envelope::SoapVersion;
use crate::core_pmode::pmode::PMode;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Settings common to Pull Requests and User Messages
///
/// `None` means unset. Negative retry values are kept as given and ignored
/// when the exchange is prepared.
#[derive(Debug, Clone, Default)]
pub struct MessageParams {
    pub message_id: Option<String>,
    pub endpoint_url: Option<String>,
    /// Defaults to the time the message is built
    pub sending_date_time: Option<DateTime<Utc>>,
    pub max_retries: Option<i64>,
    pub retry_interval_ms: Option<i64>,
    pub soap_version: Option<SoapVersion>,
    pub pmode_id: Option<String>,
    /// Overrides the client's crypto configuration
    pub crypto: Option<Arc<CryptoConfig>>,
    pub hooks: ExchangeHooks,
}

impl MessageParams {
    /// Explicit message id, if one was set and is not blank; sent as given
    pub fn explicit_message_id(&self) -> Option<&str> {
        self.message_id
            .as_deref()
            .filter(|id| !id.trim().is_empty())
    }

    pub fn has_endpoint(&self) -> bool {
        self.endpoint_url
            .as_deref()
            .is_some_and(|url| !url.trim().is_empty())
    }

    /// Effective retry policy: explicit values, then the PMode, then `defaults`
    pub fn resolve_retry(&self, pmode: Option<&PMode>, defaults: &RetryPolicy) -> RetryPolicy {
        let base = pmode
            .and_then(PMode::retry_policy)
            .unwrap_or_else(|| defaults.clone());

        let max_retries = match self.max_retries {
            Some(n) if n >= 0 => u32::try_from(n).unwrap_or(u32::MAX),
            Some(n) => {
                debug!(max_retries = n, "Ignoring negative retry count");
                base.max_retries
            }
            None => base.max_retries,
        };
        let interval = match self.retry_interval_ms {
            Some(ms) if ms >= 0 => Duration::from_millis(ms.unsigned_abs()),
            Some(ms) => {
                debug!(retry_interval_ms = ms, "Ignoring negative retry interval");
                base.interval
            }
            None => base.interval,
        };

        RetryPolicy {
            max_retries,
            interval,
            backoff: base.backoff,
        }
    }
}

/// Chained setters over a builder's `MessageParams`
pub trait HasMessageParams: Sized {
    fn params(&self) -> &MessageParams;

    fn params_mut(&mut self) -> &mut MessageParams;

    fn message_id(mut self, message_id: impl Into<String>) -> Self {
        self.params_mut().message_id = Some(message_id.into());
        self
    }

    fn endpoint_url(mut self, endpoint_url: impl Into<String>) -> Self {
        self.params_mut().endpoint_url = Some(endpoint_url.into());
        self
    }

    fn sending_date_time(mut self, at: DateTime<Utc>) -> Self {
        self.params_mut().sending_date_time = Some(at);
        self
    }

    /// Negative counts fall through to the PMode default
    fn max_retries(mut self, max_retries: i64) -> Self {
        self.params_mut().max_retries = Some(max_retries);
        self
    }

    fn retry_interval_ms(mut self, interval_ms: i64) -> Self {
        self.params_mut().retry_interval_ms = Some(interval_ms);
        self
    }

    fn retry_interval(self, interval: Duration) -> Self {
        let ms = i64::try_from(interval.as_millis()).unwrap_or(i64::MAX);
        self.retry_interval_ms(ms)
    }

    fn soap_version(mut self, version: SoapVersion) -> Self {
        self.params_mut().soap_version = Some(version);
        self
    }

    fn pmode_id(mut self, pmode_id: impl Into<String>) -> Self {
        self.params_mut().pmode_id = Some(pmode_id.into());
        self
    }

    fn crypto(mut self, crypto: Arc<CryptoConfig>) -> Self {
        self.params_mut().crypto = Some(crypto);
        self
    }

    fn hooks(mut self, hooks: ExchangeHooks) -> Self {
        self.params_mut().hooks = hooks;
        self
    }

    fn build_callback(mut self, callback: impl BuildMessageCallback + 'static) -> Self {
        self.params_mut().hooks.build_callback = Some(Arc::new(callback));
        self
    }

    fn retry_callback(mut self, callback: impl RetryCallback + 'static) -> Self {
        self.params_mut().hooks.retry_callback = Some(Arc::new(callback));
        self
    }

    fn outgoing_dumper(mut self, dumper: impl OutgoingDumper + 'static) -> Self {
        self.params_mut().hooks.outgoing_dumper = Some(Arc::new(dumper));
        self
    }

    fn incoming_dumper(mut self, dumper: impl IncomingDumper + 'static) -> Self {
        self.params_mut().hooks.incoming_dumper = Some(Arc::new(dumper));
        self
    }

    fn response_consumer(mut self, consumer: impl ResponseConsumer + 'static) -> Self {
        self.params_mut().hooks.response_consumer = Some(Arc::new(consumer));
        self
    }

    fn user_message_consumer(mut self, consumer: impl UserMessageConsumer + 'static) -> Self {
        self.params_mut().hooks.user_message_consumer = Some(Arc::new(consumer));
        self
    }
}
