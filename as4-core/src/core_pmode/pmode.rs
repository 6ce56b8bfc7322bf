//! Processing modes: the agreed parameters for exchanges with one partner

use crate::core_exchange::retry::{Backoff, RetryPolicy};
use crate::core_message::envelope::{Party, SoapVersion};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Message exchange pattern binding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MepBinding {
    #[default]
    Push,
    Pull,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PModeSecurity {
    /// Sign outgoing messages
    pub sign: bool,
    /// Reject responses that carry no valid signature
    pub require_signed_response: bool,
}

impl Default for PModeSecurity {
    fn default() -> Self {
        Self {
            sign: true,
            require_signed_response: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PModeRetry {
    pub max_retries: u32,
    #[serde(with = "humantime_serde")]
    pub retry_interval: Duration,
    #[serde(default)]
    pub backoff: Backoff,
}

impl PModeRetry {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_retries, self.retry_interval).with_backoff(self.backoff.clone())
    }
}

/// Processing mode definition
///
/// Looked up by `id` and read-only while an exchange uses it.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PMode {
    pub id: String,
    #[serde(default)]
    pub agreement: Option<String>,
    #[serde(default)]
    pub initiator: Option<Party>,
    #[serde(default)]
    pub responder: Option<Party>,
    #[serde(default)]
    pub mep_binding: MepBinding,
    #[serde(default)]
    pub endpoint_url: Option<String>,
    #[serde(default)]
    pub service: Option<String>,
    #[serde(default)]
    pub service_type: Option<String>,
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub mpc: Option<String>,
    #[serde(default)]
    pub soap_version: Option<SoapVersion>,
    #[serde(default)]
    pub security: PModeSecurity,
    #[serde(default)]
    pub retry: Option<PModeRetry>,
}

impl PMode {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    pub fn retry_policy(&self) -> Option<RetryPolicy> {
        self.retry.as_ref().map(PModeRetry::policy)
    }
}
