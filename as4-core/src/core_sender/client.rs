//! Long-lived sending context shared by concurrent sends

use super::builder::{send_message, MessageKind};
use super::result::ExchangeResult;
use crate::config::{As4Config, ConfigError, RetrySettings, TransportSettings};
use crate::core_crypto::config::CryptoConfig;
use crate::core_crypto::signature::SignatureEngine;
use crate::core_exchange::resource::{ResourceScope, ResourceTracker, DEFAULT_SPOOL_THRESHOLD};
use crate::core_exchange::retry::{CancellationFlag, RetryPolicy};
use crate::core_exchange::transport::{HttpTransport, Transport};
use crate::core_message::ids::DEFAULT_MESSAGE_ID_SUFFIX;
use crate::core_pmode::resolver::{MpcRegistry, MpcResolver, PModeRegistry, PModeResolver};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Read-only collaborators of every exchange
///
/// `As4Client` is `Send + Sync`; share it by reference or `Arc` between tasks.
#[derive(Clone)]
pub struct As4Client {
    transport: Arc<dyn Transport>,
    pmodes: Arc<dyn PModeResolver>,
    mpcs: Arc<dyn MpcResolver>,
    engine: SignatureEngine,
    crypto: Option<Arc<CryptoConfig>>,
    retry_defaults: RetryPolicy,
    attempt_timeout: Duration,
    spool_threshold: usize,
    message_id_suffix: String,
    resource_tracker: ResourceTracker,
    cancellation: Option<CancellationFlag>,
}

impl As4Client {
    /// Client over `transport` with empty registries and no crypto
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            pmodes: Arc::new(PModeRegistry::new()),
            mpcs: Arc::new(MpcRegistry::new()),
            engine: SignatureEngine::default(),
            crypto: None,
            retry_defaults: RetrySettings::default().policy(),
            attempt_timeout: TransportSettings::default().request_timeout,
            spool_threshold: DEFAULT_SPOOL_THRESHOLD,
            message_id_suffix: DEFAULT_MESSAGE_ID_SUFFIX.to_string(),
            resource_tracker: ResourceTracker::new(),
            cancellation: None,
        }
    }

    /// Build an HTTP client from validated configuration
    ///
    /// Opens the configured keystore files, so this fails on a wrong password.
    pub fn from_config(config: &As4Config) -> Result<Self, ConfigError> {
        config.validate()?;

        let transport = HttpTransport::new(&config.transport)?;
        let pmodes = PModeRegistry::from_pmodes(config.pmodes.iter().cloned())?;
        let mpcs = MpcRegistry::from_ids(config.mpcs.iter().cloned())?;
        let crypto = config
            .crypto
            .as_ref()
            .map(CryptoConfig::from_settings)
            .transpose()?;

        info!(
            pmodes = config.pmodes.len(),
            mpcs = config.mpcs.len(),
            signing = crypto.is_some(),
            "AS4 client configured"
        );

        let mut client = Self::new(Arc::new(transport))
            .with_pmode_resolver(Arc::new(pmodes))
            .with_mpc_resolver(Arc::new(mpcs))
            .with_signature_engine(SignatureEngine::new(config.sender.timestamp_ttl))
            .with_retry_defaults(config.retry.policy())
            .with_attempt_timeout(config.transport.request_timeout)
            .with_spool_threshold(config.sender.spool_threshold)
            .with_message_id_suffix(config.sender.message_id_suffix.clone());
        if let Some(crypto) = crypto {
            client = client.with_crypto(Arc::new(crypto));
        }
        Ok(client)
    }

    pub fn with_pmode_resolver(mut self, resolver: Arc<dyn PModeResolver>) -> Self {
        self.pmodes = resolver;
        self
    }

    pub fn with_mpc_resolver(mut self, resolver: Arc<dyn MpcResolver>) -> Self {
        self.mpcs = resolver;
        self
    }

    pub fn with_signature_engine(mut self, engine: SignatureEngine) -> Self {
        self.engine = engine;
        self
    }

    /// Default crypto configuration for sends that do not set their own
    pub fn with_crypto(mut self, crypto: Arc<CryptoConfig>) -> Self {
        self.crypto = Some(crypto);
        self
    }

    /// Used when neither the send nor its PMode sets retry values
    pub fn with_retry_defaults(mut self, policy: RetryPolicy) -> Self {
        self.retry_defaults = policy;
        self
    }

    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    pub fn with_spool_threshold(mut self, threshold: usize) -> Self {
        self.spool_threshold = threshold;
        self
    }

    pub fn with_message_id_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.message_id_suffix = suffix.into();
        self
    }

    pub fn with_resource_tracker(mut self, tracker: ResourceTracker) -> Self {
        self.resource_tracker = tracker;
        self
    }

    /// Stop exchanges at their next retry boundary once `flag` is cancelled
    pub fn with_cancellation(mut self, flag: CancellationFlag) -> Self {
        self.cancellation = Some(flag);
        self
    }

    pub fn transport(&self) -> &dyn Transport {
        self.transport.as_ref()
    }

    pub fn pmode_resolver(&self) -> &dyn PModeResolver {
        self.pmodes.as_ref()
    }

    pub fn mpc_resolver(&self) -> &dyn MpcResolver {
        self.mpcs.as_ref()
    }

    pub fn signature_engine(&self) -> &SignatureEngine {
        &self.engine
    }

    pub fn crypto(&self) -> Option<&Arc<CryptoConfig>> {
        self.crypto.as_ref()
    }

    pub fn retry_defaults(&self) -> &RetryPolicy {
        &self.retry_defaults
    }

    pub fn attempt_timeout(&self) -> Duration {
        self.attempt_timeout
    }

    pub fn message_id_suffix(&self) -> &str {
        &self.message_id_suffix
    }

    pub fn resource_tracker(&self) -> &ResourceTracker {
        &self.resource_tracker
    }

    pub fn cancellation(&self) -> Option<&CancellationFlag> {
        self.cancellation.as_ref()
    }

    /// Fresh scope for one send
    pub fn open_scope(&self) -> ResourceScope {
        ResourceScope::new(self.resource_tracker.clone(), self.spool_threshold)
    }

    /// Shorthand for `send_message(builder, self)`
    pub async fn send<K: MessageKind>(&self, builder: K) -> ExchangeResult {
        send_message(builder, self).await
    }
}

impl fmt::Debug for As4Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("As4Client")
            .field("engine", &self.engine)
            .field("crypto", &self.crypto.is_some())
            .field("retry_defaults", &self.retry_defaults)
            .field("attempt_timeout", &self.attempt_timeout)
            .field("spool_threshold", &self.spool_threshold)
            .field("message_id_suffix", &self.message_id_suffix)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CryptoSettings;
    use crate::core_pmode::pmode::PMode;
    use crate::test_utils::ScriptedTransport;

    fn assert_send_sync<T: Send + Sync>() {}

    #[test]
    fn test_client_is_shareable() {
        assert_send_sync::<As4Client>();
    }

    #[test]
    fn test_from_default_config() {
        let client = As4Client::from_config(&As4Config::default()).unwrap();
        assert!(client.crypto().is_none());
        assert_eq!(client.retry_defaults().max_retries, 1);
        assert_eq!(client.message_id_suffix(), DEFAULT_MESSAGE_ID_SUFFIX);
        assert!(client.mpc_resolver().resolve_mpc(crate::core_message::DEFAULT_MPC).is_ok());
    }

    #[test]
    fn test_from_config_registers_pmodes_and_mpcs() {
        let mut pmode = PMode::new("pm-pull");
        pmode.endpoint_url = Some("https://partner.example/as4".to_string());
        let config = As4Config {
            mpcs: vec!["urn:mpc:default".to_string()],
            pmodes: vec![pmode],
            ..Default::default()
        };

        let client = As4Client::from_config(&config).unwrap();
        assert!(client.pmode_resolver().resolve_pmode("pm-pull").is_ok());
        assert!(client.mpc_resolver().resolve_mpc("urn:mpc:default").is_ok());
        assert!(client.mpc_resolver().resolve_mpc("urn:mpc:unknown").is_err());
    }

    #[test]
    fn test_from_config_rejects_invalid_config() {
        let mut config = As4Config::default();
        config.sender.message_id_suffix = String::new();
        assert!(matches!(
            As4Client::from_config(&config),
            Err(ConfigError::ValidationFailed(_))
        ));
    }

    #[test]
    fn test_from_config_reports_missing_keystore() {
        let dir = tempfile::TempDir::new().unwrap();
        let keystore_path = dir.path().join("absent.as4ks");
        let config = As4Config {
            crypto: Some(CryptoSettings {
                keystore_path: keystore_path.clone(),
                key_alias: "sender".to_string(),
                ..CryptoSettings::default()
            }),
            ..Default::default()
        };

        match As4Client::from_config(&config) {
            Err(ConfigError::Keystore { path, .. }) => assert_eq!(path, keystore_path),
            other => panic!("expected keystore error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_scopes_share_the_tracker() {
        let tracker = ResourceTracker::new();
        let client = As4Client::new(Arc::new(ScriptedTransport::new()))
            .with_resource_tracker(tracker.clone());
        {
            let mut scope = client.open_scope();
            scope.retain(bytes::Bytes::from_static(b"payload")).unwrap();
            assert_eq!(tracker.outstanding(), 1);
        }
        assert_eq!(tracker.acquired(), 1);
        assert_eq!(tracker.outstanding(), 0);
    }
}
