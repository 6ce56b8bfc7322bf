//! Configuration management for the AS4 engine
//!
//! Settings load from a TOML file or from `AS4_*` environment variables on
//! top of the defaults, and are validated before use.

use crate::core_crypto::algorithms::{DigestAlgorithm, KeyReferenceType, SignatureAlgorithm};
use crate::core_crypto::signature::DEFAULT_TIMESTAMP_TTL;
use crate::core_exchange::resource::DEFAULT_SPOOL_THRESHOLD;
use crate::core_exchange::retry::{Backoff, RetryPolicy};
use crate::core_message::ids::DEFAULT_MESSAGE_ID_SUFFIX;
use crate::core_pmode::pmode::PMode;
use crate::logging::LogLevel;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

mod error;

pub use error::ConfigError;

/// Main engine configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct As4Config {
    /// Known MPC identifiers (the default MPC is always known)
    pub mpcs: Vec<String>,

    /// HTTP transport configuration
    pub transport: TransportSettings,

    /// Retry defaults, used when neither the send nor its PMode sets them
    pub retry: RetrySettings,

    /// Message construction and resource handling
    pub sender: SenderSettings,

    /// Default signing/verification material
    pub crypto: Option<CryptoSettings>,

    /// Logging configuration
    pub logging: LoggingConfig,

    /// PMode definitions
    pub pmodes: Vec<PMode>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportSettings {
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,

    /// Bound on one transmission attempt, response included
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,

    pub user_agent: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_retries: u32,

    #[serde(with = "humantime_serde")]
    pub interval: Duration,

    pub backoff: Backoff,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SenderSettings {
    /// Domain part of generated message ids
    pub message_id_suffix: String,

    /// Wire messages larger than this are spooled to a temporary file
    pub spool_threshold: usize,

    /// Lifetime of the security timestamp on signed messages
    #[serde(with = "humantime_serde")]
    pub timestamp_ttl: Duration,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CryptoSettings {
    pub keystore_path: PathBuf,
    pub keystore_password: String,
    pub key_alias: String,
    pub key_password: String,

    /// Separate truststore; the keystore's trusted certificates otherwise
    pub truststore_path: Option<PathBuf>,
    pub truststore_password: Option<String>,

    pub signature_algorithm: SignatureAlgorithm,
    pub digest_algorithm: DigestAlgorithm,
    pub key_reference_type: KeyReferenceType,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Enable JSON formatting
    pub json_format: bool,

    /// Include timestamps
    pub with_timestamp: bool,

    /// Include target module
    pub with_target: bool,
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(60),
            user_agent: concat!("as4-core/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: 1,
            interval: Duration::from_secs(10),
            backoff: Backoff::Fixed,
        }
    }
}

impl RetrySettings {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_retries, self.interval).with_backoff(self.backoff.clone())
    }
}

impl Default for SenderSettings {
    fn default() -> Self {
        Self {
            message_id_suffix: DEFAULT_MESSAGE_ID_SUFFIX.to_string(),
            spool_threshold: DEFAULT_SPOOL_THRESHOLD,
            timestamp_ttl: DEFAULT_TIMESTAMP_TTL,
        }
    }
}

impl Default for CryptoSettings {
    fn default() -> Self {
        Self {
            keystore_path: PathBuf::from("./keystore.as4ks"),
            keystore_password: String::new(),
            key_alias: String::new(),
            key_password: String::new(),
            truststore_path: None,
            truststore_password: None,
            signature_algorithm: SignatureAlgorithm::default(),
            digest_algorithm: DigestAlgorithm::default(),
            key_reference_type: KeyReferenceType::default(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
            with_timestamp: true,
            with_target: true,
        }
    }
}

fn parse_var<T>(name: &str, what: &'static str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(value) => value
            .parse()
            .map(Some)
            .map_err(|e: T::Err| ConfigError::InvalidEnv {
                var: name.to_string(),
                what,
                reason: e.to_string(),
            }),
        Err(_) => Ok(None),
    }
}

fn parse_millis(name: &str, what: &'static str) -> Result<Option<Duration>, ConfigError> {
    Ok(parse_var::<u64>(name, what)?.map(Duration::from_millis))
}

impl As4Config {
    /// Load configuration from environment variables
    ///
    /// Variables follow the pattern `AS4_<SECTION>_<KEY>`; durations are in
    /// milliseconds. Example: `AS4_RETRY_INTERVAL_MS=500`
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        // Transport
        if let Some(timeout) = parse_millis("AS4_TRANSPORT_CONNECT_TIMEOUT_MS", "connect timeout")? {
            config.transport.connect_timeout = timeout;
        }
        if let Some(timeout) = parse_millis("AS4_TRANSPORT_REQUEST_TIMEOUT_MS", "request timeout")? {
            config.transport.request_timeout = timeout;
        }
        if let Ok(agent) = env::var("AS4_TRANSPORT_USER_AGENT") {
            config.transport.user_agent = agent;
        }

        // Retry
        if let Some(retries) = parse_var("AS4_RETRY_MAX_RETRIES", "max retries")? {
            config.retry.max_retries = retries;
        }
        if let Some(interval) = parse_millis("AS4_RETRY_INTERVAL_MS", "retry interval")? {
            config.retry.interval = interval;
        }

        // Sender
        if let Ok(suffix) = env::var("AS4_SENDER_MESSAGE_ID_SUFFIX") {
            config.sender.message_id_suffix = suffix;
        }
        if let Some(threshold) = parse_var("AS4_SENDER_SPOOL_THRESHOLD", "spool threshold")? {
            config.sender.spool_threshold = threshold;
        }
        if let Some(ttl) = parse_millis("AS4_SENDER_TIMESTAMP_TTL_MS", "timestamp TTL")? {
            config.sender.timestamp_ttl = ttl;
        }

        // Crypto, enabled by the keystore path
        if let Ok(path) = env::var("AS4_CRYPTO_KEYSTORE_PATH") {
            config.crypto = Some(CryptoSettings {
                keystore_path: PathBuf::from(path),
                keystore_password: env::var("AS4_CRYPTO_KEYSTORE_PASSWORD").unwrap_or_default(),
                key_alias: env::var("AS4_CRYPTO_KEY_ALIAS").unwrap_or_default(),
                key_password: env::var("AS4_CRYPTO_KEY_PASSWORD").unwrap_or_default(),
                truststore_path: env::var("AS4_CRYPTO_TRUSTSTORE_PATH").ok().map(PathBuf::from),
                truststore_password: env::var("AS4_CRYPTO_TRUSTSTORE_PASSWORD").ok(),
                ..CryptoSettings::default()
            });
        }

        // Logging
        if let Ok(level) = env::var("AS4_LOG_LEVEL") {
            config.logging.level = level;
        }
        if let Some(json) = parse_var("AS4_LOG_JSON", "JSON flag")? {
            config.logging.json_format = json;
        }

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::FileRead {
            path: path.to_path_buf(),
            source,
        })?;

        let config: Self = toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.transport.request_timeout.is_zero() {
            return Err(ConfigError::ValidationFailed(
                "request_timeout must be greater than 0".to_string(),
            ));
        }

        if let Backoff::Exponential { multiplier, .. } = self.retry.backoff {
            if !(multiplier.is_finite() && multiplier >= 1.0) {
                return Err(ConfigError::ValidationFailed(format!(
                    "backoff multiplier must be at least 1, got {}",
                    multiplier
                )));
            }
        }

        if self.sender.message_id_suffix.trim().is_empty() {
            return Err(ConfigError::ValidationFailed(
                "message_id_suffix must not be empty".to_string(),
            ));
        }

        if let Some(crypto) = &self.crypto {
            if crypto.key_alias.is_empty() {
                return Err(ConfigError::ValidationFailed(
                    "crypto.key_alias must be set".to_string(),
                ));
            }
        }

        let mut ids = HashSet::new();
        for pmode in &self.pmodes {
            if pmode.id.trim().is_empty() {
                return Err(ConfigError::ValidationFailed(
                    "PMode id must not be empty".to_string(),
                ));
            }
            if !ids.insert(pmode.id.as_str()) {
                return Err(ConfigError::ValidationFailed(format!(
                    "Duplicate PMode id: {}",
                    pmode.id
                )));
            }
            if let Some(endpoint) = &pmode.endpoint_url {
                url::Url::parse(endpoint).map_err(|e| {
                    ConfigError::ValidationFailed(format!(
                        "PMode {} has invalid endpoint {}: {}",
                        pmode.id, endpoint, e
                    ))
                })?;
            }
        }

        self.logging.level.parse::<LogLevel>().map_err(|_| {
            ConfigError::ValidationFailed(format!("Invalid log level: {}", self.logging.level))
        })?;

        Ok(())
    }

    /// Save configuration to file
    pub fn save_to_file(&self, path: impl AsRef<std::path::Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let contents = toml::to_string_pretty(self)?;

        std::fs::write(path, contents).map_err(|source| ConfigError::FileWrite {
            path: path.to_path_buf(),
            source,
        })?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::LogConfig;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = As4Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.retry.policy().max_attempts(), 2);
        assert!(config.crypto.is_none());
    }

    #[test]
    fn test_config_validation() {
        let mut config = As4Config::default();
        config.transport.request_timeout = Duration::ZERO;
        assert!(config.validate().is_err());

        let mut config = As4Config::default();
        config.pmodes = vec![PMode::new("a"), PMode::new("a")];
        assert!(config.validate().is_err());

        let mut config = As4Config::default();
        let mut pmode = PMode::new("a");
        pmode.endpoint_url = Some("not a url".to_string());
        config.pmodes = vec![pmode];
        assert!(config.validate().is_err());

        let mut config = As4Config::default();
        config.retry.backoff = Backoff::Exponential {
            multiplier: 0.5,
            max_interval: Duration::from_secs(1),
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_log_level_validation() {
        let mut config = As4Config::default();

        config.logging.level = "invalid".to_string();
        assert!(config.validate().is_err());

        config.logging.level = "debug".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_log_level_accepts_what_logging_accepts() {
        let mut config = As4Config::default();
        for level in ["warning", "WARN", " Info ", "Error"] {
            config.logging.level = level.to_string();
            assert!(config.validate().is_ok(), "level {:?} rejected", level);
            assert!(LogConfig::try_from(&config.logging).is_ok());
        }
    }

    #[test]
    fn test_from_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("as4.toml");
        std::fs::write(
            &path,
            r#"
            mpcs = ["urn:mpc:default"]

            [transport]
            request_timeout = "5s"

            [retry]
            max_retries = 2
            interval = "500ms"

            [sender]
            message_id_suffix = "partner.example"

            [crypto]
            keystore_path = "/etc/as4/keystore.as4ks"
            key_alias = "sender"
            key_reference_type = "issuer-serial"

            [[pmodes]]
            id = "pm-pull"
            mep_binding = "pull"
            mpc = "urn:mpc:default"
            endpoint_url = "https://partner.example/as4"
            "#,
        )
        .unwrap();

        let config = As4Config::from_file(&path).unwrap();
        assert_eq!(config.transport.request_timeout, Duration::from_secs(5));
        assert_eq!(config.transport.connect_timeout, Duration::from_secs(10));
        assert_eq!(config.retry.interval, Duration::from_millis(500));
        assert_eq!(config.sender.message_id_suffix, "partner.example");
        let crypto = config.crypto.as_ref().unwrap();
        assert_eq!(crypto.key_reference_type, KeyReferenceType::IssuerSerial);
        assert_eq!(crypto.digest_algorithm, DigestAlgorithm::Sha256);
        assert_eq!(config.pmodes.len(), 1);
        assert_eq!(config.mpcs, vec!["urn:mpc:default".to_string()]);
    }

    #[test]
    fn test_save_and_reload() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("saved.toml");

        let mut config = As4Config::default();
        config.retry.max_retries = 4;
        config.pmodes.push(PMode::new("pm"));
        config.save_to_file(&path).unwrap();

        let reloaded = As4Config::from_file(&path).unwrap();
        assert_eq!(reloaded.retry.max_retries, 4);
        assert_eq!(reloaded.pmodes, config.pmodes);
    }

    #[test]
    fn test_from_file_missing() {
        assert!(matches!(
            As4Config::from_file("/nonexistent/as4.toml"),
            Err(ConfigError::FileRead { .. })
        ));
    }

    #[test]
    fn test_from_file_keeps_parse_cause() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.toml");
        std::fs::write(&path, "[retry
max_retries = 2").unwrap();

        match As4Config::from_file(&path) {
            Err(err @ ConfigError::Parse { .. }) => {
                assert!(std::error::Error::source(&err).is_some());
                assert!(err.to_string().contains("broken.toml"));
            }
            other => panic!("expected parse error, got {:?}", other),
        }
    }

    #[test]
    fn test_save_to_missing_directory_keeps_io_cause() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing").join("as4.toml");

        match As4Config::default().save_to_file(&path) {
            Err(ConfigError::FileWrite { path: failed, source }) => {
                assert_eq!(failed, path);
                assert_eq!(source.kind(), std::io::ErrorKind::NotFound);
            }
            other => panic!("expected write error, got {:?}", other),
        }
    }
}
