//! Errors raised while loading configuration or assembling a client from it

use crate::core_crypto::keystore::KeystoreError;
use crate::core_exchange::errors::TransportError;
use crate::core_pmode::resolver::LookupError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Cannot read configuration file {}", path.display())]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot write configuration file {}", path.display())]
    FileWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed configuration in {}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Cannot serialize configuration")]
    Serialize(#[from] toml::ser::Error),

    #[error("Environment variable {var} holds an invalid {what}: {reason}")]
    InvalidEnv {
        var: String,
        what: &'static str,
        reason: String,
    },

    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),

    #[error("Cannot open keystore {}", path.display())]
    Keystore {
        path: PathBuf,
        #[source]
        source: KeystoreError,
    },

    #[error("Cannot build HTTP transport")]
    Transport(#[from] TransportError),

    #[error("Cannot register configured PModes or MPCs")]
    Registry(#[from] LookupError),
}
