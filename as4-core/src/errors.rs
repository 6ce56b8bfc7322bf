//! Top-level error type of the exchange engine

use crate::core_crypto::errors::SecurityError;
use crate::core_exchange::errors::{ProtocolError, TransportError};
use crate::core_pmode::resolver::LookupError;
use std::error::Error as StdError;
use thiserror::Error;

pub type As4Result<T> = Result<T, As4Error>;

/// A send could not start because its parameters are incomplete or unresolvable
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Missing required fields: {}", .0.join(", "))]
    MissingFields(Vec<&'static str>),

    #[error(transparent)]
    Lookup(#[from] LookupError),

    #[error("Invalid value for {field}: {reason}")]
    InvalidField { field: &'static str, reason: String },
}

#[derive(Debug, Error)]
pub enum As4Error {
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("Security failure: {0}")]
    Security(#[from] SecurityError),

    #[error("Transport failed after {attempts} attempt(s): {source}")]
    Transport {
        attempts: u32,
        #[source]
        source: TransportError,
    },

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Exchange cancelled after {attempts} attempt(s)")]
    Cancelled { attempts: u32 },

    #[error("Unexpected failure: {0}")]
    Wrapped(#[source] Box<dyn StdError + Send + Sync + 'static>),
}

impl As4Error {
    /// Wrap a foreign error, keeping it as the cause
    pub fn wrap<E>(err: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        As4Error::Wrapped(Box::new(err))
    }

    /// Short label for metrics and logs
    pub fn kind(&self) -> &'static str {
        match self {
            As4Error::Validation(_) => "validation",
            As4Error::Security(_) => "security",
            As4Error::Transport { .. } => "transport",
            As4Error::Protocol(_) => "protocol",
            As4Error::Cancelled { .. } => "cancelled",
            As4Error::Wrapped(_) => "wrapped",
        }
    }

    /// Transmission attempts made before the failure, where known
    pub fn attempts(&self) -> Option<u32> {
        match self {
            As4Error::Transport { attempts, .. } | As4Error::Cancelled { attempts } => {
                Some(*attempts)
            }
            _ => None,
        }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, As4Error::Validation(_))
    }
}

impl From<LookupError> for As4Error {
    fn from(err: LookupError) -> Self {
        As4Error::Validation(ValidationError::Lookup(err))
    }
}

impl From<std::io::Error> for As4Error {
    fn from(err: std::io::Error) -> Self {
        As4Error::wrap(err)
    }
}

/// An `As4Error` carried inside an `anyhow::Error` is recovered, not re-wrapped
impl From<anyhow::Error> for As4Error {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast::<As4Error>() {
            Ok(as4) => as4,
            Err(other) => As4Error::Wrapped(other.into()),
        }
    }
}
