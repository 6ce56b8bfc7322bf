//! Transport and protocol failures of an exchange

use crate::core_message::envelope::ErrorSignal;
use crate::core_message::errors::CodecError;
use std::time::Duration;
use thiserror::Error;

/// Failure to move bytes to the partner and back
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("Connection to {endpoint} failed: {reason}")]
    Connect { endpoint: String, reason: String },

    #[error("Attempt timed out after {0:?}")]
    Timeout(Duration),

    #[error("Server error: HTTP {status}")]
    ServerError { status: u16 },

    #[error("Authentication rejected: HTTP {status}")]
    Unauthorized { status: u16 },

    #[error("Request rejected: HTTP {status}")]
    Rejected { status: u16 },

    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("Transport I/O error: {0}")]
    Io(String),
}

impl TransportError {
    /// Connection failures, timeouts and transient server errors
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            TransportError::Connect { .. }
                | TransportError::Timeout(_)
                | TransportError::ServerError { .. }
        )
    }
}

/// An invalid or unexpected response
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Malformed response: {0}")]
    Malformed(#[from] CodecError),

    #[error("Partner returned a SOAP fault: {0}")]
    SoapFault(String),

    #[error("Partner returned ebMS error {code} ({severity}): {description}")]
    ErrorSignal {
        code: String,
        severity: &'static str,
        description: String,
        ref_to_message_id: Option<String>,
    },

    #[error("Expected {expected} in response, got {actual}")]
    UnexpectedResponse {
        expected: &'static str,
        actual: &'static str,
    },

    #[error("Response does not correlate: expected {expected}, got {actual}")]
    Correlation { expected: String, actual: String },

    #[error("Unexpected HTTP status {0}")]
    UnexpectedStatus(u16),
}

impl ProtocolError {
    pub fn from_codec(err: CodecError) -> Self {
        match err {
            CodecError::SoapFault(reason) => ProtocolError::SoapFault(reason),
            other => ProtocolError::Malformed(other),
        }
    }

    /// First error of the signal, or a placeholder for an empty signal
    pub fn from_signal(signal: &ErrorSignal) -> Self {
        match signal.errors.first() {
            Some(error) => ProtocolError::ErrorSignal {
                code: error.error_code.clone(),
                severity: error.severity.as_str(),
                description: error
                    .description
                    .clone()
                    .or_else(|| error.short_description.clone())
                    .unwrap_or_default(),
                ref_to_message_id: error
                    .ref_to_message_in_error
                    .clone()
                    .or_else(|| signal.message_info.ref_to_message_id.clone()),
            },
            None => ProtocolError::ErrorSignal {
                code: "unknown".to_string(),
                severity: "failure",
                description: "error signal without errors".to_string(),
                ref_to_message_id: signal.message_info.ref_to_message_id.clone(),
            },
        }
    }
}
