//! Envelope codec errors

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("XML error: {0}")]
    Xml(String),

    #[error("Malformed envelope: {0}")]
    Malformed(String),

    #[error("Missing element: {0}")]
    MissingElement(String),

    #[error("Unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("MIME error: {0}")]
    Mime(String),

    #[error("SOAP fault: {0}")]
    SoapFault(String),
}
