//! HTTP transport for SOAP messages

use super::errors::TransportError;
use crate::config::TransportSettings;
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::{CONTENT_TYPE, USER_AGENT};
use std::time::Duration;
use tracing::debug;
use url::Url;

#[derive(Debug, Clone)]
pub struct OutgoingRequest {
    pub endpoint: Url,
    pub content_type: String,
    pub body: Bytes,
    /// ebMS message id, for logging
    pub message_id: String,
}

#[derive(Debug, Clone)]
pub struct IncomingResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Bytes,
}

impl IncomingResponse {
    pub fn new(status: u16, content_type: Option<&str>, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            content_type: content_type.map(str::to_string),
            body: body.into(),
        }
    }

    /// An HTTP 200 with no body
    pub fn empty() -> Self {
        Self::new(200, None, Bytes::new())
    }
}

/// Moves one serialized message to the partner and returns its raw response
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: OutgoingRequest) -> Result<IncomingResponse, TransportError>;
}

/// `reqwest`-backed transport
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    user_agent: String,
    request_timeout: Duration,
}

impl HttpTransport {
    pub fn new(settings: &TransportSettings) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .connect_timeout(settings.connect_timeout)
            .timeout(settings.request_timeout)
            .build()
            .map_err(|e| TransportError::Io(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            user_agent: settings.user_agent.clone(),
            request_timeout: settings.request_timeout,
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: OutgoingRequest) -> Result<IncomingResponse, TransportError> {
        debug!(
            message_id = %request.message_id,
            endpoint = %request.endpoint,
            bytes = request.body.len(),
            "POST message"
        );

        let endpoint = request.endpoint.to_string();
        let response = self
            .client
            .post(request.endpoint)
            .header(CONTENT_TYPE, request.content_type)
            .header(USER_AGENT, &self.user_agent)
            .body(request.body)
            .send()
            .await
            .map_err(|e| self.map_error(&endpoint, e))?;

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let body = response
            .bytes()
            .await
            .map_err(|e| self.map_error(&endpoint, e))?;

        debug!(status, bytes = body.len(), "Received response");
        Ok(IncomingResponse {
            status,
            content_type,
            body,
        })
    }
}

impl HttpTransport {
    fn map_error(&self, endpoint: &str, err: reqwest::Error) -> TransportError {
        if err.is_timeout() {
            TransportError::Timeout(self.request_timeout)
        } else if err.is_connect() {
            TransportError::Connect {
                endpoint: endpoint.to_string(),
                reason: err.to_string(),
            }
        } else if err.is_builder() {
            TransportError::InvalidEndpoint(err.to_string())
        } else {
            TransportError::Io(err.to_string())
        }
    }
}

/// SOAP or SOAP-with-attachments media type
pub fn is_soap_content_type(content_type: &str) -> bool {
    let media = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    matches!(
        media.as_str(),
        "application/soap+xml" | "text/xml" | "multipart/related"
    )
}

/// Map an HTTP status to a transport failure
///
/// A 5xx carrying a SOAP body is passed through so the fault or ebMS error it
/// holds can be reported as a protocol error.
pub fn classify_status(status: u16, content_type: Option<&str>) -> Result<(), TransportError> {
    match status {
        200..=299 => Ok(()),
        401 | 403 => Err(TransportError::Unauthorized { status }),
        500..=599 if content_type.is_some_and(is_soap_content_type) => Ok(()),
        500..=599 => Err(TransportError::ServerError { status }),
        _ => Err(TransportError::Rejected { status }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert!(classify_status(200, None).is_ok());
        assert!(classify_status(202, None).is_ok());
        assert!(matches!(
            classify_status(401, None),
            Err(TransportError::Unauthorized { status: 401 })
        ));
        assert!(matches!(
            classify_status(503, Some("text/html")),
            Err(TransportError::ServerError { status: 503 })
        ));
        assert!(classify_status(500, Some("application/soap+xml; charset=UTF-8")).is_ok());
        assert!(matches!(
            classify_status(404, Some("text/xml")),
            Err(TransportError::Rejected { status: 404 })
        ));
    }

    #[test]
    fn test_soap_content_types() {
        assert!(is_soap_content_type("text/xml; charset=UTF-8"));
        assert!(is_soap_content_type("Multipart/Related; boundary=x"));
        assert!(!is_soap_content_type("application/json"));
    }

    #[test]
    fn test_http_transport_builds_from_settings() {
        assert!(HttpTransport::new(&TransportSettings::default()).is_ok());
    }
}
