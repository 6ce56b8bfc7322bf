use crate::core_exchange::coordinator::ExchangeResponse;
use crate::errors::{As4Error, As4Result};

/// Outcome of `send_message`
#[must_use]
#[derive(Debug)]
pub enum ExchangeResult {
    Success(ExchangeResponse),
    Failure(As4Error),
}

impl ExchangeResult {
    pub fn is_success(&self) -> bool {
        matches!(self, ExchangeResult::Success(_))
    }

    pub fn is_failure(&self) -> bool {
        !self.is_success()
    }

    pub fn response(&self) -> Option<&ExchangeResponse> {
        match self {
            ExchangeResult::Success(response) => Some(response),
            ExchangeResult::Failure(_) => None,
        }
    }

    pub fn error(&self) -> Option<&As4Error> {
        match self {
            ExchangeResult::Success(_) => None,
            ExchangeResult::Failure(e) => Some(e),
        }
    }

    pub fn into_result(self) -> As4Result<ExchangeResponse> {
        self.into()
    }
}

impl From<As4Result<ExchangeResponse>> for ExchangeResult {
    fn from(result: As4Result<ExchangeResponse>) -> Self {
        match result {
            Ok(response) => ExchangeResult::Success(response),
            Err(e) => ExchangeResult::Failure(e),
        }
    }
}

impl From<ExchangeResult> for As4Result<ExchangeResponse> {
    fn from(result: ExchangeResult) -> Self {
        match result {
            ExchangeResult::Success(response) => Ok(response),
            ExchangeResult::Failure(e) => Err(e),
        }
    }
}
