//! AS4 / ebMS3 message exchange engine
//!
//! Builds Pull Requests and User Messages, signs them with WS-Security,
//! transmits them over HTTP with bounded retries and verifies and correlates
//! the partner's response.

pub mod config;
pub mod core_crypto;
pub mod core_exchange;
pub mod core_message;
pub mod core_pmode;
pub mod core_sender;
pub mod errors;
pub mod logging;
pub mod metrics;
pub mod test_utils;

pub use config::As4Config;
pub use core_sender::{
    send_message, As4Client, ExchangeResult, HasMessageParams, MessageKind, PullRequestBuilder,
    UserMessageBuilder,
};
pub use errors::{As4Error, As4Result, ValidationError};
pub use logging::{init_logging, LogLevel};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_library_exports() {
        let _ = LogLevel::Info;
        let _ = PullRequestBuilder::new();
    }
}
