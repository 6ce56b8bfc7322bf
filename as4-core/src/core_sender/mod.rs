//! Message builders and the send pipeline
//!
//! ```ignore
//! use as4_core::core_sender::{As4Client, HasMessageParams, PullRequestBuilder};
//!
//! let result = client
//!     .send(
//!         PullRequestBuilder::new()
//!             .mpc("urn:mpc:default")
//!             .endpoint_url("https://partner.example/as4")
//!             .max_retries(2)
//!             .retry_interval_ms(500),
//!     )
//!     .await;
//! ```

pub mod builder;
pub mod client;
pub mod params;
pub mod pull_request;
pub mod result;
pub mod user_message;

pub use builder::{send_message, MessageKind};
pub use client::As4Client;
pub use params::{HasMessageParams, MessageParams};
pub use pull_request::PullRequestBuilder;
pub use result::ExchangeResult;
pub use user_message::{UserMessageBuilder, MIME_TYPE_PROPERTY};
