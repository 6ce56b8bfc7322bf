//! Exchange coordination: transport, retries, hooks and scoped resources

pub mod coordinator;
pub mod errors;
pub mod hooks;
pub mod resource;
pub mod retry;
pub mod transport;

pub use coordinator::{
    ExchangeCoordinator, ExchangeRequest, ExchangeResponse, ExchangeState, ExpectedResponse,
};
pub use errors::{ProtocolError, TransportError};
pub use hooks::{
    BuildMessageCallback, ExchangeHooks, IncomingDumper, OutgoingDumper, ResponseConsumer,
    RetryCallback, UserMessageConsumer,
};
pub use resource::{ResourceHandle, ResourceScope, ResourceTracker, DEFAULT_SPOOL_THRESHOLD};
pub use retry::{Backoff, CancellationFlag, RetryPolicy};
pub use transport::{HttpTransport, IncomingResponse, OutgoingRequest, Transport};
