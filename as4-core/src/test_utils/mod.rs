//! Test utilities for exchange tests
//!
//! Fixtures for parties and partner responses, a scripted transport stub and
//! hooks that record their calls. Used by unit tests and by the integration
//! tests under `tests/`.

pub mod fixtures;
pub mod hooks;
pub mod transport;

pub use fixtures::*;
pub use hooks::HookRecorder;
pub use transport::{ScriptStep, ScriptedTransport};
