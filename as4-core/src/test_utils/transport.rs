//! Scripted transport stub
//!
//! Each call to `send` consumes the next step of the script. When the script
//! runs out the fallback step repeats, so "always fail" needs one entry.

use crate::core_exchange::errors::TransportError;
use crate::core_exchange::transport::{IncomingResponse, OutgoingRequest, Transport};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Debug, Clone)]
pub enum ScriptStep {
    Respond(IncomingResponse),
    Fail(TransportError),
    /// Never answer; the attempt timeout ends the attempt
    Hang,
}

#[derive(Debug)]
pub struct ScriptedTransport {
    script: Mutex<VecDeque<ScriptStep>>,
    fallback: ScriptStep,
    requests: Mutex<Vec<OutgoingRequest>>,
    calls: AtomicUsize,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Default for ScriptedTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedTransport {
    /// Empty script answering every call with an empty HTTP 200
    pub fn new() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback: ScriptStep::Respond(IncomingResponse::empty()),
            requests: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn then(self, step: ScriptStep) -> Self {
        lock(&self.script).push_back(step);
        self
    }

    pub fn then_respond(self, response: IncomingResponse) -> Self {
        self.then(ScriptStep::Respond(response))
    }

    pub fn then_fail(self, error: TransportError) -> Self {
        self.then(ScriptStep::Fail(error))
    }

    pub fn then_hang(self) -> Self {
        self.then(ScriptStep::Hang)
    }

    /// Step repeated once the script is exhausted
    pub fn otherwise(mut self, step: ScriptStep) -> Self {
        self.fallback = step;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Requests seen so far, in order
    pub fn requests(&self) -> Vec<OutgoingRequest> {
        lock(&self.requests).clone()
    }

    fn next_step(&self) -> ScriptStep {
        lock(&self.script)
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone())
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, request: OutgoingRequest) -> Result<IncomingResponse, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        lock(&self.requests).push(request);

        match self.next_step() {
            ScriptStep::Respond(response) => Ok(response),
            ScriptStep::Fail(error) => Err(error),
            ScriptStep::Hang => std::future::pending().await,
        }
    }
}
