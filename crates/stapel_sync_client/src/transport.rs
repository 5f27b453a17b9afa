//! Transport abstraction for the sync exchange.

use crate::error::{SyncError, SyncResult};
use parking_lot::Mutex;
use stapel_sync_protocol::{SyncRequest, SyncResponse};
use std::collections::VecDeque;

/// The authenticated request/response channel to the sync server.
///
/// The whole contract is one exchange: send a [`SyncRequest`], receive a
/// [`SyncResponse`], or fail. Bearer-token handling, HTTP plumbing and
/// wire encoding live behind implementations of this trait.
pub trait SyncTransport: Send + Sync {
    /// Performs one sync exchange.
    fn send(&self, request: &SyncRequest) -> SyncResult<SyncResponse>;
}

/// A scripted transport for tests.
///
/// Responses are consumed in FIFO order; every request sent is captured
/// for inspection.
#[derive(Debug, Default)]
pub struct MockTransport {
    responses: Mutex<VecDeque<Result<SyncResponse, String>>>,
    requests: Mutex<Vec<SyncRequest>>,
}

impl MockTransport {
    /// Creates a transport with no scripted responses.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Scripts a successful exchange.
    pub fn push_response(&self, response: SyncResponse) {
        self.responses.lock().push_back(Ok(response));
    }

    /// Scripts a retryable transport failure.
    pub fn push_failure(&self, message: impl Into<String>) {
        self.responses.lock().push_back(Err(message.into()));
    }

    /// All requests sent so far.
    pub fn requests(&self) -> Vec<SyncRequest> {
        self.requests.lock().clone()
    }

    /// The most recent request, if any.
    pub fn last_request(&self) -> Option<SyncRequest> {
        self.requests.lock().last().cloned()
    }
}

impl SyncTransport for MockTransport {
    fn send(&self, request: &SyncRequest) -> SyncResult<SyncResponse> {
        self.requests.lock().push(request.clone());
        match self.responses.lock().pop_front() {
            Some(Ok(response)) => Ok(response),
            Some(Err(message)) => Err(SyncError::transport_retryable(message)),
            None => Err(SyncError::Protocol("no scripted response".into())),
        }
    }
}
