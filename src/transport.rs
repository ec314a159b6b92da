//! The request/response contract shared by real transports and the
//! instrumentation decorator.
//!
//! A request is configured with `open`, optionally given headers, then
//! started with `send`. Progress is reported through a small ready-state
//! machine; observers learn about transitions either by subscribing
//! (`add_ready_state_listener`) or through a single replaceable handler
//! (`replace_ready_state_handler`). Transports may support only the latter.

use bytes::Bytes;
use http::Method;
use std::sync::Arc;

use crate::error::TransportError;

// ─── Ready state ─────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ReadyState {
    Unsent,
    Opened,
    HeadersReceived,
    Loading,
    /// Terminal. Reached on success and on network failure alike.
    Done,
}

impl ReadyState {
    pub fn is_done(self) -> bool {
        self == ReadyState::Done
    }
}

// ─── Response ────────────────────────────────────────────────────

/// Immutable response value. Handed out as `Arc<Response>` so every reader
/// sees the very same allocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    status: u16,
    body: Bytes,
}

impl Response {
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// Completion without a usable response (connection refused, DNS, ...).
    pub fn network_error() -> Self {
        Self::new(0, Bytes::new())
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Body as UTF-8, if it is valid UTF-8.
    pub fn text(&self) -> Option<&str> {
        std::str::from_utf8(&self.body).ok()
    }
}

/// What a ready-state observer is told on every transition.
#[derive(Debug, Clone)]
pub struct ReadyStateEvent {
    pub ready_state: ReadyState,
    pub status: u16,
    /// Present once the request is `Done`.
    pub response: Option<Arc<Response>>,
}

pub type ReadyStateHandler = Arc<dyn Fn(&ReadyStateEvent) + Send + Sync>;

// ─── Request construction ────────────────────────────────────────

/// Fixed at construction time; cannot be toggled on a live request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RequestConfig {
    /// Skip timing instrumentation for this request entirely.
    pub no_intercept: bool,
}

impl RequestConfig {
    pub fn exempt() -> Self {
        Self { no_intercept: true }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub user: String,
    pub password: Option<String>,
}

/// Transport-specific extras accepted by `open`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenOptions {
    pub asynchronous: bool,
    pub credentials: Option<Credentials>,
}

impl Default for OpenOptions {
    fn default() -> Self {
        Self {
            asynchronous: true,
            credentials: None,
        }
    }
}

// ─── Traits ──────────────────────────────────────────────────────

pub trait Transport: Send + Sync + 'static {
    type Request: TransportRequest;

    fn create_request(&self, config: RequestConfig) -> Self::Request;
}

pub trait TransportRequest: Send {
    fn config(&self) -> RequestConfig;

    fn open(&mut self, method: Method, url: &str, options: OpenOptions) -> Result<(), TransportError>;

    fn set_request_header(&mut self, name: &str, value: &str) -> Result<(), TransportError>;

    /// Starts the request. Completion is reported asynchronously.
    fn send(&mut self, body: Option<Bytes>) -> Result<(), TransportError>;

    fn ready_state(&self) -> ReadyState;

    fn status(&self) -> u16;

    fn response(&self) -> Option<Arc<Response>>;

    fn response_text(&self) -> Option<String> {
        self.response()
            .and_then(|r| r.text().map(str::to_owned))
    }

    /// Subscribe to transitions. Transports without subscription support
    /// hand the listener back unchanged.
    fn add_ready_state_listener(&mut self, listener: ReadyStateHandler) -> Result<(), ReadyStateHandler> {
        Err(listener)
    }

    /// Install `handler` as the single transition handler, returning the
    /// one it replaces.
    fn replace_ready_state_handler(&mut self, handler: Option<ReadyStateHandler>) -> Option<ReadyStateHandler>;
}
