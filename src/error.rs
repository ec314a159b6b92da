use thiserror::Error;

use crate::transport::ReadyState;

/// Errors raised by a transport implementation.
///
/// The interceptor never produces or rewrites these: whatever the wrapped
/// transport returns is handed back to the caller as-is.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("operation not allowed in ready state {0:?}")]
    InvalidState(ReadyState),

    #[error("invalid url '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("synchronous requests are not supported by this transport")]
    SynchronousUnsupported,

    #[error("invalid header '{name}': {reason}")]
    Header { name: String, reason: String },

    #[error("network failure: {0}")]
    Network(String),
}

/// Failures inside the instrumentation layer itself.
///
/// These stay inside the crate: they are logged and dropped, and never
/// surface at an application call site.
#[derive(Debug, Error)]
pub enum InstrumentationError {
    #[error("no tokio runtime available to schedule the flush timer")]
    NoRuntime,

    #[error("failed to encode stats payload: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("flush request rejected by transport: {0}")]
    Transport(#[from] TransportError),
}
