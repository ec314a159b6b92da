//! Transparent timing for outgoing requests.
//!
//! [`instrument`] wraps a [`Transport`] so that every request it creates is
//! timed from `send` to completion. Samples are buffered and, one debounce
//! window after the first sample of a burst, POSTed as a single JSON batch
//! to a collection endpoint through the same transport. The flush request
//! is created with `no_intercept` and is never timed itself.
//!
//! The remaining modules make up the companion collection server that
//! aggregates those batches.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

pub mod buffer;
pub mod config;
pub mod error;
pub mod flusher;
pub mod handlers;
pub mod http_transport;
pub mod interceptor;
pub mod load_generator;
pub mod metrics;
pub mod middleware;
pub mod sample;
pub mod server;
pub mod telemetry;
pub mod transport;

pub use buffer::SampleBuffer;
pub use config::InstrumentationConfig;
pub use error::{InstrumentationError, TransportError};
pub use flusher::{Flush, Flusher};
pub use interceptor::{InstrumentedRequest, InstrumentedTransport};
pub use sample::{Sample, StatsBatch};
pub use transport::{
    OpenOptions, ReadyState, ReadyStateEvent, ReadyStateHandler, RequestConfig, Response, Transport,
    TransportRequest,
};

/// Wrap `transport` with timing instrumentation.
///
/// Builds the sample buffer and the flusher; the returned decorator is used
/// in place of the original transport.
pub fn instrument<T: Transport>(transport: T, config: &InstrumentationConfig) -> InstrumentedTransport<T> {
    let transport = Arc::new(transport);
    let flusher = Arc::new(Flusher::new(transport.clone(), config.collect_url.clone()));
    let buffer = SampleBuffer::new(config.debounce(), flusher);
    InstrumentedTransport::from_parts(transport, buffer)
}

/// Shared state of the collection server, available to every handler via
/// `State<Arc<AppState>>`.
pub struct AppState {
    /// Aggregates every batch POSTed to the collection endpoint.
    pub metrics: Arc<metrics::StatsCollector>,

    /// Instrumented client used by the load generator.
    pub transport: InstrumentedTransport<http_transport::ReqwestTransport>,

    /// Flag checked by every load-generator worker on each iteration.
    pub load_running: Arc<AtomicBool>,

    /// Handle to the spawned load-generator task so we can await clean shutdown.
    pub load_handle: tokio::sync::Mutex<Option<tokio::task::JoinHandle<()>>>,
}
