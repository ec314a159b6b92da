use bytes::Bytes;
use http::Method;
use std::sync::Arc;
use tracing::{info, warn};

use crate::buffer::SampleBuffer;
use crate::error::InstrumentationError;
use crate::interceptor::InstrumentedTransport;
use crate::sample::{Sample, StatsBatch};
use crate::transport::{OpenOptions, RequestConfig, Transport, TransportRequest};

/// Delivers a drained batch somewhere.
///
/// `buffer` is the buffer the batch came from; implementations that send
/// through the instrumented transport need it to build exempt requests.
pub trait Flush: Send + Sync {
    fn flush(&self, buffer: &Arc<SampleBuffer>, batch: Vec<Sample>);
}

/// POSTs batches to the collection endpoint through the same transport the
/// application uses, with every flush request marked `no_intercept`.
///
/// Fire-and-forget: failures are logged and the batch is dropped.
pub struct Flusher<T> {
    transport: Arc<T>,
    collect_url: String,
}

impl<T: Transport> Flusher<T> {
    pub fn new(transport: Arc<T>, collect_url: impl Into<String>) -> Self {
        Self {
            transport,
            collect_url: collect_url.into(),
        }
    }

    fn send_batch(&self, buffer: &Arc<SampleBuffer>, batch: Vec<Sample>) -> Result<(), InstrumentationError> {
        let body = serde_json::to_vec(&StatsBatch::new(batch))?;

        let transport = InstrumentedTransport::from_parts(self.transport.clone(), buffer.clone());
        let mut request = transport.create_request(RequestConfig::exempt());
        request.open(Method::POST, &self.collect_url, OpenOptions::default())?;
        request.set_request_header("Content-type", "application/json")?;
        request.send(Some(Bytes::from(body)))?;
        Ok(())
    }
}

impl<T: Transport> Flush for Flusher<T> {
    fn flush(&self, buffer: &Arc<SampleBuffer>, batch: Vec<Sample>) {
        let count = batch.len();
        match self.send_batch(buffer, batch) {
            Ok(()) => info!(samples = count, url = %self.collect_url, "stats flushed"),
            Err(e) => warn!(samples = count, error = %e, "stats flush dropped"),
        }
    }
}
