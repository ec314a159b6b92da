use bytes::Bytes;
use http::Method;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::buffer::SampleBuffer;
use crate::error::TransportError;
use crate::sample::Sample;
use crate::transport::{
    OpenOptions, ReadyState, ReadyStateEvent, ReadyStateHandler, RequestConfig, Response, Transport,
    TransportRequest,
};

// ─── Transport decorator ─────────────────────────────────────────

/// Wraps a transport so every request it creates is timed.
///
/// Cheap to clone; clones share the wrapped transport and the buffer.
pub struct InstrumentedTransport<T> {
    inner: Arc<T>,
    buffer: Arc<SampleBuffer>,
}

impl<T> Clone for InstrumentedTransport<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            buffer: self.buffer.clone(),
        }
    }
}

impl<T: Transport> InstrumentedTransport<T> {
    pub fn from_parts(inner: Arc<T>, buffer: Arc<SampleBuffer>) -> Self {
        Self { inner, buffer }
    }

    pub fn buffer(&self) -> &Arc<SampleBuffer> {
        &self.buffer
    }
}

impl<T: Transport> Transport for InstrumentedTransport<T> {
    type Request = InstrumentedRequest<T::Request>;

    fn create_request(&self, config: RequestConfig) -> Self::Request {
        InstrumentedRequest {
            inner: self.inner.create_request(config),
            state: InterceptedRequestState {
                id: Uuid::new_v4(),
                method: None,
                url: None,
                no_intercept: config.no_intercept,
                observed: false,
            },
            buffer: self.buffer.clone(),
        }
    }
}

// ─── Per-request state ───────────────────────────────────────────

#[derive(Debug, Clone)]
struct InterceptedRequestState {
    id: Uuid,
    method: Option<Method>,
    url: Option<String>,
    no_intercept: bool,
    /// A completion observer has already been attached.
    observed: bool,
}

/// A request created by [`InstrumentedTransport`].
///
/// Every call is forwarded to the wrapped request with the same arguments
/// and its result returned untouched.
pub struct InstrumentedRequest<R> {
    inner: R,
    state: InterceptedRequestState,
    buffer: Arc<SampleBuffer>,
}

/// An observer installed for one `send`, kept so a rejected send can undo it.
struct Attachment {
    observer: Arc<CompletionObserver>,
    /// Set when we chained in front of the single handler; holds the
    /// handler that was there before.
    replaced: Option<Option<ReadyStateHandler>>,
}

impl<R: TransportRequest> InstrumentedRequest<R> {
    fn attach_observer(&mut self) -> Attachment {
        let observer = Arc::new(CompletionObserver {
            request_id: self.state.id,
            url: self.state.url.clone().unwrap_or_default(),
            started: Instant::now(),
            recorded: AtomicBool::new(false),
            buffer: self.buffer.clone(),
        });
        let handle = observer.clone();
        let ours: ReadyStateHandler = Arc::new(move |event: &ReadyStateEvent| handle.on_ready_state_change(event));

        let replaced = match self.inner.add_ready_state_listener(ours) {
            Ok(()) => None,
            Err(ours) => {
                let previous = self.inner.replace_ready_state_handler(None);
                self.inner.replace_ready_state_handler(Some(chain(ours, previous.clone())));
                Some(previous)
            }
        };
        self.state.observed = true;
        Attachment { observer, replaced }
    }

    /// The wrapped send refused the request: silence the observer and put
    /// the application's handler back so the next send is timed afresh.
    fn detach_observer(&mut self, attachment: Attachment) {
        attachment.observer.cancel();
        if let Some(previous) = attachment.replaced {
            self.inner.replace_ready_state_handler(previous);
        }
        self.state.observed = false;
    }
}

/// Our handler first, then whatever the application had installed.
fn chain(ours: ReadyStateHandler, previous: Option<ReadyStateHandler>) -> ReadyStateHandler {
    match previous {
        None => ours,
        Some(previous) => Arc::new(move |event: &ReadyStateEvent| {
            ours(event);
            previous(event);
        }),
    }
}

impl<R: TransportRequest> TransportRequest for InstrumentedRequest<R> {
    fn config(&self) -> RequestConfig {
        self.inner.config()
    }

    fn open(&mut self, method: Method, url: &str, options: OpenOptions) -> Result<(), TransportError> {
        debug!(request = %self.state.id, %method, url, "request opened");
        self.state.url = Some(url.to_owned());
        self.state.method = Some(method.clone());
        self.inner.open(method, url, options)
    }

    fn set_request_header(&mut self, name: &str, value: &str) -> Result<(), TransportError> {
        self.inner.set_request_header(name, value)
    }

    fn send(&mut self, body: Option<Bytes>) -> Result<(), TransportError> {
        if self.state.no_intercept || self.state.observed {
            return self.inner.send(body);
        }

        debug!(
            request = %self.state.id,
            method = ?self.state.method,
            body_len = body.as_ref().map_or(0, Bytes::len),
            "request sending"
        );
        let attachment = self.attach_observer();
        let result = self.inner.send(body);
        if let Err(e) = &result {
            debug!(request = %self.state.id, error = %e, "send rejected, observer detached");
            self.detach_observer(attachment);
        }
        result
    }

    fn ready_state(&self) -> ReadyState {
        self.inner.ready_state()
    }

    fn status(&self) -> u16 {
        self.inner.status()
    }

    fn response(&self) -> Option<Arc<Response>> {
        self.inner.response()
    }

    fn response_text(&self) -> Option<String> {
        self.inner.response_text()
    }

    fn add_ready_state_listener(&mut self, listener: ReadyStateHandler) -> Result<(), ReadyStateHandler> {
        self.inner.add_ready_state_listener(listener)
    }

    fn replace_ready_state_handler(&mut self, handler: Option<ReadyStateHandler>) -> Option<ReadyStateHandler> {
        self.inner.replace_ready_state_handler(handler)
    }
}

// ─── Completion observer ─────────────────────────────────────────

struct CompletionObserver {
    request_id: Uuid,
    url: String,
    started: Instant,
    recorded: AtomicBool,
    buffer: Arc<SampleBuffer>,
}

impl CompletionObserver {
    fn cancel(&self) {
        self.recorded.store(true, Ordering::Release);
    }

    /// Reads the event only; the response the caller sees is the same `Arc`.
    fn on_ready_state_change(&self, event: &ReadyStateEvent) {
        if !event.ready_state.is_done() {
            return;
        }
        if self.recorded.swap(true, Ordering::AcqRel) {
            return;
        }

        let duration_ms = self.started.elapsed().as_millis() as u64;
        debug!(
            request = %self.request_id,
            url = %self.url,
            status = event.status,
            response_len = event.response.as_ref().map_or(0, |r| r.body().len()),
            duration_ms,
            "request complete"
        );

        if let Err(e) = self.buffer.record(Sample::new(self.url.clone(), duration_ms)) {
            warn!(request = %self.request_id, error = %e, "timing sample dropped");
        }
    }
}
