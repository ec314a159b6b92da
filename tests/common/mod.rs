//! Scripted in-memory transport. Nothing happens on the "network" until a
//! test drives a request through its ready states by hand.

#![allow(dead_code)]

use bytes::Bytes;
use http::Method;
use parking_lot::Mutex;
use std::sync::Arc;

use request_stats::{
    OpenOptions, ReadyState, ReadyStateEvent, ReadyStateHandler, RequestConfig, Response, Transport,
    TransportError, TransportRequest,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notify {
    /// Supports `add_ready_state_listener`.
    Subscribe,
    /// Only a single replaceable handler.
    SingleHandler,
}

#[derive(Clone)]
pub struct MockTransport {
    style: Notify,
    requests: Arc<Mutex<Vec<Arc<Mutex<MockState>>>>>,
    send_error: Option<TransportError>,
    exempt_send_error: Option<TransportError>,
}

pub struct MockState {
    pub config: RequestConfig,
    pub method: Option<Method>,
    pub url: Option<String>,
    pub headers: Vec<(String, String)>,
    pub body: Option<Bytes>,
    pub sends: usize,
    pub ready_state: ReadyState,
    pub response: Option<Arc<Response>>,
    listeners: Vec<ReadyStateHandler>,
    handler: Option<ReadyStateHandler>,
}

impl MockTransport {
    pub fn new(style: Notify) -> Self {
        Self {
            style,
            requests: Arc::new(Mutex::new(Vec::new())),
            send_error: None,
            exempt_send_error: None,
        }
    }

    /// Every `send` fails with `err`.
    pub fn failing_send(mut self, err: TransportError) -> Self {
        self.send_error = Some(err);
        self
    }

    /// `send` fails with `err` for requests created with `no_intercept`.
    pub fn failing_exempt_send(mut self, err: TransportError) -> Self {
        self.exempt_send_error = Some(err);
        self
    }

    pub fn handles(&self) -> Vec<MockHandle> {
        self.requests
            .lock()
            .iter()
            .cloned()
            .map(MockHandle)
            .collect()
    }

    pub fn handle(&self, index: usize) -> MockHandle {
        MockHandle(self.requests.lock()[index].clone())
    }

    /// Requests created with `no_intercept`, i.e. flushes.
    pub fn exempt_handles(&self) -> Vec<MockHandle> {
        self.handles()
            .into_iter()
            .filter(|h| h.0.lock().config.no_intercept)
            .collect()
    }
}

impl Transport for MockTransport {
    type Request = MockRequest;

    fn create_request(&self, config: RequestConfig) -> MockRequest {
        let state = Arc::new(Mutex::new(MockState {
            config,
            method: None,
            url: None,
            headers: Vec::new(),
            body: None,
            sends: 0,
            ready_state: ReadyState::Unsent,
            response: None,
            listeners: Vec::new(),
            handler: None,
        }));
        self.requests.lock().push(state.clone());

        let send_error = if config.no_intercept {
            self.exempt_send_error.clone().or_else(|| self.send_error.clone())
        } else {
            self.send_error.clone()
        };
        MockRequest {
            style: self.style,
            state,
            send_error,
        }
    }
}

pub struct MockRequest {
    style: Notify,
    state: Arc<Mutex<MockState>>,
    send_error: Option<TransportError>,
}

impl TransportRequest for MockRequest {
    fn config(&self) -> RequestConfig {
        self.state.lock().config
    }

    fn open(&mut self, method: Method, url: &str, options: OpenOptions) -> Result<(), TransportError> {
        if !options.asynchronous {
            return Err(TransportError::SynchronousUnsupported);
        }
        {
            let mut state = self.state.lock();
            state.method = Some(method);
            state.url = Some(url.to_owned());
        }
        MockHandle(self.state.clone()).transition(ReadyState::Opened);
        Ok(())
    }

    fn set_request_header(&mut self, name: &str, value: &str) -> Result<(), TransportError> {
        let mut state = self.state.lock();
        if state.ready_state != ReadyState::Opened {
            return Err(TransportError::InvalidState(state.ready_state));
        }
        state.headers.push((name.to_owned(), value.to_owned()));
        Ok(())
    }

    fn send(&mut self, body: Option<Bytes>) -> Result<(), TransportError> {
        if let Some(err) = &self.send_error {
            return Err(err.clone());
        }
        let mut state = self.state.lock();
        if state.ready_state != ReadyState::Opened || state.sends > 0 {
            return Err(TransportError::InvalidState(state.ready_state));
        }
        state.sends += 1;
        state.body = body;
        Ok(())
    }

    fn ready_state(&self) -> ReadyState {
        self.state.lock().ready_state
    }

    fn status(&self) -> u16 {
        self.state.lock().response.as_ref().map_or(0, |r| r.status())
    }

    fn response(&self) -> Option<Arc<Response>> {
        self.state.lock().response.clone()
    }

    fn add_ready_state_listener(&mut self, listener: ReadyStateHandler) -> Result<(), ReadyStateHandler> {
        match self.style {
            Notify::Subscribe => {
                self.state.lock().listeners.push(listener);
                Ok(())
            }
            Notify::SingleHandler => Err(listener),
        }
    }

    fn replace_ready_state_handler(&mut self, handler: Option<ReadyStateHandler>) -> Option<ReadyStateHandler> {
        std::mem::replace(&mut self.state.lock().handler, handler)
    }
}

/// Test-side view of a request created by [`MockTransport`].
#[derive(Clone)]
pub struct MockHandle(Arc<Mutex<MockState>>);

impl MockHandle {
    pub fn transition(&self, ready_state: ReadyState) {
        self.dispatch(ready_state, None);
    }

    /// Moves to `Done` with `response`; returns the shared value.
    pub fn complete(&self, response: Response) -> Arc<Response> {
        let response = Arc::new(response);
        self.dispatch(ReadyState::Done, Some(response.clone()));
        response
    }

    /// Walks the intermediate states, then completes.
    pub fn finish(&self, response: Response) -> Arc<Response> {
        self.transition(ReadyState::HeadersReceived);
        self.transition(ReadyState::Loading);
        self.complete(response)
    }

    fn dispatch(&self, ready_state: ReadyState, response: Option<Arc<Response>>) {
        let (event, handlers) = {
            let mut state = self.0.lock();
            state.ready_state = ready_state;
            if response.is_some() {
                state.response = response.clone();
            }
            let mut handlers = state.listeners.clone();
            handlers.extend(state.handler.clone());
            let event = ReadyStateEvent {
                ready_state,
                status: state.response.as_ref().map_or(0, |r| r.status()),
                response,
            };
            (event, handlers)
        };
        for handler in handlers {
            handler(&event);
        }
    }

    pub fn url(&self) -> Option<String> {
        self.0.lock().url.clone()
    }

    pub fn method(&self) -> Option<Method> {
        self.0.lock().method.clone()
    }

    pub fn headers(&self) -> Vec<(String, String)> {
        self.0.lock().headers.clone()
    }

    pub fn body(&self) -> Option<Bytes> {
        self.0.lock().body.clone()
    }

    pub fn sends(&self) -> usize {
        self.0.lock().sends
    }

    pub fn config(&self) -> RequestConfig {
        self.0.lock().config
    }

    pub fn observer_count(&self) -> usize {
        let state = self.0.lock();
        state.listeners.len() + usize::from(state.handler.is_some())
    }
}
