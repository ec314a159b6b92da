use bytes::Bytes;
use http::header::{HeaderMap, HeaderName, HeaderValue};
use http::Method;
use parking_lot::Mutex;
use reqwest::{Client, Url};
use std::sync::Arc;
use tokio::runtime::Handle;
use tracing::debug;

use crate::error::TransportError;
use crate::transport::{
    Credentials, OpenOptions, ReadyState, ReadyStateEvent, ReadyStateHandler, RequestConfig, Response, Transport,
    TransportRequest,
};

/// Asynchronous HTTP transport on top of a shared `reqwest::Client`.
///
/// Relative urls are resolved against `base_url`; without one, only
/// absolute urls can be opened.
#[derive(Clone)]
pub struct ReqwestTransport {
    client: Client,
    base_url: Option<Url>,
}

impl ReqwestTransport {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            base_url: None,
        }
    }

    pub fn with_base_url(mut self, base_url: Url) -> Self {
        self.base_url = Some(base_url);
        self
    }

    fn resolve(&self, url: &str) -> Result<Url, TransportError> {
        let parsed = match &self.base_url {
            Some(base) => base.join(url),
            None => Url::parse(url),
        };
        parsed.map_err(|e| TransportError::InvalidUrl {
            url: url.to_owned(),
            reason: e.to_string(),
        })
    }
}

impl Transport for ReqwestTransport {
    type Request = ReqwestRequest;

    fn create_request(&self, config: RequestConfig) -> Self::Request {
        ReqwestRequest {
            transport: self.clone(),
            config,
            target: None,
            sent: false,
            shared: Arc::new(Mutex::new(Shared {
                ready_state: ReadyState::Unsent,
                response: None,
                listeners: Vec::new(),
                handler: None,
            })),
        }
    }
}

// ─── Request ─────────────────────────────────────────────────────

struct Target {
    method: Method,
    url: Url,
    headers: HeaderMap,
    credentials: Option<Credentials>,
}

/// State touched by the network task as well as the caller.
struct Shared {
    ready_state: ReadyState,
    response: Option<Arc<Response>>,
    listeners: Vec<ReadyStateHandler>,
    handler: Option<ReadyStateHandler>,
}

pub struct ReqwestRequest {
    transport: ReqwestTransport,
    config: RequestConfig,
    target: Option<Target>,
    sent: bool,
    shared: Arc<Mutex<Shared>>,
}

/// Moves to `state` and notifies subscribers, then the single handler.
/// Handlers run without the lock held.
fn transition(shared: &Mutex<Shared>, state: ReadyState, response: Option<Arc<Response>>) {
    let (event, handlers) = {
        let mut guard = shared.lock();
        guard.ready_state = state;
        if response.is_some() {
            guard.response = response.clone();
        }
        let mut handlers = guard.listeners.clone();
        handlers.extend(guard.handler.clone());
        let event = ReadyStateEvent {
            ready_state: state,
            status: guard.response.as_ref().map_or(0, |r| r.status()),
            response,
        };
        (event, handlers)
    };

    for handler in handlers {
        handler(&event);
    }
}

impl TransportRequest for ReqwestRequest {
    fn config(&self) -> RequestConfig {
        self.config
    }

    fn open(&mut self, method: Method, url: &str, options: OpenOptions) -> Result<(), TransportError> {
        if !options.asynchronous {
            return Err(TransportError::SynchronousUnsupported);
        }
        if self.sent && !self.ready_state().is_done() {
            return Err(TransportError::InvalidState(self.ready_state()));
        }

        let url = self.transport.resolve(url)?;
        self.target = Some(Target {
            method,
            url,
            headers: HeaderMap::new(),
            credentials: options.credentials,
        });
        self.sent = false;
        self.shared.lock().response = None;
        transition(&self.shared, ReadyState::Opened, None);
        Ok(())
    }

    fn set_request_header(&mut self, name: &str, value: &str) -> Result<(), TransportError> {
        let state = self.ready_state();
        let target = match self.target.as_mut() {
            Some(target) if !self.sent => target,
            _ => return Err(TransportError::InvalidState(state)),
        };

        let header_err = |reason: String| TransportError::Header {
            name: name.to_owned(),
            reason,
        };
        let name_parsed = HeaderName::from_bytes(name.as_bytes()).map_err(|e| header_err(e.to_string()))?;
        let value_parsed = HeaderValue::from_str(value).map_err(|e| header_err(e.to_string()))?;
        target.headers.append(name_parsed, value_parsed);
        Ok(())
    }

    fn send(&mut self, body: Option<Bytes>) -> Result<(), TransportError> {
        if self.sent {
            return Err(TransportError::InvalidState(self.ready_state()));
        }
        let target = self
            .target
            .as_ref()
            .ok_or(TransportError::InvalidState(ReadyState::Unsent))?;
        let runtime = Handle::try_current().map_err(|e| TransportError::Network(e.to_string()))?;

        let mut builder = self
            .transport
            .client
            .request(target.method.clone(), target.url.clone())
            .headers(target.headers.clone());
        if let Some(creds) = &target.credentials {
            builder = builder.basic_auth(&creds.user, creds.password.as_ref());
        }
        if let Some(body) = body {
            builder = builder.body(body);
        }

        self.sent = true;
        let shared = self.shared.clone();
        let url = target.url.clone();
        runtime.spawn(async move {
            let response = match builder.send().await {
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    transition(&shared, ReadyState::HeadersReceived, None);
                    transition(&shared, ReadyState::Loading, None);
                    match resp.bytes().await {
                        Ok(body) => Response::new(status, body),
                        Err(e) => {
                            debug!(%url, error = %e, "response body failed");
                            Response::network_error()
                        }
                    }
                }
                Err(e) => {
                    debug!(%url, error = %e, "request failed");
                    Response::network_error()
                }
            };
            transition(&shared, ReadyState::Done, Some(Arc::new(response)));
        });
        Ok(())
    }

    fn ready_state(&self) -> ReadyState {
        self.shared.lock().ready_state
    }

    fn status(&self) -> u16 {
        self.shared
            .lock()
            .response
            .as_ref()
            .map_or(0, |r| r.status())
    }

    fn response(&self) -> Option<Arc<Response>> {
        self.shared.lock().response.clone()
    }

    fn add_ready_state_listener(&mut self, listener: ReadyStateHandler) -> Result<(), ReadyStateHandler> {
        self.shared.lock().listeners.push(listener);
        Ok(())
    }

    fn replace_ready_state_handler(&mut self, handler: Option<ReadyStateHandler>) -> Option<ReadyStateHandler> {
        std::mem::replace(&mut self.shared.lock().handler, handler)
    }
}
