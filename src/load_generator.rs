use http::Method;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::Rng;
use rand::SeedableRng;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::handlers::load::LoadConfig;
use crate::http_transport::ReqwestTransport;
use crate::interceptor::InstrumentedTransport;
use crate::transport::{
    OpenOptions, ReadyStateEvent, ReadyStateHandler, RequestConfig, Transport, TransportRequest,
};

const DEMO_ENDPOINTS: &[&str] = &["users", "orders", "search", "profile"];

/// Give up waiting on a single request after this long.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

// ─── Public entry point ──────────────────────────────────────────

/// Spawns `concurrency` Tokio tasks that call the demo endpoints through
/// the instrumented transport until the deadline or until `running` is
/// cleared.
pub async fn run(
    running: Arc<AtomicBool>,
    transport: InstrumentedTransport<ReqwestTransport>,
    config: LoadConfig,
) {
    let deadline = Instant::now() + Duration::from_secs(config.duration_secs);

    let mut handles = Vec::with_capacity(config.concurrency as usize);

    for worker_id in 0..config.concurrency {
        let running = running.clone();
        let transport = transport.clone();
        let max_delay_ms = config.max_delay_ms;

        handles.push(tokio::spawn(async move {
            worker(worker_id, running, transport, deadline, max_delay_ms).await;
        }));
    }

    for h in handles {
        let _ = h.await;
    }

    running.store(false, Ordering::SeqCst);
}

// ─── Worker loop ─────────────────────────────────────────────────

async fn worker(
    id: u32,
    running: Arc<AtomicBool>,
    transport: InstrumentedTransport<ReqwestTransport>,
    deadline: Instant,
    max_delay_ms: u64,
) {
    // Each worker gets its own deterministic RNG seeded uniquely.
    let mut rng = StdRng::seed_from_u64(1000 + id as u64);
    // Odd workers behave like callers that install a single handler
    let use_handler = id % 2 == 1;

    while running.load(Ordering::Relaxed) && Instant::now() < deadline {
        let name = DEMO_ENDPOINTS[rng.gen_range(0..DEMO_ENDPOINTS.len())];
        let delay = rng.gen_range(0..=max_delay_ms);
        let url = format!("/api/demo/{name}?delay_ms={delay}");

        match call(&transport, &url, use_handler).await {
            Some(status) => debug!(worker = id, %url, status, "demo call complete"),
            None => {
                warn!(worker = id, %url, "demo call did not complete");
                // Back off so a dead server doesn't spin the loop
                tokio::time::sleep(Duration::from_millis(200)).await;
            }
        }
    }
}

/// Issues one GET and waits for its `Done` transition. Returns the status.
async fn call(
    transport: &InstrumentedTransport<ReqwestTransport>,
    url: &str,
    use_handler: bool,
) -> Option<u16> {
    let (tx, rx) = oneshot::channel();
    let tx = Mutex::new(Some(tx));
    let on_change: ReadyStateHandler = Arc::new(move |event: &ReadyStateEvent| {
        if event.ready_state.is_done() {
            if let Some(tx) = tx.lock().take() {
                let _ = tx.send(event.status);
            }
        }
    });

    let mut request = transport.create_request(RequestConfig::default());
    if use_handler {
        request.replace_ready_state_handler(Some(on_change));
    } else if let Err(on_change) = request.add_ready_state_listener(on_change) {
        request.replace_ready_state_handler(Some(on_change));
    }

    if let Err(e) = request
        .open(Method::GET, url, OpenOptions::default())
        .and_then(|()| request.send(None))
    {
        warn!(%url, error = %e, "demo call rejected");
        return None;
    }

    tokio::time::timeout(REQUEST_TIMEOUT, rx).await.ok()?.ok()
}
