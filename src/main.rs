use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use request_stats::config::{InstrumentationConfig, ServerConfig};
use request_stats::http_transport::ReqwestTransport;
use request_stats::metrics::StatsCollector;
use request_stats::{instrument, server, telemetry, AppState};
use tracing::{error, info};

#[tokio::main]
async fn main() {
    telemetry::init("request-stats");

    if let Err(e) = run().await {
        error!(error = %e, "server exited with error");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = ServerConfig::from_env()?;

    // ── 1. Bind first so the client knows where to reach us ──────
    let listener = tokio::net::TcpListener::bind(config.addr).await?;
    let local = listener.local_addr()?;
    let base_url = reqwest::Url::parse(&format!("http://127.0.0.1:{}/", local.port()))?;

    // ── 2. Instrumented client for the load generator ────────────
    let client = reqwest::Client::builder().build()?;
    let transport = instrument(
        ReqwestTransport::new(client).with_base_url(base_url),
        &InstrumentationConfig::default(),
    );

    // ── 3. Build shared state ────────────────────────────────────
    let state = Arc::new(AppState {
        metrics: Arc::new(StatsCollector::new()),
        transport,
        load_running: Arc::new(AtomicBool::new(false)),
        load_handle: tokio::sync::Mutex::new(None),
    });

    let app = server::create_router(state);

    info!(addr = %local, "collection endpoint → POST /clientAjaxStats");
    info!("metrics JSON → GET /api/metrics, SSE → GET /api/metrics/stream");
    info!("load control → POST /api/load/start | /api/load/stop");

    axum::serve(listener, app).await?;
    Ok(())
}
