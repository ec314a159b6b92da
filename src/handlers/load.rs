use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::info;

use crate::AppState;

use super::AppError;

// ─── Request / response types ────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct LoadConfig {
    /// Number of concurrent Tokio tasks issuing instrumented requests
    #[serde(default = "default_concurrency")]
    pub concurrency: u32,

    /// How long the run lasts (seconds)
    #[serde(default = "default_duration")]
    pub duration_secs: u64,

    /// Upper bound of the random server-side delay per request (ms)
    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,
}

fn default_concurrency() -> u32 {
    4
}
fn default_duration() -> u64 {
    30
}
fn default_max_delay() -> u64 {
    250
}

#[derive(Debug, Serialize)]
pub struct LoadStatus {
    pub running: bool,
    pub message: String,
}

// ─── POST /api/load/start ────────────────────────────────────────

pub async fn start_load(
    State(state): State<Arc<AppState>>,
    Json(config): Json<LoadConfig>,
) -> Result<Json<LoadStatus>, AppError> {
    if state.load_running.load(Ordering::SeqCst) {
        return Err(AppError::AlreadyRunning);
    }

    if config.concurrency == 0 || config.concurrency > 200 {
        return Err(AppError::BadRequest(
            "concurrency must be between 1 and 200".into(),
        ));
    }
    if config.duration_secs == 0 || config.duration_secs > 300 {
        return Err(AppError::BadRequest(
            "duration_secs must be between 1 and 300".into(),
        ));
    }
    if config.max_delay_ms > 5_000 {
        return Err(AppError::BadRequest(
            "max_delay_ms must be at most 5000".into(),
        ));
    }

    state.metrics.reset();

    // Flip the flag BEFORE spawning so workers see it immediately
    state.load_running.store(true, Ordering::SeqCst);

    let msg = format!(
        "Started: {} workers × {}s, up to {}ms per request",
        config.concurrency, config.duration_secs, config.max_delay_ms,
    );
    info!(
        concurrency = config.concurrency,
        duration_secs = config.duration_secs,
        "load generator started"
    );

    let running = state.load_running.clone();
    let transport = state.transport.clone();
    let handle = tokio::spawn(async move {
        crate::load_generator::run(running, transport, config).await;
    });

    let mut guard = state.load_handle.lock().await;
    *guard = Some(handle);

    Ok(Json(LoadStatus {
        running: true,
        message: msg,
    }))
}

// ─── POST /api/load/stop ─────────────────────────────────────────

pub async fn stop_load(State(state): State<Arc<AppState>>) -> Json<LoadStatus> {
    if !state.load_running.load(Ordering::SeqCst) {
        return Json(LoadStatus {
            running: false,
            message: "No load run in progress".into(),
        });
    }

    state.load_running.store(false, Ordering::SeqCst);

    let mut guard = state.load_handle.lock().await;
    if let Some(handle) = guard.take() {
        // The task may have already finished
        let _ = handle.await;
    }

    // Don't wait out the debounce window for the tail of the run
    state.transport.buffer().flush_now();

    Json(LoadStatus {
        running: false,
        message: "Load run stopped".into(),
    })
}

// ─── GET /api/load/status ────────────────────────────────────────

pub async fn load_status(State(state): State<Arc<AppState>>) -> Json<LoadStatus> {
    let running = state.load_running.load(Ordering::SeqCst);
    Json(LoadStatus {
        running,
        message: if running {
            "Load run in progress".into()
        } else {
            "Idle".into()
        },
    })
}
