use axum::{
    extract::{Path, Query},
    Json,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::AppError;

/// Upper bound on the artificial delay a caller may ask for.
const MAX_DELAY_MS: u64 = 10_000;

#[derive(Debug, Deserialize)]
pub struct DemoParams {
    #[serde(default)]
    pub delay_ms: u64,
}

#[derive(Debug, Serialize)]
pub struct DemoResponse {
    pub name: String,
    pub delay_ms: u64,
}

// ─── GET /api/demo/:name ─────────────────────────────────────────

/// Deliberately slow endpoint for the load generator to hit.
pub async fn get_demo(
    Path(name): Path<String>,
    Query(params): Query<DemoParams>,
) -> Result<Json<DemoResponse>, AppError> {
    if params.delay_ms > MAX_DELAY_MS {
        return Err(AppError::BadRequest(format!(
            "delay_ms must be at most {MAX_DELAY_MS}"
        )));
    }

    tokio::time::sleep(Duration::from_millis(params.delay_ms)).await;

    Ok(Json(DemoResponse {
        name,
        delay_ms: params.delay_ms,
    }))
}
