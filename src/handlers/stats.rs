use axum::{extract::State, http::StatusCode, Json};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::sample::StatsBatch;
use crate::AppState;

// ─── POST /clientAjaxStats ───────────────────────────────────────

/// Collection endpoint: aggregates one flushed batch.
///
/// Senders never retry, so a bad entry is skipped and counted rather than
/// failing the whole batch.
pub async fn ingest_stats(State(state): State<Arc<AppState>>, Json(batch): Json<StatsBatch>) -> StatusCode {
    if batch.is_empty() {
        debug!("empty stats batch ignored");
        return StatusCode::NO_CONTENT;
    }

    let rejected = state.metrics.record_batch(&batch);
    if rejected > 0 {
        warn!(rejected, samples = batch.stats.len(), "stats entries without url skipped");
    } else {
        debug!(samples = batch.stats.len(), "stats batch received");
    }
    StatusCode::NO_CONTENT
}
