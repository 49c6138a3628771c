use axum::extract::State;
use axum::http::header::CONTENT_TYPE;
use axum::response::IntoResponse;
use axum::Json;
use prometheus::TEXT_FORMAT;

use crate::errors::ApiError;
use crate::handler_utils::run_blocking;
use crate::models::{LiveResponse, ReadyChecks, ReadyResponse};
use crate::state::AppState;

pub(crate) async fn live(State(state): State<AppState>) -> Json<LiveResponse> {
    Json(LiveResponse {
        status: "live",
        uptime_ms: state.started_at.elapsed().as_millis() as u64,
    })
}

/// The engine is opened before the listener binds, so a serving process is
/// always ready.
pub(crate) async fn ready(State(state): State<AppState>) -> Json<ReadyResponse> {
    Json(ReadyResponse {
        status: "ready",
        uptime_ms: state.started_at.elapsed().as_millis() as u64,
        collections: state.engine.registry().len(),
        checks: ReadyChecks {
            engine_loaded: true,
            persistence_enabled: state.engine.is_persistent(),
        },
    })
}

pub(crate) async fn metrics(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ApiError> {
    let body = run_blocking(move || {
        state.metrics.render(&state.engine).map_err(|error| {
            tracing::error!(%error, "failed to render metrics");
            ApiError::internal("failed to render metrics")
        })
    })
    .await?;
    Ok(([(CONTENT_TYPE, TEXT_FORMAT)], body))
}
