use std::time::Duration;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::Json;
use quarry_core::{SearchRequest, SearchResponse};

use crate::errors::{map_json_rejection, ApiError};
use crate::handler_utils::{run_blocking, validate_dimension, validate_limit};
use crate::models::SearchRequestBody;
use crate::state::AppState;

pub(crate) async fn search(
    Path(name): Path<String>,
    State(state): State<AppState>,
    payload: Result<Json<SearchRequestBody>, JsonRejection>,
) -> Result<Json<SearchResponse>, ApiError> {
    let Json(payload) = payload.map_err(map_json_rejection)?;
    validate_limit(payload.limit, &state.config)?;
    validate_dimension(payload.vector.len(), &state.config)?;
    if payload.ef == Some(0) {
        return Err(ApiError::invalid_argument("ef must be > 0"));
    }

    let request = build_request(payload, state.config.request_timeout_ms);
    let response = run_blocking(move || {
        let response = state
            .engine
            .search(&name, &request)
            .map_err(ApiError::from)?;
        state
            .metrics
            .record_search(response.mode, response.timed_out);
        Ok(response)
    })
    .await?;
    Ok(Json(response))
}

/// The search budget never outlives the request timeout.
fn build_request(payload: SearchRequestBody, request_timeout_ms: u64) -> SearchRequest {
    let mut request = SearchRequest::new(payload.vector, payload.limit)
        .with_payload(payload.with_payload)
        .with_vector(payload.with_vector);
    if let Some(filter) = payload.filter {
        request = request.filter(filter);
    }
    if let Some(ef) = payload.ef {
        request = request.ef(ef);
    }
    if let Some(timeout_ms) = payload.timeout_ms {
        request = request.timeout(Duration::from_millis(timeout_ms.min(request_timeout_ms)));
    }
    request
}
