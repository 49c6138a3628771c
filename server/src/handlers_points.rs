use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::Json;
use quarry_core::PointId;

use crate::errors::{map_json_rejection, ApiError};
use crate::handler_utils::{batch_response, run_blocking, validate_batch_size};
use crate::models::{BatchResponse, DeletePointsRequest, PointResponse, UpsertPointsRequest};
use crate::state::AppState;

pub(crate) async fn upsert_points(
    Path(name): Path<String>,
    State(state): State<AppState>,
    payload: Result<Json<UpsertPointsRequest>, JsonRejection>,
) -> Result<Json<BatchResponse>, ApiError> {
    let Json(payload) = payload.map_err(map_json_rejection)?;
    validate_batch_size(payload.points.len(), &state.config)?;

    let statuses = run_blocking(move || {
        let statuses = state
            .engine
            .upsert(&name, payload.points)
            .map_err(ApiError::from)?;
        state.metrics.record_writes(&statuses);
        Ok(statuses)
    })
    .await?;
    Ok(Json(batch_response(statuses)))
}

pub(crate) async fn delete_points(
    Path(name): Path<String>,
    State(state): State<AppState>,
    payload: Result<Json<DeletePointsRequest>, JsonRejection>,
) -> Result<Json<BatchResponse>, ApiError> {
    let Json(payload) = payload.map_err(map_json_rejection)?;
    validate_batch_size(payload.ids.len(), &state.config)?;

    let statuses = run_blocking(move || {
        let statuses = state
            .engine
            .delete(&name, &payload.ids)
            .map_err(ApiError::from)?;
        state.metrics.record_writes(&statuses);
        Ok(statuses)
    })
    .await?;
    Ok(Json(batch_response(statuses)))
}

pub(crate) async fn get_point(
    Path((name, id)): Path<(String, PointId)>,
    State(state): State<AppState>,
) -> Result<Json<PointResponse>, ApiError> {
    let record = run_blocking(move || {
        state
            .engine
            .get_point(&name, id)
            .map_err(ApiError::from)
    })
    .await?;
    Ok(Json(PointResponse {
        id: record.id,
        vector: record.vector.clone(),
        payload: record.payload.clone(),
    }))
}
