use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::Json;
use quarry_core::{CollectionInfo, IndexConfig, IndexConfigPatch};

use crate::errors::{map_json_rejection, ApiError};
pub(crate) use crate::handlers_health::{live, metrics, ready};
pub(crate) use crate::handlers_points::{delete_points, get_point, upsert_points};
pub(crate) use crate::handlers_search::search;
use crate::handler_utils::{
    canonical_collection_name, index_config_from, run_blocking, validate_dimension,
};
use crate::models::{
    CompactResponse, CreateCollectionRequest, DeleteCollectionResponse, ListCollectionsResponse,
};
use crate::state::AppState;

pub(crate) async fn create_collection(
    State(state): State<AppState>,
    payload: Result<Json<CreateCollectionRequest>, JsonRejection>,
) -> Result<Json<CollectionInfo>, ApiError> {
    let Json(payload) = payload.map_err(map_json_rejection)?;
    let name = canonical_collection_name(&payload.name)?;
    validate_dimension(payload.dimension, &state.config)?;
    let index_config = index_config_from(state.config.index_defaults, &payload.index_config);

    let info = run_blocking(move || {
        state
            .engine
            .create_collection(&name, payload.dimension, payload.metric, Some(index_config))
            .map_err(ApiError::from)
    })
    .await?;
    Ok(Json(info))
}

pub(crate) async fn list_collections(
    State(state): State<AppState>,
) -> Result<Json<ListCollectionsResponse>, ApiError> {
    let collections: Vec<CollectionInfo> = run_blocking(move || {
        Ok(state
            .engine
            .registry()
            .collections()
            .iter()
            .filter(|collection| !collection.is_dropped())
            .map(|collection| collection.info())
            .collect())
    })
    .await?;
    Ok(Json(ListCollectionsResponse { collections }))
}

pub(crate) async fn get_collection(
    Path(name): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<CollectionInfo>, ApiError> {
    let info = run_blocking(move || {
        state
            .engine
            .collection_info(&name)
            .map_err(ApiError::from)
    })
    .await?;
    Ok(Json(info))
}

pub(crate) async fn update_collection(
    Path(name): Path<String>,
    State(state): State<AppState>,
    payload: Result<Json<IndexConfigPatch>, JsonRejection>,
) -> Result<Json<IndexConfig>, ApiError> {
    let Json(patch) = payload.map_err(map_json_rejection)?;
    if patch.is_empty() {
        return Err(ApiError::invalid_argument(
            "config patch must set at least one field",
        ));
    }

    let merged = run_blocking(move || {
        state
            .engine
            .update_collection_config(&name, &patch)
            .map_err(ApiError::from)
    })
    .await?;
    Ok(Json(merged))
}

pub(crate) async fn delete_collection(
    Path(name): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<DeleteCollectionResponse>, ApiError> {
    let response_name = name.clone();
    run_blocking(move || {
        state
            .engine
            .drop_collection(&name)
            .map_err(ApiError::from)
    })
    .await?;
    Ok(Json(DeleteCollectionResponse {
        name: response_name,
        deleted: true,
    }))
}

pub(crate) async fn compact_collection(
    Path(name): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<CompactResponse>, ApiError> {
    let response_name = name.clone();
    let reclaimed_nodes = run_blocking(move || {
        state.engine.compact(&name).map_err(ApiError::from)
    })
    .await?;
    Ok(Json(CompactResponse {
        name: response_name,
        reclaimed_nodes,
    }))
}
