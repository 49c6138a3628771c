use quarry_core::{IndexConfig, IndexConfigPatch, PointStatus};
use tokio::task;

use crate::config::AppConfig;
use crate::errors::{error_code, ApiError, ErrorResponse};
use crate::models::{BatchResponse, PointResult};

/// Runs an engine call off the async workers.
pub(crate) async fn run_blocking<T, F>(call: F) -> Result<T, ApiError>
where
    F: FnOnce() -> Result<T, ApiError> + Send + 'static,
    T: Send + 'static,
{
    task::spawn_blocking(call).await.map_err(|error| {
        tracing::error!(%error, "blocking engine task failed");
        ApiError::internal("engine task failed")
    })?
}

pub(crate) fn canonical_collection_name(name: &str) -> Result<String, ApiError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(ApiError::invalid_argument(
            "collection name must not be empty",
        ));
    }

    Ok(trimmed.to_string())
}

pub(crate) fn validate_dimension(dimension: usize, config: &AppConfig) -> Result<(), ApiError> {
    if dimension > config.max_dimension {
        return Err(ApiError::invalid_argument(format!(
            "dimension {dimension} exceeds configured maximum {}",
            config.max_dimension
        )));
    }
    Ok(())
}

pub(crate) fn validate_batch_size(len: usize, config: &AppConfig) -> Result<(), ApiError> {
    if len == 0 {
        return Err(ApiError::invalid_argument("batch must not be empty"));
    }
    if len > config.max_batch_size {
        return Err(ApiError::invalid_argument(format!(
            "batch of {len} exceeds configured maximum {}",
            config.max_batch_size
        )));
    }
    Ok(())
}

pub(crate) fn validate_limit(limit: usize, config: &AppConfig) -> Result<(), ApiError> {
    if limit > config.max_limit {
        return Err(ApiError::invalid_argument(format!(
            "limit must be <= {}",
            config.max_limit
        )));
    }
    Ok(())
}

/// Creation-time config: every field of `patch` may be set, the rest come
/// from the server defaults.
pub(crate) fn index_config_from(defaults: IndexConfig, patch: &IndexConfigPatch) -> IndexConfig {
    IndexConfig {
        m: patch.m.unwrap_or(defaults.m),
        ef_construction: patch.ef_construction.unwrap_or(defaults.ef_construction),
        ef_search: patch.ef_search.unwrap_or(defaults.ef_search),
        full_scan_threshold: patch
            .full_scan_threshold
            .unwrap_or(defaults.full_scan_threshold),
        compaction_threshold: patch
            .compaction_threshold
            .unwrap_or(defaults.compaction_threshold),
        seed: defaults.seed,
    }
}

pub(crate) fn batch_response(statuses: Vec<PointStatus>) -> BatchResponse {
    let results: Vec<PointResult> = statuses
        .into_iter()
        .map(|status| match status.result {
            Ok(outcome) => PointResult {
                id: status.id,
                outcome: Some(outcome),
                error: None,
            },
            Err(error) => PointResult {
                id: status.id,
                outcome: None,
                error: Some(ErrorResponse {
                    code: error_code(&error),
                    message: error.to_string(),
                }),
            },
        })
        .collect();
    let failed = results.iter().filter(|result| result.error.is_some()).count();

    BatchResponse {
        succeeded: results.len() - failed,
        failed,
        results,
    }
}
