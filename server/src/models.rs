use quarry_core::{
    CollectionInfo, Filter, IndexConfigPatch, Metric, Payload, PointId, PointInput, WriteOutcome,
};
use serde::{Deserialize, Serialize};

use crate::errors::ErrorResponse;

#[derive(Debug, Deserialize)]
pub(crate) struct CreateCollectionRequest {
    pub(crate) name: String,
    pub(crate) dimension: usize,
    #[serde(default = "default_metric")]
    pub(crate) metric: Metric,
    /// Fields left out take the server defaults.
    #[serde(default)]
    pub(crate) index_config: IndexConfigPatch,
}

fn default_metric() -> Metric {
    Metric::Cosine
}

#[derive(Debug, Serialize)]
pub(crate) struct ListCollectionsResponse {
    pub(crate) collections: Vec<CollectionInfo>,
}

#[derive(Debug, Serialize)]
pub(crate) struct DeleteCollectionResponse {
    pub(crate) name: String,
    pub(crate) deleted: bool,
}

#[derive(Debug, Serialize)]
pub(crate) struct CompactResponse {
    pub(crate) name: String,
    pub(crate) reclaimed_nodes: usize,
}

#[derive(Debug, Deserialize)]
pub(crate) struct UpsertPointsRequest {
    pub(crate) points: Vec<PointInput>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct DeletePointsRequest {
    pub(crate) ids: Vec<PointId>,
}

#[derive(Debug, Serialize)]
pub(crate) struct PointResult {
    pub(crate) id: PointId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) outcome: Option<WriteOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) error: Option<ErrorResponse>,
}

#[derive(Debug, Serialize)]
pub(crate) struct BatchResponse {
    pub(crate) succeeded: usize,
    pub(crate) failed: usize,
    pub(crate) results: Vec<PointResult>,
}

#[derive(Debug, Serialize)]
pub(crate) struct PointResponse {
    pub(crate) id: PointId,
    pub(crate) vector: Vec<f32>,
    pub(crate) payload: Payload,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SearchRequestBody {
    pub(crate) vector: Vec<f32>,
    pub(crate) limit: usize,
    #[serde(default)]
    pub(crate) filter: Option<Filter>,
    #[serde(default)]
    pub(crate) ef: Option<usize>,
    /// Best-effort budget; an expired search returns what it has.
    #[serde(default)]
    pub(crate) timeout_ms: Option<u64>,
    #[serde(default = "default_true")]
    pub(crate) with_payload: bool,
    #[serde(default)]
    pub(crate) with_vector: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Serialize)]
pub(crate) struct LiveResponse {
    pub(crate) status: &'static str,
    pub(crate) uptime_ms: u64,
}

#[derive(Debug, Serialize)]
pub(crate) struct ReadyChecks {
    pub(crate) engine_loaded: bool,
    pub(crate) persistence_enabled: bool,
}

#[derive(Debug, Serialize)]
pub(crate) struct ReadyResponse {
    pub(crate) status: &'static str,
    pub(crate) uptime_ms: u64,
    pub(crate) collections: usize,
    pub(crate) checks: ReadyChecks,
}
