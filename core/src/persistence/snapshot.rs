use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::collection::Collection;
use crate::config::IndexConfig;
use crate::payload::Payload;
use crate::point_store::PointId;
use crate::registry::CollectionRegistry;
use crate::vector::{Metric, VectorSpace};

use super::fsync::write_file_atomically;
use super::PersistenceError;

const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct SnapshotDocument {
    version: u32,
    /// Last log sequence number folded into this snapshot.
    #[serde(default)]
    last_seq: u64,
    collections: Vec<SnapshotCollection>,
}

#[derive(Debug, Serialize, Deserialize)]
struct SnapshotCollection {
    name: String,
    dimension: usize,
    metric: Metric,
    index_config: IndexConfig,
    points: Vec<SnapshotPoint>,
}

#[derive(Debug, Serialize, Deserialize)]
struct SnapshotPoint {
    id: PointId,
    vector: Vec<f32>,
    #[serde(default)]
    payload: Payload,
}

/// Creates every snapshotted collection in `registry` and loads its points.
/// Returns the last log sequence number the snapshot covers.
pub(super) fn load_snapshot(
    path: &Path,
    registry: &CollectionRegistry,
) -> Result<u64, PersistenceError> {
    if !path.exists() {
        return Ok(0);
    }

    let raw = fs::read(path)?;
    let snapshot: SnapshotDocument = serde_json::from_slice(&raw)?;
    if snapshot.version != SNAPSHOT_VERSION {
        return Err(PersistenceError::InvalidData(format!(
            "unsupported snapshot version {}",
            snapshot.version
        )));
    }

    let mut seen = BTreeSet::new();
    for entry in snapshot.collections {
        if !seen.insert(entry.name.clone()) {
            return Err(PersistenceError::InvalidData(format!(
                "duplicate collection '{}' in snapshot",
                entry.name
            )));
        }

        let space = VectorSpace::new(entry.dimension, entry.metric)?;
        let collection = registry.create(&entry.name, space, entry.index_config)?;
        let mut store = collection.store_mut();
        for point in entry.points {
            store.put(point.id, point.vector, point.payload)?;
        }
    }
    Ok(snapshot.last_seq)
}

pub(super) fn write_snapshot(
    path: &Path,
    registry: &CollectionRegistry,
    last_seq: u64,
) -> Result<(), PersistenceError> {
    let snapshot = SnapshotDocument {
        version: SNAPSHOT_VERSION,
        last_seq,
        collections: registry
            .collections()
            .iter()
            .filter(|collection| !collection.is_dropped())
            .map(|collection| snapshot_collection_from(collection))
            .collect(),
    };

    let bytes = serde_json::to_vec(&snapshot)?;
    write_file_atomically(path, &bytes)
}

fn snapshot_collection_from(collection: &Collection) -> SnapshotCollection {
    let space = collection.space();
    let points = collection
        .store()
        .iter_live()
        .map(|record| SnapshotPoint {
            id: record.id,
            vector: record.vector.clone(),
            payload: record.payload.clone(),
        })
        .collect();

    SnapshotCollection {
        name: collection.name().to_string(),
        dimension: space.dimension(),
        metric: space.metric(),
        index_config: collection.config(),
        points,
    }
}
