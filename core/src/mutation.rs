//! Point writes.
//!
//! Every item of a batch is applied independently: it is validated, logged
//! when a [`MutationLog`] is attached, written to the point store and then
//! mirrored into the graph, all while holding the stripe lock of its id so
//! writes to one id apply in arrival order. A bad item only fails itself;
//! losing the collection to a concurrent drop fails the whole call.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::collection::Collection;
use crate::error::{Error, Result};
use crate::payload::{validate_payload, Payload};
use crate::point_store::PointId;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointInput {
    pub id: PointId,
    pub vector: Vec<f32>,
    #[serde(default)]
    pub payload: Payload,
}

impl PointInput {
    pub fn new(id: PointId, vector: Vec<f32>, payload: Payload) -> Self {
        Self {
            id,
            vector,
            payload,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteOutcome {
    Created,
    Updated,
    /// Same vector and payload as before; the graph was left alone.
    Unchanged,
    Deleted,
}

/// Result for one item of a batch.
#[derive(Debug, Clone, PartialEq)]
pub struct PointStatus {
    pub id: PointId,
    pub result: Result<WriteOutcome>,
}

impl PointStatus {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

/// Durable record of accepted writes, appended before they are applied.
pub trait MutationLog: Send + Sync {
    fn append_upsert(&self, collection: &str, point: &PointInput) -> Result<()>;
    fn append_delete(&self, collection: &str, id: PointId) -> Result<()>;
}

pub fn upsert(
    collection: &Collection,
    points: Vec<PointInput>,
    log: Option<&dyn MutationLog>,
) -> Result<Vec<PointStatus>> {
    collection.ensure_live()?;
    let mut statuses = Vec::with_capacity(points.len());
    for point in points {
        let id = point.id;
        let result = upsert_one(collection, point, log);
        if let Err(Error::CollectionDropped(name)) = result {
            return Err(Error::CollectionDropped(name));
        }
        statuses.push(PointStatus { id, result });
    }
    after_batch(collection)?;
    Ok(statuses)
}

pub fn delete(
    collection: &Collection,
    ids: &[PointId],
    log: Option<&dyn MutationLog>,
) -> Result<Vec<PointStatus>> {
    collection.ensure_live()?;
    let mut statuses = Vec::with_capacity(ids.len());
    for &id in ids {
        let result = delete_one(collection, id, log);
        if let Err(Error::CollectionDropped(name)) = result {
            return Err(Error::CollectionDropped(name));
        }
        statuses.push(PointStatus { id, result });
    }
    after_batch(collection)?;
    Ok(statuses)
}

fn upsert_one(
    collection: &Collection,
    point: PointInput,
    log: Option<&dyn MutationLog>,
) -> Result<WriteOutcome> {
    let _shared = collection.maintenance_shared();
    collection.ensure_live()?;
    collection.space().validate(&point.vector)?;
    validate_payload(&point.payload)?;

    let _point_guard = collection.lock_point(point.id);
    if let Some(log) = log {
        log.append_upsert(collection.name(), &point)?;
    }

    let id = point.id;
    let (outcome, record) = {
        let mut store = collection.store_mut();
        let outcome = store.put(id, point.vector, point.payload)?;
        (outcome, store.get(id)?)
    };

    if let Some(index) = collection.index_mut().as_mut() {
        if outcome.vector_changed || !index.contains(id) {
            index.insert(id, &record.vector, outcome.revision)?;
        } else {
            index.touch(id, outcome.revision);
        }
    }

    Ok(if outcome.created {
        WriteOutcome::Created
    } else if outcome.unchanged {
        WriteOutcome::Unchanged
    } else {
        WriteOutcome::Updated
    })
}

fn delete_one(
    collection: &Collection,
    id: PointId,
    log: Option<&dyn MutationLog>,
) -> Result<WriteOutcome> {
    let _shared = collection.maintenance_shared();
    collection.ensure_live()?;

    let _point_guard = collection.lock_point(id);
    if !collection.store().exists(id) {
        return Err(Error::PointNotFound(id));
    }
    if let Some(log) = log {
        log.append_delete(collection.name(), id)?;
    }

    collection.store_mut().delete(id)?;
    if let Some(index) = collection.index_mut().as_mut() {
        index.soft_delete(id);
    }
    Ok(WriteOutcome::Deleted)
}

/// Builds the graph when the batch pushed the collection over its
/// threshold and compacts when enough nodes were deleted.
fn after_batch(collection: &Collection) -> Result<()> {
    let maintenance = collection
        .ensure_index()
        .and_then(|_| collection.compact_if_needed());
    match maintenance {
        Ok(_) => Ok(()),
        Err(Error::CollectionDropped(name)) => Err(Error::CollectionDropped(name)),
        Err(error) => {
            warn!(collection = collection.name(), %error, "index maintenance failed");
            Ok(())
        }
    }
}
