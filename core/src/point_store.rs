use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::payload::Payload;
use crate::vector::VectorSpace;

pub type PointId = u64;

/// Canonical state of one point. Records are replaced wholesale and shared
/// behind an `Arc`, so a reader always sees a vector and payload written
/// together.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointRecord {
    pub id: PointId,
    pub vector: Vec<f32>,
    #[serde(default)]
    pub payload: Payload,
    #[serde(default)]
    pub tombstone: bool,
    pub revision: u64,
}

/// Result of [`PointStore::put`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PutOutcome {
    pub revision: u64,
    /// The id had no live record before this write.
    pub created: bool,
    /// The stored vector differs from the previous live one (always true
    /// when `created`).
    pub vector_changed: bool,
    /// Vector and payload are identical to the previous live record.
    pub unchanged: bool,
}

/// Id-keyed point storage with tombstones and per-write revisions.
#[derive(Debug)]
pub struct PointStore {
    space: VectorSpace,
    points: BTreeMap<PointId, Arc<PointRecord>>,
    live: usize,
    next_revision: u64,
}

impl PointStore {
    pub fn new(space: VectorSpace) -> Self {
        Self {
            space,
            points: BTreeMap::new(),
            live: 0,
            next_revision: 1,
        }
    }

    pub fn space(&self) -> VectorSpace {
        self.space
    }

    /// Writes a point, resurrecting it if it was tombstoned.
    pub fn put(&mut self, id: PointId, vector: Vec<f32>, payload: Payload) -> Result<PutOutcome> {
        self.space.validate(&vector)?;

        let previous = self.points.get(&id).filter(|record| !record.tombstone);
        let created = previous.is_none();
        let vector_changed = previous.map_or(true, |record| record.vector != vector);
        let unchanged = previous
            .is_some_and(|record| !vector_changed && record.payload == payload);

        let revision = self.bump_revision();
        self.points.insert(
            id,
            Arc::new(PointRecord {
                id,
                vector,
                payload,
                tombstone: false,
                revision,
            }),
        );
        if created {
            self.live += 1;
        }

        Ok(PutOutcome {
            revision,
            created,
            vector_changed,
            unchanged,
        })
    }

    /// Live record for `id`; tombstoned points are reported as absent.
    pub fn get(&self, id: PointId) -> Result<Arc<PointRecord>> {
        self.points
            .get(&id)
            .filter(|record| !record.tombstone)
            .cloned()
            .ok_or(Error::PointNotFound(id))
    }

    /// Stored record for `id`, tombstoned or not.
    pub fn lookup(&self, id: PointId) -> Option<&Arc<PointRecord>> {
        self.points.get(&id)
    }

    pub fn exists(&self, id: PointId) -> bool {
        self.points.get(&id).is_some_and(|record| !record.tombstone)
    }

    /// Tombstones `id`. Space is reclaimed by [`PointStore::purge_tombstones`].
    pub fn delete(&mut self, id: PointId) -> Result<u64> {
        let record = self
            .points
            .get(&id)
            .filter(|record| !record.tombstone)
            .cloned()
            .ok_or(Error::PointNotFound(id))?;

        let revision = self.bump_revision();
        self.points.insert(
            id,
            Arc::new(PointRecord {
                id,
                vector: record.vector.clone(),
                payload: record.payload.clone(),
                tombstone: true,
                revision,
            }),
        );
        self.live -= 1;
        Ok(revision)
    }

    pub fn live_len(&self) -> usize {
        self.live
    }

    pub fn tombstone_len(&self) -> usize {
        self.points.len() - self.live
    }

    /// Share of stored records that are tombstones; `0.0` when empty.
    pub fn tombstone_fraction(&self) -> f64 {
        if self.points.is_empty() {
            return 0.0;
        }
        self.tombstone_len() as f64 / self.points.len() as f64
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    pub fn iter_live(&self) -> impl Iterator<Item = &Arc<PointRecord>> + '_ {
        self.points.values().filter(|record| !record.tombstone)
    }

    /// Drops tombstoned records, returning how many were removed.
    pub fn purge_tombstones(&mut self) -> usize {
        let before = self.points.len();
        self.points.retain(|_, record| !record.tombstone);
        before - self.points.len()
    }

    fn bump_revision(&mut self) -> u64 {
        let revision = self.next_revision;
        self.next_revision = self.next_revision.saturating_add(1);
        revision
    }
}
