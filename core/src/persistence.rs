//! Durability: a JSON-lines point log plus a periodic snapshot.
//!
//! Every accepted change is appended to the log before it is applied. A
//! checkpoint writes the live state of every collection to the snapshot and
//! truncates the log. The HNSW graph is never written; [`Persistence::load`]
//! rebuilds it from the recovered points.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::collection::Collection;
use crate::config::{IndexConfig, PersistenceConfig};
use crate::error::Error;
use crate::mutation::{MutationLog, PointInput};
use crate::payload::Payload;
use crate::point_store::PointId;
use crate::registry::CollectionRegistry;
use crate::vector::{Metric, VectorSpace};

mod fsync;
mod snapshot;
mod wal;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WalRecord {
    CreateCollection {
        name: String,
        dimension: usize,
        metric: Metric,
        index_config: IndexConfig,
    },
    DropCollection {
        name: String,
    },
    /// Carries the full merged config, not the patch.
    UpdateConfig {
        name: String,
        index_config: IndexConfig,
    },
    Upsert {
        collection: String,
        id: PointId,
        vector: Vec<f32>,
        #[serde(default)]
        payload: Payload,
    },
    Delete {
        collection: String,
        id: PointId,
    },
}

/// One log line: a record stamped with its position in the log. Sequence
/// numbers keep growing across checkpoints, and a snapshot remembers the last
/// one it covers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalEntry {
    pub seq: u64,
    #[serde(flatten)]
    pub record: WalRecord,
}

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("invalid persistence data: {0}")]
    InvalidData(String),
}

impl From<PersistenceError> for Error {
    fn from(value: PersistenceError) -> Self {
        Self::Persistence(value.to_string())
    }
}

impl From<Error> for PersistenceError {
    fn from(value: Error) -> Self {
        Self::InvalidData(value.to_string())
    }
}

/// What [`Persistence::load`] recovered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadStats {
    pub collections: usize,
    pub points: usize,
    pub replayed_records: usize,
}

#[derive(Debug)]
pub struct Persistence {
    config: PersistenceConfig,
    append_lock: Mutex<()>,
    since_checkpoint: AtomicUsize,
    last_seq: AtomicU64,
}

impl Persistence {
    pub fn new(config: PersistenceConfig) -> Self {
        Self {
            config,
            append_lock: Mutex::new(()),
            since_checkpoint: AtomicUsize::new(0),
            last_seq: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &PersistenceConfig {
        &self.config
    }

    /// Sequence number of the last appended or recovered record.
    pub fn last_seq(&self) -> u64 {
        self.last_seq.load(Ordering::Acquire)
    }

    /// Restores `registry` from the snapshot and the log, then builds the
    /// graphs of collections that are past their threshold. Log records the
    /// snapshot already covers are skipped, so a checkpoint that wrote its
    /// snapshot but failed to truncate the log replays cleanly.
    pub fn load(&self, registry: &CollectionRegistry) -> Result<LoadStats, PersistenceError> {
        let mut stats = LoadStats::default();
        let covered = snapshot::load_snapshot(&self.config.snapshot_path, registry)?;
        let mut last_seq = covered;
        let mut skipped = 0usize;
        wal::replay_wal(&self.config.wal_path, |entry| {
            last_seq = last_seq.max(entry.seq);
            if entry.seq <= covered {
                skipped += 1;
                return Ok(());
            }
            apply_wal_record(registry, &entry.record)?;
            stats.replayed_records += 1;
            Ok(())
        })?;
        if skipped > 0 {
            info!(skipped, covered, "skipped wal records already in the snapshot");
        }
        self.last_seq.store(last_seq, Ordering::Release);
        self.since_checkpoint
            .store(stats.replayed_records, Ordering::Release);

        for collection in registry.collections() {
            collection.ensure_index()?;
            stats.collections += 1;
            stats.points += collection.live_len();
        }
        info!(
            collections = stats.collections,
            points = stats.points,
            replayed_records = stats.replayed_records,
            "persistence state loaded"
        );
        Ok(stats)
    }

    pub fn append(&self, record: &WalRecord) -> Result<(), PersistenceError> {
        let _guard = self.append_lock.lock();
        let entry = WalEntry {
            seq: self.last_seq.load(Ordering::Acquire) + 1,
            record: record.clone(),
        };
        wal::append_wal(&self.config.wal_path, &entry, self.config.sync_on_write)?;
        self.last_seq.store(entry.seq, Ordering::Release);
        self.since_checkpoint.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    pub fn checkpoint_due(&self) -> bool {
        self.since_checkpoint.load(Ordering::Acquire) >= self.config.checkpoint_interval
    }

    /// Writes the snapshot and truncates the log. The caller keeps writers
    /// out for the duration.
    pub fn checkpoint(&self, registry: &CollectionRegistry) -> Result<(), PersistenceError> {
        let _guard = self.append_lock.lock();
        snapshot::write_snapshot(&self.config.snapshot_path, registry, self.last_seq())?;
        wal::truncate_wal(&self.config.wal_path)?;
        let folded = self.since_checkpoint.swap(0, Ordering::AcqRel);
        info!(records = folded, "checkpoint written");
        Ok(())
    }

    /// Checkpoint that only logs failures; the log still holds every change.
    pub fn checkpoint_or_warn(&self, registry: &CollectionRegistry) {
        if let Err(error) = self.checkpoint(registry) {
            warn!(%error, "checkpoint failed, keeping wal");
        }
    }
}

impl MutationLog for Persistence {
    fn append_upsert(&self, collection: &str, point: &PointInput) -> crate::Result<()> {
        self.append(&WalRecord::Upsert {
            collection: collection.to_string(),
            id: point.id,
            vector: point.vector.clone(),
            payload: point.payload.clone(),
        })
        .map_err(Error::from)
    }

    fn append_delete(&self, collection: &str, id: PointId) -> crate::Result<()> {
        self.append(&WalRecord::Delete {
            collection: collection.to_string(),
            id,
        })
        .map_err(Error::from)
    }
}

/// Applies one log record while loading, before any graph exists. Replays
/// are idempotent: re-creating an identical collection, dropping a missing
/// one or deleting a missing point are no-ops.
pub(crate) fn apply_wal_record(
    registry: &CollectionRegistry,
    record: &WalRecord,
) -> Result<(), PersistenceError> {
    match record {
        WalRecord::CreateCollection {
            name,
            dimension,
            metric,
            index_config,
        } => {
            let space = VectorSpace::new(*dimension, *metric)?;
            if let Ok(existing) = registry.get(name) {
                if existing.space() == space {
                    existing.set_config(*index_config);
                    return Ok(());
                }
                return Err(PersistenceError::InvalidData(format!(
                    "collection '{name}' already exists with a different vector space"
                )));
            }
            registry.create(name, space, *index_config)?;
            Ok(())
        }
        WalRecord::DropCollection { name } => match registry.drop(name) {
            Ok(()) | Err(Error::CollectionNotFound(_)) => Ok(()),
            Err(error) => Err(error.into()),
        },
        WalRecord::UpdateConfig { name, index_config } => {
            index_config.validate()?;
            existing_collection(registry, name)?.set_config(*index_config);
            Ok(())
        }
        WalRecord::Upsert {
            collection,
            id,
            vector,
            payload,
        } => {
            let target = existing_collection(registry, collection)?;
            target
                .store_mut()
                .put(*id, vector.clone(), payload.clone())?;
            Ok(())
        }
        WalRecord::Delete { collection, id } => {
            let target = existing_collection(registry, collection)?;
            let mut store = target.store_mut();
            if store.exists(*id) {
                store.delete(*id)?;
            }
            Ok(())
        }
    }
}

fn existing_collection(
    registry: &CollectionRegistry,
    name: &str,
) -> Result<Arc<Collection>, PersistenceError> {
    registry.get(name).map_err(|_| {
        PersistenceError::InvalidData(format!("collection '{name}' does not exist"))
    })
}

#[cfg(test)]
mod tests;
