use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use arc_swap::ArcSwap;
use parking_lot::{Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::IndexConfig;
use crate::error::{Error, Result};
use crate::hnsw::HnswIndex;
use crate::point_store::{PointId, PointStore};
use crate::vector::{Metric, VectorSpace};

/// Number of per-id write lock stripes.
const POINT_LOCK_STRIPES: usize = 64;

/// Snapshot of a collection's shape and size.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionInfo {
    pub name: String,
    pub dimension: usize,
    pub metric: Metric,
    pub point_count: usize,
    /// Live nodes in the graph; zero while searches run exact.
    pub indexed_nodes: usize,
    pub deleted_nodes: usize,
    pub index_ready: bool,
    pub index_config: IndexConfig,
}

/// One named collection: its points, its graph and the locks guarding them.
///
/// Lock order is `maintenance` → point stripe → `store` → `index`. Writers
/// hold `maintenance` shared for the duration of one item; graph builds and
/// compaction take it exclusively.
#[derive(Debug)]
pub struct Collection {
    name: String,
    space: VectorSpace,
    config: ArcSwap<IndexConfig>,
    store: RwLock<PointStore>,
    index: RwLock<Option<HnswIndex>>,
    point_locks: Vec<Mutex<()>>,
    maintenance: RwLock<()>,
    dropped: AtomicBool,
    /// Bumped every time tombstoned records leave the store.
    purges: AtomicU64,
}

impl Collection {
    pub fn new(name: impl Into<String>, space: VectorSpace, config: IndexConfig) -> Result<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(Error::InvalidName);
        }
        config.validate()?;

        Ok(Self {
            name,
            space,
            config: ArcSwap::from_pointee(config),
            store: RwLock::new(PointStore::new(space)),
            index: RwLock::new(None),
            point_locks: (0..POINT_LOCK_STRIPES).map(|_| Mutex::new(())).collect(),
            maintenance: RwLock::new(()),
            dropped: AtomicBool::new(false),
            purges: AtomicU64::new(0),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn space(&self) -> VectorSpace {
        self.space
    }

    pub fn config(&self) -> IndexConfig {
        **self.config.load()
    }

    pub(crate) fn set_config(&self, config: IndexConfig) {
        self.config.store(Arc::new(config));
    }

    pub fn is_dropped(&self) -> bool {
        self.dropped.load(Ordering::Acquire)
    }

    /// Fails with `CollectionDropped` once [`Collection::mark_dropped`] ran.
    pub fn ensure_live(&self) -> Result<()> {
        if self.is_dropped() {
            return Err(Error::CollectionDropped(self.name.clone()));
        }
        Ok(())
    }

    /// Flags the collection as dropped, waits for in-flight writers and
    /// releases points and graph.
    pub(crate) fn mark_dropped(&self) {
        self.dropped.store(true, Ordering::Release);
        let _exclusive = self.maintenance.write();
        *self.store.write() = PointStore::new(self.space);
        *self.index.write() = None;
    }

    /// Number of tombstone purges so far. A graph candidate missing from the
    /// store is expected only when this moved during the search.
    pub(crate) fn purge_epoch(&self) -> u64 {
        self.purges.load(Ordering::Acquire)
    }

    pub(crate) fn maintenance_shared(&self) -> RwLockReadGuard<'_, ()> {
        self.maintenance.read()
    }

    pub(crate) fn lock_point(&self, id: PointId) -> MutexGuard<'_, ()> {
        let stripe = (id.wrapping_mul(0x9E37_79B9_7F4A_7C15) >> 58) as usize % POINT_LOCK_STRIPES;
        self.point_locks[stripe].lock()
    }

    pub(crate) fn store(&self) -> RwLockReadGuard<'_, PointStore> {
        self.store.read()
    }

    pub(crate) fn store_mut(&self) -> RwLockWriteGuard<'_, PointStore> {
        self.store.write()
    }

    pub(crate) fn index(&self) -> RwLockReadGuard<'_, Option<HnswIndex>> {
        self.index.read()
    }

    pub(crate) fn index_mut(&self) -> RwLockWriteGuard<'_, Option<HnswIndex>> {
        self.index.write()
    }

    pub fn live_len(&self) -> usize {
        self.store.read().live_len()
    }

    pub fn index_ready(&self) -> bool {
        self.index.read().is_some()
    }

    /// Builds the graph once the live count reaches the full-scan
    /// threshold. Returns whether a build happened.
    pub fn ensure_index(&self) -> Result<bool> {
        let config = self.config();
        if self.index_ready() || self.live_len() < config.full_scan_threshold {
            return Ok(false);
        }

        let _exclusive = self.maintenance.write();
        self.ensure_live()?;
        if self.index_ready() {
            return Ok(false);
        }
        self.rebuild_locked(&config, "build")?;
        Ok(true)
    }

    /// Rebuilds the graph without deleted nodes and purges tombstoned
    /// points. Returns the number of graph nodes reclaimed.
    pub fn compact(&self) -> Result<usize> {
        let _exclusive = self.maintenance.write();
        self.ensure_live()?;
        let config = self.config();

        let reclaimed = self.index.read().as_ref().map(HnswIndex::deleted_len);
        if reclaimed.is_some() {
            self.rebuild_locked(&config, "compaction")?;
        }
        let purged = self.store.write().purge_tombstones();
        if purged > 0 {
            self.purges.fetch_add(1, Ordering::AcqRel);
            if reclaimed.is_none() {
                info!(collection = %self.name, purged, "purged tombstones");
            }
        }
        Ok(reclaimed.unwrap_or(0))
    }

    /// Compacts when the deleted share reached the configured threshold: of
    /// graph nodes once a graph exists, of stored records before that.
    pub fn compact_if_needed(&self) -> Result<bool> {
        let threshold = self.config().compaction_threshold;
        let needed = match self.index.read().as_ref() {
            Some(index) => index.needs_compaction(threshold),
            None => self.store.read().tombstone_fraction() >= threshold,
        };
        if !needed {
            return Ok(false);
        }
        self.compact()?;
        Ok(true)
    }

    /// Caller holds `maintenance` exclusively.
    fn rebuild_locked(&self, config: &IndexConfig, reason: &'static str) -> Result<()> {
        let started = Instant::now();
        let rebuilt = {
            let store = self.store.read();
            HnswIndex::build(self.space, config, store.iter_live())?
        };
        let nodes = rebuilt.node_count();
        *self.index.write() = Some(rebuilt);
        info!(
            collection = %self.name,
            reason,
            nodes,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "hnsw graph rebuilt"
        );
        Ok(())
    }

    pub fn info(&self) -> CollectionInfo {
        let point_count = self.live_len();
        let index = self.index.read();
        CollectionInfo {
            name: self.name.clone(),
            dimension: self.space.dimension(),
            metric: self.space.metric(),
            point_count,
            indexed_nodes: index.as_ref().map_or(0, HnswIndex::live_len),
            deleted_nodes: index.as_ref().map_or(0, HnswIndex::deleted_len),
            index_ready: index.is_some(),
            index_config: self.config(),
        }
    }
}
