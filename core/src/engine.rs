//! The engine facade.
//!
//! An [`Engine`] is an explicit instance: it owns its registry, its
//! configuration and, when durability is configured, its point log. Several
//! engines can live side by side in one process.

use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::info;

use crate::collection::CollectionInfo;
use crate::config::{EngineConfig, IndexConfig, IndexConfigPatch};
use crate::error::{Error, Result};
use crate::mutation::{self, MutationLog, PointInput, PointStatus};
use crate::persistence::{LoadStats, Persistence, WalRecord};
use crate::point_store::{PointId, PointRecord};
use crate::query::{self, SearchRequest, SearchResponse};
use crate::registry::CollectionRegistry;
use crate::vector::{Metric, VectorSpace};

#[derive(Debug)]
pub struct Engine {
    config: EngineConfig,
    registry: CollectionRegistry,
    persistence: Option<Persistence>,
    /// Shared by every logged change, exclusive for checkpoints so a
    /// snapshot never splits a log append from its apply.
    gate: RwLock<()>,
    /// Serializes create, drop and config updates.
    lifecycle: Mutex<()>,
}

impl Engine {
    /// In-memory engine. Use [`Engine::open`] when persistence is configured.
    pub fn new(config: EngineConfig) -> Result<Self> {
        if config.persistence.is_some() {
            return Err(Error::InvalidConfig(
                "persistent engines must be opened with Engine::open".to_string(),
            ));
        }
        config.validate()?;
        Ok(Self::assemble(config, None))
    }

    /// Builds an engine and, when persistence is configured, restores the
    /// snapshot and replays the point log.
    pub fn open(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let persistence = config.persistence.clone().map(Persistence::new);
        let engine = Self::assemble(config, persistence);
        if let Some(persistence) = &engine.persistence {
            let LoadStats {
                collections,
                points,
                replayed_records,
            } = persistence.load(&engine.registry)?;
            info!(collections, points, replayed_records, "engine opened");
        }
        Ok(engine)
    }

    fn assemble(config: EngineConfig, persistence: Option<Persistence>) -> Self {
        Self {
            config,
            registry: CollectionRegistry::new(),
            persistence,
            gate: RwLock::new(()),
            lifecycle: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn registry(&self) -> &CollectionRegistry {
        &self.registry
    }

    pub fn is_persistent(&self) -> bool {
        self.persistence.is_some()
    }

    /// Writes a final checkpoint. The engine stays usable afterwards.
    pub fn shutdown(&self) -> Result<()> {
        if self.checkpoint()? {
            info!("engine shut down with a final checkpoint");
        }
        Ok(())
    }

    pub fn create_collection(
        &self,
        name: &str,
        dimension: usize,
        metric: Metric,
        index_config: Option<IndexConfig>,
    ) -> Result<CollectionInfo> {
        if name.trim().is_empty() {
            return Err(Error::InvalidName);
        }
        let space = VectorSpace::new(dimension, metric)?;
        let index_config = index_config.unwrap_or(self.config.defaults);
        index_config.validate()?;

        let created = {
            let _lifecycle = self.lifecycle.lock();
            let _gate = self.gate.read();
            if self.registry.contains(name) {
                return Err(Error::AlreadyExists(name.to_string()));
            }
            self.append(&WalRecord::CreateCollection {
                name: name.to_string(),
                dimension,
                metric,
                index_config,
            })?;
            self.registry.create(name, space, index_config)?
        };
        self.checkpoint_if_due();
        Ok(created.info())
    }

    pub fn drop_collection(&self, name: &str) -> Result<()> {
        {
            let _lifecycle = self.lifecycle.lock();
            let _gate = self.gate.read();
            if !self.registry.contains(name) {
                return Err(Error::CollectionNotFound(name.to_string()));
            }
            self.append(&WalRecord::DropCollection {
                name: name.to_string(),
            })?;
            self.registry.drop(name)?;
        }
        self.checkpoint_if_due();
        Ok(())
    }

    pub fn list_collections(&self) -> Vec<String> {
        self.registry.list()
    }

    pub fn collection_info(&self, name: &str) -> Result<CollectionInfo> {
        self.registry.info(name)
    }

    /// Merges `patch` into the collection's index config and returns the
    /// result. The log stores the merged config, never the patch.
    pub fn update_collection_config(
        &self,
        name: &str,
        patch: &IndexConfigPatch,
    ) -> Result<IndexConfig> {
        let merged = {
            let _lifecycle = self.lifecycle.lock();
            let _gate = self.gate.read();
            let collection = self.registry.get(name)?;
            collection.ensure_live()?;
            let merged = collection.config().merge(patch)?;
            self.append(&WalRecord::UpdateConfig {
                name: name.to_string(),
                index_config: merged,
            })?;
            self.registry.update_config(name, patch)?
        };
        self.checkpoint_if_due();
        Ok(merged)
    }

    pub fn upsert(&self, name: &str, points: Vec<PointInput>) -> Result<Vec<PointStatus>> {
        let collection = self.registry.get(name)?;
        let statuses = {
            let _gate = self.gate.read();
            mutation::upsert(&collection, points, self.mutation_log())?
        };
        self.checkpoint_if_due();
        Ok(statuses)
    }

    pub fn delete(&self, name: &str, ids: &[PointId]) -> Result<Vec<PointStatus>> {
        let collection = self.registry.get(name)?;
        let statuses = {
            let _gate = self.gate.read();
            mutation::delete(&collection, ids, self.mutation_log())?
        };
        self.checkpoint_if_due();
        Ok(statuses)
    }

    pub fn search(&self, name: &str, request: &SearchRequest) -> Result<SearchResponse> {
        let collection = self.registry.get(name)?;
        query::search(&collection, request, &self.config.search)
    }

    pub fn get_point(&self, name: &str, id: PointId) -> Result<Arc<PointRecord>> {
        let collection = self.registry.get(name)?;
        query::get_point(&collection, id)
    }

    pub fn get_points(&self, name: &str, ids: &[PointId]) -> Result<Vec<Arc<PointRecord>>> {
        let collection = self.registry.get(name)?;
        query::get_points(&collection, ids)
    }

    /// Rebuilds the graph of `name` without its deleted nodes regardless of
    /// the compaction threshold. Returns the number of nodes reclaimed.
    pub fn compact(&self, name: &str) -> Result<usize> {
        self.registry.get(name)?.compact()
    }

    /// Snapshots every collection and truncates the log. Returns `false`
    /// for in-memory engines.
    pub fn checkpoint(&self) -> Result<bool> {
        let Some(persistence) = &self.persistence else {
            return Ok(false);
        };
        let _gate = self.gate.write();
        persistence.checkpoint(&self.registry)?;
        Ok(true)
    }

    fn append(&self, record: &WalRecord) -> Result<()> {
        match &self.persistence {
            Some(persistence) => persistence.append(record).map_err(Error::from),
            None => Ok(()),
        }
    }

    fn mutation_log(&self) -> Option<&dyn MutationLog> {
        self.persistence
            .as_ref()
            .map(|persistence| persistence as &dyn MutationLog)
    }

    fn checkpoint_if_due(&self) {
        let Some(persistence) = &self.persistence else {
            return;
        };
        if !persistence.checkpoint_due() {
            return;
        }
        let _gate = self.gate.write();
        // Another writer may have checkpointed while this one waited.
        if persistence.checkpoint_due() {
            persistence.checkpoint_or_warn(&self.registry);
        }
    }
}

#[cfg(test)]
mod tests;
