use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::info;

use crate::collection::{Collection, CollectionInfo};
use crate::config::{IndexConfig, IndexConfigPatch};
use crate::error::{Error, Result};
use crate::vector::VectorSpace;

/// Named collections of one engine.
///
/// Handles are `Arc`s: an operation that fetched one keeps working against
/// it after a concurrent drop and then observes `CollectionDropped`.
#[derive(Debug, Default)]
pub struct CollectionRegistry {
    collections: DashMap<String, Arc<Collection>>,
}

impl CollectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(
        &self,
        name: &str,
        space: VectorSpace,
        config: IndexConfig,
    ) -> Result<Arc<Collection>> {
        let collection = Arc::new(Collection::new(name, space, config)?);
        match self.collections.entry(name.to_string()) {
            Entry::Occupied(_) => Err(Error::AlreadyExists(name.to_string())),
            Entry::Vacant(slot) => {
                slot.insert(Arc::clone(&collection));
                info!(
                    collection = name,
                    dimension = space.dimension(),
                    metric = space.metric().as_str(),
                    "collection created"
                );
                Ok(collection)
            }
        }
    }

    /// Removes `name` and releases its points and graph. In-flight
    /// operations on the removed handle fail with `CollectionDropped`.
    pub fn drop(&self, name: &str) -> Result<()> {
        let (_, collection) = self
            .collections
            .remove(name)
            .ok_or_else(|| Error::CollectionNotFound(name.to_string()))?;
        collection.mark_dropped();
        info!(collection = name, "collection dropped");
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<Arc<Collection>> {
        self.collections
            .get(name)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| Error::CollectionNotFound(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.collections.contains_key(name)
    }

    /// Collection names in ascending order.
    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .collections
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.collections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.collections.is_empty()
    }

    /// Merges `patch` into the live config. Nothing is rebuilt; a lowered
    /// full-scan threshold builds the graph on the next write.
    pub fn update_config(&self, name: &str, patch: &IndexConfigPatch) -> Result<IndexConfig> {
        let collection = self.get(name)?;
        collection.ensure_live()?;
        let merged = collection.config().merge(patch)?;
        collection.set_config(merged);
        info!(
            collection = name,
            ef_search = merged.ef_search,
            full_scan_threshold = merged.full_scan_threshold,
            compaction_threshold = merged.compaction_threshold,
            "collection config updated"
        );
        Ok(merged)
    }

    pub fn info(&self, name: &str) -> Result<CollectionInfo> {
        let collection = self.get(name)?;
        collection.ensure_live()?;
        Ok(collection.info())
    }

    /// Handles of every collection, sorted by name.
    pub fn collections(&self) -> Vec<Arc<Collection>> {
        let mut handles: Vec<Arc<Collection>> = self
            .collections
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        handles.sort_unstable_by(|left, right| left.name().cmp(right.name()));
        handles
    }
}
