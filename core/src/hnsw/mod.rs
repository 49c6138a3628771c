//! Hierarchical navigable small world graph over one collection's vectors.
//!
//! Nodes are append-only. Re-inserting an id soft-deletes its previous node
//! and appends a fresh one; deleted nodes keep their edges so searches can
//! still route through them, but they are never returned. Once the deleted
//! fraction grows past the collection's threshold the owner rebuilds the
//! graph with [`HnswIndex::build`].

mod insert;
mod search;
mod visited;

use std::collections::HashMap;
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::IndexConfig;
use crate::error::{Error, Result};
use crate::point_store::{PointId, PointRecord};
use crate::vector::VectorSpace;

pub use search::{Neighbor, SearchOutcome};

/// Upper bound on node levels; the level draw is clamped to it.
const MAX_LEVEL: usize = 16;

#[derive(Debug)]
pub struct HnswIndex {
    space: VectorSpace,
    m: usize,
    m0: usize,
    ef_construction: usize,
    level_multiplier: f64,
    /// Index representations, `dimension` floats per node.
    vectors: Vec<f32>,
    /// `[node][layer] -> neighbor nodes`.
    neighbors: Vec<Vec<Vec<u32>>>,
    deleted: Vec<bool>,
    node_ids: Vec<PointId>,
    revisions: Vec<u64>,
    nodes_by_id: HashMap<PointId, u32>,
    entry_point: Option<u32>,
    max_layer: usize,
    deleted_count: usize,
    rng: StdRng,
}

impl HnswIndex {
    pub fn new(space: VectorSpace, config: &IndexConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            space,
            m: config.m,
            m0: config.m0(),
            ef_construction: config.ef_construction,
            level_multiplier: 1.0 / (config.m as f64).ln(),
            vectors: Vec::new(),
            neighbors: Vec::new(),
            deleted: Vec::new(),
            node_ids: Vec::new(),
            revisions: Vec::new(),
            nodes_by_id: HashMap::new(),
            entry_point: None,
            max_layer: 0,
            deleted_count: 0,
            rng,
        }
    }

    /// Builds a fresh graph over `points`, skipping tombstoned records.
    pub fn build<'a>(
        space: VectorSpace,
        config: &IndexConfig,
        points: impl IntoIterator<Item = &'a Arc<PointRecord>>,
    ) -> Result<Self> {
        let mut index = Self::new(space, config);
        for record in points {
            if record.tombstone {
                continue;
            }
            index.insert(record.id, &record.vector, record.revision)?;
        }
        Ok(index)
    }

    pub fn space(&self) -> VectorSpace {
        self.space
    }

    /// Nodes in the graph, deleted ones included.
    pub fn node_count(&self) -> usize {
        self.node_ids.len()
    }

    pub fn live_len(&self) -> usize {
        self.node_count() - self.deleted_count
    }

    pub fn deleted_len(&self) -> usize {
        self.deleted_count
    }

    pub fn is_empty(&self) -> bool {
        self.live_len() == 0
    }

    pub fn deleted_fraction(&self) -> f64 {
        if self.node_ids.is_empty() {
            return 0.0;
        }
        self.deleted_count as f64 / self.node_ids.len() as f64
    }

    pub fn needs_compaction(&self, threshold: f64) -> bool {
        self.deleted_count > 0 && self.deleted_fraction() >= threshold
    }

    pub fn contains(&self, id: PointId) -> bool {
        self.nodes_by_id.contains_key(&id)
    }

    /// Revision the live node of `id` was last written at.
    pub fn revision_of(&self, id: PointId) -> Option<u64> {
        self.nodes_by_id
            .get(&id)
            .map(|&node| self.revisions[node as usize])
    }

    /// Records a write that left the vector untouched.
    pub fn touch(&mut self, id: PointId, revision: u64) -> bool {
        match self.nodes_by_id.get(&id) {
            Some(&node) => {
                self.revisions[node as usize] = revision;
                true
            }
            None => false,
        }
    }

    /// Hides the live node of `id` from results. Returns whether one existed.
    pub fn soft_delete(&mut self, id: PointId) -> bool {
        let Some(node) = self.nodes_by_id.remove(&id) else {
            return false;
        };
        self.deleted[node as usize] = true;
        self.deleted_count += 1;
        true
    }

    fn vector(&self, node: u32) -> &[f32] {
        let dimension = self.space.dimension();
        let start = node as usize * dimension;
        &self.vectors[start..start + dimension]
    }

    fn distance(&self, query: &[f32], node: u32) -> f32 {
        self.space.index_distance(query, self.vector(node))
    }

    fn is_deleted(&self, node: u32) -> bool {
        self.deleted[node as usize]
    }

    fn max_degree(&self, layer: usize) -> usize {
        if layer == 0 {
            self.m0
        } else {
            self.m
        }
    }

    /// Draws a level from the geometric distribution `floor(-ln(U) / ln(m))`.
    fn random_level(&mut self) -> usize {
        let uniform: f64 = self.rng.gen_range(f64::MIN_POSITIVE..1.0);
        let level = (-uniform.ln() * self.level_multiplier).floor() as usize;
        level.min(MAX_LEVEL)
    }

    fn next_node(&self) -> Result<u32> {
        u32::try_from(self.node_ids.len())
            .map_err(|_| Error::InvalidConfig("index node capacity exhausted".to_string()))
    }
}
