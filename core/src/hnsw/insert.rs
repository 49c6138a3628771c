use std::collections::HashSet;

use super::search::Scored;
use super::visited::VisitedSet;
use super::HnswIndex;
use crate::error::Result;
use crate::point_store::PointId;

impl HnswIndex {
    /// Links `vector` into the graph under `id`. A previous node of the same
    /// id is soft-deleted first, so the graph never mutates a node in place.
    pub fn insert(&mut self, id: PointId, vector: &[f32], revision: u64) -> Result<()> {
        self.space.validate(vector)?;
        let node = self.next_node()?;
        self.soft_delete(id);

        let repr = self.space.index_repr(vector);
        let level = self.random_level();

        // Nothing live to link to: the new node starts a fresh graph and the
        // deleted remainder becomes unreachable.
        let entry_point = match self.entry_point {
            Some(entry_point) if !self.is_empty() => entry_point,
            _ => {
                self.push_node(id, revision, &repr, vec![Vec::new(); level + 1]);
                self.entry_point = Some(node);
                self.max_layer = level;
                return Ok(());
            }
        };

        let mut visited = VisitedSet::with_capacity(self.node_count());
        let mut current = entry_point;
        for layer in (level + 1..=self.max_layer).rev() {
            let result = self.search_layer(&repr, &[current], 1, layer, &mut visited, None, true);
            if let Some(nearest) = result.found.first() {
                current = nearest.node;
            }
        }

        let top = level.min(self.max_layer);
        let mut links = vec![Vec::new(); level + 1];
        let mut entry_points = vec![current];
        for layer in (0..=top).rev() {
            let result = self.search_layer(
                &repr,
                &entry_points,
                self.ef_construction,
                layer,
                &mut visited,
                None,
                false,
            );
            links[layer] = self
                .select_neighbors(&result.found, self.max_degree(layer))
                .into_iter()
                .map(|scored| scored.node)
                .collect();
            if !result.found.is_empty() {
                entry_points = result.found.iter().map(|scored| scored.node).collect();
            }
        }

        self.push_node(id, revision, &repr, links);

        for layer in 0..=top {
            let max_degree = self.max_degree(layer);
            let own_links = self.neighbors[node as usize][layer].clone();
            for neighbor in own_links {
                self.link(neighbor, node, layer, max_degree);
            }
        }

        if level > self.max_layer {
            self.max_layer = level;
            self.entry_point = Some(node);
        }
        Ok(())
    }

    fn push_node(&mut self, id: PointId, revision: u64, repr: &[f32], links: Vec<Vec<u32>>) {
        let node = self.node_ids.len() as u32;
        self.vectors.extend_from_slice(repr);
        self.neighbors.push(links);
        self.deleted.push(false);
        self.node_ids.push(id);
        self.revisions.push(revision);
        self.nodes_by_id.insert(id, node);
    }

    /// Adds the edge `from -> to`, re-pruning `from` when it exceeds its degree.
    fn link(&mut self, from: u32, to: u32, layer: usize, max_degree: usize) {
        let lists = &mut self.neighbors[from as usize];
        if lists.len() <= layer {
            lists.resize_with(layer + 1, Vec::new);
        }
        lists[layer].push(to);
        if lists[layer].len() <= max_degree {
            return;
        }

        let base = self.vector(from);
        let candidates: Vec<Scored> = self.neighbors[from as usize][layer]
            .iter()
            .map(|&candidate| Scored {
                distance: self.space.index_distance(base, self.vector(candidate)),
                node: candidate,
            })
            .collect();
        let kept = self
            .select_neighbors(&candidates, max_degree)
            .into_iter()
            .map(|scored| scored.node)
            .collect();
        self.neighbors[from as usize][layer] = kept;
    }

    /// Heuristic selection: walking candidates nearest first, keep one only
    /// if it is closer to the base than to every neighbor already kept.
    /// Remaining slots are topped up with the nearest skipped candidates.
    /// Deleted nodes are never selected.
    fn select_neighbors(&self, candidates: &[Scored], limit: usize) -> Vec<Scored> {
        let mut sorted: Vec<Scored> = candidates
            .iter()
            .copied()
            .filter(|scored| !self.is_deleted(scored.node))
            .collect();
        sorted.sort_unstable();
        sorted.dedup_by_key(|scored| scored.node);

        let mut selected: Vec<Scored> = Vec::with_capacity(limit);
        for &candidate in &sorted {
            if selected.len() >= limit {
                break;
            }
            let candidate_vector = self.vector(candidate.node);
            let diverse = selected.iter().all(|kept| {
                candidate.distance
                    <= self
                        .space
                        .index_distance(candidate_vector, self.vector(kept.node))
            });
            if diverse {
                selected.push(candidate);
            }
        }

        if selected.len() < limit {
            let chosen: HashSet<u32> = selected.iter().map(|scored| scored.node).collect();
            selected.extend(
                sorted
                    .iter()
                    .filter(|scored| !chosen.contains(&scored.node))
                    .take(limit - selected.len())
                    .copied(),
            );
        }

        selected
    }
}
