use std::cell::RefCell;
use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::time::Instant;

use tracing::debug;

use super::visited::VisitedSet;
use super::HnswIndex;
use crate::error::Result;
use crate::point_store::PointId;

/// Expansions between two deadline checks.
const DEADLINE_CHECK_INTERVAL: usize = 32;

thread_local! {
    static SEARCH_VISITED: RefCell<VisitedSet> = RefCell::new(VisitedSet::default());
}

/// Graph hit: the point, its index distance (lower is closer) and the
/// revision its node was written at.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    pub id: PointId,
    pub distance: f32,
    pub revision: u64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchOutcome {
    /// Closest live neighbors, nearest first.
    pub neighbors: Vec<Neighbor>,
    /// The deadline cut expansion short.
    pub timed_out: bool,
}

#[derive(Debug, Clone, Copy)]
pub(super) struct Scored {
    pub(super) distance: f32,
    pub(super) node: u32,
}

impl PartialEq for Scored {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Scored {}

impl PartialOrd for Scored {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Scored {
    fn cmp(&self, other: &Self) -> Ordering {
        self.distance
            .total_cmp(&other.distance)
            .then_with(|| self.node.cmp(&other.node))
    }
}

pub(super) struct LayerResult {
    /// Nearest first.
    pub(super) found: Vec<Scored>,
    pub(super) expired: bool,
}

impl HnswIndex {
    /// Approximate `k` nearest live points to `query`.
    ///
    /// `ef` is raised to `k` when smaller. Past `deadline` expansion stops
    /// and whatever was gathered is returned with `timed_out` set.
    pub fn search(
        &self,
        query: &[f32],
        k: usize,
        ef: usize,
        deadline: Option<Instant>,
    ) -> Result<SearchOutcome> {
        self.space.validate(query)?;
        let Some(entry_point) = self.entry_point else {
            return Ok(SearchOutcome::default());
        };
        if k == 0 || self.is_empty() {
            return Ok(SearchOutcome::default());
        }

        let query = self.space.index_repr(query);
        let ef = ef.max(k);

        SEARCH_VISITED.with(|cell| {
            let mut visited = cell.borrow_mut();
            let mut current = entry_point;
            let mut timed_out = false;

            for layer in (1..=self.max_layer).rev() {
                let result =
                    self.search_layer(&query, &[current], 1, layer, &mut visited, deadline, true);
                if let Some(nearest) = result.found.first() {
                    current = nearest.node;
                }
                if result.expired {
                    timed_out = true;
                    break;
                }
            }

            let result = self.search_layer(&query, &[current], ef, 0, &mut visited, deadline, false);
            timed_out |= result.expired;
            if timed_out {
                debug!(
                    gathered = result.found.len(),
                    "hnsw search stopped at deadline"
                );
            }

            let neighbors = result
                .found
                .into_iter()
                .take(k)
                .map(|scored| Neighbor {
                    id: self.node_ids[scored.node as usize],
                    distance: scored.distance,
                    revision: self.revisions[scored.node as usize],
                })
                .collect();

            Ok(SearchOutcome {
                neighbors,
                timed_out,
            })
        })
    }

    /// Best-first search of one layer from `entry_points`, keeping the `ef`
    /// closest nodes. Deleted nodes are always expanded but only kept when
    /// `keep_deleted` is set.
    #[allow(clippy::too_many_arguments)]
    pub(super) fn search_layer(
        &self,
        query: &[f32],
        entry_points: &[u32],
        ef: usize,
        layer: usize,
        visited: &mut VisitedSet,
        deadline: Option<Instant>,
        keep_deleted: bool,
    ) -> LayerResult {
        visited.reset(self.node_count());
        let mut candidates: BinaryHeap<Reverse<Scored>> = BinaryHeap::with_capacity(ef * 2);
        let mut found: BinaryHeap<Scored> = BinaryHeap::with_capacity(ef + 1);
        let mut worst = f32::INFINITY;
        let mut expired = false;

        for &node in entry_points {
            if !visited.insert(node) {
                continue;
            }
            let scored = Scored {
                distance: self.distance(query, node),
                node,
            };
            candidates.push(Reverse(scored));
            if keep_deleted || !self.is_deleted(node) {
                found.push(scored);
            }
        }
        if found.len() > ef {
            let mut kept = found.into_sorted_vec();
            kept.truncate(ef);
            found = kept.into_iter().collect();
        }
        if found.len() >= ef {
            worst = found.peek().map_or(f32::INFINITY, |scored| scored.distance);
        }

        let mut expansions = 0usize;
        while let Some(Reverse(candidate)) = candidates.pop() {
            if found.len() >= ef && candidate.distance > worst {
                break;
            }
            if let Some(deadline) = deadline {
                if expansions % DEADLINE_CHECK_INTERVAL == 0 && Instant::now() >= deadline {
                    expired = true;
                    break;
                }
            }
            expansions += 1;

            let Some(links) = self.neighbors[candidate.node as usize].get(layer) else {
                continue;
            };
            for &neighbor in links {
                if !visited.insert(neighbor) {
                    continue;
                }
                let distance = self.distance(query, neighbor);
                if found.len() >= ef && distance >= worst {
                    continue;
                }

                let scored = Scored {
                    distance,
                    node: neighbor,
                };
                candidates.push(Reverse(scored));
                if keep_deleted || !self.is_deleted(neighbor) {
                    found.push(scored);
                    if found.len() > ef {
                        found.pop();
                    }
                    if found.len() >= ef {
                        worst = found.peek().map_or(f32::INFINITY, |scored| scored.distance);
                    }
                }
            }
        }

        LayerResult {
            found: found.into_sorted_vec(),
            expired,
        }
    }
}
