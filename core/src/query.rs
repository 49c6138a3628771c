//! Search over one collection.
//!
//! Small collections, and collections whose graph is not built yet, are
//! ranked by an exact scan of the point store. Larger ones ask the graph for
//! `limit * over_fetch_factor` candidates, rescore every candidate from its
//! current record, drop tombstoned or filtered ones and widen the request
//! until `limit` hits survive or the candidate cap is reached.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::collection::Collection;
use crate::config::SearchConfig;
use crate::error::Result;
use crate::filter::{self, Filter};
use crate::payload::Payload;
use crate::point_store::{PointId, PointRecord, PointStore};
use crate::vector::VectorSpace;

/// Points scanned between two deadline checks on the exact path.
const EXACT_DEADLINE_CHECK_INTERVAL: usize = 256;

#[derive(Debug, Clone, PartialEq)]
pub struct SearchRequest {
    pub vector: Vec<f32>,
    pub limit: usize,
    pub filter: Option<Filter>,
    /// Overrides the collection's `ef_search`.
    pub ef: Option<usize>,
    pub deadline: Option<Instant>,
    pub with_payload: bool,
    pub with_vector: bool,
}

impl SearchRequest {
    pub fn new(vector: Vec<f32>, limit: usize) -> Self {
        Self {
            vector,
            limit,
            filter: None,
            ef: None,
            deadline: None,
            with_payload: true,
            with_vector: false,
        }
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn ef(mut self, ef: usize) -> Self {
        self.ef = Some(ef);
        self
    }

    pub fn deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn timeout(self, timeout: Duration) -> Self {
        self.deadline(Instant::now() + timeout)
    }

    pub fn with_payload(mut self, with_payload: bool) -> Self {
        self.with_payload = with_payload;
        self
    }

    pub fn with_vector(mut self, with_vector: bool) -> Self {
        self.with_vector = with_vector;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredPoint {
    pub id: PointId,
    pub score: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Payload>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vector: Option<Vec<f32>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchMode {
    Exact,
    Hnsw,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
    /// Best first: score descending, ties by ascending id.
    pub hits: Vec<ScoredPoint>,
    pub mode: SearchMode,
    /// The deadline passed; `hits` are best effort.
    pub timed_out: bool,
}

pub fn search(
    collection: &Collection,
    request: &SearchRequest,
    search_config: &SearchConfig,
) -> Result<SearchResponse> {
    collection.ensure_live()?;
    let space = collection.space();
    space.validate(&request.vector)?;
    if let Some(filter) = &request.filter {
        filter::validate(filter)?;
    }

    let config = collection.config();
    let mode = if collection.index_ready() && collection.live_len() >= config.full_scan_threshold
    {
        SearchMode::Hnsw
    } else {
        SearchMode::Exact
    };
    if request.limit == 0 {
        return Ok(SearchResponse {
            hits: Vec::new(),
            mode,
            timed_out: false,
        });
    }

    let ef_search = request.ef.unwrap_or(config.ef_search);
    let (ranked, mode, timed_out) = match mode {
        SearchMode::Exact => {
            let (ranked, timed_out) = exact_search(collection, space, request);
            (ranked, SearchMode::Exact, timed_out)
        }
        SearchMode::Hnsw => {
            let graph = hnsw_search(collection, space, request, ef_search, search_config)?;
            match graph {
                Some((ranked, timed_out)) => (ranked, SearchMode::Hnsw, timed_out),
                None => {
                    let (ranked, timed_out) = exact_search(collection, space, request);
                    (ranked, SearchMode::Exact, timed_out)
                }
            }
        }
    };

    // A drop that raced this search may have emptied the store under it.
    collection.ensure_live()?;

    let hits = ranked
        .into_iter()
        .map(|ranked| ScoredPoint {
            id: ranked.record.id,
            score: ranked.score,
            payload: request.with_payload.then(|| ranked.record.payload.clone()),
            vector: request.with_vector.then(|| ranked.record.vector.clone()),
        })
        .collect();

    Ok(SearchResponse {
        hits,
        mode,
        timed_out,
    })
}

/// Live records for `ids`, in request order; missing ids are skipped.
pub fn get_points(collection: &Collection, ids: &[PointId]) -> Result<Vec<Arc<PointRecord>>> {
    collection.ensure_live()?;
    let store = collection.store();
    Ok(ids.iter().filter_map(|&id| store.get(id).ok()).collect())
}

pub fn get_point(collection: &Collection, id: PointId) -> Result<Arc<PointRecord>> {
    collection.ensure_live()?;
    collection.store().get(id)
}

fn exact_search(
    collection: &Collection,
    space: VectorSpace,
    request: &SearchRequest,
) -> (Vec<Ranked>, bool) {
    let store = collection.store();
    let mut top = TopK::new(request.limit);
    let mut timed_out = false;

    for (scanned, record) in store.iter_live().enumerate() {
        if scanned % EXACT_DEADLINE_CHECK_INTERVAL == 0 && deadline_passed(request.deadline) {
            debug!(
                collection = collection.name(),
                scanned, "exact search stopped at deadline"
            );
            timed_out = true;
            break;
        }
        if !accepts(request.filter.as_ref(), record) {
            continue;
        }
        top.offer(space.score(&request.vector, &record.vector), record);
    }

    (top.into_sorted(), timed_out)
}

/// `None` when the graph vanished between mode selection and search.
fn hnsw_search(
    collection: &Collection,
    space: VectorSpace,
    request: &SearchRequest,
    ef_search: usize,
    search_config: &SearchConfig,
) -> Result<Option<(Vec<Ranked>, bool)>> {
    let max_candidates = search_config.max_candidates.max(request.limit);
    let mut fetch_k = request
        .limit
        .saturating_mul(search_config.over_fetch_factor)
        .min(max_candidates);

    loop {
        let purge_epoch = collection.purge_epoch();
        let (outcome, indexed) = {
            let index = collection.index();
            let Some(index) = index.as_ref() else {
                return Ok(None);
            };
            let indexed = index.live_len();
            fetch_k = fetch_k.min(indexed).max(request.limit);
            let outcome = index.search(
                &request.vector,
                fetch_k,
                ef_search.max(fetch_k),
                request.deadline,
            )?;
            (outcome, indexed)
        };
        let exhausted = outcome.neighbors.len() < fetch_k || fetch_k >= indexed;

        let store = collection.store();
        let mut top = TopK::new(request.limit);
        let mut stale = 0usize;
        for neighbor in &outcome.neighbors {
            let Some(record) = resolve(collection, &store, neighbor.id, purge_epoch) else {
                continue;
            };
            if record.revision != neighbor.revision {
                stale += 1;
            }
            if !accepts(request.filter.as_ref(), record) {
                continue;
            }
            top.offer(space.score(&request.vector, &record.vector), record);
        }
        if stale > 0 {
            debug!(
                collection = collection.name(),
                stale, "rescored candidates written after the graph search"
            );
        }

        let done = top.is_full()
            || exhausted
            || outcome.timed_out
            || fetch_k >= max_candidates
            || deadline_passed(request.deadline);
        if done {
            return Ok(Some((top.into_sorted(), outcome.timed_out)));
        }
        fetch_k = fetch_k.saturating_mul(2).min(max_candidates);
    }
}

/// Live record behind a graph candidate. Tombstoned points lost a race with
/// a delete and purged ones with a compaction; an id the store has never
/// seen while no purge ran is an index anomaly.
fn resolve<'a>(
    collection: &Collection,
    store: &'a PointStore,
    id: PointId,
    purge_epoch: u64,
) -> Option<&'a Arc<PointRecord>> {
    match store.lookup(id) {
        Some(record) if !record.tombstone => Some(record),
        Some(_) => None,
        None => {
            if collection.is_dropped() {
                return None;
            }
            if collection.purge_epoch() != purge_epoch {
                debug!(
                    collection = collection.name(),
                    id, "graph candidate purged by a concurrent compaction"
                );
            } else {
                warn!(
                    collection = collection.name(),
                    id, "graph candidate missing from point store, skipped"
                );
            }
            None
        }
    }
}

fn accepts(filter: Option<&Filter>, record: &PointRecord) -> bool {
    filter.map_or(true, |filter| filter::evaluate(filter, &record.payload))
}

fn deadline_passed(deadline: Option<Instant>) -> bool {
    deadline.is_some_and(|deadline| Instant::now() >= deadline)
}

struct Ranked {
    score: f32,
    record: Arc<PointRecord>,
}

impl PartialEq for Ranked {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Ranked {}

impl PartialOrd for Ranked {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Better hits order first: higher score, then lower id.
impl Ord for Ranked {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .score
            .total_cmp(&self.score)
            .then_with(|| self.record.id.cmp(&other.record.id))
    }
}

/// Bounded max-heap whose top is the worst kept hit.
struct TopK {
    keep: usize,
    heap: BinaryHeap<Ranked>,
}

impl TopK {
    fn new(keep: usize) -> Self {
        Self {
            keep,
            heap: BinaryHeap::with_capacity(keep.saturating_add(1).min(1_024)),
        }
    }

    fn offer(&mut self, score: f32, record: &Arc<PointRecord>) {
        let candidate = Ranked {
            score,
            record: Arc::clone(record),
        };
        if self.heap.len() < self.keep {
            self.heap.push(candidate);
            return;
        }
        let better = self
            .heap
            .peek()
            .is_some_and(|worst| candidate.cmp(worst).is_lt());
        if better {
            self.heap.pop();
            self.heap.push(candidate);
        }
    }

    fn is_full(&self) -> bool {
        self.heap.len() >= self.keep
    }

    fn into_sorted(self) -> Vec<Ranked> {
        self.heap.into_sorted_vec()
    }
}
