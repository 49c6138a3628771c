use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use quarry_core::{Engine, PointStatus, SearchMode, WriteOutcome};

/// Process-level counters exported on `/metrics`.
pub(crate) struct ServerMetrics {
    registry: Registry,
    searches: IntCounterVec,
    search_timeouts: IntCounter,
    point_writes: IntCounterVec,
    collections: IntGauge,
    points: IntGauge,
}

impl ServerMetrics {
    pub(crate) fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();
        let searches = IntCounterVec::new(
            Opts::new("quarry_searches_total", "Searches served, by execution mode"),
            &["mode"],
        )?;
        let search_timeouts = IntCounter::new(
            "quarry_search_timeouts_total",
            "Searches that returned partial results at their deadline",
        )?;
        let point_writes = IntCounterVec::new(
            Opts::new("quarry_point_writes_total", "Per-point write results"),
            &["outcome"],
        )?;
        let collections = IntGauge::new("quarry_collections", "Live collections")?;
        let points = IntGauge::new("quarry_points", "Live points across all collections")?;

        registry.register(Box::new(searches.clone()))?;
        registry.register(Box::new(search_timeouts.clone()))?;
        registry.register(Box::new(point_writes.clone()))?;
        registry.register(Box::new(collections.clone()))?;
        registry.register(Box::new(points.clone()))?;

        Ok(Self {
            registry,
            searches,
            search_timeouts,
            point_writes,
            collections,
            points,
        })
    }

    pub(crate) fn record_search(&self, mode: SearchMode, timed_out: bool) {
        let label = match mode {
            SearchMode::Exact => "exact",
            SearchMode::Hnsw => "hnsw",
        };
        self.searches.with_label_values(&[label]).inc();
        if timed_out {
            self.search_timeouts.inc();
        }
    }

    pub(crate) fn record_writes(&self, statuses: &[PointStatus]) {
        for status in statuses {
            let label = match &status.result {
                Ok(WriteOutcome::Created) => "created",
                Ok(WriteOutcome::Updated) => "updated",
                Ok(WriteOutcome::Unchanged) => "unchanged",
                Ok(WriteOutcome::Deleted) => "deleted",
                Err(_) => "rejected",
            };
            self.point_writes.with_label_values(&[label]).inc();
        }
    }

    /// Refreshes the gauges from `engine` and encodes every family.
    pub(crate) fn render(&self, engine: &Engine) -> Result<Vec<u8>, prometheus::Error> {
        let handles = engine.registry().collections();
        let points: usize = handles.iter().map(|collection| collection.live_len()).sum();
        self.collections.set(handles.len() as i64);
        self.points.set(points as i64);

        let mut encoded = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut encoded)?;
        Ok(encoded)
    }
}
