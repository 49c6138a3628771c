use std::time::Instant;

use quarry_core::{Engine, IndexConfig, Metric, SearchMode, SearchRequest};

use crate::{
    clustered_vectors, engine_with_collection, load_points, recall_at_k, summarize_percentiles,
    uniform_vectors,
};

const TOPK: usize = 10;
const QUERY_COUNT: usize = 128;
const EF_SWEEP: [usize; 4] = [16, 64, 128, 256];
const COLLECTION: &str = "bench";

#[derive(Clone, Copy)]
enum DatasetKind {
    Uniform,
    Clustered,
}

#[derive(Clone, Copy)]
struct DatasetSpec {
    name: &'static str,
    points: usize,
    dimension: usize,
    metric: Metric,
    kind: DatasetKind,
}

struct BenchRow {
    dataset: &'static str,
    mode: &'static str,
    ef: Option<usize>,
    recall_at_k: f64,
    p50_ms: f64,
    p95_ms: f64,
    p99_ms: f64,
}

pub(crate) fn run_search_quality_bench(mode: &str) -> bool {
    let specs = [
        DatasetSpec {
            name: "uniform_20000_d64_l2",
            points: 20_000,
            dimension: 64,
            metric: Metric::Euclidean,
            kind: DatasetKind::Uniform,
        },
        DatasetSpec {
            name: "clustered_20000_d64_cosine",
            points: 20_000,
            dimension: 64,
            metric: Metric::Cosine,
            kind: DatasetKind::Clustered,
        },
    ];

    println!("bench=search_quality mode={mode} query_count={QUERY_COUNT} topk={TOPK}");

    for spec in specs {
        let Some(rows) = run_dataset(spec) else {
            return false;
        };

        println!("dataset={}", spec.name);
        println!("| dataset | mode | ef | recall@{TOPK} | p50_ms | p95_ms | p99_ms |");
        println!("|---|---|---:|---:|---:|---:|---:|");
        for row in rows {
            let ef = row.ef.map_or_else(|| "-".to_string(), |ef| ef.to_string());
            println!(
                "| {} | {} | {} | {:.4} | {:.6} | {:.6} | {:.6} |",
                row.dataset, row.mode, ef, row.recall_at_k, row.p50_ms, row.p95_ms, row.p99_ms
            );
            println!(
                "bench=search_quality_row dataset={} mode={} ef={} recall_at_k={:.6} p50_ms={:.6} p95_ms={:.6} p99_ms={:.6}",
                row.dataset, row.mode, ef, row.recall_at_k, row.p50_ms, row.p95_ms, row.p99_ms
            );
        }
    }

    true
}

fn run_dataset(spec: DatasetSpec) -> Option<Vec<BenchRow>> {
    let (points, queries) = match spec.kind {
        DatasetKind::Uniform => (
            uniform_vectors(spec.points, spec.dimension, 1),
            uniform_vectors(QUERY_COUNT, spec.dimension, 2),
        ),
        DatasetKind::Clustered => (
            clustered_vectors(spec.points, spec.dimension, 16, 3),
            clustered_vectors(QUERY_COUNT, spec.dimension, 16, 4),
        ),
    };

    let exact = engine_with_collection(
        COLLECTION,
        spec.dimension,
        spec.metric,
        IndexConfig {
            full_scan_threshold: usize::MAX,
            ..IndexConfig::default()
        },
    )?;
    let graph = engine_with_collection(
        COLLECTION,
        spec.dimension,
        spec.metric,
        IndexConfig {
            full_scan_threshold: 1,
            seed: Some(7),
            ..IndexConfig::default()
        },
    )?;

    let build_started = Instant::now();
    if !load_points(&graph, COLLECTION, &points) {
        return None;
    }
    println!(
        "bench=hnsw_build dataset={} points={} build_ms={:.3}",
        spec.name,
        spec.points,
        build_started.elapsed().as_secs_f64() * 1_000.0
    );
    if !load_points(&exact, COLLECTION, &points) {
        return None;
    }

    let mut truths = Vec::with_capacity(queries.len());
    let mut exact_latencies = Vec::with_capacity(queries.len());
    for query in &queries {
        let (ids, elapsed_ms, search_mode) = timed_search(&exact, query, None)?;
        if search_mode != SearchMode::Exact {
            eprintln!("error=unexpected_mode expected=exact");
            return None;
        }
        exact_latencies.push(elapsed_ms);
        truths.push(ids);
    }

    let mut rows = Vec::with_capacity(EF_SWEEP.len() + 1);
    let (p50_ms, p95_ms, p99_ms) = summarize_percentiles(&exact_latencies);
    rows.push(BenchRow {
        dataset: spec.name,
        mode: "exact",
        ef: None,
        recall_at_k: 1.0,
        p50_ms,
        p95_ms,
        p99_ms,
    });

    for ef in EF_SWEEP {
        let mut latencies = Vec::with_capacity(queries.len());
        let mut recall_sum = 0.0f64;
        for (query, truth) in queries.iter().zip(&truths) {
            let (ids, elapsed_ms, search_mode) = timed_search(&graph, query, Some(ef))?;
            if search_mode != SearchMode::Hnsw {
                eprintln!("error=unexpected_mode expected=hnsw");
                return None;
            }
            latencies.push(elapsed_ms);
            recall_sum += recall_at_k(&ids, truth);
        }
        let (p50_ms, p95_ms, p99_ms) = summarize_percentiles(&latencies);
        rows.push(BenchRow {
            dataset: spec.name,
            mode: "hnsw",
            ef: Some(ef),
            recall_at_k: recall_sum / queries.len() as f64,
            p50_ms,
            p95_ms,
            p99_ms,
        });
    }

    Some(rows)
}

fn timed_search(
    engine: &Engine,
    query: &[f32],
    ef: Option<usize>,
) -> Option<(Vec<u64>, f64, SearchMode)> {
    let mut request = SearchRequest::new(query.to_vec(), TOPK).with_payload(false);
    if let Some(ef) = ef {
        request = request.ef(ef);
    }
    let started = Instant::now();
    let response = match engine.search(COLLECTION, &request) {
        Ok(response) => response,
        Err(error) => {
            eprintln!("error=search_failed detail=\"{error}\"");
            return None;
        }
    };
    let elapsed_ms = started.elapsed().as_secs_f64() * 1_000.0;
    let ids = response.hits.iter().map(|hit| hit.id).collect();
    Some((ids, elapsed_ms, response.mode))
}
