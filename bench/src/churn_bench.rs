use std::time::Instant;

use quarry_core::{IndexConfig, Metric, SearchRequest};

use crate::{engine_with_collection, load_points, recall_at_k, uniform_vectors};

const POINTS: usize = 20_000;
const DIMENSION: usize = 32;
const DELETE_EVERY: usize = 4;
const QUERY_COUNT: usize = 64;
const TOPK: usize = 10;
const COLLECTION: &str = "churn";

/// Loads a graph-backed collection, deletes a quarter of it (past the default
/// compaction threshold) and reports write throughput and recall afterwards.
pub(crate) fn run_churn_bench(mode: &str) -> bool {
    let Some(engine) = engine_with_collection(
        COLLECTION,
        DIMENSION,
        Metric::Euclidean,
        IndexConfig {
            full_scan_threshold: 1,
            seed: Some(5),
            ..IndexConfig::default()
        },
    ) else {
        return false;
    };
    let points = uniform_vectors(POINTS, DIMENSION, 21);

    let upsert_started = Instant::now();
    if !load_points(&engine, COLLECTION, &points) {
        return false;
    }
    let upsert_elapsed = upsert_started.elapsed();

    let doomed: Vec<u64> = (0..POINTS as u64)
        .filter(|id| *id as usize % DELETE_EVERY == 0)
        .collect();
    let delete_started = Instant::now();
    if let Err(error) = engine.delete(COLLECTION, &doomed) {
        eprintln!("error=delete_failed detail=\"{error}\"");
        return false;
    }
    let delete_elapsed = delete_started.elapsed();

    let info = match engine.collection_info(COLLECTION) {
        Ok(info) => info,
        Err(error) => {
            eprintln!("error=info_failed detail=\"{error}\"");
            return false;
        }
    };

    let exact = match engine_with_collection(
        COLLECTION,
        DIMENSION,
        Metric::Euclidean,
        IndexConfig {
            full_scan_threshold: usize::MAX,
            ..IndexConfig::default()
        },
    ) {
        Some(engine) => engine,
        None => return false,
    };
    if !load_points(&exact, COLLECTION, &points) {
        return false;
    }
    if let Err(error) = exact.delete(COLLECTION, &doomed) {
        eprintln!("error=delete_failed detail=\"{error}\"");
        return false;
    }

    let mut recall_sum = 0.0f64;
    for query in uniform_vectors(QUERY_COUNT, DIMENSION, 22) {
        let request = SearchRequest::new(query, TOPK).with_payload(false);
        let (graph_hits, exact_hits) = match (
            engine.search(COLLECTION, &request),
            exact.search(COLLECTION, &request),
        ) {
            (Ok(graph), Ok(exact)) => (graph.hits, exact.hits),
            (Err(error), _) | (_, Err(error)) => {
                eprintln!("error=search_failed detail=\"{error}\"");
                return false;
            }
        };
        let measured: Vec<u64> = graph_hits.iter().map(|hit| hit.id).collect();
        let truth: Vec<u64> = exact_hits.iter().map(|hit| hit.id).collect();
        recall_sum += recall_at_k(&measured, &truth);
    }

    let upsert_qps = POINTS as f64 / upsert_elapsed.as_secs_f64();
    let delete_qps = doomed.len() as f64 / delete_elapsed.as_secs_f64();
    println!(
        "bench=churn mode={mode} points={POINTS} dimension={DIMENSION} deleted={} upsert_qps={upsert_qps:.2} delete_qps={delete_qps:.2} delete_with_compaction_ms={:.3} live_points={} indexed_nodes={} deleted_nodes={} recall_at_k={:.6}",
        doomed.len(),
        delete_elapsed.as_secs_f64() * 1_000.0,
        info.point_count,
        info.indexed_nodes,
        info.deleted_nodes,
        recall_sum / QUERY_COUNT as f64
    );

    true
}
