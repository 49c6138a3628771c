#![forbid(unsafe_code)]
//! Recall and latency benchmarks for Quarry.
//!
//! Scenarios:
//! - `search_quality`: recall@k and latency of HNSW vs exact search across
//!   an `ef` sweep on uniform and clustered datasets
//! - `churn`: upsert throughput, deletes past the compaction threshold and
//!   recall after compaction

use std::env;
use std::process;

use quarry_core::{Engine, EngineConfig, IndexConfig, Metric, PointInput};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

mod churn_bench;
mod search_quality_bench;

use crate::churn_bench::run_churn_bench;
use crate::search_quality_bench::run_search_quality_bench;

fn main() {
    if cfg!(debug_assertions) && env::var("QUARRY_ALLOW_DEBUG_BENCH").as_deref() != Ok("1") {
        eprintln!(
            "error=debug_build_not_allowed message=\"run `cargo run --release -p quarry-bench`\""
        );
        process::exit(2);
    }

    let mode = if cfg!(debug_assertions) {
        "debug"
    } else {
        "release"
    };

    let scenario = env::var("QUARRY_BENCH_SCENARIO").unwrap_or_else(|_| "all".to_string());
    let ok = match scenario.as_str() {
        "all" => run_search_quality_bench(mode) && run_churn_bench(mode),
        "search_quality" => run_search_quality_bench(mode),
        "churn" => run_churn_bench(mode),
        _ => {
            eprintln!(
                "error=invalid_scenario scenario=\"{scenario}\" allowed=\"all,search_quality,churn\""
            );
            false
        }
    };

    if !ok {
        process::exit(1);
    }
}

/// Engine with one collection named `name`; `None` on any engine error.
pub(crate) fn engine_with_collection(
    name: &str,
    dimension: usize,
    metric: Metric,
    index_config: IndexConfig,
) -> Option<Engine> {
    let engine = match Engine::new(EngineConfig::default()) {
        Ok(engine) => engine,
        Err(error) => {
            eprintln!("error=engine_start_failed detail=\"{error}\"");
            return None;
        }
    };
    if let Err(error) = engine.create_collection(name, dimension, metric, Some(index_config)) {
        eprintln!("error=collection_create_failed detail=\"{error}\"");
        return None;
    }
    Some(engine)
}

/// Upserts `vectors` in batches, ids in slice order.
pub(crate) fn load_points(engine: &Engine, name: &str, vectors: &[Vec<f32>]) -> bool {
    const BATCH: usize = 512;
    for (chunk_index, chunk) in vectors.chunks(BATCH).enumerate() {
        let points = chunk
            .iter()
            .enumerate()
            .map(|(offset, vector)| {
                PointInput::new(
                    (chunk_index * BATCH + offset) as u64,
                    vector.clone(),
                    Default::default(),
                )
            })
            .collect();
        match engine.upsert(name, points) {
            Ok(statuses) => {
                if let Some(failed) = statuses.iter().find(|status| !status.is_ok()) {
                    eprintln!("error=upsert_item_failed id={}", failed.id);
                    return false;
                }
            }
            Err(error) => {
                eprintln!("error=upsert_failed detail=\"{error}\"");
                return false;
            }
        }
    }
    true
}

pub(crate) fn uniform_vectors(count: usize, dimension: usize, seed: u64) -> Vec<Vec<f32>> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..count)
        .map(|_| (0..dimension).map(|_| rng.gen_range(-1.0..1.0)).collect())
        .collect()
}

/// Points scattered around `clusters` random centres.
pub(crate) fn clustered_vectors(
    count: usize,
    dimension: usize,
    clusters: usize,
    seed: u64,
) -> Vec<Vec<f32>> {
    let mut rng = StdRng::seed_from_u64(seed);
    let centres = uniform_vectors(clusters, dimension, seed ^ 0x5eed);
    (0..count)
        .map(|index| {
            centres[index % clusters]
                .iter()
                .map(|centre| centre + rng.gen_range(-0.15..0.15))
                .collect()
        })
        .collect()
}

pub(crate) fn recall_at_k(measured: &[u64], truth: &[u64]) -> f64 {
    if truth.is_empty() {
        return 1.0;
    }
    let hits = measured.iter().filter(|id| truth.contains(id)).count();
    hits as f64 / truth.len() as f64
}

pub(crate) fn summarize_percentiles(samples_ms: &[f64]) -> (f64, f64, f64) {
    (
        percentile_ms(samples_ms, 0.50),
        percentile_ms(samples_ms, 0.95),
        percentile_ms(samples_ms, 0.99),
    )
}

fn percentile_ms(samples_ms: &[f64], quantile: f64) -> f64 {
    if samples_ms.is_empty() {
        return 0.0;
    }

    let mut sorted = samples_ms.to_vec();
    sorted.sort_by(f64::total_cmp);
    let last_index = sorted.len().saturating_sub(1);
    let position = (quantile.clamp(0.0, 1.0) * last_index as f64).round() as usize;
    sorted[position]
}
