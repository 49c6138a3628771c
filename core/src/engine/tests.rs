use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tempfile::tempdir;

use super::*;
use crate::config::PersistenceConfig;
use crate::filter::Filter;
use crate::mutation::WriteOutcome;
use crate::payload::{payload_from, Payload, PayloadValue};
use crate::query::SearchMode;

const CITY_QUERY: [f32; 4] = [0.2, 0.1, 0.9, 0.7];

fn memory_engine() -> Engine {
    Engine::new(EngineConfig::default()).expect("engine must start")
}

fn city(id: PointId, vector: [f32; 4], city: &str, country: &str) -> PointInput {
    PointInput::new(
        id,
        vector.to_vec(),
        payload_from([("city", city), ("country", country)]),
    )
}

fn cities() -> Vec<PointInput> {
    vec![
        city(1, [0.05, 0.61, 0.76, 0.74], "Berlin", "Germany"),
        city(2, [0.19, 0.81, 0.75, 0.11], "London", "UK"),
        city(3, [0.36, 0.55, 0.47, 0.94], "Moscow", "Russia"),
        city(4, [0.18, 0.01, 0.85, 0.80], "New York", "USA"),
        city(5, [0.24, 0.18, 0.22, 0.44], "Beijing", "China"),
    ]
}

fn seeded_cities(engine: &Engine) {
    engine
        .create_collection("cities", 4, Metric::Cosine, None)
        .expect("create must succeed");
    let statuses = engine.upsert("cities", cities()).expect("upsert must run");
    assert!(statuses
        .iter()
        .all(|status| status.result == Ok(WriteOutcome::Created)));
}

fn hit_ids(response: &SearchResponse) -> Vec<PointId> {
    response.hits.iter().map(|hit| hit.id).collect()
}

#[test]
fn city_search_ranks_by_cosine_similarity() {
    let engine = memory_engine();
    seeded_cities(&engine);

    let request = SearchRequest::new(CITY_QUERY.to_vec(), 3);
    let first = engine.search("cities", &request).expect("search must succeed");
    assert_eq!(first.mode, SearchMode::Exact);
    assert_eq!(hit_ids(&first), vec![4, 1, 5]);
    assert!((first.hits[0].score - 0.9925).abs() < 1e-3);
    assert_eq!(
        first.hits[0].payload,
        Some(payload_from([("city", "New York"), ("country", "USA")]))
    );

    let again = engine.search("cities", &request).expect("search must succeed");
    assert_eq!(first, again);
}

#[test]
fn city_filter_keeps_matching_country() {
    let engine = memory_engine();
    seeded_cities(&engine);

    let request = SearchRequest::new(CITY_QUERY.to_vec(), 3)
        .filter(Filter::must(vec![Filter::matches("country", "UK")]));
    let response = engine.search("cities", &request).expect("search must succeed");
    assert_eq!(hit_ids(&response), vec![2]);
}

#[test]
fn deleted_city_never_returns() {
    let engine = memory_engine();
    seeded_cities(&engine);
    engine
        .upsert(
            "cities",
            vec![city(2, [0.5, 0.5, 0.5, 0.5], "London", "UK")],
        )
        .expect("upsert must run");
    let statuses = engine.delete("cities", &[2]).expect("delete must run");
    assert_eq!(statuses[0].result, Ok(WriteOutcome::Deleted));

    let response = engine
        .search("cities", &SearchRequest::new(CITY_QUERY.to_vec(), 5))
        .expect("search must succeed");
    assert_eq!(hit_ids(&response), vec![4, 1, 5, 3]);
    assert_eq!(engine.get_point("cities", 2), Err(Error::PointNotFound(2)));
}

#[test]
fn identical_reupsert_is_idempotent() {
    let engine = memory_engine();
    seeded_cities(&engine);
    let request = SearchRequest::new(CITY_QUERY.to_vec(), 5);
    let before = engine.search("cities", &request).expect("search must succeed");

    let statuses = engine.upsert("cities", cities()).expect("upsert must run");
    assert!(statuses
        .iter()
        .all(|status| status.result == Ok(WriteOutcome::Unchanged)));

    let info = engine.collection_info("cities").expect("info must succeed");
    assert_eq!(info.point_count, 5);
    let after = engine.search("cities", &request).expect("search must succeed");
    assert_eq!(before, after);
}

#[test]
fn batch_with_bad_item_keeps_siblings() {
    let engine = memory_engine();
    engine
        .create_collection("cities", 4, Metric::Cosine, None)
        .expect("create must succeed");

    let mut batch = cities();
    batch[2].vector.pop();
    let statuses = engine.upsert("cities", batch).expect("upsert must run");
    assert_eq!(
        statuses[2].result,
        Err(Error::DimensionMismatch {
            expected: 4,
            got: 3
        })
    );
    assert_eq!(statuses.iter().filter(|status| status.is_ok()).count(), 4);
    assert_eq!(
        engine
            .collection_info("cities")
            .expect("info must succeed")
            .point_count,
        4
    );
}

#[test]
fn lifecycle_errors() {
    let engine = memory_engine();
    seeded_cities(&engine);

    assert_eq!(
        engine.create_collection("cities", 4, Metric::Cosine, None),
        Err(Error::AlreadyExists("cities".to_string()))
    );
    assert_eq!(
        engine.create_collection(" ", 4, Metric::Cosine, None),
        Err(Error::InvalidName)
    );
    assert!(matches!(
        engine.create_collection("empty", 0, Metric::Dot, None),
        Err(Error::InvalidConfig(_))
    ));
    assert_eq!(
        engine.drop_collection("missing"),
        Err(Error::CollectionNotFound("missing".to_string()))
    );
    assert_eq!(
        engine.search("missing", &SearchRequest::new(CITY_QUERY.to_vec(), 1)),
        Err(Error::CollectionNotFound("missing".to_string()))
    );
    assert_eq!(
        engine.upsert("missing", cities()),
        Err(Error::CollectionNotFound("missing".to_string()))
    );

    engine.drop_collection("cities").expect("drop must succeed");
    assert!(engine.list_collections().is_empty());
    engine
        .create_collection("cities", 2, Metric::Dot, None)
        .expect("name is free again");
    assert_eq!(
        engine
            .collection_info("cities")
            .expect("info must succeed")
            .point_count,
        0
    );
}

#[test]
fn config_updates_merge_only_given_fields() {
    let engine = memory_engine();
    seeded_cities(&engine);

    let merged = engine
        .update_collection_config(
            "cities",
            &IndexConfigPatch {
                ef_search: Some(32),
                ..IndexConfigPatch::default()
            },
        )
        .expect("update must succeed");
    assert_eq!(merged.ef_search, 32);
    assert_eq!(merged.full_scan_threshold, IndexConfig::default().full_scan_threshold);
    assert_eq!(
        engine
            .collection_info("cities")
            .expect("info must succeed")
            .index_config,
        merged
    );

    assert!(matches!(
        engine.update_collection_config(
            "cities",
            &IndexConfigPatch {
                m: Some(64),
                ..IndexConfigPatch::default()
            },
        ),
        Err(Error::InvalidConfig(_))
    ));
    assert_eq!(
        engine.update_collection_config("missing", &IndexConfigPatch::default()),
        Err(Error::CollectionNotFound("missing".to_string()))
    );
}

#[test]
fn engines_are_isolated() {
    let left = memory_engine();
    let right = memory_engine();
    seeded_cities(&left);

    assert_eq!(left.list_collections(), vec!["cities".to_string()]);
    assert!(right.list_collections().is_empty());
    right
        .create_collection("cities", 8, Metric::Euclidean, None)
        .expect("same name in another engine must succeed");
    assert_eq!(
        left.collection_info("cities")
            .expect("info must succeed")
            .dimension,
        4
    );
}

#[test]
fn new_refuses_persistence_config() {
    let dir = tempdir().expect("tempdir must be created");
    let config = EngineConfig {
        persistence: Some(PersistenceConfig::in_dir(dir.path())),
        ..EngineConfig::default()
    };
    assert!(matches!(Engine::new(config), Err(Error::InvalidConfig(_))));
}

#[test]
fn concurrent_writers_and_readers() {
    let engine = Arc::new(memory_engine());
    engine
        .create_collection(
            "points",
            8,
            Metric::Euclidean,
            Some(IndexConfig {
                full_scan_threshold: 200,
                seed: Some(3),
                ..IndexConfig::default()
            }),
        )
        .expect("create must succeed");

    thread::scope(|scope| {
        for writer in 0..4u64 {
            let engine = Arc::clone(&engine);
            scope.spawn(move || {
                let mut rng = StdRng::seed_from_u64(writer);
                for round in 0..100u64 {
                    let id = writer * 1_000 + round;
                    let vector = (0..8).map(|_| rng.gen_range(-1.0..1.0)).collect();
                    let statuses = engine
                        .upsert(
                            "points",
                            vec![PointInput::new(
                                id,
                                vector,
                                payload_from([("writer", writer as i64)]),
                            )],
                        )
                        .expect("upsert must run");
                    assert!(statuses[0].is_ok());
                }
            });
        }
        for reader in 0..2u64 {
            let engine = Arc::clone(&engine);
            scope.spawn(move || {
                let mut rng = StdRng::seed_from_u64(100 + reader);
                for _ in 0..50 {
                    let query = (0..8).map(|_| rng.gen_range(-1.0..1.0)).collect();
                    let response = engine
                        .search("points", &SearchRequest::new(query, 5))
                        .expect("search must succeed");
                    assert!(response.hits.len() <= 5);
                    assert!(response
                        .hits
                        .windows(2)
                        .all(|pair| pair[0].score >= pair[1].score));
                }
            });
        }
    });

    let info = engine.collection_info("points").expect("info must succeed");
    assert_eq!(info.point_count, 400);
    assert!(info.index_ready);
    assert_eq!(info.indexed_nodes, 400);

    for writer in 0..4u64 {
        let record = engine
            .get_point("points", writer * 1_000 + 99)
            .expect("point must exist");
        assert_eq!(record.payload, payload_from([("writer", writer as i64)]));
    }
}

fn random_vector(rng: &mut StdRng, dimension: usize) -> Vec<f32> {
    (0..dimension).map(|_| rng.gen_range(-1.0..1.0)).collect()
}

fn assert_ranked(response: &SearchResponse) {
    assert!(response.hits.windows(2).all(|pair| {
        pair[0].score > pair[1].score
            || (pair[0].score == pair[1].score && pair[0].id < pair[1].id)
    }));
}

#[test]
fn searches_during_deletes_rewrites_and_compaction() {
    const DOOMED: std::ops::Range<u64> = 1_000..1_300;

    let engine = Arc::new(memory_engine());
    engine
        .create_collection(
            "churn",
            8,
            Metric::Euclidean,
            Some(IndexConfig {
                full_scan_threshold: 50,
                compaction_threshold: 0.1,
                seed: Some(9),
                ..IndexConfig::default()
            }),
        )
        .expect("create must succeed");

    let mut rng = StdRng::seed_from_u64(40);
    let seed_points = (0..300u64)
        .chain(DOOMED)
        .map(|id| PointInput::new(id, random_vector(&mut rng, 8), Payload::new()))
        .collect();
    let statuses = engine.upsert("churn", seed_points).expect("upsert must run");
    assert!(statuses.iter().all(PointStatus::is_ok));
    assert!(engine.collection_info("churn").expect("info").index_ready);

    // Every doomed id below this mark has been deleted.
    let deleted_below = AtomicU64::new(DOOMED.start);
    let churn_done = AtomicBool::new(false);

    thread::scope(|scope| {
        let deleter = scope.spawn(|| {
            for id in DOOMED {
                let statuses = engine.delete("churn", &[id]).expect("delete must run");
                assert_eq!(statuses[0].result, Ok(WriteOutcome::Deleted));
                deleted_below.store(id + 1, Ordering::Release);
            }
        });
        let rewriter = scope.spawn(|| {
            let mut rng = StdRng::seed_from_u64(41);
            for round in 0..300u64 {
                let point = PointInput::new(round % 100, random_vector(&mut rng, 8), Payload::new());
                let statuses = engine.upsert("churn", vec![point]).expect("upsert must run");
                assert!(statuses[0].is_ok());
            }
        });
        for reader in 0..3u64 {
            let engine = &engine;
            let deleted_below = &deleted_below;
            let churn_done = &churn_done;
            scope.spawn(move || {
                let mut rng = StdRng::seed_from_u64(200 + reader);
                let mut searches = 0usize;
                while searches < 50 || !churn_done.load(Ordering::Acquire) {
                    let mark = deleted_below.load(Ordering::Acquire);
                    let request = SearchRequest::new(random_vector(&mut rng, 8), 10);
                    let response = engine.search("churn", &request).expect("search must succeed");
                    assert_eq!(response.mode, SearchMode::Hnsw);
                    assert!(response.hits.len() <= 10);
                    assert_ranked(&response);
                    for hit in &response.hits {
                        assert!(
                            !(DOOMED.start..mark).contains(&hit.id),
                            "id {} was deleted before the search began",
                            hit.id
                        );
                    }
                    searches += 1;
                }
            });
        }
        deleter.join().expect("deleter must finish");
        rewriter.join().expect("rewriter must finish");
        churn_done.store(true, Ordering::Release);
    });

    for id in DOOMED {
        assert_eq!(
            engine.get_point("churn", id).err(),
            Some(Error::PointNotFound(id))
        );
    }
    engine.compact("churn").expect("compaction must succeed");
    let info = engine.collection_info("churn").expect("info must succeed");
    assert_eq!(info.point_count, 300);
    assert_eq!(info.indexed_nodes, 300);
    assert_eq!(info.deleted_nodes, 0);
}

#[test]
fn same_id_writers_leave_one_whole_point() {
    let engine = Arc::new(memory_engine());
    engine
        .create_collection(
            "contended",
            4,
            Metric::Euclidean,
            Some(IndexConfig {
                full_scan_threshold: 0,
                seed: Some(2),
                ..IndexConfig::default()
            }),
        )
        .expect("create must succeed");

    let written_by = |record: &PointRecord| {
        let writer = match record.payload.get("writer") {
            Some(PayloadValue::Integer(writer)) => *writer,
            other => panic!("unexpected writer payload {other:?}"),
        };
        assert_eq!(record.vector, vec![(writer + 1) as f32; 4]);
        writer
    };

    thread::scope(|scope| {
        for writer in 0..4i64 {
            let engine = &engine;
            scope.spawn(move || {
                for _ in 0..200 {
                    let point = PointInput::new(
                        7,
                        vec![(writer + 1) as f32; 4],
                        payload_from([("writer", writer)]),
                    );
                    let statuses = engine.upsert("contended", vec![point]).expect("upsert must run");
                    assert!(statuses[0].is_ok());
                }
            });
        }
        let engine = &engine;
        scope.spawn(move || {
            for _ in 0..200 {
                if let Ok(record) = engine.get_point("contended", 7) {
                    written_by(&*record);
                }
            }
        });
    });

    let record = engine.get_point("contended", 7).expect("point must exist");
    let writer = written_by(&*record);
    assert!((0..4).contains(&writer));

    let response = engine
        .search("contended", &SearchRequest::new(vec![0.0; 4], 5))
        .expect("search must succeed");
    assert_eq!(hit_ids(&response), vec![7]);
    assert_eq!(
        response.hits[0].payload,
        Some(payload_from([("writer", writer)]))
    );

    engine.compact("contended").expect("compaction must succeed");
    let info = engine.collection_info("contended").expect("info must succeed");
    assert_eq!(info.point_count, 1);
    assert_eq!(info.indexed_nodes, 1);
}

#[test]
fn drop_during_writes_fails_in_flight_calls_cleanly() {
    let engine = Arc::new(memory_engine());
    engine
        .create_collection("doomed", 4, Metric::Dot, None)
        .expect("create must succeed");

    thread::scope(|scope| {
        let writers: Vec<_> = (0..3u64)
            .map(|writer| {
                let engine = Arc::clone(&engine);
                scope.spawn(move || {
                    let mut round = 0u64;
                    loop {
                        let point = PointInput::new(
                            writer * 1_000_000 + round % 1_000,
                            vec![1.0; 4],
                            Payload::new(),
                        );
                        match engine.upsert("doomed", vec![point]) {
                            Ok(statuses) => assert!(statuses[0].is_ok()),
                            Err(error) => return error,
                        }
                        round += 1;
                    }
                })
            })
            .collect();

        thread::sleep(std::time::Duration::from_millis(5));
        engine.drop_collection("doomed").expect("drop must succeed");

        for writer in writers {
            let error = writer.join().expect("writer must not panic");
            assert!(
                matches!(
                    error,
                    Error::CollectionDropped(_) | Error::CollectionNotFound(_)
                ),
                "unexpected error {error:?}"
            );
        }
    });
    assert!(engine.list_collections().is_empty());
}

#[test]
fn persistent_engine_recovers_from_log_and_snapshot() {
    let dir = tempdir().expect("tempdir must be created");
    let config = EngineConfig {
        persistence: Some(PersistenceConfig {
            checkpoint_interval: 1_000,
            ..PersistenceConfig::in_dir(dir.path())
        }),
        ..EngineConfig::default()
    };
    let request = SearchRequest::new(CITY_QUERY.to_vec(), 5);

    let expected = {
        let engine = Engine::open(config.clone()).expect("engine must open");
        assert!(engine.is_persistent());
        seeded_cities(&engine);
        engine.delete("cities", &[2]).expect("delete must run");
        engine
            .update_collection_config(
                "cities",
                &IndexConfigPatch {
                    ef_search: Some(48),
                    ..IndexConfigPatch::default()
                },
            )
            .expect("update must succeed");
        engine
            .create_collection("scratch", 2, Metric::Dot, None)
            .expect("create must succeed");
        engine.drop_collection("scratch").expect("drop must succeed");
        engine.search("cities", &request).expect("search must succeed")
    };

    // Replay from the log alone.
    let reopened = Engine::open(config.clone()).expect("engine must reopen");
    assert_eq!(reopened.list_collections(), vec!["cities".to_string()]);
    let info = reopened.collection_info("cities").expect("info must succeed");
    assert_eq!(info.point_count, 4);
    assert_eq!(info.index_config.ef_search, 48);
    assert_eq!(
        reopened.search("cities", &request).expect("search must succeed"),
        expected
    );
    reopened.shutdown().expect("shutdown must succeed");
    drop(reopened);

    // Snapshot only.
    let restored = Engine::open(config).expect("engine must reopen");
    assert_eq!(
        restored.search("cities", &request).expect("search must succeed"),
        expected
    );
    assert_eq!(
        restored
            .get_point("cities", 4)
            .expect("point must exist")
            .vector,
        vec![0.18, 0.01, 0.85, 0.80]
    );
}

#[test]
fn periodic_checkpoints_keep_the_log_short() {
    let dir = tempdir().expect("tempdir must be created");
    let persistence = PersistenceConfig {
        checkpoint_interval: 4,
        ..PersistenceConfig::in_dir(dir.path())
    };
    let wal_path = persistence.wal_path.clone();
    let snapshot_path = persistence.snapshot_path.clone();
    let engine = Engine::open(EngineConfig {
        persistence: Some(persistence),
        ..EngineConfig::default()
    })
    .expect("engine must open");

    seeded_cities(&engine);
    assert!(snapshot_path.exists());
    let wal_len = std::fs::metadata(&wal_path)
        .expect("wal must exist")
        .len();
    assert_eq!(wal_len, 0);
    assert!(!memory_engine().checkpoint().expect("no-op must succeed"));
}
