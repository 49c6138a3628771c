use std::fs::{self, OpenOptions};
use std::io::Write;

use tempfile::{tempdir, TempDir};

use super::*;
use crate::mutation::{self, WriteOutcome};
use crate::payload::payload_from;

fn persistence(dir: &TempDir, checkpoint_interval: usize) -> Persistence {
    Persistence::new(PersistenceConfig {
        checkpoint_interval,
        ..PersistenceConfig::in_dir(dir.path())
    })
}

fn create_record(name: &str) -> WalRecord {
    WalRecord::CreateCollection {
        name: name.to_string(),
        dimension: 3,
        metric: Metric::Cosine,
        index_config: IndexConfig {
            full_scan_threshold: 2,
            seed: Some(1),
            ..IndexConfig::default()
        },
    }
}

fn upsert_record(collection: &str, id: PointId, vector: [f32; 3]) -> WalRecord {
    WalRecord::Upsert {
        collection: collection.to_string(),
        id,
        vector: vector.to_vec(),
        payload: payload_from([("id", id as i64)]),
    }
}

#[test]
fn wal_records_apply_in_order() {
    let registry = CollectionRegistry::new();
    for record in [
        create_record("demo"),
        upsert_record("demo", 1, [1.0, 0.0, 0.0]),
        upsert_record("demo", 2, [0.0, 1.0, 0.0]),
        WalRecord::Delete {
            collection: "demo".to_string(),
            id: 1,
        },
        WalRecord::Delete {
            collection: "demo".to_string(),
            id: 42,
        },
    ] {
        apply_wal_record(&registry, &record).expect("record must apply");
    }

    let collection = registry.get("demo").expect("collection must exist");
    assert_eq!(collection.live_len(), 1);
    assert!(collection.store().exists(2));
}

#[test]
fn replayed_create_and_drop_are_idempotent() {
    let registry = CollectionRegistry::new();
    apply_wal_record(&registry, &create_record("demo")).expect("create must apply");
    apply_wal_record(&registry, &create_record("demo")).expect("repeat create is a no-op");

    let conflicting = WalRecord::CreateCollection {
        name: "demo".to_string(),
        dimension: 8,
        metric: Metric::Dot,
        index_config: IndexConfig::default(),
    };
    assert!(matches!(
        apply_wal_record(&registry, &conflicting),
        Err(PersistenceError::InvalidData(_))
    ));

    let drop = WalRecord::DropCollection {
        name: "demo".to_string(),
    };
    apply_wal_record(&registry, &drop).expect("drop must apply");
    apply_wal_record(&registry, &drop).expect("repeat drop is a no-op");
    assert!(registry.is_empty());
}

#[test]
fn records_for_unknown_collections_are_rejected() {
    let registry = CollectionRegistry::new();
    assert!(matches!(
        apply_wal_record(&registry, &upsert_record("ghost", 1, [1.0, 0.0, 0.0])),
        Err(PersistenceError::InvalidData(_))
    ));
}

#[test]
fn load_replays_wal_without_snapshot() {
    let dir = tempdir().expect("tempdir must be created");
    let writer = persistence(&dir, 1_000);
    writer.append(&create_record("cities")).expect("append must succeed");
    writer
        .append(&upsert_record("cities", 1, [0.05, 0.61, 0.76]))
        .expect("append must succeed");
    writer
        .append(&upsert_record("cities", 2, [0.19, 0.81, 0.75]))
        .expect("append must succeed");
    writer
        .append(&WalRecord::UpdateConfig {
            name: "cities".to_string(),
            index_config: IndexConfig {
                ef_search: 7,
                full_scan_threshold: 2,
                seed: Some(1),
                ..IndexConfig::default()
            },
        })
        .expect("append must succeed");

    let registry = CollectionRegistry::new();
    let stats = persistence(&dir, 1_000)
        .load(&registry)
        .expect("load must succeed");
    assert_eq!(
        stats,
        LoadStats {
            collections: 1,
            points: 2,
            replayed_records: 4,
        }
    );

    let collection = registry.get("cities").expect("collection must exist");
    assert_eq!(collection.config().ef_search, 7);
    assert!(collection.index_ready());
    let record = collection.store().get(2).expect("point must exist");
    assert_eq!(record.vector, vec![0.19, 0.81, 0.75]);
    assert_eq!(record.payload, payload_from([("id", 2_i64)]));
}

#[test]
fn load_tolerates_torn_final_record() {
    let dir = tempdir().expect("tempdir must be created");
    let writer = persistence(&dir, 1_000);
    writer.append(&create_record("demo")).expect("append must succeed");
    writer
        .append(&upsert_record("demo", 1, [1.0, 0.0, 0.0]))
        .expect("append must succeed");

    let mut file = OpenOptions::new()
        .append(true)
        .open(&writer.config().wal_path)
        .expect("wal must open");
    file.write_all(br#"{"type":"upsert","collection":"demo","id":9,"vector":[3.0"#)
        .expect("write must succeed");

    let registry = CollectionRegistry::new();
    let stats = persistence(&dir, 1_000)
        .load(&registry)
        .expect("torn tail must be tolerated");
    assert_eq!(stats.replayed_records, 2);
    assert_eq!(stats.points, 1);
}

#[test]
fn load_rejects_corruption_before_the_tail() {
    let dir = tempdir().expect("tempdir must be created");
    let config = PersistenceConfig::in_dir(dir.path());
    let create = serde_json::to_string(&WalEntry {
        seq: 1,
        record: create_record("demo"),
    })
    .expect("entry must serialize");
    fs::write(&config.wal_path, format!("{create}\nnot json\n")).expect("write must succeed");

    let registry = CollectionRegistry::new();
    let error = Persistence::new(config)
        .load(&registry)
        .expect_err("corrupt line must fail");
    assert!(error.to_string().contains("invalid wal line 2"));
}

#[test]
fn checkpoint_writes_snapshot_and_truncates_wal() {
    let dir = tempdir().expect("tempdir must be created");
    let writer = persistence(&dir, 2);
    let registry = CollectionRegistry::new();

    writer.append(&create_record("demo")).expect("append must succeed");
    apply_wal_record(&registry, &create_record("demo")).expect("create must apply");
    assert!(!writer.checkpoint_due());

    let collection = registry.get("demo").expect("collection must exist");
    let statuses = mutation::upsert(
        &collection,
        vec![
            PointInput::new(1, vec![1.0, 0.0, 0.0], payload_from([("city", "Berlin")])),
            PointInput::new(2, vec![0.0, 1.0, 0.0], payload_from([("city", "London")])),
        ],
        Some(&writer),
    )
    .expect("upsert must run");
    assert!(statuses
        .iter()
        .all(|status| status.result == Ok(WriteOutcome::Created)));
    mutation::delete(&collection, &[2], Some(&writer)).expect("delete must run");
    assert!(writer.checkpoint_due());

    writer.checkpoint(&registry).expect("checkpoint must succeed");
    assert!(!writer.checkpoint_due());
    assert_eq!(
        fs::metadata(&writer.config().wal_path)
            .expect("wal must exist")
            .len(),
        0
    );

    let restored = CollectionRegistry::new();
    let stats = persistence(&dir, 2)
        .load(&restored)
        .expect("load must succeed");
    assert_eq!(stats.replayed_records, 0);
    assert_eq!(stats.points, 1);
    let collection = restored.get("demo").expect("collection must exist");
    let record = collection.store().get(1).expect("point must exist");
    assert_eq!(record.payload, payload_from([("city", "Berlin")]));
    assert!(!collection.store().exists(2));
}

#[test]
fn snapshot_version_is_checked() {
    let dir = tempdir().expect("tempdir must be created");
    let config = PersistenceConfig::in_dir(dir.path());
    fs::write(&config.snapshot_path, br#"{"version":99,"collections":[]}"#)
        .expect("write must succeed");

    let registry = CollectionRegistry::new();
    let error = Persistence::new(config)
        .load(&registry)
        .expect_err("unknown version must fail");
    assert!(error.to_string().contains("unsupported snapshot version 99"));
}

#[test]
fn wal_lines_use_tagged_json() {
    let line = serde_json::to_string(&WalEntry {
        seq: 12,
        record: WalRecord::Delete {
            collection: "demo".to_string(),
            id: 3,
        },
    })
    .expect("entry must serialize");
    assert_eq!(line, r#"{"seq":12,"type":"delete","collection":"demo","id":3}"#);

    let parsed: WalEntry = serde_json::from_str(&line).expect("entry must parse");
    assert_eq!(parsed.seq, 12);
}

#[test]
fn sequence_numbers_continue_after_checkpoint() {
    let dir = tempdir().expect("tempdir must be created");
    let writer = persistence(&dir, 1_000);
    let registry = CollectionRegistry::new();
    writer.append(&create_record("demo")).expect("append must succeed");
    apply_wal_record(&registry, &create_record("demo")).expect("create must apply");
    writer.checkpoint(&registry).expect("checkpoint must succeed");
    writer
        .append(&upsert_record("demo", 1, [1.0, 0.0, 0.0]))
        .expect("append must succeed");
    assert_eq!(writer.last_seq(), 2);

    let reopened = persistence(&dir, 1_000);
    let stats = reopened
        .load(&CollectionRegistry::new())
        .expect("load must succeed");
    assert_eq!(stats.replayed_records, 1);
    assert_eq!(reopened.last_seq(), 2);
}

#[test]
fn log_left_behind_by_a_failed_truncate_is_skipped() {
    let dir = tempdir().expect("tempdir must be created");
    let writer = persistence(&dir, 1_000);
    let registry = CollectionRegistry::new();
    let recreated = WalRecord::CreateCollection {
        name: "demo".to_string(),
        dimension: 8,
        metric: Metric::Dot,
        index_config: IndexConfig::default(),
    };
    for record in [
        create_record("demo"),
        WalRecord::DropCollection {
            name: "demo".to_string(),
        },
        recreated,
    ] {
        writer.append(&record).expect("append must succeed");
        apply_wal_record(&registry, &record).expect("record must apply");
    }

    // Snapshot written, log never truncated.
    snapshot::write_snapshot(&writer.config().snapshot_path, &registry, writer.last_seq())
        .expect("snapshot must be written");

    let restored = CollectionRegistry::new();
    let reopened = persistence(&dir, 1_000);
    let stats = reopened.load(&restored).expect("load must succeed");
    assert_eq!(stats.replayed_records, 0);
    assert_eq!(reopened.last_seq(), 3);
    let collection = restored.get("demo").expect("collection must exist");
    assert_eq!(collection.space().dimension(), 8);
    assert_eq!(collection.space().metric(), Metric::Dot);

    reopened
        .append(&WalRecord::Upsert {
            collection: "demo".to_string(),
            id: 1,
            vector: vec![1.0; 8],
            payload: Payload::new(),
        })
        .expect("append must succeed");
    let again = CollectionRegistry::new();
    let stats = persistence(&dir, 1_000)
        .load(&again)
        .expect("load must succeed");
    assert_eq!(stats.replayed_records, 1);
    assert_eq!(stats.points, 1);
}
