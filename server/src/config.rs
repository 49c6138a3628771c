use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Result;
use quarry_core::config::{
    DEFAULT_CHECKPOINT_INTERVAL, DEFAULT_COMPACTION_THRESHOLD, DEFAULT_EF_CONSTRUCTION,
    DEFAULT_EF_SEARCH, DEFAULT_FULL_SCAN_THRESHOLD, DEFAULT_M, DEFAULT_MAX_CANDIDATES,
    DEFAULT_OVER_FETCH_FACTOR,
};
use quarry_core::{EngineConfig, IndexConfig, PersistenceConfig, SearchConfig};

use crate::env_utils::{parse_bool_env, parse_env, parse_optional_env, parse_path_env};

#[derive(Debug, Clone)]
pub(crate) struct AppConfig {
    pub(crate) bind: SocketAddr,
    pub(crate) max_dimension: usize,
    pub(crate) max_batch_size: usize,
    pub(crate) max_limit: usize,
    pub(crate) request_timeout_ms: u64,
    pub(crate) max_body_bytes: usize,
    pub(crate) max_concurrency: usize,
    pub(crate) persistence_enabled: bool,
    pub(crate) snapshot_path: PathBuf,
    pub(crate) wal_path: PathBuf,
    pub(crate) checkpoint_interval: usize,
    pub(crate) wal_sync_on_write: bool,
    pub(crate) index_defaults: IndexConfig,
    pub(crate) search: SearchConfig,
}

impl AppConfig {
    pub(crate) fn from_env() -> Result<Self> {
        let bind = parse_env("QUARRY_BIND", "127.0.0.1:6380".parse::<SocketAddr>()?)?;
        let max_dimension = parse_env("QUARRY_MAX_DIMENSION", 4_096usize)?;
        let max_batch_size = parse_env("QUARRY_MAX_BATCH_SIZE", 1_000usize)?;
        let max_limit = parse_env("QUARRY_MAX_LIMIT", 1_000usize)?;
        let request_timeout_ms = parse_env("QUARRY_REQUEST_TIMEOUT_MS", 2_000u64)?;
        let max_body_bytes = parse_env("QUARRY_MAX_BODY_BYTES", 8 * 1_048_576usize)?;
        let max_concurrency = parse_env("QUARRY_MAX_CONCURRENCY", 256usize)?;
        let persistence_enabled = parse_bool_env("QUARRY_PERSISTENCE_ENABLED", true)?;
        let snapshot_path = parse_path_env("QUARRY_SNAPSHOT_PATH", "data/quarry_snapshot.json")?;
        let wal_path = parse_path_env("QUARRY_WAL_PATH", "data/quarry_wal.jsonl")?;
        let checkpoint_interval =
            parse_env("QUARRY_CHECKPOINT_INTERVAL", DEFAULT_CHECKPOINT_INTERVAL)?;
        let wal_sync_on_write = parse_bool_env("QUARRY_WAL_SYNC_ON_WRITE", true)?;

        let index_defaults = IndexConfig {
            m: parse_env("QUARRY_HNSW_M", DEFAULT_M)?,
            ef_construction: parse_env("QUARRY_HNSW_EF_CONSTRUCTION", DEFAULT_EF_CONSTRUCTION)?,
            ef_search: parse_env("QUARRY_HNSW_EF_SEARCH", DEFAULT_EF_SEARCH)?,
            full_scan_threshold: parse_env(
                "QUARRY_FULL_SCAN_THRESHOLD",
                DEFAULT_FULL_SCAN_THRESHOLD,
            )?,
            compaction_threshold: parse_env(
                "QUARRY_COMPACTION_THRESHOLD",
                DEFAULT_COMPACTION_THRESHOLD,
            )?,
            seed: parse_optional_env("QUARRY_HNSW_SEED")?,
        };
        let search = SearchConfig {
            over_fetch_factor: parse_env("QUARRY_OVER_FETCH_FACTOR", DEFAULT_OVER_FETCH_FACTOR)?,
            max_candidates: parse_env("QUARRY_MAX_CANDIDATES", DEFAULT_MAX_CANDIDATES)?,
        };

        if max_dimension == 0 {
            anyhow::bail!("QUARRY_MAX_DIMENSION must be > 0");
        }
        if max_batch_size == 0 {
            anyhow::bail!("QUARRY_MAX_BATCH_SIZE must be > 0");
        }
        if max_limit == 0 {
            anyhow::bail!("QUARRY_MAX_LIMIT must be > 0");
        }
        if max_body_bytes == 0 {
            anyhow::bail!("QUARRY_MAX_BODY_BYTES must be > 0");
        }
        if max_concurrency == 0 {
            anyhow::bail!("QUARRY_MAX_CONCURRENCY must be > 0");
        }

        let config = Self {
            bind,
            max_dimension,
            max_batch_size,
            max_limit,
            request_timeout_ms,
            max_body_bytes,
            max_concurrency,
            persistence_enabled,
            snapshot_path,
            wal_path,
            checkpoint_interval,
            wal_sync_on_write,
            index_defaults,
            search,
        };
        config
            .engine_config()
            .validate()
            .map_err(|error| anyhow::anyhow!("invalid engine settings: {error}"))?;
        Ok(config)
    }

    pub(crate) fn engine_config(&self) -> EngineConfig {
        let persistence = self.persistence_enabled.then(|| PersistenceConfig {
            snapshot_path: self.snapshot_path.clone(),
            wal_path: self.wal_path.clone(),
            checkpoint_interval: self.checkpoint_interval,
            sync_on_write: self.wal_sync_on_write,
        });
        EngineConfig {
            defaults: self.index_defaults,
            search: self.search,
            persistence,
        }
    }
}
