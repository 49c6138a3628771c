use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub const DEFAULT_M: usize = 16;
pub const DEFAULT_EF_CONSTRUCTION: usize = 200;
pub const DEFAULT_EF_SEARCH: usize = 100;
pub const DEFAULT_FULL_SCAN_THRESHOLD: usize = 10_000;
pub const DEFAULT_COMPACTION_THRESHOLD: f64 = 0.2;
pub const DEFAULT_OVER_FETCH_FACTOR: usize = 4;
pub const DEFAULT_MAX_CANDIDATES: usize = 4_096;
pub const DEFAULT_CHECKPOINT_INTERVAL: usize = 64;

/// Per-collection index parameters.
///
/// `m` and `ef_construction` shape the graph and are fixed at creation; the
/// rest can be changed later through [`IndexConfigPatch`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    pub m: usize,
    pub ef_construction: usize,
    pub ef_search: usize,
    /// Below this many live points searches run an exact scan and no graph
    /// is kept.
    pub full_scan_threshold: usize,
    /// Deleted-node fraction at which the graph is rebuilt.
    pub compaction_threshold: f64,
    /// Seed for level sampling; `None` draws one from the OS.
    pub seed: Option<u64>,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            m: DEFAULT_M,
            ef_construction: DEFAULT_EF_CONSTRUCTION,
            ef_search: DEFAULT_EF_SEARCH,
            full_scan_threshold: DEFAULT_FULL_SCAN_THRESHOLD,
            compaction_threshold: DEFAULT_COMPACTION_THRESHOLD,
            seed: None,
        }
    }
}

impl IndexConfig {
    pub fn validate(&self) -> Result<()> {
        if self.m < 2 {
            return Err(Error::InvalidConfig("m must be >= 2".to_string()));
        }
        if self.ef_construction == 0 {
            return Err(Error::InvalidConfig(
                "ef_construction must be > 0".to_string(),
            ));
        }
        if self.ef_search == 0 {
            return Err(Error::InvalidConfig("ef_search must be > 0".to_string()));
        }
        if !(self.compaction_threshold > 0.0 && self.compaction_threshold <= 1.0) {
            return Err(Error::InvalidConfig(
                "compaction_threshold must be in (0, 1]".to_string(),
            ));
        }
        Ok(())
    }

    /// Maximum degree at layer 0.
    pub fn m0(&self) -> usize {
        self.m * 2
    }

    /// Applies `patch`, returning the merged config. Graph-shape fields may
    /// only be "patched" to their current value.
    pub fn merge(&self, patch: &IndexConfigPatch) -> Result<Self> {
        if patch.m.is_some_and(|m| m != self.m) {
            return Err(Error::InvalidConfig(
                "m is fixed once a collection exists".to_string(),
            ));
        }
        if patch
            .ef_construction
            .is_some_and(|ef_construction| ef_construction != self.ef_construction)
        {
            return Err(Error::InvalidConfig(
                "ef_construction is fixed once a collection exists".to_string(),
            ));
        }

        let merged = Self {
            ef_search: patch.ef_search.unwrap_or(self.ef_search),
            full_scan_threshold: patch.full_scan_threshold.unwrap_or(self.full_scan_threshold),
            compaction_threshold: patch
                .compaction_threshold
                .unwrap_or(self.compaction_threshold),
            ..*self
        };
        merged.validate()?;
        Ok(merged)
    }
}

/// Partial [`IndexConfig`]; unset fields keep their current value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfigPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub m: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ef_construction: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ef_search: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_scan_threshold: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compaction_threshold: Option<f64>,
}

impl IndexConfigPatch {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchConfig {
    /// Candidates requested from the graph per wanted result.
    pub over_fetch_factor: usize,
    /// Hard cap on candidates fetched for one search.
    pub max_candidates: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            over_fetch_factor: DEFAULT_OVER_FETCH_FACTOR,
            max_candidates: DEFAULT_MAX_CANDIDATES,
        }
    }
}

impl SearchConfig {
    pub fn validate(&self) -> Result<()> {
        if self.over_fetch_factor < 2 {
            return Err(Error::InvalidConfig(
                "over_fetch_factor must be >= 2".to_string(),
            ));
        }
        if self.max_candidates == 0 {
            return Err(Error::InvalidConfig(
                "max_candidates must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistenceConfig {
    pub snapshot_path: PathBuf,
    pub wal_path: PathBuf,
    /// Appended log records between automatic checkpoints.
    pub checkpoint_interval: usize,
    pub sync_on_write: bool,
}

impl PersistenceConfig {
    /// `snapshot.json` and `wal.jsonl` inside `dir`.
    pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        Self {
            snapshot_path: dir.join("snapshot.json"),
            wal_path: dir.join("wal.jsonl"),
            checkpoint_interval: DEFAULT_CHECKPOINT_INTERVAL,
            sync_on_write: true,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.checkpoint_interval == 0 {
            return Err(Error::InvalidConfig(
                "checkpoint_interval must be > 0".to_string(),
            ));
        }
        if self.snapshot_path == self.wal_path {
            return Err(Error::InvalidConfig(
                "snapshot and wal paths must differ".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EngineConfig {
    /// Index parameters for collections created without explicit ones.
    pub defaults: IndexConfig,
    pub search: SearchConfig,
    pub persistence: Option<PersistenceConfig>,
}

impl EngineConfig {
    pub fn validate(&self) -> Result<()> {
        self.defaults.validate()?;
        self.search.validate()?;
        if let Some(persistence) = &self.persistence {
            persistence.validate()?;
        }
        Ok(())
    }
}
