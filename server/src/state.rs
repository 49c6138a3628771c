use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use quarry_core::Engine;

use crate::config::AppConfig;
use crate::metrics::ServerMetrics;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) started_at: Instant,
    pub(crate) config: Arc<AppConfig>,
    pub(crate) engine: Arc<Engine>,
    pub(crate) metrics: Arc<ServerMetrics>,
}

impl AppState {
    /// Opens the engine described by `config`, replaying persisted state.
    pub(crate) fn open(config: AppConfig) -> Result<Self> {
        let engine = Engine::open(config.engine_config()).context("failed to open engine")?;
        Self::with_engine(config, engine)
    }

    pub(crate) fn with_engine(config: AppConfig, engine: Engine) -> Result<Self> {
        let metrics = ServerMetrics::new().context("failed to register metrics")?;
        Ok(Self {
            started_at: Instant::now(),
            config: Arc::new(config),
            engine: Arc::new(engine),
            metrics: Arc::new(metrics),
        })
    }
}
