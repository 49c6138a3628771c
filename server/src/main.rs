#![forbid(unsafe_code)]
//! Quarry HTTP server.
//!
//! Exposes:
//! - `GET /live`, `GET /ready`: liveness and readiness
//! - `GET /metrics`: prometheus text exposition
//! - `POST/GET /collections`: create and list collections
//! - `GET/PATCH/DELETE /collections/:name`: info, config update, drop
//! - `PUT /collections/:name/points`: batch upsert
//! - `POST /collections/:name/points/delete`: batch delete
//! - `GET /collections/:name/points/:id`: point retrieval
//! - `POST /collections/:name/search`: k-NN search with optional filter
//! - `POST /collections/:name/compact`: graph compaction

use std::time::Duration;

use anyhow::{Context, Result};
use axum::error_handling::HandleErrorLayer;
use axum::extract::DefaultBodyLimit;
use axum::http::{HeaderName, Request};
use axum::routing::{get, post, put};
use axum::Router;
use tower::limit::ConcurrencyLimitLayer;
use tower::timeout::TimeoutLayer;
use tower::ServiceBuilder;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::{DefaultOnResponse, TraceLayer};
use tower_http::LatencyUnit;
use tracing_subscriber::EnvFilter;

mod config;
mod env_utils;
mod errors;
mod handler_utils;
mod handlers;
mod handlers_health;
mod handlers_points;
mod handlers_search;
mod metrics;
mod models;
mod state;

use crate::config::AppConfig;
use crate::errors::handle_middleware_error;
use crate::handlers::{
    compact_collection, create_collection, delete_collection, delete_points, get_collection,
    get_point, list_collections, live, metrics, ready, search, update_collection, upsert_points,
};
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let config = AppConfig::from_env().context("invalid configuration")?;
    let bind = config.bind;
    let state = tokio::task::spawn_blocking({
        let config = config.clone();
        move || AppState::open(config)
    })
    .await
    .context("engine startup task failed")??;
    let engine = state.engine.clone();
    let app = build_app(state);

    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("failed to bind server socket on {bind}"))?;

    tracing::info!(
        %bind,
        max_dimension = config.max_dimension,
        max_batch_size = config.max_batch_size,
        max_limit = config.max_limit,
        timeout_ms = config.request_timeout_ms,
        max_body_bytes = config.max_body_bytes,
        max_concurrency = config.max_concurrency,
        persistence_enabled = config.persistence_enabled,
        "quarry server started"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server exited unexpectedly")?;

    tokio::task::spawn_blocking(move || engine.shutdown())
        .await
        .context("engine shutdown task failed")?
        .context("final checkpoint failed")?;
    tracing::info!("quarry server stopped");

    Ok(())
}

fn build_app(state: AppState) -> Router {
    let request_id_header = HeaderName::from_static("x-request-id");
    let config = state.config.clone();
    let timeout = Duration::from_millis(config.request_timeout_ms);

    let middleware = ServiceBuilder::new()
        .layer(SetRequestIdLayer::new(
            request_id_header.clone(),
            MakeRequestUuid,
        ))
        .layer(PropagateRequestIdLayer::new(request_id_header.clone()))
        .layer(HandleErrorLayer::new(handle_middleware_error))
        .layer(TimeoutLayer::new(timeout))
        .layer(ConcurrencyLimitLayer::new(config.max_concurrency))
        .layer(RequestBodyLimitLayer::new(config.max_body_bytes))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(move |request: &Request<_>| {
                    let request_id = request
                        .headers()
                        .get(&request_id_header)
                        .and_then(|value| value.to_str().ok())
                        .unwrap_or("-");
                    tracing::info_span!(
                        "http_request",
                        method = %request.method(),
                        uri = %request.uri(),
                        request_id = %request_id
                    )
                })
                .on_response(DefaultOnResponse::new().latency_unit(LatencyUnit::Millis)),
        );

    Router::new()
        .route("/live", get(live))
        .route("/ready", get(ready))
        .route("/metrics", get(metrics))
        .route("/collections", post(create_collection).get(list_collections))
        .route(
            "/collections/:name",
            get(get_collection)
                .patch(update_collection)
                .delete(delete_collection),
        )
        .route("/collections/:name/points", put(upsert_points))
        .route("/collections/:name/points/delete", post(delete_points))
        .route("/collections/:name/points/:id", get(get_point))
        .route("/collections/:name/search", post(search))
        .route("/collections/:name/compact", post(compact_collection))
        .layer(DefaultBodyLimit::max(config.max_body_bytes))
        .layer(middleware)
        .with_state(state)
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if let Err(error) = tracing_subscriber::fmt().with_env_filter(filter).try_init() {
        eprintln!("failed to initialize tracing subscriber: {error}");
    }
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("shutdown signal received"),
        Err(error) => tracing::error!(%error, "failed to install Ctrl-C handler"),
    }
}
