#![forbid(unsafe_code)]
//! Core engine for Quarry.
//!
//! A collection-scoped approximate nearest neighbor engine: every named
//! collection owns a [`VectorSpace`], a [`PointStore`] and a lazily built HNSW
//! graph. Writes go through the mutation coordinator and searches through the
//! query engine; [`Engine`] ties the pieces together behind one explicit
//! instance with its own configuration and lifecycle.

pub mod collection;
pub mod config;
pub mod engine;
pub mod error;
pub mod filter;
pub mod hnsw;
pub mod mutation;
pub mod payload;
pub mod persistence;
pub mod point_store;
pub mod query;
pub mod registry;
pub mod vector;

pub use collection::{Collection, CollectionInfo};
pub use config::{EngineConfig, IndexConfig, IndexConfigPatch, PersistenceConfig, SearchConfig};
pub use engine::Engine;
pub use error::{Error, Result};
pub use filter::{Filter, RangeBounds};
pub use mutation::{PointInput, PointStatus, WriteOutcome};
pub use payload::{Payload, PayloadValue};
pub use point_store::{PointId, PointRecord, PointStore};
pub use query::{ScoredPoint, SearchMode, SearchRequest, SearchResponse};
pub use registry::CollectionRegistry;
pub use vector::{Metric, VectorSpace};
