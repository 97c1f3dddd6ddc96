//! # `annex-core`
//!
//! Partitioned, HNSW-backed vector similarity search engine core.
//!
//! `annex-core` stores vectors in capacity-bounded partitions, builds an
//! approximate nearest-neighbor graph per partition on demand, and fans
//! queries out across whichever partitions are currently resident in
//! memory. It is designed to sit underneath a thin service layer rather
//! than to be a database in its own right: there is no query language, no
//! networking, and no multi-tenant access control here.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use annex_core::{
//!     DistanceMetric, PartitionManager, PartitionManagerParams, SearchOptions,
//!     SearchOrchestrator, OrchestratorSettings,
//! };
//! use annex_core::config::{CacheConfig, RerankConfig};
//!
//! let partitions = PartitionManager::open(PartitionManagerParams {
//!     data_dir: "./data".into(),
//!     ..Default::default()
//! })?;
//! let mut orchestrator = SearchOrchestrator::new(
//!     partitions,
//!     CacheConfig::default(),
//!     RerankConfig::default(),
//!     OrchestratorSettings::default(),
//! );
//!
//! orchestrator.add_vector(None, vec![0.1, 0.2, 0.3], None)?;
//! let hits = orchestrator.find_nearest(&[0.1, 0.2, 0.3], &SearchOptions::default())?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod cache;
pub mod clustered_store;
pub mod config;
pub mod distance;
pub mod error;
pub mod events;
pub mod filter;
pub mod id;
pub mod index;
pub mod orchestrator;
pub mod partition;
pub mod point;
pub mod reranker;
pub mod rng;
pub mod store;

pub use clustered_store::{Cluster, ClusterParams, ClusteredStore};
pub use config::Config;
pub use distance::DistanceMetric;
pub use error::{Error, Result};
pub use events::{Event, EventBus};
pub use filter::{Condition, Filter, FilterPredicate};
pub use id::VectorId;
pub use index::{HnswIndex, HnswParams, HnswState};
pub use orchestrator::{OrchestratorResult, OrchestratorSettings, SearchOptions, SearchOrchestrator};
pub use partition::{PartitionManager, PartitionManagerParams, PartitionStats};
pub use point::{Metadata, SearchResult, VectorRecord};
pub use reranker::RerankMethod;
pub use store::{FieldCriteria, FindNearestOptions, VectorStore};
