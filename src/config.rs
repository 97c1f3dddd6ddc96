//! Configuration for `annex-core`.
//!
//! Loaded via `figment` layering, lowest to highest priority:
//!
//! 1. Default values
//! 2. Configuration file (`annex.toml`)
//! 3. Environment variables (`ANNEX_*`)
//!
//! None of §6's environment inputs ("data directory root, compression on/off,
//! default vector size, metric, capacity and LRU size") are hardcoded here —
//! this module just gives the embedding application a typed surface to set
//! them through.

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use crate::distance::DistanceMetric;
use crate::reranker::RerankMethod;

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to parse configuration from its source.
    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    /// A configuration value failed validation.
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue {
        /// Configuration key that failed validation.
        key: String,
        /// Validation error message.
        message: String,
    },
}

/// `VectorStore` configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Distance metric applied by exact linear scan when none is supplied
    /// per call.
    pub default_metric: DistanceMetric,
    /// Per-unit-gap penalty folded into `Euclidean`/`SquaredEuclidean` when
    /// two vectors being compared have different lengths.
    pub gap_penalty: f32,
    /// Whether on-disk files are gzip-compressed.
    pub compression: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            default_metric: DistanceMetric::Cosine,
            gap_penalty: 1.0,
            compression: false,
        }
    }
}

/// `ClusteredStore` configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    /// Distance within which a new vector joins an existing cluster instead
    /// of seeding a new one.
    pub new_cluster_distance_threshold: f32,
    /// Upper bound on the number of clusters a store will create.
    pub max_clusters: usize,
    /// Number of clusters probed by pruned `find_nearest` (0 = auto, picks
    /// enough clusters to expect at least `k` candidates).
    pub probe_clusters: usize,
    /// Maximum Lloyd iterations for `run_kmeans`.
    pub kmeans_max_iterations: usize,
    /// Convergence tolerance: stop when no centroid moves further than this.
    pub kmeans_tolerance: f32,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            new_cluster_distance_threshold: 0.3,
            max_clusters: 256,
            probe_clusters: 0,
            kmeans_max_iterations: 100,
            kmeans_tolerance: 1e-3,
        }
    }
}

/// `HnswIndex` configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HnswConfig {
    /// Target out-degree per node at upper layers.
    pub m: usize,
    /// Dynamic candidate list size while inserting.
    pub ef_construction: usize,
    /// Dynamic candidate list size at query time.
    pub ef_search: usize,
    /// PRNG seed for reproducible layer assignment.
    pub seed: u64,
    /// Number of accumulated additions before the orchestrator rebuilds a
    /// `Stale` index on the next search.
    pub auto_rebuild_threshold: usize,
}

impl Default for HnswConfig {
    fn default() -> Self {
        Self {
            m: 16,
            ef_construction: 200,
            ef_search: 100,
            seed: 0x5EED_1234_ABCD_EF01,
            auto_rebuild_threshold: 1000,
        }
    }
}

/// `PartitionManager` configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PartitionConfig {
    /// Root directory for the partitions tree.
    pub data_dir: String,
    /// Default per-partition vector capacity.
    pub capacity: usize,
    /// Bound on simultaneously loaded partitions (LRU).
    pub max_active_partitions: usize,
    /// Whether reaching capacity on the active partition creates a new one.
    pub auto_create_partitions: bool,
}

impl Default for PartitionConfig {
    fn default() -> Self {
        Self {
            data_dir: "./annex_data".to_string(),
            capacity: 100_000,
            max_active_partitions: 4,
            auto_create_partitions: true,
        }
    }
}

/// Search-result cache configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum number of cached query results.
    pub result_cache_size: usize,
    /// Decimal places retained when building the quantized query fingerprint
    /// used as part of the cache key.
    pub fingerprint_precision: u32,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            result_cache_size: 1000,
            fingerprint_precision: 4,
        }
    }
}

/// Reranking configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RerankConfig {
    /// Default reranking method when a search enables reranking without
    /// naming one explicitly.
    pub default_method: RerankMethod,
    /// MMR diversity trade-off, `0.0` = pure diversity, `1.0` = pure relevance.
    pub lambda: f32,
    /// Default field weights for the weighted reranker.
    pub weights: std::collections::HashMap<String, f32>,
}

impl Default for RerankConfig {
    fn default() -> Self {
        Self {
            default_method: RerankMethod::Standard,
            lambda: 0.5,
            weights: std::collections::HashMap::new(),
        }
    }
}

/// Top-level `annex-core` configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// `VectorStore` settings.
    pub store: StoreConfig,
    /// `ClusteredStore` settings.
    pub cluster: ClusterConfig,
    /// `HnswIndex` settings.
    pub hnsw: HnswConfig,
    /// `PartitionManager` settings.
    pub partition: PartitionConfig,
    /// Search-result cache settings.
    pub cache: CacheConfig,
    /// Reranker settings.
    pub rerank: RerankConfig,
}

impl Config {
    /// Loads configuration from `annex.toml` in the current directory,
    /// layered with environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if the file or environment values fail to parse.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_path("annex.toml")
    }

    /// Loads configuration from a specific file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file or environment values fail to parse.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let figment = Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("ANNEX_").split("_").lowercase(false));

        figment
            .extract()
            .map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Builds configuration from an in-memory TOML string (layered over
    /// defaults, no environment overrides). Mainly useful for tests.
    ///
    /// # Errors
    ///
    /// Returns an error if the string fails to parse.
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        let figment = Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Toml::string(toml_str));

        figment
            .extract()
            .map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Validates configuration values, rejecting out-of-range settings
    /// before they reach the store/index/orchestrator.
    ///
    /// # Errors
    ///
    /// Returns an error describing the first invalid field encountered.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.hnsw.m < 2 || self.hnsw.m > 128 {
            return Err(ConfigError::InvalidValue {
                key: "hnsw.m".to_string(),
                message: format!("value {} is out of range [2, 128]", self.hnsw.m),
            });
        }

        if self.hnsw.ef_construction < self.hnsw.m {
            return Err(ConfigError::InvalidValue {
                key: "hnsw.ef_construction".to_string(),
                message: "ef_construction must be >= m".to_string(),
            });
        }

        if self.hnsw.ef_search == 0 {
            return Err(ConfigError::InvalidValue {
                key: "hnsw.ef_search".to_string(),
                message: "ef_search must be > 0".to_string(),
            });
        }

        if self.partition.capacity == 0 {
            return Err(ConfigError::InvalidValue {
                key: "partition.capacity".to_string(),
                message: "capacity must be > 0".to_string(),
            });
        }

        if self.partition.max_active_partitions == 0 {
            return Err(ConfigError::InvalidValue {
                key: "partition.max_active_partitions".to_string(),
                message: "max_active_partitions must be > 0".to_string(),
            });
        }

        if self.cluster.max_clusters == 0 {
            return Err(ConfigError::InvalidValue {
                key: "cluster.max_clusters".to_string(),
                message: "max_clusters must be > 0".to_string(),
            });
        }

        if self.cluster.kmeans_tolerance <= 0.0 {
            return Err(ConfigError::InvalidValue {
                key: "cluster.kmeans_tolerance".to_string(),
                message: "kmeans_tolerance must be > 0".to_string(),
            });
        }

        if !(0.0..=1.0).contains(&self.rerank.lambda) {
            return Err(ConfigError::InvalidValue {
                key: "rerank.lambda".to_string(),
                message: format!("value {} is out of range [0.0, 1.0]", self.rerank.lambda),
            });
        }

        Ok(())
    }

    /// Serializes the configuration to TOML.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::ParseError(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn rejects_ef_construction_below_m() {
        let mut cfg = Config::default();
        cfg.hnsw.m = 64;
        cfg.hnsw.ef_construction = 10;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_lambda_out_of_range() {
        let mut cfg = Config::default();
        cfg.rerank.lambda = 1.5;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn from_toml_overrides_defaults() {
        let cfg = Config::from_toml(
            r#"
            [hnsw]
            m = 32
            ef_search = 150
            "#,
        )
        .unwrap();
        assert_eq!(cfg.hnsw.m, 32);
        assert_eq!(cfg.hnsw.ef_search, 150);
        assert_eq!(cfg.hnsw.ef_construction, 200);
    }

    #[test]
    fn round_trips_through_toml() {
        let cfg = Config::default();
        let toml_str = cfg.to_toml().unwrap();
        let parsed = Config::from_toml(&toml_str).unwrap();
        assert_eq!(parsed.hnsw.m, cfg.hnsw.m);
    }
}
