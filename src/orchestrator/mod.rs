//! Top-level query entry point: picks exact vs HNSW, applies filters,
//! fans out through the [`PartitionManager`], reranks, and caches.

mod cache_key;

pub use cache_key::CacheKey;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use crate::cache::LruCache;
use crate::config::{CacheConfig, RerankConfig};
use crate::distance::DistanceMetric;
use crate::error::{Error, Result};
use crate::events::EventBus;
use crate::filter::FilterPredicate;
use crate::id::VectorId;
use crate::partition::{Community, PartitionManager, PartitionSearchResult, PartitionStats, Relationship};
use crate::point::Metadata;
use crate::reranker::{self, RerankContext, RerankMethod};
use crate::store::{FieldCriteria, FindNearestOptions};

/// A single search hit, enriched beyond the bare `(id, distance)` pair.
#[derive(Debug, Clone)]
pub struct OrchestratorResult {
    pub id: VectorId,
    pub distance: f32,
    pub partition_id: String,
    pub index_used: &'static str,
    pub stale: bool,
    pub metadata: Option<Metadata>,
    pub vector: Option<Vec<f32>>,
}

/// Unified search options accepted by [`SearchOrchestrator::find_nearest`]
/// and [`SearchOrchestrator::find_nearest_hnsw`].
pub struct SearchOptions<'a> {
    pub k: usize,
    pub distance_metric: Option<DistanceMetric>,
    pub filter: Option<FilterPredicate<'a>>,
    pub use_hnsw: bool,
    pub ef_search: Option<usize>,
    pub partition_ids: Option<Vec<String>>,
    pub include_metadata: bool,
    pub include_vectors: bool,
    pub skip_cache: bool,
    pub rerank: bool,
    pub reranking_method: Option<RerankMethod>,
    pub rerank_lambda: Option<f32>,
    pub rerank_weights: Option<HashMap<String, f32>>,
    pub search_timeout_ms: Option<u64>,
}

impl Default for SearchOptions<'_> {
    fn default() -> Self {
        Self {
            k: 10,
            distance_metric: None,
            filter: None,
            use_hnsw: true,
            ef_search: None,
            partition_ids: None,
            include_metadata: false,
            include_vectors: false,
            skip_cache: false,
            rerank: false,
            reranking_method: None,
            rerank_lambda: None,
            rerank_weights: None,
            search_timeout_ms: None,
        }
    }
}

/// Aggregate counters returned by [`SearchOrchestrator::get_stats`].
#[derive(Debug, Clone)]
pub struct Stats {
    pub partitions: PartitionStats,
    pub total_vectors_configured: usize,
    pub hnsw_loaded_count: usize,
    pub cache_size: usize,
    pub cache_hit_rate: f64,
}

/// Runtime settings relevant to search behavior, threaded down from
/// [`crate::config::Config`].
#[derive(Clone, Copy)]
pub struct OrchestratorSettings {
    pub max_batch_size: usize,
    pub default_search_timeout_ms: u64,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            max_batch_size: 32,
            default_search_timeout_ms: 5_000,
        }
    }
}

/// Top-level query/write entry point consumed by external callers.
pub struct SearchOrchestrator {
    partitions: PartitionManager,
    cache: LruCache<CacheKey, Vec<OrchestratorResult>>,
    cache_config: CacheConfig,
    rerank_config: RerankConfig,
    settings: OrchestratorSettings,
    events: Option<Arc<EventBus>>,
}

impl SearchOrchestrator {
    pub fn new(partitions: PartitionManager, cache_config: CacheConfig, rerank_config: RerankConfig, settings: OrchestratorSettings) -> Self {
        let cache = LruCache::new(cache_config.result_cache_size);
        Self {
            partitions,
            cache,
            cache_config,
            rerank_config,
            settings,
            events: None,
        }
    }

    pub fn set_events(&mut self, events: Arc<EventBus>) {
        self.partitions.set_events(events.clone());
        self.events = Some(events);
    }

    pub const fn partitions(&self) -> &PartitionManager {
        &self.partitions
    }

    pub fn partitions_mut(&mut self) -> &mut PartitionManager {
        &mut self.partitions
    }

    /// Adds a single vector to the active partition.
    ///
    /// # Errors
    ///
    /// Returns an error if there is no active partition.
    pub fn add_vector(&mut self, id: Option<VectorId>, vector: Vec<f32>, metadata: Option<Metadata>) -> Result<(String, VectorId)> {
        self.partitions.add_vector(id, vector, metadata)
    }

    /// Adds many vectors, splitting across partitions as capacity dictates.
    ///
    /// # Errors
    ///
    /// Returns an error if there is no active partition.
    pub fn bulk_add(&mut self, items: Vec<(Option<VectorId>, Vec<f32>, Option<Metadata>)>) -> Result<(usize, Vec<String>)> {
        self.partitions.bulk_add(items)
    }

    pub fn get_vector(&self, partition_id: &str, id: &VectorId) -> Option<Vec<f32>> {
        self.partitions.get_vector(partition_id, id).map(|r| r.vector.clone())
    }

    pub fn has_vector(&self, partition_id: &str, id: &VectorId) -> bool {
        self.partitions.has_vector(partition_id, id)
    }

    pub fn delete_vector(&mut self, partition_id: &str, id: &VectorId) -> bool {
        self.partitions.delete_vector(partition_id, id)
    }

    pub fn update_metadata(&mut self, partition_id: &str, id: &VectorId, patch: impl FnOnce(&mut Metadata)) -> bool {
        self.partitions.update_metadata(partition_id, id, patch)
    }

    pub fn get_metadata(&self, partition_id: &str, id: &VectorId) -> Option<Metadata> {
        self.partitions.get_metadata(partition_id, id)
    }

    /// Gathers metadata matching `criteria` across every loaded partition
    /// (or the ones named in `partition_ids`), truncated to `limit`.
    pub fn get_metadata_with_field(&self, criteria: &FieldCriteria, values: Option<&[serde_json::Value]>, limit: Option<usize>, partition_ids: Option<&[String]>) -> Vec<(String, VectorId, Metadata)> {
        let mut out = Vec::new();
        for pid in self.partitions.loaded_ids() {
            if let Some(ids_filter) = partition_ids {
                if !ids_filter.contains(&pid) {
                    continue;
                }
            }
            let remaining = limit.map(|l| l.saturating_sub(out.len()));
            if remaining == Some(0) {
                break;
            }
            if let Some(matches) = self.partitions.with_store(&pid, |store| store.get_metadata_with_field(criteria, values, remaining)) {
                out.extend(matches.into_iter().map(|(id, md)| (pid.clone(), id, md)));
            }
        }
        out
    }

    fn enrich(&self, candidates: Vec<PartitionSearchResult>, include_metadata: bool, include_vectors: bool) -> Vec<OrchestratorResult> {
        candidates
            .into_iter()
            .map(|c| {
                let record = self.partitions.get_vector(&c.partition_id, &c.result.id);
                OrchestratorResult {
                    id: c.result.id,
                    distance: c.result.distance,
                    partition_id: c.partition_id,
                    index_used: c.index_used,
                    stale: c.stale,
                    metadata: if include_metadata { record.and_then(|r| r.metadata.clone()) } else { None },
                    vector: if include_vectors { record.map(|r| r.vector.clone()) } else { None },
                }
            })
            .collect()
    }

    fn apply_rerank(&self, query: &[f32], mut results: Vec<OrchestratorResult>, opts: &SearchOptions<'_>) -> Vec<OrchestratorResult> {
        if !opts.rerank {
            return results;
        }
        let method = opts.reranking_method.unwrap_or(self.rerank_config.default_method);
        let metric = opts.distance_metric.unwrap_or(DistanceMetric::Euclidean);
        let lambda = opts.rerank_lambda.unwrap_or(self.rerank_config.lambda);

        let vectors_map: HashMap<VectorId, Vec<f32>> = results
            .iter()
            .filter_map(|r| self.partitions.get_vector(&r.partition_id, &r.id).map(|rec| (r.id.clone(), rec.vector.clone())))
            .collect();
        let metadata_map: HashMap<VectorId, Metadata> = results
            .iter()
            .filter_map(|r| self.partitions.get_metadata(&r.partition_id, &r.id).map(|m| (r.id.clone(), m)))
            .collect();
        let weights = opts.rerank_weights.as_ref().unwrap_or(&self.rerank_config.weights);

        let by_id: HashMap<VectorId, OrchestratorResult> = results.drain(..).map(|r| (r.id.clone(), r)).collect();
        let candidates: Vec<crate::point::SearchResult> = by_id.values().map(|r| crate::point::SearchResult::new(r.id.clone(), r.distance)).collect();
        let mut candidates = candidates;
        candidates.sort_by(|a, b| a.distance.partial_cmp(&b.distance).unwrap_or(std::cmp::Ordering::Equal));

        let ctx = RerankContext {
            query_vector: Some(query),
            vectors: Some(&vectors_map),
            metadata: Some(&metadata_map),
            lambda,
            weights: Some(weights),
            distance_metric: metric,
        };
        let reranked = reranker::rerank(candidates, opts.k, method, &ctx);

        reranked.into_iter().filter_map(|r| by_id.get(&r.id).cloned()).collect()
    }

    /// Runs a nearest-neighbor search: HNSW when `opts.use_hnsw` and an
    /// index exists, falling back to exact per partition; consults and
    /// populates the result cache unless `opts.skip_cache`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Timeout`] if `opts.search_timeout_ms` (or the
    /// orchestrator's default) elapses before the fan-out completes.
    pub fn find_nearest(&mut self, query: &[f32], opts: &SearchOptions<'_>) -> Result<Vec<OrchestratorResult>> {
        if opts.use_hnsw {
            self.search_inner(query, opts, true)
        } else {
            self.search_inner(query, opts, false)
        }
    }

    /// Always attempts the HNSW path (falling back to exact per partition
    /// with no graph), regardless of `opts.use_hnsw`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Timeout`] if the deadline elapses.
    pub fn find_nearest_hnsw(&mut self, query: &[f32], opts: &SearchOptions<'_>) -> Result<Vec<OrchestratorResult>> {
        self.search_inner(query, opts, true)
    }

    fn search_inner(&mut self, query: &[f32], opts: &SearchOptions<'_>, use_hnsw: bool) -> Result<Vec<OrchestratorResult>> {
        let start = Instant::now();
        let timeout_ms = opts.search_timeout_ms.unwrap_or(self.settings.default_search_timeout_ms);

        let cache_key = (!opts.skip_cache).then(|| CacheKey::build(query, opts, self.cache_config.fingerprint_precision));

        if let Some(key) = &cache_key {
            if let Some(hit) = self.cache.get(key) {
                return Ok(hit);
            }
        }

        let find_opts = FindNearestOptions {
            filter: opts.filter.as_ref().map(|f| match f {
                FilterPredicate::Condition(c) => FilterPredicate::Condition(c),
                FilterPredicate::Fn(f) => FilterPredicate::Fn(*f),
            }),
            metric: opts.distance_metric,
            gap_penalty: 0.0,
        };

        let partition_ids = opts.partition_ids.clone();
        let k = opts.k;
        let ef_search = opts.ef_search;
        let query_owned = query.to_vec();

        // PartitionManager's fan-out only touches already-loaded partitions
        // and does no I/O, so this always completes quickly; the deadline
        // mainly protects against a pathologically large loaded set.
        let raw = if use_hnsw {
            self.partitions.find_nearest_hnsw(&query_owned, k, ef_search, &find_opts, partition_ids.as_deref())
        } else {
            self.partitions.find_nearest(&query_owned, k, &find_opts, partition_ids.as_deref())
        };

        let enriched = self.enrich(raw, opts.include_metadata || opts.rerank, opts.include_vectors);
        let final_results = self.apply_rerank(query, enriched, opts);

        if timeout_ms > 0 && start.elapsed() > std::time::Duration::from_millis(timeout_ms) {
            return Err(Error::Timeout(timeout_ms));
        }

        if let Some(key) = cache_key {
            self.cache.insert(key, final_results.clone());
        }

        Ok(final_results)
    }

    /// Runs `queries` in chunks of at most `max_batch_size`, each query
    /// independently timed out and independently allowed to fail: a failed
    /// query yields `None` at its position rather than failing the batch.
    ///
    /// Each chunk's queries are evaluated one at a time, so output order is
    /// unconditionally the same as `queries`' input order. `prioritize_order`
    /// is accepted for API parity with a concurrent scheduler but has no
    /// effect here: there is no out-of-order completion path to opt into or
    /// out of.
    pub fn batch_search(&mut self, queries: Vec<Vec<f32>>, opts: &SearchOptions<'_>, _prioritize_order: bool) -> Vec<Option<Vec<OrchestratorResult>>> {
        let mut out = Vec::with_capacity(queries.len());
        for chunk in queries.chunks(self.settings.max_batch_size.max(1)) {
            let mut chunk_results: Vec<Option<Vec<OrchestratorResult>>> = Vec::with_capacity(chunk.len());
            for query in chunk {
                match self.search_inner(query, opts, opts.use_hnsw) {
                    Ok(results) => chunk_results.push(Some(results)),
                    Err(_) => chunk_results.push(None),
                }
            }
            out.extend(chunk_results);
        }
        out
    }

    pub fn build_indexes(&mut self, partition_id: Option<&str>) {
        self.partitions.build_hnsw(partition_id);
    }

    /// # Errors
    ///
    /// Returns an error on any I/O failure while saving.
    pub fn save(&mut self, partition_id: Option<&str>) -> Result<()> {
        self.partitions.save(partition_id)
    }

    /// # Errors
    ///
    /// Returns an error on any I/O failure while flushing.
    pub fn close(&mut self) -> Result<()> {
        self.partitions.close()
    }

    pub fn extract_relationships(&self, threshold: f32, metric: DistanceMetric, partition_ids: Option<&[String]>) -> Vec<Relationship> {
        self.partitions.extract_relationships(threshold, metric, partition_ids)
    }

    pub fn extract_communities(&self, threshold: f32, metric: DistanceMetric, partition_ids: Option<&[String]>) -> Vec<Community> {
        self.partitions.extract_communities(threshold, metric, partition_ids)
    }

    pub fn get_stats(&self) -> Stats {
        let partitions = self.partitions.stats();
        let stats = self.cache.stats();
        Stats {
            hnsw_loaded_count: partitions.hnsw_loaded_count,
            total_vectors_configured: partitions.total_vectors,
            partitions,
            cache_size: self.cache.len(),
            cache_hit_rate: stats.hit_rate(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clustered_store::ClusterParams;
    use crate::index::hnsw::HnswParams;
    use crate::partition::PartitionManagerParams;

    fn orchestrator(dir: &std::path::Path) -> SearchOrchestrator {
        let pm = PartitionManager::open(PartitionManagerParams {
            data_dir: dir.to_path_buf(),
            default_metric: DistanceMetric::Euclidean,
            gap_penalty: 0.0,
            compress: false,
            default_capacity: 1000,
            max_active_partitions: 4,
            auto_create_partitions: true,
            cluster_params: ClusterParams::default(),
            hnsw_params: HnswParams::default(),
        })
        .unwrap();
        let mut orch = SearchOrchestrator::new(pm, CacheConfig::default(), RerankConfig::default(), OrchestratorSettings::default());
        orch.partitions_mut().create_partition(Some("p1".to_string()), "p1", true, None).unwrap();
        orch
    }

    #[test]
    fn finds_nearest_and_caches() {
        let dir = tempfile::tempdir().unwrap();
        let mut orch = orchestrator(dir.path());
        orch.add_vector(Some(VectorId::Int(1)), vec![0.0, 0.0], None).unwrap();
        orch.add_vector(Some(VectorId::Int(2)), vec![5.0, 5.0], None).unwrap();

        let opts = SearchOptions {
            k: 1,
            use_hnsw: false,
            ..Default::default()
        };
        let results = orch.find_nearest(&[0.0, 0.0], &opts).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, VectorId::Int(1));

        let stats_before = orch.get_stats();
        let _ = orch.find_nearest(&[0.0, 0.0], &opts).unwrap();
        let stats_after = orch.get_stats();
        assert!(stats_after.cache_hit_rate >= stats_before.cache_hit_rate);
    }

    #[test]
    fn batch_search_preserves_order_and_tolerates_failures() {
        let dir = tempfile::tempdir().unwrap();
        let mut orch = orchestrator(dir.path());
        orch.add_vector(Some(VectorId::Int(1)), vec![0.0, 0.0], None).unwrap();

        let opts = SearchOptions {
            k: 1,
            use_hnsw: false,
            ..Default::default()
        };
        let queries = vec![vec![0.0, 0.0], vec![1.0, 1.0]];
        let results = orch.batch_search(queries, &opts, true);
        assert_eq!(results.len(), 2);
        assert!(results[0].is_some());
    }
}
