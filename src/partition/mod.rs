//! Owns the set of partitions, LRU-caches a bounded number of loaded ones,
//! and routes writes/fans out reads across them.

mod persistence;
mod relationships;

pub use persistence::PartitionConfigEntry;
pub use relationships::{Community, Relationship};

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use indexmap::IndexMap;
use rayon::prelude::*;

use crate::clustered_store::{ClusterParams, ClusteredStore};
use crate::distance::DistanceMetric;
use crate::error::{Error, Result};
use crate::events::{Event, EventBus};
use crate::id::VectorId;
use crate::index::hnsw::{HnswIndex, HnswLoadResult, HnswParams, HnswState};
use crate::point::{Metadata, SearchResult, VectorRecord};
use crate::store::FindNearestOptions;

/// A single candidate result from a cross-partition search, stamped with
/// the partition it came from and which search path produced it.
#[derive(Debug, Clone)]
pub struct PartitionSearchResult {
    /// The match itself.
    pub result: SearchResult,
    /// Partition the match was found in.
    pub partition_id: String,
    /// `"hnsw"` or `"exact"`, whichever path actually served this result.
    pub index_used: &'static str,
    /// Whether the HNSW graph that served this result is stale relative to
    /// its partition's store.
    pub stale: bool,
}

/// A loaded, in-memory partition: its clustered store and, optionally, a
/// built HNSW graph.
pub struct LoadedPartition {
    store: ClusteredStore,
    hnsw: Option<HnswIndex>,
    dirty: bool,
}

impl LoadedPartition {
    pub const fn store(&self) -> &ClusteredStore {
        &self.store
    }

    pub const fn hnsw(&self) -> Option<&HnswIndex> {
        self.hnsw.as_ref()
    }
}

/// Tuning knobs threaded down to every partition's `ClusteredStore` and
/// `HnswIndex`.
#[derive(Clone)]
pub struct PartitionManagerParams {
    pub data_dir: PathBuf,
    pub default_metric: DistanceMetric,
    pub gap_penalty: f32,
    pub compress: bool,
    pub default_capacity: usize,
    pub max_active_partitions: usize,
    pub auto_create_partitions: bool,
    pub cluster_params: ClusterParams,
    pub hnsw_params: HnswParams,
}

/// Owns partition configs, the bounded LRU of loaded partitions, and the
/// currently active (write-receiving) partition.
pub struct PartitionManager {
    params: PartitionManagerParams,
    configs: IndexMap<String, PartitionConfigEntry>,
    loaded: IndexMap<String, LoadedPartition>,
    active_id: Option<String>,
    events: Option<Arc<EventBus>>,
    next_seq: u64,
    /// Set by `open`, cleared by the first `set_events`: there is no bus to
    /// publish to yet at construction time, so the `DbLoad` for this load is
    /// deferred to the moment a subscriber can actually receive it.
    pending_db_load: bool,
}

impl PartitionManager {
    /// Opens (or initializes) a partition manager rooted at
    /// `params.data_dir`, reloading `partitions.json` if present.
    ///
    /// # Errors
    ///
    /// Returns an error if `partitions.json` exists but cannot be parsed.
    pub fn open(params: PartitionManagerParams) -> Result<Self> {
        std::fs::create_dir_all(&params.data_dir)?;
        let configs = persistence::load_configs(&params.data_dir)?;
        let active_id = configs.values().find(|c| c.active).map(|c| c.id.clone());
        let next_seq = configs.len() as u64;
        Ok(Self {
            params,
            configs,
            loaded: IndexMap::new(),
            active_id,
            events: None,
            next_seq,
            pending_db_load: true,
        })
    }

    pub fn set_events(&mut self, events: Arc<EventBus>) {
        self.events = Some(events);
        if self.pending_db_load {
            self.pending_db_load = false;
            self.emit(Event::DbLoad);
        }
    }

    fn emit(&self, event: Event) {
        if let Some(bus) = &self.events {
            bus.publish(event);
        }
    }

    pub fn active_id(&self) -> Option<&str> {
        self.active_id.as_deref()
    }

    pub fn configs(&self) -> impl Iterator<Item = &PartitionConfigEntry> {
        self.configs.values()
    }

    pub fn loaded_ids(&self) -> Vec<String> {
        self.loaded.keys().cloned().collect()
    }

    /// Registers a new partition. Promotes it active (demoting the previous
    /// active partition) when `set_active` is true, loading it immediately.
    ///
    /// # Errors
    ///
    /// Returns an error if `id` is already registered, or if loading the
    /// newly active partition fails.
    pub fn create_partition(&mut self, id: Option<String>, name: impl Into<String>, set_active: bool, capacity: Option<usize>) -> Result<String> {
        let id = id.unwrap_or_else(|| {
            self.next_seq += 1;
            format!("p{}", self.next_seq)
        });
        if self.configs.contains_key(&id) {
            return Err(Error::PartitionExists(id));
        }

        let created_at = SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0);
        self.configs.insert(
            id.clone(),
            PartitionConfigEntry {
                id: id.clone(),
                name: name.into(),
                created_at,
                vector_count: 0,
                capacity: capacity.unwrap_or(self.params.default_capacity),
                active: set_active,
            },
        );
        self.emit(Event::PartitionCreated { partition_id: id.clone() });

        std::fs::create_dir_all(self.partition_dir(&id))?;

        if set_active {
            if let Some(prev) = self.active_id.take() {
                if let Some(cfg) = self.configs.get_mut(&prev) {
                    cfg.active = false;
                }
            }
            if let Some(cfg) = self.configs.get_mut(&id) {
                cfg.active = true;
            }
            self.active_id = Some(id.clone());
            self.ensure_loaded(&id)?;
        }

        self.persist_configs()?;
        Ok(id)
    }

    /// Marks `id` active, loading it if necessary.
    ///
    /// # Errors
    ///
    /// Returns an error if `id` is not a registered partition, or loading
    /// it fails.
    pub fn set_active(&mut self, id: &str) -> Result<()> {
        if !self.configs.contains_key(id) {
            return Err(Error::PartitionNotFound(id.to_string()));
        }
        if let Some(prev) = self.active_id.take() {
            if let Some(cfg) = self.configs.get_mut(&prev) {
                cfg.active = false;
            }
        }
        if let Some(cfg) = self.configs.get_mut(id) {
            cfg.active = true;
        }
        self.active_id = Some(id.to_string());
        self.ensure_loaded(id)?;
        self.persist_configs()
    }

    /// Touches `id` into the LRU without changing the active (write-target)
    /// partition: loads it from disk on a miss, evicting the LRU tail if
    /// the loaded set is already at capacity. Use this to warm a
    /// non-active partition ahead of a cross-partition `find_nearest`.
    ///
    /// # Errors
    ///
    /// Returns an error if `id` is not a registered partition, or loading
    /// it from disk fails.
    pub fn get_partition(&mut self, id: &str) -> Result<()> {
        if !self.configs.contains_key(id) {
            return Err(Error::PartitionNotFound(id.to_string()));
        }
        self.ensure_loaded(id)
    }

    fn partition_dir(&self, id: &str) -> PathBuf {
        self.params.data_dir.join(id)
    }

    fn persist_configs(&self) -> Result<()> {
        persistence::save_configs(&self.params.data_dir, self.configs.values())
    }

    /// Ensures `id` is present in `loaded`, touching it to the back (most
    /// recently used) if already there. Loads from disk and evicts the LRU
    /// tail (skipping the active partition) if at capacity.
    fn ensure_loaded(&mut self, id: &str) -> Result<()> {
        if let Some(partition) = self.loaded.shift_remove(id) {
            self.loaded.insert(id.to_string(), partition);
            return Ok(());
        }

        if self.loaded.len() >= self.params.max_active_partitions {
            self.evict_one(Some(id))?;
        }

        let partition = self.load_partition_from_disk(id)?;
        self.loaded.insert(id.to_string(), partition);
        self.emit(Event::PartitionLoaded { partition_id: id.to_string() });
        Ok(())
    }

    fn load_partition_from_disk(&self, id: &str) -> Result<LoadedPartition> {
        let dir = self.partition_dir(id);
        let store = if dir.join(crate::store::META_JSON_FILE).exists() || dir.join(format!("{}.gz", crate::store::META_JSON_FILE)).exists() {
            match ClusteredStore::load(&dir, id, self.params.default_metric, self.params.gap_penalty, self.params.cluster_params) {
                Ok((store, _)) => store,
                Err(err) => {
                    tracing::error!(partition_id = %id, error = %err, "failed to load partition from disk");
                    self.emit(Event::PartitionError {
                        partition_id: id.to_string(),
                        message: err.to_string(),
                    });
                    return Err(err);
                }
            }
        } else {
            ClusteredStore::new(id, self.params.default_metric, self.params.gap_penalty, self.params.cluster_params)
        };

        let hnsw = match HnswIndex::load(&dir, id, self.params.hnsw_params.seed) {
            Ok((index, HnswLoadResult::Loaded)) => Some(index),
            _ => None,
        };

        Ok(LoadedPartition { store, hnsw, dirty: false })
    }

    /// Evicts the LRU tail (skipping `active_id` and `protect`), saving it
    /// first if dirty. If the only loaded partition is the active one and
    /// there's no tail to evict, this is a no-op (a configuration violation
    /// the caller should size `max_active_partitions` to avoid; reads fall
    /// back to a transient load instead of failing).
    ///
    /// A save failure does not evict: the partition is retained in memory
    /// (still dirty) so the next eviction attempt retries, and a
    /// `PartitionError` is published instead of failing the caller.
    fn evict_one(&mut self, protect: Option<&str>) -> Result<()> {
        let victim = self
            .loaded
            .keys()
            .find(|id| Some(id.as_str()) != self.active_id.as_deref() && Some(id.as_str()) != protect)
            .cloned();

        let Some(victim) = victim else {
            return Ok(());
        };

        if let Some(partition) = self.loaded.get(&victim) {
            if partition.dirty {
                if let Err(err) = self.save_partition(&victim, partition) {
                    tracing::error!(partition_id = %victim, error = %err, "failed to save partition during eviction, retaining in memory");
                    self.emit(Event::PartitionError {
                        partition_id: victim.clone(),
                        message: err.to_string(),
                    });
                    return Ok(());
                }
            }
        }
        self.loaded.shift_remove(&victim);
        self.emit(Event::PartitionEvicted { partition_id: victim });
        Ok(())
    }

    fn save_partition(&self, id: &str, partition: &LoadedPartition) -> Result<()> {
        let dir = self.partition_dir(id);
        partition.store.save(&dir, self.params.compress)?;
        if let Some(hnsw) = &partition.hnsw {
            hnsw.save(&dir, self.params.compress)?;
        }
        Ok(())
    }

    /// Adds a vector to the active partition, auto-creating a new active
    /// partition on overflow when configured to, else inserting anyway and
    /// publishing a `PartitionOverflow` event.
    ///
    /// # Errors
    ///
    /// Returns an error if there is no active partition.
    pub fn add_vector(&mut self, id: Option<VectorId>, vector: Vec<f32>, metadata: Option<Metadata>) -> Result<(String, VectorId)> {
        let active = self.active_id.clone().ok_or(Error::BadRequest("no active partition".to_string()))?;
        self.ensure_loaded(&active)?;

        let capacity = self.configs.get(&active).map_or(usize::MAX, |c| c.capacity);
        let current_len = self.loaded.get(&active).map_or(0, |p| p.store.len());

        let target = if current_len >= capacity && self.params.auto_create_partitions {
            self.next_seq += 1;
            let new_id = format!("p{}", self.next_seq);
            self.create_partition(Some(new_id.clone()), new_id.clone(), true, Some(capacity))?;
            new_id
        } else {
            if current_len >= capacity {
                tracing::warn!(partition_id = %active, current_len, capacity, "write landed in a partition at or over capacity");
                self.emit(Event::PartitionOverflow {
                    partition_id: active.clone(),
                    vector_count: current_len,
                    capacity,
                });
            }
            active
        };

        self.ensure_loaded(&target)?;
        let partition = self.loaded.get_mut(&target).expect("just ensured loaded");
        let vector_id = partition.store.add(id, vector, metadata);
        partition.dirty = true;
        if let Some(hnsw) = &mut partition.hnsw {
            hnsw.mark_stale();
        }
        if let Some(cfg) = self.configs.get_mut(&target) {
            cfg.vector_count = partition.store.len();
        }
        self.emit(Event::VectorAdd {
            partition_id: target.clone(),
            id: vector_id.clone(),
        });
        Ok((target, vector_id))
    }

    /// Adds many vectors, splitting across partitions as capacity dictates.
    /// Returns the total inserted count and the set of partitions touched.
    ///
    /// # Errors
    ///
    /// Returns an error if there is no active partition.
    pub fn bulk_add(&mut self, items: Vec<(Option<VectorId>, Vec<f32>, Option<Metadata>)>) -> Result<(usize, Vec<String>)> {
        let mut touched = Vec::new();
        let mut count = 0;
        for (id, vector, metadata) in items {
            let (partition_id, _) = self.add_vector(id, vector, metadata)?;
            if !touched.contains(&partition_id) {
                touched.push(partition_id.clone());
            }
            count += 1;
        }
        for partition_id in &touched {
            self.emit(Event::VectorsBulkAdd {
                partition_id: partition_id.clone(),
                count,
            });
        }
        Ok((count, touched))
    }

    pub fn get_vector(&self, partition_id: &str, id: &VectorId) -> Option<&VectorRecord> {
        self.loaded.get(partition_id).and_then(|p| p.store.get(id))
    }

    pub fn has_vector(&self, partition_id: &str, id: &VectorId) -> bool {
        self.loaded.get(partition_id).is_some_and(|p| p.store.has(id))
    }

    /// Deletes a vector from a loaded partition.
    pub fn delete_vector(&mut self, partition_id: &str, id: &VectorId) -> bool {
        let Some(partition) = self.loaded.get_mut(partition_id) else {
            return false;
        };
        let removed = partition.store.delete(id);
        if removed {
            partition.dirty = true;
            if let Some(hnsw) = &mut partition.hnsw {
                hnsw.mark_stale();
            }
            if let Some(cfg) = self.configs.get_mut(partition_id) {
                cfg.vector_count = partition.store.len();
            }
            self.emit(Event::VectorDelete {
                partition_id: partition_id.to_string(),
                id: id.clone(),
            });
        }
        removed
    }

    /// Merges `patch` into a vector's metadata in a loaded partition.
    pub fn update_metadata(&mut self, partition_id: &str, id: &VectorId, patch: impl FnOnce(&mut Metadata)) -> bool {
        let Some(partition) = self.loaded.get_mut(partition_id) else {
            return false;
        };
        let updated = partition.store.update_metadata(id, patch);
        if updated {
            partition.dirty = true;
            self.emit(Event::MetadataUpdate {
                partition_id: partition_id.to_string(),
                id: id.clone(),
            });
        }
        updated
    }

    pub fn get_metadata(&self, partition_id: &str, id: &VectorId) -> Option<Metadata> {
        self.loaded.get(partition_id).and_then(|p| p.store.get_metadata(id))
    }

    /// Runs `f` against a loaded partition's store, returning `None` if the
    /// partition isn't currently loaded.
    pub fn with_store<T>(&self, partition_id: &str, f: impl FnOnce(&ClusteredStore) -> T) -> Option<T> {
        self.loaded.get(partition_id).map(|p| f(&p.store))
    }

    /// Exact-scan fan-out across candidate partitions (the explicitly
    /// named `partition_ids` intersected with `loaded`, or every loaded
    /// partition), merged by ascending distance and truncated to `k`.
    pub fn find_nearest(&self, query: &[f32], k: usize, opts: &FindNearestOptions<'_>, partition_ids: Option<&[String]>) -> Vec<PartitionSearchResult> {
        let candidates = self.candidate_partition_ids(partition_ids);

        let mut all: Vec<PartitionSearchResult> = candidates
            .par_iter()
            .flat_map_iter(|pid| {
                let Some(partition) = self.loaded.get(pid) else {
                    return Vec::new().into_iter();
                };
                partition
                    .store
                    .find_nearest(query, k, opts)
                    .into_iter()
                    .map(|r| PartitionSearchResult {
                        result: r,
                        partition_id: pid.clone(),
                        index_used: "exact",
                        stale: false,
                    })
                    .collect::<Vec<_>>()
                    .into_iter()
            })
            .collect();

        all.sort_by(|a, b| a.result.distance.partial_cmp(&b.result.distance).unwrap_or(std::cmp::Ordering::Equal));
        all.truncate(k);
        all
    }

    /// Same fan-out as [`Self::find_nearest`] but prefers each partition's
    /// HNSW graph when one exists (`Ready` or `Stale`), falling back to
    /// exact scan for partitions with no graph (`Empty`).
    pub fn find_nearest_hnsw(&self, query: &[f32], k: usize, ef_search: Option<usize>, opts: &FindNearestOptions<'_>, partition_ids: Option<&[String]>) -> Vec<PartitionSearchResult> {
        let candidates = self.candidate_partition_ids(partition_ids);

        let mut all: Vec<PartitionSearchResult> = candidates
            .par_iter()
            .flat_map_iter(|pid| {
                let Some(partition) = self.loaded.get(pid) else {
                    return Vec::new().into_iter();
                };
                match &partition.hnsw {
                    Some(hnsw) if hnsw.state() != HnswState::Empty => {
                        let (results, stale) = hnsw.search(&partition.store, query, k, ef_search, opts.filter.as_ref());
                        results
                            .into_iter()
                            .map(|r| PartitionSearchResult {
                                result: r,
                                partition_id: pid.clone(),
                                index_used: "hnsw",
                                stale,
                            })
                            .collect::<Vec<_>>()
                            .into_iter()
                    }
                    _ => partition
                        .store
                        .find_nearest(query, k, opts)
                        .into_iter()
                        .map(|r| PartitionSearchResult {
                            result: r,
                            partition_id: pid.clone(),
                            index_used: "exact",
                            stale: false,
                        })
                        .collect::<Vec<_>>()
                        .into_iter(),
                }
            })
            .collect();

        all.sort_by(|a, b| a.result.distance.partial_cmp(&b.result.distance).unwrap_or(std::cmp::Ordering::Equal));
        all.truncate(k);
        all
    }

    fn candidate_partition_ids(&self, partition_ids: Option<&[String]>) -> Vec<String> {
        match partition_ids {
            Some(ids) => ids.iter().filter(|id| self.loaded.contains_key(id.as_str())).cloned().collect(),
            None => self.loaded.keys().cloned().collect(),
        }
    }

    /// Builds an HNSW graph on the named partition, or on every currently
    /// loaded partition if `partition_id` is `None`.
    pub fn build_hnsw(&mut self, partition_id: Option<&str>) {
        let targets: Vec<String> = match partition_id {
            Some(id) => vec![id.to_string()],
            None => self.loaded.keys().cloned().collect(),
        };
        for id in targets {
            let events = self.events.clone();
            let hnsw_params = self.params.hnsw_params;
            if let Some(partition) = self.loaded.get_mut(&id) {
                let pid = id.clone();
                let mut hnsw = HnswIndex::new(hnsw_params);
                hnsw.build_with_progress(&partition.store, |inserted, total| {
                    if let Some(bus) = &events {
                        bus.publish(Event::PartitionIndexProgress {
                            partition_id: pid.clone(),
                            inserted,
                            total,
                        });
                    }
                });
                partition.hnsw = Some(hnsw);
                partition.dirty = true;
                self.emit(Event::PartitionIndexed { partition_id: id });
            }
        }
    }

    /// Saves the named partition, or every dirty loaded partition if
    /// `partition_id` is `None`.
    ///
    /// # Errors
    ///
    /// Returns an error on any I/O failure.
    pub fn save(&mut self, partition_id: Option<&str>) -> Result<()> {
        let targets: Vec<String> = match partition_id {
            Some(id) => vec![id.to_string()],
            None => self.loaded.iter().filter(|(_, p)| p.dirty).map(|(id, _)| id.clone()).collect(),
        };
        for id in &targets {
            if let Some(partition) = self.loaded.get(id) {
                self.save_partition(id, partition)?;
            }
            if let Some(partition) = self.loaded.get_mut(id) {
                partition.dirty = false;
            }
        }
        self.persist_configs()?;
        self.emit(Event::DbSave);
        Ok(())
    }

    /// Flushes every dirty loaded partition and drops all in-memory state.
    ///
    /// # Errors
    ///
    /// Returns an error on any I/O failure while flushing.
    pub fn close(&mut self) -> Result<()> {
        self.save(None)?;
        self.loaded.clear();
        self.emit(Event::DbClose);
        Ok(())
    }

    /// Per-partition pairwise relationships: an undirected edge for every
    /// pair of vectors within `threshold` distance, `i < j` on emission.
    /// Implemented per loaded partition only; no cross-partition pairs.
    pub fn extract_relationships(&self, threshold: f32, metric: DistanceMetric, partition_ids: Option<&[String]>) -> Vec<Relationship> {
        let candidates = self.candidate_partition_ids(partition_ids);
        candidates
            .into_iter()
            .filter_map(|pid| self.loaded.get(&pid).map(|p| (pid, p)))
            .flat_map(|(pid, partition)| relationships::extract_relationships(&pid, partition.store.store(), threshold, metric))
            .collect()
    }

    /// Connected components of [`Self::extract_relationships`] within each
    /// loaded partition.
    pub fn extract_communities(&self, threshold: f32, metric: DistanceMetric, partition_ids: Option<&[String]>) -> Vec<Community> {
        let candidates = self.candidate_partition_ids(partition_ids);
        candidates
            .into_iter()
            .filter_map(|pid| self.loaded.get(&pid).map(|p| (pid, p)))
            .flat_map(|(pid, partition)| relationships::extract_communities(&pid, partition.store.store(), threshold, metric))
            .collect()
    }

    /// A snapshot of partition/index counts for `get_stats`.
    pub fn stats(&self) -> PartitionStats {
        PartitionStats {
            total_configured: self.configs.len(),
            loaded_count: self.loaded.len(),
            loaded_ids: self.loaded_ids(),
            active_id: self.active_id.clone(),
            total_vectors: self.configs.values().map(|c| c.vector_count).sum(),
            hnsw_loaded_count: self.loaded.values().filter(|p| p.hnsw.is_some()).count(),
        }
    }
}

/// Snapshot returned as part of `get_stats`.
#[derive(Debug, Clone)]
pub struct PartitionStats {
    pub total_configured: usize,
    pub loaded_count: usize,
    pub loaded_ids: Vec<String>,
    pub active_id: Option<String>,
    pub total_vectors: usize,
    pub hnsw_loaded_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager(dir: &std::path::Path, capacity: usize, max_active: usize) -> PartitionManager {
        PartitionManager::open(PartitionManagerParams {
            data_dir: dir.to_path_buf(),
            default_metric: DistanceMetric::Euclidean,
            gap_penalty: 0.0,
            compress: false,
            default_capacity: capacity,
            max_active_partitions: max_active,
            auto_create_partitions: true,
            cluster_params: ClusterParams::default(),
            hnsw_params: HnswParams::default(),
        })
        .unwrap()
    }

    #[test]
    fn auto_creates_partition_on_overflow() {
        let dir = tempfile::tempdir().unwrap();
        let mut pm = manager(dir.path(), 3, 4);
        pm.create_partition(Some("p1".to_string()), "p1", true, None).unwrap();

        let mut partitions_touched = std::collections::HashSet::new();
        for i in 0..7u64 {
            let (pid, _) = pm.add_vector(Some(VectorId::Int(i)), vec![i as f32], None).unwrap();
            partitions_touched.insert(pid);
        }
        assert!(partitions_touched.len() >= 2);
    }

    #[test]
    fn lru_evicts_inactive_partition_when_full() {
        let dir = tempfile::tempdir().unwrap();
        let mut pm = manager(dir.path(), 100, 2);
        pm.create_partition(Some("p1".to_string()), "p1", true, None).unwrap();
        pm.create_partition(Some("p2".to_string()), "p2", true, None).unwrap();
        assert_eq!(pm.loaded_ids().len(), 2);

        pm.create_partition(Some("p3".to_string()), "p3", true, None).unwrap();
        assert_eq!(pm.loaded_ids().len(), 2);
        assert!(pm.loaded_ids().contains(&"p3".to_string()));
    }

    #[test]
    fn find_nearest_merges_across_partitions() {
        let dir = tempfile::tempdir().unwrap();
        let mut pm = manager(dir.path(), 100, 4);
        pm.create_partition(Some("p1".to_string()), "p1", true, None).unwrap();
        pm.add_vector(Some(VectorId::Int(1)), vec![0.0, 0.0], None).unwrap();
        pm.create_partition(Some("p2".to_string()), "p2", true, None).unwrap();
        pm.add_vector(Some(VectorId::Int(2)), vec![10.0, 10.0], None).unwrap();

        let opts = FindNearestOptions::default();
        let results = pm.find_nearest(&[0.0, 0.0], 2, &opts, None);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].result.id, VectorId::Int(1));
    }

    #[test]
    fn find_nearest_hnsw_falls_back_to_exact_without_graph() {
        let dir = tempfile::tempdir().unwrap();
        let mut pm = manager(dir.path(), 100, 4);
        pm.create_partition(Some("p1".to_string()), "p1", true, None).unwrap();
        pm.add_vector(Some(VectorId::Int(1)), vec![0.0, 0.0], None).unwrap();

        let opts = FindNearestOptions::default();
        let results = pm.find_nearest_hnsw(&[0.0, 0.0], 1, None, &opts, None);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].index_used, "exact");
    }

    #[test]
    fn get_partition_warms_lru_without_changing_active() {
        let dir = tempfile::tempdir().unwrap();
        let mut pm = manager(dir.path(), 100, 2);
        pm.create_partition(Some("p1".to_string()), "p1", true, None).unwrap();
        pm.create_partition(Some("p2".to_string()), "p2", true, None).unwrap();
        pm.create_partition(Some("p3".to_string()), "p3", true, None).unwrap();
        assert_eq!(pm.active_id(), Some("p3"));
        assert!(!pm.loaded_ids().contains(&"p1".to_string()));

        pm.get_partition("p1").unwrap();

        assert_eq!(pm.active_id(), Some("p3"), "get_partition must not change the write target");
        let loaded: std::collections::HashSet<String> = pm.loaded_ids().into_iter().collect();
        assert_eq!(loaded, ["p3", "p1"].into_iter().map(String::from).collect());
    }

    #[test]
    fn get_partition_rejects_unknown_id() {
        let dir = tempfile::tempdir().unwrap();
        let mut pm = manager(dir.path(), 100, 2);
        pm.create_partition(Some("p1".to_string()), "p1", true, None).unwrap();
        assert!(pm.get_partition("missing").is_err());
    }
}
