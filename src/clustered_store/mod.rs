//! Cluster-pruned vector storage, built on top of [`VectorStore`].

mod kmeans;
mod persistence;

pub use persistence::ClusterLoadResult;

use rustc_hash::FxHashSet;
use std::sync::Arc;

use crate::distance::DistanceMetric;
use crate::events::EventBus;
use crate::id::VectorId;
use crate::point::{Metadata, SearchResult, VectorRecord};
use crate::rng::Xorshift64;
use crate::store::{FieldCriteria, FindNearestOptions, VectorStore};

/// A cluster centroid and its membership, as maintained incrementally by
/// [`ClusteredStore::add`] or rebuilt wholesale by
/// [`ClusteredStore::run_kmeans`].
#[derive(Debug, Clone)]
pub struct Cluster {
    /// Cluster id, stable only within one clustering generation. Reassigned
    /// sequentially whenever `run_kmeans` rebuilds the cluster set.
    pub id: u32,
    /// Running centroid, same dimension as its members.
    pub centroid: Vec<f32>,
    /// Ids of the vectors currently assigned to this cluster.
    pub members: FxHashSet<VectorId>,
}

impl Cluster {
    fn new(id: u32, centroid: Vec<f32>) -> Self {
        Self {
            id,
            centroid,
            members: FxHashSet::default(),
        }
    }
}

/// Tuning knobs for cluster assignment and re-clustering.
#[derive(Debug, Clone, Copy)]
pub struct ClusterParams {
    /// Distance metric used for centroid assignment and k-means.
    pub metric: DistanceMetric,
    /// Distance within which a new vector joins an existing cluster instead
    /// of seeding a new one.
    pub new_cluster_distance_threshold: f32,
    /// Upper bound on the number of clusters ever created.
    pub max_clusters: usize,
    /// Clusters probed by `find_nearest` (`0` = auto).
    pub probe_clusters: usize,
    /// Maximum Lloyd iterations for `run_kmeans`.
    pub kmeans_max_iterations: usize,
    /// Convergence tolerance for `run_kmeans`.
    pub kmeans_tolerance: f32,
    /// PRNG seed for k-means++ seeding and empty-cluster reseeding.
    pub seed: u64,
}

impl Default for ClusterParams {
    fn default() -> Self {
        Self {
            metric: DistanceMetric::Euclidean,
            new_cluster_distance_threshold: 0.3,
            max_clusters: 256,
            probe_clusters: 0,
            kmeans_max_iterations: 100,
            kmeans_tolerance: 1e-3,
            seed: 1,
        }
    }
}

/// `VectorStore` extended with incremental clustering for pruned linear
/// scan.
pub struct ClusteredStore {
    store: VectorStore,
    clusters: Vec<Cluster>,
    next_cluster_id: u32,
    params: ClusterParams,
    rng: Xorshift64,
}

impl ClusteredStore {
    /// Creates an empty clustered store.
    #[must_use]
    pub fn new(
        partition_id: impl Into<String>,
        default_metric: DistanceMetric,
        gap_penalty: f32,
        params: ClusterParams,
    ) -> Self {
        let seed = params.seed;
        Self {
            store: VectorStore::new(partition_id, default_metric, gap_penalty),
            clusters: Vec::new(),
            next_cluster_id: 0,
            params,
            rng: Xorshift64::new(seed),
        }
    }

    /// Attaches an event bus to the underlying store.
    pub fn set_events(&mut self, events: Arc<EventBus>) {
        self.store.set_events(events);
    }

    /// Read-only access to the underlying store, e.g. for persistence or
    /// HNSW snapshot construction.
    #[must_use]
    pub const fn store(&self) -> &VectorStore {
        &self.store
    }

    /// Current clusters.
    #[must_use]
    pub fn clusters(&self) -> &[Cluster] {
        &self.clusters
    }

    /// Number of stored vectors.
    #[must_use]
    pub fn len(&self) -> usize {
        self.store.len()
    }

    /// True if no vectors are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    /// Inserts or overwrites a vector (see [`VectorStore::add`]) and updates
    /// cluster assignment incrementally.
    pub fn add(&mut self, id: Option<VectorId>, vector: Vec<f32>, metadata: Option<Metadata>) -> VectorId {
        let id = self.store.add(id, vector.clone(), metadata);
        self.assign(id.clone(), &vector);
        id
    }

    /// Inserts a batch (see [`VectorStore::bulk_add`]), clustering each
    /// member afterward.
    pub fn bulk_add(&mut self, items: Vec<(Option<VectorId>, Vec<f32>, Option<Metadata>)>) -> usize {
        let snapshot: Vec<(VectorId, Vec<f32>)> = {
            let ids_before: std::collections::HashSet<VectorId> =
                self.store.iter().map(|(id, _)| id.clone()).collect();
            let count = self.store.bulk_add(items);
            let new_entries: Vec<(VectorId, Vec<f32>)> = self
                .store
                .iter()
                .filter(|(id, _)| !ids_before.contains(id))
                .map(|(id, r)| (id.clone(), r.vector.clone()))
                .collect();
            debug_assert!(new_entries.len() <= count || count == 0);
            new_entries
        };
        for (id, vector) in &snapshot {
            self.assign(id.clone(), vector);
        }
        snapshot.len()
    }

    fn assign(&mut self, id: VectorId, vector: &[f32]) {
        if let Some((idx, dist)) = self.nearest_cluster(vector) {
            if dist <= self.params.new_cluster_distance_threshold {
                self.add_member(idx, id, vector);
                return;
            }
        }

        if self.clusters.len() < self.params.max_clusters || self.clusters.is_empty() {
            self.create_cluster(id, vector);
        } else if let Some((idx, _)) = self.nearest_cluster(vector) {
            self.add_member(idx, id, vector);
        }
    }

    fn nearest_cluster(&self, vector: &[f32]) -> Option<(usize, f32)> {
        self.clusters
            .iter()
            .enumerate()
            .map(|(i, c)| (i, self.params.metric.calculate(vector, &c.centroid, 0.0)))
            .min_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
    }

    fn add_member(&mut self, idx: usize, id: VectorId, vector: &[f32]) {
        let cluster = &mut self.clusters[idx];
        cluster.members.insert(id);
        let n = cluster.members.len() as f32;
        for (c, v) in cluster.centroid.iter_mut().zip(vector.iter()) {
            *c += (v - *c) / n;
        }
    }

    fn create_cluster(&mut self, id: VectorId, vector: &[f32]) {
        let cluster_id = self.next_cluster_id;
        self.next_cluster_id += 1;
        let mut cluster = Cluster::new(cluster_id, vector.to_vec());
        cluster.members.insert(id);
        self.clusters.push(cluster);
    }

    /// Removes `id` from the store and from whichever cluster holds it. The
    /// centroid is not recomputed on delete; `run_kmeans` is the mechanism
    /// for reclaiming accuracy after heavy deletion.
    pub fn delete(&mut self, id: &VectorId) -> bool {
        let removed = self.store.delete(id);
        if removed {
            for cluster in &mut self.clusters {
                cluster.members.remove(id);
            }
        }
        removed
    }

    /// Forwards to [`VectorStore::get`].
    #[must_use]
    pub fn get(&self, id: &VectorId) -> Option<&VectorRecord> {
        self.store.get(id)
    }

    /// Forwards to [`VectorStore::has`].
    #[must_use]
    pub fn has(&self, id: &VectorId) -> bool {
        self.store.has(id)
    }

    /// Forwards to [`VectorStore::update_vector`]. Does not re-cluster: the
    /// vector keeps its existing cluster membership until the next
    /// `run_kmeans`.
    pub fn update_vector(&mut self, id: &VectorId, vector: Vec<f32>) -> bool {
        self.store.update_vector(id, vector)
    }

    /// Forwards to [`VectorStore::get_metadata`].
    #[must_use]
    pub fn get_metadata(&self, id: &VectorId) -> Option<Metadata> {
        self.store.get_metadata(id)
    }

    /// Forwards to [`VectorStore::set_metadata`].
    pub fn set_metadata(&mut self, id: &VectorId, metadata: Metadata) -> bool {
        self.store.set_metadata(id, metadata)
    }

    /// Forwards to [`VectorStore::update_metadata`].
    pub fn update_metadata(&mut self, id: &VectorId, patch: impl FnOnce(&mut Metadata)) -> bool {
        self.store.update_metadata(id, patch)
    }

    /// Forwards to [`VectorStore::get_metadata_with_field`].
    #[must_use]
    pub fn get_metadata_with_field(
        &self,
        criteria: &FieldCriteria,
        values: Option<&[serde_json::Value]>,
        limit: Option<usize>,
    ) -> Vec<(VectorId, Metadata)> {
        self.store.get_metadata_with_field(criteria, values, limit)
    }

    /// Cluster-pruned nearest-neighbor search: ranks clusters by centroid
    /// distance to `query`, probes the closest `p` (`p` chosen so at least
    /// `k` candidates are expected unless `probe_clusters` overrides it),
    /// then linear-scans only the probed clusters' members. Falls back to a
    /// full scan when no clusters exist yet.
    #[must_use]
    pub fn find_nearest(&self, query: &[f32], k: usize, opts: &FindNearestOptions<'_>) -> Vec<SearchResult> {
        if self.clusters.is_empty() {
            return self.store.find_nearest(query, k, opts);
        }

        let probe = self.probe_count(k);
        let mut ranked: Vec<(usize, f32)> = self
            .clusters
            .iter()
            .enumerate()
            .map(|(i, c)| (i, self.params.metric.calculate(query, &c.centroid, 0.0)))
            .collect();
        ranked.sort_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

        let candidate_ids: FxHashSet<VectorId> = ranked
            .into_iter()
            .take(probe)
            .flat_map(|(i, _)| self.clusters[i].members.iter().cloned())
            .collect();

        let metric = opts.metric.unwrap_or(self.store.default_metric());
        let gap_penalty = if opts.metric.is_some() {
            opts.gap_penalty
        } else {
            self.store.default_gap_penalty()
        };

        let mut scored: Vec<(usize, SearchResult)> = self
            .store
            .iter()
            .enumerate()
            .filter(|(_, (id, _))| candidate_ids.contains(*id))
            .filter(|(_, (_, record))| {
                opts.filter
                    .as_ref()
                    .is_none_or(|f| f.matches(&record.id, record.metadata.as_ref()))
            })
            .filter(|(_, (_, record))| metric != DistanceMetric::Cosine || record.vector.len() == query.len())
            .map(|(idx, (_, record))| {
                let distance = metric.calculate(query, &record.vector, gap_penalty);
                (idx, SearchResult::new(record.id.clone(), distance))
            })
            .collect();

        scored.sort_by(|(ia, a), (ib, b)| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(ia.cmp(ib))
        });
        scored.truncate(k);
        scored.into_iter().map(|(_, r)| r).collect()
    }

    fn probe_count(&self, k: usize) -> usize {
        if self.params.probe_clusters > 0 {
            return self.params.probe_clusters.min(self.clusters.len());
        }
        let total_members: usize = self.clusters.iter().map(|c| c.members.len()).sum();
        if total_members == 0 {
            return self.clusters.len();
        }
        let avg = total_members as f32 / self.clusters.len() as f32;
        let estimated = (k as f32 / avg.max(1.0)).ceil() as usize;
        estimated.max(1).min(self.clusters.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> ClusteredStore {
        ClusteredStore::new(
            "p0",
            DistanceMetric::Euclidean,
            0.0,
            ClusterParams {
                new_cluster_distance_threshold: 2.0,
                max_clusters: 4,
                ..Default::default()
            },
        )
    }

    #[test]
    fn nearby_vectors_join_the_same_cluster() {
        let mut s = store();
        s.add(Some(VectorId::Int(1)), vec![0.0, 0.0], None);
        s.add(Some(VectorId::Int(2)), vec![0.5, 0.0], None);
        assert_eq!(s.clusters().len(), 1);
        assert_eq!(s.clusters()[0].members.len(), 2);
    }

    #[test]
    fn distant_vector_seeds_a_new_cluster() {
        let mut s = store();
        s.add(Some(VectorId::Int(1)), vec![0.0, 0.0], None);
        s.add(Some(VectorId::Int(2)), vec![100.0, 100.0], None);
        assert_eq!(s.clusters().len(), 2);
    }

    #[test]
    fn centroid_tracks_incremental_mean() {
        let mut s = store();
        s.add(Some(VectorId::Int(1)), vec![0.0], None);
        s.add(Some(VectorId::Int(2)), vec![2.0], None);
        assert_eq!(s.clusters().len(), 1);
        assert!((s.clusters()[0].centroid[0] - 1.0).abs() < 1e-5);
    }

    #[test]
    fn find_nearest_falls_back_to_full_scan_with_no_clusters() {
        let s = store();
        let opts = FindNearestOptions::default();
        assert!(s.find_nearest(&[0.0, 0.0], 5, &opts).is_empty());
    }

    #[test]
    fn pruned_search_still_finds_true_nearest_within_its_cluster() {
        let mut s = store();
        s.add(Some(VectorId::Int(1)), vec![0.0, 0.0], None);
        s.add(Some(VectorId::Int(2)), vec![0.1, 0.0], None);
        s.add(Some(VectorId::Int(3)), vec![50.0, 50.0], None);
        let opts = FindNearestOptions::default();
        let results = s.find_nearest(&[0.0, 0.0], 1, &opts);
        assert_eq!(results[0].id, VectorId::Int(1));
    }

    #[test]
    fn delete_removes_from_cluster_membership() {
        let mut s = store();
        let id = s.add(Some(VectorId::Int(1)), vec![0.0], None);
        assert!(s.delete(&id));
        assert!(s.clusters().iter().all(|c| !c.members.contains(&id)));
    }
}
