//! Multi-layer proximity graph (HNSW) built over a snapshot of a
//! [`crate::clustered_store::ClusteredStore`].
//!
//! The graph stores only ids and per-layer adjacency; vector data is never
//! duplicated into the index and is resolved against the owning store on
//! every distance computation, both at build time and at query time.

mod persistence;

pub use persistence::HnswLoadResult;

use std::collections::BinaryHeap;
use std::collections::HashSet;

use indexmap::IndexMap;

use crate::clustered_store::ClusteredStore;
use crate::distance::DistanceMetric;
use crate::filter::FilterPredicate;
use crate::id::VectorId;
use crate::point::SearchResult;
use crate::rng::Xorshift64;

/// Tuning knobs for [`HnswIndex`].
#[derive(Debug, Clone, Copy)]
pub struct HnswParams {
    /// Target out-degree per node at upper layers.
    pub m: usize,
    /// Dynamic candidate-list size while inserting.
    pub ef_construction: usize,
    /// Dynamic candidate-list size at query time, used when a search does
    /// not override it explicitly.
    pub ef_search: usize,
    /// Distance metric the graph is built and queried with.
    pub metric: DistanceMetric,
    /// PRNG seed for reproducible layer assignment.
    pub seed: u64,
}

impl HnswParams {
    /// `1 / ln(M)`, the layer-assignment normalizer. `M` is clamped to at
    /// least 2 so the logarithm stays finite and positive.
    fn ml(&self) -> f64 {
        1.0 / (self.m.max(2) as f64).ln()
    }

    /// `M_max(l)`: out-degree cap for layer `l` (`2M` at layer 0, `M`
    /// elsewhere).
    fn m_max(&self, layer: usize) -> usize {
        if layer == 0 {
            self.m * 2
        } else {
            self.m
        }
    }
}

impl Default for HnswParams {
    fn default() -> Self {
        Self {
            m: 16,
            ef_construction: 200,
            ef_search: 100,
            metric: DistanceMetric::Euclidean,
            seed: 1,
        }
    }
}

/// Lifecycle of an [`HnswIndex`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HnswState {
    /// No graph built yet; queries fall back to exact scan.
    Empty,
    /// A build is in progress. Never observed after `build` returns — a
    /// failed build leaves the index in `Empty`.
    Building,
    /// Graph reflects the store contents it was built from.
    Ready,
    /// Graph is queryable but the store has been mutated since the last
    /// build; results carry `stale: true`.
    Stale,
}

#[derive(Debug, Clone)]
struct Node {
    level: usize,
    /// `neighbors[l]` holds the adjacency list at layer `l`, for `l` in
    /// `0..=level`.
    neighbors: Vec<Vec<VectorId>>,
}

/// Approximate k-NN index over a fixed-at-build-time id set.
pub struct HnswIndex {
    params: HnswParams,
    state: HnswState,
    entry_point: Option<VectorId>,
    top_level: usize,
    nodes: IndexMap<VectorId, Node>,
    rng: Xorshift64,
}

#[derive(Clone)]
struct ScoredId {
    id: VectorId,
    distance: f32,
}

#[derive(Clone)]
struct MinEntry(f32, VectorId);
impl PartialEq for MinEntry {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}
impl Eq for MinEntry {}
impl PartialOrd for MinEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for MinEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // Reversed so a BinaryHeap (max-heap) behaves as a min-heap on distance.
        other.0.partial_cmp(&self.0).unwrap_or(std::cmp::Ordering::Equal)
    }
}

#[derive(Clone)]
struct MaxEntry(f32, VectorId);
impl PartialEq for MaxEntry {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}
impl Eq for MaxEntry {}
impl PartialOrd for MaxEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for MaxEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.partial_cmp(&other.0).unwrap_or(std::cmp::Ordering::Equal)
    }
}

impl HnswIndex {
    /// Creates an empty, unbuilt index.
    pub fn new(params: HnswParams) -> Self {
        let seed = params.seed;
        Self {
            params,
            state: HnswState::Empty,
            entry_point: None,
            top_level: 0,
            nodes: IndexMap::new(),
            rng: Xorshift64::new(seed),
        }
    }

    pub const fn state(&self) -> HnswState {
        self.state
    }

    pub const fn params(&self) -> &HnswParams {
        &self.params
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub const fn entry_point(&self) -> Option<&VectorId> {
        self.entry_point.as_ref()
    }

    pub const fn top_level(&self) -> usize {
        self.top_level
    }

    /// Marks a `Ready` index `Stale` after the backing store changed.
    /// No-op on an index that is already `Empty` or `Stale`.
    pub fn mark_stale(&mut self) {
        if self.state == HnswState::Ready {
            self.state = HnswState::Stale;
        }
    }

    /// Builds the graph from every vector currently in `store`, replacing
    /// any existing graph. Leaves the index `Empty` if the store has no
    /// vectors; never exposes a partially built graph.
    pub fn build(&mut self, store: &ClusteredStore) {
        self.build_with_progress(store, |_, _| {});
    }

    /// Same as [`Self::build`], calling `on_progress(inserted, total)` after
    /// each node is linked into the graph.
    pub fn build_with_progress(&mut self, store: &ClusteredStore, mut on_progress: impl FnMut(usize, usize)) {
        self.state = HnswState::Building;
        self.nodes.clear();
        self.entry_point = None;
        self.top_level = 0;
        self.rng = Xorshift64::new(self.params.seed);

        let ids: Vec<VectorId> = store.store().iter().map(|(id, _)| id.clone()).collect();
        if ids.is_empty() {
            self.state = HnswState::Empty;
            return;
        }

        let total = ids.len();
        for (inserted, id) in ids.into_iter().enumerate() {
            self.insert(store, &id);
            on_progress(inserted + 1, total);
        }
        self.state = HnswState::Ready;
    }

    fn sample_level(&mut self) -> usize {
        let u = self.rng.next_uniform().max(f64::MIN_POSITIVE);
        (-u.ln() * self.params.ml()).floor() as usize
    }

    fn vector_of<'s>(&self, store: &'s ClusteredStore, id: &VectorId) -> Option<&'s [f32]> {
        store.get(id).map(|r| r.vector.as_slice())
    }

    fn distance(&self, store: &ClusteredStore, query: &[f32], id: &VectorId) -> f32 {
        self.vector_of(store, id)
            .map(|v| self.params.metric.calculate(query, v, 0.0))
            .unwrap_or(f32::INFINITY)
    }

    fn insert(&mut self, store: &ClusteredStore, id: &VectorId) {
        let Some(vector) = self.vector_of(store, id).map(<[f32]>::to_vec) else {
            return;
        };
        let level = self.sample_level();

        let Some(entry_id) = self.entry_point.clone() else {
            self.nodes.insert(
                id.clone(),
                Node {
                    level,
                    neighbors: vec![Vec::new(); level + 1],
                },
            );
            self.entry_point = Some(id.clone());
            self.top_level = level;
            return;
        };

        let mut current = entry_id;
        for layer in (level + 1..=self.top_level).rev() {
            current = self.greedy_closest(store, &vector, current, layer);
        }

        self.nodes.insert(
            id.clone(),
            Node {
                level,
                neighbors: vec![Vec::new(); level + 1],
            },
        );

        let mut entry_points = vec![current];
        for layer in (0..=level.min(self.top_level)).rev() {
            let candidates = self.search_layer(store, &vector, &entry_points, self.params.ef_construction, layer);
            let selected = self.select_neighbors(store, id, &vector, candidates.clone(), self.params.m_max(layer));

            self.set_neighbors(id, layer, selected.clone());
            for neighbor in &selected {
                self.link(neighbor, id, layer);
                self.prune_if_overfull(store, neighbor, layer);
            }

            entry_points = candidates.into_iter().map(|c| c.id).collect();
            if entry_points.is_empty() {
                entry_points = vec![id.clone()];
            }
        }

        if level > self.top_level {
            self.top_level = level;
            self.entry_point = Some(id.clone());
        }
    }

    fn set_neighbors(&mut self, id: &VectorId, layer: usize, list: Vec<VectorId>) {
        if let Some(node) = self.nodes.get_mut(id) {
            node.neighbors[layer] = list;
        }
    }

    fn link(&mut self, from: &VectorId, to: &VectorId, layer: usize) {
        if let Some(node) = self.nodes.get_mut(from) {
            if layer < node.neighbors.len() && !node.neighbors[layer].contains(to) {
                node.neighbors[layer].push(to.clone());
            }
        }
    }

    fn prune_if_overfull(&mut self, store: &ClusteredStore, id: &VectorId, layer: usize) {
        let cap = self.params.m_max(layer);
        let Some(node) = self.nodes.get(id) else { return };
        if node.neighbors[layer].len() <= cap {
            return;
        }
        let Some(vector) = self.vector_of(store, id).map(<[f32]>::to_vec) else {
            return;
        };
        let candidates: Vec<ScoredId> = node.neighbors[layer]
            .iter()
            .map(|n| ScoredId {
                id: n.clone(),
                distance: self.distance(store, &vector, n),
            })
            .collect();
        let pruned = self.select_neighbors(store, id, &vector, candidates, cap);
        self.set_neighbors(id, layer, pruned);
    }

    /// Follows the single steepest-descent neighbor at `layer` until no
    /// neighbor improves on `current`.
    fn greedy_closest(&self, store: &ClusteredStore, query: &[f32], start: VectorId, layer: usize) -> VectorId {
        let mut current = start;
        let mut current_dist = self.distance(store, query, &current);
        loop {
            let mut improved = false;
            if let Some(node) = self.nodes.get(&current) {
                if layer < node.neighbors.len() {
                    for neighbor in &node.neighbors[layer] {
                        let d = self.distance(store, query, neighbor);
                        if d < current_dist {
                            current_dist = d;
                            current = neighbor.clone();
                            improved = true;
                        }
                    }
                }
            }
            if !improved {
                return current;
            }
        }
    }

    /// Bounded best-first search at `layer`, returning up to `ef` nearest
    /// candidates to `query`.
    fn search_layer(&self, store: &ClusteredStore, query: &[f32], entry_points: &[VectorId], ef: usize, layer: usize) -> Vec<ScoredId> {
        let mut visited: HashSet<VectorId> = entry_points.iter().cloned().collect();
        let mut candidates: BinaryHeap<MinEntry> = BinaryHeap::new();
        let mut results: BinaryHeap<MaxEntry> = BinaryHeap::new();

        for ep in entry_points {
            let d = self.distance(store, query, ep);
            candidates.push(MinEntry(d, ep.clone()));
            results.push(MaxEntry(d, ep.clone()));
        }

        while let Some(MinEntry(cand_dist, cand_id)) = candidates.pop() {
            let worst = results.peek().map(|MaxEntry(d, _)| *d).unwrap_or(f32::INFINITY);
            if cand_dist > worst && results.len() >= ef {
                break;
            }
            if let Some(node) = self.nodes.get(&cand_id) {
                if layer < node.neighbors.len() {
                    for neighbor in node.neighbors[layer].clone() {
                        if visited.contains(&neighbor) {
                            continue;
                        }
                        visited.insert(neighbor.clone());
                        let d = self.distance(store, query, &neighbor);
                        let worst = results.peek().map(|MaxEntry(wd, _)| *wd).unwrap_or(f32::INFINITY);
                        if results.len() < ef || d < worst {
                            candidates.push(MinEntry(d, neighbor.clone()));
                            results.push(MaxEntry(d, neighbor));
                            if results.len() > ef {
                                results.pop();
                            }
                        }
                    }
                }
            }
        }

        let mut out: Vec<ScoredId> = results.into_iter().map(|MaxEntry(d, id)| ScoredId { id, distance: d }).collect();
        out.sort_by(|a, b| a.distance.partial_cmp(&b.distance).unwrap_or(std::cmp::Ordering::Equal));
        out
    }

    /// Diversity-preserving neighbor selection: walks candidates nearest to
    /// `target` first, keeping a candidate only if it is closer to `target`
    /// than to every neighbor already selected.
    fn select_neighbors(
        &self,
        store: &ClusteredStore,
        target_id: &VectorId,
        target: &[f32],
        mut candidates: Vec<ScoredId>,
        cap: usize,
    ) -> Vec<VectorId> {
        candidates.retain(|c| &c.id != target_id);
        candidates.sort_by(|a, b| a.distance.partial_cmp(&b.distance).unwrap_or(std::cmp::Ordering::Equal));

        let mut selected: Vec<VectorId> = Vec::with_capacity(cap.min(candidates.len()));
        for candidate in candidates {
            if selected.len() >= cap {
                break;
            }
            let diverse = match self.vector_of(store, &candidate.id) {
                Some(cv) => selected.iter().all(|s| match self.vector_of(store, s) {
                    Some(sv) => candidate.distance < self.params.metric.calculate(cv, sv, 0.0),
                    None => true,
                }),
                None => true,
            };
            if diverse || selected.is_empty() {
                selected.push(candidate.id);
            }
        }
        selected
    }

    /// Runs the query algorithm: greedy descent through the upper layers,
    /// then bounded best-first search at layer 0. `filter`, when given, is
    /// applied post-pop — filtered-out nodes still expand their neighbors
    /// so the graph stays connected for subsequent hops. Returns the k
    /// nearest plus whether the graph is stale relative to `store`.
    pub fn search(
        &self,
        store: &ClusteredStore,
        query: &[f32],
        k: usize,
        ef: Option<usize>,
        filter: Option<&FilterPredicate<'_>>,
    ) -> (Vec<SearchResult>, bool) {
        let stale = self.state == HnswState::Stale;
        let Some(entry) = self.entry_point.clone() else {
            return (Vec::new(), stale);
        };

        let mut current = entry;
        for layer in (1..=self.top_level).rev() {
            current = self.greedy_closest(store, query, current, layer);
        }

        let ef = ef.unwrap_or(self.params.ef_search).max(k);
        let candidates = self.search_layer(store, query, &[current], ef, 0);

        let results: Vec<SearchResult> = candidates
            .into_iter()
            .filter(|c| match filter {
                Some(f) => {
                    let metadata = store.get(&c.id).and_then(|r| r.metadata.as_ref());
                    f.matches(&c.id, metadata)
                }
                None => true,
            })
            .take(k)
            .map(|c| SearchResult {
                id: c.id,
                distance: c.distance,
            })
            .collect();

        (results, stale)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distance::DistanceMetric;

    fn built_store(points: &[(u64, [f32; 2])]) -> ClusteredStore {
        let mut s = ClusteredStore::new(
            "p0",
            DistanceMetric::Euclidean,
            0.0,
            crate::clustered_store::ClusterParams::default(),
        );
        for (id, v) in points {
            s.add(Some(VectorId::Int(*id)), v.to_vec(), None);
        }
        s
    }

    #[test]
    fn empty_store_leaves_index_empty() {
        let store = ClusteredStore::new("p0", DistanceMetric::Euclidean, 0.0, crate::clustered_store::ClusterParams::default());
        let mut index = HnswIndex::new(HnswParams::default());
        index.build(&store);
        assert_eq!(index.state(), HnswState::Empty);
        let (results, stale) = index.search(&store, &[0.0, 0.0], 5, None, None);
        assert!(results.is_empty());
        assert!(!stale);
    }

    #[test]
    fn finds_nearest_points() {
        let store = built_store(&[(1, [0.0, 0.0]), (2, [0.1, 0.1]), (3, [10.0, 10.0]), (4, [10.1, 10.1])]);
        let mut index = HnswIndex::new(HnswParams {
            m: 4,
            ef_construction: 32,
            ef_search: 16,
            metric: DistanceMetric::Euclidean,
            seed: 7,
        });
        index.build(&store);
        assert_eq!(index.state(), HnswState::Ready);

        let (results, stale) = index.search(&store, &[0.0, 0.0], 2, None, None);
        assert!(!stale);
        let ids: Vec<u64> = results.iter().map(|r| r.id.as_int().unwrap()).collect();
        assert!(ids.contains(&1));
    }

    #[test]
    fn mark_stale_flags_subsequent_queries() {
        let store = built_store(&[(1, [0.0, 0.0]), (2, [1.0, 1.0])]);
        let mut index = HnswIndex::new(HnswParams::default());
        index.build(&store);
        index.mark_stale();
        assert_eq!(index.state(), HnswState::Stale);
        let (_, stale) = index.search(&store, &[0.0, 0.0], 1, None, None);
        assert!(stale);
    }

    #[test]
    fn larger_graph_recalls_true_nearest_neighbor() {
        let points: Vec<(u64, [f32; 2])> = (0..200)
            .map(|i| {
                let angle = i as f32 * 0.31;
                (i, [angle.cos() * 5.0, angle.sin() * 5.0])
            })
            .collect();
        let store = built_store(&points);
        let mut index = HnswIndex::new(HnswParams {
            m: 8,
            ef_construction: 64,
            ef_search: 48,
            metric: DistanceMetric::Euclidean,
            seed: 42,
        });
        index.build(&store);

        let query = [5.0, 0.0];
        let (results, _) = index.search(&store, &query, 1, None, None);
        assert_eq!(results.len(), 1);
        assert!(results[0].distance < 1.0);
    }
}
