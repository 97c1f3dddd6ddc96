//! Per-partition pairwise relationships and their connected components.
//!
//! Both operations run only within one partition's `VectorStore` — no
//! cross-partition pairs are ever considered.

use crate::distance::DistanceMetric;
use crate::id::VectorId;
use crate::store::VectorStore;

/// An undirected edge between two vectors within `threshold` distance of
/// each other, emitted with `i < j` (by iteration order) on the caller
/// side.
#[derive(Debug, Clone)]
pub struct Relationship {
    pub partition_id: String,
    pub a: VectorId,
    pub b: VectorId,
    pub distance: f32,
}

/// A connected component within one partition's relationship graph.
#[derive(Debug, Clone)]
pub struct Community {
    pub partition_id: String,
    pub members: Vec<VectorId>,
}

pub fn extract_relationships(partition_id: &str, store: &VectorStore, threshold: f32, metric: DistanceMetric) -> Vec<Relationship> {
    let entries: Vec<(&VectorId, &[f32])> = store.iter().map(|(id, record)| (id, record.vector.as_slice())).collect();
    let mut out = Vec::new();
    for i in 0..entries.len() {
        for j in (i + 1)..entries.len() {
            let (id_a, vec_a) = entries[i];
            let (id_b, vec_b) = entries[j];
            let distance = metric.calculate(vec_a, vec_b, 0.0);
            if distance <= threshold {
                out.push(Relationship {
                    partition_id: partition_id.to_string(),
                    a: id_a.clone(),
                    b: id_b.clone(),
                    distance,
                });
            }
        }
    }
    out
}

struct UnionFind {
    parent: Vec<usize>,
}

impl UnionFind {
    fn new(n: usize) -> Self {
        Self { parent: (0..n).collect() }
    }

    fn find(&mut self, x: usize) -> usize {
        if self.parent[x] != x {
            self.parent[x] = self.find(self.parent[x]);
        }
        self.parent[x]
    }

    fn union(&mut self, a: usize, b: usize) {
        let ra = self.find(a);
        let rb = self.find(b);
        if ra != rb {
            self.parent[ra] = rb;
        }
    }
}

pub fn extract_communities(partition_id: &str, store: &VectorStore, threshold: f32, metric: DistanceMetric) -> Vec<Community> {
    let ids: Vec<VectorId> = store.iter().map(|(id, _)| id.clone()).collect();
    let edges = extract_relationships(partition_id, store, threshold, metric);

    let index_of: std::collections::HashMap<&VectorId, usize> = ids.iter().enumerate().map(|(i, id)| (id, i)).collect();
    let mut uf = UnionFind::new(ids.len());
    for edge in &edges {
        if let (Some(&i), Some(&j)) = (index_of.get(&edge.a), index_of.get(&edge.b)) {
            uf.union(i, j);
        }
    }

    let mut groups: std::collections::HashMap<usize, Vec<VectorId>> = std::collections::HashMap::new();
    for (i, id) in ids.iter().enumerate() {
        let root = uf.find(i);
        groups.entry(root).or_default().push(id.clone());
    }

    groups
        .into_values()
        .map(|members| Community {
            partition_id: partition_id.to_string(),
            members,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with(points: &[(u64, [f32; 2])]) -> VectorStore {
        let mut s = VectorStore::new("p0", DistanceMetric::Euclidean, 0.0);
        for (id, v) in points {
            s.add(Some(VectorId::Int(*id)), v.to_vec(), None);
        }
        s
    }

    #[test]
    fn emits_edges_within_threshold() {
        let store = store_with(&[(1, [0.0, 0.0]), (2, [0.1, 0.1]), (3, [10.0, 10.0])]);
        let edges = extract_relationships("p0", &store, 1.0, DistanceMetric::Euclidean);
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].a, VectorId::Int(1));
        assert_eq!(edges[0].b, VectorId::Int(2));
    }

    #[test]
    fn communities_group_connected_vectors() {
        let store = store_with(&[(1, [0.0, 0.0]), (2, [0.1, 0.1]), (3, [10.0, 10.0]), (4, [10.1, 10.1])]);
        let communities = extract_communities("p0", &store, 1.0, DistanceMetric::Euclidean);
        assert_eq!(communities.len(), 2);
        assert!(communities.iter().all(|c| c.members.len() == 2));
    }
}
