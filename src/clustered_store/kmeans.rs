//! k-means++ seeding and Lloyd iteration, used by
//! [`super::ClusteredStore::run_kmeans`] to rebuild the cluster set from
//! scratch.

use crate::distance::DistanceMetric;
use crate::id::VectorId;

use super::{Cluster, ClusteredStore};

impl ClusteredStore {
    /// Rebuilds the cluster set from every currently stored vector using
    /// k-means++ seeding followed by Lloyd iteration. `k` defaults to the
    /// current number of clusters (or `1` if none exist yet).
    ///
    /// Iteration stops after `kmeans_max_iterations` rounds or once no
    /// centroid moves more than `kmeans_tolerance` between rounds. Yields
    /// cooperatively every ten rounds so a long-running reclustering doesn't
    /// monopolize its thread.
    pub fn run_kmeans(&mut self, k: Option<usize>) {
        let entries: Vec<(VectorId, Vec<f32>)> = self
            .store()
            .iter()
            .map(|(id, record)| (id.clone(), record.vector.clone()))
            .collect();
        if entries.is_empty() {
            self.clusters.clear();
            return;
        }

        let k = k
            .unwrap_or_else(|| self.clusters.len().max(1))
            .min(entries.len())
            .max(1);

        let mut centroids = self.seed_plus_plus(&entries, k);
        let mut assignment = vec![0usize; entries.len()];

        for round in 0..self.params.kmeans_max_iterations {
            for (i, (_, vector)) in entries.iter().enumerate() {
                assignment[i] = nearest_centroid(vector, &centroids, self.params.metric);
            }

            let mut sums: Vec<Vec<f32>> = centroids.iter().map(|c| vec![0.0; c.len()]).collect();
            let mut counts = vec![0usize; centroids.len()];
            for (i, (_, vector)) in entries.iter().enumerate() {
                let c = assignment[i];
                counts[c] += 1;
                for (s, v) in sums[c].iter_mut().zip(vector.iter()) {
                    *s += v;
                }
            }

            let mut max_shift: f32 = 0.0;
            for (idx, centroid) in centroids.iter_mut().enumerate() {
                if counts[idx] == 0 {
                    let reseeded = reseed_from_largest(&entries, &assignment, &counts, &mut self.rng);
                    max_shift = max_shift.max(self.params.metric.calculate(centroid, &reseeded, 0.0));
                    *centroid = reseeded;
                    continue;
                }
                let mut shifted = false;
                for (c, s) in centroid.iter_mut().zip(sums[idx].iter()) {
                    let new_value = s / counts[idx] as f32;
                    if (new_value - *c).abs() > self.params.kmeans_tolerance {
                        shifted = true;
                    }
                    *c = new_value;
                }
                if shifted {
                    max_shift = max_shift.max(1.0);
                }
            }

            if round % 10 == 0 {
                std::thread::yield_now();
            }
            if max_shift <= self.params.kmeans_tolerance {
                break;
            }
        }

        for (i, (_, vector)) in entries.iter().enumerate() {
            assignment[i] = nearest_centroid(vector, &centroids, self.params.metric);
        }

        let mut rebuilt: Vec<Cluster> = centroids
            .into_iter()
            .enumerate()
            .map(|(i, c)| Cluster::new(i as u32, c))
            .collect();
        for (i, (id, _)) in entries.iter().enumerate() {
            rebuilt[assignment[i]].members.insert(id.clone());
        }
        rebuilt.retain(|c| !c.members.is_empty());
        for (new_id, cluster) in rebuilt.iter_mut().enumerate() {
            cluster.id = new_id as u32;
        }

        self.next_cluster_id = rebuilt.len() as u32;
        self.clusters = rebuilt;
    }

    fn seed_plus_plus(&mut self, entries: &[(VectorId, Vec<f32>)], k: usize) -> Vec<Vec<f32>> {
        let mut centroids = Vec::with_capacity(k);
        let first = self.rng.next_below(entries.len());
        centroids.push(entries[first].1.clone());

        while centroids.len() < k {
            let weights: Vec<f32> = entries
                .iter()
                .map(|(_, v)| {
                    centroids
                        .iter()
                        .map(|c| self.params.metric.calculate(v, c, 0.0))
                        .fold(f32::INFINITY, f32::min)
                        .powi(2)
                })
                .collect();
            let total: f32 = weights.iter().sum();
            if total <= 0.0 {
                let idx = self.rng.next_below(entries.len());
                centroids.push(entries[idx].1.clone());
                continue;
            }
            let target = self.rng.next_uniform() as f32 * total;
            let mut cumulative = 0.0;
            let mut chosen = entries.len() - 1;
            for (i, w) in weights.iter().enumerate() {
                cumulative += w;
                if cumulative >= target {
                    chosen = i;
                    break;
                }
            }
            centroids.push(entries[chosen].1.clone());
        }

        centroids
    }
}

fn nearest_centroid(vector: &[f32], centroids: &[Vec<f32>], metric: DistanceMetric) -> usize {
    centroids
        .iter()
        .enumerate()
        .map(|(i, c)| (i, metric.calculate(vector, c, 0.0)))
        .min_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
        .map_or(0, |(i, _)| i)
}

fn reseed_from_largest(
    entries: &[(VectorId, Vec<f32>)],
    assignment: &[usize],
    counts: &[usize],
    rng: &mut crate::rng::Xorshift64,
) -> Vec<f32> {
    let largest = counts
        .iter()
        .enumerate()
        .max_by_key(|(_, &c)| c)
        .map_or(0, |(i, _)| i);
    let members: Vec<usize> = assignment
        .iter()
        .enumerate()
        .filter(|(_, &c)| c == largest)
        .map(|(i, _)| i)
        .collect();
    if members.is_empty() {
        return entries[rng.next_below(entries.len())].1.clone();
    }
    let pick = members[rng.next_below(members.len())];
    entries[pick].1.clone()
}

#[cfg(test)]
mod tests {
    use super::super::ClusterParams;
    use super::*;
    use crate::id::VectorId;

    fn store_with(points: &[(i64, &[f32])]) -> ClusteredStore {
        let mut s = ClusteredStore::new(
            "p0",
            DistanceMetric::Euclidean,
            0.0,
            ClusterParams {
                new_cluster_distance_threshold: 0.01,
                max_clusters: 64,
                seed: 7,
                ..Default::default()
            },
        );
        for (id, v) in points {
            s.add(Some(VectorId::Int(*id as u64)), v.to_vec(), None);
        }
        s
    }

    #[test]
    fn kmeans_separates_two_distinct_blobs() {
        let mut s = store_with(&[
            (1, &[0.0, 0.0]),
            (2, &[0.1, 0.0]),
            (3, &[0.0, 0.1]),
            (4, &[10.0, 10.0]),
            (5, &[10.1, 10.0]),
            (6, &[10.0, 10.1]),
        ]);
        s.run_kmeans(Some(2));
        assert_eq!(s.clusters().len(), 2);
        let sizes: Vec<usize> = s.clusters().iter().map(|c| c.members.len()).collect();
        assert_eq!(sizes.iter().sum::<usize>(), 6);
    }

    #[test]
    fn kmeans_on_empty_store_clears_clusters() {
        let mut s = ClusteredStore::new("p0", DistanceMetric::Euclidean, 0.0, ClusterParams::default());
        s.run_kmeans(Some(3));
        assert!(s.clusters().is_empty());
    }

    #[test]
    fn kmeans_drops_clusters_left_with_no_members() {
        let mut s = store_with(&[(1, &[0.0]), (2, &[0.0]), (3, &[0.0])]);
        s.run_kmeans(Some(5));
        assert!(s.clusters().len() <= 3);
        assert!(s.clusters().iter().all(|c| !c.members.is_empty()));
    }
}
