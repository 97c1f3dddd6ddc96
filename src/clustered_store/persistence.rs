//! `cluster.json[.gz]` persistence for [`super::ClusteredStore`].

use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::Path;

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};

use crate::distance::DistanceMetric;
use crate::error::Result;
use crate::id::VectorId;

use super::{Cluster, ClusterParams, ClusteredStore};

const CLUSTER_JSON_FILE: &str = "cluster.json";
const SCHEMA_VERSION: u32 = 1;

/// Outcome of [`ClusteredStore::load`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClusterLoadResult {
    /// `cluster.json[.gz]` was present and parsed successfully.
    Loaded,
    /// No usable cluster file was found; cluster assignment was rebuilt by
    /// replaying every stored vector through the normal insertion path.
    Rebuilt,
}

#[derive(Serialize, Deserialize)]
struct ClusterEntry {
    id: u32,
    centroid: Vec<f32>,
    members: Vec<VectorId>,
}

#[derive(Serialize, Deserialize)]
struct ClusterFile {
    version: u32,
    clusters: Vec<ClusterEntry>,
}

impl ClusteredStore {
    /// Writes the underlying store (via [`crate::store::VectorStore::save`])
    /// plus `cluster.json[.gz]` into `dir`.
    ///
    /// # Errors
    ///
    /// Returns an error on any I/O failure.
    pub fn save(&self, dir: &Path, compress: bool) -> Result<()> {
        self.store().save(dir, compress)?;

        let file = ClusterFile {
            version: SCHEMA_VERSION,
            clusters: self
                .clusters
                .iter()
                .map(|c| ClusterEntry {
                    id: c.id,
                    centroid: c.centroid.clone(),
                    members: c.members.iter().cloned().collect(),
                })
                .collect(),
        };
        let json = serde_json::to_vec_pretty(&file)
            .map_err(|e| crate::error::Error::Storage(format!("failed to serialize cluster.json: {e}")))?;

        let base = dir.join(CLUSTER_JSON_FILE);
        if compress {
            let mut os_string = base.as_os_str().to_os_string();
            os_string.push(".gz");
            let out = File::create(std::path::PathBuf::from(os_string))?;
            let mut encoder = GzEncoder::new(out, Compression::default());
            encoder.write_all(&json)?;
            encoder.finish()?;
        } else {
            let mut out = File::create(&base)?;
            out.write_all(&json)?;
        }

        Ok(())
    }

    /// Loads a clustered store from `dir`. If `cluster.json[.gz]` is missing
    /// or fails to parse but the underlying vector store loads
    /// successfully, cluster assignment is rebuilt by replaying every
    /// stored vector through the normal incremental-assignment path rather
    /// than failing outright.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying vector store cannot be loaded.
    pub fn load(
        dir: &Path,
        partition_id: impl Into<String>,
        default_metric: DistanceMetric,
        gap_penalty: f32,
        params: ClusterParams,
    ) -> Result<(Self, ClusterLoadResult)> {
        let (store, _) =
            crate::store::VectorStore::load(dir, partition_id, default_metric, gap_penalty)?;

        let seed = params.seed;
        let mut clustered = Self {
            store,
            clusters: Vec::new(),
            next_cluster_id: 0,
            params,
            rng: crate::rng::Xorshift64::new(seed),
        };

        match read_cluster_file(dir) {
            Some(file) if file.version == SCHEMA_VERSION => {
                clustered.clusters = file
                    .clusters
                    .into_iter()
                    .map(|e| Cluster {
                        id: e.id,
                        centroid: e.centroid,
                        members: e.members.into_iter().collect(),
                    })
                    .collect();
                clustered.next_cluster_id =
                    clustered.clusters.iter().map(|c| c.id).max().map_or(0, |m| m + 1);
                Ok((clustered, ClusterLoadResult::Loaded))
            }
            _ => {
                let entries: Vec<(VectorId, Vec<f32>)> = clustered
                    .store()
                    .iter()
                    .map(|(id, record)| (id.clone(), record.vector.clone()))
                    .collect();
                for (id, vector) in entries {
                    clustered.assign(id, &vector);
                }
                Ok((clustered, ClusterLoadResult::Rebuilt))
            }
        }
    }
}

fn read_cluster_file(dir: &Path) -> Option<ClusterFile> {
    let base = dir.join(CLUSTER_JSON_FILE);
    if base.exists() {
        let bytes = fs::read(&base).ok()?;
        return serde_json::from_slice(&bytes).ok();
    }

    let mut os_string = base.as_os_str().to_os_string();
    os_string.push(".gz");
    let gz_path = std::path::PathBuf::from(os_string);
    let file = File::open(&gz_path).ok()?;
    let mut decoder = GzDecoder::new(file);
    let mut buf = Vec::new();
    decoder.read_to_end(&mut buf).ok()?;
    serde_json::from_slice(&buf).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::VectorId;

    fn store() -> ClusteredStore {
        let mut s = ClusteredStore::new(
            "p0",
            DistanceMetric::Euclidean,
            0.0,
            ClusterParams {
                new_cluster_distance_threshold: 0.01,
                ..Default::default()
            },
        );
        s.add(Some(VectorId::Int(1)), vec![0.0, 0.0], None);
        s.add(Some(VectorId::Int(2)), vec![9.0, 9.0], None);
        s
    }

    #[test]
    fn round_trips_cluster_assignment() {
        let dir = tempfile::tempdir().unwrap();
        let s = store();
        s.save(dir.path(), false).unwrap();

        let (loaded, result) = ClusteredStore::load(
            dir.path(),
            "p0",
            DistanceMetric::Euclidean,
            0.0,
            ClusterParams::default(),
        )
        .unwrap();
        assert_eq!(result, ClusterLoadResult::Loaded);
        assert_eq!(loaded.clusters().len(), s.clusters().len());
    }

    #[test]
    fn missing_cluster_file_rebuilds_from_vectors() {
        let dir = tempfile::tempdir().unwrap();
        let s = store();
        s.store().save(dir.path(), false).unwrap();

        let (loaded, result) = ClusteredStore::load(
            dir.path(),
            "p0",
            DistanceMetric::Euclidean,
            0.0,
            ClusterParams {
                new_cluster_distance_threshold: 0.01,
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(result, ClusterLoadResult::Rebuilt);
        assert_eq!(loaded.len(), 2);
        assert!(!loaded.clusters().is_empty());
    }
}
