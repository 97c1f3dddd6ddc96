//! `hnsw.bin[.gz]` persistence for [`super::HnswIndex`].
//!
//! The format is a small self-describing binary rather than JSON: graphs
//! can have tens of thousands of neighbor-list entries and the id tagging
//! needs a byte-level encoding anyway, so there is little to gain from
//! going through `serde_json` here the way the other partition files do.

use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;

use crate::distance::DistanceMetric;
use crate::error::{Error, Result};
use crate::id::VectorId;

use super::{HnswIndex, HnswParams, HnswState, Node};

const HNSW_BIN_FILE: &str = "hnsw.bin";
const MAGIC: &[u8; 4] = b"HNSW";
const FORMAT_VERSION: u16 = 1;

const TAG_INT: u8 = 0;
const TAG_STR: u8 = 1;

fn metric_tag(metric: DistanceMetric) -> u8 {
    match metric {
        DistanceMetric::Euclidean => 0,
        DistanceMetric::SquaredEuclidean => 1,
        DistanceMetric::Cosine => 2,
        DistanceMetric::Manhattan => 3,
        DistanceMetric::Chebyshev => 4,
        DistanceMetric::InnerProduct => 5,
        DistanceMetric::Hamming => 6,
    }
}

fn metric_from_tag(tag: u8) -> Result<DistanceMetric> {
    match tag {
        0 => Ok(DistanceMetric::Euclidean),
        1 => Ok(DistanceMetric::SquaredEuclidean),
        2 => Ok(DistanceMetric::Cosine),
        3 => Ok(DistanceMetric::Manhattan),
        4 => Ok(DistanceMetric::Chebyshev),
        5 => Ok(DistanceMetric::InnerProduct),
        6 => Ok(DistanceMetric::Hamming),
        other => Err(Error::Corruption {
            partition: String::new(),
            reason: format!("hnsw.bin: unknown metric tag {other}"),
        }),
    }
}

fn write_id(buf: &mut Vec<u8>, id: &VectorId) {
    match id {
        VectorId::Int(n) => {
            buf.push(TAG_INT);
            buf.extend_from_slice(&n.to_le_bytes());
        }
        VectorId::Str(s) => {
            buf.push(TAG_STR);
            let bytes = s.as_bytes();
            buf.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
            buf.extend_from_slice(bytes);
        }
    }
}

fn read_id(buf: &[u8], pos: &mut usize, partition: &str) -> Result<VectorId> {
    let corrupt = |reason: &str| Error::Corruption {
        partition: partition.to_string(),
        reason: format!("hnsw.bin: {reason}"),
    };
    let tag = *buf.get(*pos).ok_or_else(|| corrupt("truncated id tag"))?;
    *pos += 1;
    match tag {
        TAG_INT => {
            let bytes: [u8; 8] = buf
                .get(*pos..*pos + 8)
                .ok_or_else(|| corrupt("truncated int id"))?
                .try_into()
                .map_err(|_| corrupt("truncated int id"))?;
            *pos += 8;
            Ok(VectorId::Int(u64::from_le_bytes(bytes)))
        }
        TAG_STR => {
            let len_bytes: [u8; 4] = buf
                .get(*pos..*pos + 4)
                .ok_or_else(|| corrupt("truncated string id length"))?
                .try_into()
                .map_err(|_| corrupt("truncated string id length"))?;
            *pos += 4;
            let len = u32::from_le_bytes(len_bytes) as usize;
            let bytes = buf.get(*pos..*pos + len).ok_or_else(|| corrupt("truncated string id bytes"))?;
            *pos += len;
            let s = std::str::from_utf8(bytes).map_err(|_| corrupt("string id is not valid utf-8"))?;
            Ok(VectorId::Str(s.to_string()))
        }
        other => Err(corrupt(&format!("unknown id tag {other}"))),
    }
}

/// Outcome of [`HnswIndex::load`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HnswLoadResult {
    /// `hnsw.bin[.gz]` was present and parsed successfully; the index is
    /// `Ready`.
    Loaded,
    /// No usable index file was found; the returned index is `Empty` and
    /// the caller should rebuild via [`HnswIndex::build`] if it wants one.
    Absent,
}

impl HnswIndex {
    /// Serializes the graph to `hnsw.bin[.gz]` in `dir`. A no-op on an
    /// `Empty` index beyond removing any stale file left from a previous
    /// build.
    pub fn save(&self, dir: &Path, compress: bool) -> Result<()> {
        let base = dir.join(HNSW_BIN_FILE);
        if self.state == HnswState::Empty {
            let _ = std::fs::remove_file(&base);
            let mut gz = base.as_os_str().to_os_string();
            gz.push(".gz");
            let _ = std::fs::remove_file(std::path::PathBuf::from(gz));
            return Ok(());
        }

        let mut buf = Vec::new();
        buf.extend_from_slice(MAGIC);
        buf.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
        buf.extend_from_slice(&(self.params.m as u16).to_le_bytes());
        buf.extend_from_slice(&(self.params.ef_construction as u32).to_le_bytes());
        buf.push(metric_tag(self.params.metric));

        match &self.entry_point {
            Some(id) => write_id(&mut buf, id),
            None => {
                buf.push(TAG_INT);
                buf.extend_from_slice(&0u64.to_le_bytes());
            }
        };
        buf.push(self.top_level as u8);
        buf.extend_from_slice(&(self.nodes.len() as u32).to_le_bytes());

        for (id, node) in &self.nodes {
            write_id(&mut buf, id);
            buf.push(node.level as u8);
            for layer in &node.neighbors {
                buf.extend_from_slice(&(layer.len() as u16).to_le_bytes());
                for neighbor in layer {
                    write_id(&mut buf, neighbor);
                }
            }
        }

        if compress {
            let mut gz = base.as_os_str().to_os_string();
            gz.push(".gz");
            let out = File::create(std::path::PathBuf::from(gz))?;
            let mut encoder = GzEncoder::new(out, Compression::default());
            encoder.write_all(&buf)?;
            encoder.finish()?;
        } else {
            let mut out = File::create(&base)?;
            out.write_all(&buf)?;
        }
        Ok(())
    }

    /// Loads a graph from `hnsw.bin[.gz]` in `dir`, falling back to
    /// [`HnswLoadResult::Absent`] (an `Empty` index) if no file is present.
    /// A present-but-corrupt file is an error, distinct from "absent".
    pub fn load(dir: &Path, partition_id: &str, seed: u64) -> Result<(Self, HnswLoadResult)> {
        let base = dir.join(HNSW_BIN_FILE);
        let bytes = if base.exists() {
            std::fs::read(&base)?
        } else {
            let mut gz = base.as_os_str().to_os_string();
            gz.push(".gz");
            let gz_path = std::path::PathBuf::from(gz);
            if !gz_path.exists() {
                return Ok((Self::new(HnswParams { seed, ..HnswParams::default() }), HnswLoadResult::Absent));
            }
            let file = File::open(&gz_path)?;
            let mut decoder = GzDecoder::new(file);
            let mut out = Vec::new();
            decoder.read_to_end(&mut out)?;
            out
        };

        let corrupt = |reason: &str| Error::Corruption {
            partition: partition_id.to_string(),
            reason: format!("hnsw.bin: {reason}"),
        };

        if bytes.len() < 4 || &bytes[0..4] != MAGIC {
            return Err(corrupt("bad magic"));
        }
        let mut pos = 4usize;
        let version = read_u16(&bytes, &mut pos).ok_or_else(|| corrupt("truncated version"))?;
        if version != FORMAT_VERSION {
            return Err(corrupt(&format!("unsupported version {version}")));
        }
        let m = read_u16(&bytes, &mut pos).ok_or_else(|| corrupt("truncated M"))? as usize;
        let ef_construction = read_u32(&bytes, &mut pos).ok_or_else(|| corrupt("truncated efConstruction"))? as usize;
        let metric_byte = *bytes.get(pos).ok_or_else(|| corrupt("truncated metric tag"))?;
        pos += 1;
        let metric = metric_from_tag(metric_byte)?;
        let entry_point = read_id(&bytes, &mut pos, partition_id)?;
        let top_level = *bytes.get(pos).ok_or_else(|| corrupt("truncated top level"))? as usize;
        pos += 1;
        let node_count = read_u32(&bytes, &mut pos).ok_or_else(|| corrupt("truncated node count"))?;

        let mut nodes = indexmap::IndexMap::new();
        for _ in 0..node_count {
            let id = read_id(&bytes, &mut pos, partition_id)?;
            let level = *bytes.get(pos).ok_or_else(|| corrupt("truncated node level"))? as usize;
            pos += 1;
            let mut neighbors = Vec::with_capacity(level + 1);
            for _ in 0..=level {
                let count = read_u16(&bytes, &mut pos).ok_or_else(|| corrupt("truncated neighbor count"))?;
                let mut layer = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    layer.push(read_id(&bytes, &mut pos, partition_id)?);
                }
                neighbors.push(layer);
            }
            nodes.insert(id, Node { level, neighbors });
        }

        let index = Self {
            params: HnswParams {
                m,
                ef_construction,
                ef_search: HnswParams::default().ef_search,
                metric,
                seed,
            },
            state: HnswState::Ready,
            entry_point: Some(entry_point),
            top_level,
            nodes,
            rng: crate::rng::Xorshift64::new(seed),
        };
        Ok((index, HnswLoadResult::Loaded))
    }
}

fn read_u16(buf: &[u8], pos: &mut usize) -> Option<u16> {
    let bytes: [u8; 2] = buf.get(*pos..*pos + 2)?.try_into().ok()?;
    *pos += 2;
    Some(u16::from_le_bytes(bytes))
}

fn read_u32(buf: &[u8], pos: &mut usize) -> Option<u32> {
    let bytes: [u8; 4] = buf.get(*pos..*pos + 4)?.try_into().ok()?;
    *pos += 4;
    Some(u32::from_le_bytes(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clustered_store::ClusteredStore;
    use crate::distance::DistanceMetric as Metric;

    fn built(points: &[(u64, [f32; 2])]) -> (ClusteredStore, HnswIndex) {
        let mut store = ClusteredStore::new("p0", Metric::Euclidean, 0.0, crate::clustered_store::ClusterParams::default());
        for (id, v) in points {
            store.add(Some(VectorId::Int(*id)), v.to_vec(), None);
        }
        let mut index = HnswIndex::new(HnswParams {
            m: 4,
            ef_construction: 32,
            ef_search: 16,
            metric: Metric::Euclidean,
            seed: 3,
        });
        index.build(&store);
        (store, index)
    }

    #[test]
    fn round_trips_graph_structure() {
        let dir = tempfile::tempdir().unwrap();
        let (store, index) = built(&[(1, [0.0, 0.0]), (2, [1.0, 1.0]), (3, [2.0, 2.0]), (4, [3.0, 3.0])]);
        index.save(dir.path(), false).unwrap();

        let (loaded, result) = HnswIndex::load(dir.path(), "p0", 3).unwrap();
        assert_eq!(result, HnswLoadResult::Loaded);
        assert_eq!(loaded.state(), HnswState::Ready);
        assert_eq!(loaded.len(), index.len());
        assert_eq!(loaded.top_level(), index.top_level());

        let (before, _) = index.search(&store, &[0.0, 0.0], 2, None, None);
        let (after, _) = loaded.search(&store, &[0.0, 0.0], 2, None, None);
        let before_ids: Vec<_> = before.iter().map(|r| r.id.clone()).collect();
        let after_ids: Vec<_> = after.iter().map(|r| r.id.clone()).collect();
        assert_eq!(before_ids, after_ids);
    }

    #[test]
    fn missing_file_reports_absent() {
        let dir = tempfile::tempdir().unwrap();
        let (_, result) = HnswIndex::load(dir.path(), "p0", 1).unwrap();
        assert_eq!(result, HnswLoadResult::Absent);
    }

    #[test]
    fn bad_magic_is_corruption() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("hnsw.bin"), b"NOPE").unwrap();
        let err = HnswIndex::load(dir.path(), "p0", 1).unwrap_err();
        assert_eq!(err.code(), "ANNEX-005");
    }

    #[test]
    fn string_ids_round_trip() {
        let mut store = ClusteredStore::new("p0", Metric::Euclidean, 0.0, crate::clustered_store::ClusterParams::default());
        store.add(Some(VectorId::from("alpha")), vec![0.0, 0.0], None);
        store.add(Some(VectorId::from("beta")), vec![1.0, 1.0], None);
        let mut index = HnswIndex::new(HnswParams::default());
        index.build(&store);

        let dir = tempfile::tempdir().unwrap();
        index.save(dir.path(), true).unwrap();
        let (loaded, _) = HnswIndex::load(dir.path(), "p0", index.params().seed).unwrap();
        let (results, _) = loaded.search(&store, &[0.0, 0.0], 1, None, None);
        assert_eq!(results[0].id.as_str(), Some("alpha"));
    }
}
