//! `meta.json[.gz]` + `vec.bin[.gz]` persistence for [`super::VectorStore`].

use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::Path;

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::distance::DistanceMetric;
use crate::error::{Error, Result};
use crate::id::VectorId;
use crate::point::VectorRecord;

use super::VectorStore;

/// Base filename for the metadata/index file (before an optional `.gz`).
pub const META_JSON_FILE: &str = "meta.json";
/// Base filename for the packed vector blob (before an optional `.gz`).
pub const VEC_BIN_FILE: &str = "vec.bin";

const SCHEMA_VERSION: u32 = 1;

/// Outcome of a successful [`VectorStore::load`], for callers that want to
/// know whether the on-disk compression matched what was requested.
#[derive(Debug, Clone, Copy)]
pub struct StoreLoadResult {
    /// Whether the files on disk were gzip-compressed.
    pub was_compressed: bool,
}

#[derive(Serialize, Deserialize)]
struct VectorEntry {
    id: VectorId,
    offset: u64,
    length: u64,
    dim: u64,
}

#[derive(Serialize, Deserialize)]
struct MetaFile {
    version: u32,
    #[serde(rename = "defaultVectorSize")]
    default_vector_size: Option<usize>,
    #[serde(rename = "idCounter")]
    id_counter: u64,
    vectors: Vec<VectorEntry>,
    metadata: Map<String, Value>,
}

impl VectorStore {
    /// Writes `meta.json[.gz]` and `vec.bin[.gz]` into `dir`, creating it if
    /// necessary.
    ///
    /// # Errors
    ///
    /// Returns an error on any I/O failure.
    pub fn save(&self, dir: &Path, compress: bool) -> Result<()> {
        fs::create_dir_all(dir)?;

        let mut offset: u64 = 0;
        let mut entries = Vec::with_capacity(self.vectors.len());
        let mut vector_bytes = Vec::new();
        let mut metadata = Map::new();

        for (id, record) in &self.vectors {
            let dim = record.vector.len() as u64;
            let length = dim * 4;
            entries.push(VectorEntry {
                id: id.clone(),
                offset,
                length,
                dim,
            });
            for component in &record.vector {
                vector_bytes.extend_from_slice(&component.to_le_bytes());
            }
            offset += length;

            if let Some(md) = &record.metadata {
                metadata.insert(id.to_string(), Value::Object(md.clone()));
            }
        }

        let meta = MetaFile {
            version: SCHEMA_VERSION,
            default_vector_size: self.default_dimension,
            id_counter: self.id_counter,
            vectors: entries,
            metadata,
        };
        let meta_json = serde_json::to_vec_pretty(&meta)
            .map_err(|e| Error::Storage(format!("failed to serialize meta.json: {e}")))?;

        write_blob(&dir.join(META_JSON_FILE), &meta_json, compress)?;
        write_blob(&dir.join(VEC_BIN_FILE), &vector_bytes, compress)?;

        Ok(())
    }

    /// Loads a store from `dir`, transparently handling gzip-compressed
    /// files. Corruption (unknown schema version, a `vec.bin` length that
    /// disagrees with the declared offsets, or a vector slice shorter than
    /// `dim * 4` bytes) is reported as [`Error::Corruption`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::Corruption`] on malformed on-disk data, or
    /// [`Error::Io`] if the files cannot be read.
    pub fn load(
        dir: &Path,
        partition_id: impl Into<String>,
        default_metric: DistanceMetric,
        gap_penalty: f32,
    ) -> Result<(Self, StoreLoadResult)> {
        let partition_id = partition_id.into();
        let (meta_bytes, meta_compressed) = read_blob(&dir.join(META_JSON_FILE))?;
        let (vec_bytes, _) = read_blob(&dir.join(VEC_BIN_FILE))?;

        let meta: MetaFile = serde_json::from_slice(&meta_bytes).map_err(|e| Error::Corruption {
            partition: partition_id.clone(),
            reason: format!("malformed meta.json: {e}"),
        })?;

        if meta.version != SCHEMA_VERSION {
            return Err(Error::Corruption {
                partition: partition_id,
                reason: format!("unknown meta.version {}", meta.version),
            });
        }

        let declared_total: u64 = meta.vectors.iter().map(|e| e.length).sum();
        if declared_total != vec_bytes.len() as u64 {
            return Err(Error::Corruption {
                partition: partition_id,
                reason: format!(
                    "vec.bin length {} does not match declared total {}",
                    vec_bytes.len(),
                    declared_total
                ),
            });
        }

        let mut vectors = IndexMap::with_capacity(meta.vectors.len());
        for entry in &meta.vectors {
            let start = entry.offset as usize;
            let end = start + entry.length as usize;
            if end > vec_bytes.len() {
                return Err(Error::Corruption {
                    partition: partition_id,
                    reason: format!("vector {} offset/length out of bounds", entry.id),
                });
            }
            let slice = &vec_bytes[start..end];
            if slice.len() < entry.dim as usize * 4 {
                return Err(Error::Corruption {
                    partition: partition_id,
                    reason: format!("vector {} shorter than its declared dimension", entry.id),
                });
            }

            let vector = slice
                .chunks_exact(4)
                .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                .collect::<Vec<f32>>();

            let record_metadata = meta
                .metadata
                .get(&entry.id.to_string())
                .and_then(Value::as_object)
                .cloned();

            vectors.insert(
                entry.id.clone(),
                VectorRecord::new(entry.id.clone(), vector, record_metadata),
            );
        }

        let store = Self {
            partition_id,
            default_metric,
            default_gap_penalty: gap_penalty,
            default_dimension: meta.default_vector_size,
            id_counter: meta.id_counter,
            vectors,
            events: None,
        };

        Ok((
            store,
            StoreLoadResult {
                was_compressed: meta_compressed,
            },
        ))
    }
}

fn write_blob(base_path: &Path, data: &[u8], compress: bool) -> Result<()> {
    if compress {
        let path = append_gz(base_path);
        let file = File::create(path)?;
        let mut encoder = GzEncoder::new(file, Compression::default());
        encoder.write_all(data)?;
        encoder.finish()?;
    } else {
        let mut file = File::create(base_path)?;
        file.write_all(data)?;
    }
    Ok(())
}

fn read_blob(base_path: &Path) -> Result<(Vec<u8>, bool)> {
    if base_path.exists() {
        let mut file = File::open(base_path)?;
        let mut buf = Vec::new();
        file.read_to_end(&mut buf)?;
        return Ok((buf, false));
    }

    let gz_path = append_gz(base_path);
    let file = File::open(&gz_path)?;
    let mut decoder = GzDecoder::new(file);
    let mut buf = Vec::new();
    decoder.read_to_end(&mut buf)?;
    Ok((buf, true))
}

fn append_gz(base_path: &Path) -> std::path::PathBuf {
    let mut os_string = base_path.as_os_str().to_os_string();
    os_string.push(".gz");
    std::path::PathBuf::from(os_string)
}
