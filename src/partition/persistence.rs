//! `partitions.json` persistence: the ordered list of partition configs,
//! written atomically (write-to-temp-then-rename) so a crash mid-save
//! never leaves a half-written config file.

use std::path::Path;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

const PARTITIONS_JSON_FILE: &str = "partitions.json";

/// One partition's registered configuration, as persisted in
/// `partitions.json`. Distinct from the in-memory [`super::LoadedPartition`],
/// which exists only while the partition is in the LRU.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartitionConfigEntry {
    /// Stable partition id.
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// Unix timestamp (seconds) the partition was created.
    pub created_at: u64,
    /// Last known vector count (refreshed on every write).
    pub vector_count: usize,
    /// Vectors this partition accepts before `auto_create_partitions`
    /// spills writes into a new one.
    pub capacity: usize,
    /// Whether this is the partition currently receiving writes.
    pub active: bool,
}

#[derive(Serialize, Deserialize)]
struct PartitionsFile {
    version: u32,
    partitions: Vec<PartitionConfigEntry>,
}

const SCHEMA_VERSION: u32 = 1;

pub fn load_configs(dir: &Path) -> Result<IndexMap<String, PartitionConfigEntry>> {
    let path = dir.join(PARTITIONS_JSON_FILE);
    if !path.exists() {
        return Ok(IndexMap::new());
    }
    let bytes = std::fs::read(&path)?;
    let file: PartitionsFile = serde_json::from_slice(&bytes).map_err(|e| Error::Corruption {
        partition: String::new(),
        reason: format!("partitions.json: {e}"),
    })?;
    if file.version != SCHEMA_VERSION {
        return Err(Error::Corruption {
            partition: String::new(),
            reason: format!("partitions.json: unsupported version {}", file.version),
        });
    }
    Ok(file.partitions.into_iter().map(|p| (p.id.clone(), p)).collect())
}

pub fn save_configs<'a>(dir: &Path, entries: impl Iterator<Item = &'a PartitionConfigEntry>) -> Result<()> {
    let file = PartitionsFile {
        version: SCHEMA_VERSION,
        partitions: entries.cloned().collect(),
    };
    let json = serde_json::to_vec_pretty(&file).map_err(|e| Error::Storage(format!("failed to serialize partitions.json: {e}")))?;

    let final_path = dir.join(PARTITIONS_JSON_FILE);
    let tmp_path = dir.join(format!("{PARTITIONS_JSON_FILE}.tmp"));
    std::fs::write(&tmp_path, &json)?;
    std::fs::rename(&tmp_path, &final_path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: &str, active: bool) -> PartitionConfigEntry {
        PartitionConfigEntry {
            id: id.to_string(),
            name: id.to_string(),
            created_at: 0,
            vector_count: 0,
            capacity: 100,
            active,
        }
    }

    #[test]
    fn round_trips_configs() {
        let dir = tempfile::tempdir().unwrap();
        let entries = vec![entry("p1", false), entry("p2", true)];
        save_configs(dir.path(), entries.iter()).unwrap();

        let loaded = load_configs(dir.path()).unwrap();
        assert_eq!(loaded.len(), 2);
        assert!(loaded.get("p2").unwrap().active);
    }

    #[test]
    fn missing_file_yields_empty_map() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = load_configs(dir.path()).unwrap();
        assert!(loaded.is_empty());
    }
}
