//! Exact-scan vector storage: the base `VectorStore` contract.
//!
//! [`ClusteredStore`](crate::clustered_store::ClusteredStore) extends this
//! with cluster-pruned search; [`HnswIndex`](crate::index::hnsw::HnswIndex)
//! is built from a snapshot of one and never stores vectors itself.

mod persistence;

pub use persistence::{StoreLoadResult, VEC_BIN_FILE, META_JSON_FILE};

use std::collections::HashMap;
use std::sync::Arc;

use indexmap::IndexMap;
use serde_json::Value;

use crate::distance::DistanceMetric;
use crate::events::{Event, EventBus};
use crate::filter::FilterPredicate;
use crate::id::VectorId;
use crate::point::{Metadata, SearchResult, VectorRecord};

/// How `get_metadata_with_field` selects which records to return.
#[derive(Debug, Clone)]
pub enum FieldCriteria {
    /// A single required field name.
    Field(String),
    /// Several required field names.
    Fields(Vec<String>),
    /// A mapping of field name to the expected value for that field.
    FieldValues(HashMap<String, Value>),
}

/// Options accepted by [`VectorStore::find_nearest`].
#[derive(Default)]
pub struct FindNearestOptions<'a> {
    /// Predicate evaluated before distance computation.
    pub filter: Option<FilterPredicate<'a>>,
    /// Distance metric to apply.
    pub metric: Option<DistanceMetric>,
    /// Per-unit-gap penalty for mismatched-length `Euclidean`/`SquaredEuclidean`.
    pub gap_penalty: f32,
}

/// Exact linear-scan vector store.
///
/// Inserting never enforces dimension consistency: dimensions are tracked
/// (implicitly, via each stored vector's length) but never validated
/// against a schema.
pub struct VectorStore {
    partition_id: String,
    default_metric: DistanceMetric,
    default_gap_penalty: f32,
    default_dimension: Option<usize>,
    id_counter: u64,
    vectors: IndexMap<VectorId, VectorRecord>,
    events: Option<Arc<EventBus>>,
}

impl VectorStore {
    /// Creates an empty store for the named partition.
    #[must_use]
    pub fn new(partition_id: impl Into<String>, default_metric: DistanceMetric, gap_penalty: f32) -> Self {
        Self {
            partition_id: partition_id.into(),
            default_metric,
            default_gap_penalty: gap_penalty,
            default_dimension: None,
            id_counter: 0,
            vectors: IndexMap::new(),
            events: None,
        }
    }

    /// Attaches an event bus; subsequent mutations publish notifications.
    pub fn set_events(&mut self, events: Arc<EventBus>) {
        self.events = Some(events);
    }

    /// Number of stored vectors.
    #[must_use]
    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    /// True if the store holds no vectors.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    /// The dimension adopted as default when the store was first populated.
    #[must_use]
    pub const fn default_dimension(&self) -> Option<usize> {
        self.default_dimension
    }

    /// Iterates over every stored record in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&VectorId, &VectorRecord)> {
        self.vectors.iter()
    }

    /// The metric used when a call to `find_nearest` does not override one.
    #[must_use]
    pub const fn default_metric(&self) -> DistanceMetric {
        self.default_metric
    }

    /// The gap penalty used when a call to `find_nearest` does not override
    /// the metric.
    #[must_use]
    pub const fn default_gap_penalty(&self) -> f32 {
        self.default_gap_penalty
    }

    /// The partition this store belongs to.
    #[must_use]
    pub fn partition_id(&self) -> &str {
        &self.partition_id
    }

    fn publish(&self, event: Event) {
        if let Some(bus) = &self.events {
            bus.publish(event);
        }
    }

    fn next_id(&mut self) -> VectorId {
        let id = self.id_counter;
        self.id_counter += 1;
        VectorId::Int(id)
    }

    fn reserve_int_id(&mut self, id: u64) {
        if id >= self.id_counter {
            self.id_counter = id + 1;
        }
    }

    /// Inserts or overwrites a vector. If `id` is absent, allocates the next
    /// integer id. If an explicit integer id is `>=` the current counter,
    /// the counter advances past it. If the store was empty and no default
    /// dimension exists yet, `vector.len()` becomes the default. Emits a
    /// `vector:add` notification.
    pub fn add(&mut self, id: Option<VectorId>, vector: Vec<f32>, metadata: Option<Metadata>) -> VectorId {
        if self.default_dimension.is_none() && self.vectors.is_empty() {
            self.default_dimension = Some(vector.len());
        }

        let id = match id {
            Some(VectorId::Int(n)) => {
                self.reserve_int_id(n);
                VectorId::Int(n)
            }
            Some(other) => other,
            None => self.next_id(),
        };

        self.vectors
            .insert(id.clone(), VectorRecord::new(id.clone(), vector, metadata));

        self.publish(Event::VectorAdd {
            partition_id: self.partition_id.clone(),
            id: id.clone(),
        });

        id
    }

    /// Inserts a batch of `(id?, vector, metadata?)` tuples with `add`
    /// semantics per element, emitting a single aggregate notification.
    pub fn bulk_add(&mut self, items: Vec<(Option<VectorId>, Vec<f32>, Option<Metadata>)>) -> usize {
        let count = items.len();
        for (id, vector, metadata) in items {
            if self.default_dimension.is_none() && self.vectors.is_empty() {
                self.default_dimension = Some(vector.len());
            }
            let id = match id {
                Some(VectorId::Int(n)) => {
                    self.reserve_int_id(n);
                    VectorId::Int(n)
                }
                Some(other) => other,
                None => self.next_id(),
            };
            self.vectors
                .insert(id.clone(), VectorRecord::new(id, vector, metadata));
        }

        self.publish(Event::VectorsBulkAdd {
            partition_id: self.partition_id.clone(),
            count,
        });

        count
    }

    /// Returns the record for `id`, if present.
    #[must_use]
    pub fn get(&self, id: &VectorId) -> Option<&VectorRecord> {
        self.vectors.get(id)
    }

    /// Returns true if `id` is stored.
    #[must_use]
    pub fn has(&self, id: &VectorId) -> bool {
        self.vectors.contains_key(id)
    }

    /// Removes `id`, returning true if it was present.
    pub fn delete(&mut self, id: &VectorId) -> bool {
        let removed = self.vectors.shift_remove(id).is_some();
        if removed {
            self.publish(Event::VectorDelete {
                partition_id: self.partition_id.clone(),
                id: id.clone(),
            });
        }
        removed
    }

    /// Replaces the vector for `id`, keeping its metadata untouched. Returns
    /// false if `id` is not present.
    pub fn update_vector(&mut self, id: &VectorId, vector: Vec<f32>) -> bool {
        match self.vectors.get_mut(id) {
            Some(record) => {
                record.vector = vector;
                true
            }
            None => false,
        }
    }

    /// Returns a clone of `id`'s metadata, if present.
    #[must_use]
    pub fn get_metadata(&self, id: &VectorId) -> Option<Metadata> {
        self.vectors.get(id).and_then(|r| r.metadata.clone())
    }

    /// Replaces `id`'s metadata outright. Returns false if `id` is not
    /// present.
    pub fn set_metadata(&mut self, id: &VectorId, metadata: Metadata) -> bool {
        let updated = match self.vectors.get_mut(id) {
            Some(record) => {
                record.metadata = Some(metadata);
                true
            }
            None => false,
        };
        if updated {
            self.publish(Event::MetadataUpdate {
                partition_id: self.partition_id.clone(),
                id: id.clone(),
            });
        }
        updated
    }

    /// Applies `patch` to `id`'s existing metadata (creating an empty map
    /// if none exists yet). Returns false if `id` is not present.
    pub fn update_metadata(&mut self, id: &VectorId, patch: impl FnOnce(&mut Metadata)) -> bool {
        let updated = match self.vectors.get_mut(id) {
            Some(record) => {
                let metadata = record.metadata.get_or_insert_with(Metadata::new);
                patch(metadata);
                true
            }
            None => false,
        };
        if updated {
            self.publish(Event::MetadataUpdate {
                partition_id: self.partition_id.clone(),
                id: id.clone(),
            });
        }
        updated
    }

    /// Exact linear-scan nearest-neighbor search.
    ///
    /// The filter (when present) is evaluated before distance computation so
    /// non-matching candidates never pay for a distance calculation. Results
    /// are sorted ascending by distance and truncated to `k`; ties keep
    /// insertion order.
    #[must_use]
    pub fn find_nearest(&self, query: &[f32], k: usize, opts: &FindNearestOptions<'_>) -> Vec<SearchResult> {
        let metric = opts.metric.unwrap_or(self.default_metric);
        let gap_penalty = if opts.metric.is_some() {
            opts.gap_penalty
        } else {
            self.default_gap_penalty
        };

        let mut scored: Vec<(usize, SearchResult)> = self
            .vectors
            .values()
            .enumerate()
            .filter(|(_, record)| {
                opts.filter
                    .as_ref()
                    .is_none_or(|f| f.matches(&record.id, record.metadata.as_ref()))
            })
            .filter(|(_, record)| metric != DistanceMetric::Cosine || record.vector.len() == query.len())
            .map(|(idx, record)| {
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

    /// Scans stored metadata for entries matching `criteria`, optionally
    /// limited to `limit` results.
    #[must_use]
    pub fn get_metadata_with_field(
        &self,
        criteria: &FieldCriteria,
        values: Option<&[Value]>,
        limit: Option<usize>,
    ) -> Vec<(VectorId, Metadata)> {
        let checks: Vec<(String, Option<Value>)> = match criteria {
            FieldCriteria::Field(name) => {
                vec![(name.clone(), values.and_then(|v| v.first().cloned()))]
            }
            FieldCriteria::Fields(names) => names
                .iter()
                .enumerate()
                .map(|(i, name)| (name.clone(), values.and_then(|v| v.get(i).cloned())))
                .collect(),
            FieldCriteria::FieldValues(map) => {
                map.iter().map(|(k, v)| (k.clone(), Some(v.clone()))).collect()
            }
        };

        let mut out = Vec::new();
        for record in self.vectors.values() {
            let Some(metadata) = &record.metadata else {
                continue;
            };
            let matches = checks.iter().all(|(field, expected)| match metadata.get(field) {
                Some(actual) => expected.as_ref().is_none_or(|exp| actual == exp),
                None => false,
            });
            if matches {
                out.push((record.id.clone(), metadata.clone()));
                if limit.is_some_and(|l| out.len() >= l) {
                    break;
                }
            }
        }
        out
    }
}
