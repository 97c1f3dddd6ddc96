//! Publish-only event bus.
//!
//! Every mutating or lifecycle operation in the crate publishes an [`Event`]
//! on a shared [`EventBus`]. Subscribers get their own bounded receiver; a
//! full channel drops the oldest pending event rather than blocking the
//! publisher, since publishing must never stall a search or write path.

use crossbeam_channel::{Receiver, Sender, TrySendError};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::id::VectorId;

/// A single published event, tagged by topic.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "topic", rename_all = "camelCase")]
pub enum Event {
    /// A single vector was added or overwritten.
    VectorAdd {
        /// Partition the vector was written to.
        partition_id: String,
        /// The vector's id.
        id: VectorId,
    },
    /// A batch of vectors was added.
    VectorsBulkAdd {
        /// Partition the vectors were written to.
        partition_id: String,
        /// Number of vectors in the batch.
        count: usize,
    },
    /// A vector was deleted.
    VectorDelete {
        /// Partition the vector was removed from.
        partition_id: String,
        /// The removed vector's id.
        id: VectorId,
    },
    /// A vector's metadata was replaced or merged.
    MetadataUpdate {
        /// Partition holding the vector.
        partition_id: String,
        /// The updated vector's id.
        id: VectorId,
    },
    /// A new partition was registered.
    PartitionCreated {
        /// The new partition's id.
        partition_id: String,
    },
    /// A partition was loaded into memory.
    PartitionLoaded {
        /// The loaded partition's id.
        partition_id: String,
    },
    /// A partition was evicted from the loaded set.
    PartitionEvicted {
        /// The evicted partition's id.
        partition_id: String,
    },
    /// HNSW build progress for a partition.
    PartitionIndexProgress {
        /// The partition being indexed.
        partition_id: String,
        /// Nodes inserted so far.
        inserted: usize,
        /// Total nodes to insert.
        total: usize,
    },
    /// HNSW build completed for a partition.
    PartitionIndexed {
        /// The indexed partition's id.
        partition_id: String,
    },
    /// A partition-scoped operation failed.
    PartitionError {
        /// The partition the error occurred in.
        partition_id: String,
        /// Human-readable description of the failure.
        message: String,
    },
    /// A write landed in a partition already at or above capacity.
    PartitionOverflow {
        /// The overflowing partition's id.
        partition_id: String,
        /// Vector count at the time of overflow.
        vector_count: usize,
        /// Configured capacity.
        capacity: usize,
    },
    /// The database persisted some or all of its state.
    DbSave,
    /// The database loaded state from disk.
    DbLoad,
    /// The database released all in-memory state.
    DbClose,
}

/// Bounded, multi-subscriber, publish-only event channel.
pub struct EventBus {
    capacity: usize,
    subscribers: Mutex<Vec<Sender<Event>>>,
}

impl EventBus {
    /// Creates a new bus. Each subscriber's channel holds up to `capacity`
    /// pending events before the oldest is dropped.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            subscribers: Mutex::new(Vec::new()),
        }
    }

    /// Registers a new subscriber, returning its receiver.
    pub fn subscribe(&self) -> Receiver<Event> {
        let (tx, rx) = crossbeam_channel::bounded(self.capacity);
        self.subscribers.lock().push(tx);
        rx
    }

    /// Publishes an event to every current subscriber.
    ///
    /// If a subscriber's channel is full, the oldest queued event for that
    /// subscriber is dropped to make room rather than blocking the caller.
    /// Subscribers whose receiver has been dropped are pruned as a side
    /// effect.
    pub fn publish(&self, event: Event) {
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|tx| {
            let mut pending = event.clone();
            loop {
                match tx.try_send(pending) {
                    Ok(()) => return true,
                    Err(TrySendError::Full(back)) => {
                        // Drop the oldest queued event for this subscriber and retry.
                        let _ = tx.try_recv();
                        pending = back;
                    }
                    Err(TrySendError::Disconnected(_)) => return false,
                }
            }
        });
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscriber_receives_published_events() {
        let bus = EventBus::new(8);
        let rx = bus.subscribe();
        bus.publish(Event::DbSave);
        assert!(matches!(rx.try_recv().unwrap(), Event::DbSave));
    }

    #[test]
    fn full_channel_drops_oldest_instead_of_blocking() {
        let bus = EventBus::new(2);
        let rx = bus.subscribe();
        bus.publish(Event::PartitionCreated {
            partition_id: "p1".into(),
        });
        bus.publish(Event::PartitionCreated {
            partition_id: "p2".into(),
        });
        bus.publish(Event::PartitionCreated {
            partition_id: "p3".into(),
        });

        let mut seen = Vec::new();
        while let Ok(ev) = rx.try_recv() {
            if let Event::PartitionCreated { partition_id } = ev {
                seen.push(partition_id);
            }
        }
        assert_eq!(seen.len(), 2);
        assert_eq!(seen.last().map(String::as_str), Some("p3"));
    }

    #[test]
    fn multiple_subscribers_each_get_a_copy() {
        let bus = EventBus::new(4);
        let rx1 = bus.subscribe();
        let rx2 = bus.subscribe();
        bus.publish(Event::DbClose);
        assert!(rx1.try_recv().is_ok());
        assert!(rx2.try_recv().is_ok());
    }
}
