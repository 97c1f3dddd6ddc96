//! Approximate nearest-neighbor indexing.

pub mod hnsw;

pub use hnsw::{HnswIndex, HnswParams, HnswState};
