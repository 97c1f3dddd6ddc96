//! Error types for `annex-core`.
//!
//! A single unified error type for every fallible core operation. Each
//! variant carries a stable `ANNEX-NNN` code so operators can grep logs
//! without depending on `Debug` formatting of the variant name.

use thiserror::Error;

/// Result type alias for `annex-core` operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in `annex-core` operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Partition already exists (ANNEX-001).
    #[error("[ANNEX-001] Partition '{0}' already exists")]
    PartitionExists(String),

    /// Partition not found (ANNEX-002).
    #[error("[ANNEX-002] Partition '{0}' not found")]
    PartitionNotFound(String),

    /// Storage error (ANNEX-003).
    #[error("[ANNEX-003] Storage error: {0}")]
    Storage(String),

    /// Index error (ANNEX-004).
    #[error("[ANNEX-004] Index error: {0}")]
    Index(String),

    /// On-disk data is corrupted and the partition could not be loaded (ANNEX-005).
    #[error("[ANNEX-005] Corruption detected in partition '{partition}': {reason}")]
    Corruption {
        /// Partition the corruption was detected in.
        partition: String,
        /// Human-readable description of the corruption.
        reason: String,
    },

    /// Configuration error (ANNEX-006).
    #[error("[ANNEX-006] Configuration error: {0}")]
    Config(String),

    /// IO error (ANNEX-007).
    #[error("[ANNEX-007] IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed input rejected synchronously at the API boundary (ANNEX-008).
    #[error("[ANNEX-008] Bad request: {0}")]
    BadRequest(String),

    /// A search call exceeded its deadline (ANNEX-009).
    #[error("[ANNEX-009] Search timed out after {0}ms")]
    Timeout(u64),

    /// Every consulted partition failed during fan-out (ANNEX-010).
    #[error("[ANNEX-010] All partitions failed during search: {0}")]
    AllPartitionsFailed(String),

    /// Internal invariant violation (ANNEX-011).
    #[error("[ANNEX-011] Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Returns the stable error code (e.g. `"ANNEX-001"`).
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::PartitionExists(_) => "ANNEX-001",
            Self::PartitionNotFound(_) => "ANNEX-002",
            Self::Storage(_) => "ANNEX-003",
            Self::Index(_) => "ANNEX-004",
            Self::Corruption { .. } => "ANNEX-005",
            Self::Config(_) => "ANNEX-006",
            Self::Io(_) => "ANNEX-007",
            Self::BadRequest(_) => "ANNEX-008",
            Self::Timeout(_) => "ANNEX-009",
            Self::AllPartitionsFailed(_) => "ANNEX-010",
            Self::Internal(_) => "ANNEX-011",
        }
    }

    /// Returns true if retrying the operation might succeed.
    ///
    /// Corruption and internal errors are not recoverable; everything else
    /// (timeouts, IO hiccups, overload) may succeed on a later attempt.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        !matches!(self, Self::Corruption { .. } | Self::Internal(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        assert_eq!(Error::PartitionExists("p".into()).code(), "ANNEX-001");
        assert_eq!(Error::Timeout(100).code(), "ANNEX-009");
    }

    #[test]
    fn corruption_is_not_recoverable() {
        let err = Error::Corruption {
            partition: "p1".into(),
            reason: "bad offset".into(),
        };
        assert!(!err.is_recoverable());
        assert!(Error::Timeout(50).is_recoverable());
    }
}
