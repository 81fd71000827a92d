//! Error type shared by every Flow-Join crate.
//!
//! Errors fall into two families:
//! - configuration errors, raised by constructors and `validate()` before any
//!   key stream is touched;
//! - input errors, raised when partition data is missing or inconsistent. A run
//!   that hits one fails as a whole; no phase proceeds with a partial relation.
//!
//! Estimation error of the Space-Saving sketch is *not* represented here. It is
//! a bounded property of the histogram, reported alongside every count.

use thiserror::Error;

/// Primary error type for Flow-Join operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FlowJoinError {
    // === Configuration ===
    /// Space-Saving capacity `k` must be positive.
    #[error("invalid histogram capacity {capacity}: must be > 0")]
    InvalidCapacity { capacity: usize },

    /// Partition count `P` must be positive.
    #[error("invalid partition count {partitions}: must be > 0")]
    InvalidPartitionCount { partitions: usize },

    /// Skew threshold outside its valid domain.
    #[error("invalid skew threshold {threshold}: {reason}")]
    InvalidThreshold {
        threshold: String,
        reason: &'static str,
    },

    /// Sample stride must be positive.
    #[error("invalid sample stride {stride}: must be > 0")]
    InvalidSampleStride { stride: usize },

    /// Counter backend selector not recognized.
    #[error("unknown counter backend '{name}' (expected hash_only, heap or sorted_array)")]
    UnknownBackend { name: String },

    // === Input availability ===
    /// A partition id in `[0, P)` has no data at all.
    #[error("{side} relation is missing partition {partition}")]
    MissingPartition {
        side: &'static str,
        partition: usize,
    },

    /// The same partition id was supplied twice.
    #[error("{side} relation supplied partition {partition} more than once")]
    DuplicatePartition {
        side: &'static str,
        partition: usize,
    },

    /// Relation does not have the configured number of partitions.
    #[error("{side} relation has {actual} partitions, expected {expected}")]
    PartitionCountMismatch {
        side: &'static str,
        expected: usize,
        actual: usize,
    },

    /// A tuple sits in a partition other than `key mod P`.
    #[error("{side} partition {partition} holds key {key}, which belongs to partition {expected}")]
    MisplacedTuple {
        side: &'static str,
        partition: usize,
        key: i64,
        expected: usize,
    },

    /// A loaded partition's id disagrees with its position in the relation.
    #[error("partition at position {position} is labelled {partition}")]
    PartitionOutOfPlace { position: usize, partition: usize },

    // === Detection barrier ===
    /// Heavy keys were requested before every histogram was folded in.
    #[error("heavy-key set for {side} published after {folded} of {expected} histograms")]
    IncompleteDetection {
        side: &'static str,
        folded: usize,
        expected: usize,
    },

    /// A histogram arrived for a slot that is out of range or already folded.
    #[error("unexpected histogram for {side} partition {partition}")]
    UnexpectedHistogram {
        side: &'static str,
        partition: usize,
    },
}

impl FlowJoinError {
    /// Whether this error was raised while validating configuration.
    #[must_use]
    pub const fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidCapacity { .. }
                | Self::InvalidPartitionCount { .. }
                | Self::InvalidThreshold { .. }
                | Self::InvalidSampleStride { .. }
                | Self::UnknownBackend { .. }
        )
    }

    /// Whether this error reports missing or inconsistent partition data.
    #[must_use]
    pub const fn is_input_error(&self) -> bool {
        matches!(
            self,
            Self::MissingPartition { .. }
                | Self::DuplicatePartition { .. }
                | Self::PartitionCountMismatch { .. }
                | Self::MisplacedTuple { .. }
                | Self::PartitionOutOfPlace { .. }
        )
    }

    /// Create an unknown-backend error.
    pub fn unknown_backend(name: impl Into<String>) -> Self {
        Self::UnknownBackend { name: name.into() }
    }
}

/// Result type alias using `FlowJoinError`.
pub type Result<T> = std::result::Result<T, FlowJoinError>;
