//! Partitioning errors

use crate::deck_error::DeckError;
use thiserror::Error;

/// Errors from the graph partitioner
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PartitionerError {
    /// Zero parts requested
    #[error("cannot partition into zero parts")]
    NoParts,
    /// Per-vertex input does not match the graph
    #[error("expected {expected} vertex degrees, got {got}")]
    DegreeLengthMismatch { expected: usize, got: usize },
    /// A vertex was left without a part
    #[error("vertex {0} has no part")]
    MissingPartition(usize),
}

impl From<PartitionerError> for DeckError {
    fn from(e: PartitionerError) -> Self {
        DeckError::Partition(e.to_string())
    }
}
