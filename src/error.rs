//! Error types for pagefit library.

use std::io;
use thiserror::Error;

/// Result type alias for pagefit operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types that can occur while measuring, deciding or applying.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error when reading or writing snapshot files.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Snapshot or policy JSON could not be (de)serialized.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The measurement provider could not supply a value.
    #[error("Measurement failed: {0}")]
    Measurement(String),

    /// The measurement provider returned values that make no sense.
    #[error("Malformed metrics for node {node}: {reason}")]
    MalformedMetrics {
        /// Node the metrics belong to
        node: usize,
        /// What was wrong with them
        reason: String,
    },

    /// A node reference does not exist in the rendered tree.
    #[error("Node {0} not found")]
    NodeNotFound(usize),

    /// No heading carries the requested identifier.
    #[error("Heading not found: {0}")]
    HeadingNotFound(String),

    /// The heading has no figure within the sibling-search window.
    #[error("No figure follows heading: {0}")]
    FigureNotFound(String),

    /// A decision could not be recorded in the measurement breakdown.
    #[error("Breakdown write-back failed: {0}")]
    WriteBack(String),

    /// A policy value is out of its valid range.
    #[error("Invalid policy: {0}")]
    InvalidPolicy(String),

    /// Generic error with message.
    #[error("{0}")]
    Other(String),
}
