//! Error types for the dataset crate.

use geotile_raster::RasterError;
use thiserror::Error;

/// Errors that can occur when building, sampling or persisting example pools.
#[derive(Debug, Error)]
pub enum DatasetError {
    /// Examples were requested from a pool with no eligible examples.
    #[error("Cannot take {requested} examples from empty {pool} pool")]
    InsufficientExamples {
        /// Pool name.
        pool: String,
        /// Number of examples requested.
        requested: usize,
    },

    /// Batch size must be positive.
    #[error("Invalid batch size {0}")]
    InvalidBatchSize(usize),

    /// The requested positive fraction is not a number.
    #[error("Invalid positive fraction {0}")]
    InvalidPositiveFraction(f64),

    /// An array does not have the shape of the pool it is added to.
    #[error("Array shape {found:?} does not match pool shape {expected:?}")]
    ShapeMismatch {
        /// Shape of the arrays already in the pool.
        expected: [usize; 3],
        /// Shape of the offending array.
        found: [usize; 3],
    },

    /// Parallel sequences of a pool have different lengths.
    #[error("{field} has {found} entries, expected {expected}")]
    LengthMismatch {
        /// Name of the sequence.
        field: &'static str,
        /// Number of arrays.
        expected: usize,
        /// Number of entries in the sequence.
        found: usize,
    },

    /// An example index does not exist.
    #[error("Index {index} out of range for {len} examples")]
    IndexOutOfRange {
        /// Requested index.
        index: usize,
        /// Number of examples available.
        len: usize,
    },

    /// I/O error reading or writing a store.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed store contents.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Raster access failed during extraction.
    #[error(transparent)]
    Raster(#[from] RasterError),
}
