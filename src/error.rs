//! Error types for nano-eagle.

use thiserror::Error;

/// Result type alias for nano-eagle operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for nano-eagle.
///
/// Every variant aborts the whole step. There is no per-sequence recovery.
#[derive(Error, Debug)]
pub enum Error {
    /// Logits precision is not one of the supported kinds.
    #[error("unsupported logits precision: {0}")]
    UnsupportedPrecision(String),

    /// Probabilistic acceptance was requested.
    #[error("non-greedy sampling is not supported yet")]
    NonGreedyUnsupported,

    /// Logits tensor dtype differs from the configured precision.
    #[error("logits precision mismatch: configured {configured}, got {actual}")]
    PrecisionMismatch {
        configured: &'static str,
        actual: String,
    },

    /// Shape or index precondition violated by the step inputs.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Draft tree description cannot be turned into a path table.
    #[error("invalid draft tree: {0}")]
    InvalidTree(String),

    /// Workspace handed to a step is smaller than the sizing function requires.
    #[error("workspace too small: required {required} bytes, available {available} bytes")]
    WorkspaceTooSmall { required: usize, available: usize },

    /// Serialized configuration has the wrong length.
    #[error(
        "expected serialized length ({expected}) != real length ({actual}); \
         this is often caused by a different nano-eagle version on each side"
    )]
    SerializedLength { expected: usize, actual: usize },

    /// Serialized configuration was produced by another format version.
    #[error("serialization version mismatch: expected {expected}, got {actual}")]
    VersionMismatch { expected: u32, actual: u32 },

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Tensor operation error.
    #[error("tensor error: {0}")]
    Tensor(#[from] candle_core::Error),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}
