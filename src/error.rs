//! Error types for flowcast
//!
//! One error enum for the whole pipeline. Messages carry enough context
//! (widths, row counts, member names) to act on without a debugger.

use thiserror::Error;

use crate::config::ModelType;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// flowcast error types
#[derive(Error, Debug)]
pub enum Error {
    /// Model-type tag is not part of the catalogue (rejected at configuration time)
    #[error("Unknown model type tag: {0:?}")]
    UnknownModelType(String),

    /// No predictor topology could be resolved for the requested configuration
    #[error("Cannot resolve a predictor topology for {model_type}: {reason}")]
    ConfigResolution {
        /// Requested model type
        model_type: ModelType,
        /// Why the topology builder rejected it
        reason: String,
    },

    /// Configuration value out of range or a required section is missing
    #[error("Invalid model configuration: {0}")]
    InvalidConfig(String),

    /// Frame width disagrees with the trained multivariate width
    #[error("Dimension mismatch: expected {expected} columns, got {got}")]
    DimensionMismatch {
        /// Width recorded at training time
        expected: usize,
        /// Width presented by the caller
        got: usize,
    },

    /// Mandatory container member missing or unreadable
    #[error("Artifact corrupt: member {member:?} {reason}")]
    ArtifactCorrupt {
        /// Archive member name
        member: String,
        /// What went wrong while reading it
        reason: String,
    },

    /// Scaler used (inverse or non-fitting transform) before it was fit
    #[error("Scaler is not fitted: normalize with fit=true before transforming or inverting")]
    ScalerNotFitted,

    /// Windowing would yield no windows
    #[error(
        "Insufficient data: {rows} rows cannot produce a window of length {sequence_len} \
         with {steps_ahead} steps ahead"
    )]
    InsufficientData {
        /// Rows available after transformation
        rows: usize,
        /// Configured window length
        sequence_len: usize,
        /// Configured horizon
        steps_ahead: usize,
    },

    /// Data content the pipeline cannot process (e.g. unrepaired gaps in training data)
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// Operation requires a trained model
    #[error("Model is not trained: train or load an artifact first")]
    NotTrained,

    /// Failure reported by the predictor backend
    #[error("Predictor error: {0}")]
    Predictor(String),

    /// Storage error (Parquet/Arrow frame files)
    #[error("Storage error: {0}")]
    StorageError(String),

    /// Remote artifact synchronization failed
    #[error("Remote sync failed: {0}")]
    RemoteSync(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Arrow error
    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Zip archive error
    #[error("Archive error: {0}")]
    Archive(#[from] zip::result::ZipError),
}

impl From<parquet::errors::ParquetError> for Error {
    fn from(err: parquet::errors::ParquetError) -> Self {
        Self::StorageError(err.to_string())
    }
}
