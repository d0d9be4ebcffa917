use crate::reduction::EmbeddingMethod;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned by the engines and the session command layer.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    /// Input was empty where at least one row is required.
    #[error("empty input provided")]
    EmptyInput,

    /// Shape of a matrix or vector did not match what was expected.
    #[error("shape mismatch: expected {expected}, actual {actual}")]
    ShapeMismatch {
        /// Expected shape description.
        expected: String,
        /// Actual shape description.
        actual: String,
    },

    /// Cluster assignments and ground-truth labels differ in length.
    #[error("length mismatch: {assignments} cluster assignments vs {labels} labels")]
    LengthMismatch {
        /// Number of cluster assignments.
        assignments: usize,
        /// Number of labels.
        labels: usize,
    },

    /// Invalid number of clusters requested.
    #[error("cannot create {requested} clusters from {n_items} items")]
    InvalidClusterCount {
        /// Requested count.
        requested: usize,
        /// Number of rows available.
        n_items: usize,
    },

    /// A configuration value is out of its allowed range.
    #[error("invalid parameter '{name}': {message}")]
    InvalidParameter {
        /// Parameter name.
        name: &'static str,
        /// Error message.
        message: String,
    },

    /// Numerical failure inside a dimensionality reduction method.
    #[error("{method} failed: {reason}")]
    Reduction {
        /// Method that failed.
        method: EmbeddingMethod,
        /// Description of the failure.
        reason: String,
    },

    /// Autoencoder construction or training failed.
    #[error("training failed: {0}")]
    Training(String),

    /// Another job currently holds the session.
    #[error("another job is already running: {0}")]
    Busy(String),
}

impl From<candle_core::Error> for Error {
    fn from(err: candle_core::Error) -> Self {
        Error::Training(err.to_string())
    }
}

impl Error {
    pub(crate) fn invalid(name: &'static str, message: impl Into<String>) -> Self {
        Error::InvalidParameter { name, message: message.into() }
    }
}
