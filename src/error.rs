use thiserror::Error;

/// Result type for plume operations
pub type Result<T> = std::result::Result<T, PlumeError>;

/// Main error type for the plume library
#[derive(Debug, Error)]
pub enum PlumeError {
    /// Invalid kernel family, dimension or parameter
    #[error("Configuration error in '{name}': {reason}")]
    Configuration {
        name: String,
        reason: String,
    },

    /// Malformed query or data dimensions
    #[error("Shape mismatch: expected {expected}, got {actual}")]
    Shape {
        expected: String,
        actual: String,
    },

    /// Operation requires observations but the model is empty
    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    /// A regularized matrix could not be factorized
    #[error("Numerical instability: {0}")]
    NumericalInstability(String),

    /// Candidate set was empty or every candidate failed to score
    #[error("No valid candidate path at epoch {epoch}")]
    NoValidCandidate {
        epoch: usize,
    },

    /// Missing kernel or model file on load
    #[error("File not found: {0}")]
    NotFound(String),

    /// IO errors (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<bincode::Error> for PlumeError {
    fn from(err: bincode::Error) -> Self {
        PlumeError::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for PlumeError {
    fn from(err: serde_json::Error) -> Self {
        PlumeError::Serialization(err.to_string())
    }
}

// Helper functions for common error patterns
impl PlumeError {
    pub fn shape<S: Into<String>>(expected: S, actual: S) -> Self {
        PlumeError::Shape {
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    pub fn configuration<S: Into<String>>(name: S, reason: S) -> Self {
        PlumeError::Configuration {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Whether the decision loop may recover from this error by ending the run
    pub fn is_recoverable(&self) -> bool {
        matches!(self, PlumeError::NoValidCandidate { .. })
    }
}
