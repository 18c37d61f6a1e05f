//! Error types for detection runs.

use thiserror::Error;

/// Result type alias using `DetectError`.
pub type Result<T> = std::result::Result<T, DetectError>;

/// Errors that can occur during a structural pattern detection run.
#[derive(Debug, Error)]
pub enum DetectError {
    /// Edge source is missing or unreadable. Fatal: aborts the run before
    /// any detector executes.
    #[error("Input error: {0}")]
    InputError(String),

    /// A single detector failed. Isolated per detector; the remaining
    /// detectors still run to completion.
    #[error("Detector '{detector}' failed: {message}")]
    DetectorFailure {
        /// Name of the failed detector.
        detector: String,
        /// Failure description.
        message: String,
    },

    /// One or more detectors failed, so nothing was written for the
    /// partition. The prior partition contents are left untouched.
    #[error("Run partially failed; no partition written (failed detectors: {})", .0.join(", "))]
    PartialRun(Vec<String>),

    /// Store write failed. Safe to retry: detection is idempotent.
    #[error("Store write failed: {0}")]
    StoreWriteFailure(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// IO error.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl DetectError {
    /// Create an input error.
    #[must_use]
    pub fn input(msg: impl Into<String>) -> Self {
        DetectError::InputError(msg.into())
    }

    /// Create a detector failure for a named detector.
    #[must_use]
    pub fn detector(detector: impl Into<String>, message: impl Into<String>) -> Self {
        DetectError::DetectorFailure {
            detector: detector.into(),
            message: message.into(),
        }
    }

    /// Create a configuration error.
    #[must_use]
    pub fn config(msg: impl Into<String>) -> Self {
        DetectError::ConfigError(msg.into())
    }

    /// Create a store write failure.
    #[must_use]
    pub fn store(msg: impl Into<String>) -> Self {
        DetectError::StoreWriteFailure(msg.into())
    }

    /// Returns true if retrying the run can succeed without operator
    /// intervention. Detection is deterministic, so store write failures
    /// are always safe to retry.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            DetectError::StoreWriteFailure(_) | DetectError::PartialRun(_)
        )
    }
}

impl From<serde_json::Error> for DetectError {
    fn from(err: serde_json::Error) -> Self {
        DetectError::SerializationError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_run_display_names_detectors() {
        let err = DetectError::PartialRun(vec!["cycle".to_string(), "burst".to_string()]);
        let msg = err.to_string();
        assert!(msg.contains("cycle"));
        assert!(msg.contains("burst"));
    }

    #[test]
    fn test_retryable_classification() {
        assert!(DetectError::store("write timeout").is_retryable());
        assert!(DetectError::PartialRun(vec!["motif".to_string()]).is_retryable());
        assert!(!DetectError::input("missing edge source").is_retryable());
        assert!(!DetectError::config("bad bounds").is_retryable());
    }
}
