//! Ingestion worker error types
//!
//! The taxonomy drives control flow: configuration failures abort the
//! process, discovery/download failures are retried with backoff, and
//! parse/validation failures skip the affected record only. Duplicate
//! rows are not errors at all; the upsert layer reports them as
//! successful no-ops.

use thiserror::Error;

/// Result type alias for ingestion operations
pub type Result<T> = std::result::Result<T, IngestError>;

/// Ingestion error types
#[derive(Error, Debug)]
pub enum IngestError {
    /// Fatal. Missing credentials, bad settings, unreachable datastore at
    /// startup. The only class that produces a nonzero exit code.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Retryable. Archive or document location could not be determined.
    #[error("Discovery error: {0}")]
    Discovery(String),

    /// Retryable until attempts are exhausted, then the unit is marked
    /// failed and the run continues.
    #[error("Download error: {0}")]
    Download(String),

    /// Terminal, never retried. Absence of data is not a transient fault.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Per-record. Logged and skipped without aborting the batch.
    #[error("Parse error: {0}")]
    Parse(String),

    /// Per-record. The record is skipped with a reason.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Blob store write or read failure.
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Common(#[from] tradespotter_common::CommonError),
}

impl From<regex::Error> for IngestError {
    fn from(err: regex::Error) -> Self {
        IngestError::Parse(err.to_string())
    }
}

impl From<std::num::ParseIntError> for IngestError {
    fn from(err: std::num::ParseIntError) -> Self {
        IngestError::Parse(err.to_string())
    }
}

impl IngestError {
    /// Whether the operation should be retried with backoff.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            IngestError::Discovery(_) | IngestError::Download(_) | IngestError::Http(_)
        )
    }

    /// Whether the error aborts the whole process rather than one unit.
    pub fn is_fatal(&self) -> bool {
        matches!(self, IngestError::Configuration(_))
    }

    /// Whether the error skips a single record rather than a unit.
    pub fn is_record_level(&self) -> bool {
        matches!(self, IngestError::Parse(_) | IngestError::Validation(_))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(IngestError::Discovery("landing page".into()).is_retryable());
        assert!(IngestError::Download("timeout".into()).is_retryable());
        assert!(!IngestError::NotFound("2019".into()).is_retryable());
        assert!(!IngestError::Configuration("no database url".into()).is_retryable());
        assert!(!IngestError::Parse("bad row".into()).is_retryable());
    }

    #[test]
    fn test_fatal_classification() {
        assert!(IngestError::Configuration("no database url".into()).is_fatal());
        assert!(!IngestError::Download("timeout".into()).is_fatal());
        assert!(!IngestError::NotFound("2019".into()).is_fatal());
    }

    #[test]
    fn test_record_level_classification() {
        assert!(IngestError::Parse("short row".into()).is_record_level());
        assert!(IngestError::Validation("unknown filing code".into()).is_record_level());
        assert!(!IngestError::Download("timeout".into()).is_record_level());
    }

    #[test]
    fn test_display_includes_reason() {
        let err = IngestError::Validation("unknown filing type code: Q".into());
        assert_eq!(
            err.to_string(),
            "Validation error: unknown filing type code: Q"
        );
    }
}
