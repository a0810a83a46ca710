//! Error types shared across the TradeSpotter workspace

use thiserror::Error;

/// Result type alias for common operations
pub type Result<T> = std::result::Result<T, CommonError>;

/// Error type for shared utilities (checksums, shared domain types)
#[derive(Error, Debug)]
pub enum CommonError {
    #[error("Checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    #[error("Invalid filing type code: {0}")]
    InvalidFilingType(String),

    #[error("Parse error: {0}")]
    Parse(String),
}
