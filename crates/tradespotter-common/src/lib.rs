//! TradeSpotter Common Library
//!
//! Shared types, utilities, and error handling for the TradeSpotter workers.
//!
//! # Overview
//!
//! This crate provides common functionality used across the workspace:
//!
//! - **Error Handling**: Custom error types and result types
//! - **Logging**: Centralized tracing configuration (console/file, text/JSON)
//! - **Checksums**: Payload hashing and integrity verification utilities
//! - **Types**: Shared filing-domain enums and the trade content hash
//!
//! # Example
//!
//! ```rust
//! use tradespotter_common::checksum::{sha256_hex, verify_checksum};
//!
//! let digest = sha256_hex(b"2024FD.txt");
//! assert!(verify_checksum(b"2024FD.txt", &digest).is_ok());
//! assert!(verify_checksum(b"tampered", &digest).is_err());
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod checksum;
pub mod error;
pub mod logging;
pub mod types;

// Re-export commonly used types
pub use error::{CommonError, Result};
