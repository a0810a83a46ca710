//! TradeSpotter PTR Ingestion Worker
//!
//! Discovers, downloads, parses, normalizes, and upserts congressional
//! stock-trade disclosures published by the House Clerk as bulk yearly
//! archives and individual PTR documents.
//!
//! # Pipeline Stages
//!
//! - **Discovery**: locate archive/document URLs for a year range
//! - **Downloader**: fetch with integrity checks, persist to blob storage
//! - **Parser**: extract raw records from the tab-delimited bulk index
//!   or free-form document text
//! - **Normalizer**: map raw fields to canonical entity shapes
//! - **Upserter**: idempotent writes into the three-entity data model
//!
//! Stages exchange plain records; re-running any of them against the
//! same input is safe by construction.
//!
//! # Example
//!
//! ```no_run
//! use tradespotter_ingest::config::Settings;
//! use tradespotter_ingest::ingest::house::HousePipeline;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let settings = Settings::load()?;
//!     let pipeline = HousePipeline::from_settings(&settings).await?;
//!     let report = pipeline.run_bulk(2023, 2025, None).await?;
//!     println!("{}", report.summary());
//!     Ok(())
//! }
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod config;
pub mod error;
pub mod health;
pub mod ingest;
pub mod models;
pub mod scheduler;
pub mod storage;
pub mod upserter;

// Re-export commonly used types
pub use error::{IngestError, Result};
