//! House Clerk financial disclosure ingestion
//!
//! The Clerk publishes one bulk ZIP archive per year containing a
//! tab-delimited index of every filing, plus individual PTR documents
//! under a predictable path. Bulk mode ingests the index into
//! politicians and disclosures; detail mode fetches the per-filing
//! documents for trade extraction.
//!
//! # Example
//! ```no_run
//! use tradespotter_ingest::config::Settings;
//! use tradespotter_ingest::ingest::house::pipeline::HousePipeline;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let settings = Settings::load()?;
//! let pipeline = HousePipeline::from_settings(&settings).await?;
//! let report = pipeline.run_bulk(2023, 2025, None).await?;
//! println!("{} filings upserted", report.filings_upserted);
//! # Ok(())
//! # }
//! ```

pub mod discovery;
pub mod downloader;
pub mod normalizer;
pub mod parser;
pub mod pipeline;
pub mod strategies;

/// Source tag stored on every disclosure ingested from the Clerk's site.
pub const SOURCE: &str = "house_clerk";

// Re-export commonly used types
pub use discovery::{ArchiveLocation, HouseDiscovery};
pub use downloader::{DownloadedArchive, HouseDownloader};
pub use normalizer::Normalizer;
pub use parser::BulkIndexParser;
pub use pipeline::{HousePipeline, RunReport, RunStatus};
pub use strategies::{Extraction, ExtractionStrategy};
