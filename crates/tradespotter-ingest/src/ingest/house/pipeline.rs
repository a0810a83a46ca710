//! House ingestion pipeline
//!
//! Orchestrates a run across its phases: discover the year archive,
//! download and archive it, parse the bulk index, normalize rows, and
//! upsert filings. Years are independent units; one year's terminal
//! failure is recorded and the run continues with the rest.

use futures::stream::{self, StreamExt};
use reqwest::Client;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::SOURCE;
use crate::config::{RetryConfig, Settings};
use crate::error::{IngestError, Result};
use crate::ingest::house::discovery::HouseDiscovery;
use crate::ingest::house::downloader::HouseDownloader;
use crate::ingest::house::normalizer::Normalizer;
use crate::ingest::house::parser::BulkIndexParser;
use crate::ingest::house::strategies::{extract_trades, Extraction};
use crate::ingest::{build_http_client, retry_with_backoff};
use crate::storage::{config::StorageConfig, Storage};
use crate::upserter::Upserter;

/// Terminal state of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunStatus {
    /// Every unit finished.
    #[default]
    Completed,
    /// At least one unit failed terminally; the rest finished.
    PartiallyFailed,
}

/// One unit that failed terminally, with the reason it was excluded.
#[derive(Debug, Clone)]
pub struct UnitFailure {
    pub unit: String,
    pub reason: String,
}

/// Aggregated counts for one run.
///
/// Bulk runs leave the document counts at zero; document runs leave
/// the upsert counts at zero.
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    pub status: RunStatus,
    pub years_discovered: usize,
    pub archives_downloaded: usize,
    pub rows_parsed: usize,
    pub rows_skipped: usize,
    pub filings_upserted: usize,
    pub duplicates: usize,
    pub documents_stored: usize,
    pub documents_skipped: usize,
    pub failures: Vec<UnitFailure>,
}

impl RunReport {
    fn record_failure(&mut self, unit: impl Into<String>, reason: impl Into<String>) {
        self.failures.push(UnitFailure {
            unit: unit.into(),
            reason: reason.into(),
        });
    }

    fn finalize(&mut self) {
        self.status = if self.failures.is_empty() {
            RunStatus::Completed
        } else {
            RunStatus::PartiallyFailed
        };
    }

    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Completed
    }

    /// One-line account of what the run did.
    pub fn summary(&self) -> String {
        format!(
            "{} filings upserted, {} duplicates, {} rows skipped, {} documents stored, {} failures",
            self.filings_upserted,
            self.duplicates,
            self.rows_skipped,
            self.documents_stored,
            self.failures.len()
        )
    }
}

/// Counts from extracting and persisting one document's trades.
#[derive(Debug, Clone, Copy, Default)]
pub struct TradeIngest {
    pub extracted: usize,
    pub inserted: usize,
    pub duplicates: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// House Clerk ingestion pipeline.
pub struct HousePipeline {
    discovery: HouseDiscovery,
    downloader: HouseDownloader,
    parser: BulkIndexParser,
    normalizer: Normalizer,
    upserter: Upserter,
    retry: RetryConfig,
    max_concurrency: usize,
    shutdown: Option<watch::Receiver<bool>>,
}

impl HousePipeline {
    /// Build every component from settings and the environment.
    ///
    /// Connects to the datastore and blob store up front; failures here
    /// are configuration errors that abort before any unit runs.
    pub async fn from_settings(settings: &Settings) -> Result<Self> {
        let client = build_http_client(&settings.http)?;
        let storage = Storage::new(StorageConfig::from_env()).await?;
        let upserter = Upserter::connect(&settings.database).await?;
        Ok(Self::new(settings, client, storage, upserter))
    }

    /// Assemble a pipeline from already-built components.
    pub fn new(settings: &Settings, client: Client, storage: Storage, upserter: Upserter) -> Self {
        let discovery = HouseDiscovery::new(client.clone(), &settings.source.house_base_url);
        let downloader = HouseDownloader::new(
            client,
            storage,
            settings.retry.clone(),
            settings.performance.throttle_ms,
        );
        Self {
            discovery,
            downloader,
            parser: BulkIndexParser::new(),
            normalizer: Normalizer::new(),
            upserter,
            retry: settings.retry.clone(),
            max_concurrency: settings.performance.max_concurrency.max(1),
            shutdown: None,
        }
    }

    /// Attach a shutdown signal checked at year boundaries.
    ///
    /// An in-flight year completes; remaining years are not started.
    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    pub fn upserter(&self) -> &Upserter {
        &self.upserter
    }

    fn shutdown_requested(&self) -> bool {
        self.shutdown.as_ref().is_some_and(|rx| *rx.borrow())
    }

    /// Ingest the bulk index for each year in the inclusive range.
    ///
    /// `limit` caps the index rows taken per year, for smoke runs
    /// against the live site.
    pub async fn run_bulk(
        &self,
        year_start: i32,
        year_end: i32,
        limit: Option<usize>,
    ) -> Result<RunReport> {
        validate_year_range(year_start, year_end)?;
        info!(year_start, year_end, "Starting bulk ingestion run");

        let mut report = RunReport::default();
        for year in year_start..=year_end {
            if self.shutdown_requested() {
                warn!(year, "Shutdown requested, skipping remaining years");
                break;
            }
            if let Err(err) = self.ingest_year(year, limit, &mut report).await {
                warn!(year, error = %err, "Year failed, continuing with remaining years");
                report.record_failure(format!("year {year}"), err.to_string());
            }
        }
        report.finalize();
        info!(status = ?report.status, "Bulk ingestion run finished: {}", report.summary());
        Ok(report)
    }

    /// Fetch and archive individual PTR documents for each year.
    ///
    /// Documents already in blob storage are skipped, so re-runs only
    /// pull filings that appeared since the last pass.
    pub async fn run_download(
        &self,
        year_start: i32,
        year_end: i32,
        limit: Option<usize>,
    ) -> Result<RunReport> {
        validate_year_range(year_start, year_end)?;
        info!(year_start, year_end, "Starting document download run");

        let mut report = RunReport::default();
        for year in year_start..=year_end {
            if self.shutdown_requested() {
                warn!(year, "Shutdown requested, skipping remaining years");
                break;
            }
            if let Err(err) = self.download_year_documents(year, limit, &mut report).await {
                warn!(year, error = %err, "Year failed, continuing with remaining years");
                report.record_failure(format!("year {year}"), err.to_string());
            }
        }
        report.finalize();
        info!(status = ?report.status, "Document download run finished: {}", report.summary());
        Ok(report)
    }

    /// Extract trades from one filing document's text and persist them.
    ///
    /// Converting archived PDFs to text is the caller's concern; given
    /// text, this runs the strategy chain, normalizes what survives,
    /// and inserts idempotently. The document's index row must already
    /// be ingested.
    pub async fn ingest_document_text(&self, document_id: &str, text: &str) -> Result<TradeIngest> {
        let Some(disclosure) = self.upserter.find_disclosure(SOURCE, document_id).await? else {
            return Err(IngestError::Validation(format!(
                "no disclosure on record for document {document_id:?}; run bulk ingestion first"
            )));
        };

        let mut report = TradeIngest::default();
        let records = match extract_trades(text)? {
            Extraction::Success(records) => records,
            _ => {
                info!(document_id, "No trades extracted from document");
                return Ok(report);
            }
        };
        report.extracted = records.len();

        for raw in &records {
            let trade = match self.normalizer.normalize_trade(
                raw,
                disclosure.disclosure_id,
                disclosure.politician_id,
                document_id,
            ) {
                Ok(trade) => trade,
                Err(err) => {
                    report.skipped += 1;
                    debug!(document_id, error = %err, "Trade record skipped");
                    continue;
                }
            };
            match self.upserter.insert_trade(&trade).await {
                Ok(outcome) if outcome.is_duplicate() => report.duplicates += 1,
                Ok(_) => report.inserted += 1,
                Err(err) => {
                    report.failed += 1;
                    warn!(document_id, error = %err, "Trade insert failed");
                }
            }
        }

        info!(
            document_id,
            extracted = report.extracted,
            inserted = report.inserted,
            duplicates = report.duplicates,
            "Document trade ingestion finished"
        );
        Ok(report)
    }

    /// One year of the bulk run, phases matching the run state machine.
    async fn ingest_year(
        &self,
        year: i32,
        limit: Option<usize>,
        report: &mut RunReport,
    ) -> Result<()> {
        info!(year, "Step 1/5: Discovering bulk archive");
        let location = retry_with_backoff("archive discovery", &self.retry, || {
            self.discovery.discover_year_archive(year)
        })
        .await?;
        report.years_discovered += 1;

        info!(year, "Step 2/5: Downloading and archiving");
        let archive = self.downloader.fetch_archive(&location).await?;
        report.archives_downloaded += 1;

        info!(year, "Step 3/5: Parsing bulk index");
        let parsed = self.parser.parse(&archive.index_text);
        for skip in &parsed.skipped {
            debug!(year, line = skip.line, reason = %skip.reason, "Index row skipped");
        }
        report.rows_parsed += parsed.rows.len();
        report.rows_skipped += parsed.skipped.len();

        let mut rows = parsed.rows;
        if let Some(limit) = limit {
            if rows.len() > limit {
                warn!(year, limit, "Row limit set, truncating index");
                rows.truncate(limit);
            }
        }

        info!(year, rows = rows.len(), "Step 4/5: Normalizing filings");
        let mut filings = Vec::with_capacity(rows.len());
        let mut skipped = 0usize;
        for row in &rows {
            match self.normalizer.normalize_row(row, year) {
                Ok(filing) => filings.push(filing),
                Err(err) => {
                    skipped += 1;
                    debug!(year, document_id = %row.document_id, error = %err, "Row skipped");
                }
            }
        }
        report.rows_skipped += skipped;

        info!(year, filings = filings.len(), "Step 5/5: Upserting filings");
        let outcomes = stream::iter(filings.iter())
            .map(|filing| async move {
                let result = self.upserter.upsert_filing(filing).await;
                (filing, result)
            })
            .buffer_unordered(self.max_concurrency)
            .collect::<Vec<_>>()
            .await;

        let mut upserted = 0usize;
        let mut duplicates = 0usize;
        for (filing, result) in outcomes {
            match result {
                Ok(outcome) if outcome.disclosure.is_duplicate() => duplicates += 1,
                Ok(_) => upserted += 1,
                Err(err) => {
                    report.record_failure(
                        format!("document {}", filing.document_id),
                        err.to_string(),
                    );
                }
            }
        }
        report.filings_upserted += upserted;
        report.duplicates += duplicates;

        info!(year, upserted, duplicates, "Year ingestion complete");
        Ok(())
    }

    /// One year of the document run: index first, then each PTR filing.
    async fn download_year_documents(
        &self,
        year: i32,
        limit: Option<usize>,
        report: &mut RunReport,
    ) -> Result<()> {
        info!(year, "Step 1/3: Discovering bulk archive");
        let location = retry_with_backoff("archive discovery", &self.retry, || {
            self.discovery.discover_year_archive(year)
        })
        .await?;
        report.years_discovered += 1;

        info!(year, "Step 2/3: Downloading index");
        let archive = self.downloader.fetch_archive(&location).await?;
        report.archives_downloaded += 1;

        let parsed = self.parser.parse(&archive.index_text);
        report.rows_parsed += parsed.rows.len();
        report.rows_skipped += parsed.skipped.len();

        // Only periodic transaction reports have trade documents worth
        // fetching.
        let mut ptr_rows: Vec<_> = parsed
            .rows
            .into_iter()
            .filter(|row| row.filing_type_code.trim().eq_ignore_ascii_case("P"))
            .collect();
        if let Some(limit) = limit {
            if ptr_rows.len() > limit {
                warn!(year, limit, "Document limit set, truncating");
                ptr_rows.truncate(limit);
            }
        }

        info!(year, documents = ptr_rows.len(), "Step 3/3: Fetching filing documents");
        let results = stream::iter(ptr_rows.iter())
            .map(|row| async move {
                let document_id = row.document_id.trim();
                let url = self.discovery.document_url(year, document_id);
                let result = self.downloader.fetch_document(&url, year, document_id).await;
                (row, result)
            })
            .buffer_unordered(self.max_concurrency)
            .collect::<Vec<_>>()
            .await;

        let mut stored = 0usize;
        let mut skipped = 0usize;
        for (row, result) in results {
            match result {
                Ok(doc) if doc.skipped => skipped += 1,
                Ok(_) => stored += 1,
                Err(err) => {
                    report.record_failure(
                        format!("document {}", row.document_id),
                        err.to_string(),
                    );
                }
            }
        }
        report.documents_stored += stored;
        report.documents_skipped += skipped;

        info!(year, stored, skipped, "Year document fetch complete");
        Ok(())
    }
}

fn validate_year_range(year_start: i32, year_end: i32) -> Result<()> {
    if year_start > year_end {
        return Err(IngestError::Configuration(format!(
            "invalid year range {year_start}-{year_end}"
        )));
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn report_summary_counts_everything() {
        let mut report = RunReport {
            filings_upserted: 95,
            duplicates: 5,
            rows_skipped: 2,
            ..RunReport::default()
        };
        report.finalize();

        assert_eq!(report.status, RunStatus::Completed);
        assert!(report.is_success());
        assert_eq!(
            report.summary(),
            "95 filings upserted, 5 duplicates, 2 rows skipped, 0 documents stored, 0 failures"
        );
    }

    #[test]
    fn any_unit_failure_makes_the_run_partial() {
        let mut report = RunReport::default();
        report.record_failure("year 2024", "download failed after 3 attempts");
        report.finalize();

        assert_eq!(report.status, RunStatus::PartiallyFailed);
        assert!(!report.is_success());
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].unit, "year 2024");
    }

    #[test]
    fn inverted_year_range_is_a_configuration_error() {
        let err = validate_year_range(2025, 2023).unwrap_err();
        assert!(matches!(err, IngestError::Configuration(_)));
    }
}
