//! TradeSpotter PTR ingestion worker binary
//!
//! Operator surface for the pipeline: one-shot bulk runs, dry-run
//! discovery, document downloads, health checks, duplicate maintenance,
//! and the resident scheduled mode. Partial per-unit failures are
//! reported in output but keep exit code 0; only configuration-class
//! failures exit nonzero, since failed years succeed on the next run.

use clap::{Args, Parser, Subcommand};
use std::process::ExitCode;
use tokio::sync::watch;
use tracing::{error, info};
use tradespotter_common::logging::{init_logging, LogConfig, LogLevel};

use tradespotter_ingest::config::Settings;
use tradespotter_ingest::health::run_health_check;
use tradespotter_ingest::ingest::build_http_client;
use tradespotter_ingest::ingest::house::discovery::{ArchiveLocation, HouseDiscovery};
use tradespotter_ingest::ingest::house::pipeline::{HousePipeline, RunReport};
use tradespotter_ingest::scheduler::Scheduler;
use tradespotter_ingest::upserter::Upserter;

#[derive(Parser, Debug)]
#[command(name = "tradespotter-ingest")]
#[command(author, version, about = "House PTR disclosure ingestion worker")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Minimum log level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "info")]
    log_level: String,
}

/// Year selection shared by the pipeline commands.
///
/// `--year` wins over the range flags; anything left unset falls back
/// to the configured year window.
#[derive(Args, Debug, Clone, Copy)]
struct YearArgs {
    /// Process a single year
    #[arg(long, conflicts_with_all = ["year_start", "year_end"])]
    year: Option<i32>,

    /// First year of the range, inclusive
    #[arg(long)]
    year_start: Option<i32>,

    /// Last year of the range, inclusive
    #[arg(long)]
    year_end: Option<i32>,
}

impl YearArgs {
    fn resolve(&self, settings: &Settings) -> (i32, i32) {
        if let Some(year) = self.year {
            return (year, year);
        }
        let (default_start, default_end) = settings.year_range();
        (
            self.year_start.unwrap_or(default_start),
            self.year_end.unwrap_or(default_end),
        )
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the full pipeline for a year range
    Bulk {
        #[command(flatten)]
        years: YearArgs,

        /// Cap on index rows processed per year
        #[arg(long)]
        limit: Option<usize>,
    },

    /// List archive locations without downloading anything
    Discovery {
        #[command(flatten)]
        years: YearArgs,

        /// Cap on years listed
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Fetch filing documents into blob storage without parsing
    Download {
        #[command(flatten)]
        years: YearArgs,

        /// Cap on documents fetched per year
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Check connectivity and component self-tests
    Health,

    /// Run bulk ingestion on the configured schedule until interrupted
    Schedule,

    /// List trade groups sharing a content hash
    FindDuplicates,

    /// Delete all but the earliest trade per duplicate hash group
    CleanupDuplicates {
        /// Actually delete rows; without this flag the pass is a dry run
        #[arg(long)]
        execute: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let log_level = match cli.log_level.parse::<LogLevel>() {
        Ok(level) => level,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };

    let log_config = LogConfig::builder()
        .level(log_level)
        .log_file_prefix("tradespotter-ingest".to_string())
        .build();

    if let Err(e) = init_logging(&log_config) {
        eprintln!("failed to initialize logging: {e}");
        return ExitCode::FAILURE;
    }

    match run(cli.command).await {
        Ok(code) => code,
        Err(e) => {
            error!(error = %e, "Worker failed");
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(command: Command) -> anyhow::Result<ExitCode> {
    let settings = Settings::load()?;

    match command {
        Command::Bulk { years, limit } => {
            let (year_start, year_end) = years.resolve(&settings);
            let pipeline = connect_pipeline(&settings).await?;
            let report = pipeline.run_bulk(year_start, year_end, limit).await?;
            print_report(&report);
            Ok(ExitCode::SUCCESS)
        }

        Command::Discovery { years, limit } => {
            let (year_start, year_end) = years.resolve(&settings);
            let client = build_http_client(&settings.http)?;
            let discovery = HouseDiscovery::new(client, &settings.source.house_base_url);

            let available = discovery.list_available().await?;
            let (lines, located) = discovery_listing(&available, year_start, year_end, limit);
            for line in &lines {
                println!("{line}");
            }
            println!(
                "{located} of {} year(s) located, {} archive(s) published in total",
                lines.len(),
                available.len()
            );
            Ok(ExitCode::SUCCESS)
        }

        Command::Download { years, limit } => {
            let (year_start, year_end) = years.resolve(&settings);
            let pipeline = connect_pipeline(&settings).await?;
            let report = pipeline.run_download(year_start, year_end, limit).await?;
            print_report(&report);
            Ok(ExitCode::SUCCESS)
        }

        Command::Health => {
            let report = run_health_check(&settings).await;
            print!("{}", report.render());
            if report.is_healthy() {
                Ok(ExitCode::SUCCESS)
            } else {
                Ok(ExitCode::FAILURE)
            }
        }

        Command::Schedule => {
            let (shutdown_tx, shutdown_rx) = watch::channel(false);
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    info!("Shutdown signal received");
                    let _ = shutdown_tx.send(true);
                }
            });

            let pipeline = connect_pipeline(&settings)
                .await?
                .with_shutdown(shutdown_rx.clone());
            Scheduler::new(pipeline, settings, shutdown_rx).run().await?;
            Ok(ExitCode::SUCCESS)
        }

        Command::FindDuplicates => {
            let upserter = Upserter::connect(&settings.database).await?;
            let groups = upserter.find_duplicate_trades().await?;

            if groups.is_empty() {
                println!("no duplicate trade hashes found");
            } else {
                for group in &groups {
                    println!("{} x{}", group.row_hash, group.count);
                }
                println!("{} duplicate hash group(s)", groups.len());
            }
            Ok(ExitCode::SUCCESS)
        }

        Command::CleanupDuplicates { execute } => {
            let upserter = Upserter::connect(&settings.database).await?;
            let report = upserter.cleanup_duplicate_trades(!execute).await?;

            if report.dry_run {
                println!(
                    "dry run: {} redundant trade row(s) would be removed",
                    report.duplicates_found
                );
            } else {
                println!("removed {} redundant trade row(s)", report.duplicates_removed);
            }
            for hash in &report.sample_hashes {
                println!("  {hash}...");
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Build the pipeline and bring the schema up to date.
///
/// Everything that can fail here is configuration-class: unreachable
/// datastore or blob store, bad credentials, a migration that cannot
/// apply. All of it aborts before any unit processing starts.
async fn connect_pipeline(settings: &Settings) -> anyhow::Result<HousePipeline> {
    let pipeline = HousePipeline::from_settings(settings).await?;
    sqlx::migrate!("../../migrations")
        .run(pipeline.upserter().pool())
        .await?;
    Ok(pipeline)
}

fn print_report(report: &RunReport) {
    println!("{}", report.summary());
    for failure in &report.failures {
        println!("  failed {}: {}", failure.unit, failure.reason);
    }
}

/// Build the discovery summary: one line per requested year, capped at
/// `limit` years, plus the count of years actually located.
fn discovery_listing(
    available: &[ArchiveLocation],
    year_start: i32,
    year_end: i32,
    limit: Option<usize>,
) -> (Vec<String>, usize) {
    let mut lines = Vec::new();
    let mut located = 0usize;
    for year in (year_start..=year_end).take(limit.unwrap_or(usize::MAX)) {
        match available.iter().find(|location| location.year == year) {
            Some(location) => {
                located += 1;
                lines.push(format!("{year}: {}", location.url));
            }
            None => lines.push(format!("{year}: not listed")),
        }
    }
    (lines, located)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn location(year: i32) -> ArchiveLocation {
        ArchiveLocation {
            year,
            url: format!("https://example.test/{year}FD.zip"),
            from_landing_page: true,
        }
    }

    #[test]
    fn test_discovery_listing_counts_located_years() {
        let available = vec![location(2023), location(2025)];
        let (lines, located) = discovery_listing(&available, 2023, 2025, None);

        assert_eq!(lines.len(), 3);
        assert_eq!(located, 2);
        assert_eq!(lines[0], "2023: https://example.test/2023FD.zip");
        assert_eq!(lines[1], "2024: not listed");
    }

    #[test]
    fn test_discovery_listing_honors_limit() {
        let available = vec![location(2022), location(2023), location(2024)];
        let (lines, located) = discovery_listing(&available, 2022, 2024, Some(2));

        assert_eq!(lines.len(), 2);
        assert_eq!(located, 2);
        assert!(lines.iter().all(|line| !line.starts_with("2024")));
    }

    #[test]
    fn test_discovery_listing_zero_limit_lists_nothing() {
        let available = vec![location(2024)];
        let (lines, located) = discovery_listing(&available, 2024, 2024, Some(0));

        assert!(lines.is_empty());
        assert_eq!(located, 0);
    }
}
