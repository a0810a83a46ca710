//! Configuration management

use chrono::Datelike;
use serde::{Deserialize, Serialize};

// ============================================================================
// Worker Configuration Constants
// ============================================================================

/// Default base URL of the House Clerk disclosure site.
pub const DEFAULT_HOUSE_BASE_URL: &str = "https://disclosures-clerk.house.gov";

/// Default year window for discovery, "START-END" inclusive.
pub const DEFAULT_YEAR_WINDOW: &str = "2023-2025";

/// Earliest year the Clerk publishes bulk archives for.
pub const MIN_WINDOW_YEAR: i32 = 2008;

/// Latest year accepted in a configured window.
pub const MAX_WINDOW_YEAR: i32 = 2100;

/// Default minutes between scheduled pipeline runs.
pub const DEFAULT_SCAN_INTERVAL_MIN: u64 = 15;

/// Default cap on concurrently processed units (years/filings).
pub const DEFAULT_MAX_CONCURRENCY: usize = 5;

/// Default minimum delay between outbound requests per worker.
pub const DEFAULT_THROTTLE_MS: u64 = 1000;

/// Default retry attempts for retryable discovery/download failures.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default exponential backoff base between retries.
pub const DEFAULT_RETRY_BACKOFF_FACTOR: u32 = 2;

/// Default timeout for a single HTTP request in seconds.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;

/// Default user agent for polite crawling.
pub const DEFAULT_USER_AGENT: &str = "TradeSpotter-PTR-Worker/1.0";

/// Default database URL for local development.
pub const DEFAULT_DATABASE_URL: &str = "postgresql://localhost/tradespotter";

/// Default maximum database connections in the pool.
pub const DEFAULT_DATABASE_MAX_CONNECTIONS: u32 = 5;

/// Worker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub source: SourceConfig,
    pub database: DatabaseConfig,
    pub http: HttpConfig,
    pub performance: PerformanceConfig,
    pub retry: RetryConfig,
    pub scheduler: SchedulerConfig,
}

/// Upstream source configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    pub house_base_url: String,
    /// "START-END" year window, e.g. "2023-2025"
    pub year_window: String,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

/// HTTP client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    pub user_agent: String,
    pub request_timeout_secs: u64,
}

/// Concurrency and throttling limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceConfig {
    pub max_concurrency: usize,
    pub throttle_ms: u64,
}

/// Retry policy for retryable failures
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub backoff_factor: u32,
}

/// Scheduled run configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    pub scan_interval_min: u64,
}

impl Settings {
    /// Load configuration from environment and defaults
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let settings = Settings {
            source: SourceConfig {
                house_base_url: std::env::var("HOUSE_BASE_URL")
                    .unwrap_or_else(|_| DEFAULT_HOUSE_BASE_URL.to_string()),
                year_window: std::env::var("HOUSE_YEAR_WINDOW")
                    .unwrap_or_else(|_| DEFAULT_YEAR_WINDOW.to_string()),
            },
            database: DatabaseConfig {
                url: std::env::var("DATABASE_URL")
                    .unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string()),
                max_connections: std::env::var("DATABASE_MAX_CONNECTIONS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_DATABASE_MAX_CONNECTIONS),
            },
            http: HttpConfig {
                user_agent: std::env::var("USER_AGENT")
                    .unwrap_or_else(|_| DEFAULT_USER_AGENT.to_string()),
                request_timeout_secs: std::env::var("REQUEST_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS),
            },
            performance: PerformanceConfig {
                max_concurrency: std::env::var("MAX_CONCURRENCY")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_MAX_CONCURRENCY),
                throttle_ms: std::env::var("THROTTLE_MS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_THROTTLE_MS),
            },
            retry: RetryConfig {
                max_retries: std::env::var("MAX_RETRIES")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_MAX_RETRIES),
                backoff_factor: std::env::var("RETRY_BACKOFF_FACTOR")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_RETRY_BACKOFF_FACTOR),
            },
            scheduler: SchedulerConfig {
                scan_interval_min: std::env::var("SCAN_INTERVAL_MIN")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_SCAN_INTERVAL_MIN),
            },
        };

        settings.validate()?;

        Ok(settings)
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.database.url.is_empty() {
            anyhow::bail!("Database URL cannot be empty");
        }

        if self.database.max_connections == 0 {
            anyhow::bail!("Database max_connections must be greater than 0");
        }

        if !self.source.house_base_url.starts_with("http") {
            anyhow::bail!(
                "House base URL must be an http(s) URL, got: {}",
                self.source.house_base_url
            );
        }

        match parse_year_window(&self.source.year_window) {
            Some((start, end)) => {
                if start < MIN_WINDOW_YEAR || end > MAX_WINDOW_YEAR {
                    anyhow::bail!(
                        "year window {start}-{end} outside {MIN_WINDOW_YEAR}-{MAX_WINDOW_YEAR}"
                    );
                }
            }
            None => anyhow::bail!(
                "year window must be YYYY or YYYY-YYYY with start <= end, got: {}",
                self.source.year_window
            ),
        }

        if self.performance.max_concurrency == 0 {
            anyhow::bail!("max_concurrency must be greater than 0");
        }

        if self.retry.max_retries == 0 {
            anyhow::bail!("max_retries must be greater than 0");
        }

        if self.retry.backoff_factor == 0 {
            anyhow::bail!("retry backoff_factor must be greater than 0");
        }

        if self.http.request_timeout_secs == 0 {
            anyhow::bail!("request_timeout_secs must be greater than 0");
        }

        Ok(())
    }

    /// Parse the configured year window into an inclusive (start, end) range.
    ///
    /// `validate` rejects an unparseable window before a run starts;
    /// settings built without it degrade to a single current-year scan
    /// instead of panicking.
    pub fn year_range(&self) -> (i32, i32) {
        match parse_year_window(&self.source.year_window) {
            Some(range) => range,
            None => {
                tracing::warn!(
                    window = %self.source.year_window,
                    "Invalid year window, scanning current year only"
                );
                let current = chrono::Utc::now().year();
                (current, current)
            }
        }
    }
}

/// `YYYY-YYYY` inclusive, or a bare `YYYY` meaning that single year.
fn parse_year_window(window: &str) -> Option<(i32, i32)> {
    if let Ok(year) = window.trim().parse::<i32>() {
        return Some((year, year));
    }

    let (start, end) = window.split_once('-')?;
    let start: i32 = start.trim().parse().ok()?;
    let end: i32 = end.trim().parse().ok()?;
    if start > end {
        return None;
    }
    Some((start, end))
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            source: SourceConfig {
                house_base_url: DEFAULT_HOUSE_BASE_URL.to_string(),
                year_window: DEFAULT_YEAR_WINDOW.to_string(),
            },
            database: DatabaseConfig {
                url: DEFAULT_DATABASE_URL.to_string(),
                max_connections: DEFAULT_DATABASE_MAX_CONNECTIONS,
            },
            http: HttpConfig {
                user_agent: DEFAULT_USER_AGENT.to_string(),
                request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            },
            performance: PerformanceConfig {
                max_concurrency: DEFAULT_MAX_CONCURRENCY,
                throttle_ms: DEFAULT_THROTTLE_MS,
            },
            retry: RetryConfig {
                max_retries: DEFAULT_MAX_RETRIES,
                backoff_factor: DEFAULT_RETRY_BACKOFF_FACTOR,
            },
            scheduler: SchedulerConfig {
                scan_interval_min: DEFAULT_SCAN_INTERVAL_MIN,
            },
        }
    }
}
