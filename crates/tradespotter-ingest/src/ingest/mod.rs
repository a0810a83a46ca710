//! Filing source ingestion
//!
//! One submodule per upstream source, each wiring the same stage chain:
//! discovery, download, parse, normalize, upsert. Only the House Clerk
//! source exists today; the layout leaves room for a Senate eFD
//! equivalent.
//!
//! Shared HTTP plumbing lives here. Components receive a single
//! [`reqwest::Client`] built once per process instead of constructing
//! their own.

use reqwest::Client;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

use crate::config::{HttpConfig, RetryConfig};
use crate::error::{IngestError, Result};

pub mod house;

pub use house::pipeline::{HousePipeline, RunReport, RunStatus};

/// Upper bound on a single retry delay regardless of backoff growth.
const MAX_BACKOFF_SECS: u64 = 60;

/// Build the process-wide HTTP client.
pub fn build_http_client(http: &HttpConfig) -> Result<Client> {
    Client::builder()
        .timeout(Duration::from_secs(http.request_timeout_secs))
        .user_agent(&http.user_agent)
        .build()
        .map_err(|e| IngestError::Configuration(format!("failed to build HTTP client: {e}")))
}

/// Run a retryable operation with bounded exponential backoff.
///
/// Only errors classified retryable are retried; terminal classes such
/// as [`IngestError::NotFound`] pass straight through. The delay before
/// attempt `n` is `backoff_factor^n` seconds, capped at
/// [`MAX_BACKOFF_SECS`].
pub(crate) async fn retry_with_backoff<T, F, Fut>(
    operation_name: &str,
    policy: &RetryConfig,
    mut operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt: u32 = 0;

    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempt < policy.max_retries => {
                let delay_secs =
                    u64::from(policy.backoff_factor.saturating_pow(attempt)).min(MAX_BACKOFF_SECS);

                warn!(
                    operation = operation_name,
                    attempt = attempt + 1,
                    max_retries = policy.max_retries,
                    delay_secs,
                    error = %e,
                    "Retrying after failure"
                );

                tokio::time::sleep(Duration::from_secs(delay_secs)).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
