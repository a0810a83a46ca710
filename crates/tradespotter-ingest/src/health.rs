//! Connectivity and self-test health checks
//!
//! Each component is probed independently and reported as a structured
//! pass/fail entry: configuration validity, datastore reachability,
//! blob store reachability, the discovery endpoint, and pure self-tests
//! of the parser and the trade content hash. A failing check never
//! stops the remaining checks from running.

use chrono::{DateTime, Datelike, Utc};
use serde::Serialize;
use tracing::{info, warn};
use tradespotter_common::types::{trade_row_hash, TradeSide};

use crate::config::Settings;
use crate::ingest::build_http_client;
use crate::ingest::house::discovery::HouseDiscovery;
use crate::ingest::house::normalizer::Normalizer;
use crate::ingest::house::parser::BulkIndexParser;
use crate::storage::{config::StorageConfig, Storage};
use crate::upserter::Upserter;

/// Known digest for the hash self-test fixture. The content hash is the
/// sole trade deduplication key, so a drifting digest means stored rows
/// would stop matching their replays.
const HASH_FIXTURE_DIGEST: &str = "f0ac0fda7ea721575b921f4ef579322ab0610b66e4a590e4f558365e404b45b5";

/// Index fixture for the parser self-test: header plus one known row.
const PARSER_FIXTURE: &str =
    "Prefix\tLast\tFirst\tSuffix\tFilingType\tStateDst\tYear\tFilingDate\tDocID\n\
     \tAaron\tRichard\t\tP\tMI04\t2025\t3/24/2025\t40003749\n";

/// One component's probe result
#[derive(Debug, Clone, Serialize)]
pub struct ComponentCheck {
    pub component: String,
    pub healthy: bool,
    pub detail: String,
}

impl ComponentCheck {
    fn pass(component: &str, detail: impl Into<String>) -> Self {
        Self {
            component: component.to_string(),
            healthy: true,
            detail: detail.into(),
        }
    }

    fn fail(component: &str, detail: impl Into<String>) -> Self {
        Self {
            component: component.to_string(),
            healthy: false,
            detail: detail.into(),
        }
    }
}

/// Aggregated pass/fail list across all components
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub checked_at: DateTime<Utc>,
    pub checks: Vec<ComponentCheck>,
}

impl HealthReport {
    pub fn is_healthy(&self) -> bool {
        self.checks.iter().all(|c| c.healthy)
    }

    /// Operator-facing text block, one line per component.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for check in &self.checks {
            let status = if check.healthy { "PASS" } else { "FAIL" };
            out.push_str(&format!("[{status}] {}: {}\n", check.component, check.detail));
        }
        let overall = if self.is_healthy() {
            "healthy"
        } else {
            "degraded"
        };
        out.push_str(&format!("overall: {overall}\n"));
        out
    }
}

/// Probe every component and aggregate the results.
pub async fn run_health_check(settings: &Settings) -> HealthReport {
    let mut checks = Vec::new();

    checks.push(check_configuration(settings));
    checks.push(check_datastore(settings).await);
    checks.push(check_blob_store().await);
    checks.push(check_discovery(settings).await);
    checks.push(check_parser());
    checks.push(check_hash());

    let report = HealthReport {
        checked_at: Utc::now(),
        checks,
    };

    if report.is_healthy() {
        info!("Health check passed");
    } else {
        let failing: Vec<_> = report
            .checks
            .iter()
            .filter(|c| !c.healthy)
            .map(|c| c.component.as_str())
            .collect();
        warn!(failing = ?failing, "Health check degraded");
    }

    report
}

fn check_configuration(settings: &Settings) -> ComponentCheck {
    match settings.validate() {
        Ok(()) => {
            let (start, end) = settings.year_range();
            ComponentCheck::pass("configuration", format!("valid, year window {start}-{end}"))
        }
        Err(e) => ComponentCheck::fail("configuration", e.to_string()),
    }
}

async fn check_datastore(settings: &Settings) -> ComponentCheck {
    let upserter = match Upserter::connect(&settings.database).await {
        Ok(u) => u,
        Err(e) => return ComponentCheck::fail("datastore", e.to_string()),
    };

    if let Err(e) = upserter.ping().await {
        return ComponentCheck::fail("datastore", format!("ping failed: {e}"));
    }

    match upserter.validate_integrity().await {
        Ok(report) => ComponentCheck::pass(
            "datastore",
            format!(
                "reachable, {} politicians, {} disclosures, {} trades",
                report.total_politicians, report.total_disclosures, report.total_trades
            ),
        ),
        // A reachable datastore without the schema applied still counts
        // as a failure; the first run would die on its opening upsert.
        Err(e) => ComponentCheck::fail("datastore", format!("integrity query failed: {e}")),
    }
}

async fn check_blob_store() -> ComponentCheck {
    let storage = match Storage::new(StorageConfig::from_env()).await {
        Ok(s) => s,
        Err(e) => return ComponentCheck::fail("blob_store", e.to_string()),
    };

    let probe_key = storage.archive_key(Utc::now().year());
    match storage.exists(&probe_key).await {
        Ok(true) => ComponentCheck::pass("blob_store", "reachable, current archive present"),
        Ok(false) => ComponentCheck::pass("blob_store", "reachable"),
        Err(e) => ComponentCheck::fail("blob_store", e.to_string()),
    }
}

async fn check_discovery(settings: &Settings) -> ComponentCheck {
    let client = match build_http_client(&settings.http) {
        Ok(c) => c,
        Err(e) => return ComponentCheck::fail("discovery", e.to_string()),
    };

    let discovery = HouseDiscovery::new(client.clone(), &settings.source.house_base_url);
    let url = discovery.landing_url();

    match client.head(&url).send().await {
        Ok(response) if response.status().is_success() => {
            ComponentCheck::pass("discovery", format!("{url} reachable"))
        }
        Ok(response) => {
            ComponentCheck::fail("discovery", format!("{url} returned {}", response.status()))
        }
        Err(e) => ComponentCheck::fail("discovery", format!("{url} unreachable: {e}")),
    }
}

/// Parse the known index fixture and normalize its row.
fn check_parser() -> ComponentCheck {
    let parsed = BulkIndexParser::new().parse(PARSER_FIXTURE);

    if parsed.rows.len() != 1 || !parsed.skipped.is_empty() {
        return ComponentCheck::fail(
            "parser",
            format!(
                "fixture produced {} rows, {} skips",
                parsed.rows.len(),
                parsed.skipped.len()
            ),
        );
    }

    match Normalizer::new().normalize_row(&parsed.rows[0], 2025) {
        Ok(filing)
            if filing.politician.state.as_deref() == Some("MI")
                && filing.politician.district.as_deref() == Some("04")
                && filing.document_id == "40003749" =>
        {
            ComponentCheck::pass("parser", "fixture row parsed and normalized")
        }
        Ok(filing) => ComponentCheck::fail(
            "parser",
            format!(
                "fixture normalized to unexpected shape: state={:?} district={:?}",
                filing.politician.state, filing.politician.district
            ),
        ),
        Err(e) => ComponentCheck::fail("parser", format!("fixture normalization failed: {e}")),
    }
}

/// Recompute the fixture digest and compare against the pinned value.
fn check_hash() -> ComponentCheck {
    let digest = trade_row_hash(
        "house_clerk",
        "40003749",
        "Apple Inc.",
        Some("AAPL"),
        Some(TradeSide::Buy),
        chrono::NaiveDate::from_ymd_opt(2024, 1, 15),
        Some("$1,001\u{2013}$15,000"),
    );

    if digest == HASH_FIXTURE_DIGEST {
        ComponentCheck::pass("normalizer", "content hash fixture reproduced")
    } else {
        ComponentCheck::fail(
            "normalizer",
            format!("content hash drifted: got {digest}, want {HASH_FIXTURE_DIGEST}"),
        )
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parser_self_test_passes() {
        let check = check_parser();
        assert!(check.healthy, "{}", check.detail);
    }

    #[test]
    fn test_hash_self_test_passes() {
        let check = check_hash();
        assert!(check.healthy, "{}", check.detail);
    }

    #[test]
    fn test_configuration_check_flags_invalid_settings() {
        let mut settings = Settings::default();
        settings.performance.max_concurrency = 0;
        let check = check_configuration(&settings);
        assert!(!check.healthy);
    }

    #[test]
    fn test_report_rollup() {
        let report = HealthReport {
            checked_at: Utc::now(),
            checks: vec![
                ComponentCheck::pass("parser", "ok"),
                ComponentCheck::fail("datastore", "connection refused"),
            ],
        };
        assert!(!report.is_healthy());

        let rendered = report.render();
        assert!(rendered.contains("[PASS] parser"));
        assert!(rendered.contains("[FAIL] datastore"));
        assert!(rendered.contains("overall: degraded"));
    }
}
