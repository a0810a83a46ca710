//! Full pipeline tests against a mocked Clerk site with real backing
//! services.
//!
//! These run the whole chain — discovery, download, parse, normalize,
//! upsert — and assert the idempotence and isolation guarantees the
//! rest of the system depends on. They need infrastructure and are
//! ignored by default:
//!
//! ```text
//! DATABASE_URL=postgresql://localhost/tradespotter_test \
//!     cargo test -p tradespotter-ingest --test pipeline_e2e_tests -- --ignored
//! ```
//!
//! A MinIO instance at `localhost:9000` (minioadmin/minioadmin) with a
//! pre-created `ptr-archive-test` bucket is expected alongside the
//! Postgres database.

use std::io::{Cursor, Write};

use serde_json::json;
use uuid::Uuid;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};
use zip::write::SimpleFileOptions;

use tradespotter_common::types::{trade_row_hash, Chamber, FilingType, TradeSide};
use tradespotter_ingest::config::Settings;
use tradespotter_ingest::error::IngestError;
use tradespotter_ingest::ingest::build_http_client;
use tradespotter_ingest::ingest::house::pipeline::{HousePipeline, RunStatus};
use tradespotter_ingest::models::{NewDisclosure, NewPolitician, NewTrade};
use tradespotter_ingest::storage::{config::StorageConfig, Storage};
use tradespotter_ingest::upserter::Upserter;

const MINIO_ENDPOINT: &str = "http://localhost:9000";
const TEST_BUCKET: &str = "ptr-archive-test";

fn database_url() -> String {
    std::env::var("DATABASE_URL")
        .unwrap_or_else(|_| "postgresql://localhost/tradespotter_test".to_string())
}

fn test_settings(base_url: &str) -> Settings {
    let mut settings = Settings::default();
    settings.source.house_base_url = base_url.to_string();
    settings.database.url = database_url();
    settings.performance.throttle_ms = 0;
    settings.retry.max_retries = 1;
    settings.retry.backoff_factor = 1;
    settings
}

async fn connect_pipeline(settings: &Settings) -> HousePipeline {
    let client = build_http_client(&settings.http).unwrap();
    let storage = Storage::new(StorageConfig::for_minio(MINIO_ENDPOINT, TEST_BUCKET))
        .await
        .unwrap();
    let upserter = Upserter::connect(&settings.database).await.unwrap();
    sqlx::migrate!("../../migrations")
        .run(upserter.pool())
        .await
        .unwrap();
    HousePipeline::new(settings, client, storage, upserter)
}

fn build_archive(year: i32, index_rows: &[&str]) -> Vec<u8> {
    let mut index = String::from(
        "Prefix\tLast\tFirst\tSuffix\tFilingType\tStateDst\tYear\tFilingDate\tDocID\n",
    );
    for row in index_rows {
        index.push_str(row);
        index.push('\n');
    }

    let mut cursor = Cursor::new(Vec::new());
    let mut writer = zip::ZipWriter::new(&mut cursor);
    writer
        .start_file(format!("{year}FD.txt"), SimpleFileOptions::default())
        .unwrap();
    writer.write_all(index.as_bytes()).unwrap();
    writer.finish().unwrap();
    cursor.into_inner()
}

fn landing_page(years: &[i32]) -> String {
    let links: String = years
        .iter()
        .map(|y| format!(r#"<a href="/public_disc/financial-pdfs/{y}FD.zip">{y}</a>"#))
        .collect();
    format!("<html><body>{links}</body></html>")
}

async fn mount_year_archive(server: &MockServer, year: i32, rows: &[&str]) {
    Mock::given(method("GET"))
        .and(path(format!("/public_disc/financial-pdfs/{year}FD.zip")))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(build_archive(year, rows)))
        .mount(server)
        .await;
}

#[tokio::test]
#[ignore = "requires Postgres and MinIO"]
async fn rerunning_the_pipeline_adds_no_rows() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/FinancialDisclosure"))
        .respond_with(ResponseTemplate::new(200).set_body_string(landing_page(&[2024])))
        .mount(&server)
        .await;
    mount_year_archive(
        &server,
        2024,
        &[
            "\tAaron\tRichard\t\tP\tMI04\t2024\t3/24/2024\t40003749",
            "\tBaker\tSusan\t\tP\tCA12\t2024\t4/02/2024\t40003801",
            "Hon.\tCarter\tJohn\tJr.\tD\tTX31\t2024\t5/15/2024\t10061234",
        ],
    )
    .await;

    let settings = test_settings(&server.uri());
    let pipeline = connect_pipeline(&settings).await;

    let first = pipeline.run_bulk(2024, 2024, None).await.unwrap();
    assert_eq!(first.status, RunStatus::Completed);
    assert_eq!(first.rows_parsed, 3);

    let after_first = pipeline.upserter().validate_integrity().await.unwrap();

    let second = pipeline.run_bulk(2024, 2024, None).await.unwrap();
    assert_eq!(second.status, RunStatus::Completed);
    assert_eq!(second.filings_upserted, 0);
    assert_eq!(second.duplicates, 3);

    let after_second = pipeline.upserter().validate_integrity().await.unwrap();
    assert_eq!(after_first.total_politicians, after_second.total_politicians);
    assert_eq!(after_first.total_disclosures, after_second.total_disclosures);
    assert_eq!(after_first.total_trades, after_second.total_trades);

    // The archived copy landed under the year prefix exactly once.
    let storage = Storage::new(StorageConfig::for_minio(MINIO_ENDPOINT, TEST_BUCKET))
        .await
        .unwrap();
    let keys = storage.list("house/2024/").await.unwrap();
    assert_eq!(keys, vec!["house/2024/2024FD.zip".to_string()]);
}

#[tokio::test]
#[ignore = "requires Postgres and MinIO"]
async fn one_failing_year_does_not_abort_the_others() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/FinancialDisclosure"))
        .respond_with(ResponseTemplate::new(200).set_body_string(landing_page(&[2023, 2024, 2025])))
        .mount(&server)
        .await;
    mount_year_archive(
        &server,
        2023,
        &["\tDavis\tEllen\t\tP\tNY03\t2023\t2/10/2023\t40001111"],
    )
    .await;
    // 2024 stays broken through every retry.
    Mock::given(method("GET"))
        .and(path("/public_disc/financial-pdfs/2024FD.zip"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    mount_year_archive(
        &server,
        2025,
        &["\tEvans\tFrank\t\tP\tWA07\t2025\t1/20/2025\t40002222"],
    )
    .await;

    let settings = test_settings(&server.uri());
    let pipeline = connect_pipeline(&settings).await;

    let report = pipeline.run_bulk(2023, 2025, None).await.unwrap();

    assert_eq!(report.status, RunStatus::PartiallyFailed);
    assert_eq!(report.years_discovered, 3);
    assert_eq!(report.archives_downloaded, 2);
    assert_eq!(report.rows_parsed, 2);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].unit, "year 2024");
}

#[tokio::test]
#[ignore = "requires Postgres and MinIO"]
async fn document_text_trades_persist_exactly_once() {
    let server = MockServer::start().await;

    // Unique document id per run so reruns against a shared database
    // exercise fresh inserts.
    let document_id = Uuid::new_v4().simple().to_string();

    Mock::given(method("GET"))
        .and(path("/FinancialDisclosure"))
        .respond_with(ResponseTemplate::new(200).set_body_string(landing_page(&[2024])))
        .mount(&server)
        .await;
    let index_row = format!("\tAaron\tRichard\t\tP\tMI04\t2024\t3/24/2024\t{document_id}");
    mount_year_archive(&server, 2024, &[index_row.as_str()]).await;

    let settings = test_settings(&server.uri());
    let pipeline = connect_pipeline(&settings).await;

    let report = pipeline.run_bulk(2024, 2024, None).await.unwrap();
    assert_eq!(report.status, RunStatus::Completed);

    let text = "Asset\tTicker\tType\tTransaction Date\tAmount\n\
        Apple Inc.\tAAPL\tP\t01/15/2024\t$1,001 - $15,000\n\
        Microsoft Corporation\tMSFT\tS\t03/24/2024\t$15,001 - $50,000\n";

    let first = pipeline
        .ingest_document_text(&document_id, text)
        .await
        .unwrap();
    assert_eq!(first.extracted, 2);
    assert_eq!(first.inserted, 2);
    assert_eq!(first.failed, 0);

    let replay = pipeline
        .ingest_document_text(&document_id, text)
        .await
        .unwrap();
    assert_eq!(replay.extracted, 2);
    assert_eq!(replay.inserted, 0);
    assert_eq!(replay.duplicates, 2);

    // A document whose index row was never ingested is rejected.
    let missing = pipeline
        .ingest_document_text("document-never-ingested", text)
        .await
        .unwrap_err();
    assert!(matches!(missing, IngestError::Validation(_)));
}

#[tokio::test]
#[ignore = "requires Postgres"]
async fn politician_upsert_never_blanks_existing_fields() {
    let upserter = Upserter::connect(&test_settings("http://unused").database)
        .await
        .unwrap();
    sqlx::migrate!("../../migrations")
        .run(upserter.pool())
        .await
        .unwrap();

    // Unique name per run so reruns against a shared database are clean.
    let full_name = format!("Test Politician {}", Uuid::new_v4());

    let with_district = NewPolitician {
        full_name: full_name.clone(),
        first_name: "Test".to_string(),
        last_name: "Politician".to_string(),
        chamber: Chamber::House,
        state: Some("MI".to_string()),
        district: Some("04".to_string()),
        party: Some("D".to_string()),
        external_ids: json!({}),
    };
    let first = upserter.upsert_politician(&with_district).await.unwrap();

    let without_district = NewPolitician {
        district: None,
        party: None,
        ..with_district
    };
    let second = upserter.upsert_politician(&without_district).await.unwrap();

    assert!(second.is_duplicate());
    assert_eq!(first.id(), second.id());

    let (district, party): (Option<String>, Option<String>) =
        sqlx::query_as("SELECT district, party FROM politicians WHERE id = $1")
            .bind(first.id())
            .fetch_one(upserter.pool())
            .await
            .unwrap();
    assert_eq!(district.as_deref(), Some("04"));
    assert_eq!(party.as_deref(), Some("D"));
}

#[tokio::test]
#[ignore = "requires Postgres"]
async fn replayed_trade_insert_is_a_no_op() {
    let upserter = Upserter::connect(&test_settings("http://unused").database)
        .await
        .unwrap();
    sqlx::migrate!("../../migrations")
        .run(upserter.pool())
        .await
        .unwrap();

    let document_id = Uuid::new_v4().simple().to_string();

    let politician = upserter
        .upsert_politician(&NewPolitician {
            full_name: format!("Trade Owner {document_id}"),
            first_name: "Trade".to_string(),
            last_name: "Owner".to_string(),
            chamber: Chamber::House,
            state: Some("TX".to_string()),
            district: Some("31".to_string()),
            party: None,
            external_ids: json!({}),
        })
        .await
        .unwrap();

    let disclosure = upserter
        .insert_disclosure(&NewDisclosure {
            politician_id: politician.id(),
            source: "house_clerk".to_string(),
            document_id: document_id.clone(),
            filing_type: FilingType::PeriodicTransaction,
            filed_date: chrono::NaiveDate::from_ymd_opt(2024, 3, 24),
            raw_metadata: json!({}),
        })
        .await
        .unwrap();

    let transaction_date = chrono::NaiveDate::from_ymd_opt(2024, 1, 15);
    let trade = NewTrade {
        disclosure_id: disclosure.id(),
        politician_id: politician.id(),
        transaction_date,
        published_date: None,
        ticker: Some("AAPL".to_string()),
        asset_name: "Apple Inc.".to_string(),
        side: Some(TradeSide::Buy),
        amount_range: Some("$1,001\u{2013}$15,000".to_string()),
        amount_min: Some(1_001),
        amount_max: Some(15_000),
        notes: None,
        row_hash: trade_row_hash(
            "house_clerk",
            &document_id,
            "Apple Inc.",
            Some("AAPL"),
            Some(TradeSide::Buy),
            transaction_date,
            Some("$1,001\u{2013}$15,000"),
        ),
    };

    let first = upserter.insert_trade(&trade).await.unwrap();
    assert!(!first.is_duplicate());

    let second = upserter.insert_trade(&trade).await.unwrap();
    assert!(second.is_duplicate());
    assert_eq!(first.id(), second.id());

    // The constraint held, so a cleanup pass has nothing to do.
    let cleanup = upserter.cleanup_duplicate_trades(true).await.unwrap();
    assert_eq!(cleanup.duplicates_found, 0);
}
