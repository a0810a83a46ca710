//! Archive and document retrieval with integrity checks
//!
//! Fetches the yearly bulk ZIP and individual PTR documents, verifies
//! the payload magic before anything else touches it, persists a copy
//! to blob storage, and hands the extracted index text to the parser.
//! Transport failures are retried with bounded backoff; a 404 is
//! terminal.
//!
//! Archives are overwritten in storage on every fetch because the
//! current year's archive keeps changing upstream. Documents are
//! immutable once filed, so an existing stored copy skips the download
//! entirely.

use reqwest::{Client, StatusCode};
use std::io::{Cursor, Read};
use tracing::{debug, info};

use crate::config::RetryConfig;
use crate::error::{IngestError, Result};
use crate::ingest::house::discovery::ArchiveLocation;
use crate::ingest::retry_with_backoff;
use crate::storage::Storage;

/// Smallest payload accepted as a real archive; anything shorter is a
/// truncated response or an error page.
const MIN_ARCHIVE_BYTES: usize = 64;

/// A fetched and extracted yearly bulk archive
#[derive(Debug, Clone)]
pub struct DownloadedArchive {
    pub year: i32,
    pub url: String,
    /// Size of the ZIP payload in bytes
    pub size: i64,
    /// SHA-256 of the ZIP payload
    pub checksum: String,
    /// Blob store key of the archived copy
    pub storage_key: String,
    /// Extracted tab-delimited index
    pub index_text: String,
}

/// A filing document persisted to blob storage
#[derive(Debug, Clone)]
pub struct StoredDocument {
    pub document_id: String,
    pub storage_key: String,
    pub size: i64,
    pub checksum: Option<String>,
    /// True when a stored copy already existed and no download happened
    pub skipped: bool,
}

/// Retrieves archives and documents from the Clerk's site
pub struct HouseDownloader {
    client: Client,
    storage: Storage,
    retry: RetryConfig,
    throttle_ms: u64,
}

impl HouseDownloader {
    pub fn new(client: Client, storage: Storage, retry: RetryConfig, throttle_ms: u64) -> Self {
        Self {
            client,
            storage,
            retry,
            throttle_ms,
        }
    }

    /// Fetch one year's bulk archive, archive it, and extract its index.
    pub async fn fetch_archive(&self, location: &ArchiveLocation) -> Result<DownloadedArchive> {
        let bytes = self.fetch_bytes(&location.url, "bulk archive").await?;

        if bytes.len() < MIN_ARCHIVE_BYTES || !bytes.starts_with(b"PK") {
            return Err(IngestError::Download(format!(
                "payload from {} is not a ZIP archive ({} bytes)",
                location.url,
                bytes.len()
            )));
        }

        let index_text = extract_index_text(&bytes, location.year)?;

        let key = self.storage.archive_key(location.year);
        let upload = self
            .storage
            .upload(&key, bytes, Some("application/zip".to_string()))
            .await?;

        info!(
            year = location.year,
            size = upload.size,
            checksum = %upload.checksum,
            key = %upload.key,
            "Bulk archive fetched and stored"
        );

        Ok(DownloadedArchive {
            year: location.year,
            url: location.url.clone(),
            size: upload.size,
            checksum: upload.checksum,
            storage_key: upload.key,
            index_text,
        })
    }

    /// Fetch one filing document and persist it, skipping documents that
    /// are already archived.
    pub async fn fetch_document(
        &self,
        url: &str,
        year: i32,
        document_id: &str,
    ) -> Result<StoredDocument> {
        let key = self.storage.document_key(year, document_id);

        if self.storage.exists(&key).await? {
            debug!(document_id, key = %key, "Document already archived, skipping");
            return Ok(StoredDocument {
                document_id: document_id.to_string(),
                storage_key: key,
                size: 0,
                checksum: None,
                skipped: true,
            });
        }

        let bytes = self.fetch_bytes(url, "filing document").await?;

        if !bytes.starts_with(b"%PDF") {
            return Err(IngestError::Download(format!(
                "document {document_id} from {url} is not a PDF"
            )));
        }

        let upload = self
            .storage
            .upload(&key, bytes, Some("application/pdf".to_string()))
            .await?;

        debug!(
            document_id,
            size = upload.size,
            key = %upload.key,
            "Filing document stored"
        );

        Ok(StoredDocument {
            document_id: document_id.to_string(),
            storage_key: upload.key,
            size: upload.size,
            checksum: Some(upload.checksum),
            skipped: false,
        })
    }

    /// GET with throttle, retry, and status classification.
    async fn fetch_bytes(&self, url: &str, what: &str) -> Result<Vec<u8>> {
        retry_with_backoff(what, &self.retry, || self.fetch_once(url, what)).await
    }

    async fn fetch_once(&self, url: &str, what: &str) -> Result<Vec<u8>> {
        self.throttle().await;

        debug!(url, "Fetching {what}");
        let response = self.client.get(url).send().await?;
        let status = response.status();

        if status == StatusCode::NOT_FOUND {
            return Err(IngestError::NotFound(format!("{what} not found: {url}")));
        }

        if !status.is_success() {
            return Err(IngestError::Download(format!(
                "{what} returned {status}: {url}"
            )));
        }

        let declared = response.content_length();
        let bytes = response.bytes().await?.to_vec();
        verify_content_length(url, what, declared, bytes.len())?;

        Ok(bytes)
    }

    /// Minimum delay between outbound requests from this worker.
    async fn throttle(&self) {
        if self.throttle_ms > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(self.throttle_ms)).await;
        }
    }
}

/// A body shorter or longer than the declared Content-Length is a
/// transport fault; the retryable classification lets the next attempt
/// pull a complete copy. Responses without the header pass through.
fn verify_content_length(
    url: &str,
    what: &str,
    declared: Option<u64>,
    received: usize,
) -> Result<()> {
    match declared {
        Some(expected) if expected != received as u64 => Err(IngestError::Download(format!(
            "{what} from {url} truncated: Content-Length {expected}, received {received} bytes"
        ))),
        _ => Ok(()),
    }
}

/// Pull the tab-delimited index out of a bulk archive.
///
/// The Clerk names the entry `{YEAR}FD.txt`; any other `.txt` entry is
/// accepted as a fallback against naming drift. Text is decoded
/// lossily, the index is ASCII apart from the occasional name.
fn extract_index_text(data: &[u8], year: i32) -> Result<String> {
    let mut archive = zip::ZipArchive::new(Cursor::new(data))?;

    let expected = format!("{year}FD.txt");

    match archive.by_name(&expected) {
        Ok(mut file) => {
            let mut raw = Vec::new();
            file.read_to_end(&mut raw)?;
            return Ok(String::from_utf8_lossy(&raw).into_owned());
        }
        Err(zip::result::ZipError::FileNotFound) => {}
        Err(e) => return Err(e.into()),
    }

    let fallback = archive
        .file_names()
        .find(|name| name.to_lowercase().ends_with(".txt"))
        .map(|name| name.to_string());

    match fallback {
        Some(name) => {
            debug!(expected = %expected, found = %name, "Index entry name drifted");
            let mut file = archive.by_name(&name)?;
            let mut raw = Vec::new();
            file.read_to_end(&mut raw)?;
            Ok(String::from_utf8_lossy(&raw).into_owned())
        }
        None => Err(IngestError::Parse(format!(
            "no index text entry in the {year} archive"
        ))),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    fn build_archive(entries: &[(&str, &str)]) -> Vec<u8> {
        let mut cursor = Cursor::new(Vec::new());
        let mut writer = zip::ZipWriter::new(&mut cursor);
        let options = SimpleFileOptions::default();

        for (name, contents) in entries {
            writer.start_file(*name, options).unwrap();
            writer.write_all(contents.as_bytes()).unwrap();
        }

        writer.finish().unwrap();
        cursor.into_inner()
    }

    #[test]
    fn test_extract_index_text_exact_name() {
        let archive = build_archive(&[("2024FD.txt", "Prefix\tLast\tFirst\n")]);
        let text = extract_index_text(&archive, 2024).unwrap();
        assert_eq!(text, "Prefix\tLast\tFirst\n");
    }

    #[test]
    fn test_extract_index_text_name_drift_fallback() {
        let archive = build_archive(&[
            ("readme.pdf", "not text"),
            ("FD_index_2024.txt", "Prefix\tLast\tFirst\n"),
        ]);
        let text = extract_index_text(&archive, 2024).unwrap();
        assert_eq!(text, "Prefix\tLast\tFirst\n");
    }

    #[test]
    fn test_extract_index_text_missing_entry() {
        let archive = build_archive(&[("2024FD.xml", "<filings/>")]);
        let err = extract_index_text(&archive, 2024).unwrap_err();
        assert!(matches!(err, IngestError::Parse(_)));
    }

    #[test]
    fn test_extract_index_text_rejects_non_zip() {
        let err = extract_index_text(b"<html>error page</html>", 2024).unwrap_err();
        assert!(matches!(err, IngestError::Archive(_)));
    }

    #[test]
    fn test_verify_content_length_flags_truncated_body_as_retryable() {
        let err = verify_content_length("http://x/2024FD.zip", "bulk archive", Some(1024), 512)
            .unwrap_err();
        assert!(matches!(err, IngestError::Download(_)));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_verify_content_length_accepts_match_or_missing_header() {
        verify_content_length("http://x", "bulk archive", Some(512), 512).unwrap();
        verify_content_length("http://x", "bulk archive", None, 512).unwrap();
    }
}
