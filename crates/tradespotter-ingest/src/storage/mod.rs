//! Blob storage for downloaded archives and filing documents
//!
//! Every archive the downloader fetches is persisted here under a
//! content-derived key before parsing, so a run can always be replayed
//! from the stored copy. The bucket is private; only the worker's
//! credentials touch it.

use aws_sdk_s3::{
    config::{Credentials, Region},
    primitives::ByteStream,
    Client,
};
use tracing::{debug, info, instrument};
use tradespotter_common::checksum::sha256_hex;

use crate::error::{IngestError, Result};

pub mod config;

#[derive(Clone)]
pub struct Storage {
    client: Client,
    bucket: String,
}

impl Storage {
    pub async fn new(config: config::StorageConfig) -> Result<Self> {
        let config::StorageConfig {
            endpoint,
            region,
            bucket,
            access_key,
            secret_key,
            path_style,
        } = config;

        let mut builder = aws_sdk_s3::Config::builder()
            .credentials_provider(Credentials::new(
                access_key,
                secret_key,
                None,
                None,
                "tradespotter-ingest",
            ))
            .region(Region::new(region))
            .force_path_style(path_style);
        if let Some(endpoint) = endpoint {
            builder = builder.endpoint_url(endpoint);
        }

        info!(bucket = %bucket, "Blob store client ready");

        Ok(Self {
            client: Client::from_conf(builder.build()),
            bucket,
        })
    }

    #[instrument(skip(self, data), fields(bucket = %self.bucket))]
    pub async fn upload(
        &self,
        key: &str,
        data: Vec<u8>,
        content_type: Option<String>,
    ) -> Result<UploadResult> {
        let size = data.len() as i64;
        let checksum = sha256_hex(&data);

        let mut request = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(data));
        if let Some(content_type) = content_type {
            request = request.content_type(content_type);
        }

        request
            .send()
            .await
            .map_err(|e| IngestError::Storage(format!("upload of {key} failed: {e}")))?;

        info!(key, size, "Archived to blob store");

        Ok(UploadResult {
            key: key.to_string(),
            checksum,
            size,
        })
    }

    #[instrument(skip(self))]
    pub async fn exists(&self, key: &str) -> Result<bool> {
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(e) => {
                let service_err = e.into_service_error();
                if service_err.is_not_found() {
                    Ok(false)
                } else {
                    Err(IngestError::Storage(format!(
                        "existence check for {key} failed: {service_err}"
                    )))
                }
            }
        }
    }

    /// Keys under a prefix, following continuation tokens to the end.
    #[instrument(skip(self))]
    pub async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        let mut continuation: Option<String> = None;

        loop {
            let mut request = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(prefix);

            if let Some(token) = &continuation {
                request = request.continuation_token(token);
            }

            let response = request
                .send()
                .await
                .map_err(|e| IngestError::Storage(format!("listing {prefix} failed: {e}")))?;

            keys.extend(
                response
                    .contents()
                    .iter()
                    .filter_map(|object| object.key().map(str::to_string)),
            );

            match response.next_continuation_token() {
                Some(token) => continuation = Some(token.to_string()),
                None => break,
            }
        }

        debug!(
            "Listed {} keys under s3://{}/{}",
            keys.len(),
            self.bucket,
            prefix
        );

        Ok(keys)
    }

    /// Key for a yearly bulk archive, e.g. `house/2024/2024FD.zip`.
    pub fn archive_key(&self, year: i32) -> String {
        format!("house/{year}/{year}FD.zip")
    }

    /// Key for an individual filing document,
    /// e.g. `house/ptr-pdfs/2025/20026590.pdf`.
    pub fn document_key(&self, year: i32, document_id: &str) -> String {
        format!("house/ptr-pdfs/{year}/{document_id}.pdf")
    }
}

#[derive(Debug, Clone)]
pub struct UploadResult {
    pub key: String,
    pub checksum: String,
    pub size: i64,
}
