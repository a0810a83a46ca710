//! Blob store connection settings.
//!
//! Read from the `S3_*` / `STORAGE_BUCKET` variables; credentials fall
//! back to the standard `AWS_*` pair, and every field has a local-dev
//! default so `from_env` never fails. A missing real bucket surfaces as
//! an unreachable blob store in the health check, not here.

use std::env;

/// Default bucket for archived filings.
pub const DEFAULT_STORAGE_BUCKET: &str = "ptr-archive";

const DEFAULT_REGION: &str = "us-east-1";
const DEV_CREDENTIAL: &str = "minioadmin";

#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Custom endpoint (MinIO and friends); `None` means real AWS.
    pub endpoint: Option<String>,
    pub region: String,
    pub bucket: String,
    pub access_key: String,
    pub secret_key: String,
    /// Path-style addressing, required by most non-AWS endpoints.
    pub path_style: bool,
}

fn var_or(names: &[&str], default: &str) -> String {
    names
        .iter()
        .find_map(|name| env::var(name).ok())
        .unwrap_or_else(|| default.to_string())
}

impl StorageConfig {
    pub fn from_env() -> Self {
        Self {
            endpoint: env::var("S3_ENDPOINT").ok(),
            region: var_or(&["S3_REGION"], DEFAULT_REGION),
            bucket: var_or(&["STORAGE_BUCKET", "S3_BUCKET"], DEFAULT_STORAGE_BUCKET),
            access_key: var_or(&["S3_ACCESS_KEY", "AWS_ACCESS_KEY_ID"], DEV_CREDENTIAL),
            secret_key: var_or(&["S3_SECRET_KEY", "AWS_SECRET_ACCESS_KEY"], DEV_CREDENTIAL),
            path_style: env::var("S3_PATH_STYLE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(false),
        }
    }

    /// Config for a local MinIO instance, used by the ignored e2e tests.
    pub fn for_minio(endpoint: impl Into<String>, bucket: impl Into<String>) -> Self {
        Self {
            endpoint: Some(endpoint.into()),
            region: DEFAULT_REGION.to_string(),
            bucket: bucket.into(),
            access_key: DEV_CREDENTIAL.to_string(),
            secret_key: DEV_CREDENTIAL.to_string(),
            path_style: true,
        }
    }
}
