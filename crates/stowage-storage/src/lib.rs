pub mod error;
pub mod retry;
pub mod s3_backend;

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use error::{DeleteError, ListError, Result, StorageError, UploadError};

/// One object as reported by the store. Read-only; never mutated locally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteObject {
    pub key: String,
    pub size_bytes: u64,
    pub last_modified: DateTime<Utc>,
}

/// Result of a best-effort batch delete.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeleteReport {
    pub deleted: Vec<String>,
    /// `(key, reason)` for every key the store refused to delete.
    pub failed: Vec<(String, String)>,
}

impl DeleteReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Capability surface of the object store.
///
/// Keys are relative to the backend's root prefix. Implementations must not
/// retry `upload` or `delete_many`; `list` may retry transient failures
/// because it is idempotent.
pub trait ObjectStore: Send + Sync {
    /// Upload a local file under `key` with a single PUT.
    fn upload(&self, local_path: &Path, key: &str) -> std::result::Result<(), UploadError>;

    /// Return every object whose key starts with `prefix`.
    fn list(&self, prefix: &str) -> std::result::Result<Vec<RemoteObject>, ListError>;

    /// Delete `keys` in one batch. An empty slice is a no-op and issues no request.
    fn delete_many(&self, keys: &[String]) -> std::result::Result<DeleteReport, DeleteError>;

    /// Human-readable location used in logs and notifications.
    fn describe(&self) -> String;
}

/// Retry settings for idempotent remote reads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetryConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    #[serde(default = "default_retry_max_delay_ms")]
    pub retry_max_delay_ms: u64,
}

fn default_max_retries() -> usize {
    3
}

fn default_retry_delay_ms() -> u64 {
    1000
}

fn default_retry_max_delay_ms() -> u64 {
    60_000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
            retry_max_delay_ms: default_retry_max_delay_ms(),
        }
    }
}

/// Everything needed to build a backend. Produced by the core config layer.
#[derive(Clone)]
pub struct StorageConfig {
    pub bucket: String,
    pub endpoint: String,
    pub region: String,
    pub root: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    pub allow_insecure_http: bool,
    pub retry: RetryConfig,
}

impl std::fmt::Debug for StorageConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageConfig")
            .field("bucket", &self.bucket)
            .field("endpoint", &self.endpoint)
            .field("region", &self.region)
            .field("root", &self.root)
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field("allow_insecure_http", &self.allow_insecure_http)
            .field("retry", &self.retry)
            .finish()
    }
}

/// Build the object-store client described by `cfg`.
pub fn backend_from_config(cfg: &StorageConfig) -> Result<Box<dyn ObjectStore>> {
    if cfg.endpoint.starts_with("http://") && !cfg.allow_insecure_http {
        return Err(StorageError::Config(format!(
            "refusing plaintext endpoint '{}'; set storage.allow_insecure_http: true to override",
            cfg.endpoint
        )));
    }
    let backend = s3_backend::S3Backend::new(
        &cfg.bucket,
        &cfg.region,
        &cfg.root,
        &cfg.endpoint,
        &cfg.access_key_id,
        &cfg.secret_access_key,
        cfg.retry.clone(),
    )?;
    Ok(Box::new(backend))
}
