use serde::Deserialize;
use stowage_storage::RetryConfig;

use super::defaults::*;
use super::deserialize::*;

/// The YAML document as written by the user, before validation.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigDocument {
    pub schedule: ScheduleConfig,
    /// Directory to archive.
    #[serde(deserialize_with = "deserialize_strict_string")]
    pub source: String,
    /// Where the archive is written before upload.
    #[serde(deserialize_with = "deserialize_strict_string")]
    pub staging_dir: String,
    #[serde(
        default = "default_filename_prefix",
        deserialize_with = "deserialize_strict_string"
    )]
    pub filename_prefix: String,
    /// Leave the staged archive on disk after a verified upload.
    #[serde(default = "default_keep_local_archive")]
    pub keep_local_archive: bool,
    #[serde(default)]
    pub archive: ArchiveConfig,
    pub storage: StorageSection,
    pub retention: RetentionConfig,
    #[serde(default)]
    pub validation: ValidationConfig,
    pub notify: NotifyConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScheduleConfig {
    /// Local wall-clock fire time, `HH:MM`.
    #[serde(deserialize_with = "deserialize_strict_string")]
    pub at: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ArchiveConfig {
    #[serde(
        default = "default_tar_binary",
        deserialize_with = "deserialize_strict_string"
    )]
    pub tar_binary: String,
    #[serde(
        default = "default_archive_timeout",
        deserialize_with = "deserialize_duration_string"
    )]
    pub timeout: String,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            tar_binary: default_tar_binary(),
            timeout: default_archive_timeout(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StorageSection {
    #[serde(deserialize_with = "deserialize_strict_string")]
    pub bucket: String,
    /// S3 endpoint, e.g. `https://s3.us-east-1.amazonaws.com`.
    #[serde(deserialize_with = "deserialize_strict_string")]
    pub endpoint: String,
    #[serde(default = "default_region", deserialize_with = "deserialize_strict_string")]
    pub region: String,
    /// Key prefix inside the bucket.
    #[serde(default, deserialize_with = "deserialize_strict_string")]
    pub root: String,
    /// Falls back to `AWS_ACCESS_KEY_ID`.
    #[serde(default, deserialize_with = "deserialize_optional_strict_string")]
    pub access_key_id: Option<String>,
    /// Falls back to `AWS_SECRET_ACCESS_KEY`.
    #[serde(default, deserialize_with = "deserialize_optional_strict_string")]
    pub secret_access_key: Option<String>,
    #[serde(default)]
    pub allow_insecure_http: bool,
    #[serde(default)]
    pub retry: RetryConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetentionConfig {
    /// Remote copies older than this many whole days are deleted.
    pub days: u32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ValidationConfig {
    #[serde(
        default = "default_initial_delay",
        deserialize_with = "deserialize_duration_string"
    )]
    pub initial_delay: String,
    #[serde(
        default = "default_max_delay",
        deserialize_with = "deserialize_duration_string"
    )]
    pub max_delay: String,
    #[serde(
        default = "default_visibility_timeout",
        deserialize_with = "deserialize_duration_string"
    )]
    pub timeout: String,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            timeout: default_visibility_timeout(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NotifyConfig {
    #[serde(deserialize_with = "deserialize_strict_string")]
    pub to: String,
    /// Defaults to the SMTP username.
    #[serde(default, deserialize_with = "deserialize_optional_strict_string")]
    pub from: Option<String>,
    #[serde(
        default = "default_smtp_host",
        deserialize_with = "deserialize_strict_string"
    )]
    pub smtp_host: String,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    /// Falls back to `EMAIL_ADDRESS`.
    #[serde(default, deserialize_with = "deserialize_optional_strict_string")]
    pub username: Option<String>,
    /// Falls back to `EMAIL_PASSWORD`.
    #[serde(default, deserialize_with = "deserialize_optional_strict_string")]
    pub password: Option<String>,
    #[serde(
        default = "default_smtp_timeout",
        deserialize_with = "deserialize_duration_string"
    )]
    pub timeout: String,
}
