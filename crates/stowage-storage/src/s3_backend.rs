use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rusty_s3::actions::{ListObjectsV2, ObjectIdentifier, S3Action};
use rusty_s3::{Bucket, Credentials, UrlStyle};
use serde::Deserialize;

use crate::error::{DeleteError, ListError, Result, StorageError, UploadError};
use crate::retry::HttpRetryError;
use crate::{DeleteReport, ObjectStore, RemoteObject, RetryConfig};

/// Duration for presigned URL validity.
const PRESIGN_DURATION: Duration = Duration::from_secs(3600);

/// S3 accepts at most this many keys per DeleteObjects request.
const MAX_DELETE_BATCH: usize = 1000;

pub struct S3Backend {
    bucket: Bucket,
    bucket_name: String,
    credentials: Credentials,
    agent: ureq::Agent,
    retry: RetryConfig,
    /// Prefix (root path) prepended to all keys.
    root: String,
}

impl S3Backend {
    pub fn new(
        bucket_name: &str,
        region: &str,
        root: &str,
        endpoint: &str,
        access_key_id: &str,
        secret_access_key: &str,
        retry: RetryConfig,
    ) -> Result<Self> {
        let base_url = endpoint.parse().map_err(|e| {
            StorageError::Config(format!("invalid S3 endpoint URL '{endpoint}': {e}"))
        })?;

        // Endpoint is always explicit in config; use path-style addressing.
        let bucket = Bucket::new(
            base_url,
            UrlStyle::Path,
            bucket_name.to_string(),
            region.to_string(),
        )
        .map_err(|e| StorageError::Config(format!("failed to create S3 bucket handle: {e}")))?;

        let credentials = Credentials::new(access_key_id, secret_access_key);

        let agent = ureq::AgentBuilder::new()
            .timeout_connect(Duration::from_secs(30))
            .timeout_read(Duration::from_secs(300))
            .timeout_write(Duration::from_secs(300))
            .build();

        Ok(Self {
            bucket,
            bucket_name: bucket_name.to_string(),
            credentials,
            agent,
            retry,
            root: root.trim_matches('/').to_string(),
        })
    }

    /// Prepend the root prefix to a key.
    fn full_key(&self, key: &str) -> String {
        if self.root.is_empty() {
            key.to_string()
        } else {
            format!("{}/{}", self.root, key)
        }
    }

    /// Strip the root prefix from a key reported by the store.
    fn relative_key<'a>(&self, full: &'a str) -> &'a str {
        if self.root.is_empty() {
            return full;
        }
        full.strip_prefix(&self.root)
            .and_then(|rest| rest.strip_prefix('/'))
            .unwrap_or(full)
    }

    fn delete_batch(&self, keys: &[String]) -> std::result::Result<DeleteReport, DeleteError> {
        let objects: Vec<ObjectIdentifier> = keys
            .iter()
            .map(|k| ObjectIdentifier::new(self.full_key(k)))
            .collect();
        let action = self
            .bucket
            .delete_objects(Some(&self.credentials), objects.iter());
        let url = action.sign(PRESIGN_DURATION);
        let (body, content_md5) = action.body_with_md5();

        let resp = self
            .agent
            .post(url.as_str())
            .set("Content-MD5", &content_md5)
            .send_string(&body)
            .map_err(|e| DeleteError::Request {
                count: keys.len(),
                message: e.to_string(),
            })?;
        let text = resp.into_string().map_err(|e| DeleteError::Request {
            count: keys.len(),
            message: format!("body read error: {e}"),
        })?;

        let mut report = parse_delete_result(&text)?;
        for key in report.deleted.iter_mut() {
            *key = self.relative_key(key).to_string();
        }
        for (key, _) in report.failed.iter_mut() {
            *key = self.relative_key(key).to_string();
        }
        Ok(report)
    }
}

impl ObjectStore for S3Backend {
    fn upload(&self, local_path: &Path, key: &str) -> std::result::Result<(), UploadError> {
        let local_error = |source| UploadError::LocalFile {
            path: local_path.to_path_buf(),
            source,
        };
        let file = File::open(local_path).map_err(local_error)?;
        let len = file.metadata().map_err(local_error)?.len();

        let url = self
            .bucket
            .put_object(Some(&self.credentials), &self.full_key(key))
            .sign(PRESIGN_DURATION);

        // Explicit length keeps ureq from switching to chunked encoding,
        // which presigned S3 PUTs reject.
        self.agent
            .put(url.as_str())
            .set("Content-Length", &len.to_string())
            .send(file)
            .map_err(|e| UploadError::Request {
                key: key.to_string(),
                message: e.to_string(),
            })?;

        tracing::debug!(key, bytes = len, "S3 PUT complete");
        Ok(())
    }

    fn list(&self, prefix: &str) -> std::result::Result<Vec<RemoteObject>, ListError> {
        let full_prefix = self.full_key(prefix);
        let mut objects = Vec::new();
        let mut continuation_token: Option<String> = None;

        loop {
            let mut action = self.bucket.list_objects_v2(Some(&self.credentials));
            action.query_mut().insert("prefix", &full_prefix);
            if let Some(ref token) = continuation_token {
                action.query_mut().insert("continuation-token", token);
            }
            let url = action.sign(PRESIGN_DURATION);

            let parsed = crate::retry::retry_http_body(&self.retry, &format!("LIST {prefix}"), || {
                let resp = self
                    .agent
                    .get(url.as_str())
                    .call()
                    .map_err(HttpRetryError::http)?;
                let mut body = Vec::new();
                resp.into_reader()
                    .read_to_end(&mut body)
                    .map_err(HttpRetryError::BodyIo)?;
                let body = std::str::from_utf8(&body).map_err(|e| {
                    HttpRetryError::Permanent(format!("failed to parse response: {e}"))
                })?;
                ListObjectsV2::parse_response(body).map_err(|e| {
                    HttpRetryError::Permanent(format!("failed to parse response: {e}"))
                })
            })
            .map_err(|e| match e {
                HttpRetryError::Permanent(message) => ListError::Malformed {
                    prefix: prefix.to_string(),
                    message,
                },
                other => ListError::Request {
                    prefix: prefix.to_string(),
                    message: other.to_string(),
                },
            })?;

            for obj in &parsed.contents {
                // Skip directory markers
                if obj.key.ends_with('/') {
                    continue;
                }
                let last_modified =
                    parse_last_modified(&obj.last_modified).map_err(|message| {
                        ListError::Malformed {
                            prefix: prefix.to_string(),
                            message: format!("object '{}': {message}", obj.key),
                        }
                    })?;
                objects.push(RemoteObject {
                    key: self.relative_key(&obj.key).to_string(),
                    size_bytes: obj.size,
                    last_modified,
                });
            }

            match parsed.next_continuation_token {
                Some(token) => continuation_token = Some(token),
                None => break,
            }
        }

        Ok(objects)
    }

    fn delete_many(&self, keys: &[String]) -> std::result::Result<DeleteReport, DeleteError> {
        if keys.is_empty() {
            tracing::info!("batch delete skipped: no keys");
            return Ok(DeleteReport::default());
        }

        let mut report = DeleteReport::default();
        for batch in keys.chunks(MAX_DELETE_BATCH) {
            let partial = self.delete_batch(batch)?;
            report.deleted.extend(partial.deleted);
            report.failed.extend(partial.failed);
        }
        Ok(report)
    }

    fn describe(&self) -> String {
        if self.root.is_empty() {
            format!("s3://{}", self.bucket_name)
        } else {
            format!("s3://{}/{}", self.bucket_name, self.root)
        }
    }
}

/// S3 reports `LastModified` as ISO-8601 with milliseconds, e.g.
/// `2024-03-01T17:12:05.000Z`.
fn parse_last_modified(raw: &str) -> std::result::Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| format!("invalid LastModified '{raw}': {e}"))
}

#[derive(Debug, Deserialize)]
struct DeleteResult {
    #[serde(rename = "Deleted", default)]
    deleted: Vec<DeletedObject>,
    #[serde(rename = "Error", default)]
    errors: Vec<DeleteFailure>,
}

#[derive(Debug, Deserialize)]
struct DeletedObject {
    #[serde(rename = "Key")]
    key: String,
}

#[derive(Debug, Deserialize)]
struct DeleteFailure {
    #[serde(rename = "Key")]
    key: String,
    #[serde(rename = "Code", default)]
    code: String,
    #[serde(rename = "Message", default)]
    message: String,
}

fn parse_delete_result(xml: &str) -> std::result::Result<DeleteReport, DeleteError> {
    let parsed: DeleteResult =
        quick_xml::de::from_str(xml).map_err(|e| DeleteError::Malformed(e.to_string()))?;
    Ok(DeleteReport {
        deleted: parsed.deleted.into_iter().map(|d| d.key).collect(),
        failed: parsed
            .errors
            .into_iter()
            .map(|e| {
                let reason = if e.message.is_empty() {
                    e.code
                } else {
                    format!("{}: {}", e.code, e.message)
                };
                (e.key, reason)
            })
            .collect(),
    })
}
