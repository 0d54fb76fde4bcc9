use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use stowage_storage::StorageConfig;

use super::defaults::parse_human_duration;
use super::types::*;
use super::util::{absolutize, expand_tilde};
use crate::archiver::ArchiveSettings;
use crate::error::{Result, StowageError};
use crate::job::{BackupJob, FireTime};
use crate::notify::{parse_mailbox, MailSettings};
use crate::platform::paths;
use crate::validate::VisibilityWait;

/// Environment variable that overrides the config search.
pub const CONFIG_ENV_VAR: &str = "STOWAGE_CONFIG";

const ACCESS_KEY_ENV: &str = "AWS_ACCESS_KEY_ID";
const SECRET_KEY_ENV: &str = "AWS_SECRET_ACCESS_KEY";
const MAIL_USER_ENV: &str = "EMAIL_ADDRESS";
const MAIL_PASSWORD_ENV: &str = "EMAIL_PASSWORD";

/// Looks up an environment variable. Empty values count as unset.
pub type EnvLookup<'a> = &'a dyn Fn(&str) -> Option<String>;

fn process_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn config_err(message: impl Into<String>) -> StowageError {
    StowageError::Config(message.into())
}

// --- Placeholder expansion ---

/// Replace `${VAR}` and `${VAR:-default}` in raw config text. A bare
/// `${VAR}` that is unset is an error; the `:-` form falls back when unset
/// or empty.
fn expand_env_placeholders(input: &str, path: &Path, env: EnvLookup<'_>) -> Result<String> {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(open) = rest.find("${") {
        out.push_str(&rest[..open]);
        let at = input.len() - rest.len() + open;
        let after = &rest[open + 2..];
        let close = after
            .find('}')
            .ok_or_else(|| placeholder_error(path, input, at, "unterminated '${'"))?;

        let token = &after[..close];
        let (name, fallback) = match token.split_once(":-") {
            Some((name, fallback)) => (name, Some(fallback)),
            None => (token, None),
        };
        if !is_env_name(name) {
            return Err(placeholder_error(
                path,
                input,
                at,
                format!("invalid environment variable name '{name}'"),
            ));
        }

        match (env(name), fallback) {
            (Some(value), _) => out.push_str(&value),
            (None, Some(fallback)) => out.push_str(fallback),
            (None, None) => {
                return Err(placeholder_error(
                    path,
                    input,
                    at,
                    format!("environment variable '{name}' is not set"),
                ))
            }
        }
        rest = &after[close + 1..];
    }

    out.push_str(rest);
    Ok(out)
}

fn is_env_name(name: &str) -> bool {
    let mut bytes = name.bytes();
    matches!(bytes.next(), Some(b) if b == b'_' || b.is_ascii_alphabetic())
        && bytes.all(|b| b == b'_' || b.is_ascii_alphanumeric())
}

fn placeholder_error(path: &Path, input: &str, at: usize, message: impl fmt::Display) -> StowageError {
    let before = &input[..at];
    let line = before.matches('\n').count() + 1;
    let column = before.rsplit('\n').next().map_or(0, |l| l.chars().count()) + 1;
    config_err(format!(
        "invalid config '{}': {message} at line {line}, column {column}",
        path.display()
    ))
}

// --- Resolution ---

/// Validated, immutable settings for every component.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub job: BackupJob,
    pub archive: ArchiveSettings,
    pub storage: StorageConfig,
    pub visibility: VisibilityWait,
    pub mail: MailSettings,
    pub keep_local_archive: bool,
}

/// Read, expand, parse and validate a config file against the process
/// environment.
pub fn load_and_resolve(path: &Path) -> Result<ResolvedConfig> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| config_err(format!("cannot read '{}': {e}", path.display())))?;
    parse_and_resolve(&text, path, &process_env)
}

/// Same as [`load_and_resolve`] for text already in memory, with an explicit
/// environment.
pub fn parse_and_resolve(text: &str, path: &Path, env: EnvLookup<'_>) -> Result<ResolvedConfig> {
    let expanded = expand_env_placeholders(text, path, env)?;
    let raw: ConfigDocument = serde_yaml::from_str(&expanded)
        .map_err(|e| config_err(format!("invalid config '{}': {e}", path.display())))?;
    resolve_document(raw, env)
}

fn required(value: String, field: &str) -> Result<String> {
    let value = value.trim().to_string();
    if value.is_empty() {
        return Err(config_err(format!("{field} must not be empty")));
    }
    Ok(value)
}

/// Config value, else the named env var, else an error naming both.
fn with_env_fallback(
    value: Option<String>,
    field: &str,
    var: &str,
    env: EnvLookup<'_>,
) -> Result<String> {
    value
        .filter(|v| !v.trim().is_empty())
        .or_else(|| env(var))
        .ok_or_else(|| config_err(format!("{field} is not set and {var} is empty")))
}

fn duration(raw: &str, field: &str) -> Result<Duration> {
    parse_human_duration(raw).map_err(|e| config_err(format!("{field}: {e}")))
}

fn resolve_document(raw: ConfigDocument, env: EnvLookup<'_>) -> Result<ResolvedConfig> {
    let fire_time: FireTime = raw.schedule.at.parse()?;

    let source_dir = expand_tilde(&required(raw.source, "source")?);
    if !source_dir.is_dir() {
        return Err(config_err(format!(
            "source '{}' is not an existing directory",
            source_dir.display()
        )));
    }
    let staging_dir = expand_tilde(&required(raw.staging_dir, "staging_dir")?);
    if absolutize(&staging_dir).starts_with(absolutize(&source_dir)) {
        return Err(config_err(format!(
            "staging_dir '{}' must not be inside source '{}'",
            staging_dir.display(),
            source_dir.display()
        )));
    }

    let filename_prefix = required(raw.filename_prefix, "filename_prefix")?;
    if filename_prefix.contains(['/', '\\']) {
        return Err(config_err("filename_prefix must not contain path separators"));
    }

    let archive = ArchiveSettings {
        tar_binary: required(raw.archive.tar_binary, "archive.tar_binary")?,
        timeout: duration(&raw.archive.timeout, "archive.timeout")?,
    };

    let s = raw.storage;
    let storage = StorageConfig {
        bucket: required(s.bucket, "storage.bucket")?,
        endpoint: required(s.endpoint, "storage.endpoint")?,
        region: required(s.region, "storage.region")?,
        root: s.root.trim().trim_matches('/').to_string(),
        access_key_id: with_env_fallback(s.access_key_id, "storage.access_key_id", ACCESS_KEY_ENV, env)?,
        secret_access_key: with_env_fallback(
            s.secret_access_key,
            "storage.secret_access_key",
            SECRET_KEY_ENV,
            env,
        )?,
        allow_insecure_http: s.allow_insecure_http,
        retry: s.retry,
    };

    let visibility = VisibilityWait {
        initial_delay: duration(&raw.validation.initial_delay, "validation.initial_delay")?,
        max_delay: duration(&raw.validation.max_delay, "validation.max_delay")?,
        timeout: duration(&raw.validation.timeout, "validation.timeout")?,
    };
    if visibility.max_delay < visibility.initial_delay {
        return Err(config_err(
            "validation.max_delay must be at least validation.initial_delay",
        ));
    }

    let n = raw.notify;
    let notify_to = required(n.to, "notify.to")?;
    parse_mailbox(&notify_to).map_err(|e| config_err(format!("notify.to: {e}")))?;
    let username = with_env_fallback(n.username, "notify.username", MAIL_USER_ENV, env)?;
    let password = with_env_fallback(n.password, "notify.password", MAIL_PASSWORD_ENV, env)?;
    let from = n
        .from
        .filter(|f| !f.trim().is_empty())
        .unwrap_or_else(|| username.clone());
    let from = parse_mailbox(&from).map_err(|e| config_err(format!("notify.from: {e}")))?;
    if n.smtp_port == 0 {
        return Err(config_err("notify.smtp_port must be non-zero"));
    }
    let mail = MailSettings {
        relay: required(n.smtp_host, "notify.smtp_host")?,
        port: n.smtp_port,
        username,
        password,
        from,
        timeout: duration(&n.timeout, "notify.timeout")?,
    };

    let job = BackupJob {
        fire_time,
        source_dir,
        staging_dir,
        filename_prefix,
        bucket: storage.bucket.clone(),
        retention_days: raw.retention.days,
        notify_to,
    };

    Ok(ResolvedConfig {
        job,
        archive,
        storage,
        visibility,
        mail,
        keep_local_archive: raw.keep_local_archive,
    })
}

// --- Locating the file ---

/// Where the config file came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    /// `--config` on the command line.
    CliArg(PathBuf),
    /// `STOWAGE_CONFIG`.
    EnvVar(PathBuf),
    /// First existing entry of [`default_config_search_paths`].
    SearchOrder { path: PathBuf, level: &'static str },
}

impl ConfigSource {
    pub fn path(&self) -> &Path {
        match self {
            ConfigSource::CliArg(p) | ConfigSource::EnvVar(p) => p,
            ConfigSource::SearchOrder { path, .. } => path,
        }
    }
}

impl fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigSource::CliArg(p) => write!(f, "{} (--config)", p.display()),
            ConfigSource::EnvVar(p) => write!(f, "{} ({CONFIG_ENV_VAR})", p.display()),
            ConfigSource::SearchOrder { path, level } => write!(f, "{} ({level})", path.display()),
        }
    }
}

/// Search locations, highest priority first: project, user, system.
pub fn default_config_search_paths() -> Vec<(PathBuf, &'static str)> {
    let mut found = vec![(PathBuf::from("stowage.yaml"), "project")];
    if let Some(dir) = paths::config_dir() {
        found.push((dir.join("stowage").join("config.yaml"), "user"));
    }

    #[cfg(windows)]
    {
        let program_data = std::env::var_os("PROGRAMDATA")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(r"C:\ProgramData"));
        found.push((program_data.join("stowage").join("config.yaml"), "system"));
    }

    #[cfg(not(windows))]
    found.push((PathBuf::from("/etc/stowage/config.yaml"), "system"));

    found
}

/// `--config`, then `STOWAGE_CONFIG`, then the first search path that exists.
pub fn resolve_config_path(cli_config: Option<&str>) -> Option<ConfigSource> {
    resolve_config_path_with(cli_config, &process_env)
}

fn resolve_config_path_with(cli_config: Option<&str>, env: EnvLookup<'_>) -> Option<ConfigSource> {
    if let Some(path) = cli_config {
        return Some(ConfigSource::CliArg(PathBuf::from(path)));
    }
    if let Some(path) = env(CONFIG_ENV_VAR) {
        return Some(ConfigSource::EnvVar(PathBuf::from(path)));
    }
    default_config_search_paths()
        .into_iter()
        .find(|(path, _)| path.exists())
        .map(|(path, level)| ConfigSource::SearchOrder { path, level })
}

/// Starter file written by `stowage config`.
pub fn minimal_config_template() -> &'static str {
    r#"# stowage configuration file

schedule:
  at: "17:12"            # local time, HH:MM (quote it)

source: /path/to/source
staging_dir: /tmp
filename_prefix: backup

storage:
  bucket: my-backups
  endpoint: https://s3.us-east-1.amazonaws.com
  region: us-east-1
  access_key_id: "${AWS_ACCESS_KEY_ID:-}"
  secret_access_key: "${AWS_SECRET_ACCESS_KEY:-}"

retention:
  days: 7

notify:
  to: ops@example.com
  username: "${EMAIL_ADDRESS:-}"
  password: "${EMAIL_PASSWORD:-}"

# --- Optional settings (defaults shown) ---

# keep_local_archive: true
#
# archive:
#   tar_binary: tar
#   timeout: "1h"
#
# storage:
#   root: ""
#   allow_insecure_http: false
#   retry:
#     max_retries: 3
#     retry_delay_ms: 1000
#     retry_max_delay_ms: 60000
#
# validation:
#   initial_delay: "5s"
#   max_delay: "30s"
#   timeout: "5m"
#
# notify:
#   from: "Backups <ops@example.com>"
#   smtp_host: smtp.gmail.com
#   smtp_port: 465
#   timeout: "60s"
"#
}
