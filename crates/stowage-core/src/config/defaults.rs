use std::time::Duration;

use crate::error::{Result, StowageError};

pub(super) fn default_filename_prefix() -> String {
    "backup".to_string()
}

pub(super) fn default_keep_local_archive() -> bool {
    true
}

pub(super) fn default_tar_binary() -> String {
    "tar".to_string()
}

pub(super) fn default_archive_timeout() -> String {
    "1h".to_string()
}

pub(super) fn default_region() -> String {
    "us-east-1".to_string()
}

pub(super) fn default_initial_delay() -> String {
    "5s".to_string()
}

pub(super) fn default_max_delay() -> String {
    "30s".to_string()
}

pub(super) fn default_visibility_timeout() -> String {
    "5m".to_string()
}

pub(super) fn default_smtp_host() -> String {
    "smtp.gmail.com".to_string()
}

pub(super) fn default_smtp_port() -> u16 {
    465
}

pub(super) fn default_smtp_timeout() -> String {
    "60s".to_string()
}

const MAX_DURATION_SECS: u64 = 365 * 24 * 60 * 60;

/// Parse a simple duration string like "30s", "5m", "4h", or "2d".
/// A bare number is seconds.
pub fn parse_human_duration(raw: &str) -> Result<Duration> {
    let input = raw.trim();
    if input.is_empty() {
        return Err(StowageError::Config("duration must not be empty".into()));
    }

    let (num_part, unit) = match input.chars().last() {
        Some(c) if c.is_ascii_alphabetic() => (&input[..input.len() - 1], Some(c)),
        _ => (input, None),
    };

    let value: u64 = num_part
        .trim()
        .parse()
        .map_err(|_| StowageError::Config(format!("invalid duration value: '{raw}'")))?;

    let multiplier: u64 = match unit {
        None | Some('s') | Some('S') => 1,
        Some('m') | Some('M') => 60,
        Some('h') | Some('H') => 60 * 60,
        Some('d') | Some('D') => 60 * 60 * 24,
        Some(other) => {
            return Err(StowageError::Config(format!(
                "unsupported duration suffix '{other}' in '{raw}' (use s/m/h/d)"
            )));
        }
    };

    let secs = value
        .checked_mul(multiplier)
        .filter(|secs| *secs <= MAX_DURATION_SECS)
        .ok_or_else(|| {
            StowageError::Config(format!("duration '{raw}' is longer than the 365d maximum"))
        })?;

    if secs == 0 {
        return Err(StowageError::Config(
            "duration must be greater than zero".into(),
        ));
    }

    Ok(Duration::from_secs(secs))
}
