use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, FixedOffset, Timelike};

use crate::error::StowageError;

/// Daily wall-clock fire time with minute resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FireTime {
    hour: u32,
    minute: u32,
}

impl FireTime {
    pub fn new(hour: u32, minute: u32) -> Option<Self> {
        (hour < 24 && minute < 60).then_some(Self { hour, minute })
    }

    pub fn hour(&self) -> u32 {
        self.hour
    }

    pub fn minute(&self) -> u32 {
        self.minute
    }

    /// True when `t` falls anywhere inside the fire minute.
    pub fn matches<T: Timelike>(&self, t: &T) -> bool {
        t.hour() == self.hour && t.minute() == self.minute
    }
}

impl FromStr for FireTime {
    type Err = StowageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || StowageError::Config(format!("invalid fire time '{s}': expected HH:MM"));
        let (h, m) = s.trim().split_once(':').ok_or_else(invalid)?;
        let all_digits = |p: &str| !p.is_empty() && p.len() <= 2 && p.bytes().all(|b| b.is_ascii_digit());
        if !all_digits(h) || m.len() != 2 || !all_digits(m) {
            return Err(invalid());
        }
        let hour = h.parse().map_err(|_| invalid())?;
        let minute = m.parse().map_err(|_| invalid())?;
        FireTime::new(hour, minute).ok_or_else(|| {
            StowageError::Config(format!(
                "invalid fire time '{s}': hour must be 0-23 and minute 0-59"
            ))
        })
    }
}

impl fmt::Display for FireTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

/// The one job this process runs. Built once at startup and never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupJob {
    pub fire_time: FireTime,
    pub source_dir: PathBuf,
    pub staging_dir: PathBuf,
    pub filename_prefix: String,
    pub bucket: String,
    pub retention_days: u32,
    pub notify_to: String,
}

impl BackupJob {
    /// `<prefix>-YYYYMMDD-HHMMSS.tar.gz`, stamped with the local fire instant.
    pub fn archive_filename(&self, at: &DateTime<FixedOffset>) -> String {
        format!(
            "{}-{}.tar.gz",
            self.filename_prefix,
            at.format("%Y%m%d-%H%M%S")
        )
    }
}
