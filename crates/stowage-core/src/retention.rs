use chrono::{DateTime, Utc};
use stowage_storage::{DeleteError, DeleteReport, ListError, ObjectStore, RemoteObject};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum PurgeError {
    #[error("could not list existing backups: {0}")]
    List(#[from] ListError),

    #[error("could not delete expired backups: {0}")]
    Delete(#[from] DeleteError),
}

/// What one purge pass saw and did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PurgeSummary {
    /// Objects in the listing snapshot.
    pub listed: usize,
    /// Keys selected for deletion.
    pub expired: Vec<String>,
    pub report: DeleteReport,
}

impl PurgeSummary {
    pub fn describe(&self) -> String {
        if self.expired.is_empty() {
            return format!("nothing to purge ({} object(s) within retention)", self.listed);
        }
        let mut text = format!(
            "deleted {} of {} expired object(s)",
            self.report.deleted.len(),
            self.expired.len()
        );
        for (key, reason) in &self.report.failed {
            text.push_str(&format!("; could not delete {key}: {reason}"));
        }
        text
    }
}

/// True when the object is strictly older than `retention_days` whole days.
pub fn is_expired(object: &RemoteObject, retention_days: u32, now: DateTime<Utc>) -> bool {
    now.signed_duration_since(object.last_modified) > chrono::Duration::days(i64::from(retention_days))
}

/// Keys of every expired object in `objects`, in listing order.
pub fn select_expired(objects: &[RemoteObject], retention_days: u32, now: DateTime<Utc>) -> Vec<String> {
    objects
        .iter()
        .filter(|o| is_expired(o, retention_days, now))
        .map(|o| o.key.clone())
        .collect()
}

/// Delete expired objects from a listing snapshot. Issues no store call when
/// nothing is expired.
pub fn purge(
    store: &dyn ObjectStore,
    all_objects: &[RemoteObject],
    retention_days: u32,
    now: DateTime<Utc>,
) -> Result<PurgeSummary, DeleteError> {
    let expired = select_expired(all_objects, retention_days, now);
    if expired.is_empty() {
        info!(listed = all_objects.len(), "nothing to purge");
        return Ok(PurgeSummary {
            listed: all_objects.len(),
            ..PurgeSummary::default()
        });
    }

    info!(count = expired.len(), retention_days, "purging expired backups");
    let report = store.delete_many(&expired)?;
    for key in &report.deleted {
        info!(key = %key, "purged");
    }
    for (key, reason) in &report.failed {
        warn!(key = %key, reason = %reason, "purge failed for key");
    }

    Ok(PurgeSummary {
        listed: all_objects.len(),
        expired,
        report,
    })
}

/// Takes one listing snapshot of the whole store and purges from it.
pub struct RetentionPurger<'a> {
    store: &'a dyn ObjectStore,
    retention_days: u32,
}

impl<'a> RetentionPurger<'a> {
    pub fn new(store: &'a dyn ObjectStore, retention_days: u32) -> Self {
        Self {
            store,
            retention_days,
        }
    }

    pub fn run(&self, now: DateTime<Utc>) -> Result<PurgeSummary, PurgeError> {
        let snapshot = self.store.list("")?;
        Ok(purge(self.store, &snapshot, self.retention_days, now)?)
    }
}
