use std::path::Path;
use std::time::Duration;

use stowage_storage::ObjectStore;
use tracing::{info, warn};

use crate::archiver::ArchiveArtifact;
use crate::clock::Clock;

/// Bounded poll-until-visible settings used after a successful upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VisibilityWait {
    /// Pause before the first probe.
    pub initial_delay: Duration,
    /// Backoff cap between probes.
    pub max_delay: Duration,
    /// Give up (ConsistencyTimeout) once this much time has been spent waiting.
    pub timeout: Duration,
}

impl Default for VisibilityWait {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(30),
            timeout: Duration::from_secs(300),
        }
    }
}

/// Outcome of comparing the local archive with its remote copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Validation {
    Verified { size: u64 },
    SizeMismatch { local: u64, remote: u64 },
    /// The first object under the key prefix is a different key.
    KeyMismatch { expected: String, found: String },
    NotFound,
    /// Upload succeeded but the object never became visible in time.
    ConsistencyTimeout { waited: Duration },
    ListFailed(String),
    LocalUnreadable(String),
}

impl Validation {
    pub fn is_valid(&self) -> bool {
        matches!(self, Validation::Verified { .. })
    }

    pub fn describe(&self) -> String {
        match self {
            Validation::Verified { size } => format!("remote copy verified ({size} bytes)"),
            Validation::SizeMismatch { local, remote } => {
                format!("size mismatch: local {local} bytes, remote {remote} bytes")
            }
            Validation::KeyMismatch { expected, found } => {
                format!("expected key '{expected}' but store returned '{found}'")
            }
            Validation::NotFound => "no matching object in store".to_string(),
            Validation::ConsistencyTimeout { waited } => format!(
                "upload reported success but object was not visible after {}s",
                waited.as_secs()
            ),
            Validation::ListFailed(e) => format!("could not list store: {e}"),
            Validation::LocalUnreadable(e) => format!("cannot stat local archive: {e}"),
        }
    }

    fn is_retryable(&self) -> bool {
        matches!(
            self,
            Validation::NotFound | Validation::KeyMismatch { .. } | Validation::ListFailed(_)
        )
    }
}

pub struct Validator<'a> {
    store: &'a dyn ObjectStore,
    clock: &'a dyn Clock,
    wait: VisibilityWait,
}

impl<'a> Validator<'a> {
    pub fn new(store: &'a dyn ObjectStore, clock: &'a dyn Clock, wait: VisibilityWait) -> Self {
        Self { store, clock, wait }
    }

    /// Single probe: true only if the first object under `key` is exactly
    /// `key` and matches the on-disk size. Never errors.
    pub fn validate(&self, artifact: &ArchiveArtifact, key: &str) -> bool {
        self.check(&artifact.local_path, key).is_valid()
    }

    /// Single probe with the reason attached.
    pub fn check(&self, local_path: &Path, key: &str) -> Validation {
        let listing = match self.store.list(key) {
            Ok(objects) => objects,
            Err(e) => return Validation::ListFailed(e.to_string()),
        };
        let Some(remote) = listing.into_iter().next() else {
            return Validation::NotFound;
        };
        if remote.key != key {
            return Validation::KeyMismatch {
                expected: key.to_string(),
                found: remote.key,
            };
        }

        // Re-stat: the cached artifact size may predate a late write.
        let local = match std::fs::metadata(local_path) {
            Ok(m) => m.len(),
            Err(e) => {
                return Validation::LocalUnreadable(format!("{}: {e}", local_path.display()))
            }
        };
        if local != remote.size_bytes {
            return Validation::SizeMismatch {
                local,
                remote: remote.size_bytes,
            };
        }
        Validation::Verified { size: local }
    }

    /// Probe with exponential backoff until the object is visible, a
    /// definitive answer comes back, or the wait budget is spent.
    pub fn await_and_check(&self, local_path: &Path, key: &str) -> Validation {
        let mut delay = self.wait.initial_delay;
        let mut waited = Duration::ZERO;

        loop {
            self.clock.sleep(delay);
            waited = waited.saturating_add(delay);

            let result = self.check(local_path, key);
            if !result.is_retryable() {
                return result;
            }
            if waited >= self.wait.timeout {
                warn!(key, waited = ?waited, last = %result.describe(), "object not visible before timeout");
                return match result {
                    // A neighbouring key under the same prefix hides the missing one.
                    Validation::NotFound | Validation::KeyMismatch { .. } => {
                        Validation::ConsistencyTimeout { waited }
                    }
                    other => other,
                };
            }

            let remaining = self.wait.timeout - waited;
            delay = delay.saturating_mul(2).min(self.wait.max_delay).min(remaining);
            if delay.is_zero() {
                delay = remaining;
            }
            info!(key, reason = %result.describe(), next_probe_in = ?delay, "uploaded object not visible yet");
        }
    }
}
