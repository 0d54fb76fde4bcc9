use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, FixedOffset, TimeZone, Utc};
use stowage_storage::{DeleteError, DeleteReport, ListError, ObjectStore, RemoteObject, UploadError};

use crate::archiver::{ArchiveArtifact, Archiver};
use crate::clock::Clock;
use crate::error::{ArchiveError, NotifyError};
use crate::job::{BackupJob, FireTime};
use crate::notify::{Mailer, Notifier};
use crate::pipeline::{Pipeline, PipelineOptions};
use crate::validate::VisibilityWait;

pub fn local(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<FixedOffset> {
    FixedOffset::east_opt(0)
        .unwrap()
        .with_ymd_and_hms(y, mo, d, h, mi, s)
        .unwrap()
}

pub fn test_job(staging: &Path) -> BackupJob {
    BackupJob {
        fire_time: FireTime::new(17, 12).unwrap(),
        source_dir: staging.join("source-unused"),
        staging_dir: staging.to_path_buf(),
        filename_prefix: "backup".into(),
        bucket: "test-bucket".into(),
        retention_days: 7,
        notify_to: "ops@example.com".into(),
    }
}

#[derive(Default)]
struct StoreState {
    objects: BTreeMap<String, RemoteObject>,
    /// Key -> number of further listings it stays invisible for.
    invisible: HashMap<String, usize>,
    hide_new_uploads: usize,
    undeletable: HashSet<String>,
    fail_upload: Option<String>,
    fail_next_lists: usize,
    upload_time: Option<DateTime<Utc>>,
    list_calls: usize,
    delete_calls: usize,
    uploads: Vec<String>,
}

/// In-memory object store. Clones share state so a test can keep a handle
/// after boxing one into the pipeline.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<StoreState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, key: &str, size_bytes: u64, last_modified: DateTime<Utc>) {
        self.state.lock().unwrap().objects.insert(
            key.to_string(),
            RemoteObject {
                key: key.to_string(),
                size_bytes,
                last_modified,
            },
        );
    }

    pub fn keys(&self) -> Vec<String> {
        self.state.lock().unwrap().objects.keys().cloned().collect()
    }

    pub fn delete_calls(&self) -> usize {
        self.state.lock().unwrap().delete_calls
    }

    pub fn list_calls(&self) -> usize {
        self.state.lock().unwrap().list_calls
    }

    pub fn uploads(&self) -> Vec<String> {
        self.state.lock().unwrap().uploads.clone()
    }

    pub fn fail_uploads(&self, message: &str) {
        self.state.lock().unwrap().fail_upload = Some(message.to_string());
    }

    pub fn fail_next_lists(&self, count: usize) {
        self.state.lock().unwrap().fail_next_lists = count;
    }

    /// Newly uploaded objects are left out of the next `listings` listings.
    pub fn hide_uploads_for(&self, listings: usize) {
        self.state.lock().unwrap().hide_new_uploads = listings;
    }

    pub fn refuse_delete(&self, key: &str) {
        self.state.lock().unwrap().undeletable.insert(key.to_string());
    }

    pub fn set_upload_time(&self, at: DateTime<Utc>) {
        self.state.lock().unwrap().upload_time = Some(at);
    }
}

impl ObjectStore for MemoryStore {
    fn upload(&self, local_path: &Path, key: &str) -> Result<(), UploadError> {
        let mut state = self.state.lock().unwrap();
        if let Some(message) = &state.fail_upload {
            return Err(UploadError::Request {
                key: key.to_string(),
                message: message.clone(),
            });
        }
        let size_bytes = std::fs::metadata(local_path)
            .map_err(|source| UploadError::LocalFile {
                path: local_path.to_path_buf(),
                source,
            })?
            .len();
        let last_modified = state.upload_time.unwrap_or_else(Utc::now);
        state.objects.insert(
            key.to_string(),
            RemoteObject {
                key: key.to_string(),
                size_bytes,
                last_modified,
            },
        );
        if state.hide_new_uploads > 0 {
            let hidden = state.hide_new_uploads;
            state.invisible.insert(key.to_string(), hidden);
        }
        state.uploads.push(key.to_string());
        Ok(())
    }

    fn list(&self, prefix: &str) -> Result<Vec<RemoteObject>, ListError> {
        let mut guard = self.state.lock().unwrap();
        let state = &mut *guard;
        state.list_calls += 1;
        if state.fail_next_lists > 0 {
            state.fail_next_lists -= 1;
            return Err(ListError::Request {
                prefix: prefix.to_string(),
                message: "503 Slow Down".into(),
            });
        }

        let mut visible = Vec::new();
        for (key, object) in state
            .objects
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
        {
            match state.invisible.get_mut(key) {
                Some(remaining) if *remaining > 0 => *remaining -= 1,
                _ => visible.push(object.clone()),
            }
        }
        Ok(visible)
    }

    fn delete_many(&self, keys: &[String]) -> Result<DeleteReport, DeleteError> {
        let mut state = self.state.lock().unwrap();
        state.delete_calls += 1;
        let mut report = DeleteReport::default();
        for key in keys {
            if state.undeletable.contains(key) {
                report.failed.push((key.clone(), "AccessDenied".into()));
            } else if state.objects.remove(key).is_some() {
                report.deleted.push(key.clone());
            } else {
                report.failed.push((key.clone(), "NoSuchKey".into()));
            }
        }
        Ok(report)
    }

    fn describe(&self) -> String {
        "memory://test-bucket".into()
    }
}

/// Simulated clock. `sleep` advances time instantly; an optional stop
/// instant raises a shutdown flag once reached.
pub struct FakeClock {
    now: Mutex<DateTime<FixedOffset>>,
    slept: Mutex<Duration>,
    stop: Option<(DateTime<FixedOffset>, Arc<AtomicBool>)>,
}

impl FakeClock {
    pub fn at(now: DateTime<FixedOffset>) -> Self {
        Self {
            now: Mutex::new(now),
            slept: Mutex::new(Duration::ZERO),
            stop: None,
        }
    }

    pub fn stopping_at(now: DateTime<FixedOffset>, stop_at: DateTime<FixedOffset>, flag: Arc<AtomicBool>) -> Self {
        Self {
            stop: Some((stop_at, flag)),
            ..Self::at(now)
        }
    }

    pub fn set(&self, now: DateTime<FixedOffset>) {
        *self.now.lock().unwrap() = now;
    }

    pub fn total_slept(&self) -> Duration {
        *self.slept.lock().unwrap()
    }
}

impl Clock for FakeClock {
    fn now(&self) -> DateTime<FixedOffset> {
        *self.now.lock().unwrap()
    }

    fn sleep(&self, duration: Duration) {
        let mut now = self.now.lock().unwrap();
        *now += chrono::Duration::from_std(duration).unwrap();
        *self.slept.lock().unwrap() += duration;
        if let Some((stop_at, flag)) = &self.stop {
            if *now >= *stop_at {
                flag.store(true, Ordering::SeqCst);
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMail {
    pub to: String,
    pub subject: String,
    pub body: String,
}

#[derive(Clone, Default)]
pub struct RecordingMailer {
    sent: Arc<Mutex<Vec<SentMail>>>,
    fail: bool,
}

impl RecordingMailer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn sent(&self) -> Vec<SentMail> {
        self.sent.lock().unwrap().clone()
    }
}

impl Mailer for RecordingMailer {
    fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), NotifyError> {
        self.sent.lock().unwrap().push(SentMail {
            to: to.into(),
            subject: subject.into(),
            body: body.into(),
        });
        if self.fail {
            return Err(NotifyError::Transport("535 authentication failed".into()));
        }
        Ok(())
    }
}

/// Writes a fixed-size file instead of running `tar`.
#[derive(Clone)]
pub struct FakeArchiver {
    size: usize,
    fail: bool,
    calls: Arc<Mutex<usize>>,
}

impl FakeArchiver {
    pub fn with_size(size: usize) -> Self {
        Self {
            size,
            fail: false,
            calls: Arc::default(),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::with_size(0)
        }
    }

    pub fn calls(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

impl Archiver for FakeArchiver {
    fn create(&self, _source: &Path, staging_dir: &Path, filename: &str) -> Result<ArchiveArtifact, ArchiveError> {
        *self.calls.lock().unwrap() += 1;
        if self.fail {
            return Err(ArchiveError::Exit {
                code: "2".into(),
                stderr: "tar: source: Cannot open: Permission denied".into(),
            });
        }
        let local_path = staging_dir.join(filename);
        std::fs::write(&local_path, vec![0u8; self.size]).map_err(|source| ArchiveError::Output {
            path: local_path.clone(),
            source,
        })?;
        Ok(ArchiveArtifact {
            filename: filename.to_string(),
            local_path,
            size_bytes: self.size as u64,
        })
    }
}

/// Fakes wired into a pipeline over a temporary staging directory.
pub struct Harness {
    pub store: MemoryStore,
    pub mailer: RecordingMailer,
    pub archiver: FakeArchiver,
    pub clock: Arc<FakeClock>,
    pub staging: tempfile::TempDir,
    pub options: PipelineOptions,
}

impl Harness {
    pub fn new(now: DateTime<FixedOffset>) -> Self {
        Self::with_clock(FakeClock::at(now))
    }

    pub fn with_clock(clock: FakeClock) -> Self {
        Self {
            store: MemoryStore::new(),
            mailer: RecordingMailer::new(),
            archiver: FakeArchiver::with_size(1000),
            clock: Arc::new(clock),
            staging: tempfile::tempdir().unwrap(),
            options: PipelineOptions {
                visibility: VisibilityWait::default(),
                keep_local_archive: true,
                host: "testhost".into(),
            },
        }
    }

    pub fn job(&self) -> BackupJob {
        test_job(self.staging.path())
    }

    pub fn pipeline(&self) -> Pipeline {
        Pipeline::new(
            self.job(),
            Box::new(self.archiver.clone()),
            Box::new(self.store.clone()),
            Notifier::new(Box::new(self.mailer.clone())),
            self.clock.clone(),
            self.options.clone(),
        )
    }
}
