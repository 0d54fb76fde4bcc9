#![cfg(unix)]

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, FixedOffset, Utc};
use stowage_core::archiver::{ArchiveSettings, TarArchiver};
use stowage_core::clock::{Clock, SystemClock};
use stowage_core::error::NotifyError;
use stowage_core::job::{BackupJob, FireTime};
use stowage_core::notify::{Mailer, Notifier, RunStatus};
use stowage_core::pipeline::{Pipeline, PipelineOptions, Stage};
use stowage_core::validate::VisibilityWait;
use stowage_storage::{DeleteError, DeleteReport, ListError, ObjectStore, RemoteObject, UploadError};

/// Bucket emulated by a local directory; mtime stands in for last-modified.
struct DirStore {
    root: PathBuf,
}

impl ObjectStore for DirStore {
    fn upload(&self, local_path: &Path, key: &str) -> Result<(), UploadError> {
        std::fs::copy(local_path, self.root.join(key)).map_err(|source| UploadError::LocalFile {
            path: local_path.to_path_buf(),
            source,
        })?;
        Ok(())
    }

    fn list(&self, prefix: &str) -> Result<Vec<RemoteObject>, ListError> {
        let err = |e: std::io::Error| ListError::Request {
            prefix: prefix.to_string(),
            message: e.to_string(),
        };
        let mut out = Vec::new();
        for entry in std::fs::read_dir(&self.root).map_err(err)? {
            let entry = entry.map_err(err)?;
            let key = entry.file_name().to_string_lossy().to_string();
            if !key.starts_with(prefix) {
                continue;
            }
            let meta = entry.metadata().map_err(err)?;
            out.push(RemoteObject {
                key,
                size_bytes: meta.len(),
                last_modified: DateTime::<Utc>::from(meta.modified().map_err(err)?),
            });
        }
        out.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(out)
    }

    fn delete_many(&self, keys: &[String]) -> Result<DeleteReport, DeleteError> {
        let mut report = DeleteReport::default();
        for key in keys {
            match std::fs::remove_file(self.root.join(key)) {
                Ok(()) => report.deleted.push(key.clone()),
                Err(e) => report.failed.push((key.clone(), e.to_string())),
            }
        }
        Ok(report)
    }

    fn describe(&self) -> String {
        format!("file://{}", self.root.display())
    }
}

#[derive(Clone, Default)]
struct Outbox(Arc<Mutex<Vec<String>>>);

impl Mailer for Outbox {
    fn send(&self, _to: &str, subject: &str, _body: &str) -> Result<(), NotifyError> {
        self.0.lock().unwrap().push(subject.to_string());
        Ok(())
    }
}

struct Fixture {
    _tmp: tempfile::TempDir,
    source: PathBuf,
    staging: PathBuf,
    bucket: PathBuf,
}

impl Fixture {
    fn new() -> Self {
        let tmp = tempfile::tempdir().unwrap();
        let source = tmp.path().join("source");
        let staging = tmp.path().join("staging");
        let bucket = tmp.path().join("bucket");
        std::fs::create_dir_all(source.join("nested")).unwrap();
        std::fs::create_dir_all(&bucket).unwrap();
        std::fs::write(source.join("a.txt"), "alpha\n".repeat(500)).unwrap();
        std::fs::write(source.join("nested/b.bin"), vec![42u8; 4096]).unwrap();
        Self {
            _tmp: tmp,
            source,
            staging,
            bucket,
        }
    }

    fn pipeline(&self, tar_binary: &str, outbox: &Outbox) -> Pipeline {
        let job = BackupJob {
            fire_time: FireTime::new(17, 12).unwrap(),
            source_dir: self.source.clone(),
            staging_dir: self.staging.clone(),
            filename_prefix: "backup".into(),
            bucket: "local".into(),
            retention_days: 7,
            notify_to: "ops@example.com".into(),
        };
        let archiver = TarArchiver::new(ArchiveSettings {
            tar_binary: tar_binary.into(),
            timeout: Duration::from_secs(60),
        });
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let options = PipelineOptions {
            visibility: VisibilityWait {
                initial_delay: Duration::from_millis(10),
                max_delay: Duration::from_millis(20),
                timeout: Duration::from_millis(100),
            },
            keep_local_archive: true,
            host: "ci".into(),
        };
        Pipeline::new(
            job,
            Box::new(archiver),
            Box::new(DirStore {
                root: self.bucket.clone(),
            }),
            Notifier::new(Box::new(outbox.clone())),
            clock,
            options,
        )
    }
}

fn fire_instant() -> DateTime<FixedOffset> {
    Utc::now().fixed_offset()
}

#[test]
fn real_tar_archive_round_trips_through_store() {
    let fx = Fixture::new();
    let outbox = Outbox::default();
    let pipeline = fx.pipeline("tar", &outbox);

    let outcome = pipeline.fire(fire_instant());

    assert_eq!(outcome.status(), RunStatus::Succeeded, "{outcome:#?}");
    let staged = fx.staging.join(&outcome.filename);
    let remote = fx.bucket.join(&outcome.filename);
    assert!(staged.is_file());
    assert_eq!(
        std::fs::metadata(&staged).unwrap().len(),
        std::fs::metadata(&remote).unwrap().len()
    );

    let listing = std::process::Command::new("tar")
        .arg("-tzf")
        .arg(&remote)
        .output()
        .unwrap();
    let names = String::from_utf8_lossy(&listing.stdout);
    assert!(names.contains("a.txt"));
    assert!(names.contains("nested/b.bin"));

    let subjects = outbox.0.lock().unwrap().clone();
    assert_eq!(subjects.len(), 1);
    assert!(subjects[0].contains("Succeeded"));
}

#[test]
fn missing_tar_binary_fails_archive_and_upload() {
    let fx = Fixture::new();
    let outbox = Outbox::default();
    let pipeline = fx.pipeline("/nonexistent/bin/tar", &outbox);

    let outcome = pipeline.fire(fire_instant());

    let failed: Vec<Stage> = outcome.failed_stages().map(|s| s.stage).collect();
    assert_eq!(failed, vec![Stage::Archive, Stage::Upload, Stage::Validate]);
    assert!(std::fs::read_dir(&fx.bucket).unwrap().next().is_none());

    let subjects = outbox.0.lock().unwrap().clone();
    assert_eq!(subjects.len(), 1);
    assert!(subjects[0].contains("Failed"));
}

#[test]
fn tar_warning_exit_still_uploads_the_archive() {
    use std::os::unix::fs::PermissionsExt;

    let fx = Fixture::new();
    let wrapper = fx._tmp.path().join("tar-with-warning");
    std::fs::write(
        &wrapper,
        "#!/bin/sh\ntar \"$@\" || exit 2\necho 'tar: .: file changed as we read it' >&2\nexit 1\n",
    )
    .unwrap();
    std::fs::set_permissions(&wrapper, std::fs::Permissions::from_mode(0o755)).unwrap();
    let outbox = Outbox::default();

    let outcome = fx
        .pipeline(&wrapper.to_string_lossy(), &outbox)
        .fire(fire_instant());

    let failed: Vec<Stage> = outcome.failed_stages().map(|s| s.stage).collect();
    assert_eq!(failed, vec![Stage::Archive]);
    assert!(fx.staging.join(&outcome.filename).is_file());
    assert!(fx.bucket.join(&outcome.filename).is_file());
    assert!(outcome.validation.is_valid(), "{:?}", outcome.validation);

    let subjects = outbox.0.lock().unwrap().clone();
    assert_eq!(subjects.len(), 1);
    assert!(subjects[0].contains("Failed (archive)"), "{}", subjects[0]);
}

#[test]
fn fresh_bucket_entries_survive_purge() {
    let fx = Fixture::new();
    std::fs::write(fx.bucket.join("backup-20240101-000000.tar.gz"), b"old").unwrap();
    let outbox = Outbox::default();

    let outcome = fx.pipeline("tar", &outbox).fire(fire_instant());

    // Written just now, so inside the 7-day window.
    assert_eq!(outcome.status(), RunStatus::Succeeded);
    assert!(fx.bucket.join("backup-20240101-000000.tar.gz").exists());
}
