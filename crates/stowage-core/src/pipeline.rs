use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, FixedOffset, Utc};
use stowage_storage::ObjectStore;
use tracing::{error, info, warn};

use crate::archiver::Archiver;
use crate::clock::Clock;
use crate::job::BackupJob;
use crate::notify::{Notifier, RunStatus};
use crate::retention::RetentionPurger;
use crate::validate::{Validation, Validator, VisibilityWait};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Archive,
    Purge,
    Upload,
    Validate,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Archive => "archive",
            Stage::Purge => "purge",
            Stage::Upload => "upload",
            Stage::Validate => "validate",
        }
    }

    /// Phrase used in the notification when this stage fails.
    pub fn failure_phrase(self) -> &'static str {
        match self {
            Stage::Archive => "archive creation failed",
            Stage::Purge => "purge failed",
            Stage::Upload => "upload failed",
            Stage::Validate => "validation failed",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageOutcome {
    pub stage: Stage,
    pub succeeded: bool,
    pub detail: String,
}

impl StageOutcome {
    fn ok(stage: Stage, detail: impl Into<String>) -> Self {
        Self {
            stage,
            succeeded: true,
            detail: detail.into(),
        }
    }

    fn failed(stage: Stage, detail: impl Into<String>) -> Self {
        let detail = detail.into();
        error!(stage = %stage, error = %detail, "{}", stage.failure_phrase());
        Self {
            stage,
            succeeded: false,
            detail,
        }
    }
}

/// Everything one fire did, in stage order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineOutcome {
    pub filename: String,
    pub destination: String,
    pub started_at: DateTime<FixedOffset>,
    pub finished_at: DateTime<FixedOffset>,
    pub stages: Vec<StageOutcome>,
    /// Validation result kept whole so the message can tell "not visible
    /// yet" apart from a real mismatch.
    pub validation: Validation,
}

impl PipelineOutcome {
    pub fn status(&self) -> RunStatus {
        if self.stages.iter().all(|s| s.succeeded) {
            RunStatus::Succeeded
        } else {
            RunStatus::Failed
        }
    }

    pub fn failed_stages(&self) -> impl Iterator<Item = &StageOutcome> {
        self.stages.iter().filter(|s| !s.succeeded)
    }

    pub fn subject(&self) -> String {
        match self.status() {
            RunStatus::Succeeded => format!("Backup Succeeded: {}", self.filename),
            RunStatus::Failed => {
                let names: Vec<&str> = self.failed_stages().map(|s| s.stage.as_str()).collect();
                format!("Backup Failed ({}): {}", names.join(", "), self.filename)
            }
        }
    }

    pub fn body(&self, host: &str) -> String {
        let mut body = format!(
            "Backup {} on {host}: {}\nDestination: {}\n",
            self.filename,
            self.status(),
            self.destination
        );

        if self.status() == RunStatus::Failed {
            body.push_str("\nFailures:\n");
            for stage in self.failed_stages() {
                body.push_str(&format!(
                    "  - {}: {}\n",
                    stage.stage.failure_phrase(),
                    stage.detail
                ));
            }
            let upload_ok = self
                .stages
                .iter()
                .any(|s| s.stage == Stage::Upload && s.succeeded);
            if upload_ok && matches!(self.validation, Validation::ConsistencyTimeout { .. }) {
                body.push_str(
                    "\nThe upload itself completed; the copy may still appear once the \
                     store catches up. Check the bucket before re-running.\n",
                );
            }
        }

        body.push_str("\nStages:\n");
        for stage in &self.stages {
            body.push_str(&format!(
                "  {:<9} {:<6} {}\n",
                stage.stage.as_str(),
                if stage.succeeded { "ok" } else { "FAILED" },
                stage.detail
            ));
        }

        body.push_str(&format!(
            "\nStarted:  {}\nFinished: {}\n",
            self.started_at.format("%Y-%m-%d %H:%M:%S %:z"),
            self.finished_at.format("%Y-%m-%d %H:%M:%S %:z")
        ));
        body
    }
}

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub visibility: VisibilityWait,
    pub keep_local_archive: bool,
    /// Host name reported in notifications.
    pub host: String,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            visibility: VisibilityWait::default(),
            keep_local_archive: true,
            host: crate::platform::hostname(),
        }
    }
}

/// Archive → purge → upload → validate → notify, with every stage isolated.
pub struct Pipeline {
    job: BackupJob,
    archiver: Box<dyn Archiver>,
    store: Box<dyn ObjectStore>,
    notifier: Notifier,
    clock: Arc<dyn Clock>,
    options: PipelineOptions,
}

impl Pipeline {
    pub fn new(
        job: BackupJob,
        archiver: Box<dyn Archiver>,
        store: Box<dyn ObjectStore>,
        notifier: Notifier,
        clock: Arc<dyn Clock>,
        options: PipelineOptions,
    ) -> Self {
        Self {
            job,
            archiver,
            store,
            notifier,
            clock,
            options,
        }
    }

    pub fn job(&self) -> &BackupJob {
        &self.job
    }

    pub fn store(&self) -> &dyn ObjectStore {
        self.store.as_ref()
    }

    /// Run one fire stamped with `now`. Always sends exactly one
    /// notification and never returns an error.
    pub fn fire(&self, now: DateTime<FixedOffset>) -> PipelineOutcome {
        let job = &self.job;
        let filename = job.archive_filename(&now);
        let local_path = job.staging_dir.join(&filename);
        info!(filename = %filename, destination = %self.store.describe(), "backup fire starting");

        let mut stages = Vec::with_capacity(4);

        // Fail-forward: later stages run even without an archive and the
        // validator reports the gap.
        match self
            .archiver
            .create(&job.source_dir, &job.staging_dir, &filename)
        {
            Ok(artifact) => stages.push(StageOutcome::ok(
                Stage::Archive,
                format!("created {} ({} bytes)", artifact.filename, artifact.size_bytes),
            )),
            Err(e) => stages.push(StageOutcome::failed(Stage::Archive, e.to_string())),
        }

        let purger = RetentionPurger::new(self.store.as_ref(), job.retention_days);
        match purger.run(now.with_timezone(&Utc)) {
            Ok(summary) if summary.report.is_complete() => {
                stages.push(StageOutcome::ok(Stage::Purge, summary.describe()))
            }
            Ok(summary) => stages.push(StageOutcome::failed(Stage::Purge, summary.describe())),
            Err(e) => stages.push(StageOutcome::failed(Stage::Purge, e.to_string())),
        }

        let uploaded = match self.store.upload(&local_path, &filename) {
            Ok(()) => {
                info!(key = %filename, "upload complete");
                stages.push(StageOutcome::ok(
                    Stage::Upload,
                    format!("uploaded to {}/{filename}", self.store.describe()),
                ));
                true
            }
            Err(e) => {
                stages.push(StageOutcome::failed(Stage::Upload, e.to_string()));
                false
            }
        };

        let validator = Validator::new(
            self.store.as_ref(),
            self.clock.as_ref(),
            self.options.visibility,
        );
        // Waiting for visibility only makes sense if the PUT went through.
        let validation = if uploaded {
            validator.await_and_check(&local_path, &filename)
        } else {
            validator.check(&local_path, &filename)
        };
        if validation.is_valid() {
            stages.push(StageOutcome::ok(Stage::Validate, validation.describe()));
            if !self.options.keep_local_archive {
                match std::fs::remove_file(&local_path) {
                    Ok(()) => info!(path = %local_path.display(), "removed staged archive"),
                    Err(e) => warn!(path = %local_path.display(), error = %e, "could not remove staged archive"),
                }
            }
        } else {
            stages.push(StageOutcome::failed(Stage::Validate, validation.describe()));
        }

        let outcome = PipelineOutcome {
            filename,
            destination: self.store.describe(),
            started_at: now,
            finished_at: self.clock.now(),
            stages,
            validation,
        };

        let status = outcome.status();
        match status {
            RunStatus::Succeeded => info!(filename = %outcome.filename, "backup fire succeeded"),
            RunStatus::Failed => warn!(filename = %outcome.filename, "backup fire failed"),
        }

        self.notifier.notify(
            status,
            &outcome.subject(),
            &outcome.body(&self.options.host),
            &job.notify_to,
        );
        outcome
    }
}
