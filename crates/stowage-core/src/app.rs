use std::sync::Arc;

use stowage_storage::{backend_from_config, ObjectStore};
use tracing::debug;

use crate::archiver::TarArchiver;
use crate::clock::{Clock, SystemClock};
use crate::config::{ConfigSource, ResolvedConfig};
use crate::error::{Result, StowageError};
use crate::notify::{Notifier, SmtpMailer};
use crate::pipeline::{Pipeline, PipelineOptions};
use crate::scheduler::Scheduler;

#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub source: ConfigSource,
    pub resolved: ResolvedConfig,
}

/// Object store client for the configured bucket.
pub fn open_store(cfg: &ResolvedConfig) -> Result<Box<dyn ObjectStore>> {
    Ok(backend_from_config(&cfg.storage)?)
}

/// Wire the production components: `tar`, S3, SMTP, wall clock.
pub fn build_pipeline(cfg: &ResolvedConfig, clock: Arc<dyn Clock>) -> Result<Pipeline> {
    let store = open_store(cfg)?;
    let mailer = SmtpMailer::new(&cfg.mail).map_err(|e| StowageError::Config(e.to_string()))?;
    let options = PipelineOptions {
        visibility: cfg.visibility,
        keep_local_archive: cfg.keep_local_archive,
        ..PipelineOptions::default()
    };
    Ok(Pipeline::new(
        cfg.job.clone(),
        Box::new(TarArchiver::new(cfg.archive.clone())),
        store,
        Notifier::new(Box::new(mailer)),
        clock,
        options,
    ))
}

pub fn build_scheduler(cfg: &ResolvedConfig) -> Result<Scheduler> {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    debug!(fire_time = %cfg.job.fire_time, "building scheduler");
    let pipeline = build_pipeline(cfg, clock.clone())?;
    Ok(Scheduler::new(pipeline, clock))
}
