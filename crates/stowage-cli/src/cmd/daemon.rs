use stowage_core::app::{self, RuntimeConfig};

use super::CmdResult;
use crate::signal::{install_signal_handlers, SHUTDOWN};

pub(crate) fn run_daemon(runtime: &RuntimeConfig) -> CmdResult {
    let cfg = &runtime.resolved;
    let mut scheduler = app::build_scheduler(cfg)?;

    install_signal_handlers();
    tracing::info!(
        config = %runtime.source,
        fire_time = %cfg.job.fire_time,
        source = %cfg.job.source_dir.display(),
        staging = %cfg.job.staging_dir.display(),
        bucket = %cfg.job.bucket,
        retention_days = cfg.job.retention_days,
        "daemon starting"
    );

    scheduler.run(Some(&SHUTDOWN));
    Ok(true)
}
