use std::sync::Arc;

use stowage_core::app::{self, RuntimeConfig};
use stowage_core::clock::{Clock, SystemClock};
use stowage_core::notify::RunStatus;

use super::CmdResult;

/// One fire outside the schedule: same stages, same notification.
pub(crate) fn run_once(runtime: &RuntimeConfig) -> CmdResult {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let pipeline = app::build_pipeline(&runtime.resolved, clock.clone())?;
    let outcome = pipeline.fire(clock.now());

    for stage in &outcome.stages {
        let mark = if stage.succeeded { "ok" } else { "FAILED" };
        println!("{:<9} {:<6} {}", stage.stage, mark, stage.detail);
    }
    println!("{}", outcome.subject());

    Ok(outcome.status() == RunStatus::Succeeded)
}
