use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Days, FixedOffset, NaiveDate, TimeZone, Timelike};
use tracing::{info, warn};

use crate::clock::Clock;
use crate::job::FireTime;
use crate::notify::RunStatus;
use crate::pipeline::{Pipeline, PipelineOutcome};

/// Pause after a fire. Must be at least as long as the widest gap between
/// two polls that could both land in the fire minute.
pub const COOLDOWN: Duration = Duration::from_secs(60);

/// Shutdown is checked at least this often while sleeping.
const SLEEP_SLICE: Duration = Duration::from_secs(1);

#[derive(Debug)]
pub enum Tick {
    Fired(Box<PipelineOutcome>),
    Idle { next_poll_in: Duration },
}

/// Poll-and-fire loop: `Idle → Firing → Idle`, once per calendar day.
pub struct Scheduler {
    pipeline: Pipeline,
    clock: Arc<dyn Clock>,
    fire_time: FireTime,
    cooldown: Duration,
    last_fired_on: Option<NaiveDate>,
}

impl Scheduler {
    pub fn new(pipeline: Pipeline, clock: Arc<dyn Clock>) -> Self {
        let fire_time = pipeline.job().fire_time;
        Self {
            pipeline,
            clock,
            fire_time,
            cooldown: COOLDOWN,
            last_fired_on: None,
        }
    }

    pub fn fire_time(&self) -> FireTime {
        self.fire_time
    }

    /// The transition rule: wall clock in the fire minute and no fire yet today.
    pub fn should_fire(&self, now: &DateTime<FixedOffset>) -> bool {
        self.fire_time.matches(now) && self.last_fired_on != Some(now.date_naive())
    }

    /// One poll. Fires synchronously when the rule holds.
    pub fn tick(&mut self) -> Tick {
        let now = self.clock.now();
        if self.should_fire(&now) {
            self.last_fired_on = Some(now.date_naive());
            Tick::Fired(Box::new(self.pipeline.fire(now)))
        } else {
            Tick::Idle {
                next_poll_in: until_next_minute(&now),
            }
        }
    }

    /// Poll until `shutdown` is set. A fire in progress always completes.
    pub fn run(&mut self, shutdown: Option<&AtomicBool>) {
        let stop = || shutdown.is_some_and(|s| s.load(Ordering::SeqCst));
        self.log_next_fire();

        while !stop() {
            match self.tick() {
                Tick::Fired(outcome) => {
                    let failed: Vec<&str> =
                        outcome.failed_stages().map(|s| s.stage.as_str()).collect();
                    match outcome.status() {
                        RunStatus::Succeeded => {
                            info!(filename = %outcome.filename, "backup cycle finished successfully")
                        }
                        RunStatus::Failed => warn!(
                            filename = %outcome.filename,
                            failed = ?failed,
                            "backup cycle finished with errors"
                        ),
                    }
                    self.sleep_unless_stopped(self.cooldown, &stop);
                    self.log_next_fire();
                }
                Tick::Idle { next_poll_in } => self.sleep_unless_stopped(next_poll_in, &stop),
            }
        }
        info!("shutdown signal received, scheduler stopped");
    }

    /// Next instant the scheduler will fire, as seen from `now`.
    pub fn next_fire_after(&self, now: &DateTime<FixedOffset>) -> DateTime<FixedOffset> {
        let offset = *now.offset();
        let at = |date: NaiveDate| {
            let naive = date
                .and_hms_opt(self.fire_time.hour(), self.fire_time.minute(), 0)
                .unwrap_or_default();
            offset.from_local_datetime(&naive).single().unwrap_or(*now)
        };

        let today = now.date_naive();
        let fire_minute_passed = (now.hour(), now.minute())
            > (self.fire_time.hour(), self.fire_time.minute());
        if self.should_fire(now) || (!fire_minute_passed && self.last_fired_on != Some(today)) {
            return at(today).max(*now);
        }
        at(today.checked_add_days(Days::new(1)).unwrap_or(today))
    }

    fn log_next_fire(&self) {
        let now = self.clock.now();
        let next = self.next_fire_after(&now);
        info!(
            next_run = %next.format("%Y-%m-%d %H:%M %:z"),
            delay = ?(next - now).to_std().unwrap_or_default(),
            "next backup scheduled"
        );
    }

    fn sleep_unless_stopped(&self, total: Duration, stop: &impl Fn() -> bool) {
        let mut remaining = total;
        while !remaining.is_zero() && !stop() {
            let slice = remaining.min(SLEEP_SLICE);
            self.clock.sleep(slice);
            remaining -= slice;
        }
    }
}

/// Time to the start of the next minute; a full minute when exactly on a boundary.
pub fn until_next_minute<T: Timelike>(now: &T) -> Duration {
    let into_minute = Duration::new(u64::from(now.second()), now.nanosecond() % 1_000_000_000);
    Duration::from_secs(60).saturating_sub(into_minute).max(Duration::from_millis(1))
}
