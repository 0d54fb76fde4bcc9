use std::time::Duration;

use chrono::{DateTime, FixedOffset, Local};

/// Wall-clock and sleeping capability. Injected so the scheduler and the
/// visibility wait can run against a simulated clock in tests.
pub trait Clock: Send + Sync {
    /// Current local time, with its UTC offset.
    fn now(&self) -> DateTime<FixedOffset>;

    fn sleep(&self, duration: Duration);
}

/// The host clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<FixedOffset> {
        Local::now().fixed_offset()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}
