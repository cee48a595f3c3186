//! Time source — wall-clock timestamps and blocking delay units.
//!
//! RULE: Components never call `Utc::now()` or `thread::sleep` directly.
//! All time flows through the Clock trait so tests can script it.

use chrono::{DateTime, Utc};
use std::time::Duration;

/// One delay unit of the delivery pipeline, in milliseconds.
/// Retry backoff and the broadcast rate-limit pause are multiples of this.
pub const UNIT_MILLIS: u64 = 1_000;

pub trait Clock: Send {
    /// Current wall-clock time.
    fn now(&self) -> DateTime<Utc>;

    /// Block for `units` delay units. Holds no engine state while waiting.
    fn sleep_units(&self, units: u64);
}

/// Production clock: real time, real sleeps.
pub struct WallClock;

impl Clock for WallClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn sleep_units(&self, units: u64) {
        std::thread::sleep(Duration::from_millis(units * UNIT_MILLIS));
    }
}
