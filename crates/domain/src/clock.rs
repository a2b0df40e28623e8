//! Monotonic and wall-clock time source, injectable for tests (§4.1).
//!
//! No global singletons: every time-dependent component accepts a `Clock`.

use std::sync::Mutex;
use std::time::Instant;

use chrono::{DateTime, NaiveDate, Utc};

pub trait Clock: Send + Sync + 'static {
    fn now_wall(&self) -> DateTime<Utc>;
    fn now_monotonic(&self) -> Instant;
    fn today(&self) -> NaiveDate {
        self.now_wall().date_naive()
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_wall(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn now_monotonic(&self) -> Instant {
        Instant::now()
    }
}

/// Fixed wall-clock time for deterministic tests. Monotonic time still
/// advances against process start so duration math in the scheduler remains
/// meaningful even with a frozen wall clock.
pub struct FixedClock {
    wall: Mutex<DateTime<Utc>>,
    monotonic_base: Instant,
}

impl FixedClock {
    pub fn new(wall: DateTime<Utc>) -> Self {
        Self {
            wall: Mutex::new(wall),
            monotonic_base: Instant::now(),
        }
    }

    /// Advance the fixed wall clock by `delta`, for scenario tests that need
    /// to move through several fire times.
    pub fn advance(&self, delta: chrono::Duration) {
        let mut guard = self.wall.lock().expect("clock mutex poisoned");
        *guard += delta;
    }
}

impl Clock for FixedClock {
    fn now_wall(&self) -> DateTime<Utc> {
        *self.wall.lock().expect("clock mutex poisoned")
    }

    fn now_monotonic(&self) -> Instant {
        self.monotonic_base
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn fixed_clock_advances() {
        let t0 = Utc.with_ymd_and_hms(2026, 2, 12, 19, 0, 0).unwrap();
        let clock = FixedClock::new(t0);
        assert_eq!(clock.now_wall(), t0);
        clock.advance(chrono::Duration::hours(1));
        assert_eq!(clock.now_wall(), t0 + chrono::Duration::hours(1));
    }

    #[test]
    fn today_derives_from_wall_clock() {
        let t0 = Utc.with_ymd_and_hms(2026, 2, 12, 19, 0, 0).unwrap();
        let clock = FixedClock::new(t0);
        assert_eq!(clock.today(), NaiveDate::from_ymd_opt(2026, 2, 12).unwrap());
    }
}
