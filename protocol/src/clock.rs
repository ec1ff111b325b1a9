//! # Time Source
//!
//! Due timestamps drive half of the issuance state machine, so the engine
//! never calls `Utc::now()` directly. Managers read time through a shared
//! [`Clock`]; production uses [`SystemClock`], tests and scenario replay use
//! [`ManualClock`] and move time forward explicitly.

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;

use crate::config::SECONDS_PER_DAY;

/// A source of the current time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: RwLock<DateTime<Utc>>,
}

impl ManualClock {
    /// Creates a clock frozen at `start`.
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: RwLock::new(start),
        }
    }

    /// Creates a clock frozen at the current wall-clock time.
    pub fn starting_now() -> Self {
        Self::new(Utc::now())
    }

    /// Jumps to an absolute time.
    pub fn set(&self, at: DateTime<Utc>) {
        *self.now.write() = at;
    }

    /// Moves by `delta`, saturating at the representable range.
    pub fn advance(&self, delta: Duration) {
        let mut now = self.now.write();
        *now = now.checked_add_signed(delta).unwrap_or(if delta < Duration::zero() {
            DateTime::<Utc>::MIN_UTC
        } else {
            DateTime::<Utc>::MAX_UTC
        });
    }

    /// Moves by whole days. Saturates like [`advance`](Self::advance).
    pub fn advance_days(&self, days: i64) {
        let delta = days
            .checked_mul(SECONDS_PER_DAY)
            .and_then(Duration::try_seconds)
            .unwrap_or(if days < 0 { Duration::MIN } else { Duration::MAX });
        self.advance(delta);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.read()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_advances() {
        let start = Utc::now();
        let clock = ManualClock::new(start);
        assert_eq!(clock.now(), start);

        clock.advance_days(2);
        assert_eq!(clock.now(), start + Duration::days(2));

        clock.set(start);
        assert_eq!(clock.now(), start);
    }

    #[test]
    fn huge_advances_saturate() {
        let clock = ManualClock::starting_now();
        clock.advance_days(1_000_000_000_000_000);
        assert_eq!(clock.now(), DateTime::<Utc>::MAX_UTC);

        clock.advance_days(1);
        assert_eq!(clock.now(), DateTime::<Utc>::MAX_UTC);

        clock.advance_days(i64::MIN);
        assert_eq!(clock.now(), DateTime::<Utc>::MIN_UTC);
    }
}
