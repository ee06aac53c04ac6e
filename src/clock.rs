//! Time source for the queue service.
//!
//! The engine takes `now` as an argument on every command; the service asks
//! a [`Clock`] for it. Production uses [`SystemClock`]; tests drive a
//! [`ManualClock`] forward explicitly so countdown behaviour is deterministic.

use chrono::{DateTime, Duration, Utc};
use std::sync::Mutex;

use crate::lock_or_recover;

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        ManualClock {
            now: Mutex::new(start),
        }
    }

    /// Starts at 2025-01-01T00:00:00Z.
    pub fn fixed() -> Self {
        Self::new(DateTime::from_timestamp(1_735_689_600, 0).unwrap_or_default())
    }

    pub fn advance_secs(&self, secs: i64) {
        let mut now = lock_or_recover(&self.now);
        *now += Duration::seconds(secs);
    }

    pub fn set(&self, to: DateTime<Utc>) {
        *lock_or_recover(&self.now) = to;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *lock_or_recover(&self.now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_moves_only_when_advanced() {
        let clock = ManualClock::fixed();
        let t0 = clock.now();
        assert_eq!(clock.now(), t0);
        clock.advance_secs(90);
        assert_eq!(clock.now() - t0, Duration::seconds(90));
    }

    #[test]
    fn fixed_clock_starts_at_2025() {
        let clock = ManualClock::fixed();
        assert_eq!(clock.now().to_rfc3339(), "2025-01-01T00:00:00+00:00");
    }
}
