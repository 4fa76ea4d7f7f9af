use std::sync::Mutex;

use chrono::{DateTime, Duration, NaiveTime, Utc};

/// Time source for the economy.
///
/// The clock's timestamps define the calendar frame: the sign-in cooldown
/// rolls over at midnight of whatever zone the clock reports. A deployment
/// gating on local midnight supplies a clock that yields local wall time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// System clock reporting UTC.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually advanced clock for tests and simulations.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn starting_at(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut guard = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *guard += by;
    }

    pub fn set(&self, to: DateTime<Utc>) {
        let mut guard = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *guard = to;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Midnight beginning the calendar day of `at`.
pub fn day_start(at: DateTime<Utc>) -> DateTime<Utc> {
    at.date_naive().and_time(NaiveTime::MIN).and_utc()
}

/// Midnight beginning the following calendar day.
pub fn next_day_start(at: DateTime<Utc>) -> DateTime<Utc> {
    day_start(at) + Duration::days(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn day_boundaries_bracket_the_timestamp() {
        let at = Utc.with_ymd_and_hms(2025, 3, 1, 23, 59, 59).unwrap();
        assert_eq!(
            day_start(at),
            Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap()
        );
        assert_eq!(
            next_day_start(at),
            Utc.with_ymd_and_hms(2025, 3, 2, 0, 0, 0).unwrap()
        );
        assert!(next_day_start(at) - at <= Duration::days(1));
    }

    #[test]
    fn manual_clock_advances() {
        let clock = ManualClock::starting_at(Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap());
        clock.advance(Duration::hours(13));
        assert_eq!(
            clock.now(),
            Utc.with_ymd_and_hms(2025, 3, 2, 1, 0, 0).unwrap()
        );
    }
}
