//! Time sources for the engine
//!
//! The engine needs two notions of time: the local wall clock (schedule rules and the daily
//! screen-time rollover) and a monotonic millisecond counter (TTLs, pauses and the active-feature
//! refresh interval). Both come from a [`Clock`] so tests and replays can drive time explicitly.

use std::fmt::Debug;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::{Local, NaiveDateTime};

/// Port for obtaining the current time.
pub trait Clock: Send + Sync + Debug {
    /// Local wall-clock date and time.
    fn local_now(&self) -> NaiveDateTime;

    /// Milliseconds on a monotonic timeline. Only differences are meaningful.
    fn millis(&self) -> u64;
}

/// System clock backed by `chrono::Local` and `Instant`.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    /// Create a new system clock whose monotonic timeline starts now.
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn local_now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }

    fn millis(&self) -> u64 {
        self.origin.elapsed().as_millis() as u64
    }
}

#[derive(Debug)]
struct ManualTime {
    local: NaiveDateTime,
    millis: u64,
}

/// Manually driven clock.
///
/// Wall-clock and monotonic time advance together. Clones share the same underlying time, so a
/// test can keep one handle while the engine owns another.
#[derive(Debug, Clone)]
pub struct ManualClock {
    time: Arc<Mutex<ManualTime>>,
}

impl ManualClock {
    /// Create a manual clock at the given local date-time. The monotonic counter starts at zero.
    pub fn new(start: NaiveDateTime) -> Self {
        Self {
            time: Arc::new(Mutex::new(ManualTime {
                local: start,
                millis: 0,
            })),
        }
    }

    /// Advance both timelines by `duration`.
    pub fn advance(&self, duration: Duration) {
        let mut time = self.time.lock().unwrap_or_else(|e| e.into_inner());
        time.millis += duration.as_millis() as u64;
        time.local += chrono::Duration::milliseconds(duration.as_millis() as i64);
    }

    /// Move the clock to `local`. Moving backwards only changes the wall clock; the monotonic
    /// counter never decreases.
    pub fn set(&self, local: NaiveDateTime) {
        let mut time = self.time.lock().unwrap_or_else(|e| e.into_inner());
        let delta = (local - time.local).num_milliseconds();
        if delta > 0 {
            time.millis += delta as u64;
        }
        time.local = local;
    }
}

impl Clock for ManualClock {
    fn local_now(&self) -> NaiveDateTime {
        self.time.lock().unwrap_or_else(|e| e.into_inner()).local
    }

    fn millis(&self) -> u64 {
        self.time.lock().unwrap_or_else(|e| e.into_inner()).millis
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn start() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 15)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    #[test]
    fn test_system_clock_is_monotonic() {
        let clock = SystemClock::new();
        let t1 = clock.millis();
        std::thread::sleep(Duration::from_millis(5));
        assert!(clock.millis() >= t1 + 5);
    }

    #[test]
    fn test_manual_clock_advance_moves_both_timelines() {
        let clock = ManualClock::new(start());
        clock.advance(Duration::from_secs(90));

        assert_eq!(clock.millis(), 90_000);
        assert_eq!(clock.local_now(), start() + chrono::Duration::seconds(90));
    }

    #[test]
    fn test_manual_clock_clones_share_time() {
        let clock = ManualClock::new(start());
        let shared = clock.clone();
        shared.advance(Duration::from_millis(250));
        assert_eq!(clock.millis(), 250);
    }

    #[test]
    fn test_manual_clock_set_backwards_keeps_monotonic_counter() {
        let clock = ManualClock::new(start());
        clock.set(start() + chrono::Duration::minutes(2));
        assert_eq!(clock.millis(), 120_000);

        clock.set(start());
        assert_eq!(clock.millis(), 120_000);
        assert_eq!(clock.local_now(), start());
    }
}
