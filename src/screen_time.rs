//! Daily screen-time accounting
//!
//! A tracker accumulates the milliseconds spent in apps a feature restricts. Sessions are opened
//! when such an app comes to the foreground and closed when another app is opened or the screen
//! turns off. The day rollover is checked whenever a session is closed, not continuously.

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::NaiveDate;

use crate::clock::Clock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ScreenTimeAccumulator {
    tracking_since: Option<u64>,
    used_up_ms: u64,
    day: NaiveDate,
}

/// Per-feature screen-time accumulator with daily reset
#[derive(Debug)]
pub struct ScreenTimeTracker {
    clock: Arc<dyn Clock>,
    state: Mutex<ScreenTimeAccumulator>,
}

impl ScreenTimeTracker {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        let day = clock.local_now().date();
        Self {
            clock,
            state: Mutex::new(ScreenTimeAccumulator {
                tracking_since: None,
                used_up_ms: 0,
                day,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ScreenTimeAccumulator> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Open a session unless one is already open.
    pub fn eventually_start_tracking(&self) {
        let mut state = self.lock();
        if state.tracking_since.is_none() {
            state.tracking_since = Some(self.clock.millis());
        }
    }

    /// Close the open session, if any, and add its duration to today's total.
    ///
    /// A changed calendar day resets the total first, so a session spanning midnight is counted
    /// entirely towards the new day.
    pub fn eventually_increase_used_up_screen_time(&self) {
        let today = self.clock.local_now().date();
        let now = self.clock.millis();
        let mut state = self.lock();
        if state.day != today {
            log::debug!("screen time rollover from {} to {}", state.day, today);
            state.used_up_ms = 0;
            state.day = today;
        }
        if let Some(since) = state.tracking_since.take() {
            state.used_up_ms += now.saturating_sub(since);
        }
    }

    /// Screen time used up today, excluding the open session.
    pub fn used_up_ms(&self) -> u64 {
        self.lock().used_up_ms
    }

    pub fn is_tracking(&self) -> bool {
        self.lock().tracking_since.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::NaiveDateTime;
    use std::time::Duration;

    fn evening() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 5, 6)
            .unwrap()
            .and_hms_opt(23, 59, 0)
            .unwrap()
    }

    #[test]
    fn test_session_adds_elapsed_time() {
        let clock = ManualClock::new(evening() - chrono::Duration::hours(2));
        let tracker = ScreenTimeTracker::new(Arc::new(clock.clone()));

        tracker.eventually_start_tracking();
        clock.advance(Duration::from_secs(30));
        tracker.eventually_increase_used_up_screen_time();

        assert_eq!(tracker.used_up_ms(), 30_000);
        assert!(!tracker.is_tracking());
    }

    #[test]
    fn test_start_tracking_is_idempotent() {
        let clock = ManualClock::new(evening() - chrono::Duration::hours(2));
        let tracker = ScreenTimeTracker::new(Arc::new(clock.clone()));

        tracker.eventually_start_tracking();
        clock.advance(Duration::from_secs(10));
        tracker.eventually_start_tracking();
        clock.advance(Duration::from_secs(10));
        tracker.eventually_increase_used_up_screen_time();

        assert_eq!(tracker.used_up_ms(), 20_000);
    }

    #[test]
    fn test_closing_without_session_is_noop() {
        let clock = ManualClock::new(evening());
        let tracker = ScreenTimeTracker::new(Arc::new(clock.clone()));

        clock.advance(Duration::from_secs(5));
        tracker.eventually_increase_used_up_screen_time();

        assert_eq!(tracker.used_up_ms(), 0);
    }

    #[test]
    fn test_day_rollover_resets_before_adding() {
        let clock = ManualClock::new(evening() - chrono::Duration::minutes(10));
        let tracker = ScreenTimeTracker::new(Arc::new(clock.clone()));

        tracker.eventually_start_tracking();
        clock.advance(Duration::from_secs(50));
        tracker.eventually_increase_used_up_screen_time();
        assert_eq!(tracker.used_up_ms(), 50_000);

        // session opened before midnight, closed after
        tracker.eventually_start_tracking();
        clock.set(evening() + chrono::Duration::minutes(2));
        tracker.eventually_increase_used_up_screen_time();

        let session_ms = (evening() + chrono::Duration::minutes(2)
            - (evening() - chrono::Duration::minutes(10) + chrono::Duration::seconds(50)))
        .num_milliseconds() as u64;
        assert_eq!(tracker.used_up_ms(), session_ms);
    }

    #[test]
    fn test_day_rollover_without_session_clears_total() {
        let clock = ManualClock::new(evening());
        let tracker = ScreenTimeTracker::new(Arc::new(clock.clone()));

        tracker.eventually_start_tracking();
        clock.advance(Duration::from_secs(50));
        tracker.eventually_increase_used_up_screen_time();

        clock.advance(Duration::from_secs(60));
        tracker.eventually_increase_used_up_screen_time();

        assert_eq!(tracker.used_up_ms(), 0);
    }
}
