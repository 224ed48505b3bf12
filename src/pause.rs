//! Global pause
//!
//! A pause suspends every feature for a fixed duration. To keep the user from pausing over and
//! over, a new pause can only begin once a minimum interval has passed since the previous pause
//! ended. Ending a pause early counts as its end.

use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};

use crate::clock::Clock;
use crate::events::KeyEvent;
use crate::feature::pause_button::KEYCODE_UNKNOWN;
use crate::feature::{Feature, PauseButtonFeature};

/// Result of a pause toggle request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PauseOutcome {
    /// The pause button feature is not activated.
    Disabled,
    /// The engine is not running.
    NotRunning,
    Paused { until_ms: u64 },
    Resumed,
    /// Too soon after the previous pause.
    Rejected { retry_in_ms: u64 },
}

#[derive(Debug, Default)]
struct PauseState {
    /// Deadline of the current pause, or end of the previous one once it is over.
    pause_until: Option<u64>,
}

#[derive(Debug)]
pub struct PauseController {
    feature: Arc<PauseButtonFeature>,
    clock: Arc<dyn Clock>,
    key_hold_ms: u64,
    state: Mutex<PauseState>,
}

impl PauseController {
    pub fn new(feature: Arc<PauseButtonFeature>, clock: Arc<dyn Clock>, key_hold_ms: u64) -> Self {
        Self {
            feature,
            clock,
            key_hold_ms,
            state: Mutex::new(PauseState::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, PauseState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn feature(&self) -> &Arc<PauseButtonFeature> {
        &self.feature
    }

    /// Begin a pause, or end the current one early.
    ///
    /// Only updates the pause deadline; pausing and restarting features is up to the caller.
    pub fn toggle(&self) -> PauseOutcome {
        if !self.feature.is_activated() {
            return PauseOutcome::Disabled;
        }
        let now = self.clock.millis();
        let mut state = self.lock();
        match state.pause_until {
            Some(until) if now < until => {
                state.pause_until = Some(now);
                PauseOutcome::Resumed
            }
            previous_end => {
                let min_gap = self.feature.time_between_pauses_ms();
                let since_end = previous_end.map_or(u64::MAX, |end| now.saturating_sub(end));
                if since_end < min_gap {
                    return PauseOutcome::Rejected {
                        retry_in_ms: min_gap - since_end,
                    };
                }
                let until_ms = now.saturating_add(self.feature.pause_duration_ms());
                state.pause_until = Some(until_ms);
                PauseOutcome::Paused { until_ms }
            }
        }
    }

    /// End the current pause, if any. Returns whether a pause was in effect.
    pub fn resume(&self) -> bool {
        let now = self.clock.millis();
        let mut state = self.lock();
        match state.pause_until {
            Some(until) if now < until => {
                state.pause_until = Some(now);
                true
            }
            _ => false,
        }
    }

    /// Forget any pause, including the previous pause's end.
    pub fn clear(&self) {
        self.lock().pause_until = None;
    }

    pub fn is_pausing(&self) -> bool {
        let now = self.clock.millis();
        self.lock().pause_until.is_some_and(|until| now < until)
    }

    /// Time left in the current pause.
    pub fn remaining_ms(&self) -> Option<u64> {
        let now = self.clock.millis();
        self.lock()
            .pause_until
            .filter(|until| now < *until)
            .map(|until| until - now)
    }

    /// Whether `event` is a long press of the configured pause key.
    ///
    /// Presses are reported on release, so a pause begins only once the key is let go.
    pub fn is_pause_trigger(&self, event: &KeyEvent) -> bool {
        let key = self.feature.hardware_key();
        key != KEYCODE_UNKNOWN
            && event.key_code == key
            && event.press_duration_ms > self.key_hold_ms
    }
}
