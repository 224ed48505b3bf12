//! Pause button: settings for the global pause.
//!
//! The feature itself subscribes to nothing. Its activation flag enables pausing and its
//! settings drive the [`PauseController`](crate::pause::PauseController).

use std::sync::Arc;

use crate::clock::Clock;
use crate::device::DeviceController;
use crate::store::{KeyValueStore, Property};

use super::{Feature, FeatureBase, FeatureId};

pub const PAUSE_BUTTON_FEATURE_ID: FeatureId = "PauseButtonFeature";

/// Key code meaning "no pause key configured"
pub const KEYCODE_UNKNOWN: i32 = 0;

#[derive(Debug)]
pub struct PauseButtonFeature {
    base: FeatureBase,
    pause_duration: Property<u64>,
    time_between_pauses: Property<u64>,
    hardware_key: Property<i32>,
}

impl PauseButtonFeature {
    pub fn new(
        store: &Arc<dyn KeyValueStore>,
        device: Arc<dyn DeviceController>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let id = PAUSE_BUTTON_FEATURE_ID;
        Self {
            pause_duration: Property::load(store.clone(), id, "pauseDuration", 3 * 60 * 1000),
            time_between_pauses: Property::load(
                store.clone(),
                id,
                "timeBetweenPausesDuration",
                0,
            ),
            hardware_key: Property::load(store.clone(), id, "hardwareKey", KEYCODE_UNKNOWN),
            base: FeatureBase::new(id, store, device, clock),
        }
    }

    pub fn pause_duration_ms(&self) -> u64 {
        self.pause_duration.get()
    }

    pub fn set_pause_duration_ms(&self, ms: u64) {
        self.pause_duration.set(ms);
    }

    /// Minimum time between the end of one pause and the start of the next.
    pub fn time_between_pauses_ms(&self) -> u64 {
        self.time_between_pauses.get()
    }

    pub fn set_time_between_pauses_ms(&self, ms: u64) {
        self.time_between_pauses.set(ms);
    }

    pub fn hardware_key(&self) -> i32 {
        self.hardware_key.get()
    }

    pub fn set_hardware_key(&self, key_code: i32) {
        self.hardware_key.set(key_code);
    }
}

impl Feature for PauseButtonFeature {
    fn base(&self) -> &FeatureBase {
        &self.base
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::device::RecordingController;
    use crate::store::{MemoryStore, StoreValue};
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults_and_persisted_settings() {
        let store = Arc::new(MemoryStore::new());
        store.put("PauseButtonFeature_hardwareKey", StoreValue::Long(25));
        let dyn_store: Arc<dyn KeyValueStore> = store.clone();
        let clock = ManualClock::new(
            NaiveDate::from_ymd_opt(2024, 2, 1)
                .unwrap()
                .and_hms_opt(9, 0, 0)
                .unwrap(),
        );

        let feature =
            PauseButtonFeature::new(&dyn_store, Arc::new(RecordingController::new()), Arc::new(clock));

        assert_eq!(feature.pause_duration_ms(), 180_000);
        assert_eq!(feature.time_between_pauses_ms(), 0);
        assert_eq!(feature.hardware_key(), 25);
        assert!(feature.capabilities().is_empty());

        feature.set_time_between_pauses_ms(300_000);
        assert_eq!(
            store.get("PauseButtonFeature_timeBetweenPausesDuration"),
            Some(StoreValue::Long(300_000))
        );
    }
}
