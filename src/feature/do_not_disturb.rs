//! Do-not-disturb: keep priority-only interruptions on while scheduled.

use std::sync::{Arc, Mutex};

use crate::clock::Clock;
use crate::device::DeviceController;
use crate::events::AppOpenedEvent;
use crate::schedule::FeatureSchedule;
use crate::store::KeyValueStore;

use super::{Capability, Feature, FeatureBase, FeatureId, Permission};

pub const DO_NOT_DISTURB_FEATURE_ID: FeatureId = "DoNotDisturbFeature";

#[derive(Debug, Default)]
struct ZenState {
    enabled: bool,
    enabled_before_start: bool,
}

#[derive(Debug)]
pub struct DoNotDisturbFeature {
    base: FeatureBase,
    schedule: FeatureSchedule,
    state: Mutex<ZenState>,
}

impl DoNotDisturbFeature {
    pub fn new(
        store: &Arc<dyn KeyValueStore>,
        device: Arc<dyn DeviceController>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            schedule: FeatureSchedule::load(store.clone(), DO_NOT_DISTURB_FEATURE_ID),
            state: Mutex::new(ZenState::default()),
            base: FeatureBase::new(DO_NOT_DISTURB_FEATURE_ID, store, device, clock),
        }
    }

    /// Issue the command unless the remembered state already matches. Returns whether a command
    /// was sent.
    fn set_zen_mode(&self, enabled: bool, force: bool) -> bool {
        {
            let mut state = self.lock();
            if state.enabled == enabled && !force {
                return false;
            }
            state.enabled = enabled;
        }
        if !self.base.device.set_do_not_disturb(enabled) {
            log::warn!("failed to set do-not-disturb to {}", enabled);
        }
        true
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ZenState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Feature for DoNotDisturbFeature {
    fn base(&self) -> &FeatureBase {
        &self.base
    }

    fn capabilities(&self) -> &'static [Capability] {
        &[Capability::AppOpened]
    }

    fn schedule(&self) -> Option<&FeatureSchedule> {
        Some(&self.schedule)
    }

    fn required_permission(&self) -> Option<Permission> {
        Some(Permission::NotificationPolicy)
    }

    fn on_start(&self) {
        let enabled_before_start = self.base.device.is_do_not_disturb_enabled();
        self.lock().enabled_before_start = enabled_before_start;
        self.set_zen_mode(true, true);
    }

    fn on_pause(&self) {
        let restore = self.lock().enabled_before_start;
        self.set_zen_mode(restore, true);
    }

    /// The user may have switched DND off by hand, so it is re-enabled on every app change.
    fn on_app_opened(&self, _package_name: &str, _event: &AppOpenedEvent) {
        self.set_zen_mode(true, false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::device::{DeviceCommand, RecordingController, ReentrantController};
    use crate::store::MemoryStore;
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;

    fn feature() -> (Arc<RecordingController>, DoNotDisturbFeature) {
        let device = Arc::new(RecordingController::new());
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let clock = ManualClock::new(
            NaiveDate::from_ymd_opt(2024, 2, 1)
                .unwrap()
                .and_hms_opt(22, 0, 0)
                .unwrap(),
        );
        let feature = DoNotDisturbFeature::new(&store, device.clone(), Arc::new(clock));
        (device, feature)
    }

    fn dnd(enabled: bool) -> DeviceCommand {
        DeviceCommand::SetDoNotDisturb { enabled }
    }

    #[test]
    fn test_start_then_pause_restores_previous_state() {
        let (device, feature) = feature();
        feature.on_start();
        feature.on_app_opened("com.example.chat", &AppOpenedEvent::new("com.example.chat"));
        feature.on_pause();

        assert_eq!(device.commands(), vec![dnd(true), dnd(false)]);
    }

    #[test]
    fn test_pause_keeps_dnd_when_it_was_on_before() {
        let (device, feature) = feature();
        device.set_external_do_not_disturb(true);
        feature.on_start();
        feature.on_pause();

        assert_eq!(device.commands(), vec![dnd(true), dnd(true)]);
        assert!(device.is_do_not_disturb_enabled());
    }

    #[test]
    fn test_app_opened_reenables_when_not_known_on() {
        let (device, feature) = feature();
        feature.on_app_opened("com.example.chat", &AppOpenedEvent::new("com.example.chat"));
        feature.on_app_opened("com.example.mail", &AppOpenedEvent::new("com.example.mail"));

        assert_eq!(device.commands(), vec![dnd(true)]);
    }

    #[test]
    fn test_device_may_call_back_into_feature() {
        let device = Arc::new(ReentrantController::new());
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let clock = ManualClock::new(
            NaiveDate::from_ymd_opt(2024, 2, 1)
                .unwrap()
                .and_hms_opt(22, 0, 0)
                .unwrap(),
        );
        let feature = Arc::new(DoNotDisturbFeature::new(&store, device.clone(), Arc::new(clock)));
        {
            let feature = feature.clone();
            device.on_next_call(move || {
                feature.on_app_opened("com.example.chat", &AppOpenedEvent::new("com.example.chat"));
            });
        }

        feature.on_start();
        feature.on_pause();

        // the nested app change switched DND on before the state was read
        assert_eq!(
            device.inner().commands(),
            vec![dnd(true), dnd(true), dnd(true)]
        );
        assert!(device.inner().is_do_not_disturb_enabled());
    }
}
