//! Disable apps: block or hide listed apps once their daily allowance is used up.

use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

use crate::clock::Clock;
use crate::device::{DeviceController, WarningKind};
use crate::events::AppOpenedEvent;
use crate::screen_time::ScreenTimeTracker;
use crate::store::{KeyValueStore, Property, StoreCodec, StoreValue};

use super::{
    AppExceptionListType, AppExceptions, Capability, Feature, FeatureBase, FeatureId, Permission,
};

pub const DISABLE_APPS_FEATURE_ID: FeatureId = "DisableAppsFeature";

/// How listed apps are made unusable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DisableAppsMode {
    /// Hide the apps through device policy.
    Deactivate,
    /// Show a warning surface on top of the app.
    Block,
}

impl StoreCodec for DisableAppsMode {
    fn encode(&self) -> StoreValue {
        let name = match self {
            Self::Deactivate => "DEACTIVATE",
            Self::Block => "BLOCK",
        };
        StoreValue::String(name.to_string())
    }

    fn decode(value: StoreValue) -> Option<Self> {
        match value {
            StoreValue::String(s) if s == "DEACTIVATE" => Some(Self::Deactivate),
            StoreValue::String(s) if s == "BLOCK" => Some(Self::Block),
            _ => None,
        }
    }
}

#[derive(Debug)]
pub struct DisableAppsFeature {
    base: FeatureBase,
    app_exceptions: AppExceptions,
    screen_time: ScreenTimeTracker,
    /// Daily allowance for listed apps; 0 means always disabled.
    allowed_daily_screen_time: Property<u64>,
    operation_mode: Property<DisableAppsMode>,
    apps_deactivated: Mutex<bool>,
}

impl DisableAppsFeature {
    pub fn new(
        store: &Arc<dyn KeyValueStore>,
        device: Arc<dyn DeviceController>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let id = DISABLE_APPS_FEATURE_ID;
        Self {
            app_exceptions: AppExceptions::load(
                store.clone(),
                id,
                AppExceptionListType::Include,
                &[AppExceptionListType::Include],
            ),
            screen_time: ScreenTimeTracker::new(clock.clone()),
            allowed_daily_screen_time: Property::load(
                store.clone(),
                id,
                "allowedDailyScreenTime",
                0,
            ),
            operation_mode: Property::load(
                store.clone(),
                id,
                "disableAppsMode",
                DisableAppsMode::Block,
            ),
            apps_deactivated: Mutex::new(false),
            base: FeatureBase::new(id, store, device, clock),
        }
    }

    pub fn allowed_daily_screen_time_ms(&self) -> u64 {
        self.allowed_daily_screen_time.get()
    }

    pub fn set_allowed_daily_screen_time_ms(&self, allowance_ms: u64) {
        self.allowed_daily_screen_time.set(allowance_ms);
    }

    pub fn operation_mode(&self) -> DisableAppsMode {
        self.operation_mode.get()
    }

    pub fn set_operation_mode(&self, mode: DisableAppsMode) {
        self.operation_mode.set(mode);
    }

    pub fn is_apps_deactivated(&self) -> bool {
        *self
            .apps_deactivated
            .lock()
            .unwrap_or_else(|e| e.into_inner())
    }

    /// Hide or unhide every listed app. No-op when already in that state or when the app may
    /// not hide other apps.
    pub fn set_apps_deactivated(&self, deactivated: bool) {
        if !self.base.device.can_hide_apps() {
            return;
        }
        {
            let mut current = self
                .apps_deactivated
                .lock()
                .unwrap_or_else(|e| e.into_inner());
            if *current == deactivated {
                return;
            }
            *current = deactivated;
        }
        for package_name in self.app_exceptions.packages() {
            if !self.base.device.set_app_hidden(&package_name, deactivated) {
                log::warn!("failed to set {} hidden={}", package_name, deactivated);
            }
        }
    }
}

impl Feature for DisableAppsFeature {
    fn base(&self) -> &FeatureBase {
        &self.base
    }

    fn capabilities(&self) -> &'static [Capability] {
        &[Capability::AppOpened, Capability::ScreenOff]
    }

    fn app_exceptions(&self) -> Option<&AppExceptions> {
        Some(&self.app_exceptions)
    }

    fn screen_time(&self) -> Option<&ScreenTimeTracker> {
        Some(&self.screen_time)
    }

    fn required_permission(&self) -> Option<Permission> {
        Some(Permission::DrawOverlay)
    }

    fn on_pause(&self) {
        if self.operation_mode() == DisableAppsMode::Deactivate {
            self.set_apps_deactivated(false);
        }
    }

    fn on_app_opened(&self, package_name: &str, _event: &AppOpenedEvent) {
        if !self.app_exceptions.contains(package_name) {
            self.screen_time.eventually_increase_used_up_screen_time();
            return;
        }
        self.screen_time.eventually_start_tracking();

        let allowance = self.allowed_daily_screen_time_ms();
        if allowance > 0 && self.screen_time.used_up_ms() < allowance {
            return;
        }

        match self.operation_mode() {
            DisableAppsMode::Block => {
                log::info!("{} is disabled, showing warning", package_name);
                if !self
                    .base
                    .device
                    .show_warning(WarningKind::AppDisabled, package_name)
                {
                    log::warn!("failed to show app-disabled warning for {}", package_name);
                }
            }
            DisableAppsMode::Deactivate => self.set_apps_deactivated(true),
        }
    }

    fn on_screen_turned_off(&self) {
        self.screen_time.eventually_increase_used_up_screen_time();
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
    use std::collections::BTreeSet;
    use std::time::Duration;

    const GAME: &str = "com.example.game";

    struct Fixture {
        clock: ManualClock,
        device: Arc<RecordingController>,
        feature: DisableAppsFeature,
    }

    fn fixture() -> Fixture {
        let clock = ManualClock::new(
            NaiveDate::from_ymd_opt(2024, 2, 1)
                .unwrap()
                .and_hms_opt(15, 0, 0)
                .unwrap(),
        );
        let device = Arc::new(RecordingController::new());
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let feature = DisableAppsFeature::new(&store, device.clone(), Arc::new(clock.clone()));
        feature
            .app_exceptions()
            .unwrap()
            .set_packages(BTreeSet::from([GAME.to_string()]));
        Fixture {
            clock,
            device,
            feature,
        }
    }

    fn open(f: &Fixture, package_name: &str) {
        f.feature
            .on_app_opened(package_name, &AppOpenedEvent::new(package_name));
    }

    #[test]
    fn test_zero_allowance_always_blocks() {
        let f = fixture();
        open(&f, GAME);
        open(&f, "com.example.chat");

        assert_eq!(
            f.device.commands(),
            vec![DeviceCommand::ShowWarning {
                kind: WarningKind::AppDisabled,
                package_name: GAME.to_string()
            }]
        );
    }

    #[test]
    fn test_allowance_is_strict() {
        let f = fixture();
        f.feature.set_allowed_daily_screen_time_ms(30_000);

        open(&f, GAME);
        f.clock.advance(Duration::from_secs(29));
        open(&f, "com.example.chat");
        open(&f, GAME);
        assert_eq!(f.device.warnings(WarningKind::AppDisabled), 0);

        f.clock.advance(Duration::from_secs(1));
        f.feature.on_screen_turned_off();
        open(&f, GAME);
        assert_eq!(f.device.warnings(WarningKind::AppDisabled), 1);
    }

    #[test]
    fn test_deactivate_mode_hides_and_unhides() {
        let f = fixture();
        f.feature.set_operation_mode(DisableAppsMode::Deactivate);

        open(&f, GAME);
        open(&f, "com.example.chat");
        open(&f, GAME);
        assert!(f.feature.is_apps_deactivated());

        f.feature.on_pause();
        assert_eq!(
            f.device.commands(),
            vec![
                DeviceCommand::SetAppHidden {
                    package_name: GAME.to_string(),
                    hidden: true
                },
                DeviceCommand::SetAppHidden {
                    package_name: GAME.to_string(),
                    hidden: false
                },
            ]
        );
    }

    #[test]
    fn test_deactivate_requires_device_admin() {
        let f = fixture();
        f.feature.set_operation_mode(DisableAppsMode::Deactivate);
        f.device.set_can_hide_apps(false);

        open(&f, GAME);
        assert!(f.device.commands().is_empty());
        assert!(!f.feature.is_apps_deactivated());
    }

    #[test]
    fn test_only_include_lists_are_supported() {
        let f = fixture();
        let exceptions = f.feature.app_exceptions().unwrap();
        assert_eq!(
            exceptions.supported_list_types(),
            &[AppExceptionListType::Include]
        );
        assert!(!exceptions.set_list_type(AppExceptionListType::Exclude));
    }

    #[test]
    fn test_device_may_call_back_into_feature() {
        let device = Arc::new(ReentrantController::new());
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let clock = ManualClock::new(
            NaiveDate::from_ymd_opt(2024, 2, 1)
                .unwrap()
                .and_hms_opt(15, 0, 0)
                .unwrap(),
        );
        let feature = Arc::new(DisableAppsFeature::new(&store, device.clone(), Arc::new(clock)));
        feature
            .app_exceptions()
            .unwrap()
            .set_packages(BTreeSet::from([GAME.to_string()]));
        feature.set_operation_mode(DisableAppsMode::Deactivate);
        let observed = Arc::new(Mutex::new(None));
        {
            let feature = feature.clone();
            let observed = observed.clone();
            device.on_next_call(move || {
                *observed.lock().unwrap() = Some(feature.is_apps_deactivated());
                feature.on_app_opened(GAME, &AppOpenedEvent::new(GAME));
            });
        }

        feature.on_app_opened(GAME, &AppOpenedEvent::new(GAME));

        assert_eq!(*observed.lock().unwrap(), Some(true));
        assert_eq!(
            device.inner().commands(),
            vec![DeviceCommand::SetAppHidden {
                package_name: GAME.to_string(),
                hidden: true
            }]
        );
    }
}
