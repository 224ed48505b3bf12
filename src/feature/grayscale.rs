//! Grayscale: desaturate the screen while affected apps are in the foreground.

use std::sync::{Arc, Mutex};

use crate::clock::Clock;
use crate::device::DeviceController;
use crate::events::AppOpenedEvent;
use crate::schedule::FeatureSchedule;
use crate::screen_time::ScreenTimeTracker;
use crate::store::{KeyValueStore, Property};

use super::{
    AppExceptionListType, AppExceptions, Capability, Feature, FeatureBase, FeatureId, Permission,
};

pub const GRAYSCALE_APPS_FEATURE_ID: FeatureId = "GrayscaleAppsFeature";

#[derive(Debug)]
pub struct GrayscaleAppsFeature {
    base: FeatureBase,
    schedule: FeatureSchedule,
    app_exceptions: AppExceptions,
    screen_time: ScreenTimeTracker,
    extra_dim: Property<bool>,
    ignore_non_full_screen_apps: Property<bool>,
    /// Daily color allowance for affected apps; 0 means none.
    allowed_daily_color_screen_time: Property<u64>,
    host_package: String,
    is_currently_grayscale: Mutex<bool>,
}

impl GrayscaleAppsFeature {
    pub fn new(
        store: &Arc<dyn KeyValueStore>,
        device: Arc<dyn DeviceController>,
        clock: Arc<dyn Clock>,
        host_package: impl Into<String>,
    ) -> Self {
        let id = GRAYSCALE_APPS_FEATURE_ID;
        Self {
            schedule: FeatureSchedule::load(store.clone(), id),
            app_exceptions: AppExceptions::load(
                store.clone(),
                id,
                AppExceptionListType::Exclude,
                AppExceptionListType::ALL,
            ),
            screen_time: ScreenTimeTracker::new(clock.clone()),
            extra_dim: Property::load(store.clone(), id, "extraDim", true),
            ignore_non_full_screen_apps: Property::load(
                store.clone(),
                id,
                "ignoreNonFullScreenApps",
                true,
            ),
            allowed_daily_color_screen_time: Property::load(
                store.clone(),
                id,
                "allowedDailyColorScreenTime",
                0,
            ),
            host_package: host_package.into(),
            is_currently_grayscale: Mutex::new(false),
            base: FeatureBase::new(id, store, device, clock),
        }
    }

    pub fn extra_dim(&self) -> bool {
        self.extra_dim.get()
    }

    pub fn set_extra_dim(&self, extra_dim: bool) {
        self.extra_dim.set(extra_dim);
    }

    pub fn ignore_non_full_screen_apps(&self) -> bool {
        self.ignore_non_full_screen_apps.get()
    }

    pub fn set_ignore_non_full_screen_apps(&self, ignore: bool) {
        self.ignore_non_full_screen_apps.set(ignore);
    }

    pub fn allowed_daily_color_screen_time_ms(&self) -> u64 {
        self.allowed_daily_color_screen_time.get()
    }

    pub fn set_allowed_daily_color_screen_time_ms(&self, allowance_ms: u64) {
        self.allowed_daily_color_screen_time.set(allowance_ms);
    }

    pub fn is_currently_grayscale(&self) -> bool {
        *self
            .is_currently_grayscale
            .lock()
            .unwrap_or_else(|e| e.into_inner())
    }

    /// Apply `grayscale` through the device unless already applied. The state is updated
    /// before the call and rolled back if the device refuses.
    fn apply_grayscale(&self, grayscale: bool, force: bool) {
        let previous = {
            let mut current = self
                .is_currently_grayscale
                .lock()
                .unwrap_or_else(|e| e.into_inner());
            if *current == grayscale && !force {
                return;
            }
            std::mem::replace(&mut *current, grayscale)
        };

        if !self.base.device.set_grayscale(grayscale, self.extra_dim()) {
            log::warn!("failed to set grayscale to {}", grayscale);
            let mut current = self
                .is_currently_grayscale
                .lock()
                .unwrap_or_else(|e| e.into_inner());
            if *current == grayscale {
                *current = previous;
            }
        }
    }
}

impl Feature for GrayscaleAppsFeature {
    fn base(&self) -> &FeatureBase {
        &self.base
    }

    fn capabilities(&self) -> &'static [Capability] {
        &[Capability::AppOpened, Capability::ScreenOff]
    }

    fn schedule(&self) -> Option<&FeatureSchedule> {
        Some(&self.schedule)
    }

    fn app_exceptions(&self) -> Option<&AppExceptions> {
        Some(&self.app_exceptions)
    }

    fn screen_time(&self) -> Option<&ScreenTimeTracker> {
        Some(&self.screen_time)
    }

    fn required_permission(&self) -> Option<Permission> {
        Some(Permission::WriteSecureSettings)
    }

    /// Evaluate as if the host app had just been opened.
    fn on_start(&self) {
        let event = AppOpenedEvent::new(self.host_package.clone());
        self.on_app_opened(&self.host_package, &event);
    }

    fn on_pause(&self) {
        self.apply_grayscale(false, true);
    }

    fn on_app_opened(&self, package_name: &str, event: &AppOpenedEvent) {
        if self.ignore_non_full_screen_apps() && !event.is_full_screen {
            return;
        }

        let should_be_grayscale = self.app_exceptions.applies_to(package_name);
        if !should_be_grayscale {
            self.screen_time.eventually_increase_used_up_screen_time();
        } else {
            self.screen_time.eventually_start_tracking();
            let allowance = self.allowed_daily_color_screen_time_ms();
            if allowance > 0 && self.screen_time.used_up_ms() <= allowance {
                return;
            }
        }

        self.apply_grayscale(should_be_grayscale, false);
    }

    fn on_screen_turned_off(&self) {
        self.screen_time.eventually_increase_used_up_screen_time();
    }
}
