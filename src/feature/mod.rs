//! Features: independently activatable interventions
//!
//! A feature is composed from optional parts (schedule, app exceptions, screen-time tracker) and
//! declares a static set of [`Capability`]s. The dispatcher only delivers events a feature has
//! declared a capability for.

mod app_exceptions;
pub mod break_doom_scrolling;
pub mod disable_apps;
pub mod do_not_disturb;
pub mod grayscale;
pub mod pause_button;

use std::fmt;
use std::sync::Arc;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::clock::Clock;
use crate::device::DeviceController;
use crate::events::{AppOpenedEvent, ScrollEvent};
use crate::schedule::FeatureSchedule;
use crate::screen_time::ScreenTimeTracker;
use crate::store::{KeyValueStore, Property};

pub use app_exceptions::{AppExceptionListType, AppExceptions};
pub use break_doom_scrolling::BreakDoomScrollingFeature;
pub use disable_apps::{DisableAppsFeature, DisableAppsMode};
pub use do_not_disturb::DoNotDisturbFeature;
pub use grayscale::GrayscaleAppsFeature;
pub use pause_button::PauseButtonFeature;

/// Stable feature identifier, also the prefix of every persisted setting
pub type FeatureId = &'static str;

/// Event kinds a feature can subscribe to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    AppOpened,
    Scroll,
    ScreenOff,
}

/// Device permissions a feature may depend on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    /// Draw warning surfaces over other apps
    DrawOverlay,
    /// Change secure system settings (color filter)
    WriteSecureSettings,
    /// Change the interruption filter
    NotificationPolicy,
}

/// State every feature carries: identity, activation flag and collaborators.
pub struct FeatureBase {
    id: FeatureId,
    activated: Property<bool>,
    pub(crate) device: Arc<dyn DeviceController>,
    pub(crate) clock: Arc<dyn Clock>,
}

impl fmt::Debug for FeatureBase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FeatureBase")
            .field("id", &self.id)
            .field("activated", &self.activated.get())
            .finish_non_exhaustive()
    }
}

impl FeatureBase {
    pub fn new(
        id: FeatureId,
        store: &Arc<dyn KeyValueStore>,
        device: Arc<dyn DeviceController>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            id,
            activated: Property::load(store.clone(), id, "isActivated", false),
            device,
            clock,
        }
    }
}

/// An intervention the engine can run
pub trait Feature: Send + Sync + fmt::Debug {
    fn base(&self) -> &FeatureBase;

    fn id(&self) -> FeatureId {
        self.base().id
    }

    /// Events this feature subscribes to. Fixed for the lifetime of the feature.
    fn capabilities(&self) -> &'static [Capability] {
        &[]
    }

    fn has_capability(&self, capability: Capability) -> bool {
        self.capabilities().contains(&capability)
    }

    fn is_activated(&self) -> bool {
        self.base().activated.get()
    }

    fn set_activated(&self, activated: bool) {
        self.base().activated.set(activated);
    }

    fn schedule(&self) -> Option<&FeatureSchedule> {
        None
    }

    fn app_exceptions(&self) -> Option<&AppExceptions> {
        None
    }

    fn screen_time(&self) -> Option<&ScreenTimeTracker> {
        None
    }

    fn required_permission(&self) -> Option<Permission> {
        None
    }

    /// Activated and, if the feature has a schedule, inside one of its windows.
    fn is_active_at(&self, at: NaiveDateTime) -> bool {
        self.is_activated() && self.schedule().map_or(true, |s| s.is_scheduled(at))
    }

    fn is_active(&self) -> bool {
        self.is_active_at(self.base().clock.local_now())
    }

    fn on_start(&self) {}

    fn on_pause(&self) {}

    fn on_app_opened(&self, _package_name: &str, _event: &AppOpenedEvent) {}

    fn on_scroll_event(&self, _surface_id: u64, _scroll_view_size: i32, _event: &ScrollEvent) {}

    fn on_screen_turned_off(&self) {}
}


#[cfg(test)]
mod tests {
    use super::testing::SpyFeature;
    use super::*;
    use crate::clock::ManualClock;
    use crate::device::RecordingController;
    use crate::schedule::ScheduleRule;
    use crate::store::MemoryStore;
    use chrono::{NaiveDate, NaiveTime, Weekday};

    fn monday_noon() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 15)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    fn spy() -> SpyFeature {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        SpyFeature::new(
            "SpyFeature",
            &[Capability::Scroll],
            &store,
            Arc::new(RecordingController::new()),
            Arc::new(ManualClock::new(monday_noon())),
        )
    }

    #[test]
    fn test_inactive_until_activated() {
        let feature = spy();
        assert!(!feature.is_active_at(monday_noon()));

        feature.set_activated(true);
        assert!(feature.is_active_at(monday_noon()));
    }

    #[test]
    fn test_schedule_limits_activity() {
        let feature = spy();
        feature.set_activated(true);
        feature.schedule().unwrap().set_rules(vec![ScheduleRule::new(
            [Weekday::Mon],
            NaiveTime::from_hms_opt(8, 0, 0).unwrap(),
            NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
        )]);

        assert!(!feature.is_active_at(monday_noon()));
        assert!(feature.is_active_at(monday_noon() - chrono::Duration::hours(3)));
    }

    #[test]
    fn test_capabilities() {
        let feature = spy();
        assert!(feature.has_capability(Capability::Scroll));
        assert!(!feature.has_capability(Capability::AppOpened));
    }

    #[test]
    fn test_activation_is_persisted_under_feature_key() {
        let store = Arc::new(MemoryStore::new());
        let dyn_store: Arc<dyn KeyValueStore> = store.clone();
        let feature = SpyFeature::new(
            "SpyFeature",
            &[],
            &dyn_store,
            Arc::new(RecordingController::new()),
            Arc::new(ManualClock::new(monday_noon())),
        );

        feature.set_activated(true);
        assert_eq!(
            store.get("SpyFeature_isActivated"),
            Some(crate::store::StoreValue::Bool(true))
        );
    }
}
