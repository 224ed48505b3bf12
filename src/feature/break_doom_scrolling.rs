//! Break doomscrolling: detect infinitely growing feeds and interrupt long sessions.
//!
//! A surface is considered infinite once its content has grown by more than one item three
//! times. When the user has stayed on an infinite surface for longer than the warning threshold
//! (measured from the first observation of that surface) a break screen is shown and the app is
//! blocked for a while: every further scroll in it re-shows the warning.

use std::sync::{Arc, Mutex};

use crate::clock::Clock;
use crate::config::EngineConfig;
use crate::device::{DeviceController, WarningKind};
use crate::events::ScrollEvent;
use crate::expiring_map::SelfExpiringMap;
use crate::schedule::FeatureSchedule;
use crate::store::{KeyValueStore, Property};

use super::{
    AppExceptionListType, AppExceptions, Capability, Feature, FeatureBase, FeatureId, Permission,
};

pub const BREAK_DOOM_SCROLLING_FEATURE_ID: FeatureId = "BreakDoomScrollingFeature";

/// Growth events needed before a surface counts as infinite
pub const INFINITE_GROWTH_COUNT: u32 = 3;

const DEFAULT_TIME_UNTIL_WARNING_MS: u64 = 3 * 60 * 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScrollSurfaceInfo {
    pub observed_size: i32,
    pub created_at: u64,
    pub growth_count: u32,
}

impl ScrollSurfaceInfo {
    fn new(observed_size: i32, created_at: u64) -> Self {
        Self {
            observed_size,
            created_at,
            growth_count: 0,
        }
    }

    /// Record a new size. Growth by a single item is pagination noise; shrinking starts over.
    fn observe(&mut self, size: i32) {
        let growth = size - self.observed_size;
        self.observed_size = size;
        if growth > 1 {
            self.growth_count += 1;
        } else if growth < 0 {
            self.growth_count = 0;
        }
    }

    pub fn is_infinite(&self) -> bool {
        self.growth_count >= INFINITE_GROWTH_COUNT
    }
}

#[derive(Debug)]
pub struct BreakDoomScrollingFeature {
    base: FeatureBase,
    schedule: FeatureSchedule,
    app_exceptions: AppExceptions,
    time_until_warning: Property<u64>,
    surfaces: SelfExpiringMap<u64, ScrollSurfaceInfo>,
    /// Package -> time the warning was shown
    blocked_apps: SelfExpiringMap<String, u64>,
    scan: Mutex<()>,
}

impl BreakDoomScrollingFeature {
    pub fn new(
        store: &Arc<dyn KeyValueStore>,
        device: Arc<dyn DeviceController>,
        clock: Arc<dyn Clock>,
        config: &EngineConfig,
    ) -> Self {
        let id = BREAK_DOOM_SCROLLING_FEATURE_ID;
        Self {
            schedule: FeatureSchedule::load(store.clone(), id),
            app_exceptions: AppExceptions::load(
                store.clone(),
                id,
                AppExceptionListType::Include,
                AppExceptionListType::ALL,
            ),
            time_until_warning: Property::load(
                store.clone(),
                id,
                "timeUntilWarning",
                DEFAULT_TIME_UNTIL_WARNING_MS,
            ),
            surfaces: SelfExpiringMap::new(config.scroll_surface_ttl_ms, clock.clone()),
            blocked_apps: SelfExpiringMap::new(config.blocked_app_ttl_ms, clock.clone()),
            scan: Mutex::new(()),
            base: FeatureBase::new(id, store, device, clock),
        }
    }

    pub fn time_until_warning_ms(&self) -> u64 {
        self.time_until_warning.get()
    }

    pub fn set_time_until_warning_ms(&self, ms: u64) {
        self.time_until_warning.set(ms);
    }

    /// Current tracking state of a surface, without renewing it.
    pub fn surface(&self, surface_id: u64) -> Option<ScrollSurfaceInfo> {
        self.surfaces.peek(&surface_id)
    }

    pub fn is_blocked(&self, package_name: &str) -> bool {
        self.blocked_apps.contains_key(&package_name.to_string())
    }

    fn block(&self, package_name: &str) {
        self.blocked_apps
            .put(package_name.to_string(), self.base.clock.millis());
    }

    fn show_break_screen(&self, package_name: &str) {
        if !self
            .base
            .device
            .show_warning(WarningKind::DoomScrolling, package_name)
        {
            log::warn!("failed to show doomscrolling warning for {}", package_name);
        }
    }

    /// Update the surface state for one scroll. Returns whether the break screen is due.
    fn scan_surface(&self, surface_id: u64, scroll_view_size: i32, package_name: &str) -> bool {
        let _scan = self.scan.lock().unwrap_or_else(|e| e.into_inner());

        if self.is_blocked(package_name) {
            log::debug!("{} is blocked, re-showing break screen", package_name);
            self.block(package_name);
            return true;
        }

        if !self.app_exceptions.applies_to(package_name) {
            return false;
        }

        let now = self.base.clock.millis();
        let Some(mut info) = self.surfaces.get(&surface_id) else {
            self.surfaces
                .put(surface_id, ScrollSurfaceInfo::new(scroll_view_size, now));
            return false;
        };

        info.observe(scroll_view_size);
        self.surfaces.put(surface_id, info);
        log::trace!("surface {:x} in {}: {:?}", surface_id, package_name, info);

        let scrolling_ms = now.saturating_sub(info.created_at);
        if info.is_infinite() && scrolling_ms >= self.time_until_warning_ms() {
            log::info!(
                "doomscrolling detected in {} after {}s",
                package_name,
                scrolling_ms / 1000
            );
            self.block(package_name);
            self.surfaces.clear();
            return true;
        }
        false
    }
}

impl Feature for BreakDoomScrollingFeature {
    fn base(&self) -> &FeatureBase {
        &self.base
    }

    fn capabilities(&self) -> &'static [Capability] {
        &[Capability::Scroll]
    }

    fn schedule(&self) -> Option<&FeatureSchedule> {
        Some(&self.schedule)
    }

    fn app_exceptions(&self) -> Option<&AppExceptions> {
        Some(&self.app_exceptions)
    }

    fn required_permission(&self) -> Option<Permission> {
        Some(Permission::DrawOverlay)
    }

    fn on_scroll_event(&self, surface_id: u64, scroll_view_size: i32, event: &ScrollEvent) {
        if event.scroll_delta_y() == 0 {
            return;
        }
        let package_name = event.package_name.as_deref().unwrap_or_default();

        if self.scan_surface(surface_id, scroll_view_size, package_name) {
            self.show_break_screen(package_name);
        }
    }
}
