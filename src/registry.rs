//! Feature registry
//!
//! Owns the ordered feature list and answers "which features apply right now". The active set
//! is cached and recomputed lazily once it is older than the refresh interval. A periodic
//! recompute only takes privileges away: features that dropped out are paused, features that
//! became active are not started. Starting happens on engine start, on resume and on explicit
//! activation.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use crate::clock::Clock;
use crate::config::EngineConfig;
use crate::device::DeviceController;
use crate::engine::EngineState;
use crate::feature::{
    BreakDoomScrollingFeature, Capability, DisableAppsFeature, DoNotDisturbFeature, Feature,
    FeatureId, GrayscaleAppsFeature, PauseButtonFeature,
};
use crate::store::KeyValueStore;

/// The built-in features, with typed handles for settings access
#[derive(Debug, Clone)]
pub struct DefaultFeatures {
    pub grayscale: Arc<GrayscaleAppsFeature>,
    pub do_not_disturb: Arc<DoNotDisturbFeature>,
    pub break_doom_scrolling: Arc<BreakDoomScrollingFeature>,
    pub disable_apps: Arc<DisableAppsFeature>,
    pub pause_button: Arc<PauseButtonFeature>,
}

impl DefaultFeatures {
    pub fn new(
        config: &EngineConfig,
        store: Arc<dyn KeyValueStore>,
        device: Arc<dyn DeviceController>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            grayscale: Arc::new(GrayscaleAppsFeature::new(
                &store,
                device.clone(),
                clock.clone(),
                config.host_package.clone(),
            )),
            do_not_disturb: Arc::new(DoNotDisturbFeature::new(
                &store,
                device.clone(),
                clock.clone(),
            )),
            break_doom_scrolling: Arc::new(BreakDoomScrollingFeature::new(
                &store,
                device.clone(),
                clock.clone(),
                config,
            )),
            disable_apps: Arc::new(DisableAppsFeature::new(&store, device.clone(), clock.clone())),
            pause_button: Arc::new(PauseButtonFeature::new(&store, device, clock)),
        }
    }

    /// All features in display order.
    pub fn to_list(&self) -> Vec<Arc<dyn Feature>> {
        vec![
            self.grayscale.clone() as Arc<dyn Feature>,
            self.do_not_disturb.clone() as Arc<dyn Feature>,
            self.break_doom_scrolling.clone() as Arc<dyn Feature>,
            self.disable_apps.clone() as Arc<dyn Feature>,
            self.pause_button.clone() as Arc<dyn Feature>,
        ]
    }
}

#[derive(Debug, Default)]
struct ActiveCache {
    features: Vec<Arc<dyn Feature>>,
    computed_at: Option<u64>,
}

#[derive(Debug)]
pub struct FeatureRegistry {
    features: Vec<Arc<dyn Feature>>,
    by_id: HashMap<FeatureId, Arc<dyn Feature>>,
    subscribers: HashMap<Capability, HashSet<FeatureId>>,
    clock: Arc<dyn Clock>,
    refresh_interval_ms: u64,
    active: Mutex<ActiveCache>,
}

impl FeatureRegistry {
    /// Build a registry over `features`, kept in the given order.
    pub fn new(
        features: Vec<Arc<dyn Feature>>,
        clock: Arc<dyn Clock>,
        refresh_interval_ms: u64,
    ) -> Self {
        let by_id = features.iter().map(|f| (f.id(), f.clone())).collect();
        let mut subscribers: HashMap<Capability, HashSet<FeatureId>> = HashMap::new();
        for feature in &features {
            for capability in feature.capabilities() {
                subscribers.entry(*capability).or_default().insert(feature.id());
            }
        }
        Self {
            features,
            by_id,
            subscribers,
            clock,
            refresh_interval_ms,
            active: Mutex::new(ActiveCache::default()),
        }
    }

    pub fn features(&self) -> &[Arc<dyn Feature>] {
        &self.features
    }

    pub fn get(&self, id: &str) -> Option<Arc<dyn Feature>> {
        self.by_id.get(id).cloned()
    }

    /// The cached active set, recomputed when older than the refresh interval.
    ///
    /// When `running`, features that dropped out of the set are paused.
    pub fn active_features(&self, running: bool) -> Vec<Arc<dyn Feature>> {
        let now = self.clock.millis();
        let (active, dropped) = {
            let mut cache = self.active.lock().unwrap_or_else(|e| e.into_inner());
            let stale = cache
                .computed_at
                .map_or(true, |at| now.saturating_sub(at) > self.refresh_interval_ms);
            let mut dropped = Vec::new();
            if stale {
                let at = self.clock.local_now();
                let fresh: Vec<Arc<dyn Feature>> = self
                    .features
                    .iter()
                    .filter(|f| f.is_active_at(at))
                    .cloned()
                    .collect();
                if running {
                    dropped = cache
                        .features
                        .iter()
                        .filter(|old| !fresh.iter().any(|f| f.id() == old.id()))
                        .cloned()
                        .collect();
                }
                cache.features = fresh;
                cache.computed_at = Some(now);
            }
            (cache.features.clone(), dropped)
        };

        for feature in dropped {
            log::debug!("{} is no longer active, pausing", feature.id());
            feature.on_pause();
        }
        active
    }

    /// Recompute the active set now, regardless of its age.
    pub fn reload_active_features(&self, running: bool) -> Vec<Arc<dyn Feature>> {
        self.active
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .computed_at = None;
        self.active_features(running)
    }

    /// Active features subscribed to `capability`, in display order.
    pub fn active_subscribers(
        &self,
        capability: Capability,
        running: bool,
    ) -> Vec<Arc<dyn Feature>> {
        let Some(subscribers) = self.subscribers.get(&capability) else {
            return Vec::new();
        };
        self.active_features(running)
            .into_iter()
            .filter(|f| subscribers.contains(f.id()))
            .collect()
    }

    /// Apply a changed activation flag of one feature.
    ///
    /// Forces a reload, then starts or pauses that feature alone if the engine is active.
    pub fn start_or_stop_feature(&self, id: &str, state: EngineState) {
        let Some(feature) = self.get(id) else {
            return;
        };
        self.reload_active_features(state != EngineState::Inactive);
        if state != EngineState::Active {
            return;
        }
        if feature.is_active() {
            log::debug!("starting {}", feature.id());
            feature.on_start();
        } else {
            log::debug!("pausing {}", feature.id());
            feature.on_pause();
        }
    }
}
