//! Event dispatcher
//!
//! [`DetoxEngine`] receives raw platform events, filters and de-duplicates them and fans them
//! out to the features that are active and subscribed. It also owns the engine lifecycle and the
//! global pause.
//!
//! ```text
//!            start                 toggle_pause
//! Inactive ---------> Active <----------------> Paused
//!    ^                  |                          |
//!    +---- shutdown ----+-------- shutdown --------+
//! ```

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use serde::{Deserialize, Serialize};

use crate::clock::Clock;
use crate::config::EngineConfig;
use crate::device::DeviceController;
use crate::error::EngineError;
use crate::events::{AppOpenedEvent, EngineEvent, KeyEvent, ScrollEvent};
use crate::feature::{Capability, Feature, PauseButtonFeature};
use crate::pause::{PauseController, PauseOutcome};
use crate::registry::{DefaultFeatures, FeatureRegistry};
use crate::schedule::ScheduleRule;
use crate::store::KeyValueStore;

/// Overall engine state, derived from the lifecycle and the pause
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EngineState {
    Active,
    Paused,
    Inactive,
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Active => "Active",
            Self::Paused => "Paused",
            Self::Inactive => "Inactive",
        };
        f.write_str(name)
    }
}

/// Consumer that sees key events before the engine. Returning `true` consumes the event.
pub type KeyListener = Box<dyn Fn(&KeyEvent) -> bool + Send + Sync>;

pub struct DetoxEngine {
    config: EngineConfig,
    device: Arc<dyn DeviceController>,
    registry: FeatureRegistry,
    pause: PauseController,
    defaults: Option<DefaultFeatures>,
    running: AtomicBool,
    last_package: Mutex<Option<String>>,
    key_listener: RwLock<Option<KeyListener>>,
    reported_state: Mutex<EngineState>,
}

impl fmt::Debug for DetoxEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DetoxEngine")
            .field("config", &self.config)
            .field("registry", &self.registry)
            .field("pause", &self.pause)
            .field("running", &self.running)
            .finish_non_exhaustive()
    }
}

impl DetoxEngine {
    /// Build an engine with the built-in features, loading their settings from `store`.
    pub fn new(
        config: EngineConfig,
        store: Arc<dyn KeyValueStore>,
        device: Arc<dyn DeviceController>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, EngineError> {
        config.validate()?;
        let defaults = DefaultFeatures::new(&config, store, device.clone(), clock.clone());
        let mut engine = Self::with_features(
            config,
            defaults.to_list(),
            defaults.pause_button.clone(),
            device,
            clock,
        );
        engine.defaults = Some(defaults);
        Ok(engine)
    }

    /// Build an engine over an explicit feature list. `pause_button` supplies the pause settings
    /// and should also be part of `features`.
    pub fn with_features(
        config: EngineConfig,
        features: Vec<Arc<dyn Feature>>,
        pause_button: Arc<PauseButtonFeature>,
        device: Arc<dyn DeviceController>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let registry =
            FeatureRegistry::new(features, clock.clone(), config.registry_refresh_interval_ms);
        let pause = PauseController::new(pause_button, clock, config.pause_key_hold_ms);
        Self {
            config,
            device,
            registry,
            pause,
            defaults: None,
            running: AtomicBool::new(false),
            last_package: Mutex::new(None),
            key_listener: RwLock::new(None),
            reported_state: Mutex::new(EngineState::Inactive),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn registry(&self) -> &FeatureRegistry {
        &self.registry
    }

    pub fn pause_controller(&self) -> &PauseController {
        &self.pause
    }

    /// Typed handles to the built-in features, when built with [`DetoxEngine::new`].
    pub fn default_features(&self) -> Option<&DefaultFeatures> {
        self.defaults.as_ref()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Current state. Transitions are logged the first time they are observed.
    pub fn state(&self) -> EngineState {
        let state = if !self.is_running() {
            EngineState::Inactive
        } else if self.pause.is_pausing() {
            EngineState::Paused
        } else {
            EngineState::Active
        };
        let mut reported = self
            .reported_state
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        if *reported != state {
            log::info!("engine state {} -> {}", *reported, state);
            *reported = state;
        }
        state
    }

    /// Start delivering events and start every active feature.
    ///
    /// Inside a pause window features stay paused; they pick up again with the first events
    /// after the window ends.
    pub fn start(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }
        *self.last_package.lock().unwrap_or_else(|e| e.into_inner()) = None;
        if self.pause.is_pausing() {
            self.state();
            return;
        }
        for feature in self.registry.active_features(true) {
            log::debug!("starting {}", feature.id());
            feature.on_start();
        }
        self.state();
    }

    /// Pause every active feature and stop delivering events.
    pub fn shutdown(&self) {
        if !self.is_running() {
            return;
        }
        for feature in self.registry.active_features(true) {
            log::debug!("pausing {}", feature.id());
            feature.on_pause();
        }
        self.running.store(false, Ordering::SeqCst);
        self.state();
    }

    /// Whether app and scroll events should currently reach features.
    fn accepts_input(&self) -> bool {
        self.is_running() && !self.pause.is_pausing()
    }

    pub fn on_app_opened(&self, event: &AppOpenedEvent) {
        if !self.accepts_input() {
            return;
        }
        let Some(package_name) = event.package_name.as_deref() else {
            return;
        };
        {
            let mut last = self.last_package.lock().unwrap_or_else(|e| e.into_inner());
            if last.as_deref() == Some(package_name) {
                return;
            }
            *last = Some(package_name.to_string());
        }
        if self
            .config
            .is_ignored(package_name, event.class_name.as_deref())
        {
            log::trace!("ignoring window change of {}", package_name);
            return;
        }

        for feature in self
            .registry
            .active_subscribers(Capability::AppOpened, true)
        {
            feature.on_app_opened(package_name, event);
        }
    }

    pub fn on_scroll_event(&self, event: &ScrollEvent) {
        if !self.accepts_input() {
            return;
        }
        let (Some(surface_id), Some(scroll_view_size)) =
            (event.surface_id(), event.scroll_view_size())
        else {
            log::trace!("dropping scroll event without source or size");
            return;
        };

        for feature in self.registry.active_subscribers(Capability::Scroll, true) {
            feature.on_scroll_event(surface_id, scroll_view_size, event);
        }
    }

    /// Delivered while running, also during a pause, so that screen-time sessions get closed.
    pub fn on_screen_turned_off(&self) {
        if !self.is_running() {
            return;
        }
        for feature in self
            .registry
            .active_subscribers(Capability::ScreenOff, true)
        {
            feature.on_screen_turned_off();
        }
    }

    /// Handle a released key. Returns whether the event was consumed.
    pub fn on_key_event(&self, event: &KeyEvent) -> bool {
        {
            let listener = self.key_listener.read().unwrap_or_else(|e| e.into_inner());
            if listener.as_ref().is_some_and(|listener| listener(event)) {
                return true;
            }
        }
        if self.pause.is_pause_trigger(event) {
            self.toggle_pause();
        }
        false
    }

    pub fn set_key_listener(&self, listener: Option<KeyListener>) {
        *self.key_listener.write().unwrap_or_else(|e| e.into_inner()) = listener;
    }

    /// Begin or end a pause. Rejections are an ordinary outcome.
    pub fn toggle_pause(&self) -> PauseOutcome {
        if !self.is_running() {
            return PauseOutcome::NotRunning;
        }
        let outcome = self.pause.toggle();
        match outcome {
            PauseOutcome::Paused { until_ms } => {
                let pause_id = self.pause.feature().id();
                for feature in self.registry.active_features(true) {
                    if feature.id() != pause_id {
                        feature.on_pause();
                    }
                }
                log::info!("paused until {}", until_ms);
            }
            PauseOutcome::Resumed => self.start_active_features(),
            PauseOutcome::Rejected { retry_in_ms } => {
                log::info!("pause rejected, next pause possible in {}s", retry_in_ms / 1000);
            }
            PauseOutcome::Disabled | PauseOutcome::NotRunning => {}
        }
        self.state();
        outcome
    }

    /// End any pause and restart the active features.
    pub fn resume(&self) {
        self.pause.resume();
        self.start_active_features();
        self.state();
    }

    fn start_active_features(&self) {
        if !self.is_running() {
            return;
        }
        for feature in self.registry.active_features(true) {
            feature.on_start();
        }
    }

    /// Change a feature's activation flag and apply it immediately.
    ///
    /// Activation fails when the feature's permission is missing.
    pub fn set_feature_activated(&self, id: &str, activated: bool) -> Result<(), EngineError> {
        let feature = self
            .registry
            .get(id)
            .ok_or_else(|| EngineError::UnknownFeature(id.to_string()))?;
        if activated {
            if let Some(permission) = feature.required_permission() {
                if !self.device.has_permission(permission) {
                    return Err(EngineError::PermissionDenied {
                        feature: id.to_string(),
                        permission,
                    });
                }
            }
        }
        if feature.is_activated() == activated {
            return Ok(());
        }
        feature.set_activated(activated);
        self.registry.start_or_stop_feature(id, self.state());
        Ok(())
    }

    /// Replace a feature's schedule and apply it immediately.
    pub fn set_schedule_rules(&self, id: &str, rules: Vec<ScheduleRule>) -> Result<(), EngineError> {
        let feature = self
            .registry
            .get(id)
            .ok_or_else(|| EngineError::UnknownFeature(id.to_string()))?;
        let Some(schedule) = feature.schedule() else {
            return Err(EngineError::InvalidScheduleRule(format!(
                "{} has no schedule",
                id
            )));
        };
        schedule.set_rules(rules);
        self.registry.start_or_stop_feature(id, self.state());
        Ok(())
    }

    /// Drive the engine with one decoded event.
    pub fn dispatch(&self, event: &EngineEvent) -> Result<(), EngineError> {
        match event {
            EngineEvent::Start => self.start(),
            EngineEvent::Stop => self.shutdown(),
            EngineEvent::AppOpened(e) => self.on_app_opened(e),
            EngineEvent::Scroll(e) => self.on_scroll_event(e),
            EngineEvent::ScreenOff => self.on_screen_turned_off(),
            EngineEvent::Key(e) => {
                self.on_key_event(e);
            }
            EngineEvent::TogglePause => {
                self.toggle_pause();
            }
            EngineEvent::SetActivated { feature, activated } => {
                self.set_feature_activated(feature, *activated)?
            }
        }
        Ok(())
    }
}
