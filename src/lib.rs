//! Detox Engine - On-device feature engine for digital-detox interventions
//!
//! The engine receives platform events (app switches, scrolls, screen-off, hardware keys),
//! decides which detox features apply right now and lets them enforce their policy through a
//! host-supplied device controller:
//! event → filter/dedupe → active subscribers → feature policy → device command.
//!
//! ## Features
//!
//! - **Grayscale**: Render the screen in grayscale outside exempted apps
//! - **Do Not Disturb**: Keep zen mode on while the feature is active
//! - **Break Doom Scrolling**: Warn when a scroll surface keeps growing
//! - **Disable Apps**: Block or hide selected apps after a daily allowance
//! - **Pause Button**: Suspend everything for a while

pub mod clock;
pub mod config;
pub mod device;
pub mod engine;
pub mod error;
pub mod events;
pub mod expiring_map;
pub mod feature;
pub mod pause;
pub mod registry;
pub mod schedule;
pub mod screen_time;
pub mod store;

// FFI bindings for C interop (always available for cdylib/staticlib builds)
pub mod ffi;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::EngineConfig;
pub use device::{DeviceCommand, DeviceController, RecordingController, WarningKind};
pub use engine::{DetoxEngine, EngineState};
pub use error::EngineError;
pub use events::{AppOpenedEvent, EngineEvent, KeyEvent, ScrollEvent};
pub use feature::{Capability, Feature, FeatureId, Permission};
pub use pause::PauseOutcome;
pub use registry::{DefaultFeatures, FeatureRegistry};
pub use schedule::ScheduleRule;
pub use store::{KeyValueStore, MemoryStore, StoreValue};

/// Engine version reported over FFI and by the CLI
pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");
