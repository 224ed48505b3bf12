//! Engine configuration
//!
//! Tunables that the embedding app may override. Every field has a default, so an empty JSON
//! object is a valid configuration.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// Package id of the embedding app
pub const DEFAULT_HOST_PACKAGE: &str = "com.flx_apps.digitaldetox";

/// Window classes whose foreground changes never count as an app being opened
pub const DEFAULT_IGNORED_EVENT_CLASSES: [&str; 3] = [
    "android.inputmethodservice.SoftInputWindow",
    "com.android.systemui.volume",
    "com.android.quickstep.RecentsActivity",
];

/// Upper bound for every interval, so deadlines stay representable as signed milliseconds
pub const MAX_INTERVAL_MS: u64 = i64::MAX as u64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Minimum age of the cached active-feature set before it is recomputed.
    pub registry_refresh_interval_ms: u64,
    /// How long the pause key must be held to toggle a pause.
    pub pause_key_hold_ms: u64,
    /// Idle lifetime of a tracked scroll surface.
    pub scroll_surface_ttl_ms: u64,
    /// How long an app stays blocked after a doomscrolling warning.
    pub blocked_app_ttl_ms: u64,
    pub host_package: String,
    pub ignored_event_classes: BTreeSet<String>,
    /// Typically the installed input methods.
    pub ignored_packages: BTreeSet<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            registry_refresh_interval_ms: 60_000,
            pause_key_hold_ms: 2_000,
            scroll_surface_ttl_ms: 120_000,
            blocked_app_ttl_ms: 180_000,
            host_package: DEFAULT_HOST_PACKAGE.to_string(),
            ignored_event_classes: DEFAULT_IGNORED_EVENT_CLASSES
                .iter()
                .map(|s| s.to_string())
                .collect(),
            ignored_packages: BTreeSet::new(),
        }
    }
}

impl EngineConfig {
    /// Parse and validate a configuration.
    pub fn from_json(json: &str) -> Result<Self, EngineError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String, EngineError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        let intervals = [
            ("registry_refresh_interval_ms", self.registry_refresh_interval_ms),
            ("pause_key_hold_ms", self.pause_key_hold_ms),
            ("scroll_surface_ttl_ms", self.scroll_surface_ttl_ms),
            ("blocked_app_ttl_ms", self.blocked_app_ttl_ms),
        ];
        if let Some((name, _)) = intervals.iter().find(|(_, value)| *value == 0) {
            return Err(EngineError::InvalidConfig(format!("{} must be positive", name)));
        }
        if let Some((name, _)) = intervals.iter().find(|(_, value)| *value > MAX_INTERVAL_MS) {
            return Err(EngineError::InvalidConfig(format!(
                "{} must not exceed {}",
                name, MAX_INTERVAL_MS
            )));
        }
        if self.host_package.trim().is_empty() {
            return Err(EngineError::InvalidConfig(
                "host_package must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Whether an app-opened event from this package or window class is noise.
    pub fn is_ignored(&self, package_name: &str, class_name: Option<&str>) -> bool {
        self.ignored_packages.contains(package_name)
            || class_name.is_some_and(|class| self.ignored_event_classes.contains(class))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_empty_object_is_default() {
        assert_eq!(EngineConfig::from_json("{}").unwrap(), EngineConfig::default());
    }

    #[test]
    fn test_partial_override() {
        let config = EngineConfig::from_json(
            r#"{"registry_refresh_interval_ms": 1000, "ignored_packages": ["com.example.keyboard"]}"#,
        )
        .unwrap();

        assert_eq!(config.registry_refresh_interval_ms, 1000);
        assert_eq!(config.pause_key_hold_ms, 2000);
        assert!(config.is_ignored("com.example.keyboard", None));
    }

    #[test]
    fn test_zero_interval_is_rejected() {
        let err = EngineConfig::from_json(r#"{"blocked_app_ttl_ms": 0}"#).unwrap_err();
        assert!(err.to_string().contains("blocked_app_ttl_ms"));
    }

    #[test]
    fn test_oversized_interval_is_rejected() {
        let err = EngineConfig::from_json(r#"{"scroll_surface_ttl_ms": 18446744073709551615}"#)
            .unwrap_err();
        assert!(err.to_string().contains("scroll_surface_ttl_ms"));

        let config = EngineConfig {
            blocked_app_ttl_ms: MAX_INTERVAL_MS,
            ..EngineConfig::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_ignored_classes() {
        let config = EngineConfig::default();
        assert!(config.is_ignored("com.android.systemui", Some("com.android.systemui.volume")));
        assert!(!config.is_ignored("com.example.feed", Some("com.example.feed.MainActivity")));
    }

    #[test]
    fn test_round_trip() {
        let config = EngineConfig {
            host_package: "org.example.detox".to_string(),
            ..Default::default()
        };
        assert_eq!(EngineConfig::from_json(&config.to_json().unwrap()).unwrap(), config);
    }
}
