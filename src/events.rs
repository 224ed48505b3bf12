//! Inbound events
//!
//! Plain data versions of the accessibility events the host platform delivers. Every field the
//! platform may omit is optional; the dispatcher decides what to do with incomplete events.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// A window-state change: some app came to the foreground
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AppOpenedEvent {
    #[serde(default)]
    pub package_name: Option<String>,
    #[serde(default)]
    pub class_name: Option<String>,
    #[serde(default = "default_full_screen")]
    pub is_full_screen: bool,
}

fn default_full_screen() -> bool {
    true
}

impl AppOpenedEvent {
    pub fn new(package_name: impl Into<String>) -> Self {
        Self {
            package_name: Some(package_name.into()),
            class_name: None,
            is_full_screen: true,
        }
    }

    pub fn with_class(mut self, class_name: impl Into<String>) -> Self {
        self.class_name = Some(class_name.into());
        self
    }

    pub fn windowed(mut self) -> Self {
        self.is_full_screen = false;
        self
    }
}

/// On-screen rectangle of a view, in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Bounds {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

/// A view-scrolled event
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ScrollEvent {
    pub package_name: Option<String>,
    pub class_name: Option<String>,
    /// Bounds of the source view; absent when the event carries no source node.
    pub bounds: Option<Bounds>,
    pub view_id_resource_name: Option<String>,
    pub item_count: Option<i32>,
    pub max_scroll_y: Option<i32>,
    /// Vertical scroll delta. Platforms that do not report it are treated as having scrolled.
    pub scroll_delta_y: Option<i32>,
}

fn hash_of<T: Hash + ?Sized>(value: &T) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

impl ScrollEvent {
    /// Identity of the scrolled surface.
    ///
    /// Sums the hashes of class, package, bounds and resource id. The node identity is left out
    /// so that successive pages of one feed map to the same surface. Returns `None` when the
    /// event has no source view or no class.
    pub fn surface_id(&self) -> Option<u64> {
        let class_name = self.class_name.as_deref()?;
        let bounds = self.bounds?;
        let package_name = self.package_name.as_deref().unwrap_or_default();
        let resource = self
            .view_id_resource_name
            .as_deref()
            .map(hash_of)
            .unwrap_or(0);

        Some(
            hash_of(class_name)
                .wrapping_add(hash_of(package_name))
                .wrapping_add(hash_of(&bounds))
                .wrapping_add(resource),
        )
    }

    /// Item count when known, else the scroll extent. `None` when neither is usable.
    pub fn scroll_view_size(&self) -> Option<i32> {
        let size = match self.item_count {
            Some(count) if count > 0 => Some(count),
            _ => self.max_scroll_y,
        }?;
        (size >= 0).then_some(size)
    }

    pub fn scroll_delta_y(&self) -> i32 {
        self.scroll_delta_y.unwrap_or(1)
    }
}

/// A hardware key press, reported on release
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyEvent {
    pub key_code: i32,
    /// Time between key down and key up.
    pub press_duration_ms: u64,
}

/// Any input the engine can be driven with, as used by the replay tool and the C surface
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    Start,
    Stop,
    AppOpened(AppOpenedEvent),
    Scroll(ScrollEvent),
    ScreenOff,
    Key(KeyEvent),
    TogglePause,
    SetActivated { feature: String, activated: bool },
}

impl EngineEvent {
    pub fn from_json(json: &str) -> Result<Self, EngineError> {
        serde_json::from_str(json).map_err(|e| EngineError::InvalidEvent(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn feed_event(item_count: i32) -> ScrollEvent {
        ScrollEvent {
            package_name: Some("com.example.feed".to_string()),
            class_name: Some("androidx.recyclerview.widget.RecyclerView".to_string()),
            bounds: Some(Bounds {
                left: 0,
                top: 200,
                right: 1080,
                bottom: 2200,
            }),
            view_id_resource_name: Some("com.example.feed:id/timeline".to_string()),
            item_count: Some(item_count),
            max_scroll_y: None,
            scroll_delta_y: Some(120),
        }
    }

    #[test]
    fn test_surface_id_ignores_content() {
        assert_eq!(feed_event(10).surface_id(), feed_event(40).surface_id());
    }

    #[test]
    fn test_surface_id_differs_by_bounds() {
        let mut other = feed_event(10);
        other.bounds = Some(Bounds {
            left: 0,
            top: 0,
            right: 1080,
            bottom: 600,
        });
        assert_ne!(feed_event(10).surface_id(), other.surface_id());
    }

    #[test]
    fn test_surface_id_requires_source_and_class() {
        let mut no_source = feed_event(10);
        no_source.bounds = None;
        assert_eq!(no_source.surface_id(), None);

        let mut no_class = feed_event(10);
        no_class.class_name = None;
        assert_eq!(no_class.surface_id(), None);
    }

    #[test]
    fn test_scroll_view_size_prefers_item_count() {
        let mut event = feed_event(25);
        event.max_scroll_y = Some(9000);
        assert_eq!(event.scroll_view_size(), Some(25));

        event.item_count = Some(0);
        assert_eq!(event.scroll_view_size(), Some(9000));

        event.max_scroll_y = Some(-1);
        assert_eq!(event.scroll_view_size(), None);

        event.max_scroll_y = None;
        assert_eq!(event.scroll_view_size(), None);
    }

    #[test]
    fn test_missing_delta_counts_as_scrolling() {
        let mut event = feed_event(1);
        event.scroll_delta_y = None;
        assert_eq!(event.scroll_delta_y(), 1);
    }

    #[test]
    fn test_engine_event_from_json() {
        let event = EngineEvent::from_json(
            r#"{"type":"app_opened","package_name":"com.example.game","is_full_screen":false}"#,
        )
        .unwrap();
        assert_eq!(
            event,
            EngineEvent::AppOpened(AppOpenedEvent::new("com.example.game").windowed())
        );

        let key = EngineEvent::from_json(r#"{"type":"key","key_code":25,"press_duration_ms":2500}"#)
            .unwrap();
        assert_eq!(
            key,
            EngineEvent::Key(KeyEvent {
                key_code: 25,
                press_duration_ms: 2500
            })
        );
    }

    #[test]
    fn test_unknown_event_type_is_rejected() {
        let err = EngineEvent::from_json(r#"{"type":"reboot"}"#).unwrap_err();
        assert!(matches!(err, EngineError::InvalidEvent(_)));
    }
}
