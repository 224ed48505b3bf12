//! Enforcement collaborators
//!
//! The engine decides what should happen; a [`DeviceController`] does it. Every command is
//! fire-and-forget and reports failure (typically a missing permission) as `false`.

use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::feature::Permission;

/// Warning surfaces the engine can ask the host to show
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    /// Break screen shown when doomscrolling is detected
    DoomScrolling,
    /// Screen shown when a disabled app is opened
    AppDisabled,
}

/// Port to the device: system settings, device policy and overlays
///
/// The engine holds none of its own locks while calling into a controller, so an
/// implementation may call back into the engine.
pub trait DeviceController: Send + Sync {
    /// Turn the grayscale color filter on or off, optionally together with extra dim.
    fn set_grayscale(&self, enabled: bool, extra_dim: bool) -> bool;

    /// Switch do-not-disturb (priority-only interruptions) on or off.
    fn set_do_not_disturb(&self, enabled: bool) -> bool;

    /// Whether do-not-disturb is currently on.
    fn is_do_not_disturb_enabled(&self) -> bool;

    /// Hide or unhide an app through device policy.
    fn set_app_hidden(&self, package_name: &str, hidden: bool) -> bool;

    /// Whether the app may hide other apps (device admin granted).
    fn can_hide_apps(&self) -> bool;

    /// Show a warning surface on top of `package_name`.
    fn show_warning(&self, kind: WarningKind, package_name: &str) -> bool;

    /// Whether `permission` is currently granted.
    fn has_permission(&self, permission: Permission) -> bool;
}

/// A command issued to the device, as recorded by [`RecordingController`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum DeviceCommand {
    SetGrayscale { enabled: bool, extra_dim: bool },
    SetDoNotDisturb { enabled: bool },
    SetAppHidden { package_name: String, hidden: bool },
    ShowWarning { kind: WarningKind, package_name: String },
}

#[derive(Debug)]
struct RecorderState {
    commands: Vec<DeviceCommand>,
    do_not_disturb: bool,
    granted: Vec<Permission>,
    can_hide_apps: bool,
}

/// Controller that records commands instead of touching a device.
///
/// Used by the replay tool and by tests. All permissions are granted unless revoked.
#[derive(Debug)]
pub struct RecordingController {
    state: Mutex<RecorderState>,
}

impl Default for RecordingController {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingController {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(RecorderState {
                commands: Vec::new(),
                do_not_disturb: false,
                granted: vec![
                    Permission::DrawOverlay,
                    Permission::WriteSecureSettings,
                    Permission::NotificationPolicy,
                ],
                can_hide_apps: true,
            }),
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, RecorderState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn record(&self, command: DeviceCommand) {
        log::debug!("device command: {:?}", command);
        self.state().commands.push(command);
    }

    /// All commands recorded so far.
    pub fn commands(&self) -> Vec<DeviceCommand> {
        self.state().commands.clone()
    }

    /// Remove and return all recorded commands.
    pub fn take_commands(&self) -> Vec<DeviceCommand> {
        std::mem::take(&mut self.state().commands)
    }

    /// Number of warnings of `kind` shown so far.
    pub fn warnings(&self, kind: WarningKind) -> usize {
        self.state()
            .commands
            .iter()
            .filter(|c| matches!(c, DeviceCommand::ShowWarning { kind: k, .. } if *k == kind))
            .count()
    }

    pub fn revoke(&self, permission: Permission) {
        self.state().granted.retain(|p| *p != permission);
    }

    pub fn set_can_hide_apps(&self, can_hide: bool) {
        self.state().can_hide_apps = can_hide;
    }

    /// Simulate the user toggling do-not-disturb outside the engine.
    pub fn set_external_do_not_disturb(&self, enabled: bool) {
        self.state().do_not_disturb = enabled;
    }
}

impl DeviceController for RecordingController {
    fn set_grayscale(&self, enabled: bool, extra_dim: bool) -> bool {
        self.record(DeviceCommand::SetGrayscale { enabled, extra_dim });
        true
    }

    fn set_do_not_disturb(&self, enabled: bool) -> bool {
        self.record(DeviceCommand::SetDoNotDisturb { enabled });
        self.state().do_not_disturb = enabled;
        true
    }

    fn is_do_not_disturb_enabled(&self) -> bool {
        self.state().do_not_disturb
    }

    fn set_app_hidden(&self, package_name: &str, hidden: bool) -> bool {
        self.record(DeviceCommand::SetAppHidden {
            package_name: package_name.to_string(),
            hidden,
        });
        true
    }

    fn can_hide_apps(&self) -> bool {
        self.state().can_hide_apps
    }

    fn show_warning(&self, kind: WarningKind, package_name: &str) -> bool {
        self.record(DeviceCommand::ShowWarning {
            kind,
            package_name: package_name.to_string(),
        });
        true
    }

    fn has_permission(&self, permission: Permission) -> bool {
        self.state().granted.contains(&permission)
    }
}

/// Recording controller that runs a one-shot callback from inside the next device call.
#[cfg(test)]
pub(crate) struct ReentrantController {
    inner: RecordingController,
    callback: Mutex<Option<Box<dyn FnOnce() + Send>>>,
}

#[cfg(test)]
impl ReentrantController {
    pub(crate) fn new() -> Self {
        Self {
            inner: RecordingController::new(),
            callback: Mutex::new(None),
        }
    }

    pub(crate) fn inner(&self) -> &RecordingController {
        &self.inner
    }

    pub(crate) fn on_next_call(&self, callback: impl FnOnce() + Send + 'static) {
        *self.callback.lock().unwrap_or_else(|e| e.into_inner()) = Some(Box::new(callback));
    }

    fn run_callback(&self) {
        let callback = self.callback.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(callback) = callback {
            callback();
        }
    }
}

#[cfg(test)]
impl DeviceController for ReentrantController {
    fn set_grayscale(&self, enabled: bool, extra_dim: bool) -> bool {
        self.run_callback();
        self.inner.set_grayscale(enabled, extra_dim)
    }

    fn set_do_not_disturb(&self, enabled: bool) -> bool {
        self.run_callback();
        self.inner.set_do_not_disturb(enabled)
    }

    fn is_do_not_disturb_enabled(&self) -> bool {
        self.run_callback();
        self.inner.is_do_not_disturb_enabled()
    }

    fn set_app_hidden(&self, package_name: &str, hidden: bool) -> bool {
        self.run_callback();
        self.inner.set_app_hidden(package_name, hidden)
    }

    fn can_hide_apps(&self) -> bool {
        self.inner.can_hide_apps()
    }

    fn show_warning(&self, kind: WarningKind, package_name: &str) -> bool {
        self.run_callback();
        self.inner.show_warning(kind, package_name)
    }

    fn has_permission(&self, permission: Permission) -> bool {
        self.inner.has_permission(permission)
    }
}
