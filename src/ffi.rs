//! FFI bindings for the detox engine
//!
//! This module provides C-compatible functions for embedding the engine in a host app.
//! All functions use C strings (null-terminated) and return allocated memory that
//! must be freed by the caller using `detox_free_string`.
//!
//! The host performs enforcement through a [`DetoxCallbacks`] table supplied at creation.

use std::cell::RefCell;
use std::ffi::{c_void, CStr, CString};
use std::os::raw::c_char;
use std::ptr;
use std::sync::Arc;

use crate::clock::SystemClock;
use crate::config::EngineConfig;
use crate::device::{DeviceController, WarningKind};
use crate::engine::DetoxEngine;
use crate::events::{EngineEvent, KeyEvent};
use crate::feature::Permission;
use crate::store::MemoryStore;

// Thread-local storage for the last error message
thread_local! {
    static LAST_ERROR: RefCell<Option<CString>> = const { RefCell::new(None) };
}

/// Set the last error message
fn set_last_error(msg: &str) {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = CString::new(msg).ok();
    });
}

/// Clear the last error message
fn clear_last_error() {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = None;
    });
}

/// Helper to convert C string to Rust string
unsafe fn cstr_to_string(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    CStr::from_ptr(ptr).to_str().ok().map(|s| s.to_string())
}

/// Helper to convert Rust string to C string (caller must free)
fn string_to_cstr(s: &str) -> *mut c_char {
    match CString::new(s) {
        Ok(cstr) => cstr.into_raw(),
        Err(_) => ptr::null_mut(),
    }
}

// ============================================================================
// Host callbacks
// ============================================================================

/// Permission codes passed to `has_permission`
pub const DETOX_PERMISSION_DRAW_OVERLAY: i32 = 0;
pub const DETOX_PERMISSION_WRITE_SECURE_SETTINGS: i32 = 1;
pub const DETOX_PERMISSION_NOTIFICATION_POLICY: i32 = 2;

/// Warning codes passed to `show_warning`
pub const DETOX_WARNING_DOOM_SCROLLING: i32 = 0;
pub const DETOX_WARNING_APP_DISABLED: i32 = 1;

/// Enforcement callbacks implemented by the host.
///
/// Every callback receives `user_data` as its first argument and returns whether the command
/// succeeded. A missing callback counts as failure. The engine holds no internal lock while a
/// callback runs, so a callback may call back into the engine on the same thread.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct DetoxCallbacks {
    pub user_data: *mut c_void,
    pub set_grayscale: Option<unsafe extern "C" fn(*mut c_void, bool, bool) -> bool>,
    pub set_do_not_disturb: Option<unsafe extern "C" fn(*mut c_void, bool) -> bool>,
    pub is_do_not_disturb_enabled: Option<unsafe extern "C" fn(*mut c_void) -> bool>,
    pub set_app_hidden: Option<unsafe extern "C" fn(*mut c_void, *const c_char, bool) -> bool>,
    pub can_hide_apps: Option<unsafe extern "C" fn(*mut c_void) -> bool>,
    pub show_warning: Option<unsafe extern "C" fn(*mut c_void, i32, *const c_char) -> bool>,
    pub has_permission: Option<unsafe extern "C" fn(*mut c_void, i32) -> bool>,
}

/// [`DeviceController`] forwarding to host callbacks
#[derive(Debug)]
struct FfiDeviceController {
    callbacks: DetoxCallbacks,
}

// SAFETY: the host guarantees that `user_data` and the callbacks may be used from any thread
// for the lifetime of the engine handle.
unsafe impl Send for FfiDeviceController {}
unsafe impl Sync for FfiDeviceController {}

fn permission_code(permission: Permission) -> i32 {
    match permission {
        Permission::DrawOverlay => DETOX_PERMISSION_DRAW_OVERLAY,
        Permission::WriteSecureSettings => DETOX_PERMISSION_WRITE_SECURE_SETTINGS,
        Permission::NotificationPolicy => DETOX_PERMISSION_NOTIFICATION_POLICY,
    }
}

fn warning_code(kind: WarningKind) -> i32 {
    match kind {
        WarningKind::DoomScrolling => DETOX_WARNING_DOOM_SCROLLING,
        WarningKind::AppDisabled => DETOX_WARNING_APP_DISABLED,
    }
}

impl DeviceController for FfiDeviceController {
    fn set_grayscale(&self, enabled: bool, extra_dim: bool) -> bool {
        match self.callbacks.set_grayscale {
            Some(f) => unsafe { f(self.callbacks.user_data, enabled, extra_dim) },
            None => false,
        }
    }

    fn set_do_not_disturb(&self, enabled: bool) -> bool {
        match self.callbacks.set_do_not_disturb {
            Some(f) => unsafe { f(self.callbacks.user_data, enabled) },
            None => false,
        }
    }

    fn is_do_not_disturb_enabled(&self) -> bool {
        match self.callbacks.is_do_not_disturb_enabled {
            Some(f) => unsafe { f(self.callbacks.user_data) },
            None => false,
        }
    }

    fn set_app_hidden(&self, package_name: &str, hidden: bool) -> bool {
        let (Some(f), Ok(package)) = (self.callbacks.set_app_hidden, CString::new(package_name))
        else {
            return false;
        };
        unsafe { f(self.callbacks.user_data, package.as_ptr(), hidden) }
    }

    fn can_hide_apps(&self) -> bool {
        match self.callbacks.can_hide_apps {
            Some(f) => unsafe { f(self.callbacks.user_data) },
            None => false,
        }
    }

    fn show_warning(&self, kind: WarningKind, package_name: &str) -> bool {
        let (Some(f), Ok(package)) = (self.callbacks.show_warning, CString::new(package_name))
        else {
            return false;
        };
        unsafe { f(self.callbacks.user_data, warning_code(kind), package.as_ptr()) }
    }

    fn has_permission(&self, permission: Permission) -> bool {
        match self.callbacks.has_permission {
            Some(f) => unsafe { f(self.callbacks.user_data, permission_code(permission)) },
            None => false,
        }
    }
}

// ============================================================================
// Engine API
// ============================================================================

/// Opaque handle to a DetoxEngine
pub struct DetoxEngineHandle {
    engine: DetoxEngine,
    store: Arc<MemoryStore>,
}

/// Create an engine.
///
/// # Safety
/// - `config_json` and `prefs_json` must be valid null-terminated C strings or NULL (defaults).
/// - `callbacks` must point to a valid `DetoxCallbacks` table.
/// - Returns a pointer that must be freed with `detox_engine_free`, or NULL on error.
#[no_mangle]
pub unsafe extern "C" fn detox_engine_new(
    config_json: *const c_char,
    prefs_json: *const c_char,
    callbacks: *const DetoxCallbacks,
) -> *mut DetoxEngineHandle {
    clear_last_error();

    if callbacks.is_null() {
        set_last_error("Null callbacks pointer");
        return ptr::null_mut();
    }

    let config = match cstr_to_string(config_json) {
        Some(json) => match EngineConfig::from_json(&json) {
            Ok(config) => config,
            Err(e) => {
                set_last_error(&e.to_string());
                return ptr::null_mut();
            }
        },
        None => EngineConfig::default(),
    };

    let store = match cstr_to_string(prefs_json) {
        Some(json) => match MemoryStore::from_json(&json) {
            Ok(store) => Arc::new(store),
            Err(e) => {
                set_last_error(&e.to_string());
                return ptr::null_mut();
            }
        },
        None => Arc::new(MemoryStore::new()),
    };

    let device = Arc::new(FfiDeviceController {
        callbacks: *callbacks,
    });

    match DetoxEngine::new(config, store.clone(), device, Arc::new(SystemClock::new())) {
        Ok(engine) => Box::into_raw(Box::new(DetoxEngineHandle { engine, store })),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

/// Free an engine. Stops it first if it is running.
///
/// # Safety
/// - `handle` must be a valid pointer returned by `detox_engine_new`, or NULL.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn detox_engine_free(handle: *mut DetoxEngineHandle) {
    if !handle.is_null() {
        let handle = Box::from_raw(handle);
        handle.engine.shutdown();
    }
}

/// Start the engine.
///
/// # Safety
/// - `handle` must be a valid pointer returned by `detox_engine_new`.
/// - Returns 0 on success, -1 on error.
#[no_mangle]
pub unsafe extern "C" fn detox_engine_start(handle: *const DetoxEngineHandle) -> i32 {
    clear_last_error();
    let Some(handle) = handle.as_ref() else {
        set_last_error("Null engine pointer");
        return -1;
    };
    handle.engine.start();
    0
}

/// Stop the engine, pausing every active feature.
///
/// # Safety
/// - `handle` must be a valid pointer returned by `detox_engine_new`.
/// - Returns 0 on success, -1 on error.
#[no_mangle]
pub unsafe extern "C" fn detox_engine_stop(handle: *const DetoxEngineHandle) -> i32 {
    clear_last_error();
    let Some(handle) = handle.as_ref() else {
        set_last_error("Null engine pointer");
        return -1;
    };
    handle.engine.shutdown();
    0
}

/// Push one JSON-encoded event, e.g. `{"type":"app_opened","package_name":"..."}`.
///
/// # Safety
/// - `handle` must be a valid pointer returned by `detox_engine_new`.
/// - `event_json` must be a valid null-terminated C string.
/// - Returns 0 on success, -1 on error; call `detox_last_error` for the message.
#[no_mangle]
pub unsafe extern "C" fn detox_engine_push_event(
    handle: *const DetoxEngineHandle,
    event_json: *const c_char,
) -> i32 {
    clear_last_error();
    let Some(handle) = handle.as_ref() else {
        set_last_error("Null engine pointer");
        return -1;
    };
    let Some(json) = cstr_to_string(event_json) else {
        set_last_error("Invalid event string pointer");
        return -1;
    };

    match EngineEvent::from_json(&json).and_then(|event| handle.engine.dispatch(&event)) {
        Ok(()) => 0,
        Err(e) => {
            set_last_error(&e.to_string());
            -1
        }
    }
}

/// Signal that the screen turned off.
///
/// # Safety
/// - `handle` must be a valid pointer returned by `detox_engine_new`.
#[no_mangle]
pub unsafe extern "C" fn detox_engine_screen_off(handle: *const DetoxEngineHandle) -> i32 {
    clear_last_error();
    let Some(handle) = handle.as_ref() else {
        set_last_error("Null engine pointer");
        return -1;
    };
    handle.engine.on_screen_turned_off();
    0
}

/// Report a released hardware key.
///
/// # Safety
/// - `handle` must be a valid pointer returned by `detox_engine_new`.
/// - Returns 1 if the event was consumed, 0 if not, -1 on error.
#[no_mangle]
pub unsafe extern "C" fn detox_engine_key_event(
    handle: *const DetoxEngineHandle,
    key_code: i32,
    press_duration_ms: u64,
) -> i32 {
    clear_last_error();
    let Some(handle) = handle.as_ref() else {
        set_last_error("Null engine pointer");
        return -1;
    };
    let consumed = handle.engine.on_key_event(&KeyEvent {
        key_code,
        press_duration_ms,
    });
    i32::from(consumed)
}

/// Toggle the global pause and return the outcome as JSON, e.g. `{"outcome":"resumed"}`.
///
/// # Safety
/// - `handle` must be a valid pointer returned by `detox_engine_new`.
/// - Returns a newly allocated string that must be freed with `detox_free_string`.
/// - Returns NULL on error.
#[no_mangle]
pub unsafe extern "C" fn detox_engine_toggle_pause(
    handle: *const DetoxEngineHandle,
) -> *mut c_char {
    clear_last_error();
    let Some(handle) = handle.as_ref() else {
        set_last_error("Null engine pointer");
        return ptr::null_mut();
    };

    match serde_json::to_string(&handle.engine.toggle_pause()) {
        Ok(json) => string_to_cstr(&json),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

/// Current engine state: `"Active"`, `"Paused"` or `"Inactive"`.
///
/// # Safety
/// - `handle` must be a valid pointer returned by `detox_engine_new`.
/// - Returns a newly allocated string that must be freed with `detox_free_string`.
#[no_mangle]
pub unsafe extern "C" fn detox_engine_state(handle: *const DetoxEngineHandle) -> *mut c_char {
    clear_last_error();
    let Some(handle) = handle.as_ref() else {
        set_last_error("Null engine pointer");
        return ptr::null_mut();
    };
    string_to_cstr(&handle.engine.state().to_string())
}

/// Activate or deactivate a feature by id.
///
/// # Safety
/// - `handle` must be a valid pointer returned by `detox_engine_new`.
/// - `feature_id` must be a valid null-terminated C string.
/// - Returns 0 on success, -1 on error (unknown feature, missing permission).
#[no_mangle]
pub unsafe extern "C" fn detox_engine_set_feature_activated(
    handle: *const DetoxEngineHandle,
    feature_id: *const c_char,
    activated: bool,
) -> i32 {
    clear_last_error();
    let Some(handle) = handle.as_ref() else {
        set_last_error("Null engine pointer");
        return -1;
    };
    let Some(id) = cstr_to_string(feature_id) else {
        set_last_error("Invalid feature id pointer");
        return -1;
    };

    match handle.engine.set_feature_activated(&id, activated) {
        Ok(()) => 0,
        Err(e) => {
            set_last_error(&e.to_string());
            -1
        }
    }
}

/// Export all persisted feature settings as JSON.
///
/// # Safety
/// - `handle` must be a valid pointer returned by `detox_engine_new`.
/// - Returns a newly allocated string that must be freed with `detox_free_string`.
/// - Returns NULL on error.
#[no_mangle]
pub unsafe extern "C" fn detox_engine_export_prefs(
    handle: *const DetoxEngineHandle,
) -> *mut c_char {
    clear_last_error();
    let Some(handle) = handle.as_ref() else {
        set_last_error("Null engine pointer");
        return ptr::null_mut();
    };

    match handle.store.to_json() {
        Ok(json) => string_to_cstr(&json),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

// ============================================================================
// Memory Management
// ============================================================================

/// Free a string returned by detox functions.
///
/// # Safety
/// - `ptr` must be a valid pointer returned by a detox function, or NULL.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn detox_free_string(ptr: *mut c_char) {
    if !ptr.is_null() {
        drop(CString::from_raw(ptr));
    }
}

// ============================================================================
// Error Handling
// ============================================================================

/// Get the last error message.
///
/// # Safety
/// - Returns a pointer to a thread-local error string.
/// - The returned pointer is valid until the next detox function call on this thread.
/// - Do NOT free the returned pointer.
/// - Returns NULL if no error occurred.
#[no_mangle]
pub unsafe extern "C" fn detox_last_error() -> *const c_char {
    LAST_ERROR.with(|e| match &*e.borrow() {
        Some(cstr) => cstr.as_ptr(),
        None => ptr::null(),
    })
}

/// Get the library version.
///
/// # Safety
/// - Returns a pointer to a static string. Do NOT free.
#[no_mangle]
pub unsafe extern "C" fn detox_version() -> *const c_char {
    static VERSION: &[u8] = concat!(env!("CARGO_PKG_VERSION"), "\0").as_bytes();
    VERSION.as_ptr() as *const c_char
}
