//! Error types for the detox engine
//!
//! Only the edges of the engine return errors: configuration and preference loading, JSON event
//! decoding and user-initiated activation requests. Event handling itself never fails.

use thiserror::Error;

use crate::feature::Permission;

/// Errors that can occur at the edges of the engine
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Failed to parse input: {0}")]
    ParseError(String),

    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Invalid schedule rule: {0}")]
    InvalidScheduleRule(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid event: {0}")]
    InvalidEvent(String),

    #[error("Unknown feature: {0}")]
    UnknownFeature(String),

    #[error("Feature {feature} requires the {permission:?} permission")]
    PermissionDenied {
        feature: String,
        permission: Permission,
    },
}
