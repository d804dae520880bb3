//! Error types for the lights controller.
//!
//! `LightsError` covers every failure the core can surface to a caller.
//! Lock contention on the pixel surface is not an error; surface operations
//! report it as `false`.

use std::path::PathBuf;
use thiserror::Error;

/// Reasons an animation artifact is rejected before it is persisted or run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("missing entrypoint: the module must export a function named `animate`")]
    MissingEntrypoint,

    #[error("invalid entrypoint signature: expected a function with no params and no results, found {found}")]
    InvalidEntrypointSignature { found: String },

    #[error("failed to load animation: {message}")]
    Load { message: String },
}

/// Main error type for the lights controller.
#[derive(Debug, Error)]
pub enum LightsError {
    // Animation errors
    #[error("Animation validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("Animation '{animation}' failed while executing a frame: {message}")]
    FrameExecutionFailed { animation: String, message: String },

    #[error("Unknown animation: {name}")]
    UnknownAnimation { name: String },

    #[error("Invalid animation name '{name}': {reason}")]
    InvalidAnimationName { name: String, reason: String },

    #[error("Animator has been stopped")]
    AnimatorStopped,

    #[error("Sandbox error: {message}")]
    Sandbox { message: String },

    // Pixel errors
    #[error("Pixel index {index} is out of range for a strip of {len} pixels")]
    IndexOutOfRange { index: usize, len: usize },

    // Request errors
    #[error("Method not found: {method}")]
    MethodNotFound { method: String },

    #[error("Invalid params: {message}")]
    InvalidParams { message: String },

    #[error("Protocol error: {message}")]
    Protocol { message: String },

    // File system errors
    #[error("IO error at {path:?}: {message}")]
    Io {
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<std::io::Error>,
    },

    // Serialization errors
    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    #[error("{0}")]
    Other(String),
}

/// Result type alias for lights operations.
pub type Result<T> = std::result::Result<T, LightsError>;

impl From<std::io::Error> for LightsError {
    fn from(err: std::io::Error) -> Self {
        LightsError::Io {
            message: err.to_string(),
            path: None,
            source: Some(err),
        }
    }
}

impl From<serde_json::Error> for LightsError {
    fn from(err: serde_json::Error) -> Self {
        LightsError::Json {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl LightsError {
    /// Create an IO error with path context.
    pub fn io_with_path(err: std::io::Error, path: impl Into<PathBuf>) -> Self {
        LightsError::Io {
            message: err.to_string(),
            path: Some(path.into()),
            source: Some(err),
        }
    }

    /// Convert to a JSON-RPC error code.
    ///
    /// Standard codes:
    /// - -32601: Method not found
    /// - -32602: Invalid params
    /// - -32603: Internal error
    ///
    /// Application codes:
    /// - -32002: Unknown animation
    /// - -32005: Animation failed validation
    /// - -32006: Animator stopped
    pub fn to_rpc_error_code(&self) -> i32 {
        match self {
            LightsError::MethodNotFound { .. } => -32601,

            LightsError::InvalidParams { .. }
            | LightsError::IndexOutOfRange { .. }
            | LightsError::InvalidAnimationName { .. } => -32602,

            LightsError::UnknownAnimation { .. } => -32002,

            LightsError::Validation(_) => -32005,

            LightsError::AnimatorStopped => -32006,

            _ => -32603,
        }
    }
}
