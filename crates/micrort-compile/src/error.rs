//! Compilation and backend lookup errors.

use micrort_targets::TargetError;
use thiserror::Error;

/// Errors that can occur while resolving a backend or compiling a library.
#[derive(Debug, Error)]
pub enum CompileError {
    #[error("no backend registered for device '{device_id}'")]
    UnknownDevice { device_id: String },

    #[error("a backend for device '{device_id}' is already registered")]
    DuplicateDevice { device_id: String },

    #[error("{tool} failed: {message}")]
    Toolchain { tool: String, message: String },

    #[error("layout rejected by '{device_id}' backend: {detail}")]
    Layout { device_id: String, detail: String },

    #[error("invalid argument: {detail}")]
    InvalidArgument { detail: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Target(#[from] TargetError),
}

/// Result type for compile operations.
pub type Result<T> = std::result::Result<T, CompileError>;
