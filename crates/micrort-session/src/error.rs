//! Session errors.

use std::path::PathBuf;

use micrort_compile::CompileError;
use micrort_targets::TargetError;
use thiserror::Error;

/// Errors that can occur while building, using, or tearing down a session.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("unsupported host: {detail}")]
    UnsupportedHost { detail: String },

    #[error("failed to open '{comms}' channel: {detail}")]
    Open { comms: String, detail: String },

    #[error("session is already entered")]
    Reentrancy,

    #[error("channel error: {detail}")]
    Channel { detail: String },

    #[error("failed to load module {}: {detail}", path.display())]
    Load { path: PathBuf, detail: String },

    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error(transparent)]
    Target(#[from] TargetError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for session operations.
pub type Result<T> = std::result::Result<T, SessionError>;
