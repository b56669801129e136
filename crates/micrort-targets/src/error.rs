//! Error types for device configuration and layout operations.

use std::path::PathBuf;

use crate::layout::RegionKind;

/// Errors that can occur while reading or resolving a device configuration.
#[derive(Debug, thiserror::Error)]
pub enum TargetError {
    /// TOML deserialization error.
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// TOML serialization error.
    #[error("TOML serialization error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    /// JSON (de)serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error reading/writing configuration files.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration file not found.
    #[error("config file not found: {}", path.display())]
    NotFound {
        /// The path that was not found.
        path: PathBuf,
    },

    /// A memory region required by the consumer is absent or empty.
    #[error("memory layout is missing required region '{region}'")]
    MissingRegion {
        /// The region that was requested.
        region: RegionKind,
    },

    /// A configuration field holds an unusable value.
    #[error("invalid config field '{field}': {detail}")]
    InvalidConfig {
        /// Field name as it appears in the config file.
        field: &'static str,
        /// Description of the problem.
        detail: String,
    },

    /// The communication method requires a field the config does not carry.
    #[error("comms method '{method}' requires '{field}' to be set")]
    MissingTransportParam {
        /// The configured communication method.
        method: String,
        /// The missing field.
        field: &'static str,
    },

    /// The communication method is not one this system knows how to open.
    #[error("unknown communication method: '{method}'")]
    UnknownTransport {
        /// The unrecognized method.
        method: String,
    },

    /// A memory layout could not be generated from its constraints.
    #[error("layout error: {detail}")]
    Layout {
        /// Description of the layout failure.
        detail: String,
    },
}

/// Result type for target operations.
pub type Result<T> = std::result::Result<T, TargetError>;
