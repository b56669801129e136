//! TOML/JSON loading, serialization, and validation for device configurations.
//!
//! Config files are chosen by extension: `.json` is read as JSON and
//! everything else as TOML.

use std::path::Path;

use crate::config::DeviceConfig;
use crate::error::{Result, TargetError};
use crate::layout::RegionKind;

/// A validation issue found in a device configuration.
#[derive(Debug, Clone)]
pub struct ValidationIssue {
    /// Severity: "error" or "warning".
    pub severity: &'static str,
    /// Human-readable description.
    pub message: String,
}

impl DeviceConfig {
    /// Load a configuration from a `.toml` or `.json` file.
    pub fn load(path: &Path) -> Result<Self> {
        load_config(path)
    }

    /// Serialize to pretty TOML.
    pub fn to_toml(&self) -> Result<String> {
        config_to_toml(self)
    }

    /// Serialize to pretty JSON.
    pub fn to_json(&self) -> Result<String> {
        config_to_json(self)
    }
}

/// Load a configuration file, dispatching on its extension.
pub fn load_config(path: &Path) -> Result<DeviceConfig> {
    if !path.exists() {
        return Err(TargetError::NotFound {
            path: path.to_path_buf(),
        });
    }
    let content = std::fs::read_to_string(path)?;
    match path.extension().and_then(|e| e.to_str()) {
        Some("json") => parse_config_json(&content),
        _ => parse_config_toml(&content),
    }
}

/// Parse a configuration from a TOML string.
pub fn parse_config_toml(toml_str: &str) -> Result<DeviceConfig> {
    let config: DeviceConfig = toml::from_str(toml_str)?;
    Ok(config)
}

/// Parse a configuration from a JSON string.
pub fn parse_config_json(json_str: &str) -> Result<DeviceConfig> {
    let config: DeviceConfig = serde_json::from_str(json_str)?;
    Ok(config)
}

/// Serialize a configuration to pretty TOML.
pub fn config_to_toml(config: &DeviceConfig) -> Result<String> {
    let toml_str = toml::to_string_pretty(config)?;
    Ok(toml_str)
}

/// Serialize a configuration to pretty JSON.
pub fn config_to_json(config: &DeviceConfig) -> Result<String> {
    let json_str = serde_json::to_string_pretty(config)?;
    Ok(json_str)
}

/// Check a configuration for everything a session will later require.
///
/// Overlapping explicit region bases are reported as warnings only; whether
/// they are acceptable is up to the device backend and its linker.
pub fn validate_config(config: &DeviceConfig) -> std::result::Result<(), Vec<ValidationIssue>> {
    let mut issues = Vec::new();

    if config.device_id.trim().is_empty() {
        issues.push(ValidationIssue {
            severity: "error",
            message: "device_id is empty".into(),
        });
    }

    if let Err(e) = config.word_size_bytes() {
        issues.push(ValidationIssue {
            severity: "error",
            message: e.to_string(),
        });
    }

    for kind in RegionKind::ALL {
        if let Err(e) = config.mem_layout.require(kind) {
            issues.push(ValidationIssue {
                severity: "error",
                message: e.to_string(),
            });
        }
    }

    if let Err(e) = config.transport() {
        issues.push(ValidationIssue {
            severity: "error",
            message: e.to_string(),
        });
    }

    for (a, b) in config.mem_layout.overlapping_pairs() {
        issues.push(ValidationIssue {
            severity: "warning",
            message: format!(
                "memory regions '{}' (0x{:X}..0x{:X}) and '{}' (0x{:X}..0x{:X}) overlap",
                a.kind,
                a.wire_base(),
                a.end().unwrap_or(0),
                b.kind,
                b.wire_base(),
                b.end().unwrap_or(0),
            ),
        });
    }

    if issues.is_empty() {
        Ok(())
    } else {
        Err(issues)
    }
}
