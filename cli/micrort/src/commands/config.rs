//! `micrort config`: configuration file checks.

use std::path::Path;

use anyhow::{bail, Context, Result};
use micrort_compile::registered_devices;
use micrort_targets::parse::{validate_config, ValidationIssue};
use micrort_targets::DeviceConfig;

/// Validate a configuration file and report every issue found.
pub fn validate(path: &Path, json: bool) -> Result<()> {
    let issues = check(path)?;
    let errors = issues.iter().filter(|i| i.severity == "error").count();

    if json {
        let report = serde_json::json!({
            "file": path.display().to_string(),
            "valid": errors == 0,
            "issues": issues
                .iter()
                .map(|i| serde_json::json!({ "severity": i.severity, "message": i.message }))
                .collect::<Vec<_>>(),
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        for issue in &issues {
            println!("{}: {}", issue.severity, issue.message);
        }
        if errors == 0 {
            println!("{}: ok", path.display());
        }
    }

    if errors > 0 {
        bail!("{}: {errors} error(s)", path.display());
    }
    Ok(())
}

fn check(path: &Path) -> Result<Vec<ValidationIssue>> {
    let config =
        DeviceConfig::load(path).with_context(|| format!("loading {}", path.display()))?;
    let mut issues = validate_config(&config).err().unwrap_or_default();

    if !config.device_id.is_empty() && !registered_devices().contains(&config.device_id) {
        issues.push(ValidationIssue {
            severity: "error",
            message: format!("no backend registered for device '{}'", config.device_id),
        });
    }
    Ok(issues)
}
