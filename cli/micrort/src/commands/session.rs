//! `micrort session`: end-to-end session checks.

use std::path::Path;

use anyhow::{Context, Result};
use micrort_session::{Session, SessionError};
use micrort_targets::DeviceConfig;

/// Open a session, enter and exit it once, then close it.
pub fn check(config_path: &Path) -> Result<()> {
    let config = DeviceConfig::load(config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;
    log::debug!("checking session for '{}' over {}", config.device_id, config.comms_method);

    let session = Session::new(&config)
        .with_context(|| format!("opening session for '{}'", config.device_id))?;
    println!("session {} for '{}'", session.id(), session.device_id());
    println!("  runtime:   {}", session.runtime_artifact());
    println!("  transport: {}", session.transport().method());
    println!("  state:     {}", session.state());

    session.with(|s| {
        println!("  state:     {}", s.state());
        Ok::<_, SessionError>(())
    })?;
    println!("  state:     {}", session.state());

    session.close().context("closing session")?;
    println!("  state:     closed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &Path, json: &str) -> std::path::PathBuf {
        let path = dir.join("device.json");
        std::fs::write(&path, json).unwrap();
        path
    }

    #[test]
    fn unknown_device_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            r#"{ "device_id": "ghost", "word_size": 64, "comms_method": "host" }"#,
        );
        let err = check(&path).unwrap_err();
        let msg = format!("{err:#}");
        // The host gate runs before the device lookup.
        if cfg!(all(target_os = "linux", target_pointer_width = "64")) {
            assert!(msg.contains("ghost"), "{msg}");
        } else {
            assert!(msg.contains("unsupported host"), "{msg}");
        }
    }

    #[test]
    fn unparsable_config_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "{ not json");
        let err = check(&path).unwrap_err();
        assert!(format!("{err:#}").contains("device.json"));
    }
}
