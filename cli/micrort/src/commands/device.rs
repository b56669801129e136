//! `micrort device`: registered device families and their defaults.

use anyhow::{Context, Result};
use micrort_compile::{get_device_funcs, registered_devices, DefaultConfigParams};

use crate::Format;

/// List all registered device ids.
pub fn list() -> Result<()> {
    println!("Registered devices:");
    println!();
    for id in registered_devices() {
        println!("  {id}");
    }
    println!();
    println!("Use 'micrort device config <id>' for a default configuration.");
    Ok(())
}

/// Print the default configuration of a device.
pub fn config(
    id: &str,
    server_addr: Option<String>,
    server_port: Option<u16>,
    format: Format,
) -> Result<()> {
    print!("{}", render_config(id, server_addr, server_port, format)?);
    Ok(())
}

fn render_config(
    id: &str,
    server_addr: Option<String>,
    server_port: Option<u16>,
    format: Format,
) -> Result<String> {
    let backend = get_device_funcs(id)
        .context("use 'micrort device list' to see registered devices")?;
    let config = backend
        .default_config(&DefaultConfigParams {
            server_addr,
            server_port,
        })
        .with_context(|| format!("generating default config for '{id}'"))?;
    let text = match format {
        Format::Toml => config.to_toml()?,
        Format::Json => {
            let mut json = config.to_json()?;
            json.push('\n');
            json
        }
    };
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use micrort_targets::parse::{parse_config_json, parse_config_toml};
    use micrort_targets::RegionKind;

    #[test]
    fn list_includes_builtins() {
        let ids = registered_devices();
        for id in ["host", "arm.stm32f746xx", "riscv_spike"] {
            assert!(ids.iter().any(|d| d == id), "missing {id}");
        }
    }

    #[test]
    fn host_config_round_trips_through_toml() {
        let text = render_config("host", None, None, Format::Toml).unwrap();
        let config = parse_config_toml(&text).unwrap();
        assert_eq!(config.device_id, "host");
        assert_eq!(config.comms_method, "host");
        assert!(config.mem_layout.is_complete());
    }

    #[test]
    fn openocd_config_carries_server_endpoint() {
        let text = render_config(
            "arm.stm32f746xx",
            Some("127.0.0.1".into()),
            Some(6666),
            Format::Json,
        )
        .unwrap();
        let config = parse_config_json(&text).unwrap();
        assert_eq!(config.server_addr.as_deref(), Some("127.0.0.1"));
        assert_eq!(config.server_port, Some(6666));
        assert_eq!(
            config.mem_layout.region(RegionKind::Text).unwrap().base,
            Some(0x2000_0180)
        );
    }

    #[test]
    fn unknown_device_is_an_error() {
        let err = render_config("nonexistent", None, None, Format::Toml).unwrap_err();
        assert!(format!("{err:#}").contains("nonexistent"));
    }
}
