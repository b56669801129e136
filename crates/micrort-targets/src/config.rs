//! Device configuration.
//!
//! A [`DeviceConfig`] is built by the caller (by hand, from a backend's
//! default, or from a config file) before any session exists. Fields are
//! checked when a consumer needs them, not when the config is loaded.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TargetError};
use crate::layout::MemoryLayout;

/// How the host reaches the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommsMethod {
    /// The runtime runs in the host process.
    Host,
    /// The runtime runs on a device behind an OpenOCD debug server.
    OpenOcd,
}

impl CommsMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            CommsMethod::Host => "host",
            CommsMethod::OpenOcd => "openocd",
        }
    }
}

impl fmt::Display for CommsMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CommsMethod {
    type Err = TargetError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "host" => Ok(CommsMethod::Host),
            "openocd" => Ok(CommsMethod::OpenOcd),
            other => Err(TargetError::UnknownTransport {
                method: other.to_string(),
            }),
        }
    }
}

/// A fully resolved transport endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transport {
    /// In-process; no network endpoint.
    Host,
    /// OpenOCD Tcl server.
    OpenOcd { addr: String, port: u16 },
}

impl Transport {
    pub fn method(&self) -> CommsMethod {
        match self {
            Transport::Host => CommsMethod::Host,
            Transport::OpenOcd { .. } => CommsMethod::OpenOcd,
        }
    }

    /// Address and port as handed to the channel. Host transport uses `("", 0)`.
    pub fn endpoint(&self) -> (&str, u16) {
        match self {
            Transport::Host => ("", 0),
            Transport::OpenOcd { addr, port } => (addr.as_str(), *port),
        }
    }
}

/// Configuration for one target device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Device family identifier (e.g., "host", "arm.stm32f746xx").
    pub device_id: String,
    /// Prefix prepended to toolchain binaries (e.g., "arm-none-eabi-").
    #[serde(default)]
    pub toolchain_prefix: String,
    /// Device memory layout.
    #[serde(default)]
    pub mem_layout: MemoryLayout,
    /// Device word size in bits.
    pub word_size: u32,
    /// Whether the device executes in Thumb mode.
    #[serde(default)]
    pub thumb_mode: bool,
    /// Communication method name ("host" or "openocd").
    pub comms_method: String,
    /// Debug server address; required for "openocd".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_addr: Option<String>,
    /// Debug server port; required for "openocd".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_port: Option<u16>,
}

impl DeviceConfig {
    /// Word size in bytes. Only 32- and 64-bit devices are supported.
    pub fn word_size_bytes(&self) -> Result<u32> {
        match self.word_size {
            32 | 64 => Ok(self.word_size / 8),
            other => Err(TargetError::InvalidConfig {
                field: "word_size",
                detail: format!("expected 32 or 64, got {other}"),
            }),
        }
    }

    /// Parse the configured communication method.
    pub fn comms(&self) -> Result<CommsMethod> {
        self.comms_method.parse()
    }

    /// Resolve the communication method into a concrete endpoint.
    ///
    /// OpenOCD needs both `server_addr` and `server_port`; the host method
    /// ignores them.
    pub fn transport(&self) -> Result<Transport> {
        match self.comms()? {
            CommsMethod::Host => Ok(Transport::Host),
            CommsMethod::OpenOcd => {
                let addr = self
                    .server_addr
                    .clone()
                    .ok_or_else(|| self.missing_param("server_addr"))?;
                let port = self
                    .server_port
                    .ok_or_else(|| self.missing_param("server_port"))?;
                Ok(Transport::OpenOcd { addr, port })
            }
        }
    }

    fn missing_param(&self, field: &'static str) -> TargetError {
        TargetError::MissingTransportParam {
            method: self.comms_method.clone(),
            field,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::RegionKind;

    fn config(comms: &str) -> DeviceConfig {
        DeviceConfig {
            device_id: "host".into(),
            toolchain_prefix: String::new(),
            mem_layout: MemoryLayout::new().with_region(RegionKind::Text, None, 128),
            word_size: 64,
            thumb_mode: false,
            comms_method: comms.into(),
            server_addr: None,
            server_port: None,
        }
    }

    #[test]
    fn host_transport_needs_no_endpoint() {
        let t = config("host").transport().unwrap();
        assert_eq!(t, Transport::Host);
        assert_eq!(t.endpoint(), ("", 0));
    }

    #[test]
    fn openocd_transport_requires_addr_and_port() {
        let mut cfg = config("openocd");
        assert!(matches!(
            cfg.transport(),
            Err(TargetError::MissingTransportParam {
                field: "server_addr",
                ..
            })
        ));

        cfg.server_addr = Some("127.0.0.1".into());
        assert!(matches!(
            cfg.transport(),
            Err(TargetError::MissingTransportParam {
                field: "server_port",
                ..
            })
        ));

        cfg.server_port = Some(6666);
        let t = cfg.transport().unwrap();
        assert_eq!(t.method(), CommsMethod::OpenOcd);
        assert_eq!(t.endpoint(), ("127.0.0.1", 6666));
    }

    #[test]
    fn unknown_transport_is_named() {
        let err = config("jtag").transport().unwrap_err();
        assert!(err.to_string().contains("jtag"));
        assert!(matches!(err, TargetError::UnknownTransport { .. }));
    }

    #[test]
    fn word_size_bytes() {
        let mut cfg = config("host");
        assert_eq!(cfg.word_size_bytes().unwrap(), 8);
        cfg.word_size = 32;
        assert_eq!(cfg.word_size_bytes().unwrap(), 4);
        cfg.word_size = 16;
        assert!(matches!(
            cfg.word_size_bytes(),
            Err(TargetError::InvalidConfig {
                field: "word_size",
                ..
            })
        ));
    }
}
