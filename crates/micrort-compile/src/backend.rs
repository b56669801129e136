//! The device backend capability.

use std::fmt;
use std::path::Path;

use micrort_targets::{DeviceConfig, MemoryLayout};

use crate::error::Result;

/// What a compiled library is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LibType {
    /// The resident execution runtime, linked once per session.
    Runtime,
    /// An operator library loaded on top of a running runtime.
    Operator,
}

impl LibType {
    pub fn as_str(self) -> &'static str {
        match self {
            LibType::Runtime => "runtime",
            LibType::Operator => "operator",
        }
    }
}

impl fmt::Display for LibType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-invocation inputs to a backend compile.
#[derive(Debug, Clone, Default)]
pub struct CompileOptions {
    /// Toolchain prefix overriding the backend's default.
    pub toolchain_prefix: Option<String>,
    /// Layout the artifact will be placed against.
    pub layout: Option<MemoryLayout>,
    /// Device word size in bits.
    pub word_size: Option<u32>,
    /// Emit Thumb code.
    pub thumb_mode: bool,
    /// Extra compiler flags appended after the backend's own.
    pub flags: Vec<String>,
}

impl CompileOptions {
    /// Options carrying everything a device config says about compilation.
    pub fn from_config(config: &DeviceConfig) -> Self {
        Self {
            toolchain_prefix: Some(config.toolchain_prefix.clone()),
            layout: Some(config.mem_layout.clone()),
            word_size: Some(config.word_size),
            thumb_mode: config.thumb_mode,
            flags: Vec::new(),
        }
    }

    /// Builder-style extra flags.
    pub fn with_flags(mut self, flags: impl IntoIterator<Item = String>) -> Self {
        self.flags.extend(flags);
        self
    }
}

/// Inputs for generating a backend's default device configuration.
#[derive(Debug, Clone, Default)]
pub struct DefaultConfigParams {
    /// Debug server address, for devices behind a debug server.
    pub server_addr: Option<String>,
    /// Debug server port, for devices behind a debug server.
    pub server_port: Option<u16>,
}

/// A device family's toolchain capability.
///
/// Object-safe so backends can be stored as `Arc<dyn DeviceBackend>`.
pub trait DeviceBackend: fmt::Debug + Send + Sync {
    /// The device id this backend is registered under.
    fn device_id(&self) -> &str;

    /// Compile `src_path` into a relocatable object at `obj_path`.
    fn compile(
        &self,
        obj_path: &Path,
        src_path: &Path,
        lib_type: LibType,
        options: &CompileOptions,
    ) -> Result<()>;

    /// A ready-to-use configuration for this device family.
    fn default_config(&self, params: &DefaultConfigParams) -> Result<DeviceConfig>;
}
