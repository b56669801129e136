//! Device backends and cross-compilation for micro-device runtimes.
//!
//! A [`DeviceBackend`] knows how to turn a C source file into a relocatable
//! object for one device family. Backends are looked up by device id in a
//! process-wide [`DeviceRegistry`], and [`CrossCompiler`] adapts a backend to
//! the generic [`ExportCompiler`] contract used by library export.

pub mod artifact;
pub mod backend;
pub mod cross;
pub mod error;
pub mod registry;
pub mod runtime;
pub mod toolchain;

pub use artifact::ObjectArtifact;
pub use backend::{CompileOptions, DefaultConfigParams, DeviceBackend, LibType};
pub use cross::{make_cross_compiler, make_cross_compiler_with, CrossCompiler, ExportCompiler, PathArg};
pub use error::{CompileError, Result};
pub use registry::{get_device_funcs, register_device, registered_devices, DeviceRegistry};
pub use toolchain::ToolchainBackend;
