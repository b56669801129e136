//! Device memory layouts and session configuration for micro-device runtimes.
//!
//! A device is described by two pieces of data:
//! - **Memory layout:** the eight named regions (text, rodata, data, bss,
//!   args, heap, workspace, stack) the runtime is placed into
//! - **Device configuration:** the device family, toolchain, word size and
//!   communication method used to reach the device
//!
//! Neither is validated eagerly. Consumers query what they need and fail
//! with a [`TargetError`] naming the missing piece.

pub mod config;
pub mod error;
pub mod host;
pub mod layout;
pub mod parse;

pub use config::{CommsMethod, DeviceConfig, Transport};
pub use error::{Result, TargetError};
pub use host::HostInfo;
pub use layout::{gen_mem_layout, MemoryLayout, MemoryRegion, RegionKind, SectionConstraint};
