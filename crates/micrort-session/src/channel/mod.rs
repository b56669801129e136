//! Communication channels to a device.
//!
//! Opening a channel loads the compiled runtime and yields a [`Channel`] whose
//! `enter`/`exit` arm and disarm the device's execution context. The concrete
//! transport is chosen from the session's communication method.

mod host;
mod openocd;

use std::fmt;
use std::path::PathBuf;

use micrort_targets::{CommsMethod, MemoryRegion, RegionKind};

use crate::error::Result;

pub use self::host::{ExecutionContext, HostChannel};
pub use self::openocd::{OpenOcdChannel, TclClient};

/// Everything a transport needs to bring up the runtime.
#[derive(Debug, Clone)]
pub struct ChannelParams {
    /// Resolved communication method.
    pub comms_method: CommsMethod,
    /// Compiled runtime object.
    pub runtime_obj_path: PathBuf,
    /// Toolchain prefix used to build the runtime.
    pub toolchain_prefix: String,
    /// All eight regions in canonical order.
    pub regions: Vec<MemoryRegion>,
    /// Device word size in bits.
    pub word_size: u32,
    pub thumb_mode: bool,
    /// Debug server address; empty for the host method.
    pub server_addr: String,
    /// Debug server port; zero for the host method.
    pub server_port: u16,
}

impl ChannelParams {
    pub fn region(&self, kind: RegionKind) -> Option<&MemoryRegion> {
        self.regions.iter().find(|r| r.kind == kind)
    }

    pub fn word_size_bytes(&self) -> u64 {
        u64::from(self.word_size / 8)
    }
}

/// An open connection to a device running the runtime.
pub trait Channel: fmt::Debug {
    /// Arm the execution context (reset registers, set the stack pointer).
    fn enter(&mut self) -> Result<()>;

    /// Tear the execution context down. The channel stays open.
    fn exit(&mut self) -> Result<()>;

    /// Release the channel. Further calls are errors.
    fn close(&mut self) -> Result<()>;
}

/// Opens channels for a session.
pub trait ChannelOpener: fmt::Debug {
    fn open(&self, params: &ChannelParams) -> Result<Box<dyn Channel>>;
}

/// Opens a [`HostChannel`] or [`OpenOcdChannel`] depending on the method.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultChannelOpener;

impl ChannelOpener for DefaultChannelOpener {
    fn open(&self, params: &ChannelParams) -> Result<Box<dyn Channel>> {
        match params.comms_method {
            CommsMethod::Host => Ok(Box::new(HostChannel::open(params)?)),
            CommsMethod::OpenOcd => Ok(Box::new(OpenOcdChannel::open(params)?)),
        }
    }
}

/// Top of a stack placed at `base`, aligned down to the word size.
///
/// `None` when the stack would end past the top of the address space.
pub(crate) fn stack_top(base: u64, size: u64, word_bytes: u64) -> Option<u64> {
    let top = base.checked_add(size)?;
    if word_bytes == 0 {
        Some(top)
    } else {
        Some(top - top % word_bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stack_top_is_word_aligned() {
        assert_eq!(stack_top(0x2004_0000, 0x100, 4), Some(0x2004_0100));
        assert_eq!(stack_top(0x1000, 0x13, 8), Some(0x1010));
        assert_eq!(stack_top(0x1000, 0x13, 0), Some(0x1013));
    }

    #[test]
    fn stack_top_past_address_space_is_none() {
        assert_eq!(stack_top(u64::MAX - 16, 64, 8), None);
    }
}
