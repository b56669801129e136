//! In-process channel.
//!
//! The runtime and the orchestration layer share one process. Regions
//! without a base are placed back to back in an emulated address space
//! starting at [`HOST_ARENA_BASE`], each backed by a host buffer.

use std::collections::BTreeMap;

use goblin::Object;
use micrort_targets::RegionKind;

use crate::channel::{stack_top, Channel, ChannelParams};
use crate::error::{Result, SessionError};

/// First emulated address handed to unplaced regions.
pub const HOST_ARENA_BASE: u64 = 0x1000_0000;

/// Largest emulated device the host channel will back with memory.
const MAX_HOST_MEMORY: u64 = 64 * 1024 * 1024;

/// Register state of the emulated device.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecutionContext {
    pub armed: bool,
    pub pc: u64,
    pub sp: u64,
}

#[derive(Debug)]
struct EmulatedRegion {
    base: u64,
    memory: Vec<u8>,
}

/// A runtime hosted in the current process.
#[derive(Debug)]
pub struct HostChannel {
    regions: BTreeMap<RegionKind, EmulatedRegion>,
    word_bytes: u64,
    context: ExecutionContext,
    closed: bool,
}

impl HostChannel {
    /// Check the runtime image and lay out emulated memory.
    pub fn open(params: &ChannelParams) -> Result<Self> {
        let bytes = std::fs::read(&params.runtime_obj_path)
            .map_err(|e| open_error(format!("cannot read runtime object: {e}")))?;
        let code_bytes = allocatable_code_size(&bytes)?;

        let total = params
            .regions
            .iter()
            .try_fold(0u64, |acc, r| acc.checked_add(r.size))
            .filter(|&total| total <= MAX_HOST_MEMORY)
            .ok_or_else(|| {
                open_error(format!(
                    "layout does not fit host emulation, which is limited to {MAX_HOST_MEMORY} bytes"
                ))
            })?;

        let text = params
            .region(RegionKind::Text)
            .ok_or_else(|| open_error("layout has no text region".into()))?;
        if code_bytes > text.size {
            return Err(open_error(format!(
                "runtime code is {code_bytes} bytes but the text region holds {}",
                text.size
            )));
        }

        let word_bytes = params.word_size_bytes().max(1);
        let mut cursor = HOST_ARENA_BASE;
        let mut regions = BTreeMap::new();
        for region in &params.regions {
            let base = match region.base {
                Some(base) => base,
                None => {
                    // Bounded by MAX_HOST_MEMORY above, so the arena cannot wrap.
                    let base = align_up(cursor, word_bytes);
                    cursor = base + region.size;
                    base
                }
            };
            if region.base.is_some() && base.checked_add(region.size).is_none() {
                return Err(open_error(format!(
                    "region '{}' at 0x{base:X} ends past the top of the address space",
                    region.kind
                )));
            }
            regions.insert(
                region.kind,
                EmulatedRegion {
                    base,
                    memory: vec![0; region.size as usize],
                },
            );
        }

        log::debug!(
            "host channel open: {} regions, {total} bytes, runtime code {code_bytes} bytes",
            regions.len()
        );
        Ok(Self {
            regions,
            word_bytes,
            context: ExecutionContext::default(),
            closed: false,
        })
    }

    /// Current register state.
    pub fn context(&self) -> ExecutionContext {
        self.context
    }

    /// Emulated base address of a region.
    pub fn region_base(&self, kind: RegionKind) -> Option<u64> {
        self.regions.get(&kind).map(|r| r.base)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(SessionError::Channel {
                detail: "host channel is closed".into(),
            });
        }
        Ok(())
    }
}

impl Channel for HostChannel {
    fn enter(&mut self) -> Result<()> {
        self.ensure_open()?;
        for kind in [RegionKind::Bss, RegionKind::Stack] {
            if let Some(region) = self.regions.get_mut(&kind) {
                region.memory.fill(0);
            }
        }
        let (pc, sp) = match (
            self.regions.get(&RegionKind::Text),
            self.regions.get(&RegionKind::Stack),
        ) {
            (Some(text), Some(stack)) => {
                let sp = stack_top(stack.base, stack.memory.len() as u64, self.word_bytes)
                    .ok_or_else(|| SessionError::Channel {
                        detail: "stack region ends past the top of the address space".into(),
                    })?;
                (text.base, sp)
            }
            _ => {
                return Err(SessionError::Channel {
                    detail: "host channel has no text or stack region".into(),
                })
            }
        };
        self.context = ExecutionContext {
            armed: true,
            pc,
            sp,
        };
        Ok(())
    }

    fn exit(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.context.armed = false;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.context = ExecutionContext::default();
        self.regions.clear();
        self.closed = true;
        Ok(())
    }
}

fn open_error(detail: String) -> SessionError {
    SessionError::Open {
        comms: "host".into(),
        detail,
    }
}

/// Size of allocatable executable sections in an object file.
fn allocatable_code_size(bytes: &[u8]) -> Result<u64> {
    match Object::parse(bytes) {
        Ok(Object::Elf(elf)) => Ok(elf
            .section_headers
            .iter()
            .filter(|sh| sh.is_alloc() && sh.is_executable())
            .map(|sh| sh.sh_size)
            .sum()),
        Ok(Object::Mach(_)) => Ok(0),
        Ok(_) => Err(open_error("runtime artifact is not a relocatable object".into())),
        Err(e) => Err(open_error(format!("runtime artifact is unreadable: {e}"))),
    }
}

fn align_up(value: u64, align: u64) -> u64 {
    value.div_ceil(align) * align
}
