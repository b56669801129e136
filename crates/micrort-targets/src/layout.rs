//! Device memory layout.
//!
//! A layout maps each [`RegionKind`] to a size and an optional base address.
//! An unset base means "let the backend/linker choose placement"; it is only
//! flattened to `0` when handed to a wire protocol (see [`MemoryRegion::wire_base`]).

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{Result, TargetError};

/// The purpose of a memory region. Variant order is the canonical layout order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RegionKind {
    /// Executable code.
    Text,
    /// Read-only data.
    Rodata,
    /// Initialized mutable data.
    Data,
    /// Zero-initialized data.
    Bss,
    /// Call-argument buffer.
    Args,
    Heap,
    /// Scratch workspace for operators.
    Workspace,
    Stack,
}

impl RegionKind {
    /// All region kinds in canonical order.
    pub const ALL: [RegionKind; 8] = [
        RegionKind::Text,
        RegionKind::Rodata,
        RegionKind::Data,
        RegionKind::Bss,
        RegionKind::Args,
        RegionKind::Heap,
        RegionKind::Workspace,
        RegionKind::Stack,
    ];

    /// The region's name as used in configuration files.
    pub fn as_str(self) -> &'static str {
        match self {
            RegionKind::Text => "text",
            RegionKind::Rodata => "rodata",
            RegionKind::Data => "data",
            RegionKind::Bss => "bss",
            RegionKind::Args => "args",
            RegionKind::Heap => "heap",
            RegionKind::Workspace => "workspace",
            RegionKind::Stack => "stack",
        }
    }
}

impl fmt::Display for RegionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RegionKind {
    type Err = TargetError;

    fn from_str(s: &str) -> Result<Self> {
        RegionKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| TargetError::InvalidConfig {
                field: "mem_layout",
                detail: format!("unknown memory region '{s}'"),
            })
    }
}

// Serialized as a bare string so the kind can be used as a TOML/JSON map key.
impl Serialize for RegionKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for RegionKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        name.parse().map_err(serde::de::Error::custom)
    }
}

/// Serialized form of a single region: `{ start?, size }`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
struct RegionSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    start: Option<u64>,
    size: u64,
}

/// A named, sized, optionally positioned area of device memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryRegion {
    /// Which region this is.
    pub kind: RegionKind,
    /// Base address, or `None` to let the backend choose.
    pub base: Option<u64>,
    /// Size in bytes.
    pub size: u64,
}

impl MemoryRegion {
    /// Base address as passed over a wire protocol, where `0` means unset.
    pub fn wire_base(&self) -> u64 {
        self.base.unwrap_or(0)
    }

    /// Exclusive end address, if the region is positioned.
    pub fn end(&self) -> Option<u64> {
        self.base.map(|b| b.saturating_add(self.size))
    }

    /// Whether two positioned regions share any address. Unpositioned regions never overlap.
    pub fn overlaps(&self, other: &MemoryRegion) -> bool {
        match (self.base, self.end(), other.base, other.end()) {
            (Some(a), Some(a_end), Some(b), Some(b_end)) => a < b_end && b < a_end,
            _ => false,
        }
    }
}

/// Ordered mapping from region kind to region.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MemoryLayout {
    regions: BTreeMap<RegionKind, RegionSpec>,
}

impl MemoryLayout {
    /// Create an empty layout.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with_region(mut self, kind: RegionKind, base: Option<u64>, size: u64) -> Self {
        self.insert(kind, base, size);
        self
    }

    /// Insert or replace a region.
    pub fn insert(&mut self, kind: RegionKind, base: Option<u64>, size: u64) {
        self.regions.insert(kind, RegionSpec { start: base, size });
    }

    /// Remove a region, returning it if it was present.
    pub fn remove(&mut self, kind: RegionKind) -> Option<MemoryRegion> {
        self.regions.remove(&kind).map(|spec| to_region(kind, spec))
    }

    /// Look up a region by kind.
    pub fn region(&self, kind: RegionKind) -> Option<MemoryRegion> {
        self.regions.get(&kind).map(|spec| to_region(kind, *spec))
    }

    /// Look up a region that the caller cannot proceed without.
    ///
    /// Absent and zero-sized regions are both reported as missing.
    pub fn require(&self, kind: RegionKind) -> Result<MemoryRegion> {
        match self.region(kind) {
            Some(region) if region.size > 0 => Ok(region),
            _ => Err(TargetError::MissingRegion { region: kind }),
        }
    }

    /// Resolve all eight regions in canonical order, failing on the first missing one.
    pub fn require_all(&self) -> Result<Vec<MemoryRegion>> {
        RegionKind::ALL.iter().map(|&kind| self.require(kind)).collect()
    }

    /// Whether all eight regions are present with a non-zero size.
    pub fn is_complete(&self) -> bool {
        self.require_all().is_ok()
    }

    /// Iterate over present regions in canonical order.
    pub fn regions(&self) -> impl Iterator<Item = MemoryRegion> + '_ {
        self.regions.iter().map(|(&kind, &spec)| to_region(kind, spec))
    }

    /// Sum of all region sizes, or `None` if it does not fit in a `u64`.
    pub fn total_size(&self) -> Option<u64> {
        self.regions
            .values()
            .try_fold(0u64, |acc, r| acc.checked_add(r.size))
    }

    /// Pairs of positioned regions whose address ranges intersect.
    pub fn overlapping_pairs(&self) -> Vec<(MemoryRegion, MemoryRegion)> {
        let regions: Vec<_> = self.regions().collect();
        let mut pairs = Vec::new();
        for i in 0..regions.len() {
            for j in (i + 1)..regions.len() {
                if regions[i].overlaps(&regions[j]) {
                    pairs.push((regions[i], regions[j]));
                }
            }
        }
        pairs
    }
}

fn to_region(kind: RegionKind, spec: RegionSpec) -> MemoryRegion {
    MemoryRegion {
        kind,
        base: spec.start,
        size: spec.size,
    }
}

/// How much memory a generated section receives.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SectionConstraint {
    /// A fixed number of bytes.
    Bytes(u64),
    /// A share of whatever memory remains after fixed sections, relative to other weights.
    Weight(f64),
}

/// Generate a contiguous layout starting at `base_addr`.
///
/// Fixed-size sections are reserved first; weighted sections split the rest.
/// Every size is rounded down to a multiple of `word_size` bytes and sections
/// are placed back to back in the order given.
pub fn gen_mem_layout(
    base_addr: u64,
    available_mem: u64,
    word_size: u64,
    constraints: &[(RegionKind, SectionConstraint)],
) -> Result<MemoryLayout> {
    if word_size == 0 {
        return Err(TargetError::Layout {
            detail: "word size must be non-zero".into(),
        });
    }
    if base_addr % word_size != 0 {
        return Err(TargetError::Layout {
            detail: format!("base address 0x{base_addr:X} is not aligned to {word_size} bytes"),
        });
    }

    let byte_sum = constraints
        .iter()
        .filter_map(|(_, c)| match c {
            SectionConstraint::Bytes(n) => Some(*n),
            SectionConstraint::Weight(_) => None,
        })
        .try_fold(0u64, u64::checked_add)
        .ok_or_else(|| TargetError::Layout {
            detail: "fixed section sizes overflow the address space".into(),
        })?;
    let weight_sum: f64 = constraints
        .iter()
        .filter_map(|(_, c)| match c {
            SectionConstraint::Weight(w) => Some(*w),
            SectionConstraint::Bytes(_) => None,
        })
        .sum();

    if byte_sum > available_mem {
        return Err(TargetError::Layout {
            detail: format!(
                "fixed sections need {byte_sum} bytes but only {available_mem} are available"
            ),
        });
    }
    let weighted_mem = available_mem - byte_sum;

    let mut layout = MemoryLayout::new();
    let mut curr_addr = base_addr;
    for &(kind, constraint) in constraints {
        let raw = match constraint {
            SectionConstraint::Bytes(n) => n,
            SectionConstraint::Weight(w) if weight_sum > 0.0 => {
                ((w / weight_sum) * weighted_mem as f64) as u64
            }
            SectionConstraint::Weight(_) => 0,
        };
        let size = raw - raw % word_size;
        if size == 0 {
            return Err(TargetError::Layout {
                detail: format!("section '{kind}' resolves to zero bytes"),
            });
        }
        layout.insert(kind, Some(curr_addr), size);
        curr_addr = curr_addr
            .checked_add(size)
            .ok_or_else(|| TargetError::Layout {
                detail: format!("section '{kind}' ends past the top of the address space"),
            })?;
    }

    Ok(layout)
}
