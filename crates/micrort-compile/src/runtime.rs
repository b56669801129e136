//! Embedded runtime and device support sources.
//!
//! The runtime is a fixed C unit shipped inside this crate. Backends stage
//! it (and any device support files) into a scratch directory before
//! invoking the toolchain.

use std::path::{Path, PathBuf};

use crate::error::Result;

/// File name of the runtime source.
pub const RUNTIME_SOURCE_NAME: &str = "micrort_runtime.c";

/// Header operator sources are prefixed with.
pub const REDIRECT_HEADER_NAME: &str = "micrort_device_redirect.h";

const RUNTIME_SOURCE: &str = include_str!("../runtime/micrort_runtime.c");
const RUNTIME_HEADER: &str = include_str!("../runtime/micrort_runtime.h");
const REDIRECT_HEADER: &str = include_str!("../runtime/micrort_device_redirect.h");

/// A source file embedded in the crate: `(file name, contents)`.
pub type EmbeddedSource = (&'static str, &'static str);

/// Support sources for Cortex-M7 boards.
pub const STM32F746XX_SOURCES: &[EmbeddedSource] = &[
    (
        "micrort_init.s",
        include_str!("../runtime/devices/arm.stm32f746xx/micrort_init.s"),
    ),
    (
        "micrort_timer.c",
        include_str!("../runtime/devices/arm.stm32f746xx/micrort_timer.c"),
    ),
];

/// Support sources for the Spike RISC-V simulator.
pub const RISCV_SPIKE_SOURCES: &[EmbeddedSource] = &[(
    "micrort_timer.c",
    include_str!("../runtime/devices/riscv_spike/micrort_timer.c"),
)];

/// Write the runtime source into `dir`, returning its path.
pub fn write_runtime_source(dir: &Path) -> Result<PathBuf> {
    let path = dir.join(RUNTIME_SOURCE_NAME);
    std::fs::write(&path, RUNTIME_SOURCE)?;
    Ok(path)
}

/// Write the runtime headers into `dir`, returning `dir` for use as an include path.
pub fn write_include_dir(dir: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)?;
    std::fs::write(dir.join("micrort_runtime.h"), RUNTIME_HEADER)?;
    std::fs::write(dir.join(REDIRECT_HEADER_NAME), REDIRECT_HEADER)?;
    Ok(dir.to_path_buf())
}

/// Write device support sources into `dir`, returning the compilable ones.
pub fn write_device_sources(dir: &Path, sources: &[EmbeddedSource]) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(dir)?;
    let mut paths = Vec::with_capacity(sources.len());
    for (name, contents) in sources {
        let path = dir.join(name);
        std::fs::write(&path, contents)?;
        if is_compilable(&path) {
            paths.push(path);
        }
    }
    Ok(paths)
}

fn is_compilable(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("c") | Some("s") | Some("S")
    )
}
