//! `micrort compile`: one-shot cross-compilation.

use std::path::Path;

use anyhow::{Context, Result};
use micrort_compile::{make_cross_compiler, LibType};
use micrort_targets::DeviceConfig;

/// Compile `src` for the device described by `config_path`.
pub fn run(config_path: &Path, lib_type: LibType, src: &Path, out: &Path, flags: &[String]) -> Result<()> {
    let config = DeviceConfig::load(config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;
    let compiler = make_cross_compiler(&config, lib_type)?;
    log::info!("compiling {} as {lib_type} for '{}'", src.display(), compiler.device_id());

    let options = (!flags.is_empty()).then_some(flags);
    let artifact = compiler
        .compile_artifact(out, src, options)
        .with_context(|| format!("compiling {} for '{}'", src.display(), config.device_id))?;

    println!("{lib_type} library for '{}': {artifact}", config.device_id);
    Ok(())
}
