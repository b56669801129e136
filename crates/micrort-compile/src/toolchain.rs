//! GCC-style toolchain backend.
//!
//! Every source is compiled with `<prefix>gcc -c` into a scratch directory,
//! and the objects are combined with `<prefix>ld -relocatable` into one
//! object at the requested path. Runtime builds also pull in the device's
//! support sources; operator builds get the runtime redirect header
//! prepended so their runtime calls resolve through patched pointers.

use std::path::{Path, PathBuf};
use std::process::Command;

use micrort_targets::{
    gen_mem_layout, CommsMethod, DeviceConfig, HostInfo, MemoryLayout, RegionKind,
    SectionConstraint,
};

use crate::backend::{CompileOptions, DefaultConfigParams, DeviceBackend, LibType};
use crate::error::{CompileError, Result};
use crate::runtime::{self, EmbeddedSource};

/// Flags every compile starts with.
const BASE_CFLAGS: &[&str] = &[
    "-std=c11",
    "-Wall",
    "-Wextra",
    "--pedantic",
    "-c",
    "-O0",
    "-g",
    "-nostartfiles",
    "-nodefaultlibs",
    "-nostdlib",
    "-fdata-sections",
    "-ffunction-sections",
];

/// Where a backend's default layout comes from.
#[derive(Debug, Clone)]
pub enum LayoutTemplate {
    /// Fixed sizes with unset bases.
    Fixed(Vec<(RegionKind, u64)>),
    /// Generated contiguously from a base address (see [`gen_mem_layout`]).
    Generated {
        base_addr: u64,
        available_mem: u64,
        constraints: Vec<(RegionKind, SectionConstraint)>,
    },
}

/// A device family driven through a GCC-compatible cross toolchain.
#[derive(Debug, Clone)]
pub struct ToolchainBackend {
    device_id: String,
    toolchain_prefix: String,
    cflags: Vec<String>,
    device_sources: &'static [EmbeddedSource],
    /// Add `-mcmodel=large` when the host itself is 64-bit Linux.
    host_code_model: bool,
    word_size: Option<u32>,
    thumb_mode: bool,
    comms: CommsMethod,
    layout: LayoutTemplate,
}

impl ToolchainBackend {
    /// The host process itself, compiled with the native toolchain.
    pub fn host() -> Self {
        Self {
            device_id: "host".into(),
            toolchain_prefix: String::new(),
            cflags: Vec::new(),
            device_sources: &[],
            host_code_model: true,
            word_size: None,
            thumb_mode: false,
            comms: CommsMethod::Host,
            layout: LayoutTemplate::Fixed(vec![
                (RegionKind::Text, 20480),
                (RegionKind::Rodata, 20480),
                (RegionKind::Data, 768),
                (RegionKind::Bss, 768),
                (RegionKind::Args, 4096),
                (RegionKind::Heap, 262_144),
                (RegionKind::Workspace, 262_144),
                (RegionKind::Stack, 4096),
            ]),
        }
    }

    /// STM32F746xx (Cortex-M7) boards reached through OpenOCD.
    pub fn stm32f746xx() -> Self {
        Self {
            device_id: "arm.stm32f746xx".into(),
            toolchain_prefix: "arm-none-eabi-".into(),
            cflags: [
                "-mcpu=cortex-m7",
                "-mlittle-endian",
                "-mfloat-abi=hard",
                "-mfpu=fpv5-sp-d16",
                "-mthumb",
                "-gdwarf-5",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            device_sources: runtime::STM32F746XX_SOURCES,
            host_code_model: false,
            word_size: Some(32),
            thumb_mode: true,
            comms: CommsMethod::OpenOcd,
            layout: LayoutTemplate::Generated {
                base_addr: 0x2000_0180,
                available_mem: 320_000,
                constraints: vec![
                    (RegionKind::Text, SectionConstraint::Bytes(18000)),
                    (RegionKind::Rodata, SectionConstraint::Bytes(100)),
                    (RegionKind::Data, SectionConstraint::Bytes(100)),
                    (RegionKind::Bss, SectionConstraint::Bytes(600)),
                    (RegionKind::Args, SectionConstraint::Bytes(4096)),
                    (RegionKind::Heap, SectionConstraint::Weight(100.0)),
                    (RegionKind::Workspace, SectionConstraint::Bytes(64000)),
                    (RegionKind::Stack, SectionConstraint::Bytes(32)),
                ],
            },
        }
    }

    /// The Spike RISC-V simulator reached through OpenOCD.
    pub fn riscv_spike() -> Self {
        Self {
            device_id: "riscv_spike".into(),
            toolchain_prefix: "riscv64-unknown-elf-".into(),
            cflags: vec!["-mcmodel=medany".into()],
            device_sources: runtime::RISCV_SPIKE_SOURCES,
            host_code_model: false,
            word_size: Some(64),
            thumb_mode: false,
            comms: CommsMethod::OpenOcd,
            layout: LayoutTemplate::Generated {
                base_addr: 0x8000_0000,
                available_mem: 131_072,
                constraints: vec![
                    (RegionKind::Text, SectionConstraint::Bytes(18000)),
                    (RegionKind::Rodata, SectionConstraint::Bytes(128)),
                    (RegionKind::Data, SectionConstraint::Bytes(128)),
                    (RegionKind::Bss, SectionConstraint::Bytes(2048)),
                    (RegionKind::Args, SectionConstraint::Bytes(4096)),
                    (RegionKind::Heap, SectionConstraint::Weight(100.0)),
                    (RegionKind::Workspace, SectionConstraint::Bytes(52000)),
                    (RegionKind::Stack, SectionConstraint::Bytes(1024)),
                ],
            },
        }
    }

    /// Default toolchain prefix for this family.
    pub fn toolchain_prefix(&self) -> &str {
        &self.toolchain_prefix
    }

    /// Full compiler flag list for one invocation, minus sources and outputs.
    pub fn cflags(&self, options: &CompileOptions, host: &HostInfo) -> Vec<String> {
        let mut flags: Vec<String> = BASE_CFLAGS.iter().map(|s| s.to_string()).collect();
        flags.extend(self.cflags.iter().cloned());
        if self.host_code_model && host.is_linux() && host.is_64bit() {
            flags.push("-mcmodel=large".into());
        }
        if options.thumb_mode && !flags.iter().any(|f| f == "-mthumb") {
            flags.push("-mthumb".into());
        }
        flags.extend(options.flags.iter().cloned());
        flags
    }

    fn check_layout(&self, layout: &MemoryLayout) -> Result<()> {
        if let Some((a, b)) = layout.overlapping_pairs().into_iter().next() {
            return Err(CompileError::Layout {
                device_id: self.device_id.clone(),
                detail: format!("regions '{}' and '{}' overlap", a.kind, b.kind),
            });
        }
        Ok(())
    }

    /// Backends with a fixed word size only build for that width.
    fn check_word_size(&self, requested: Option<u32>) -> Result<()> {
        match (self.word_size, requested) {
            (Some(fixed), Some(requested)) if fixed != requested => {
                Err(CompileError::InvalidArgument {
                    detail: format!(
                        "device '{}' is {fixed}-bit but {requested}-bit code was requested",
                        self.device_id
                    ),
                })
            }
            _ => Ok(()),
        }
    }

    fn default_layout(&self, word_size_bits: u32) -> Result<MemoryLayout> {
        match &self.layout {
            LayoutTemplate::Fixed(sizes) => Ok(sizes
                .iter()
                .fold(MemoryLayout::new(), |l, &(k, size)| l.with_region(k, None, size))),
            LayoutTemplate::Generated {
                base_addr,
                available_mem,
                constraints,
            } => Ok(gen_mem_layout(
                *base_addr,
                *available_mem,
                u64::from(word_size_bits / 8),
                constraints,
            )?),
        }
    }
}

impl DeviceBackend for ToolchainBackend {
    fn device_id(&self) -> &str {
        &self.device_id
    }

    fn compile(
        &self,
        obj_path: &Path,
        src_path: &Path,
        lib_type: LibType,
        options: &CompileOptions,
    ) -> Result<()> {
        self.check_word_size(options.word_size)?;
        if let Some(layout) = &options.layout {
            self.check_layout(layout)?;
        }
        let prefix = options
            .toolchain_prefix
            .as_deref()
            .unwrap_or(&self.toolchain_prefix);

        let scratch = tempfile::tempdir()?;
        let include_dir = runtime::write_include_dir(&scratch.path().join("include"))?;

        let mut sources = Vec::new();
        match lib_type {
            LibType::Runtime => {
                sources.push(src_path.to_path_buf());
                sources.extend(runtime::write_device_sources(
                    &scratch.path().join("device"),
                    self.device_sources,
                )?);
            }
            LibType::Operator => {
                sources.push(redirect_source(src_path, scratch.path())?);
            }
        }

        let cflags = self.cflags(options, &HostInfo::current());
        let gcc = format!("{prefix}gcc");
        let mut objects = Vec::with_capacity(sources.len());
        for (i, src) in sources.iter().enumerate() {
            let stem = src
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("source");
            let obj = scratch.path().join(format!("{i}_{stem}.o"));
            let mut cmd = Command::new(&gcc);
            cmd.args(&cflags).arg(src).arg("-o").arg(&obj);
            cmd.arg("-I").arg(&include_dir);
            if let Some(src_dir) = src_path.parent() {
                cmd.arg("-I").arg(src_dir);
            }
            run_tool(&gcc, &mut cmd)?;
            objects.push(obj);
        }

        let ld = format!("{prefix}ld");
        let mut cmd = Command::new(&ld);
        cmd.arg("-relocatable")
            .args(&objects)
            .arg("-o")
            .arg(obj_path);
        run_tool(&ld, &mut cmd)?;

        log::info!(
            "compiled {} library for '{}' -> {}",
            lib_type,
            self.device_id,
            obj_path.display()
        );
        Ok(())
    }

    fn default_config(&self, params: &DefaultConfigParams) -> Result<DeviceConfig> {
        let word_size = self
            .word_size
            .unwrap_or_else(|| HostInfo::current().word_size());
        let (server_addr, server_port) = match self.comms {
            CommsMethod::Host => (None, None),
            CommsMethod::OpenOcd => (params.server_addr.clone(), params.server_port),
        };
        Ok(DeviceConfig {
            device_id: self.device_id.clone(),
            toolchain_prefix: self.toolchain_prefix.clone(),
            mem_layout: self.default_layout(word_size)?,
            word_size,
            thumb_mode: self.thumb_mode,
            comms_method: self.comms.to_string(),
            server_addr,
            server_port,
        })
    }
}

/// Copy an operator source into `dir` with the redirect header prepended.
fn redirect_source(src_path: &Path, dir: &Path) -> Result<PathBuf> {
    let original = std::fs::read_to_string(src_path)?;
    let name = src_path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "operator.c".into());
    let path = dir.join(name);
    let redirected = format!(
        "#include \"{}\"\n{}",
        runtime::REDIRECT_HEADER_NAME,
        original
    );
    std::fs::write(&path, redirected)?;
    Ok(path)
}

/// Run a toolchain command, turning a failed exit into [`CompileError::Toolchain`].
fn run_tool(tool: &str, cmd: &mut Command) -> Result<()> {
    log::debug!("running {cmd:?}");
    let output = cmd.output().map_err(|e| CompileError::Toolchain {
        tool: tool.to_string(),
        message: format!("failed to invoke: {e}"),
    })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(CompileError::Toolchain {
            tool: tool.to_string(),
            message: format!("exited with {}: {}", output.status, stderr.trim()),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_default_config() {
        let config = ToolchainBackend::host()
            .default_config(&DefaultConfigParams::default())
            .unwrap();
        assert_eq!(config.device_id, "host");
        assert_eq!(config.comms_method, "host");
        assert!(config.server_addr.is_none());
        assert!(config.mem_layout.is_complete());
        assert!(config
            .mem_layout
            .regions()
            .all(|r| r.base.is_none()));
        assert_eq!(config.word_size, HostInfo::current().word_size());
    }

    #[test]
    fn stm32_default_config_is_generated() {
        let params = DefaultConfigParams {
            server_addr: Some("127.0.0.1".into()),
            server_port: Some(6666),
        };
        let config = ToolchainBackend::stm32f746xx().default_config(&params).unwrap();
        assert_eq!(config.word_size, 32);
        assert!(config.thumb_mode);
        assert_eq!(config.server_port, Some(6666));
        assert!(config.mem_layout.is_complete());
        assert!(config.mem_layout.overlapping_pairs().is_empty());

        let text = config.mem_layout.region(RegionKind::Text).unwrap();
        assert_eq!(text.base, Some(0x2000_0180));
        // 320000 - 86928 fixed bytes
        let heap = config.mem_layout.region(RegionKind::Heap).unwrap();
        assert_eq!(heap.size, 233_072);
    }

    #[test]
    fn riscv_default_config_is_complete() {
        let config = ToolchainBackend::riscv_spike()
            .default_config(&DefaultConfigParams::default())
            .unwrap();
        assert_eq!(config.toolchain_prefix, "riscv64-unknown-elf-");
        assert_eq!(config.comms_method, "openocd");
        assert!(config.mem_layout.is_complete());
    }

    #[test]
    fn cflags_compose() {
        let backend = ToolchainBackend::host();
        let options = CompileOptions::default().with_flags(["-DFOO=1".to_string()]);
        let flags = backend.cflags(&options, &HostInfo::new("linux", 64));
        assert_eq!(flags[0], "-std=c11");
        assert!(flags.contains(&"-mcmodel=large".to_string()));
        assert_eq!(flags.last().map(String::as_str), Some("-DFOO=1"));

        let flags = backend.cflags(&CompileOptions::default(), &HostInfo::new("macos", 64));
        assert!(!flags.contains(&"-mcmodel=large".to_string()));
    }

    #[test]
    fn thumb_flag_not_duplicated() {
        let options = CompileOptions {
            thumb_mode: true,
            ..CompileOptions::default()
        };
        let host = HostInfo::current();
        let stm32 = ToolchainBackend::stm32f746xx().cflags(&options, &host);
        assert_eq!(stm32.iter().filter(|f| *f == "-mthumb").count(), 1);
        let native = ToolchainBackend::host().cflags(&options, &host);
        assert!(native.contains(&"-mthumb".to_string()));
    }

    #[test]
    fn overlapping_layout_is_rejected_before_toolchain_runs() {
        let dir = tempfile::tempdir().unwrap();
        let layout = MemoryLayout::new()
            .with_region(RegionKind::Text, Some(0x1000), 0x200)
            .with_region(RegionKind::Data, Some(0x1100), 0x200);
        let options = CompileOptions {
            layout: Some(layout),
            // A prefix no system has, so reaching the toolchain would fail differently.
            toolchain_prefix: Some("definitely-not-a-toolchain-".into()),
            ..CompileOptions::default()
        };
        let err = ToolchainBackend::host()
            .compile(
                &dir.path().join("out.obj"),
                &dir.path().join("in.c"),
                LibType::Operator,
                &options,
            )
            .unwrap_err();
        match err {
            CompileError::Layout { device_id, detail } => {
                assert_eq!(device_id, "host");
                assert!(detail.contains("text"));
            }
            other => panic!("expected Layout, got {other:?}"),
        }
    }

    #[test]
    fn mismatched_word_size_is_rejected_before_toolchain_runs() {
        let dir = tempfile::tempdir().unwrap();
        let options = CompileOptions {
            word_size: Some(64),
            toolchain_prefix: Some("definitely-not-a-toolchain-".into()),
            ..CompileOptions::default()
        };
        let err = ToolchainBackend::stm32f746xx()
            .compile(
                &dir.path().join("out.obj"),
                &dir.path().join("in.c"),
                LibType::Operator,
                &options,
            )
            .unwrap_err();
        match err {
            CompileError::InvalidArgument { detail } => {
                assert!(detail.contains("32-bit"), "{detail}");
                assert!(detail.contains("64-bit"), "{detail}");
            }
            other => panic!("expected InvalidArgument, got {other:?}"),
        }

        // Matching and unspecified widths pass the check.
        let stm32 = ToolchainBackend::stm32f746xx();
        assert!(stm32.check_word_size(Some(32)).is_ok());
        assert!(stm32.check_word_size(None).is_ok());
        assert!(ToolchainBackend::host().check_word_size(Some(32)).is_ok());
    }

    #[test]
    fn missing_toolchain_is_compile_error() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("op.c");
        std::fs::write(&src, "int op(void) { return 0; }\n").unwrap();
        let options = CompileOptions {
            toolchain_prefix: Some("definitely-not-a-toolchain-".into()),
            ..CompileOptions::default()
        };
        let err = ToolchainBackend::host()
            .compile(&dir.path().join("out.obj"), &src, LibType::Operator, &options)
            .unwrap_err();
        match err {
            CompileError::Toolchain { tool, .. } => {
                assert_eq!(tool, "definitely-not-a-toolchain-gcc")
            }
            other => panic!("expected Toolchain, got {other:?}"),
        }
    }

    #[test]
    fn redirect_prepends_header() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("op.c");
        std::fs::write(&src, "int op(void) { return 0; }\n").unwrap();
        let out_dir = dir.path().join("staged");
        std::fs::create_dir_all(&out_dir).unwrap();
        let staged = redirect_source(&src, &out_dir).unwrap();
        let text = std::fs::read_to_string(staged).unwrap();
        assert!(text.starts_with("#include \"micrort_device_redirect.h\""));
        assert!(text.contains("int op(void)"));
    }
}
