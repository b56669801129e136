//! Operator module building and loading.
//!
//! An [`IntermediateModule`] exports itself as a library through an
//! [`ExportCompiler`]; a [`ModuleLoader`] turns the written object into a
//! [`MicroModule`]. Modules are independent of any session.

use std::fmt;
use std::path::{Component, Path, PathBuf};

use goblin::elf::sym::{STB_GLOBAL, STT_FUNC};
use goblin::Object;
use micrort_compile::{
    make_cross_compiler_with, CompileError, DeviceRegistry, ExportCompiler, LibType, ObjectArtifact, PathArg,
};
use micrort_targets::DeviceConfig;
use tempfile::TempDir;

use crate::error::{Result, SessionError};

/// File name of an exported operator library inside its staging directory.
pub const DEV_LIB_NAME: &str = "dev_lib.obj";

/// A module that can be exported as a device library.
pub trait IntermediateModule {
    /// Write a library for this module to `path` using `compiler`.
    fn export_library(&self, path: &Path, compiler: &dyn ExportCompiler) -> Result<()>;
}

/// Generated C source for one operator library.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceModule {
    pub name: String,
    pub source: String,
}

impl SourceModule {
    pub fn new(name: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source: source.into(),
        }
    }
}

impl IntermediateModule for SourceModule {
    fn export_library(&self, path: &Path, compiler: &dyn ExportCompiler) -> Result<()> {
        check_module_name(&self.name)?;
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        let src_path = dir.join(format!("{}.c", self.name));
        std::fs::write(&src_path, &self.source)?;
        compiler.compile(PathArg::One(path.to_path_buf()), PathArg::Many(vec![src_path]), None)?;
        Ok(())
    }
}

/// A module name becomes a file name, so it must be one plain path component.
fn check_module_name(name: &str) -> Result<()> {
    let mut components = Path::new(name).components();
    let plain = matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    );
    if plain && !name.contains(['/', '\\']) {
        return Ok(());
    }
    Err(CompileError::InvalidArgument {
        detail: format!("module name '{name}' must be a plain file name"),
    }
    .into())
}

/// Loads a compiled library.
pub trait ModuleLoader {
    fn load(&self, path: &Path) -> Result<MicroModule>;
}

/// Inspects object files with `goblin`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ObjectModuleLoader;

impl ModuleLoader for ObjectModuleLoader {
    fn load(&self, path: &Path) -> Result<MicroModule> {
        let bytes = std::fs::read(path).map_err(|e| load_error(path, e.to_string()))?;
        let artifact = ObjectArtifact::from_bytes(path, &bytes);

        let (format, symbols) = match Object::parse(&bytes) {
            Ok(Object::Elf(elf)) => {
                let format = if elf.is_64 { "elf64" } else { "elf32" };
                let symbols = elf
                    .syms
                    .iter()
                    .filter(|sym| {
                        sym.st_bind() == STB_GLOBAL && sym.st_type() == STT_FUNC && sym.st_shndx != 0
                    })
                    .filter_map(|sym| elf.strtab.get_at(sym.st_name))
                    .map(str::to_string)
                    .collect();
                (format, symbols)
            }
            Ok(Object::Mach(_)) => ("mach-o", Vec::new()),
            Ok(_) => return Err(load_error(path, "not a relocatable object".into())),
            Err(e) => return Err(load_error(path, e.to_string())),
        };

        log::debug!("loaded {artifact}: {format}, {} functions", symbols.len());
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(MicroModule {
            name,
            artifact,
            format,
            symbols,
            _workdir: None,
        })
    }
}

/// A loaded operator library.
pub struct MicroModule {
    name: String,
    artifact: ObjectArtifact,
    format: &'static str,
    symbols: Vec<String>,
    _workdir: Option<TempDir>,
}

impl fmt::Debug for MicroModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MicroModule")
            .field("name", &self.name)
            .field("artifact", &self.artifact)
            .field("format", &self.format)
            .field("symbols", &self.symbols)
            .finish()
    }
}

impl MicroModule {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn artifact(&self) -> &ObjectArtifact {
        &self.artifact
    }

    pub fn path(&self) -> &Path {
        &self.artifact.path
    }

    /// Object format tag: "elf32", "elf64" or "mach-o".
    pub fn format(&self) -> &str {
        self.format
    }

    /// Defined global functions.
    pub fn symbols(&self) -> &[String] {
        &self.symbols
    }

    pub fn has_symbol(&self, name: &str) -> bool {
        self.symbols.iter().any(|s| s == name)
    }

    /// Keep `dir` alive for as long as the module.
    pub fn with_workdir(mut self, dir: TempDir) -> Self {
        self._workdir = Some(dir);
        self
    }
}

/// Build `module` as an operator library for `config`'s device and load it.
pub fn create_micro_mod(module: &dyn IntermediateModule, config: &DeviceConfig) -> Result<MicroModule> {
    create_micro_mod_with(&DeviceRegistry::global(), &ObjectModuleLoader, module, config)
}

/// Like [`create_micro_mod`] with an explicit registry and loader.
pub fn create_micro_mod_with(
    registry: &DeviceRegistry,
    loader: &dyn ModuleLoader,
    module: &dyn IntermediateModule,
    config: &DeviceConfig,
) -> Result<MicroModule> {
    let compiler = make_cross_compiler_with(registry, config, LibType::Operator)?;
    build_with(&compiler, module, loader)
}

pub(crate) fn build_with(
    compiler: &dyn ExportCompiler,
    module: &dyn IntermediateModule,
    loader: &dyn ModuleLoader,
) -> Result<MicroModule> {
    let workdir = tempfile::Builder::new().prefix("micrort-mod-").tempdir()?;
    let lib_path: PathBuf = workdir.path().join(DEV_LIB_NAME);
    module.export_library(&lib_path, compiler)?;
    let module = loader.load(&lib_path)?;
    Ok(module.with_workdir(workdir))
}

fn load_error(path: &Path, detail: String) -> SessionError {
    SessionError::Load {
        path: path.to_path_buf(),
        detail,
    }
}
