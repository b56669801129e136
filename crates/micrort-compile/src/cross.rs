//! Cross-compiler adapter for library export.
//!
//! Library export pipelines hand over a destination path, one or more source
//! paths, and optional extra flags, and expect an artifact in the compiler's
//! declared output format. [`CrossCompiler`] bridges that contract to a
//! device backend for a fixed [`LibType`].

use std::path::{Path, PathBuf};
use std::sync::Arc;

use micrort_targets::DeviceConfig;

use crate::artifact::ObjectArtifact;
use crate::backend::{CompileOptions, DeviceBackend, LibType};
use crate::error::{CompileError, Result};
use crate::registry::DeviceRegistry;

/// A path argument that may arrive as a scalar or as a sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathArg {
    One(PathBuf),
    Many(Vec<PathBuf>),
}

impl PathArg {
    /// Reduce to a single path. Sequences must hold exactly one element.
    pub fn into_single(self, arg_name: &str) -> Result<PathBuf> {
        match self {
            PathArg::One(path) => Ok(path),
            PathArg::Many(mut paths) if paths.len() == 1 => Ok(paths.remove(0)),
            PathArg::Many(paths) => Err(CompileError::InvalidArgument {
                detail: format!(
                    "{arg_name} must name exactly one file, got {}",
                    paths.len()
                ),
            }),
        }
    }
}

impl From<PathBuf> for PathArg {
    fn from(path: PathBuf) -> Self {
        PathArg::One(path)
    }
}

impl From<&Path> for PathArg {
    fn from(path: &Path) -> Self {
        PathArg::One(path.to_path_buf())
    }
}

impl From<&PathBuf> for PathArg {
    fn from(path: &PathBuf) -> Self {
        PathArg::One(path.clone())
    }
}

impl From<&str> for PathArg {
    fn from(path: &str) -> Self {
        PathArg::One(PathBuf::from(path))
    }
}

impl From<Vec<PathBuf>> for PathArg {
    fn from(paths: Vec<PathBuf>) -> Self {
        PathArg::Many(paths)
    }
}

impl From<&[PathBuf]> for PathArg {
    fn from(paths: &[PathBuf]) -> Self {
        PathArg::Many(paths.to_vec())
    }
}

/// A pluggable compile step for library export.
pub trait ExportCompiler {
    /// Format tag of the produced artifact (e.g., "obj").
    fn output_format(&self) -> &str;

    /// Compile `src_path` into `obj_path`.
    fn compile(&self, obj_path: PathArg, src_path: PathArg, options: Option<&[String]>) -> Result<()>;
}

/// Adapts a device backend to [`ExportCompiler`] for one library type.
#[derive(Debug, Clone)]
pub struct CrossCompiler {
    backend: Arc<dyn DeviceBackend>,
    lib_type: LibType,
    options: CompileOptions,
}

impl CrossCompiler {
    /// Wrap an already-resolved backend.
    pub fn new(backend: Arc<dyn DeviceBackend>, config: &DeviceConfig, lib_type: LibType) -> Self {
        Self {
            backend,
            lib_type,
            options: CompileOptions::from_config(config),
        }
    }

    pub fn lib_type(&self) -> LibType {
        self.lib_type
    }

    pub fn device_id(&self) -> &str {
        self.backend.device_id()
    }

    /// Compile and describe the written object.
    pub fn compile_artifact(
        &self,
        obj_path: impl Into<PathArg>,
        src_path: impl Into<PathArg>,
        options: Option<&[String]>,
    ) -> Result<ObjectArtifact> {
        let obj_path = obj_path.into().into_single("obj_path")?;
        self.compile(PathArg::One(obj_path.clone()), src_path.into(), options)?;
        ObjectArtifact::from_path(&obj_path)
    }
}

impl ExportCompiler for CrossCompiler {
    fn output_format(&self) -> &str {
        "obj"
    }

    fn compile(&self, obj_path: PathArg, src_path: PathArg, options: Option<&[String]>) -> Result<()> {
        let obj_path = obj_path.into_single("obj_path")?;
        let src_path = src_path.into_single("src_path")?;
        let options = match options {
            Some(flags) => self.options.clone().with_flags(flags.iter().cloned()),
            None => self.options.clone(),
        };
        self.backend
            .compile(&obj_path, &src_path, self.lib_type, &options)
    }
}

/// Build a cross compiler for `config`'s device from the process-wide registry.
pub fn make_cross_compiler(config: &DeviceConfig, lib_type: LibType) -> Result<CrossCompiler> {
    make_cross_compiler_with(&DeviceRegistry::global(), config, lib_type)
}

/// Build a cross compiler for `config`'s device from an explicit registry.
pub fn make_cross_compiler_with(
    registry: &DeviceRegistry,
    config: &DeviceConfig,
    lib_type: LibType,
) -> Result<CrossCompiler> {
    let backend = registry.get(&config.device_id)?;
    Ok(CrossCompiler::new(backend, config, lib_type))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::DefaultConfigParams;
    use parking_lot::Mutex;

    /// Records calls and writes a marker object instead of running a toolchain.
    #[derive(Debug, Default)]
    struct RecordingBackend {
        calls: Mutex<Vec<(PathBuf, PathBuf, LibType, Vec<String>)>>,
    }

    impl DeviceBackend for RecordingBackend {
        fn device_id(&self) -> &str {
            "recording"
        }

        fn compile(
            &self,
            obj_path: &Path,
            src_path: &Path,
            lib_type: LibType,
            options: &CompileOptions,
        ) -> Result<()> {
            std::fs::write(obj_path, format!("{lib_type}:{}", src_path.display()))?;
            self.calls.lock().push((
                obj_path.to_path_buf(),
                src_path.to_path_buf(),
                lib_type,
                options.flags.clone(),
            ));
            Ok(())
        }

        fn default_config(&self, params: &DefaultConfigParams) -> Result<DeviceConfig> {
            let mut config = crate::toolchain::ToolchainBackend::host().default_config(params)?;
            config.device_id = "recording".into();
            Ok(config)
        }
    }

    fn setup() -> (Arc<RecordingBackend>, CrossCompiler) {
        let backend = Arc::new(RecordingBackend::default());
        let config = backend.default_config(&DefaultConfigParams::default()).unwrap();
        let mut registry = DeviceRegistry::new();
        registry.register(backend.clone()).unwrap();
        let cc = make_cross_compiler_with(&registry, &config, LibType::Operator).unwrap();
        (backend, cc)
    }

    #[test]
    fn output_format_is_obj() {
        let (_, cc) = setup();
        assert_eq!(cc.output_format(), "obj");
        assert_eq!(cc.lib_type(), LibType::Operator);
        assert_eq!(cc.device_id(), "recording");
    }

    #[test]
    fn single_element_sequences_match_scalars() {
        let dir = tempfile::tempdir().unwrap();
        let (backend, cc) = setup();
        let obj = dir.path().join("lib.obj");
        let src = dir.path().join("lib.c");

        cc.compile(obj.as_path().into(), src.as_path().into(), None).unwrap();
        cc.compile(vec![obj.clone()].into(), vec![src.clone()].into(), None)
            .unwrap();

        let calls = backend.calls.lock();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0], calls[1]);
        assert_eq!(calls[0].0, obj);
        assert_eq!(calls[0].1, src);
        assert_eq!(calls[0].2, LibType::Operator);
    }

    #[test]
    fn multi_element_sequences_are_rejected() {
        let (backend, cc) = setup();
        let two = vec![PathBuf::from("a.c"), PathBuf::from("b.c")];
        let err = cc.compile("out.obj".into(), two.into(), None).unwrap_err();
        assert!(matches!(err, CompileError::InvalidArgument { ref detail } if detail.contains("src_path")));

        let err = cc
            .compile(Vec::<PathBuf>::new().into(), "in.c".into(), None)
            .unwrap_err();
        assert!(matches!(err, CompileError::InvalidArgument { ref detail } if detail.contains("obj_path")));
        assert!(backend.calls.lock().is_empty());
    }

    #[test]
    fn extra_options_are_forwarded() {
        let dir = tempfile::tempdir().unwrap();
        let (backend, cc) = setup();
        let flags = vec!["-DOPT=1".to_string()];
        let artifact = cc
            .compile_artifact(dir.path().join("x.obj"), dir.path().join("x.c"), Some(&flags))
            .unwrap();
        assert!(artifact.size_bytes > 0);
        assert_eq!(backend.calls.lock()[0].3, flags);
    }

    #[test]
    fn unknown_device_fails_at_construction() {
        let mut config = crate::toolchain::ToolchainBackend::host()
            .default_config(&DefaultConfigParams::default())
            .unwrap();
        config.device_id = "nope".into();
        let err = make_cross_compiler_with(&DeviceRegistry::new(), &config, LibType::Runtime)
            .unwrap_err();
        assert!(matches!(err, CompileError::UnknownDevice { .. }));
    }

    #[test]
    fn backend_errors_propagate_unchanged() {
        #[derive(Debug)]
        struct Failing;
        impl DeviceBackend for Failing {
            fn device_id(&self) -> &str {
                "failing"
            }
            fn compile(&self, _: &Path, _: &Path, _: LibType, _: &CompileOptions) -> Result<()> {
                Err(CompileError::Toolchain {
                    tool: "gcc".into(),
                    message: "boom".into(),
                })
            }
            fn default_config(&self, _: &DefaultConfigParams) -> Result<DeviceConfig> {
                unreachable!()
            }
        }

        let config = crate::toolchain::ToolchainBackend::host()
            .default_config(&DefaultConfigParams::default())
            .unwrap();
        let cc = CrossCompiler::new(Arc::new(Failing), &config, LibType::Runtime);
        let err = cc.compile("o".into(), "s".into(), None).unwrap_err();
        assert!(matches!(err, CompileError::Toolchain { ref message, .. } if message == "boom"));
    }
}
