//! Kernel program loading and compilation.

use super::context::{with_error_scopes, ComputeContext};
use super::kernel::{Kernel, KernelSignature};
use crate::error::{Error, Result};
use std::path::Path;

/// A validated module together with the per-function analysis the
/// validator produced for it.
#[derive(Debug)]
pub struct CompiledSource {
    pub module: naga::Module,
    pub info: naga::valid::ModuleInfo,
}

impl CompiledSource {
    /// Names of every entry point in the module.
    pub fn entry_points(&self) -> impl Iterator<Item = &str> {
        self.module.entry_points.iter().map(|ep| ep.name.as_str())
    }
}

/// Parses and validates WGSL source without touching a device.
///
/// On failure the returned [`Error::Compile`] carries the rendered
/// diagnostics, source excerpts included.
pub fn compile_source(source: &str, label: &str) -> Result<CompiledSource> {
    let module = naga::front::wgsl::parse_str(source)
        .map_err(|e| Error::compile(format!("{label}:\n{}", e.emit_to_string(source))))?;

    let info = naga::valid::Validator::new(
        naga::valid::ValidationFlags::all(),
        naga::valid::Capabilities::all(),
    )
    .validate(&module)
    .map_err(|e| Error::compile(format!("{label}:\n{}", e.emit_to_string(source))))?;

    Ok(CompiledSource { module, info })
}

/// Reads a kernel source file.
///
/// A file that cannot be opened is [`Error::SourceNotFound`]; one that is not
/// UTF-8 text is a compile failure.
pub fn read_source(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|source| match source.kind() {
        std::io::ErrorKind::InvalidData => Error::compile(format!(
            "{}:\nsource is not valid UTF-8: {source}",
            path.display()
        )),
        _ => Error::SourceNotFound {
            path: path.to_path_buf(),
            source,
        },
    })
}

/// Reads kernel source files and builds them for a context's device.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProgramBuilder;

impl ProgramBuilder {
    /// Reads the file at `path` and builds it for the context's device.
    pub fn build<P: AsRef<Path>>(context: &ComputeContext, path: P) -> Result<Program> {
        let path = path.as_ref();
        let source = read_source(path)?;

        Self::build_source(context, &path.display().to_string(), source)
    }

    /// Builds in-memory source. `label` names the program in diagnostics.
    pub fn build_source(context: &ComputeContext, label: &str, source: String) -> Result<Program> {
        let compiled = compile_source(&source, label)?;

        let shader = with_error_scopes(context.device(), || {
            context
                .device()
                .create_shader_module(wgpu::ShaderModuleDescriptor {
                    label: Some(label),
                    source: wgpu::ShaderSource::Wgsl(source.as_str().into()),
                })
        })
        .map_err(|e| Error::compile(format!("{label}:\n{e}")))?;

        tracing::debug!(
            "built program {label} ({} entry points)",
            compiled.module.entry_points.len()
        );

        Ok(Program {
            label: label.to_string(),
            compiled,
            shader,
        })
    }
}

/// A program compiled for one device. Never partially valid.
#[derive(Debug)]
pub struct Program {
    label: String,
    compiled: CompiledSource,
    shader: wgpu::ShaderModule,
}

impl Program {
    /// Source path or label the program was built from.
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn entry_points(&self) -> impl Iterator<Item = &str> {
        self.compiled.entry_points()
    }

    /// Declared parameters of `entry_point`.
    pub fn signature(&self, entry_point: &str) -> Result<KernelSignature> {
        KernelSignature::reflect(&self.compiled, entry_point)
    }

    /// Creates a kernel for the named compute entry point.
    pub fn create_kernel(&self, context: &ComputeContext, entry_point: &str) -> Result<Kernel> {
        let signature = self.signature(entry_point)?;
        Kernel::new(context, &self.shader, entry_point, signature)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::kernel::SlotKind;

    const REFERENCE_KERNEL: &str = include_str!("../../kernels/vector_ops.wgsl");

    #[test]
    fn test_reference_kernel_compiles() {
        let compiled = compile_source(REFERENCE_KERNEL, "vector_ops.wgsl").unwrap();
        assert!(compiled.entry_points().any(|name| name == "vector_add"));
    }

    #[test]
    fn test_invalid_source_reports_log() {
        let err = compile_source("fn broken( {", "broken.wgsl").unwrap_err();
        let log = err.compile_log().unwrap();
        assert!(!log.trim().is_empty());
        assert!(log.contains("broken.wgsl"));
    }

    #[test]
    fn test_type_error_is_a_compile_failure() {
        // Well-formed syntax with a type error.
        let source = "fn f() -> f32 { let a: i32 = 1; let b: f32 = 2.0; return a + b; }";
        let err = compile_source(source, "mixed.wgsl").unwrap_err();
        assert!(matches!(err, Error::Compile { .. }));
    }

    #[test]
    fn test_reference_kernel_signature() {
        let compiled = compile_source(REFERENCE_KERNEL, "vector_ops.wgsl").unwrap();
        let signature = KernelSignature::reflect(&compiled, "vector_add").unwrap();

        assert_eq!(signature.len(), 4);
        assert_eq!(signature.workgroup_size(), 64);
        assert_eq!(signature.slot(0).unwrap().kind, SlotKind::Scalar { size: 4 });
        assert_eq!(
            signature.slot(1).unwrap().kind,
            SlotKind::Buffer {
                element_size: 4,
                read_only: true
            }
        );
        assert_eq!(
            signature.slot(3).unwrap().kind,
            SlotKind::Buffer {
                element_size: 4,
                read_only: false
            }
        );
    }

    #[test]
    fn test_non_utf8_source_is_a_compile_failure() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(&mut file, &[0x40, 0xff, 0xfe, 0x0a]).unwrap();

        let err = read_source(file.path()).unwrap_err();
        assert!(matches!(err, Error::Compile { .. }));
        assert!(err.compile_log().unwrap().contains("UTF-8"));
    }

    #[test]
    fn test_missing_source_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_source(&dir.path().join("absent.wgsl")).unwrap_err();
        assert!(matches!(err, Error::SourceNotFound { .. }));
    }
}
