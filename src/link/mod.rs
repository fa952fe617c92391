//! Final link
//!
//! The relocatable runtime binary is linked with:
//!
//! 1. objects generated for this run (the filesystem image, preset
//!    arguments), compiled with the toolchain's clang
//! 2. the runtime-support static libraries, which read the image
//!
//! The preset-args object replaces the WASI args imports, so the module
//! starts with those arguments whatever the host passes.
//!
//! into one module in a scratch directory. That module is only an
//! intermediate: the transform stage produces the final output file.

pub mod objects;

pub use objects::{preset_args_c_source, GeneratedSource, PRESET_PROGRAM_NAME};

use crate::build::{BuildContext, BuildOutput, CLANG_TARGET};
use crate::error::{RbwasmError, RbwasmResult};
use crate::external::{ExternalStep, Invocation, StepOutput};
use crate::vfs::embed::image_c_source;
use crate::vfs::VfsImage;
use crate::workspace::{Scratch, Workspace};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

/// Inputs of the final link
#[derive(Debug, Clone, Copy)]
pub struct LinkInput<'a> {
    pub runtime: &'a BuildOutput,
    /// Filesystem image, omitted when nothing is mounted
    pub image: Option<&'a VfsImage>,
    /// Arguments embedded as the module's default `argv`
    pub preset_args: &'a [String],
    pub stack_size: usize,
    pub extra_args: &'a [String],
}

/// Linked, not yet transformed module
#[derive(Debug)]
pub struct LinkedModule {
    path: PathBuf,
    _scratch: Scratch,
}

impl LinkedModule {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Runs clang and wasm-ld through an [`ExternalStep`]
pub struct LinkerDriver {
    workspace: Workspace,
    step: Arc<dyn ExternalStep>,
    export_sources: bool,
}

impl LinkerDriver {
    pub fn new(workspace: Workspace, step: Arc<dyn ExternalStep>) -> Self {
        Self {
            workspace,
            step,
            export_sources: false,
        }
    }

    /// Also copy generated C sources into the workspace `tmp/` for inspection
    pub fn with_exported_sources(mut self, export: bool) -> Self {
        self.export_sources = export;
        self
    }

    /// Generated sources for this link, in link order
    pub fn generated_sources(input: &LinkInput<'_>) -> Vec<GeneratedSource> {
        let mut sources = Vec::new();
        if let Some(image) = input.image {
            sources.push(GeneratedSource::new("fs", image_c_source(&image.to_bytes())));
        }
        if !input.preset_args.is_empty() {
            sources.push(GeneratedSource::new(
                "preset-args",
                preset_args_c_source(input.preset_args),
            ));
        }
        sources
    }

    pub async fn link(&self, ctx: &BuildContext, input: &LinkInput<'_>) -> RbwasmResult<LinkedModule> {
        info!("Linking module");
        let scratch = self.workspace.scratch("link-")?;

        let mut objects = Vec::new();
        for source in Self::generated_sources(input) {
            objects.push(self.compile(ctx, &scratch, &source).await?);
        }

        let output = scratch.path().join("linked.wasm");
        let link = link_invocation(ctx, input, &objects, &output);
        let result = self.step.run(&link).await?;
        check(&link, &result)?;
        if !output.is_file() {
            return Err(RbwasmError::Link {
                step: link.description,
                status: result.status(),
                output: format!("linker produced no output at {}", output.display()),
            });
        }

        Ok(LinkedModule {
            path: output,
            _scratch: scratch,
        })
    }

    async fn compile(
        &self,
        ctx: &BuildContext,
        scratch: &Scratch,
        source: &GeneratedSource,
    ) -> RbwasmResult<PathBuf> {
        let c_file = scratch.write(&source.c_file_name(), source.source.as_bytes())?;
        if self.export_sources {
            self.export(source);
        }

        let object = scratch.path().join(source.object_file_name());
        let compile = Invocation::new(format!("compile {}", source.c_file_name()), &ctx.cc)
            .arg(format!("--target={}", CLANG_TARGET))
            .arg(format!("--sysroot={}", ctx.sysroot.display()))
            .arg("-c")
            .path_arg(&c_file)
            .arg("-o")
            .path_arg(&object);
        let result = self.step.run(&compile).await?;
        check(&compile, &result)?;
        Ok(object)
    }

    fn export(&self, source: &GeneratedSource) {
        let path = self.workspace.temporary_dir().join(source.c_file_name());
        info!("Exporting generated source to {}", path.display());
        if let Err(e) = std::fs::write(&path, &source.source) {
            warn!("Failed to export {}: {}", path.display(), e);
        }
    }
}

/// `wasm-ld <runtime> --stack-first -z stack-size=N -o OUT <extra> <objects> <libs>`
pub fn link_invocation(
    ctx: &BuildContext,
    input: &LinkInput<'_>,
    objects: &[PathBuf],
    output: &Path,
) -> Invocation {
    let mut link = Invocation::new("wasm-ld", &ctx.wasm_ld)
        .path_arg(&input.runtime.runtime_binary())
        .args(["--stack-first", "-z"])
        .arg(format!("stack-size={}", input.stack_size))
        .arg("-o")
        .path_arg(output)
        .args(input.extra_args.iter().cloned());
    for object in objects.iter().chain(ctx.support_libs.iter()) {
        link = link.path_arg(object);
    }
    link
}

fn check(invocation: &Invocation, output: &StepOutput) -> RbwasmResult<()> {
    if output.is_success() {
        Ok(())
    } else {
        Err(RbwasmError::link(&invocation.description, output))
    }
}
