//! Runtime cross-build
//!
//! Drives the runtime's own `configure` and `make install` for the WASI
//! target. The install tree is the only artifact consumed downstream and is
//! cached under a key derived from everything that affects it, so a repeated
//! build with the same input is skipped entirely.
//!
//! `configure` runs out of tree in a fresh directory under `build/`, with
//! the install `DESTDIR` pointing at a cache staging directory. External step
//! failures are reported once, with exit status and output tail; nothing is
//! retried.

pub mod context;
pub mod flags;

pub use context::{BuildContext, CLANG_TARGET, TARGET_TRIPLE};

use crate::cache::{ArtifactCache, CacheKey};
use crate::error::{RbwasmError, RbwasmResult};
use crate::external::{ExternalStep, Invocation, StepOutput};
use crate::source::BuildSource;
use crate::workspace::{Scratch, Workspace};
use serde::Serialize;
use std::ffi::OsString;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Name of the runtime binary inside the install tree
pub const RUNTIME_BINARY: &str = "bin/ruby";

/// Everything that determines the install tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildInput {
    pub source: BuildSource,
    pub prefix: PathBuf,
    pub asyncify_stack_size: usize,
    pub extra_cc_args: Vec<String>,
    pub enabled_extensions: Vec<String>,
    /// Forwarded from the `TRANSIENT_HEAP_TOTAL_SIZE` environment variable
    pub transient_heap_total_size: Option<String>,
}

/// Installed runtime tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildOutput {
    /// Cache slot acting as `DESTDIR`
    pub install_dir: PathBuf,
    /// Guest install prefix
    pub prefix: PathBuf,
    /// Taken from the cache without building
    pub cached: bool,
}

impl BuildOutput {
    /// Host directory holding the installed prefix
    pub fn installed_root(&self) -> PathBuf {
        self.install_dir.join(relative_prefix(&self.prefix))
    }

    /// Relocatable runtime binary handed to the linker
    pub fn runtime_binary(&self) -> PathBuf {
        self.installed_root().join(RUNTIME_BINARY)
    }
}

fn relative_prefix(prefix: &Path) -> PathBuf {
    prefix
        .components()
        .filter(|c| matches!(c, Component::Normal(_)))
        .collect()
}

/// Drives configure and make install through an [`ExternalStep`]
pub struct CrossBuildDriver {
    cache: ArtifactCache,
    step: Arc<dyn ExternalStep>,
    jobs: usize,
}

impl CrossBuildDriver {
    pub fn new(cache: ArtifactCache, step: Arc<dyn ExternalStep>) -> Self {
        let jobs = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        Self { cache, step, jobs }
    }

    /// Override the number of parallel make jobs
    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs.max(1);
        self
    }

    /// Key of the install slot; local trees are keyed by absolute path
    pub fn install_key(input: &BuildInput) -> RbwasmResult<CacheKey> {
        let keyed = BuildInput {
            source: input.source.canonical(),
            ..input.clone()
        };
        CacheKey::install("ruby", &keyed)
    }

    /// Previously installed tree for this input, if any
    pub fn lookup(&self, input: &BuildInput) -> RbwasmResult<Option<BuildOutput>> {
        let key = Self::install_key(input)?;
        Ok(self.cache.lookup(&key)?.map(|install_dir| BuildOutput {
            install_dir,
            prefix: input.prefix.clone(),
            cached: true,
        }))
    }

    /// Build and install the runtime, or reuse the cached install tree
    pub async fn build(
        &self,
        ctx: &BuildContext,
        source_dir: &Path,
        input: &BuildInput,
    ) -> RbwasmResult<BuildOutput> {
        let key = Self::install_key(input)?;
        let workspace = self.cache.workspace().clone();
        let slot = key.slot_name();

        let ensured = self
            .cache
            .ensure(&key, |destdir| async move {
                info!("Building runtime from {}", input.source);
                let build_dir = BuildDir::create(&workspace, &slot)?;
                let result = self
                    .configure_and_install(ctx, source_dir, input, build_dir.path(), &destdir)
                    .await;
                build_dir.finish(result.is_ok());
                result
            })
            .await?;

        if ensured.cached {
            info!("Runtime build cache found, skipping build");
        }
        Ok(BuildOutput {
            install_dir: ensured.path,
            prefix: input.prefix.clone(),
            cached: ensured.cached,
        })
    }

    async fn configure_and_install(
        &self,
        ctx: &BuildContext,
        source_dir: &Path,
        input: &BuildInput,
        build_dir: &Path,
        destdir: &Path,
    ) -> RbwasmResult<()> {
        let configure = Invocation::new("./configure", source_dir.join("configure"))
            .args(flags::configure_args(ctx, input, destdir))
            .current_dir(build_dir);
        self.run_checked(&configure).await?;

        // clang runs wasm-opt on its output whenever it finds one, which
        // breaks relocatable objects. Shadow it for the duration of make.
        let shim = wasm_opt_shim(self.cache.workspace())?;
        let make = Invocation::new("make install", "make")
            .arg("install")
            .arg(format!("-j{}", self.jobs))
            .env("PATH", shim_path(shim.path())?)
            .current_dir(build_dir);
        self.run_checked(&make).await?;

        let binary = destdir.join(relative_prefix(&ctx.prefix)).join(RUNTIME_BINARY);
        if !binary.is_file() {
            return Err(RbwasmError::Build {
                step: "make install".to_string(),
                status: "exit status: 0".to_string(),
                output: format!("runtime binary was not installed at {}", binary.display()),
            });
        }
        Ok(())
    }

    async fn run_checked(&self, invocation: &Invocation) -> RbwasmResult<StepOutput> {
        let output = self.step.run(invocation).await?;
        if !output.is_success() {
            return Err(RbwasmError::build(&invocation.description, &output));
        }
        Ok(output)
    }
}

/// Out-of-tree build directory, kept after a failure for inspection
struct BuildDir {
    dir: tempfile::TempDir,
    keep: bool,
}

impl BuildDir {
    fn create(workspace: &Workspace, slot: &str) -> RbwasmResult<Self> {
        let dir = tempfile::Builder::new()
            .prefix(&format!("{}-", slot))
            .tempdir_in(workspace.build_dir())
            .map_err(|e| RbwasmError::io("creating build directory", e))?;
        debug!("Build directory: {}", dir.path().display());
        Ok(Self {
            dir,
            keep: workspace.save_temps(),
        })
    }

    fn path(&self) -> &Path {
        self.dir.path()
    }

    fn finish(self, succeeded: bool) {
        if succeeded && !self.keep {
            return;
        }
        let kept = self.dir.keep();
        if succeeded {
            debug!("Keeping build directory {}", kept.display());
        } else {
            warn!("Build failed, build directory kept at {}", kept.display());
        }
    }
}

/// Directory containing a `wasm-opt` that does nothing
fn wasm_opt_shim(workspace: &Workspace) -> RbwasmResult<Scratch> {
    let scratch = workspace.scratch("wasm-opt-shim-")?;
    let shim = scratch.write("wasm-opt", b"#!/bin/sh\nexit 0\n")?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&shim, std::fs::Permissions::from_mode(0o755))
            .map_err(|e| RbwasmError::io(format!("chmod {}", shim.display()), e))?;
    }
    Ok(scratch)
}

/// `PATH` with `dir` in front of the inherited entries
fn shim_path(dir: &Path) -> RbwasmResult<String> {
    let mut paths = vec![dir.to_path_buf()];
    if let Some(current) = std::env::var_os("PATH") {
        paths.extend(std::env::split_paths(&current));
    }
    let joined: OsString = std::env::join_paths(paths)
        .map_err(|e| RbwasmError::Internal(format!("joining PATH: {}", e)))?;
    Ok(joined.to_string_lossy().into_owned())
}
