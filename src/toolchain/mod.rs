//! Toolchain provisioning
//!
//! Three components are needed to produce a module:
//!
//! - the WASI SDK (clang, wasm-ld, llvm-ar and the sysroot)
//! - binaryen, for `wasm-opt`
//! - the runtime-support library linked into every module
//!
//! Each is a versioned release tarball installed into its own toolchain
//! cache slot. Components are provisioned concurrently; an already installed
//! slot costs no network access.

pub mod archive;
pub mod fetch;

pub use fetch::{install_archive, ArchiveRequest, Fetcher, HttpFetcher};

use crate::cache::{ArtifactCache, CacheKey, Ensured};
use crate::config::{ComponentConfig, ToolchainConfig};
use crate::error::{RbwasmError, RbwasmResult};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Local paths of a provisioned toolchain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toolchain {
    /// WASI SDK root
    pub wasi_sdk: PathBuf,
    /// `wasm-opt` binary
    pub wasm_opt: PathBuf,
    /// Runtime-support library root (`include/`, `lib/`)
    pub runtime_support: PathBuf,
}

impl Toolchain {
    pub fn clang(&self) -> PathBuf {
        self.wasi_sdk.join("bin/clang")
    }

    pub fn wasm_ld(&self) -> PathBuf {
        self.wasi_sdk.join("bin/wasm-ld")
    }

    pub fn ar(&self) -> PathBuf {
        self.wasi_sdk.join("bin/llvm-ar")
    }

    pub fn ranlib(&self) -> PathBuf {
        self.wasi_sdk.join("bin/llvm-ranlib")
    }

    pub fn sysroot(&self) -> PathBuf {
        self.wasi_sdk.join("share/wasi-sysroot")
    }

    pub fn support_include_dir(&self) -> PathBuf {
        self.runtime_support.join("include")
    }

    pub fn support_lib_dir(&self) -> PathBuf {
        self.runtime_support.join("lib")
    }

    /// Static libraries shipped by the runtime-support package, sorted by name
    pub fn support_libraries(&self) -> RbwasmResult<Vec<PathBuf>> {
        let dir = self.support_lib_dir();
        if !dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut libs = Vec::new();
        let read = std::fs::read_dir(&dir)
            .map_err(|e| RbwasmError::io(format!("reading {}", dir.display()), e))?;
        for entry in read {
            let path = entry
                .map_err(|e| RbwasmError::io(format!("reading {}", dir.display()), e))?
                .path();
            if path.is_file() && path.extension().is_some_and(|ext| ext == "a") {
                libs.push(path);
            }
        }
        libs.sort();
        Ok(libs)
    }
}

/// `libfoo.a` -> `foo`, for `-l` flags
pub fn library_name(path: &Path) -> Option<String> {
    let stem = path.file_stem()?.to_str()?;
    Some(stem.strip_prefix("lib").unwrap_or(stem).to_string())
}

/// Outcome of [`ToolchainProvisioner::provision`]
#[derive(Debug, Clone)]
pub struct Provisioned {
    pub toolchain: Toolchain,
    /// Every component was already installed
    pub cached: bool,
}

/// Installs toolchain components into the artifact cache on demand
pub struct ToolchainProvisioner {
    cache: ArtifactCache,
    fetcher: Arc<dyn Fetcher>,
    config: ToolchainConfig,
}

impl ToolchainProvisioner {
    pub fn new(cache: ArtifactCache, fetcher: Arc<dyn Fetcher>, config: ToolchainConfig) -> Self {
        Self {
            cache,
            fetcher,
            config,
        }
    }

    /// Ensure every component is installed and return their paths
    pub async fn provision(&self) -> RbwasmResult<Provisioned> {
        info!("Provisioning toolchain");

        let (wasi_sdk, support, wasm_opt) = tokio::try_join!(
            self.ensure_component(&self.config.wasi_sdk),
            self.ensure_component(&self.config.runtime_support),
            self.ensure_wasm_opt(),
        )?;

        let cached = wasi_sdk.cached && support.cached && wasm_opt.1;
        let toolchain = Toolchain {
            wasi_sdk: wasi_sdk.path,
            wasm_opt: wasm_opt.0,
            runtime_support: support.path,
        };
        debug!("Toolchain: {:?}", toolchain);

        Ok(Provisioned { toolchain, cached })
    }

    /// Ensure one component's cache slot
    pub async fn ensure_component(&self, component: &ComponentConfig) -> RbwasmResult<Ensured> {
        let key = CacheKey::toolchain(&component.name, &component.version);
        let request = ArchiveRequest {
            url: component.url.clone(),
            sha256: component.sha256.clone(),
            strip_components: 1,
        };
        let fetcher = Arc::clone(&self.fetcher);

        self.cache
            .ensure(&key, move |staging| install_archive(fetcher, request, staging))
            .await
    }

    /// Path of `wasm-opt` and whether no work was needed to get it
    async fn ensure_wasm_opt(&self) -> RbwasmResult<(PathBuf, bool)> {
        if let Some(ref path) = self.config.wasm_opt {
            debug!("Using configured wasm-opt at {}", path.display());
            return Ok((path.clone(), true));
        }
        let binaryen = self.ensure_component(&self.config.binaryen).await?;
        Ok((binaryen.path.join("bin/wasm-opt"), binaryen.cached))
    }
}
