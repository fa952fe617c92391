//! Configuration schema for rbwasm
//!
//! Configuration is stored at `~/.config/rbwasm/config.toml`

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Workspace (cache and scratch) settings
    pub workspace: WorkspaceConfig,

    /// Toolchain download settings
    pub toolchain: ToolchainConfig,

    /// Runtime cross-build defaults
    pub build: BuildConfig,

    /// Embedded filesystem settings
    pub vfs: VfsConfig,
}

/// Workspace settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkspaceConfig {
    /// Root directory holding downloads, build trees and cached installs
    pub root: PathBuf,

    /// Keep generated sources and objects after the run
    pub save_temps: bool,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from(".rbwasm"),
            save_temps: false,
        }
    }
}

/// A downloadable, versioned toolchain component
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentConfig {
    /// Component name, used as the cache slot prefix
    pub name: String,

    /// Version string, part of the cache key
    pub version: String,

    /// Release tarball (`.tar.gz`) URL
    pub url: String,

    /// Expected SHA-256 of the tarball (hex); unchecked when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
}

#[cfg(target_os = "macos")]
const WASI_SDK_URL: &str =
    "https://github.com/WebAssembly/wasi-sdk/releases/download/wasi-sdk-14/wasi-sdk-14.0-macos.tar.gz";
#[cfg(not(target_os = "macos"))]
const WASI_SDK_URL: &str =
    "https://github.com/WebAssembly/wasi-sdk/releases/download/wasi-sdk-14/wasi-sdk-14.0-linux.tar.gz";

#[cfg(target_os = "macos")]
const BINARYEN_URL: &str = "https://github.com/WebAssembly/binaryen/releases/download/version_105/binaryen-version_105-x86_64-macos.tar.gz";
#[cfg(not(target_os = "macos"))]
const BINARYEN_URL: &str = "https://github.com/WebAssembly/binaryen/releases/download/version_105/binaryen-version_105-x86_64-linux.tar.gz";

const RUNTIME_SUPPORT_URL: &str = "https://github.com/kateinoigakukun/rb-wasm-support/releases/download/0.4.0/rb-wasm-support-wasm32-unknown-wasi.tar.gz";

/// Toolchain configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolchainConfig {
    /// WASI cross-compilation SDK (clang, wasm-ld, sysroot)
    pub wasi_sdk: ComponentConfig,

    /// Binary rewriting toolkit providing `wasm-opt`
    pub binaryen: ComponentConfig,

    /// Runtime-support library linked into the module
    pub runtime_support: ComponentConfig,

    /// Use this `wasm-opt` instead of the provisioned one
    pub wasm_opt: Option<PathBuf>,
}

impl Default for ToolchainConfig {
    fn default() -> Self {
        Self {
            wasi_sdk: ComponentConfig {
                name: "wasi-sdk".to_string(),
                version: "14.0".to_string(),
                url: WASI_SDK_URL.to_string(),
                sha256: None,
            },
            binaryen: ComponentConfig {
                name: "binaryen".to_string(),
                version: "105".to_string(),
                url: BINARYEN_URL.to_string(),
                sha256: None,
            },
            runtime_support: ComponentConfig {
                name: "rb-wasm-support".to_string(),
                version: "0.4.0".to_string(),
                url: RUNTIME_SUPPORT_URL.to_string(),
                sha256: None,
            },
            wasm_opt: None,
        }
    }
}

/// Extensions statically linked into the runtime unless overridden
pub const DEFAULT_ENABLED_EXTENSIONS: [&str; 29] = [
    "bigdecimal",
    "cgi/escape",
    "continuation",
    "coverage",
    "date",
    "dbm",
    "digest/bubblebabble",
    "digest",
    "digest/md5",
    "digest/rmd160",
    "digest/sha1",
    "digest/sha2",
    "etc",
    "fcntl",
    "fiber",
    "gdbm",
    "json",
    "json/generator",
    "json/parser",
    "nkf",
    "objspace",
    "pathname",
    "psych",
    "racc/cparse",
    "rbconfig/sizeof",
    "ripper",
    "stringio",
    "strscan",
    "monitor",
];

/// Cross-build defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    /// Runtime source (`github:OWNER/REPO@REF` or `path:DIR`)
    pub runtime_source: String,

    /// Install prefix the runtime is configured with
    pub install_prefix: PathBuf,

    /// Linear memory stack size passed to the linker
    pub stack_size: usize,

    /// Frame buffer size reserved for suspend/resume unwinding
    pub asyncify_stack_size: usize,

    /// Extensions statically linked into the runtime
    pub enabled_extensions: Vec<String>,

    /// Extra compiler arguments appended to CFLAGS
    pub extra_cc_args: Vec<String>,

    /// Extra linker arguments appended to the final link
    pub extra_linker_args: Vec<String>,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            runtime_source: "github:kateinoigakukun/ruby@v3_0_2_wasm-alpha1".to_string(),
            install_prefix: PathBuf::from("/embd-root/ruby"),
            stack_size: 16 * 1024 * 1024,
            asyncify_stack_size: 6144,
            enabled_extensions: DEFAULT_ENABLED_EXTENSIONS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            extra_cc_args: vec![],
            extra_linker_args: vec![],
        }
    }
}

/// Embedded filesystem settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VfsConfig {
    /// Embed the runtime's own installed library tree
    pub builtin_files: bool,

    /// Guest directory the runtime's installed files are mounted at
    pub guest_runtime_root: PathBuf,

    /// Host paths (regex) of the install tree that are never embedded
    pub builtin_excludes: Vec<String>,
}

impl Default for VfsConfig {
    fn default() -> Self {
        Self {
            builtin_files: true,
            guest_runtime_root: PathBuf::from("/ruby"),
            builtin_excludes: vec![
                r".*/cache/.*\.gem$".to_string(),
                r".*/libruby-static\.a$".to_string(),
                r".*/bin/ruby$".to_string(),
            ],
        }
    }
}
