//! Cross-compilation context shared by the build and link stages

use crate::error::RbwasmResult;
use crate::toolchain::{library_name, Toolchain};
use std::path::PathBuf;

/// Target triple passed to `configure --host`
pub const TARGET_TRIPLE: &str = "wasm32-unknown-wasi";

/// Triple given to clang when compiling generated objects
pub const CLANG_TARGET: &str = "wasm32-wasi";

/// Everything the native build and the linker need to know about the
/// toolchain. Built once per run and never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildContext {
    pub target: String,
    pub sysroot: PathBuf,
    pub cc: PathBuf,
    pub ld: PathBuf,
    pub ar: PathBuf,
    pub ranlib: PathBuf,
    pub wasm_ld: PathBuf,
    pub wasm_opt: PathBuf,
    /// Runtime-support headers
    pub support_include_dir: PathBuf,
    /// Runtime-support static libraries directory
    pub support_lib_dir: PathBuf,
    /// Runtime-support static libraries, in link order
    pub support_libs: Vec<PathBuf>,
    /// Guest install prefix
    pub prefix: PathBuf,
}

impl BuildContext {
    pub fn new(toolchain: &Toolchain, prefix: impl Into<PathBuf>) -> RbwasmResult<Self> {
        Ok(Self {
            target: TARGET_TRIPLE.to_string(),
            sysroot: toolchain.sysroot(),
            cc: toolchain.clang(),
            ld: toolchain.clang(),
            ar: toolchain.ar(),
            ranlib: toolchain.ranlib(),
            wasm_ld: toolchain.wasm_ld(),
            wasm_opt: toolchain.wasm_opt.clone(),
            support_include_dir: toolchain.support_include_dir(),
            support_lib_dir: toolchain.support_lib_dir(),
            support_libs: toolchain.support_libraries()?,
            prefix: prefix.into(),
        })
    }

    /// `-l` names of the runtime-support libraries
    pub fn support_lib_names(&self) -> Vec<String> {
        self.support_libs
            .iter()
            .filter_map(|p| library_name(p))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use tempfile::TempDir;

    #[test]
    fn context_from_toolchain() {
        let temp = TempDir::new().unwrap();
        let support = temp.path().join("support");
        std::fs::create_dir_all(support.join("lib")).unwrap();
        std::fs::write(support.join("lib/librb_wasm_support.a"), b"").unwrap();
        std::fs::write(support.join("lib/README"), b"").unwrap();
        let toolchain = Toolchain {
            wasi_sdk: PathBuf::from("/sdk"),
            wasm_opt: PathBuf::from("/binaryen/bin/wasm-opt"),
            runtime_support: support.clone(),
        };

        let ctx = BuildContext::new(&toolchain, "/embd-root/ruby").unwrap();

        assert_eq!(ctx.target, "wasm32-unknown-wasi");
        assert_eq!(ctx.sysroot, Path::new("/sdk/share/wasi-sysroot"));
        assert_eq!(ctx.cc, Path::new("/sdk/bin/clang"));
        assert_eq!(ctx.ld, ctx.cc);
        assert_eq!(ctx.wasm_ld, Path::new("/sdk/bin/wasm-ld"));
        assert_eq!(ctx.support_libs, vec![support.join("lib/librb_wasm_support.a")]);
        assert_eq!(ctx.support_lib_names(), vec!["rb_wasm_support".to_string()]);
    }
}
