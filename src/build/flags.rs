//! Cross-compilation flags for the runtime's `configure`

use crate::build::{BuildContext, BuildInput};
use std::path::Path;

/// WASI libc emulation layers the runtime depends on
const WASI_EMULATIONS: [&str; 4] = ["signal", "mman", "getpid", "process-clocks"];

/// Compiler flags: sysroot, emulation defines, unwinding frame buffer size
pub fn cflags(ctx: &BuildContext, input: &BuildInput) -> Vec<String> {
    let mut flags = vec![format!("--sysroot={}", ctx.sysroot.display())];
    flags.extend(WASI_EMULATIONS.iter().map(|e| {
        format!("-D_WASI_EMULATED_{}", e.replace('-', "_").to_uppercase())
    }));
    flags.push("-DRB_WASM_SUPPORT_EMULATE_SETJMP".to_string());
    flags.push(format!(
        "-DRB_WASM_SUPPORT_FRAME_BUFFER_SIZE={}",
        input.asyncify_stack_size
    ));
    if ctx.support_include_dir.is_dir() {
        flags.push(format!("-I{}", ctx.support_include_dir.display()));
    }
    flags.extend(input.extra_cc_args.iter().cloned());
    if let Some(ref size) = input.transient_heap_total_size {
        flags.push(format!("-DTRANSIENT_HEAP_TOTAL_SIZE={}", size));
    }
    flags
}

/// Linker flags: sysroot, emulation libraries, runtime-support libraries
pub fn ldflags(ctx: &BuildContext) -> Vec<String> {
    let mut flags = vec![
        format!("--sysroot={}", ctx.sysroot.display()),
        format!("-L{}", ctx.sysroot.join("lib/wasm32-wasi").display()),
    ];
    flags.extend(WASI_EMULATIONS.iter().map(|e| format!("-lwasi-emulated-{}", e)));
    if !ctx.support_libs.is_empty() {
        flags.push(format!("-L{}", ctx.support_lib_dir.display()));
        flags.extend(ctx.support_lib_names().iter().map(|l| format!("-l{}", l)));
    }
    flags.push("-Xlinker".to_string());
    flags.push("--features=mutable-globals".to_string());
    flags
}

/// Full `configure` argument list
///
/// The runtime is linked `--relocatable` so the final link can add the
/// filesystem image and preset arguments afterwards.
pub fn configure_args(ctx: &BuildContext, input: &BuildInput, destdir: &Path) -> Vec<String> {
    let mut args: Vec<String> = [
        format!("--host={}", ctx.target),
        "--disable-install-doc".to_string(),
        "--disable-jit-support".to_string(),
        "--with-coroutine=asyncify".to_string(),
        "--with-static-linked-ext".to_string(),
    ]
    .into();
    args.push(format!("--prefix={}", ctx.prefix.display()));
    args.push(format!("--with-destdir={}", destdir.display()));
    args.push(format!("--with-ext={}", input.enabled_extensions.join(",")));
    args.push("XLDFLAGS=-Xlinker --relocatable".to_string());
    args.push(format!("LDFLAGS={}", ldflags(ctx).join(" ")));
    args.push(format!("CFLAGS={}", cflags(ctx, input).join(" ")));
    args.push(format!("CC={}", ctx.cc.display()));
    args.push(format!("LD={}", ctx.ld.display()));
    args.push(format!("AR={}", ctx.ar.display()));
    args.push(format!("RANLIB={}", ctx.ranlib.display()));
    args
}
