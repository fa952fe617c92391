//! Generated objects linked next to the runtime

use crate::vfs::embed::c_string_literal;
use std::fmt::Write;

/// Program name placed in `argv[0]` of the preset arguments
pub const PRESET_PROGRAM_NAME: &str = "ruby.wasm";

/// A C translation unit compiled into one object for the final link
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedSource {
    /// File stem, used for `<name>.c` / `<name>.o`
    pub name: String,
    pub source: String,
}

impl GeneratedSource {
    pub fn new(name: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source: source.into(),
        }
    }

    pub fn c_file_name(&self) -> String {
        format!("{}.c", self.name)
    }

    pub fn object_file_name(&self) -> String {
        format!("{}.o", self.name)
    }
}

/// WASI imports the preset-args object defines in place of the host's
pub const ARGS_OVERRIDES: [&str; 2] = [
    "__imported_wasi_snapshot_preview1_args_sizes_get",
    "__imported_wasi_snapshot_preview1_args_get",
];

/// Definitions of [`ARGS_OVERRIDES`] over `rbwasm_preset_argv`
const ARGS_FUNCTIONS: &str = r#"int32_t __imported_wasi_snapshot_preview1_args_sizes_get(int32_t argc_ptr, int32_t argv_buf_size_ptr) {
  uint32_t buf_size = 0;
  for (int i = 0; i < RBWASM_PRESET_ARGC; i++) {
    buf_size += strlen(rbwasm_preset_argv[i]) + 1;
  }
  *(uint32_t *)(intptr_t)argc_ptr = RBWASM_PRESET_ARGC;
  *(uint32_t *)(intptr_t)argv_buf_size_ptr = buf_size;
  return 0;
}

int32_t __imported_wasi_snapshot_preview1_args_get(int32_t argv_ptr, int32_t argv_buf_ptr) {
  char **argv = (char **)(intptr_t)argv_ptr;
  char *buf = (char *)(intptr_t)argv_buf_ptr;
  for (int i = 0; i < RBWASM_PRESET_ARGC; i++) {
    size_t len = strlen(rbwasm_preset_argv[i]) + 1;
    memcpy(buf, rbwasm_preset_argv[i], len);
    argv[i] = buf;
    buf += len;
  }
  return 0;
}
"#;

/// C source that makes the module run with `args` by default.
///
/// wasi-libc reaches the host's `args_sizes_get`/`args_get` through
/// undefined `__imported_wasi_snapshot_preview1_*` functions. Defining them
/// here resolves those references inside the module, so the host's argv is
/// never asked for and `argv` is `ruby.wasm` followed by `args`.
pub fn preset_args_c_source(args: &[String]) -> String {
    let mut src = String::from("/* Generated by rbwasm. Do not edit. */\n");
    src.push_str("#include <stddef.h>\n#include <stdint.h>\n#include <string.h>\n\n");

    src.push_str("static const char *const rbwasm_preset_argv[] = {\n");
    let _ = writeln!(src, "  {},", c_string_literal(PRESET_PROGRAM_NAME));
    for arg in args {
        let _ = writeln!(src, "  {},", c_string_literal(arg));
    }
    src.push_str("};\n");
    let _ = writeln!(src, "#define RBWASM_PRESET_ARGC {}\n", args.len() + 1);

    src.push_str(ARGS_FUNCTIONS);
    src
}
