//! Embedding an image into the module as a linked data section
//!
//! The image is read at runtime by the filesystem layer of the
//! runtime-support library (`librb_wasm_support.a`). That layer defines
//! wasi-libc's `__imported_wasi_snapshot_preview1_*` file functions and
//! references [`IMAGE_SYMBOL`] and [`IMAGE_LEN_SYMBOL`]. The linker places
//! the image object before the support libraries so those references
//! resolve to it.

use std::fmt::Write;

/// Section the image bytes are placed in
pub const IMAGE_SECTION: &str = ".rbwasm_vfs";
/// Symbol of the image byte array
pub const IMAGE_SYMBOL: &str = "rbwasm_vfs_image";
/// Symbol holding the image length
pub const IMAGE_LEN_SYMBOL: &str = "rbwasm_vfs_image_len";

const BYTES_PER_LINE: usize = 16;

/// C translation unit defining the image as a byte array
pub fn image_c_source(image: &[u8]) -> String {
    let mut src = String::with_capacity(image.len() * 6 + 512);
    src.push_str("/* Generated by rbwasm. Do not edit. */\n");
    src.push_str("#include <stddef.h>\n\n");
    let _ = writeln!(
        src,
        "__attribute__((section(\"{}\"), aligned(8), used))",
        IMAGE_SECTION
    );
    // Zero-length arrays are not valid C.
    let len = image.len().max(1);
    let _ = writeln!(src, "const unsigned char {}[{}] = {{", IMAGE_SYMBOL, len);
    if image.is_empty() {
        src.push_str("  0x00,\n");
    }
    for chunk in image.chunks(BYTES_PER_LINE) {
        src.push_str(" ");
        for byte in chunk {
            let _ = write!(src, " 0x{:02x},", byte);
        }
        src.push('\n');
    }
    src.push_str("};\n\n");
    src.push_str("__attribute__((used))\n");
    let _ = writeln!(src, "const size_t {} = {};", IMAGE_LEN_SYMBOL, image.len());
    src
}

/// Quote a string as a C string literal, escaping non-printable bytes
pub fn c_string_literal(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for byte in s.bytes() {
        match byte {
            b'"' => out.push_str("\\\""),
            b'\\' => out.push_str("\\\\"),
            b'?' => out.push_str("\\?"),
            0x20..=0x7e => out.push(byte as char),
            _ => {
                let _ = write!(out, "\\{:03o}", byte);
            }
        }
    }
    out.push('"');
    out
}
