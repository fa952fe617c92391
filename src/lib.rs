//! rbwasm - Ruby to WebAssembly module builder
//!
//! Provisions a WASI toolchain, cross-builds the Ruby runtime, packs host
//! directories into an embedded filesystem image, links everything into one
//! module and applies the asyncify transform.

pub mod build;
pub mod cache;
pub mod cli;
pub mod config;
pub mod error;
pub mod external;
pub mod link;
pub mod pipeline;
pub mod source;
pub mod toolchain;
pub mod transform;
pub mod ui;
pub mod vfs;
pub mod workspace;

pub use error::{RbwasmError, RbwasmResult};
