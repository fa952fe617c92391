//! UI module for user-facing progress
//!
//! Uses `cliclack` and `indicatif` in an interactive terminal, with
//! automatic fallback to plain lines in CI or when output is piped.
//! Diagnostics go through `tracing`; this module only reports progress.

mod context;
mod output;
mod progress;
mod theme;

pub use context::UiContext;
pub use output::{intro, outro_error, outro_success, step_ok_detail, step_warn_hint};
pub use progress::StageProgress;
pub use theme::{init_theme, RbwasmTheme};
