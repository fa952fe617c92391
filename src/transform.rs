//! Asyncify transform
//!
//! `wasm-opt --asyncify` rewrites the linked module so that calls which would
//! block become explicit suspend/resume points a single-threaded host can
//! drive. The rewriter writes to a temporary file next to the output, which
//! is renamed into place only on success: a failed run leaves no output.

use crate::error::{RbwasmError, RbwasmResult};
use crate::external::{ExternalStep, Invocation};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Runs the binary rewriter through an [`ExternalStep`]
pub struct AsyncTransformDriver {
    wasm_opt: PathBuf,
    step: Arc<dyn ExternalStep>,
    debug_info: bool,
}

impl AsyncTransformDriver {
    pub fn new(wasm_opt: impl Into<PathBuf>, step: Arc<dyn ExternalStep>) -> Self {
        Self {
            wasm_opt: wasm_opt.into(),
            step,
            debug_info: false,
        }
    }

    /// Preserve debug info (`-g`)
    pub fn with_debug_info(mut self, debug_info: bool) -> Self {
        self.debug_info = debug_info;
        self
    }

    pub fn invocation(&self, input: &Path, output: &Path) -> Invocation {
        let mut inv = Invocation::new("wasm-opt --asyncify", &self.wasm_opt)
            .path_arg(input)
            .arg("--asyncify")
            .arg("-O");
        if self.debug_info {
            inv = inv.arg("-g");
        }
        inv.arg("--pass-arg=asyncify-ignore-imports")
            .arg("-o")
            .path_arg(output)
    }

    /// Transform `input` into `output`
    pub async fn transform(&self, input: &Path, output: &Path) -> RbwasmResult<()> {
        info!("Applying asyncify transform");
        let tmp = temporary_output(output);
        let invocation = self.invocation(input, &tmp);

        let result = match self.step.run(&invocation).await {
            Ok(result) => result,
            Err(e) => {
                let _ = std::fs::remove_file(&tmp);
                return Err(e);
            }
        };
        if !result.is_success() {
            let _ = std::fs::remove_file(&tmp);
            return Err(RbwasmError::transform(&invocation.description, &result));
        }
        if !tmp.is_file() {
            return Err(RbwasmError::Transform {
                step: invocation.description,
                status: result.status(),
                output: format!("rewriter produced no output at {}", tmp.display()),
            });
        }

        std::fs::rename(&tmp, output).map_err(|e| {
            let _ = std::fs::remove_file(&tmp);
            RbwasmError::io(
                format!("moving {} to {}", tmp.display(), output.display()),
                e,
            )
        })?;
        debug!("Wrote {}", output.display());
        Ok(())
    }
}

/// `out.wasm` -> `out.wasm.tmp`, in the same directory
fn temporary_output(output: &Path) -> PathBuf {
    let mut name = output.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    output.with_file_name(name)
}
