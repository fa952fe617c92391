//! Build command - produce a module

use crate::cli::args::BuildArgs;
use crate::config::Config;
use crate::error::RbwasmResult;
use crate::external::ProcessStep;
use crate::pipeline::{Pipeline, PipelineOptions};
use crate::toolchain::HttpFetcher;
use crate::ui::{self, StageProgress, UiContext};
use crate::workspace::Workspace;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

/// Forwarded to the runtime build as a define
const TRANSIENT_HEAP_ENV: &str = "TRANSIENT_HEAP_TOTAL_SIZE";

/// Execute the build command
pub async fn execute(
    args: BuildArgs,
    config: &Config,
    workspace_root: PathBuf,
    debug_mode: bool,
) -> RbwasmResult<()> {
    let save_temps = args.save_temps || config.workspace.save_temps;
    let mut options = pipeline_options(args, config)?;
    options.transient_heap_total_size = std::env::var(TRANSIENT_HEAP_ENV).ok();
    options.export_sources |= debug_mode;
    debug!("Pipeline options: {:?}", options);

    let workspace = Workspace::create(workspace_root, save_temps)?;
    let pipeline = Pipeline::new(
        workspace,
        config.toolchain.clone(),
        Arc::new(HttpFetcher),
        Arc::new(ProcessStep::new().with_echo(debug_mode)),
    );

    let ctx = UiContext::detect().plain_if(debug_mode);
    ui::intro(&ctx, &format!("rbwasm build {}", options.output.display()));
    let progress = StageProgress::new(&ctx);

    let result = pipeline.run(&options, &progress).await;
    if let Some(stage) = result.failed_stage() {
        ui::outro_error(&ctx, &format!("Stage {} failed", stage));
    }
    let output = result.into_outcome()?;
    ui::outro_success(&ctx, &format!("Wrote {}", output.display()));
    Ok(())
}

/// Configuration defaults overridden by command-line flags
fn pipeline_options(args: BuildArgs, config: &Config) -> RbwasmResult<PipelineOptions> {
    let mut options = PipelineOptions::from_config(config, args.output)?;

    if let Some(source) = args.runtime_src {
        options.source = source;
    }
    options.mounts = args.mapdirs;
    options.builtin_files &= !args.no_builtin_files;
    if let Some(size) = args.stack_size {
        options.stack_size = size;
    }
    if let Some(size) = args.asyncify_stack_size {
        options.asyncify_stack_size = size;
    }
    if let Some(exts) = args.enabled_exts {
        options.enabled_extensions = exts;
    }
    options.extra_cc_args.extend(args.xcc);
    options.extra_linker_args.extend(args.xlinker);
    options.preset_args = args.preset_args;
    options.debug_info = args.debug_info;
    options.export_sources |= args.save_temps;

    Ok(options)
}
