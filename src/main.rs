//! rbwasm - Ruby to WebAssembly module builder
//!
//! CLI entry point that dispatches to subcommands.

use clap::Parser;
use console::style;
use rbwasm::cli::{self, Cli, Commands};
use rbwasm::config::ConfigManager;
use rbwasm::error::RbwasmResult;
use std::process::ExitCode;
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// Set to stream external tool output and force debug logging
const DEBUG_ENV: &str = "RBWASM_DEBUG";

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            if let Some(hint) = e.hint() {
                eprintln!("{} {}", style("Hint:").yellow(), hint);
            }
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run() -> RbwasmResult<()> {
    let cli = Cli::parse();
    let debug_mode = std::env::var_os(DEBUG_ENV).is_some();

    // 0 = warn (progress only), 1 = info, 2+ = debug
    let filter = if debug_mode || cli.verbose >= 2 {
        EnvFilter::new("rbwasm=debug")
    } else if cli.verbose == 1 {
        EnvFilter::new("rbwasm=info")
    } else {
        EnvFilter::new("rbwasm=warn")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();

    let config_manager = match cli.config {
        Some(ref path) => ConfigManager::with_path(path.clone()),
        None => ConfigManager::new(),
    };
    let config = config_manager.load().await?;
    debug!("Loaded configuration from {}", config_manager.path().display());

    let workspace_root = cli::workspace_root(cli.workspace, &config);

    match cli.command {
        Commands::Build(args) => {
            rbwasm::ui::init_theme();
            cli::commands::build(args, &config, workspace_root, debug_mode).await
        }
        Commands::Cache(args) => cli::commands::cache(args, &workspace_root).await,
        Commands::Config(args) => cli::commands::config(args, &config_manager, &config).await,
    }
}
