//! CLI argument definitions using clap derive

use crate::source::BuildSource;
use crate::vfs::MountSpec;
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// rbwasm - Ruby to WebAssembly module builder
///
/// Cross-builds the Ruby runtime for WASI, embeds host directories as a
/// virtual filesystem, links and applies the asyncify transform.
#[derive(Parser, Debug)]
#[command(name = "rbwasm")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Configuration file path
    #[arg(short, long, global = true, env = "RBWASM_CONFIG")]
    pub config: Option<PathBuf>,

    /// Workspace root holding downloads, caches and build directories
    #[arg(long, global = true, env = "RBWASM_ROOT")]
    pub workspace: Option<PathBuf>,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Build a module
    Build(BuildArgs),

    /// Inspect the artifact cache
    Cache(CacheArgs),

    /// Show or initialize configuration
    Config(ConfigArgs),
}

/// Arguments for the build command
#[derive(Parser, Debug)]
pub struct BuildArgs {
    /// Output module path
    #[arg(short, long, default_value = "ruby.wasm")]
    pub output: PathBuf,

    /// Embed a host directory at a guest path (repeatable, later wins)
    #[arg(long = "mapdir", value_name = "HOST::GUEST")]
    pub mapdirs: Vec<MountSpec>,

    /// Stack size of the linked module in bytes
    #[arg(long)]
    pub stack_size: Option<usize>,

    /// Asyncify frame buffer size in bytes
    #[arg(long)]
    pub asyncify_stack_size: Option<usize>,

    /// Keep generated sources, objects and build directories
    #[arg(long)]
    pub save_temps: bool,

    /// Do not embed the runtime's own library files
    #[arg(long)]
    pub no_builtin_files: bool,

    /// Extensions to link statically (comma-separated)
    #[arg(long, value_delimiter = ',', value_name = "EXTS")]
    pub enabled_exts: Option<Vec<String>>,

    /// Preserve debug info through the transform
    #[arg(short = 'g')]
    pub debug_info: bool,

    /// Runtime source: github:OWNER/REPO@REF or path:DIR
    #[arg(long = "runtime-src", value_name = "SOURCE")]
    pub runtime_src: Option<BuildSource>,

    /// Pass an argument to the C compiler (repeatable)
    #[arg(long = "Xcc", value_name = "ARG", allow_hyphen_values = true)]
    pub xcc: Vec<String>,

    /// Pass an argument to the linker (repeatable)
    #[arg(long = "Xlinker", value_name = "ARG", allow_hyphen_values = true)]
    pub xlinker: Vec<String>,

    /// Arguments the module runs with by default
    #[arg(last = true, value_name = "PRESET_ARGS")]
    pub preset_args: Vec<String>,
}

/// Arguments for the config command
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    /// Subcommand for config
    #[command(subcommand)]
    pub action: Option<ConfigAction>,
}

/// Config subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Show configuration file path
    Path,

    /// Initialize default configuration
    Init {
        /// Overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },
}

/// Output format for list commands
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable table
    Table,
    /// JSON output
    Json,
    /// Simple text (one per line)
    Plain,
}

/// Arguments for the cache command
#[derive(Parser, Debug)]
pub struct CacheArgs {
    /// Subcommand for cache
    #[command(subcommand)]
    pub action: CacheAction,
}

/// Cache subcommands
#[derive(Subcommand, Debug)]
pub enum CacheAction {
    /// List cached toolchains, sources and runtime builds
    List {
        /// Output format
        #[arg(short, long, default_value = "table")]
        format: OutputFormat,
    },
}
