//! Command-line interface

pub mod args;
pub mod commands;

pub use args::{Cli, Commands};

use crate::config::Config;
use std::path::PathBuf;

/// Workspace root: `--workspace`/`RBWASM_ROOT`, else the configured one
pub fn workspace_root(flag: Option<PathBuf>, config: &Config) -> PathBuf {
    flag.unwrap_or_else(|| config.workspace.root.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn workspace_flag_overrides_config() {
        let config = Config::default();
        assert_eq!(workspace_root(None, &config), PathBuf::from(".rbwasm"));
        assert_eq!(
            workspace_root(Some(PathBuf::from("/ws")), &config),
            PathBuf::from("/ws")
        );
    }
}
