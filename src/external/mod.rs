//! External tool invocation
//!
//! Native build scripts, the linker and the binary rewriter are black boxes
//! to rbwasm. Each is driven through the [`ExternalStep`] capability: an
//! [`Invocation`] (program, arguments, environment, working directory) goes
//! in, exit status plus captured output comes out.
//!
//! - [`ProcessStep`]: runs the program as a child process
//! - Tests substitute recording fakes to observe what would be run

mod process;

pub use process::ProcessStep;

use crate::error::RbwasmResult;
use async_trait::async_trait;
use std::fmt;
use std::path::{Path, PathBuf};

/// Max number of output lines to include in stage error messages.
const ERROR_TAIL_LINES: usize = 50;

/// One external program execution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// Short human-readable name (e.g. "./configure")
    pub description: String,
    /// Program to execute
    pub program: PathBuf,
    /// Arguments, in order
    pub args: Vec<String>,
    /// Environment variables set on top of the inherited environment
    pub env: Vec<(String, String)>,
    /// Working directory, inherited when `None`
    pub cwd: Option<PathBuf>,
}

impl Invocation {
    pub fn new(description: impl Into<String>, program: impl Into<PathBuf>) -> Self {
        Self {
            description: description.into(),
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
            cwd: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Append a path argument
    pub fn path_arg(self, path: &Path) -> Self {
        self.arg(path.to_string_lossy())
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    /// Value of the argument following `flag`, e.g. the path after `-o`
    pub fn arg_after(&self, flag: &str) -> Option<&str> {
        self.args
            .iter()
            .position(|a| a == flag)
            .and_then(|i| self.args.get(i + 1))
            .map(String::as_str)
    }

    /// Value of a `--key=value` style argument
    pub fn arg_value(&self, prefix: &str) -> Option<&str> {
        self.args.iter().find_map(|a| a.strip_prefix(prefix))
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.display())?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// Exit status and captured output of an invocation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StepOutput {
    /// Exit code, `None` when terminated by a signal
    pub code: Option<i32>,
    /// Interleaved stdout and stderr lines
    pub lines: Vec<String>,
}

impl StepOutput {
    pub fn success() -> Self {
        Self {
            code: Some(0),
            lines: Vec::new(),
        }
    }

    pub fn failure(code: i32, lines: Vec<String>) -> Self {
        Self {
            code: Some(code),
            lines,
        }
    }

    pub fn is_success(&self) -> bool {
        self.code == Some(0)
    }

    /// Exit status formatted for diagnostics
    pub fn status(&self) -> String {
        match self.code {
            Some(code) => format!("exit status: {}", code),
            None => "terminated by signal".to_string(),
        }
    }

    /// Last `ERROR_TAIL_LINES` lines of output, for error messages
    pub fn tail(&self) -> String {
        let total = self.lines.len();
        let start = total.saturating_sub(ERROR_TAIL_LINES);
        self.lines[start..].join("\n")
    }
}

/// Capability to run an external program to completion
#[async_trait]
pub trait ExternalStep: Send + Sync {
    /// Run the invocation and wait for it to exit.
    ///
    /// Returns `Err` only when the program could not be started; a non-zero
    /// exit is reported through [`StepOutput`].
    async fn run(&self, invocation: &Invocation) -> RbwasmResult<StepOutput>;
}
