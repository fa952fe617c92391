//! Child-process implementation of [`ExternalStep`]

use crate::error::{RbwasmError, RbwasmResult};
use crate::external::{ExternalStep, Invocation, StepOutput};
use async_trait::async_trait;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tracing::{debug, info};

/// Runs invocations as child processes, capturing stdout and stderr
#[derive(Debug, Clone, Default)]
pub struct ProcessStep {
    echo: bool,
}

impl ProcessStep {
    pub fn new() -> Self {
        Self { echo: false }
    }

    /// Echo every output line to stderr while capturing it
    pub fn with_echo(mut self, echo: bool) -> Self {
        self.echo = echo;
        self
    }
}

#[async_trait]
impl ExternalStep for ProcessStep {
    async fn run(&self, invocation: &Invocation) -> RbwasmResult<StepOutput> {
        match invocation.cwd {
            Some(ref cwd) => info!("Running {} in {}", invocation.description, cwd.display()),
            None => info!("Running {}", invocation.description),
        }
        debug!("Executing: {}", invocation);

        let mut cmd = Command::new(&invocation.program);
        cmd.args(&invocation.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        for (key, value) in &invocation.env {
            cmd.env(key, value);
        }
        if let Some(ref cwd) = invocation.cwd {
            cmd.current_dir(cwd);
        }

        let mut child = cmd
            .spawn()
            .map_err(|e| RbwasmError::spawn(invocation.program.display().to_string(), e))?;

        let echo = self.echo;
        let lines = stream_child_output(&mut child, &move |line: String| {
            if echo {
                eprintln!("{}", line);
            }
        })
        .await;

        let status = child
            .wait()
            .await
            .map_err(|e| RbwasmError::io(format!("waiting for {}", invocation.description), e))?;
        debug!("{} exited with {}", invocation.description, status);

        Ok(StepOutput {
            code: status.code(),
            lines,
        })
    }
}

/// Stream stdout+stderr from a child process, calling `on_output` for each line.
///
/// Returns all collected output lines for error reporting.
async fn stream_child_output(
    child: &mut tokio::process::Child,
    on_output: &(dyn Fn(String) + Send + Sync),
) -> Vec<String> {
    let mut all_output = Vec::new();
    let (Some(stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take()) else {
        return all_output;
    };

    let mut stderr_reader = PipeLines::new(stderr);
    let mut stdout_reader = PipeLines::new(stdout);

    while stderr_reader.is_open() || stdout_reader.is_open() {
        let line = tokio::select! {
            line = stderr_reader.next_line(), if stderr_reader.is_open() => line,
            line = stdout_reader.next_line(), if stdout_reader.is_open() => line,
        };
        if let Some(line) = line {
            on_output(line.clone());
            all_output.push(line);
        }
    }

    all_output
}

/// Line reader over one child pipe.
///
/// Lines are decoded lossily, so output in any encoding is captured. A read
/// error closes the pipe instead of leaving it undrained.
struct PipeLines<R> {
    reader: Option<BufReader<R>>,
    buf: Vec<u8>,
}

impl<R: AsyncRead + Unpin> PipeLines<R> {
    fn new(pipe: R) -> Self {
        Self {
            reader: Some(BufReader::new(pipe)),
            buf: Vec::new(),
        }
    }

    fn is_open(&self) -> bool {
        self.reader.is_some()
    }

    /// Next complete line, or `None` once the pipe is closed.
    ///
    /// Cancel safe: bytes read before cancellation stay in the buffer.
    async fn next_line(&mut self) -> Option<String> {
        let reader = self.reader.as_mut()?;
        match reader.read_until(b'\n', &mut self.buf).await {
            Ok(n) if n > 0 && self.buf.ends_with(b"\n") => Some(self.take_line()),
            Ok(_) => {
                self.reader = None;
                (!self.buf.is_empty()).then(|| self.take_line())
            }
            Err(e) => {
                debug!("Closing child output pipe after read error: {}", e);
                self.reader = None;
                (!self.buf.is_empty()).then(|| self.take_line())
            }
        }
    }

    fn take_line(&mut self) -> String {
        let mut end = self.buf.len();
        if self.buf[..end].ends_with(b"\n") {
            end -= 1;
        }
        if self.buf[..end].ends_with(b"\r") {
            end -= 1;
        }
        let line = String::from_utf8_lossy(&self.buf[..end]).into_owned();
        self.buf.clear();
        line
    }
}
