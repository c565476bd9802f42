// Executor
// Runs external commands (docker, compose) on behalf of the orchestration components

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use thiserror::Error;
use tokio::process::Command;
use tokio::sync::watch;
use tracing::debug;

/// Receiving side of a cancellation signal. `true` means cancelled.
pub type CancelSignal = watch::Receiver<bool>;

/// Sending side of a cancellation signal
pub type CancelHandle = watch::Sender<bool>;

/// Create a new cancellation channel, initially not cancelled
pub fn cancel_channel() -> (CancelHandle, CancelSignal) {
    watch::channel(false)
}

/// A signal that never fires. Used for cleanup that must run even after cancellation.
pub fn never_cancelled() -> CancelSignal {
    let (_handle, signal) = cancel_channel();
    signal
}

/// Resolve once the signal reports cancellation.
///
/// If every sender has been dropped without cancelling, this never resolves.
pub async fn cancelled(signal: &mut CancelSignal) {
    loop {
        if *signal.borrow_and_update() {
            return;
        }
        if signal.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// Errors raised before an external command produced an exit status
#[derive(Debug, Error)]
pub enum ExecError {
    #[error("Program not found on PATH: {0}")]
    ProgramNotFound(String),

    #[error("Failed to spawn '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },

    #[error("'{0}' was cancelled")]
    Cancelled(String),
}

impl ExecError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ExecError::Cancelled(_))
    }
}

/// How the child's stdout/stderr are handled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Collect output into the returned `ExecOutput`
    Capture,
    /// Stream output straight to the operator's terminal
    Inherit,
}

/// A single external command to run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    pub working_dir: Option<PathBuf>,
    pub output: OutputMode,
}

impl Invocation {
    /// Create an invocation of `program` with captured output
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            working_dir: None,
            output: OutputMode::Capture,
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

    pub fn current_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.working_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    /// Stream output to the terminal instead of capturing it
    pub fn inherit_output(mut self) -> Self {
        self.output = OutputMode::Inherit;
        self
    }

    /// The command line as an operator would type it
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.command_line())
    }
}

/// Result of a command that ran to completion
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecOutput {
    /// Exit code (None if terminated by a signal)
    pub exit_code: Option<i32>,
    /// Standard output (empty in `Inherit` mode)
    pub stdout: String,
    /// Standard error (empty in `Inherit` mode)
    pub stderr: String,
}

impl ExecOutput {
    /// A successful, silent result
    pub fn ok() -> Self {
        Self {
            exit_code: Some(0),
            ..Default::default()
        }
    }

    /// A result with the given exit code and stderr text
    pub fn failed(exit_code: i32, stderr: impl Into<String>) -> Self {
        Self {
            exit_code: Some(exit_code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    pub fn with_stdout(mut self, stdout: impl Into<String>) -> Self {
        self.stdout = stdout.into();
        self
    }

    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// Stdout followed by stderr
    pub fn combined(&self) -> String {
        match (self.stdout.is_empty(), self.stderr.is_empty()) {
            (_, true) => self.stdout.clone(),
            (true, false) => self.stderr.clone(),
            (false, false) => format!("{}\n{}", self.stdout.trim_end(), self.stderr),
        }
    }

    /// Human readable exit status, e.g. "exit status 2"
    pub fn status_label(&self) -> String {
        match self.exit_code {
            Some(code) => format!("exit status {}", code),
            None => "terminated by signal".to_string(),
        }
    }
}

/// Runs external commands.
///
/// Every orchestration component receives its executor through its
/// constructor so tests can substitute a fake.
#[async_trait::async_trait]
pub trait Executor: Send + Sync {
    /// Run the invocation to completion, or until `cancel` fires
    async fn run(
        &self,
        invocation: &Invocation,
        cancel: &CancelSignal,
    ) -> Result<ExecOutput, ExecError>;
}

/// Executor backed by real child processes
#[derive(Debug, Clone, Default)]
pub struct ProcessExecutor;

impl ProcessExecutor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait::async_trait]
impl Executor for ProcessExecutor {
    async fn run(
        &self,
        invocation: &Invocation,
        cancel: &CancelSignal,
    ) -> Result<ExecOutput, ExecError> {
        let command_line = invocation.command_line();

        if *cancel.borrow() {
            return Err(ExecError::Cancelled(command_line));
        }

        let program = which::which(&invocation.program)
            .map_err(|_| ExecError::ProgramNotFound(invocation.program.clone()))?;

        debug!(command = %command_line, "running external command");

        let mut cmd = Command::new(program);
        cmd.args(&invocation.args);
        if let Some(dir) = &invocation.working_dir {
            cmd.current_dir(dir);
        }
        cmd.stdin(Stdio::null());
        match invocation.output {
            OutputMode::Capture => {
                cmd.stdout(Stdio::piped());
                cmd.stderr(Stdio::piped());
            }
            OutputMode::Inherit => {
                cmd.stdout(Stdio::inherit());
                cmd.stderr(Stdio::inherit());
            }
        }
        // Dropping the wait future on cancellation must take the child down with it
        cmd.kill_on_drop(true);

        let child = cmd.spawn().map_err(|source| ExecError::Spawn {
            command: command_line.clone(),
            source,
        })?;

        let mut cancel = cancel.clone();
        tokio::select! {
            output = child.wait_with_output() => {
                let output = output.map_err(|source| ExecError::Spawn {
                    command: command_line.clone(),
                    source,
                })?;
                debug!(command = %command_line, code = ?output.status.code(), "external command finished");
                Ok(ExecOutput {
                    exit_code: output.status.code(),
                    stdout: String::from_utf8_lossy(&output.stdout).to_string(),
                    stderr: String::from_utf8_lossy(&output.stderr).to_string(),
                })
            }
            _ = cancelled(&mut cancel) => {
                debug!(command = %command_line, "external command cancelled");
                Err(ExecError::Cancelled(command_line))
            }
        }
    }
}
