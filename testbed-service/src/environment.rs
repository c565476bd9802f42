// Environment Controller
// Lifecycle of the deployed multi-container environment (up/down/logs/status)

use std::fmt;
use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use crate::compose::ComposeCommand;
use crate::executor::{CancelSignal, ExecError, Executor};

/// A lifecycle operation against the compose runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvironmentOp {
    Up,
    Down,
    Logs,
    Status,
}

impl EnvironmentOp {
    /// Prefix of the error returned when the operation fails
    pub fn failure_context(&self) -> &'static str {
        match self {
            EnvironmentOp::Up => "failed to start environment",
            EnvironmentOp::Down => "failed to stop environment",
            EnvironmentOp::Logs => "failed to display logs",
            EnvironmentOp::Status => "failed to check status",
        }
    }

    pub fn success_message(&self) -> &'static str {
        match self {
            EnvironmentOp::Up => "Environment started successfully",
            EnvironmentOp::Down => "Environment stopped successfully",
            EnvironmentOp::Logs => "Logs displayed",
            EnvironmentOp::Status => "Status displayed",
        }
    }

    fn announcement(&self) -> &'static str {
        match self {
            EnvironmentOp::Up => "Starting environment",
            EnvironmentOp::Down => "Stopping environment",
            EnvironmentOp::Logs => "Displaying logs",
            EnvironmentOp::Status => "Checking environment status",
        }
    }
}

impl fmt::Display for EnvironmentOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EnvironmentOp::Up => "up",
            EnvironmentOp::Down => "down",
            EnvironmentOp::Logs => "logs",
            EnvironmentOp::Status => "status",
        };
        f.write_str(name)
    }
}

/// Options for `logs`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogsOptions {
    /// Keep streaming new output (`-f`)
    pub follow: bool,
    /// Restrict to these services; all when empty
    pub services: Vec<String>,
}

/// Errors from a single lifecycle operation
#[derive(Debug, Error)]
pub enum EnvironmentError {
    #[error("{}: {source}", op.failure_context())]
    Exec {
        op: EnvironmentOp,
        #[source]
        source: ExecError,
    },

    #[error("{}: {status}", op.failure_context())]
    Failed { op: EnvironmentOp, status: String },
}

impl EnvironmentError {
    pub fn op(&self) -> EnvironmentOp {
        match self {
            EnvironmentError::Exec { op, .. } | EnvironmentError::Failed { op, .. } => *op,
        }
    }
}

/// Stateless façade over the compose runtime. Output goes straight to the operator.
#[derive(Clone)]
pub struct EnvironmentController {
    executor: Arc<dyn Executor>,
    compose: ComposeCommand,
}

impl EnvironmentController {
    pub fn new(executor: Arc<dyn Executor>, compose: ComposeCommand) -> Self {
        Self { executor, compose }
    }

    pub async fn up(&self, cancel: &CancelSignal) -> Result<String, EnvironmentError> {
        self.dispatch(EnvironmentOp::Up, vec!["up".into(), "-d".into()], cancel)
            .await
    }

    pub async fn down(&self, cancel: &CancelSignal) -> Result<String, EnvironmentError> {
        self.dispatch(EnvironmentOp::Down, vec!["down".into()], cancel)
            .await
    }

    pub async fn logs(
        &self,
        options: &LogsOptions,
        cancel: &CancelSignal,
    ) -> Result<String, EnvironmentError> {
        let mut args = vec!["logs".to_string()];
        if options.follow {
            args.push("-f".to_string());
        }
        args.extend(options.services.iter().cloned());
        self.dispatch(EnvironmentOp::Logs, args, cancel).await
    }

    pub async fn status(&self, cancel: &CancelSignal) -> Result<String, EnvironmentError> {
        self.dispatch(EnvironmentOp::Status, vec!["ps".into()], cancel)
            .await
    }

    async fn dispatch(
        &self,
        op: EnvironmentOp,
        args: Vec<String>,
        cancel: &CancelSignal,
    ) -> Result<String, EnvironmentError> {
        info!(%op, "{}...", op.announcement());

        let invocation = self.compose.invocation(args).inherit_output();
        let output = self
            .executor
            .run(&invocation, cancel)
            .await
            .map_err(|source| EnvironmentError::Exec { op, source })?;

        if !output.success() {
            return Err(EnvironmentError::Failed {
                op,
                status: output.status_label(),
            });
        }

        Ok(op.success_message().to_string())
    }
}
