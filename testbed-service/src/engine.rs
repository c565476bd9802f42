// Container Engine
// Build contexts: pinned base image + toolchain, driven through the docker CLI

use std::path::Path;
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info};

use crate::config::FirmwareConfig;
use crate::executor::{never_cancelled, CancelSignal, ExecError, ExecOutput, Executor, Invocation};

/// Errors that can occur while driving the container engine
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("{operation} failed ({status}): {output}")]
    CommandFailed {
        operation: String,
        status: String,
        output: String,
    },

    #[error("{0}")]
    Exec(#[from] ExecError),
}

impl EngineError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, EngineError::Exec(e) if e.is_cancelled())
    }
}

/// What a build context is made of
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildContextSpec {
    pub base_image: String,
    pub packages: Vec<String>,
    pub workdir: String,
}

impl From<&FirmwareConfig> for BuildContextSpec {
    fn from(config: &FirmwareConfig) -> Self {
        Self {
            base_image: config.base_image.clone(),
            packages: config.packages.clone(),
            workdir: config.workdir.clone(),
        }
    }
}

/// Handle to a running build context container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildContext {
    /// Container name
    pub name: String,
    /// Image the container was created from
    pub image: String,
    /// Working directory inside the container
    pub workdir: String,
}

impl BuildContext {
    /// Absolute in-container path of a file in the working directory
    pub fn path_of(&self, file_name: &str) -> String {
        format!("{}/{}", self.workdir.trim_end_matches('/'), file_name)
    }
}

/// Container engine wrapper over an `Executor`
#[derive(Clone)]
pub struct ContainerEngine {
    executor: Arc<dyn Executor>,
    program: String,
}

impl ContainerEngine {
    pub fn new(executor: Arc<dyn Executor>, program: impl Into<String>) -> Self {
        Self {
            executor,
            program: program.into(),
        }
    }

    /// Create, start and provision a build context.
    ///
    /// If any step after `create` fails the container is removed before
    /// the error is returned.
    pub async fn create_context(
        &self,
        spec: &BuildContextSpec,
        cancel: &CancelSignal,
    ) -> Result<BuildContext, EngineError> {
        let context = BuildContext {
            name: format!("testbed-build-{}", context_suffix()),
            image: spec.base_image.clone(),
            workdir: spec.workdir.clone(),
        };

        info!(image = %spec.base_image, container = %context.name, "creating build context");

        // Keep the container alive with tail so steps can be exec'd into it
        let create = self
            .docker()
            .args(["create", "--name", &context.name, "-w", &context.workdir])
            .arg(&spec.base_image)
            .args(["tail", "-f", "/dev/null"]);
        self.checked("create build context", &create, cancel).await?;

        if let Err(e) = self.provision_context(&context, spec, cancel).await {
            self.discard(&context).await;
            return Err(e);
        }

        Ok(context)
    }

    async fn provision_context(
        &self,
        context: &BuildContext,
        spec: &BuildContextSpec,
        cancel: &CancelSignal,
    ) -> Result<(), EngineError> {
        let start = self.docker().args(["start", &context.name]);
        self.checked("start build context", &start, cancel).await?;

        let mkdir = self.exec_invocation(context, ["mkdir", "-p", &context.workdir]);
        self.checked("create build directory", &mkdir, cancel).await?;

        if spec.packages.is_empty() {
            return Ok(());
        }

        let update = self.exec_invocation(context, ["apt-get", "update"]);
        self.checked("apt-get update", &update, cancel).await?;

        let install = self
            .exec_invocation(context, ["apt-get", "install", "-y"])
            .args(spec.packages.iter().cloned());
        self.checked("install toolchain packages", &install, cancel)
            .await?;

        Ok(())
    }

    /// Run a shell command in the context's working directory
    pub async fn exec(
        &self,
        context: &BuildContext,
        script: &str,
        cancel: &CancelSignal,
    ) -> Result<ExecOutput, EngineError> {
        let invocation = self
            .docker()
            .args(["exec", "-w", &context.workdir, &context.name, "sh", "-c", script]);
        self.checked(&format!("run '{}'", script), &invocation, cancel)
            .await
    }

    /// Copy a host file into the context
    pub async fn copy_in(
        &self,
        context: &BuildContext,
        host_path: &Path,
        container_path: &str,
        cancel: &CancelSignal,
    ) -> Result<(), EngineError> {
        let invocation = self
            .docker()
            .arg("cp")
            .arg(host_path.to_string_lossy().to_string())
            .arg(format!("{}:{}", context.name, container_path));
        self.checked("copy file into build context", &invocation, cancel)
            .await?;
        Ok(())
    }

    /// Export a file from the context to the host
    pub async fn copy_out(
        &self,
        context: &BuildContext,
        container_path: &str,
        host_path: &Path,
        cancel: &CancelSignal,
    ) -> Result<(), EngineError> {
        let invocation = self
            .docker()
            .arg("cp")
            .arg(format!("{}:{}", context.name, container_path))
            .arg(host_path.to_string_lossy().to_string());
        self.checked("export file from build context", &invocation, cancel)
            .await?;
        Ok(())
    }

    /// Force-remove the context container. Runs even if the caller was cancelled.
    pub async fn remove(&self, context: &BuildContext) -> Result<(), EngineError> {
        let invocation = self.docker().args(["rm", "-f", &context.name]);
        self.checked("remove build context", &invocation, &never_cancelled())
            .await?;
        Ok(())
    }

    async fn discard(&self, context: &BuildContext) {
        if let Err(e) = self.remove(context).await {
            debug!(container = %context.name, error = %e, "failed to discard build context");
        }
    }

    fn docker(&self) -> Invocation {
        Invocation::new(self.program.clone())
    }

    fn exec_invocation<I, S>(&self, context: &BuildContext, command: I) -> Invocation
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.docker()
            .args(["exec", &context.name])
            .args(command)
    }

    /// Run an invocation and turn a non-zero exit into `CommandFailed`
    async fn checked(
        &self,
        operation: &str,
        invocation: &Invocation,
        cancel: &CancelSignal,
    ) -> Result<ExecOutput, EngineError> {
        let output = self.executor.run(invocation, cancel).await?;
        if !output.success() {
            return Err(EngineError::CommandFailed {
                operation: operation.to_string(),
                status: output.status_label(),
                output: output.combined().trim().to_string(),
            });
        }
        Ok(output)
    }
}

/// Short hex suffix that keeps context names unique per process and moment
fn context_suffix() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .subsec_nanos();
    format!("{:08x}", nanos ^ std::process::id().rotate_left(16))
}
