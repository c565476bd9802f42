// Image Builder
// Builds the host and BMC container images through the compose runtime

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

use crate::compose::ComposeCommand;
use crate::executor::{CancelSignal, ExecError, Executor};
use crate::firmware::{FirmwareError, FirmwareOutcome, FirmwareProvisioner};

/// Which image(s) to build
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildTarget {
    Host,
    Bmc,
    /// Firmware first, then every compose service
    All,
}

impl BuildTarget {
    /// Compose service name, `None` for an unscoped build
    pub fn service(&self) -> Option<&'static str> {
        match self {
            BuildTarget::Host => Some("host"),
            BuildTarget::Bmc => Some("bmc"),
            BuildTarget::All => None,
        }
    }
}

impl fmt::Display for BuildTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            BuildTarget::Host => "host",
            BuildTarget::Bmc => "BMC",
            BuildTarget::All => "all",
        };
        f.write_str(label)
    }
}

impl FromStr for BuildTarget {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "host" => Ok(BuildTarget::Host),
            "bmc" => Ok(BuildTarget::Bmc),
            "all" => Ok(BuildTarget::All),
            other => Err(format!(
                "unknown build target '{}', expected host, bmc or all",
                other
            )),
        }
    }
}

/// Errors that can occur while building images
#[derive(Debug, Error)]
pub enum ImageError {
    #[error("firmware build failed: {0}")]
    Firmware(#[source] FirmwareError),

    #[error("failed to build {} ({status})\nOutput: {output}", describe(*target))]
    BuildFailed {
        target: BuildTarget,
        status: String,
        output: String,
    },

    #[error("failed to build {}: {source}", describe(*target))]
    Exec {
        target: BuildTarget,
        #[source]
        source: ExecError,
    },
}

fn describe(target: BuildTarget) -> String {
    match target {
        BuildTarget::All => "containers".to_string(),
        other => format!("{} container", other),
    }
}

/// Result of a successful image build
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImageBuild {
    pub target: BuildTarget,
    pub message: String,
    /// Captured build output
    pub log: String,
    /// Firmware produced before an `all` build
    pub firmware: Option<FirmwareOutcome>,
}

/// Builds container images
#[derive(Clone)]
pub struct ImageBuilder {
    executor: Arc<dyn Executor>,
    compose: ComposeCommand,
    provisioner: FirmwareProvisioner,
}

impl ImageBuilder {
    pub fn new(
        executor: Arc<dyn Executor>,
        compose: ComposeCommand,
        provisioner: FirmwareProvisioner,
    ) -> Self {
        Self {
            executor,
            compose,
            provisioner,
        }
    }

    pub async fn build_host(&self, cancel: &CancelSignal) -> Result<ImageBuild, ImageError> {
        self.build(BuildTarget::Host, cancel).await
    }

    pub async fn build_bmc(&self, cancel: &CancelSignal) -> Result<ImageBuild, ImageError> {
        self.build(BuildTarget::Bmc, cancel).await
    }

    /// Firmware first; no image build is attempted if it fails
    pub async fn build_all(&self, cancel: &CancelSignal) -> Result<ImageBuild, ImageError> {
        self.build(BuildTarget::All, cancel).await
    }

    pub async fn build(
        &self,
        target: BuildTarget,
        cancel: &CancelSignal,
    ) -> Result<ImageBuild, ImageError> {
        let firmware = match target {
            BuildTarget::All => Some(
                self.provisioner
                    .acquire(cancel)
                    .await
                    .map_err(ImageError::Firmware)?,
            ),
            _ => None,
        };

        let mut args = vec!["build".to_string()];
        match target.service() {
            Some(service) => {
                info!(%target, "Building {} container image", target);
                args.push(service.to_string());
            }
            None => info!("Building all containers"),
        }

        let invocation = self.compose.invocation(args);
        let output = self
            .executor
            .run(&invocation, cancel)
            .await
            .map_err(|source| ImageError::Exec { target, source })?;

        let log = output.combined();
        if !output.success() {
            return Err(ImageError::BuildFailed {
                target,
                status: output.status_label(),
                output: log,
            });
        }
        debug!(%target, "build output:\n{}", log);

        let message = match target {
            BuildTarget::Host => "Host container built successfully".to_string(),
            BuildTarget::Bmc => "BMC container built successfully".to_string(),
            BuildTarget::All => {
                "All builds completed successfully (firmware + containers)".to_string()
            }
        };

        Ok(ImageBuild {
            target,
            message,
            log,
            firmware,
        })
    }
}
