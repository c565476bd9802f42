// Firmware Provisioner
// Acquires the coreboot ROM: download in a build context, zero-filled placeholder on failure

use std::fmt;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::FirmwareConfig;
use crate::engine::{BuildContext, BuildContextSpec, ContainerEngine, EngineError};
use crate::executor::CancelSignal;
use crate::fetch::{FetchError, Fetcher};
use crate::workspace::{
    ProvisionError, WorkspaceLayout, FIRMWARE_CONFIG_DIR, FIRMWARE_DIR, ROM_FILE_NAME,
};

/// Errors that can occur while acquiring firmware.
///
/// A failed download is not among them: it is absorbed by the placeholder fallback.
#[derive(Debug, Error)]
pub enum FirmwareError {
    #[error("{0}")]
    Provision(#[from] ProvisionError),

    #[error("failed to set up build context: {0}")]
    BuildContext(#[source] EngineError),

    #[error("failed to stage firmware into build context: {0}")]
    Stage(#[source] EngineError),

    #[error("build command '{command}' failed: {source}")]
    BuildCommand {
        command: String,
        #[source]
        source: EngineError,
    },

    #[error("failed to export firmware: {0}")]
    Export(#[source] EngineError),

    #[error("failed to stage firmware: {0}")]
    StagingFile(#[source] io::Error),

    #[error("firmware acquisition was cancelled")]
    Cancelled,
}

/// Where the ROM bytes came from
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FirmwareSource {
    /// Downloaded from `url`
    Fetched { url: String, bytes: u64 },
    /// Zero-filled stand-in, generated because the download failed
    Placeholder { reason: String, bytes: u64 },
}

impl FirmwareSource {
    pub fn is_placeholder(&self) -> bool {
        matches!(self, FirmwareSource::Placeholder { .. })
    }

    pub fn bytes(&self) -> u64 {
        match self {
            FirmwareSource::Fetched { bytes, .. } | FirmwareSource::Placeholder { bytes, .. } => {
                *bytes
            }
        }
    }
}

impl fmt::Display for FirmwareSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FirmwareSource::Fetched { url, bytes } => {
                write!(f, "downloaded {} bytes from {}", bytes, url)
            }
            FirmwareSource::Placeholder { reason, bytes } => {
                write!(f, "{}-byte zero-filled placeholder ({})", bytes, reason)
            }
        }
    }
}

/// A firmware artifact on the host and its provenance
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FirmwareOutcome {
    pub path: PathBuf,
    pub source: FirmwareSource,
}

impl FirmwareOutcome {
    pub fn message(&self) -> String {
        format!(
            "Coreboot firmware built successfully in {}",
            self.path.display()
        )
    }
}

/// Produces `firmware/coreboot.rom`
#[derive(Clone)]
pub struct FirmwareProvisioner {
    engine: ContainerEngine,
    fetcher: Arc<dyn Fetcher>,
    layout: WorkspaceLayout,
    config: FirmwareConfig,
}

impl FirmwareProvisioner {
    pub fn new(
        engine: ContainerEngine,
        fetcher: Arc<dyn Fetcher>,
        layout: WorkspaceLayout,
        config: FirmwareConfig,
    ) -> Self {
        Self {
            engine,
            fetcher,
            layout,
            config,
        }
    }

    /// Acquire the firmware ROM and export it to the workspace.
    ///
    /// The build context is removed on every path out of this call.
    pub async fn acquire(&self, cancel: &CancelSignal) -> Result<FirmwareOutcome, FirmwareError> {
        info!("Building Coreboot firmware for QEMU Q35");

        self.layout.ensure_dir(FIRMWARE_DIR)?;
        self.layout.ensure_dir(FIRMWARE_CONFIG_DIR)?;

        let spec = BuildContextSpec::from(&self.config);
        let context = self
            .engine
            .create_context(&spec, cancel)
            .await
            .map_err(|e| cancelled_or(e, FirmwareError::BuildContext))?;

        let result = self.produce(&context, cancel).await;

        if let Err(e) = self.engine.remove(&context).await {
            warn!(container = %context.name, error = %e, "failed to remove build context");
        }

        let outcome = result?;
        info!(path = %outcome.path.display(), source = %outcome.source, "firmware ready");
        Ok(outcome)
    }

    async fn produce(
        &self,
        context: &BuildContext,
        cancel: &CancelSignal,
    ) -> Result<FirmwareOutcome, FirmwareError> {
        let (rom, source) = self.obtain_rom(cancel).await?;

        let staging = write_staging_file(&self.layout.firmware_dir(), &rom)?;

        let rom_path = context.path_of(ROM_FILE_NAME);
        self.engine
            .copy_in(context, staging.path(), &rom_path, cancel)
            .await
            .map_err(|e| cancelled_or(e, FirmwareError::Stage))?;

        for command in &self.config.build_commands {
            self.engine
                .exec(context, command, cancel)
                .await
                .map_err(|source| {
                    if source.is_cancelled() {
                        FirmwareError::Cancelled
                    } else {
                        FirmwareError::BuildCommand {
                            command: command.clone(),
                            source,
                        }
                    }
                })?;
        }

        let artifact = self.layout.firmware_artifact();
        self.engine
            .copy_out(context, &rom_path, &artifact, cancel)
            .await
            .map_err(|e| cancelled_or(e, FirmwareError::Export))?;

        Ok(FirmwareOutcome {
            path: artifact,
            source,
        })
    }

    /// Download the ROM, or fall back to a zero-filled placeholder.
    ///
    /// Only cancellation escapes as an error.
    async fn obtain_rom(
        &self,
        cancel: &CancelSignal,
    ) -> Result<(Vec<u8>, FirmwareSource), FirmwareError> {
        info!(url = %self.config.url, "Downloading pre-built Coreboot ROM for QEMU");

        let failure = match self.fetcher.fetch(&self.config.url, cancel).await {
            Ok(rom) if !rom.is_empty() => {
                let source = FirmwareSource::Fetched {
                    url: self.config.url.clone(),
                    bytes: rom.len() as u64,
                };
                return Ok((rom, source));
            }
            // A zero-byte ROM is never a usable artifact
            Ok(_) => FetchError::EmptyBody(self.config.url.clone()),
            Err(FetchError::Cancelled(_)) => return Err(FirmwareError::Cancelled),
            Err(e) => e,
        };

        warn!(url = %self.config.url, error = %failure, "Download failed, creating placeholder ROM");
        let size = self.config.placeholder_size;
        let source = FirmwareSource::Placeholder {
            reason: failure.to_string(),
            bytes: size,
        };
        Ok((vec![0u8; size as usize], source))
    }
}

/// Write the ROM to a temp file in `dir`; removed when the handle drops
fn write_staging_file(dir: &Path, rom: &[u8]) -> Result<tempfile::NamedTempFile, FirmwareError> {
    let mut staging = tempfile::NamedTempFile::new_in(dir).map_err(FirmwareError::StagingFile)?;
    staging.write_all(rom).map_err(FirmwareError::StagingFile)?;
    staging.flush().map_err(FirmwareError::StagingFile)?;
    Ok(staging)
}

fn cancelled_or(error: EngineError, wrap: fn(EngineError) -> FirmwareError) -> FirmwareError {
    if error.is_cancelled() {
        FirmwareError::Cancelled
    } else {
        wrap(error)
    }
}
