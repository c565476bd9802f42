// CI Pipeline
// Provision -> build firmware -> verify, halting at the first failing stage

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use serde::Serialize;
use thiserror::Error;
use tracing::{error, info};

use crate::events::{emit, LogLevel, PipelineEvent, ProgressSender};
use crate::executor::CancelSignal;
use crate::firmware::{FirmwareError, FirmwareOutcome, FirmwareProvisioner};
use crate::workspace::{ProvisionError, WorkspaceLayout};

pub const PIPELINE_NAME: &str = "ci";

pub const SUCCESS_MESSAGE: &str =
    "CI pipeline completed successfully (firmware built and verified)";

/// Pipeline stages in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Provision,
    Build,
    Verify,
}

impl Stage {
    pub const ALL: [Stage; 3] = [Stage::Provision, Stage::Build, Stage::Verify];

    pub fn description(&self) -> &'static str {
        match self {
            Stage::Provision => "Creating required directories",
            Stage::Build => "Building Firmware",
            Stage::Verify => "Verifying firmware artifact",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Provision => "provision",
            Stage::Build => "build",
            Stage::Verify => "verify",
        };
        f.write_str(name)
    }
}

/// A pipeline failure, attributed to the stage that caused it
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("provision stage failed: {0}")]
    Provision(#[source] ProvisionError),

    #[error("firmware build failed: {0}")]
    Firmware(#[source] FirmwareError),

    #[error("firmware build didn't produce expected output at {}: {reason}", path.display())]
    Verify { path: PathBuf, reason: String },

    #[error("pipeline cancelled before {0} stage")]
    Cancelled(Stage),
}

impl PipelineError {
    pub fn stage(&self) -> Stage {
        match self {
            PipelineError::Provision(_) => Stage::Provision,
            PipelineError::Firmware(_) => Stage::Build,
            PipelineError::Verify { .. } => Stage::Verify,
            PipelineError::Cancelled(stage) => *stage,
        }
    }
}

/// Timing of a completed stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageResult {
    pub stage: Stage,
    pub duration_ms: u64,
}

/// Summary of a successful pipeline run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PipelineReport {
    pub pipeline_name: String,
    pub message: String,
    pub stages: Vec<StageResult>,
    pub firmware: FirmwareOutcome,
    /// Size of the verified artifact in bytes
    pub artifact_bytes: u64,
    pub duration_ms: u64,
}

impl PipelineReport {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// Runs the CI pipeline
pub struct PipelineRunner {
    layout: WorkspaceLayout,
    provisioner: FirmwareProvisioner,
    progress: Option<ProgressSender>,
}

impl PipelineRunner {
    pub fn new(layout: WorkspaceLayout, provisioner: FirmwareProvisioner) -> Self {
        Self {
            layout,
            provisioner,
            progress: None,
        }
    }

    /// Report progress on the given channel
    pub fn with_progress(mut self, progress: ProgressSender) -> Self {
        self.progress = Some(progress);
        self
    }

    pub async fn run(&self, cancel: &CancelSignal) -> Result<PipelineReport, PipelineError> {
        let started = Instant::now();
        info!("=== Running CI Pipeline ===");
        self.emit(PipelineEvent::PipelineStarted {
            pipeline_name: PIPELINE_NAME.to_string(),
            total_stages: Stage::ALL.len(),
        });

        let result = self.run_stages(cancel).await;

        let duration = started.elapsed();
        self.emit(PipelineEvent::PipelineCompleted {
            pipeline_name: PIPELINE_NAME.to_string(),
            success: result.is_ok(),
            duration,
        });

        let (stages, firmware, artifact_bytes) = result?;
        info!("=== CI Pipeline Completed Successfully ===");

        Ok(PipelineReport {
            pipeline_name: PIPELINE_NAME.to_string(),
            message: SUCCESS_MESSAGE.to_string(),
            stages,
            firmware,
            artifact_bytes,
            duration_ms: millis(duration),
        })
    }

    async fn run_stages(
        &self,
        cancel: &CancelSignal,
    ) -> Result<(Vec<StageResult>, FirmwareOutcome, u64), PipelineError> {
        let mut stages = Vec::with_capacity(Stage::ALL.len());

        let clock = self.begin(Stage::Provision, cancel)?;
        let provisioned = self.layout.provision().map_err(PipelineError::Provision);
        let dirs = self.finish(Stage::Provision, clock, provisioned, &mut stages)?;
        self.emit(PipelineEvent::Log {
            level: LogLevel::Info,
            message: format!(
                "{} workspace directories ready under {}",
                dirs.len(),
                self.layout.root().display()
            ),
        });

        let clock = self.begin(Stage::Build, cancel)?;
        let acquired = self
            .provisioner
            .acquire(cancel)
            .await
            .map_err(PipelineError::Firmware);
        let firmware = self.finish(Stage::Build, clock, acquired, &mut stages)?;
        if firmware.source.is_placeholder() {
            self.emit(PipelineEvent::Log {
                level: LogLevel::Warning,
                message: format!("Using {}", firmware.source),
            });
        }
        self.emit(PipelineEvent::FirmwareAcquired {
            source: firmware.source.clone(),
        });

        let clock = self.begin(Stage::Verify, cancel)?;
        let artifact = self.layout.firmware_artifact();
        let verified = verify_artifact(&artifact).map_err(|reason| PipelineError::Verify {
            path: artifact.clone(),
            reason,
        });
        let artifact_bytes = self.finish(Stage::Verify, clock, verified, &mut stages)?;

        Ok((stages, firmware, artifact_bytes))
    }

    fn begin(&self, stage: Stage, cancel: &CancelSignal) -> Result<Instant, PipelineError> {
        if *cancel.borrow() {
            return Err(PipelineError::Cancelled(stage));
        }
        info!(%stage, "--- {} ---", stage.description());
        self.emit(PipelineEvent::StageStarted {
            stage,
            stage_index: stage as usize,
        });
        Ok(Instant::now())
    }

    /// Record the stage outcome and pass it through
    fn finish<T>(
        &self,
        stage: Stage,
        clock: Instant,
        outcome: Result<T, PipelineError>,
        stages: &mut Vec<StageResult>,
    ) -> Result<T, PipelineError> {
        let duration = clock.elapsed();
        match &outcome {
            Ok(_) => {
                self.emit(PipelineEvent::StageCompleted { stage, duration });
                stages.push(StageResult {
                    stage,
                    duration_ms: millis(duration),
                });
            }
            Err(e) => {
                error!(%stage, error = %e, "stage failed");
                self.emit(PipelineEvent::StageFailed {
                    stage,
                    message: e.to_string(),
                    duration,
                });
            }
        }
        outcome
    }

    fn emit(&self, event: PipelineEvent) {
        emit(self.progress.as_ref(), event);
    }
}

/// Size of the artifact, or why it does not count as produced
fn verify_artifact(path: &Path) -> Result<u64, String> {
    match fs::metadata(path) {
        Ok(meta) if !meta.is_file() => Err("not a regular file".to_string()),
        Ok(meta) if meta.len() == 0 => Err("file is empty".to_string()),
        Ok(meta) => Ok(meta.len()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Err("file does not exist".to_string()),
        Err(e) => Err(e.to_string()),
    }
}

fn millis(duration: Duration) -> u64 {
    duration.as_millis().min(u64::MAX as u128) as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FirmwareConfig;
    use crate::engine::ContainerEngine;
    use crate::events::progress_channel;
    use crate::executor::{cancel_channel, never_cancelled, ExecOutput};
    use crate::firmware::FirmwareSource;
    use crate::testing::{FakeExecutor, FakeFetcher};
    use crate::workspace::REQUIRED_DIRS;

    use std::sync::Arc;
    use tempfile::TempDir;

    fn runner(temp: &TempDir, fake: Arc<FakeExecutor>, fetcher: FakeFetcher) -> PipelineRunner {
        let layout = WorkspaceLayout::new(temp.path());
        let provisioner = FirmwareProvisioner::new(
            ContainerEngine::new(fake, "docker"),
            Arc::new(fetcher),
            layout.clone(),
            FirmwareConfig::default(),
        );
        PipelineRunner::new(layout, provisioner)
    }

    #[tokio::test]
    async fn test_successful_run() {
        let temp = tempfile::tempdir().unwrap();
        let fake = Arc::new(FakeExecutor::new());
        let runner = runner(&temp, fake, FakeFetcher::ok(vec![0x55u8; 1024]));

        let report = runner.run(&never_cancelled()).await.unwrap();

        assert_eq!(report.message, SUCCESS_MESSAGE);
        assert_eq!(
            report.stages.iter().map(|s| s.stage).collect::<Vec<_>>(),
            Stage::ALL.to_vec()
        );
        assert_eq!(report.artifact_bytes, 1024);
        assert!(matches!(report.firmware.source, FirmwareSource::Fetched { .. }));
        for dir in REQUIRED_DIRS {
            assert!(temp.path().join(dir).is_dir());
        }
    }

    #[tokio::test]
    async fn test_run_twice_is_idempotent() {
        let temp = tempfile::tempdir().unwrap();
        let fake = Arc::new(FakeExecutor::new());
        let runner = runner(&temp, fake, FakeFetcher::status(404));

        runner.run(&never_cancelled()).await.unwrap();
        let report = runner.run(&never_cancelled()).await.unwrap();

        assert!(report.firmware.source.is_placeholder());
        assert_eq!(report.artifact_bytes, 4_194_304);
    }

    #[tokio::test]
    async fn test_logs_bmc_failure_stops_before_build() {
        let temp = tempfile::tempdir().unwrap();
        fs::create_dir_all(temp.path().join("logs")).unwrap();
        fs::write(temp.path().join("logs/bmc"), b"not a directory").unwrap();
        let fake = Arc::new(FakeExecutor::new());
        let runner = runner(&temp, fake.clone(), FakeFetcher::ok(vec![1u8; 8]));

        let err = runner.run(&never_cancelled()).await.unwrap_err();

        assert_eq!(err.stage(), Stage::Provision);
        assert!(err.to_string().contains("logs/bmc"));
        assert!(fake.calls().is_empty());
    }

    #[tokio::test]
    async fn test_acquisition_failure_is_attributed_to_build() {
        let temp = tempfile::tempdir().unwrap();
        let fake = Arc::new(FakeExecutor::new());
        fake.respond("docker start", ExecOutput::failed(1, "container exited"));
        let runner = runner(&temp, fake, FakeFetcher::ok(vec![1u8; 8]));

        let err = runner.run(&never_cancelled()).await.unwrap_err();

        assert_eq!(err.stage(), Stage::Build);
        assert!(err.to_string().starts_with("firmware build failed:"));
        assert!(matches!(err, PipelineError::Firmware(FirmwareError::BuildContext(_))));
    }

    #[tokio::test]
    async fn test_missing_artifact_fails_verification() {
        let temp = tempfile::tempdir().unwrap();
        let fake = Arc::new(FakeExecutor::new());
        // Export reports success but never writes the file
        fake.noop(":/build/coreboot.rom ");
        let runner = runner(&temp, fake, FakeFetcher::ok(vec![1u8; 8]));

        let err = runner.run(&never_cancelled()).await.unwrap_err();

        assert_eq!(err.stage(), Stage::Verify);
        assert!(err.to_string().contains("didn't produce expected output"));
        assert!(err.to_string().contains("file does not exist"));
    }

    #[test]
    fn test_verify_artifact_rejects_empty_and_directories() {
        let temp = tempfile::tempdir().unwrap();
        let empty = temp.path().join("empty.rom");
        fs::write(&empty, b"").unwrap();
        let full = temp.path().join("full.rom");
        fs::write(&full, b"ROM").unwrap();

        assert_eq!(verify_artifact(&empty).unwrap_err(), "file is empty");
        assert_eq!(verify_artifact(temp.path()).unwrap_err(), "not a regular file");
        assert_eq!(verify_artifact(&full).unwrap(), 3);
    }

    #[tokio::test]
    async fn test_progress_events() {
        let temp = tempfile::tempdir().unwrap();
        let fake = Arc::new(FakeExecutor::new());
        let (tx, mut rx) = progress_channel();
        let runner = runner(&temp, fake, FakeFetcher::status(500)).with_progress(tx);

        runner.run(&never_cancelled()).await.unwrap();
        drop(runner);

        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }

        assert!(matches!(
            events.first(),
            Some(PipelineEvent::PipelineStarted { total_stages: 3, .. })
        ));
        assert!(matches!(
            events.last(),
            Some(PipelineEvent::PipelineCompleted { success: true, .. })
        ));
        assert!(events.iter().any(|e| matches!(
            e,
            PipelineEvent::Log {
                level: LogLevel::Info,
                message,
            } if message.starts_with("5 workspace directories ready")
        )));
        let completed: Vec<Stage> = events
            .iter()
            .filter_map(|e| match e {
                PipelineEvent::StageCompleted { stage, .. } => Some(*stage),
                _ => None,
            })
            .collect();
        assert_eq!(completed, Stage::ALL.to_vec());
        assert!(events.iter().any(|e| matches!(
            e,
            PipelineEvent::Log {
                level: LogLevel::Warning,
                ..
            }
        )));
    }

    #[tokio::test]
    async fn test_failed_stage_event() {
        let temp = tempfile::tempdir().unwrap();
        let fake = Arc::new(FakeExecutor::new());
        fake.noop(":/build/coreboot.rom ");
        let (tx, mut rx) = progress_channel();
        let runner = runner(&temp, fake, FakeFetcher::ok(vec![1u8; 8])).with_progress(tx);

        assert!(runner.run(&never_cancelled()).await.is_err());
        drop(runner);

        let mut failed = None;
        while let Some(event) = rx.recv().await {
            if let PipelineEvent::StageFailed { stage, .. } = event {
                failed = Some(stage);
            }
        }
        assert_eq!(failed, Some(Stage::Verify));
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let temp = tempfile::tempdir().unwrap();
        let fake = Arc::new(FakeExecutor::new());
        let runner = runner(&temp, fake.clone(), FakeFetcher::ok(vec![1u8; 8]));
        let (handle, signal) = cancel_channel();
        handle.send(true).unwrap();

        let err = runner.run(&signal).await.unwrap_err();

        assert!(matches!(err, PipelineError::Cancelled(Stage::Provision)));
        assert!(fake.calls().is_empty());
        assert!(!temp.path().join("firmware").exists());
    }

    #[tokio::test]
    async fn test_report_json() {
        let temp = tempfile::tempdir().unwrap();
        let runner = runner(&temp, Arc::new(FakeExecutor::new()), FakeFetcher::status(404));

        let report = runner.run(&never_cancelled()).await.unwrap();
        let json: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();

        assert_eq!(json["pipeline_name"], "ci");
        assert_eq!(json["firmware"]["source"]["kind"], "placeholder");
        assert_eq!(json["stages"][2]["stage"], "verify");
    }
}
